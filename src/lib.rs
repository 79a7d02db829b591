//! # `damdb` main library
//!
//! This library answers endgame queries for 10x10 international draughts
//! from precompressed databases: given a position with at most 9 pieces it
//! returns win/loss/draw, moves-to-conversion, or distance-to-win, reading
//! from hundreds of database files through a bounded-RAM block cache.
//!
//! ## Architecture
//!
//! The query path is built from small layers, leaves first:
//! * `engine` holds the 54-bit gapped bitboard, move generation, and FEN
//! * `indexing` is the perfect-hash bijection between a position and its
//!   64-bit index within a material slice
//! * `db` holds the codecs, the slice catalog parsed from the index files,
//!   the LRU block cache, and one driver per database family
//! * `search` resolves positions the databases cannot answer directly
//!   (capture positions and elided non-side-capture positions)
//!
//! A driver is opened against a directory of database files.  The format
//! is identified by the CRC-32 of a canonical index file; the caller can
//! also open a known format directly.  Drivers are `Send + Sync`: any
//! number of threads may call `lookup` concurrently.
//!
//! ## Databases
//!
//! Five database families are served:
//! * WLD run-length (`.cpr`/`.idx`), the oldest encoding
//! * WLD Tunstall v1 (`.cpr`/`.idx` with catalog info lines)
//! * WLD Tunstall v2 (`.cpr1`/`.idx1`), the current encoding
//! * WLD Huffman (`.cpr`/`.idx` with per-block start values)
//! * MTC run-length (`.cpr_mtc`/`.idx_mtc`) and DTW Re-Pair
//!   (`.cpr_dtw`/`.idx_dtw`) distance databases
//!
//! ## Values
//!
//! WLD lookups return `Value`; `SubdbUnavailable` and `NotInCache` are
//! in-band sentinels, not game values.  MTC lookups return plies (or the
//! below-threshold marker), DTW lookups half-move depths.  Lookups never
//! fail after a successful open; I/O errors degrade to `Unknown` and are
//! logged.  Set the RUST_LOG environment variable to control logging.

pub mod engine;
pub mod indexing;
pub mod db;
pub mod search;
pub mod platform;
pub mod commands;

use db::driver::WldDriver;
use db::dtw::DtwDriver;
use db::huffman::HuffmanWld;
use db::mtc::MtcDriver;
use db::runlen::RunlenWld;
use db::tunstall::{TunstallV1, TunstallV2};
use engine::{Color, Position};
use log::info;
use std::path::Path;

pub use db::driver::{Pieces, StatsSnapshot, VerifyMsgs};
pub use db::identify::identify;
pub use db::{DbType, OpenError, Value};

type DYNERR = Box<dyn std::error::Error>;
type STDRESULT = Result<(), Box<dyn std::error::Error>>;

/// An open database of any family.  WLD lookups go through `lookup`; the
/// distance databases return their own value spaces, see `lookup_raw`.
pub enum Driver {
    WldRunlen(WldDriver<RunlenWld>),
    WldTunV1(WldDriver<TunstallV1>),
    WldTunV2(WldDriver<TunstallV2>),
    WldHuffman(WldDriver<HuffmanWld>),
    MtcRunlen(MtcDriver),
    Dtw(DtwDriver),
}

impl Driver {
    pub fn db_type(&self) -> DbType {
        match self {
            Driver::WldRunlen(d) => d.db_type(),
            Driver::WldTunV1(d) => d.db_type(),
            Driver::WldTunV2(d) => d.db_type(),
            Driver::WldHuffman(d) => d.db_type(),
            Driver::MtcRunlen(d) => d.db_type(),
            Driver::Dtw(d) => d.db_type(),
        }
    }

    /// Raw lookup in the driver's own value space: WLD values for the WLD
    /// families, plies for MTC, half-move depths for DTW.
    pub fn lookup(&self, pos: &Position, color: Color, conditional: bool) -> i32 {
        match self {
            Driver::WldRunlen(d) => d.lookup(pos, color, conditional).to_i32(),
            Driver::WldTunV1(d) => d.lookup(pos, color, conditional).to_i32(),
            Driver::WldTunV2(d) => d.lookup(pos, color, conditional).to_i32(),
            Driver::WldHuffman(d) => d.lookup(pos, color, conditional).to_i32(),
            Driver::MtcRunlen(d) => d.lookup(pos, color, conditional),
            Driver::Dtw(d) => d.lookup(pos, color, conditional),
        }
    }

    /// WLD lookup.  For the distance families this is a type error at the
    /// call site in spirit; they return their raw values converted, which
    /// callers should not treat as game values.
    pub fn lookup_wld(&self, pos: &Position, color: Color, conditional: bool) -> Value {
        Value::from_i32(self.lookup(pos, color, conditional))
    }

    pub fn get_pieces(&self) -> Pieces {
        match self {
            Driver::WldRunlen(d) => d.get_pieces(),
            Driver::WldTunV1(d) => d.get_pieces(),
            Driver::WldTunV2(d) => d.get_pieces(),
            Driver::WldHuffman(d) => d.get_pieces(),
            Driver::MtcRunlen(d) => Pieces {
                max_pieces: d.max_pieces(),
                max_pieces_1side: indexing::MAX_PIECE as u32,
                ..Pieces::default()
            },
            Driver::Dtw(d) => Pieces {
                max_pieces: d.max_pieces(),
                max_pieces_1side: indexing::MAX_PIECE as u32,
                ..Pieces::default()
            },
        }
    }

    pub fn get_stats(&self) -> StatsSnapshot {
        match self {
            Driver::WldRunlen(d) => d.get_stats(),
            Driver::WldTunV1(d) => d.get_stats(),
            Driver::WldTunV2(d) => d.get_stats(),
            Driver::WldHuffman(d) => d.get_stats(),
            Driver::MtcRunlen(d) => d.get_stats(),
            Driver::Dtw(d) => d.get_stats(),
        }
    }

    pub fn reset_stats(&self) {
        match self {
            Driver::WldRunlen(d) => d.reset_stats(),
            Driver::WldTunV1(d) => d.reset_stats(),
            Driver::WldTunV2(d) => d.reset_stats(),
            Driver::WldHuffman(d) => d.reset_stats(),
            Driver::MtcRunlen(d) => d.reset_stats(),
            Driver::Dtw(d) => d.reset_stats(),
        }
    }

    /// CRC-check the database files against the built-in manifests.
    /// Returns the number of failures.
    pub fn verify(
        &self,
        msg_fn: &mut dyn FnMut(&str),
        abort: &std::sync::atomic::AtomicBool,
        msgs: &VerifyMsgs,
    ) -> u32 {
        match self {
            Driver::WldRunlen(d) => d.verify(msg_fn, abort, msgs),
            Driver::WldTunV1(d) => d.verify(msg_fn, abort, msgs),
            Driver::WldTunV2(d) => d.verify(msg_fn, abort, msgs),
            Driver::WldHuffman(d) => d.verify(msg_fn, abort, msgs),
            // The distance databases ship no published manifests.
            Driver::MtcRunlen(_) | Driver::Dtw(_) => 0,
        }
    }
}

/// Open the database in `directory`, identifying its format from the
/// files found there.  `options` is a `;`- or `,`-separated list of
/// `key=value` settings (`maxpieces`, `maxkings_1side_8pcs`, `autoload`).
/// `cache_mb` bounds the driver's RAM use.
pub fn open(options: &str, cache_mb: u64, directory: &Path) -> Result<Driver, OpenError> {
    let (db_type, max_pieces) = identify(directory)?;
    info!("identified {} database, {} pieces", db_type, max_pieces);
    open_type(db_type, options, cache_mb, directory)
}

/// Open a directory as a known format, skipping identification.
pub fn open_type(
    db_type: DbType,
    options: &str,
    cache_mb: u64,
    directory: &Path,
) -> Result<Driver, OpenError> {
    Ok(match db_type {
        DbType::WldRunlen => Driver::WldRunlen(WldDriver::open(options, cache_mb, directory)?),
        DbType::WldTunV1 => Driver::WldTunV1(WldDriver::open(options, cache_mb, directory)?),
        DbType::WldTunV2 => Driver::WldTunV2(WldDriver::open(options, cache_mb, directory)?),
        DbType::WldHuffman => {
            Driver::WldHuffman(WldDriver::open(options, cache_mb, directory)?)
        }
        DbType::MtcRunlen => Driver::MtcRunlen(MtcDriver::open(options, cache_mb, directory)?),
        DbType::Dtw => Driver::Dtw(DtwDriver::open(options, cache_mb, directory)?),
    })
}
