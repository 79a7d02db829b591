//! # Run-Length WLD Codec
//!
//! The oldest of the WLD encodings, three valued.  Bytes 0..=80 pack four
//! positions in base 3 (0 win, 1 draw, 2 loss); bytes 81..=254 are runs
//! of a single value, with the run length drawn from a fixed 58-entry
//! skip table and the value from the token's family: 81..=138 win,
//! 139..=196 draw, 197..=254 loss.  Byte 255 decodes as one unknown
//! position; the builder never emits it, positions no probe should ask
//! about (captures) are folded into the neighboring runs instead.  Every
//! token is a single byte, so the mini-block scanner is a plain table
//! walk.

use super::*;
use std::sync::OnceLock;

pub const SKIPS: usize = 58;

/// Run lengths available to the run tokens, shortest first.
pub const SKIP: [u32; SKIPS] = [
    5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28,
    29, 30, 31, 32, 36, 40, 44, 48, 52, 56, 60, 70, 80, 90, 100, 150, 200, 250, 300, 400, 500,
    650, 800, 1000, 1200, 1400, 1600, 2000, 2400, 3200, 4000, 5000, 7500, 10000,
];

const POW3: [u16; 4] = [1, 3, 9, 27];

/// Values by base-3 digit; the reserved byte 255 maps to unknown.
const DIGIT_VALUE: [Value; 4] = [Value::Win, Value::Draw, Value::Loss, Value::Unknown];

/// Positions covered by each token byte.
pub fn runlength(byte: u8) -> u32 {
    static TABLE: OnceLock<[u32; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut t = [0u32; 256];
        for (b, entry) in t.iter_mut().enumerate() {
            *entry = if b < 81 {
                4
            } else if b < 255 {
                SKIP[(b - 81) % SKIPS]
            } else {
                1
            };
        }
        t
    })[byte as usize]
}

/// The value repeated by a run token (bytes 81..=255).
pub fn run_value(byte: u8) -> Value {
    DIGIT_VALUE[(byte as usize - 81) / SKIPS]
}

fn value_of_byte(byte: u8, offset: u32) -> Value {
    if byte < 81 {
        let digit = (byte as u16 / POW3[3 - offset as usize]) % 3;
        DIGIT_VALUE[digit as usize]
    } else {
        run_value(byte)
    }
}

pub struct RunlenWld;

impl Codec for RunlenWld {
    const DB_TYPE: DbType = DbType::WldRunlen;
    const DATA_EXT: &'static str = "cpr";
    const INDEX_EXT: &'static str = "idx";
    const FILE_BLOCKSIZE: u32 = 4096;
    const BLOCK_MULT: u32 = 1;
    const SAME_PIECES_ONE_FILE: u32 = 5;
    const MIN_AUTOLOAD_PIECES: u32 = 5;
    const HASHED_CACHE: bool = false;

    fn parse_base_tail(tail: &str) -> Result<BaseTail, ParseIdxError> {
        let (first, startbyte) = tail
            .split_once('/')
            .ok_or_else(|| ParseIdxError::BadBase(tail.to_string()))?;
        Ok(BaseTail {
            first_file_block: first
                .trim()
                .parse()
                .map_err(|_| ParseIdxError::BadBase(tail.to_string()))?,
            startbyte: startbyte
                .trim()
                .parse()
                .map_err(|_| ParseIdxError::BadBase(tail.to_string()))?,
            extra: LineExtra::None,
        })
    }

    fn parse_block_line(line: &str) -> Result<BlockLine, ParseIdxError> {
        Ok(BlockLine {
            index: line
                .trim()
                .parse()
                .map_err(|_| ParseIdxError::BadLine(line.to_string()))?,
            extra: LineExtra::None,
        })
    }

    fn push_extra(_subdb: &mut Subdb, _extra: LineExtra) {}

    fn scan_block(
        subdb: &Subdb,
        data: &[u8],
        start_m: usize,
        rel_block: usize,
        end_subi: usize,
        out: &mut dyn FnMut(usize, SubIndex),
    ) {
        scan_block_bytes(runlength, subdb, data, start_m, rel_block, end_subi, out);
    }

    fn decode(subdb: &Subdb, tail: &[u8], start: SubIndex, target: u32, _rel_block: usize) -> Value {
        let _ = subdb;
        match decode_bytes_locate(runlength, tail, start, target) {
            Some((i, n)) if i < SUBINDEX_BLOCKSIZE => value_of_byte(tail[i], target - n),
            _ => {
                log::warn!("run-length token ran outside its mini-block");
                Value::Unknown
            }
        }
    }
}
