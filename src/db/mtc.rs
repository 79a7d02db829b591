//! # MTC Driver
//!
//! Moves-to-conversion databases only store distances of at least the
//! threshold (10 moves); everything nearer is compressed into skip runs of
//! the single answer "less than the threshold".  Bytes below 94 are runs
//! whose length comes from a 94-entry skip table; bytes 94 and up encode
//! one position of `2*(byte-94)` plies.
//!
//! There are no mini-block sub-indices: a lookup scans its 4 KiB block
//! linearly, from whichever end is nearer to the target index.  Files are
//! never autoloaded; the LRU cache is the only residency layer.

use super::cache::BlockCache;
use super::catalog::{build_file_table, parse_index_file, Catalog};
use super::driver::{Stats, StatsSnapshot};
use super::*;
use crate::engine::{Color, Position};
use crate::indexing::{position_to_index, Slice, MAX_PIECE, MAX_SUBSLICE_INDICES};
use crate::platform;
use log::warn;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Mutex;

pub const MTC_LESS_THAN_THRESHOLD: i32 = 1;
pub const MTC_THRESHOLD: i32 = 10;

/// First byte value that encodes a literal distance.
pub const MTC_SKIPS: usize = 94;

const MAXPIECES_MTC: usize = 8;

/// Run lengths of the skip tokens 0..94.
pub const MTC_SKIP: [u32; MTC_SKIPS] = [
    1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25,
    26, 27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47, 48,
    49, 50, 100, 150, 200, 250, 300, 350, 400, 450, 500, 550, 600, 650, 700, 750, 800, 850, 900,
    950, 1000, 2000, 3000, 4000, 5000, 6000, 7000, 8000, 9000, 10000, 20000, 30000, 40000, 50000,
    60000, 70000, 800000, 90000, 100000, 300000, 1000000, 3000000, 10000000, 30000000, 100000000,
    1000000000,
];

pub fn runlength_mtc(byte: u8) -> u32 {
    if (byte as usize) < MTC_SKIPS {
        MTC_SKIP[byte as usize]
    } else {
        1
    }
}

/// Distance in plies carried by a literal byte.
pub fn mtc_decode(byte: u8) -> i32 {
    2 * (byte as i32 - MTC_SKIPS as i32)
}

pub(crate) struct MtcCodec;

impl Codec for MtcCodec {
    const DB_TYPE: DbType = DbType::MtcRunlen;
    const DATA_EXT: &'static str = "cpr_mtc";
    const INDEX_EXT: &'static str = "idx_mtc";
    const FILE_BLOCKSIZE: u32 = 4096;
    const BLOCK_MULT: u32 = 1;
    const SAME_PIECES_ONE_FILE: u32 = 4;
    const MIN_AUTOLOAD_PIECES: u32 = 0;
    const HASHED_CACHE: bool = false;

    fn parse_base_tail(tail: &str) -> Result<BaseTail, ParseIdxError> {
        runlen::RunlenWld::parse_base_tail(tail)
    }

    fn parse_block_line(line: &str) -> Result<BlockLine, ParseIdxError> {
        runlen::RunlenWld::parse_block_line(line)
    }

    fn parse_single_value(c: char) -> Option<Value> {
        // The whole subslice converts within the threshold.  MTC values
        // share the lookup integer space, so the marker is stored through
        // the same enum (MTC_LESS_THAN_THRESHOLD == 1).
        match c {
            '<' => Some(Value::from_i32(MTC_LESS_THAN_THRESHOLD)),
            _ => None,
        }
    }

    fn push_extra(_subdb: &mut Subdb, _extra: LineExtra) {}

    fn scan_block(
        _subdb: &Subdb,
        _data: &[u8],
        _start_m: usize,
        _rel_block: usize,
        _end_subi: usize,
        _out: &mut dyn FnMut(usize, SubIndex),
    ) {
        // MTC blocks carry no sub-indices.
    }

    fn decode(_subdb: &Subdb, _tail: &[u8], _start: SubIndex, _target: u32, _rel: usize) -> Value {
        unreachable!("MTC lookups scan whole blocks");
    }
}

struct MtcFile {
    fp: Option<File>,
}

pub struct MtcDriver {
    dir: PathBuf,
    dbpieces: u32,
    catalog: Catalog,
    runtime: Vec<MtcFile>,
    cache: Mutex<BlockCache>,
    stats: Stats,
}

impl MtcDriver {
    pub fn open(options: &str, cache_mb: u64, dir: &Path) -> Result<Self, OpenError> {
        let opts = super::driver::OpenOptions::parse(options)?;
        if !dir.is_dir() {
            return Err(OpenError::OpenFailed(dir.to_path_buf()));
        }
        let dbpieces = opts.maxpieces.min(MAXPIECES_MTC as u32);

        let mut catalog = Catalog::new();
        catalog.files = build_file_table::<MtcCodec>(dbpieces, None);
        for fi in 0..catalog.files.len() {
            if catalog.files[fi].pieces > dbpieces {
                continue;
            }
            parse_index_file::<MtcCodec>(dir, fi, &mut catalog)?;
        }

        let mut runtime = Vec::with_capacity(catalog.files.len());
        for f in &catalog.files {
            if !f.is_present || f.pieces > dbpieces {
                runtime.push(MtcFile { fp: None });
                continue;
            }
            let path = dir.join(format!("{}.{}", f.name, MtcCodec::DATA_EXT));
            let fp = platform::open_file(&path).map_err(|_| OpenError::OpenFailed(path))?;
            runtime.push(MtcFile { fp: Some(fp) });
        }

        let needed: u64 = catalog
            .files
            .iter()
            .filter(|f| f.is_present)
            .map(|f| f.num_cacheblocks as u64)
            .sum();
        let block = MtcCodec::CACHE_BLOCKSIZE as u64;
        let cacheblocks = ((cache_mb << 20) / (block + 512)).min(needed).max(needed.min(16));

        let file_blocks: Vec<u32> = catalog
            .files
            .iter()
            .map(|f| if f.is_present { f.num_cacheblocks } else { 0 })
            .collect();
        let cache =
            BlockCache::new(cacheblocks as usize, block as usize, &file_blocks, false);

        Ok(MtcDriver {
            dir: dir.to_path_buf(),
            dbpieces,
            catalog,
            runtime,
            cache: Mutex::new(cache),
            stats: Stats::default(),
        })
    }

    pub fn db_type(&self) -> DbType {
        DbType::MtcRunlen
    }

    pub fn max_pieces(&self) -> u32 {
        self.dbpieces
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    /// Moves-to-conversion of `pos`, in plies, or
    /// `MTC_LESS_THAN_THRESHOLD` when the position converts quickly (or is
    /// simply not covered — MTC is a best-effort database).
    pub fn lookup(&self, pos: &Position, color: Color, conditional: bool) -> i32 {
        self.stats.db_requests.fetch_add(1, Ordering::Relaxed);

        let mut slice = Slice::of(pos);
        if slice.nb() == 0
            || slice.nw() == 0
            || slice.npieces() > MAXPIECES_MTC
            || slice.nb() > MAX_PIECE
            || slice.nw() > MAX_PIECE
        {
            self.stats.db_returns.fetch_add(1, Ordering::Relaxed);
            return MTC_LESS_THAN_THRESHOLD;
        }

        let mut pos = *pos;
        let mut color = color;
        if slice.needs_reversal() {
            pos = pos.reverse();
            color = color.opposite();
            slice = slice.reversed();
        }

        let index64 = position_to_index(&pos, &slice);
        let subslice = (index64 / MAX_SUBSLICE_INDICES) as usize;
        let index = (index64 % MAX_SUBSLICE_INDICES) as u32;

        let Some(si) = self.catalog.subdb_of(&slice, color, subslice) else {
            self.stats.db_not_present_requests.fetch_add(1, Ordering::Relaxed);
            return MTC_LESS_THAN_THRESHOLD;
        };
        let subdb = &self.catalog.subdbs[si];

        if let Some(v) = subdb.single_value {
            self.stats.db_returns.fetch_add(1, Ordering::Relaxed);
            return v.to_i32();
        }
        if subdb.indices.is_empty() {
            self.stats.db_not_present_requests.fetch_add(1, Ordering::Relaxed);
            return MTC_LESS_THAN_THRESHOLD;
        }

        let idx_blocknum = find_block_from(0, subdb.num_idx_blocks as usize, &subdb.indices, index);
        let blocknum = subdb.first_idx_block + idx_blocknum as u32;

        let mut cache = self.cache.lock().unwrap();
        let ccbi = match cache.lookup(subdb.file, blocknum) {
            Some(ccbi) => {
                self.stats.lru_cache_hits.fetch_add(1, Ordering::Relaxed);
                cache.update_lru(ccbi);
                ccbi
            }
            None => {
                if conditional {
                    // The MTC driver has no in-band cache-miss sentinel;
                    // a miss reads as a short conversion.
                    return MTC_LESS_THAN_THRESHOLD;
                }
                self.stats.lru_cache_loads.fetch_add(1, Ordering::Relaxed);
                let ccbi = cache.take_victim(subdb.file, blocknum);
                let fp = self.runtime[subdb.file].fp.as_ref().expect("mtc file handle");
                let block_bytes = MtcCodec::CACHE_BLOCKSIZE as u64;
                let read = platform::pread(
                    fp,
                    blocknum as u64 * block_bytes,
                    &mut cache.block_mut(ccbi).data,
                );
                if let Err(e) = read {
                    warn!("read of mtc block {} failed: {}", blocknum, e);
                    cache.finish_load(ccbi);
                    return MTC_LESS_THAN_THRESHOLD;
                }
                cache.finish_load(ccbi);
                ccbi
            }
        };

        let data = &cache.block(ccbi).data;
        let blocksize = MtcCodec::CACHE_BLOCKSIZE as usize;

        // Scan from the nearer end of the block.
        let reverse_search = idx_blocknum + 1 < subdb.num_idx_blocks as usize
            && subdb.indices[idx_blocknum + 1] - index < index - subdb.indices[idx_blocknum];

        let byte = if reverse_search {
            let mut n = subdb.indices[idx_blocknum + 1];
            let mut i = blocksize as isize - 1;
            while n > index && i >= 0 {
                n -= runlength_mtc(data[i as usize]);
                i -= 1;
            }
            i += 1;
            if i >= blocksize as isize {
                warn!("mtc reverse scan left the block");
                self.stats.db_returns.fetch_add(1, Ordering::Relaxed);
                return MTC_LESS_THAN_THRESHOLD;
            }
            data[i as usize]
        } else {
            let mut n = subdb.indices[idx_blocknum];
            let mut i = if idx_blocknum == 0 { subdb.startbyte as usize } else { 0 };
            loop {
                if i >= blocksize {
                    warn!("mtc forward scan left the block");
                    self.stats.db_returns.fetch_add(1, Ordering::Relaxed);
                    return MTC_LESS_THAN_THRESHOLD;
                }
                let r = runlength_mtc(data[i]);
                if n + r > index {
                    break;
                }
                n += r;
                i += 1;
            }
            data[i]
        };

        self.stats.db_returns.fetch_add(1, Ordering::Relaxed);
        if (byte as usize) < MTC_SKIPS {
            MTC_LESS_THAN_THRESHOLD
        } else {
            mtc_decode(byte)
        }
    }

    pub fn reset_stats(&self) {
        self.stats.db_requests.store(0, Ordering::Relaxed);
        self.stats.db_returns.store(0, Ordering::Relaxed);
        self.stats.db_not_present_requests.store(0, Ordering::Relaxed);
        self.stats.lru_cache_hits.store(0, Ordering::Relaxed);
        self.stats.lru_cache_loads.store(0, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            lru_cache_hits: self.stats.lru_cache_hits.load(Ordering::Relaxed),
            lru_cache_loads: self.stats.lru_cache_loads.load(Ordering::Relaxed),
            autoload_hits: 0,
            db_requests: self.stats.db_requests.load(Ordering::Relaxed),
            db_returns: self.stats.db_returns.load(Ordering::Relaxed),
            db_not_present_requests: self.stats.db_not_present_requests.load(Ordering::Relaxed),
            avg_ht_list_length: 0.0,
        }
    }
}
