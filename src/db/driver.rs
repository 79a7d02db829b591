//! # Generic WLD Driver
//!
//! One driver serves all four WLD formats; the codec type parameter
//! supplies the index grammar, the mini-block scanner, and the decoder.
//! The driver owns the slice catalog (immutable after open), the open file
//! handles, the autoload buffers, and the LRU block cache behind a single
//! mutex.  Lookups on autoloaded files never take the lock.

use super::cache::BlockCache;
use super::catalog::{autoload_order, build_file_table, parse_index_file, Catalog};
use super::identify::file_crc_table;
use super::*;
use crate::engine::{Color, Position};
use crate::indexing::{
    position_to_index, Slice, MAX_PIECE, MAX_PIECES, MAX_SUBSLICE_INDICES,
};
use crate::platform;
use log::{info, warn};
use std::fs::File;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

const ONE_MB: u64 = 1 << 20;
const MIN_CACHE_BUF_BYTES: u64 = 10 * ONE_MB;
const MIN_AUTOLOAD_RATIO: f64 = 0.18;
const MAX_AUTOLOAD_RATIO: f64 = 0.35;

/// Lookup counters.  The hot-path ones are updated while holding the cache
/// lock; the rest are relaxed atomics.
#[derive(Default)]
pub(crate) struct Stats {
    pub lru_cache_hits: AtomicU64,
    pub lru_cache_loads: AtomicU64,
    pub autoload_hits: AtomicU64,
    pub db_requests: AtomicU64,
    pub db_returns: AtomicU64,
    pub db_not_present_requests: AtomicU64,
}

/// A snapshot of the counters, as handed to callers.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StatsSnapshot {
    pub lru_cache_hits: u64,
    pub lru_cache_loads: u64,
    pub autoload_hits: u64,
    pub db_requests: u64,
    pub db_returns: u64,
    pub db_not_present_requests: u64,
    pub avg_ht_list_length: f32,
}

/// Piece-count capabilities of an open driver.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Pieces {
    pub max_pieces: u32,
    pub max_pieces_1side: u32,
    pub max_9pc_kings: u32,
    pub max_8pc_kings_1side: u32,
}

/// Messages used by `verify` reports, so callers control the wording.
#[derive(Clone, Debug)]
pub struct VerifyMsgs {
    pub crc_failed: String,
    pub ok: String,
    pub errors: String,
    pub no_errors: String,
}

impl Default for VerifyMsgs {
    fn default() -> Self {
        VerifyMsgs {
            crc_failed: "crc failed".into(),
            ok: "ok".into(),
            errors: "errors".into(),
            no_errors: "no errors".into(),
        }
    }
}

struct FileRuntime {
    fp: Option<File>,
    file_cache: Option<Vec<u8>>,
}

pub struct WldDriver<C: Codec> {
    dir: PathBuf,
    dbpieces: u32,
    catalog: Catalog,
    runtime: Vec<FileRuntime>,
    cache: Mutex<BlockCache>,
    stats: Stats,
    _codec: PhantomData<C>,
}

/// Options recognized by `open`: `maxpieces`, `maxkings_1side_8pcs`,
/// `autoload` (0/1 overrides the RAM-budget policy).
pub(crate) struct OpenOptions {
    pub maxpieces: u32,
    pub kings_1side_8pcs: Option<u32>,
    pub autoload: Option<bool>,
}

impl OpenOptions {
    pub fn parse(options: &str) -> Result<Self, OpenError> {
        let map = parse_options(options);
        let get_u32 = |key: &str| -> Result<Option<u32>, OpenError> {
            map.get(key)
                .map(|v| v.parse().map_err(|_| OpenError::BadOption(key.into(), v.clone())))
                .transpose()
        };
        Ok(OpenOptions {
            maxpieces: get_u32("maxpieces")?.unwrap_or(MAX_PIECES as u32),
            kings_1side_8pcs: get_u32("maxkings_1side_8pcs")?,
            autoload: get_u32("autoload")?.map(|v| v != 0),
        })
    }
}

impl<C: Codec> WldDriver<C> {
    pub fn open(options: &str, cache_mb: u64, dir: &Path) -> Result<Self, OpenError> {
        let opts = OpenOptions::parse(options)?;
        Self::open_with(opts, cache_mb, dir)
    }

    pub(crate) fn open_with(
        opts: OpenOptions,
        cache_mb: u64,
        dir: &Path,
    ) -> Result<Self, OpenError> {
        if !dir.is_dir() {
            return Err(OpenError::OpenFailed(dir.to_path_buf()));
        }
        let dbpieces = opts.maxpieces.min(MAX_PIECES as u32);

        let mut catalog = Catalog::new();
        catalog.files = build_file_table::<C>(dbpieces, opts.kings_1side_8pcs);
        for fi in 0..catalog.files.len() {
            if catalog.files[fi].pieces > dbpieces {
                continue;
            }
            parse_index_file::<C>(dir, fi, &mut catalog)?;
        }

        // Rough accounting of what the catalog itself costs, so the cache
        // budget is taken from what remains.
        let allocated: u64 = catalog
            .subdbs
            .iter()
            .map(|s| 4 * s.indices.len() as u64 + 64)
            .sum::<u64>()
            + catalog.files.len() as u64 * 64;

        let total_dbsize: u64 = catalog
            .files
            .iter()
            .filter(|f| f.is_present)
            .map(|f| f.num_cacheblocks as u64 * C::CACHE_BLOCKSIZE as u64)
            .sum();

        // Autoload budget: bracketed ratios of the cache RAM left over,
        // interpolated linearly between 15 MB and 1 GB.
        let cache_mb_avail = cache_mb.saturating_sub(allocated / ONE_MB);
        let max_autoload_mb = if total_dbsize / ONE_MB <= cache_mb_avail + 20 {
            1 + total_dbsize / ONE_MB
        } else if cache_mb_avail < 15 {
            (15.0 * MIN_AUTOLOAD_RATIO) as u64
        } else if cache_mb_avail > 1000 {
            (cache_mb_avail as f64 * MAX_AUTOLOAD_RATIO) as u64
        } else {
            (cache_mb_avail as f64
                * (MIN_AUTOLOAD_RATIO
                    + cache_mb_avail as f64 * (MAX_AUTOLOAD_RATIO - MIN_AUTOLOAD_RATIO) / 1000.0))
                as u64
        };

        let order = autoload_order::<C>(&catalog, dbpieces);
        let mut cum_blocks: u64 = 0;
        for &fi in &order {
            if !catalog.files[fi].is_present || catalog.files[fi].autoload {
                continue;
            }
            cum_blocks += catalog.files[fi].num_cacheblocks as u64;
            let within_budget =
                cum_blocks * C::CACHE_BLOCKSIZE as u64 / ONE_MB <= max_autoload_mb;
            let on = match opts.autoload {
                Some(forced) => forced,
                None => catalog.files[fi].pieces <= C::MIN_AUTOLOAD_PIECES || within_budget,
            };
            if on {
                catalog.files[fi].autoload = true;
                info!("autoload {}", catalog.files[fi].name);
            }
        }

        // Open data files; slurp the autoloaded ones.
        let mut runtime = Vec::with_capacity(catalog.files.len());
        for fi in 0..catalog.files.len() {
            let f = &catalog.files[fi];
            if !f.is_present || f.pieces > dbpieces {
                runtime.push(FileRuntime { fp: None, file_cache: None });
                continue;
            }
            let path = super::catalog::data_path::<C>(dir, &f.name);
            let fp = platform::open_file(&path).map_err(|_| OpenError::OpenFailed(path))?;
            if f.autoload {
                let data = platform::read_padded(&fp, C::CACHE_BLOCKSIZE as usize)?;
                runtime.push(FileRuntime { fp: None, file_cache: Some(data) });
            } else {
                runtime.push(FileRuntime { fp: Some(fp), file_cache: None });
            }
        }

        // Sub-indices for every autoloaded subdb, built once.
        for si in 0..catalog.subdbs.len() {
            let subdb = &catalog.subdbs[si];
            if subdb.single_value.is_some() || subdb.indices.is_empty() {
                continue;
            }
            let Some(data) = runtime[subdb.file].file_cache.as_deref() else {
                continue;
            };
            let mut arr = vec![SubIndex::default(); subdb.num_subindices()];
            let bsz = C::CACHE_BLOCKSIZE as usize;
            for rel in 0..subdb.num_idx_blocks as usize {
                let base = (subdb.first_idx_block as usize + rel) * bsz;
                let block = &data[base..base + bsz];
                let start_m = if rel == 0 { subdb.startbyte as usize } else { 0 };
                let end_subi = if rel + 1 < subdb.num_idx_blocks as usize {
                    NUM_SUBINDICES - 1
                } else {
                    subdb.last_subidx_block as usize
                };
                let out_base = rel * NUM_SUBINDICES;
                C::scan_block(subdb, block, start_m, rel, end_subi, &mut |subi, e| {
                    arr[out_base + subi] = e;
                });
            }
            catalog.subdbs[si].autoload_subindices = arr;
        }

        // Size the LRU cache from what RAM is left.
        let needed: u64 = catalog
            .files
            .iter()
            .filter(|f| f.is_present && !f.autoload && f.pieces <= dbpieces)
            .map(|f| f.num_cacheblocks as u64)
            .sum();
        let per_block = C::CACHE_BLOCKSIZE as u64 + std::mem::size_of::<SubIndex>() as u64 * 64 + 64;
        let cacheblocks = if needed == 0 {
            0
        } else if allocated + MIN_CACHE_BUF_BYTES >= cache_mb * ONE_MB {
            let n = (MIN_CACHE_BUF_BYTES / C::CACHE_BLOCKSIZE as u64).min(needed);
            info!("allocating the minimum {} cache buffers", n);
            n
        } else {
            ((cache_mb * ONE_MB - allocated) / per_block).min(needed)
        } as usize;
        if cacheblocks > 0 {
            info!("allocating {} cache buffers of size {}", cacheblocks, C::CACHE_BLOCKSIZE);
        }

        let file_blocks: Vec<u32> = catalog
            .files
            .iter()
            .map(|f| if f.is_present && !f.autoload { f.num_cacheblocks } else { 0 })
            .collect();
        let cache = BlockCache::new(
            cacheblocks,
            C::CACHE_BLOCKSIZE as usize,
            &file_blocks,
            C::HASHED_CACHE,
        );

        let driver = WldDriver {
            dir: dir.to_path_buf(),
            dbpieces,
            catalog,
            runtime,
            cache: Mutex::new(cache),
            stats: Stats::default(),
            _codec: PhantomData,
        };
        // autoload=0 turns off all open-time residency warming.
        if opts.autoload != Some(false) {
            driver.preload(&order);
        }
        Ok(driver)
    }

    /// Warm the cache with the most valuable non-autoloaded files.
    fn preload(&self, order: &[usize]) {
        let mut cache = self.cache.lock().unwrap();
        let capacity = cache.num_blocks();
        if capacity == 0 {
            return;
        }
        let mut count = 0usize;
        for &fi in order {
            let f = &self.catalog.files[fi];
            if !f.is_present || f.autoload {
                continue;
            }
            info!("preload {}", f.name);
            for block in 0..f.num_cacheblocks {
                if count >= capacity {
                    return;
                }
                if cache.lookup(fi, block).is_some() {
                    continue;
                }
                let Some(si) = self.catalog.find_first_subdb(fi, block) else {
                    continue;
                };
                if self.load_block_locked(&mut cache, si, fi, block).is_ok() {
                    count += 1;
                }
            }
        }
    }

    /// Read a block into the LRU victim and rebuild the sub-indices of
    /// every subdb with data in it.  Caller holds the cache lock.
    fn load_block_locked(
        &self,
        cache: &mut BlockCache,
        si: usize,
        filenum: usize,
        blocknum: u32,
    ) -> std::io::Result<usize> {
        self.stats.lru_cache_loads.fetch_add(1, Ordering::Relaxed);
        let ccbi = cache.take_victim(filenum, blocknum);
        {
            let fp = self.runtime[filenum].fp.as_ref().expect("cached file has no handle");
            let ccb = cache.block_mut(ccbi);
            platform::pread(fp, blocknum as u64 * C::CACHE_BLOCKSIZE as u64, &mut ccb.data)?;
        }

        // Walk back to the first subdb with data in this block.
        let mut si = si;
        while self.catalog.subdbs[si].first_idx_block == blocknum
            && self.catalog.subdbs[si].startbyte > 0
        {
            match self.catalog.subdbs[si].prev {
                Some(p) => si = p,
                None => break,
            }
        }

        let mut subind = cache.block(ccbi).subindices;
        let mut node = Some(si);
        while let Some(i) = node {
            let subdb = &self.catalog.subdbs[i];
            let (start_m, rel) = if subdb.first_idx_block == blocknum {
                (subdb.startbyte as usize, 0usize)
            } else {
                (0, (blocknum - subdb.first_idx_block) as usize)
            };
            let end_subi = if subdb.first_idx_block + subdb.num_idx_blocks - 1 > blocknum {
                NUM_SUBINDICES - 1
            } else {
                subdb.last_subidx_block as usize
            };
            C::scan_block(
                subdb,
                &cache.block(ccbi).data,
                start_m,
                rel,
                end_subi,
                &mut |subi, e| subind[subi] = e,
            );
            node = subdb.next.filter(|&n| self.catalog.subdbs[n].first_idx_block == blocknum);
        }
        cache.block_mut(ccbi).subindices = subind;
        cache.finish_load(ccbi);
        Ok(ccbi)
    }

    pub fn db_type(&self) -> DbType {
        C::DB_TYPE
    }

    pub fn max_pieces(&self) -> u32 {
        self.dbpieces
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    /// The main query: value of `pos` with `color` to move.  When
    /// `conditional` is set, a lookup that would have to read from disk
    /// returns `NotInCache` instead.
    pub fn lookup(&self, pos: &Position, color: Color, conditional: bool) -> Value {
        self.stats.db_requests.fetch_add(1, Ordering::Relaxed);

        let mut slice = Slice::of(pos);
        if slice.nb() == 0 {
            self.stats.db_returns.fetch_add(1, Ordering::Relaxed);
            return if color == Color::Black { Value::Loss } else { Value::Win };
        }
        if slice.nw() == 0 {
            self.stats.db_returns.fetch_add(1, Ordering::Relaxed);
            return if color == Color::White { Value::Loss } else { Value::Win };
        }
        if slice.npieces() > MAX_PIECES || slice.nb() > MAX_PIECE || slice.nw() > MAX_PIECE {
            self.stats.db_not_present_requests.fetch_add(1, Ordering::Relaxed);
            return Value::SubdbUnavailable;
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
            // If the other side-to-move is present the position itself is
            // simply not stored; otherwise the whole slice is absent.
            return if self.catalog.subdb_of(&slice, color.opposite(), subslice).is_some() {
                Value::Unknown
            } else {
                Value::SubdbUnavailable
            };
        };
        let subdb = &self.catalog.subdbs[si];

        if let Some(v) = subdb.single_value {
            self.stats.db_returns.fetch_add(1, Ordering::Relaxed);
            return v;
        }
        if subdb.indices.is_empty() {
            self.stats.db_not_present_requests.fetch_add(1, Ordering::Relaxed);
            return Value::SubdbUnavailable;
        }

        let value = if let Some(data) = self.runtime[subdb.file].file_cache.as_deref() {
            self.stats.autoload_hits.fetch_add(1, Ordering::Relaxed);
            self.lookup_autoload(subdb, data, index)
        } else {
            match self.lookup_cached(si, subdb, index, conditional) {
                Some(v) => v,
                None => return Value::NotInCache,
            }
        };
        self.stats.db_returns.fetch_add(1, Ordering::Relaxed);
        value
    }

    fn lookup_autoload(&self, subdb: &Subdb, data: &[u8], index: u32) -> Value {
        let indices = &subdb.autoload_subindices;
        let subidx = find_block_subidx(
            subdb.first_subidx_block as usize,
            subdb.num_subindices(),
            indices,
            index,
        );
        let start = if subidx == subdb.first_subidx_block as usize {
            let skew = subdb.startbyte as usize - subidx * SUBINDEX_BLOCKSIZE;
            C::subdb_start_state(subdb, skew)
        } else {
            indices[subidx]
        };
        let base = subdb.first_idx_block as usize * C::CACHE_BLOCKSIZE as usize
            + subidx * SUBINDEX_BLOCKSIZE;
        let rel_block = subidx / NUM_SUBINDICES;
        C::decode(subdb, &data[base..], start, index, rel_block)
    }

    fn lookup_cached(
        &self,
        si: usize,
        subdb: &Subdb,
        index: u32,
        conditional: bool,
    ) -> Option<Value> {
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
                    return None;
                }
                match self.load_block_locked(&mut cache, si, subdb.file, blocknum) {
                    Ok(ccbi) => ccbi,
                    Err(e) => {
                        warn!("read of block {} failed: {}", blocknum, e);
                        return Some(Value::Unknown);
                    }
                }
            }
        };

        // Find the covering mini-block.  The first mini-block of a subdb
        // stores the *previous* subdb's index, so it cannot take part in
        // the binary search; index 0 is implied there.
        let ccb = cache.block(ccbi);
        let first_subidx = subdb.first_subidx_block as usize;
        let (subidx, start) = if idx_blocknum == 0
            && (subdb.single_subidx_block
                || first_subidx == NUM_SUBINDICES - 1
                || ccb.subindices[first_subidx + 1].index > index)
        {
            let skew = subdb.startbyte as usize - first_subidx * SUBINDEX_BLOCKSIZE;
            (first_subidx, C::subdb_start_state(subdb, skew))
        } else {
            let first = if idx_blocknum == 0 { first_subidx + 1 } else { 0 };
            let last = if idx_blocknum + 1 == subdb.num_idx_blocks as usize {
                subdb.last_subidx_block as usize + 1
            } else {
                NUM_SUBINDICES
            };
            let subidx = find_block_subidx(first, last, &ccb.subindices, index);
            (subidx, ccb.subindices[subidx])
        };
        let tail = &ccb.data[subidx * SUBINDEX_BLOCKSIZE..];
        Some(C::decode(subdb, tail, start, index, idx_blocknum))
    }

    pub fn reset_stats(&self) {
        self.stats.lru_cache_hits.store(0, Ordering::Relaxed);
        self.stats.lru_cache_loads.store(0, Ordering::Relaxed);
        self.stats.autoload_hits.store(0, Ordering::Relaxed);
        self.stats.db_requests.store(0, Ordering::Relaxed);
        self.stats.db_returns.store(0, Ordering::Relaxed);
        self.stats.db_not_present_requests.store(0, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            lru_cache_hits: self.stats.lru_cache_hits.load(Ordering::Relaxed),
            lru_cache_loads: self.stats.lru_cache_loads.load(Ordering::Relaxed),
            autoload_hits: self.stats.autoload_hits.load(Ordering::Relaxed),
            db_requests: self.stats.db_requests.load(Ordering::Relaxed),
            db_returns: self.stats.db_returns.load(Ordering::Relaxed),
            db_not_present_requests: self.stats.db_not_present_requests.load(Ordering::Relaxed),
            avg_ht_list_length: self.cache.lock().unwrap().avg_probe_length(),
        }
    }

    /// Piece-count capabilities, probed from the catalog the way callers
    /// probe a database they did not build.
    pub fn get_pieces(&self) -> Pieces {
        let mut out = Pieces::default();
        for f in &self.catalog.files {
            if !f.is_present {
                continue;
            }
            out.max_pieces = out.max_pieces.max(f.pieces);
            out.max_pieces_1side = out.max_pieces_1side.max(f.max_pieces_1side);
        }
        let have = |s: Slice| {
            self.catalog.subdb_of(&s, Color::Black, 0).is_some()
                || self.catalog.subdb_of(&s, Color::White, 0).is_some()
        };
        if out.max_pieces >= 9
            && (have(Slice::new(4, 1, 4, 0)) || have(Slice::new(5, 0, 3, 1)))
        {
            out.max_9pc_kings = 1;
        }
        if out.max_pieces >= 8 {
            out.max_8pc_kings_1side = if have(Slice::new(0, 5, 3, 0)) {
                5
            } else if have(Slice::new(0, 4, 4, 0)) {
                4
            } else if have(Slice::new(1, 3, 4, 0)) {
                3
            } else if have(Slice::new(2, 2, 4, 0)) {
                2
            } else if have(Slice::new(3, 1, 4, 0)) {
                1
            } else {
                0
            };
        }
        out
    }

    /// CRC-check every present file that appears in the format's manifest.
    /// Returns the number of mismatches.
    pub fn verify(
        &self,
        msg_fn: &mut dyn FnMut(&str),
        abort: &AtomicBool,
        msgs: &VerifyMsgs,
    ) -> u32 {
        let manifest = file_crc_table(C::DB_TYPE);
        let mut error_count = 0;
        for f in &self.catalog.files {
            if !f.is_present || f.pieces > self.dbpieces {
                continue;
            }
            for ext in [C::INDEX_EXT, C::DATA_EXT] {
                if abort.load(Ordering::Relaxed) {
                    return error_count;
                }
                let name = format!("{}.{}", f.name, ext);
                let Some(expect) = manifest.get(name.as_str()) else {
                    continue;
                };
                let path = self.dir.join(&name);
                let Ok(bytes) = std::fs::read(&path) else {
                    continue;
                };
                let crc = crc::crc32::checksum_ieee(&bytes);
                msg_fn(&format!("{}  ", path.display()));
                if crc != *expect {
                    msg_fn(&format!("{}\n", msgs.crc_failed));
                    error_count += 1;
                } else {
                    msg_fn(&format!("{}\n", msgs.ok));
                }
            }
        }
        if error_count > 0 {
            msg_fn(&format!("{} {}\n", error_count, msgs.errors));
        } else {
            msg_fn(&format!("{}\n", msgs.no_errors));
        }
        error_count
    }
}
