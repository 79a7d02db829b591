//! # DTW Driver
//!
//! Distance-to-win databases compress each subslice with Re-Pair over a
//! canonical Huffman code.  The `.idx_dtw` file is binary: per subslice it
//! carries the Re-Pair grammar, the Huffman code lengths, the block
//! geometry, and a packed 17-bit array of per-mini-block position counts.
//! Mini-blocks are 512 bytes and each is an independent bit stream of
//! 32-bit little-endian words, codes left-justified.
//!
//! A decoded symbol expands through the grammar down to a terminal, whose
//! number *is* the depth (in half plies; callers double it and add one for
//! wins).  The returned value can also be the `SubdbUnavailable` or
//! `NotInCache` sentinels.
//!
//! The mini-block length table is kept in RAM so lookups never touch the
//! index file after open.

use super::cache::BlockCache;
use super::catalog::{build_file_table_with, dboffset, DbpEntry, DBSIZE};
use super::driver::{OpenOptions, Stats, StatsSnapshot};
use super::{DbType, OpenError, Value};
use crate::engine::{Color, Position};
use crate::indexing::{num_subslices, position_to_index, Slice, DTW_SUBSLICE_INDICES, MAX_PIECE};
use crate::platform;
use binrw::{BinRead, BinReaderExt};
use log::{info, warn};
use std::fs::File;
use std::io::{Cursor, Seek};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Mutex;

pub const CACHE_BLOCKSIZE: usize = 4096;
pub const MINIBLOCK_SIZE: usize = 512;
pub const MINIS_PER_BLOCK: usize = CACHE_BLOCKSIZE / MINIBLOCK_SIZE;
const MINIBLOCK_PACKED_BITLENGTH: usize = 17;

const MAXPIECES_DTW: u32 = 7;
const SAME_PIECES_ONE_FILE: u32 = 5;

/// Terminal rules store this sentinel as their left child.
pub const UNDEFINED_CODE: u16 = 0x7fff;

#[derive(BinRead, Clone, Copy, Debug, PartialEq, Eq)]
#[br(little)]
pub struct RepairRule {
    pub left: u16,
    pub right: u16,
}

#[derive(BinRead, Clone, Copy, Debug)]
#[br(little)]
struct HuffcodeRaw {
    value: u16,
    length: u8,
}

#[derive(BinRead, Debug)]
#[br(little)]
struct SubdbHeader {
    npieces: u8,
    nbm: u8,
    nbk: u8,
    nwm: u8,
    nwk: u8,
    color: u8,
    subslice_num: u16,
    #[allow(dead_code)]
    permutation: u8,
    n_repair_syms: u16,
    #[br(count = n_repair_syms)]
    repair_syms: Vec<RepairRule>,
    n_huffcodes: u16,
    #[br(count = n_huffcodes)]
    huffcodes: Vec<HuffcodeRaw>,
    first_idx_block: u32,
    first_miniblock: u16,
    num_idx_blocks: u32,
    n_miniblocks: u32,
    #[br(count = (n_miniblocks as u64 * MINIBLOCK_PACKED_BITLENGTH as u64).div_ceil(8))]
    miniblock_lengths: Vec<u8>,
}

/// A Huffman code entry: left-justified 32-bit code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Huffcode {
    pub value: u16,
    pub codelength: u8,
    pub huffcode: u32,
}

/// One row per code length, ordered shortest code first (highest base), so
/// the decoder can find a code's length with a short linear scan.
#[derive(Clone, Copy, Debug)]
pub struct LengthTable {
    pub codelength: u8,
    pub codetable_index: u16,
    pub huffcode: u32,
}

/// Assign canonical codes from `(value, codelength)` pairs.  Codes are
/// handed out longest-first from the bottom of the 32-bit code space, each
/// group aligned to its code size, so shorter codes end up numerically
/// higher when left-justified.  The table is reordered in place to
/// (codelength descending, value ascending), which is the symbol order the
/// decoder indexes into.
pub fn generate_codes(codes: &mut Vec<Huffcode>) {
    codes.sort_by(|a, b| b.codelength.cmp(&a.codelength).then(a.value.cmp(&b.value)));
    let mut next: u64 = 0;
    for c in codes.iter_mut() {
        let step = 1u64 << (32 - c.codelength as u64);
        next = next.div_ceil(step) * step;
        c.huffcode = next as u32;
        next += step;
    }
}

pub fn build_length_table(codes: &[Huffcode]) -> Vec<LengthTable> {
    let mut table: Vec<LengthTable> = Vec::new();
    for (i, c) in codes.iter().enumerate() {
        match table.last_mut() {
            Some(last) if last.codelength == c.codelength => {}
            _ => table.push(LengthTable {
                codelength: c.codelength,
                codetable_index: i as u16,
                huffcode: c.huffcode,
            }),
        }
    }
    // Shortest codes have the highest left-justified values; scan order
    // wants them first.
    table.reverse();
    table
}

/// Expansion length of every grammar symbol: 1 for terminals, else the sum
/// of the children.  A nonterminal's children always have lower symbol
/// numbers, so one bottom-up pass suffices (and a corrupt grammar cannot
/// recurse).
pub fn get_symbol_lengths(rules: &[RepairRule]) -> Vec<u16> {
    let mut lengths = vec![0u16; rules.len()];
    for sym in 0..rules.len() {
        let rule = rules[sym];
        lengths[sym] = if rule.left == UNDEFINED_CODE
            || rule.left as usize >= sym
            || rule.right as usize >= sym
        {
            1
        } else {
            let l = lengths[rule.left as usize] as u32;
            let r = lengths[rule.right as usize] as u32;
            (l + r).min(u16::MAX as u32) as u16
        };
    }
    lengths
}

fn packed17(data: &[u8], i: usize) -> u32 {
    let bit = i * MINIBLOCK_PACKED_BITLENGTH;
    let base = bit / 8;
    let b = |k: usize| *data.get(base + k).unwrap_or(&0) as u64;
    let word = b(0) | b(1) << 8 | b(2) << 16 | b(3) << 24;
    (word >> (bit % 8) & 0x1ffff) as u32
}

struct DtwSubdb {
    repair_syms: Vec<RepairRule>,
    repair_lengths: Vec<u16>,
    huffcodes: Vec<Huffcode>,
    lengthtable: Vec<LengthTable>,
    indices: Vec<u32>,
    miniblock_lengths: Vec<u8>,
    n_miniblocks: u32,
    num_idx_blocks: u32,
    first_idx_block: u32,
    first_miniblock: u16,
    file: usize,
}

impl DtwSubdb {
    fn miniblock_length(&self, i: usize) -> u32 {
        packed17(&self.miniblock_lengths, i)
    }
}

/// Decode the value `target_index` positions into a mini-block.
fn decode(target_index: u32, datap: &[u8], subdb: &DtwSubdb) -> i32 {
    let words: Vec<u32> = datap[..MINIBLOCK_SIZE.min(datap.len())]
        .chunks(4)
        .map(|c| {
            let mut w = [0u8; 4];
            w[..c.len()].copy_from_slice(c);
            u32::from_le_bytes(w)
        })
        .collect();

    let mut block_index = 0;
    let mut codebuf: u64 = (words[0] as u64) << 32 | words[1] as u64;
    block_index += 2;
    let mut bits_in_codebuf = 64u32;
    let mut index = 0u32;
    let mut repair_sym;
    loop {
        if bits_in_codebuf < 32 && block_index < words.len() {
            let temp = (words[block_index] as u64) << (32 - bits_in_codebuf);
            codebuf |= temp;
            block_index += 1;
            bits_in_codebuf += 32;
        }

        let high = (codebuf >> 32) as u32;
        let mut i = 0;
        while high < subdb.lengthtable[i].huffcode {
            i += 1;
        }
        let lt = subdb.lengthtable[i];
        let symidx = ((high - lt.huffcode) >> (32 - lt.codelength as u32)) as usize
            + lt.codetable_index as usize;

        repair_sym = subdb.huffcodes[symidx].value;
        if index + subdb.repair_lengths[repair_sym as usize] as u32 > target_index {
            break;
        }
        index += subdb.repair_lengths[repair_sym as usize] as u32;
        codebuf <<= lt.codelength;
        bits_in_codebuf -= lt.codelength as u32;
    }

    // Walk the grammar down to the terminal covering the target.
    while subdb.repair_lengths[repair_sym as usize] > 1 {
        let child = subdb.repair_syms[repair_sym as usize].left;
        if index + subdb.repair_lengths[child as usize] as u32 > target_index {
            repair_sym = child;
        } else {
            index += subdb.repair_lengths[child as usize] as u32;
            repair_sym = subdb.repair_syms[repair_sym as usize].right;
        }
    }
    repair_sym as i32
}

struct DtwFile {
    fp: Option<File>,
}

pub struct DtwDriver {
    dir: PathBuf,
    dbpieces: u32,
    dbp: Vec<Option<DbpEntry>>,
    subdbs: Vec<DtwSubdb>,
    runtime: Vec<DtwFile>,
    cache: Mutex<BlockCache>,
    stats: Stats,
}

impl DtwDriver {
    pub fn open(options: &str, cache_mb: u64, dir: &Path) -> Result<Self, OpenError> {
        let opts = OpenOptions::parse(options)?;
        if !dir.is_dir() {
            return Err(OpenError::OpenFailed(dir.to_path_buf()));
        }
        let dbpieces = opts.maxpieces.min(MAXPIECES_DTW);

        let mut files = build_file_table_with(SAME_PIECES_ONE_FILE, dbpieces, None);
        let mut dbp: Vec<Option<DbpEntry>> = vec![None; DBSIZE];
        let mut subdbs: Vec<DtwSubdb> = Vec::new();

        for fi in 0..files.len() {
            if files[fi].pieces > dbpieces {
                continue;
            }
            let data_path = dir.join(format!("{}.cpr_dtw", files[fi].name));
            let filesize = match platform::file_size_of(&data_path) {
                Ok(size) => size,
                Err(_) => {
                    if files[fi].pieces > SAME_PIECES_ONE_FILE {
                        info!("{} not present", data_path.display());
                        continue;
                    }
                    return Err(OpenError::SliceMissing(data_path));
                }
            };
            files[fi].is_present = true;
            files[fi].num_cacheblocks = (filesize / CACHE_BLOCKSIZE as u64
                + u64::from(filesize % CACHE_BLOCKSIZE as u64 != 0))
                as u32;

            let idx_path = dir.join(format!("{}.idx_dtw", files[fi].name));
            let raw = std::fs::read(&idx_path)
                .map_err(|_| OpenError::OpenFailed(idx_path.clone()))?;
            let mut cursor = Cursor::new(&raw);
            let len = raw.len() as u64;
            while cursor.stream_position().map_err(OpenError::Io)? < len {
                let header: SubdbHeader = cursor.read_le().map_err(|e| {
                    OpenError::IndexFileMalformed(
                        idx_path.clone(),
                        super::ParseIdxError::BadLine(e.to_string()),
                    )
                })?;
                if header.npieces as u32
                    != header.nbm as u32 + header.nbk as u32 + header.nwm as u32 + header.nwk as u32
                {
                    return Err(OpenError::IndexFileMalformed(
                        idx_path.clone(),
                        super::ParseIdxError::BadLine("inconsistent subslice header".into()),
                    ));
                }
                let slice = Slice::new(
                    header.nbm as usize,
                    header.nbk as usize,
                    header.nwm as usize,
                    header.nwk as usize,
                );
                let color = if header.color == 0 { Color::Black } else { Color::White };
                let offset = dboffset(&slice, color);
                let n = num_subslices(&slice, DTW_SUBSLICE_INDICES);
                if dbp[offset].is_none() {
                    let first = subdbs.len();
                    subdbs.extend((0..n).map(|_| DtwSubdb {
                        repair_syms: Vec::new(),
                        repair_lengths: Vec::new(),
                        huffcodes: Vec::new(),
                        lengthtable: Vec::new(),
                        indices: Vec::new(),
                        miniblock_lengths: Vec::new(),
                        n_miniblocks: 0,
                        num_idx_blocks: 0,
                        first_idx_block: 0,
                        first_miniblock: 0,
                        file: fi,
                    }));
                    dbp[offset] = Some(DbpEntry { first, num_subslices: n });
                }
                let entry = dbp[offset].unwrap();
                if header.subslice_num as usize >= entry.num_subslices {
                    return Err(OpenError::IndexFileMalformed(
                        idx_path.clone(),
                        super::ParseIdxError::BadSubslice(header.subslice_num as usize),
                    ));
                }
                let subdb = &mut subdbs[entry.first + header.subslice_num as usize];

                subdb.file = fi;
                subdb.repair_lengths = get_symbol_lengths(&header.repair_syms);
                subdb.repair_syms = header.repair_syms;
                let mut codes: Vec<Huffcode> = header
                    .huffcodes
                    .iter()
                    .map(|h| Huffcode { value: h.value, codelength: h.length, huffcode: 0 })
                    .collect();
                generate_codes(&mut codes);
                subdb.lengthtable = build_length_table(&codes);
                subdb.huffcodes = codes;
                subdb.first_idx_block = header.first_idx_block;
                subdb.first_miniblock = header.first_miniblock;
                subdb.num_idx_blocks = header.num_idx_blocks;
                subdb.n_miniblocks = header.n_miniblocks;
                subdb.miniblock_lengths = header.miniblock_lengths;

                // Block starting indices follow from the mini-block counts.
                let mut index = 0u32;
                subdb.indices = vec![0];
                for i in 1..subdb.n_miniblocks as usize {
                    index += subdb.miniblock_length(i - 1);
                    if (i + subdb.first_miniblock as usize) % MINIS_PER_BLOCK == 0 {
                        subdb.indices.push(index);
                    }
                }
            }
            info!("{:>10} cache blocks: {}", files[fi].num_cacheblocks, idx_path.display());
        }

        let mut runtime = Vec::with_capacity(files.len());
        for f in &files {
            if !f.is_present {
                runtime.push(DtwFile { fp: None });
                continue;
            }
            let path = dir.join(format!("{}.cpr_dtw", f.name));
            let fp = platform::open_file(&path).map_err(|_| OpenError::OpenFailed(path))?;
            runtime.push(DtwFile { fp: Some(fp) });
        }

        let needed: u64 = files
            .iter()
            .filter(|f| f.is_present)
            .map(|f| f.num_cacheblocks as u64)
            .sum();
        let cacheblocks =
            ((cache_mb << 20) / (CACHE_BLOCKSIZE as u64 + 512)).min(needed).max(needed.min(16));
        let file_blocks: Vec<u32> = files
            .iter()
            .map(|f| if f.is_present { f.num_cacheblocks } else { 0 })
            .collect();
        let cache = BlockCache::new(cacheblocks as usize, CACHE_BLOCKSIZE, &file_blocks, false);

        Ok(DtwDriver {
            dir: dir.to_path_buf(),
            dbpieces,
            dbp,
            subdbs,
            runtime,
            cache: Mutex::new(cache),
            stats: Stats::default(),
        })
    }

    pub fn db_type(&self) -> DbType {
        DbType::Dtw
    }

    pub fn max_pieces(&self) -> u32 {
        self.dbpieces
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    /// Depth to win in half plies (multiply by 2, plus 1 for a win), or
    /// the `SubdbUnavailable` / `NotInCache` sentinels.
    pub fn lookup(&self, pos: &Position, color: Color, conditional: bool) -> i32 {
        self.stats.db_requests.fetch_add(1, Ordering::Relaxed);

        let mut slice = Slice::of(pos);
        if slice.nb() == 0 || slice.nw() == 0 {
            self.stats.db_returns.fetch_add(1, Ordering::Relaxed);
            return 0;
        }
        if slice.npieces() > MAXPIECES_DTW as usize
            || slice.nb() > MAX_PIECE
            || slice.nw() > MAX_PIECE
        {
            self.stats.db_not_present_requests.fetch_add(1, Ordering::Relaxed);
            return Value::SubdbUnavailable.to_i32();
        }

        let mut pos = *pos;
        let mut color = color;
        if slice.needs_reversal() {
            pos = pos.reverse();
            color = color.opposite();
            slice = slice.reversed();
        }

        let Some(entry) = self.dbp[dboffset(&slice, color)] else {
            self.stats.db_not_present_requests.fetch_add(1, Ordering::Relaxed);
            return Value::SubdbUnavailable.to_i32();
        };

        let index64 = position_to_index(&pos, &slice);
        let subslice = (index64 / DTW_SUBSLICE_INDICES) as usize;
        let index = (index64 % DTW_SUBSLICE_INDICES) as u32;
        if subslice >= entry.num_subslices {
            self.stats.db_not_present_requests.fetch_add(1, Ordering::Relaxed);
            return Value::SubdbUnavailable.to_i32();
        }
        let subdb = &self.subdbs[entry.first + subslice];
        if subdb.n_miniblocks == 0 || subdb.huffcodes.is_empty() {
            self.stats.db_not_present_requests.fetch_add(1, Ordering::Relaxed);
            return Value::SubdbUnavailable.to_i32();
        }

        let idx_blocknum =
            super::find_block_from(0, subdb.num_idx_blocks as usize, &subdb.indices, index);
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
                    return Value::NotInCache.to_i32();
                }
                self.stats.lru_cache_loads.fetch_add(1, Ordering::Relaxed);
                let ccbi = cache.take_victim(subdb.file, blocknum);
                let fp = self.runtime[subdb.file].fp.as_ref().expect("dtw file handle");
                if let Err(e) = platform::pread(
                    fp,
                    blocknum as u64 * CACHE_BLOCKSIZE as u64,
                    &mut cache.block_mut(ccbi).data,
                ) {
                    warn!("read of dtw block {} failed: {}", blocknum, e);
                    cache.finish_load(ccbi);
                    return Value::SubdbUnavailable.to_i32();
                }
                cache.finish_load(ccbi);
                ccbi
            }
        };

        // Linear scan of the packed mini-block lengths to the covering
        // mini-block.
        let first_mini_in_block = if idx_blocknum == 0 {
            subdb.first_miniblock as usize
        } else {
            MINIS_PER_BLOCK * idx_blocknum
        };
        let mut base_index = subdb.indices[idx_blocknum];
        let mut tablei = first_mini_in_block - subdb.first_miniblock as usize;
        loop {
            if tablei >= subdb.n_miniblocks as usize {
                warn!("dtw mini-block scan left the subdb");
                self.stats.db_returns.fetch_add(1, Ordering::Relaxed);
                return Value::SubdbUnavailable.to_i32();
            }
            let length = subdb.miniblock_length(tablei);
            if base_index + length > index {
                break;
            }
            base_index += length;
            tablei += 1;
        }

        let data = &cache.block(ccbi).data;
        let offset =
            (tablei + subdb.first_miniblock as usize) % MINIS_PER_BLOCK * MINIBLOCK_SIZE;
        let retval = decode(index - base_index, &data[offset..], subdb);
        self.stats.db_returns.fetch_add(1, Ordering::Relaxed);
        retval
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
