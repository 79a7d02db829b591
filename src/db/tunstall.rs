//! # Tunstall Codecs (v1 and v2)
//!
//! Both versions expand each data byte through a 256-entry Tunstall
//! dictionary into a short run of virtual values 0..=3.  A catalog of
//! dictionaries covers different value distributions; v1 names one catalog
//! entry per subdb in the index file, v2 names one per block.  Virtual
//! values are mapped to real ones by a per-subdb 6-entry vmap (v1) or a
//! per-block permutation code into `virtual_to_real` (v2), so the hottest
//! value can always take the cheapest tokens.
//!
//! The dictionaries are built once at startup by the textbook Tunstall
//! construction: starting from the 4 single-symbol strings, the heaviest
//! leaf is repeatedly split four ways until 256 leaves exist, under a set
//! of fixed weight vectors.  Leaves are numbered in lexicographic order.

use super::*;
use std::sync::OnceLock;

/// Weight vectors of the catalog entries, hottest symbol first.
const WEIGHTS: [[u32; 4]; 16] = [
    [24, 4, 3, 1],
    [20, 8, 3, 1],
    [16, 8, 6, 2],
    [12, 10, 6, 4],
    [30, 2, 1, 1],
    [18, 12, 2, 1],
    [14, 14, 3, 1],
    [10, 10, 10, 2],
    [28, 3, 2, 1],
    [22, 6, 3, 1],
    [15, 9, 6, 2],
    [11, 11, 8, 2],
    [26, 4, 2, 1],
    [19, 9, 3, 1],
    [13, 12, 5, 2],
    [9, 9, 9, 5],
];

/// Strings longer than this are not split further, bounding the value-run
/// lists.
const MAX_STRING: usize = 64;

pub struct CatalogEntry {
    pub runlength: [u16; 256],
    value_runs_offset: [u16; 256],
    value_runs: Vec<u8>,
    strings: Vec<Vec<u8>>,
}

impl CatalogEntry {
    fn from_weights(weights: &[u32; 4]) -> CatalogEntry {
        let logw: Vec<f64> = weights.iter().map(|&w| (w as f64).ln()).collect();
        let mut leaves: Vec<(f64, Vec<u8>)> =
            (0u8..4).map(|s| (logw[s as usize], vec![s])).collect();
        while leaves.len() < 256 {
            let mut best: Option<usize> = None;
            for (i, (w, s)) in leaves.iter().enumerate() {
                if s.len() >= MAX_STRING {
                    continue;
                }
                if best.map_or(true, |b| *w > leaves[b].0) {
                    best = Some(i);
                }
            }
            let (w, s) = leaves.remove(best.expect("tunstall tree ran out of leaves"));
            for sym in 0u8..4 {
                let mut child = s.clone();
                child.push(sym);
                leaves.push((w + logw[sym as usize], child));
            }
        }
        let mut strings: Vec<Vec<u8>> = leaves.into_iter().map(|(_, s)| s).collect();
        strings.sort();

        let mut entry = CatalogEntry {
            runlength: [0; 256],
            value_runs_offset: [0; 256],
            value_runs: Vec::new(),
            strings: Vec::new(),
        };
        for (b, s) in strings.iter().enumerate() {
            entry.runlength[b] = s.len() as u16;
            entry.value_runs_offset[b] = entry.value_runs.len() as u16;
            let mut run_start = 0;
            for i in 1..=s.len() {
                if i == s.len() || s[i] != s[run_start] {
                    let count = (i - run_start) as u16;
                    entry.value_runs.push(s[run_start]);
                    entry.value_runs.push(count as u8);
                    entry.value_runs.push((count >> 8) as u8);
                    run_start = i;
                }
            }
        }
        entry.strings = strings;
        entry
    }

    /// Value at `offset` positions into the expansion of `byte`.
    fn value_at(&self, byte: u8, target_past_n: u32, n: u32) -> u8 {
        let mut off = self.value_runs_offset[byte as usize] as usize;
        let mut n = n;
        loop {
            let count =
                self.value_runs[off + 1] as u32 | (self.value_runs[off + 2] as u32) << 8;
            n += count;
            if n > target_past_n {
                return self.value_runs[off];
            }
            off += 3;
        }
    }
}

pub fn catalog() -> &'static Vec<CatalogEntry> {
    static CATALOG: OnceLock<Vec<CatalogEntry>> = OnceLock::new();
    CATALOG.get_or_init(|| WEIGHTS.iter().map(CatalogEntry::from_weights).collect())
}

pub fn catalog_len() -> usize {
    catalog().len()
}

/// The dictionary strings of one catalog entry, indexed by token byte.
/// Exposed so tests can drive an encoder against the same dictionary.
pub fn catalog_strings(entry: usize) -> &'static [Vec<u8>] {
    &catalog()[entry].strings
}

/// v2 virtual-to-real value maps.  A permutation `(r0,r1,r2,r3)` is coded
/// as `r0 + 4 r1 + 16 r2 + 64 r3`; only the 24 permutation codes are
/// meaningful, the rest map to the identity.
pub fn virtual_to_real(code: u8, virtual_value: u8) -> u8 {
    static TABLE: OnceLock<[[u8; 4]; 256]> = OnceLock::new();
    let table = TABLE.get_or_init(|| {
        let mut t = [[0u8, 1, 2, 3]; 256];
        for r0 in 0u8..4 {
            for r1 in 0u8..4 {
                if r1 == r0 {
                    continue;
                }
                for r2 in 0u8..4 {
                    if r2 == r0 || r2 == r1 {
                        continue;
                    }
                    let r3 = 6 - r0 - r1 - r2;
                    let code = (r0 + r1 * 4 + r2 * 16 + r3 * 64) as usize;
                    t[code] = [r0, r1, r2, r3];
                }
            }
        }
        t
    });
    table[code as usize][virtual_value as usize]
}

fn decode_with_entry(
    entry: &CatalogEntry,
    tail: &[u8],
    start: SubIndex,
    target: u32,
) -> Option<(u8, u32, usize)> {
    let located = decode_bytes_locate(
        |b| entry.runlength[b as usize] as u32,
        tail,
        start,
        target,
    )?;
    let (i, n) = located;
    if i >= SUBINDEX_BLOCKSIZE {
        return None;
    }
    Some((tail[i], n, i))
}

pub struct TunstallV1;

impl TunstallV1 {
    fn entry(subdb: &Subdb) -> &'static CatalogEntry {
        let cat = match subdb.tables {
            BlockTables::PerSubdb { catalog, .. } => catalog as usize,
            _ => 0,
        };
        &catalog()[cat % catalog_len()]
    }
}

impl Codec for TunstallV1 {
    const DB_TYPE: DbType = DbType::WldTunV1;
    const DATA_EXT: &'static str = "cpr";
    const INDEX_EXT: &'static str = "idx";
    const FILE_BLOCKSIZE: u32 = 1024;
    const BLOCK_MULT: u32 = 4;
    const SAME_PIECES_ONE_FILE: u32 = 4;
    const MIN_AUTOLOAD_PIECES: u32 = 5;
    const HASHED_CACHE: bool = true;

    fn parse_base_tail(tail: &str) -> Result<BaseTail, ParseIdxError> {
        runlen::RunlenWld::parse_base_tail(tail)
    }

    fn parse_block_line(line: &str) -> Result<BlockLine, ParseIdxError> {
        runlen::RunlenWld::parse_block_line(line)
    }

    fn parse_info_line(subdb: &mut Subdb, line: &str) {
        // "# vmap <entry>: v0,v1,v2,v3[,v4,v5]"
        let Some(rest) = line.trim_start_matches(['#', ' ']).strip_prefix("vmap") else {
            return;
        };
        let Some((entry, values)) = rest.split_once(':') else {
            return;
        };
        let Ok(cat) = entry.trim().parse::<u8>() else {
            return;
        };
        let parsed: Vec<u8> = values
            .split(',')
            .filter_map(|v| v.trim().parse().ok())
            .collect();
        if parsed.len() >= 4 {
            let mut vmap = [0u8, 1, 2, 3, 4, 5];
            vmap[..parsed.len().min(6)].copy_from_slice(&parsed[..parsed.len().min(6)]);
            subdb.tables = BlockTables::PerSubdb { catalog: cat, vmap };
        }
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
        let entry = Self::entry(subdb);
        scan_block_bytes(
            |b| entry.runlength[b as usize] as u32,
            subdb,
            data,
            start_m,
            rel_block,
            end_subi,
            out,
        );
    }

    fn decode(subdb: &Subdb, tail: &[u8], start: SubIndex, target: u32, _rel_block: usize) -> Value {
        let entry = Self::entry(subdb);
        match decode_with_entry(entry, tail, start, target) {
            Some((byte, n, _)) => {
                let virtual_value = entry.value_at(byte, target, n);
                let vmap = match subdb.tables {
                    BlockTables::PerSubdb { vmap, .. } => vmap,
                    _ => [0, 1, 2, 3, 4, 5],
                };
                Value::from_i32(vmap[virtual_value as usize % 6] as i32)
            }
            None => {
                log::warn!("tunstall v1 token ran outside its mini-block");
                Value::Unknown
            }
        }
    }
}

pub struct TunstallV2;

impl TunstallV2 {
    fn block_tables(subdb: &Subdb, rel_block: usize) -> (&'static CatalogEntry, u8) {
        match &subdb.tables {
            BlockTables::PerBlock { catalog, vmap } => {
                let cat = catalog.get(rel_block).copied().unwrap_or(0) as usize;
                let perm = vmap.get(rel_block).copied().unwrap_or(0xe4);
                (&self::catalog()[cat % catalog_len()], perm)
            }
            _ => (&self::catalog()[0], 0xe4),
        }
    }
}

impl Codec for TunstallV2 {
    const DB_TYPE: DbType = DbType::WldTunV2;
    const DATA_EXT: &'static str = "cpr1";
    const INDEX_EXT: &'static str = "idx1";
    const FILE_BLOCKSIZE: u32 = 4096;
    const BLOCK_MULT: u32 = 1;
    const SAME_PIECES_ONE_FILE: u32 = 5;
    const MIN_AUTOLOAD_PIECES: u32 = 5;
    const HASHED_CACHE: bool = false;

    fn parse_base_tail(tail: &str) -> Result<BaseTail, ParseIdxError> {
        // "<first>/<startbyte>,<catalog>,<vmap>"
        let (first, rest) = tail
            .split_once('/')
            .ok_or_else(|| ParseIdxError::BadBase(tail.to_string()))?;
        let mut fields = rest.split(',');
        let err = || ParseIdxError::BadBase(tail.to_string());
        let startbyte = fields.next().ok_or_else(err)?.trim().parse().map_err(|_| err())?;
        let cat = fields.next().ok_or_else(err)?.trim().parse().map_err(|_| err())?;
        let vmap = fields.next().ok_or_else(err)?.trim().parse().map_err(|_| err())?;
        Ok(BaseTail {
            first_file_block: first.trim().parse().map_err(|_| err())?,
            startbyte,
            extra: LineExtra::CatVmap(cat, vmap),
        })
    }

    fn parse_block_line(line: &str) -> Result<BlockLine, ParseIdxError> {
        let mut fields = line.split(',');
        let err = || ParseIdxError::BadLine(line.to_string());
        let index = fields.next().ok_or_else(err)?.trim().parse().map_err(|_| err())?;
        let cat = fields.next().ok_or_else(err)?.trim().parse().map_err(|_| err())?;
        let vmap = fields.next().ok_or_else(err)?.trim().parse().map_err(|_| err())?;
        Ok(BlockLine { index, extra: LineExtra::CatVmap(cat, vmap) })
    }

    fn push_extra(subdb: &mut Subdb, extra: LineExtra) {
        let LineExtra::CatVmap(cat, perm) = extra else {
            return;
        };
        if let BlockTables::PerBlock { catalog, vmap } = &mut subdb.tables {
            catalog.push(cat);
            vmap.push(perm);
        } else {
            subdb.tables = BlockTables::PerBlock { catalog: vec![cat], vmap: vec![perm] };
        }
    }

    fn scan_block(
        subdb: &Subdb,
        data: &[u8],
        start_m: usize,
        rel_block: usize,
        end_subi: usize,
        out: &mut dyn FnMut(usize, SubIndex),
    ) {
        let (entry, _) = Self::block_tables(subdb, rel_block);
        scan_block_bytes(
            |b| entry.runlength[b as usize] as u32,
            subdb,
            data,
            start_m,
            rel_block,
            end_subi,
            out,
        );
    }

    fn decode(subdb: &Subdb, tail: &[u8], start: SubIndex, target: u32, rel_block: usize) -> Value {
        let (entry, perm) = Self::block_tables(subdb, rel_block);
        match decode_with_entry(entry, tail, start, target) {
            Some((byte, n, _)) => {
                let virtual_value = entry.value_at(byte, target, n);
                Value::from_i32(virtual_to_real(perm, virtual_value) as i32)
            }
            None => {
                log::warn!("tunstall v2 token ran outside its mini-block");
                Value::Unknown
            }
        }
    }
}
