//! # Slice Catalog
//!
//! Builds the per-subslice metadata from the index files at driver open:
//! which material slices are present, where each subslice's data starts,
//! the per-block starting indices, the codec tables, and the single-value
//! markers.  The catalog is immutable once built.
//!
//! Index files are line oriented.  Every subslice starts with a BASE line
//! `BASE<bm>,<bk>,<wm>,<wk>,<subslice>,<color>:<tail>`; the tail is either
//! codec-specific block geometry or a single-value marker (`+` win,
//! `=` draw, `-` loss, `.` unknown).  `#` lines carry codec info, all
//! other lines are block starting indices.

use super::*;
use crate::indexing::{num_subslices, Slice, MAX_PIECE, MAX_PIECES, MAX_SUBSLICE_INDICES};
use crate::platform;
use log::{info, warn};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub(crate) const DBSIZE: usize =
    (MAX_PIECE + 1) * (MAX_PIECE + 1) * (MAX_PIECE + 1) * (MAX_PIECE + 1) * 2;

/// Index of a `(slice, color)` pair in the subdb table.
pub(crate) fn dboffset(s: &Slice, color: crate::engine::Color) -> usize {
    ((((s.nbm * (MAX_PIECE + 1) + s.nbk) * (MAX_PIECE + 1) + s.nwm) * (MAX_PIECE + 1)) + s.nwk)
        * 2
        + color as usize
}

#[derive(Clone, Debug)]
pub(crate) struct FileMeta {
    pub name: String,
    pub pieces: u32,
    pub max_pieces_1side: u32,
    pub is_present: bool,
    pub autoload: bool,
    pub num_cacheblocks: u32,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct DbpEntry {
    /// Arena index of subslice 0; subslices are contiguous.
    pub first: usize,
    pub num_subslices: usize,
}

#[derive(Default)]
pub(crate) struct Catalog {
    pub files: Vec<FileMeta>,
    pub dbp: Vec<Option<DbpEntry>>,
    pub subdbs: Vec<Subdb>,
}

impl Catalog {
    pub fn new() -> Self {
        Catalog { files: Vec::new(), dbp: vec![None; DBSIZE], subdbs: Vec::new() }
    }

    pub fn subdb_of(&self, s: &Slice, color: crate::engine::Color, subslice: usize) -> Option<usize> {
        let entry = self.dbp[dboffset(s, color)]?;
        if subslice >= entry.num_subslices {
            return None;
        }
        Some(entry.first + subslice)
    }

    /// Find a subdb of `file` whose data covers `blocknum`, used when
    /// preloading blocks nobody has asked for yet.
    pub fn find_first_subdb(&self, file: usize, blocknum: u32) -> Option<usize> {
        self.subdbs.iter().position(|s| {
            s.file == file
                && s.single_value.is_none()
                && !s.indices.is_empty()
                && blocknum >= s.first_idx_block
                && blocknum < s.first_idx_block + s.num_idx_blocks
        })
    }
}

/// Build the table of database file names for a format: one `dbN` per
/// piece count up to the format's limit, then one file per material split.
pub(crate) fn build_file_table<C: Codec>(
    dbpieces: u32,
    kings_1side_8pcs: Option<u32>,
) -> Vec<FileMeta> {
    build_file_table_with(C::SAME_PIECES_ONE_FILE, dbpieces, kings_1side_8pcs)
}

pub(crate) fn build_file_table_with(
    same_pieces_one_file: u32,
    dbpieces: u32,
    kings_1side_8pcs: Option<u32>,
) -> Vec<FileMeta> {
    let mut files = Vec::new();
    for npieces in 2..=MAX_PIECES as u32 {
        if npieces <= same_pieces_one_file {
            files.push(FileMeta {
                name: format!("db{}", npieces),
                pieces: npieces,
                max_pieces_1side: (npieces - 1).min(MAX_PIECE as u32),
                is_present: false,
                autoload: false,
                num_cacheblocks: 0,
            });
            continue;
        }
        if npieces > dbpieces {
            continue;
        }
        for nb in 1..npieces {
            if nb > MAX_PIECE as u32 {
                continue;
            }
            let nw = npieces - nb;
            if nw > nb {
                continue;
            }
            for nbk in 0..=nb {
                let nbm = nb - nbk;
                for nwk in 0..=nw {
                    let nwm = nw - nwk;
                    if nb == nw && nwk > nbk {
                        continue;
                    }
                    if let Some(limit) = kings_1side_8pcs {
                        if npieces == 8 && (nbk > limit || nwk > limit) {
                            continue;
                        }
                    }
                    files.push(FileMeta {
                        name: format!("db{}-{}{}{}{}", npieces, nbm, nbk, nwm, nwk),
                        pieces: npieces,
                        max_pieces_1side: nb,
                        is_present: false,
                        autoload: false,
                        num_cacheblocks: 0,
                    });
                }
            }
        }
    }
    files
}

fn base_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^BASE(\d+),(\d+),(\d+),(\d+),(\d+),([bw]):(.*)$").expect("BASE regex")
    })
}

/// The outcome of `parse_index_file` for the file's subdb chain.
struct ChainState {
    prev: Option<usize>,
    count: u32,
    last_first_idx_block: u32,
}

/// Parse one index file into the catalog.  A missing data file is fatal
/// only for the shared `dbN` files; otherwise the slice is simply absent.
pub(crate) fn parse_index_file<C: Codec>(
    dir: &Path,
    fi: usize,
    catalog: &mut Catalog,
) -> Result<(), OpenError> {
    let meta = &catalog.files[fi];
    let data_path = dir.join(format!("{}.{}", meta.name, C::DATA_EXT));
    let filesize = match platform::file_size_of(&data_path) {
        Ok(size) => size,
        Err(_) => {
            if meta.pieces > C::SAME_PIECES_ONE_FILE {
                info!("{} not present", data_path.display());
                return Ok(());
            }
            return Err(OpenError::SliceMissing(data_path));
        }
    };
    let num_cacheblocks = (filesize / C::CACHE_BLOCKSIZE as u64
        + u64::from(filesize % C::CACHE_BLOCKSIZE as u64 != 0)) as u32;

    let idx_path = dir.join(format!("{}.{}", meta.name, C::INDEX_EXT));
    let text = std::fs::read_to_string(&idx_path)
        .map_err(|_| OpenError::OpenFailed(idx_path.clone()))?;

    catalog.files[fi].is_present = true;
    catalog.files[fi].num_cacheblocks = num_cacheblocks;

    let mut chain = ChainState { prev: None, count: 0, last_first_idx_block: 0 };
    let mut current: Option<usize> = None;
    let mut linecount: u32 = 0;

    let bad = |e: ParseIdxError| OpenError::IndexFileMalformed(idx_path.clone(), e);

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(caps) = base_regex().captures(line) {
            let nbm: usize = caps[1].parse().unwrap();
            let nbk: usize = caps[2].parse().unwrap();
            let nwm: usize = caps[3].parse().unwrap();
            let nwk: usize = caps[4].parse().unwrap();
            let subslice: usize = caps[5].parse().unwrap();
            let color = if &caps[6] == "b" {
                crate::engine::Color::Black
            } else {
                crate::engine::Color::White
            };
            let tail = caps[7].trim();

            if nbm + nbk > MAX_PIECE || nwm + nwk > MAX_PIECE {
                return Err(bad(ParseIdxError::BadBase(line.to_string())));
            }
            let slice = Slice::new(nbm, nbk, nwm, nwk);
            let offset = dboffset(&slice, color);
            if catalog.dbp[offset].is_none() {
                let n = num_subslices(&slice, MAX_SUBSLICE_INDICES);
                let first = catalog.subdbs.len();
                catalog.subdbs.extend((0..n).map(|_| Subdb::default()));
                catalog.dbp[offset] = Some(DbpEntry { first, num_subslices: n });
            }
            let entry = catalog.dbp[offset].unwrap();
            if subslice >= entry.num_subslices {
                return Err(bad(ParseIdxError::BadSubslice(subslice)));
            }
            let si = entry.first + subslice;

            if tail.starts_with(|c: char| c.is_ascii_digit()) {
                let parsed = C::parse_base_tail(tail).map_err(bad)?;
                let subdb = &mut catalog.subdbs[si];
                subdb.single_value = None;
                subdb.file = fi;
                subdb.first_idx_block = parsed.first_file_block / C::BLOCK_MULT;
                subdb.startbyte = parsed.startbyte
                    + (parsed.first_file_block % C::BLOCK_MULT) * C::FILE_BLOCKSIZE;
                subdb.first_subidx_block =
                    (subdb.startbyte / SUBINDEX_BLOCKSIZE as u32) as u8;
                subdb.indices = vec![0];
                C::push_extra(subdb, parsed.extra);

                // Close out the previous data subdb of this file: its last
                // mini-block is determined by where the next one starts.
                let first_subidx = catalog.subdbs[si].first_subidx_block;
                let startbyte = catalog.subdbs[si].startbyte;
                if let Some(pi) = chain.prev {
                    let last = if startbyte % SUBINDEX_BLOCKSIZE as u32 == 0 {
                        if first_subidx > 0 {
                            first_subidx - 1
                        } else {
                            (NUM_SUBINDICES - 1) as u8
                        }
                    } else {
                        first_subidx
                    };
                    let prev = &mut catalog.subdbs[pi];
                    prev.num_idx_blocks = prev.indices.len() as u32;
                    prev.last_subidx_block = last;
                    if prev.num_idx_blocks == 1 && prev.first_subidx_block == prev.last_subidx_block
                    {
                        prev.single_subidx_block = true;
                    }
                    prev.next = Some(si);
                    catalog.subdbs[si].prev = Some(pi);
                }
                chain.prev = Some(si);
                current = Some(si);
                linecount = parsed.first_file_block % C::BLOCK_MULT;
            } else {
                let marker = tail.chars().next().and_then(C::parse_single_value);
                let Some(value) = marker else {
                    return Err(bad(ParseIdxError::BadBase(line.to_string())));
                };
                let subdb = &mut catalog.subdbs[si];
                subdb.single_value = Some(value);
                subdb.file = fi;
                current = None;
            }
            continue;
        }
        if line.starts_with('#') {
            if let Some(si) = current {
                C::parse_info_line(&mut catalog.subdbs[si], line);
            }
            continue;
        }
        let Some(si) = current else {
            return Err(bad(ParseIdxError::BadLine(line.to_string())));
        };
        let parsed = C::parse_block_line(line).map_err(bad)?;
        linecount += 1;
        if linecount >= C::BLOCK_MULT {
            linecount = 0;
            let subdb = &mut catalog.subdbs[si];
            subdb.indices.push(parsed.index);
            C::push_extra(subdb, parsed.extra);
        }
    }

    // Finalize the last data subdb against the data file's actual size.
    if let Some(pi) = chain.prev {
        let subdb = &mut catalog.subdbs[pi];
        subdb.num_idx_blocks = subdb.indices.len() as u32;
        subdb.last_subidx_block =
            (((filesize - 1) % C::CACHE_BLOCKSIZE as u64) / SUBINDEX_BLOCKSIZE as u64) as u8;
        if subdb.num_idx_blocks == 1 && subdb.first_subidx_block == subdb.last_subidx_block {
            subdb.single_subidx_block = true;
        }
        chain.count = subdb.num_idx_blocks;
        chain.last_first_idx_block = subdb.first_idx_block;

        if num_cacheblocks != chain.count + chain.last_first_idx_block {
            return Err(bad(ParseIdxError::BlockCountMismatch(
                num_cacheblocks,
                chain.count + chain.last_first_idx_block,
            )));
        }
        info!("{:>10} index blocks: {}", num_cacheblocks, idx_path.display());
    } else {
        warn!("no data subdbs in {}", idx_path.display());
    }

    Ok(())
}

/// Order files for autoload: everything small enough first, then by total
/// king count ascending, piece count ascending, so the most frequently
/// probed slices stay resident.
pub(crate) fn autoload_order<C: Codec>(catalog: &Catalog, dbpieces: u32) -> Vec<usize> {
    let mut order = Vec::new();
    for (i, f) in catalog.files.iter().enumerate() {
        if f.pieces <= C::MIN_AUTOLOAD_PIECES {
            order.push(i);
        }
    }
    for nk in 0..=dbpieces as usize {
        for npieces in (C::MIN_AUTOLOAD_PIECES as usize + 1)..=dbpieces as usize {
            for nbk in 0..=nk.min(npieces) {
                let nwk = nk - nbk;
                if nbk + nwk > npieces {
                    continue;
                }
                for nbm in 0..=(npieces - nbk - nwk) {
                    let nwm = npieces - nbk - nwk - nbm;
                    if nbm + nbk == 0 || nwm + nwk == 0 {
                        continue;
                    }
                    if nwm + nwk > nbm + nbk {
                        continue;
                    }
                    if nbm + nbk == nwm + nwk && nwk > nbk {
                        continue;
                    }
                    if nbm + nbk > MAX_PIECE {
                        continue;
                    }
                    let slice = Slice::new(nbm, nbk, nwm, nwk);
                    let subdb = [crate::engine::Color::Black, crate::engine::Color::White]
                        .iter()
                        .find_map(|&c| catalog.subdb_of(&slice, c, 0));
                    let Some(si) = subdb else {
                        continue;
                    };
                    let fi = catalog.subdbs[si].file;
                    if !catalog.files[fi].is_present {
                        continue;
                    }
                    if !order.contains(&fi) {
                        order.push(fi);
                    }
                }
            }
        }
    }
    order
}

pub(crate) fn data_path<C: Codec>(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.{}", name, C::DATA_EXT))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::runlen::RunlenWld;
    use crate::engine::Color;
    use std::io::Write;

    #[test]
    fn file_table_shapes() {
        let files = build_file_table::<RunlenWld>(6, None);
        assert_eq!(files[0].name, "db2");
        assert!(files.iter().any(|f| f.name == "db5"));
        assert!(files.iter().any(|f| f.name == "db6-3030"));
        // Mirrored material is excluded.
        assert!(!files.iter().any(|f| f.name == "db6-3021"));
    }

    #[test]
    fn kings_limit_prunes_8pc_files() {
        let all = build_file_table::<RunlenWld>(8, None);
        let limited = build_file_table::<RunlenWld>(8, Some(1));
        assert!(all.iter().any(|f| f.name == "db8-2240"));
        assert!(!limited.iter().any(|f| f.name == "db8-2240"));
        assert!(limited.iter().any(|f| f.name == "db8-3140"));
    }

    #[test]
    fn parses_single_value_and_data_lines() {
        let dir = tempfile::tempdir().unwrap();
        // Two cache blocks of data.
        std::fs::write(dir.path().join("db2.cpr"), vec![0u8; 8192]).unwrap();
        let mut idx = std::fs::File::create(dir.path().join("db2.idx")).unwrap();
        writeln!(idx, "BASE0,1,0,1,0,b:0/0").unwrap();
        writeln!(idx, "4000").unwrap();
        writeln!(idx, "BASE0,1,0,1,0,w:=").unwrap();
        drop(idx);

        let mut catalog = Catalog::new();
        catalog.files = build_file_table::<RunlenWld>(2, None);
        parse_index_file::<RunlenWld>(dir.path(), 0, &mut catalog).unwrap();

        let s = Slice::new(0, 1, 0, 1);
        let black = catalog.subdb_of(&s, Color::Black, 0).unwrap();
        let white = catalog.subdb_of(&s, Color::White, 0).unwrap();
        assert!(catalog.subdbs[black].single_value.is_none());
        assert_eq!(catalog.subdbs[black].indices, vec![0, 4000]);
        assert_eq!(catalog.subdbs[black].num_idx_blocks, 2);
        assert_eq!(catalog.subdbs[black].last_subidx_block, 63);
        assert_eq!(catalog.subdbs[white].single_value, Some(Value::Draw));
    }

    #[test]
    fn block_count_mismatch_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("db2.cpr"), vec![0u8; 4096]).unwrap();
        std::fs::write(dir.path().join("db2.idx"), "BASE0,1,0,1,0,b:0/0\n100\n").unwrap();
        let mut catalog = Catalog::new();
        catalog.files = build_file_table::<RunlenWld>(2, None);
        let err = parse_index_file::<RunlenWld>(dir.path(), 0, &mut catalog);
        assert!(err.is_err());
    }
}
