//! # Database Module
//!
//! Everything between a position index and a decoded value: the value
//! enumeration, the per-format codecs, the slice catalog built from the
//! index files, the shared block cache, and the drivers.
//!
//! There is a sub-module for each compressed format.  The three byte-token
//! WLD formats and the bit-token WLD Huffman format share one generic
//! driver over the `Codec` trait; the MTC and DTW databases have their own
//! drivers because their index structure is genuinely different (MTC has
//! no mini-block sub-indices, DTW carries per-subdb codebooks).

pub mod runlen;
pub mod tunstall;
pub mod huffman;
pub mod catalog;
pub mod cache;
pub mod driver;
pub mod mtc;
pub mod dtw;
pub mod identify;

use num_derive::FromPrimitive;

/// Number of mini-blocks per cache block in the WLD formats.
pub(crate) const NUM_SUBINDICES: usize = 64;
/// Mini-block size in bytes.
pub(crate) const SUBINDEX_BLOCKSIZE: usize = 64;

/// Lookup results.  The negative members are in-band sentinels, not values:
/// `SubdbUnavailable` means the slice is not part of this database, and
/// `NotInCache` is only returned by conditional lookups.
#[derive(FromPrimitive, Clone, Copy, PartialEq, Eq, Debug)]
pub enum Value {
    SubdbUnavailable = -2,
    NotInCache = -1,
    Unknown = 0,
    Win = 1,
    Loss = 2,
    Draw = 3,
    DrawOrLoss = 4,
    WinOrDraw = 5,
}

impl Value {
    pub fn from_i32(v: i32) -> Value {
        Value::from_i32_opt(v).unwrap_or(Value::Unknown)
    }

    fn from_i32_opt(v: i32) -> Option<Value> {
        <Value as num_traits::FromPrimitive>::from_i32(v)
    }

    pub fn to_i32(self) -> i32 {
        self as i32
    }

    /// True for the three fully resolved values.
    pub fn is_exact(self) -> bool {
        matches!(self, Value::Win | Value::Loss | Value::Draw)
    }
}

/// Database formats, in the order the identifier prefers them.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DbType {
    WldRunlen,
    MtcRunlen,
    WldHuffman,
    WldTunV1,
    WldTunV2,
    Dtw,
}

impl std::str::FromStr for DbType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wld_runlen" => Ok(DbType::WldRunlen),
            "mtc_runlen" => Ok(DbType::MtcRunlen),
            "wld_huffman" => Ok(DbType::WldHuffman),
            "wld_tunstall_v1" => Ok(DbType::WldTunV1),
            "wld_tunstall_v2" => Ok(DbType::WldTunV2),
            "dtw" => Ok(DbType::Dtw),
            other => Err(format!("unknown database type {:?}", other)),
        }
    }
}

impl std::fmt::Display for DbType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DbType::WldRunlen => "wld_runlen",
            DbType::MtcRunlen => "mtc_runlen",
            DbType::WldHuffman => "wld_huffman",
            DbType::WldTunV1 => "wld_tunstall_v1",
            DbType::WldTunV2 => "wld_tunstall_v2",
            DbType::Dtw => "dtw",
        };
        write!(f, "{}", name)
    }
}

/// The per-mini-block resume point.  `index` is the subdb-local index at
/// the start of the mini-block.  `state` is codec private: the byte codecs
/// use it only at a subdb's first mini-block (byte offset of the first data
/// byte); the Huffman codec packs the bit offset and two-value LRU.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct SubIndex {
    pub index: u32,
    pub state: u16,
}

/// Codec-specific decode tables owned by a subdb.
#[derive(Clone, Debug, Default)]
pub enum BlockTables {
    /// Run-length WLD: the tables are process-wide.
    #[default]
    None,
    /// Tunstall v1: one catalog entry and value map for the whole subdb.
    PerSubdb { catalog: u8, vmap: [u8; 6] },
    /// Tunstall v2: catalog entry and value-map permutation per block.
    PerBlock { catalog: Vec<u8>, vmap: Vec<u8> },
    /// WLD Huffman: per-block start values `v0 | v1 << 4`.
    StartValues { values: Vec<u8>, haspartials: bool },
}

/// One subslice's worth of database, or a single-value marker.
#[derive(Clone, Debug, Default)]
pub struct Subdb {
    pub single_value: Option<Value>,
    pub first_subidx_block: u8,
    pub single_subidx_block: bool,
    pub last_subidx_block: u8,
    /// Offset of the first data byte within the first cache block.
    pub startbyte: u32,
    pub num_idx_blocks: u32,
    /// First cache block of this subdb within its file.
    pub first_idx_block: u32,
    /// Starting subdb-local index of each cache block; `indices[0] == 0`.
    pub indices: Vec<u32>,
    pub tables: BlockTables,
    /// Sub-indices for the whole subdb when its file is autoloaded.
    pub autoload_subindices: Vec<SubIndex>,
    pub file: usize,
    /// Links among the non-single-value subdbs of the same file, in file
    /// order, so block loads can find every subdb sharing a block.
    pub prev: Option<usize>,
    pub next: Option<usize>,
}

impl Subdb {
    /// Number of mini-blocks actually occupied by this subdb.
    pub fn num_subindices(&self) -> usize {
        self.num_idx_blocks as usize * NUM_SUBINDICES
            - (NUM_SUBINDICES - 1 - self.last_subidx_block as usize)
    }
}

/// Locate the entry covering `index`: the largest `k` in `first..last`
/// with `indices[k] <= index`, assuming `indices[first] <= index`.
pub(crate) fn find_block_from(first: usize, last: usize, indices: &[u32], index: u32) -> usize {
    let mut lo = first;
    let mut hi = last;
    while lo + 1 < hi {
        let mid = lo + (hi - lo) / 2;
        if indices[mid] <= index {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    lo
}

pub(crate) fn find_block_subidx(
    first: usize,
    last: usize,
    subindices: &[SubIndex],
    index: u32,
) -> usize {
    let mut lo = first;
    let mut hi = last;
    while lo + 1 < hi {
        let mid = lo + (hi - lo) / 2;
        if subindices[mid].index <= index {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    lo
}

/// Extra fields a codec contributes to an index-file line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineExtra {
    None,
    /// Tunstall v2: catalog entry and vmap permutation code.
    CatVmap(u8, u8),
    /// WLD Huffman: the two starting values of the block.
    StartVals(u8, u8),
}

/// Parsed tail of a BASE line for a data subdb.
#[derive(Clone, Copy, Debug)]
pub struct BaseTail {
    pub first_file_block: u32,
    pub startbyte: u32,
    pub extra: LineExtra,
}

/// Parsed block-index line.
#[derive(Clone, Copy, Debug)]
pub struct BlockLine {
    pub index: u32,
    pub extra: LineExtra,
}

/// Errors surfaced while opening a driver.  After a successful open, all
/// lookup-path conditions are reported in-band through `Value` sentinels.
#[derive(thiserror::Error, Debug)]
pub enum OpenError {
    #[error("cannot open {0}")]
    OpenFailed(std::path::PathBuf),
    #[error("no known database found in {0}")]
    Unidentified(std::path::PathBuf),
    #[error("file identifies as a different format than its name suggests: {0}")]
    FormatMismatch(std::path::PathBuf),
    #[error("missing compressed data file {0}")]
    SliceMissing(std::path::PathBuf),
    #[error("index file {0}: {1}")]
    IndexFileMalformed(std::path::PathBuf, #[source] ParseIdxError),
    #[error("option {0} has invalid value {1:?}")]
    BadOption(String, String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum ParseIdxError {
    #[error("malformed line in index file: {0:?}")]
    BadLine(String),
    #[error("malformed BASE line in index file: {0:?}")]
    BadBase(String),
    #[error("subslice number {0} out of range")]
    BadSubslice(usize),
    #[error("index block count disagrees with data file size: {0} vs {1}")]
    BlockCountMismatch(u32, u32),
}

/// One compressed-database codec.  The driver owns the block cache and the
/// catalog; the codec contributes the grammar extras of its index file,
/// the mini-block scanner run at block-load time, and the decoder.
pub trait Codec: Send + Sync + 'static {
    const DB_TYPE: DbType;
    const DATA_EXT: &'static str;
    const INDEX_EXT: &'static str;
    /// Granule of the index-file block lines, in bytes.
    const FILE_BLOCKSIZE: u32;
    /// File blocks aggregated into one cache block.
    const BLOCK_MULT: u32;
    const CACHE_BLOCKSIZE: u32 = Self::FILE_BLOCKSIZE * Self::BLOCK_MULT;
    /// Piece counts up to this share one `dbN` file per count.
    const SAME_PIECES_ONE_FILE: u32;
    /// Files with this many pieces or fewer are always autoloaded.
    const MIN_AUTOLOAD_PIECES: u32;
    /// Use the open-addressing (file, block) hashtable instead of
    /// per-file block maps.
    const HASHED_CACHE: bool;

    /// Parse the part of a BASE line after the colon, e.g. `17/512,3,228`.
    fn parse_base_tail(tail: &str) -> Result<BaseTail, ParseIdxError>;

    /// Parse one block-index line.
    fn parse_block_line(line: &str) -> Result<BlockLine, ParseIdxError>;

    /// Map a single-value marker character to its value.
    fn parse_single_value(c: char) -> Option<Value> {
        match c {
            '.' => Some(Value::Unknown),
            '+' => Some(Value::Win),
            '=' => Some(Value::Draw),
            '-' => Some(Value::Loss),
            _ => None,
        }
    }

    /// Digest a `#` info line (`# vmap …`, `# haspartials`).
    fn parse_info_line(_subdb: &mut Subdb, _line: &str) {}

    /// Fold a parsed BASE tail / block line extra into the subdb tables.
    fn push_extra(subdb: &mut Subdb, extra: LineExtra);

    /// Walk one subdb's data within a freshly loaded cache block and
    /// record the sub-index of every mini-block boundary crossed, from
    /// `first_subi` through `end_subi` inclusive.  `start_m` is the byte
    /// offset within the block where the walk starts and `rel_block` the
    /// block's number within the subdb.
    fn scan_block(
        subdb: &Subdb,
        data: &[u8],
        start_m: usize,
        rel_block: usize,
        end_subi: usize,
        out: &mut dyn FnMut(usize, SubIndex),
    );

    /// Decode the value at subdb-local index `target`.  `tail` starts at
    /// the covering mini-block and extends to the end of the cache block;
    /// `start` is the resume point at the mini-block start.
    fn decode(subdb: &Subdb, tail: &[u8], start: SubIndex, target: u32, rel_block: usize) -> Value;

    /// Resume state for a lookup that begins at the subdb's first data
    /// byte (the zero-implied mini-block).
    fn subdb_start_state(subdb: &Subdb, skew: usize) -> SubIndex {
        let _ = subdb;
        SubIndex { index: 0, state: skew as u16 }
    }
}

/// Mini-block scan shared by the byte-token codecs: walk the block from
/// `start_m`, recording the running index at every mini-block boundary up
/// to `end_subi`.  A subdb's own first mini-block gets no entry unless the
/// data happens to start exactly on the boundary (it is zero-implied).
pub(crate) fn scan_block_bytes(
    runlen: impl Fn(u8) -> u32,
    subdb: &Subdb,
    data: &[u8],
    start_m: usize,
    rel_block: usize,
    end_subi: usize,
    out: &mut dyn FnMut(usize, SubIndex),
) {
    let mut index = if rel_block == 0 { 0 } else { subdb.indices[rel_block] };
    let mut m = start_m;
    loop {
        if m % SUBINDEX_BLOCKSIZE == 0 {
            let subi = m / SUBINDEX_BLOCKSIZE;
            if subi > end_subi {
                break;
            }
            out(subi, SubIndex { index, state: 0 });
        }
        if m >= data.len() {
            break;
        }
        index += runlen(data[m]);
        m += 1;
    }
}

/// Linear search shared by the byte-token codecs: advance from the resume
/// point until the token covering `target` is reached.  Returns the token's
/// byte offset in `tail` and the index at its first position.
pub(crate) fn decode_bytes_locate(
    runlen: impl Fn(u8) -> u32,
    tail: &[u8],
    start: SubIndex,
    target: u32,
) -> Option<(usize, u32)> {
    let mut i = start.state as usize;
    let mut n = start.index;
    loop {
        if i >= tail.len() {
            return None;
        }
        let r = runlen(tail[i]);
        if n + r > target {
            return Some((i, n));
        }
        n += r;
        i += 1;
    }
}

/// Parse a `;`/`,`-separated option string: `maxpieces=8;autoload=0`.
pub(crate) fn parse_options(options: &str) -> std::collections::HashMap<String, String> {
    let mut map = std::collections::HashMap::new();
    for item in options.split([';', ',']) {
        if let Some((k, v)) = item.split_once('=') {
            map.insert(k.trim().to_string(), v.trim().to_string());
        }
    }
    map
}
