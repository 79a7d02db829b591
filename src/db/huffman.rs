//! # WLD Huffman Codec
//!
//! A bit stream of 14-bit-limited codes, read least-significant-bit first.
//! Run symbols cover 1..=32 positions of the *predicted* value and then
//! swap the two-value LRU `(last, cur)`, so plain alternation between two
//! values costs nothing extra.  Escape symbols set `cur` directly,
//! announcing the value of the run after next: four literal values, the
//! two partial values, and a third-value toggle (`MISPREDICT_DRAW`) that
//! means literal draw only when the subdb holds partial values.  Two more
//! escapes carry explicit 16- or 32-bit run lengths for very long runs.
//! Each 4 KiB block is an independent stream, begins with the block's two
//! start values from the index file, and ends on a reserved pattern of 14
//! zero bits.
//!
//! Sub-indices carry the resume state `(bit offset, last, cur)` packed in
//! 16 bits, since a code may straddle a mini-block boundary.

use super::*;
use std::sync::OnceLock;

pub const MAX_HUFFCODE_BITS: usize = 14;

/// Longest run a dedicated symbol covers; longer runs use the arb escapes.
pub const MAX_RUN_SYMBOL: u32 = 32;

/// One symbol of the fixed codebook: the emit-order bit pattern, its
/// length, and the run length (0 for escapes).
#[derive(Clone, Copy, Debug)]
pub struct HuffSymbol {
    pub pattern: u16,
    pub length: u8,
    pub runlength: u32,
}

pub struct HuffTables {
    /// 14-bit window to `codelength | runlength << 4`.
    table: Vec<u16>,
    pub runs: Vec<HuffSymbol>,
    pub arb16: u16,
    pub arb32: u16,
    /// Patterns of the value escapes, indexed by the value they announce.
    pub mispredict: [u16; 6],
    pub escape_length: u8,
}

fn reverse_bits(code: u32, length: u32) -> u16 {
    let mut p = 0u16;
    for i in 0..length {
        if code >> (length - 1 - i) & 1 != 0 {
            p |= 1 << i;
        }
    }
    p
}

/// The crate's fixed codebook: canonical codes assigned shortest-first
/// starting at 1 so that no pattern collides with the all-zero end marker.
pub fn tables() -> &'static HuffTables {
    static TABLES: OnceLock<HuffTables> = OnceLock::new();
    TABLES.get_or_init(|| {
        let mut runs = Vec::new();
        let mut code: u32 = 1;
        let mut length: u32 = 4;
        let mut next = |want_len: u32, code: &mut u32, length: &mut u32| {
            *code <<= want_len - *length;
            *length = want_len;
            let c = *code;
            *code += 1;
            c
        };
        for r in 1..=MAX_RUN_SYMBOL {
            let want = if r <= 4 {
                4
            } else if r <= 12 {
                6
            } else {
                8
            };
            let c = next(want, &mut code, &mut length);
            runs.push(HuffSymbol {
                pattern: reverse_bits(c, want),
                length: want as u8,
                runlength: r,
            });
        }
        let mut escape = |code: &mut u32, length: &mut u32| {
            let c = next(9, code, length);
            reverse_bits(c, 9)
        };
        let arb16 = escape(&mut code, &mut length);
        let arb32 = escape(&mut code, &mut length);
        let mut mispredict = [0u16; 6];
        for slot in mispredict.iter_mut() {
            *slot = escape(&mut code, &mut length);
        }

        let mut table = vec![MAX_HUFFCODE_BITS as u16; 1 << MAX_HUFFCODE_BITS];
        let mut install = |pattern: u16, length: u8, runlength: u32| {
            let step = 1usize << length;
            let mut w = pattern as usize;
            while w < 1 << MAX_HUFFCODE_BITS {
                table[w] = length as u16 | (runlength as u16) << 4;
                w += step;
            }
        };
        for s in &runs {
            install(s.pattern, s.length, s.runlength);
        }
        install(arb16, 9, 0);
        install(arb32, 9, 0);
        for &p in &mispredict {
            install(p, 9, 0);
        }

        HuffTables { table, runs, arb16, arb32, mispredict, escape_length: 9 }
    })
}

/// The third value implied by a mispredicted draw escape: the one that is
/// neither `last` nor `cur`.
pub fn mispredict_value(last: u8, cur: u8) -> u8 {
    static TABLE: OnceLock<[[u8; 4]; 4]> = OnceLock::new();
    let t = TABLE.get_or_init(|| {
        let mut t = [[0u8; 4]; 4];
        for v0 in 0..4usize {
            for v1 in 0..4usize {
                t[v0][v1] = match v1 as i32 {
                    x if x == Value::Win.to_i32() => {
                        if v0 as i32 == Value::Draw.to_i32() {
                            Value::Loss.to_i32() as u8
                        } else {
                            Value::Draw.to_i32() as u8
                        }
                    }
                    x if x == Value::Loss.to_i32() => {
                        if v0 as i32 == Value::Draw.to_i32() {
                            Value::Win.to_i32() as u8
                        } else {
                            Value::Draw.to_i32() as u8
                        }
                    }
                    x if x == Value::Draw.to_i32() => {
                        if v0 as i32 == Value::Win.to_i32() {
                            Value::Loss.to_i32() as u8
                        } else {
                            Value::Win.to_i32() as u8
                        }
                    }
                    _ => Value::Unknown.to_i32() as u8,
                };
            }
        }
        t
    });
    t[(last & 3) as usize][(cur & 3) as usize]
}

/// State packing: bit offset within the mini-block (10 bits), then the two
/// LRU values (3 bits each).
pub(crate) fn pack_state(bitoff: usize, last: u8, cur: u8) -> u16 {
    (bitoff as u16 & 0x3ff) | (last as u16) << 10 | (cur as u16) << 13
}

pub(crate) fn unpack_state(state: u16) -> (usize, u8, u8) {
    ((state & 0x3ff) as usize, (state >> 10 & 7) as u8, (state >> 13 & 7) as u8)
}

fn read24(tail: &[u8], bitoff: usize) -> u32 {
    let base = bitoff / 8;
    let b = |k: usize| *tail.get(base + k).unwrap_or(&0) as u32;
    (b(0) | b(1) << 8 | b(2) << 16) >> (bitoff % 8)
}

fn read40(tail: &[u8], bitoff: usize) -> u64 {
    let base = bitoff / 8;
    let b = |k: usize| *tail.get(base + k).unwrap_or(&0) as u64;
    (b(0) | b(1) << 8 | b(2) << 16 | b(3) << 24 | b(4) << 32) >> (bitoff % 8)
}

enum Step {
    /// Covered `n` positions of the old predicted value and swapped.
    Run(u32),
    /// Escape processed, `cur` replaced.
    Escape,
    /// Hit the end-of-block pattern (or corrupt data).
    End,
}

/// Process one symbol at `bitoff`, updating the cursor and LRU in place.
fn step(
    tail: &[u8],
    bitoff: &mut usize,
    last: &mut u8,
    cur: &mut u8,
    haspartials: bool,
) -> Step {
    let t = tables();
    let w = read24(tail, *bitoff) & 0x3fff;
    let entry = t.table[w as usize];
    let len = (entry & 0x0f) as usize;
    let run = (entry >> 4) as u32;
    if run != 0 {
        *bitoff += len;
        std::mem::swap(last, cur);
        return Step::Run(run);
    }
    let masked = (w & ((1u32 << len) - 1)) as u16;
    if masked == t.arb16 {
        *bitoff += len;
        let n = read24(tail, *bitoff) & 0xffff;
        *bitoff += 16;
        std::mem::swap(last, cur);
        Step::Run(n)
    } else if masked == t.arb32 {
        *bitoff += len;
        let n = (read40(tail, *bitoff) & 0xffff_ffff) as u32;
        *bitoff += 32;
        std::mem::swap(last, cur);
        Step::Run(n)
    } else if let Some(v) = t.mispredict.iter().position(|&p| p == masked) {
        *bitoff += len;
        if v as i32 == Value::Draw.to_i32() && !haspartials {
            *cur = mispredict_value(*last, *cur);
        } else {
            *cur = v as u8;
        }
        Step::Escape
    } else {
        Step::End
    }
}

pub struct HuffmanWld;

impl HuffmanWld {
    fn start_values(subdb: &Subdb, rel_block: usize) -> (u8, u8, bool) {
        match &subdb.tables {
            BlockTables::StartValues { values, haspartials } => {
                let v = values.get(rel_block).copied().unwrap_or(0);
                (v & 0x0f, v >> 4, *haspartials)
            }
            _ => (0, 0, false),
        }
    }

    fn haspartials(subdb: &Subdb) -> bool {
        matches!(&subdb.tables, BlockTables::StartValues { haspartials: true, .. })
    }
}

impl Codec for HuffmanWld {
    const DB_TYPE: DbType = DbType::WldHuffman;
    const DATA_EXT: &'static str = "cpr";
    const INDEX_EXT: &'static str = "idx";
    const FILE_BLOCKSIZE: u32 = 4096;
    const BLOCK_MULT: u32 = 1;
    const SAME_PIECES_ONE_FILE: u32 = 4;
    const MIN_AUTOLOAD_PIECES: u32 = 4;
    const HASHED_CACHE: bool = false;

    fn parse_base_tail(tail: &str) -> Result<BaseTail, ParseIdxError> {
        // "<first>,<startbyte>:<v0>,<v1>"
        let err = || ParseIdxError::BadBase(tail.to_string());
        let (blockpart, valpart) = tail.split_once(':').ok_or_else(err)?;
        let (first, startbyte) = blockpart.split_once(',').ok_or_else(err)?;
        let (v0, v1) = valpart.split_once(',').ok_or_else(err)?;
        Ok(BaseTail {
            first_file_block: first.trim().parse().map_err(|_| err())?,
            startbyte: startbyte.trim().parse().map_err(|_| err())?,
            extra: LineExtra::StartVals(
                v0.trim().parse().map_err(|_| err())?,
                v1.trim().parse().map_err(|_| err())?,
            ),
        })
    }

    fn parse_block_line(line: &str) -> Result<BlockLine, ParseIdxError> {
        // "<index>:<v0>,<v1>"
        let err = || ParseIdxError::BadLine(line.to_string());
        let (index, valpart) = line.split_once(':').ok_or_else(err)?;
        let (v0, v1) = valpart.split_once(',').ok_or_else(err)?;
        Ok(BlockLine {
            index: index.trim().parse().map_err(|_| err())?,
            extra: LineExtra::StartVals(
                v0.trim().parse().map_err(|_| err())?,
                v1.trim().parse().map_err(|_| err())?,
            ),
        })
    }

    fn parse_info_line(subdb: &mut Subdb, line: &str) {
        if line.contains("haspartials") {
            if let BlockTables::StartValues { haspartials, .. } = &mut subdb.tables {
                *haspartials = true;
            }
        }
    }

    fn push_extra(subdb: &mut Subdb, extra: LineExtra) {
        let LineExtra::StartVals(v0, v1) = extra else {
            return;
        };
        let packed = (v0 & 0x0f) | v1 << 4;
        if let BlockTables::StartValues { values, .. } = &mut subdb.tables {
            values.push(packed);
        } else {
            subdb.tables = BlockTables::StartValues { values: vec![packed], haspartials: false };
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
        let (v0, v1, haspartials) = Self::start_values(subdb, rel_block);
        let mut bitoff;
        let mut index;
        let mut subi;
        let (mut last, mut cur) = (v0, v1);
        if rel_block == 0 {
            // The subdb's first mini-block is zero-implied.
            subi = subdb.first_subidx_block as usize;
            bitoff = 8 * start_m;
            index = 0;
        } else {
            subi = 0;
            bitoff = 0;
            index = subdb.indices[rel_block];
            out(0, SubIndex { index, state: pack_state(0, last, cur) });
        }
        while subi < end_subi {
            if subi != bitoff / (8 * SUBINDEX_BLOCKSIZE) {
                subi += 1;
                if subi > end_subi {
                    break;
                }
                out(
                    subi,
                    SubIndex {
                        index,
                        state: pack_state(bitoff % (8 * SUBINDEX_BLOCKSIZE), last, cur),
                    },
                );
            }
            match step(data, &mut bitoff, &mut last, &mut cur, haspartials) {
                Step::Run(n) => index += n,
                Step::Escape => {}
                Step::End => {
                    // Trailing mini-blocks hold only padding; park their
                    // entries past every real index so the binary search
                    // never selects them.
                    while subi < end_subi {
                        subi += 1;
                        out(subi, SubIndex { index: u32::MAX, state: 0 });
                    }
                    break;
                }
            }
        }
    }

    fn decode(subdb: &Subdb, tail: &[u8], start: SubIndex, target: u32, rel_block: usize) -> Value {
        let haspartials = Self::haspartials(subdb);
        let _ = rel_block;
        let (mut bitoff, mut last, mut cur) = unpack_state(start.state);
        let mut n = start.index;
        while n <= target {
            match step(tail, &mut bitoff, &mut last, &mut cur, haspartials) {
                Step::Run(r) => n += r,
                Step::Escape => {}
                Step::End => {
                    log::warn!("huffman stream ended inside a lookup");
                    return Value::Unknown;
                }
            }
        }
        Value::from_i32(cur as i32)
    }

    fn subdb_start_state(subdb: &Subdb, skew: usize) -> SubIndex {
        let (v0, v1, _) = Self::start_values(subdb, 0);
        SubIndex { index: 0, state: pack_state(8 * skew, v0, v1) }
    }
}
