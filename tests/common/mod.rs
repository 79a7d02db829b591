//! Shared helpers for the database tests: a retrograde oracle for the
//! 2-piece endgames and encoders that write synthetic databases in each
//! on-disk format.  The encoders lean on the crate's own public tables so
//! encoder and decoder cannot drift apart.

#![allow(dead_code)]

use damdb::db::huffman;
use damdb::db::mtc::{MTC_SKIP, MTC_SKIPS};
use damdb::db::runlen::runlength;
use damdb::db::tunstall::{catalog_strings, virtual_to_real};
use damdb::db::Value;
use damdb::engine::movegen::{build_movelist, can_jump};
use damdb::engine::{Color, Position};
use damdb::indexing::{index_to_position, position_to_index, slice_size, Slice};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;

pub type SliceKey = (usize, usize, usize, usize, u8);

pub fn key(s: &Slice, color: Color) -> SliceKey {
    (s.nbm, s.nbk, s.nwm, s.nwk, color as u8)
}

/// Game-theoretic values of every position with one piece per side,
/// computed by win/loss propagation to a fixpoint; the remainder draws.
pub struct Oracle {
    values: HashMap<SliceKey, Vec<Option<Value>>>,
}

pub fn two_piece_slices() -> Vec<Slice> {
    vec![
        Slice::new(1, 0, 1, 0),
        Slice::new(1, 0, 0, 1),
        Slice::new(0, 1, 1, 0),
        Slice::new(0, 1, 0, 1),
    ]
}

impl Oracle {
    pub fn build() -> Oracle {
        let slices = two_piece_slices();
        let mut values: HashMap<SliceKey, Vec<Option<Value>>> = HashMap::new();
        for s in &slices {
            for color in [Color::Black, Color::White] {
                values.insert(key(s, color), vec![None; slice_size(s) as usize]);
            }
        }

        let succ_value = |values: &HashMap<SliceKey, Vec<Option<Value>>>,
                          succ: &Position,
                          to_move: Color|
         -> Option<Value> {
            if succ.pieces(to_move) == 0 {
                return Some(Value::Loss);
            }
            if succ.pieces(to_move.opposite()) == 0 {
                return Some(Value::Win);
            }
            let s = Slice::of(succ);
            let idx = position_to_index(succ, &s) as usize;
            values[&key(&s, to_move)][idx]
        };

        loop {
            let mut changed = false;
            for s in &slices {
                for color in [Color::Black, Color::White] {
                    let size = slice_size(s) as usize;
                    for idx in 0..size {
                        if values[&key(s, color)][idx].is_some() {
                            continue;
                        }
                        let pos = index_to_position(idx as u64, s);
                        let movelist = build_movelist(&pos, color);
                        let resolved = if movelist.is_empty() {
                            Some(Value::Loss)
                        } else {
                            let mut all_known = true;
                            let mut won = false;
                            let mut any_draw = false;
                            for succ in &movelist {
                                match succ_value(&values, succ, color.opposite()) {
                                    Some(Value::Loss) => {
                                        won = true;
                                        break;
                                    }
                                    Some(Value::Draw) => any_draw = true,
                                    Some(Value::Win) => {}
                                    _ => all_known = false,
                                }
                            }
                            if won {
                                Some(Value::Win)
                            } else if all_known {
                                Some(if any_draw { Value::Draw } else { Value::Loss })
                            } else {
                                None
                            }
                        };
                        if resolved.is_some() {
                            values.get_mut(&key(s, color)).unwrap()[idx] = resolved;
                            changed = true;
                        }
                    }
                }
            }
            if !changed {
                break;
            }
        }

        Oracle { values }
    }

    /// The true value of a 2-piece position.
    pub fn value(&self, pos: &Position, color: Color) -> Value {
        let s = Slice::of(pos);
        let idx = position_to_index(pos, &s) as usize;
        self.values[&key(&s, color)][idx].unwrap_or(Value::Draw)
    }

    /// What a complete WLD database stores at this index: the true value,
    /// except capture positions which are stored as unknown.
    pub fn stored(&self, s: &Slice, color: Color, idx: u64) -> Value {
        let pos = index_to_position(idx, s);
        if can_jump(&pos, color) {
            Value::Unknown
        } else {
            self.values[&key(s, color)][idx as usize].unwrap_or(Value::Draw)
        }
    }
}

// ---------------------------------------------------------------------------
// WLD database builders
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum WldFormat {
    Runlen,
    TunV1,
    TunV2,
    Huffman,
}

impl WldFormat {
    fn data_ext(self) -> &'static str {
        match self {
            WldFormat::TunV2 => "cpr1",
            _ => "cpr",
        }
    }

    fn index_ext(self) -> &'static str {
        match self {
            WldFormat::TunV2 => "idx1",
            _ => "idx",
        }
    }

    fn file_blocksize(self) -> usize {
        match self {
            WldFormat::TunV1 => 1024,
            _ => 4096,
        }
    }
}

const CACHE_BLOCKSIZE: usize = 4096;

pub struct WldDbBuilder {
    pub format: WldFormat,
    pub catalog_entry: usize,
    pub perm: u8,
    pub haspartials: bool,
    data: Vec<u8>,
    idx: String,
}

fn rle(values: &[Value]) -> Vec<(Value, u64)> {
    let mut runs: Vec<(Value, u64)> = Vec::new();
    for &v in values {
        match runs.last_mut() {
            Some((rv, n)) if *rv == v => *n += 1,
            _ => runs.push((v, 1)),
        }
    }
    runs
}

impl WldDbBuilder {
    pub fn new(format: WldFormat) -> Self {
        WldDbBuilder {
            format,
            catalog_entry: 0,
            perm: 0xe4,
            haspartials: false,
            data: Vec::new(),
            idx: String::new(),
        }
    }

    fn base_prefix(&self, s: &Slice, color: Color) -> String {
        format!(
            "BASE{},{},{},{},0,{}:",
            s.nbm,
            s.nbk,
            s.nwm,
            s.nwk,
            if color == Color::Black { 'b' } else { 'w' }
        )
    }

    pub fn add_single(&mut self, s: &Slice, color: Color, marker: char) {
        let base = self.base_prefix(s, color);
        writeln!(self.idx, "{}{}", base, marker).unwrap();
    }

    pub fn add_values(&mut self, s: &Slice, color: Color, values: &[Value]) {
        match self.format {
            WldFormat::Huffman => self.add_values_huffman(s, color, values),
            _ => self.add_values_bytes(s, color, values),
        }
    }

    /// Token bytes for one subdb in the run-length encoding.  The format
    /// is three valued; unknowns in the input (capture positions) are
    /// don't-care and folded into the neighboring values.
    fn runlen_tokens(values: &[Value]) -> Vec<u8> {
        let mut filled: Vec<Value> = Vec::with_capacity(values.len());
        let mut last = values
            .iter()
            .copied()
            .find(|v| *v != Value::Unknown)
            .unwrap_or(Value::Draw);
        for &v in values {
            if v != Value::Unknown {
                last = v;
            }
            filled.push(last);
        }

        let digit = |v: Value| match v {
            Value::Win => 0u16,
            Value::Draw => 1,
            Value::Loss => 2,
            _ => unreachable!("input was filled to three values"),
        };
        let mut out = Vec::new();
        let mut i = 0;
        while i < filled.len() {
            let v = filled[i];
            let mut run = 1;
            while i + run < filled.len() && filled[i + run] == v {
                run += 1;
            }
            if run >= 5 {
                // Largest run token of this value's family that fits.
                let family = digit(v) as usize;
                let mut best: Option<(u8, u32)> = None;
                for b in 81u16..255 {
                    let b = b as u8;
                    if (b as usize - 81) / 58 != family {
                        continue;
                    }
                    let r = runlength(b);
                    if r as usize <= run && best.map_or(true, |(_, br)| r > br) {
                        best = Some((b, r));
                    }
                }
                let (b, r) = best.expect("skip of five always fits");
                out.push(b);
                i += r as usize;
                continue;
            }
            // Pack four positions, repeating the last value past the end.
            let mut byte = 0u16;
            for k in 0..4 {
                let vk = filled.get(i + k).copied().unwrap_or(*filled.last().unwrap());
                byte = byte * 3 + digit(vk);
            }
            out.push(byte as u8);
            i += 4;
        }
        out
    }

    /// Token bytes for one subdb under a Tunstall dictionary.
    fn tunstall_tokens(&self, values: &[Value]) -> Vec<u8> {
        let strings = catalog_strings(self.catalog_entry);
        // Virtual value of each real value under this builder's mapping.
        let mut real_to_virtual = [0u8; 4];
        for v in 0..4u8 {
            real_to_virtual[virtual_to_real(self.perm, v) as usize] = v;
        }
        let virt: Vec<u8> = values
            .iter()
            .map(|&v| real_to_virtual[v.to_i32() as usize & 3])
            .collect();

        let mut out = Vec::new();
        let mut i = 0;
        while i < virt.len() {
            let rest = &virt[i..];
            let byte = strings
                .iter()
                .position(|s| {
                    let n = s.len().min(rest.len());
                    s[..n] == rest[..n]
                })
                .expect("complete dictionary always matches");
            out.push(byte as u8);
            i += strings[byte].len();
        }
        out
    }

    fn add_values_bytes(&mut self, s: &Slice, color: Color, values: &[Value]) {
        let tokens = match self.format {
            WldFormat::Runlen => Self::runlen_tokens(values),
            _ => self.tunstall_tokens(values),
        };
        let fb = self.format.file_blocksize();
        let start = self.data.len();
        let extras = match self.format {
            WldFormat::TunV2 => format!(",{},{}", self.catalog_entry, self.perm),
            _ => String::new(),
        };
        let base = self.base_prefix(s, color);
        writeln!(self.idx, "{}{}/{}{}", base, start / fb, start % fb, extras).unwrap();
        if self.format == WldFormat::TunV1 {
            writeln!(self.idx, "# vmap {}: 0,1,2,3,4,5", self.catalog_entry).unwrap();
        }

        let format = self.format;
        let entry = self.catalog_entry;
        let runlen_of = move |b: u8| -> u64 {
            match format {
                WldFormat::Runlen => runlength(b) as u64,
                _ => catalog_strings(entry)[b as usize].len() as u64,
            }
        };
        let mut covered: u64 = 0;
        for (k, &b) in tokens.iter().enumerate() {
            if k > 0 && self.data.len() % fb == 0 {
                writeln!(self.idx, "{}{}", covered, extras).unwrap();
            }
            self.data.push(b);
            covered += runlen_of(b);
        }
    }

    fn add_values_huffman(&mut self, s: &Slice, color: Color, values: &[Value]) {
        let t = huffman::tables();
        let runs = rle(values);
        assert!(!runs.is_empty());
        // Never begin a stream in the tail of a block.
        while CACHE_BLOCKSIZE - self.data.len() % CACHE_BLOCKSIZE < 16 {
            self.data.push(0);
        }
        let start = self.data.len();

        let mut writer = LsbWriter::new(&mut self.data);
        let mut blocks: Vec<(u64, u8, u8)> = Vec::new();

        let mut queue: std::collections::VecDeque<(u8, u64)> = runs
            .iter()
            .map(|&(v, n)| (v.to_i32() as u8, n))
            .collect();
        let mut covered: u64 = 0;

        fn open_block(
            queue: &std::collections::VecDeque<(u8, u64)>,
            covered: u64,
            blocks: &mut Vec<(u64, u8, u8)>,
        ) -> (u8, u8) {
            let v0 = queue[0].0;
            let v1 = queue.get(1).map(|r| r.0).unwrap_or(0);
            blocks.push((covered, v0, v1));
            (v0, v1)
        }
        let (mut last, mut cur) = open_block(&queue, covered, &mut blocks);

        while let Some(&(value, len)) = queue.front() {
            // Close the block when the worst-case emission no longer fits.
            if writer.block_bits_left(CACHE_BLOCKSIZE) < 96 {
                writer.push(0, 14);
                writer.pad_to_byte();
                writer.pad_to_block(CACHE_BLOCKSIZE);
                let (l, c) = open_block(&queue, covered, &mut blocks);
                last = l;
                cur = c;
            }
            assert_eq!(last, value, "prediction invariant broken");

            // Announce the value of the run after this one if mispredicted.
            if let Some(&(next_value, _)) = queue.get(1) {
                if cur != next_value {
                    announce(&mut writer, &mut last, &mut cur, next_value, self.haspartials);
                }
            }

            // One symbol covers the whole run.
            if len <= 32 {
                let sym = &t.runs[(len - 1) as usize];
                writer.push(sym.pattern as u32, sym.length as usize);
            } else if len <= 0xffff {
                writer.push(t.arb16 as u32, t.escape_length as usize);
                writer.push(len as u32, 16);
            } else {
                writer.push(t.arb32 as u32, t.escape_length as usize);
                writer.push(len as u32, 32);
            }
            covered += len;
            std::mem::swap(&mut last, &mut cur);
            queue.pop_front();
        }
        writer.push(0, 14);
        writer.pad_to_byte();
        drop(writer);

        let fb = self.format.file_blocksize();
        let base = self.base_prefix(s, color);
        writeln!(
            self.idx,
            "{}{},{}:{},{}",
            base,
            start / fb,
            start % fb,
            blocks[0].1,
            blocks[0].2
        )
        .unwrap();
        if self.haspartials {
            writeln!(self.idx, "# haspartials").unwrap();
        }
        for &(index, v0, v1) in &blocks[1..] {
            writeln!(self.idx, "{}:{},{}", index, v0, v1).unwrap();
        }
    }

    pub fn write(&self, dir: &Path, name: &str) {
        std::fs::write(dir.join(format!("{}.{}", name, self.format.data_ext())), &self.data)
            .unwrap();
        std::fs::write(dir.join(format!("{}.{}", name, self.format.index_ext())), &self.idx)
            .unwrap();
    }
}

/// Emit the escape announcing `target` as the value of the run after
/// next.  Without partials, a draw announcement may need an intermediate
/// escape so the third-value toggle lands on draw.
fn announce(writer: &mut LsbWriter, last: &mut u8, cur: &mut u8, target: u8, haspartials: bool) {
    let t = huffman::tables();
    let draw = Value::Draw.to_i32() as u8;
    if target == draw && !haspartials {
        if huffman::mispredict_value(*last, *cur) != draw {
            let intermediate = if *last == Value::Loss.to_i32() as u8 {
                Value::Win.to_i32() as u8
            } else {
                Value::Loss.to_i32() as u8
            };
            writer.push(t.mispredict[intermediate as usize] as u32, t.escape_length as usize);
            *cur = intermediate;
        }
        assert_eq!(huffman::mispredict_value(*last, *cur), draw);
        writer.push(t.mispredict[draw as usize] as u32, t.escape_length as usize);
        *cur = draw;
    } else {
        writer.push(t.mispredict[target as usize] as u32, t.escape_length as usize);
        *cur = target;
    }
}

/// Bit writer in the Huffman stream's order: first pushed bit is the
/// lowest bit of its byte.
pub struct LsbWriter<'a> {
    out: &'a mut Vec<u8>,
    nbits: usize,
}

impl<'a> LsbWriter<'a> {
    pub fn new(out: &'a mut Vec<u8>) -> Self {
        LsbWriter { out, nbits: 0 }
    }

    pub fn push(&mut self, pattern: u32, len: usize) {
        for i in 0..len {
            if self.nbits == 0 {
                self.out.push(0);
            }
            if pattern >> i & 1 != 0 {
                let byte = self.out.last_mut().unwrap();
                *byte |= 1 << self.nbits;
            }
            self.nbits = (self.nbits + 1) % 8;
        }
    }

    pub fn pad_to_byte(&mut self) {
        self.nbits = 0;
    }

    pub fn pad_to_block(&mut self, block: usize) {
        self.pad_to_byte();
        while self.out.len() % block != 0 {
            self.out.push(0);
        }
    }

    /// Bits still available in the current block.
    pub fn block_bits_left(&self, block: usize) -> usize {
        let used = match self.nbits {
            0 => self.out.len() % block * 8,
            n => {
                let inblock = match self.out.len() % block {
                    0 => block,
                    b => b,
                };
                (inblock - 1) * 8 + n
            }
        };
        block * 8 - used
    }
}

// ---------------------------------------------------------------------------
// MTC database builder
// ---------------------------------------------------------------------------

/// One MTC entry: either below the threshold or an even ply distance.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MtcEntry {
    Short,
    Plies(u32),
}

pub struct MtcDbBuilder {
    data: Vec<u8>,
    idx: String,
}

impl MtcDbBuilder {
    pub fn new() -> Self {
        MtcDbBuilder { data: Vec::new(), idx: String::new() }
    }

    pub fn add_values(&mut self, s: &Slice, color: Color, entries: &[MtcEntry]) {
        let start = self.data.len();
        writeln!(
            self.idx,
            "BASE{},{},{},{},0,{}:{}/{}",
            s.nbm,
            s.nbk,
            s.nwm,
            s.nwk,
            if color == Color::Black { 'b' } else { 'w' },
            start / 4096,
            start % 4096,
        )
        .unwrap();

        let mut covered: u64 = 0;
        let mut push = |me: &mut Self, byte: u8, run: u64, covered: &mut u64| {
            if *covered > 0 && me.data.len() % 4096 == 0 {
                writeln!(me.idx, "{}", covered).unwrap();
            }
            me.data.push(byte);
            *covered += run;
        };

        let mut i = 0;
        while i < entries.len() {
            match entries[i] {
                MtcEntry::Plies(d) => {
                    assert!(d % 2 == 0 && d / 2 + MTC_SKIPS as u32 <= 255);
                    push(self, (MTC_SKIPS as u32 + d / 2) as u8, 1, &mut covered);
                    i += 1;
                }
                MtcEntry::Short => {
                    let mut run = 1;
                    while i + run < entries.len() && entries[i + run] == MtcEntry::Short {
                        run += 1;
                    }
                    let mut remaining = run;
                    while remaining > 0 {
                        let (byte, r) = (0..MTC_SKIPS)
                            .filter(|&b| MTC_SKIP[b] as usize <= remaining)
                            .map(|b| (b as u8, MTC_SKIP[b] as usize))
                            .max_by_key(|&(_, r)| r)
                            .expect("skip of one always fits");
                        push(self, byte, r as u64, &mut covered);
                        remaining -= r;
                    }
                    i += run;
                }
            }
        }
    }

    pub fn write(&self, dir: &Path, name: &str) {
        std::fs::write(dir.join(format!("{}.cpr_mtc", name)), &self.data).unwrap();
        std::fs::write(dir.join(format!("{}.idx_mtc", name)), &self.idx).unwrap();
    }
}

// ---------------------------------------------------------------------------
// DTW database builder
// ---------------------------------------------------------------------------

const DTW_MINI: usize = 512;
const DTW_MINIS_PER_BLOCK: usize = 8;

pub struct DtwDbBuilder {
    data: Vec<u8>,
    idx: Vec<u8>,
}

/// Bit writer in the DTW stream's order: 32-bit little-endian words,
/// codes consumed from the most significant end.
struct MsbWordWriter {
    words: Vec<u32>,
    acc: u64,
    bits: usize,
}

impl MsbWordWriter {
    fn new() -> Self {
        MsbWordWriter { words: Vec::new(), acc: 0, bits: 0 }
    }

    fn push(&mut self, code_leftjust: u32, len: usize) {
        self.acc = self.acc << len | (code_leftjust >> (32 - len)) as u64;
        self.bits += len;
        while self.bits >= 32 {
            self.words.push((self.acc >> (self.bits - 32)) as u32);
            self.bits -= 32;
            self.acc &= (1u64 << self.bits) - 1;
        }
    }

    fn finish(mut self) -> Vec<u8> {
        if self.bits > 0 {
            self.words.push((self.acc << (32 - self.bits)) as u32);
        }
        let mut out = Vec::with_capacity(self.words.len() * 4);
        for w in self.words {
            out.extend_from_slice(&w.to_le_bytes());
        }
        out
    }
}

impl DtwDbBuilder {
    pub fn new() -> Self {
        DtwDbBuilder { data: Vec::new(), idx: Vec::new() }
    }

    /// Encode one subslice of depths.  The grammar is terminals only; the
    /// codebook gives every possible depth value an equal-length code.
    pub fn add_values(&mut self, s: &Slice, color: Color, subslice: u16, depths: &[u16]) {
        let max_depth = depths.iter().copied().max().unwrap_or(0);
        let nsyms = max_depth as usize + 1;
        let codelength: u8 = 10;
        assert!(nsyms <= 1 << (codelength - 1));

        let mut codes: Vec<damdb::db::dtw::Huffcode> = (0..nsyms)
            .map(|v| damdb::db::dtw::Huffcode {
                value: v as u16,
                codelength,
                huffcode: 0,
            })
            .collect();
        damdb::db::dtw::generate_codes(&mut codes);
        let code_of = |v: u16| codes.iter().find(|c| c.value == v).unwrap().huffcode;

        // Pack values into 512-byte mini-blocks.
        let first_mini_global = self.data.len() / DTW_MINI;
        let mut mini_lengths: Vec<u32> = Vec::new();
        let mut i = 0;
        while i < depths.len() {
            let mut w = MsbWordWriter::new();
            let mut count = 0u32;
            while i < depths.len() && (count as usize + 1) * codelength as usize <= DTW_MINI * 8 {
                w.push(code_of(depths[i]), codelength as usize);
                count += 1;
                i += 1;
            }
            let mut bytes = w.finish();
            bytes.resize(DTW_MINI, 0);
            self.data.extend_from_slice(&bytes);
            mini_lengths.push(count);
        }

        let first_idx_block = (first_mini_global / DTW_MINIS_PER_BLOCK) as u32;
        let first_miniblock = (first_mini_global % DTW_MINIS_PER_BLOCK) as u16;
        let num_idx_blocks =
            ((first_miniblock as usize + mini_lengths.len() + DTW_MINIS_PER_BLOCK - 1)
                / DTW_MINIS_PER_BLOCK) as u32;

        // Header, little endian throughout.
        let idx = &mut self.idx;
        idx.push((s.npieces()) as u8);
        idx.push(s.nbm as u8);
        idx.push(s.nbk as u8);
        idx.push(s.nwm as u8);
        idx.push(s.nwk as u8);
        idx.push(color as u8);
        idx.extend_from_slice(&subslice.to_le_bytes());
        idx.push(0); // permutation
        idx.extend_from_slice(&(nsyms as u16).to_le_bytes());
        for _ in 0..nsyms {
            idx.extend_from_slice(&0x7fffu16.to_le_bytes());
            idx.extend_from_slice(&0u16.to_le_bytes());
        }
        idx.extend_from_slice(&(nsyms as u16).to_le_bytes());
        for v in 0..nsyms as u16 {
            idx.extend_from_slice(&v.to_le_bytes());
            idx.push(codelength);
        }
        idx.extend_from_slice(&first_idx_block.to_le_bytes());
        idx.extend_from_slice(&first_miniblock.to_le_bytes());
        idx.extend_from_slice(&num_idx_blocks.to_le_bytes());
        idx.extend_from_slice(&(mini_lengths.len() as u32).to_le_bytes());
        let packed_len = (mini_lengths.len() * 17).div_ceil(8);
        let mut packed = vec![0u8; packed_len];
        for (i, &len) in mini_lengths.iter().enumerate() {
            let bit = i * 17;
            for k in 0..17 {
                if len >> k & 1 != 0 {
                    packed[(bit + k) / 8] |= 1 << ((bit + k) % 8);
                }
            }
        }
        idx.extend_from_slice(&packed);
    }

    pub fn write(&self, dir: &Path, name: &str) {
        std::fs::write(dir.join(format!("{}.cpr_dtw", name)), &self.data).unwrap();
        std::fs::write(dir.join(format!("{}.idx_dtw", name)), &self.idx).unwrap();
    }
}

// ---------------------------------------------------------------------------
// Deterministic value streams for the structural tests
// ---------------------------------------------------------------------------

/// xorshift-based value at `index`, over the three exact values plus an
/// occasional unknown so every token family is exercised.
pub fn noisy_value(seed: u64, index: u64) -> Value {
    let mut x = seed ^ index.wrapping_mul(0x9e3779b97f4a7c15);
    x ^= x >> 33;
    x = x.wrapping_mul(0xff51afd7ed558ccd);
    x ^= x >> 29;
    match x % 16 {
        0..=6 => Value::Win,
        7..=12 => Value::Draw,
        13..=14 => Value::Loss,
        _ => Value::Unknown,
    }
}

/// Clumpy value stream: long runs broken by noise, the shape real
/// databases have.
pub fn clumpy_value(seed: u64, index: u64) -> Value {
    let clump = index / 997;
    let mut x = seed ^ clump.wrapping_mul(0x2545f4914f6cdd1d);
    x ^= x >> 31;
    match x % 8 {
        0..=3 => Value::Draw,
        4..=5 => Value::Win,
        6 => Value::Loss,
        _ => noisy_value(seed, index),
    }
}
