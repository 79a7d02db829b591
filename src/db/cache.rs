//! # Block Cache
//!
//! A fixed population of cache blocks threaded on a circular LRU list.
//! Residency is tracked either by a per-file `block -> ccb` array, or (for
//! the Tunstall v1 format, whose per-file arrays would be too sparse) by an
//! open-addressing hashtable keyed on `(file, block)`.
//!
//! The cache itself is format agnostic: the driver reads block bytes into
//! the victim and rebuilds the mini-block sub-indices before advancing the
//! LRU head.  One driver-level mutex serializes all of this; autoloaded
//! files never enter the cache.

use super::{SubIndex, NUM_SUBINDICES};

pub(crate) const UNDEFINED_BLOCK_ID: i32 = -1;
const HT_EMPTY: i32 = -1;
const HT_TOMBSTONE: i32 = -2;

#[derive(Clone)]
pub(crate) struct Ccb {
    next: usize,
    prev: usize,
    pub filenum: i32,
    pub blocknum: u32,
    pub data: Vec<u8>,
    pub subindices: [SubIndex; NUM_SUBINDICES],
}

#[derive(Clone, Copy)]
struct HtSlot {
    filenum: i32,
    blocknum: u32,
    ccb: i32,
}

pub(crate) struct BlockCache {
    ccbs: Vec<Ccb>,
    top: usize,
    file_maps: Vec<Vec<i32>>,
    ht: Vec<HtSlot>,
    tombs: usize,
    hashed: bool,
}

fn cache_hash(tablesize: usize, filenum: u32, blocknum: u32) -> usize {
    let mut h = blocknum | (filenum << 23);
    h = (!h).wrapping_add(h << 15);
    h ^= h >> 12;
    h = h.wrapping_add(h << 2);
    h ^= h >> 4;
    h = h.wrapping_mul(2057);
    h ^= h >> 16;
    h as usize % tablesize
}

impl BlockCache {
    /// `file_blocks[f]` is the block count of file `f` (0 for autoloaded
    /// or absent files, which never enter the cache).
    pub fn new(num_blocks: usize, block_size: usize, file_blocks: &[u32], hashed: bool) -> Self {
        let mut ccbs: Vec<Ccb> = (0..num_blocks)
            .map(|i| Ccb {
                next: (i + 1) % num_blocks.max(1),
                prev: (i + num_blocks.saturating_sub(1)) % num_blocks.max(1),
                filenum: -1,
                blocknum: 0,
                data: vec![0u8; block_size],
                subindices: [SubIndex::default(); NUM_SUBINDICES],
            })
            .collect();
        if let Some(last) = ccbs.last_mut() {
            last.next = 0;
        }
        let file_maps = if hashed {
            Vec::new()
        } else {
            file_blocks
                .iter()
                .map(|&n| vec![UNDEFINED_BLOCK_ID; n as usize])
                .collect()
        };
        let ht_size = if hashed { (num_blocks * 3 / 2).max(16) } else { 0 };
        BlockCache {
            ccbs,
            top: 0,
            file_maps,
            ht: vec![HtSlot { filenum: HT_EMPTY, blocknum: 0, ccb: 0 }; ht_size],
            tombs: 0,
            hashed,
        }
    }

    pub fn num_blocks(&self) -> usize {
        self.ccbs.len()
    }

    pub fn block(&self, ccbi: usize) -> &Ccb {
        &self.ccbs[ccbi]
    }

    pub fn block_mut(&mut self, ccbi: usize) -> &mut Ccb {
        &mut self.ccbs[ccbi]
    }

    /// Is `(file, block)` resident?  Does not touch the LRU order.
    pub fn lookup(&self, filenum: usize, blocknum: u32) -> Option<usize> {
        if self.hashed {
            let mut i = cache_hash(self.ht.len(), filenum as u32, blocknum);
            for _ in 0..self.ht.len() {
                let slot = self.ht[i];
                match slot.filenum {
                    HT_EMPTY => return None,
                    HT_TOMBSTONE => {}
                    f if f as usize == filenum && slot.blocknum == blocknum => {
                        return Some(slot.ccb as usize)
                    }
                    _ => {}
                }
                i = (i + 1) % self.ht.len();
            }
            None
        } else {
            match self.file_maps[filenum][blocknum as usize] {
                UNDEFINED_BLOCK_ID => None,
                ccbi => Some(ccbi as usize),
            }
        }
    }

    /// Splice a resident block to the most recently used position.
    pub fn update_lru(&mut self, ccbi: usize) {
        if ccbi == self.top {
            self.top = self.ccbs[ccbi].next;
            return;
        }
        let (p, n) = (self.ccbs[ccbi].prev, self.ccbs[ccbi].next);
        self.ccbs[p].next = n;
        self.ccbs[n].prev = p;
        let tail = self.ccbs[self.top].prev;
        self.ccbs[tail].next = ccbi;
        self.ccbs[ccbi].prev = tail;
        self.ccbs[ccbi].next = self.top;
        self.ccbs[self.top].prev = ccbi;
    }

    /// Claim the least recently used block for `(file, block)`, dropping
    /// whatever it previously held.  The caller fills `data`, rebuilds the
    /// sub-indices, then calls `finish_load`.
    pub fn take_victim(&mut self, filenum: usize, blocknum: u32) -> usize {
        let ccbi = self.top;
        let old = self.ccbs[ccbi].filenum;
        if old >= 0 {
            let old_block = self.ccbs[ccbi].blocknum;
            self.unmap(old as usize, old_block);
        }
        self.ccbs[ccbi].filenum = filenum as i32;
        self.ccbs[ccbi].blocknum = blocknum;
        self.map(filenum, blocknum, ccbi);
        ccbi
    }

    /// Advance the LRU head past a block just loaded into the victim,
    /// making it the most recently used.
    pub fn finish_load(&mut self, ccbi: usize) {
        debug_assert_eq!(ccbi, self.top);
        self.top = self.ccbs[ccbi].next;
    }

    fn map(&mut self, filenum: usize, blocknum: u32, ccbi: usize) {
        if self.hashed {
            if self.tombs > self.ht.len() / 4 {
                self.rebuild_ht();
            }
            let mut i = cache_hash(self.ht.len(), filenum as u32, blocknum);
            loop {
                match self.ht[i].filenum {
                    HT_EMPTY => break,
                    HT_TOMBSTONE => {
                        self.tombs -= 1;
                        break;
                    }
                    _ => i = (i + 1) % self.ht.len(),
                }
            }
            self.ht[i] = HtSlot { filenum: filenum as i32, blocknum, ccb: ccbi as i32 };
        } else {
            self.file_maps[filenum][blocknum as usize] = ccbi as i32;
        }
    }

    fn unmap(&mut self, filenum: usize, blocknum: u32) {
        if self.hashed {
            let mut i = cache_hash(self.ht.len(), filenum as u32, blocknum);
            for _ in 0..self.ht.len() {
                let slot = self.ht[i];
                match slot.filenum {
                    HT_EMPTY => return,
                    f if f >= 0 && f as usize == filenum && slot.blocknum == blocknum => {
                        self.ht[i].filenum = HT_TOMBSTONE;
                        self.tombs += 1;
                        return;
                    }
                    _ => {}
                }
                i = (i + 1) % self.ht.len();
            }
        } else {
            self.file_maps[filenum][blocknum as usize] = UNDEFINED_BLOCK_ID;
        }
    }

    fn rebuild_ht(&mut self) {
        for slot in self.ht.iter_mut() {
            slot.filenum = HT_EMPTY;
        }
        self.tombs = 0;
        for i in 0..self.ccbs.len() {
            let (f, b) = (self.ccbs[i].filenum, self.ccbs[i].blocknum);
            if f >= 0 {
                let mut j = cache_hash(self.ht.len(), f as u32, b);
                while self.ht[j].filenum != HT_EMPTY {
                    j = (j + 1) % self.ht.len();
                }
                self.ht[j] = HtSlot { filenum: f, blocknum: b, ccb: i as i32 };
            }
        }
    }

    /// Mean probe distance over resident blocks; the v1 stats report it.
    pub fn avg_probe_length(&self) -> f32 {
        if !self.hashed {
            return 0.0;
        }
        let mut count = 0u32;
        let mut total = 0u32;
        for ccb in &self.ccbs {
            if ccb.filenum < 0 {
                continue;
            }
            let mut i = cache_hash(self.ht.len(), ccb.filenum as u32, ccb.blocknum);
            let mut probes = 1;
            while !(self.ht[i].filenum == ccb.filenum && self.ht[i].blocknum == ccb.blocknum) {
                i = (i + 1) % self.ht.len();
                probes += 1;
            }
            count += 1;
            total += probes;
        }
        if count == 0 {
            0.0
        } else {
            total as f32 / count as f32
        }
    }
}
