//! # DTW Resolution
//!
//! The DTW database stores depths only for positions it can answer
//! directly; capture positions resolve through a shallow search that pairs
//! each candidate move with the WLD shim.  Depths are in plies here: wins
//! are odd, losses even.

use super::{MoveDistance, WldSearch};
use crate::db::dtw::DtwDriver;
use crate::db::Value;
use crate::engine::movegen::{build_jump_list, build_nonjump_list, can_jump};
use crate::engine::{Color, Position};
use std::time::Instant;

pub const DTW_DRAW: i32 = 1000;
pub const DTW_UNKNOWN: i32 = -1;
pub const DTW_ABORTED: i32 = -2;

const MAXDEPTH: usize = 32;

pub struct DtwSearch<'a, 'b> {
    wld: &'a mut WldSearch<'b>,
    dtw: &'a DtwDriver,
    timeout_ms: u64,
    nodes: u64,
    maxdepth_reached: usize,
    start: Instant,
}

impl<'a, 'b> DtwSearch<'a, 'b> {
    pub fn new(wld: &'a mut WldSearch<'b>, dtw: &'a DtwDriver) -> Self {
        DtwSearch {
            wld,
            dtw,
            timeout_ms: 5000,
            nodes: 0,
            maxdepth_reached: 0,
            start: Instant::now(),
        }
    }

    pub fn set_search_timeout(&mut self, msec: u64) {
        self.timeout_ms = msec;
    }

    pub fn get_nodes(&self) -> u64 {
        self.nodes
    }

    pub fn get_maxdepth(&self) -> usize {
        self.maxdepth_reached
    }

    fn wld_opposite(value: Value) -> Value {
        match value {
            Value::Win => Value::Loss,
            Value::Loss => Value::Win,
            other => other,
        }
    }

    fn timed_out(&self) -> bool {
        self.timeout_ms != 0 && self.start.elapsed().as_millis() as u64 >= self.timeout_ms
    }

    fn search(
        &mut self,
        board: &Position,
        color: Color,
        depth: usize,
        maxdepth: usize,
        expected_wld: Value,
    ) -> i32 {
        self.nodes += 1;
        if depth > self.maxdepth_reached {
            self.maxdepth_reached = depth;
        }

        let capture = can_jump(board, color);
        if !capture {
            let dtw_val = self.dtw.lookup(board, color, false);
            if dtw_val >= 0 {
                // A direct depth: translate to plies.
                if expected_wld == Value::Win {
                    return 2 * dtw_val + 1;
                }
                if expected_wld == Value::Loss {
                    return 2 * dtw_val;
                }
            }
        }

        if depth >= maxdepth {
            return DTW_UNKNOWN;
        }

        let movelist = if capture {
            build_jump_list(board, color)
        } else {
            build_nonjump_list(board, color)
        };
        if movelist.is_empty() {
            return 0;
        }

        let mut bestvalue = if expected_wld == Value::Win { 511 } else { 0 };
        for succ in &movelist {
            let successor_wld = self.wld.lookup_with_search(succ, color.opposite(), false);
            if self.timed_out() {
                return DTW_ABORTED;
            }
            if successor_wld == Value::Unknown {
                return DTW_UNKNOWN;
            }
            if expected_wld == Value::Win && successor_wld != Value::Loss {
                continue;
            }
            let dtw_val = self.search(
                succ,
                color.opposite(),
                depth + 1,
                maxdepth,
                Self::wld_opposite(expected_wld),
            );
            if dtw_val == DTW_UNKNOWN || dtw_val == DTW_ABORTED {
                return dtw_val;
            }
            if expected_wld == Value::Win {
                bestvalue = bestvalue.min(dtw_val);
            } else {
                bestvalue = bestvalue.max(dtw_val);
            }
        }
        1 + bestvalue
    }

    /// Distance to win of `board` in plies, with the per-move distances in
    /// `dists` ordered best first.  Draws return `DTW_DRAW`; an exhausted
    /// budget returns `DTW_UNKNOWN`.
    pub fn lookup_with_search(
        &mut self,
        board: &Position,
        color: Color,
        dists: &mut Vec<MoveDistance>,
    ) -> i32 {
        dists.clear();
        self.nodes = 0;
        self.maxdepth_reached = 0;
        self.start = Instant::now();
        if self.timeout_ms != 0 {
            self.wld.set_search_timeout(self.timeout_ms);
        }

        let wld_val = self.wld.lookup_with_search(board, color, false);
        match wld_val {
            Value::Draw => return DTW_DRAW,
            Value::Unknown => return DTW_UNKNOWN,
            _ => {}
        }

        let movelist = if can_jump(board, color) {
            build_jump_list(board, color)
        } else {
            build_nonjump_list(board, color)
        };
        if movelist.is_empty() {
            return 0;
        }

        let mut go_deeper = false;
        for maxdepth in 0..MAXDEPTH {
            for (i, succ) in movelist.iter().enumerate() {
                if dists.iter().any(|d| d.move_index == i) {
                    continue;
                }
                let successor_wld = self.wld.lookup_with_search(succ, color.opposite(), false);
                if successor_wld == Value::Unknown {
                    return DTW_UNKNOWN;
                }
                if wld_val == Value::Win && successor_wld != Value::Loss {
                    continue;
                }
                if self.timed_out() {
                    return DTW_UNKNOWN;
                }
                let dtw_val = self.search(
                    succ,
                    color.opposite(),
                    0,
                    maxdepth,
                    Self::wld_opposite(wld_val),
                );
                if dtw_val == DTW_ABORTED {
                    return DTW_UNKNOWN;
                }
                if dtw_val == DTW_UNKNOWN {
                    go_deeper = true;
                    continue;
                }
                if dtw_val == DTW_DRAW {
                    continue;
                }
                dists.push(MoveDistance { distance: dtw_val + 1, move_index: i });
            }
            if !go_deeper {
                break;
            }
            go_deeper = false;
        }

        if dists.is_empty() {
            return DTW_UNKNOWN;
        }
        if wld_val == Value::Win {
            dists.sort_by_key(|d| d.distance);
        } else {
            dists.sort_by_key(|d| std::cmp::Reverse(d.distance));
        }
        dists[0].distance
    }
}
