//! # MTC Probe
//!
//! Rank the moves of a known win or loss by moves-to-conversion.  The MTC
//! database stores distances at half-move granularity, so adjacent
//! positions can decode to the same value; the probe fixes the parity
//! against the parent's distance.  Returns `None` when the caller should
//! fall back to a heuristic search (short distances are not stored).

use super::{MoveDistance, WldSearch};
use crate::db::mtc::{MtcDriver, MTC_LESS_THAN_THRESHOLD};
use crate::db::Value;
use crate::engine::movegen::is_conversion_move;
use crate::engine::{Color, Position};

pub fn mtc_probe(
    wld: &mut WldSearch,
    mtc: &MtcDriver,
    board: &Position,
    color: Color,
    movelist: &[Position],
) -> Option<(Value, Vec<MoveDistance>)> {
    let npieces = board.occupied().count_ones();
    if npieces > wld.dbpieces {
        return None;
    }

    // If this position is not in the mtc db the caller searches instead.
    let parent_distance = mtc.lookup(board, color, false);
    if parent_distance == MTC_LESS_THAN_THRESHOLD {
        return None;
    }

    let egdb_value = wld.lookup_with_search(board, color, false);
    if egdb_value != Value::Win && egdb_value != Value::Loss {
        return None;
    }

    let mut dists: Vec<MoveDistance> = Vec::new();
    if egdb_value == Value::Win {
        for (i, succ) in movelist.iter().enumerate() {
            let successor = wld.lookup_with_search(succ, color.opposite(), false);
            match successor {
                Value::Loss => {
                    let distance = mtc.lookup(succ, color.opposite(), false);
                    // A short win hides its distance; let the search
                    // find the move.
                    if distance == MTC_LESS_THAN_THRESHOLD {
                        return None;
                    }
                    dists.push(MoveDistance { distance, move_index: i });
                }
                Value::Draw | Value::Win => {}
                _ => return None,
            }
        }
        if dists.is_empty() {
            return None;
        }
        dists.sort_by_key(|d| d.distance);
    } else {
        for (i, succ) in movelist.iter().enumerate() {
            if is_conversion_move(board, succ, color) {
                continue;
            }
            let distance = mtc.lookup(succ, color.opposite(), false);
            if distance == MTC_LESS_THAN_THRESHOLD {
                continue;
            }
            dists.push(MoveDistance { distance, move_index: i });
        }
        if dists.is_empty() {
            return None;
        }
        dists.sort_by_key(|d| std::cmp::Reverse(d.distance));
    }

    // Distances are stored at two-ply granularity; when the best child
    // reads the same as the parent, the true distances are one less.
    if parent_distance == dists[0].distance {
        for d in dists.iter_mut() {
            d.distance -= 1;
        }
    }

    Some((egdb_value, dists))
}
