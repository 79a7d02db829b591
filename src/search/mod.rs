//! # Search Shim
//!
//! Resolves positions the database cannot answer directly: the side to
//! move has a capture (capture positions are never stored), or the slice
//! elides positions with a non-side-to-move capture, or the caller wants a
//! stored value re-derived from its successors (self-verification).
//!
//! The search is a small alpha-beta over the five-value lattice
//! `LOSS < DRAW_OR_LOSS < DRAW < WIN_OR_DRAW < WIN` augmented with
//! `UNKNOWN`, iteratively deepened until the value is exact.  Draws by
//! repetition are detected against the search stack; a repetition is only
//! possible while no man has moved, so the scan stops at the first frame
//! with a different men mask.  Node and wall-clock budgets abort the
//! search with `UNKNOWN`.

pub mod dtw;
pub mod mtc;

use crate::db::Value;
use crate::engine::movegen::{build_jump_list, build_nonjump_list, can_jump};
use crate::engine::{fen, Color, Position};
use crate::Driver;
use log::info;
use std::time::Instant;

const MAXREPDEPTH: usize = 64;

/// A candidate move and its distance metric, used by the DTW and MTC
/// probes to rank moves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MoveDistance {
    pub distance: i32,
    pub move_index: usize,
}

/// Budget exhausted; the search unwinds and reports `UNKNOWN`.
struct Aborted;

/// `v` from the opponent's viewpoint.
pub fn negate(v: Value) -> Value {
    match v {
        Value::Win => Value::Loss,
        Value::Loss => Value::Win,
        Value::WinOrDraw => Value::DrawOrLoss,
        Value::DrawOrLoss => Value::WinOrDraw,
        other => other,
    }
}

/// Lattice comparison `left >= right`.  Unknown values compare as "could
/// be anything but a proven loss".
pub fn is_greater_or_equal(left: Value, right: Value) -> bool {
    match right {
        Value::Win => left == Value::Win,
        Value::Draw => matches!(left, Value::Draw | Value::WinOrDraw | Value::Win),
        Value::Loss => true,
        Value::WinOrDraw => matches!(left, Value::WinOrDraw | Value::Win),
        Value::DrawOrLoss => matches!(
            left,
            Value::Win | Value::WinOrDraw | Value::Draw | Value::DrawOrLoss
        ),
        _ => left != Value::Loss,
    }
}

/// Strict lattice comparison `left > right`.
pub fn is_greater(left: Value, right: Value) -> bool {
    match right {
        Value::Win => false,
        Value::Draw => matches!(left, Value::WinOrDraw | Value::Win),
        Value::Loss => left != Value::Loss,
        Value::WinOrDraw => left == Value::Win,
        Value::DrawOrLoss => left != Value::Loss,
        _ => !matches!(left, Value::Loss | Value::Unknown | Value::SubdbUnavailable),
    }
}

/// Fold a successor's value into the running best.  Unknowns poison exact
/// values down to partial ones rather than being dropped.
pub fn bestvalue_improve(value: Value, bestvalue: Value) -> Value {
    match bestvalue {
        Value::Win => Value::Win,
        Value::Draw => match value {
            Value::WinOrDraw | Value::Win => value,
            Value::Unknown | Value::SubdbUnavailable => Value::WinOrDraw,
            _ => bestvalue,
        },
        Value::Loss => value,
        Value::WinOrDraw => {
            if value == Value::Win {
                value
            } else {
                bestvalue
            }
        }
        Value::DrawOrLoss => {
            if value == Value::Loss {
                bestvalue
            } else {
                value
            }
        }
        _ => match value {
            Value::WinOrDraw | Value::Win => value,
            Value::Draw => Value::WinOrDraw,
            _ => bestvalue,
        },
    }
}

/// Draw by repetition: the position already occurred at the same side to
/// move, with no man moved in between.
pub fn is_repetition(history: &[Position], p: &Position, depth: usize) -> bool {
    let men = p.men();
    let mut i = depth as isize - 4;
    while i >= 0 {
        let earlier = &history[i as usize];
        if earlier.men() != men {
            break;
        }
        if earlier == p {
            return true;
        }
        i -= 2;
    }
    false
}

pub struct WldSearch<'a> {
    handle: &'a Driver,
    pub dbpieces: u32,
    pub dbpieces_1side: u32,
    /// Tunstall v2 slices elide some positions with a non-side capture.
    pub egdb_excludes_some_nonside_caps: bool,
    timeout_ms: u64,
    maxnodes: u64,
    nodes: u64,
    t0: Instant,
    maxdepth_reached: usize,
    rep_stack: Vec<Position>,
}

impl<'a> WldSearch<'a> {
    pub fn new(handle: &'a Driver) -> Self {
        let pieces = handle.get_pieces();
        WldSearch {
            handle,
            dbpieces: pieces.max_pieces,
            dbpieces_1side: pieces.max_pieces_1side.max(1),
            egdb_excludes_some_nonside_caps: handle.db_type() == crate::db::DbType::WldTunV2,
            timeout_ms: 5000,
            maxnodes: 0,
            nodes: 0,
            t0: Instant::now(),
            maxdepth_reached: 0,
            rep_stack: vec![Position::default(); MAXREPDEPTH + 1],
        }
    }

    pub fn set_search_timeout(&mut self, msec: u64) {
        self.timeout_ms = msec;
    }

    pub fn set_maxnodes(&mut self, nodes: u64) {
        self.maxnodes = nodes;
    }

    pub fn get_maxdepth(&self) -> usize {
        self.maxdepth_reached
    }

    pub fn reset_maxdepth(&mut self) {
        self.maxdepth_reached = 0;
    }

    /// Do the stored slices skip positions where the side *not* to move
    /// has a capture?  Only large slices with multiple kings do.
    pub fn requires_nonside_capture_test(&self, p: &Position) -> bool {
        if !self.egdb_excludes_some_nonside_caps {
            return false;
        }
        let npieces = p.occupied().count_ones();
        if npieces <= 6 {
            return false;
        }
        if npieces < 9 && p.king.count_ones() <= 1 {
            return false;
        }
        true
    }

    pub fn is_lookup_possible_pieces(&self, p: &Position) -> bool {
        let nb = p.black.count_ones();
        let nw = p.white.count_ones();
        nb + nw <= self.dbpieces && nb.max(nw) <= self.dbpieces_1side
    }

    pub fn is_lookup_possible(&self, p: &Position, color: Color) -> bool {
        if !self.is_lookup_possible_pieces(p) {
            return false;
        }
        if !self.requires_nonside_capture_test(p) {
            return true;
        }
        !can_jump(p, color.opposite())
    }

    fn checked_node(&mut self) -> Result<(), Aborted> {
        self.nodes += 1;
        if self.maxnodes != 0 && self.nodes >= self.maxnodes {
            return Err(Aborted);
        }
        if self.timeout_ms != 0 && self.nodes & 63 == 63 {
            if self.t0.elapsed().as_millis() as u64 > self.timeout_ms {
                return Err(Aborted);
            }
        }
        Ok(())
    }

    fn lookup_with_rep_check(
        &mut self,
        p: &Position,
        color: Color,
        depth: usize,
        maxdepth: usize,
        mut alpha: Value,
        beta: Value,
        force_root_search: bool,
    ) -> Result<Value, Aborted> {
        self.rep_stack[depth] = *p;
        self.checked_node()?;

        if p.black == 0 {
            return Ok(if color == Color::Black { Value::Loss } else { Value::Win });
        }
        if p.white == 0 {
            return Ok(if color == Color::Black { Value::Win } else { Value::Loss });
        }

        if is_repetition(&self.rep_stack, p, depth) {
            return Ok(Value::Draw);
        }

        let mut side_capture = false;
        if !can_jump(p, color) {
            if depth != 0 || !force_root_search {
                if !self.requires_nonside_capture_test(p) {
                    return Ok(Value::from_i32(self.handle.lookup(p, color, false)));
                }
                if !can_jump(p, color.opposite()) {
                    let value = Value::from_i32(self.handle.lookup(p, color, false));
                    if value != Value::Unknown {
                        return Ok(value);
                    }
                }
            }
        } else {
            side_capture = true;
        }

        if depth > self.maxdepth_reached {
            self.maxdepth_reached = depth;
        }
        if depth >= maxdepth {
            return Ok(Value::Unknown);
        }

        let movelist = if side_capture {
            build_jump_list(p, color)
        } else {
            build_nonjump_list(p, color)
        };
        if movelist.is_empty() {
            return Ok(Value::Loss);
        }

        let mut bestvalue = Value::Loss;
        for succ in &movelist {
            let value = negate(self.lookup_with_rep_check(
                succ,
                color.opposite(),
                depth + 1,
                maxdepth,
                negate(beta),
                negate(alpha),
                force_root_search,
            )?);
            if is_greater_or_equal(value, beta) {
                return Ok(bestvalue_improve(value, beta));
            }
            bestvalue = bestvalue_improve(value, bestvalue);
            if is_greater(bestvalue, alpha) {
                alpha = bestvalue;
            }
        }
        Ok(bestvalue)
    }

    /// Value of `p`, searching successors when a direct probe cannot
    /// answer.  With `force_root_search`, the root is never probed
    /// directly, so a stored value can be cross-checked against its
    /// successors.  Returns `UNKNOWN` when a budget runs out.
    pub fn lookup_with_search(
        &mut self,
        p: &Position,
        color: Color,
        force_root_search: bool,
    ) -> Value {
        self.nodes = 0;
        self.t0 = Instant::now();
        self.reset_maxdepth();

        let mut value = Value::Unknown;
        for maxdepth in 1..MAXREPDEPTH {
            match self.lookup_with_rep_check(
                p,
                color,
                0,
                maxdepth,
                Value::Loss,
                Value::Win,
                force_root_search,
            ) {
                Ok(v) => {
                    value = v;
                    if v.is_exact() {
                        return v;
                    }
                }
                Err(Aborted) => {
                    info!(
                        "wld lookup budget exceeded, nodes {}, time {:.3} sec (not an error): {}",
                        self.nodes,
                        self.t0.elapsed().as_secs_f64(),
                        fen::print_fen(p, color)
                    );
                    return Value::Unknown;
                }
            }
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lattice_negation() {
        assert_eq!(negate(Value::Win), Value::Loss);
        assert_eq!(negate(Value::Draw), Value::Draw);
        assert_eq!(negate(Value::WinOrDraw), Value::DrawOrLoss);
        assert_eq!(negate(Value::Unknown), Value::Unknown);
        assert_eq!(negate(Value::SubdbUnavailable), Value::SubdbUnavailable);
    }

    #[test]
    fn lattice_order() {
        use Value::*;
        assert!(is_greater_or_equal(Win, Draw));
        assert!(is_greater_or_equal(WinOrDraw, Draw));
        assert!(!is_greater_or_equal(DrawOrLoss, Draw));
        assert!(is_greater_or_equal(Loss, Loss));
        assert!(!is_greater(Loss, Loss));
        assert!(is_greater(Draw, DrawOrLoss));
        assert!(!is_greater(Win, Win));
        assert!(is_greater(Win, WinOrDraw));
    }

    #[test]
    fn best_improvement_handles_unknowns() {
        use Value::*;
        // An unknown successor upgrades a draw to win-or-draw, never less.
        assert_eq!(bestvalue_improve(Unknown, Draw), WinOrDraw);
        assert_eq!(bestvalue_improve(Win, Draw), Win);
        assert_eq!(bestvalue_improve(Loss, Draw), Draw);
        assert_eq!(bestvalue_improve(Draw, Unknown), WinOrDraw);
        assert_eq!(bestvalue_improve(Draw, Loss), Draw);
    }

    #[test]
    fn repetition_needs_same_men() {
        use crate::engine::square_bit as sq;
        // All-king shuffling: same position two plies apart repeats.
        let a = Position::new(sq(28), sq(23), sq(28) | sq(23));
        let b = Position::new(sq(33), sq(23), sq(33) | sq(23));
        let mut hist = vec![Position::default(); 10];
        hist[2] = a;
        hist[4] = b;
        assert!(is_repetition(&hist, &a, 8));
        // A man move between the occurrences kills the repetition.
        let man_frame = Position::new(sq(33), sq(23), sq(33));
        hist[4] = man_frame;
        assert!(!is_repetition(&hist, &a, 8));
    }
}
