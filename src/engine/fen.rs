//! # FEN Module
//!
//! Parse and print positions in the draughts FEN dialect used by PDN:
//! `B:W31,K4:B12,13,K50` — side to move, then each side's squares with a
//! `K` prefix on kings.  Only the fields the engine needs are handled.

use super::{square_bit, Color, Position, NUM_SQUARES};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("FEN is missing the side to move")]
    NoColor,
    #[error("bad square number {0}")]
    BadSquare(usize),
    #[error("unexpected character {0:?} in FEN")]
    BadChar(char),
    #[error("square {0} is occupied twice")]
    DoubleOccupancy(usize),
}

pub fn print_fen(pos: &Position, color: Color) -> String {
    let mut out = String::new();
    out.push(match color {
        Color::Black => 'B',
        Color::White => 'W',
    });
    for (tag, mask) in [('W', pos.white), ('B', pos.black)] {
        out.push(':');
        out.push(tag);
        let mut first = true;
        for sq in 1..=NUM_SQUARES {
            if square_bit(sq) & mask != 0 {
                if !first {
                    out.push(',');
                }
                if square_bit(sq) & pos.king != 0 {
                    out.push('K');
                }
                out.push_str(&sq.to_string());
                first = false;
            }
        }
    }
    out
}

pub fn parse_fen(text: &str) -> Result<(Position, Color), Error> {
    let text = text.trim().trim_matches('"');
    let mut fields = text.split(':');

    let color = match fields.next().and_then(|s| s.chars().next()) {
        Some('B') | Some('b') => Color::Black,
        Some('W') | Some('w') => Color::White,
        _ => return Err(Error::NoColor),
    };

    let mut pos = Position::default();
    for field in fields {
        let side = match field.chars().next() {
            Some('W') | Some('w') => Color::White,
            Some('B') | Some('b') => Color::Black,
            Some(c) => return Err(Error::BadChar(c)),
            None => continue,
        };
        for item in field[1..].split(',') {
            if item.is_empty() {
                continue;
            }
            let (king, digits) = match item.strip_prefix(['K', 'k']) {
                Some(rest) => (true, rest),
                None => (false, item),
            };
            let sq: usize = digits
                .trim()
                .parse()
                .map_err(|_| Error::BadChar(digits.chars().next().unwrap_or('?')))?;
            if sq == 0 || sq > NUM_SQUARES {
                return Err(Error::BadSquare(sq));
            }
            let bit = square_bit(sq);
            if pos.occupied() & bit != 0 {
                return Err(Error::DoubleOccupancy(sq));
            }
            match side {
                Color::Black => pos.black |= bit,
                Color::White => pos.white |= bit,
            }
            if king {
                pos.king |= bit;
            }
        }
    }
    Ok((pos, color))
}
