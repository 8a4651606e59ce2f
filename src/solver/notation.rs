//! Face-turn moves and sequence notation.
//!
//! Moves use Singmaster notation with the face letters `U R F D L B`:
//! `R` is a clockwise quarter turn, `R2` a half turn and `R'` a
//! counter-clockwise quarter turn. Sequences are whitespace separated.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use super::SolveError;

// ============================================================================
// Constants
// ============================================================================

/// Number of distinct face turns (6 faces x 3 amounts).
pub const MOVE_COUNT: usize = 18;

/// One move token: face letter plus optional `2` or `'`.
static MOVE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([URFDLB])(2|')?$").expect("valid move regex"));

// ============================================================================
// Face
// ============================================================================

/// A face of the cube, also used as a sticker color.
///
/// Declaration order matches the facelet string order `URFDLB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Face {
    U,
    R,
    F,
    D,
    L,
    B,
}

impl Face {
    /// All faces in facelet order.
    pub const ALL: [Face; 6] = [Face::U, Face::R, Face::F, Face::D, Face::L, Face::B];

    /// Returns the index of this face in facelet order.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Returns the face on the opposite side of the cube.
    #[inline]
    #[must_use]
    pub const fn opposite(self) -> Face {
        Face::ALL[(self.index() + 3) % 6]
    }

    /// Parses a face letter.
    #[inline]
    #[must_use]
    pub const fn from_char(c: char) -> Option<Face> {
        match c {
            'U' => Some(Face::U),
            'R' => Some(Face::R),
            'F' => Some(Face::F),
            'D' => Some(Face::D),
            'L' => Some(Face::L),
            'B' => Some(Face::B),
            _ => None,
        }
    }

    /// Returns the face letter.
    #[inline]
    #[must_use]
    pub const fn as_char(self) -> char {
        match self {
            Face::U => 'U',
            Face::R => 'R',
            Face::F => 'F',
            Face::D => 'D',
            Face::L => 'L',
            Face::B => 'B',
        }
    }
}

// ============================================================================
// Move
// ============================================================================

/// A single face turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Move {
    /// Face being turned.
    pub face: Face,
    /// Clockwise quarter turns: 1, 2 or 3.
    pub turns: u8,
}

impl Move {
    /// Creates a move, normalizing `turns` into `1..=3`.
    ///
    /// Returns `None` for a multiple of four (no-op).
    #[inline]
    #[must_use]
    pub const fn new(face: Face, turns: u8) -> Option<Self> {
        match turns % 4 {
            0 => None,
            t => Some(Self { face, turns: t }),
        }
    }

    /// Returns the index of this move in `0..MOVE_COUNT`.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.face.index() * 3 + (self.turns as usize - 1)
    }

    /// Returns the move with the given index.
    #[inline]
    #[must_use]
    pub const fn from_index(index: usize) -> Self {
        Self {
            face: Face::ALL[index / 3],
            turns: (index % 3) as u8 + 1,
        }
    }

    /// Returns the move that undoes this one.
    #[inline]
    #[must_use]
    pub const fn inverse(self) -> Self {
        Self {
            face: self.face,
            turns: 4 - self.turns,
        }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let suffix = match self.turns {
            2 => "2",
            3 => "'",
            _ => "",
        };
        write!(f, "{}{}", self.face.as_char(), suffix)
    }
}

impl FromStr for Move {
    type Err = SolveError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let caps = MOVE_TOKEN
            .captures(token)
            .ok_or_else(|| SolveError::malformed(format!("unknown move '{token}'")))?;

        let face = caps
            .get(1)
            .and_then(|m| m.as_str().chars().next())
            .and_then(Face::from_char)
            .ok_or_else(|| SolveError::malformed(format!("unknown move '{token}'")))?;

        let turns = match caps.get(2).map(|m| m.as_str()) {
            Some("2") => 2,
            Some("'") => 3,
            _ => 1,
        };

        Ok(Self { face, turns })
    }
}

// ============================================================================
// Sequences
// ============================================================================

/// Parses a whitespace-separated move sequence.
///
/// # Errors
///
/// Returns [`SolveError::Malformed`] for an empty sequence or any token
/// that is not a move.
pub fn parse_sequence(text: &str) -> Result<Vec<Move>, SolveError> {
    let moves = text
        .split_whitespace()
        .map(str::parse)
        .collect::<Result<Vec<Move>, _>>()?;

    if moves.is_empty() {
        return Err(SolveError::malformed("empty scramble"));
    }

    Ok(moves)
}

/// Formats moves as a space-separated sequence (`""` when empty).
#[must_use]
pub fn format_sequence(moves: &[Move]) -> String {
    moves
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_index_roundtrip_covers_all_moves() {
        for index in 0..MOVE_COUNT {
            assert_eq!(Move::from_index(index).index(), index);
        }
    }

    #[test]
    fn test_opposite_faces() {
        assert_eq!(Face::U.opposite(), Face::D);
        assert_eq!(Face::R.opposite(), Face::L);
        assert_eq!(Face::B.opposite(), Face::F);
    }

    #[test]
    fn test_parse_sequence() {
        let moves = parse_sequence("R U2  F'").unwrap();
        assert_eq!(moves.len(), 3);
        assert_eq!(moves[0], Move { face: Face::R, turns: 1 });
        assert_eq!(moves[1], Move { face: Face::U, turns: 2 });
        assert_eq!(moves[2], Move { face: Face::F, turns: 3 });
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_sequence("invalid scramble string").is_err());
        assert!(parse_sequence("R X").is_err());
        assert!(parse_sequence("r").is_err());
        assert!(parse_sequence("   ").is_err());
    }

    #[test]
    fn test_format_sequence() {
        let moves = parse_sequence("R' U2 F").unwrap();
        assert_eq!(format_sequence(&moves), "R' U2 F");
        assert_eq!(format_sequence(&[]), "");
    }

    #[test]
    fn test_inverse() {
        let m: Move = "R'".parse().unwrap();
        assert_eq!(m.inverse().to_string(), "R");
        let half: Move = "U2".parse().unwrap();
        assert_eq!(half.inverse(), half);
    }

    #[test]
    fn test_new_normalizes_turns() {
        assert!(Move::new(Face::F, 4).is_none());
        assert_eq!(Move::new(Face::F, 5).map(|m| m.turns), Some(1));
    }
}
