//! Cubie-level cube model.
//!
//! A cube state is stored as the permutation and orientation of its 8
//! corner and 12 edge cubies. Facelet strings use the conventional
//! 54-character layout: faces in `U R F D L B` order, each face read row by
//! row as seen from the outside, e.g. the solved cube is
//! `UUUUUUUUURRRRRRRRRFFFFFFFFFDDDDDDDDDLLLLLLLLLBBBBBBBBB`.

// ============================================================================
// Imports
// ============================================================================

use super::SolveError;
use super::notation::{Face, Move};

use Face::{B, D, F, L, R, U};

// ============================================================================
// Constants
// ============================================================================

/// Length of a facelet string.
pub const FACELET_COUNT: usize = 54;

/// Number of corner orientation coordinates (3^7).
pub const CORNER_ORIENTATIONS: usize = 2187;

/// Number of edge orientation coordinates (2^11).
pub const EDGE_ORIENTATIONS: usize = 2048;

/// Number of corner permutation coordinates (8!).
pub const CORNER_PERMUTATIONS: usize = 40320;

/// Facelet positions of each corner slot, U/D sticker first, clockwise.
const CORNER_FACELETS: [[usize; 3]; 8] = [
    [8, 9, 20],
    [6, 18, 38],
    [0, 36, 47],
    [2, 45, 11],
    [29, 26, 15],
    [27, 44, 24],
    [33, 53, 42],
    [35, 17, 51],
];

/// Colors of each corner cubie in the same order.
const CORNER_COLORS: [[Face; 3]; 8] = [
    [U, R, F],
    [U, F, L],
    [U, L, B],
    [U, B, R],
    [D, F, R],
    [D, L, F],
    [D, B, L],
    [D, R, B],
];

/// Facelet positions of each edge slot.
const EDGE_FACELETS: [[usize; 2]; 12] = [
    [5, 10],
    [7, 19],
    [3, 37],
    [1, 46],
    [32, 16],
    [28, 25],
    [30, 43],
    [34, 52],
    [23, 12],
    [21, 41],
    [50, 39],
    [48, 14],
];

/// Colors of each edge cubie in the same order.
const EDGE_COLORS: [[Face; 2]; 12] = [
    [U, R],
    [U, F],
    [U, L],
    [U, B],
    [D, R],
    [D, F],
    [D, L],
    [D, B],
    [F, R],
    [F, L],
    [B, L],
    [B, R],
];

/// Clockwise quarter turn of each face, in `Face` order.
const BASIC_TURNS: [CubieCube; 6] = [
    CubieCube {
        cp: [3, 0, 1, 2, 4, 5, 6, 7],
        co: [0; 8],
        ep: [3, 0, 1, 2, 4, 5, 6, 7, 8, 9, 10, 11],
        eo: [0; 12],
    },
    CubieCube {
        cp: [4, 1, 2, 0, 7, 5, 6, 3],
        co: [2, 0, 0, 1, 1, 0, 0, 2],
        ep: [8, 1, 2, 3, 11, 5, 6, 7, 4, 9, 10, 0],
        eo: [0; 12],
    },
    CubieCube {
        cp: [1, 5, 2, 3, 0, 4, 6, 7],
        co: [1, 2, 0, 0, 2, 1, 0, 0],
        ep: [0, 9, 2, 3, 4, 8, 6, 7, 1, 5, 10, 11],
        eo: [0, 1, 0, 0, 0, 1, 0, 0, 1, 1, 0, 0],
    },
    CubieCube {
        cp: [0, 1, 2, 3, 5, 6, 7, 4],
        co: [0; 8],
        ep: [0, 1, 2, 3, 5, 6, 7, 4, 8, 9, 10, 11],
        eo: [0; 12],
    },
    CubieCube {
        cp: [0, 2, 6, 3, 4, 1, 5, 7],
        co: [0, 1, 2, 0, 0, 2, 1, 0],
        ep: [0, 1, 10, 3, 4, 5, 9, 7, 8, 2, 6, 11],
        eo: [0; 12],
    },
    CubieCube {
        cp: [0, 1, 3, 7, 4, 5, 2, 6],
        co: [0, 0, 1, 2, 0, 0, 2, 1],
        ep: [0, 1, 2, 11, 4, 5, 6, 10, 8, 9, 3, 7],
        eo: [0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 1, 1],
    },
];

/// Marks a slot whose cubie could not be identified.
const UNDEFINED: u8 = u8::MAX;

// ============================================================================
// CubieCube
// ============================================================================

/// Cube state at the cubie level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CubieCube {
    /// Corner permutation: `cp[slot]` is the corner sitting in `slot`.
    pub cp: [u8; 8],
    /// Corner orientation (0..3) per slot.
    pub co: [u8; 8],
    /// Edge permutation: `ep[slot]` is the edge sitting in `slot`.
    pub ep: [u8; 12],
    /// Edge orientation (0..2) per slot.
    pub eo: [u8; 12],
}

impl Default for CubieCube {
    fn default() -> Self {
        Self::SOLVED
    }
}

// ============================================================================
// CubieCube - Constructors
// ============================================================================

impl CubieCube {
    /// The solved cube.
    pub const SOLVED: CubieCube = CubieCube {
        cp: [0, 1, 2, 3, 4, 5, 6, 7],
        co: [0; 8],
        ep: [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
        eo: [0; 12],
    };

    /// Builds the cube reached by applying `moves` to the solved cube.
    #[must_use]
    pub fn from_moves(moves: &[Move]) -> Self {
        moves
            .iter()
            .fold(Self::SOLVED, |cube, &mv| cube.apply(mv))
    }

    /// Parses and validates a 54-character facelet string.
    ///
    /// # Errors
    ///
    /// - [`SolveError::Malformed`] for bad length or characters
    /// - [`SolveError::FaceletCount`] if a color does not appear 9 times
    /// - [`SolveError::Center`] if a center sticker is out of place
    /// - [`SolveError::Unsolvable`] if the stickers do not describe a
    ///   reachable cube state
    pub fn from_facelets(facelets: &str) -> Result<Self, SolveError> {
        let colors = facelets
            .chars()
            .map(|c| {
                Face::from_char(c)
                    .ok_or_else(|| SolveError::malformed(format!("unexpected facelet '{c}'")))
            })
            .collect::<Result<Vec<Face>, _>>()?;

        if colors.len() != FACELET_COUNT {
            return Err(SolveError::malformed(format!(
                "expected {FACELET_COUNT} facelets, got {}",
                colors.len()
            )));
        }

        for face in Face::ALL {
            let count = colors.iter().filter(|&&c| c == face).count();
            if count != 9 {
                return Err(SolveError::FaceletCount { face, count });
            }
            if colors[face.index() * 9 + 4] != face {
                return Err(SolveError::Center { face });
            }
        }

        let mut cube = CubieCube {
            cp: [UNDEFINED; 8],
            co: [0; 8],
            ep: [UNDEFINED; 12],
            eo: [0; 12],
        };

        for (slot, positions) in CORNER_FACELETS.iter().enumerate() {
            let Some(ori) = (0..3).find(|&o| matches!(colors[positions[o]], U | D)) else {
                continue;
            };
            let first = colors[positions[(ori + 1) % 3]];
            let second = colors[positions[(ori + 2) % 3]];

            if let Some(corner) = CORNER_COLORS
                .iter()
                .position(|c| c[1] == first && c[2] == second)
            {
                cube.cp[slot] = corner as u8;
                cube.co[slot] = ori as u8;
            }
        }

        for (slot, positions) in EDGE_FACELETS.iter().enumerate() {
            let (a, b) = (colors[positions[0]], colors[positions[1]]);
            for (edge, c) in EDGE_COLORS.iter().enumerate() {
                if a == c[0] && b == c[1] {
                    cube.ep[slot] = edge as u8;
                    cube.eo[slot] = 0;
                    break;
                }
                if a == c[1] && b == c[0] {
                    cube.ep[slot] = edge as u8;
                    cube.eo[slot] = 1;
                    break;
                }
            }
        }

        cube.verify()?;
        Ok(cube)
    }
}

// ============================================================================
// CubieCube - Operations
// ============================================================================

impl CubieCube {
    /// Returns `self * other`: the state after applying `other` to `self`.
    #[must_use]
    pub fn multiply(&self, other: &CubieCube) -> CubieCube {
        let mut out = CubieCube::SOLVED;

        for slot in 0..8 {
            let from = other.cp[slot] as usize;
            out.cp[slot] = self.cp[from];
            out.co[slot] = (self.co[from] + other.co[slot]) % 3;
        }

        for slot in 0..12 {
            let from = other.ep[slot] as usize;
            out.ep[slot] = self.ep[from];
            out.eo[slot] = (self.eo[from] + other.eo[slot]) % 2;
        }

        out
    }

    /// Returns the cube after applying one move.
    #[must_use]
    pub fn apply(&self, mv: Move) -> CubieCube {
        let turn = &BASIC_TURNS[mv.face.index()];
        (0..mv.turns).fold(*self, |cube, _| cube.multiply(turn))
    }

    /// Returns `true` if this is the solved cube.
    #[inline]
    #[must_use]
    pub fn is_solved(&self) -> bool {
        *self == Self::SOLVED
    }

    /// Checks that the state is reachable by face turns.
    ///
    /// # Errors
    ///
    /// Returns [`SolveError::Unsolvable`] naming the first violated rule.
    pub fn verify(&self) -> Result<(), SolveError> {
        if !is_permutation(&self.ep) {
            return Err(SolveError::unsolvable("an edge is missing or duplicated"));
        }
        if self.eo.iter().map(|&o| u32::from(o)).sum::<u32>() % 2 != 0 {
            return Err(SolveError::unsolvable("one edge is flipped"));
        }
        if !is_permutation(&self.cp) {
            return Err(SolveError::unsolvable("a corner is missing or duplicated"));
        }
        if self.co.iter().map(|&o| u32::from(o)).sum::<u32>() % 3 != 0 {
            return Err(SolveError::unsolvable("one corner is twisted"));
        }
        if permutation_parity(&self.ep) != permutation_parity(&self.cp) {
            return Err(SolveError::unsolvable(
                "two corners or two edges are swapped",
            ));
        }
        Ok(())
    }

    /// Renders the cube as a facelet string.
    #[must_use]
    pub fn to_facelets(&self) -> String {
        let mut colors = [U; FACELET_COUNT];

        for face in Face::ALL {
            colors[face.index() * 9 + 4] = face;
        }

        for slot in 0..8 {
            let corner = self.cp[slot] as usize;
            let ori = self.co[slot] as usize;
            for n in 0..3 {
                colors[CORNER_FACELETS[slot][(n + ori) % 3]] = CORNER_COLORS[corner][n];
            }
        }

        for slot in 0..12 {
            let edge = self.ep[slot] as usize;
            let ori = self.eo[slot] as usize;
            for n in 0..2 {
                colors[EDGE_FACELETS[slot][(n + ori) % 2]] = EDGE_COLORS[edge][n];
            }
        }

        colors.iter().map(|f| f.as_char()).collect()
    }
}

// ============================================================================
// CubieCube - Coordinates
// ============================================================================

impl CubieCube {
    /// Corner orientation coordinate in `0..CORNER_ORIENTATIONS`.
    #[must_use]
    pub fn corner_orientation(&self) -> u16 {
        self.co[..7]
            .iter()
            .fold(0u16, |acc, &o| acc * 3 + u16::from(o))
    }

    /// Sets corners' orientation from a coordinate.
    pub fn set_corner_orientation(&mut self, mut coord: u16) {
        let mut sum = 0u16;
        for slot in (0..7).rev() {
            self.co[slot] = (coord % 3) as u8;
            sum += coord % 3;
            coord /= 3;
        }
        self.co[7] = ((3 - sum % 3) % 3) as u8;
    }

    /// Edge orientation coordinate in `0..EDGE_ORIENTATIONS`.
    #[must_use]
    pub fn edge_orientation(&self) -> u16 {
        self.eo[..11]
            .iter()
            .fold(0u16, |acc, &o| acc * 2 + u16::from(o))
    }

    /// Sets edges' orientation from a coordinate.
    pub fn set_edge_orientation(&mut self, mut coord: u16) {
        let mut sum = 0u16;
        for slot in (0..11).rev() {
            self.eo[slot] = (coord % 2) as u8;
            sum += coord % 2;
            coord /= 2;
        }
        self.eo[11] = (sum % 2) as u8;
    }

    /// Corner permutation coordinate (Lehmer code) in `0..CORNER_PERMUTATIONS`.
    #[must_use]
    pub fn corner_permutation(&self) -> u16 {
        let mut coord = 0u16;
        for i in 0..8 {
            let smaller = self.cp[i + 1..]
                .iter()
                .filter(|&&c| c < self.cp[i])
                .count() as u16;
            coord = coord * (8 - i as u16) + smaller;
        }
        coord
    }

    /// Sets corners' permutation from a coordinate.
    pub fn set_corner_permutation(&mut self, mut coord: u16) {
        let mut digits = [0usize; 8];
        for i in (0..8).rev() {
            let base = 8 - i as u16;
            digits[i] = (coord % base) as usize;
            coord /= base;
        }

        let mut available: Vec<u8> = (0..8).collect();
        for (slot, &digit) in digits.iter().enumerate() {
            self.cp[slot] = available.remove(digit);
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Returns `true` if every value `0..len` appears exactly once.
fn is_permutation(values: &[u8]) -> bool {
    let mut seen = vec![false; values.len()];
    for &v in values {
        match seen.get_mut(v as usize) {
            Some(slot) if !*slot => *slot = true,
            _ => return false,
        }
    }
    true
}

/// Parity of a permutation: `true` when odd.
fn permutation_parity(values: &[u8]) -> bool {
    let mut inversions = 0usize;
    for i in 0..values.len() {
        for j in i + 1..values.len() {
            if values[j] < values[i] {
                inversions += 1;
            }
        }
    }
    inversions % 2 == 1
}

// ============================================================================
// Tests
// ============================================================================
