//! Bounded optimal search.
//!
//! [`SearchSolver`] runs iterative-deepening A* over the 18 face turns.
//! The heuristic is the maximum of three exact pattern databases (corner
//! orientation, edge orientation, corner permutation), each built by a
//! breadth-first search from the solved cube when the solver is created.
//!
//! The search is bounded twice: by the caller's `max_depth`, and by a node
//! budget so that deep scrambles fail in bounded time instead of pinning a
//! worker indefinitely.

// ============================================================================
// Imports
// ============================================================================

use tracing::debug;

use super::cube::{
    CORNER_ORIENTATIONS, CORNER_PERMUTATIONS, CubieCube, EDGE_ORIENTATIONS, FACELET_COUNT,
};
use super::notation::{Face, MOVE_COUNT, Move, format_sequence, parse_sequence};
use super::{SolveError, Solver};

// ============================================================================
// Constants
// ============================================================================

/// Default limit on expanded search nodes per solve.
pub const DEFAULT_NODE_BUDGET: u64 = 50_000_000;

/// Distance marker for unvisited table entries.
const UNSEEN: u8 = u8::MAX;

// ============================================================================
// Tables
// ============================================================================

/// Transition and distance table for one coordinate.
struct CoordinateTable {
    /// `moves[coord * MOVE_COUNT + move]` is the coordinate after `move`.
    moves: Vec<u16>,
    /// Exact number of moves needed to bring the coordinate home.
    distance: Vec<u8>,
}

impl CoordinateTable {
    /// Builds the table for a coordinate of `size` values.
    fn build(
        size: usize,
        set: fn(&mut CubieCube, u16),
        get: fn(&CubieCube) -> u16,
    ) -> Self {
        let mut moves = vec![0u16; size * MOVE_COUNT];
        for coord in 0..size {
            let mut cube = CubieCube::SOLVED;
            set(&mut cube, coord as u16);
            for m in 0..MOVE_COUNT {
                moves[coord * MOVE_COUNT + m] = get(&cube.apply(Move::from_index(m)));
            }
        }

        let mut distance = vec![UNSEEN; size];
        distance[0] = 0;
        let mut frontier = vec![0u16];
        let mut depth = 0u8;

        while !frontier.is_empty() {
            depth += 1;
            let mut next = Vec::new();
            for &coord in &frontier {
                for m in 0..MOVE_COUNT {
                    let to = moves[coord as usize * MOVE_COUNT + m];
                    if distance[to as usize] == UNSEEN {
                        distance[to as usize] = depth;
                        next.push(to);
                    }
                }
            }
            frontier = next;
        }

        Self { moves, distance }
    }

    #[inline]
    fn step(&self, coord: u16, m: usize) -> u16 {
        self.moves[coord as usize * MOVE_COUNT + m]
    }

    #[inline]
    fn distance(&self, coord: u16) -> u8 {
        self.distance[coord as usize]
    }
}

// ============================================================================
// Node
// ============================================================================

/// Search state: three coordinates plus the full edge permutation.
#[derive(Clone, Copy)]
struct Node {
    co: u16,
    eo: u16,
    cp: u16,
    ep: [u8; 12],
}

impl Node {
    fn from_cube(cube: &CubieCube) -> Self {
        Self {
            co: cube.corner_orientation(),
            eo: cube.edge_orientation(),
            cp: cube.corner_permutation(),
            ep: cube.ep,
        }
    }

    fn is_solved(&self) -> bool {
        self.co == 0
            && self.eo == 0
            && self.cp == 0
            && self.ep == CubieCube::SOLVED.ep
    }
}

// ============================================================================
// SearchSolver
// ============================================================================

/// Optimal face-turn solver with depth and node bounds.
///
/// Building the tables takes a few hundred milliseconds; create one solver
/// per worker process and reuse it.
pub struct SearchSolver {
    corner_orientation: CoordinateTable,
    edge_orientation: CoordinateTable,
    corner_permutation: CoordinateTable,
    /// Full-cube edge permutation of each move.
    edge_moves: [[u8; 12]; MOVE_COUNT],
    node_budget: u64,
}

impl std::fmt::Debug for SearchSolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchSolver")
            .field("node_budget", &self.node_budget)
            .finish_non_exhaustive()
    }
}

impl Default for SearchSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchSolver {
    /// Creates a solver with the default node budget.
    #[must_use]
    pub fn new() -> Self {
        let corner_orientation = CoordinateTable::build(
            CORNER_ORIENTATIONS,
            CubieCube::set_corner_orientation,
            CubieCube::corner_orientation,
        );
        let edge_orientation = CoordinateTable::build(
            EDGE_ORIENTATIONS,
            CubieCube::set_edge_orientation,
            CubieCube::edge_orientation,
        );
        let corner_permutation = CoordinateTable::build(
            CORNER_PERMUTATIONS,
            CubieCube::set_corner_permutation,
            CubieCube::corner_permutation,
        );

        let mut edge_moves = [[0u8; 12]; MOVE_COUNT];
        for (m, slot) in edge_moves.iter_mut().enumerate() {
            *slot = CubieCube::SOLVED.apply(Move::from_index(m)).ep;
        }

        debug!("Search tables built");

        Self {
            corner_orientation,
            edge_orientation,
            corner_permutation,
            edge_moves,
            node_budget: DEFAULT_NODE_BUDGET,
        }
    }

    /// Sets the node budget.
    #[inline]
    #[must_use]
    pub fn with_node_budget(mut self, budget: u64) -> Self {
        self.node_budget = budget.max(1);
        self
    }

    /// Parses a scramble in either accepted format.
    ///
    /// 54 face letters are a facelet string; anything else is read as a
    /// move sequence.
    ///
    /// # Errors
    ///
    /// Returns the parse or validation error of the detected format.
    pub fn parse_scramble(scramble: &str) -> Result<CubieCube, SolveError> {
        let trimmed = scramble.trim();
        let looks_like_facelets = trimmed.len() == FACELET_COUNT
            && trimmed.chars().all(|c| Face::from_char(c).is_some());

        if looks_like_facelets {
            CubieCube::from_facelets(trimmed)
        } else {
            parse_sequence(trimmed).map(|moves| CubieCube::from_moves(&moves))
        }
    }

    /// Finds a shortest solution of at most `max_depth` moves.
    ///
    /// # Errors
    ///
    /// - [`SolveError::DepthExceeded`] if no solution fits in `max_depth`
    /// - [`SolveError::BudgetExhausted`] if the node budget ran out first
    pub fn search(&self, cube: &CubieCube, max_depth: u8) -> Result<Vec<Move>, SolveError> {
        let start = Node::from_cube(cube);
        let mut path = Vec::with_capacity(max_depth as usize);
        let mut nodes = 0u64;

        for bound in self.heuristic(&start)..=max_depth {
            if self.expand(&start, 0, bound, None, &mut path, &mut nodes)? {
                debug!(depth = path.len(), nodes, "Search finished");
                return Ok(path);
            }
        }

        Err(SolveError::DepthExceeded { max_depth })
    }

    /// Admissible lower bound on the distance to solved.
    #[inline]
    fn heuristic(&self, node: &Node) -> u8 {
        self.corner_orientation
            .distance(node.co)
            .max(self.edge_orientation.distance(node.eo))
            .max(self.corner_permutation.distance(node.cp))
    }

    /// Depth-first expansion below `bound`.
    fn expand(
        &self,
        node: &Node,
        depth: u8,
        bound: u8,
        last: Option<Face>,
        path: &mut Vec<Move>,
        nodes: &mut u64,
    ) -> Result<bool, SolveError> {
        *nodes += 1;
        if *nodes > self.node_budget {
            return Err(SolveError::BudgetExhausted {
                nodes: self.node_budget,
            });
        }

        if node.is_solved() {
            return Ok(true);
        }
        if u16::from(depth) + u16::from(self.heuristic(node)) > u16::from(bound) {
            return Ok(false);
        }

        for m in 0..MOVE_COUNT {
            let mv = Move::from_index(m);
            if let Some(prev) = last {
                // Same face twice, or opposite faces in non-canonical order.
                if mv.face == prev || (mv.face == prev.opposite() && mv.face < prev) {
                    continue;
                }
            }

            let next = self.step(node, m);
            path.push(mv);
            if self.expand(&next, depth + 1, bound, Some(mv.face), path, nodes)? {
                return Ok(true);
            }
            path.pop();
        }

        Ok(false)
    }

    #[inline]
    fn step(&self, node: &Node, m: usize) -> Node {
        let perm = &self.edge_moves[m];
        let mut ep = [0u8; 12];
        for (slot, out) in ep.iter_mut().enumerate() {
            *out = node.ep[perm[slot] as usize];
        }

        Node {
            co: self.corner_orientation.step(node.co, m),
            eo: self.edge_orientation.step(node.eo, m),
            cp: self.corner_permutation.step(node.cp, m),
            ep,
        }
    }
}

impl Solver for SearchSolver {
    fn solve(&self, scramble: &str, max_depth: u8) -> Result<String, SolveError> {
        let cube = Self::parse_scramble(scramble)?;
        let moves = self.search(&cube, max_depth)?;
        Ok(format_sequence(&moves))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::LazyLock;

    use proptest::prelude::*;

    static SOLVER: LazyLock<SearchSolver> = LazyLock::new(SearchSolver::new);

    const SOLVED_FACELETS: &str = "UUUUUUUUURRRRRRRRRFFFFFFFFFDDDDDDDDDLLLLLLLLLBBBBBBBBB";

    fn solves(scramble: &str, solution: &str) -> bool {
        let cube = SearchSolver::parse_scramble(scramble).expect("valid scramble");
        let moves = if solution.is_empty() {
            Vec::new()
        } else {
            parse_sequence(solution).expect("valid solution")
        };
        moves.iter().fold(cube, |c, &m| c.apply(m)).is_solved()
    }

    #[test]
    fn test_solved_cube_has_empty_solution() {
        assert_eq!(SOLVER.solve(SOLVED_FACELETS, 20).unwrap(), "");
        assert_eq!(SOLVER.solve("R R'", 20).unwrap(), "");
    }

    #[test]
    fn test_single_move() {
        assert_eq!(SOLVER.solve("R", 20).unwrap(), "R'");
        assert_eq!(SOLVER.solve("U2", 20).unwrap(), "U2");
    }

    #[test]
    fn test_solution_is_short_and_correct() {
        let scramble = "R U R' U' F2";
        let solution = SOLVER.solve(scramble, 20).unwrap();
        assert!(solution.split_whitespace().count() <= 5);
        assert!(solves(scramble, &solution));
    }

    #[test]
    fn test_facelet_input() {
        let facelets = CubieCube::from_moves(&parse_sequence("F D' L2").unwrap()).to_facelets();
        let solution = SOLVER.solve(&facelets, 20).unwrap();
        assert_eq!(solution.split_whitespace().count(), 3);
        assert!(solves(&facelets, &solution));
    }

    #[test]
    fn test_depth_exceeded() {
        let err = SOLVER.solve("R U F", 2).unwrap_err();
        assert!(matches!(err, SolveError::DepthExceeded { max_depth: 2 }));
    }

    #[test]
    fn test_budget_exhausted() {
        let tiny = SearchSolver::new().with_node_budget(3);
        let err = tiny.solve("R U F L D B", 20).unwrap_err();
        assert!(matches!(err, SolveError::BudgetExhausted { .. }));
    }

    #[test]
    fn test_long_scramble_runs_out_of_budget() {
        let bounded = SearchSolver::new().with_node_budget(200_000);
        let scramble = "D2 F' R U2 L' B D' R2 F U' L2 B' R D F2 U L' B2 D' R";
        let err = bounded.solve(scramble, 20).unwrap_err();
        assert!(matches!(err, SolveError::BudgetExhausted { nodes: 200_000 }));
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(SOLVER.solve("invalid scramble string", 20).is_err());
        assert!(SOLVER.solve("", 20).is_err());
    }

    #[test]
    fn test_deterministic() {
        let a = SOLVER.solve("L F' D2 B", 20).unwrap();
        let b = SOLVER.solve("L F' D2 B", 20).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_pattern_tables_cover_every_coordinate() {
        let solver = &*SOLVER;
        assert!(solver.corner_orientation.distance.iter().all(|&d| d != UNSEEN));
        assert!(solver.edge_orientation.distance.iter().all(|&d| d != UNSEEN));
        assert!(solver.corner_permutation.distance.iter().all(|&d| d != UNSEEN));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_short_scrambles_are_solved_optimally(indices in prop::collection::vec(0..MOVE_COUNT, 1..5)) {
            let moves: Vec<Move> = indices.into_iter().map(Move::from_index).collect();
            let scramble = format_sequence(&moves);
            let solution = SOLVER.solve(&scramble, 20).unwrap();

            prop_assert!(solution.split_whitespace().count() <= moves.len());
            prop_assert!(solves(&scramble, &solution));
        }
    }
}
