use crate::lattice::{Lattice, Position};
use segregation_common::{CellState, SegregationError};

/// Relative offsets of the Moore neighborhood, the cell itself excluded.
#[rustfmt::skip]
pub const NEIGHBOR_OFFSETS: [(isize, isize); 8] = [
    (-1, -1), (-1, 0), (-1, 1),
    (0, -1),           (0, 1),
    (1, -1),  (1, 0),  (1, 1),
];

/// Occupied-neighbor tally for one cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NeighborCounts {
    /// Occupied neighbors sharing the cell's state.
    pub similar: u32,
    /// All occupied neighbors. Empty neighbors are never counted.
    pub total: u32,
}

impl NeighborCounts {
    /// Share of similar neighbors, `None` for a cell without occupied neighbors.
    #[inline]
    pub fn ratio(&self) -> Option<f64> {
        if self.total == 0 {
            None
        } else {
            Some(self.similar as f64 / self.total as f64)
        }
    }
}

/// Calls `f` with the state of every in-bounds neighbor of `(row, col)`.
/// Neighbors outside the lattice are skipped; there is no wraparound.
#[inline(always)]
pub(crate) fn for_each_neighbor<F>(lattice: &Lattice, row: usize, col: usize, mut f: F)
where
    F: FnMut(CellState),
{
    for (dy, dx) in NEIGHBOR_OFFSETS {
        let check_row = row as isize + dy;
        let check_col = col as isize + dx;
        if lattice.contains(check_row, check_col) {
            f(lattice.cell_at(check_row as usize, check_col as usize));
        }
    }
}

#[inline]
pub(crate) fn counts_at(lattice: &Lattice, row: usize, col: usize) -> NeighborCounts {
    let own = lattice.cell_at(row, col);
    let mut counts = NeighborCounts::default();
    for_each_neighbor(lattice, row, col, |neighbor| {
        if neighbor.is_occupied() {
            counts.total += 1;
            if neighbor == own {
                counts.similar += 1;
            }
        }
    });
    counts
}

/// Counts the similar and the occupied neighbors of `pos`.
pub fn neighbor_counts(lattice: &Lattice, pos: Position) -> Result<NeighborCounts, SegregationError> {
    lattice.get(pos)?;
    Ok(counts_at(lattice, pos.row, pos.col))
}

#[inline]
fn happy_at(lattice: &Lattice, row: usize, col: usize, threshold: u32) -> bool {
    if lattice.cell_at(row, col) == CellState::Empty {
        return true;
    }
    let counts = counts_at(lattice, row, col);
    // The threshold is an absolute neighbor count, not a share.
    counts.total == 0 || counts.similar >= threshold
}

/// Whether the agent at `pos` is satisfied with its neighborhood.
///
/// Empty cells and agents without any occupied neighbor are always happy.
/// Otherwise at least `threshold` occupied neighbors must share the agent's type.
pub fn is_happy(lattice: &Lattice, pos: Position, threshold: u32) -> Result<bool, SegregationError> {
    lattice.get(pos)?;
    Ok(happy_at(lattice, pos.row, pos.col, threshold))
}

/// All occupied, unhappy positions in row-major order.
pub fn unhappy_positions(lattice: &Lattice, threshold: u32) -> Vec<Position> {
    lattice
        .positions()
        .filter(|p| !happy_at(lattice, p.row, p.col, threshold))
        .collect()
}
