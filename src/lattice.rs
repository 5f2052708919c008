use crate::random::RandomSelector;
use segregation_common::{CellCounts, CellState, SegregationError, SimParams, SimulationConfig};
use serde::{Deserialize, Serialize};

/// A `(row, col)` coordinate on the lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub row: usize,
    pub col: usize,
}

impl Position {
    pub fn new(row: usize, col: usize) -> Self {
        Position { row, col }
    }
}

/// Index-backed set of the empty positions.
///
/// `slots[row * size + col]` holds the index of the position in `positions`,
/// so insertion and swap-with-last removal are both O(1).
#[derive(Debug, Clone)]
pub struct EmptyPositions {
    size: usize,
    positions: Vec<Position>,
    slots: Vec<Option<usize>>,
}

impl EmptyPositions {
    fn with_size(size: usize) -> Self {
        EmptyPositions {
            size,
            positions: Vec::new(),
            slots: vec![None; size * size],
        }
    }

    fn insert(&mut self, pos: Position) {
        let flat = pos.row * self.size + pos.col;
        if self.slots[flat].is_none() {
            self.slots[flat] = Some(self.positions.len());
            self.positions.push(pos);
        }
    }

    fn remove(&mut self, pos: Position) -> bool {
        let flat = pos.row * self.size + pos.col;
        let Some(slot) = self.slots[flat].take() else {
            return false;
        };
        self.positions.swap_remove(slot);
        // The former last element now lives in `slot`.
        if let Some(moved) = self.positions.get(slot) {
            self.slots[moved.row * self.size + moved.col] = Some(slot);
        }
        true
    }

    pub fn contains(&self, pos: Position) -> bool {
        pos.row < self.size && pos.col < self.size && self.slots[pos.row * self.size + pos.col].is_some()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// The empty positions in internal order. Order carries no meaning.
    pub fn as_slice(&self) -> &[Position] {
        &self.positions
    }

    pub fn iter(&self) -> impl Iterator<Item = &Position> {
        self.positions.iter()
    }
}

/// The `n x n` grid of cell states together with its empty-site bookkeeping.
#[derive(Debug, Clone)]
pub struct Lattice {
    size: usize,
    // Row-major cell states
    cells: Vec<CellState>,
    empty: EmptyPositions,
}

impl Lattice {
    /// Builds a randomly shuffled lattice with the population mix of `config`.
    pub fn create(config: &SimulationConfig, selector: &mut RandomSelector) -> Result<Self, SegregationError> {
        let params = config.get_sim_params()?;
        Self::populate(&params, selector)
    }

    /// Lays out `num_empty` empty cells, `num_type_a` type A and `num_type_b`
    /// type B agents, then applies one uniform permutation over all positions.
    pub fn populate(params: &SimParams, selector: &mut RandomSelector) -> Result<Self, SegregationError> {
        if params.num_empty + params.num_type_a + params.num_type_b != params.size * params.size {
            return Err(SegregationError::configuration(format!(
                "population counts {} + {} + {} do not fill a {}x{} lattice",
                params.num_empty, params.num_type_a, params.num_type_b, params.size, params.size
            )));
        }

        let mut cells = Vec::with_capacity(params.size * params.size);
        cells.extend(std::iter::repeat(CellState::Empty).take(params.num_empty));
        cells.extend(std::iter::repeat(CellState::TypeA).take(params.num_type_a));
        cells.extend(std::iter::repeat(CellState::TypeB).take(params.num_type_b));
        selector.shuffle(&mut cells);

        Self::from_cells(params.size, cells)
    }

    /// Wraps row-major `cells` as a `size x size` lattice.
    pub fn from_cells(size: usize, cells: Vec<CellState>) -> Result<Self, SegregationError> {
        if size == 0 {
            return Err(SegregationError::configuration("lattice size must be positive"));
        }
        if cells.len() != size * size {
            return Err(SegregationError::configuration(format!(
                "expected {} cells for a {}x{} lattice, got {}",
                size * size,
                size,
                size,
                cells.len()
            )));
        }

        let mut empty = EmptyPositions::with_size(size);
        for (idx, cell) in cells.iter().enumerate() {
            if *cell == CellState::Empty {
                empty.insert(Position::new(idx / size, idx % size));
            }
        }

        Ok(Lattice { size, cells, empty })
    }

    /// Builds a lattice from an explicit square layout.
    pub fn from_rows(rows: &[Vec<CellState>]) -> Result<Self, SegregationError> {
        let size = rows.len();
        if let Some(row) = rows.iter().find(|row| row.len() != size) {
            return Err(SegregationError::configuration(format!(
                "lattice rows must all have length {size}, found one of length {}",
                row.len()
            )));
        }
        Self::from_cells(size, rows.concat())
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// True when `(row, col)` lies inside the lattice. Accepts signed
    /// coordinates so neighbor offsets can be applied without wrapping.
    #[inline(always)]
    pub fn contains(&self, row: isize, col: isize) -> bool {
        row >= 0 && col >= 0 && (row as usize) < self.size && (col as usize) < self.size
    }

    fn flat_index(&self, pos: Position) -> Result<usize, SegregationError> {
        if pos.row < self.size && pos.col < self.size {
            Ok(pos.row * self.size + pos.col)
        } else {
            Err(SegregationError::Index { row: pos.row, col: pos.col, size: self.size })
        }
    }

    pub fn get(&self, pos: Position) -> Result<CellState, SegregationError> {
        Ok(self.cells[self.flat_index(pos)?])
    }

    /// Unchecked read for coordinates already known to be in bounds.
    #[inline(always)]
    pub(crate) fn cell_at(&self, row: usize, col: usize) -> CellState {
        self.cells[row * self.size + col]
    }

    /// Writes `state` at `pos`, keeping the empty-position set in step.
    pub fn set(&mut self, pos: Position, state: CellState) -> Result<(), SegregationError> {
        let idx = self.flat_index(pos)?;
        self.cells[idx] = state;
        if state == CellState::Empty {
            self.empty.insert(pos);
        } else {
            self.empty.remove(pos);
        }
        Ok(())
    }

    /// Moves the agent at `from` into the empty site `to` and vacates `from`.
    pub fn relocate(&mut self, from: Position, to: Position) -> Result<(), SegregationError> {
        let agent = self.get(from)?;
        self.set(to, agent)?;
        self.set(from, CellState::Empty)
    }

    pub fn empty_positions(&self) -> &EmptyPositions {
        &self.empty
    }

    /// Row-major view of every cell.
    pub fn cells(&self) -> &[CellState] {
        &self.cells
    }

    pub fn positions(&self) -> impl Iterator<Item = Position> + '_ {
        (0..self.size).flat_map(move |row| (0..self.size).map(move |col| Position::new(row, col)))
    }

    pub fn counts(&self) -> CellCounts {
        CellCounts::from_cells(&self.cells)
    }

    /// Compact row-major encoding used by snapshots.
    pub fn encode(&self) -> Vec<u8> {
        self.cells.iter().map(|c| c.as_u8()).collect()
    }
}
