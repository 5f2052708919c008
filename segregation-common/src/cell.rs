use serde::{Deserialize, Serialize};

/// State of a single lattice site.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellState {
    #[default]
    Empty,
    TypeA,
    TypeB,
}

impl CellState {
    /// Compact encoding used in snapshots: 0 = empty, 1 = type A, 2 = type B.
    #[inline]
    pub fn as_u8(self) -> u8 {
        match self {
            CellState::Empty => 0,
            CellState::TypeA => 1,
            CellState::TypeB => 2,
        }
    }

    /// Inverse of [`CellState::as_u8`]. Any other value is rejected.
    #[inline]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CellState::Empty),
            1 => Some(CellState::TypeA),
            2 => Some(CellState::TypeB),
            _ => None,
        }
    }

    #[inline]
    pub fn is_occupied(self) -> bool {
        self != CellState::Empty
    }
}

/// Tally of cells per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellCounts {
    pub empty: usize,
    pub type_a: usize,
    pub type_b: usize,
}

impl CellCounts {
    pub fn total(&self) -> usize {
        self.empty + self.type_a + self.type_b
    }

    /// Adds one cell of the given state to the tally.
    pub fn record(&mut self, state: CellState) {
        match state {
            CellState::Empty => self.empty += 1,
            CellState::TypeA => self.type_a += 1,
            CellState::TypeB => self.type_b += 1,
        }
    }

    pub fn from_cells<'a, I>(cells: I) -> Self
    where
        I: IntoIterator<Item = &'a CellState>,
    {
        let mut counts = CellCounts::default();
        for &cell in cells {
            counts.record(cell);
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_is_closed() {
        for state in [CellState::Empty, CellState::TypeA, CellState::TypeB] {
            assert_eq!(CellState::from_u8(state.as_u8()), Some(state));
        }
        assert_eq!(CellState::from_u8(3), None);
        assert_eq!(CellState::from_u8(255), None);
    }

    #[test]
    fn counts_tally_every_state() {
        let cells = [
            CellState::TypeA,
            CellState::Empty,
            CellState::TypeB,
            CellState::TypeA,
        ];
        let counts = CellCounts::from_cells(&cells);
        assert_eq!(counts, CellCounts { empty: 1, type_a: 2, type_b: 1 });
        assert_eq!(counts.total(), 4);
    }
}
