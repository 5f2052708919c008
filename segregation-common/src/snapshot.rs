use serde::{Serialize, Deserialize};
use crate::cell::{CellCounts, CellState};

/// A snapshot of the lattice and its metrics after a given step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Number of relocations performed when the snapshot was taken (0 = initial lattice).
    pub step: u32,
    /// Side length of the lattice.
    pub size: u32,
    /// Segregation index of the lattice at this step.
    pub segregation_index: f64,
    /// Number of occupied cells that are currently unhappy.
    pub unhappy_count: u32,
    pub counts: CellCounts,
    /// Optional: row-major cell encoding (see [`CellState::as_u8`]).
    /// Included only if `config.output.save_cells_in_snapshot` is true.
    pub cells: Option<Vec<u8>>,
}

impl Snapshot {
    /// Decodes the stored cells, if present. Unknown codes are reported as `None`.
    pub fn decoded_cells(&self) -> Option<Vec<Option<CellState>>> {
        self.cells
            .as_ref()
            .map(|cells| cells.iter().map(|&c| CellState::from_u8(c)).collect())
    }
}
