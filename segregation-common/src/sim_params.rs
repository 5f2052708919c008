use serde::{Deserialize, Serialize};

/// Run parameters derived from the configuration, fixed for the lifetime of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimParams {
    // Lattice
    pub size: usize,
    pub num_cells: usize, // size * size

    // Population, conserved by every relocation
    pub num_empty: usize,
    pub num_type_a: usize,
    pub num_type_b: usize,

    // Dynamics
    pub num_steps: u32,
    pub similarity_threshold: u32,
    pub seed: u64,
}
