//! Schelling-style segregation dynamics on a square lattice.
//!
//! The core ([`lattice`], [`grid`], [`metrics`], [`random`] and
//! [`simulation`]) is synchronous and free of I/O. [`output`] and [`batch`]
//! build on top of it for the runner binary and for replicate studies.

pub mod batch;
pub mod grid;
pub mod lattice;
pub mod metrics;
pub mod output;
pub mod random;
pub mod simulation;

pub use grid::{is_happy, neighbor_counts, unhappy_positions, NeighborCounts};
pub use lattice::{EmptyPositions, Lattice, Position};
pub use metrics::{segregation_index, segregation_index_checked, ISOLATED_LATTICE_INDEX};
pub use random::RandomSelector;
pub use simulation::{RunResult, SimulationEngine, SimulationState, SnapshotSchedule, StepOutcome};

pub use segregation_common::{CellCounts, CellState, SegregationError, SimParams, SimulationConfig, Snapshot};
