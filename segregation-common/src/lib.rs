pub mod cell;
pub mod config;
pub mod error;
pub mod sim_params;
pub mod snapshot;

// Re-export key types for easier use by dependent crates
pub use cell::{CellCounts, CellState};
pub use config::{SimulationConfig, LatticeConfig, TimingConfig, InitialConditions, OutputConfig, MAX_SIMILARITY_THRESHOLD, RATIO_TOLERANCE};
pub use error::SegregationError;
pub use sim_params::SimParams;
pub use snapshot::Snapshot;
