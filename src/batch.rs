use crate::simulation::{RunResult, SimulationEngine, SimulationState};
use log::info;
use rayon::prelude::*;
use segregation_common::{SegregationError, SimulationConfig};
use serde::{Deserialize, Serialize};

/// Aggregate view over a set of replicate runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub runs: usize,
    pub converged: usize,
    pub stalled: usize,
    pub step_limited: usize,
    /// Mean final segregation index, 0.0 for an empty batch.
    pub mean_final_index: f64,
    pub mean_steps_executed: f64,
}

/// Runs one independent engine per seed on the rayon pool.
///
/// Each run is single-threaded and owns its lattice, so results are identical
/// to running the seeds one after another. Results come back in seed order.
pub fn run_replicates(config: &SimulationConfig, seeds: &[u64]) -> Result<Vec<RunResult>, SegregationError> {
    config.validate()?;
    info!("Running {} replicates on {} Rayon threads.", seeds.len(), rayon::current_num_threads());

    seeds
        .par_iter()
        .map(|&seed| {
            let mut replicate = config.clone();
            replicate.initial_conditions.seed = seed;
            SimulationEngine::new(replicate)?.run()
        })
        .collect()
}

pub fn summarize(results: &[RunResult]) -> BatchSummary {
    let runs = results.len();
    let count = |state: SimulationState| results.iter().filter(|r| r.terminal_state == state).count();
    let mean = |total: f64| if runs > 0 { total / runs as f64 } else { 0.0 };

    BatchSummary {
        runs,
        converged: count(SimulationState::Converged),
        stalled: count(SimulationState::Stalled),
        step_limited: count(SimulationState::StepLimitReached),
        mean_final_index: mean(results.iter().map(|r| r.final_index).sum()),
        mean_steps_executed: mean(results.iter().map(|r| r.steps_executed as f64).sum()),
    }
}
