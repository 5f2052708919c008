use anyhow::{Context, Result};
use std::path::Path;
use std::time::Instant;
use log::{info, warn, debug};

use segregation_engine::output::{self, OutputFormat};
use segregation_engine::{SimulationConfig, SimulationEngine, SimulationState, SnapshotSchedule};

const DEFAULT_CONFIG_PATH: &str = "config.toml";

fn main() -> Result<()> {
    // Initialize the logger
    env_logger::init();

    info!("Starting Segregation Engine...");

    // --- Load Configuration ---
    // An explicit path must exist; the default one is optional.
    let config = match std::env::args().nth(1) {
        Some(path) => SimulationConfig::load(&path)?,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => SimulationConfig::load(DEFAULT_CONFIG_PATH)?,
        None => {
            warn!("No {} found. Using built-in defaults.", DEFAULT_CONFIG_PATH);
            SimulationConfig::default()
        }
    };

    // --- Initialize Simulation ---
    let mut sim = SimulationEngine::new(config).context("Failed to initialize simulation")?;
    let params = sim.params().clone();
    info!(
        "Lattice {}x{} initialized: {} empty, {} type A, {} type B.",
        params.size, params.size, params.num_empty, params.num_type_a, params.num_type_b
    );
    debug!("Simulation Parameters: {:#?}", params);

    let output_config = sim.config().output.clone();
    let schedule = SnapshotSchedule::from_config(sim.config());
    info!("Recording snapshot every {} steps.", schedule.interval());
    info!(
        "Initial segregation index: {:.4}. Starting simulation loop for up to {} steps...",
        sim.current_index(),
        params.num_steps
    );
    let start_time = Instant::now();

    // --- Simulation Loop ---
    let result = sim
        .run_with_snapshots(&schedule, output_config.save_cells_in_snapshot)
        .context("Simulation failed")?;

    match result.terminal_state {
        SimulationState::Converged => {
            info!("Simulation finished at step {}: all agents are happy.", result.steps_executed)
        }
        SimulationState::Stalled => warn!("No empty cells available for relocation."),
        SimulationState::StepLimitReached | SimulationState::Running => {}
    }

    let total_duration = start_time.elapsed();
    info!(
        "Simulation finished in {:.3} seconds after {} steps ({:?}).",
        total_duration.as_secs_f64(),
        result.steps_executed,
        result.terminal_state
    );
    info!("Final segregation index: {:.4}", result.final_index);

    // --- Save Recorded Data ---
    let base_filename = &output_config.base_filename;
    if output_config.save_snapshots {
        let format = OutputFormat::from_name(output_config.format.as_deref().unwrap_or("json"));
        let path = output::snapshot_path(base_filename, format);
        output::write_snapshots(&path, sim.get_recorded_snapshots(), format)?;
    } else {
        info!("Skipping saving snapshots as per config (save_snapshots is false).");
    }

    if output_config.save_history {
        output::write_history_csv(&output::history_path(base_filename), &result.history)?;
    } else {
        info!("Skipping saving segregation history as per config.");
    }

    info!("Simulation Complete.");
    Ok(())
}
