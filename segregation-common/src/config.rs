use serde::{Deserialize, Serialize};
use anyhow::Result;
use crate::error::SegregationError;
use crate::sim_params::SimParams;
use std::path::Path;

/// Tolerance used when checking that the population ratios sum to one.
pub const RATIO_TOLERANCE: f64 = 1e-6;
/// Largest meaningful similarity threshold: a cell has at most 8 Moore neighbors.
pub const MAX_SIMILARITY_THRESHOLD: u32 = 8;

// Lattice dimensions and population mix
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct LatticeConfig {
    /// Side length `n` of the square lattice.
    pub size: usize,
    pub empty_ratio: f64,
    pub type_a_ratio: f64,
    /// Share of type B agents. Derived as the remainder when omitted.
    #[serde(default)]
    pub type_b_ratio: Option<f64>,
}

// Configuration for timing
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct TimingConfig {
    pub num_steps: u32,
    /// The runner records a snapshot every `num_steps / snapshot_divisions` steps.
    #[serde(default = "default_snapshot_divisions")]
    pub snapshot_divisions: u32,
}

// Initial conditions for the simulation, loaded from config.toml
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct InitialConditions {
    /// Minimum number of same-type occupied neighbors an agent needs to be happy.
    pub similarity_threshold: u32,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

// Configuration for output settings, loaded from config.toml
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct OutputConfig {
    pub base_filename: String,
    #[serde(default = "default_true")]
    pub save_history: bool,
    #[serde(default = "default_true")]
    pub save_snapshots: bool,
    #[serde(default = "default_true")]
    pub save_cells_in_snapshot: bool,
    pub format: Option<String>, // Output format: "json", "bincode", "messagepack"
}

// Main simulation configuration structure, loaded from config.toml.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub lattice: LatticeConfig,
    pub timing: TimingConfig,
    pub initial_conditions: InitialConditions,
    #[serde(default)]
    pub output: OutputConfig,
}

fn default_snapshot_divisions() -> u32 {
    5
}

fn default_seed() -> u64 {
    42
}

fn default_true() -> bool {
    true
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            base_filename: "segregation".to_string(),
            save_history: true,
            save_snapshots: true,
            save_cells_in_snapshot: true,
            format: Some("bincode".to_string()),
        }
    }
}

impl Default for SimulationConfig {
    /// A 50x50 lattice with 10% vacancies, an even split between the two
    /// agent types, 1000 steps and a threshold of two similar neighbors.
    fn default() -> Self {
        SimulationConfig {
            lattice: LatticeConfig {
                size: 50,
                empty_ratio: 0.10,
                type_a_ratio: 0.45,
                type_b_ratio: Some(0.45),
            },
            timing: TimingConfig {
                num_steps: 1000,
                snapshot_divisions: default_snapshot_divisions(),
            },
            initial_conditions: InitialConditions {
                similarity_threshold: 2,
                seed: default_seed(),
            },
            output: OutputConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Loads the simulation configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e))?;
        let config: SimulationConfig = toml::from_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML from '{}': {}", path_ref.display(), e))?;

        config.validate()?;
        Ok(config)
    }

    /// Share of type B agents, either as configured or as the remainder.
    pub fn type_b_ratio(&self) -> f64 {
        self.lattice
            .type_b_ratio
            .unwrap_or(1.0 - self.lattice.empty_ratio - self.lattice.type_a_ratio)
    }

    /// Checks everything a run depends on. Output settings are not inspected.
    pub fn validate(&self) -> Result<(), SegregationError> {
        let lattice = &self.lattice;
        if lattice.size == 0 {
            return Err(SegregationError::configuration("lattice size must be positive"));
        }

        let ratios = [
            ("empty_ratio", lattice.empty_ratio),
            ("type_a_ratio", lattice.type_a_ratio),
            ("type_b_ratio", self.type_b_ratio()),
        ];
        for (name, ratio) in ratios {
            if !ratio.is_finite() {
                return Err(SegregationError::configuration(format!("{name} must be a finite number")));
            }
            // A derived remainder may land a hair below zero through rounding.
            let derived = name == "type_b_ratio" && lattice.type_b_ratio.is_none();
            let floor = if derived { -RATIO_TOLERANCE } else { 0.0 };
            if ratio < floor {
                return Err(SegregationError::configuration(format!(
                    "{name} must not be negative (got {ratio})"
                )));
            }
        }

        let sum: f64 = ratios.iter().map(|(_, r)| r).sum();
        if (sum - 1.0).abs() > RATIO_TOLERANCE {
            return Err(SegregationError::configuration(format!(
                "population ratios must sum to 1 (got {sum})"
            )));
        }

        self.validate_dynamics()
    }

    /// Checks the step budget and the similarity threshold only, for runs
    /// whose lattice does not come from the `[lattice]` section.
    pub fn validate_dynamics(&self) -> Result<(), SegregationError> {
        if self.timing.num_steps == 0 {
            return Err(SegregationError::configuration("num_steps must be positive"));
        }

        let threshold = self.initial_conditions.similarity_threshold;
        if threshold > MAX_SIMILARITY_THRESHOLD {
            return Err(SegregationError::configuration(format!(
                "similarity_threshold must be within [0, {MAX_SIMILARITY_THRESHOLD}] (got {threshold})"
            )));
        }

        Ok(())
    }

    /// Converts the configuration into the immutable parameters of a run.
    pub fn get_sim_params(&self) -> Result<SimParams, SegregationError> {
        self.validate()?;

        let size = self.lattice.size;
        let num_cells = size
            .checked_mul(size)
            .ok_or_else(|| SegregationError::configuration("lattice size overflows the cell count"))?;

        // Counts are truncated; type B absorbs the rounding remainder.
        let num_empty = (self.lattice.empty_ratio * num_cells as f64).floor() as usize;
        let num_type_a = (self.lattice.type_a_ratio * num_cells as f64).floor() as usize;
        let num_type_b = num_cells
            .checked_sub(num_empty + num_type_a)
            .ok_or_else(|| SegregationError::configuration("population counts exceed the lattice"))?;

        Ok(SimParams {
            size,
            num_cells,
            num_empty,
            num_type_a,
            num_type_b,
            num_steps: self.timing.num_steps,
            similarity_threshold: self.initial_conditions.similarity_threshold,
            seed: self.initial_conditions.seed,
        })
    }
}
