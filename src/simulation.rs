use crate::grid::unhappy_positions;
use crate::lattice::{Lattice, Position};
use crate::metrics::segregation_index;
use crate::random::RandomSelector;
use log::{debug, info, trace};
use segregation_common::{CellState, SegregationError, SimParams, SimulationConfig, Snapshot};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Lifecycle of a run. Every state except `Running` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SimulationState {
    Running,
    /// Every agent is happy.
    Converged,
    /// Unhappy agents remain but there is no empty site to move to.
    Stalled,
    /// The step budget ran out first.
    StepLimitReached,
}

impl SimulationState {
    pub fn is_terminal(self) -> bool {
        self != SimulationState::Running
    }
}

/// What a single call to [`SimulationEngine::step`] did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    /// One agent relocated; `segregation_index` is the index after the move.
    Moved {
        from: Position,
        to: Position,
        agent: CellState,
        segregation_index: f64,
    },
    /// No move was made because the run is over.
    Finished(SimulationState),
}

/// Everything a finished run leaves behind.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub final_lattice: Lattice,
    pub final_index: f64,
    pub history: Vec<f64>,
    pub terminal_state: SimulationState,
    pub steps_executed: u32,
}

/// Steps at which a recorded run captures snapshots: the initial lattice,
/// step 1, every `interval` steps and the final budgeted step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotSchedule {
    interval: u32,
    num_steps: u32,
}

impl SnapshotSchedule {
    /// Splits `num_steps` into `divisions` record intervals of at least one step.
    pub fn new(num_steps: u32, divisions: u32) -> Self {
        SnapshotSchedule {
            interval: (num_steps / divisions.max(1)).max(1),
            num_steps,
        }
    }

    pub fn from_config(config: &SimulationConfig) -> Self {
        Self::new(config.timing.num_steps, config.timing.snapshot_divisions)
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }

    pub fn is_record_step(&self, step: u32) -> bool {
        step <= 1 || step % self.interval == 0 || step == self.num_steps
    }
}

/// Drives the relocation dynamics on one lattice.
///
/// The engine owns its lattice and its random selector for the whole run; it
/// performs no I/O beyond `log` records at step boundaries.
pub struct SimulationEngine {
    /// The simulation configuration, including initial conditions and parameters.
    config: SimulationConfig,
    params: SimParams,
    lattice: Lattice,
    selector: RandomSelector,
    state: SimulationState,
    /// Number of relocations performed so far.
    steps_executed: u32,
    /// Segregation index after each relocation, in step order.
    history: Vec<f64>,
    /// Stores collected snapshots at record intervals.
    recorded_snapshots: Vec<Snapshot>,
}

impl SimulationEngine {
    /// Creates an engine with a randomly populated lattice, seeded from the configuration.
    pub fn new(config: SimulationConfig) -> Result<Self, SegregationError> {
        let selector = RandomSelector::from_seed(config.initial_conditions.seed);
        Self::with_selector(config, selector)
    }

    /// Like [`SimulationEngine::new`] but draws from an injected selector.
    pub fn with_selector(config: SimulationConfig, mut selector: RandomSelector) -> Result<Self, SegregationError> {
        let params = config.get_sim_params()?;
        let lattice = Lattice::populate(&params, &mut selector)?;
        debug!(
            "Populated {}x{} lattice: {} empty, {} type A, {} type B.",
            params.size, params.size, params.num_empty, params.num_type_a, params.num_type_b
        );
        Ok(Self::assemble(config, params, lattice, selector))
    }

    /// Starts from a fixed layout instead of a shuffled one.
    ///
    /// The lattice's own size and population replace the `[lattice]` section
    /// of the configuration, which is not validated. Timing and the
    /// similarity threshold still come from the configuration.
    pub fn from_lattice(
        config: SimulationConfig,
        lattice: Lattice,
        selector: RandomSelector,
    ) -> Result<Self, SegregationError> {
        config.validate_dynamics()?;
        let counts = lattice.counts();
        let params = SimParams {
            size: lattice.size(),
            num_cells: counts.total(),
            num_empty: counts.empty,
            num_type_a: counts.type_a,
            num_type_b: counts.type_b,
            num_steps: config.timing.num_steps,
            similarity_threshold: config.initial_conditions.similarity_threshold,
            seed: config.initial_conditions.seed,
        };
        Ok(Self::assemble(config, params, lattice, selector))
    }

    fn assemble(config: SimulationConfig, params: SimParams, lattice: Lattice, selector: RandomSelector) -> Self {
        let history = Vec::with_capacity(params.num_steps as usize);
        SimulationEngine {
            config,
            params,
            lattice,
            selector,
            state: SimulationState::Running,
            steps_executed: 0,
            history,
            recorded_snapshots: Vec::new(),
        }
    }

    /// Performs at most one relocation.
    ///
    /// Rescans the whole lattice for unhappy agents, then moves one of them,
    /// chosen uniformly, to an empty site chosen uniformly and independently.
    /// Once the run is over this returns the terminal state without touching
    /// the lattice.
    pub fn step(&mut self) -> Result<StepOutcome, SegregationError> {
        if self.state.is_terminal() {
            return Ok(StepOutcome::Finished(self.state));
        }

        let threshold = self.params.similarity_threshold;
        let unhappy = unhappy_positions(&self.lattice, threshold);
        trace!("Step {}: {} unhappy agents.", self.steps_executed + 1, unhappy.len());

        let from = match self.selector.uniform_choice(&unhappy) {
            Some(&pos) => pos,
            None => return Ok(self.finish(SimulationState::Converged)),
        };
        let to = match self.selector.uniform_choice(self.lattice.empty_positions().as_slice()) {
            Some(&pos) => pos,
            None => return Ok(self.finish(SimulationState::Stalled)),
        };

        let agent = self.lattice.get(from)?;
        self.lattice.relocate(from, to)?;
        let index = segregation_index(&self.lattice);
        self.history.push(index);
        self.steps_executed += 1;
        debug!(
            "Step {}: moved {:?} from ({}, {}) to ({}, {}), segregation index {:.4}",
            self.steps_executed, agent, from.row, from.col, to.row, to.col, index
        );

        if self.steps_executed >= self.params.num_steps {
            self.finish(SimulationState::StepLimitReached);
        }

        Ok(StepOutcome::Moved { from, to, agent, segregation_index: index })
    }

    fn finish(&mut self, state: SimulationState) -> StepOutcome {
        self.state = state;
        match state {
            SimulationState::Converged => {
                info!("Converged after {} steps: every agent is happy.", self.steps_executed)
            }
            SimulationState::Stalled => {
                info!("Stalled after {} steps: no empty cell left to move to.", self.steps_executed)
            }
            SimulationState::StepLimitReached => {
                info!("Step limit of {} reached.", self.params.num_steps)
            }
            SimulationState::Running => {}
        }
        StepOutcome::Finished(state)
    }

    /// Steps until a terminal state is reached.
    pub fn run(&mut self) -> Result<RunResult, SegregationError> {
        while !self.state.is_terminal() {
            self.step()?;
        }
        Ok(self.result())
    }

    /// The outcome so far. Meaningful as a final result once the run is over.
    pub fn result(&self) -> RunResult {
        RunResult {
            final_lattice: self.lattice.clone(),
            final_index: self.current_index(),
            history: self.history.clone(),
            terminal_state: self.state,
            steps_executed: self.steps_executed,
        }
    }

    /// Runs to completion, recording snapshots on `schedule`.
    ///
    /// The state the run ends in is always recorded, even when it falls
    /// between two scheduled steps, and no step is recorded twice.
    pub fn run_with_snapshots(
        &mut self,
        schedule: &SnapshotSchedule,
        include_cells: bool,
    ) -> Result<RunResult, SegregationError> {
        if schedule.is_record_step(self.steps_executed) {
            self.record_missing_snapshot(include_cells);
        }

        while !self.state.is_terminal() {
            let step_start_time = Instant::now();
            if let StepOutcome::Moved { segregation_index, .. } = self.step()? {
                let step = self.steps_executed;
                if schedule.is_record_step(step) {
                    info!("Step {}, segregation index: {:.4}", step, segregation_index);
                    self.record_snapshot(include_cells);
                } else {
                    trace!(
                        "Step [{}/{}] completed in {:.3} ms",
                        step,
                        self.params.num_steps,
                        step_start_time.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
        }

        self.record_missing_snapshot(include_cells);
        Ok(self.result())
    }

    fn record_missing_snapshot(&mut self, include_cells: bool) {
        let last_recorded = self.recorded_snapshots.last().map(|s| s.step);
        if last_recorded != Some(self.steps_executed) {
            self.record_snapshot(include_cells);
        }
    }

    /// Builds a snapshot of the current lattice without storing it.
    pub fn snapshot(&self, include_cells: bool) -> Snapshot {
        let unhappy = unhappy_positions(&self.lattice, self.params.similarity_threshold);
        Snapshot {
            step: self.steps_executed,
            size: self.lattice.size() as u32,
            segregation_index: self.current_index(),
            unhappy_count: unhappy.len() as u32,
            counts: self.lattice.counts(),
            cells: include_cells.then(|| self.lattice.encode()),
        }
    }

    /// Captures the current lattice and stores it with the recorded snapshots.
    pub fn record_snapshot(&mut self, include_cells: bool) -> &Snapshot {
        let snapshot = self.snapshot(include_cells);
        debug!(
            "Recording snapshot at step {} (index {:.4}, {} unhappy).",
            snapshot.step, snapshot.segregation_index, snapshot.unhappy_count
        );
        self.recorded_snapshots.push(snapshot);
        &self.recorded_snapshots[self.recorded_snapshots.len() - 1]
    }

    /// Provides access to the recorded snapshots.
    pub fn get_recorded_snapshots(&self) -> &[Snapshot] {
        &self.recorded_snapshots
    }

    pub fn current_index(&self) -> f64 {
        segregation_index(&self.lattice)
    }

    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    pub fn history(&self) -> &[f64] {
        &self.history
    }

    pub fn state(&self) -> SimulationState {
        self.state
    }

    pub fn steps_executed(&self) -> u32 {
        self.steps_executed
    }

    pub fn params(&self) -> &SimParams {
        &self.params
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use segregation_common::CellState::{Empty as E, TypeA as A, TypeB as B};

    fn small_config(size: usize, num_steps: u32, threshold: u32, seed: u64) -> SimulationConfig {
        let mut config = SimulationConfig::default();
        config.lattice.size = size;
        config.timing.num_steps = num_steps;
        config.initial_conditions.similarity_threshold = threshold;
        config.initial_conditions.seed = seed;
        config
    }

    #[test]
    fn converges_immediately_when_everyone_is_happy() {
        let lattice = Lattice::from_rows(&[vec![A, A, E], vec![A, A, E], vec![E, B, B]]).unwrap();
        let mut engine = SimulationEngine::from_lattice(small_config(3, 10, 1, 0), lattice, RandomSelector::from_seed(0)).unwrap();

        assert_eq!(engine.step().unwrap(), StepOutcome::Finished(SimulationState::Converged));
        assert_eq!(engine.state(), SimulationState::Converged);
        assert_eq!(engine.steps_executed(), 0);
        assert!(engine.history().is_empty());
    }

    #[test]
    fn fixed_lattice_overrides_lattice_section() {
        let mut config = small_config(0, 10, 1, 0);
        config.lattice.empty_ratio = 2.0;
        let lattice = Lattice::from_rows(&[vec![A, A, E], vec![A, A, E], vec![E, B, B]]).unwrap();
        let engine = SimulationEngine::from_lattice(config, lattice, RandomSelector::from_seed(0)).unwrap();

        assert_eq!(engine.params().size, 3);
        assert_eq!(engine.params().num_empty, 3);
        assert_eq!(engine.params().num_type_a, 4);
        assert_eq!(engine.params().num_type_b, 2);
        assert_eq!(engine.params().num_steps, 10);
    }

    #[test]
    fn fixed_lattice_still_checks_threshold() {
        let lattice = Lattice::from_rows(&[vec![A, B], vec![B, E]]).unwrap();
        let result = SimulationEngine::from_lattice(small_config(2, 10, 9, 0), lattice, RandomSelector::from_seed(0));
        assert!(matches!(result, Err(SegregationError::Configuration(_))));
    }

    #[test]
    fn stalls_without_empty_cells() {
        let lattice = Lattice::from_rows(&[vec![A, B], vec![B, A]]).unwrap();
        let mut engine = SimulationEngine::from_lattice(small_config(2, 10, 2, 0), lattice, RandomSelector::from_seed(0)).unwrap();

        let result = engine.run().unwrap();
        assert_eq!(result.terminal_state, SimulationState::Stalled);
        assert_eq!(result.steps_executed, 0);
        assert!(result.history.is_empty());
        // Each agent sees one like and two unlike neighbors.
        assert!((result.final_index - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn finished_engine_ignores_further_steps() {
        let lattice = Lattice::from_rows(&[vec![A, B], vec![B, A]]).unwrap();
        let mut engine = SimulationEngine::from_lattice(small_config(2, 10, 2, 0), lattice, RandomSelector::from_seed(0)).unwrap();
        engine.run().unwrap();
        let before = engine.lattice().cells().to_vec();

        assert_eq!(engine.step().unwrap(), StepOutcome::Finished(SimulationState::Stalled));
        assert_eq!(engine.lattice().cells(), before.as_slice());
    }

    #[test]
    fn step_limit_stops_after_exact_budget() {
        // Threshold 8 is unreachable on a 10x10 lattice with vacancies, so the
        // run can only end on its budget.
        let mut engine = SimulationEngine::new(small_config(10, 25, 8, 4)).unwrap();
        let result = engine.run().unwrap();

        assert_eq!(result.terminal_state, SimulationState::StepLimitReached);
        assert_eq!(result.steps_executed, 25);
        assert_eq!(result.history.len(), 25);
        assert_eq!(result.final_index, *result.history.last().unwrap());
    }

    #[test]
    fn last_budgeted_step_reports_the_move() {
        let mut engine = SimulationEngine::new(small_config(6, 1, 8, 2)).unwrap();
        assert!(matches!(engine.step().unwrap(), StepOutcome::Moved { .. }));
        assert_eq!(engine.state(), SimulationState::StepLimitReached);
        assert_eq!(engine.step().unwrap(), StepOutcome::Finished(SimulationState::StepLimitReached));
    }

    #[test]
    fn move_follows_the_selector_draws() {
        let lattice = Lattice::from_rows(&[vec![A, A, E], vec![B, B, A], vec![E, B, A]]).unwrap();
        let unhappy = unhappy_positions(&lattice, 4);
        let empties = lattice.empty_positions().as_slice().to_vec();

        // Replay the draws the engine will make from the same seed.
        let mut replay = RandomSelector::from_seed(17);
        let expected_from = *replay.uniform_choice(&unhappy).unwrap();
        let expected_to = *replay.uniform_choice(&empties).unwrap();

        let mut engine = SimulationEngine::from_lattice(small_config(3, 1, 4, 17), lattice.clone(), RandomSelector::from_seed(17)).unwrap();
        match engine.step().unwrap() {
            StepOutcome::Moved { from, to, agent, .. } => {
                assert_eq!(from, expected_from);
                assert_eq!(to, expected_to);
                assert_eq!(agent, lattice.get(expected_from).unwrap());
            }
            other => panic!("expected a move, got {:?}", other),
        }
    }

    fn recorded_steps(engine: &SimulationEngine) -> Vec<u32> {
        engine.get_recorded_snapshots().iter().map(|s| s.step).collect()
    }

    #[test]
    fn schedule_marks_first_interval_and_last_steps() {
        let schedule = SnapshotSchedule::new(100, 5);
        assert_eq!(schedule.interval(), 20);
        let steps: Vec<u32> = (0..=100).filter(|&s| schedule.is_record_step(s)).collect();
        assert_eq!(steps, vec![0, 1, 20, 40, 60, 80, 100]);

        let uneven = SnapshotSchedule::new(7, 2);
        assert_eq!(uneven.interval(), 3);
        assert!(uneven.is_record_step(6));
        assert!(uneven.is_record_step(7));
        assert!(!uneven.is_record_step(5));
    }

    #[test]
    fn schedule_interval_never_drops_below_one() {
        let schedule = SnapshotSchedule::new(3, 5);
        assert_eq!(schedule.interval(), 1);
        assert_eq!(SnapshotSchedule::new(10, 0).interval(), 10);

        let mut engine = SimulationEngine::new(small_config(6, 3, 8, 2)).unwrap();
        let result = engine.run_with_snapshots(&schedule, false).unwrap();
        assert_eq!(result.terminal_state, SimulationState::StepLimitReached);
        assert_eq!(recorded_steps(&engine), vec![0, 1, 2, 3]);
    }

    #[test]
    fn early_convergence_is_still_recorded() {
        // One interval spanning the whole budget: only steps 0, 1 and 1000
        // are scheduled, so any run converging in between is off-schedule.
        let schedule = SnapshotSchedule::new(1000, 1);
        let mut off_schedule = 0;
        for seed in 0..200 {
            let mut config = small_config(6, 1000, 1, seed);
            config.lattice.empty_ratio = 0.3;
            config.lattice.type_a_ratio = 0.35;
            let mut engine = SimulationEngine::new(config).unwrap();
            let result = engine.run_with_snapshots(&schedule, true).unwrap();
            if result.terminal_state != SimulationState::Converged || result.steps_executed < 2 {
                continue;
            }
            off_schedule += 1;

            let steps = recorded_steps(&engine);
            assert_eq!(steps, vec![0, 1, result.steps_executed]);
            let last = engine.get_recorded_snapshots().last().unwrap();
            assert_eq!(last.unhappy_count, 0);
            assert_eq!(last.cells, Some(result.final_lattice.encode()));
        }
        assert!(off_schedule > 0, "no seed converged between scheduled steps");
    }

    #[test]
    fn immediate_stall_records_initial_state_once() {
        let lattice = Lattice::from_rows(&[vec![A, B], vec![B, A]]).unwrap();
        let mut engine = SimulationEngine::from_lattice(small_config(2, 10, 2, 0), lattice, RandomSelector::from_seed(0)).unwrap();
        let result = engine.run_with_snapshots(&SnapshotSchedule::new(10, 5), true).unwrap();

        assert_eq!(result.terminal_state, SimulationState::Stalled);
        assert_eq!(recorded_steps(&engine), vec![0]);
    }

    #[test]
    fn snapshots_capture_counts_and_cells() {
        let mut engine = SimulationEngine::new(small_config(8, 50, 3, 9)).unwrap();
        engine.record_snapshot(true);
        engine.step().unwrap();
        engine.record_snapshot(false);

        let snapshots = engine.get_recorded_snapshots();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].step, 0);
        assert_eq!(snapshots[0].size, 8);
        assert_eq!(snapshots[0].cells.as_ref().map(Vec::len), Some(64));
        assert_eq!(snapshots[1].step, engine.steps_executed());
        assert!(snapshots[1].cells.is_none());
        assert_eq!(snapshots[0].counts, snapshots[1].counts);
        assert_eq!(snapshots[1].segregation_index, engine.current_index());
    }
}
