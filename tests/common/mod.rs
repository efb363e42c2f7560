//! Common test utilities for integration tests
//!
//! Scripted collaborators for the coupling loop. Every collaborator appends to
//! a shared [`EventLog`] so tests can assert on call order.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use coupler::domain::models::{ExecPhase, StateBlob, StepReport};
use coupler::domain::ports::{
    ConvergenceReporter, DofSelector, FailStepSignal, NormSite, PostprocessorRegistry,
    PrimarySolver, SubordinateSet,
};
use coupler::CouplingConfig;

/// One observable call into a collaborator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    Run(ExecPhase),
    Backup(ExecPhase),
    Restore(ExecPhase),
    Solve,
    Residual,
    TopologyCheck,
}

pub type EventLog = Rc<RefCell<Vec<Event>>>;
pub type Board = Rc<RefCell<HashMap<String, f64>>>;

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Config with coupling enabled and every check knob at a test-friendly value.
pub fn coupled_config(max_iterations: usize) -> CouplingConfig {
    CouplingConfig {
        max_iterations,
        abs_tol: 1e-8,
        rel_tol: 1e-8,
        ..CouplingConfig::default()
    }
}

/// Fresh primary, subordinates and registry sharing one event log.
pub fn harness() -> (ScriptedPrimary, RecordingSubordinates, MapRegistry, EventLog) {
    let log: EventLog = Rc::new(RefCell::new(Vec::new()));
    let board: Board = Rc::new(RefCell::new(HashMap::new()));
    (
        ScriptedPrimary::new(Rc::clone(&log)),
        RecordingSubordinates::new(Rc::clone(&log), Rc::clone(&board)),
        MapRegistry { board },
        log,
    )
}

pub fn count(log: &EventLog, event: Event) -> usize {
    log.borrow().iter().filter(|e| **e == event).count()
}

pub fn position(log: &EventLog, event: Event) -> Option<usize> {
    log.borrow().iter().position(|e| *e == event)
}

// ---------------------------------------------------------------------------
// Primary
// ---------------------------------------------------------------------------

/// Primary solver replaying scripted results.
///
/// Each script pops one entry per call; an empty script falls back to the
/// default (residual: last value or 1.0, solve: success, topology: unchanged).
pub struct ScriptedPrimary {
    log: EventLog,
    pub residuals: VecDeque<f64>,
    last_residual: f64,
    pub solve_results: VecDeque<bool>,
    pub solutions: VecDeque<Vec<f64>>,
    pub topology_changes: VecDeque<bool>,
    pub supports_topology: bool,
    pub transient: bool,
    pub time: f64,
    pub values: Vec<f64>,
    pub variables: HashMap<String, Vec<usize>>,
    pub solves: usize,
    /// Raise the signal during the given solve, counted from 0.
    pub raise_on_solve: Option<(usize, FailStepSignal)>,
}

impl ScriptedPrimary {
    fn new(log: EventLog) -> Self {
        Self {
            log,
            residuals: VecDeque::new(),
            last_residual: 1.0,
            solve_results: VecDeque::new(),
            solutions: VecDeque::new(),
            topology_changes: VecDeque::new(),
            supports_topology: false,
            transient: true,
            time: 1.0,
            values: vec![0.0],
            variables: HashMap::from([("u".to_string(), vec![0])]),
            solves: 0,
            raise_on_solve: None,
        }
    }

    pub fn with_residuals(mut self, residuals: &[f64]) -> Self {
        self.residuals = residuals.iter().copied().collect();
        self
    }

    pub fn with_solutions(mut self, solutions: &[f64]) -> Self {
        self.solutions = solutions.iter().map(|v| vec![*v]).collect();
        self
    }
}

impl DofSelector for ScriptedPrimary {
    fn select_dofs(&self, variable: &str) -> Option<Vec<usize>> {
        self.variables.get(variable).cloned()
    }

    fn dof_values(&self, slots: &[usize]) -> Vec<f64> {
        slots.iter().map(|&s| self.values[s]).collect()
    }

    fn set_dof_values(&mut self, slots: &[usize], values: &[f64]) {
        for (&slot, &value) in slots.iter().zip(values) {
            self.values[slot] = value;
        }
    }
}

impl PrimarySolver for ScriptedPrimary {
    fn solve_once(&mut self) -> bool {
        self.log.borrow_mut().push(Event::Solve);
        if let Some((at, signal)) = &self.raise_on_solve {
            if *at == self.solves {
                signal.raise();
            }
        }
        self.solves += 1;
        if let Some(solution) = self.solutions.pop_front() {
            self.values = solution;
        }
        self.solve_results.pop_front().unwrap_or(true)
    }

    fn residual_norm_l2(&mut self) -> f64 {
        self.log.borrow_mut().push(Event::Residual);
        if let Some(next) = self.residuals.pop_front() {
            self.last_residual = next;
        }
        self.last_residual
    }

    fn did_topology_change(&mut self) -> bool {
        self.log.borrow_mut().push(Event::TopologyCheck);
        self.topology_changes.pop_front().unwrap_or(false)
    }

    fn current_time(&self) -> f64 {
        self.time
    }

    fn is_transient(&self) -> bool {
        self.transient
    }

    fn supports_topology_changes(&self) -> bool {
        self.supports_topology
    }
}

// ---------------------------------------------------------------------------
// Subordinates
// ---------------------------------------------------------------------------

/// Subordinate set with one counter of executions per phase as its state.
pub struct RecordingSubordinates {
    log: EventLog,
    board: Board,
    /// Phases that have units.
    pub phases: Vec<ExecPhase>,
    /// Executions per phase since the last restore.
    pub counters: [u64; 4],
    /// Calls per phase over the whole test, never restored.
    pub calls: [usize; 4],
    /// `(phase, call)` pairs that report failure.
    pub fail_at: Vec<(ExecPhase, usize)>,
    /// Raise the signal on the given `(phase, call)`.
    pub raise_at: Option<(ExecPhase, usize, FailStepSignal)>,
    /// Postprocessor values published on each timestep-end execution.
    pub publish: HashMap<String, VecDeque<f64>>,
    pub auto_advance_seen: Vec<bool>,
}

impl RecordingSubordinates {
    fn new(log: EventLog, board: Board) -> Self {
        Self {
            log,
            board,
            phases: vec![ExecPhase::TimestepEnd],
            counters: [0; 4],
            calls: [0; 4],
            fail_at: Vec::new(),
            raise_at: None,
            publish: HashMap::new(),
            auto_advance_seen: Vec::new(),
        }
    }

    pub fn with_phases(mut self, phases: &[ExecPhase]) -> Self {
        self.phases = phases.to_vec();
        self
    }

    pub fn publishing(mut self, name: &str, values: &[f64]) -> Self {
        self.publish
            .insert(name.to_string(), values.iter().copied().collect());
        self
    }

    pub fn calls(&self, phase: ExecPhase) -> usize {
        self.calls[phase.index()]
    }
}

impl SubordinateSet for RecordingSubordinates {
    fn run_phase(&mut self, phase: ExecPhase, auto_advance: bool) -> bool {
        self.log.borrow_mut().push(Event::Run(phase));
        self.auto_advance_seen.push(auto_advance);
        let call = self.calls[phase.index()];
        self.calls[phase.index()] += 1;
        self.counters[phase.index()] += 1;

        if let Some((at_phase, at_call, signal)) = &self.raise_at {
            if *at_phase == phase && *at_call == call {
                signal.raise();
            }
        }
        if phase == ExecPhase::TimestepEnd {
            let mut board = self.board.borrow_mut();
            for (name, values) in &mut self.publish {
                if let Some(value) = values.pop_front() {
                    board.insert(name.clone(), value);
                }
            }
        }
        !self.fail_at.contains(&(phase, call))
    }

    fn backup(&mut self, phase: ExecPhase) -> StateBlob {
        self.log.borrow_mut().push(Event::Backup(phase));
        StateBlob::new(self.counters[phase.index()].to_le_bytes().to_vec())
    }

    fn restore(&mut self, phase: ExecPhase, blob: &StateBlob) {
        self.log.borrow_mut().push(Event::Restore(phase));
        let bytes: [u8; 8] = blob.as_bytes().try_into().expect("blob holds one counter");
        self.counters[phase.index()] = u64::from_le_bytes(bytes);
    }

    fn has_units(&self, phase: ExecPhase) -> bool {
        self.phases.contains(&phase)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Postprocessor registry backed by the board subordinates publish to.
pub struct MapRegistry {
    board: Board,
}

impl MapRegistry {
    pub fn with_value(self, name: &str, value: f64) -> Self {
        self.board.borrow_mut().insert(name.to_string(), value);
        self
    }
}

impl PostprocessorRegistry for MapRegistry {
    fn value_of(&self, name: &str) -> Option<f64> {
        self.board.borrow().get(name).copied()
    }

    fn set_value_of(&mut self, name: &str, value: f64) {
        self.board.borrow_mut().insert(name.to_string(), value);
    }
}

// ---------------------------------------------------------------------------
// Reporter
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct Recorded {
    pub initial: Option<f64>,
    pub iterations: Vec<usize>,
    pub norms: Vec<(usize, NormSite, Option<f64>, f64)>,
    pub custom: Vec<(usize, String, f64)>,
    pub topology_repeats: Vec<(usize, u32)>,
    pub finished: Vec<StepReport>,
}

/// Reporter that keeps everything it is told behind a shared handle.
#[derive(Clone, Default)]
pub struct RecordingReporter(pub Rc<RefCell<Recorded>>);

impl ConvergenceReporter for RecordingReporter {
    fn initial_norm(&mut self, norm: f64) {
        self.0.borrow_mut().initial = Some(norm);
    }

    fn iteration_started(&mut self, iteration: usize) {
        self.0.borrow_mut().iterations.push(iteration);
    }

    fn norm_measured(&mut self, iteration: usize, site: NormSite, previous: Option<f64>, norm: f64) {
        self.0.borrow_mut().norms.push((iteration, site, previous, norm));
    }

    fn custom_value(&mut self, iteration: usize, name: &str, value: f64) {
        self.0.borrow_mut().custom.push((iteration, name.to_string(), value));
    }

    fn topology_repeat(&mut self, iteration: usize, count: u32) {
        self.0.borrow_mut().topology_repeats.push((iteration, count));
    }

    fn step_finished(&mut self, report: &StepReport) {
        self.0.borrow_mut().finished.push(report.clone());
    }
}
