//! One coupling iteration: subordinate phases around a primary solve.
//!
//! The executor walks an explicit state machine
//! `Idle -> Begin -> Solving -> End -> Done`, with `Failed` absorbing from any
//! phase. Within one iteration the begin phases strictly precede the primary
//! solve, which strictly precedes the timestep-end phase.

use tracing::{debug, info, trace, warn};

use crate::domain::errors::{CouplingError, CouplingResult};
use crate::domain::models::{
    ConvergenceStatus, CouplingConfig, ExecPhase, QuantityKind, QuantityRole, QuantitySet,
    ResidualNormHistory,
};
use crate::domain::ports::{
    ConvergenceReporter, FailStepSignal, NormSite, PostprocessorRegistry, PrimarySolver,
    SubordinateSet,
};

use super::acceleration::AccelerationStrategy;

// ---------------------------------------------------------------------------
// Iteration outcome
// ---------------------------------------------------------------------------

/// Hard failure that ends the outer step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationFailure {
    /// The primary solve did not converge.
    PrimaryDiverged,
    /// A subordinate unit failed irrecoverably in the given phase.
    SubordinateFailed(ExecPhase),
    /// An external collaborator raised the fail-step signal.
    StepAborted,
}

impl IterationFailure {
    /// Terminal status the coupling loop reports for this failure.
    pub const fn status(self) -> ConvergenceStatus {
        match self {
            Self::PrimaryDiverged | Self::StepAborted => ConvergenceStatus::DivergedPrimary,
            Self::SubordinateFailed(_) => ConvergenceStatus::DivergedSubordinateFailure,
        }
    }
}

/// What one call to [`StepExecutor::run_one_iteration`] produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationOutcome {
    pub solve_succeeded: bool,
    /// The topology changed; rerun the same iteration index.
    pub topology_repeat_requested: bool,
    pub failure: Option<IterationFailure>,
}

impl IterationOutcome {
    const fn failed(failure: IterationFailure, solve_succeeded: bool) -> Self {
        Self {
            solve_succeeded,
            topology_repeat_requested: false,
            failure: Some(failure),
        }
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    Idle,
    Begin,
    Solving,
    End,
    Done,
    Failed(IterationFailure),
}

impl ExecutorState {
    /// Whether `next` is a legal successor of `self`.
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Failed(_), _) => false,
            (_, Self::Failed(_)) => true,
            (Self::Idle | Self::Done, Self::Begin)
            | (Self::Begin, Self::Solving)
            | (Self::Solving, Self::End | Self::Done)
            | (Self::End, Self::Done) => true,
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Configuration slice the executor needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorOptions {
    pub has_coupling_iterations: bool,
    pub residual_check_enabled: bool,
    pub force_norms: bool,
    pub max_topology_updates: u32,
    pub update_topology_at_timestep_begin: bool,
    pub auto_advance: Option<bool>,
}

impl From<&CouplingConfig> for ExecutorOptions {
    fn from(config: &CouplingConfig) -> Self {
        Self {
            has_coupling_iterations: config.has_coupling_iterations(),
            residual_check_enabled: config.residual_check_enabled,
            force_norms: config.force_norms,
            max_topology_updates: config.max_topology_updates,
            update_topology_at_timestep_begin: config.update_topology_at_timestep_begin,
            auto_advance: config.auto_advance_subordinates,
        }
    }
}

// ---------------------------------------------------------------------------
// StepExecutor
// ---------------------------------------------------------------------------

/// Drives one coupling iteration against the external collaborators.
pub struct StepExecutor<P, S, R> {
    primary: P,
    subordinates: S,
    registry: R,
    quantities: QuantitySet,
    strategy: AccelerationStrategy,
    secondary_strategy: AccelerationStrategy,
    options: ExecutorOptions,
    fail_signal: FailStepSignal,
    state: ExecutorState,
    auto_advance: bool,
    topology_updates: u32,
    secondary_reentry: bool,
    enclosing_iteration: usize,
}

impl<P, S, R> StepExecutor<P, S, R>
where
    P: PrimarySolver,
    S: SubordinateSet,
    R: PostprocessorRegistry,
{
    pub fn new(config: &CouplingConfig, primary: P, subordinates: S, registry: R) -> Self {
        let options = ExecutorOptions::from(config);
        let auto_advance = config.resolved_auto_advance(primary.is_transient());
        Self {
            primary,
            subordinates,
            registry,
            quantities: QuantitySet::from_names(
                &config.transformed_variables,
                &config.transformed_postprocessors,
                &config.secondary_transformed_variables,
                &config.secondary_transformed_postprocessors,
            ),
            strategy: AccelerationStrategy::primary(config),
            secondary_strategy: AccelerationStrategy::secondary(config),
            options,
            fail_signal: FailStepSignal::new(),
            state: ExecutorState::Idle,
            auto_advance,
            topology_updates: 0,
            secondary_reentry: false,
            enclosing_iteration: 0,
        }
    }

    pub const fn state(&self) -> ExecutorState {
        self.state
    }

    pub const fn primary(&self) -> &P {
        &self.primary
    }

    pub fn primary_mut(&mut self) -> &mut P {
        &mut self.primary
    }

    pub const fn subordinates(&self) -> &S {
        &self.subordinates
    }

    pub fn subordinates_mut(&mut self) -> &mut S {
        &mut self.subordinates
    }

    pub const fn registry(&self) -> &R {
        &self.registry
    }

    /// Handle an external collaborator can use to abort the current step.
    pub fn fail_signal(&self) -> FailStepSignal {
        self.fail_signal.clone()
    }

    pub const fn auto_advance(&self) -> bool {
        self.auto_advance
    }

    pub fn current_time(&self) -> f64 {
        self.primary.current_time()
    }

    pub fn postprocessor_value(&self, name: &str) -> Option<f64> {
        self.registry.value_of(name)
    }

    pub fn initial_residual_norm(&mut self) -> f64 {
        self.primary.residual_norm_l2()
    }

    pub fn into_parts(self) -> (P, S, R) {
        (self.primary, self.subordinates, self.registry)
    }

    /// Prepare for a new outer step.
    ///
    /// Resolves every transformed name, drops primary histories and resets the
    /// topology counter. Fails with [`CouplingError::UnknownQuantity`] when a
    /// name is not provided by the primary solver or the registry.
    pub fn begin_outer_step(&mut self) -> CouplingResult<()> {
        let Self {
            primary,
            registry,
            quantities,
            ..
        } = self;

        for quantity in quantities.iter_mut() {
            match quantity.kind {
                QuantityKind::Variable => {
                    quantity.slots = primary.select_dofs(&quantity.name).ok_or_else(|| {
                        CouplingError::UnknownQuantity {
                            kind: QuantityKind::Variable,
                            name: quantity.name.clone(),
                        }
                    })?;
                }
                QuantityKind::Postprocessor => {
                    if registry.value_of(&quantity.name).is_none() {
                        return Err(CouplingError::UnknownQuantity {
                            kind: QuantityKind::Postprocessor,
                            name: quantity.name.clone(),
                        });
                    }
                }
            }
        }

        self.quantities.reset_role(QuantityRole::Primary);
        self.topology_updates = 0;
        self.auto_advance = self
            .options
            .auto_advance
            .unwrap_or(!(self.options.has_coupling_iterations && self.primary.is_transient()));
        self.state = ExecutorState::Idle;
        // A stale signal from a previous step must not fail this one.
        self.fail_signal.take();
        debug!(
            quantities = self.quantities.len(),
            auto_advance = self.auto_advance,
            "outer step prepared"
        );
        Ok(())
    }

    /// Record whether this step re-enters the same time as the last converged one.
    ///
    /// On re-entry secondary variables are saved before the step runs. A new
    /// time drops all secondary history.
    pub fn enter_secondary(&mut self, reentry: bool, enclosing_iteration: usize) {
        self.secondary_reentry = reentry;
        self.enclosing_iteration = enclosing_iteration;

        if !reentry {
            self.quantities.reset_role(QuantityRole::Secondary);
            return;
        }
        if !self.secondary_strategy.transforms() {
            return;
        }
        let Self {
            primary, quantities, ..
        } = self;
        for quantity in quantities.select_mut(QuantityKind::Variable, QuantityRole::Secondary) {
            quantity.save_previous(primary.dof_values(&quantity.slots));
        }
    }

    /// Bookkeeping for the enclosing loop after this step's verdict.
    ///
    /// Secondary postprocessors are saved on re-entry. Secondary variables are
    /// transformed only when the step converged.
    pub fn finish_secondary(&mut self, converged: bool) {
        if !self.secondary_reentry || !self.secondary_strategy.transforms() {
            return;
        }
        let iteration = self.enclosing_iteration;
        let strategy = self.secondary_strategy;
        let Self {
            primary,
            registry,
            quantities,
            ..
        } = self;

        for quantity in quantities.select_mut(QuantityKind::Postprocessor, QuantityRole::Secondary) {
            if let Some(value) = registry.value_of(&quantity.name) {
                quantity.save_previous(vec![value]);
            }
        }

        if !converged {
            return;
        }
        for quantity in quantities.select_mut(QuantityKind::Variable, QuantityRole::Secondary) {
            quantity.observe(primary.dof_values(&quantity.slots));
            if strategy.apply(quantity, iteration) {
                if let Some(next) = quantity.take_staged() {
                    primary.set_dof_values(&quantity.slots, &next);
                    debug!(variable = %quantity.name, iteration, "transformed secondary variable");
                }
            }
        }
    }

    /// Run one coupling iteration.
    ///
    /// Norms measured along the way are written into `norms` at `iteration`.
    pub fn run_one_iteration(
        &mut self,
        iteration: usize,
        norms: &mut ResidualNormHistory,
        reporter: &mut dyn ConvergenceReporter,
    ) -> IterationOutcome {
        self.state = ExecutorState::Idle;
        self.transition(ExecutorState::Begin);

        if let Some(failure) = self
            .execute_phase(ExecPhase::Begin)
            .or_else(|| self.execute_phase(ExecPhase::TimestepBegin))
        {
            return self.fail(failure, false);
        }

        self.transform_postprocessors(iteration);

        if self.options.update_topology_at_timestep_begin && self.primary.supports_topology_changes() {
            let changed = self.primary.did_topology_change();
            debug!(changed, "updated topology at timestep begin");
        }

        if self.norms_wanted(ExecPhase::TimestepBegin) {
            let norm = self.primary.residual_norm_l2();
            let previous = iteration.checked_sub(1).and_then(|i| norms.begin_at(i));
            norms.record_begin(iteration, norm);
            reporter.norm_measured(iteration, NormSite::Begin, previous, norm);
        }

        self.save_previous_values();

        self.transition(ExecutorState::Solving);
        if !self.primary.solve_once() {
            warn!(iteration, "primary solve did not converge");
            return self.fail(IterationFailure::PrimaryDiverged, false);
        }
        trace!(iteration, "primary solve converged");
        if let Some(failure) = self.check_fail_signal("primary solve", iteration) {
            return self.fail(failure, true);
        }

        self.transform_variables(iteration);

        let topology_repeat_requested = self.primary.supports_topology_changes()
            && self.topology_updates < self.options.max_topology_updates
            && self.primary.did_topology_change();

        if topology_repeat_requested {
            self.topology_updates += 1;
            info!(
                iteration,
                repeat = self.topology_updates,
                "topology changed, repeating iteration"
            );
            reporter.topology_repeat(iteration, self.topology_updates);
        } else {
            if self.primary.supports_topology_changes() {
                self.topology_updates = 0;
                debug!(iteration, "topology unchanged, continuing");
            }
            self.transition(ExecutorState::End);
            if !self.subordinates.run_phase(ExecPhase::TimestepEnd, self.auto_advance) {
                warn!(iteration, phase = %ExecPhase::TimestepEnd, "subordinate execution failed");
                return self.fail(IterationFailure::SubordinateFailed(ExecPhase::TimestepEnd), true);
            }
        }

        if let Some(failure) = self.check_fail_signal("timestep end", iteration) {
            return self.fail(failure, true);
        }

        if !topology_repeat_requested && self.norms_wanted(ExecPhase::TimestepEnd) {
            let norm = self.primary.residual_norm_l2();
            let previous = iteration.checked_sub(1).and_then(|i| norms.end_at(i));
            norms.record_end(iteration, norm);
            reporter.norm_measured(iteration, NormSite::End, previous, norm);
        }

        self.transition(ExecutorState::Done);
        IterationOutcome {
            solve_succeeded: true,
            topology_repeat_requested,
            failure: None,
        }
    }

    /// Run the end phase once the loop converged.
    ///
    /// Fails on a subordinate failure or a fail-step signal raised during the phase.
    pub fn run_end_phase(&mut self) -> Option<IterationFailure> {
        let failure = self.execute_phase(ExecPhase::End);
        match failure {
            Some(failure) => self.state = ExecutorState::Failed(failure),
            None => debug!(phase = %ExecPhase::End, "end phase complete"),
        }
        failure
    }

    // -- internals ----------------------------------------------------------

    fn transition(&mut self, next: ExecutorState) {
        if self.state.can_transition_to(next) {
            trace!(from = ?self.state, to = ?next, "executor transition");
            self.state = next;
        } else {
            debug!(from = ?self.state, to = ?next, "ignored illegal executor transition");
        }
    }

    fn fail(&mut self, failure: IterationFailure, solve_succeeded: bool) -> IterationOutcome {
        self.transition(ExecutorState::Failed(failure));
        IterationOutcome::failed(failure, solve_succeeded)
    }

    /// Run one subordinate phase and consume the fail signal after it.
    fn execute_phase(&mut self, phase: ExecPhase) -> Option<IterationFailure> {
        if !self.subordinates.run_phase(phase, self.auto_advance) {
            warn!(phase = %phase, "subordinate execution failed");
            return Some(IterationFailure::SubordinateFailed(phase));
        }
        if self.fail_signal.take() {
            warn!(phase = %phase, "fail-step signal raised");
            return Some(IterationFailure::StepAborted);
        }
        None
    }

    /// Consume the fail signal at a point between phases.
    ///
    /// `after` names the step that ran before the check.
    fn check_fail_signal(&self, after: &'static str, iteration: usize) -> Option<IterationFailure> {
        if self.fail_signal.take() {
            warn!(iteration, after, "fail-step signal raised");
            return Some(IterationFailure::StepAborted);
        }
        None
    }

    fn norms_wanted(&self, phase: ExecPhase) -> bool {
        self.options.has_coupling_iterations
            && self.options.residual_check_enabled
            && (self.options.force_norms || self.subordinates.has_units(phase))
    }

    /// Save pre-solve values of primary quantities as their newest prior iterate.
    fn save_previous_values(&mut self) {
        if !self.strategy.transforms() {
            return;
        }
        let Self {
            primary,
            registry,
            quantities,
            ..
        } = self;

        for quantity in quantities.iter_mut().filter(|q| q.role == QuantityRole::Primary) {
            match quantity.kind {
                QuantityKind::Variable => quantity.save_previous(primary.dof_values(&quantity.slots)),
                QuantityKind::Postprocessor => {
                    if let Some(value) = registry.value_of(&quantity.name) {
                        quantity.save_previous(vec![value]);
                    }
                }
            }
        }
    }

    /// Transform postprocessors after the timestep-begin values arrived.
    fn transform_postprocessors(&mut self, iteration: usize) {
        let targets = [
            (QuantityRole::Primary, self.strategy, iteration, true),
            (
                QuantityRole::Secondary,
                self.secondary_strategy,
                self.enclosing_iteration,
                self.secondary_reentry,
            ),
        ];
        let Self {
            registry,
            quantities,
            ..
        } = self;

        for (role, strategy, index, enabled) in targets {
            if !enabled || !strategy.transforms() {
                continue;
            }
            for quantity in quantities.select_mut(QuantityKind::Postprocessor, role) {
                let Some(value) = registry.value_of(&quantity.name) else {
                    continue;
                };
                quantity.observe(vec![value]);
                if strategy.apply(quantity, index) {
                    if let Some(next) = quantity.take_staged().and_then(|v| v.first().copied()) {
                        registry.set_value_of(&quantity.name, next);
                        trace!(postprocessor = %quantity.name, value, next, "transformed postprocessor");
                    }
                }
            }
        }
    }

    /// Transform primary variables with the values the solve just produced.
    fn transform_variables(&mut self, iteration: usize) {
        let strategy = self.strategy;
        if !strategy.transforms() {
            return;
        }
        let Self {
            primary, quantities, ..
        } = self;

        for quantity in quantities.select_mut(QuantityKind::Variable, QuantityRole::Primary) {
            quantity.observe(primary.dof_values(&quantity.slots));
            if strategy.apply(quantity, iteration) {
                if let Some(next) = quantity.take_staged() {
                    primary.set_dof_values(&quantity.slots, &next);
                    trace!(variable = %quantity.name, dofs = next.len(), "transformed variable");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_machine_transitions() {
        use ExecutorState::*;
        assert!(Idle.can_transition_to(Begin));
        assert!(Begin.can_transition_to(Solving));
        assert!(Solving.can_transition_to(End));
        assert!(Solving.can_transition_to(Done));
        assert!(End.can_transition_to(Done));
        assert!(Done.can_transition_to(Begin));

        assert!(!Idle.can_transition_to(Solving));
        assert!(!Begin.can_transition_to(End));
        assert!(!End.can_transition_to(Solving));
    }

    #[test]
    fn test_failed_is_absorbing() {
        use ExecutorState::*;
        let failed = Failed(IterationFailure::PrimaryDiverged);
        for from in [Idle, Begin, Solving, End, Done] {
            assert!(from.can_transition_to(failed));
        }
        assert!(!failed.can_transition_to(Begin));
        assert!(!failed.can_transition_to(Done));
    }

    #[test]
    fn test_failure_status_mapping() {
        assert_eq!(
            IterationFailure::PrimaryDiverged.status(),
            ConvergenceStatus::DivergedPrimary
        );
        assert_eq!(
            IterationFailure::StepAborted.status(),
            ConvergenceStatus::DivergedPrimary
        );
        assert_eq!(
            IterationFailure::SubordinateFailed(ExecPhase::Begin).status(),
            ConvergenceStatus::DivergedSubordinateFailure
        );
    }

    #[test]
    fn test_options_from_config() {
        let config = CouplingConfig {
            max_iterations: 3,
            force_norms: true,
            max_topology_updates: 2,
            ..Default::default()
        };
        let options = ExecutorOptions::from(&config);
        assert!(options.has_coupling_iterations);
        assert!(options.force_norms);
        assert_eq!(options.max_topology_updates, 2);
        assert!(options.auto_advance.is_none());
    }
}
