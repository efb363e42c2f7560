//! CouplingLoop - fixed-point coupling of a primary solve with subordinate units
//!
//! Owns the coupling-iteration counter for one outer step:
//! - Backs up subordinate state at all four phases before anything runs
//! - Restores it before every retry
//! - Feeds the residual and custom histories to the convergence evaluator
//! - Reports exactly one terminal status per outer step

use chrono::Utc;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use crate::domain::errors::{CouplingError, CouplingResult};
use crate::domain::models::{
    ConvergenceStatus, CouplingConfig, CustomQuantityHistory, QuantityKind, ResidualNormHistory,
    StepReport,
};
use crate::domain::ports::{
    ConvergenceReporter, FailStepSignal, NullReporter, PostprocessorRegistry, PrimarySolver,
    SubordinateSet,
};
use crate::services::{
    ConvergenceCriteria, ConvergenceEvaluator, SnapshotManager, StepExecutor, Verdict,
};

/// Orchestrates the coupling iterations of successive outer steps.
pub struct CouplingLoop<P, S, R> {
    config: CouplingConfig,
    evaluator: ConvergenceEvaluator,
    executor: StepExecutor<P, S, R>,
    snapshots: SnapshotManager,
    norms: ResidualNormHistory,
    custom: Option<CustomQuantityHistory>,
    reporter: Box<dyn ConvergenceReporter>,
    /// Primary time of the last converged step, used to detect re-entry.
    last_converged_time: Option<f64>,
    /// Iteration counter of an enclosing loop re-entering at the same time.
    enclosing_iteration: usize,
}

impl<P, S, R> CouplingLoop<P, S, R>
where
    P: PrimarySolver,
    S: SubordinateSet,
    R: PostprocessorRegistry,
{
    /// Build a loop around the given collaborators.
    ///
    /// Fails eagerly on an invalid configuration.
    pub fn new(config: CouplingConfig, primary: P, subordinates: S, registry: R) -> CouplingResult<Self> {
        config.validate()?;
        let executor = StepExecutor::new(&config, primary, subordinates, registry);
        let evaluator = ConvergenceEvaluator::new(ConvergenceCriteria::from(&config));
        Ok(Self::from_parts(config, evaluator, executor))
    }

    /// Assemble a loop from pre-built components. The configuration is not re-validated.
    pub fn from_parts(
        config: CouplingConfig,
        evaluator: ConvergenceEvaluator,
        executor: StepExecutor<P, S, R>,
    ) -> Self {
        let custom = config.custom_postprocessor.as_ref().map(|name| {
            CustomQuantityHistory::new(
                name.clone(),
                config.use_direct_postprocessor_value,
                config.resolved_custom_scaling(),
            )
        });
        Self {
            norms: ResidualNormHistory::new(config.max_iterations),
            config,
            evaluator,
            executor,
            snapshots: SnapshotManager::new(),
            custom,
            reporter: Box::new(NullReporter),
            last_converged_time: None,
            enclosing_iteration: 0,
        }
    }

    #[must_use]
    pub fn with_reporter(mut self, reporter: Box<dyn ConvergenceReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub const fn config(&self) -> &CouplingConfig {
        &self.config
    }

    pub const fn executor(&self) -> &StepExecutor<P, S, R> {
        &self.executor
    }

    pub fn executor_mut(&mut self) -> &mut StepExecutor<P, S, R> {
        &mut self.executor
    }

    pub const fn snapshots(&self) -> &SnapshotManager {
        &self.snapshots
    }

    pub const fn norms(&self) -> &ResidualNormHistory {
        &self.norms
    }

    pub fn fail_signal(&self) -> FailStepSignal {
        self.executor.fail_signal()
    }

    pub fn into_parts(self) -> (P, S, R) {
        self.executor.into_parts()
    }

    /// Run the coupling iterations of one outer step.
    ///
    /// Iteration-local failures come back as a non-converged [`StepReport`];
    /// only an unresolvable quantity name is an `Err`.
    pub fn run(&mut self) -> CouplingResult<StepReport> {
        let step_id = Uuid::new_v4();
        let started_at = Utc::now();
        let time = self.executor.current_time();
        let span = info_span!("coupling_step", %step_id, time);
        let _enter = span.enter();

        let max_iterations = self.config.max_iterations;
        let has_coupling = self.config.has_coupling_iterations();

        let reentry = self.last_converged_time == Some(time);
        self.enclosing_iteration = if reentry { self.enclosing_iteration + 1 } else { 0 };

        self.executor.begin_outer_step()?;
        if let Some(custom) = &self.custom {
            if self.executor.postprocessor_value(&custom.name).is_none() {
                return Err(CouplingError::UnknownQuantity {
                    kind: QuantityKind::Postprocessor,
                    name: custom.name.clone(),
                });
            }
        }
        self.executor.enter_secondary(reentry, self.enclosing_iteration);

        self.norms.reset(max_iterations);
        if let Some(custom) = &mut self.custom {
            custom.reset();
        }

        // All four phases, even for a single-pass step.
        self.snapshots.backup_all(self.executor.subordinates_mut());
        self.reporter.step_started(step_id, time);

        if has_coupling && self.config.residual_check_enabled {
            let norm = self.executor.initial_residual_norm();
            self.norms.initial = Some(norm);
            self.reporter.initial_norm(norm);
            info!(initial_norm = norm, "initial coupling residual norm");
        }

        let mut status = ConvergenceStatus::Unsolved;
        let mut iteration = 0;
        let mut iterations = 0;
        let mut invocations = 0;
        let mut topology_repeats = 0_u32;
        let mut repeat_pending = false;

        while iteration < max_iterations {
            if iteration > 0 || repeat_pending {
                if let Err(err) = self.snapshots.restore_all(self.executor.subordinates_mut()) {
                    warn!(error = %err, iteration, "could not restore subordinates");
                    status = ConvergenceStatus::DivergedSubordinateFailure;
                    iterations = iteration;
                    break;
                }
            }

            if let Some(custom) = &mut self.custom {
                custom.capture_reference(iteration);
            }

            if has_coupling {
                info!(iteration, "beginning coupling iteration");
            }
            self.reporter.iteration_started(iteration);

            invocations += 1;
            let outcome =
                self.executor
                    .run_one_iteration(iteration, &mut self.norms, self.reporter.as_mut());

            if let Some(failure) = outcome.failure {
                status = failure.status();
                iterations = iteration + 1;
                warn!(iteration, ?failure, "coupling iteration failed");
                break;
            }

            if outcome.topology_repeat_requested {
                topology_repeats += 1;
                repeat_pending = true;
                continue;
            }
            repeat_pending = false;

            if let Some(custom) = &mut self.custom {
                if let Some(value) = self.executor.postprocessor_value(&custom.name) {
                    custom.record(iteration, value);
                    self.reporter.custom_value(iteration, &custom.name, value);
                }
            }

            iterations = iteration + 1;

            if !has_coupling {
                status = ConvergenceStatus::ConvergedPrimary;
                break;
            }

            if let Verdict::Terminal(verdict) =
                self.evaluator.evaluate(iteration, &self.norms, self.custom.as_ref())
            {
                status = verdict;
                break;
            }

            iteration += 1;
        }

        if status == ConvergenceStatus::Unsolved {
            status = ConvergenceStatus::DivergedMaxIterations;
        }

        if status.is_converged() {
            if let Some(failure) = self.executor.run_end_phase() {
                status = failure.status();
            }
        }

        let converged = status.is_converged();
        self.executor.finish_secondary(converged);
        if converged {
            self.last_converged_time = Some(time);
        }

        let report = self.build_report(
            step_id,
            time,
            status,
            iterations,
            invocations,
            topology_repeats,
            reentry,
            started_at,
        );
        self.reporter.step_finished(&report);

        if converged {
            info!(status = %status, iterations, reason = status.reason(), "coupling step finished");
        } else {
            warn!(status = %status, iterations, reason = status.reason(), "coupling step did not converge");
        }

        Ok(report)
    }

    /// Restore every subordinate to the state captured at the start of the last step.
    ///
    /// Lets the enclosing driver retry the outer step, e.g. with a smaller increment.
    pub fn reject_step(&mut self) -> CouplingResult<()> {
        self.snapshots.restore_all(self.executor.subordinates_mut())?;
        debug!(generation = self.snapshots.generation(), "rejected outer step");
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn build_report(
        &self,
        step_id: Uuid,
        time: f64,
        status: ConvergenceStatus,
        iterations: usize,
        executor_invocations: usize,
        topology_repeats: u32,
        secondary_reentry: bool,
        started_at: chrono::DateTime<Utc>,
    ) -> StepReport {
        let completed = iterations.min(self.norms.capacity());
        StepReport {
            step_id,
            time,
            status,
            reason: status.reason().to_string(),
            iterations,
            executor_invocations,
            topology_repeats,
            initial_norm: self.norms.initial,
            begin_norms: (0..completed).map(|i| self.norms.begin_at(i)).collect(),
            end_norms: (0..completed).map(|i| self.norms.end_at(i)).collect(),
            custom_values: self
                .custom
                .as_ref()
                .map(|c| c.values.clone())
                .unwrap_or_default(),
            secondary_reentry,
            started_at,
            finished_at: Utc::now(),
        }
    }
}
