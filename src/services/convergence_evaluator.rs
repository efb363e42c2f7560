//! Coupling convergence verdicts.
//!
//! [`ConvergenceEvaluator::evaluate`] is a pure function of the residual and
//! custom-quantity histories plus the configured criteria. It is the only
//! place a terminal [`ConvergenceStatus`] for a completed iteration is chosen.

use serde::{Deserialize, Serialize};

use crate::domain::models::{
    ConvergenceStatus, CouplingConfig, CustomQuantityHistory, ResidualNormHistory,
};

/// Constants the evaluator checks the histories against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceCriteria {
    pub min_iterations: usize,
    pub max_iterations: usize,
    pub abs_tol: f64,
    pub rel_tol: f64,
    pub custom_abs_tol: f64,
    pub custom_rel_tol: f64,
    pub accept_max_iterations_as_converged: bool,
    pub residual_check_enabled: bool,
}

impl From<&CouplingConfig> for ConvergenceCriteria {
    fn from(config: &CouplingConfig) -> Self {
        Self {
            min_iterations: config.min_iterations,
            max_iterations: config.max_iterations,
            abs_tol: config.abs_tol,
            rel_tol: config.rel_tol,
            custom_abs_tol: config.custom_abs_tol,
            custom_rel_tol: config.custom_rel_tol,
            accept_max_iterations_as_converged: config.accept_max_iterations_as_converged,
            residual_check_enabled: config.residual_check_enabled,
        }
    }
}

/// Result of evaluating one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Not terminal; run another iteration.
    Iterating,
    Terminal(ConvergenceStatus),
}

#[derive(Debug, Clone)]
pub struct ConvergenceEvaluator {
    criteria: ConvergenceCriteria,
}

impl ConvergenceEvaluator {
    pub const fn new(criteria: ConvergenceCriteria) -> Self {
        Self { criteria }
    }

    pub const fn criteria(&self) -> &ConvergenceCriteria {
        &self.criteria
    }

    /// Whether norm and custom checks may stop the loop at `iteration`.
    pub const fn checks_allowed(&self, iteration: usize) -> bool {
        iteration + 2 > self.criteria.min_iterations
    }

    /// Evaluate the histories after `iteration` completed.
    ///
    /// First match wins: absolute norm, relative norm, custom absolute,
    /// custom relative, iteration budget. Missing or `NaN` values never converge.
    pub fn evaluate(
        &self,
        iteration: usize,
        norms: &ResidualNormHistory,
        custom: Option<&CustomQuantityHistory>,
    ) -> Verdict {
        let c = &self.criteria;

        if self.checks_allowed(iteration) {
            if c.residual_check_enabled {
                if norms.max_norm(iteration).is_some_and(|n| n < c.abs_tol) {
                    return Verdict::Terminal(ConvergenceStatus::ConvergedAbs);
                }
                if norms.relative_drop(iteration).is_some_and(|r| r < c.rel_tol) {
                    return Verdict::Terminal(ConvergenceStatus::ConvergedRelative);
                }
            }

            if let Some(custom) = custom {
                if custom.delta().is_some_and(|d| d < c.custom_abs_tol) {
                    return Verdict::Terminal(ConvergenceStatus::ConvergedCustom);
                }
                if custom.relative_delta().is_some_and(|r| r < c.custom_rel_tol) {
                    return Verdict::Terminal(ConvergenceStatus::ConvergedCustom);
                }
            }
        }

        if iteration + 1 >= c.max_iterations {
            return Verdict::Terminal(if c.accept_max_iterations_as_converged {
                ConvergenceStatus::ReachedMaxIterations
            } else {
                ConvergenceStatus::DivergedMaxIterations
            });
        }

        Verdict::Iterating
    }
}
