//! Residual-norm and custom-quantity histories.
//!
//! Both histories are plain value objects owned by the coupling loop. They are
//! written between iterations and read by the convergence evaluator, which
//! never mutates them.

use serde::{Deserialize, Serialize};

/// Per-iteration residual norms measured around the primary solve.
///
/// The begin and end sequences are pre-sized to the iteration budget and
/// filled with `NaN`; a slot stays `NaN` when its norm was not measured
/// (no subordinate ran in that phase and norms were not forced). A slot is
/// only meaningful for iterations that have already run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResidualNormHistory {
    /// Norm measured after the timestep-begin phase, one slot per iteration.
    pub begin: Vec<f64>,
    /// Norm measured after the timestep-end phase, one slot per iteration.
    pub end: Vec<f64>,
    /// Norm of the primary residual before the first coupling iteration.
    ///
    /// `None` when residual checks are disabled or the step does a single pass.
    pub initial: Option<f64>,
}

impl ResidualNormHistory {
    pub fn new(max_iterations: usize) -> Self {
        Self {
            begin: vec![f64::NAN; max_iterations],
            end: vec![f64::NAN; max_iterations],
            initial: None,
        }
    }

    /// Clear all slots for a fresh outer step.
    pub fn reset(&mut self, max_iterations: usize) {
        self.begin.clear();
        self.begin.resize(max_iterations, f64::NAN);
        self.end.clear();
        self.end.resize(max_iterations, f64::NAN);
        self.initial = None;
    }

    pub const fn capacity(&self) -> usize {
        self.begin.len()
    }

    /// Store the begin norm of `iteration`. Writes past the budget are dropped.
    pub fn record_begin(&mut self, iteration: usize, norm: f64) {
        if let Some(slot) = self.begin.get_mut(iteration) {
            *slot = norm;
        }
    }

    /// Store the end norm of `iteration`. Writes past the budget are dropped.
    pub fn record_end(&mut self, iteration: usize, norm: f64) {
        if let Some(slot) = self.end.get_mut(iteration) {
            *slot = norm;
        }
    }

    pub fn begin_at(&self, iteration: usize) -> Option<f64> {
        self.begin.get(iteration).copied().filter(|v| !v.is_nan())
    }

    pub fn end_at(&self, iteration: usize) -> Option<f64> {
        self.end.get(iteration).copied().filter(|v| !v.is_nan())
    }

    /// Largest measured norm of `iteration`, or `None` if neither was measured.
    pub fn max_norm(&self, iteration: usize) -> Option<f64> {
        match (self.begin_at(iteration), self.end_at(iteration)) {
            (Some(b), Some(e)) => Some(b.max(e)),
            (Some(v), None) | (None, Some(v)) => Some(v),
            (None, None) => None,
        }
    }

    /// `max_norm(iteration) / initial`.
    ///
    /// `None` when no initial norm was captured, when it is zero or `NaN`, or
    /// when nothing was measured at `iteration`.
    pub fn relative_drop(&self, iteration: usize) -> Option<f64> {
        let initial = self.initial.filter(|v| *v != 0.0 && !v.is_nan())?;
        let ratio = self.max_norm(iteration)? / initial;
        (!ratio.is_nan()).then_some(ratio)
    }
}

/// How the custom-check scaling value is captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingCapture {
    /// Scale by the value observed on the first iteration of the outer step.
    FirstIteration,
    /// Scale by the value observed on the current iteration.
    EveryIteration,
}

/// History of the postprocessor driving the custom convergence check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomQuantityHistory {
    pub name: String,
    /// Compare against 0 instead of the previous iteration's value.
    pub direct_value: bool,
    pub scaling_capture: ScalingCapture,
    /// Value the current one is compared against. `None` until one exists.
    pub reference: Option<f64>,
    pub current: Option<f64>,
    pub scaling: Option<f64>,
    /// Every recorded value of this outer step, in iteration order.
    pub values: Vec<f64>,
}

impl CustomQuantityHistory {
    pub fn new(name: impl Into<String>, direct_value: bool, scaling_capture: ScalingCapture) -> Self {
        Self {
            name: name.into(),
            direct_value,
            scaling_capture,
            reference: None,
            current: None,
            scaling: None,
            values: Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        self.reference = None;
        self.current = None;
        self.scaling = None;
        self.values.clear();
    }

    /// Fix the comparison reference before an iteration runs.
    ///
    /// In direct mode the reference is always 0. Otherwise it is the value
    /// recorded by the previous iteration, so iteration 0 has none.
    pub fn capture_reference(&mut self, iteration: usize) {
        self.reference = if self.direct_value {
            Some(0.0)
        } else if iteration == 0 {
            None
        } else {
            self.current
        };
    }

    /// Record the value observed at the end of `iteration`.
    pub fn record(&mut self, iteration: usize, value: f64) {
        self.current = Some(value);
        self.values.push(value);
        match self.scaling_capture {
            ScalingCapture::EveryIteration => self.scaling = Some(value),
            ScalingCapture::FirstIteration if iteration == 0 || self.scaling.is_none() => {
                self.scaling = Some(value);
            }
            ScalingCapture::FirstIteration => {}
        }
    }

    /// `|current - reference|`, when both exist.
    pub fn delta(&self) -> Option<f64> {
        let delta = (self.current? - self.reference?).abs();
        (!delta.is_nan()).then_some(delta)
    }

    /// `|delta / scaling|`. Non-finite ratios count as "not converged".
    pub fn relative_delta(&self) -> Option<f64> {
        let ratio = (self.delta()? / self.scaling?).abs();
        ratio.is_finite().then_some(ratio)
    }
}
