//! Acceleration of the fixed-point iterate.
//!
//! Both strategies are pure functions of the current iterate and up to two
//! prior ones. When a strategy's precondition is not met it returns `current`
//! unchanged, so callers always get a well-defined next value.

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::domain::models::{AccelerationKind, CouplingConfig, TransformedQuantity};

/// Denominators at or below this magnitude are treated as zero by the secant update.
pub const SECANT_DENOMINATOR_EPSILON: f64 = 1e-12;

/// Update rule applied independently to each transformed quantity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AccelerationStrategy {
    /// Plain Picard substitution, optionally relaxed:
    /// `next = old * (1 - f) + current * f`.
    DirectSubstitution { relaxation_factor: f64 },
    /// Two-point secant extrapolation towards the fixed point.
    SecantExtrapolation,
}

impl AccelerationStrategy {
    /// Strategy for quantities this loop transforms on its own behalf.
    pub const fn primary(config: &CouplingConfig) -> Self {
        Self::from_kind(config.acceleration, config.relaxation_factor)
    }

    /// Strategy for quantities transformed on behalf of an enclosing loop.
    pub const fn secondary(config: &CouplingConfig) -> Self {
        Self::from_kind(config.acceleration, config.secondary_relaxation_factor)
    }

    const fn from_kind(kind: AccelerationKind, relaxation_factor: f64) -> Self {
        match kind {
            AccelerationKind::Direct => Self::DirectSubstitution { relaxation_factor },
            AccelerationKind::Secant => Self::SecantExtrapolation,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::DirectSubstitution { .. } => "direct_substitution",
            Self::SecantExtrapolation => "secant_extrapolation",
        }
    }

    /// Whether this strategy can change anything at all.
    ///
    /// Unrelaxed substitution leaves every value as computed, so there is no
    /// point saving history for it.
    pub fn transforms(&self) -> bool {
        match self {
            Self::DirectSubstitution { relaxation_factor } => *relaxation_factor != 1.0,
            Self::SecantExtrapolation => true,
        }
    }

    /// Whether the precondition for an update holds at `iteration`.
    pub const fn is_ready(&self, iteration: usize, has_old: bool, has_older: bool) -> bool {
        match self {
            Self::DirectSubstitution { .. } => iteration > 0 && has_old,
            Self::SecantExtrapolation => iteration >= 2 && has_old && has_older,
        }
    }

    /// Next iterate of a scalar.
    pub fn next_value(
        &self,
        current: f64,
        old: Option<f64>,
        older: Option<f64>,
        iteration: usize,
    ) -> f64 {
        match *self {
            Self::DirectSubstitution { relaxation_factor } => {
                if relaxation_factor == 1.0 {
                    return current;
                }
                match old {
                    Some(old) if iteration > 0 => relax(current, old, relaxation_factor),
                    _ => current,
                }
            }
            Self::SecantExtrapolation => match (old, older) {
                (Some(old), Some(older)) if iteration >= 2 => secant(current, old, older),
                _ => current,
            },
        }
    }

    /// Next iterate of a vector, dof by dof.
    ///
    /// History vectors whose length differs from `current` are ignored.
    pub fn next_vector(
        &self,
        current: &[f64],
        old: Option<&[f64]>,
        older: Option<&[f64]>,
        iteration: usize,
    ) -> Vec<f64> {
        let old = old.filter(|o| o.len() == current.len());
        let older = older.filter(|o| o.len() == current.len());

        current
            .iter()
            .enumerate()
            .map(|(i, &value)| {
                self.next_value(
                    value,
                    old.map(|o| o[i]),
                    older.map(|o| o[i]),
                    iteration,
                )
            })
            .collect()
    }

    /// Stage the next iterate of `quantity`.
    ///
    /// Returns `false`, staging nothing, when the precondition is not met.
    pub fn apply(&self, quantity: &mut TransformedQuantity, iteration: usize) -> bool {
        if !self.transforms() || !self.is_ready(iteration, quantity.old.is_some(), quantity.older.is_some()) {
            return false;
        }

        let mismatched = |h: &Option<Vec<f64>>| {
            h.as_ref().is_some_and(|h| h.len() != quantity.current.len())
        };
        if mismatched(&quantity.old) || mismatched(&quantity.older) {
            warn!(
                quantity = %quantity.name,
                len = quantity.current.len(),
                "history length differs from current iterate; skipping transformation"
            );
            return false;
        }

        let next = self.next_vector(
            &quantity.current,
            quantity.old.as_deref(),
            quantity.older.as_deref(),
            iteration,
        );
        trace!(quantity = %quantity.name, strategy = self.name(), iteration, "staged next iterate");
        quantity.stage(next);
        true
    }
}

fn relax(current: f64, old: f64, factor: f64) -> f64 {
    old.mul_add(1.0 - factor, current * factor)
}

fn secant(current: f64, old: f64, older: f64) -> f64 {
    let denominator = current + older - 2.0 * old;
    if denominator.abs() > SECANT_DENOMINATOR_EPSILON {
        old - (current - old) * (old - older) / denominator
    } else {
        current
    }
}
