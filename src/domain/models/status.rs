//! Coupling convergence status.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of one outer step's coupling loop.
///
/// Exactly one value holds at any time. Every variant except
/// [`Unsolved`](Self::Unsolved) is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConvergenceStatus {
    /// No verdict yet.
    #[default]
    Unsolved,
    /// The primary solve converged and no coupling iterations were requested.
    ConvergedPrimary,
    /// The residual norm fell below the absolute tolerance.
    ConvergedAbs,
    /// The residual norm dropped below the relative tolerance.
    ConvergedRelative,
    /// The custom postprocessor stopped changing.
    ConvergedCustom,
    /// Iteration budget was spent and the configuration accepts that as success.
    ReachedMaxIterations,
    /// Iteration budget was spent without convergence.
    DivergedMaxIterations,
    /// The primary solve failed or the step was aborted externally.
    DivergedPrimary,
    /// A subordinate unit failed irrecoverably.
    DivergedSubordinateFailure,
}

impl ConvergenceStatus {
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Unsolved)
    }

    /// Whether this terminal status counts as a successful outer step.
    pub const fn is_converged(self) -> bool {
        matches!(
            self,
            Self::ConvergedPrimary
                | Self::ConvergedAbs
                | Self::ConvergedRelative
                | Self::ConvergedCustom
                | Self::ReachedMaxIterations
        )
    }

    pub const fn is_diverged(self) -> bool {
        matches!(
            self,
            Self::DivergedMaxIterations | Self::DivergedPrimary | Self::DivergedSubordinateFailure
        )
    }

    /// Stable machine-readable code.
    pub const fn code(self) -> &'static str {
        match self {
            Self::Unsolved => "UNSOLVED",
            Self::ConvergedPrimary => "CONVERGED_PRIMARY",
            Self::ConvergedAbs => "CONVERGED_ABS",
            Self::ConvergedRelative => "CONVERGED_RELATIVE",
            Self::ConvergedCustom => "CONVERGED_CUSTOM",
            Self::ReachedMaxIterations => "REACHED_MAX_ITERATIONS",
            Self::DivergedMaxIterations => "DIVERGED_MAX_ITERATIONS",
            Self::DivergedPrimary => "DIVERGED_PRIMARY",
            Self::DivergedSubordinateFailure => "DIVERGED_SUBORDINATE_FAILURE",
        }
    }

    /// One-line human-readable reason, mapped 1:1 from the variant.
    pub const fn reason(self) -> &'static str {
        match self {
            Self::Unsolved => "coupling loop has not produced a verdict",
            Self::ConvergedPrimary => "primary solve converged without coupling iterations",
            Self::ConvergedAbs => "residual norm fell below the absolute tolerance",
            Self::ConvergedRelative => "residual norm dropped below the relative tolerance",
            Self::ConvergedCustom => "custom postprocessor change fell below its tolerance",
            Self::ReachedMaxIterations => {
                "maximum coupling iterations reached and accepted as converged"
            }
            Self::DivergedMaxIterations => "maximum coupling iterations reached without convergence",
            Self::DivergedPrimary => "primary solve failed to converge",
            Self::DivergedSubordinateFailure => "a subordinate application failed",
        }
    }
}

impl fmt::Display for ConvergenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
