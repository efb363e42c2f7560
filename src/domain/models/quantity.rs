//! Quantities subject to relaxation or extrapolation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a transformed quantity lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantityKind {
    /// A named subset of the primary solver's degrees of freedom.
    Variable,
    /// A named scalar in the postprocessor registry.
    Postprocessor,
}

impl QuantityKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Variable => "variable",
            Self::Postprocessor => "postprocessor",
        }
    }
}

impl fmt::Display for QuantityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which coupling loop owns the quantity's transformation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantityRole {
    /// Transformed by this loop's own coupling iterations.
    Primary,
    /// Transformed on behalf of an enclosing loop that drives this one as a
    /// subordinate. Its history survives across outer steps.
    Secondary,
}

/// A value object carrying the current iterate and up to two prior ones.
///
/// `current` is only ever set from values observed on the external
/// collaborators. The acceleration result is written to `staged` and goes
/// back out through the collaborators on commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformedQuantity {
    pub name: String,
    pub kind: QuantityKind,
    pub role: QuantityRole,
    /// Addressable slots. Empty for postprocessors, dof indices for variables.
    pub slots: Vec<usize>,
    pub current: Vec<f64>,
    pub old: Option<Vec<f64>>,
    pub older: Option<Vec<f64>>,
    pub staged: Option<Vec<f64>>,
}

impl TransformedQuantity {
    pub fn variable(name: impl Into<String>, role: QuantityRole) -> Self {
        Self::new(name, QuantityKind::Variable, role)
    }

    pub fn postprocessor(name: impl Into<String>, role: QuantityRole) -> Self {
        Self::new(name, QuantityKind::Postprocessor, role)
    }

    fn new(name: impl Into<String>, kind: QuantityKind, role: QuantityRole) -> Self {
        Self {
            name: name.into(),
            kind,
            role,
            slots: Vec::new(),
            current: Vec::new(),
            old: None,
            older: None,
            staged: None,
        }
    }

    /// Set `current` from values read off a collaborator.
    pub fn observe(&mut self, values: Vec<f64>) {
        self.current = values;
    }

    /// Shift history back one place and store `values` as the newest prior iterate.
    pub fn save_previous(&mut self, values: Vec<f64>) {
        self.older = self.old.take();
        self.old = Some(values);
    }

    pub fn stage(&mut self, next: Vec<f64>) {
        self.staged = Some(next);
    }

    pub fn take_staged(&mut self) -> Option<Vec<f64>> {
        self.staged.take()
    }

    pub fn reset_history(&mut self) {
        self.current.clear();
        self.old = None;
        self.older = None;
        self.staged = None;
    }
}

/// Every quantity the loop transforms, in configuration order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuantitySet {
    quantities: Vec<TransformedQuantity>,
}

impl QuantitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_names(
        variables: &[String],
        postprocessors: &[String],
        secondary_variables: &[String],
        secondary_postprocessors: &[String],
    ) -> Self {
        let mut set = Self::new();
        for name in variables {
            set.push(TransformedQuantity::variable(name, QuantityRole::Primary));
        }
        for name in postprocessors {
            set.push(TransformedQuantity::postprocessor(name, QuantityRole::Primary));
        }
        for name in secondary_variables {
            set.push(TransformedQuantity::variable(name, QuantityRole::Secondary));
        }
        for name in secondary_postprocessors {
            set.push(TransformedQuantity::postprocessor(name, QuantityRole::Secondary));
        }
        set
    }

    pub fn push(&mut self, quantity: TransformedQuantity) {
        self.quantities.push(quantity);
    }

    pub fn len(&self) -> usize {
        self.quantities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quantities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TransformedQuantity> {
        self.quantities.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut TransformedQuantity> {
        self.quantities.iter_mut()
    }

    pub fn get(&self, name: &str, kind: QuantityKind, role: QuantityRole) -> Option<&TransformedQuantity> {
        self.quantities
            .iter()
            .find(|q| q.name == name && q.kind == kind && q.role == role)
    }

    /// Quantities matching both `kind` and `role`.
    pub fn select_mut(
        &mut self,
        kind: QuantityKind,
        role: QuantityRole,
    ) -> impl Iterator<Item = &mut TransformedQuantity> {
        self.quantities
            .iter_mut()
            .filter(move |q| q.kind == kind && q.role == role)
    }

    pub fn has(&self, kind: QuantityKind, role: QuantityRole) -> bool {
        self.quantities.iter().any(|q| q.kind == kind && q.role == role)
    }

    /// Drop the history of every quantity owned by `role`.
    pub fn reset_role(&mut self, role: QuantityRole) {
        for quantity in self.quantities.iter_mut().filter(|q| q.role == role) {
            quantity.reset_history();
        }
    }
}
