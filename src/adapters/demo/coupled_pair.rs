//! Two-unit toy problem: a primary unit solving `x = a + b*y` and one
//! subordinate computing `y = c + d*x` at the end of every timestep.
//!
//! The fixed point is `x = (a + b*c) / (1 - b*d)`; Picard iteration reaches
//! it whenever `|b*d| < 1`.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, warn};

use crate::domain::models::{ExecPhase, StateBlob};
use crate::domain::ports::{DofSelector, PostprocessorRegistry, PrimarySolver, SubordinateSet};

/// Coefficients and initial guess of the toy problem.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoParams {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub x0: f64,
    pub y0: f64,
    pub dt: f64,
}

impl Default for DemoParams {
    fn default() -> Self {
        Self {
            a: 1.0,
            b: 0.5,
            c: 2.0,
            d: 0.8,
            x0: 0.0,
            y0: 0.0,
            dt: 1.0,
        }
    }
}

impl DemoParams {
    /// Analytic fixed point `(x, y)`, or `None` if `b*d == 1`.
    pub fn fixed_point(&self) -> Option<(f64, f64)> {
        let denominator = self.b.mul_add(-self.d, 1.0);
        if denominator.abs() < f64::EPSILON {
            return None;
        }
        let x = self.b.mul_add(self.c, self.a) / denominator;
        Some((x, self.d.mul_add(x, self.c)))
    }
}

/// Values transferred between the two units.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Exchange {
    x: f64,
    y: f64,
    time: f64,
}

type Shared = Rc<RefCell<Exchange>>;

/// Build the three collaborators of one coupled pair sharing their exchange values.
pub fn coupled_pair(params: DemoParams) -> (DemoPrimary, DemoSubordinate, DemoRegistry) {
    let exchange = Rc::new(RefCell::new(Exchange {
        x: params.x0,
        y: params.y0,
        time: params.dt,
    }));
    (
        DemoPrimary {
            params,
            exchange: Rc::clone(&exchange),
            solves: 0,
        },
        DemoSubordinate {
            params,
            exchange: Rc::clone(&exchange),
            state: SubordinateState::default(),
            solves: 0,
        },
        DemoRegistry { exchange },
    )
}

// ---------------------------------------------------------------------------
// Primary
// ---------------------------------------------------------------------------

/// Primary unit. Its single dof is `x`.
pub struct DemoPrimary {
    params: DemoParams,
    exchange: Shared,
    solves: usize,
}

impl DemoPrimary {
    pub const fn solves(&self) -> usize {
        self.solves
    }

    /// Move to the next outer step.
    pub fn advance(&mut self) {
        self.exchange.borrow_mut().time += self.params.dt;
    }
}

impl DofSelector for DemoPrimary {
    fn select_dofs(&self, variable: &str) -> Option<Vec<usize>> {
        (variable == "x").then(|| vec![0])
    }

    fn dof_values(&self, slots: &[usize]) -> Vec<f64> {
        let x = self.exchange.borrow().x;
        slots.iter().map(|_| x).collect()
    }

    fn set_dof_values(&mut self, slots: &[usize], values: &[f64]) {
        if let (Some(_), Some(&value)) = (slots.first(), values.first()) {
            self.exchange.borrow_mut().x = value;
        }
    }
}

impl PrimarySolver for DemoPrimary {
    fn solve_once(&mut self) -> bool {
        let mut exchange = self.exchange.borrow_mut();
        exchange.x = self.params.b.mul_add(exchange.y, self.params.a);
        self.solves += 1;
        debug!(x = exchange.x, y = exchange.y, "demo primary solved");
        exchange.x.is_finite()
    }

    fn residual_norm_l2(&mut self) -> f64 {
        let exchange = self.exchange.borrow();
        (exchange.x - self.params.b.mul_add(exchange.y, self.params.a)).abs()
    }

    fn did_topology_change(&mut self) -> bool {
        false
    }

    fn current_time(&self) -> f64 {
        self.exchange.borrow().time
    }
}

// ---------------------------------------------------------------------------
// Subordinate
// ---------------------------------------------------------------------------

/// Checkpointed state of the subordinate unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SubordinateState {
    pub solution: f64,
    pub time_level: u64,
}

/// Subordinate unit executing at [`ExecPhase::TimestepEnd`].
pub struct DemoSubordinate {
    params: DemoParams,
    exchange: Shared,
    state: SubordinateState,
    solves: usize,
}

impl DemoSubordinate {
    pub const fn state(&self) -> SubordinateState {
        self.state
    }

    pub const fn solves(&self) -> usize {
        self.solves
    }
}

impl SubordinateSet for DemoSubordinate {
    fn run_phase(&mut self, phase: ExecPhase, auto_advance: bool) -> bool {
        if phase != ExecPhase::TimestepEnd {
            return true;
        }
        let mut exchange = self.exchange.borrow_mut();
        self.state.solution = self.params.d.mul_add(exchange.x, self.params.c);
        if auto_advance {
            self.state.time_level += 1;
        }
        exchange.y = self.state.solution;
        self.solves += 1;
        self.state.solution.is_finite()
    }

    fn backup(&mut self, phase: ExecPhase) -> StateBlob {
        if phase != ExecPhase::TimestepEnd {
            return StateBlob::empty();
        }
        match serde_json::to_vec(&self.state) {
            Ok(bytes) => StateBlob::new(bytes),
            Err(err) => {
                warn!(error = %err, "failed to serialize demo subordinate");
                StateBlob::empty()
            }
        }
    }

    fn restore(&mut self, phase: ExecPhase, blob: &StateBlob) {
        if phase != ExecPhase::TimestepEnd || blob.is_empty() {
            return;
        }
        match serde_json::from_slice(blob.as_bytes()) {
            Ok(state) => self.state = state,
            Err(err) => warn!(error = %err, "discarding unreadable demo subordinate backup"),
        }
    }

    fn has_units(&self, phase: ExecPhase) -> bool {
        phase == ExecPhase::TimestepEnd
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Exposes the exchanged values as postprocessors `x` and `y`.
pub struct DemoRegistry {
    exchange: Shared,
}

impl PostprocessorRegistry for DemoRegistry {
    fn value_of(&self, name: &str) -> Option<f64> {
        let exchange = self.exchange.borrow();
        match name {
            "x" => Some(exchange.x),
            "y" => Some(exchange.y),
            _ => None,
        }
    }

    fn set_value_of(&mut self, name: &str, value: f64) {
        let mut exchange = self.exchange.borrow_mut();
        match name {
            "x" => exchange.x = value,
            "y" => exchange.y = value,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_point_of_default_params() {
        let (x, y) = DemoParams::default().fixed_point().unwrap();
        assert!((x - 10.0 / 3.0).abs() < 1e-12);
        assert!((y - 2.0 - 0.8 * 10.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_singular_params_have_no_fixed_point() {
        let params = DemoParams {
            b: 2.0,
            d: 0.5,
            ..DemoParams::default()
        };
        assert!(params.fixed_point().is_none());
    }

    #[test]
    fn test_units_share_exchange_values() {
        let (mut primary, mut subordinate, registry) = coupled_pair(DemoParams::default());
        assert!(primary.solve_once());
        assert_eq!(registry.value_of("x"), Some(1.0));
        assert_eq!(primary.residual_norm_l2(), 0.0);

        assert!(subordinate.run_phase(ExecPhase::TimestepEnd, false));
        assert!((registry.value_of("y").unwrap() - 2.8).abs() < 1e-12);
        assert!((primary.residual_norm_l2() - 1.4).abs() < 1e-12);
        assert_eq!(registry.value_of("z"), None);
    }

    #[test]
    fn test_backup_restore_only_touches_subordinate_state() {
        let (_primary, mut subordinate, registry) = coupled_pair(DemoParams::default());
        let blob = subordinate.backup(ExecPhase::TimestepEnd);
        assert!(subordinate.backup(ExecPhase::Begin).is_empty());

        assert!(subordinate.run_phase(ExecPhase::TimestepEnd, true));
        assert_eq!(subordinate.state().time_level, 1);

        subordinate.restore(ExecPhase::TimestepEnd, &blob);
        assert_eq!(subordinate.state(), SubordinateState::default());
        // The transferred value survives the restore.
        assert!((registry.value_of("y").unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_only_x_is_a_variable() {
        let (mut primary, _subordinate, _registry) = coupled_pair(DemoParams::default());
        assert_eq!(primary.select_dofs("x"), Some(vec![0]));
        assert_eq!(primary.select_dofs("y"), None);
        primary.set_dof_values(&[0], &[4.0]);
        assert_eq!(primary.dof_values(&[0]), vec![4.0]);
    }

    #[test]
    fn test_advance_moves_time() {
        let (mut primary, _subordinate, _registry) = coupled_pair(DemoParams::default());
        assert_eq!(primary.current_time(), 1.0);
        primary.advance();
        assert_eq!(primary.current_time(), 2.0);
    }
}
