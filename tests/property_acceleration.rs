use coupler::domain::models::{ConvergenceStatus, ResidualNormHistory};
use coupler::services::{
    AccelerationStrategy, ConvergenceCriteria, ConvergenceEvaluator, Verdict,
    SECANT_DENOMINATOR_EPSILON,
};
use proptest::prelude::*;

const SECANT: AccelerationStrategy = AccelerationStrategy::SecantExtrapolation;

fn criteria(min_iterations: usize, max_iterations: usize) -> ConvergenceCriteria {
    ConvergenceCriteria {
        min_iterations,
        max_iterations,
        abs_tol: 1e-8,
        rel_tol: 1e-8,
        custom_abs_tol: 1e-50,
        custom_rel_tol: 1e-8,
        accept_max_iterations_as_converged: false,
        residual_check_enabled: true,
    }
}

proptest! {
    /// Property: A flat secant denominator falls back to plain substitution
    #[test]
    fn prop_secant_flat_denominator_returns_current(
        old in -1_000_000i32..1_000_000,
        step in -1_000i32..1_000,
        iteration in 2usize..50,
    ) {
        // Equally spaced integers keep current + older - 2*old exactly 0.
        let (old, step) = (f64::from(old), f64::from(step));
        let older = old - step;
        let current = old + step;
        prop_assert!((current + older - 2.0 * old).abs() <= SECANT_DENOMINATOR_EPSILON);

        let next = SECANT.next_value(current, Some(old), Some(older), iteration);
        prop_assert_eq!(next, current);
    }

    /// Property: The secant update is always finite for finite inputs
    #[test]
    fn prop_secant_output_is_finite(
        current in -1e6f64..1e6,
        old in -1e6f64..1e6,
        older in -1e6f64..1e6,
    ) {
        let next = SECANT.next_value(current, Some(old), Some(older), 2);
        prop_assert!(next.is_finite());
    }

    /// Property: Secant extrapolation never fires before iteration 2
    #[test]
    fn prop_secant_waits_for_two_iterates(
        current in -1e6f64..1e6,
        old in -1e6f64..1e6,
        older in -1e6f64..1e6,
        iteration in 0usize..2,
    ) {
        prop_assert_eq!(SECANT.next_value(current, Some(old), Some(older), iteration), current);
    }

    /// Property: A unit relaxation factor is the identity on the current iterate
    #[test]
    fn prop_unit_relaxation_is_identity(
        current in -1e9f64..1e9,
        old in proptest::option::of(-1e9f64..1e9),
        iteration in 0usize..100,
    ) {
        let strategy = AccelerationStrategy::DirectSubstitution { relaxation_factor: 1.0 };
        prop_assert!(!strategy.transforms());
        prop_assert_eq!(strategy.next_value(current, old, None, iteration), current);
    }

    /// Property: Relaxation lands between the previous and the new iterate
    #[test]
    fn prop_underrelaxation_interpolates(
        current in -1e6f64..1e6,
        old in -1e6f64..1e6,
        factor in 0.01f64..1.0,
        iteration in 1usize..100,
    ) {
        let strategy = AccelerationStrategy::DirectSubstitution { relaxation_factor: factor };
        let next = strategy.next_value(current, Some(old), None, iteration);
        let (lo, hi) = if current < old { (current, old) } else { (old, current) };
        let slack = 1e-9 * (1.0 + lo.abs().max(hi.abs()));
        prop_assert!(next >= lo - slack && next <= hi + slack);
    }

    /// Property: Vector updates act dof by dof
    #[test]
    fn prop_vector_update_matches_scalar_update(
        dofs in proptest::collection::vec((-1e3f64..1e3, -1e3f64..1e3, -1e3f64..1e3), 1..16),
    ) {
        let current: Vec<f64> = dofs.iter().map(|d| d.0).collect();
        let old: Vec<f64> = dofs.iter().map(|d| d.1).collect();
        let older: Vec<f64> = dofs.iter().map(|d| d.2).collect();

        let next = SECANT.next_vector(&current, Some(&old), Some(&older), 3);
        prop_assert_eq!(next.len(), current.len());
        for (i, value) in next.iter().enumerate() {
            prop_assert_eq!(*value, SECANT.next_value(current[i], Some(old[i]), Some(older[i]), 3));
        }
    }

    /// Property: The absolute check wins whenever both norm checks pass
    #[test]
    fn prop_absolute_takes_precedence(
        norm in 0.0f64..1e-9,
        initial in 1.0f64..1e6,
    ) {
        let mut norms = ResidualNormHistory::new(4);
        norms.initial = Some(initial);
        norms.record_end(0, norm);
        let evaluator = ConvergenceEvaluator::new(criteria(0, 4));
        prop_assert_eq!(
            evaluator.evaluate(0, &norms, None),
            Verdict::Terminal(ConvergenceStatus::ConvergedAbs)
        );
    }

    /// Property: No norm check stops the loop before min_iterations allows it
    #[test]
    fn prop_min_iterations_gate_norm_checks(
        min_iterations in 2usize..10,
        extra in 1usize..10,
    ) {
        let max_iterations = min_iterations + extra;
        let evaluator = ConvergenceEvaluator::new(criteria(min_iterations, max_iterations));
        let mut norms = ResidualNormHistory::new(max_iterations);
        norms.initial = Some(1.0);
        for i in 0..max_iterations {
            norms.record_end(i, 0.0);
        }

        for iteration in 0..min_iterations - 1 {
            prop_assert_eq!(evaluator.evaluate(iteration, &norms, None), Verdict::Iterating);
        }
        prop_assert_eq!(
            evaluator.evaluate(min_iterations - 1, &norms, None),
            Verdict::Terminal(ConvergenceStatus::ConvergedAbs)
        );
    }

    /// Property: The last allowed iteration is always terminal
    #[test]
    fn prop_last_iteration_is_terminal(
        max_iterations in 1usize..50,
        norm in 1.0f64..1e3,
    ) {
        let evaluator = ConvergenceEvaluator::new(criteria(0, max_iterations));
        let mut norms = ResidualNormHistory::new(max_iterations);
        norms.initial = Some(1.0);
        for i in 0..max_iterations {
            norms.record_end(i, norm);
        }

        let verdict = evaluator.evaluate(max_iterations - 1, &norms, None);
        prop_assert_eq!(verdict, Verdict::Terminal(ConvergenceStatus::DivergedMaxIterations));
        if max_iterations > 1 {
            prop_assert_eq!(evaluator.evaluate(max_iterations - 2, &norms, None), Verdict::Iterating);
        }
    }
}
