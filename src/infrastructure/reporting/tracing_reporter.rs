//! Convergence history as structured tracing events.

use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::models::StepReport;
use crate::domain::ports::{ConvergenceReporter, NormSite};

/// Emits one event per history entry under the `coupler::history` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ConvergenceReporter for TracingReporter {
    fn step_started(&mut self, step_id: Uuid, time: f64) {
        debug!(target: "coupler::history", %step_id, time, "step started");
    }

    fn initial_norm(&mut self, norm: f64) {
        info!(target: "coupler::history", norm, "initial residual norm");
    }

    fn norm_measured(&mut self, iteration: usize, site: NormSite, previous: Option<f64>, norm: f64) {
        let decreasing = previous.is_none_or(|p| norm < p);
        info!(
            target: "coupler::history",
            iteration,
            site = ?site,
            norm,
            decreasing,
            "residual norm"
        );
    }

    fn custom_value(&mut self, iteration: usize, name: &str, value: f64) {
        info!(target: "coupler::history", iteration, postprocessor = name, value, "custom postprocessor");
    }

    fn topology_repeat(&mut self, iteration: usize, count: u32) {
        info!(target: "coupler::history", iteration, count, "topology repeat");
    }

    fn step_finished(&mut self, report: &StepReport) {
        info!(
            target: "coupler::history",
            status = %report.status,
            iterations = report.iterations,
            elapsed_ms = report.elapsed_ms(),
            "{}",
            report.reason
        );
    }
}
