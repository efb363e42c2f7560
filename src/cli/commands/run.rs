//! Implementation of the `coupler run` command.

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use serde::Serialize;
use std::path::Path;

use crate::adapters::demo::{coupled_pair, DemoParams};
use crate::application::CouplingLoop;
use crate::cli::load_config;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::StepReport;
use crate::domain::ports::{ConvergenceReporter, PostprocessorRegistry};
use crate::infrastructure::reporting::{ConsoleReporter, TracingReporter};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Number of outer steps to take
    #[arg(short, long, default_value = "1")]
    pub steps: usize,

    /// Primary offset in `x = a + b*y`
    #[arg(long, default_value_t = 1.0, allow_negative_numbers = true)]
    pub a: f64,

    /// Primary coupling coefficient in `x = a + b*y`
    #[arg(long, default_value_t = 0.5, allow_negative_numbers = true)]
    pub b: f64,

    /// Subordinate offset in `y = c + d*x`
    #[arg(long, default_value_t = 2.0, allow_negative_numbers = true)]
    pub c: f64,

    /// Subordinate coupling coefficient in `y = c + d*x`
    #[arg(long, default_value_t = 0.8, allow_negative_numbers = true)]
    pub d: f64,
}

impl RunArgs {
    const fn params(&self) -> DemoParams {
        DemoParams {
            a: self.a,
            b: self.b,
            c: self.c,
            d: self.d,
            x0: 0.0,
            y0: 0.0,
            dt: 1.0,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunOutput {
    pub success: bool,
    pub x: Option<f64>,
    pub y: Option<f64>,
    /// Analytic solution of the demo problem, if it has one
    pub fixed_point: Option<(f64, f64)>,
    pub steps: Vec<StepReport>,
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("Time").add_attribute(Attribute::Bold),
                Cell::new("Status").add_attribute(Attribute::Bold),
                Cell::new("Iterations").add_attribute(Attribute::Bold),
                Cell::new("Elapsed (ms)").add_attribute(Attribute::Bold),
            ]);

        for report in &self.steps {
            let color = if report.converged() { Color::Green } else { Color::Red };
            table.add_row(vec![
                Cell::new(report.time),
                Cell::new(report.status).fg(color),
                Cell::new(report.iterations),
                Cell::new(report.elapsed_ms()),
            ]);
        }

        let mut lines = vec![table.to_string()];
        if let (Some(x), Some(y)) = (self.x, self.y) {
            lines.push(format!("Final values: x = {x:.10}, y = {y:.10}"));
        }
        if let Some((x, y)) = self.fixed_point {
            lines.push(format!("Fixed point:  x = {x:.10}, y = {y:.10}"));
        }
        if !self.success {
            lines.push("The last step did not converge.".to_string());
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub fn execute(args: &RunArgs, config_path: Option<&Path>, json_mode: bool) -> Result<()> {
    let result = run(args, config_path, json_mode)?;
    output(&result, json_mode);
    Ok(())
}

/// Run the demo problem for `args.steps` outer steps, stopping at the first
/// step that does not converge.
pub fn run(args: &RunArgs, config_path: Option<&Path>, json_mode: bool) -> Result<RunOutput> {
    let config = load_config(config_path).context("Failed to load configuration")?;
    let params = args.params();
    let (primary, subordinate, registry) = coupled_pair(params);

    let reporter: Box<dyn ConvergenceReporter> = if json_mode {
        Box::new(TracingReporter)
    } else {
        Box::new(ConsoleReporter::stderr())
    };
    let mut coupling = CouplingLoop::new(config, primary, subordinate, registry)
        .context("Failed to build coupling loop")?
        .with_reporter(reporter);

    let mut steps = Vec::with_capacity(args.steps);
    for step in 0..args.steps {
        if step > 0 {
            coupling.executor_mut().primary_mut().advance();
        }
        let report = coupling
            .run()
            .with_context(|| format!("Coupling step {step} could not start"))?;
        let converged = report.converged();
        steps.push(report);
        if !converged {
            break;
        }
    }

    let registry = coupling.executor().registry();
    Ok(RunOutput {
        success: steps.last().is_some_and(StepReport::converged),
        x: registry.value_of("x"),
        y: registry.value_of("y"),
        fixed_point: params.fixed_point(),
        steps,
    })
}
