//! Human-readable convergence history for terminals.
//!
//! Norms print green while they decrease and red otherwise. The step ends with
//! a history table and the one-line verdict.

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use console::style;
use std::env;
use std::io::{self, Write};

use crate::domain::models::StepReport;
use crate::domain::ports::{ConvergenceReporter, NormSite};

pub struct ConsoleReporter<W: Write = io::Stderr> {
    out: W,
    use_colors: bool,
}

impl ConsoleReporter<io::Stderr> {
    /// Reporter writing to stderr, colored unless the terminal opts out.
    pub fn stderr() -> Self {
        Self::new(io::stderr(), supports_color())
    }
}

impl<W: Write> ConsoleReporter<W> {
    pub const fn new(out: W, use_colors: bool) -> Self {
        Self { out, use_colors }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: &str) {
        // Console output is best effort; a closed pipe must not fail the solve.
        let _ = writeln!(self.out, "{text}");
    }

    fn norm_text(&self, previous: Option<f64>, norm: f64) -> String {
        let text = format_norm(Some(norm));
        let styled = if previous.is_none_or(|p| norm < p) {
            style(text).green()
        } else {
            style(text).red()
        };
        styled.force_styling(self.use_colors).to_string()
    }

    fn heading(&self, text: &str) -> String {
        style(text).magenta().force_styling(self.use_colors).to_string()
    }
}

impl<W: Write> ConvergenceReporter for ConsoleReporter<W> {
    fn initial_norm(&mut self, norm: f64) {
        let line = format!("{} {}", self.heading("Initial coupling residual norm:"), format_norm(Some(norm)));
        self.line(&line);
    }

    fn iteration_started(&mut self, iteration: usize) {
        let line = self.heading(&format!("Beginning coupling iteration {iteration}"));
        self.line(&line);
    }

    fn norm_measured(&mut self, _iteration: usize, site: NormSite, previous: Option<f64>, norm: f64) {
        let label = match site {
            NormSite::Begin => "Coupling residual norm after timestep-begin subordinates:",
            NormSite::End => "Coupling residual norm after timestep-end subordinates:",
        };
        let line = format!("{} {}", self.heading(label), self.norm_text(previous, norm));
        self.line(&line);
    }

    fn custom_value(&mut self, iteration: usize, name: &str, value: f64) {
        self.line(&format!("{:>2} coupling {name} = {}", iteration + 1, format_norm(Some(value))));
    }

    fn topology_repeat(&mut self, _iteration: usize, count: u32) {
        self.line(&format!("Topology changed, repeating iteration (repeat {count})"));
    }

    fn step_finished(&mut self, report: &StepReport) {
        if !report.begin_norms.is_empty() || !report.custom_values.is_empty() {
            let table = render_history(report, self.use_colors);
            self.line(&table);
        }
        self.line(&format!("Coupling convergence reason: {} ({})", report.status, report.reason));
    }
}

/// Render a step's residual and custom history as a table.
pub fn render_history(report: &StepReport, use_colors: bool) -> String {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let mut header = vec![
        Cell::new("Iteration").add_attribute(Attribute::Bold),
        Cell::new("Begin norm").add_attribute(Attribute::Bold),
        Cell::new("End norm").add_attribute(Attribute::Bold),
    ];
    let has_custom = !report.custom_values.is_empty();
    if has_custom {
        header.push(Cell::new("Custom").add_attribute(Attribute::Bold));
    }
    table.set_header(header);

    let rows = report.iterations.max(report.custom_values.len());
    let mut previous_max: Option<f64> = None;
    for i in 0..rows {
        let begin = report.begin_norms.get(i).copied().flatten();
        let end = report.end_norms.get(i).copied().flatten();
        let current_max = match (begin, end) {
            (Some(b), Some(e)) => Some(b.max(e)),
            (b, e) => b.or(e),
        };

        let mut end_cell = Cell::new(format_norm(end));
        if use_colors {
            if let Some(max) = current_max {
                let color = if previous_max.is_none_or(|p| max < p) {
                    Color::Green
                } else {
                    Color::Red
                };
                end_cell = end_cell.fg(color);
            }
        }

        let mut row = vec![Cell::new(i), Cell::new(format_norm(begin)), end_cell];
        if has_custom {
            row.push(Cell::new(format_norm(report.custom_values.get(i).copied())));
        }
        table.add_row(row);
        if current_max.is_some() {
            previous_max = current_max;
        }
    }

    table.to_string()
}

fn format_norm(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.6e}"))
}

/// Check if color output is supported
fn supports_color() -> bool {
    // Respect NO_COLOR environment variable
    if env::var("NO_COLOR").is_ok() {
        return false;
    }

    if let Ok(term) = env::var("TERM") {
        if term == "dumb" {
            return false;
        }
    }

    console::Term::stderr().features().colors_supported()
}
