//! Convergence reporters: terminal output and structured tracing events.

pub mod console_reporter;
pub mod tracing_reporter;

pub use console_reporter::{render_history, ConsoleReporter};
pub use tracing_reporter::TracingReporter;
