// Integration tests for logging functionality
// Note: the global subscriber is installed once per process, so this binary
// holds a single test.

use coupler::adapters::demo::{coupled_pair, DemoParams};
use coupler::infrastructure::logging::{LogConfig, LogFormat, LoggerImpl, RotationPolicy};
use coupler::infrastructure::reporting::TracingReporter;
use coupler::{CouplingConfig, CouplingLoop};
use std::fs;
use tempfile::TempDir;
use tracing::{info, instrument};

#[test]
fn test_file_output_captures_coupling_step() {
    let temp_dir = TempDir::new().unwrap();

    let config = LogConfig {
        level: "info".to_string(),
        format: LogFormat::Json,
        log_dir: Some(temp_dir.path().to_path_buf()),
        enable_console: false,
        rotation: RotationPolicy::Never,
    };
    let logger = temp_env::with_var_unset("RUST_LOG", || LoggerImpl::init(&config)).unwrap();
    assert!(logger.has_file_output());

    info!(key = "value", "Test message with fields");
    assert_eq!(instrumented_add(5, 7), 12);

    let (primary, subordinate, registry) = coupled_pair(DemoParams::default());
    let coupling_config = CouplingConfig {
        max_iterations: 30,
        ..CouplingConfig::default()
    };
    let mut coupling = CouplingLoop::new(coupling_config, primary, subordinate, registry)
        .unwrap()
        .with_reporter(Box::new(TracingReporter));
    let report = coupling.run().unwrap();
    assert!(report.converged());

    // Dropping the guard flushes the non-blocking writer.
    drop(logger);

    let log_files: Vec<_> = fs::read_dir(temp_dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| {
            e.file_name()
                .to_str()
                .is_some_and(|s| s.contains("coupler.log"))
        })
        .collect();
    assert!(!log_files.is_empty(), "Log file should be created");

    let contents = fs::read_to_string(log_files[0].path()).unwrap();
    assert!(
        contents.contains("Test message with fields"),
        "Log should contain message with fields"
    );
    assert!(
        contents.contains("entering instrumented function"),
        "Log should contain instrumented function traces"
    );
    assert!(contents.contains("coupling_step"), "Log should carry the step span");
    assert!(
        contents.contains("coupler::history"),
        "Log should contain convergence history events"
    );
    assert!(contents.contains(report.status.code()));
}

#[instrument]
fn instrumented_add(a: i32, b: i32) -> i32 {
    info!("entering instrumented function");
    a + b
}
