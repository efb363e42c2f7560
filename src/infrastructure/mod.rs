//! Infrastructure layer module
//!
//! Adapters around the engine that are not part of the coupling algorithm:
//! - Configuration management
//! - Logging infrastructure
//! - Convergence history reporting

pub mod config;
pub mod logging;
pub mod reporting;
