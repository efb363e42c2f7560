//! Domain layer for the coupling engine
//!
//! Value objects, collaborator ports and errors. Nothing here performs a solve.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{ConfigError, CouplingError, CouplingResult};
