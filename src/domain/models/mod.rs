pub mod config;
pub mod history;
pub mod phase;
pub mod quantity;
pub mod report;
pub mod snapshot;
pub mod status;

pub use config::{AccelerationKind, CouplingConfig, LoggingConfig};
pub use history::{CustomQuantityHistory, ResidualNormHistory, ScalingCapture};
pub use phase::ExecPhase;
pub use quantity::{QuantityKind, QuantityRole, QuantitySet, TransformedQuantity};
pub use report::StepReport;
pub use snapshot::{SnapshotHandle, StateBlob};
pub use status::ConvergenceStatus;
