//! In-memory collaborators for the coupled toy problem driven by `coupler run`.

pub mod coupled_pair;

pub use coupled_pair::{
    coupled_pair, DemoParams, DemoPrimary, DemoRegistry, DemoSubordinate, SubordinateState,
};
