//! Application layer: the coupling-loop orchestrator.

pub mod coupling_loop;

pub use coupling_loop::CouplingLoop;
