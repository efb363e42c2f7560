//! Collaborator implementations plugged into the coupling engine.

pub mod demo;
