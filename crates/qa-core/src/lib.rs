//! Shared types, configuration, and collaborator traits for quanta.
//!
//! This crate holds everything the capture side and the output side agree on:
//! the per-tick frame and feature types, the session configuration, and the
//! traits the tick loop is generic over.

pub mod config;
pub mod error;
pub mod frame;
pub mod quantum;
pub mod traits;

pub use config::SessionConfig;
pub use error::CoreError;
pub use frame::{AudioFeatures, SpectralFrame};
pub use quantum::QuantumState;
