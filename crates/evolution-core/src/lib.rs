//! Core types for the registry evolution pipeline.
//!
//! Domain keys, the denormalized row, throughput normalization, the error
//! type and run configuration. No I/O beyond reading a config file.

pub mod error;
pub mod models;
pub mod settings;
pub mod traffic;

pub use error::{EvolutionError, Result};
