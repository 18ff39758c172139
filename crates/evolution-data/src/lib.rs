//! Data layer of the registry evolution pipeline.
//!
//! Loads monthly dumps and the static registries, subsets rows to each
//! hypergiant, and maintains the per-hypergiant history and ledgers.

pub mod aggregator;
pub mod cdn;
pub mod filter;
pub mod reader;
pub mod registry;

pub use evolution_core as core;
