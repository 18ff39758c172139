//! Pipeline driver and output document for pdb-evolution.

pub mod driver;
pub mod report;

pub use evolution_core as core;
pub use evolution_data as data;
