//! Core data types for the octowatt electricity tracker.

pub mod cost;
pub mod demand;
pub mod readings;
pub mod tariff;

pub use cost::*;
pub use demand::*;
pub use readings::*;
pub use tariff::*;
