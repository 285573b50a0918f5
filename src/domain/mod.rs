//! Core domain types and logic.

pub mod price;
pub mod returns;
pub mod optimizer;
pub mod frontier;
pub mod evaluator;
pub mod benchmark;
pub mod analysis;
pub mod universe;
pub mod config_validation;
pub mod error;
