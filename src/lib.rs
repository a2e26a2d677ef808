// src/lib.rs — Library root for logeval

pub mod dataset;
pub mod evaluator;
pub mod infra;
pub mod prompt;
pub mod provider;
pub mod runner;
