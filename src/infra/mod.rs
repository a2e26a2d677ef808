// src/infra/mod.rs — Infrastructure: config, errors, logging, artifact storage

pub mod config;
pub mod errors;
pub mod logger;
pub mod store;
