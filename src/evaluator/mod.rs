// src/evaluator/mod.rs — Response parsing and metric scoring

pub mod parser;
pub mod scorer;
