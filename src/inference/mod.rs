//! Inference module: evaluation of a trained network over a batch provider

pub mod evaluator;

pub use evaluator::{evaluate, evaluate_with_progress, EvaluationResult};
