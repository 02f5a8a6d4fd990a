//! Evaluator dispatch engine
//!
//! Resolves evaluator configurations, routes each requested measure to the
//! evaluator computing it and renders the results.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod evaluators;
pub mod lagged;
pub mod prototext;
pub mod registry;

pub use config::{DatasetCatalog, DatasetEvaluator, EvaluatorConfigCache};
pub use dispatch::{EvaluationResult, check, evaluate, evaluate_reference};
pub use error::{EvalError, Result};
pub use evaluators::Measures;
