// src/condition/mod.rs

//! Skip conditions.
//!
//! - [`expr`] parses `skip_if` strings into an AST once, at graph build.
//! - [`eval`] holds the [`ConditionEvaluator`] seam the orchestrator calls
//!   and the default tree-walking implementation.

pub mod eval;
pub mod expr;

pub use eval::{ConditionContext, ConditionEvaluator, ExprEvaluator};
pub use expr::{CompareOp, Expr, Field, SkipCondition, Value};
