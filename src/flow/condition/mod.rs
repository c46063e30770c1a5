// SPDX-License-Identifier: MIT

//! Condition evaluation for conditional edges
//!
//! Branch conditions are small expressions over the JSON view of a run state:
//! - `policy_decision == 'retry'`
//! - `retry_count >= 3`
//! - `(policy_decision == 'approve' or policy_decision == 'reject') and not human_approval`

mod ast;
mod evaluator;
mod parser;

pub use ast::{CompareOp, Expression, Literal};
pub use evaluator::{evaluate, lookup};
pub use parser::{parse, ConditionError};
