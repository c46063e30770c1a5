// SPDX-License-Identifier: MIT

//! Graph-based workflow execution
//!
//! This module provides:
//! - `GraphBuilder` / `CompiledGraph` - node registry and validated edge table
//! - `WorkflowEngine` - checkpointed execution with suspend and resume
//! - Building blocks: `Node`, `Edge`, `Target`, `RunEvent`

mod builder;
mod executor;
mod types;

pub use builder::{CompiledGraph, GraphBuilder, DEFAULT_MAX_STEPS};
pub use executor::{Replay, RunSnapshot, WorkflowEngine};
pub use types::{Branch, Edge, FnNode, Node, NodeError, RouterFn, RunContext, RunEvent, Target};
