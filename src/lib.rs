// SPDX-License-Identifier: MIT

//! Governed generation of data-quality rules
//!
//! - `flow` - durable, resumable graph workflows with checkpoints
//! - `governor` - profiling, drift detection, rule validation and policy

pub mod flow;
pub mod governor;
