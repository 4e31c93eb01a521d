//! Core domain models for Pipeline
//!
//! This module defines the job templates, matrix expansion, run conditions
//! and the result types produced by a pipeline run.

pub mod config;
pub mod pipeline;
pub mod job;
pub mod matrix;
pub mod condition;
pub mod error;
pub mod state;

pub use pipeline::*;
pub use job::*;
pub use error::*;
pub use state::*;
pub use condition::Condition;
pub use matrix::MatrixExpander;
