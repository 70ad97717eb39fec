// src/engine/mod.rs

//! Job orchestration.
//!
//! - [`graph`] describes the static dataflow: which role feeds which, and
//!   with what ship strategy.
//! - [`job`] wires the channels, spawns one worker per role and partition,
//!   and drives Sync until the iteration terminates.

pub mod graph;
pub mod job;

pub use graph::{JobEdge, JobGraph};
pub use job::{criterion_from_config, IterationJob, JobInputs, JobReport, JobStages};
