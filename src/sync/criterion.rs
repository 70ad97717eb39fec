// src/sync/criterion.rs

//! Pluggable convergence criteria.

use std::fmt;

use anyhow::{anyhow, Result};

use crate::types::{ConvergenceVerdict, Superstep};

/// Decides, from the aggregated delta statistic of a superstep, whether the
/// iteration has converged.
///
/// Implementations must be deterministic and free of side effects. An `Err`
/// is treated by the barrier as "not converged" for that superstep.
pub trait ConvergenceCriterion: Send + Sync {
    fn evaluate(&self, statistic: f64, superstep: Superstep) -> Result<ConvergenceVerdict>;
}

/// Converged once the summed absolute per-key delta drops below `epsilon`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct L1NormCriterion {
    pub epsilon: f64,
}

impl L1NormCriterion {
    pub fn new(epsilon: f64) -> Self {
        Self { epsilon }
    }
}

impl ConvergenceCriterion for L1NormCriterion {
    fn evaluate(&self, statistic: f64, _superstep: Superstep) -> Result<ConvergenceVerdict> {
        if !statistic.is_finite() {
            return Err(anyhow!("L1 norm statistic is not finite: {statistic}"));
        }
        if statistic < self.epsilon {
            Ok(ConvergenceVerdict::converged(format!(
                "L1 norm {statistic:e} below epsilon {:e}",
                self.epsilon
            )))
        } else {
            Ok(ConvergenceVerdict::not_converged())
        }
    }
}

/// Never converges; the superstep cap ends the job.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxSuperstepsOnly;

impl ConvergenceCriterion for MaxSuperstepsOnly {
    fn evaluate(&self, _statistic: f64, _superstep: Superstep) -> Result<ConvergenceVerdict> {
        Ok(ConvergenceVerdict::not_converged())
    }
}

/// Adapts a plain function into a criterion.
pub struct FnCriterion<F>(pub F);

impl<F> ConvergenceCriterion for FnCriterion<F>
where
    F: Fn(f64, Superstep) -> Result<ConvergenceVerdict> + Send + Sync,
{
    fn evaluate(&self, statistic: f64, superstep: Superstep) -> Result<ConvergenceVerdict> {
        (self.0)(statistic, superstep)
    }
}

impl<F> fmt::Debug for FnCriterion<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnCriterion")
    }
}
