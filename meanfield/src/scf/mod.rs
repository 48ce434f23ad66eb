//! Self-consistent-field solvers.

mod oda;
mod plain;

pub use oda::{find_min_cubic, OdaScfSolver};
pub use plain::PlainScfSolver;

/// The outcome of an SCF run.
///
/// Exhausting the iteration budget is a reported result, not an error: the
/// caller decides whether to retry with more iterations, switch solver or
/// give up. Fatal conditions travel through
/// [`MeanFieldError`](crate::MeanFieldError) instead.
#[derive(Debug, Clone, Copy, PartialEq)]
#[must_use = "non-convergence must be handled explicitly"]
pub struct ScfConvergence {
    /// Whether the convergence criterion was met.
    pub converged: bool,
    /// The number of iterations performed.
    pub iterations: usize,
    /// The last convergence measure (commutator norm for the plain solver,
    /// density-matrix step distance for ODA).
    pub residual: f64,
}
