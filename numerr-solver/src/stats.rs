#![forbid(unsafe_code)]

use std::fmt;
use std::time::Duration;

/// Counters kept across the queries of one solver.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SolverStats {
    pub queries: u64,
    /// Queries that asked for a model or bounds.
    pub query_counterexamples: u64,
    pub queries_valid: u64,
    pub queries_invalid: u64,
    pub query_time: Duration,
}

impl SolverStats {
    pub(crate) fn record_outcome(&mut self, has_solution: bool) {
        if has_solution {
            self.queries_invalid += 1;
        } else {
            self.queries_valid += 1;
        }
    }
}

impl fmt::Display for SolverStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "queries: {} (counterexamples: {}, valid: {}, invalid: {}) in {:.3}s",
            self.queries,
            self.query_counterexamples,
            self.queries_valid,
            self.queries_invalid,
            self.query_time.as_secs_f64()
        )
    }
}
