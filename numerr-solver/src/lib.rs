#![forbid(unsafe_code)]

mod decode;
mod error_solver;
mod exhaustive;
#[cfg(any(test, feature = "testing"))]
pub mod scripted;
mod smtlib;
mod solver;
mod stats;

#[cfg(feature = "z3")]
pub mod z3_backend;

pub use decode::{OptimalBound, decode_bound, decode_model_bytes};
pub use error_solver::{ErrorSolver, classify_unknown};
pub use exhaustive::{DEFAULT_MAX_ASSIGNMENTS, ExhaustiveBackend};
pub use smtlib::benchmark;
pub use solver::{
    BoundTriple, Numeral, Priority, SatResult, SessionMode, SolverBackend, SolverError,
    SolverParams, SolverRunStatus, timeout_millis,
};
pub use stats::SolverStats;
