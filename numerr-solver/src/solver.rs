#![forbid(unsafe_code)]

use std::fmt;

use miette::Diagnostic;
use numerr_expr::{ArrayRef, ExprRef};
use thiserror::Error;

/// A query that did not produce an answer.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum SolverError {
    #[error("solver query timed out")]
    #[diagnostic(
        code(numerr::solver::timeout),
        help("raise `solver.timeout` in numerr.toml or pass a larger `--timeout`")
    )]
    Timeout,

    #[error("solver could not decide the query: {reason}")]
    #[diagnostic(code(numerr::solver::failure))]
    Failure { reason: String },
}

/// Outcome of the last solver invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolverRunStatus {
    SuccessSolvable,
    SuccessUnsolvable,
    Timeout,
    Failure,
}

impl SolverRunStatus {
    pub fn is_success(self) -> bool {
        matches!(
            self,
            SolverRunStatus::SuccessSolvable | SolverRunStatus::SuccessUnsolvable
        )
    }
}

impl fmt::Display for SolverRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SolverRunStatus::SuccessSolvable => "solvable",
            SolverRunStatus::SuccessUnsolvable => "unsolvable",
            SolverRunStatus::Timeout => "timeout",
            SolverRunStatus::Failure => "failure",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SatResult {
    Sat,
    Unsat,
    Unknown,
}

/// A numeral read back from a model: machine integer or exact rational.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Numeral {
    Int(i64),
    Rational { numerator: i64, denominator: i64 },
}

impl Numeral {
    pub fn as_int(self) -> Option<i64> {
        match self {
            Numeral::Int(v) => Some(v),
            Numeral::Rational { .. } => None,
        }
    }

    pub fn to_f64(self) -> f64 {
        match self {
            Numeral::Int(v) => v as f64,
            Numeral::Rational {
                numerator,
                denominator,
            } => numerator as f64 / denominator as f64,
        }
    }

    pub fn is_zero(self) -> bool {
        match self {
            Numeral::Int(v) => v == 0,
            Numeral::Rational { numerator, .. } => numerator == 0,
        }
    }
}

/// Upper bound of one objective, as `infinity * oo + value + epsilon * eps`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundTriple {
    pub infinity: Numeral,
    pub value: Numeral,
    pub epsilon: Numeral,
}

impl BoundTriple {
    pub fn finite(value: Numeral) -> Self {
        Self {
            infinity: Numeral::Int(0),
            value,
            epsilon: Numeral::Int(0),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionMode {
    /// Plain satisfiability.
    Check,
    /// Satisfiability plus maximization objectives.
    Optimize,
}

/// Multi-objective strategy of optimization sessions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Priority {
    Lexicographic,
    #[default]
    Pareto,
    Box,
}

impl Priority {
    pub fn name(self) -> &'static str {
        match self {
            Priority::Lexicographic => "lex",
            Priority::Pareto => "pareto",
            Priority::Box => "box",
        }
    }
}

/// Parameters applied to every session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SolverParams {
    /// `u32::MAX` means no timeout.
    pub timeout_ms: u32,
    pub priority: Priority,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            timeout_ms: timeout_millis(0.0),
            priority: Priority::Pareto,
        }
    }
}

/// Seconds to the solver's millisecond timeout. Zero means "no timeout".
///
/// # Panics
///
/// When `seconds` is negative or NaN.
pub fn timeout_millis(seconds: f64) -> u32 {
    assert!(seconds >= 0.0, "timeout must be >= 0");
    let ms = (seconds * 1000.0 + 0.5) as u32;
    if ms == 0 { u32::MAX } else { ms }
}

/// Capability surface of an SMT backend.
///
/// One session serves one query: it is opened, filled with assertions, checked, read back and
/// closed. Backends may cache translated sub-expressions within a session but must drop that
/// cache in [`SolverBackend::close_session`].
pub trait SolverBackend {
    fn name(&self) -> &'static str;

    fn open_session(&mut self, mode: SessionMode, params: &SolverParams);

    fn assert_constraint(&mut self, constraint: &ExprRef);

    /// Assert `not goal`.
    fn assert_negated_goal(&mut self, goal: &ExprRef);

    /// Add a real-valued maximization objective named after `object`, tied to the unsigned
    /// value of its first (at most eight) bytes.
    fn maximize(&mut self, object: &ArrayRef);

    fn check(&mut self) -> SatResult;

    /// Reason for the last [`SatResult::Unknown`].
    fn reason_unknown(&mut self) -> String;

    /// Model value of byte `offset` of `array`, after a satisfiable check.
    fn model_value(&mut self, array: &ArrayRef, offset: u32) -> Option<Numeral>;

    /// Upper bound of objective `index`, after a satisfiable optimization.
    fn upper_bound(&mut self, index: usize) -> Option<BoundTriple>;

    fn close_session(&mut self);
}

impl<B: SolverBackend + ?Sized> SolverBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn open_session(&mut self, mode: SessionMode, params: &SolverParams) {
        (**self).open_session(mode, params)
    }

    fn assert_constraint(&mut self, constraint: &ExprRef) {
        (**self).assert_constraint(constraint)
    }

    fn assert_negated_goal(&mut self, goal: &ExprRef) {
        (**self).assert_negated_goal(goal)
    }

    fn maximize(&mut self, object: &ArrayRef) {
        (**self).maximize(object)
    }

    fn check(&mut self) -> SatResult {
        (**self).check()
    }

    fn reason_unknown(&mut self) -> String {
        (**self).reason_unknown()
    }

    fn model_value(&mut self, array: &ArrayRef, offset: u32) -> Option<Numeral> {
        (**self).model_value(array, offset)
    }

    fn upper_bound(&mut self, index: usize) -> Option<BoundTriple> {
        (**self).upper_bound(index)
    }

    fn close_session(&mut self) {
        (**self).close_session()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_seconds_means_no_timeout() {
        assert_eq!(timeout_millis(0.0), u32::MAX);
        assert_eq!(timeout_millis(0.0001), u32::MAX);
        assert_eq!(timeout_millis(0.001), 1);
        assert_eq!(timeout_millis(2.5), 2500);
    }

    #[test]
    #[should_panic(expected = "timeout must be >= 0")]
    fn negative_timeouts_are_rejected() {
        timeout_millis(-1.0);
    }

    #[test]
    fn numerals_convert_to_floats() {
        assert_eq!(Numeral::Int(-3).to_f64(), -3.0);
        let third = Numeral::Rational {
            numerator: 1,
            denominator: 3,
        };
        assert!((third.to_f64() - 1.0 / 3.0).abs() < f64::EPSILON);
        assert_eq!(third.as_int(), None);
        assert!(Numeral::Int(0).is_zero());
    }

    #[test]
    fn default_params_use_pareto_without_timeout() {
        let p = SolverParams::default();
        assert_eq!(p.timeout_ms, u32::MAX);
        assert_eq!(p.priority.name(), "pareto");
    }
}
