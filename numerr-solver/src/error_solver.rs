#![forbid(unsafe_code)]

use std::time::Instant;

use numerr_expr::{ArrayRef, Assignment, ExprRef, Query, find_symbolic_objects};
use tracing::{debug, error, warn};

use crate::decode::{OptimalBound, decode_bound, decode_model_bytes};
use crate::smtlib;
use crate::solver::{
    Numeral, SatResult, SessionMode, SolverBackend, SolverError, SolverParams, SolverRunStatus,
    timeout_millis,
};
use crate::stats::SolverStats;

/// Map the reason of an `Unknown` answer to a run status.
///
/// # Panics
///
/// On any reason other than `timeout`, `canceled` or `unknown`.
pub fn classify_unknown(reason: &str) -> SolverRunStatus {
    match reason {
        "timeout" | "canceled" => SolverRunStatus::Timeout,
        "unknown" => SolverRunStatus::Failure,
        other => {
            error!(reason = other, "unexpected solver failure");
            panic!("unexpected solver failure, reason is \"{other}\"");
        }
    }
}

/// Validity and optimization queries over a [`SolverBackend`].
///
/// Every query runs in a fresh backend session. `Ok` carries the answer; a query the backend
/// could not decide is an `Err` and leaves [`ErrorSolver::operation_status`] at
/// `Timeout` or `Failure`.
pub struct ErrorSolver<B> {
    backend: B,
    params: SolverParams,
    stats: SolverStats,
    status: SolverRunStatus,
}

impl<B: SolverBackend> ErrorSolver<B> {
    pub fn new(backend: B) -> Self {
        Self::with_params(backend, SolverParams::default())
    }

    pub fn with_params(backend: B, params: SolverParams) -> Self {
        Self {
            backend,
            params,
            stats: SolverStats::default(),
            status: SolverRunStatus::Failure,
        }
    }

    /// Timeout for subsequent queries; zero disables it.
    ///
    /// # Panics
    ///
    /// When `seconds` is negative.
    pub fn set_core_solver_timeout(&mut self, seconds: f64) {
        self.params.timeout_ms = timeout_millis(seconds);
    }

    pub fn params(&self) -> &SolverParams {
        &self.params
    }

    pub fn stats(&self) -> &SolverStats {
        &self.stats
    }

    pub fn operation_status(&self) -> SolverRunStatus {
        self.status
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// The query rendered as an SMT-LIB benchmark.
    pub fn constraint_log(&self, query: &Query<'_>) -> String {
        smtlib::benchmark(query)
    }

    /// Whether the constraints imply the goal.
    pub fn compute_truth(&mut self, query: &Query<'_>) -> Result<bool, SolverError> {
        let (has_solution, _) = self.run_check(query, None)?;
        Ok(!has_solution)
    }

    /// A value the goal can take under the constraints.
    ///
    /// # Panics
    ///
    /// When the constraints are unsatisfiable.
    pub fn compute_value(&mut self, query: &Query<'_>) -> Result<ExprRef, SolverError> {
        let objects = find_symbolic_objects([&query.expr]);
        let values = self
            .compute_initial_values(&query.with_false(), &objects)?
            .unwrap_or_else(|| panic!("state has invalid constraint set"));
        let assignment = Assignment::new(&objects, &values);
        Ok(assignment.evaluate(&query.expr))
    }

    /// A counterexample to the goal: one byte buffer per object, or `None` if the goal is valid.
    pub fn compute_initial_values(
        &mut self,
        query: &Query<'_>,
        objects: &[ArrayRef],
    ) -> Result<Option<Vec<Vec<u8>>>, SolverError> {
        let (has_solution, values) = self.run_check(query, Some(objects))?;
        Ok(has_solution.then_some(values))
    }

    /// Maximal value of each object's real-valued symbol under the constraints, or `None` if
    /// the constraints are unsatisfiable.
    pub fn compute_optimal_values(
        &mut self,
        query: &Query<'_>,
        objects: &[ArrayRef],
    ) -> Result<Option<Vec<OptimalBound>>, SolverError> {
        let started = Instant::now();
        self.status = SolverRunStatus::Failure;
        self.backend.open_session(SessionMode::Optimize, &self.params);
        for constraint in query.constraints {
            self.backend.assert_constraint(constraint);
        }
        self.stats.queries += 1;
        self.stats.query_counterexamples += 1;
        for array in objects {
            self.backend.maximize(array);
        }
        debug!(backend = self.backend.name(), objectives = objects.len(), "optimize");

        let answer = self.backend.check();
        let mut bounds = Vec::new();
        self.status = self.classify(answer);
        if self.status == SolverRunStatus::SuccessSolvable {
            bounds.reserve(objects.len());
            for (idx, array) in objects.iter().enumerate() {
                let triple = self.backend.upper_bound(idx).unwrap_or_else(|| {
                    panic!("no upper bound for objective `{}`", array.name)
                });
                bounds.push(decode_bound(triple));
            }
        }
        self.backend.close_session();
        self.finish(started)?;
        Ok((self.status == SolverRunStatus::SuccessSolvable).then_some(bounds))
    }

    fn run_check(
        &mut self,
        query: &Query<'_>,
        objects: Option<&[ArrayRef]>,
    ) -> Result<(bool, Vec<Vec<u8>>), SolverError> {
        let started = Instant::now();
        self.status = SolverRunStatus::Failure;
        self.backend.open_session(SessionMode::Check, &self.params);
        for constraint in query.constraints {
            self.backend.assert_constraint(constraint);
        }
        self.stats.queries += 1;
        if objects.is_some() {
            self.stats.query_counterexamples += 1;
        }
        self.backend.assert_negated_goal(&query.expr);
        debug!(
            backend = self.backend.name(),
            constraints = query.constraints.len(),
            "check"
        );

        let answer = self.backend.check();
        self.status = self.classify(answer);
        let mut values = Vec::new();
        if self.status == SolverRunStatus::SuccessSolvable {
            if let Some(objects) = objects {
                values.reserve(objects.len());
                for array in objects {
                    values.push(self.read_object(array));
                }
            }
        }
        self.backend.close_session();
        self.finish(started)?;
        Ok((self.status == SolverRunStatus::SuccessSolvable, values))
    }

    // Integer models are read byte by byte; a rational model of byte 0 stands for the whole
    // object as a double.
    fn read_object(&mut self, array: &ArrayRef) -> Vec<u8> {
        let first = self
            .backend
            .model_value(array, 0)
            .unwrap_or_else(|| panic!("failed to evaluate model for `{}`", array.name));
        let mut data = decode_model_bytes(first).to_vec();
        if first.as_int().is_some() {
            data.resize(data.len().max(array.size as usize), 0);
            data[1..].fill(0);
            for offset in 1..array.size {
                if let Some(Numeral::Int(v)) = self.backend.model_value(array, offset) {
                    data[offset as usize] = v as u8;
                }
            }
        }
        data
    }

    fn classify(&mut self, answer: SatResult) -> SolverRunStatus {
        match answer {
            SatResult::Sat => SolverRunStatus::SuccessSolvable,
            SatResult::Unsat => SolverRunStatus::SuccessUnsolvable,
            SatResult::Unknown => classify_unknown(&self.backend.reason_unknown()),
        }
    }

    fn finish(&mut self, started: Instant) -> Result<(), SolverError> {
        self.stats.query_time += started.elapsed();
        match self.status {
            SolverRunStatus::SuccessSolvable => {
                self.stats.record_outcome(true);
                Ok(())
            }
            SolverRunStatus::SuccessUnsolvable => {
                self.stats.record_outcome(false);
                Ok(())
            }
            SolverRunStatus::Timeout => {
                warn!(backend = self.backend.name(), "query timed out");
                Err(SolverError::Timeout)
            }
            SolverRunStatus::Failure => {
                warn!(backend = self.backend.name(), "query failed");
                Err(SolverError::Failure {
                    reason: "unknown".to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::{BackendCall, ScriptedBackend};
    use crate::solver::BoundTriple;
    use numerr_expr::{Array, Expr, INT32, INT8};

    fn byte(name: &str) -> (ArrayRef, ExprRef) {
        let a = Array::new(name, 1);
        let r = Expr::read(&a, Expr::zero(INT32));
        (a, r)
    }

    #[test]
    fn timeout_reasons_classify_as_timeout() {
        assert_eq!(classify_unknown("timeout"), SolverRunStatus::Timeout);
        assert_eq!(classify_unknown("canceled"), SolverRunStatus::Timeout);
        assert_eq!(classify_unknown("unknown"), SolverRunStatus::Failure);
    }

    #[test]
    #[should_panic(expected = "unexpected solver failure")]
    fn other_reasons_are_fatal() {
        classify_unknown("(incomplete quantifiers)");
    }

    #[test]
    fn unknown_answers_become_errors() {
        let (_, x) = byte("x");
        let constraints: Vec<ExprRef> = Vec::new();
        let q = Query::new(&constraints, Expr::eq(x, Expr::zero(INT8)));

        let timeout = ScriptedBackend::new()
            .answer(SatResult::Unknown)
            .reason("timeout");
        let mut solver = ErrorSolver::new(timeout);
        assert_eq!(solver.compute_truth(&q), Err(SolverError::Timeout));
        assert_eq!(solver.operation_status(), SolverRunStatus::Timeout);

        let failure = ScriptedBackend::new()
            .answer(SatResult::Unknown)
            .reason("unknown");
        let mut solver = ErrorSolver::new(failure);
        assert!(matches!(solver.compute_truth(&q), Err(SolverError::Failure { .. })));
        assert_eq!(solver.operation_status(), SolverRunStatus::Failure);
        assert_eq!(solver.stats().queries, 1);
        assert_eq!(solver.stats().queries_valid + solver.stats().queries_invalid, 0);
    }

    #[test]
    fn check_sessions_follow_the_refutation_protocol() {
        let (_, x) = byte("x");
        let c = Expr::ult(x.clone(), Expr::constant(4, INT8));
        let constraints = vec![c.clone()];
        let goal = Expr::ult(x, Expr::constant(8, INT8));
        let q = Query::new(&constraints, goal.clone());

        let mut solver = ErrorSolver::new(ScriptedBackend::new().answer(SatResult::Unsat));
        solver.set_core_solver_timeout(1.5);
        assert_eq!(solver.compute_truth(&q), Ok(true));

        let calls = solver.backend().calls();
        assert_eq!(
            calls[0],
            BackendCall::Open(
                SessionMode::Check,
                SolverParams {
                    timeout_ms: 1500,
                    priority: crate::solver::Priority::Pareto
                }
            )
        );
        assert_eq!(calls[1], BackendCall::AssertConstraint(c.to_string()));
        assert_eq!(calls[2], BackendCall::AssertNegatedGoal(goal.to_string()));
        assert_eq!(calls[3], BackendCall::Check);
        assert_eq!(calls.last(), Some(&BackendCall::Close));
        assert_eq!(solver.stats().queries_valid, 1);
        assert_eq!(solver.stats().query_counterexamples, 0);
    }

    #[test]
    fn integer_and_rational_models_decode() {
        let (a, ra) = byte("a");
        let (b, _) = byte("b");
        let constraints: Vec<ExprRef> = Vec::new();
        let q = Query::new(&constraints, Expr::eq(ra, Expr::zero(INT8)));
        let backend = ScriptedBackend::new()
            .answer(SatResult::Sat)
            .model_value("a", 0, Numeral::Int(42))
            .model_value(
                "b",
                0,
                Numeral::Rational {
                    numerator: 1,
                    denominator: 3,
                },
            );
        let mut solver = ErrorSolver::new(backend);
        let values = solver
            .compute_initial_values(&q, &[a, b])
            .unwrap()
            .expect("counterexample");
        assert_eq!(values[0], vec![42, 0, 0, 0, 0, 0, 0, 0]);
        let third = f64::from_bits(u64::from_le_bytes(values[1].as_slice().try_into().unwrap()));
        assert!((third - 1.0 / 3.0).abs() < 1e-15);
        assert_eq!(solver.stats().queries_invalid, 1);
        assert_eq!(solver.stats().query_counterexamples, 1);
    }

    #[test]
    fn optimization_decodes_bounds_per_objective() {
        let (a, _) = byte("err_a");
        let (b, _) = byte("err_b");
        let constraints: Vec<ExprRef> = Vec::new();
        let q = Query::new(&constraints, Expr::bool(false));
        let backend = ScriptedBackend::new()
            .answer(SatResult::Sat)
            .bound(BoundTriple::finite(Numeral::Rational {
                numerator: 3,
                denominator: 4,
            }))
            .bound(BoundTriple {
                infinity: Numeral::Int(1),
                value: Numeral::Int(0),
                epsilon: Numeral::Int(0),
            });
        let mut solver = ErrorSolver::new(backend);
        let bounds = solver
            .compute_optimal_values(&q, &[a, b])
            .unwrap()
            .expect("satisfiable");
        assert_eq!(bounds[0].value, 0.75);
        assert!(bounds[0].is_exact());
        assert!(bounds[1].infinite);

        let calls = solver.backend().calls();
        assert!(matches!(calls[0], BackendCall::Open(SessionMode::Optimize, _)));
        assert!(calls.contains(&BackendCall::Maximize("err_a".to_string())));
        assert!(!calls.iter().any(|c| matches!(c, BackendCall::AssertNegatedGoal(_))));
    }

    #[test]
    fn status_resets_at_each_query() {
        let constraints: Vec<ExprRef> = Vec::new();
        let q = Query::new(&constraints, Expr::bool(true));
        let backend = ScriptedBackend::new()
            .answer(SatResult::Sat)
            .answer(SatResult::Unknown)
            .reason("unknown");
        let mut solver = ErrorSolver::new(backend);
        assert_eq!(solver.operation_status(), SolverRunStatus::Failure);
        assert_eq!(solver.compute_truth(&q), Ok(false));
        assert_eq!(solver.operation_status(), SolverRunStatus::SuccessSolvable);
        assert!(solver.compute_truth(&q).is_err());
        assert_eq!(solver.operation_status(), SolverRunStatus::Failure);
    }
}
