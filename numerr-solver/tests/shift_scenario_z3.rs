#![cfg(feature = "z3")]

use numerr_expr::{Array, Expr, ExprRef, INT8, INT32, INT64, Query, read_value};
use numerr_solver::z3_backend::Z3Backend;
use numerr_solver::{ErrorSolver, SolverRunStatus};

fn shift_query(constraints: &[ExprRef]) -> Query<'_> {
    let shift = Array::new("shift", 4);
    let s = read_value(&shift, 0, INT32);
    let goal = Expr::eq(Expr::shl(Expr::constant(2, INT32), s), Expr::zero(INT32));
    Query::new(constraints, goal)
}

#[test]
fn shifts_past_the_width_yield_zero() {
    let shift = Array::new("shift", 4);
    let s = read_value(&shift, 0, INT32);
    let constraints = vec![Expr::ule(Expr::constant(32, INT32), s)];
    let q = shift_query(&constraints);

    let mut solver = ErrorSolver::new(Z3Backend::new());
    solver.set_core_solver_timeout(10.0);
    assert_eq!(solver.compute_truth(&q), Ok(true));
    assert_eq!(solver.operation_status(), SolverRunStatus::SuccessUnsolvable);
}

#[test]
fn small_shifts_have_counterexamples() {
    let shift = Array::new("shift", 4);
    let s = read_value(&shift, 0, INT32);
    let constraints = vec![Expr::ult(s, Expr::constant(31, INT32))];
    let q = shift_query(&constraints);

    let mut solver = ErrorSolver::new(Z3Backend::new());
    assert_eq!(solver.compute_truth(&q), Ok(false));

    let values = solver
        .compute_initial_values(&q, &[shift])
        .unwrap()
        .expect("counterexample");
    let amount = u32::from_le_bytes([values[0][0], values[0][1], values[0][2], values[0][3]]);
    assert!(amount < 31);
}

#[test]
fn optimization_bounds_follow_the_constraints() {
    let err = Array::new("_unspecified_error_x", 1);
    let e = Expr::read(&err, Expr::zero(INT32));
    let constraints = vec![Expr::ule(e, Expr::constant(3, INT8))];
    let q = Query::new(&constraints, Expr::bool(false));

    let mut solver = ErrorSolver::new(Z3Backend::new());
    solver.set_core_solver_timeout(10.0);
    let bounds = solver
        .compute_optimal_values(&q, &[err])
        .unwrap()
        .expect("satisfiable");
    assert_eq!(bounds.len(), 1);
    assert_eq!(bounds[0].value, 3.0);
    assert!(bounds[0].is_exact());
}

#[test]
fn optimization_reads_every_byte_of_wide_objects() {
    let err = Array::new("_unspecified_error_y", 8);
    let e = read_value(&err, 0, INT64);
    let constraints = vec![Expr::ult(e, Expr::constant(1000, INT64))];
    let q = Query::new(&constraints, Expr::bool(false));

    let mut solver = ErrorSolver::new(Z3Backend::new());
    solver.set_core_solver_timeout(10.0);
    let bounds = solver
        .compute_optimal_values(&q, &[err])
        .unwrap()
        .expect("satisfiable");
    assert_eq!(bounds[0].value, 999.0);
    assert!(bounds[0].is_exact());
}
