#![forbid(unsafe_code)]

//! SMT-LIB v2 rendering of validity queries.
//!
//! Width-1 expressions built from comparisons, boolean constants and boolean connectives are
//! printed as `Bool`; everything else is a bit-vector. Conversions go through `ite` one way and
//! `(= e #b1)` the other.

use std::fmt::Write as _;

use numerr_expr::{BOOL, BinOp, CmpOp, Expr, ExprKind, ExprRef, Query, find_symbolic_objects};

/// The query as a standalone benchmark asserting `constraints && !goal`.
pub fn benchmark(query: &Query<'_>) -> String {
    let mut out = String::new();
    out.push_str("; Emitted by numerr ErrorSolver::constraint_log\n");
    out.push_str("(set-info :status unknown)\n");

    let objects = find_symbolic_objects(query.constraints.iter().chain([&query.expr]));
    for array in &objects {
        let _ = writeln!(
            out,
            "(declare-fun {} () (Array (_ BitVec {}) (_ BitVec {})))",
            symbol(&array.name),
            array.domain,
            array.range
        );
    }
    for constraint in query.constraints {
        let _ = writeln!(out, "(assert {})", as_bool(constraint));
    }
    let _ = writeln!(out, "(assert (not {}))", as_bool(&query.expr));
    out.push_str("(check-sat)\n");
    out
}

/// Quote `name` unless it is a simple SMT-LIB symbol.
fn symbol(name: &str) -> String {
    let simple = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "~!@$%^&*_-+=<>.?/".contains(c));
    if simple {
        name.to_string()
    } else {
        format!("|{name}|")
    }
}

pub(crate) fn is_boolish(e: &Expr) -> bool {
    e.width() == BOOL
        && matches!(
            e.kind(),
            ExprKind::Constant(_)
                | ExprKind::Cmp(..)
                | ExprKind::Not(_)
                | ExprKind::Binary(BinOp::And | BinOp::Or | BinOp::Xor, _, _)
        )
}

fn as_bool(e: &ExprRef) -> String {
    assert_eq!(e.width(), BOOL, "expected a boolean, got {e}");
    if !is_boolish(e) {
        return format!("(= {} #b1)", as_bv(e));
    }
    match e.kind() {
        ExprKind::Constant(v) => String::from(if *v == 1 { "true" } else { "false" }),
        ExprKind::Not(inner) => format!("(not {})", as_bool(inner)),
        ExprKind::Binary(op, l, r) => {
            let name = match op {
                BinOp::And => "and",
                BinOp::Or => "or",
                _ => "xor",
            };
            format!("({name} {} {})", as_bool(l), as_bool(r))
        }
        ExprKind::Cmp(CmpOp::Eq, l, r) if l.width() == BOOL => {
            format!("(= {} {})", as_bool(l), as_bool(r))
        }
        ExprKind::Cmp(op, l, r) => {
            let name = match op {
                CmpOp::Eq => "=",
                CmpOp::Ult => "bvult",
                CmpOp::Ule => "bvule",
                CmpOp::Slt => "bvslt",
                CmpOp::Sle => "bvsle",
            };
            format!("({name} {} {})", as_bv(l), as_bv(r))
        }
        _ => unreachable!("boolish expressions are constants, comparisons or connectives"),
    }
}

fn as_bv(e: &ExprRef) -> String {
    if is_boolish(e) {
        return format!("(ite {} #b1 #b0)", as_bool(e));
    }
    let w = e.width();
    match e.kind() {
        ExprKind::Constant(v) => format!("(_ bv{v} {w})"),
        ExprKind::Read { array, index } => {
            format!("(select {} {})", symbol(&array.name), as_bv(index))
        }
        ExprKind::Concat(l, r) => format!("(concat {} {})", as_bv(l), as_bv(r)),
        ExprKind::Extract { expr, offset } => {
            format!("((_ extract {} {offset}) {})", offset + w - 1, as_bv(expr))
        }
        ExprKind::ZExt(inner) => {
            format!("((_ zero_extend {}) {})", w - inner.width(), as_bv(inner))
        }
        ExprKind::SExt(inner) => {
            format!("((_ sign_extend {}) {})", w - inner.width(), as_bv(inner))
        }
        ExprKind::Not(inner) => format!("(bvnot {})", as_bv(inner)),
        ExprKind::Binary(op, l, r) => format!("({} {} {})", bv_op(*op), as_bv(l), as_bv(r)),
        ExprKind::Cmp(..) => unreachable!("comparisons are boolean"),
    }
}

fn bv_op(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "bvadd",
        BinOp::Sub => "bvsub",
        BinOp::Mul => "bvmul",
        BinOp::UDiv => "bvudiv",
        BinOp::SDiv => "bvsdiv",
        BinOp::URem => "bvurem",
        BinOp::SRem => "bvsrem",
        BinOp::And => "bvand",
        BinOp::Or => "bvor",
        BinOp::Xor => "bvxor",
        BinOp::Shl => "bvshl",
        BinOp::LShr => "bvlshr",
        BinOp::AShr => "bvashr",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use numerr_expr::{Array, INT8, INT32, read_value};

    #[test]
    fn shift_query_renders_as_benchmark() {
        let shift = Array::new("shift", 4);
        let s = read_value(&shift, 0, INT32);
        let constraints = vec![Expr::ule(Expr::constant(32, INT32), s.clone())];
        let goal = Expr::eq(
            Expr::shl(Expr::constant(2, INT32), s),
            Expr::zero(INT32),
        );
        let log = benchmark(&Query::new(&constraints, goal));

        assert!(log.contains("(declare-fun shift () (Array (_ BitVec 32) (_ BitVec 8)))"));
        assert!(log.contains("(assert (bvule (_ bv32 32) (concat (select shift (_ bv3 32))"));
        assert!(log.contains("(assert (not (= (bvshl (_ bv2 32) "));
        assert!(log.ends_with("(check-sat)\n"));
        assert_eq!(log.matches("declare-fun").count(), 1);
    }

    #[test]
    fn odd_names_are_quoted() {
        assert_eq!(symbol("x"), "x");
        assert_eq!(symbol("_unspecified_error_x"), "_unspecified_error_x");
        assert_eq!(symbol("a b"), "|a b|");
        assert_eq!(symbol("0x"), "|0x|");
    }

    #[test]
    fn bits_and_booleans_convert() {
        let arr = Array::new("b", 1);
        let byte = Expr::read(&arr, Expr::zero(INT32));
        let low = Expr::extract(byte.clone(), 0, BOOL);
        assert_eq!(
            as_bool(&low),
            "(= ((_ extract 0 0) (select b (_ bv0 32))) #b1)"
        );

        let flag = Expr::ult(byte, Expr::constant(3, INT8));
        let widened = Expr::zext(flag, INT8);
        assert_eq!(
            as_bv(&widened),
            "((_ zero_extend 7) (ite (bvult (select b (_ bv0 32)) (_ bv3 8)) #b1 #b0))"
        );
        assert_eq!(as_bool(&Expr::bool(true)), "true");
    }
}
