#![forbid(unsafe_code)]

use numerr_expr::{Expr, ExprRef, INT8};
use numerr_ir::Opcode;

/// The error every constant and every untracked value carries.
pub fn zero_error() -> ExprRef {
    Expr::zero(INT8)
}

/// Zero-extend the narrower of `a` and `b` so both share the wider width.
pub fn widen_to_common(a: ExprRef, b: ExprRef) -> (ExprRef, ExprRef) {
    let width = a.width().max(b.width());
    (Expr::zext(a, width), Expr::zext(b, width))
}

/// How the error of an instruction's result is derived from its operands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropagationRule {
    Add,
    Sub,
    Mul,
    UDiv,
    SDiv,
    /// Not modeled: inherit the first tracked operand error.
    Default,
}

impl PropagationRule {
    pub fn for_opcode(opcode: Opcode) -> Self {
        match opcode {
            Opcode::Add => PropagationRule::Add,
            Opcode::Sub => PropagationRule::Sub,
            Opcode::Mul => PropagationRule::Mul,
            Opcode::UDiv => PropagationRule::UDiv,
            Opcode::SDiv => PropagationRule::SDiv,
            _ => PropagationRule::Default,
        }
    }

    /// Operands the rule materializes errors for.
    pub fn arity(self) -> usize {
        match self {
            PropagationRule::Default => 0,
            _ => 2,
        }
    }

    /// Combine two operand errors into the result error.
    ///
    /// `errors[i]` belongs to `values[i]`. Never called for [`PropagationRule::Default`].
    pub fn combine(self, result: &ExprRef, errors: &[ExprRef], values: &[ExprRef]) -> ExprRef {
        assert!(
            errors.len() >= 2 && values.len() >= 2,
            "{self:?} propagation needs two operands"
        );
        match self {
            PropagationRule::Add => {
                let sum = weighted_sum(errors, values);
                match result.as_constant() {
                    Some(c) if c != 0 => divide(sum, result.clone()),
                    _ => sum,
                }
            }
            PropagationRule::Sub => divide(weighted_sum(errors, values), result.clone()),
            PropagationRule::Mul | PropagationRule::UDiv | PropagationRule::SDiv => {
                let left = extend_to_operand(&errors[0], &values[0]);
                let right = extend_to_operand(&errors[1], &values[1]);
                let (left, right) = widen_to_common(left, right);
                Expr::add(left, right)
            }
            PropagationRule::Default => {
                unreachable!("the default rule does not combine operand errors")
            }
        }
    }
}

fn extend_to_operand(error: &ExprRef, value: &ExprRef) -> ExprRef {
    if error.width() < value.width() {
        Expr::zext(error.clone(), value.width())
    } else {
        error.clone()
    }
}

// a*da + b*db
fn weighted_sum(errors: &[ExprRef], values: &[ExprRef]) -> ExprRef {
    let product = |error: &ExprRef, value: &ExprRef| {
        let (e, v) = widen_to_common(error.clone(), value.clone());
        Expr::mul(e, v)
    };
    let left = product(&errors[0], &values[0]);
    let right = product(&errors[1], &values[1]);
    let (left, right) = widen_to_common(left, right);
    Expr::add(left, right)
}

fn divide(numerator: ExprRef, denominator: ExprRef) -> ExprRef {
    let (n, d) = widen_to_common(numerator, denominator);
    Expr::udiv(n, d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use numerr_expr::{Array, ExprKind, INT16, INT32, read_value};

    fn symbolic(name: &str, width: u32) -> ExprRef {
        read_value(&Array::new(name, width / 8), 0, width)
    }

    #[test]
    fn opcodes_map_to_rules() {
        assert_eq!(PropagationRule::for_opcode(Opcode::Add), PropagationRule::Add);
        assert_eq!(PropagationRule::for_opcode(Opcode::SDiv), PropagationRule::SDiv);
        assert_eq!(PropagationRule::for_opcode(Opcode::Shl), PropagationRule::Default);
        assert_eq!(PropagationRule::for_opcode(Opcode::Load), PropagationRule::Default);
        assert_eq!(PropagationRule::Default.arity(), 0);
    }

    #[test]
    fn widening_never_truncates() {
        let narrow = Expr::constant(0xAB, INT8);
        let wide = symbolic("w", INT32);
        let (a, b) = widen_to_common(narrow, wide.clone());
        assert_eq!(a.width(), INT32);
        assert_eq!(a.as_constant(), Some(0xAB));
        assert_eq!(b, wide);
    }

    #[test]
    fn add_divides_by_nonzero_constant_result() {
        let a = symbolic("a", INT32);
        let b = symbolic("b", INT32);
        let ea = Expr::read(&Array::new("ea", 8), Expr::zero(INT32));
        let eb = zero_error();
        let result = Expr::constant(4, INT32);

        let err = PropagationRule::Add.combine(&result, &[ea, eb], &[a, b]);
        assert_eq!(err.width(), INT32);
        match err.kind() {
            ExprKind::Binary(numerr_expr::BinOp::UDiv, _, d) => {
                assert_eq!(d.as_constant(), Some(4))
            }
            other => panic!("expected a division, got {other:?}"),
        }
    }

    #[test]
    fn add_keeps_sum_for_zero_or_symbolic_result() {
        let a = symbolic("a", INT32);
        let b = symbolic("b", INT32);
        let ea = Expr::read(&Array::new("ea", 8), Expr::zero(INT32));
        let errors = [ea, zero_error()];
        let values = [a.clone(), b.clone()];

        let zero = PropagationRule::Add.combine(&Expr::zero(INT32), &errors, &values);
        assert!(matches!(zero.kind(), ExprKind::Binary(numerr_expr::BinOp::Add, _, _)));

        let sym = PropagationRule::Add.combine(&Expr::add(a, b), &errors, &values);
        assert!(matches!(sym.kind(), ExprKind::Binary(numerr_expr::BinOp::Add, _, _)));
    }

    #[test]
    fn sub_always_divides_by_result() {
        let a = symbolic("a", INT16);
        let b = symbolic("b", INT16);
        let result = Expr::sub(a.clone(), b.clone());
        let ea = Expr::read(&Array::new("ea", 8), Expr::zero(INT32));
        let err = PropagationRule::Sub.combine(&result, &[ea.clone(), ea], &[a, b]);
        match err.kind() {
            ExprKind::Binary(numerr_expr::BinOp::UDiv, _, d) => assert_eq!(*d, result),
            other => panic!("expected a division, got {other:?}"),
        }
    }

    #[test]
    fn mul_adds_extended_errors() {
        let a = symbolic("a", INT32);
        let b = symbolic("b", INT32);
        let ea = Expr::read(&Array::new("ea", 8), Expr::zero(INT32));
        let eb = Expr::read(&Array::new("eb", 8), Expr::zero(INT32));
        let err = PropagationRule::Mul.combine(&Expr::mul(a.clone(), b.clone()), &[ea.clone(), eb.clone()], &[a, b]);
        assert_eq!(
            err,
            Expr::add(Expr::zext(ea, INT32), Expr::zext(eb, INT32))
        );
    }

    #[test]
    fn constant_operands_give_constant_errors() {
        let a = Expr::constant(3, INT32);
        let b = Expr::constant(5, INT32);
        let err = PropagationRule::UDiv.combine(&Expr::udiv(a.clone(), b.clone()), &[zero_error(), zero_error()], &[a, b]);
        assert_eq!(err.as_constant(), Some(0));
        assert_eq!(err.width(), INT32);
    }
}
