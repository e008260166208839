#![forbid(unsafe_code)]

use std::fmt;

use crate::expr::{BOOL, Expr, ExprKind};

// kquery-flavoured s-expressions, e.g. `(Add w32 (ZExt w32 (Read w8 (w32 0) x)) (w32 1))`.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let w = self.width();
        match self.kind() {
            ExprKind::Constant(v) => {
                if w == BOOL {
                    write!(f, "{}", if *v == 1 { "true" } else { "false" })
                } else {
                    write!(f, "(w{w} {v})")
                }
            }
            ExprKind::Read { array, index } => write!(f, "(Read w{w} {index} {})", array.name),
            ExprKind::Concat(l, r) => write!(f, "(Concat w{w} {l} {r})"),
            ExprKind::Extract { expr, offset } => write!(f, "(Extract w{w} {offset} {expr})"),
            ExprKind::ZExt(e) => write!(f, "(ZExt w{w} {e})"),
            ExprKind::SExt(e) => write!(f, "(SExt w{w} {e})"),
            ExprKind::Not(e) => write!(f, "(Not w{w} {e})"),
            ExprKind::Binary(op, l, r) => write!(f, "({} w{w} {l} {r})", op.name()),
            ExprKind::Cmp(op, l, r) => write!(f, "({} {l} {r})", op.name()),
        }
    }
}

impl fmt::Display for crate::expr::ExprRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&**self, f)
    }
}

#[cfg(test)]
mod tests {
    use crate::array::Array;
    use crate::expr::{Expr, INT32, INT8};

    #[test]
    fn prints_nested_expressions() {
        let arr = Array::new("x", 4);
        let r = Expr::read(&arr, Expr::constant(0, INT32));
        let e = Expr::add(Expr::zext(r, INT32), Expr::constant(1, INT32));
        assert_eq!(
            e.to_string(),
            "(Add w32 (ZExt w32 (Read w8 (w32 0) x)) (w32 1))"
        );
        assert_eq!(Expr::bool(false).to_string(), "false");
        assert_eq!(
            Expr::ult(Expr::zero(INT8), Expr::read(&arr, Expr::zero(INT32))).to_string(),
            "(Ult (w8 0) (Read w8 (w32 0) x))"
        );
    }
}
