#![forbid(unsafe_code)]

use std::collections::HashMap;

use crate::array::ArrayRef;
use crate::expr::{Expr, ExprKind, ExprRef};

/// Concrete bytes for a set of symbolic arrays.
///
/// Bytes past the end of a binding read as zero.
#[derive(Clone, Debug, Default)]
pub struct Assignment {
    bindings: HashMap<ArrayRef, Vec<u8>>,
}

impl Assignment {
    pub fn new(objects: &[ArrayRef], values: &[Vec<u8>]) -> Self {
        assert_eq!(
            objects.len(),
            values.len(),
            "one value buffer per object is required"
        );
        let bindings = objects
            .iter()
            .cloned()
            .zip(values.iter().cloned())
            .collect();
        Self { bindings }
    }

    pub fn bind(&mut self, array: ArrayRef, bytes: Vec<u8>) {
        self.bindings.insert(array, bytes);
    }

    pub fn get(&self, array: &ArrayRef) -> Option<&[u8]> {
        self.bindings.get(array).map(|b| b.as_slice())
    }

    /// Substitute bound reads by constants and fold.
    ///
    /// Reads of unbound arrays (or at symbolic indices) stay symbolic.
    pub fn evaluate(&self, expr: &ExprRef) -> ExprRef {
        let mut memo: HashMap<ExprRef, ExprRef> = HashMap::new();
        self.eval(expr, &mut memo)
    }

    pub fn satisfies(&self, constraints: &[ExprRef]) -> bool {
        constraints.iter().all(|c| self.evaluate(c).is_true())
    }

    fn eval(&self, expr: &ExprRef, memo: &mut HashMap<ExprRef, ExprRef>) -> ExprRef {
        if let Some(done) = memo.get(expr) {
            return done.clone();
        }
        let out = match expr.kind() {
            ExprKind::Constant(_) => expr.clone(),
            ExprKind::Read { array, index } => {
                let index = self.eval(index, memo);
                match (self.bindings.get(array), index.as_constant()) {
                    (Some(bytes), Some(i)) => {
                        let byte = usize::try_from(i)
                            .ok()
                            .and_then(|i| bytes.get(i))
                            .copied()
                            .unwrap_or(0);
                        Expr::constant(byte as u64, array.range)
                    }
                    _ => Expr::read(array, index),
                }
            }
            ExprKind::Concat(l, r) => {
                let l = self.eval(l, memo);
                let r = self.eval(r, memo);
                Expr::concat(l, r)
            }
            ExprKind::Extract { expr: e, offset } => {
                let e = self.eval(e, memo);
                Expr::extract(e, *offset, expr.width())
            }
            ExprKind::ZExt(e) => {
                let e = self.eval(e, memo);
                Expr::zext(e, expr.width())
            }
            ExprKind::SExt(e) => {
                let e = self.eval(e, memo);
                Expr::sext(e, expr.width())
            }
            ExprKind::Not(e) => {
                let e = self.eval(e, memo);
                Expr::not(e)
            }
            ExprKind::Binary(op, l, r) => {
                let l = self.eval(l, memo);
                let r = self.eval(r, memo);
                Expr::binary(*op, l, r)
            }
            ExprKind::Cmp(op, l, r) => {
                let l = self.eval(l, memo);
                let r = self.eval(r, memo);
                Expr::cmp(*op, l, r)
            }
        };
        memo.insert(expr.clone(), out.clone());
        out
    }
}
