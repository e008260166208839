#![forbid(unsafe_code)]

use std::collections::HashSet;

use crate::array::ArrayRef;
use crate::expr::{Expr, ExprKind, ExprRef};

/// Validity question: do `constraints` imply `expr`?
#[derive(Clone, Debug)]
pub struct Query<'a> {
    pub constraints: &'a [ExprRef],
    pub expr: ExprRef,
}

impl<'a> Query<'a> {
    pub fn new(constraints: &'a [ExprRef], expr: ExprRef) -> Self {
        Self { constraints, expr }
    }

    pub fn with_expr(&self, expr: ExprRef) -> Query<'a> {
        Query {
            constraints: self.constraints,
            expr,
        }
    }

    /// Same constraints, goal `false`: any model of the constraints refutes it.
    pub fn with_false(&self) -> Query<'a> {
        self.with_expr(Expr::bool(false))
    }
}

/// Arrays read anywhere in `exprs`, in first-seen order, without duplicates.
pub fn find_symbolic_objects<'e>(exprs: impl IntoIterator<Item = &'e ExprRef>) -> Vec<ArrayRef> {
    let mut visited: HashSet<ExprRef> = HashSet::new();
    let mut seen: HashSet<ArrayRef> = HashSet::new();
    let mut objects = Vec::new();
    let mut stack: Vec<ExprRef> = exprs.into_iter().cloned().collect();
    stack.reverse();

    while let Some(e) = stack.pop() {
        if !visited.insert(e.clone()) {
            continue;
        }
        if let ExprKind::Read { array, .. } = e.kind() {
            if seen.insert(array.clone()) {
                objects.push(array.clone());
            }
        }
        for kid in e.kids().into_iter().rev() {
            stack.push(kid.clone());
        }
    }
    objects
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::Array;
    use crate::expr::{INT32, INT8};

    #[test]
    fn objects_are_deduplicated_in_order() {
        let a = Array::new("a", 1);
        let b = Array::new("b", 1);
        let ra = Expr::read(&a, Expr::zero(INT32));
        let rb = Expr::read(&b, Expr::zero(INT32));
        let e1 = Expr::ult(ra.clone(), rb.clone());
        let e2 = Expr::eq(Expr::add(rb, ra), Expr::constant(3, INT8));

        let objects = find_symbolic_objects([&e1, &e2]);
        let names: Vec<&str> = objects.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn with_false_keeps_constraints() {
        let constraints = vec![Expr::bool(true)];
        let q = Query::new(&constraints, Expr::bool(true));
        let f = q.with_false();
        assert!(f.expr.is_false());
        assert_eq!(f.constraints.len(), 1);
    }
}
