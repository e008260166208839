#![forbid(unsafe_code)]

use std::collections::HashMap;

use numerr_expr::{ArrayRef, BinOp, CmpOp, ExprKind, ExprRef, read_value};
use tracing::trace;
use z3::ast::{Array, Ast, BV, Bool, Real};
use z3::{Config, Context, Model, Optimize, Params, Solver, Sort};

use crate::smtlib::is_boolish;
use crate::solver::{BoundTriple, Numeral, SatResult, SessionMode, SolverBackend, SolverParams};

enum Session {
    Check(Solver<'static>),
    Optimize(Optimize<'static>),
}

#[derive(Clone)]
enum Term {
    Bool(Bool<'static>),
    Bv(BV<'static>),
}

/// Z3 behind [`SolverBackend`].
///
/// Width-1 comparisons and connectives become `Bool` terms, everything else bit-vectors over
/// `(Array (_ BitVec 32) (_ BitVec 8))` inputs. Translated terms are shared within a session
/// and dropped when it closes.
pub struct Z3Backend {
    ctx: &'static Context,
    session: Option<Session>,
    cache: HashMap<ExprRef, Term>,
    arrays: HashMap<String, Array<'static>>,
    objectives: Vec<Real<'static>>,
    model: Option<Model<'static>>,
}

impl Default for Z3Backend {
    fn default() -> Self {
        Self::new()
    }
}

impl Z3Backend {
    pub fn new() -> Self {
        let mut cfg = Config::new();
        cfg.set_model_generation(true);
        // Sessions and cached terms borrow the context; leaking it keeps them free of
        // self-references for the life of the process.
        let ctx: &'static Context = Box::leak(Box::new(Context::new(&cfg)));
        Self {
            ctx,
            session: None,
            cache: HashMap::new(),
            arrays: HashMap::new(),
            objectives: Vec::new(),
            model: None,
        }
    }

    fn array(&mut self, array: &ArrayRef) -> Array<'static> {
        let ctx = self.ctx;
        self.arrays
            .entry(array.name.clone())
            .or_insert_with(|| {
                Array::new_const(
                    ctx,
                    array.name.as_str(),
                    &Sort::bitvector(ctx, array.domain),
                    &Sort::bitvector(ctx, array.range),
                )
            })
            .clone()
    }

    fn select(&mut self, array: &ArrayRef, index: &BV<'static>) -> BV<'static> {
        self.array(array)
            .select(index)
            .as_bv()
            .unwrap_or_else(|| panic!("array `{}` does not hold bit-vectors", array.name))
    }

    fn as_bool(&mut self, e: &ExprRef) -> Bool<'static> {
        match self.term(e) {
            Term::Bool(b) => b,
            Term::Bv(v) => v._eq(&BV::from_u64(self.ctx, 1, 1)),
        }
    }

    fn as_bv(&mut self, e: &ExprRef) -> BV<'static> {
        match self.term(e) {
            Term::Bool(b) => b.ite(&BV::from_u64(self.ctx, 1, 1), &BV::from_u64(self.ctx, 0, 1)),
            Term::Bv(v) => v,
        }
    }

    fn term(&mut self, e: &ExprRef) -> Term {
        if let Some(t) = self.cache.get(e) {
            return t.clone();
        }
        let t = if is_boolish(e) {
            Term::Bool(self.build_bool(e))
        } else {
            Term::Bv(self.build_bv(e))
        };
        self.cache.insert(e.clone(), t.clone());
        t
    }

    fn build_bool(&mut self, e: &ExprRef) -> Bool<'static> {
        match e.kind() {
            ExprKind::Constant(v) => Bool::from_bool(self.ctx, *v == 1),
            ExprKind::Not(inner) => self.as_bool(inner).not(),
            ExprKind::Binary(op, l, r) => {
                let l = self.as_bool(l);
                let r = self.as_bool(r);
                match op {
                    BinOp::And => Bool::and(self.ctx, &[&l, &r]),
                    BinOp::Or => Bool::or(self.ctx, &[&l, &r]),
                    _ => l.xor(&r),
                }
            }
            ExprKind::Cmp(CmpOp::Eq, l, r) if is_boolish(l) || is_boolish(r) => {
                let l = self.as_bool(l);
                let r = self.as_bool(r);
                l._eq(&r)
            }
            ExprKind::Cmp(op, l, r) => {
                let l = self.as_bv(l);
                let r = self.as_bv(r);
                match op {
                    CmpOp::Eq => l._eq(&r),
                    CmpOp::Ult => l.bvult(&r),
                    CmpOp::Ule => l.bvule(&r),
                    CmpOp::Slt => l.bvslt(&r),
                    CmpOp::Sle => l.bvsle(&r),
                }
            }
            _ => unreachable!("not a boolean expression: {e}"),
        }
    }

    fn build_bv(&mut self, e: &ExprRef) -> BV<'static> {
        let w = e.width();
        match e.kind() {
            ExprKind::Constant(v) => BV::from_u64(self.ctx, *v, w),
            ExprKind::Read { array, index } => {
                let index = self.as_bv(index);
                self.select(array, &index)
            }
            ExprKind::Concat(l, r) => {
                let l = self.as_bv(l);
                let r = self.as_bv(r);
                l.concat(&r)
            }
            ExprKind::Extract { expr, offset } => self.as_bv(expr).extract(offset + w - 1, *offset),
            ExprKind::ZExt(inner) => {
                let extra = w - inner.width();
                self.as_bv(inner).zero_ext(extra)
            }
            ExprKind::SExt(inner) => {
                let extra = w - inner.width();
                self.as_bv(inner).sign_ext(extra)
            }
            ExprKind::Not(inner) => self.as_bv(inner).bvnot(),
            ExprKind::Binary(op, l, r) => {
                let l = self.as_bv(l);
                let r = self.as_bv(r);
                match op {
                    BinOp::Add => l.bvadd(&r),
                    BinOp::Sub => l.bvsub(&r),
                    BinOp::Mul => l.bvmul(&r),
                    BinOp::UDiv => l.bvudiv(&r),
                    BinOp::SDiv => l.bvsdiv(&r),
                    BinOp::URem => l.bvurem(&r),
                    BinOp::SRem => l.bvsrem(&r),
                    BinOp::And => l.bvand(&r),
                    BinOp::Or => l.bvor(&r),
                    BinOp::Xor => l.bvxor(&r),
                    BinOp::Shl => l.bvshl(&r),
                    BinOp::LShr => l.bvlshr(&r),
                    BinOp::AShr => l.bvashr(&r),
                }
            }
            ExprKind::Cmp(..) => unreachable!("comparisons are boolean"),
        }
    }

    fn assert_bool(&mut self, b: Bool<'static>) {
        match &self.session {
            Some(Session::Check(solver)) => solver.assert(&b),
            Some(Session::Optimize(opt)) => opt.assert(&b),
            None => panic!("assertion outside of a solver session"),
        }
    }
}

fn numeral_of(real: &Real<'static>) -> Option<Numeral> {
    let (numerator, denominator) = real.as_real()?;
    let numerator = i64::try_from(numerator).ok()?;
    let denominator = i64::try_from(denominator).ok()?;
    Some(if denominator == 1 {
        Numeral::Int(numerator)
    } else {
        Numeral::Rational {
            numerator,
            denominator,
        }
    })
}

impl SolverBackend for Z3Backend {
    fn name(&self) -> &'static str {
        "z3"
    }

    fn open_session(&mut self, mode: SessionMode, params: &SolverParams) {
        let mut z3_params = Params::new(self.ctx);
        z3_params.set_u32("timeout", params.timeout_ms);
        self.session = Some(match mode {
            SessionMode::Check => {
                let solver = Solver::new(self.ctx);
                solver.set_params(&z3_params);
                Session::Check(solver)
            }
            SessionMode::Optimize => {
                z3_params.set_symbol("priority", params.priority.name());
                let opt = Optimize::new(self.ctx);
                opt.set_params(&z3_params);
                Session::Optimize(opt)
            }
        });
        self.model = None;
    }

    fn assert_constraint(&mut self, constraint: &ExprRef) {
        let b = self.as_bool(constraint);
        self.assert_bool(b);
    }

    fn assert_negated_goal(&mut self, goal: &ExprRef) {
        let b = self.as_bool(goal).not();
        self.assert_bool(b);
    }

    fn maximize(&mut self, object: &ArrayRef) {
        // The objective shares the object's name but not its sort, so it is pinned to the
        // object's value explicitly.
        let bytes = object.size.clamp(1, 8);
        let value = self.as_bv(&read_value(object, 0, bytes * 8));
        let objective = Real::new_const(self.ctx, object.name.as_str());
        self.assert_bool(objective._eq(&Real::from_int(&value.to_int(false))));
        if let Some(Session::Optimize(opt)) = &self.session {
            opt.maximize(&objective);
        }
        self.objectives.push(objective);
    }

    fn check(&mut self) -> SatResult {
        let (answer, model) = match &self.session {
            Some(Session::Check(solver)) => (solver.check(), solver.get_model()),
            Some(Session::Optimize(opt)) => (opt.check(&[]), opt.get_model()),
            None => panic!("check outside of a solver session"),
        };
        trace!(cached = self.cache.len(), "z3 check done");
        match answer {
            z3::SatResult::Sat => {
                self.model = model;
                SatResult::Sat
            }
            z3::SatResult::Unsat => SatResult::Unsat,
            z3::SatResult::Unknown => SatResult::Unknown,
        }
    }

    fn reason_unknown(&mut self) -> String {
        let reason = match &self.session {
            Some(Session::Check(solver)) => solver.get_reason_unknown(),
            Some(Session::Optimize(opt)) => opt.get_reason_unknown(),
            None => None,
        };
        reason.unwrap_or_else(|| "unknown".to_string())
    }

    fn model_value(&mut self, array: &ArrayRef, offset: u32) -> Option<Numeral> {
        let index = BV::from_u64(self.ctx, offset.into(), array.domain);
        let read = self.select(array, &index);
        let value = self.model.as_ref()?.eval(&read, true)?;
        value.as_u64().and_then(|v| i64::try_from(v).ok()).map(Numeral::Int)
    }

    fn upper_bound(&mut self, index: usize) -> Option<BoundTriple> {
        let objective = self.objectives.get(index)?;
        let value = self.model.as_ref()?.eval(objective, true)?;
        numeral_of(&value).map(BoundTriple::finite)
    }

    fn close_session(&mut self) {
        self.model = None;
        self.objectives.clear();
        self.cache.clear();
        self.arrays.clear();
        self.session = None;
    }
}
