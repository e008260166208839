#![forbid(unsafe_code)]

//! JSON execution traces and their replay through the error tracker.
//!
//! A trace declares its symbolic arrays and lists the steps of one concrete path:
//!
//! ```json
//! {
//!   "arrays": [{ "name": "a", "size": 4 }],
//!   "steps": [
//!     { "op": "symbolic", "id": 1, "array": "a", "width": 32 },
//!     { "op": "const", "id": 2, "value": 3, "width": 32 },
//!     { "op": "inst", "id": 3, "opcode": "add", "operands": [1, 2] },
//!     { "op": "assume", "cmp": "ult", "lhs": 1, "rhs": 2 },
//!     { "op": "check", "value": 3, "bound": 0.5, "function": "main" }
//!   ]
//! }
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use miette::Diagnostic;
use numerr_core::SymbolicError;
use numerr_expr::{ArrayCache, Expr, ExprRef, read_value};
use numerr_ir::{DebugLoc, IdGen, Instruction, Opcode, ValueId};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, Diagnostic)]
#[error("trace error: {message}")]
#[diagnostic(code(numerr::trace))]
pub struct TraceError {
    pub message: String,
}

impl TraceError {
    fn at(step: usize, message: impl Into<String>) -> Self {
        Self {
            message: format!("step {step}: {}", message.into()),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Trace {
    #[serde(default)]
    pub arrays: Vec<ArrayDecl>,
    pub steps: Vec<Step>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ArrayDecl {
    pub name: String,
    pub size: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Location {
    pub line: u32,
    pub file: String,
    #[serde(default)]
    pub dir: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssumeCmp {
    Eq,
    Ne,
    Ult,
    Ule,
    Ugt,
    Uge,
    Slt,
    Sle,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Step {
    /// `width` bits of a declared array, starting at byte `offset`.
    Symbolic {
        id: u32,
        array: String,
        #[serde(default)]
        offset: u32,
        width: u32,
    },
    Const {
        id: u32,
        value: u64,
        width: u32,
    },
    Inst {
        id: u32,
        opcode: Opcode,
        operands: Vec<u32>,
        /// Result width of casts.
        #[serde(default)]
        width: Option<u32>,
        #[serde(default)]
        loc: Option<Location>,
        #[serde(default)]
        function: Option<String>,
    },
    Store {
        address: u64,
        value: u32,
    },
    Load {
        id: u32,
        address: u64,
    },
    /// Path condition `lhs <cmp> rhs`.
    Assume {
        cmp: AssumeCmp,
        lhs: u32,
        rhs: u32,
    },
    /// Bound check on the error of `value`.
    Check {
        #[serde(default)]
        id: Option<u32>,
        value: u32,
        bound: f64,
        #[serde(default)]
        loc: Option<Location>,
        #[serde(default)]
        function: Option<String>,
    },
}

pub fn parse_trace(raw: &str) -> Result<Trace, TraceError> {
    serde_json::from_str(raw).map_err(|e| TraceError {
        message: format!("invalid trace: {e}"),
    })
}

pub fn load_trace(path: &Path) -> Result<Trace, TraceError> {
    let raw = fs::read_to_string(path).map_err(|e| TraceError {
        message: format!("failed to read {}: {e}", path.display()),
    })?;
    parse_trace(&raw)
}

/// A bound check met along the path.
#[derive(Clone, Debug)]
pub struct BoundCheck {
    pub inst: Instruction,
    pub bound: f64,
    /// Error of the checked value.
    pub error: ExprRef,
    /// Path condition at the check.
    pub constraints: Vec<ExprRef>,
}

impl BoundCheck {
    /// `error <=u floor(bound)`, saturated to the error's width.
    pub fn goal(&self) -> ExprRef {
        let width = self.error.width();
        let max = numerr_expr::width_mask(width);
        let limit = if self.bound >= max as f64 {
            max
        } else {
            self.bound.floor().max(0.0) as u64
        };
        Expr::ule(self.error.clone(), Expr::constant(limit, width))
    }
}

/// Result of replaying a trace.
#[derive(Debug)]
pub struct Replay {
    pub store: SymbolicError,
    pub checks: Vec<BoundCheck>,
}

/// Minimal host: evaluates values along the path and drives the error tracker.
#[derive(Default)]
struct Host {
    arrays: ArrayCache,
    values: HashMap<ValueId, ExprRef>,
    memory: HashMap<u64, ExprRef>,
    constraints: Vec<ExprRef>,
    ids: IdGen,
    store: SymbolicError,
    checks: Vec<BoundCheck>,
}

impl Host {
    fn value(&self, step: usize, id: u32) -> Result<ExprRef, TraceError> {
        self.values
            .get(&ValueId(id))
            .cloned()
            .ok_or_else(|| TraceError::at(step, format!("use of undefined value %{id}")))
    }

    fn define(&mut self, step: usize, id: u32, expr: ExprRef) -> Result<(), TraceError> {
        if self.values.insert(ValueId(id), expr).is_some() {
            return Err(TraceError::at(step, format!("value %{id} defined twice")));
        }
        Ok(())
    }

    fn run(&mut self, step: usize, s: &Step) -> Result<(), TraceError> {
        match s {
            Step::Symbolic {
                id,
                array,
                offset,
                width,
            } => {
                let arr = self
                    .arrays
                    .get(array)
                    .ok_or_else(|| TraceError::at(step, format!("undeclared array `{array}`")))?;
                if *width == 0 || width % 8 != 0 || *width > 64 {
                    return Err(TraceError::at(step, format!("unsupported width {width}")));
                }
                if offset.checked_add(width / 8).is_none_or(|end| end > arr.size) {
                    return Err(TraceError::at(
                        step,
                        format!("read of {width} bits at {offset} overruns `{array}`"),
                    ));
                }
                let expr = read_value(arr, *offset, *width);
                self.define(step, *id, expr)
            }
            Step::Const { id, value, width } => {
                check_width(step, *width)?;
                self.define(step, *id, Expr::constant(*value, *width))
            }
            Step::Inst {
                id,
                opcode,
                operands,
                width,
                loc,
                function,
            } => {
                if width.is_some() && !opcode.is_cast() {
                    return Err(TraceError::at(
                        step,
                        format!("`width` only applies to casts, not {}", opcode.name()),
                    ));
                }
                let args = operands
                    .iter()
                    .map(|op| self.value(step, *op))
                    .collect::<Result<Vec<_>, _>>()?;
                let result = evaluate(step, *opcode, &args, *width)?;
                let inst = instruction(*id, *opcode, operands, loc, function);
                let error = self.store.propagate_error(&inst, &result, &args);
                debug!(%inst, error = %error, "replayed");
                self.define(step, *id, result)
            }
            Step::Store { address, value } => {
                let v = self.value(step, *value)?;
                self.memory.insert(*address, v);
                let error = self.store.value_error(ValueId(*value)).cloned();
                self.store
                    .execute_store(&Expr::constant(*address, numerr_expr::INT64), error);
                Ok(())
            }
            Step::Load { id, address } => {
                let v = self.memory.get(address).cloned().ok_or_else(|| {
                    TraceError::at(step, format!("load from unwritten address {address:#x}"))
                })?;
                self.store
                    .execute_load(ValueId(*id), &Expr::constant(*address, numerr_expr::INT64));
                self.define(step, *id, v)
            }
            Step::Assume { cmp, lhs, rhs } => {
                let l = self.value(step, *lhs)?;
                let r = self.value(step, *rhs)?;
                if l.width() != r.width() {
                    return Err(TraceError::at(step, "comparison of different widths"));
                }
                let c = match cmp {
                    AssumeCmp::Eq => Expr::eq(l, r),
                    AssumeCmp::Ne => Expr::ne(l, r),
                    AssumeCmp::Ult => Expr::ult(l, r),
                    AssumeCmp::Ule => Expr::ule(l, r),
                    AssumeCmp::Ugt => Expr::ugt(l, r),
                    AssumeCmp::Uge => Expr::uge(l, r),
                    AssumeCmp::Slt => Expr::slt(l, r),
                    AssumeCmp::Sle => Expr::sle(l, r),
                };
                if c.is_false() {
                    return Err(TraceError::at(step, "assumption is always false"));
                }
                if !c.is_true() {
                    self.constraints.push(c);
                }
                Ok(())
            }
            Step::Check {
                id,
                value,
                bound,
                loc,
                function,
            } => {
                self.value(step, *value)?;
                if !bound.is_finite() || *bound < 0.0 {
                    return Err(TraceError::at(step, format!("invalid bound {bound}")));
                }
                let id = match id {
                    Some(id) => *id,
                    None => {
                        self.ids
                            .fresh_value()
                            .ok_or_else(|| TraceError::at(step, "no value id left for the check"))?
                            .0
                    }
                };
                let inst = instruction(id, Opcode::Call, &[*value], loc, function);
                self.store.output_error_bound(&inst, *bound);
                self.checks.push(BoundCheck {
                    error: self.store.checked_error(&inst),
                    inst,
                    bound: *bound,
                    constraints: self.constraints.clone(),
                });
                Ok(())
            }
        }
    }
}

fn check_width(step: usize, width: u32) -> Result<(), TraceError> {
    if width == 0 || width > 64 {
        return Err(TraceError::at(step, format!("unsupported width {width}")));
    }
    Ok(())
}

fn instruction(
    id: u32,
    opcode: Opcode,
    operands: &[u32],
    loc: &Option<Location>,
    function: &Option<String>,
) -> Instruction {
    let mut inst = Instruction::new(
        ValueId(id),
        opcode,
        operands.iter().map(|op| ValueId(*op)).collect(),
    );
    if let Some(loc) = loc {
        inst = inst.with_loc(DebugLoc::new(loc.line, loc.file.as_str(), loc.dir.as_str()));
    }
    if let Some(function) = function {
        inst = inst.in_function(function.as_str());
    }
    inst
}

/// Value of an instruction's result on this path.
fn evaluate(
    step: usize,
    opcode: Opcode,
    args: &[ExprRef],
    width: Option<u32>,
) -> Result<ExprRef, TraceError> {
    use numerr_expr::BinOp;

    let binary = |op: BinOp| -> Result<ExprRef, TraceError> {
        let [l, r] = args else {
            return Err(TraceError::at(step, format!("{} takes two operands", opcode.name())));
        };
        if l.width() != r.width() {
            return Err(TraceError::at(
                step,
                format!("{} operands of different widths", opcode.name()),
            ));
        }
        Ok(Expr::binary(op, l.clone(), r.clone()))
    };

    match opcode {
        Opcode::Add => binary(BinOp::Add),
        Opcode::Sub => binary(BinOp::Sub),
        Opcode::Mul => binary(BinOp::Mul),
        Opcode::UDiv => binary(BinOp::UDiv),
        Opcode::SDiv => binary(BinOp::SDiv),
        Opcode::URem => binary(BinOp::URem),
        Opcode::SRem => binary(BinOp::SRem),
        Opcode::Shl => binary(BinOp::Shl),
        Opcode::LShr => binary(BinOp::LShr),
        Opcode::AShr => binary(BinOp::AShr),
        Opcode::And => binary(BinOp::And),
        Opcode::Or => binary(BinOp::Or),
        Opcode::Xor => binary(BinOp::Xor),
        Opcode::ZExt | Opcode::SExt | Opcode::Trunc => {
            let [v] = args else {
                return Err(TraceError::at(step, format!("{} takes one operand", opcode.name())));
            };
            let w = width
                .ok_or_else(|| TraceError::at(step, format!("{} needs a width", opcode.name())))?;
            check_width(step, w)?;
            let widening = matches!(opcode, Opcode::ZExt | Opcode::SExt);
            if (widening && w < v.width()) || (!widening && w > v.width()) {
                return Err(TraceError::at(
                    step,
                    format!("{} from {} to {w} bits", opcode.name(), v.width()),
                ));
            }
            Ok(match opcode {
                Opcode::SExt => Expr::sext(v.clone(), w),
                Opcode::ZExt => Expr::zext(v.clone(), w),
                _ => Expr::extract(v.clone(), 0, w),
            })
        }
        // The trace records the incoming value actually taken first.
        Opcode::Phi => args
            .first()
            .cloned()
            .ok_or_else(|| TraceError::at(step, "phi without incoming values")),
        Opcode::Select => {
            let [cond, t, f] = args else {
                return Err(TraceError::at(step, "select takes three operands"));
            };
            match cond.as_constant() {
                Some(0) => Ok(f.clone()),
                Some(_) => Ok(t.clone()),
                None => Err(TraceError::at(step, "select on a symbolic condition")),
            }
        }
        Opcode::Load | Opcode::Store | Opcode::Call => Err(TraceError::at(
            step,
            format!("{} is replayed through its own step kind", opcode.name()),
        )),
    }
}

/// Feed every step of `trace` through the error tracker.
pub fn replay(trace: &Trace) -> Result<Replay, TraceError> {
    let mut host = Host::default();
    for decl in &trace.arrays {
        if let Some(existing) = host.arrays.get(&decl.name) {
            if existing.size != decl.size {
                return Err(TraceError {
                    message: format!("array `{}` declared twice with different sizes", decl.name),
                });
            }
        }
        host.arrays.create_array(&decl.name, decl.size);
    }
    for s in &trace.steps {
        let id = match s {
            Step::Symbolic { id, .. }
            | Step::Const { id, .. }
            | Step::Inst { id, .. }
            | Step::Load { id, .. } => Some(*id),
            Step::Check { id, .. } => *id,
            Step::Store { .. } | Step::Assume { .. } => None,
        };
        if let Some(id) = id {
            host.ids.reserve(ValueId(id));
        }
    }
    for (i, s) in trace.steps.iter().enumerate() {
        host.run(i, s)?;
    }
    Ok(Replay {
        store: host.store,
        checks: host.checks,
    })
}
