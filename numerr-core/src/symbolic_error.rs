#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;

use numerr_expr::{ArrayCache, ArrayRef, Expr, ExprKind, ExprRef, INT32};
use numerr_ir::{Instruction, ValueId};
use tracing::debug;

use crate::propagate::{PropagationRule, widen_to_common, zero_error};
use crate::report::{REPORT_SEPARATOR, bound_assertion, error_symbol, location_prefix};

/// Name prefix of the companion error array of a symbolic input.
pub const ERROR_ARRAY_PREFIX: &str = "_unspecified_error_";
/// Byte size of every companion error array.
pub const ERROR_ARRAY_SIZE: u32 = 8;

/// Error-tracking state of one symbolic-execution run.
///
/// Maps program values to error expressions, symbolic inputs to their companion error arrays,
/// and concrete addresses to the error of the value last stored there. The bound reports
/// produced along the run accumulate in [`SymbolicError::output`].
#[derive(Debug, Default)]
pub struct SymbolicError {
    value_errors: BTreeMap<ValueId, ExprRef>,
    error_arrays: BTreeMap<ArrayRef, ArrayRef>,
    error_array_cache: ArrayCache,
    stored_errors: BTreeMap<u64, ExprRef>,
    output: String,
}

impl SymbolicError {
    pub fn new() -> Self {
        Self::default()
    }

    /// Companion error array of `array`, created on first request.
    pub fn error_array_for(&mut self, array: &ArrayRef) -> ArrayRef {
        if let Some(existing) = self.error_arrays.get(array) {
            return existing.clone();
        }
        let name = format!("{ERROR_ARRAY_PREFIX}{}", array.name);
        let companion = self
            .error_array_cache
            .create_array(&name, ERROR_ARRAY_SIZE);
        debug!(array = %array.name, companion = %companion.name, "created error array");
        self.error_arrays.insert(array.clone(), companion.clone());
        companion
    }

    /// Error of `value_expr`, memoized under `value` when one is given.
    ///
    /// # Panics
    ///
    /// When `value_expr` has a shape errors cannot be derived from. Only symbolic reads (or
    /// concatenations of them), sign extensions, additions and constants are accepted.
    pub fn get_error(&mut self, value_expr: &ExprRef, value: Option<ValueId>) -> ExprRef {
        if let Some(known) = value.and_then(|v| self.value_errors.get(&v)) {
            return known.clone();
        }

        let error = match value_expr.kind() {
            ExprKind::Concat(left, _) => match left.kind() {
                ExprKind::Read { array, .. } => self.error_read(array),
                _ => panic!("malformed expression: concatenation not rooted at a read: {value_expr}"),
            },
            ExprKind::Read { array, .. } => self.error_read(array),
            ExprKind::SExt(inner) => self.get_error(inner, None),
            ExprKind::Binary(numerr_expr::BinOp::Add, l, r) => {
                let l = self.get_error(l, None);
                let r = self.get_error(r, None);
                let (l, r) = widen_to_common(l, r);
                Expr::add(l, r)
            }
            ExprKind::Constant(_) => zero_error(),
            _ => panic!("malformed expression: {value_expr}"),
        };

        if let Some(v) = value {
            self.value_errors.insert(v, error.clone());
        }
        error
    }

    fn error_read(&mut self, array: &ArrayRef) -> ExprRef {
        let companion = self.error_array_for(array);
        Expr::read(&companion, Expr::zero(INT32))
    }

    /// Derive and record the error of `inst`'s result.
    ///
    /// `args` are the operand value expressions, in operand order.
    pub fn propagate_error(
        &mut self,
        inst: &Instruction,
        result: &ExprRef,
        args: &[ExprRef],
    ) -> ExprRef {
        let rule = PropagationRule::for_opcode(inst.opcode);
        let error = match rule {
            PropagationRule::Default => args
                .iter()
                .enumerate()
                .find_map(|(i, _)| {
                    inst.operand(i)
                        .and_then(|op| self.value_errors.get(&op))
                        .cloned()
                })
                .unwrap_or_else(zero_error),
            _ => {
                assert!(
                    args.len() >= rule.arity(),
                    "{} expects {} operands, got {}",
                    inst.opcode.name(),
                    rule.arity(),
                    args.len()
                );
                let errors: Vec<ExprRef> = args[..rule.arity()]
                    .iter()
                    .enumerate()
                    .map(|(i, arg)| self.get_error(arg, inst.operand(i)))
                    .collect();
                rule.combine(result, &errors, args)
            }
        };
        debug!(inst = %inst, ?rule, width = error.width(), "propagated error");
        self.value_errors.insert(inst.id, error.clone());
        error
    }

    /// Record `error` as the shadow of the memory at `address`. `None` records nothing.
    ///
    /// # Panics
    ///
    /// When `address` is not a constant.
    pub fn execute_store(&mut self, address: &ExprRef, error: Option<ExprRef>) {
        let Some(error) = error else {
            return;
        };
        let addr = constant_address(address);
        self.stored_errors.insert(addr, error);
    }

    /// Error shadow of the memory at `address` (zero when nothing was stored), recorded for `value`.
    ///
    /// # Panics
    ///
    /// When `address` is not a constant.
    pub fn execute_load(&mut self, value: ValueId, address: &ExprRef) -> ExprRef {
        let addr = constant_address(address);
        let error = self
            .stored_errors
            .get(&addr)
            .cloned()
            .unwrap_or_else(zero_error);
        self.value_errors.insert(value, error.clone());
        error
    }

    /// Error a bound check on `inst` is about: the error of its first operand, or zero.
    pub fn checked_error(&self, inst: &Instruction) -> ExprRef {
        inst.operand(0)
            .and_then(|op| self.value_errors.get(&op))
            .cloned()
            .unwrap_or_else(zero_error)
    }

    /// Append a report asserting `|error(first operand of inst)| <= bound`.
    pub fn output_error_bound(&mut self, inst: &Instruction, bound: f64) {
        let error = self.checked_error(inst);
        let symbol = error_symbol(&error);
        if !self.output.is_empty() {
            self.output.push_str(REPORT_SEPARATOR);
        }
        self.output.push_str(&location_prefix(inst));
        self.output.push_str(&bound_assertion(&symbol, &error, bound));
    }

    pub fn value_error(&self, value: ValueId) -> Option<&ExprRef> {
        self.value_errors.get(&value)
    }

    pub fn stored_error(&self, address: u64) -> Option<&ExprRef> {
        self.stored_errors.get(&address)
    }

    pub fn error_arrays(&self) -> impl Iterator<Item = (&ArrayRef, &ArrayRef)> {
        self.error_arrays.iter()
    }

    pub fn output(&self) -> &str {
        &self.output
    }
}

fn constant_address(address: &ExprRef) -> u64 {
    match address.as_constant() {
        Some(addr) => addr,
        None => panic!("non-constant address: {address}"),
    }
}

impl fmt::Display for SymbolicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Value->Expression:")?;
        for (value, error) in &self.value_errors {
            writeln!(f, "[{value},{error}]")?;
        }
        writeln!(f, "Array->Error Array:")?;
        for (array, companion) in &self.error_arrays {
            writeln!(f, "[{},{}]", array.name, companion.name)?;
        }
        writeln!(f, "Store:")?;
        for (addr, error) in &self.stored_errors {
            writeln!(f, "{addr}: {error}")?;
        }
        writeln!(f, "Output String:")?;
        write!(f, "{}", self.output)
    }
}
