#![forbid(unsafe_code)]

use std::fmt::Write as _;

use numerr_expr::ExprRef;
use numerr_ir::Instruction;

/// Divider written between two consecutive bound reports.
pub const REPORT_SEPARATOR: &str = "\n------------------------\n";

/// Name bound to an error expression in a report, stable for structurally equal expressions.
pub fn error_symbol(error: &ExprRef) -> String {
    format!("__error__{:016x}", error.structural_hash())
}

/// `Line N of dir/file (func): `, `func: `, or nothing.
pub fn location_prefix(inst: &Instruction) -> String {
    match (&inst.loc, &inst.function) {
        (Some(loc), function) => {
            let mut out = format!("Line {} of {}", loc.line, loc.path());
            if let Some(func) = function {
                let _ = write!(out, " ({func})");
            }
            out.push_str(": ");
            out
        }
        (None, Some(func)) => format!("{func}: "),
        (None, None) => String::new(),
    }
}

pub(crate) fn bound_assertion(symbol: &str, error: &ExprRef, bound: f64) -> String {
    format!("{symbol} == ({error}) && ({symbol} <= {bound}) && ({symbol} >= -{bound})\n")
}
