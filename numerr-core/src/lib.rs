#![forbid(unsafe_code)]

mod propagate;
mod report;
mod symbolic_error;

pub use propagate::{PropagationRule, widen_to_common, zero_error};
pub use report::{REPORT_SEPARATOR, error_symbol, location_prefix};
pub use symbolic_error::{ERROR_ARRAY_PREFIX, ERROR_ARRAY_SIZE, SymbolicError};
