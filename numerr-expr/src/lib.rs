#![forbid(unsafe_code)]

pub mod array;
pub mod assignment;
pub mod expr;
mod print;
pub mod query;

pub use array::{Array, ArrayCache, ArrayRef, read_value};
pub use assignment::Assignment;
pub use expr::*;
pub use query::{Query, find_symbolic_objects};
