#![forbid(unsafe_code)]

pub mod ir;

pub mod debug;

pub use ir::*;
pub use debug::*;
