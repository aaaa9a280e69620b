//! Stack IR and the passes that run before a backend
//!
//! - `ir`: instruction set and program representation
//! - `scope`: per-function variable collection
//! - `interp`: reference interpreter used as the semantic baseline

pub mod interp;
pub mod ir;
pub mod scope;

#[cfg(test)]
mod tests;

pub use ir::*;
pub use scope::collect_variables;
