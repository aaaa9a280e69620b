//! Variable scope resolution
//!
//! Collects the variables an instruction sequence touches. This is a plain
//! structural scan: unreachable `ld`/`st` statements are counted too.

use crate::middle::ir::{StackStatement, Variable};
use indexmap::IndexSet;

/// Distinct variables referenced by `Ld`/`St`, in first-occurrence order
pub fn collect_variables(source: &[StackStatement]) -> IndexSet<Variable> {
    source
        .iter()
        .filter_map(|s| match s {
            StackStatement::Ld(v) | StackStatement::St(v) => Some(v.clone()),
            _ => None,
        })
        .collect()
}
