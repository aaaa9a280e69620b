//! Frame layout
//!
//! 栈帧布局：`%ebp` 之下是局部变量，之上是返回地址和参数。
//!
//! ```text
//!   +12(%ebp)  second parameter
//!    +8(%ebp)  first parameter
//!    +4(%ebp)  return address
//!     0(%ebp)  saved %ebp
//!    -4(%ebp)  first local
//!    -8(%ebp)  second local
//! ```

use crate::middle::ir::{FunctionDeclaration, StackStatement, Variable};
use crate::middle::scope::collect_variables;
use indexmap::IndexMap;

/// Bytes per stack slot
pub const SLOT_SIZE: i32 = 4;
/// Offset of the first parameter, past the saved `%ebp` and the return address
pub const FIRST_PARAMETER_OFFSET: i32 = 8;

/// Where each variable of one function lives relative to `%ebp`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameLayout {
    locals: IndexMap<Variable, i32>,
    parameters: IndexMap<Variable, i32>,
}

impl FrameLayout {
    /// Build the table for `declaration`. Locals are the variables `body`
    /// touches minus the parameters, in first-use order.
    pub fn new(
        declaration: &FunctionDeclaration,
        body: &[StackStatement],
    ) -> Self {
        let mut parameters = IndexMap::new();
        for (i, parameter) in declaration.parameters.iter().enumerate() {
            parameters
                .entry(parameter.clone())
                .or_insert(FIRST_PARAMETER_OFFSET + SLOT_SIZE * i as i32);
        }

        let locals = collect_variables(body)
            .into_iter()
            .filter(|v| !parameters.contains_key(v))
            .enumerate()
            .map(|(i, v)| (v, -SLOT_SIZE * (i as i32 + 1)))
            .collect();

        FrameLayout { locals, parameters }
    }

    /// `%ebp`-relative offset of `variable`
    pub fn offset(
        &self,
        variable: &Variable,
    ) -> Option<i32> {
        self.locals
            .get(variable)
            .or_else(|| self.parameters.get(variable))
            .copied()
    }

    /// Bytes the prologue reserves below `%ebp`
    pub fn locals_size(&self) -> i32 {
        SLOT_SIZE * self.locals.len() as i32
    }

    pub fn locals(&self) -> impl Iterator<Item = (&Variable, i32)> {
        self.locals.iter().map(|(v, &offset)| (v, offset))
    }

    pub fn parameters(&self) -> impl Iterator<Item = (&Variable, i32)> {
        self.parameters.iter().map(|(v, &offset)| (v, offset))
    }
}
