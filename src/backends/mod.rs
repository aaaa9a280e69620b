//! Code generation backends
//!
//! Each backend lowers stack IR into one self-contained artifact:
//!
//! ```text
//!        Stack IR
//!            |
//!      +-----+------+
//!      |            |
//!     JVM          x86
//! (class file)  (asm text)
//! ```

pub mod error;
pub mod jvm;
pub mod x86;

pub use error::{CodegenError, CodegenResult, TargetKind};
pub use jvm::{JvmBackend, JvmOptions};
pub use x86::{TargetPlatform, X86Backend};

/// A lowering pass from stack IR to a target artifact
///
/// Implementations keep no state between calls; every call owns its own
/// slot maps, label tables and output buffer.
pub trait Backend {
    /// IR shape the backend consumes
    type Source: ?Sized;
    /// Artifact the backend produces
    type Output;

    fn target(&self) -> TargetKind;

    fn compile(
        &self,
        source: &Self::Source,
    ) -> CodegenResult<Self::Output>;
}

/// Check a `Jmp`/`Jz` target against a sequence of `len` statements.
/// `len` itself is valid and means the implicit end of the routine.
pub(crate) fn check_jump_target(
    function: &str,
    index: usize,
    target: usize,
    len: usize,
) -> CodegenResult<usize> {
    if target > len {
        return Err(CodegenError::UnresolvedJumpTarget {
            function: function.to_string(),
            index,
            target,
            len,
        });
    }
    Ok(target)
}
