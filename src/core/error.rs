// This module defines the error types for the ferrocil compiler using the thiserror
// crate. CompileError covers every fatal condition in the pipeline: strict-mode
// unsupported opcodes, operand-stack underflow made explicit by the frame model,
// calls and branches that cannot be resolved to a label, structurally malformed
// instruction operands, toolchain process failures, and I/O errors while writing
// artifacts. Non-fatal conditions (skipped opcodes in permissive mode) are not
// errors at all; they accumulate as diagnostics on the CompilationSession. The
// module also provides CompileResult<T> as a convenience alias.

//! Error types for the compiler core.
//!
//! Using thiserror for more idiomatic error handling.

use thiserror::Error;

use crate::toolchain::ToolchainError;

/// Main error type for module compilation.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("unsupported opcode {mnemonic} at IL_{offset:04x} in {method}")]
    UnsupportedOpcode {
        method: String,
        mnemonic: String,
        offset: u32,
    },

    #[error("operand stack underflow at IL_{offset:04x} in {method}")]
    StackUnderflow { method: String, offset: u32 },

    #[error("call to unresolvable method {callee} in {method}")]
    UnresolvedCall { method: String, callee: String },

    #[error("branch to IL_{target:04x} in {method} does not land on an instruction")]
    BadBranchTarget { method: String, target: u32 },

    #[error("{mnemonic} at IL_{offset:04x} in {method} carries no usable operand")]
    MissingOperand {
        method: String,
        mnemonic: String,
        offset: u32,
    },

    #[error(transparent)]
    Toolchain(#[from] ToolchainError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type alias for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;
