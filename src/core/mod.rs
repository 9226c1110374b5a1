// This module is the hub for the target-independent half of ferrocil: the decoded
// module model consumed at the reader boundary, the arena-backed compilation
// session holding per-run state (interning, statistics, diagnostics, opcode
// policy), and the error taxonomy shared by every component. Target-specific
// code generation lives under x64; the toolchain boundary and the artifact
// driver sit at the crate root.

//! Core compiler infrastructure.
//!
//! # Key components
//!
//! ## Module model (`module`)
//! - Plain owned data produced by the external metadata reader
//! - Closed opcode enum of the supported subset plus an `Unsupported` carrier
//! - Builders standing in for the reader in tests and the demo driver
//!
//! ## Session management (`session`)
//! - Arena-based allocation using `bumpalo` for interned symbol names
//! - Per-run statistics and skipped-opcode diagnostics
//! - Strict/permissive unsupported-opcode policy
//!
//! ## Errors (`error`)
//! - `CompileError` / `CompileResult` for all fatal conditions

pub mod error;
pub mod module;
pub mod session;

pub use error::{CompileError, CompileResult};
pub use module::{
    FieldDef, FieldRef, Inst, MethodBuilder, MethodDef, MethodRef, Module, ModuleBuilder, Opcode,
    Operand, TypeBuilder, TypeDef,
};
pub use session::{CompilationSession, OpcodeMode, SessionStats, SkippedOpcode};
