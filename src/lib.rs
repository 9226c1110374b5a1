//! ferrocil - ahead-of-time CIL to bare-metal x86-64 compilation.
//!
//! ferrocil lowers a decoded stack-machine bytecode module into a bootable
//! kernel image: a multiboot2 header, the protected-to-long-mode bootstrap,
//! and one native sequence per bytecode instruction, all emitted as NASM text
//! and handed to an external assembler/linker pair.
//!
//! # Primary usage
//!
//! ```
//! use ferrocil::core::{MethodBuilder, ModuleBuilder, Opcode, OpcodeMode, TypeBuilder};
//! use ferrocil::driver::compile_to_asm;
//!
//! let module = ModuleBuilder::new()
//!     .ty(TypeBuilder::new("Program").method(
//!         MethodBuilder::new("Program::Main")
//!             .inst(Opcode::LdcI4_2)
//!             .inst(Opcode::LdcI4_3)
//!             .inst(Opcode::Add)
//!             .inst(Opcode::Ret),
//!     ))
//!     .build();
//!
//! let compiled = compile_to_asm(&module, OpcodeMode::Permissive).unwrap();
//! assert!(compiled.text.contains("Program__Main:"));
//! ```
//!
//! # Architecture
//!
//! - [`core`] - module model, compilation session, error taxonomy
//! - [`x64`] - emitter, frame model, bootstrap, branch resolution, selector
//! - [`toolchain`] - external assembler/linker boundary
//! - [`driver`] - artifact-chain orchestration

pub mod core;
pub mod driver;
pub mod toolchain;
pub mod x64;

// Re-export the types most callers need.
pub use crate::core::{
    CompilationSession, CompileError, CompileResult, Module, OpcodeMode, SkippedOpcode,
};
pub use driver::{build_image, compile_to_asm, CompiledAsm, ImagePaths};
pub use toolchain::{NativeToolchain, Toolchain, ToolchainError};
pub use x64::Amd64Backend;
