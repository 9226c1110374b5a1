//! x86-64 architecture-specific components.
//!
//! This module contains all x86-64 specific code:
//! - Assembly text emission and symbol naming (`emitter`)
//! - The emulated operand stack and slot addressing (`frame`)
//! - The multiboot2/long-mode bootstrap prologue (`boot`)
//! - Branch-target resolution (`branches`)
//! - The instruction selector (`backend`)

pub mod backend;
pub mod boot;
pub mod branches;
pub mod emitter;
pub mod frame;

pub use backend::Amd64Backend;
pub use boot::emit_bootstrap;
pub use branches::BranchMap;
pub use emitter::{safe_name, AsmEmitter, SymbolTable};
pub use frame::{Frame, FrameError, Reg, POINTER_SIZE};
