// This module implements the compile-time frame model: an emulated operand stack
// plus the two indexed slot regions for locals and call arguments and the named
// cells backing static fields. The operand stack is a memory region addressed
// off the frame-base register (rbp) with a compile-time high-water index, so the
// hardware stack stays free for call/ret return addresses. Push advances the
// index by one pointer width and writes the new top; pop reads the top and
// retreats. Two departures from the source system, both deliberate: the index is
// method-scoped (the backend resets it before each body instead of letting depth
// leak across methods), and popping or peeking an empty stack is a guarded
// FrameError instead of silent underflow. Locals live off r8 and arguments off
// rdx; both are plain indexed regions distinct from the operand stack.

//! Emulated operand stack and slot addressing.

use std::fmt;
use thiserror::Error;

use super::emitter::AsmEmitter;

/// Pointer width of the target, in bytes.
pub const POINTER_SIZE: i64 = 8;

/// Registers with a fixed role in the generated code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg {
    /// Scratch; right operand and primary pop destination.
    Rax,
    /// Scratch; left operand and result.
    Rbx,
    /// Argument-region base. Also holds the multiboot info pointer at boot.
    Rdx,
    /// Frame base anchoring the emulated operand stack.
    Rbp,
    /// Locals-region base.
    R8,
}

impl Reg {
    pub const FRAME_BASE: Reg = Reg::Rbp;
    pub const LOCALS_BASE: Reg = Reg::R8;
    pub const ARGS_BASE: Reg = Reg::Rdx;

    pub fn name(self) -> &'static str {
        match self {
            Reg::Rax => "rax",
            Reg::Rbx => "rbx",
            Reg::Rdx => "rdx",
            Reg::Rbp => "rbp",
            Reg::R8 => "r8",
        }
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Stack-discipline violations caught at compile time.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("operand stack underflow")]
    Underflow,
}

/// Compile-time bookkeeping for one method's emulated operand stack.
///
/// `stack_index` is the byte offset of the current top relative to the frame
/// base; zero means empty. Every operation appends its addressing code to the
/// emitter and none touch the hardware stack.
#[derive(Debug, Default)]
pub struct Frame {
    stack_index: i64,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current operand-stack depth in slots.
    pub fn depth(&self) -> i64 {
        self.stack_index / POINTER_SIZE
    }

    /// Reset for the next method body.
    pub fn reset(&mut self) {
        self.stack_index = 0;
    }

    /// Push an immediate literal onto the operand stack.
    pub fn push_imm(&mut self, e: &mut AsmEmitter, value: i64) {
        self.stack_index += POINTER_SIZE;
        e.linef(format_args!(
            "mov qword [{}+{}],{}",
            Reg::FRAME_BASE,
            self.stack_index,
            value
        ));
    }

    /// Push a register value onto the operand stack.
    pub fn push_reg(&mut self, e: &mut AsmEmitter, src: Reg) {
        self.stack_index += POINTER_SIZE;
        e.linef(format_args!(
            "mov qword [{}+{}],{}",
            Reg::FRAME_BASE,
            self.stack_index,
            src
        ));
    }

    /// Pop the top of the operand stack into `dst`.
    pub fn pop(&mut self, e: &mut AsmEmitter, dst: Reg) -> Result<(), FrameError> {
        if self.stack_index < POINTER_SIZE {
            return Err(FrameError::Underflow);
        }
        e.linef(format_args!(
            "mov {},qword [{}+{}]",
            dst,
            Reg::FRAME_BASE,
            self.stack_index
        ));
        self.stack_index -= POINTER_SIZE;
        Ok(())
    }

    /// Read the top of the operand stack into `dst` without adjusting depth.
    pub fn peek(&self, e: &mut AsmEmitter, dst: Reg) -> Result<(), FrameError> {
        if self.stack_index < POINTER_SIZE {
            return Err(FrameError::Underflow);
        }
        e.linef(format_args!(
            "mov {},qword [{}+{}]",
            dst,
            Reg::FRAME_BASE,
            self.stack_index
        ));
        Ok(())
    }

    /// Store `src` into slot `index` of the region anchored at `base`.
    ///
    /// Used for locals (base = r8) and call arguments (base = rdx); these are
    /// fixed indexed regions independent of the operand stack.
    pub fn store_indexed(&self, e: &mut AsmEmitter, index: u32, src: Reg, base: Reg) {
        e.linef(format_args!(
            "mov qword [{}+{}],{}",
            base,
            index as i64 * POINTER_SIZE,
            src
        ));
    }

    /// Load slot `index` of the region anchored at `base` into `dst`.
    pub fn load_indexed(&self, e: &mut AsmEmitter, index: u32, dst: Reg, base: Reg) {
        e.linef(format_args!(
            "mov {},qword [{}+{}]",
            dst,
            base,
            index as i64 * POINTER_SIZE
        ));
    }

    /// Store `src` into the named static cell.
    pub fn store_named(&self, e: &mut AsmEmitter, name: &str, src: Reg) {
        e.linef(format_args!("mov [{name}],{src}"));
    }

    /// Load the named static cell into `dst`.
    pub fn load_named(&self, e: &mut AsmEmitter, name: &str, dst: Reg) {
        e.linef(format_args!("mov {dst},[{name}]"));
    }
}
