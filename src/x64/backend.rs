// This module implements the instruction selector, the 40% core of the backend.
// Amd64Backend walks the decoded module in declaration order: per type it emits
// the static-field storage cells, then per method (instance constructors are
// never compiled) a label followed by one native sequence per bytecode
// instruction, with branch labels placed by the pre-collected BranchMap and all
// operand traffic going through the frame model. Binary operations are emitted
// in pop order, so the left operand is the value pushed first and popped second
// (sub computes left - right). Calls drain the operand stack into the argument
// region in reverse parameter order and are validated against a symbol table
// built in a pre-pass over every compilable method, making calls to unknown
// methods fatal. A static constructor gets its one-shot `call` emitted at the
// point its declaration is encountered, and its body is emitted as a callable
// routine after the type's regular methods. Unsupported opcodes follow the
// session policy: permissive records a diagnostic and emits nothing, strict
// fails the build.

//! Instruction selection for the x86-64 bare-metal target.

use crate::core::{
    CompilationSession, CompileError, CompileResult, Inst, MethodDef, Module, Opcode, OpcodeMode,
    Operand, TypeDef,
};

use super::boot;
use super::branches::{branch_target, BranchMap};
use super::emitter::{AsmEmitter, SymbolTable};
use super::frame::{Frame, FrameError, Reg};

/// Bare-metal x86-64 code generator.
///
/// One backend instance performs one compilation run: bootstrap prologue first,
/// then every type's fields and methods, producing the final assembly text.
pub struct Amd64Backend<'arena> {
    session: &'arena CompilationSession<'arena>,
    emitter: AsmEmitter,
    frame: Frame,
    symbols: SymbolTable<'arena>,
}

impl<'arena> Amd64Backend<'arena> {
    pub fn new(session: &'arena CompilationSession<'arena>) -> Self {
        Self {
            session,
            emitter: AsmEmitter::new(),
            frame: Frame::new(),
            symbols: SymbolTable::new(),
        }
    }

    /// Compile the whole module into assembly text.
    pub fn compile(mut self, module: &Module) -> CompileResult<String> {
        log::info!("compiling module: {} type(s)", module.types.len());

        boot::emit_bootstrap(&mut self.emitter);

        // Register every compilable method up front so calls resolve
        // regardless of declaration order.
        for ty in &module.types {
            for method in &ty.methods {
                if !method.is_constructor || method.is_static_constructor {
                    self.symbols.define(self.session, &method.full_name);
                }
            }
        }

        for ty in &module.types {
            self.compile_type(ty)?;
        }

        log::debug!("{}", self.session.stats());
        Ok(self.emitter.finish())
    }

    fn compile_type(&mut self, ty: &TypeDef) -> CompileResult<()> {
        log::debug!("compiling type {}", ty.name);

        // Static-field storage cells come first, initialized to the declared
        // constant or zero.
        for field in &ty.fields {
            if !field.is_static {
                continue;
            }
            let sym = self.symbols.define(self.session, &field.name);
            self.emitter.label(sym);
            self.emitter
                .linef(format_args!("dq {}", field.constant.unwrap_or(0)));
        }

        // Static-constructor bodies are deferred past the regular methods so
        // the inline `call` at the declaration point is not immediately
        // followed by a second, fall-through execution of the same body.
        let mut deferred: Vec<&MethodDef> = Vec::new();

        for method in &ty.methods {
            if method.is_static_constructor {
                let sym = self.symbols.define(self.session, &method.full_name);
                self.emitter.linef(format_args!("call {sym}"));
                deferred.push(method);
                continue;
            }
            if method.is_constructor {
                log::trace!("skipping instance constructor {}", method.full_name);
                continue;
            }
            self.compile_method(method)?;
        }

        for method in deferred {
            self.compile_method(method)?;
        }

        Ok(())
    }

    fn compile_method(&mut self, method: &MethodDef) -> CompileResult<()> {
        let sym = self.symbols.define(self.session, &method.full_name);

        // Targets must be collected before any instruction is translated;
        // forward branches reference labels not yet emitted.
        let branches = BranchMap::collect(self.session, method, sym)?;

        self.frame.reset();
        self.emitter.label(sym);

        let mut selected = 0usize;
        for inst in &method.body {
            if let Some(label) = branches.label_at(inst.offset) {
                self.emitter.label(label);
            }
            self.emitter.comment(inst.opcode.mnemonic());
            if self.select_inst(method, inst, &branches)? {
                selected += 1;
                self.session.record_instruction(inst.opcode.mnemonic());
            }
        }

        self.session
            .record_method_compiled(&method.full_name, selected);
        Ok(())
    }

    /// Translate one instruction. Returns whether anything was selected
    /// (false only for unsupported opcodes under the permissive policy).
    fn select_inst(
        &mut self,
        method: &MethodDef,
        inst: &Inst,
        branches: &BranchMap<'arena>,
    ) -> CompileResult<bool> {
        match &inst.opcode {
            Opcode::Nop => self.emitter.line("nop"),
            Opcode::Ret => self.emitter.line("ret"),

            Opcode::LdcI4M1 => self.frame.push_imm(&mut self.emitter, -1),
            Opcode::LdcI4_0 => self.frame.push_imm(&mut self.emitter, 0),
            Opcode::LdcI4_1 => self.frame.push_imm(&mut self.emitter, 1),
            Opcode::LdcI4_2 => self.frame.push_imm(&mut self.emitter, 2),
            Opcode::LdcI4_3 => self.frame.push_imm(&mut self.emitter, 3),
            Opcode::LdcI4_4 => self.frame.push_imm(&mut self.emitter, 4),
            Opcode::LdcI4_5 => self.frame.push_imm(&mut self.emitter, 5),
            Opcode::LdcI4_6 => self.frame.push_imm(&mut self.emitter, 6),
            Opcode::LdcI4_7 => self.frame.push_imm(&mut self.emitter, 7),
            Opcode::LdcI4_8 => self.frame.push_imm(&mut self.emitter, 8),
            Opcode::LdcI4 => {
                let value = imm_operand(method, inst)?;
                self.frame.push_imm(&mut self.emitter, value);
            }

            Opcode::ConvI | Opcode::ConvI4 => {
                self.pop(method, inst, Reg::Rax)?;
                self.emitter.line("and rax,0xFFFFFFFF");
                self.frame.push_reg(&mut self.emitter, Reg::Rax);
            }
            Opcode::ConvI1 | Opcode::ConvU1 => {
                self.pop(method, inst, Reg::Rax)?;
                self.emitter.line("and rax,0xFF");
                self.frame.push_reg(&mut self.emitter, Reg::Rax);
            }

            Opcode::StindI1 => {
                // Value, then address.
                self.pop(method, inst, Reg::Rax)?;
                self.pop(method, inst, Reg::Rbx)?;
                self.emitter.line("mov [rbx],al");
            }

            Opcode::Add => self.binary_op(method, inst, "add rbx,rax")?,
            Opcode::Sub => self.binary_op(method, inst, "sub rbx,rax")?,
            Opcode::Or => self.binary_op(method, inst, "or rbx,rax")?,
            Opcode::Xor => self.binary_op(method, inst, "xor rbx,rax")?,

            Opcode::Ldloc0 => self.load_slot(0, Reg::LOCALS_BASE),
            Opcode::Ldloc1 => self.load_slot(1, Reg::LOCALS_BASE),
            Opcode::Ldloc2 => self.load_slot(2, Reg::LOCALS_BASE),
            Opcode::Ldloc3 => self.load_slot(3, Reg::LOCALS_BASE),
            Opcode::Ldloc => {
                let index = local_operand(method, inst)?;
                self.load_slot(index, Reg::LOCALS_BASE);
            }

            Opcode::Stloc0 => self.store_local(method, inst, 0)?,
            Opcode::Stloc1 => self.store_local(method, inst, 1)?,
            Opcode::Stloc2 => self.store_local(method, inst, 2)?,
            Opcode::Stloc3 => self.store_local(method, inst, 3)?,
            Opcode::Stloc => {
                let index = local_operand(method, inst)?;
                self.store_local(method, inst, index)?;
            }

            Opcode::Dup => {
                self.peek(method, inst, Reg::Rax)?;
                self.frame.push_reg(&mut self.emitter, Reg::Rax);
            }

            Opcode::Br => {
                let label = resolved_label(branches, method, inst)?;
                self.emitter.linef(format_args!("jmp {label}"));
            }
            Opcode::Brtrue => {
                let label = resolved_label(branches, method, inst)?;
                self.pop(method, inst, Reg::Rax)?;
                self.emitter.line("cmp rax,0");
                self.emitter.linef(format_args!("jnz {label}"));
            }
            Opcode::Brfalse => {
                let label = resolved_label(branches, method, inst)?;
                self.pop(method, inst, Reg::Rax)?;
                self.emitter.line("cmp rax,0");
                self.emitter.linef(format_args!("jz {label}"));
            }

            Opcode::Clt => self.compare_op(method, inst, "setl")?,
            Opcode::Ceq => self.compare_op(method, inst, "sete")?,

            Opcode::Call => {
                let callee = method_operand(method, inst)?;
                let target = self.symbols.lookup(&callee.full_name).ok_or_else(|| {
                    CompileError::UnresolvedCall {
                        method: method.full_name.clone(),
                        callee: callee.full_name.clone(),
                    }
                })?;

                // Drain the operand stack into argument slots, last
                // parameter first.
                for i in (0..callee.param_count).rev() {
                    self.pop(method, inst, Reg::Rax)?;
                    self.frame
                        .store_indexed(&mut self.emitter, i, Reg::Rax, Reg::ARGS_BASE);
                }
                self.emitter.linef(format_args!("call {target}"));
            }

            Opcode::Ldarg0 => self.load_slot(0, Reg::ARGS_BASE),
            Opcode::Ldarg1 => self.load_slot(1, Reg::ARGS_BASE),
            Opcode::Ldarg2 => self.load_slot(2, Reg::ARGS_BASE),
            Opcode::Ldarg3 => self.load_slot(3, Reg::ARGS_BASE),
            Opcode::Ldarg => {
                let index = arg_operand(method, inst)?;
                self.load_slot(index, Reg::ARGS_BASE);
            }

            Opcode::Ldsfld => {
                let field = field_operand(method, inst)?.clone();
                let sym = self.symbols.define(self.session, &field.name);
                self.frame.load_named(&mut self.emitter, sym, Reg::Rax);
                self.frame.push_reg(&mut self.emitter, Reg::Rax);
            }
            Opcode::Stsfld => {
                let field = field_operand(method, inst)?.clone();
                let sym = self.symbols.define(self.session, &field.name);
                self.pop(method, inst, Reg::Rax)?;
                self.frame.store_named(&mut self.emitter, sym, Reg::Rax);
            }

            Opcode::Unsupported(mnemonic) => match self.session.mode() {
                OpcodeMode::Strict => {
                    return Err(CompileError::UnsupportedOpcode {
                        method: method.full_name.clone(),
                        mnemonic: mnemonic.to_string(),
                        offset: inst.offset,
                    });
                }
                OpcodeMode::Permissive => {
                    log::warn!(
                        "unimplemented opcode {mnemonic} at IL_{:04x} in {}",
                        inst.offset,
                        method.full_name
                    );
                    self.session
                        .record_skipped(&method.full_name, mnemonic, inst.offset);
                    return Ok(false);
                }
            },
        }
        Ok(true)
    }

    /// Pop right then left, apply `op` as "left op right", push the result.
    fn binary_op(&mut self, method: &MethodDef, inst: &Inst, op: &str) -> CompileResult<()> {
        self.pop(method, inst, Reg::Rax)?;
        self.pop(method, inst, Reg::Rbx)?;
        self.emitter.line(op);
        self.frame.push_reg(&mut self.emitter, Reg::Rbx);
        Ok(())
    }

    /// Pop both operands, compare, push exactly 0 or 1 via `setcc`.
    ///
    /// The result register is zeroed between cmp and setcc (mov leaves the
    /// flags alone) so the pushed value never carries stale upper bits.
    fn compare_op(&mut self, method: &MethodDef, inst: &Inst, setcc: &str) -> CompileResult<()> {
        self.pop(method, inst, Reg::Rax)?;
        self.pop(method, inst, Reg::Rbx)?;
        self.emitter.line("cmp rbx,rax");
        self.emitter.line("mov rbx,0");
        self.emitter.linef(format_args!("{setcc} bl"));
        self.frame.push_reg(&mut self.emitter, Reg::Rbx);
        Ok(())
    }

    /// Load an indexed slot and push it.
    fn load_slot(&mut self, index: u32, base: Reg) {
        self.frame
            .load_indexed(&mut self.emitter, index, Reg::Rax, base);
        self.frame.push_reg(&mut self.emitter, Reg::Rax);
    }

    /// Pop the top of stack into a local slot.
    fn store_local(&mut self, method: &MethodDef, inst: &Inst, index: u32) -> CompileResult<()> {
        self.pop(method, inst, Reg::Rax)?;
        self.frame
            .store_indexed(&mut self.emitter, index, Reg::Rax, Reg::LOCALS_BASE);
        Ok(())
    }

    fn pop(&mut self, method: &MethodDef, inst: &Inst, dst: Reg) -> CompileResult<()> {
        self.frame
            .pop(&mut self.emitter, dst)
            .map_err(|FrameError::Underflow| CompileError::StackUnderflow {
                method: method.full_name.clone(),
                offset: inst.offset,
            })
    }

    fn peek(&mut self, method: &MethodDef, inst: &Inst, dst: Reg) -> CompileResult<()> {
        self.frame
            .peek(&mut self.emitter, dst)
            .map_err(|FrameError::Underflow| CompileError::StackUnderflow {
                method: method.full_name.clone(),
                offset: inst.offset,
            })
    }
}

fn resolved_label<'arena>(
    branches: &BranchMap<'arena>,
    method: &MethodDef,
    inst: &Inst,
) -> CompileResult<&'arena str> {
    let target = branch_target(inst, &method.full_name)?;
    Ok(branches
        .label_at(target)
        .expect("branch targets are collected before emission"))
}

fn missing_operand(method: &MethodDef, inst: &Inst) -> CompileError {
    CompileError::MissingOperand {
        method: method.full_name.clone(),
        mnemonic: inst.opcode.mnemonic().to_string(),
        offset: inst.offset,
    }
}

fn imm_operand(method: &MethodDef, inst: &Inst) -> CompileResult<i64> {
    match inst.operand {
        Operand::Imm(value) => Ok(value),
        _ => Err(missing_operand(method, inst)),
    }
}

fn local_operand(method: &MethodDef, inst: &Inst) -> CompileResult<u32> {
    match inst.operand {
        Operand::Local(index) => Ok(index),
        _ => Err(missing_operand(method, inst)),
    }
}

fn arg_operand(method: &MethodDef, inst: &Inst) -> CompileResult<u32> {
    match inst.operand {
        Operand::Arg(index) => Ok(index),
        _ => Err(missing_operand(method, inst)),
    }
}

fn field_operand<'i>(
    method: &MethodDef,
    inst: &'i Inst,
) -> CompileResult<&'i crate::core::FieldRef> {
    match &inst.operand {
        Operand::Field(field) => Ok(field),
        _ => Err(missing_operand(method, inst)),
    }
}

fn method_operand<'i>(
    method: &MethodDef,
    inst: &'i Inst,
) -> CompileResult<&'i crate::core::MethodRef> {
    match &inst.operand {
        Operand::Method(m) => Ok(m),
        _ => Err(missing_operand(method, inst)),
    }
}
