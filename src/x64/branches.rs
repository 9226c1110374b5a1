// This module resolves branch targets ahead of instruction selection. Forward
// branches reference labels that do not exist yet in emission order, so the
// backend runs this pre-pass over a method body first: collect the target offset
// of every br/brtrue/brfalse, check that each one lands on an actual instruction
// boundary (a target pointing between instructions means the reader handed us a
// malformed module, which is fatal), and assign each target a deterministic
// label derived from the method symbol and the offset. During emission the
// selector asks `label_at` before translating each instruction and places the
// label if the instruction is a known target. Label names are interned in the
// session arena so the map hands out plain `&str` without cloning.

//! Branch-target collection and label naming.

use std::collections::HashMap;

use crate::core::{CompilationSession, CompileError, CompileResult, Inst, MethodDef};

/// Branch labels for one method, keyed by target offset.
#[derive(Debug)]
pub struct BranchMap<'arena> {
    labels: HashMap<u32, &'arena str>,
}

impl<'arena> BranchMap<'arena> {
    /// Pre-scan `method` and build the label set for every branch target.
    ///
    /// Must complete before any instruction of the method is translated.
    pub fn collect(
        session: &CompilationSession<'arena>,
        method: &MethodDef,
        method_sym: &str,
    ) -> CompileResult<Self> {
        let mut labels = HashMap::new();

        for inst in &method.body {
            if !inst.opcode.is_branch() {
                continue;
            }
            let target = branch_target(inst, &method.full_name)?;
            if !method.body.iter().any(|i| i.offset == target) {
                return Err(CompileError::BadBranchTarget {
                    method: method.full_name.clone(),
                    target,
                });
            }
            labels
                .entry(target)
                .or_insert_with(|| session.intern(&format!("{method_sym}_IL_{target:04x}")));
        }

        Ok(Self { labels })
    }

    /// Label to place immediately before the instruction at `offset`, if any.
    pub fn label_at(&self, offset: u32) -> Option<&'arena str> {
        self.labels.get(&offset).copied()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Target offset of a branch instruction's operand.
pub fn branch_target(inst: &Inst, method_name: &str) -> CompileResult<u32> {
    match inst.operand {
        crate::core::Operand::Target(offset) => Ok(offset),
        _ => Err(CompileError::MissingOperand {
            method: method_name.to_string(),
            mnemonic: inst.opcode.mnemonic().to_string(),
            offset: inst.offset,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{MethodBuilder, Opcode, Operand};
    use bumpalo::Bump;

    #[test]
    fn collects_forward_and_backward_targets() {
        let method = MethodBuilder::new("Program::Loop")
            .inst(Opcode::LdcI4_0) // 0
            .inst_with(Opcode::Br, Operand::Target(3)) // 1, forward
            .inst(Opcode::Nop) // 2
            .inst_with(Opcode::Brtrue, Operand::Target(0)) // 3, backward
            .inst(Opcode::Ret) // 4
            .build();

        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let map = BranchMap::collect(&session, &method, "Program_Loop").unwrap();

        assert_eq!(map.len(), 2);
        assert_eq!(map.label_at(3), Some("Program_Loop_IL_0003"));
        assert_eq!(map.label_at(0), Some("Program_Loop_IL_0000"));
        assert_eq!(map.label_at(2), None);
    }

    #[test]
    fn duplicate_targets_share_one_label() {
        let method = MethodBuilder::new("Program::Join")
            .inst_with(Opcode::Brfalse, Operand::Target(2)) // 0
            .inst_with(Opcode::Br, Operand::Target(2)) // 1
            .inst(Opcode::Ret) // 2
            .build();

        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let map = BranchMap::collect(&session, &method, "Program_Join").unwrap();

        assert_eq!(map.len(), 1);
        assert_eq!(map.label_at(2), Some("Program_Join_IL_0002"));
    }

    #[test]
    fn target_off_instruction_boundary_is_fatal() {
        let method = MethodBuilder::new("Program::Bad")
            .inst_with(Opcode::Br, Operand::Target(9))
            .inst(Opcode::Ret)
            .build();

        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let err = BranchMap::collect(&session, &method, "Program_Bad").unwrap_err();

        assert!(matches!(
            err,
            CompileError::BadBranchTarget { target: 9, .. }
        ));
    }

    #[test]
    fn branch_without_target_operand_is_fatal() {
        let method = MethodBuilder::new("Program::NoOperand")
            .inst(Opcode::Br)
            .inst(Opcode::Ret)
            .build();

        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let err = BranchMap::collect(&session, &method, "Program_NoOperand").unwrap_err();

        assert!(matches!(err, CompileError::MissingOperand { .. }));
    }
}
