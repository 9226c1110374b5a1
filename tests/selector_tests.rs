//! End-to-end properties of the instruction selector, checked against the
//! generated assembly text.

use ferrocil::core::{
    FieldRef, MethodBuilder, MethodRef, ModuleBuilder, Opcode, OpcodeMode, Operand, TypeBuilder,
};
use ferrocil::{compile_to_asm, CompileError, Module};

fn asm_for(module: &Module) -> String {
    let compiled = compile_to_asm(module, OpcodeMode::Permissive).unwrap();
    assert!(
        compiled.skipped.is_empty(),
        "unexpected skipped instructions: {:?}",
        compiled.skipped
    );
    compiled.text
}

fn main_only(body: MethodBuilder) -> Module {
    ModuleBuilder::new()
        .ty(TypeBuilder::new("Program").method(body))
        .build()
}

#[test]
fn add_sequence_emits_the_exact_stack_traffic() {
    let module = main_only(
        MethodBuilder::new("Program::Main")
            .inst(Opcode::LdcI4_2)
            .inst(Opcode::LdcI4_3)
            .inst(Opcode::Add)
            .inst(Opcode::Ret),
    );

    let asm = asm_for(&module);
    let expected = "Program__Main:\n\
                    ;ldc.i4.2\n\
                    mov qword [rbp+8],2\n\
                    ;ldc.i4.3\n\
                    mov qword [rbp+16],3\n\
                    ;add\n\
                    mov rax,qword [rbp+16]\n\
                    mov rbx,qword [rbp+8]\n\
                    add rbx,rax\n\
                    mov qword [rbp+8],rbx\n\
                    ;ret\n\
                    ret\n";
    assert!(asm.ends_with(expected), "unexpected tail:\n{asm}");
}

#[test]
fn sub_takes_the_first_pushed_value_as_left_operand() {
    // 5 - 3: pop order reverses push order, so the subtrahend comes off
    // first and the minuend must end up in the destination register.
    let module = main_only(
        MethodBuilder::new("Program::Main")
            .inst(Opcode::LdcI4_5)
            .inst(Opcode::LdcI4_3)
            .inst(Opcode::Sub)
            .inst(Opcode::Ret),
    );

    let asm = asm_for(&module);
    let expected = ";sub\n\
                    mov rax,qword [rbp+16]\n\
                    mov rbx,qword [rbp+8]\n\
                    sub rbx,rax\n\
                    mov qword [rbp+8],rbx\n";
    assert!(asm.contains(expected), "unexpected sub lowering:\n{asm}");
}

#[test]
fn bootstrap_precedes_all_method_code() {
    let module = main_only(MethodBuilder::new("Program::Main").inst(Opcode::Ret));
    let asm = asm_for(&module);

    assert!(asm.starts_with("[bits 32]\n"));
    let long_mode = asm.find("[bits 64]").unwrap();
    let main = asm.find("Program__Main:").unwrap();
    assert!(long_mode < main);
    assert_eq!(asm.matches("_start:").count(), 1);
}

#[test]
fn call_drains_arguments_last_parameter_first() {
    let write_byte = MethodRef {
        full_name: "Display::WriteByte".into(),
        param_count: 2,
    };
    let module = ModuleBuilder::new()
        .ty(TypeBuilder::new("Display").method(
            MethodBuilder::new("Display::WriteByte")
                .params(2)
                .inst(Opcode::Ldarg0)
                .inst(Opcode::Ldarg1)
                .inst(Opcode::StindI1)
                .inst(Opcode::Ret),
        ))
        .ty(TypeBuilder::new("Program").method(
            MethodBuilder::new("Program::Main")
                .inst_with(Opcode::LdcI4, Operand::Imm(0xB8000))
                .inst_with(Opcode::LdcI4, Operand::Imm(65))
                .inst_with(Opcode::Call, Operand::Method(write_byte))
                .inst(Opcode::Ret),
        ))
        .build();

    let asm = asm_for(&module);

    // The value (pushed second, slot 1) is popped before the address (slot 0).
    let expected = ";call\n\
                    mov rax,qword [rbp+16]\n\
                    mov qword [rdx+8],rax\n\
                    mov rax,qword [rbp+8]\n\
                    mov qword [rdx+0],rax\n\
                    call Display__WriteByte\n";
    assert!(asm.contains(expected), "unexpected call lowering:\n{asm}");

    // The callee reads the same slots back.
    assert!(asm.contains("mov rax,qword [rdx+0]"));
    assert!(asm.contains("mov rax,qword [rdx+8]"));
    assert!(asm.contains("mov [rbx],al"));
}

#[test]
fn comparisons_zero_the_result_before_setcc() {
    let module = main_only(
        MethodBuilder::new("Program::Main")
            .inst(Opcode::LdcI4_1)
            .inst(Opcode::LdcI4_2)
            .inst(Opcode::Clt)
            .inst(Opcode::LdcI4_1)
            .inst(Opcode::Ceq)
            .inst(Opcode::Ret),
    );

    let asm = asm_for(&module);
    assert!(asm.contains("cmp rbx,rax\nmov rbx,0\nsetl bl\n"));
    assert!(asm.contains("cmp rbx,rax\nmov rbx,0\nsete bl\n"));
}

#[test]
fn every_branch_target_gets_exactly_one_label() {
    // counter loop: bump a static until it reaches 8, then spin.
    let counter = || Operand::Field(FieldRef {
        name: "counter".into(),
    });
    let module = ModuleBuilder::new()
        .ty(TypeBuilder::new("Program")
            .static_field("counter", None)
            .method(
                MethodBuilder::new("Program::Main")
                    .inst_with(Opcode::Ldsfld, counter()) // 0
                    .inst(Opcode::LdcI4_1) // 1
                    .inst(Opcode::Add) // 2
                    .inst_with(Opcode::Stsfld, counter()) // 3
                    .inst_with(Opcode::Ldsfld, counter()) // 4
                    .inst(Opcode::LdcI4_8) // 5
                    .inst(Opcode::Clt) // 6
                    .inst_with(Opcode::Brtrue, Operand::Target(0)) // 7
                    .inst_with(Opcode::Br, Operand::Target(8)), // 8, spin
            ))
        .build();

    let asm = asm_for(&module);

    assert_eq!(asm.matches("Program__Main_IL_0000:").count(), 1);
    assert_eq!(asm.matches("Program__Main_IL_0008:").count(), 1);
    assert!(asm.contains("jnz Program__Main_IL_0000"));
    assert!(asm.contains("jmp Program__Main_IL_0008"));

    // Every emitted jump to an IL label must land on a defined label.
    for line in asm.lines() {
        let target = match line
            .strip_prefix("jmp ")
            .or_else(|| line.strip_prefix("jnz "))
            .or_else(|| line.strip_prefix("jz "))
        {
            Some(t) if t.contains("_IL_") => t,
            _ => continue,
        };
        assert!(
            asm.contains(&format!("{target}:")),
            "jump to undefined label {target}"
        );
    }
}

#[test]
fn operand_stack_is_method_scoped() {
    let module = ModuleBuilder::new()
        .ty(TypeBuilder::new("Program")
            .method(
                MethodBuilder::new("Program::First")
                    .inst(Opcode::LdcI4_5)
                    .inst(Opcode::Ret),
            )
            .method(
                MethodBuilder::new("Program::Second")
                    .inst(Opcode::LdcI4_5)
                    .inst(Opcode::Ret),
            ))
        .build();

    // Both methods start addressing from the frame base.
    let asm = asm_for(&module);
    assert_eq!(asm.matches("mov qword [rbp+8],5").count(), 2);
}

#[test]
fn narrowing_masks_the_popped_value() {
    let module = main_only(
        MethodBuilder::new("Program::Main")
            .inst_with(Opcode::LdcI4, Operand::Imm(0x1FF))
            .inst(Opcode::ConvU1)
            .inst(Opcode::Ret),
    );

    let asm = asm_for(&module);
    assert!(asm.contains("and rax,0xFF\nmov qword [rbp+8],rax\n"));
}

#[test]
fn permissive_mode_skips_and_reports_unknown_opcodes() {
    let module = main_only(
        MethodBuilder::new("Program::Main")
            .inst(Opcode::LdcI4_2)
            .inst(Opcode::LdcI4_3)
            .inst(Opcode::Unsupported("mul"))
            .inst(Opcode::Ret),
    );

    let compiled = compile_to_asm(&module, OpcodeMode::Permissive).unwrap();

    assert_eq!(compiled.skipped.len(), 1);
    assert_eq!(compiled.skipped[0].mnemonic, "mul");
    assert_eq!(compiled.skipped[0].offset, 2);

    // The mnemonic comment is still placed, with no code under it, and the
    // rest of the method compiles.
    assert!(compiled.text.contains(";mul\n;ret\nret\n"));
}

#[test]
fn strict_mode_rejects_unknown_opcodes() {
    let module = main_only(
        MethodBuilder::new("Program::Main")
            .inst(Opcode::Unsupported("mul"))
            .inst(Opcode::Ret),
    );

    let err = compile_to_asm(&module, OpcodeMode::Strict).unwrap_err();
    match err {
        CompileError::UnsupportedOpcode {
            mnemonic, offset, ..
        } => {
            assert_eq!(mnemonic, "mul");
            assert_eq!(offset, 0);
        }
        other => panic!("expected UnsupportedOpcode, got {other}"),
    }
}
