//! Demo driver for the compilation pipeline.
//!
//! Builds a small sample module in place of the external metadata reader (a
//! static counter bumped in a loop, plus a byte store into the VGA text
//! buffer) and runs it through the compiler. With `--asm-only` the generated
//! assembly is printed instead of invoking nasm/objcopy/ld.lld.

use std::path::PathBuf;

use clap::Parser;

use ferrocil::core::{
    MethodBuilder, MethodRef, ModuleBuilder, Opcode, OpcodeMode, Operand, TypeBuilder,
};
use ferrocil::{build_image, compile_to_asm, NativeToolchain};

#[derive(Parser)]
#[command(about = "Compile the built-in sample module to a bootable image")]
struct Args {
    /// Output image path; sibling .asm/.bin/.o artifacts share the stem.
    #[arg(short, long, default_value = "kernel.elf")]
    output: PathBuf,

    /// Print the generated assembly instead of running the toolchain.
    #[arg(long)]
    asm_only: bool,

    /// Fail the build on unsupported opcodes instead of skipping them.
    #[arg(long)]
    strict: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let module = sample_module();
    let mode = if args.strict {
        OpcodeMode::Strict
    } else {
        OpcodeMode::Permissive
    };

    if args.asm_only {
        let compiled = compile_to_asm(&module, mode)?;
        print!("{}", compiled.text);
        if !compiled.skipped.is_empty() {
            eprintln!("{} instruction(s) skipped", compiled.skipped.len());
        }
        return Ok(());
    }

    let paths = build_image(&module, &args.output, mode, &NativeToolchain::new())?;
    println!("image written to {}", paths.elf.display());
    Ok(())
}

/// The sample program: initialize a counter from a static constructor, bump
/// it to 8 in a loop, stamp 'A' into the VGA text buffer, then spin.
fn sample_module() -> ferrocil::Module {
    let write_byte = MethodRef {
        full_name: "Display::WriteByte".into(),
        param_count: 2,
    };

    ModuleBuilder::new()
        .ty(TypeBuilder::new("Display").method(
            // WriteByte(addr, value): store the low byte of value at addr.
            MethodBuilder::new("Display::WriteByte")
                .params(2)
                .inst(Opcode::Ldarg0)
                .inst(Opcode::Ldarg1)
                .inst(Opcode::StindI1)
                .inst(Opcode::Ret),
        ))
        .ty(TypeBuilder::new("Program")
            .static_field("counter", None)
            .method(
                MethodBuilder::new("Program::.cctor")
                    .static_constructor()
                    .inst(Opcode::LdcI4_5)
                    .inst_with(
                        Opcode::Stsfld,
                        Operand::Field(ferrocil::core::FieldRef {
                            name: "counter".into(),
                        }),
                    )
                    .inst(Opcode::Ret),
            )
            .method(
                MethodBuilder::new("Program::Main")
                    // loop: counter += 1 while counter < 8
                    .inst_with(
                        Opcode::Ldsfld,
                        Operand::Field(ferrocil::core::FieldRef {
                            name: "counter".into(),
                        }),
                    ) // 0
                    .inst(Opcode::LdcI4_1) // 1
                    .inst(Opcode::Add) // 2
                    .inst_with(
                        Opcode::Stsfld,
                        Operand::Field(ferrocil::core::FieldRef {
                            name: "counter".into(),
                        }),
                    ) // 3
                    .inst_with(
                        Opcode::Ldsfld,
                        Operand::Field(ferrocil::core::FieldRef {
                            name: "counter".into(),
                        }),
                    ) // 4
                    .inst(Opcode::LdcI4_8) // 5
                    .inst(Opcode::Clt) // 6
                    .inst_with(Opcode::Brtrue, Operand::Target(0)) // 7
                    // 'A' into the VGA text buffer
                    .inst_with(Opcode::LdcI4, Operand::Imm(0xB8000)) // 8
                    .inst_with(Opcode::LdcI4, Operand::Imm(b'A' as i64)) // 9
                    .inst_with(Opcode::Call, Operand::Method(write_byte)) // 10
                    // spin forever
                    .inst_with(Opcode::Br, Operand::Target(11)), // 11
            ))
        .build()
}
