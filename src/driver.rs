// This module orchestrates the artifact chain. A compilation run is strictly
// linear: generate assembly text in memory, write it to disk, have the external
// assembler produce the flat binary, then wrap and link it into the ELF image.
// Every stage is a full rewrite of its input and the linker depends on the
// assembler's output, so the two toolchain operations run sequentially and any
// failure aborts the run; no partial image is treated as valid. ImagePaths
// derives the .asm/.bin/.o/.elf path family from one output stem the way the
// source system derived them from its output argument. compile_to_asm is the
// in-memory entry point (it owns the arena and session for one run and hands
// back the text plus the permissive-mode diagnostics); build_image is the full
// pipeline on top of it.

//! Compilation pipeline orchestration.

use std::fs;
use std::path::{Path, PathBuf};

use bumpalo::Bump;

use crate::core::{CompilationSession, CompileResult, Module, OpcodeMode, SkippedOpcode};
use crate::toolchain::Toolchain;
use crate::x64::Amd64Backend;

/// The artifact chain derived from one output stem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePaths {
    pub asm: PathBuf,
    pub bin: PathBuf,
    pub obj: PathBuf,
    pub elf: PathBuf,
}

impl ImagePaths {
    /// Derive the full chain from `output`, replacing any extension.
    pub fn from_stem(output: &Path) -> Self {
        let with_ext = |ext: &str| {
            let mut p = output.to_path_buf();
            p.set_extension(ext);
            p
        };
        Self {
            asm: with_ext("asm"),
            bin: with_ext("bin"),
            obj: with_ext("o"),
            elf: with_ext("elf"),
        }
    }
}

/// Result of one in-memory compilation run.
#[derive(Debug)]
pub struct CompiledAsm {
    /// The generated assembly text.
    pub text: String,
    /// Instructions skipped under the permissive policy, in traversal order.
    pub skipped: Vec<SkippedOpcode>,
}

/// Compile a module to assembly text, owning the session for one run.
pub fn compile_to_asm(module: &Module, mode: OpcodeMode) -> CompileResult<CompiledAsm> {
    let arena = Bump::new();
    let session = CompilationSession::with_mode(&arena, mode);
    let text = Amd64Backend::new(&session).compile(module)?;
    let skipped = session.diagnostics().clone();

    for diag in &skipped {
        log::warn!("{diag}");
    }

    Ok(CompiledAsm { text, skipped })
}

/// Run the whole pipeline: assembly text, flat binary, linked ELF image.
pub fn build_image(
    module: &Module,
    output: &Path,
    mode: OpcodeMode,
    toolchain: &dyn Toolchain,
) -> CompileResult<ImagePaths> {
    let paths = ImagePaths::from_stem(output);
    let compiled = compile_to_asm(module, mode)?;

    fs::write(&paths.asm, &compiled.text)?;
    log::info!("wrote {}", paths.asm.display());

    toolchain.assemble(&paths.asm, &paths.bin)?;
    toolchain.link(&paths.bin, &paths.obj, &paths.elf)?;
    log::info!("linked {}", paths.elf.display());

    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_share_one_stem() {
        let paths = ImagePaths::from_stem(Path::new("build/kernel.elf"));
        assert_eq!(paths.asm, PathBuf::from("build/kernel.asm"));
        assert_eq!(paths.bin, PathBuf::from("build/kernel.bin"));
        assert_eq!(paths.obj, PathBuf::from("build/kernel.o"));
        assert_eq!(paths.elf, PathBuf::from("build/kernel.elf"));
    }
}
