// This module is the external-tool boundary. The compiler core only ever talks
// to the Toolchain trait, which has exactly two operations: assemble the textual
// output into a flat binary, and link that binary into the final ELF executable
// (internally a two-step objcopy + linker invocation, since the flat binary has
// to be wrapped in an object first). NativeToolchain shells out to nasm, objcopy
// and ld.lld with the fixed argument templates the image build expects; tool
// names are plain fields so tests and unusual environments can substitute
// paths. A non-zero exit is fatal and carries the tool's stderr unmodified; a
// missing executable is distinguished so the diagnostic names the tool instead
// of a bare NotFound.

//! External assembler/linker boundary.

use std::path::Path;
use std::process::Command;

use thiserror::Error;

/// Failures at the external-tool boundary. All fatal.
#[derive(Error, Debug)]
pub enum ToolchainError {
    #[error("{tool} not found on PATH")]
    ToolMissing { tool: String },

    #[error("{tool} failed ({status}):\n{stderr}")]
    ToolFailed {
        tool: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The two operations the core needs from an assembler/linker pair.
///
/// Keeping this a trait means the core never depends on any tool's invocation
/// syntax and an in-process encoder could be substituted without touching the
/// code generator.
pub trait Toolchain {
    /// Translate assembly text into a flat binary.
    fn assemble(&self, asm: &Path, bin: &Path) -> Result<(), ToolchainError>;

    /// Wrap the flat binary and link it into the final executable.
    fn link(&self, bin: &Path, obj: &Path, elf: &Path) -> Result<(), ToolchainError>;
}

/// nasm + objcopy + ld.lld, invoked as external processes.
#[derive(Debug, Clone)]
pub struct NativeToolchain {
    pub assembler: String,
    pub objcopy: String,
    pub linker: String,
    pub linker_script: String,
}

impl Default for NativeToolchain {
    fn default() -> Self {
        Self {
            assembler: "nasm".into(),
            objcopy: "objcopy".into(),
            linker: "ld.lld".into(),
            linker_script: "linker.ld".into(),
        }
    }
}

impl NativeToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    fn run(&self, tool: &str, args: &[&std::ffi::OsStr]) -> Result<(), ToolchainError> {
        log::debug!("running {tool} {args:?}");
        let output = Command::new(tool).args(args).output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ToolchainError::ToolMissing {
                    tool: tool.to_string(),
                }
            } else {
                ToolchainError::Io(e)
            }
        })?;

        if !output.status.success() {
            return Err(ToolchainError::ToolFailed {
                tool: tool.to_string(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(())
    }
}

impl Toolchain for NativeToolchain {
    fn assemble(&self, asm: &Path, bin: &Path) -> Result<(), ToolchainError> {
        self.run(
            &self.assembler,
            &[
                "-f".as_ref(),
                "bin".as_ref(),
                asm.as_os_str(),
                "-o".as_ref(),
                bin.as_os_str(),
            ],
        )
    }

    fn link(&self, bin: &Path, obj: &Path, elf: &Path) -> Result<(), ToolchainError> {
        self.run(
            &self.objcopy,
            &[
                "-I".as_ref(),
                "binary".as_ref(),
                "-O".as_ref(),
                "elf64-x86-64".as_ref(),
                "-B".as_ref(),
                "i386".as_ref(),
                bin.as_os_str(),
                obj.as_os_str(),
            ],
        )?;
        self.run(
            &self.linker,
            &[
                "-m".as_ref(),
                "elf_x86_64".as_ref(),
                "-T".as_ref(),
                self.linker_script.as_ref(),
                "-o".as_ref(),
                elf.as_os_str(),
                obj.as_os_str(),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn missing_assembler_is_reported_by_name() {
        let toolchain = NativeToolchain {
            assembler: "ferrocil-no-such-assembler".into(),
            ..NativeToolchain::default()
        };
        let err = toolchain
            .assemble(&PathBuf::from("a.asm"), &PathBuf::from("a.bin"))
            .unwrap_err();

        match err {
            ToolchainError::ToolMissing { tool } => {
                assert_eq!(tool, "ferrocil-no-such-assembler");
            }
            other => panic!("expected ToolMissing, got {other:?}"),
        }
    }

    #[test]
    fn missing_objcopy_is_reported_by_name() {
        let toolchain = NativeToolchain {
            objcopy: "ferrocil-no-such-objcopy".into(),
            ..NativeToolchain::default()
        };
        let err = toolchain
            .link(
                &PathBuf::from("a.bin"),
                &PathBuf::from("a.o"),
                &PathBuf::from("a.elf"),
            )
            .unwrap_err();

        assert!(matches!(err, ToolchainError::ToolMissing { .. }));
    }
}
