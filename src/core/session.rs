// This module provides arena-based compilation session management using the bumpalo
// crate. CompilationSession is the per-run home of every piece of mutable compiler
// state that the original backend kept as ambient globals: symbol/label interning
// (backed by the arena), the skipped-opcode diagnostics list, compilation
// statistics, and the unsupported-opcode policy. One session lives for exactly one
// compilation run and is discarded with its arena afterwards, which keeps
// components testable in isolation and rules out state leaking between runs.
// Interior mutability via RefCell lets the backend hold a shared reference while
// recording stats and diagnostics during traversal. SessionStats tracks method and
// instruction counts plus a per-mnemonic breakdown for the selector.

//! Arena-based compilation session management.
//!
//! All per-run mutable state lives here, scoped to one compilation and never
//! reachable as global state.

use bumpalo::Bump;
use std::cell::{Ref, RefCell};
use std::collections::HashMap;
use std::fmt;

/// Policy for instructions outside the supported opcode subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpcodeMode {
    /// Report the instruction and emit nothing for it; compilation continues.
    /// This is the source system's deliberate best-effort behavior.
    #[default]
    Permissive,
    /// Fail the build on the first unsupported instruction.
    Strict,
}

/// A skipped instruction recorded in permissive mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedOpcode {
    pub method: String,
    pub mnemonic: String,
    pub offset: u32,
}

impl fmt::Display for SkippedOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unimplemented opcode {} at IL_{:04x} in {}",
            self.mnemonic, self.offset, self.method
        )
    }
}

/// Arena-based compilation session.
///
/// Owns the label/symbol interner, diagnostics and statistics for one run.
/// Everything allocated through [`CompilationSession::intern`] lives as long
/// as the session's arena.
pub struct CompilationSession<'arena> {
    /// Arena allocator for interned names.
    arena: &'arena Bump,

    /// Unsupported-opcode policy for this run.
    mode: OpcodeMode,

    /// Session statistics for debugging.
    stats: RefCell<SessionStats>,

    /// Instructions skipped in permissive mode, in traversal order.
    diagnostics: RefCell<Vec<SkippedOpcode>>,

    /// String interning so label names can be shared without cloning.
    interned: RefCell<HashMap<String, &'arena str>>,
}

impl<'arena> CompilationSession<'arena> {
    /// Create a new session with the source-faithful permissive policy.
    pub fn new(arena: &'arena Bump) -> Self {
        Self::with_mode(arena, OpcodeMode::Permissive)
    }

    pub fn with_mode(arena: &'arena Bump, mode: OpcodeMode) -> Self {
        Self {
            arena,
            mode,
            stats: RefCell::new(SessionStats::default()),
            diagnostics: RefCell::new(Vec::new()),
            interned: RefCell::new(HashMap::new()),
        }
    }

    pub fn mode(&self) -> OpcodeMode {
        self.mode
    }

    /// Intern a string in the session arena, deduplicating repeats.
    pub fn intern(&self, s: &str) -> &'arena str {
        if let Some(existing) = self.interned.borrow().get(s) {
            return existing;
        }
        let stored: &'arena str = self.arena.alloc_str(s);
        self.interned.borrow_mut().insert(s.to_string(), stored);
        stored
    }

    /// Record that a method body was fully traversed.
    pub fn record_method_compiled(&self, name: &str, inst_count: usize) {
        let mut stats = self.stats.borrow_mut();
        stats.methods_compiled += 1;
        stats.instructions_selected += inst_count;
        log::debug!("compiled {name}: {inst_count} instructions");
    }

    /// Record one selected instruction by mnemonic.
    pub fn record_instruction(&self, mnemonic: &str) {
        let mut stats = self.stats.borrow_mut();
        *stats
            .opcode_counts
            .entry(mnemonic.to_string())
            .or_insert(0) += 1;
    }

    /// Record an instruction skipped under the permissive policy.
    pub fn record_skipped(&self, method: &str, mnemonic: &str, offset: u32) {
        self.stats.borrow_mut().instructions_skipped += 1;
        self.diagnostics.borrow_mut().push(SkippedOpcode {
            method: method.to_string(),
            mnemonic: mnemonic.to_string(),
            offset,
        });
    }

    pub fn stats(&self) -> Ref<'_, SessionStats> {
        self.stats.borrow()
    }

    pub fn diagnostics(&self) -> Ref<'_, Vec<SkippedOpcode>> {
        self.diagnostics.borrow()
    }
}

/// Compilation session statistics.
#[derive(Debug, Default)]
pub struct SessionStats {
    /// Number of method bodies compiled.
    pub methods_compiled: usize,

    /// Number of bytecode instructions translated.
    pub instructions_selected: usize,

    /// Number of instructions skipped as unsupported.
    pub instructions_skipped: usize,

    /// Count of each mnemonic selected.
    pub opcode_counts: HashMap<String, usize>,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Compilation session statistics:")?;
        writeln!(f, "  Methods compiled: {}", self.methods_compiled)?;
        writeln!(f, "  Instructions selected: {}", self.instructions_selected)?;
        writeln!(f, "  Instructions skipped: {}", self.instructions_skipped)?;

        if !self.opcode_counts.is_empty() {
            writeln!(f, "  Opcode breakdown:")?;
            let mut sorted: Vec<_> = self.opcode_counts.iter().collect();
            sorted.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
            for (mnemonic, count) in sorted.iter().take(10) {
                writeln!(f, "    {mnemonic}: {count}")?;
            }
        }

        Ok(())
    }
}
