// This module provides the assembly text emitter, the single sink every other
// codegen component writes through. AsmEmitter is an append-only line buffer in
// NASM syntax; the bootstrap generator, the frame model and the instruction
// selector all funnel their output here and the driver materializes the final
// text once at the end of the run. The module also owns symbol naming: safe_name
// mangles managed names (Namespace.Type::Method(...)) into assembler-legal
// identifiers, and SymbolTable makes the mangling collision-free by suffixing a
// counter when two distinct input names collapse to the same identifier, with
// the resulting names interned in the session arena.

//! Assembly text emission and symbol naming.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::core::CompilationSession;

/// Append-only NASM text buffer.
///
/// Lines are emitted flat, one instruction or directive per line, matching the
/// external assembler's expectations. The buffer is write-only until the driver
/// takes the finished text.
#[derive(Debug, Default)]
pub struct AsmEmitter {
    buf: String,
}

impl AsmEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one line verbatim.
    pub fn line(&mut self, line: &str) {
        self.buf.push_str(line);
        self.buf.push('\n');
    }

    /// Append a formatted line.
    pub fn linef(&mut self, args: fmt::Arguments<'_>) {
        fmt::Write::write_fmt(&mut self.buf, args).expect("string formatting cannot fail");
        self.buf.push('\n');
    }

    /// Place a label definition.
    pub fn label(&mut self, name: &str) {
        self.buf.push_str(name);
        self.buf.push_str(":\n");
    }

    /// Append a comment line.
    pub fn comment(&mut self, text: &str) {
        self.buf.push(';');
        self.buf.push_str(text);
        self.buf.push('\n');
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn finish(self) -> String {
        self.buf
    }
}

/// Mangle a managed name into an assembler-legal identifier.
///
/// Every character outside `[A-Za-z0-9_]` becomes an underscore; a leading
/// digit gains an underscore prefix. The result is deterministic but not
/// injective, which is why symbol registration goes through [`SymbolTable`].
pub fn safe_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    if out.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Collision-free registry of emitted symbol names.
///
/// Maps each distinct input name to a unique interned identifier. Repeated
/// registration of the same input name returns the same symbol, so call sites
/// and definition sites agree without coordination.
#[derive(Default)]
pub struct SymbolTable<'arena> {
    by_name: HashMap<String, &'arena str>,
    used: HashSet<&'arena str>,
}

impl<'arena> SymbolTable<'arena> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` and return its unique mangled symbol.
    pub fn define(&mut self, session: &CompilationSession<'arena>, name: &str) -> &'arena str {
        if let Some(sym) = self.by_name.get(name) {
            return sym;
        }

        let base = safe_name(name);
        let mut candidate = base.clone();
        let mut n = 1u32;
        while self.used.contains(candidate.as_str()) {
            n += 1;
            candidate = format!("{base}_{n}");
        }

        let sym = session.intern(&candidate);
        self.used.insert(sym);
        self.by_name.insert(name.to_string(), sym);
        sym
    }

    /// Symbol for a previously registered name.
    pub fn lookup(&self, name: &str) -> Option<&'arena str> {
        self.by_name.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bumpalo::Bump;

    #[test]
    fn emitter_layout() {
        let mut e = AsmEmitter::new();
        e.comment("ldc.i4.2");
        e.label("Program_Main");
        e.line("ret");

        assert_eq!(e.as_str(), ";ldc.i4.2\nProgram_Main:\nret\n");
    }

    #[test]
    fn safe_name_mangles_managed_names() {
        assert_eq!(
            safe_name("System.Void Program::Main()"),
            "System_Void_Program__Main__"
        );
        assert_eq!(safe_name("counter"), "counter");
        assert_eq!(safe_name("1st"), "_1st");
    }

    #[test]
    fn symbol_table_is_stable_and_collision_free() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut symbols = SymbolTable::new();

        let a = symbols.define(&session, "Foo::Bar");
        let a_again = symbols.define(&session, "Foo::Bar");
        assert_eq!(a, "Foo__Bar");
        assert!(std::ptr::eq(a, a_again));

        // Distinct input names that mangle identically must not collide.
        let b = symbols.define(&session, "Foo..Bar");
        assert_eq!(b, "Foo__Bar_2");

        assert_eq!(symbols.lookup("Foo::Bar"), Some(a));
        assert_eq!(symbols.lookup("Missing"), None);
    }
}
