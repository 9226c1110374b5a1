// This module defines the decoded-module data model that the compiler consumes.
// The bytecode/metadata reader lives outside this crate; by the time codegen runs
// it has already lowered the managed binary into the plain owned structures here:
// a Module of ordered TypeDefs, each carrying ordered FieldDefs and MethodDefs,
// with every method body decoded into Inst records (opcode, operand, byte offset).
// Offsets are the addressing unit for branch targets and are supplied by the
// reader. Opcode is a closed enum of the supported stack-machine subset plus an
// Unsupported variant carrying the raw mnemonic for diagnostics; short (.s)
// encodings are canonicalized by the reader since operands arrive decoded. The
// module also provides ModuleBuilder/TypeBuilder/MethodBuilder, which stand in
// for the external reader in tests and the demo driver and assign sequential
// instruction offsets.

//! Decoded module model at the reader boundary.
//!
//! Everything here is constructed once before codegen and never mutated by the
//! compiler. The builders exist so tests and the demo binary can fabricate
//! modules without a real metadata reader.

use std::fmt;

/// A decoded program: an ordered collection of types.
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub types: Vec<TypeDef>,
}

/// A declared type with its fields and methods, in declaration order.
#[derive(Debug, Clone)]
pub struct TypeDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
    pub methods: Vec<MethodDef>,
}

/// A field declaration. Only static fields participate in codegen; each one
/// becomes a pointer-width storage cell initialized to its constant or zero.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub is_static: bool,
    pub constant: Option<i64>,
}

/// A method declaration with its decoded instruction stream.
///
/// Instance constructors are never compiled. A static constructor is compiled
/// as a callable routine and additionally receives a single `call` emitted at
/// the point its declaration is encountered.
#[derive(Debug, Clone)]
pub struct MethodDef {
    pub full_name: String,
    pub is_constructor: bool,
    pub is_static_constructor: bool,
    pub param_count: u32,
    pub body: Vec<Inst>,
}

/// One decoded instruction: opcode, decoded operand, byte offset in the method.
#[derive(Debug, Clone)]
pub struct Inst {
    pub opcode: Opcode,
    pub operand: Operand,
    pub offset: u32,
}

/// Reference to a static field, as resolved by the reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    pub name: String,
}

/// Reference to a callable method, as resolved by the reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodRef {
    pub full_name: String,
    pub param_count: u32,
}

/// Decoded instruction operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    None,
    /// Immediate integer literal.
    Imm(i64),
    /// Local variable slot index.
    Local(u32),
    /// Argument slot index.
    Arg(u32),
    /// Branch target byte offset within the same method.
    Target(u32),
    Field(FieldRef),
    Method(MethodRef),
}

/// The supported opcode subset, closed over what the selector can translate.
///
/// Anything the reader encounters outside this set arrives as
/// [`Opcode::Unsupported`] with the original mnemonic, which the selector
/// reports and skips (permissive mode) or rejects (strict mode).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Opcode {
    Nop,
    Ret,

    // Constant loads; fast-path encodings kept distinct, LdcI4 carries Imm.
    LdcI4M1,
    LdcI4_0,
    LdcI4_1,
    LdcI4_2,
    LdcI4_3,
    LdcI4_4,
    LdcI4_5,
    LdcI4_6,
    LdcI4_7,
    LdcI4_8,
    LdcI4,

    // Integer narrowing.
    ConvI,
    ConvI4,
    ConvI1,
    ConvU1,

    // Indirect byte store.
    StindI1,

    // Binary arithmetic / bitwise.
    Add,
    Sub,
    Or,
    Xor,

    // Locals.
    Ldloc0,
    Ldloc1,
    Ldloc2,
    Ldloc3,
    Ldloc,
    Stloc0,
    Stloc1,
    Stloc2,
    Stloc3,
    Stloc,

    Dup,

    // Branches; operand is Target.
    Br,
    Brtrue,
    Brfalse,

    // Comparisons.
    Clt,
    Ceq,

    // Calls and arguments.
    Call,
    Ldarg0,
    Ldarg1,
    Ldarg2,
    Ldarg3,
    Ldarg,

    // Static fields; operand is Field.
    Ldsfld,
    Stsfld,

    /// Anything outside the supported subset; carries the raw mnemonic.
    Unsupported(&'static str),
}

impl Opcode {
    /// CIL mnemonic, used for emitted comments and diagnostics.
    pub fn mnemonic(&self) -> &str {
        match self {
            Opcode::Nop => "nop",
            Opcode::Ret => "ret",
            Opcode::LdcI4M1 => "ldc.i4.m1",
            Opcode::LdcI4_0 => "ldc.i4.0",
            Opcode::LdcI4_1 => "ldc.i4.1",
            Opcode::LdcI4_2 => "ldc.i4.2",
            Opcode::LdcI4_3 => "ldc.i4.3",
            Opcode::LdcI4_4 => "ldc.i4.4",
            Opcode::LdcI4_5 => "ldc.i4.5",
            Opcode::LdcI4_6 => "ldc.i4.6",
            Opcode::LdcI4_7 => "ldc.i4.7",
            Opcode::LdcI4_8 => "ldc.i4.8",
            Opcode::LdcI4 => "ldc.i4",
            Opcode::ConvI => "conv.i",
            Opcode::ConvI4 => "conv.i4",
            Opcode::ConvI1 => "conv.i1",
            Opcode::ConvU1 => "conv.u1",
            Opcode::StindI1 => "stind.i1",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Or => "or",
            Opcode::Xor => "xor",
            Opcode::Ldloc0 => "ldloc.0",
            Opcode::Ldloc1 => "ldloc.1",
            Opcode::Ldloc2 => "ldloc.2",
            Opcode::Ldloc3 => "ldloc.3",
            Opcode::Ldloc => "ldloc",
            Opcode::Stloc0 => "stloc.0",
            Opcode::Stloc1 => "stloc.1",
            Opcode::Stloc2 => "stloc.2",
            Opcode::Stloc3 => "stloc.3",
            Opcode::Stloc => "stloc",
            Opcode::Dup => "dup",
            Opcode::Br => "br",
            Opcode::Brtrue => "brtrue",
            Opcode::Brfalse => "brfalse",
            Opcode::Clt => "clt",
            Opcode::Ceq => "ceq",
            Opcode::Call => "call",
            Opcode::Ldarg0 => "ldarg.0",
            Opcode::Ldarg1 => "ldarg.1",
            Opcode::Ldarg2 => "ldarg.2",
            Opcode::Ldarg3 => "ldarg.3",
            Opcode::Ldarg => "ldarg",
            Opcode::Ldsfld => "ldsfld",
            Opcode::Stsfld => "stsfld",
            Opcode::Unsupported(name) => name,
        }
    }

    /// Whether this opcode's operand is a branch target.
    pub fn is_branch(&self) -> bool {
        matches!(self, Opcode::Br | Opcode::Brtrue | Opcode::Brfalse)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Builder for fabricating modules without a metadata reader.
#[derive(Debug, Default)]
pub struct ModuleBuilder {
    types: Vec<TypeDef>,
}

impl ModuleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ty(mut self, ty: TypeBuilder) -> Self {
        self.types.push(ty.build());
        self
    }

    pub fn build(self) -> Module {
        Module { types: self.types }
    }
}

/// Builder for a single type declaration.
#[derive(Debug)]
pub struct TypeBuilder {
    name: String,
    fields: Vec<FieldDef>,
    methods: Vec<MethodDef>,
}

impl TypeBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn static_field(mut self, name: &str, constant: Option<i64>) -> Self {
        self.fields.push(FieldDef {
            name: name.to_string(),
            is_static: true,
            constant,
        });
        self
    }

    pub fn instance_field(mut self, name: &str) -> Self {
        self.fields.push(FieldDef {
            name: name.to_string(),
            is_static: false,
            constant: None,
        });
        self
    }

    pub fn method(mut self, method: MethodBuilder) -> Self {
        self.methods.push(method.build());
        self
    }

    pub fn build(self) -> TypeDef {
        TypeDef {
            name: self.name,
            fields: self.fields,
            methods: self.methods,
        }
    }
}

/// Builder for a method body.
///
/// Instructions receive sequential offsets (0, 1, 2, ...). A real reader
/// supplies true byte offsets; for branch resolution only the mapping between
/// targets and instruction offsets matters, so indices are sufficient here.
#[derive(Debug)]
pub struct MethodBuilder {
    method: MethodDef,
    next_offset: u32,
}

impl MethodBuilder {
    pub fn new(full_name: &str) -> Self {
        Self {
            method: MethodDef {
                full_name: full_name.to_string(),
                is_constructor: false,
                is_static_constructor: false,
                param_count: 0,
                body: Vec::new(),
            },
            next_offset: 0,
        }
    }

    pub fn params(mut self, count: u32) -> Self {
        self.method.param_count = count;
        self
    }

    pub fn constructor(mut self) -> Self {
        self.method.is_constructor = true;
        self
    }

    pub fn static_constructor(mut self) -> Self {
        self.method.is_static_constructor = true;
        self
    }

    pub fn inst(self, opcode: Opcode) -> Self {
        self.inst_with(opcode, Operand::None)
    }

    pub fn inst_with(mut self, opcode: Opcode, operand: Operand) -> Self {
        let offset = self.next_offset;
        self.next_offset += 1;
        self.method.body.push(Inst {
            opcode,
            operand,
            offset,
        });
        self
    }

    /// Offset the next pushed instruction will receive; lets tests compute
    /// forward branch targets before emitting the targeted instruction.
    pub fn next_offset(&self) -> u32 {
        self.next_offset
    }

    pub fn build(self) -> MethodDef {
        self.method
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_assigns_sequential_offsets() {
        let method = MethodBuilder::new("Program::Main")
            .inst(Opcode::LdcI4_2)
            .inst(Opcode::LdcI4_3)
            .inst(Opcode::Add)
            .inst(Opcode::Ret)
            .build();

        let offsets: Vec<u32> = method.body.iter().map(|i| i.offset).collect();
        assert_eq!(offsets, vec![0, 1, 2, 3]);
    }

    #[test]
    fn mnemonics_round_trip_for_diagnostics() {
        assert_eq!(Opcode::LdcI4M1.mnemonic(), "ldc.i4.m1");
        assert_eq!(Opcode::Unsupported("mul").mnemonic(), "mul");
        assert_eq!(format!("{}", Opcode::Brtrue), "brtrue");
    }

    #[test]
    fn branch_classification() {
        assert!(Opcode::Br.is_branch());
        assert!(Opcode::Brfalse.is_branch());
        assert!(!Opcode::Call.is_branch());
        assert!(!Opcode::Ret.is_branch());
    }
}
