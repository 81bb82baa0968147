use std::fmt;

use num_enum::TryFromPrimitive;

use crate::{instr::ConstExpr, Location};

/// An index into one of the module's index spaces.
pub type Index = u32;

/// A value type, covering both number types and reference types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u8)]
pub enum ValType {
    I32 = 0x7F,
    I64 = 0x7E,
    F32 = 0x7D,
    F64 = 0x7C,
    V128 = 0x7B,
    FuncRef = 0x70,
    ExternRef = 0x6F,
    NullRef = 0x6E,
    ExnRef = 0x68,
}

impl ValType {
    pub fn is_num(&self) -> bool {
        matches!(self, Self::I32 | Self::I64 | Self::F32 | Self::F64)
    }

    pub fn is_vec(&self) -> bool {
        matches!(self, Self::V128)
    }

    pub fn is_ref(&self) -> bool {
        matches!(
            self,
            Self::FuncRef | Self::ExternRef | Self::NullRef | Self::ExnRef
        )
    }
}

impl fmt::Display for ValType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValType::I32 => "i32",
            ValType::I64 => "i64",
            ValType::F32 => "f32",
            ValType::F64 => "f64",
            ValType::V128 => "v128",
            ValType::FuncRef => "funcref",
            ValType::ExternRef => "externref",
            ValType::NullRef => "nullref",
            ValType::ExnRef => "exnref",
        })
    }
}

/// A reference type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u8)]
pub enum RefType {
    Func = 0x70,
    Extern = 0x6F,
    Null = 0x6E,
    Exn = 0x68,
}

impl From<RefType> for ValType {
    fn from(rt: RefType) -> Self {
        match rt {
            RefType::Func => ValType::FuncRef,
            RefType::Extern => ValType::ExternRef,
            RefType::Null => ValType::NullRef,
            RefType::Exn => ValType::ExnRef,
        }
    }
}

impl fmt::Display for RefType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RefType::Func => "funcref",
            RefType::Extern => "externref",
            RefType::Null => "nullref",
            RefType::Exn => "exnref",
        })
    }
}

/// A function signature: parameter types and result types, in order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FuncType {
    pub params: Vec<ValType>,
    pub results: Vec<ValType>,
}

/// An entry of the type section.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DefinedType {
    pub loc: Location,
    pub ty: FuncType,
}

/// A potentially unbounded interval, with the threads proposal's shared flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Limits {
    pub loc: Location,
    pub min: u32,
    pub max: Option<u32>,
    pub shared: bool,
}

/// The type of a table: element reference type plus limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableType {
    pub loc: Location,
    pub elem_type: RefType,
    pub limits: Limits,
}

/// The type of a linear memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryType {
    pub loc: Location,
    pub limits: Limits,
}

/// The type of a global: content type plus mutability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobalType {
    pub loc: Location,
    pub content_type: ValType,
    pub mutable: bool,
}

/// The type of an event (exceptions proposal): an attribute byte plus the
/// index of the function type holding the event's parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventType {
    pub loc: Location,
    pub attribute: u8,
    pub type_idx: Index,
}

/// The kind of entity an import or export refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u8)]
pub enum ExternalKind {
    Func = 0x00,
    Table = 0x01,
    Memory = 0x02,
    Global = 0x03,
    Event = 0x04,
}

impl fmt::Display for ExternalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExternalKind::Func => "function",
            ExternalKind::Table => "table",
            ExternalKind::Memory => "memory",
            ExternalKind::Global => "global",
            ExternalKind::Event => "event",
        })
    }
}

/// The descriptor of an [`Import`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImportKind {
    Func(Index),
    Table(TableType),
    Memory(MemoryType),
    Global(GlobalType),
    Event(EventType),
}

/// An entry of the import section.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Import<'a> {
    pub loc: Location,
    pub module: &'a str,
    pub field: &'a str,
    pub kind: ImportKind,
}

/// An entry of the function section: the index of the function's type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Function {
    pub loc: Location,
    pub type_idx: Index,
}

/// An entry of the global section.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Global {
    pub loc: Location,
    pub ty: GlobalType,
    pub init: ConstExpr,
}

/// An entry of the export section.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Export<'a> {
    pub loc: Location,
    pub field: &'a str,
    pub kind: ExternalKind,
    pub index: Index,
}

/// The start section: the module's start function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Start {
    pub loc: Location,
    pub func_idx: Index,
}

/// How an element segment takes effect.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// Copied into `table_idx` at `offset` during instantiation.
    Active { table_idx: Index, offset: ConstExpr },
    Passive,
    Declared,
}

/// The initializers of an element segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ElementItems {
    Functions(Vec<Index>),
    Expressions(Vec<ConstExpr>),
}

/// An entry of the element section.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementSegment {
    pub loc: Location,
    pub kind: ElementKind,
    pub elem_type: RefType,
    pub items: ElementItems,
}

/// How a data segment takes effect.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataKind {
    Active { memory_idx: Index, offset: ConstExpr },
    Passive,
}

/// An entry of the data section. The payload borrows the input image.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataSegment<'a> {
    pub loc: Location,
    pub kind: DataKind,
    pub data: &'a [u8],
}

/// The data count section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataCount {
    pub loc: Location,
    pub count: u32,
}

/// The number of locals of a single type, as declared in a code entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NumLocals {
    pub count: u32,
    pub ty: ValType,
}

/// An undecoded instruction sequence: a function body or the tail of a code
/// entry, borrowed from the input image together with its absolute offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Expr<'a> {
    pub data: &'a [u8],
    pub offset: usize,
}

/// An entry of the code section: local declarations plus the undecoded body.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Code<'a> {
    pub loc: Location,
    pub locals: Vec<NumLocals>,
    pub body: Expr<'a>,
}

/// A custom section: a name and an opaque payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CustomSection<'a> {
    pub loc: Location,
    pub name: &'a str,
    pub payload: &'a [u8],
    /// Absolute offset of `payload` in the input image.
    pub payload_offset: usize,
}

/// One subsection of the "name" custom section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NameSubsection<'a> {
    pub loc: Location,
    pub id: u8,
    pub payload: &'a [u8],
}

impl NameSubsection<'_> {
    pub const MODULE: u8 = 0;
    pub const FUNCTION: u8 = 1;
    pub const LOCAL: u8 = 2;
}
