//! Reading and validating WebAssembly modules.
//!
//! Three independently useful pieces compose into a pipeline:
//!
//! - [`binary`]: a lazy, pull-based binary decoder. [`LazyModule`] frames a
//!   byte slice into sections; section iterators decode entries on demand;
//!   [`InstrReader`] decodes one instruction per step.
//! - [`text`]: a lexer for the text format, producing one [`text::Token`]
//!   per call with byte-exact locations.
//! - [`validator`]: type-checks a module with a polymorphic value stack and
//!   a control-frame stack, driving the lazy decoder in a single pass.
//!
//! All three report through one [`ErrorSink`]; errors are non-fatal and as
//! many independent diagnostics as possible are collected per input. Feature
//! gating is a [`Features`] bit-set checked at the decoder boundary.

mod error;
mod features;
mod instr;
mod module;
mod validator;

pub mod binary;
pub mod text;

pub use binary::{
    BinaryReader, InstrReader, KnownSection, LazyModule, LazySection, ReadBinary, Section,
    SectionContent, SectionId, SectionsIter,
};
pub use error::{ContextGuard, Error, ErrorSink, Errors, Location};
pub use features::Features;
pub use instr::{
    is_prefix_byte, BlockType, BrTable, ConstExpr, ImmKind, Immediate, InstrTokenKind,
    Instruction, MemArg, Opcode, F32, F64, V128,
};
pub use module::*;
pub use validator::{validate, validate_with};
