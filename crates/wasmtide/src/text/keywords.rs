//! Keyword recognition for the lexer.
//!
//! The lexer hands over a completed run of reserved characters; by then the
//! no-trailing-reserved-characters rule is already satisfied, so lookup is a
//! plain match on the whole word. Canonical opcode spellings come from the
//! opcode table; legacy spellings (the `/`-separated conversion names and the
//! pre-1.0 variable/memory forms) are listed here and map onto the same
//! opcodes.

use crate::{
    instr::{InstrTokenKind, Opcode},
    text::token::{Keyword, OpcodeInfo, TokenKind},
    RefType, ValType,
};

pub(crate) fn lookup(word: &str) -> Option<TokenKind> {
    if let Some(kind) = structural(word) {
        return Some(kind);
    }
    let opcode = legacy_opcode(word).or_else(|| Opcode::from_text(word))?;
    Some(instr_token(opcode))
}

/// Wrap an opcode in its token category.
pub(crate) fn instr_token(opcode: Opcode) -> TokenKind {
    let info = OpcodeInfo {
        opcode,
        features: opcode.features(),
    };
    match opcode.token_kind() {
        InstrTokenKind::Bare => TokenKind::BareInstr(info),
        InstrTokenKind::Block => TokenKind::BlockInstr(info),
        InstrTokenKind::Var => TokenKind::VarInstr(info),
        InstrTokenKind::Memory => TokenKind::MemoryInstr(info),
        InstrTokenKind::SimdLane => TokenKind::SimdLaneInstr(info),
        InstrTokenKind::SimdShuffle => TokenKind::SimdShuffleInstr(info),
        InstrTokenKind::SimdConst => TokenKind::SimdConstInstr(info),
        InstrTokenKind::BrTable => TokenKind::BrTableInstr(info),
        InstrTokenKind::BrOnExn => TokenKind::BrOnExnInstr(info),
        InstrTokenKind::CallIndirect => TokenKind::CallIndirectInstr(info),
        InstrTokenKind::TableInit => TokenKind::TableInitInstr(info),
        InstrTokenKind::TableCopy => TokenKind::TableCopyInstr(info),
        InstrTokenKind::Select => TokenKind::SelectInstr(info),
        InstrTokenKind::RefNull => TokenKind::RefNullInstr(info),
        InstrTokenKind::RefFunc => TokenKind::RefFuncInstr(info),
        InstrTokenKind::I32Const => TokenKind::I32ConstInstr(info),
        InstrTokenKind::I64Const => TokenKind::I64ConstInstr(info),
        InstrTokenKind::F32Const => TokenKind::F32ConstInstr(info),
        InstrTokenKind::F64Const => TokenKind::F64ConstInstr(info),
    }
}

/// Structural keywords, value types, and reference types. Checked before the
/// opcode table so `else`/`end`/`catch` lex as keywords.
fn structural(word: &str) -> Option<TokenKind> {
    use Keyword::*;
    let keyword = match word {
        "i32" => return Some(TokenKind::ValueType(ValType::I32)),
        "i64" => return Some(TokenKind::ValueType(ValType::I64)),
        "f32" => return Some(TokenKind::ValueType(ValType::F32)),
        "f64" => return Some(TokenKind::ValueType(ValType::F64)),
        "v128" => return Some(TokenKind::ValueType(ValType::V128)),
        "funcref" | "anyfunc" => return Some(TokenKind::ReferenceType(RefType::Func)),
        "externref" | "anyref" => return Some(TokenKind::ReferenceType(RefType::Extern)),
        "nullref" => return Some(TokenKind::ReferenceType(RefType::Null)),
        "exnref" => return Some(TokenKind::ReferenceType(RefType::Exn)),

        "module" => Module,
        "func" => Func,
        "type" => Type,
        "table" => Table,
        "memory" => Memory,
        "global" => Global,
        "elem" => Elem,
        "data" => Data,
        "start" => Start,
        "import" => Import,
        "export" => Export,
        "param" => Param,
        "result" => Result,
        "local" => Local,
        "mut" => Mut,
        "offset" => Offset,
        "item" => Item,
        "event" => Event,
        "then" => Then,
        "else" => Else,
        "end" => End,
        "catch" => Catch,
        "quote" => Quote,
        "binary" => Binary,
        "declare" => Declare,
        "shared" => Shared,
        "register" => Register,
        "invoke" => Invoke,
        "get" => Get,
        "assert_return" => AssertReturn,
        "assert_trap" => AssertTrap,
        "assert_malformed" => AssertMalformed,
        "assert_invalid" => AssertInvalid,
        "assert_unlinkable" => AssertUnlinkable,
        "assert_exhaustion" => AssertExhaustion,
        _ => return None,
    };
    Some(TokenKind::Keyword(keyword))
}

/// Legacy spellings accepted on read. Canonical forms are used on emit.
fn legacy_opcode(word: &str) -> Option<Opcode> {
    use Opcode::*;
    Some(match word {
        "i32.wrap/i64" => I32WrapI64,
        "i32.trunc_s/f32" => I32TruncF32S,
        "i32.trunc_u/f32" => I32TruncF32U,
        "i32.trunc_s/f64" => I32TruncF64S,
        "i32.trunc_u/f64" => I32TruncF64U,
        "i64.extend_s/i32" => I64ExtendI32S,
        "i64.extend_u/i32" => I64ExtendI32U,
        "i64.trunc_s/f32" => I64TruncF32S,
        "i64.trunc_u/f32" => I64TruncF32U,
        "i64.trunc_s/f64" => I64TruncF64S,
        "i64.trunc_u/f64" => I64TruncF64U,
        "f32.convert_s/i32" => F32ConvertI32S,
        "f32.convert_u/i32" => F32ConvertI32U,
        "f32.convert_s/i64" => F32ConvertI64S,
        "f32.convert_u/i64" => F32ConvertI64U,
        "f32.demote/f64" => F32DemoteF64,
        "f64.convert_s/i32" => F64ConvertI32S,
        "f64.convert_u/i32" => F64ConvertI32U,
        "f64.convert_s/i64" => F64ConvertI64S,
        "f64.convert_u/i64" => F64ConvertI64U,
        "f64.promote/f32" => F64PromoteF32,
        "i32.reinterpret/f32" => I32ReinterpretF32,
        "i64.reinterpret/f64" => I64ReinterpretF64,
        "f32.reinterpret/i32" => F32ReinterpretI32,
        "f64.reinterpret/i64" => F64ReinterpretI64,
        "i32.trunc_s:sat/f32" => I32TruncSatF32S,
        "i32.trunc_u:sat/f32" => I32TruncSatF32U,
        "i32.trunc_s:sat/f64" => I32TruncSatF64S,
        "i32.trunc_u:sat/f64" => I32TruncSatF64U,
        "i64.trunc_s:sat/f32" => I64TruncSatF32S,
        "i64.trunc_u:sat/f32" => I64TruncSatF32U,
        "i64.trunc_s:sat/f64" => I64TruncSatF64S,
        "i64.trunc_u:sat/f64" => I64TruncSatF64U,
        "get_local" => LocalGet,
        "set_local" => LocalSet,
        "tee_local" => LocalTee,
        "get_global" => GlobalGet,
        "set_global" => GlobalSet,
        "current_memory" => MemorySize,
        "grow_memory" => MemoryGrow,
        _ => return None,
    })
}
