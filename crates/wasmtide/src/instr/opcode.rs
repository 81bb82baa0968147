//! The opcode table.
//!
//! Every opcode is one row: binary encoding (optional escape prefix plus
//! code), canonical text spelling, immediate shape, text token category, and
//! the feature bit that gates it. The enum, the byte decoding tables, and the
//! text lookup are all generated from the same rows, so adding a proposal's
//! opcodes cannot leave the decoder and the lexer out of sync.

use std::{collections::HashMap, fmt};

use once_cell::sync::Lazy;

use crate::Features;

/// The shape of an instruction's immediate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImmKind {
    Empty,
    Block,
    Index,
    CallIndirect,
    BrTable,
    BrOnExn,
    U8,
    MemArg,
    S32,
    S64,
    F32,
    F64,
    V128,
    Init,
    Copy,
    Shuffle,
    ValTypes,
    RefType,
}

/// The text token category an opcode's keyword lexes as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstrTokenKind {
    Bare,
    Block,
    Var,
    Memory,
    SimdLane,
    SimdShuffle,
    SimdConst,
    BrTable,
    BrOnExn,
    CallIndirect,
    TableInit,
    TableCopy,
    Select,
    RefNull,
    RefFunc,
    I32Const,
    I64Const,
    F32Const,
    F64Const,
}

#[derive(Debug)]
struct Entry {
    opcode: Opcode,
    prefix: Option<u8>,
    code: u32,
    text: &'static str,
    imm: ImmKind,
    token: InstrTokenKind,
    features: Features,
}

const NP: Option<u8> = None;
const FC: Option<u8> = Some(0xfc);
const FD: Option<u8> = Some(0xfd);
const FE: Option<u8> = Some(0xfe);

const MVP: Features = Features::empty();
const SAT: Features = Features::SATURATING_FLOAT_TO_INT;
const SX: Features = Features::SIGN_EXTENSION;
const BULK: Features = Features::BULK_MEMORY;
const REF: Features = Features::REFERENCE_TYPES;
const SIMD: Features = Features::SIMD;
const THREADS: Features = Features::THREADS;
const TAIL: Features = Features::TAIL_CALL;
const EXC: Features = Features::EXCEPTIONS;

macro_rules! opcodes {
    ($($name:ident = ($prefix:expr, $code:literal, $text:literal, $imm:ident, $tok:ident, $features:expr);)*) => {
        /// A WebAssembly opcode.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Opcode {
            $($name,)*
        }

        static OPCODES: &[Entry] = &[
            $(Entry {
                opcode: Opcode::$name,
                prefix: $prefix,
                code: $code,
                text: $text,
                imm: ImmKind::$imm,
                token: InstrTokenKind::$tok,
                features: $features,
            },)*
        ];
    };
}

opcodes! {
    // Control instructions.
    Unreachable = (NP, 0x00, "unreachable", Empty, Bare, MVP);
    Nop = (NP, 0x01, "nop", Empty, Bare, MVP);
    Block = (NP, 0x02, "block", Block, Block, MVP);
    Loop = (NP, 0x03, "loop", Block, Block, MVP);
    If = (NP, 0x04, "if", Block, Block, MVP);
    Else = (NP, 0x05, "else", Empty, Bare, MVP);
    Try = (NP, 0x06, "try", Block, Block, EXC);
    Catch = (NP, 0x07, "catch", Empty, Bare, EXC);
    Throw = (NP, 0x08, "throw", Index, Var, EXC);
    Rethrow = (NP, 0x09, "rethrow", Empty, Bare, EXC);
    BrOnExn = (NP, 0x0a, "br_on_exn", BrOnExn, BrOnExn, EXC);
    End = (NP, 0x0b, "end", Empty, Bare, MVP);
    Br = (NP, 0x0c, "br", Index, Var, MVP);
    BrIf = (NP, 0x0d, "br_if", Index, Var, MVP);
    BrTable = (NP, 0x0e, "br_table", BrTable, BrTable, MVP);
    Return = (NP, 0x0f, "return", Empty, Bare, MVP);
    Call = (NP, 0x10, "call", Index, Var, MVP);
    CallIndirect = (NP, 0x11, "call_indirect", CallIndirect, CallIndirect, MVP);
    ReturnCall = (NP, 0x12, "return_call", Index, Var, TAIL);
    ReturnCallIndirect = (NP, 0x13, "return_call_indirect", CallIndirect, CallIndirect, TAIL);

    // Parametric instructions.
    Drop = (NP, 0x1a, "drop", Empty, Bare, MVP);
    Select = (NP, 0x1b, "select", Empty, Select, MVP);
    SelectT = (NP, 0x1c, "select", ValTypes, Select, REF);

    // Variable instructions.
    LocalGet = (NP, 0x20, "local.get", Index, Var, MVP);
    LocalSet = (NP, 0x21, "local.set", Index, Var, MVP);
    LocalTee = (NP, 0x22, "local.tee", Index, Var, MVP);
    GlobalGet = (NP, 0x23, "global.get", Index, Var, MVP);
    GlobalSet = (NP, 0x24, "global.set", Index, Var, MVP);
    TableGet = (NP, 0x25, "table.get", Index, Var, REF);
    TableSet = (NP, 0x26, "table.set", Index, Var, REF);

    // Memory instructions.
    I32Load = (NP, 0x28, "i32.load", MemArg, Memory, MVP);
    I64Load = (NP, 0x29, "i64.load", MemArg, Memory, MVP);
    F32Load = (NP, 0x2a, "f32.load", MemArg, Memory, MVP);
    F64Load = (NP, 0x2b, "f64.load", MemArg, Memory, MVP);
    I32Load8S = (NP, 0x2c, "i32.load8_s", MemArg, Memory, MVP);
    I32Load8U = (NP, 0x2d, "i32.load8_u", MemArg, Memory, MVP);
    I32Load16S = (NP, 0x2e, "i32.load16_s", MemArg, Memory, MVP);
    I32Load16U = (NP, 0x2f, "i32.load16_u", MemArg, Memory, MVP);
    I64Load8S = (NP, 0x30, "i64.load8_s", MemArg, Memory, MVP);
    I64Load8U = (NP, 0x31, "i64.load8_u", MemArg, Memory, MVP);
    I64Load16S = (NP, 0x32, "i64.load16_s", MemArg, Memory, MVP);
    I64Load16U = (NP, 0x33, "i64.load16_u", MemArg, Memory, MVP);
    I64Load32S = (NP, 0x34, "i64.load32_s", MemArg, Memory, MVP);
    I64Load32U = (NP, 0x35, "i64.load32_u", MemArg, Memory, MVP);
    I32Store = (NP, 0x36, "i32.store", MemArg, Memory, MVP);
    I64Store = (NP, 0x37, "i64.store", MemArg, Memory, MVP);
    F32Store = (NP, 0x38, "f32.store", MemArg, Memory, MVP);
    F64Store = (NP, 0x39, "f64.store", MemArg, Memory, MVP);
    I32Store8 = (NP, 0x3a, "i32.store8", MemArg, Memory, MVP);
    I32Store16 = (NP, 0x3b, "i32.store16", MemArg, Memory, MVP);
    I64Store8 = (NP, 0x3c, "i64.store8", MemArg, Memory, MVP);
    I64Store16 = (NP, 0x3d, "i64.store16", MemArg, Memory, MVP);
    I64Store32 = (NP, 0x3e, "i64.store32", MemArg, Memory, MVP);
    MemorySize = (NP, 0x3f, "memory.size", U8, Bare, MVP);
    MemoryGrow = (NP, 0x40, "memory.grow", U8, Bare, MVP);

    // Constants.
    I32Const = (NP, 0x41, "i32.const", S32, I32Const, MVP);
    I64Const = (NP, 0x42, "i64.const", S64, I64Const, MVP);
    F32Const = (NP, 0x43, "f32.const", F32, F32Const, MVP);
    F64Const = (NP, 0x44, "f64.const", F64, F64Const, MVP);

    // Numeric instructions.
    I32Eqz = (NP, 0x45, "i32.eqz", Empty, Bare, MVP);
    I32Eq = (NP, 0x46, "i32.eq", Empty, Bare, MVP);
    I32Ne = (NP, 0x47, "i32.ne", Empty, Bare, MVP);
    I32LtS = (NP, 0x48, "i32.lt_s", Empty, Bare, MVP);
    I32LtU = (NP, 0x49, "i32.lt_u", Empty, Bare, MVP);
    I32GtS = (NP, 0x4a, "i32.gt_s", Empty, Bare, MVP);
    I32GtU = (NP, 0x4b, "i32.gt_u", Empty, Bare, MVP);
    I32LeS = (NP, 0x4c, "i32.le_s", Empty, Bare, MVP);
    I32LeU = (NP, 0x4d, "i32.le_u", Empty, Bare, MVP);
    I32GeS = (NP, 0x4e, "i32.ge_s", Empty, Bare, MVP);
    I32GeU = (NP, 0x4f, "i32.ge_u", Empty, Bare, MVP);
    I64Eqz = (NP, 0x50, "i64.eqz", Empty, Bare, MVP);
    I64Eq = (NP, 0x51, "i64.eq", Empty, Bare, MVP);
    I64Ne = (NP, 0x52, "i64.ne", Empty, Bare, MVP);
    I64LtS = (NP, 0x53, "i64.lt_s", Empty, Bare, MVP);
    I64LtU = (NP, 0x54, "i64.lt_u", Empty, Bare, MVP);
    I64GtS = (NP, 0x55, "i64.gt_s", Empty, Bare, MVP);
    I64GtU = (NP, 0x56, "i64.gt_u", Empty, Bare, MVP);
    I64LeS = (NP, 0x57, "i64.le_s", Empty, Bare, MVP);
    I64LeU = (NP, 0x58, "i64.le_u", Empty, Bare, MVP);
    I64GeS = (NP, 0x59, "i64.ge_s", Empty, Bare, MVP);
    I64GeU = (NP, 0x5a, "i64.ge_u", Empty, Bare, MVP);
    F32Eq = (NP, 0x5b, "f32.eq", Empty, Bare, MVP);
    F32Ne = (NP, 0x5c, "f32.ne", Empty, Bare, MVP);
    F32Lt = (NP, 0x5d, "f32.lt", Empty, Bare, MVP);
    F32Gt = (NP, 0x5e, "f32.gt", Empty, Bare, MVP);
    F32Le = (NP, 0x5f, "f32.le", Empty, Bare, MVP);
    F32Ge = (NP, 0x60, "f32.ge", Empty, Bare, MVP);
    F64Eq = (NP, 0x61, "f64.eq", Empty, Bare, MVP);
    F64Ne = (NP, 0x62, "f64.ne", Empty, Bare, MVP);
    F64Lt = (NP, 0x63, "f64.lt", Empty, Bare, MVP);
    F64Gt = (NP, 0x64, "f64.gt", Empty, Bare, MVP);
    F64Le = (NP, 0x65, "f64.le", Empty, Bare, MVP);
    F64Ge = (NP, 0x66, "f64.ge", Empty, Bare, MVP);
    I32Clz = (NP, 0x67, "i32.clz", Empty, Bare, MVP);
    I32Ctz = (NP, 0x68, "i32.ctz", Empty, Bare, MVP);
    I32Popcnt = (NP, 0x69, "i32.popcnt", Empty, Bare, MVP);
    I32Add = (NP, 0x6a, "i32.add", Empty, Bare, MVP);
    I32Sub = (NP, 0x6b, "i32.sub", Empty, Bare, MVP);
    I32Mul = (NP, 0x6c, "i32.mul", Empty, Bare, MVP);
    I32DivS = (NP, 0x6d, "i32.div_s", Empty, Bare, MVP);
    I32DivU = (NP, 0x6e, "i32.div_u", Empty, Bare, MVP);
    I32RemS = (NP, 0x6f, "i32.rem_s", Empty, Bare, MVP);
    I32RemU = (NP, 0x70, "i32.rem_u", Empty, Bare, MVP);
    I32And = (NP, 0x71, "i32.and", Empty, Bare, MVP);
    I32Or = (NP, 0x72, "i32.or", Empty, Bare, MVP);
    I32Xor = (NP, 0x73, "i32.xor", Empty, Bare, MVP);
    I32Shl = (NP, 0x74, "i32.shl", Empty, Bare, MVP);
    I32ShrS = (NP, 0x75, "i32.shr_s", Empty, Bare, MVP);
    I32ShrU = (NP, 0x76, "i32.shr_u", Empty, Bare, MVP);
    I32Rotl = (NP, 0x77, "i32.rotl", Empty, Bare, MVP);
    I32Rotr = (NP, 0x78, "i32.rotr", Empty, Bare, MVP);
    I64Clz = (NP, 0x79, "i64.clz", Empty, Bare, MVP);
    I64Ctz = (NP, 0x7a, "i64.ctz", Empty, Bare, MVP);
    I64Popcnt = (NP, 0x7b, "i64.popcnt", Empty, Bare, MVP);
    I64Add = (NP, 0x7c, "i64.add", Empty, Bare, MVP);
    I64Sub = (NP, 0x7d, "i64.sub", Empty, Bare, MVP);
    I64Mul = (NP, 0x7e, "i64.mul", Empty, Bare, MVP);
    I64DivS = (NP, 0x7f, "i64.div_s", Empty, Bare, MVP);
    I64DivU = (NP, 0x80, "i64.div_u", Empty, Bare, MVP);
    I64RemS = (NP, 0x81, "i64.rem_s", Empty, Bare, MVP);
    I64RemU = (NP, 0x82, "i64.rem_u", Empty, Bare, MVP);
    I64And = (NP, 0x83, "i64.and", Empty, Bare, MVP);
    I64Or = (NP, 0x84, "i64.or", Empty, Bare, MVP);
    I64Xor = (NP, 0x85, "i64.xor", Empty, Bare, MVP);
    I64Shl = (NP, 0x86, "i64.shl", Empty, Bare, MVP);
    I64ShrS = (NP, 0x87, "i64.shr_s", Empty, Bare, MVP);
    I64ShrU = (NP, 0x88, "i64.shr_u", Empty, Bare, MVP);
    I64Rotl = (NP, 0x89, "i64.rotl", Empty, Bare, MVP);
    I64Rotr = (NP, 0x8a, "i64.rotr", Empty, Bare, MVP);
    F32Abs = (NP, 0x8b, "f32.abs", Empty, Bare, MVP);
    F32Neg = (NP, 0x8c, "f32.neg", Empty, Bare, MVP);
    F32Ceil = (NP, 0x8d, "f32.ceil", Empty, Bare, MVP);
    F32Floor = (NP, 0x8e, "f32.floor", Empty, Bare, MVP);
    F32Trunc = (NP, 0x8f, "f32.trunc", Empty, Bare, MVP);
    F32Nearest = (NP, 0x90, "f32.nearest", Empty, Bare, MVP);
    F32Sqrt = (NP, 0x91, "f32.sqrt", Empty, Bare, MVP);
    F32Add = (NP, 0x92, "f32.add", Empty, Bare, MVP);
    F32Sub = (NP, 0x93, "f32.sub", Empty, Bare, MVP);
    F32Mul = (NP, 0x94, "f32.mul", Empty, Bare, MVP);
    F32Div = (NP, 0x95, "f32.div", Empty, Bare, MVP);
    F32Min = (NP, 0x96, "f32.min", Empty, Bare, MVP);
    F32Max = (NP, 0x97, "f32.max", Empty, Bare, MVP);
    F32Copysign = (NP, 0x98, "f32.copysign", Empty, Bare, MVP);
    F64Abs = (NP, 0x99, "f64.abs", Empty, Bare, MVP);
    F64Neg = (NP, 0x9a, "f64.neg", Empty, Bare, MVP);
    F64Ceil = (NP, 0x9b, "f64.ceil", Empty, Bare, MVP);
    F64Floor = (NP, 0x9c, "f64.floor", Empty, Bare, MVP);
    F64Trunc = (NP, 0x9d, "f64.trunc", Empty, Bare, MVP);
    F64Nearest = (NP, 0x9e, "f64.nearest", Empty, Bare, MVP);
    F64Sqrt = (NP, 0x9f, "f64.sqrt", Empty, Bare, MVP);
    F64Add = (NP, 0xa0, "f64.add", Empty, Bare, MVP);
    F64Sub = (NP, 0xa1, "f64.sub", Empty, Bare, MVP);
    F64Mul = (NP, 0xa2, "f64.mul", Empty, Bare, MVP);
    F64Div = (NP, 0xa3, "f64.div", Empty, Bare, MVP);
    F64Min = (NP, 0xa4, "f64.min", Empty, Bare, MVP);
    F64Max = (NP, 0xa5, "f64.max", Empty, Bare, MVP);
    F64Copysign = (NP, 0xa6, "f64.copysign", Empty, Bare, MVP);
    I32WrapI64 = (NP, 0xa7, "i32.wrap_i64", Empty, Bare, MVP);
    I32TruncF32S = (NP, 0xa8, "i32.trunc_f32_s", Empty, Bare, MVP);
    I32TruncF32U = (NP, 0xa9, "i32.trunc_f32_u", Empty, Bare, MVP);
    I32TruncF64S = (NP, 0xaa, "i32.trunc_f64_s", Empty, Bare, MVP);
    I32TruncF64U = (NP, 0xab, "i32.trunc_f64_u", Empty, Bare, MVP);
    I64ExtendI32S = (NP, 0xac, "i64.extend_i32_s", Empty, Bare, MVP);
    I64ExtendI32U = (NP, 0xad, "i64.extend_i32_u", Empty, Bare, MVP);
    I64TruncF32S = (NP, 0xae, "i64.trunc_f32_s", Empty, Bare, MVP);
    I64TruncF32U = (NP, 0xaf, "i64.trunc_f32_u", Empty, Bare, MVP);
    I64TruncF64S = (NP, 0xb0, "i64.trunc_f64_s", Empty, Bare, MVP);
    I64TruncF64U = (NP, 0xb1, "i64.trunc_f64_u", Empty, Bare, MVP);
    F32ConvertI32S = (NP, 0xb2, "f32.convert_i32_s", Empty, Bare, MVP);
    F32ConvertI32U = (NP, 0xb3, "f32.convert_i32_u", Empty, Bare, MVP);
    F32ConvertI64S = (NP, 0xb4, "f32.convert_i64_s", Empty, Bare, MVP);
    F32ConvertI64U = (NP, 0xb5, "f32.convert_i64_u", Empty, Bare, MVP);
    F32DemoteF64 = (NP, 0xb6, "f32.demote_f64", Empty, Bare, MVP);
    F64ConvertI32S = (NP, 0xb7, "f64.convert_i32_s", Empty, Bare, MVP);
    F64ConvertI32U = (NP, 0xb8, "f64.convert_i32_u", Empty, Bare, MVP);
    F64ConvertI64S = (NP, 0xb9, "f64.convert_i64_s", Empty, Bare, MVP);
    F64ConvertI64U = (NP, 0xba, "f64.convert_i64_u", Empty, Bare, MVP);
    F64PromoteF32 = (NP, 0xbb, "f64.promote_f32", Empty, Bare, MVP);
    I32ReinterpretF32 = (NP, 0xbc, "i32.reinterpret_f32", Empty, Bare, MVP);
    I64ReinterpretF64 = (NP, 0xbd, "i64.reinterpret_f64", Empty, Bare, MVP);
    F32ReinterpretI32 = (NP, 0xbe, "f32.reinterpret_i32", Empty, Bare, MVP);
    F64ReinterpretI64 = (NP, 0xbf, "f64.reinterpret_i64", Empty, Bare, MVP);
    I32Extend8S = (NP, 0xc0, "i32.extend8_s", Empty, Bare, SX);
    I32Extend16S = (NP, 0xc1, "i32.extend16_s", Empty, Bare, SX);
    I64Extend8S = (NP, 0xc2, "i64.extend8_s", Empty, Bare, SX);
    I64Extend16S = (NP, 0xc3, "i64.extend16_s", Empty, Bare, SX);
    I64Extend32S = (NP, 0xc4, "i64.extend32_s", Empty, Bare, SX);

    // Reference instructions.
    RefNull = (NP, 0xd0, "ref.null", RefType, RefNull, REF);
    RefIsNull = (NP, 0xd1, "ref.is_null", Empty, Bare, REF);
    RefFunc = (NP, 0xd2, "ref.func", Index, RefFunc, REF);

    // Saturating truncation and bulk memory, behind the 0xFC escape.
    I32TruncSatF32S = (FC, 0x00, "i32.trunc_sat_f32_s", Empty, Bare, SAT);
    I32TruncSatF32U = (FC, 0x01, "i32.trunc_sat_f32_u", Empty, Bare, SAT);
    I32TruncSatF64S = (FC, 0x02, "i32.trunc_sat_f64_s", Empty, Bare, SAT);
    I32TruncSatF64U = (FC, 0x03, "i32.trunc_sat_f64_u", Empty, Bare, SAT);
    I64TruncSatF32S = (FC, 0x04, "i64.trunc_sat_f32_s", Empty, Bare, SAT);
    I64TruncSatF32U = (FC, 0x05, "i64.trunc_sat_f32_u", Empty, Bare, SAT);
    I64TruncSatF64S = (FC, 0x06, "i64.trunc_sat_f64_s", Empty, Bare, SAT);
    I64TruncSatF64U = (FC, 0x07, "i64.trunc_sat_f64_u", Empty, Bare, SAT);
    MemoryInit = (FC, 0x08, "memory.init", Init, Var, BULK);
    DataDrop = (FC, 0x09, "data.drop", Index, Var, BULK);
    MemoryCopy = (FC, 0x0a, "memory.copy", Copy, Bare, BULK);
    MemoryFill = (FC, 0x0b, "memory.fill", U8, Bare, BULK);
    TableInit = (FC, 0x0c, "table.init", Init, TableInit, BULK);
    ElemDrop = (FC, 0x0d, "elem.drop", Index, Var, BULK);
    TableCopy = (FC, 0x0e, "table.copy", Copy, TableCopy, BULK);
    TableGrow = (FC, 0x0f, "table.grow", Index, Var, REF);
    TableSize = (FC, 0x10, "table.size", Index, Var, REF);
    TableFill = (FC, 0x11, "table.fill", Index, Var, REF);

    // SIMD, behind the 0xFD escape.
    V128Load = (FD, 0x00, "v128.load", MemArg, Memory, SIMD);
    I16X8Load8X8S = (FD, 0x01, "i16x8.load8x8_s", MemArg, Memory, SIMD);
    I16X8Load8X8U = (FD, 0x02, "i16x8.load8x8_u", MemArg, Memory, SIMD);
    I32X4Load16X4S = (FD, 0x03, "i32x4.load16x4_s", MemArg, Memory, SIMD);
    I32X4Load16X4U = (FD, 0x04, "i32x4.load16x4_u", MemArg, Memory, SIMD);
    I64X2Load32X2S = (FD, 0x05, "i64x2.load32x2_s", MemArg, Memory, SIMD);
    I64X2Load32X2U = (FD, 0x06, "i64x2.load32x2_u", MemArg, Memory, SIMD);
    V8X16LoadSplat = (FD, 0x07, "v8x16.load_splat", MemArg, Memory, SIMD);
    V16X8LoadSplat = (FD, 0x08, "v16x8.load_splat", MemArg, Memory, SIMD);
    V32X4LoadSplat = (FD, 0x09, "v32x4.load_splat", MemArg, Memory, SIMD);
    V64X2LoadSplat = (FD, 0x0a, "v64x2.load_splat", MemArg, Memory, SIMD);
    V128Store = (FD, 0x0b, "v128.store", MemArg, Memory, SIMD);
    V128Const = (FD, 0x0c, "v128.const", V128, SimdConst, SIMD);
    V8X16Shuffle = (FD, 0x0d, "v8x16.shuffle", Shuffle, SimdShuffle, SIMD);
    V8X16Swizzle = (FD, 0x0e, "v8x16.swizzle", Empty, Bare, SIMD);
    I8X16Splat = (FD, 0x0f, "i8x16.splat", Empty, Bare, SIMD);
    I16X8Splat = (FD, 0x10, "i16x8.splat", Empty, Bare, SIMD);
    I32X4Splat = (FD, 0x11, "i32x4.splat", Empty, Bare, SIMD);
    I64X2Splat = (FD, 0x12, "i64x2.splat", Empty, Bare, SIMD);
    F32X4Splat = (FD, 0x13, "f32x4.splat", Empty, Bare, SIMD);
    F64X2Splat = (FD, 0x14, "f64x2.splat", Empty, Bare, SIMD);
    I8X16ExtractLaneS = (FD, 0x15, "i8x16.extract_lane_s", U8, SimdLane, SIMD);
    I8X16ExtractLaneU = (FD, 0x16, "i8x16.extract_lane_u", U8, SimdLane, SIMD);
    I8X16ReplaceLane = (FD, 0x17, "i8x16.replace_lane", U8, SimdLane, SIMD);
    I16X8ExtractLaneS = (FD, 0x18, "i16x8.extract_lane_s", U8, SimdLane, SIMD);
    I16X8ExtractLaneU = (FD, 0x19, "i16x8.extract_lane_u", U8, SimdLane, SIMD);
    I16X8ReplaceLane = (FD, 0x1a, "i16x8.replace_lane", U8, SimdLane, SIMD);
    I32X4ExtractLane = (FD, 0x1b, "i32x4.extract_lane", U8, SimdLane, SIMD);
    I32X4ReplaceLane = (FD, 0x1c, "i32x4.replace_lane", U8, SimdLane, SIMD);
    I64X2ExtractLane = (FD, 0x1d, "i64x2.extract_lane", U8, SimdLane, SIMD);
    I64X2ReplaceLane = (FD, 0x1e, "i64x2.replace_lane", U8, SimdLane, SIMD);
    F32X4ExtractLane = (FD, 0x1f, "f32x4.extract_lane", U8, SimdLane, SIMD);
    F32X4ReplaceLane = (FD, 0x20, "f32x4.replace_lane", U8, SimdLane, SIMD);
    F64X2ExtractLane = (FD, 0x21, "f64x2.extract_lane", U8, SimdLane, SIMD);
    F64X2ReplaceLane = (FD, 0x22, "f64x2.replace_lane", U8, SimdLane, SIMD);
    I8X16Eq = (FD, 0x23, "i8x16.eq", Empty, Bare, SIMD);
    I8X16Ne = (FD, 0x24, "i8x16.ne", Empty, Bare, SIMD);
    I8X16LtS = (FD, 0x25, "i8x16.lt_s", Empty, Bare, SIMD);
    I8X16LtU = (FD, 0x26, "i8x16.lt_u", Empty, Bare, SIMD);
    I8X16GtS = (FD, 0x27, "i8x16.gt_s", Empty, Bare, SIMD);
    I8X16GtU = (FD, 0x28, "i8x16.gt_u", Empty, Bare, SIMD);
    I8X16LeS = (FD, 0x29, "i8x16.le_s", Empty, Bare, SIMD);
    I8X16LeU = (FD, 0x2a, "i8x16.le_u", Empty, Bare, SIMD);
    I8X16GeS = (FD, 0x2b, "i8x16.ge_s", Empty, Bare, SIMD);
    I8X16GeU = (FD, 0x2c, "i8x16.ge_u", Empty, Bare, SIMD);
    I16X8Eq = (FD, 0x2d, "i16x8.eq", Empty, Bare, SIMD);
    I16X8Ne = (FD, 0x2e, "i16x8.ne", Empty, Bare, SIMD);
    I16X8LtS = (FD, 0x2f, "i16x8.lt_s", Empty, Bare, SIMD);
    I16X8LtU = (FD, 0x30, "i16x8.lt_u", Empty, Bare, SIMD);
    I16X8GtS = (FD, 0x31, "i16x8.gt_s", Empty, Bare, SIMD);
    I16X8GtU = (FD, 0x32, "i16x8.gt_u", Empty, Bare, SIMD);
    I16X8LeS = (FD, 0x33, "i16x8.le_s", Empty, Bare, SIMD);
    I16X8LeU = (FD, 0x34, "i16x8.le_u", Empty, Bare, SIMD);
    I16X8GeS = (FD, 0x35, "i16x8.ge_s", Empty, Bare, SIMD);
    I16X8GeU = (FD, 0x36, "i16x8.ge_u", Empty, Bare, SIMD);
    I32X4Eq = (FD, 0x37, "i32x4.eq", Empty, Bare, SIMD);
    I32X4Ne = (FD, 0x38, "i32x4.ne", Empty, Bare, SIMD);
    I32X4LtS = (FD, 0x39, "i32x4.lt_s", Empty, Bare, SIMD);
    I32X4LtU = (FD, 0x3a, "i32x4.lt_u", Empty, Bare, SIMD);
    I32X4GtS = (FD, 0x3b, "i32x4.gt_s", Empty, Bare, SIMD);
    I32X4GtU = (FD, 0x3c, "i32x4.gt_u", Empty, Bare, SIMD);
    I32X4LeS = (FD, 0x3d, "i32x4.le_s", Empty, Bare, SIMD);
    I32X4LeU = (FD, 0x3e, "i32x4.le_u", Empty, Bare, SIMD);
    I32X4GeS = (FD, 0x3f, "i32x4.ge_s", Empty, Bare, SIMD);
    I32X4GeU = (FD, 0x40, "i32x4.ge_u", Empty, Bare, SIMD);
    F32X4Eq = (FD, 0x41, "f32x4.eq", Empty, Bare, SIMD);
    F32X4Ne = (FD, 0x42, "f32x4.ne", Empty, Bare, SIMD);
    F32X4Lt = (FD, 0x43, "f32x4.lt", Empty, Bare, SIMD);
    F32X4Gt = (FD, 0x44, "f32x4.gt", Empty, Bare, SIMD);
    F32X4Le = (FD, 0x45, "f32x4.le", Empty, Bare, SIMD);
    F32X4Ge = (FD, 0x46, "f32x4.ge", Empty, Bare, SIMD);
    F64X2Eq = (FD, 0x47, "f64x2.eq", Empty, Bare, SIMD);
    F64X2Ne = (FD, 0x48, "f64x2.ne", Empty, Bare, SIMD);
    F64X2Lt = (FD, 0x49, "f64x2.lt", Empty, Bare, SIMD);
    F64X2Gt = (FD, 0x4a, "f64x2.gt", Empty, Bare, SIMD);
    F64X2Le = (FD, 0x4b, "f64x2.le", Empty, Bare, SIMD);
    F64X2Ge = (FD, 0x4c, "f64x2.ge", Empty, Bare, SIMD);
    V128Not = (FD, 0x4d, "v128.not", Empty, Bare, SIMD);
    V128And = (FD, 0x4e, "v128.and", Empty, Bare, SIMD);
    V128Andnot = (FD, 0x4f, "v128.andnot", Empty, Bare, SIMD);
    V128Or = (FD, 0x50, "v128.or", Empty, Bare, SIMD);
    V128Xor = (FD, 0x51, "v128.xor", Empty, Bare, SIMD);
    V128Bitselect = (FD, 0x52, "v128.bitselect", Empty, Bare, SIMD);
    I8X16Neg = (FD, 0x60, "i8x16.neg", Empty, Bare, SIMD);
    I8X16AnyTrue = (FD, 0x61, "i8x16.any_true", Empty, Bare, SIMD);
    I8X16AllTrue = (FD, 0x62, "i8x16.all_true", Empty, Bare, SIMD);
    I8X16NarrowI16X8S = (FD, 0x65, "i8x16.narrow_i16x8_s", Empty, Bare, SIMD);
    I8X16NarrowI16X8U = (FD, 0x66, "i8x16.narrow_i16x8_u", Empty, Bare, SIMD);
    I8X16Shl = (FD, 0x6b, "i8x16.shl", Empty, Bare, SIMD);
    I8X16ShrS = (FD, 0x6c, "i8x16.shr_s", Empty, Bare, SIMD);
    I8X16ShrU = (FD, 0x6d, "i8x16.shr_u", Empty, Bare, SIMD);
    I8X16Add = (FD, 0x6e, "i8x16.add", Empty, Bare, SIMD);
    I8X16AddSaturateS = (FD, 0x6f, "i8x16.add_saturate_s", Empty, Bare, SIMD);
    I8X16AddSaturateU = (FD, 0x70, "i8x16.add_saturate_u", Empty, Bare, SIMD);
    I8X16Sub = (FD, 0x71, "i8x16.sub", Empty, Bare, SIMD);
    I8X16SubSaturateS = (FD, 0x72, "i8x16.sub_saturate_s", Empty, Bare, SIMD);
    I8X16SubSaturateU = (FD, 0x73, "i8x16.sub_saturate_u", Empty, Bare, SIMD);
    I8X16MinS = (FD, 0x76, "i8x16.min_s", Empty, Bare, SIMD);
    I8X16MinU = (FD, 0x77, "i8x16.min_u", Empty, Bare, SIMD);
    I8X16MaxS = (FD, 0x78, "i8x16.max_s", Empty, Bare, SIMD);
    I8X16MaxU = (FD, 0x79, "i8x16.max_u", Empty, Bare, SIMD);
    I8X16AvgrU = (FD, 0x7b, "i8x16.avgr_u", Empty, Bare, SIMD);
    I16X8Neg = (FD, 0x80, "i16x8.neg", Empty, Bare, SIMD);
    I16X8AnyTrue = (FD, 0x81, "i16x8.any_true", Empty, Bare, SIMD);
    I16X8AllTrue = (FD, 0x82, "i16x8.all_true", Empty, Bare, SIMD);
    I16X8NarrowI32X4S = (FD, 0x85, "i16x8.narrow_i32x4_s", Empty, Bare, SIMD);
    I16X8NarrowI32X4U = (FD, 0x86, "i16x8.narrow_i32x4_u", Empty, Bare, SIMD);
    I16X8WidenLowI8X16S = (FD, 0x87, "i16x8.widen_low_i8x16_s", Empty, Bare, SIMD);
    I16X8WidenHighI8X16S = (FD, 0x88, "i16x8.widen_high_i8x16_s", Empty, Bare, SIMD);
    I16X8WidenLowI8X16U = (FD, 0x89, "i16x8.widen_low_i8x16_u", Empty, Bare, SIMD);
    I16X8WidenHighI8X16U = (FD, 0x8a, "i16x8.widen_high_i8x16_u", Empty, Bare, SIMD);
    I16X8Shl = (FD, 0x8b, "i16x8.shl", Empty, Bare, SIMD);
    I16X8ShrS = (FD, 0x8c, "i16x8.shr_s", Empty, Bare, SIMD);
    I16X8ShrU = (FD, 0x8d, "i16x8.shr_u", Empty, Bare, SIMD);
    I16X8Add = (FD, 0x8e, "i16x8.add", Empty, Bare, SIMD);
    I16X8AddSaturateS = (FD, 0x8f, "i16x8.add_saturate_s", Empty, Bare, SIMD);
    I16X8AddSaturateU = (FD, 0x90, "i16x8.add_saturate_u", Empty, Bare, SIMD);
    I16X8Sub = (FD, 0x91, "i16x8.sub", Empty, Bare, SIMD);
    I16X8SubSaturateS = (FD, 0x92, "i16x8.sub_saturate_s", Empty, Bare, SIMD);
    I16X8SubSaturateU = (FD, 0x93, "i16x8.sub_saturate_u", Empty, Bare, SIMD);
    I16X8Mul = (FD, 0x95, "i16x8.mul", Empty, Bare, SIMD);
    I16X8MinS = (FD, 0x96, "i16x8.min_s", Empty, Bare, SIMD);
    I16X8MinU = (FD, 0x97, "i16x8.min_u", Empty, Bare, SIMD);
    I16X8MaxS = (FD, 0x98, "i16x8.max_s", Empty, Bare, SIMD);
    I16X8MaxU = (FD, 0x99, "i16x8.max_u", Empty, Bare, SIMD);
    I16X8AvgrU = (FD, 0x9b, "i16x8.avgr_u", Empty, Bare, SIMD);
    I32X4Neg = (FD, 0xa0, "i32x4.neg", Empty, Bare, SIMD);
    I32X4AnyTrue = (FD, 0xa1, "i32x4.any_true", Empty, Bare, SIMD);
    I32X4AllTrue = (FD, 0xa2, "i32x4.all_true", Empty, Bare, SIMD);
    I32X4WidenLowI16X8S = (FD, 0xa7, "i32x4.widen_low_i16x8_s", Empty, Bare, SIMD);
    I32X4WidenHighI16X8S = (FD, 0xa8, "i32x4.widen_high_i16x8_s", Empty, Bare, SIMD);
    I32X4WidenLowI16X8U = (FD, 0xa9, "i32x4.widen_low_i16x8_u", Empty, Bare, SIMD);
    I32X4WidenHighI16X8U = (FD, 0xaa, "i32x4.widen_high_i16x8_u", Empty, Bare, SIMD);
    I32X4Shl = (FD, 0xab, "i32x4.shl", Empty, Bare, SIMD);
    I32X4ShrS = (FD, 0xac, "i32x4.shr_s", Empty, Bare, SIMD);
    I32X4ShrU = (FD, 0xad, "i32x4.shr_u", Empty, Bare, SIMD);
    I32X4Add = (FD, 0xae, "i32x4.add", Empty, Bare, SIMD);
    I32X4Sub = (FD, 0xb1, "i32x4.sub", Empty, Bare, SIMD);
    I32X4Mul = (FD, 0xb5, "i32x4.mul", Empty, Bare, SIMD);
    I32X4MinS = (FD, 0xb6, "i32x4.min_s", Empty, Bare, SIMD);
    I32X4MinU = (FD, 0xb7, "i32x4.min_u", Empty, Bare, SIMD);
    I32X4MaxS = (FD, 0xb8, "i32x4.max_s", Empty, Bare, SIMD);
    I32X4MaxU = (FD, 0xb9, "i32x4.max_u", Empty, Bare, SIMD);
    I64X2Neg = (FD, 0xc1, "i64x2.neg", Empty, Bare, SIMD);
    I64X2Shl = (FD, 0xcb, "i64x2.shl", Empty, Bare, SIMD);
    I64X2ShrS = (FD, 0xcc, "i64x2.shr_s", Empty, Bare, SIMD);
    I64X2ShrU = (FD, 0xcd, "i64x2.shr_u", Empty, Bare, SIMD);
    I64X2Add = (FD, 0xce, "i64x2.add", Empty, Bare, SIMD);
    I64X2Sub = (FD, 0xd1, "i64x2.sub", Empty, Bare, SIMD);
    I64X2Mul = (FD, 0xd5, "i64x2.mul", Empty, Bare, SIMD);
    F32X4Abs = (FD, 0xe0, "f32x4.abs", Empty, Bare, SIMD);
    F32X4Neg = (FD, 0xe1, "f32x4.neg", Empty, Bare, SIMD);
    F32X4Sqrt = (FD, 0xe3, "f32x4.sqrt", Empty, Bare, SIMD);
    F32X4Add = (FD, 0xe4, "f32x4.add", Empty, Bare, SIMD);
    F32X4Sub = (FD, 0xe5, "f32x4.sub", Empty, Bare, SIMD);
    F32X4Mul = (FD, 0xe6, "f32x4.mul", Empty, Bare, SIMD);
    F32X4Div = (FD, 0xe7, "f32x4.div", Empty, Bare, SIMD);
    F32X4Min = (FD, 0xe8, "f32x4.min", Empty, Bare, SIMD);
    F32X4Max = (FD, 0xe9, "f32x4.max", Empty, Bare, SIMD);
    F64X2Abs = (FD, 0xec, "f64x2.abs", Empty, Bare, SIMD);
    F64X2Neg = (FD, 0xed, "f64x2.neg", Empty, Bare, SIMD);
    F64X2Sqrt = (FD, 0xef, "f64x2.sqrt", Empty, Bare, SIMD);
    F64X2Add = (FD, 0xf0, "f64x2.add", Empty, Bare, SIMD);
    F64X2Sub = (FD, 0xf1, "f64x2.sub", Empty, Bare, SIMD);
    F64X2Mul = (FD, 0xf2, "f64x2.mul", Empty, Bare, SIMD);
    F64X2Div = (FD, 0xf3, "f64x2.div", Empty, Bare, SIMD);
    F64X2Min = (FD, 0xf4, "f64x2.min", Empty, Bare, SIMD);
    F64X2Max = (FD, 0xf5, "f64x2.max", Empty, Bare, SIMD);
    I32X4TruncSatF32X4S = (FD, 0xf8, "i32x4.trunc_sat_f32x4_s", Empty, Bare, SIMD);
    I32X4TruncSatF32X4U = (FD, 0xf9, "i32x4.trunc_sat_f32x4_u", Empty, Bare, SIMD);
    F32X4ConvertI32X4S = (FD, 0xfa, "f32x4.convert_i32x4_s", Empty, Bare, SIMD);
    F32X4ConvertI32X4U = (FD, 0xfb, "f32x4.convert_i32x4_u", Empty, Bare, SIMD);

    // Threads, behind the 0xFE escape.
    AtomicNotify = (FE, 0x00, "atomic.notify", MemArg, Memory, THREADS);
    I32AtomicWait = (FE, 0x01, "i32.atomic.wait", MemArg, Memory, THREADS);
    I64AtomicWait = (FE, 0x02, "i64.atomic.wait", MemArg, Memory, THREADS);
    I32AtomicLoad = (FE, 0x10, "i32.atomic.load", MemArg, Memory, THREADS);
    I64AtomicLoad = (FE, 0x11, "i64.atomic.load", MemArg, Memory, THREADS);
    I32AtomicLoad8U = (FE, 0x12, "i32.atomic.load8_u", MemArg, Memory, THREADS);
    I32AtomicLoad16U = (FE, 0x13, "i32.atomic.load16_u", MemArg, Memory, THREADS);
    I64AtomicLoad8U = (FE, 0x14, "i64.atomic.load8_u", MemArg, Memory, THREADS);
    I64AtomicLoad16U = (FE, 0x15, "i64.atomic.load16_u", MemArg, Memory, THREADS);
    I64AtomicLoad32U = (FE, 0x16, "i64.atomic.load32_u", MemArg, Memory, THREADS);
    I32AtomicStore = (FE, 0x17, "i32.atomic.store", MemArg, Memory, THREADS);
    I64AtomicStore = (FE, 0x18, "i64.atomic.store", MemArg, Memory, THREADS);
    I32AtomicStore8 = (FE, 0x19, "i32.atomic.store8", MemArg, Memory, THREADS);
    I32AtomicStore16 = (FE, 0x1a, "i32.atomic.store16", MemArg, Memory, THREADS);
    I64AtomicStore8 = (FE, 0x1b, "i64.atomic.store8", MemArg, Memory, THREADS);
    I64AtomicStore16 = (FE, 0x1c, "i64.atomic.store16", MemArg, Memory, THREADS);
    I64AtomicStore32 = (FE, 0x1d, "i64.atomic.store32", MemArg, Memory, THREADS);
    I32AtomicRmwAdd = (FE, 0x1e, "i32.atomic.rmw.add", MemArg, Memory, THREADS);
    I64AtomicRmwAdd = (FE, 0x1f, "i64.atomic.rmw.add", MemArg, Memory, THREADS);
    I32AtomicRmw8AddU = (FE, 0x20, "i32.atomic.rmw8.add_u", MemArg, Memory, THREADS);
    I32AtomicRmw16AddU = (FE, 0x21, "i32.atomic.rmw16.add_u", MemArg, Memory, THREADS);
    I64AtomicRmw8AddU = (FE, 0x22, "i64.atomic.rmw8.add_u", MemArg, Memory, THREADS);
    I64AtomicRmw16AddU = (FE, 0x23, "i64.atomic.rmw16.add_u", MemArg, Memory, THREADS);
    I64AtomicRmw32AddU = (FE, 0x24, "i64.atomic.rmw32.add_u", MemArg, Memory, THREADS);
    I32AtomicRmwSub = (FE, 0x25, "i32.atomic.rmw.sub", MemArg, Memory, THREADS);
    I64AtomicRmwSub = (FE, 0x26, "i64.atomic.rmw.sub", MemArg, Memory, THREADS);
    I32AtomicRmw8SubU = (FE, 0x27, "i32.atomic.rmw8.sub_u", MemArg, Memory, THREADS);
    I32AtomicRmw16SubU = (FE, 0x28, "i32.atomic.rmw16.sub_u", MemArg, Memory, THREADS);
    I64AtomicRmw8SubU = (FE, 0x29, "i64.atomic.rmw8.sub_u", MemArg, Memory, THREADS);
    I64AtomicRmw16SubU = (FE, 0x2a, "i64.atomic.rmw16.sub_u", MemArg, Memory, THREADS);
    I64AtomicRmw32SubU = (FE, 0x2b, "i64.atomic.rmw32.sub_u", MemArg, Memory, THREADS);
    I32AtomicRmwAnd = (FE, 0x2c, "i32.atomic.rmw.and", MemArg, Memory, THREADS);
    I64AtomicRmwAnd = (FE, 0x2d, "i64.atomic.rmw.and", MemArg, Memory, THREADS);
    I32AtomicRmw8AndU = (FE, 0x2e, "i32.atomic.rmw8.and_u", MemArg, Memory, THREADS);
    I32AtomicRmw16AndU = (FE, 0x2f, "i32.atomic.rmw16.and_u", MemArg, Memory, THREADS);
    I64AtomicRmw8AndU = (FE, 0x30, "i64.atomic.rmw8.and_u", MemArg, Memory, THREADS);
    I64AtomicRmw16AndU = (FE, 0x31, "i64.atomic.rmw16.and_u", MemArg, Memory, THREADS);
    I64AtomicRmw32AndU = (FE, 0x32, "i64.atomic.rmw32.and_u", MemArg, Memory, THREADS);
    I32AtomicRmwOr = (FE, 0x33, "i32.atomic.rmw.or", MemArg, Memory, THREADS);
    I64AtomicRmwOr = (FE, 0x34, "i64.atomic.rmw.or", MemArg, Memory, THREADS);
    I32AtomicRmw8OrU = (FE, 0x35, "i32.atomic.rmw8.or_u", MemArg, Memory, THREADS);
    I32AtomicRmw16OrU = (FE, 0x36, "i32.atomic.rmw16.or_u", MemArg, Memory, THREADS);
    I64AtomicRmw8OrU = (FE, 0x37, "i64.atomic.rmw8.or_u", MemArg, Memory, THREADS);
    I64AtomicRmw16OrU = (FE, 0x38, "i64.atomic.rmw16.or_u", MemArg, Memory, THREADS);
    I64AtomicRmw32OrU = (FE, 0x39, "i64.atomic.rmw32.or_u", MemArg, Memory, THREADS);
    I32AtomicRmwXor = (FE, 0x3a, "i32.atomic.rmw.xor", MemArg, Memory, THREADS);
    I64AtomicRmwXor = (FE, 0x3b, "i64.atomic.rmw.xor", MemArg, Memory, THREADS);
    I32AtomicRmw8XorU = (FE, 0x3c, "i32.atomic.rmw8.xor_u", MemArg, Memory, THREADS);
    I32AtomicRmw16XorU = (FE, 0x3d, "i32.atomic.rmw16.xor_u", MemArg, Memory, THREADS);
    I64AtomicRmw8XorU = (FE, 0x3e, "i64.atomic.rmw8.xor_u", MemArg, Memory, THREADS);
    I64AtomicRmw16XorU = (FE, 0x3f, "i64.atomic.rmw16.xor_u", MemArg, Memory, THREADS);
    I64AtomicRmw32XorU = (FE, 0x40, "i64.atomic.rmw32.xor_u", MemArg, Memory, THREADS);
    I32AtomicRmwXchg = (FE, 0x41, "i32.atomic.rmw.xchg", MemArg, Memory, THREADS);
    I64AtomicRmwXchg = (FE, 0x42, "i64.atomic.rmw.xchg", MemArg, Memory, THREADS);
    I32AtomicRmw8XchgU = (FE, 0x43, "i32.atomic.rmw8.xchg_u", MemArg, Memory, THREADS);
    I32AtomicRmw16XchgU = (FE, 0x44, "i32.atomic.rmw16.xchg_u", MemArg, Memory, THREADS);
    I64AtomicRmw8XchgU = (FE, 0x45, "i64.atomic.rmw8.xchg_u", MemArg, Memory, THREADS);
    I64AtomicRmw16XchgU = (FE, 0x46, "i64.atomic.rmw16.xchg_u", MemArg, Memory, THREADS);
    I64AtomicRmw32XchgU = (FE, 0x47, "i64.atomic.rmw32.xchg_u", MemArg, Memory, THREADS);
    I32AtomicRmwCmpxchg = (FE, 0x48, "i32.atomic.rmw.cmpxchg", MemArg, Memory, THREADS);
    I64AtomicRmwCmpxchg = (FE, 0x49, "i64.atomic.rmw.cmpxchg", MemArg, Memory, THREADS);
    I32AtomicRmw8CmpxchgU = (FE, 0x4a, "i32.atomic.rmw8.cmpxchg_u", MemArg, Memory, THREADS);
    I32AtomicRmw16CmpxchgU = (FE, 0x4b, "i32.atomic.rmw16.cmpxchg_u", MemArg, Memory, THREADS);
    I64AtomicRmw8CmpxchgU = (FE, 0x4c, "i64.atomic.rmw8.cmpxchg_u", MemArg, Memory, THREADS);
    I64AtomicRmw16CmpxchgU = (FE, 0x4d, "i64.atomic.rmw16.cmpxchg_u", MemArg, Memory, THREADS);
    I64AtomicRmw32CmpxchgU = (FE, 0x4e, "i64.atomic.rmw32.cmpxchg_u", MemArg, Memory, THREADS);
}

/// Whether a byte introduces a multi-byte opcode.
pub fn is_prefix_byte(byte: u8) -> bool {
    matches!(byte, 0xfc | 0xfd | 0xfe)
}

/// Every opcode, in table order.
#[cfg(test)]
pub(crate) fn all_opcodes() -> impl Iterator<Item = Opcode> {
    OPCODES.iter().map(|entry| entry.opcode)
}

static BY_BYTE: Lazy<[Option<Opcode>; 256]> = Lazy::new(|| {
    let mut table = [None; 256];
    for entry in OPCODES {
        if entry.prefix.is_none() {
            debug_assert!(table[entry.code as usize].is_none());
            table[entry.code as usize] = Some(entry.opcode);
        }
    }
    table
});

static BY_PREFIX: Lazy<HashMap<(u8, u32), Opcode>> = Lazy::new(|| {
    OPCODES
        .iter()
        .filter_map(|entry| entry.prefix.map(|prefix| ((prefix, entry.code), entry.opcode)))
        .collect()
});

static BY_TEXT: Lazy<HashMap<&'static str, Opcode>> = Lazy::new(|| {
    let mut map = HashMap::with_capacity(OPCODES.len());
    for entry in OPCODES {
        // `select` and `select t*` share a spelling; the parser picks the
        // typed form from context, so the untyped row wins here.
        map.entry(entry.text).or_insert(entry.opcode);
    }
    map
});

impl Opcode {
    #[inline]
    fn entry(&self) -> &'static Entry {
        &OPCODES[*self as usize]
    }

    /// Decode a one-byte opcode.
    pub fn try_from_byte(byte: u8) -> Option<Opcode> {
        BY_BYTE[byte as usize]
    }

    /// Decode a prefixed opcode from its escape byte and LEB subopcode.
    pub fn try_from_bytes(prefix: u8, subopcode: u32) -> Option<Opcode> {
        debug_assert!(is_prefix_byte(prefix));
        BY_PREFIX.get(&(prefix, subopcode)).copied()
    }

    /// Look up an opcode by its canonical text spelling.
    pub fn from_text(text: &str) -> Option<Opcode> {
        BY_TEXT.get(text).copied()
    }

    /// The canonical text spelling.
    pub fn text(&self) -> &'static str {
        self.entry().text
    }

    /// The escape prefix, for multi-byte opcodes.
    pub fn prefix(&self) -> Option<u8> {
        self.entry().prefix
    }

    /// The opcode byte, or the subopcode following the escape prefix.
    pub fn code(&self) -> u32 {
        self.entry().code
    }

    /// The shape of the immediate that follows this opcode.
    pub fn immediate_kind(&self) -> ImmKind {
        self.entry().imm
    }

    /// The token category this opcode's keyword lexes as.
    pub fn token_kind(&self) -> InstrTokenKind {
        self.entry().token
    }

    /// The feature that gates this opcode; empty for MVP opcodes.
    pub fn features(&self) -> Features {
        self.entry().features
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_encoding_roundtrips() {
        for entry in OPCODES {
            let decoded = match entry.prefix {
                None => Opcode::try_from_byte(entry.code as u8),
                Some(prefix) => Opcode::try_from_bytes(prefix, entry.code),
            };
            assert_eq!(decoded, Some(entry.opcode), "{}", entry.text);
        }
    }

    #[test]
    fn no_duplicate_encodings() {
        let mut seen = HashMap::new();
        for entry in OPCODES {
            if let Some(old) = seen.insert((entry.prefix, entry.code), entry.text) {
                panic!("{} and {} share an encoding", old, entry.text);
            }
        }
    }

    #[test]
    fn text_lookup_matches_table() {
        for entry in OPCODES {
            let opcode = Opcode::from_text(entry.text).expect(entry.text);
            assert_eq!(opcode.text(), entry.text);
        }
        assert_eq!(Opcode::from_text("select"), Some(Opcode::Select));
        assert_eq!(Opcode::from_text("i32.madd"), None);
    }

    #[test]
    fn gated_opcodes_carry_their_feature() {
        assert_eq!(Opcode::I32Add.features(), Features::empty());
        assert_eq!(Opcode::V8X16Shuffle.features(), Features::SIMD);
        assert_eq!(Opcode::I64AtomicRmwCmpxchg.features(), Features::THREADS);
        assert_eq!(Opcode::ReturnCall.features(), Features::TAIL_CALL);
        assert_eq!(Opcode::BrOnExn.features(), Features::EXCEPTIONS);
        assert_eq!(Opcode::MemoryInit.features(), Features::BULK_MEMORY);
    }
}
