//! Binary encoders mirroring the readers, one function per construct.
//!
//! Encoders always produce canonical form: minimal LEB128s, explicit flags
//! only where the decoded value requires them. `decode(encode(x)) == x` for
//! every representable value, and `encode(decode(bytes)) == bytes` whenever
//! `bytes` was canonically encoded.

use crate::{
    binary::{MAGIC, VERSION},
    instr::{BlockType, Immediate, Instruction},
    module::*,
    ConstExpr, SectionId,
};

pub use wasmtide_leb128::{write_s32, write_s33, write_s64, write_u32 as write_var_u32, write_u64 as write_var_u64};

pub fn write_module_header(out: &mut Vec<u8>) {
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&VERSION);
}

/// Append a section: id byte, size, body.
pub fn write_section(out: &mut Vec<u8>, id: SectionId, body: &[u8]) {
    out.push(id as u8);
    write_var_u32(out, body.len() as u32);
    out.extend_from_slice(body);
}

/// Build a section body with `fill`, then append it under `id`.
pub fn section_with(out: &mut Vec<u8>, id: SectionId, fill: impl FnOnce(&mut Vec<u8>)) {
    let mut body = vec![];
    fill(&mut body);
    write_section(out, id, &body);
}

pub fn write_name(out: &mut Vec<u8>, name: &str) {
    write_var_u32(out, name.len() as u32);
    out.extend_from_slice(name.as_bytes());
}

pub fn write_valtype(out: &mut Vec<u8>, ty: ValType) {
    out.push(ty as u8);
}

pub fn write_reftype(out: &mut Vec<u8>, ty: RefType) {
    out.push(ty as u8);
}

pub fn write_func_type(out: &mut Vec<u8>, ty: &FuncType) {
    out.push(0x60);
    write_var_u32(out, ty.params.len() as u32);
    for param in &ty.params {
        write_valtype(out, *param);
    }
    write_var_u32(out, ty.results.len() as u32);
    for result in &ty.results {
        write_valtype(out, *result);
    }
}

pub fn write_defined_type(out: &mut Vec<u8>, ty: &DefinedType) {
    write_func_type(out, &ty.ty);
}

pub fn write_limits(out: &mut Vec<u8>, limits: &Limits) {
    let mut flags = 0u8;
    if limits.max.is_some() {
        flags |= 0b01;
    }
    if limits.shared {
        flags |= 0b10;
    }
    out.push(flags);
    write_var_u32(out, limits.min);
    if let Some(max) = limits.max {
        write_var_u32(out, max);
    }
}

pub fn write_table_type(out: &mut Vec<u8>, ty: &TableType) {
    write_reftype(out, ty.elem_type);
    write_limits(out, &ty.limits);
}

pub fn write_memory_type(out: &mut Vec<u8>, ty: &MemoryType) {
    write_limits(out, &ty.limits);
}

pub fn write_global_type(out: &mut Vec<u8>, ty: &GlobalType) {
    write_valtype(out, ty.content_type);
    out.push(ty.mutable as u8);
}

pub fn write_event_type(out: &mut Vec<u8>, ty: &EventType) {
    write_var_u32(out, ty.attribute as u32);
    write_var_u32(out, ty.type_idx);
}

pub fn write_import(out: &mut Vec<u8>, import: &Import<'_>) {
    write_name(out, import.module);
    write_name(out, import.field);
    match &import.kind {
        ImportKind::Func(type_idx) => {
            out.push(ExternalKind::Func as u8);
            write_var_u32(out, *type_idx);
        }
        ImportKind::Table(ty) => {
            out.push(ExternalKind::Table as u8);
            write_table_type(out, ty);
        }
        ImportKind::Memory(ty) => {
            out.push(ExternalKind::Memory as u8);
            write_memory_type(out, ty);
        }
        ImportKind::Global(ty) => {
            out.push(ExternalKind::Global as u8);
            write_global_type(out, ty);
        }
        ImportKind::Event(ty) => {
            out.push(ExternalKind::Event as u8);
            write_event_type(out, ty);
        }
    }
}

pub fn write_function(out: &mut Vec<u8>, function: &Function) {
    write_var_u32(out, function.type_idx);
}

pub fn write_global(out: &mut Vec<u8>, global: &Global) {
    write_global_type(out, &global.ty);
    write_const_expr(out, &global.init);
}

pub fn write_export(out: &mut Vec<u8>, export: &Export<'_>) {
    write_name(out, export.field);
    out.push(export.kind as u8);
    write_var_u32(out, export.index);
}

pub fn write_block_type(out: &mut Vec<u8>, ty: BlockType) {
    match ty {
        BlockType::Empty => out.push(0x40),
        BlockType::Type(ty) => write_valtype(out, ty),
        BlockType::TypeIndex(idx) => write_s33(out, idx as i64),
    }
}

pub fn write_instruction(out: &mut Vec<u8>, instr: &Instruction) {
    match instr.opcode.prefix() {
        None => out.push(instr.opcode.code() as u8),
        Some(prefix) => {
            out.push(prefix);
            write_var_u32(out, instr.opcode.code());
        }
    }
    match &instr.immediate {
        Immediate::None => {}
        Immediate::Block(ty) => write_block_type(out, *ty),
        Immediate::Index(idx) => write_var_u32(out, *idx),
        Immediate::CallIndirect {
            type_idx,
            table_idx,
        } => {
            write_var_u32(out, *type_idx);
            write_var_u32(out, *table_idx);
        }
        Immediate::BrTable(table) => {
            write_var_u32(out, table.targets.len() as u32);
            for target in &table.targets {
                write_var_u32(out, *target);
            }
            write_var_u32(out, table.default);
        }
        Immediate::BrOnExn { label, event } => {
            write_var_u32(out, *label);
            write_var_u32(out, *event);
        }
        Immediate::U8(byte) => out.push(*byte),
        Immediate::MemArg(memarg) => {
            write_var_u32(out, memarg.align_log2);
            write_var_u32(out, memarg.offset);
        }
        Immediate::I32(value) => write_s32(out, *value),
        Immediate::I64(value) => write_s64(out, *value),
        Immediate::F32(value) => out.extend_from_slice(&value.bits().to_le_bytes()),
        Immediate::F64(value) => out.extend_from_slice(&value.bits().to_le_bytes()),
        Immediate::V128(value) => out.extend_from_slice(&value.0),
        Immediate::Init { segment, dst } => {
            write_var_u32(out, *segment);
            write_var_u32(out, *dst);
        }
        Immediate::Copy { src, dst } => {
            write_var_u32(out, *dst);
            write_var_u32(out, *src);
        }
        Immediate::Shuffle(lanes) => out.extend_from_slice(lanes),
        Immediate::ValTypes(tys) => {
            write_var_u32(out, tys.len() as u32);
            for ty in tys {
                write_valtype(out, *ty);
            }
        }
        Immediate::RefType(ty) => write_reftype(out, *ty),
    }
}

pub fn write_const_expr(out: &mut Vec<u8>, expr: &ConstExpr) {
    write_instruction(out, &expr.instr);
    out.push(0x0b);
}

pub fn write_element_segment(out: &mut Vec<u8>, segment: &ElementSegment) {
    let exprs = matches!(segment.items, ElementItems::Expressions(_));
    let mut flags = 0u32;
    let explicit_idx = match &segment.kind {
        // A non-funcref type only has somewhere to be written in the
        // explicit-index form.
        ElementKind::Active { table_idx, .. } => {
            *table_idx != 0 || segment.elem_type != RefType::Func
        }
        ElementKind::Passive => {
            flags |= 0b001;
            false
        }
        ElementKind::Declared => {
            flags |= 0b011;
            true
        }
    };
    if explicit_idx && !matches!(segment.kind, ElementKind::Declared) {
        flags |= 0b010;
    }
    if exprs {
        flags |= 0b100;
    }
    write_var_u32(out, flags);

    if let ElementKind::Active { table_idx, offset } = &segment.kind {
        if flags & 0b010 != 0 {
            write_var_u32(out, *table_idx);
        }
        write_const_expr(out, offset);
    }
    if flags & 0b011 != 0 {
        if exprs {
            write_reftype(out, segment.elem_type);
        } else {
            out.push(ExternalKind::Func as u8);
        }
    }
    match &segment.items {
        ElementItems::Functions(funcs) => {
            write_var_u32(out, funcs.len() as u32);
            for func in funcs {
                write_var_u32(out, *func);
            }
        }
        ElementItems::Expressions(exprs) => {
            write_var_u32(out, exprs.len() as u32);
            for expr in exprs {
                write_const_expr(out, expr);
            }
        }
    }
}

pub fn write_data_segment(out: &mut Vec<u8>, segment: &DataSegment<'_>) {
    match &segment.kind {
        DataKind::Passive => write_var_u32(out, 0b01),
        DataKind::Active { memory_idx, offset } => {
            if *memory_idx != 0 {
                write_var_u32(out, 0b10);
                write_var_u32(out, *memory_idx);
            } else {
                write_var_u32(out, 0b00);
            }
            write_const_expr(out, offset);
        }
    }
    write_var_u32(out, segment.data.len() as u32);
    out.extend_from_slice(segment.data);
}

pub fn write_code(out: &mut Vec<u8>, code: &Code<'_>) {
    let mut body = vec![];
    write_var_u32(&mut body, code.locals.len() as u32);
    for locals in &code.locals {
        write_var_u32(&mut body, locals.count);
        write_valtype(&mut body, locals.ty);
    }
    body.extend_from_slice(code.body.data);
    write_var_u32(out, body.len() as u32);
    out.extend_from_slice(&body);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        binary::InstrReader, instr::Opcode, BrTable, Errors, Features, Location, MemArg,
    };

    #[test]
    fn instructions_roundtrip() {
        let all = Features::all();
        let instrs = [
            (Opcode::Nop, Immediate::None),
            (Opcode::Block, Immediate::Block(BlockType::Type(ValType::I32))),
            (Opcode::Br, Immediate::Index(3)),
            (
                Opcode::CallIndirect,
                Immediate::CallIndirect {
                    type_idx: 2,
                    table_idx: 0,
                },
            ),
            (
                Opcode::BrTable,
                Immediate::BrTable(BrTable {
                    targets: vec![0, 1, 2],
                    default: 3,
                }),
            ),
            (
                Opcode::I32Load,
                Immediate::MemArg(MemArg {
                    align_log2: 2,
                    offset: 1024,
                }),
            ),
            (Opcode::I32Const, Immediate::I32(-624485)),
            (Opcode::I64Const, Immediate::I64(i64::MIN)),
            (Opcode::F64Const, Immediate::F64(3.25f64.into())),
            (Opcode::MemoryInit, Immediate::Init { segment: 1, dst: 0 }),
            (Opcode::TableCopy, Immediate::Copy { src: 2, dst: 1 }),
            (Opcode::V8X16Shuffle, Immediate::Shuffle([0; 16])),
            (Opcode::SelectT, Immediate::ValTypes(vec![ValType::F64])),
            (Opcode::RefNull, Immediate::RefType(RefType::Func)),
            (Opcode::I64AtomicRmwCmpxchg, Immediate::MemArg(MemArg {
                align_log2: 3,
                offset: 0,
            })),
        ];

        for (opcode, immediate) in instrs {
            let instr = Instruction {
                loc: Location::default(),
                opcode,
                immediate,
            };
            let mut bytes = vec![];
            write_instruction(&mut bytes, &instr);
            bytes.push(0x0b);

            let errors = Errors::new();
            let mut reader = InstrReader::new_at(&bytes, 0, all, &errors);
            let decoded = reader.read().unwrap_or_else(|| {
                panic!("{}: {:?}", instr.opcode, errors.errors());
            });
            assert_eq!(decoded.opcode, instr.opcode);
            assert_eq!(decoded.immediate, instr.immediate, "{}", instr.opcode);
            assert_eq!(decoded.loc, Location::new(0, bytes.len() - 1));
            assert!(errors.is_empty());
        }
    }
}
