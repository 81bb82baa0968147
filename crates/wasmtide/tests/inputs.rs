//! Shared module images for the integration tests: fixed byte sequences for
//! the malformed cases, and builders (on top of the binary writers) for the
//! structurally interesting ones.

use wasmtide::binary::write::*;
use wasmtide::{
    ConstExpr, DefinedType, FuncType, Immediate, Instruction, Limits, Location, MemoryType,
    Opcode, SectionId, TableType, ValType,
};

/// Just the 8-byte header: a module with zero sections.
pub const MINIMAL: &[u8] = &[0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00];

/// One type section holding a single `() -> (i32)` signature.
pub const TYPE_ONLY: &[u8] = &[
    0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00, // header
    0x01, 0x05, // type section, 5 bytes
    0x01, 0x60, 0x00, 0x01, 0x7f, // 1 entry: () -> (i32)
];

/// A type section whose size is LEB-encoded in five bytes instead of one.
pub const NON_MINIMAL_SECTION_SIZE: &[u8] = &[
    0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00, // header
    0x01, 0x85, 0x80, 0x80, 0x80, 0x00, // type section, size 5, overlong
    0x01, 0x60, 0x00, 0x01, 0x7f,
];

pub const BAD_MAGIC: &[u8] = &[0x00, 0x61, 0x73, 0x6e, 0x01, 0x00, 0x00, 0x00];

pub fn loc() -> Location {
    Location::default()
}

pub fn instr(opcode: Opcode, immediate: Immediate) -> Instruction {
    Instruction {
        loc: loc(),
        opcode,
        immediate,
    }
}

pub fn i32_const(value: i32) -> ConstExpr {
    ConstExpr {
        loc: loc(),
        instr: instr(Opcode::I32Const, Immediate::I32(value)),
    }
}

pub fn func_type(params: &[ValType], results: &[ValType]) -> FuncType {
    FuncType {
        params: params.to_vec(),
        results: results.to_vec(),
    }
}

pub fn header(out: &mut Vec<u8>) {
    write_module_header(out);
}

pub fn type_section(out: &mut Vec<u8>, types: &[FuncType]) {
    section_with(out, SectionId::Type, |body| {
        write_var_u32(body, types.len() as u32);
        for ty in types {
            write_defined_type(
                body,
                &DefinedType {
                    loc: loc(),
                    ty: ty.clone(),
                },
            );
        }
    });
}

pub fn function_section(out: &mut Vec<u8>, type_indices: &[u32]) {
    section_with(out, SectionId::Function, |body| {
        write_var_u32(body, type_indices.len() as u32);
        for idx in type_indices {
            write_var_u32(body, *idx);
        }
    });
}

pub fn table_section(out: &mut Vec<u8>, tables: &[TableType]) {
    section_with(out, SectionId::Table, |body| {
        write_var_u32(body, tables.len() as u32);
        for table in tables {
            write_table_type(body, table);
        }
    });
}

pub fn memory_section(out: &mut Vec<u8>, memories: &[MemoryType]) {
    section_with(out, SectionId::Memory, |body| {
        write_var_u32(body, memories.len() as u32);
        for memory in memories {
            write_memory_type(body, memory);
        }
    });
}

/// A code section from raw instruction bytes, one local-less body each.
pub fn code_section(out: &mut Vec<u8>, bodies: &[&[u8]]) {
    section_with(out, SectionId::Code, |body| {
        write_var_u32(body, bodies.len() as u32);
        for instrs in bodies {
            write_var_u32(body, instrs.len() as u32 + 1);
            write_var_u32(body, 0); // no locals
            body.extend_from_slice(instrs);
        }
    });
}

pub fn memory_type(min: u32, max: Option<u32>, shared: bool) -> MemoryType {
    MemoryType {
        loc: loc(),
        limits: Limits {
            loc: loc(),
            min,
            max,
            shared,
        },
    }
}

/// A module with one function of the given type and body.
pub fn single_func_module(ty: FuncType, body_instrs: &[u8]) -> Vec<u8> {
    let mut out = vec![];
    header(&mut out);
    type_section(&mut out, &[ty]);
    function_section(&mut out, &[0]);
    code_section(&mut out, &[body_instrs]);
    out
}
