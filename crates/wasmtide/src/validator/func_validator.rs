use std::fmt;

use tracing::debug;

use crate::{
    binary::InstrReader,
    instr::{BlockType, Immediate, Instruction, MemArg, Opcode},
    module::{Code, FuncType, NumLocals, RefType, ValType},
    validator::Validator,
    Location,
};

/// An operand on the value stack. `Any` is the polymorphic unknown produced
/// in unreachable code; it matches every expected type.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Operand {
    Any,
    Exact(ValType),
}

impl Operand {
    fn is_ref(&self) -> bool {
        matches!(self, Operand::Exact(ty) if ty.is_ref())
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Any => write!(f, "any"),
            Operand::Exact(ty) => write!(f, "{ty}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum FrameKind {
    Block,
    Loop,
    If,
    Else,
    Try,
    Catch,
    Function,
}

/// An open structured block: what its label expects on `br`, what must be on
/// the stack at its `end`, and the value-stack height at entry.
#[derive(Debug)]
struct Frame {
    kind: FrameKind,
    start_types: Vec<ValType>,
    end_types: Vec<ValType>,
    height: usize,
    unreachable: bool,
}

impl Frame {
    /// What a branch to this frame's label expects: the parameters for a
    /// loop, the results for everything else.
    fn label_types(&self) -> &[ValType] {
        match self.kind {
            FrameKind::Loop => &self.start_types,
            _ => &self.end_types,
        }
    }
}

/// Validates a single function body against the module context.
///
/// Errors never corrupt the context: a failing instruction is treated as if
/// it had its declared stack effect, so typing of the rest of the body can
/// still make progress and report further independent errors.
pub(crate) struct FuncValidator<'v, 'a> {
    ctx: &'v Validator<'a>,
    locals: Vec<ValType>,
    results: Vec<ValType>,
    vals: Vec<Operand>,
    frames: Vec<Frame>,
}

impl<'v, 'a> FuncValidator<'v, 'a> {
    pub(crate) fn new(ctx: &'v Validator<'a>, ty: &FuncType, locals: &[NumLocals]) -> Self {
        let mut all_locals = ty.params.clone();
        all_locals.extend(
            locals
                .iter()
                .flat_map(|l| std::iter::repeat(l.ty).take(l.count as usize)),
        );
        Self {
            ctx,
            locals: all_locals,
            results: ty.results.clone(),
            vals: vec![],
            frames: vec![Frame {
                kind: FrameKind::Function,
                start_types: vec![],
                end_types: ty.results.clone(),
                height: 0,
                unreachable: false,
            }],
        }
    }

    pub(crate) fn run(&mut self, code: &Code<'_>) {
        debug!(offset = code.body.offset, "validating function body");
        let mut instrs = InstrReader::new(code.body, self.ctx.features, self.ctx.errors);
        while let Some(instr) = instrs.read() {
            self.validate_instr(&instr);
        }
        if instrs.seen_final_end() && instrs.leftover() > 0 {
            self.error(
                Location::new(instrs.pos(), instrs.leftover()),
                "trailing bytes after the final `end`".to_string(),
            );
        }
    }

    fn error(&self, loc: Location, message: String) {
        self.ctx.errors.on_error(loc, message);
    }

    fn push_op(&mut self, op: Operand) {
        self.vals.push(op);
    }

    fn push_ty(&mut self, ty: ValType) {
        self.vals.push(Operand::Exact(ty));
    }

    fn push_tys(&mut self, tys: &[ValType]) {
        for ty in tys {
            self.push_ty(*ty);
        }
    }

    fn pop_any(&mut self, loc: Location) -> Operand {
        let Some(frame) = self.frames.last() else {
            return Operand::Any;
        };
        if self.vals.len() <= frame.height {
            if !frame.unreachable {
                self.error(loc, "stack underflow".to_string());
            }
            return Operand::Any;
        }
        self.vals.pop().unwrap()
    }

    /// Pop with a subsumption check; on mismatch the expected type is
    /// returned so the instruction keeps its declared effect.
    fn pop_expect(&mut self, loc: Location, expected: ValType) -> Operand {
        match self.pop_any(loc) {
            Operand::Any => Operand::Any,
            Operand::Exact(got) if got == expected => Operand::Exact(got),
            Operand::Exact(got) => {
                self.error(loc, format!("type mismatch: expected {expected}, got {got}"));
                Operand::Exact(expected)
            }
        }
    }

    fn pop_tys(&mut self, loc: Location, tys: &[ValType]) {
        for ty in tys.iter().rev() {
            self.pop_expect(loc, *ty);
        }
    }

    fn push_frame(&mut self, kind: FrameKind, start_types: Vec<ValType>, end_types: Vec<ValType>) {
        self.frames.push(Frame {
            kind,
            height: self.vals.len(),
            unreachable: false,
            start_types,
            end_types,
        });
        let start = self.frames.last().unwrap().start_types.clone();
        self.push_tys(&start);
    }

    fn pop_frame(&mut self, loc: Location) -> Option<Frame> {
        let Some(frame) = self.frames.last() else {
            self.error(loc, "`end` without an open block".to_string());
            return None;
        };
        let end_types = frame.end_types.clone();
        let height = frame.height;
        self.pop_tys(loc, &end_types);
        if self.vals.len() != height {
            self.error(
                loc,
                format!(
                    "values remaining on the stack at the end of the block: expected {height}, got {}",
                    self.vals.len()
                ),
            );
            self.vals.truncate(height);
        }
        self.frames.pop()
    }

    fn mark_unreachable(&mut self) {
        let Some(frame) = self.frames.last_mut() else {
            return;
        };
        frame.unreachable = true;
        self.vals.truncate(frame.height);
    }

    /// The cloned label types of the frame `depth` levels up.
    fn label_types_at(&mut self, loc: Location, depth: u32) -> Option<Vec<ValType>> {
        let idx = (self.frames.len() - 1).checked_sub(depth as usize);
        match idx.and_then(|idx| self.frames.get(idx)) {
            Some(frame) => Some(frame.label_types().to_vec()),
            None => {
                self.error(loc, format!("unknown label {depth}"));
                None
            }
        }
    }

    fn block_types(&mut self, loc: Location, bt: BlockType) -> (Vec<ValType>, Vec<ValType>) {
        match bt {
            BlockType::Empty => (vec![], vec![]),
            BlockType::Type(ty) => (vec![], vec![ty]),
            BlockType::TypeIndex(idx) => match self.ctx.func_type(idx) {
                Some(ty) => (ty.params.clone(), ty.results.clone()),
                None => {
                    self.error(loc, format!("unknown type {idx}"));
                    (vec![], vec![])
                }
            },
        }
    }

    fn check_memory(&mut self, loc: Location) -> bool {
        if self.ctx.mems.is_empty() {
            self.error(loc, "memory not found".to_string());
            return false;
        }
        true
    }

    fn check_align(&mut self, loc: Location, memarg: MemArg, natural_log2: u32, atomic: bool) {
        if atomic {
            if memarg.align_log2 != natural_log2 {
                self.error(
                    loc,
                    "atomic alignment must equal the natural alignment".to_string(),
                );
            }
        } else if memarg.align_log2 > natural_log2 {
            self.error(
                loc,
                format!(
                    "alignment of {} exceeds the natural alignment of {}",
                    1u64 << memarg.align_log2.min(63),
                    1u64 << natural_log2
                ),
            );
        }
    }

    fn memarg(instr: &Instruction) -> MemArg {
        instr.memarg().unwrap_or_default()
    }

    fn load(&mut self, instr: &Instruction, ty: ValType, natural_log2: u32) {
        let loc = instr.loc;
        self.check_memory(loc);
        self.check_align(loc, Self::memarg(instr), natural_log2, false);
        self.pop_expect(loc, ValType::I32);
        self.push_ty(ty);
    }

    fn store(&mut self, instr: &Instruction, ty: ValType, natural_log2: u32) {
        let loc = instr.loc;
        self.check_memory(loc);
        self.check_align(loc, Self::memarg(instr), natural_log2, false);
        self.pop_expect(loc, ty);
        self.pop_expect(loc, ValType::I32);
    }

    fn check_atomic_memory(&mut self, instr: &Instruction, natural_log2: u32) {
        let loc = instr.loc;
        if self.check_memory(loc) && !self.ctx.mems[0].limits.shared {
            self.error(loc, "atomic operations require a shared memory".to_string());
        }
        self.check_align(loc, Self::memarg(instr), natural_log2, true);
    }

    fn atomic_load(&mut self, instr: &Instruction, ty: ValType, natural_log2: u32) {
        self.check_atomic_memory(instr, natural_log2);
        self.pop_expect(instr.loc, ValType::I32);
        self.push_ty(ty);
    }

    fn atomic_store(&mut self, instr: &Instruction, ty: ValType, natural_log2: u32) {
        self.check_atomic_memory(instr, natural_log2);
        self.pop_expect(instr.loc, ty);
        self.pop_expect(instr.loc, ValType::I32);
    }

    fn atomic_rmw(&mut self, instr: &Instruction, ty: ValType, natural_log2: u32) {
        self.check_atomic_memory(instr, natural_log2);
        self.pop_expect(instr.loc, ty);
        self.pop_expect(instr.loc, ValType::I32);
        self.push_ty(ty);
    }

    fn atomic_cmpxchg(&mut self, instr: &Instruction, ty: ValType, natural_log2: u32) {
        self.check_atomic_memory(instr, natural_log2);
        self.pop_expect(instr.loc, ty);
        self.pop_expect(instr.loc, ty);
        self.pop_expect(instr.loc, ValType::I32);
        self.push_ty(ty);
    }

    fn testop(&mut self, loc: Location, ty: ValType) {
        self.pop_expect(loc, ty);
        self.push_ty(ValType::I32);
    }

    fn relop(&mut self, loc: Location, ty: ValType) {
        self.pop_expect(loc, ty);
        self.pop_expect(loc, ty);
        self.push_ty(ValType::I32);
    }

    fn unop(&mut self, loc: Location, ty: ValType) {
        self.pop_expect(loc, ty);
        self.push_ty(ty);
    }

    fn binop(&mut self, loc: Location, ty: ValType) {
        self.pop_expect(loc, ty);
        self.pop_expect(loc, ty);
        self.push_ty(ty);
    }

    fn cvtop(&mut self, loc: Location, from: ValType, to: ValType) {
        self.pop_expect(loc, from);
        self.push_ty(to);
    }

    fn splat(&mut self, loc: Location, from: ValType) {
        self.pop_expect(loc, from);
        self.push_ty(ValType::V128);
    }

    fn check_lane(&mut self, instr: &Instruction, lanes: u8) {
        if let Immediate::U8(lane) = instr.immediate {
            if lane >= lanes {
                self.error(
                    instr.loc,
                    format!("lane {lane} out of range for {}", instr.opcode),
                );
            }
        }
    }

    fn extract_lane(&mut self, instr: &Instruction, lanes: u8, to: ValType) {
        self.check_lane(instr, lanes);
        self.pop_expect(instr.loc, ValType::V128);
        self.push_ty(to);
    }

    fn replace_lane(&mut self, instr: &Instruction, lanes: u8, scalar: ValType) {
        self.check_lane(instr, lanes);
        self.pop_expect(instr.loc, scalar);
        self.pop_expect(instr.loc, ValType::V128);
        self.push_ty(ValType::V128);
    }

    fn simd_shift(&mut self, loc: Location) {
        self.pop_expect(loc, ValType::I32);
        self.pop_expect(loc, ValType::V128);
        self.push_ty(ValType::V128);
    }

    fn simd_bool(&mut self, loc: Location) {
        self.pop_expect(loc, ValType::V128);
        self.push_ty(ValType::I32);
    }

    fn table_elem_type(&mut self, loc: Location, table_idx: u32, what: &str) -> Option<RefType> {
        match self.ctx.tables.get(table_idx as usize) {
            Some(table) => Some(table.elem_type),
            None => {
                self.error(loc, format!("unknown table {table_idx} in {what}"));
                None
            }
        }
    }

    fn check_data_segment(&mut self, loc: Location, segment: u32, what: &str) {
        match self.ctx.data_count {
            None => self.error(loc, format!("{what} requires a data count section")),
            Some(count) if segment >= count => {
                self.error(loc, format!("unknown data segment {segment}"));
            }
            Some(_) => {}
        }
    }

    fn validate_instr(&mut self, instr: &Instruction) {
        use ValType::*;

        let loc = instr.loc;
        let imm_index = instr.index().unwrap_or(0);

        match instr.opcode {
            // Control.
            Opcode::Unreachable => self.mark_unreachable(),
            Opcode::Nop => {}
            Opcode::Block | Opcode::Loop | Opcode::If | Opcode::Try => {
                let bt = instr.block_type().unwrap_or(BlockType::Empty);
                let (params, results) = self.block_types(loc, bt);
                if instr.opcode == Opcode::If {
                    self.pop_expect(loc, I32);
                }
                self.pop_tys(loc, &params);
                let kind = match instr.opcode {
                    Opcode::Block => FrameKind::Block,
                    Opcode::Loop => FrameKind::Loop,
                    Opcode::If => FrameKind::If,
                    _ => FrameKind::Try,
                };
                self.push_frame(kind, params, results);
            }
            Opcode::Else => match self.pop_frame(loc) {
                Some(frame) => {
                    if frame.kind != FrameKind::If {
                        self.error(loc, "`else` without a matching `if`".to_string());
                    }
                    self.push_frame(FrameKind::Else, frame.start_types, frame.end_types);
                }
                None => {}
            },
            Opcode::Catch => match self.pop_frame(loc) {
                Some(frame) => {
                    if frame.kind != FrameKind::Try {
                        self.error(loc, "`catch` without a matching `try`".to_string());
                    }
                    self.push_frame(FrameKind::Catch, vec![], frame.end_types);
                    self.push_ty(ExnRef);
                }
                None => {}
            },
            Opcode::End => {
                if let Some(frame) = self.frames.last() {
                    if frame.kind == FrameKind::If && frame.start_types != frame.end_types {
                        self.error(
                            loc,
                            "`if` with no `else` must have matching parameter and result types"
                                .to_string(),
                        );
                    }
                }
                if let Some(frame) = self.pop_frame(loc) {
                    self.push_tys(&frame.end_types);
                }
            }
            Opcode::Br => {
                if let Some(labels) = self.label_types_at(loc, imm_index) {
                    self.pop_tys(loc, &labels);
                }
                self.mark_unreachable();
            }
            Opcode::BrIf => {
                self.pop_expect(loc, I32);
                if let Some(labels) = self.label_types_at(loc, imm_index) {
                    self.pop_tys(loc, &labels);
                    self.push_tys(&labels);
                }
            }
            Opcode::BrTable => {
                let Immediate::BrTable(table) = &instr.immediate else {
                    return;
                };
                self.pop_expect(loc, I32);
                let Some(default_labels) = self.label_types_at(loc, table.default) else {
                    self.mark_unreachable();
                    return;
                };
                for target in &table.targets {
                    let Some(labels) = self.label_types_at(loc, *target) else {
                        continue;
                    };
                    if labels.len() != default_labels.len() {
                        self.error(loc, "br_table label-arity mismatch".to_string());
                    } else if labels != default_labels {
                        self.error(loc, "br_table label type mismatch".to_string());
                    }
                }
                self.pop_tys(loc, &default_labels);
                self.mark_unreachable();
            }
            Opcode::Return => {
                let results = self.results.clone();
                self.pop_tys(loc, &results);
                self.mark_unreachable();
            }
            Opcode::Call => match self.ctx.func(imm_index) {
                Some(ty) => {
                    self.pop_tys(loc, &ty.params);
                    self.push_tys(&ty.results);
                }
                None => self.error(loc, format!("unknown function {imm_index}")),
            },
            Opcode::CallIndirect | Opcode::ReturnCallIndirect => {
                let Immediate::CallIndirect {
                    type_idx,
                    table_idx,
                } = instr.immediate
                else {
                    return;
                };
                if let Some(elem_type) = self.table_elem_type(loc, table_idx, "call_indirect") {
                    if elem_type != RefType::Func {
                        self.error(
                            loc,
                            format!("call_indirect requires a funcref table, got {elem_type}"),
                        );
                    }
                }
                self.pop_expect(loc, I32);
                match self.ctx.func_type(type_idx) {
                    Some(ty) => {
                        self.pop_tys(loc, &ty.params);
                        if instr.opcode == Opcode::ReturnCallIndirect {
                            if ty.results != self.results {
                                self.error(
                                    loc,
                                    "tail call result types must match the caller".to_string(),
                                );
                            }
                            self.mark_unreachable();
                        } else {
                            self.push_tys(&ty.results);
                        }
                    }
                    None => self.error(loc, format!("unknown type {type_idx}")),
                }
            }
            Opcode::ReturnCall => {
                match self.ctx.func(imm_index) {
                    Some(ty) => {
                        self.pop_tys(loc, &ty.params);
                        if ty.results != self.results {
                            self.error(
                                loc,
                                "tail call result types must match the caller".to_string(),
                            );
                        }
                    }
                    None => self.error(loc, format!("unknown function {imm_index}")),
                }
                self.mark_unreachable();
            }
            Opcode::Throw => {
                match self.ctx.events.get(imm_index as usize) {
                    Some(&type_idx) => {
                        if let Some(ty) = self.ctx.func_type(type_idx) {
                            self.pop_tys(loc, &ty.params);
                        }
                    }
                    None => self.error(loc, format!("unknown event {imm_index}")),
                }
                self.mark_unreachable();
            }
            Opcode::Rethrow => {
                self.pop_expect(loc, ExnRef);
                self.mark_unreachable();
            }
            Opcode::BrOnExn => {
                let Immediate::BrOnExn { label, event } = instr.immediate else {
                    return;
                };
                self.pop_expect(loc, ExnRef);
                let labels = self.label_types_at(loc, label);
                match self.ctx.events.get(event as usize) {
                    Some(&type_idx) => {
                        if let (Some(labels), Some(ty)) = (labels, self.ctx.func_type(type_idx)) {
                            if labels != ty.params {
                                self.error(loc, "br_on_exn label type mismatch".to_string());
                            }
                        }
                    }
                    None => self.error(loc, format!("unknown event {event}")),
                }
                self.push_ty(ExnRef);
            }

            // Parametric.
            Opcode::Drop => {
                self.pop_any(loc);
            }
            Opcode::Select => {
                self.pop_expect(loc, I32);
                let v1 = self.pop_any(loc);
                let v2 = self.pop_any(loc);
                if let (Operand::Exact(t1), Operand::Exact(t2)) = (v1, v2) {
                    if t1 != t2 {
                        self.error(
                            loc,
                            format!("select operands must have the same type, got {t1} and {t2}"),
                        );
                    }
                }
                if v1.is_ref() || v2.is_ref() {
                    self.error(
                        loc,
                        "select without a type annotation cannot be used with reference types"
                            .to_string(),
                    );
                }
                self.push_op(if v1 == Operand::Any { v2 } else { v1 });
            }
            Opcode::SelectT => {
                let Immediate::ValTypes(tys) = &instr.immediate else {
                    return;
                };
                if tys.len() != 1 {
                    self.error(loc, "select requires exactly one type annotation".to_string());
                }
                self.pop_expect(loc, I32);
                if let Some(&ty) = tys.first() {
                    self.pop_expect(loc, ty);
                    self.pop_expect(loc, ty);
                    self.push_ty(ty);
                }
            }

            // Variables.
            Opcode::LocalGet => match self.locals.get(imm_index as usize) {
                Some(&ty) => self.push_ty(ty),
                None => {
                    self.error(loc, format!("unknown local {imm_index}"));
                    self.push_op(Operand::Any);
                }
            },
            Opcode::LocalSet => match self.locals.get(imm_index as usize) {
                Some(&ty) => {
                    self.pop_expect(loc, ty);
                }
                None => {
                    self.error(loc, format!("unknown local {imm_index}"));
                    self.pop_any(loc);
                }
            },
            Opcode::LocalTee => match self.locals.get(imm_index as usize) {
                Some(&ty) => {
                    self.pop_expect(loc, ty);
                    self.push_ty(ty);
                }
                None => {
                    self.error(loc, format!("unknown local {imm_index}"));
                }
            },
            Opcode::GlobalGet => match self.ctx.globals.get(imm_index as usize) {
                Some(global) => self.push_ty(global.ty.content_type),
                None => {
                    self.error(loc, format!("unknown global {imm_index}"));
                    self.push_op(Operand::Any);
                }
            },
            Opcode::GlobalSet => match self.ctx.globals.get(imm_index as usize) {
                Some(global) => {
                    if !global.ty.mutable {
                        self.error(
                            loc,
                            format!("cannot assign to immutable global {imm_index}"),
                        );
                    }
                    self.pop_expect(loc, global.ty.content_type);
                }
                None => {
                    self.error(loc, format!("unknown global {imm_index}"));
                    self.pop_any(loc);
                }
            },
            Opcode::TableGet => {
                if let Some(elem) = self.table_elem_type(loc, imm_index, "table.get") {
                    self.pop_expect(loc, I32);
                    self.push_ty(elem.into());
                }
            }
            Opcode::TableSet => {
                if let Some(elem) = self.table_elem_type(loc, imm_index, "table.set") {
                    self.pop_expect(loc, elem.into());
                    self.pop_expect(loc, I32);
                }
            }

            // Memory.
            Opcode::I32Load => self.load(instr, I32, 2),
            Opcode::I64Load => self.load(instr, I64, 3),
            Opcode::F32Load => self.load(instr, F32, 2),
            Opcode::F64Load => self.load(instr, F64, 3),
            Opcode::I32Load8S | Opcode::I32Load8U => self.load(instr, I32, 0),
            Opcode::I32Load16S | Opcode::I32Load16U => self.load(instr, I32, 1),
            Opcode::I64Load8S | Opcode::I64Load8U => self.load(instr, I64, 0),
            Opcode::I64Load16S | Opcode::I64Load16U => self.load(instr, I64, 1),
            Opcode::I64Load32S | Opcode::I64Load32U => self.load(instr, I64, 2),
            Opcode::I32Store => self.store(instr, I32, 2),
            Opcode::I64Store => self.store(instr, I64, 3),
            Opcode::F32Store => self.store(instr, F32, 2),
            Opcode::F64Store => self.store(instr, F64, 3),
            Opcode::I32Store8 => self.store(instr, I32, 0),
            Opcode::I32Store16 => self.store(instr, I32, 1),
            Opcode::I64Store8 => self.store(instr, I64, 0),
            Opcode::I64Store16 => self.store(instr, I64, 1),
            Opcode::I64Store32 => self.store(instr, I64, 2),
            Opcode::MemorySize => {
                self.check_memory(loc);
                self.push_ty(I32);
            }
            Opcode::MemoryGrow => {
                self.check_memory(loc);
                self.pop_expect(loc, I32);
                self.push_ty(I32);
            }
            Opcode::MemoryCopy | Opcode::MemoryFill => {
                self.check_memory(loc);
                self.pop_expect(loc, I32);
                self.pop_expect(loc, I32);
                self.pop_expect(loc, I32);
            }
            Opcode::MemoryInit => {
                let Immediate::Init { segment, .. } = instr.immediate else {
                    return;
                };
                self.check_memory(loc);
                self.check_data_segment(loc, segment, "memory.init");
                self.pop_expect(loc, I32);
                self.pop_expect(loc, I32);
                self.pop_expect(loc, I32);
            }
            Opcode::DataDrop => {
                self.check_data_segment(loc, imm_index, "data.drop");
            }

            // Tables.
            Opcode::TableInit => {
                let Immediate::Init { segment, dst } = instr.immediate else {
                    return;
                };
                let table = self.table_elem_type(loc, dst, "table.init");
                match self.ctx.elems.get(segment as usize) {
                    Some(elem_type) => {
                        if let Some(table_type) = table {
                            if table_type != *elem_type {
                                self.error(
                                    loc,
                                    format!(
                                        "table.init element type {elem_type} does not match table type {table_type}"
                                    ),
                                );
                            }
                        }
                    }
                    None => self.error(loc, format!("unknown element segment {segment}")),
                }
                self.pop_expect(loc, I32);
                self.pop_expect(loc, I32);
                self.pop_expect(loc, I32);
            }
            Opcode::ElemDrop => {
                if self.ctx.elems.get(imm_index as usize).is_none() {
                    self.error(loc, format!("unknown element segment {imm_index}"));
                }
            }
            Opcode::TableCopy => {
                let Immediate::Copy { src, dst } = instr.immediate else {
                    return;
                };
                let src_ty = self.table_elem_type(loc, src, "table.copy");
                let dst_ty = self.table_elem_type(loc, dst, "table.copy");
                if let (Some(src_ty), Some(dst_ty)) = (src_ty, dst_ty) {
                    if src_ty != dst_ty {
                        self.error(
                            loc,
                            format!("table.copy between {src_ty} and {dst_ty} tables"),
                        );
                    }
                }
                self.pop_expect(loc, I32);
                self.pop_expect(loc, I32);
                self.pop_expect(loc, I32);
            }
            Opcode::TableGrow => {
                if let Some(elem) = self.table_elem_type(loc, imm_index, "table.grow") {
                    self.pop_expect(loc, I32);
                    self.pop_expect(loc, elem.into());
                    self.push_ty(I32);
                }
            }
            Opcode::TableSize => {
                self.table_elem_type(loc, imm_index, "table.size");
                self.push_ty(I32);
            }
            Opcode::TableFill => {
                if let Some(elem) = self.table_elem_type(loc, imm_index, "table.fill") {
                    self.pop_expect(loc, I32);
                    self.pop_expect(loc, elem.into());
                    self.pop_expect(loc, I32);
                }
            }

            // Constants.
            Opcode::I32Const => self.push_ty(I32),
            Opcode::I64Const => self.push_ty(I64),
            Opcode::F32Const => self.push_ty(F32),
            Opcode::F64Const => self.push_ty(F64),
            Opcode::V128Const => self.push_ty(V128),

            // Integer tests and comparisons.
            Opcode::I32Eqz => self.testop(loc, I32),
            Opcode::I64Eqz => self.testop(loc, I64),
            Opcode::I32Eq
            | Opcode::I32Ne
            | Opcode::I32LtS
            | Opcode::I32LtU
            | Opcode::I32GtS
            | Opcode::I32GtU
            | Opcode::I32LeS
            | Opcode::I32LeU
            | Opcode::I32GeS
            | Opcode::I32GeU => self.relop(loc, I32),
            Opcode::I64Eq
            | Opcode::I64Ne
            | Opcode::I64LtS
            | Opcode::I64LtU
            | Opcode::I64GtS
            | Opcode::I64GtU
            | Opcode::I64LeS
            | Opcode::I64LeU
            | Opcode::I64GeS
            | Opcode::I64GeU => self.relop(loc, I64),
            Opcode::F32Eq
            | Opcode::F32Ne
            | Opcode::F32Lt
            | Opcode::F32Gt
            | Opcode::F32Le
            | Opcode::F32Ge => self.relop(loc, F32),
            Opcode::F64Eq
            | Opcode::F64Ne
            | Opcode::F64Lt
            | Opcode::F64Gt
            | Opcode::F64Le
            | Opcode::F64Ge => self.relop(loc, F64),

            // Integer arithmetic.
            Opcode::I32Clz | Opcode::I32Ctz | Opcode::I32Popcnt => self.unop(loc, I32),
            Opcode::I64Clz | Opcode::I64Ctz | Opcode::I64Popcnt => self.unop(loc, I64),
            Opcode::I32Add
            | Opcode::I32Sub
            | Opcode::I32Mul
            | Opcode::I32DivS
            | Opcode::I32DivU
            | Opcode::I32RemS
            | Opcode::I32RemU
            | Opcode::I32And
            | Opcode::I32Or
            | Opcode::I32Xor
            | Opcode::I32Shl
            | Opcode::I32ShrS
            | Opcode::I32ShrU
            | Opcode::I32Rotl
            | Opcode::I32Rotr => self.binop(loc, I32),
            Opcode::I64Add
            | Opcode::I64Sub
            | Opcode::I64Mul
            | Opcode::I64DivS
            | Opcode::I64DivU
            | Opcode::I64RemS
            | Opcode::I64RemU
            | Opcode::I64And
            | Opcode::I64Or
            | Opcode::I64Xor
            | Opcode::I64Shl
            | Opcode::I64ShrS
            | Opcode::I64ShrU
            | Opcode::I64Rotl
            | Opcode::I64Rotr => self.binop(loc, I64),

            // Float arithmetic.
            Opcode::F32Abs
            | Opcode::F32Neg
            | Opcode::F32Ceil
            | Opcode::F32Floor
            | Opcode::F32Trunc
            | Opcode::F32Nearest
            | Opcode::F32Sqrt => self.unop(loc, F32),
            Opcode::F64Abs
            | Opcode::F64Neg
            | Opcode::F64Ceil
            | Opcode::F64Floor
            | Opcode::F64Trunc
            | Opcode::F64Nearest
            | Opcode::F64Sqrt => self.unop(loc, F64),
            Opcode::F32Add
            | Opcode::F32Sub
            | Opcode::F32Mul
            | Opcode::F32Div
            | Opcode::F32Min
            | Opcode::F32Max
            | Opcode::F32Copysign => self.binop(loc, F32),
            Opcode::F64Add
            | Opcode::F64Sub
            | Opcode::F64Mul
            | Opcode::F64Div
            | Opcode::F64Min
            | Opcode::F64Max
            | Opcode::F64Copysign => self.binop(loc, F64),

            // Conversions.
            Opcode::I32WrapI64 => self.cvtop(loc, I64, I32),
            Opcode::I32TruncF32S | Opcode::I32TruncF32U => self.cvtop(loc, F32, I32),
            Opcode::I32TruncF64S | Opcode::I32TruncF64U => self.cvtop(loc, F64, I32),
            Opcode::I64ExtendI32S | Opcode::I64ExtendI32U => self.cvtop(loc, I32, I64),
            Opcode::I64TruncF32S | Opcode::I64TruncF32U => self.cvtop(loc, F32, I64),
            Opcode::I64TruncF64S | Opcode::I64TruncF64U => self.cvtop(loc, F64, I64),
            Opcode::F32ConvertI32S | Opcode::F32ConvertI32U => self.cvtop(loc, I32, F32),
            Opcode::F32ConvertI64S | Opcode::F32ConvertI64U => self.cvtop(loc, I64, F32),
            Opcode::F32DemoteF64 => self.cvtop(loc, F64, F32),
            Opcode::F64ConvertI32S | Opcode::F64ConvertI32U => self.cvtop(loc, I32, F64),
            Opcode::F64ConvertI64S | Opcode::F64ConvertI64U => self.cvtop(loc, I64, F64),
            Opcode::F64PromoteF32 => self.cvtop(loc, F32, F64),
            Opcode::I32ReinterpretF32 => self.cvtop(loc, F32, I32),
            Opcode::I64ReinterpretF64 => self.cvtop(loc, F64, I64),
            Opcode::F32ReinterpretI32 => self.cvtop(loc, I32, F32),
            Opcode::F64ReinterpretI64 => self.cvtop(loc, I64, F64),
            Opcode::I32TruncSatF32S | Opcode::I32TruncSatF32U => self.cvtop(loc, F32, I32),
            Opcode::I32TruncSatF64S | Opcode::I32TruncSatF64U => self.cvtop(loc, F64, I32),
            Opcode::I64TruncSatF32S | Opcode::I64TruncSatF32U => self.cvtop(loc, F32, I64),
            Opcode::I64TruncSatF64S | Opcode::I64TruncSatF64U => self.cvtop(loc, F64, I64),
            Opcode::I32Extend8S | Opcode::I32Extend16S => self.unop(loc, I32),
            Opcode::I64Extend8S | Opcode::I64Extend16S | Opcode::I64Extend32S => {
                self.unop(loc, I64)
            }

            // References.
            Opcode::RefNull => {
                if let Immediate::RefType(rt) = instr.immediate {
                    self.push_ty(rt.into());
                }
            }
            Opcode::RefIsNull => {
                let val = self.pop_any(loc);
                if let Operand::Exact(ty) = val {
                    if !ty.is_ref() {
                        self.error(loc, format!("ref.is_null requires a reference type, got {ty}"));
                    }
                }
                self.push_ty(I32);
            }
            Opcode::RefFunc => {
                if (imm_index as usize) >= self.ctx.funcs.len() {
                    self.error(loc, format!("unknown function {imm_index}"));
                } else if !self.ctx.declared_funcs.contains(&imm_index) {
                    self.error(
                        loc,
                        format!("ref.func references undeclared function {imm_index}"),
                    );
                }
                self.push_ty(FuncRef);
            }

            // SIMD memory.
            Opcode::V128Load => self.load(instr, V128, 4),
            Opcode::V128Store => self.store(instr, V128, 4),
            Opcode::I16X8Load8X8S
            | Opcode::I16X8Load8X8U
            | Opcode::I32X4Load16X4S
            | Opcode::I32X4Load16X4U
            | Opcode::I64X2Load32X2S
            | Opcode::I64X2Load32X2U => self.load(instr, V128, 3),
            Opcode::V8X16LoadSplat => self.load(instr, V128, 0),
            Opcode::V16X8LoadSplat => self.load(instr, V128, 1),
            Opcode::V32X4LoadSplat => self.load(instr, V128, 2),
            Opcode::V64X2LoadSplat => self.load(instr, V128, 3),

            // SIMD lane access.
            Opcode::V8X16Shuffle => self.binop(loc, V128),
            Opcode::V8X16Swizzle => self.binop(loc, V128),
            Opcode::I8X16Splat | Opcode::I16X8Splat | Opcode::I32X4Splat => self.splat(loc, I32),
            Opcode::I64X2Splat => self.splat(loc, I64),
            Opcode::F32X4Splat => self.splat(loc, F32),
            Opcode::F64X2Splat => self.splat(loc, F64),
            Opcode::I8X16ExtractLaneS | Opcode::I8X16ExtractLaneU => {
                self.extract_lane(instr, 16, I32)
            }
            Opcode::I16X8ExtractLaneS | Opcode::I16X8ExtractLaneU => {
                self.extract_lane(instr, 8, I32)
            }
            Opcode::I32X4ExtractLane => self.extract_lane(instr, 4, I32),
            Opcode::I64X2ExtractLane => self.extract_lane(instr, 2, I64),
            Opcode::F32X4ExtractLane => self.extract_lane(instr, 4, F32),
            Opcode::F64X2ExtractLane => self.extract_lane(instr, 2, F64),
            Opcode::I8X16ReplaceLane => self.replace_lane(instr, 16, I32),
            Opcode::I16X8ReplaceLane => self.replace_lane(instr, 8, I32),
            Opcode::I32X4ReplaceLane => self.replace_lane(instr, 4, I32),
            Opcode::I64X2ReplaceLane => self.replace_lane(instr, 2, I64),
            Opcode::F32X4ReplaceLane => self.replace_lane(instr, 4, F32),
            Opcode::F64X2ReplaceLane => self.replace_lane(instr, 2, F64),

            // SIMD comparisons and binary arithmetic.
            Opcode::I8X16Eq
            | Opcode::I8X16Ne
            | Opcode::I8X16LtS
            | Opcode::I8X16LtU
            | Opcode::I8X16GtS
            | Opcode::I8X16GtU
            | Opcode::I8X16LeS
            | Opcode::I8X16LeU
            | Opcode::I8X16GeS
            | Opcode::I8X16GeU
            | Opcode::I16X8Eq
            | Opcode::I16X8Ne
            | Opcode::I16X8LtS
            | Opcode::I16X8LtU
            | Opcode::I16X8GtS
            | Opcode::I16X8GtU
            | Opcode::I16X8LeS
            | Opcode::I16X8LeU
            | Opcode::I16X8GeS
            | Opcode::I16X8GeU
            | Opcode::I32X4Eq
            | Opcode::I32X4Ne
            | Opcode::I32X4LtS
            | Opcode::I32X4LtU
            | Opcode::I32X4GtS
            | Opcode::I32X4GtU
            | Opcode::I32X4LeS
            | Opcode::I32X4LeU
            | Opcode::I32X4GeS
            | Opcode::I32X4GeU
            | Opcode::F32X4Eq
            | Opcode::F32X4Ne
            | Opcode::F32X4Lt
            | Opcode::F32X4Gt
            | Opcode::F32X4Le
            | Opcode::F32X4Ge
            | Opcode::F64X2Eq
            | Opcode::F64X2Ne
            | Opcode::F64X2Lt
            | Opcode::F64X2Gt
            | Opcode::F64X2Le
            | Opcode::F64X2Ge
            | Opcode::V128And
            | Opcode::V128Andnot
            | Opcode::V128Or
            | Opcode::V128Xor
            | Opcode::I8X16Add
            | Opcode::I8X16AddSaturateS
            | Opcode::I8X16AddSaturateU
            | Opcode::I8X16Sub
            | Opcode::I8X16SubSaturateS
            | Opcode::I8X16SubSaturateU
            | Opcode::I8X16MinS
            | Opcode::I8X16MinU
            | Opcode::I8X16MaxS
            | Opcode::I8X16MaxU
            | Opcode::I8X16AvgrU
            | Opcode::I8X16NarrowI16X8S
            | Opcode::I8X16NarrowI16X8U
            | Opcode::I16X8Add
            | Opcode::I16X8AddSaturateS
            | Opcode::I16X8AddSaturateU
            | Opcode::I16X8Sub
            | Opcode::I16X8SubSaturateS
            | Opcode::I16X8SubSaturateU
            | Opcode::I16X8Mul
            | Opcode::I16X8MinS
            | Opcode::I16X8MinU
            | Opcode::I16X8MaxS
            | Opcode::I16X8MaxU
            | Opcode::I16X8AvgrU
            | Opcode::I16X8NarrowI32X4S
            | Opcode::I16X8NarrowI32X4U
            | Opcode::I32X4Add
            | Opcode::I32X4Sub
            | Opcode::I32X4Mul
            | Opcode::I32X4MinS
            | Opcode::I32X4MinU
            | Opcode::I32X4MaxS
            | Opcode::I32X4MaxU
            | Opcode::I64X2Add
            | Opcode::I64X2Sub
            | Opcode::I64X2Mul
            | Opcode::F32X4Add
            | Opcode::F32X4Sub
            | Opcode::F32X4Mul
            | Opcode::F32X4Div
            | Opcode::F32X4Min
            | Opcode::F32X4Max
            | Opcode::F64X2Add
            | Opcode::F64X2Sub
            | Opcode::F64X2Mul
            | Opcode::F64X2Div
            | Opcode::F64X2Min
            | Opcode::F64X2Max => self.binop(loc, V128),

            // SIMD unary.
            Opcode::V128Not
            | Opcode::I8X16Neg
            | Opcode::I16X8Neg
            | Opcode::I32X4Neg
            | Opcode::I64X2Neg
            | Opcode::I16X8WidenLowI8X16S
            | Opcode::I16X8WidenHighI8X16S
            | Opcode::I16X8WidenLowI8X16U
            | Opcode::I16X8WidenHighI8X16U
            | Opcode::I32X4WidenLowI16X8S
            | Opcode::I32X4WidenHighI16X8S
            | Opcode::I32X4WidenLowI16X8U
            | Opcode::I32X4WidenHighI16X8U
            | Opcode::F32X4Abs
            | Opcode::F32X4Neg
            | Opcode::F32X4Sqrt
            | Opcode::F64X2Abs
            | Opcode::F64X2Neg
            | Opcode::F64X2Sqrt
            | Opcode::I32X4TruncSatF32X4S
            | Opcode::I32X4TruncSatF32X4U
            | Opcode::F32X4ConvertI32X4S
            | Opcode::F32X4ConvertI32X4U => self.unop(loc, V128),

            Opcode::I8X16AnyTrue
            | Opcode::I8X16AllTrue
            | Opcode::I16X8AnyTrue
            | Opcode::I16X8AllTrue
            | Opcode::I32X4AnyTrue
            | Opcode::I32X4AllTrue => self.simd_bool(loc),

            Opcode::I8X16Shl
            | Opcode::I8X16ShrS
            | Opcode::I8X16ShrU
            | Opcode::I16X8Shl
            | Opcode::I16X8ShrS
            | Opcode::I16X8ShrU
            | Opcode::I32X4Shl
            | Opcode::I32X4ShrS
            | Opcode::I32X4ShrU
            | Opcode::I64X2Shl
            | Opcode::I64X2ShrS
            | Opcode::I64X2ShrU => self.simd_shift(loc),

            Opcode::V128Bitselect => {
                self.pop_expect(loc, V128);
                self.pop_expect(loc, V128);
                self.pop_expect(loc, V128);
                self.push_ty(V128);
            }

            // Atomics.
            Opcode::AtomicNotify => {
                self.check_atomic_memory(instr, 2);
                self.pop_expect(loc, I32);
                self.pop_expect(loc, I32);
                self.push_ty(I32);
            }
            Opcode::I32AtomicWait => {
                self.check_atomic_memory(instr, 2);
                self.pop_expect(loc, I64);
                self.pop_expect(loc, I32);
                self.pop_expect(loc, I32);
                self.push_ty(I32);
            }
            Opcode::I64AtomicWait => {
                self.check_atomic_memory(instr, 3);
                self.pop_expect(loc, I64);
                self.pop_expect(loc, I64);
                self.pop_expect(loc, I32);
                self.push_ty(I32);
            }
            Opcode::I32AtomicLoad => self.atomic_load(instr, I32, 2),
            Opcode::I64AtomicLoad => self.atomic_load(instr, I64, 3),
            Opcode::I32AtomicLoad8U => self.atomic_load(instr, I32, 0),
            Opcode::I32AtomicLoad16U => self.atomic_load(instr, I32, 1),
            Opcode::I64AtomicLoad8U => self.atomic_load(instr, I64, 0),
            Opcode::I64AtomicLoad16U => self.atomic_load(instr, I64, 1),
            Opcode::I64AtomicLoad32U => self.atomic_load(instr, I64, 2),
            Opcode::I32AtomicStore => self.atomic_store(instr, I32, 2),
            Opcode::I64AtomicStore => self.atomic_store(instr, I64, 3),
            Opcode::I32AtomicStore8 => self.atomic_store(instr, I32, 0),
            Opcode::I32AtomicStore16 => self.atomic_store(instr, I32, 1),
            Opcode::I64AtomicStore8 => self.atomic_store(instr, I64, 0),
            Opcode::I64AtomicStore16 => self.atomic_store(instr, I64, 1),
            Opcode::I64AtomicStore32 => self.atomic_store(instr, I64, 2),
            Opcode::I32AtomicRmwAdd
            | Opcode::I32AtomicRmwSub
            | Opcode::I32AtomicRmwAnd
            | Opcode::I32AtomicRmwOr
            | Opcode::I32AtomicRmwXor
            | Opcode::I32AtomicRmwXchg => self.atomic_rmw(instr, I32, 2),
            Opcode::I64AtomicRmwAdd
            | Opcode::I64AtomicRmwSub
            | Opcode::I64AtomicRmwAnd
            | Opcode::I64AtomicRmwOr
            | Opcode::I64AtomicRmwXor
            | Opcode::I64AtomicRmwXchg => self.atomic_rmw(instr, I64, 3),
            Opcode::I32AtomicRmw8AddU
            | Opcode::I32AtomicRmw8SubU
            | Opcode::I32AtomicRmw8AndU
            | Opcode::I32AtomicRmw8OrU
            | Opcode::I32AtomicRmw8XorU
            | Opcode::I32AtomicRmw8XchgU => self.atomic_rmw(instr, I32, 0),
            Opcode::I32AtomicRmw16AddU
            | Opcode::I32AtomicRmw16SubU
            | Opcode::I32AtomicRmw16AndU
            | Opcode::I32AtomicRmw16OrU
            | Opcode::I32AtomicRmw16XorU
            | Opcode::I32AtomicRmw16XchgU => self.atomic_rmw(instr, I32, 1),
            Opcode::I64AtomicRmw8AddU
            | Opcode::I64AtomicRmw8SubU
            | Opcode::I64AtomicRmw8AndU
            | Opcode::I64AtomicRmw8OrU
            | Opcode::I64AtomicRmw8XorU
            | Opcode::I64AtomicRmw8XchgU => self.atomic_rmw(instr, I64, 0),
            Opcode::I64AtomicRmw16AddU
            | Opcode::I64AtomicRmw16SubU
            | Opcode::I64AtomicRmw16AndU
            | Opcode::I64AtomicRmw16OrU
            | Opcode::I64AtomicRmw16XorU
            | Opcode::I64AtomicRmw16XchgU => self.atomic_rmw(instr, I64, 1),
            Opcode::I64AtomicRmw32AddU
            | Opcode::I64AtomicRmw32SubU
            | Opcode::I64AtomicRmw32AndU
            | Opcode::I64AtomicRmw32OrU
            | Opcode::I64AtomicRmw32XorU
            | Opcode::I64AtomicRmw32XchgU => self.atomic_rmw(instr, I64, 2),
            Opcode::I32AtomicRmwCmpxchg => self.atomic_cmpxchg(instr, I32, 2),
            Opcode::I64AtomicRmwCmpxchg => self.atomic_cmpxchg(instr, I64, 3),
            Opcode::I32AtomicRmw8CmpxchgU => self.atomic_cmpxchg(instr, I32, 0),
            Opcode::I32AtomicRmw16CmpxchgU => self.atomic_cmpxchg(instr, I32, 1),
            Opcode::I64AtomicRmw8CmpxchgU => self.atomic_cmpxchg(instr, I64, 0),
            Opcode::I64AtomicRmw16CmpxchgU => self.atomic_cmpxchg(instr, I64, 1),
            Opcode::I64AtomicRmw32CmpxchgU => self.atomic_cmpxchg(instr, I64, 2),
        }
    }
}
