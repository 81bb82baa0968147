use tracing::trace;

use crate::{
    binary::{
        sections::{read_reftype, read_valtype},
        BinaryReader,
    },
    instr::{is_prefix_byte, BlockType, BrTable, ImmKind, Immediate, Instruction, Opcode},
    module::Expr,
    ConstExpr, ErrorSink, Features, Location,
};

/// Decodes one instruction per step.
///
/// Block nesting is tracked so the reader recognises the unmatched `end` that
/// closes a function body or constant expression; after that final `end` the
/// iterator yields nothing further.
pub struct InstrReader<'a> {
    reader: BinaryReader<'a>,
    features: Features,
    nesting: u32,
    seen_final_end: bool,
    failed: bool,
}

impl<'a> InstrReader<'a> {
    /// A reader over a function body.
    pub fn new(body: Expr<'a>, features: Features, errors: &'a dyn ErrorSink) -> Self {
        Self::new_at(body.data, body.offset, features, errors)
    }

    pub fn new_at(
        data: &'a [u8],
        offset: usize,
        features: Features,
        errors: &'a dyn ErrorSink,
    ) -> Self {
        Self {
            reader: BinaryReader::new_at(data, offset, errors),
            features,
            nesting: 0,
            seen_final_end: false,
            failed: false,
        }
    }

    /// Whether the final unmatched `end` has been read.
    pub fn seen_final_end(&self) -> bool {
        self.seen_final_end
    }

    /// Bytes left after the point the reader stopped.
    pub fn leftover(&self) -> usize {
        self.reader.remaining()
    }

    pub fn pos(&self) -> usize {
        self.reader.pos()
    }

    /// Read one instruction, or `None` after the final `end`, at the end of
    /// input, or after an error.
    pub fn read(&mut self) -> Option<Instruction> {
        if self.seen_final_end || self.failed {
            return None;
        }
        if self.reader.is_empty() {
            self.failed = true;
            self.reader.errors().on_error(
                Location::new(self.reader.pos(), 0),
                "instruction stream ended without `end`".to_string(),
            );
            return None;
        }
        let start = self.reader.pos();
        let guard = self.reader.push_context("instruction");
        let result = self
            .read_opcode()
            .and_then(|opcode| Some((opcode, self.read_immediate(opcode)?)));
        drop(guard);
        let Some((opcode, immediate)) = result else {
            self.failed = true;
            return None;
        };

        match opcode {
            Opcode::Block | Opcode::Loop | Opcode::If | Opcode::Try => self.nesting += 1,
            Opcode::End => {
                if self.nesting == 0 {
                    self.seen_final_end = true;
                } else {
                    self.nesting -= 1;
                }
            }
            _ => {}
        }

        let instr = Instruction {
            loc: self.reader.loc_from(start),
            opcode,
            immediate,
        };
        trace!(%instr, "read instruction");
        Some(instr)
    }

    fn read_opcode(&mut self) -> Option<Opcode> {
        let start = self.reader.pos();
        let byte = self.reader.read_u8()?;
        let opcode = if is_prefix_byte(byte) {
            let sub = self.reader.read_var_u32()?;
            let Some(opcode) = Opcode::try_from_bytes(byte, sub) else {
                self.reader.errors().on_error(
                    self.reader.loc_from(start),
                    format!("unknown subopcode {sub:#x} after prefix {byte:#04x}"),
                );
                return None;
            };
            opcode
        } else {
            let Some(opcode) = Opcode::try_from_byte(byte) else {
                self.reader.errors().on_error(
                    self.reader.loc_from(start),
                    format!("unknown opcode {byte:#04x}"),
                );
                return None;
            };
            opcode
        };
        if !self.features.contains(opcode.features()) {
            self.reader.errors().on_error(
                self.reader.loc_from(start),
                format!("opcode {opcode} is not enabled"),
            );
            return None;
        }
        Some(opcode)
    }

    fn read_immediate(&mut self, opcode: Opcode) -> Option<Immediate> {
        let reader = &mut self.reader;
        Some(match opcode.immediate_kind() {
            ImmKind::Empty => Immediate::None,
            ImmKind::Block => Immediate::Block(self.read_block_type()?),
            ImmKind::Index => Immediate::Index(reader.read_var_u32()?),
            ImmKind::CallIndirect => {
                let type_idx = reader.read_var_u32()?;
                let start = reader.pos();
                let table_idx = reader.read_var_u32()?;
                if table_idx != 0 && !self.features.contains(Features::REFERENCE_TYPES) {
                    reader.errors().on_error(
                        reader.loc_from(start),
                        "call_indirect table index must be 0".to_string(),
                    );
                    return None;
                }
                Immediate::CallIndirect {
                    type_idx,
                    table_idx,
                }
            }
            ImmKind::BrTable => {
                let targets = reader.read_vec(|r| r.read_var_u32())?;
                let default = reader.read_var_u32()?;
                Immediate::BrTable(BrTable { targets, default })
            }
            ImmKind::BrOnExn => {
                let label = reader.read_var_u32()?;
                let event = reader.read_var_u32()?;
                Immediate::BrOnExn { label, event }
            }
            ImmKind::U8 => {
                let start = reader.pos();
                let byte = reader.read_u8()?;
                let reserved = matches!(
                    opcode,
                    Opcode::MemorySize | Opcode::MemoryGrow | Opcode::MemoryFill
                );
                if reserved && byte != 0 {
                    reader.errors().on_error(
                        reader.loc_from(start),
                        format!("reserved byte must be zero, got {byte:#04x}"),
                    );
                    return None;
                }
                Immediate::U8(byte)
            }
            ImmKind::MemArg => {
                let align_log2 = reader.read_var_u32()?;
                let offset = reader.read_var_u32()?;
                Immediate::MemArg(crate::MemArg { align_log2, offset })
            }
            ImmKind::S32 => Immediate::I32(reader.read_var_s32()?),
            ImmKind::S64 => Immediate::I64(reader.read_var_s64()?),
            ImmKind::F32 => Immediate::F32(reader.read_f32()?),
            ImmKind::F64 => Immediate::F64(reader.read_f64()?),
            ImmKind::V128 => Immediate::V128(reader.read_v128()?),
            ImmKind::Init => {
                let segment = reader.read_var_u32()?;
                let start = reader.pos();
                let dst = reader.read_var_u32()?;
                if opcode == Opcode::MemoryInit && dst != 0 {
                    reader.errors().on_error(
                        reader.loc_from(start),
                        "memory.init memory index must be 0".to_string(),
                    );
                    return None;
                }
                Immediate::Init { segment, dst }
            }
            ImmKind::Copy => {
                let start = reader.pos();
                let dst = reader.read_var_u32()?;
                let src = reader.read_var_u32()?;
                if opcode == Opcode::MemoryCopy && (src != 0 || dst != 0) {
                    reader.errors().on_error(
                        reader.loc_from(start),
                        "memory.copy memory indices must be 0".to_string(),
                    );
                    return None;
                }
                Immediate::Copy { src, dst }
            }
            ImmKind::Shuffle => {
                let start = reader.pos();
                let bytes = reader.read_bytes(16)?;
                let lanes: [u8; 16] = bytes.try_into().unwrap();
                if let Some(lane) = lanes.iter().find(|lane| **lane >= 32) {
                    reader.errors().on_error(
                        reader.loc_from(start),
                        format!("shuffle lane {lane} out of range, must be below 32"),
                    );
                    return None;
                }
                Immediate::Shuffle(lanes)
            }
            ImmKind::ValTypes => {
                let features = self.features;
                Immediate::ValTypes(reader.read_vec(|r| read_valtype(r, features))?)
            }
            ImmKind::RefType => Immediate::RefType(read_reftype(reader, self.features)?),
        })
    }

    fn read_block_type(&mut self) -> Option<BlockType> {
        let start = self.reader.pos();
        match self.reader.peek_u8() {
            Some(0x40) => {
                self.reader.advance(1);
                Some(BlockType::Empty)
            }
            Some(byte) if crate::ValType::try_from(byte).is_ok() => {
                Some(BlockType::Type(read_valtype(&mut self.reader, self.features)?))
            }
            Some(_) => {
                let idx = self.reader.read_var_s33()?;
                if !(0..=u32::MAX as i64).contains(&idx) {
                    self.reader.errors().on_error(
                        self.reader.loc_from(start),
                        format!("invalid block type {idx}"),
                    );
                    return None;
                }
                if !self.features.contains(Features::MULTI_VALUE) {
                    self.reader.errors().on_error(
                        self.reader.loc_from(start),
                        "block type indices require the multi-value feature".to_string(),
                    );
                    return None;
                }
                Some(BlockType::TypeIndex(idx as u32))
            }
            None => {
                self.reader.errors().on_error(
                    Location::new(self.reader.pos(), 0),
                    "unexpected end of input in block type".to_string(),
                );
                None
            }
        }
    }
}

impl<'a> Iterator for InstrReader<'a> {
    type Item = Instruction;

    fn next(&mut self) -> Option<Instruction> {
        self.read()
    }
}

/// Read a constant expression: exactly one value-producing instruction
/// followed by `end`. Which opcodes are constant is the validator's concern;
/// here only the shape is enforced.
pub fn read_const_expr<'a>(
    reader: &mut BinaryReader<'a>,
    features: Features,
) -> Option<ConstExpr> {
    let start = reader.pos();
    let guard = reader.push_context("constant expression");
    let mut instrs = InstrReader::new_at(reader.rest(), start, features, reader.errors());
    let mut decoded = vec![];
    for instr in instrs.by_ref() {
        decoded.push(instr);
    }
    let consumed = instrs.pos() - start;
    reader.advance(consumed);
    drop(guard);

    if !instrs.seen_final_end() {
        return None;
    }
    let loc = reader.loc_from(start);
    if decoded.len() != 2 {
        reader.errors().on_error(
            loc,
            "constant expression must be a single instruction followed by `end`".to_string(),
        );
        return None;
    }
    debug_assert_eq!(decoded[1].opcode, Opcode::End);
    Some(ConstExpr {
        loc,
        instr: decoded.swap_remove(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Errors;

    fn read_all(data: &[u8], features: Features) -> (Vec<Instruction>, Errors, bool) {
        let errors = Errors::new();
        let mut reader = InstrReader::new_at(data, 0, features, &errors);
        let instrs: Vec<_> = reader.by_ref().collect();
        let clean = reader.seen_final_end();
        (instrs, errors, clean)
    }

    #[test]
    fn reads_a_simple_body() {
        let errors = Errors::new();
        // i32.const 1, i32.const 2, i32.add, end
        let data = [0x41, 0x01, 0x41, 0x02, 0x6a, 0x0b];
        let mut reader = InstrReader::new_at(&data, 0, Features::mvp(), &errors);
        let instrs: Vec<_> = reader.by_ref().collect();
        assert!(reader.seen_final_end());
        assert_eq!(reader.leftover(), 0);
        assert!(errors.is_empty());
        assert_eq!(instrs.len(), 4);
        assert_eq!(instrs[0].opcode, Opcode::I32Const);
        assert_eq!(instrs[0].immediate, Immediate::I32(1));
        assert_eq!(instrs[0].loc, Location::new(0, 2));
        assert_eq!(instrs[2].opcode, Opcode::I32Add);
        assert_eq!(instrs[3].opcode, Opcode::End);
    }

    #[test]
    fn nested_blocks_delay_the_final_end() {
        let errors = Errors::new();
        // block (empty) end end i32.const 0 (unreachable trailing bytes)
        let data = [0x02, 0x40, 0x0b, 0x0b, 0x41, 0x00];
        let mut reader = InstrReader::new_at(&data, 0, Features::mvp(), &errors);
        let instrs: Vec<_> = reader.by_ref().collect();
        assert_eq!(instrs.len(), 3);
        assert!(reader.seen_final_end());
        assert_eq!(reader.leftover(), 2);
        assert!(errors.is_empty());
    }

    #[test]
    fn unknown_opcode_terminates_the_stream() {
        let (instrs, errors, _) = read_all(&[0x01, 0x27, 0x0b], Features::mvp());
        assert_eq!(instrs.len(), 1);
        let errors = errors.into_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "unknown opcode 0x27");
        assert_eq!(errors[0].context, vec![(Location::new(1, 0), "instruction")]);
    }

    #[test]
    fn feature_gated_opcode_is_rejected() {
        // memory.copy 0 0
        let data = [0xfc, 0x0a, 0x00, 0x00, 0x0b];
        let (instrs, errors, _) = read_all(&data, Features::mvp());
        assert!(instrs.is_empty());
        assert_eq!(
            errors.into_errors()[0].message,
            "opcode memory.copy is not enabled"
        );

        let (instrs, errors, _) = read_all(&data, Features::BULK_MEMORY);
        assert_eq!(instrs.len(), 2);
        assert_eq!(instrs[0].immediate, Immediate::Copy { src: 0, dst: 0 });
        assert!(errors.is_empty());
    }

    #[test]
    fn missing_end_is_an_error() {
        let (instrs, errors, clean) = read_all(&[0x41, 0x00], Features::mvp());
        assert_eq!(instrs.len(), 1);
        assert!(!clean);
        assert_eq!(
            errors.into_errors()[0].message,
            "instruction stream ended without `end`"
        );
    }

    #[test]
    fn const_expr_must_be_single_instruction() {
        let errors = Errors::new();
        // i32.const 1, i32.const 2, end
        let data = [0x41, 0x01, 0x41, 0x02, 0x0b];
        let mut reader = BinaryReader::new(&data, &errors);
        assert!(read_const_expr(&mut reader, Features::mvp()).is_none());
        assert_eq!(
            errors.into_errors()[0].message,
            "constant expression must be a single instruction followed by `end`"
        );
    }

    #[test]
    fn const_expr_stops_at_end() {
        let errors = Errors::new();
        // i32.const 42, end, then unrelated trailing bytes
        let data = [0x41, 0x2a, 0x0b, 0x6a];
        let mut reader = BinaryReader::new(&data, &errors);
        let expr = read_const_expr(&mut reader, Features::mvp()).unwrap();
        assert_eq!(expr.instr.opcode, Opcode::I32Const);
        assert_eq!(expr.instr.immediate, Immediate::I32(42));
        assert_eq!(expr.loc, Location::new(0, 3));
        assert_eq!(reader.pos(), 3);
        assert!(errors.is_empty());
    }
}
