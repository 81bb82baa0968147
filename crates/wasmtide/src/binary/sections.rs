use std::{fmt, marker::PhantomData};

use num_enum::TryFromPrimitive;
use tracing::debug;

use crate::{
    binary::{instr_reader::read_const_expr, BinaryReader, MAGIC, VERSION},
    module::*,
    ErrorSink, Features, Location,
};

/// The id byte of a known section. The `u8` value is the wire encoding; the
/// canonical ordering is [`SectionId::ord`], which is not the same (the data
/// count section precedes the code section).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u8)]
pub enum SectionId {
    Custom = 0,
    Type = 1,
    Import = 2,
    Function = 3,
    Table = 4,
    Memory = 5,
    Global = 6,
    Export = 7,
    Start = 8,
    Element = 9,
    Code = 10,
    Data = 11,
    DataCount = 12,
    Event = 13,
}

impl SectionId {
    /// Position in the canonical section ordering.
    pub fn ord(&self) -> u8 {
        match self {
            SectionId::Custom => 0,
            SectionId::Type => 1,
            SectionId::Import => 2,
            SectionId::Function => 3,
            SectionId::Table => 4,
            SectionId::Memory => 5,
            SectionId::Event => 6,
            SectionId::Global => 7,
            SectionId::Export => 8,
            SectionId::Start => 9,
            SectionId::Element => 10,
            SectionId::DataCount => 11,
            SectionId::Code => 12,
            SectionId::Data => 13,
        }
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SectionId::Custom => "custom",
            SectionId::Type => "type",
            SectionId::Import => "import",
            SectionId::Function => "function",
            SectionId::Table => "table",
            SectionId::Memory => "memory",
            SectionId::Global => "global",
            SectionId::Export => "export",
            SectionId::Start => "start",
            SectionId::Element => "element",
            SectionId::Code => "code",
            SectionId::Data => "data",
            SectionId::DataCount => "data count",
            SectionId::Event => "event",
        })
    }
}

/// A lazily decoded module: the header is checked eagerly, everything else is
/// decoded as the section and entry iterators are advanced.
///
/// Header mismatches are reported but not fatal; framing continues on the
/// assumption that the rest of the image is a module.
pub struct LazyModule<'a> {
    data: &'a [u8],
    features: Features,
    errors: &'a dyn ErrorSink,
}

impl<'a> LazyModule<'a> {
    pub fn new(data: &'a [u8], features: Features, errors: &'a dyn ErrorSink) -> Self {
        if data.len() < 8 {
            errors.on_error(
                Location::new(0, data.len()),
                "module shorter than the 8-byte header".to_string(),
            );
        } else {
            if data[0..4] != MAGIC {
                errors.on_error(
                    Location::new(0, 4),
                    format!("magic mismatch: expected {MAGIC:02x?}, got {:02x?}", &data[0..4]),
                );
            }
            if data[4..8] != VERSION {
                errors.on_error(
                    Location::new(4, 4),
                    format!(
                        "version mismatch: expected {VERSION:02x?}, got {:02x?}",
                        &data[4..8]
                    ),
                );
            }
        }
        debug!(len = data.len(), "framing module");
        Self {
            data,
            features,
            errors,
        }
    }

    pub fn features(&self) -> Features {
        self.features
    }

    /// Iterate the module's sections in the order they appear.
    pub fn sections(&self) -> SectionsIter<'a> {
        let body = self.data.get(8..).unwrap_or(&[]);
        SectionsIter {
            reader: BinaryReader::new_at(body, 8, self.errors),
            features: self.features,
            errors: self.errors,
            failed: false,
        }
    }
}

/// One section of a module.
pub enum Section<'a> {
    Custom(CustomSection<'a>),
    Known(KnownSection<'a>),
}

/// A known section: its id and its undecoded body. [`KnownSection::content`]
/// wraps the body in the kind-specific lazy reader.
pub struct KnownSection<'a> {
    pub id: SectionId,
    pub loc: Location,
    body: &'a [u8],
    body_offset: usize,
    features: Features,
    errors: &'a dyn ErrorSink,
}

/// Forward iterator over a module's sections.
pub struct SectionsIter<'a> {
    reader: BinaryReader<'a>,
    features: Features,
    errors: &'a dyn ErrorSink,
    failed: bool,
}

impl<'a> Iterator for SectionsIter<'a> {
    type Item = Section<'a>;

    fn next(&mut self) -> Option<Section<'a>> {
        loop {
            if self.failed || self.reader.is_empty() {
                return None;
            }
            let start = self.reader.pos();
            let Some((id_byte, size)) = (|| {
                let id = self.reader.read_u8()?;
                let size = self.reader.read_var_u32()?;
                Some((id, size))
            })() else {
                self.failed = true;
                return None;
            };
            let body_offset = self.reader.pos();
            let Some(body) = self.reader.read_bytes(size as usize) else {
                self.errors.on_error(
                    Location::span(start, self.reader.pos()),
                    format!("section of size {size} overruns the module"),
                );
                self.failed = true;
                return None;
            };
            let loc = self.reader.loc_from(start);
            let Ok(id) = SectionId::try_from(id_byte) else {
                self.errors
                    .on_error(loc, format!("unknown section id {id_byte}"));
                // The frame is intact, so skip the body and resync.
                continue;
            };
            debug!(%id, size, "framed section");
            if id == SectionId::Custom {
                let mut body_reader = BinaryReader::new_at(body, body_offset, self.errors);
                let Some(name) = body_reader.read_str() else {
                    continue;
                };
                let payload_offset = body_reader.pos();
                return Some(Section::Custom(CustomSection {
                    loc,
                    name,
                    payload: &body[payload_offset - body_offset..],
                    payload_offset,
                }));
            }
            return Some(Section::Known(KnownSection {
                id,
                loc,
                body,
                body_offset,
                features: self.features,
                errors: self.errors,
            }));
        }
    }
}

/// The typed contents of a [`KnownSection`].
pub enum SectionContent<'a> {
    Types(LazySection<'a, DefinedType>),
    Imports(LazySection<'a, Import<'a>>),
    Functions(LazySection<'a, Function>),
    Tables(LazySection<'a, TableType>),
    Memories(LazySection<'a, MemoryType>),
    Globals(LazySection<'a, Global>),
    Exports(LazySection<'a, Export<'a>>),
    Start(Option<Start>),
    Elements(LazySection<'a, ElementSegment>),
    Code(LazySection<'a, Code<'a>>),
    Data(LazySection<'a, DataSegment<'a>>),
    DataCount(Option<DataCount>),
    Events(LazySection<'a, EventType>),
}

impl<'a> KnownSection<'a> {
    fn reader(&self) -> BinaryReader<'a> {
        BinaryReader::new_at(self.body, self.body_offset, self.errors)
    }

    pub fn content(&self) -> SectionContent<'a> {
        match self.id {
            SectionId::Custom => unreachable!("custom sections are framed separately"),
            SectionId::Type => SectionContent::Types(LazySection::new(self.reader(), self.features)),
            SectionId::Import => {
                SectionContent::Imports(LazySection::new(self.reader(), self.features))
            }
            SectionId::Function => {
                SectionContent::Functions(LazySection::new(self.reader(), self.features))
            }
            SectionId::Table => {
                SectionContent::Tables(LazySection::new(self.reader(), self.features))
            }
            SectionId::Memory => {
                SectionContent::Memories(LazySection::new(self.reader(), self.features))
            }
            SectionId::Global => {
                SectionContent::Globals(LazySection::new(self.reader(), self.features))
            }
            SectionId::Export => {
                SectionContent::Exports(LazySection::new(self.reader(), self.features))
            }
            SectionId::Start => {
                let mut reader = self.reader();
                let start = self.body_offset;
                let content = reader
                    .read_var_u32()
                    .map(|func_idx| Start {
                        loc: reader.loc_from(start),
                        func_idx,
                    });
                SectionContent::Start(content)
            }
            SectionId::Element => {
                SectionContent::Elements(LazySection::new(self.reader(), self.features))
            }
            SectionId::Code => SectionContent::Code(LazySection::new(self.reader(), self.features)),
            SectionId::Data => SectionContent::Data(LazySection::new(self.reader(), self.features)),
            SectionId::DataCount => {
                let mut reader = self.reader();
                let start = self.body_offset;
                let content = reader.read_var_u32().map(|count| DataCount {
                    loc: reader.loc_from(start),
                    count,
                });
                SectionContent::DataCount(content)
            }
            SectionId::Event => {
                SectionContent::Events(LazySection::new(self.reader(), self.features))
            }
        }
    }
}

impl<'a> CustomSection<'a> {
    /// For a section named `name`, iterate its subsections.
    pub fn name_subsections(
        &self,
        errors: &'a dyn ErrorSink,
    ) -> Option<NameSubsectionsIter<'a>> {
        (self.name == "name").then(|| NameSubsectionsIter {
            reader: BinaryReader::new_at(self.payload, self.payload_offset, errors),
            failed: false,
        })
    }
}

/// Iterator over the subsections of a "name" custom section.
pub struct NameSubsectionsIter<'a> {
    reader: BinaryReader<'a>,
    failed: bool,
}

impl<'a> Iterator for NameSubsectionsIter<'a> {
    type Item = NameSubsection<'a>;

    fn next(&mut self) -> Option<NameSubsection<'a>> {
        if self.failed || self.reader.is_empty() {
            return None;
        }
        let start = self.reader.pos();
        let result = (|| {
            let id = self.reader.read_u8()?;
            let size = self.reader.read_var_u32()?;
            let payload = self.reader.read_bytes(size as usize)?;
            Some(NameSubsection {
                loc: self.reader.loc_from(start),
                id,
                payload,
            })
        })();
        if result.is_none() {
            self.failed = true;
        }
        result
    }
}

/// Decoding of one section entry. The blanket [`LazySection`] iterator turns
/// any implementation into a lazy, forward-only entry stream.
pub trait ReadBinary<'a>: Sized {
    const DESC: &'static str;

    fn read(reader: &mut BinaryReader<'a>, features: Features) -> Option<Self>;
}

/// A lazy section: a count followed by entries decoded on demand. The
/// iterator owns only its cursor into the section body; the body borrows the
/// module image.
pub struct LazySection<'a, T> {
    reader: BinaryReader<'a>,
    features: Features,
    remaining: u32,
    failed: bool,
    _marker: PhantomData<T>,
}

impl<'a, T: ReadBinary<'a>> LazySection<'a, T> {
    fn new(mut reader: BinaryReader<'a>, features: Features) -> Self {
        let count = reader.read_count();
        Self {
            reader,
            features,
            remaining: count.unwrap_or(0),
            failed: count.is_none(),
            _marker: PhantomData,
        }
    }

    /// The declared entry count, counting down as the iterator advances.
    pub fn count(&self) -> u32 {
        self.remaining
    }
}

impl<'a, T: ReadBinary<'a>> Iterator for LazySection<'a, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.failed || self.remaining == 0 {
            return None;
        }
        let guard = self.reader.push_context(T::DESC);
        let item = T::read(&mut self.reader, self.features);
        drop(guard);
        if item.is_none() {
            self.failed = true;
            return None;
        }
        self.remaining -= 1;
        if self.remaining == 0 && !self.reader.is_empty() {
            self.reader.errors().on_error(
                Location::new(self.reader.pos(), self.reader.remaining()),
                "extra bytes at the end of the section".to_string(),
            );
        }
        item
    }
}

pub(crate) fn read_valtype(reader: &mut BinaryReader<'_>, features: Features) -> Option<ValType> {
    let start = reader.pos();
    let byte = reader.read_u8()?;
    let Ok(ty) = ValType::try_from(byte) else {
        reader
            .errors()
            .on_error(reader.loc_from(start), format!("unknown value type {byte:#04x}"));
        return None;
    };
    let required = match ty {
        ValType::V128 => Features::SIMD,
        ValType::FuncRef | ValType::ExternRef | ValType::NullRef => Features::REFERENCE_TYPES,
        ValType::ExnRef => Features::EXCEPTIONS,
        _ => Features::empty(),
    };
    if !features.contains(required) {
        reader.errors().on_error(
            reader.loc_from(start),
            format!("value type {ty} is not enabled"),
        );
        return None;
    }
    Some(ty)
}

pub(crate) fn read_reftype(reader: &mut BinaryReader<'_>, features: Features) -> Option<RefType> {
    let start = reader.pos();
    let byte = reader.read_u8()?;
    let Ok(ty) = RefType::try_from(byte) else {
        reader.errors().on_error(
            reader.loc_from(start),
            format!("unknown reference type {byte:#04x}"),
        );
        return None;
    };
    let required = match ty {
        RefType::Func => Features::empty(),
        RefType::Extern | RefType::Null => Features::REFERENCE_TYPES,
        RefType::Exn => Features::EXCEPTIONS,
    };
    if !features.contains(required) {
        reader.errors().on_error(
            reader.loc_from(start),
            format!("reference type {ty} is not enabled"),
        );
        return None;
    }
    Some(ty)
}

fn read_limits(reader: &mut BinaryReader<'_>, features: Features) -> Option<Limits> {
    let start = reader.pos();
    let flags = reader.read_u8()?;
    if flags > 0b11 {
        reader
            .errors()
            .on_error(reader.loc_from(start), format!("invalid limits flags {flags:#04x}"));
        return None;
    }
    let shared = flags & 0b10 != 0;
    if shared && !features.contains(Features::THREADS) {
        reader.errors().on_error(
            reader.loc_from(start),
            "shared limits require the threads feature".to_string(),
        );
        return None;
    }
    let min = reader.read_var_u32()?;
    let max = if flags & 0b01 != 0 {
        Some(reader.read_var_u32()?)
    } else {
        None
    };
    Some(Limits {
        loc: reader.loc_from(start),
        min,
        max,
        shared,
    })
}

fn read_table_type(reader: &mut BinaryReader<'_>, features: Features) -> Option<TableType> {
    let start = reader.pos();
    let elem_type = read_reftype(reader, features)?;
    let limits = read_limits(reader, features)?;
    Some(TableType {
        loc: reader.loc_from(start),
        elem_type,
        limits,
    })
}

fn read_memory_type(reader: &mut BinaryReader<'_>, features: Features) -> Option<MemoryType> {
    let start = reader.pos();
    let limits = read_limits(reader, features)?;
    Some(MemoryType {
        loc: reader.loc_from(start),
        limits,
    })
}

fn read_global_type(reader: &mut BinaryReader<'_>, features: Features) -> Option<GlobalType> {
    let start = reader.pos();
    let content_type = read_valtype(reader, features)?;
    let mutable = match reader.read_u8()? {
        0 => false,
        1 => true,
        byte => {
            reader.errors().on_error(
                reader.loc_from(start),
                format!("global mutability must be 0 or 1, got {byte}"),
            );
            return None;
        }
    };
    Some(GlobalType {
        loc: reader.loc_from(start),
        content_type,
        mutable,
    })
}

fn read_event_type(reader: &mut BinaryReader<'_>, _features: Features) -> Option<EventType> {
    let start = reader.pos();
    let attribute = reader.read_var_u32()?;
    if attribute > u8::MAX as u32 {
        reader.errors().on_error(
            reader.loc_from(start),
            format!("invalid event attribute {attribute}"),
        );
        return None;
    }
    let type_idx = reader.read_var_u32()?;
    Some(EventType {
        loc: reader.loc_from(start),
        attribute: attribute as u8,
        type_idx,
    })
}

fn read_external_kind(
    reader: &mut BinaryReader<'_>,
    features: Features,
) -> Option<ExternalKind> {
    let start = reader.pos();
    let byte = reader.read_u8()?;
    let Ok(kind) = ExternalKind::try_from(byte) else {
        reader.errors().on_error(
            reader.loc_from(start),
            format!("unknown external kind {byte:#04x}"),
        );
        return None;
    };
    if kind == ExternalKind::Event && !features.contains(Features::EXCEPTIONS) {
        reader.errors().on_error(
            reader.loc_from(start),
            "event externals require the exceptions feature".to_string(),
        );
        return None;
    }
    Some(kind)
}

impl<'a> ReadBinary<'a> for DefinedType {
    const DESC: &'static str = "type";

    fn read(reader: &mut BinaryReader<'a>, features: Features) -> Option<Self> {
        let start = reader.pos();
        let form = reader.read_u8()?;
        if form != 0x60 {
            reader
                .errors()
                .on_error(reader.loc_from(start), format!("unexpected type form {form:#04x}"));
            return None;
        }
        let params = reader.read_vec(|r| read_valtype(r, features))?;
        let results = reader.read_vec(|r| read_valtype(r, features))?;
        if results.len() > 1 && !features.contains(Features::MULTI_VALUE) {
            reader.errors().on_error(
                reader.loc_from(start),
                "multiple results require the multi-value feature".to_string(),
            );
            return None;
        }
        Some(DefinedType {
            loc: reader.loc_from(start),
            ty: FuncType { params, results },
        })
    }
}

impl<'a> ReadBinary<'a> for Import<'a> {
    const DESC: &'static str = "import";

    fn read(reader: &mut BinaryReader<'a>, features: Features) -> Option<Self> {
        let start = reader.pos();
        let module = reader.read_str()?;
        let field = reader.read_str()?;
        let kind = match read_external_kind(reader, features)? {
            ExternalKind::Func => ImportKind::Func(reader.read_var_u32()?),
            ExternalKind::Table => ImportKind::Table(read_table_type(reader, features)?),
            ExternalKind::Memory => ImportKind::Memory(read_memory_type(reader, features)?),
            ExternalKind::Global => ImportKind::Global(read_global_type(reader, features)?),
            ExternalKind::Event => ImportKind::Event(read_event_type(reader, features)?),
        };
        Some(Import {
            loc: reader.loc_from(start),
            module,
            field,
            kind,
        })
    }
}

impl<'a> ReadBinary<'a> for Function {
    const DESC: &'static str = "function";

    fn read(reader: &mut BinaryReader<'a>, _features: Features) -> Option<Self> {
        let start = reader.pos();
        let type_idx = reader.read_var_u32()?;
        Some(Function {
            loc: reader.loc_from(start),
            type_idx,
        })
    }
}

impl<'a> ReadBinary<'a> for TableType {
    const DESC: &'static str = "table";

    fn read(reader: &mut BinaryReader<'a>, features: Features) -> Option<Self> {
        read_table_type(reader, features)
    }
}

impl<'a> ReadBinary<'a> for MemoryType {
    const DESC: &'static str = "memory";

    fn read(reader: &mut BinaryReader<'a>, features: Features) -> Option<Self> {
        read_memory_type(reader, features)
    }
}

impl<'a> ReadBinary<'a> for Global {
    const DESC: &'static str = "global";

    fn read(reader: &mut BinaryReader<'a>, features: Features) -> Option<Self> {
        let start = reader.pos();
        let ty = read_global_type(reader, features)?;
        let init = read_const_expr(reader, features)?;
        Some(Global {
            loc: reader.loc_from(start),
            ty,
            init,
        })
    }
}

impl<'a> ReadBinary<'a> for Export<'a> {
    const DESC: &'static str = "export";

    fn read(reader: &mut BinaryReader<'a>, features: Features) -> Option<Self> {
        let start = reader.pos();
        let field = reader.read_str()?;
        let kind = read_external_kind(reader, features)?;
        let index = reader.read_var_u32()?;
        Some(Export {
            loc: reader.loc_from(start),
            field,
            kind,
            index,
        })
    }
}

impl<'a> ReadBinary<'a> for EventType {
    const DESC: &'static str = "event";

    fn read(reader: &mut BinaryReader<'a>, features: Features) -> Option<Self> {
        read_event_type(reader, features)
    }
}

const SEG_PASSIVE: u32 = 0b001;
const SEG_EXPLICIT_IDX: u32 = 0b010;
const SEG_EXPRS: u32 = 0b100;

impl<'a> ReadBinary<'a> for ElementSegment {
    const DESC: &'static str = "element segment";

    fn read(reader: &mut BinaryReader<'a>, features: Features) -> Option<Self> {
        let start = reader.pos();
        let flags = reader.read_var_u32()?;
        if flags > 0b111 {
            reader.errors().on_error(
                reader.loc_from(start),
                format!("invalid element segment flags {flags:#x}"),
            );
            return None;
        }
        if flags != 0 && !features.intersects(Features::BULK_MEMORY | Features::REFERENCE_TYPES) {
            reader.errors().on_error(
                reader.loc_from(start),
                "element segment flags require the bulk-memory feature".to_string(),
            );
            return None;
        }

        let kind = if flags & SEG_PASSIVE != 0 {
            if flags & SEG_EXPLICIT_IDX != 0 {
                ElementKind::Declared
            } else {
                ElementKind::Passive
            }
        } else {
            let table_idx = if flags & SEG_EXPLICIT_IDX != 0 {
                reader.read_var_u32()?
            } else {
                0
            };
            let offset = read_const_expr(reader, features)?;
            ElementKind::Active { table_idx, offset }
        };

        let elem_type = if flags & (SEG_PASSIVE | SEG_EXPLICIT_IDX) != 0 {
            if flags & SEG_EXPRS != 0 {
                read_reftype(reader, features)?
            } else {
                // Without expressions the type field doubles as an external
                // kind, and only functions are allowed.
                let kind = read_external_kind(reader, features)?;
                if kind != ExternalKind::Func {
                    reader.errors().on_error(
                        reader.loc_from(start),
                        format!("element segments may only hold functions, got {kind}"),
                    );
                    return None;
                }
                RefType::Func
            }
        } else {
            RefType::Func
        };

        let items = if flags & SEG_EXPRS != 0 {
            ElementItems::Expressions(reader.read_vec(|r| read_const_expr(r, features))?)
        } else {
            ElementItems::Functions(reader.read_vec(|r| r.read_var_u32())?)
        };

        Some(ElementSegment {
            loc: reader.loc_from(start),
            kind,
            elem_type,
            items,
        })
    }
}

impl<'a> ReadBinary<'a> for Code<'a> {
    const DESC: &'static str = "code";

    fn read(reader: &mut BinaryReader<'a>, features: Features) -> Option<Self> {
        let start = reader.pos();
        let body_size = reader.read_var_u32()?;
        let mut body_reader = reader.sub_reader(body_size as usize)?;

        let mut total_locals = 0u64;
        let locals = body_reader.read_vec(|r| {
            let count = r.read_var_u32()?;
            total_locals += count as u64;
            if u32::try_from(total_locals).is_err() {
                r.errors().on_error(
                    Location::new(r.pos(), 0),
                    format!("too many locals: {total_locals}"),
                );
                return None;
            }
            let ty = read_valtype(r, features)?;
            Some(NumLocals { count, ty })
        })?;

        let offset = body_reader.pos();
        let body = body_reader.read_bytes(body_reader.remaining())?;
        Some(Code {
            loc: reader.loc_from(start),
            locals,
            body: Expr { data: body, offset },
        })
    }
}

impl<'a> ReadBinary<'a> for DataSegment<'a> {
    const DESC: &'static str = "data segment";

    fn read(reader: &mut BinaryReader<'a>, features: Features) -> Option<Self> {
        let start = reader.pos();
        let flags = reader.read_var_u32()?;
        if flags > 0b10 {
            reader.errors().on_error(
                reader.loc_from(start),
                format!("invalid data segment flags {flags:#x}"),
            );
            return None;
        }
        let kind = if flags & SEG_PASSIVE != 0 {
            if !features.contains(Features::BULK_MEMORY) {
                reader.errors().on_error(
                    reader.loc_from(start),
                    "passive data segments require the bulk-memory feature".to_string(),
                );
                return None;
            }
            DataKind::Passive
        } else {
            let memory_idx = if flags & SEG_EXPLICIT_IDX != 0 {
                reader.read_var_u32()?
            } else {
                0
            };
            let offset = read_const_expr(reader, features)?;
            DataKind::Active { memory_idx, offset }
        };
        let len = reader.read_count()?;
        let data = reader.read_bytes(len as usize)?;
        Some(DataSegment {
            loc: reader.loc_from(start),
            kind,
            data,
        })
    }
}
