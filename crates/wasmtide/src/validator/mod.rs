mod func_validator;

use std::collections::HashSet;

use tracing::{debug, instrument};

use crate::{
    binary::{LazyModule, LazySection, Section, SectionContent, SectionId},
    module::*,
    validator::func_validator::FuncValidator,
    ConstExpr, Error, ErrorSink, Errors, Features, Immediate, Location, Opcode,
};

/// Type-check a module image against `features`.
///
/// The verdict is pass/fail; the error list is the diagnostic payload. As
/// many independent errors as possible are reported per input.
pub fn validate(data: &[u8], features: Features) -> Result<(), Vec<Error>> {
    let errors = Errors::new();
    validate_with(data, features, &errors);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.into_errors())
    }
}

/// Like [`validate`], reporting into a caller-supplied sink.
pub fn validate_with(data: &[u8], features: Features, errors: &dyn ErrorSink) {
    Validator::new(features, errors).run(data);
}

/// Tracks a global's type together with whether it was imported, which gates
/// its use in constant expressions.
pub(crate) struct ValidatorGlobal {
    pub(crate) ty: GlobalType,
    pub(crate) imported: bool,
}

/// The module context: index spaces accumulated section by section.
pub(crate) struct Validator<'a> {
    pub(crate) features: Features,
    pub(crate) errors: &'a dyn ErrorSink,
    pub(crate) types: Vec<FuncType>,
    /// Type index of every function, imports first.
    pub(crate) funcs: Vec<Index>,
    pub(crate) tables: Vec<TableType>,
    pub(crate) mems: Vec<MemoryType>,
    pub(crate) globals: Vec<ValidatorGlobal>,
    /// Type index of every event, imports first.
    pub(crate) events: Vec<Index>,
    /// Element type of every element segment.
    pub(crate) elems: Vec<RefType>,
    /// Functions mentioned by `ref.func` in a constant expression, an
    /// export, or an element segment; only they may be referenced by
    /// `ref.func` inside a function body.
    pub(crate) declared_funcs: HashSet<Index>,
    pub(crate) data_count: Option<u32>,
    num_imported_funcs: usize,
}

impl<'a> Validator<'a> {
    fn new(features: Features, errors: &'a dyn ErrorSink) -> Self {
        Self {
            features,
            errors,
            types: vec![],
            funcs: vec![],
            tables: vec![],
            mems: vec![],
            globals: vec![],
            events: vec![],
            elems: vec![],
            declared_funcs: HashSet::new(),
            data_count: None,
            num_imported_funcs: 0,
        }
    }

    fn error(&self, loc: Location, message: String) {
        self.errors.on_error(loc, message);
    }

    #[instrument(level = "debug", skip_all)]
    fn run(&mut self, data: &'a [u8]) {
        let module = LazyModule::new(data, self.features, self.errors);
        let end_loc = Location::new(data.len(), 0);

        let mut last: Option<SectionId> = None;
        let mut func_count = 0u32;
        let mut code_count: Option<u32> = None;
        let mut data_section_count: Option<u32> = None;

        for section in module.sections() {
            let known = match section {
                // Custom sections carry no semantics.
                Section::Custom(_) => continue,
                Section::Known(known) => known,
            };
            if let Some(prev) = last {
                if known.id == prev {
                    self.error(known.loc, format!("duplicate {} section", known.id));
                } else if known.id.ord() < prev.ord() {
                    self.error(known.loc, format!("the {} section is out of order", known.id));
                }
            }
            last = Some(known.id);
            debug!(id = %known.id, "validating section");

            match known.content() {
                SectionContent::Types(types) => {
                    for ty in types {
                        self.types.push(ty.ty);
                    }
                }
                SectionContent::Imports(imports) => {
                    for import in imports {
                        self.validate_import(&import);
                    }
                    self.num_imported_funcs = self.funcs.len();
                }
                SectionContent::Functions(functions) => {
                    for function in functions {
                        if self.types.get(function.type_idx as usize).is_none() {
                            self.error(
                                function.loc,
                                format!("unknown type {}", function.type_idx),
                            );
                        }
                        self.funcs.push(function.type_idx);
                        func_count += 1;
                    }
                }
                SectionContent::Tables(tables) => {
                    for table in tables {
                        self.validate_table_type(&table);
                        self.tables.push(table);
                    }
                    if self.tables.len() > 1
                        && !self.features.contains(Features::REFERENCE_TYPES)
                    {
                        self.error(known.loc, "at most one table is allowed".to_string());
                    }
                }
                SectionContent::Memories(mems) => {
                    for mem in mems {
                        self.validate_memory_type(&mem);
                        self.mems.push(mem);
                    }
                    if self.mems.len() > 1 {
                        self.error(known.loc, "at most one memory is allowed".to_string());
                    }
                }
                SectionContent::Events(events) => {
                    if !self.features.contains(Features::EXCEPTIONS) {
                        self.error(
                            known.loc,
                            "event sections require the exceptions feature".to_string(),
                        );
                    }
                    for event in events {
                        self.validate_event_type(&event);
                        self.events.push(event.type_idx);
                    }
                }
                SectionContent::Globals(globals) => {
                    for global in globals {
                        self.validate_const_expr(&global.init, global.ty.content_type);
                        self.globals.push(ValidatorGlobal {
                            ty: global.ty,
                            imported: false,
                        });
                    }
                }
                SectionContent::Exports(exports) => {
                    let mut seen = HashSet::new();
                    for export in exports {
                        self.validate_export(&export, &mut seen);
                    }
                }
                SectionContent::Start(start) => {
                    if let Some(start) = start {
                        self.validate_start(&start);
                    }
                }
                SectionContent::Elements(elements) => {
                    for segment in elements {
                        self.validate_element_segment(&segment);
                        self.elems.push(segment.elem_type);
                    }
                }
                SectionContent::DataCount(count) => {
                    self.data_count = count.map(|dc| dc.count);
                }
                SectionContent::Code(codes) => {
                    let mut index = self.num_imported_funcs;
                    let mut count = 0;
                    for code in codes {
                        self.validate_code(&code, index);
                        index += 1;
                        count += 1;
                    }
                    code_count = Some(count);
                }
                SectionContent::Data(datas) => {
                    data_section_count = Some(LazySection::count(&datas));
                    for segment in datas {
                        self.validate_data_segment(&segment);
                    }
                }
            }
        }

        if func_count != code_count.unwrap_or(0) {
            self.error(
                end_loc,
                format!(
                    "function and code section counts disagree: {func_count} != {}",
                    code_count.unwrap_or(0)
                ),
            );
        }
        if let Some(count) = self.data_count {
            if count != data_section_count.unwrap_or(0) {
                self.error(
                    end_loc,
                    "data count section does not match the number of data segments".to_string(),
                );
            }
        }
    }

    pub(crate) fn func_type(&self, type_idx: Index) -> Option<&FuncType> {
        self.types.get(type_idx as usize)
    }

    /// The type of function `idx`, if both the function and its type exist.
    pub(crate) fn func(&self, idx: Index) -> Option<&FuncType> {
        self.func_type(*self.funcs.get(idx as usize)?)
    }

    fn validate_import(&mut self, import: &Import<'_>) {
        match &import.kind {
            ImportKind::Func(type_idx) => {
                if self.types.get(*type_idx as usize).is_none() {
                    self.error(import.loc, format!("unknown type {type_idx}"));
                }
                self.funcs.push(*type_idx);
            }
            ImportKind::Table(ty) => {
                self.validate_table_type(ty);
                if !self.tables.is_empty() && !self.features.contains(Features::REFERENCE_TYPES) {
                    self.error(import.loc, "at most one table is allowed".to_string());
                }
                self.tables.push(*ty);
            }
            ImportKind::Memory(ty) => {
                self.validate_memory_type(ty);
                if !self.mems.is_empty() {
                    self.error(import.loc, "at most one memory is allowed".to_string());
                }
                self.mems.push(*ty);
            }
            ImportKind::Global(ty) => {
                self.globals.push(ValidatorGlobal {
                    ty: *ty,
                    imported: true,
                });
            }
            ImportKind::Event(ty) => {
                self.validate_event_type(ty);
                self.events.push(ty.type_idx);
            }
        }
    }

    fn validate_limits(&self, limits: &Limits) {
        if let Some(max) = limits.max {
            if limits.min > max {
                self.error(
                    limits.loc,
                    format!("limit minimum {} is greater than maximum {max}", limits.min),
                );
            }
        }
        if limits.shared && limits.max.is_none() {
            self.error(limits.loc, "shared limits require a maximum".to_string());
        }
    }

    fn validate_table_type(&self, ty: &TableType) {
        self.validate_limits(&ty.limits);
    }

    fn validate_memory_type(&self, ty: &MemoryType) {
        // 2^16 pages of 64 KiB each, for a 4 GiB address space.
        const MAX_PAGES: u32 = 1 << 16;

        self.validate_limits(&ty.limits);
        if ty.limits.min > MAX_PAGES {
            self.error(
                ty.loc,
                format!("memory of {} pages exceeds the {MAX_PAGES} page limit", ty.limits.min),
            );
        }
        if let Some(max) = ty.limits.max {
            if max > MAX_PAGES {
                self.error(
                    ty.loc,
                    format!("memory of {max} pages exceeds the {MAX_PAGES} page limit"),
                );
            }
        }
    }

    fn validate_event_type(&self, ty: &EventType) {
        if ty.attribute != 0 {
            self.error(ty.loc, format!("unsupported event attribute {}", ty.attribute));
        }
        match self.func_type(ty.type_idx) {
            None => self.error(ty.loc, format!("unknown type {}", ty.type_idx)),
            Some(func_ty) if !func_ty.results.is_empty() => {
                self.error(ty.loc, "event types must not have results".to_string());
            }
            Some(_) => {}
        }
    }

    fn validate_export(&mut self, export: &Export<'_>, seen: &mut HashSet<String>) {
        if !seen.insert(export.field.to_string()) {
            self.error(
                export.loc,
                format!("duplicate export name `{}`", export.field),
            );
        }
        let idx = export.index;
        let in_bounds = match export.kind {
            ExternalKind::Func => {
                self.declared_funcs.insert(idx);
                (idx as usize) < self.funcs.len()
            }
            ExternalKind::Table => (idx as usize) < self.tables.len(),
            ExternalKind::Memory => (idx as usize) < self.mems.len(),
            ExternalKind::Global => (idx as usize) < self.globals.len(),
            ExternalKind::Event => (idx as usize) < self.events.len(),
        };
        if !in_bounds {
            self.error(
                export.loc,
                format!("exported {} {idx} does not exist", export.kind),
            );
        }
    }

    fn validate_start(&self, start: &Start) {
        let Some(ty) = self.func(start.func_idx) else {
            self.error(
                start.loc,
                format!("start function {} does not exist", start.func_idx),
            );
            return;
        };
        if !ty.params.is_empty() || !ty.results.is_empty() {
            self.error(
                start.loc,
                "start function must have no parameters and no results".to_string(),
            );
        }
    }

    fn validate_element_segment(&mut self, segment: &ElementSegment) {
        if let ElementKind::Active { table_idx, offset } = &segment.kind {
            match self.tables.get(*table_idx as usize) {
                None => {
                    self.error(segment.loc, format!("unknown table {table_idx}"));
                }
                Some(table) => {
                    if table.elem_type != segment.elem_type {
                        self.error(
                            segment.loc,
                            format!(
                                "element type {} does not match table element type {}",
                                segment.elem_type, table.elem_type
                            ),
                        );
                    }
                }
            }
            self.validate_const_expr(offset, ValType::I32);
        }
        match &segment.items {
            ElementItems::Functions(funcs) => {
                for func_idx in funcs {
                    if (*func_idx as usize) >= self.funcs.len() {
                        self.error(
                            segment.loc,
                            format!("element function index {func_idx} out of bounds"),
                        );
                    }
                    self.declared_funcs.insert(*func_idx);
                }
            }
            ElementItems::Expressions(exprs) => {
                for expr in exprs {
                    self.validate_const_expr(expr, segment.elem_type.into());
                }
            }
        }
    }

    fn validate_data_segment(&mut self, segment: &DataSegment<'_>) {
        if let DataKind::Active { memory_idx, offset } = &segment.kind {
            if (*memory_idx as usize) >= self.mems.len() {
                self.error(
                    segment.loc,
                    format!("unknown memory {memory_idx} in data segment"),
                );
            }
            self.validate_const_expr(offset, ValType::I32);
        }
    }

    /// A constant expression is a single producing instruction; it must be
    /// one of the constant opcodes and yield exactly the expected type.
    pub(crate) fn validate_const_expr(&mut self, expr: &ConstExpr, expected: ValType) {
        let instr = &expr.instr;
        let actual = match instr.opcode {
            Opcode::I32Const => ValType::I32,
            Opcode::I64Const => ValType::I64,
            Opcode::F32Const => ValType::F32,
            Opcode::F64Const => ValType::F64,
            Opcode::V128Const => ValType::V128,
            Opcode::RefNull => match instr.immediate {
                Immediate::RefType(rt) => rt.into(),
                _ => return,
            },
            Opcode::RefFunc => {
                let Some(func_idx) = instr.index() else { return };
                if (func_idx as usize) >= self.funcs.len() {
                    self.error(
                        instr.loc,
                        format!("unknown function {func_idx} in constant expression"),
                    );
                    return;
                }
                self.declared_funcs.insert(func_idx);
                ValType::FuncRef
            }
            Opcode::GlobalGet => {
                let Some(global_idx) = instr.index() else { return };
                let Some(global) = self.globals.get(global_idx as usize) else {
                    self.error(
                        instr.loc,
                        format!("unknown global {global_idx} in constant expression"),
                    );
                    return;
                };
                if global.ty.mutable {
                    self.error(
                        instr.loc,
                        "constant expression references mutable global".to_string(),
                    );
                    return;
                }
                if !global.imported {
                    self.error(
                        instr.loc,
                        "constant expression references a module-defined global".to_string(),
                    );
                    return;
                }
                global.ty.content_type
            }
            opcode => {
                self.error(
                    instr.loc,
                    format!("{opcode} is not valid in a constant expression"),
                );
                return;
            }
        };
        if actual != expected {
            self.error(
                instr.loc,
                format!("type mismatch in constant expression: expected {expected}, got {actual}"),
            );
        }
    }

    fn validate_code(&self, code: &Code<'_>, func_idx: usize) {
        let Some(&type_idx) = self.funcs.get(func_idx) else {
            self.error(
                code.loc,
                "code entry without a matching function declaration".to_string(),
            );
            return;
        };
        let Some(ty) = self.func_type(type_idx) else {
            // Already reported while validating the function section.
            return;
        };
        let mut validator = FuncValidator::new(self, ty, &code.locals);
        validator.run(code);
    }
}
