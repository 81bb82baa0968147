mod inputs;

use inputs::*;
use test_log::test;
use wasmtide::binary::write::*;
use wasmtide::{
    text::{Lexer, TokenKind},
    validate, ConstExpr, DataKind, DataSegment, ElementItems, ElementKind, ElementSegment, Error,
    Errors, Export, ExternalKind, Features, GlobalType, Import, ImportKind, LazyModule, Limits,
    Location, Opcode, RefType, Section, SectionContent, SectionId, ValType,
};

fn assert_error(result: Result<(), Vec<Error>>, message: &str) -> Vec<Error> {
    let errors = result.expect_err("validation should fail");
    assert!(
        errors.iter().any(|e| e.message == message),
        "no error `{message}` among {errors:#?}"
    );
    errors
}

#[test]
fn minimal_module_decodes_and_validates() {
    let errors = Errors::new();
    let module = LazyModule::new(MINIMAL, Features::mvp(), &errors);
    assert_eq!(module.sections().count(), 0);
    assert!(errors.is_empty());
    assert_eq!(validate(MINIMAL, Features::mvp()), Ok(()));
}

#[test]
fn type_only_module_roundtrips() {
    let errors = Errors::new();
    let module = LazyModule::new(TYPE_ONLY, Features::mvp(), &errors);
    let mut sections = module.sections();
    let Some(Section::Known(section)) = sections.next() else {
        panic!("expected a known section");
    };
    assert_eq!(section.id, SectionId::Type);
    let SectionContent::Types(types) = section.content() else {
        panic!("expected a type section");
    };
    let decoded: Vec<_> = types.collect();
    assert!(sections.next().is_none());
    assert!(errors.is_empty());

    assert_eq!(decoded.len(), 1);
    assert!(decoded[0].ty.params.is_empty());
    assert_eq!(decoded[0].ty.results, vec![ValType::I32]);
    assert_eq!(decoded[0].loc, Location::new(11, 4));

    assert_eq!(validate(TYPE_ONLY, Features::mvp()), Ok(()));

    // Writing the decoded AST back out reproduces the input bytes.
    let mut encoded = vec![];
    header(&mut encoded);
    section_with(&mut encoded, SectionId::Type, |body| {
        write_var_u32(body, 1);
        write_defined_type(body, &decoded[0]);
    });
    assert_eq!(encoded, TYPE_ONLY);
}

#[test]
fn non_minimal_section_size_is_rejected() {
    let errors = assert_error(
        validate(NON_MINIMAL_SECTION_SIZE, Features::mvp()),
        "integer representation too long",
    );
    assert_eq!(errors[0].loc, Location::new(9, 5));
}

#[test]
fn bad_magic_is_reported() {
    assert_error(
        validate(BAD_MAGIC, Features::mvp()),
        "magic mismatch: expected [00, 61, 73, 6d], got [00, 61, 73, 6e]",
    );
}

#[test]
fn br_table_label_arity_mismatch() {
    // () -> () function: block (result i32) holds arity [i32], the function
    // label holds arity []; br_table over both must fail.
    let body = [
        0x02, 0x7f, // block (result i32)
        0x41, 0x00, // i32.const 0
        0x0e, 0x01, 0x00, 0x01, // br_table 0 1
        0x0b, // end (block)
        0x0b, // end (function)
    ];
    let module = single_func_module(func_type(&[], &[]), &body);
    assert_error(
        validate(&module, Features::mvp()),
        "br_table label-arity mismatch",
    );
}

#[test]
fn const_expr_with_mutable_global_is_rejected() {
    let mut module = vec![];
    header(&mut module);
    section_with(&mut module, SectionId::Import, |body| {
        write_var_u32(body, 1);
        write_import(
            body,
            &Import {
                loc: loc(),
                module: "env",
                field: "g",
                kind: ImportKind::Global(GlobalType {
                    loc: loc(),
                    content_type: ValType::I32,
                    mutable: true,
                }),
            },
        );
    });
    section_with(&mut module, SectionId::Global, |body| {
        write_var_u32(body, 1);
        write_global(
            body,
            &wasmtide::Global {
                loc: loc(),
                ty: GlobalType {
                    loc: loc(),
                    content_type: ValType::I32,
                    mutable: false,
                },
                init: ConstExpr {
                    loc: loc(),
                    instr: instr(Opcode::GlobalGet, wasmtide::Immediate::Index(0)),
                },
            },
        );
    });
    assert_error(
        validate(&module, Features::mvp()),
        "constant expression references mutable global",
    );
}

#[test]
fn legacy_and_canonical_spellings_share_an_opcode() {
    let src = b"i32.trunc_s/f32 i32.trunc_f32_s";
    let tokens: Vec<_> = Lexer::new(src).filter(|t| !t.kind.is_trivia()).collect();
    assert_eq!(tokens.len(), 2);
    let legacy = tokens[0].kind.opcode_info().unwrap();
    let canonical = tokens[1].kind.opcode_info().unwrap();
    assert_eq!(legacy.opcode, Opcode::I32TruncF32S);
    assert_eq!(legacy.opcode, canonical.opcode);
    assert_ne!(tokens[0].loc, tokens[1].loc);
    assert_eq!(tokens[0].loc, Location::new(0, 15));
    assert_eq!(tokens[1].loc, Location::new(16, 15));
}

/// A module exercising most section kinds end to end.
fn full_module() -> Vec<u8> {
    let mut out = vec![];
    header(&mut out);
    type_section(&mut out, &[func_type(&[], &[ValType::I32])]);
    function_section(&mut out, &[0]);
    table_section(
        &mut out,
        &[wasmtide::TableType {
            loc: loc(),
            elem_type: RefType::Func,
            limits: Limits {
                loc: loc(),
                min: 1,
                max: None,
                shared: false,
            },
        }],
    );
    memory_section(&mut out, &[memory_type(1, Some(2), false)]);
    section_with(&mut out, SectionId::Global, |body| {
        write_var_u32(body, 1);
        write_global(
            body,
            &wasmtide::Global {
                loc: loc(),
                ty: GlobalType {
                    loc: loc(),
                    content_type: ValType::I32,
                    mutable: true,
                },
                init: i32_const(7),
            },
        );
    });
    section_with(&mut out, SectionId::Export, |body| {
        write_var_u32(body, 2);
        write_export(
            body,
            &Export {
                loc: loc(),
                field: "f",
                kind: ExternalKind::Func,
                index: 0,
            },
        );
        write_export(
            body,
            &Export {
                loc: loc(),
                field: "mem",
                kind: ExternalKind::Memory,
                index: 0,
            },
        );
    });
    section_with(&mut out, SectionId::Element, |body| {
        write_var_u32(body, 1);
        write_element_segment(
            body,
            &ElementSegment {
                loc: loc(),
                kind: ElementKind::Active {
                    table_idx: 0,
                    offset: i32_const(0),
                },
                elem_type: RefType::Func,
                items: ElementItems::Functions(vec![0]),
            },
        );
    });
    code_section(&mut out, &[&[0x41, 0x2a, 0x0b]]); // i32.const 42, end
    section_with(&mut out, SectionId::Data, |body| {
        write_var_u32(body, 1);
        write_data_segment(
            body,
            &DataSegment {
                loc: loc(),
                kind: DataKind::Active {
                    memory_idx: 0,
                    offset: i32_const(0),
                },
                data: b"hi",
            },
        );
    });
    out
}

#[test]
fn full_module_validates() {
    let module = full_module();
    assert_eq!(validate(&module, Features::mvp()), Ok(()));
}

#[test]
fn validation_is_monotone_in_features() {
    // A module valid under a feature set stays valid under any superset.
    let module = full_module();
    assert_eq!(validate(&module, Features::mvp()), Ok(()));
    assert_eq!(validate(&module, Features::all()), Ok(()));
}

#[test]
fn function_without_code_is_rejected() {
    let mut module = vec![];
    header(&mut module);
    type_section(&mut module, &[func_type(&[], &[])]);
    function_section(&mut module, &[0]);
    assert_error(
        validate(&module, Features::mvp()),
        "function and code section counts disagree: 1 != 0",
    );
}

#[test]
fn duplicate_export_names_are_rejected() {
    let mut module = vec![];
    header(&mut module);
    type_section(&mut module, &[func_type(&[], &[])]);
    function_section(&mut module, &[0]);
    section_with(&mut module, SectionId::Export, |body| {
        write_var_u32(body, 2);
        for _ in 0..2 {
            write_export(
                body,
                &Export {
                    loc: loc(),
                    field: "f",
                    kind: ExternalKind::Func,
                    index: 0,
                },
            );
        }
    });
    code_section(&mut module, &[&[0x0b]]);
    assert_error(
        validate(&module, Features::mvp()),
        "duplicate export name `f`",
    );
}

#[test]
fn out_of_order_sections_are_rejected() {
    let mut module = vec![];
    header(&mut module);
    memory_section(&mut module, &[memory_type(1, None, false)]);
    type_section(&mut module, &[func_type(&[], &[])]);
    assert_error(
        validate(&module, Features::mvp()),
        "the type section is out of order",
    );
}

#[test]
fn duplicate_sections_are_rejected() {
    let mut module = vec![];
    header(&mut module);
    type_section(&mut module, &[func_type(&[], &[])]);
    type_section(&mut module, &[func_type(&[], &[])]);
    assert_error(
        validate(&module, Features::mvp()),
        "duplicate type section",
    );
}

#[test]
fn data_count_mismatch_is_rejected() {
    let mut module = vec![];
    header(&mut module);
    section_with(&mut module, SectionId::DataCount, |body| {
        write_var_u32(body, 2);
    });
    section_with(&mut module, SectionId::Data, |body| {
        write_var_u32(body, 1);
        write_data_segment(
            body,
            &DataSegment {
                loc: loc(),
                kind: DataKind::Passive,
                data: b"x",
            },
        );
    });
    assert_error(
        validate(&module, Features::BULK_MEMORY),
        "data count section does not match the number of data segments",
    );
}

#[test]
fn oversized_alignment_is_rejected() {
    let mut module = vec![];
    header(&mut module);
    type_section(&mut module, &[func_type(&[], &[])]);
    function_section(&mut module, &[0]);
    memory_section(&mut module, &[memory_type(1, None, false)]);
    // i32.const 0, i32.load align=8, drop, end
    code_section(&mut module, &[&[0x41, 0x00, 0x28, 0x03, 0x00, 0x1a, 0x0b]]);
    assert_error(
        validate(&module, Features::mvp()),
        "alignment of 8 exceeds the natural alignment of 4",
    );
}

#[test]
fn ref_func_requires_a_declaration() {
    // ref.func 0, drop, end; function 0 is never exported or mentioned in an
    // element segment or constant expression.
    let module = single_func_module(func_type(&[], &[]), &[0xd2, 0x00, 0x1a, 0x0b]);
    assert_error(
        validate(&module, Features::REFERENCE_TYPES),
        "ref.func references undeclared function 0",
    );
}

#[test]
fn untyped_select_rejects_reference_types() {
    let body = [
        0xd0, 0x70, // ref.null funcref
        0xd0, 0x70, // ref.null funcref
        0x41, 0x01, // i32.const 1
        0x1b, // select
        0x1a, // drop
        0x0b, // end
    ];
    let module = single_func_module(func_type(&[], &[]), &body);
    assert_error(
        validate(&module, Features::REFERENCE_TYPES),
        "select without a type annotation cannot be used with reference types",
    );
}

#[test]
fn atomics_require_a_shared_memory() {
    let body = [
        0x41, 0x00, // i32.const 0
        0xfe, 0x10, 0x02, 0x00, // i32.atomic.load align=4 offset=0
        0x1a, // drop
        0x0b, // end
    ];
    let build = |shared: bool| {
        let mut module = vec![];
        header(&mut module);
        type_section(&mut module, &[func_type(&[], &[])]);
        function_section(&mut module, &[0]);
        memory_section(&mut module, &[memory_type(1, Some(1), shared)]);
        code_section(&mut module, &[&body]);
        module
    };
    assert_eq!(validate(&build(true), Features::THREADS), Ok(()));
    assert_error(
        validate(&build(false), Features::THREADS),
        "atomic operations require a shared memory",
    );
}

#[test]
fn atomic_alignment_must_be_natural() {
    let body = [
        0x41, 0x00, // i32.const 0
        0xfe, 0x10, 0x01, 0x00, // i32.atomic.load align=2 (natural is 4)
        0x1a, // drop
        0x0b, // end
    ];
    let mut module = vec![];
    header(&mut module);
    type_section(&mut module, &[func_type(&[], &[])]);
    function_section(&mut module, &[0]);
    memory_section(&mut module, &[memory_type(1, Some(1), true)]);
    code_section(&mut module, &[&body]);
    assert_error(
        validate(&module, Features::THREADS),
        "atomic alignment must equal the natural alignment",
    );
}

#[test]
fn start_function_must_be_nullary() {
    let mut module = vec![];
    header(&mut module);
    type_section(&mut module, &[func_type(&[ValType::I32], &[])]);
    function_section(&mut module, &[0]);
    section_with(&mut module, SectionId::Start, |body| {
        write_var_u32(body, 0);
    });
    code_section(&mut module, &[&[0x0b]]);
    assert_error(
        validate(&module, Features::mvp()),
        "start function must have no parameters and no results",
    );
}

#[test]
fn unknown_opcode_terminates_the_body() {
    let module = single_func_module(func_type(&[], &[]), &[0xff, 0x0b]);
    assert_error(validate(&module, Features::mvp()), "unknown opcode 0xff");
}

#[test]
fn custom_sections_are_carried_and_name_subsections_iterate() {
    let mut module = vec![];
    header(&mut module);
    // A custom section before and after a known section.
    let mut body = vec![];
    write_name(&mut body, "name");
    body.push(1); // function names subsection
    write_var_u32(&mut body, 3);
    body.extend_from_slice(&[0xaa, 0xbb, 0xcc]);
    write_section(&mut module, SectionId::Custom, &body);
    type_section(&mut module, &[func_type(&[], &[])]);
    let mut tail = vec![];
    write_name(&mut tail, "other");
    write_section(&mut module, SectionId::Custom, &tail);

    assert_eq!(validate(&module, Features::mvp()), Ok(()));

    let errors = Errors::new();
    let lazy = LazyModule::new(&module, Features::mvp(), &errors);
    let customs: Vec<_> = lazy
        .sections()
        .filter_map(|section| match section {
            Section::Custom(custom) => Some(custom),
            Section::Known(_) => None,
        })
        .collect();
    assert_eq!(customs.len(), 2);
    assert_eq!(customs[0].name, "name");
    assert_eq!(customs[1].name, "other");

    let subsections: Vec<_> = customs[0].name_subsections(&errors).unwrap().collect();
    assert_eq!(subsections.len(), 1);
    assert_eq!(subsections[0].id, 1);
    assert_eq!(subsections[0].payload, &[0xaa, 0xbb, 0xcc]);
    assert!(customs[1].name_subsections(&errors).is_none());
    assert!(errors.is_empty());
}

#[test]
fn errors_are_collected_not_fatal() {
    // Two independent validation errors in one module: a bad start function
    // and a missing code entry.
    let mut module = vec![];
    header(&mut module);
    type_section(&mut module, &[func_type(&[ValType::I32], &[])]);
    function_section(&mut module, &[0]);
    section_with(&mut module, SectionId::Start, |body| {
        write_var_u32(body, 0);
    });
    let errors = validate(&module, Features::mvp()).unwrap_err();
    assert!(errors.len() >= 2, "{errors:#?}");
}

#[test]
fn decoder_is_lazy_over_sections() {
    // A module whose code section contains garbage: merely framing the
    // sections must not report any error.
    let mut module = vec![];
    header(&mut module);
    type_section(&mut module, &[func_type(&[], &[])]);
    function_section(&mut module, &[0]);
    code_section(&mut module, &[&[0xff, 0xff, 0xff]]);

    let errors = Errors::new();
    let lazy = LazyModule::new(&module, Features::mvp(), &errors);
    let ids: Vec<_> = lazy
        .sections()
        .filter_map(|section| match section {
            Section::Known(known) => Some(known.id),
            Section::Custom(_) => None,
        })
        .collect();
    assert_eq!(
        ids,
        vec![SectionId::Type, SectionId::Function, SectionId::Code]
    );
    assert!(errors.is_empty(), "framing alone must not decode bodies");

    // Decoding the bodies does report.
    assert!(validate(&module, Features::mvp()).is_err());
}
