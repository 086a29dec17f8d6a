use std::path::PathBuf;

use indexmap::IndexSet;

use harnessgen::core::frontend::{
    Enumerator, FieldDecl, QualType, TagDecl, TagKind, TranslationUnit, TypeShape,
};
use harnessgen::core::types::resolver::{DeclarationPlan, TypesResolver};
use harnessgen::core::types::{ProjectTypes, TypeId};

const BUILD_ROOT: &str = "/proj/build";

fn int() -> QualType {
    QualType::scalar("int", 32, 32)
}

fn char_ty() -> QualType {
    QualType::scalar("char", 8, 8)
}

fn record_decl(name: &str, canonical: &str, fields: Vec<FieldDecl>) -> TagDecl {
    TagDecl {
        name: name.to_string(),
        canonical: canonical.to_string(),
        file: PathBuf::from("/proj/a.h"),
        definition: format!("struct {name} {{ ... }}"),
        size_bits: 64,
        align_bits: 64,
        parents: Vec::new(),
        kind: TagKind::Record {
            fields,
            is_union: false,
        },
    }
}

fn function_pointer(ret: QualType, params: Vec<QualType>) -> QualType {
    let fn_ty = QualType::new(
        "int (char)",
        "int (char)",
        0,
        0,
        TypeShape::Function {
            ret: Box::new(ret),
            params,
        },
    );
    QualType::new(
        "int (*)(char)",
        "int (*)(char)",
        64,
        64,
        TypeShape::Pointer(Box::new(fn_ty)),
    )
}

fn resolve_unit(unit: &TranslationUnit) -> (ProjectTypes, DeclarationPlan) {
    let mut types = ProjectTypes::new();
    let mut declarations = DeclarationPlan::default();
    TypesResolver::new(&mut types, &mut declarations, BUILD_ROOT).resolve_all(unit);
    (types, declarations)
}

#[test]
fn typedef_name_wins_over_anonymous_in_either_order() {
    let canonical = "struct (unnamed at /proj/a.c:1)";
    let named = record_decl("T", canonical, Vec::new());
    let anonymous = record_decl("", canonical, Vec::new());
    let id = TypeId::of_canonical(canonical);

    let mut unit = TranslationUnit::new("/proj/a.c");
    unit.tags = vec![anonymous.clone(), named.clone()];
    let (types, _) = resolve_unit(&unit);
    assert_eq!(types.records.len(), 1);
    assert_eq!(types.records.get(id).expect("entry").name, "T");

    let mut unit = TranslationUnit::new("/proj/a.c");
    unit.tags = vec![named, anonymous];
    let (types, _) = resolve_unit(&unit);
    assert_eq!(types.records.len(), 1);
    assert_eq!(types.records.get(id).expect("entry").name, "T");
}

#[test]
fn colliding_names_keep_the_first_entry() {
    let canonical = "struct T";
    let mut unit = TranslationUnit::new("/proj/a.c");
    unit.tags = vec![
        record_decl("T", canonical, Vec::new()),
        record_decl("U", canonical, Vec::new()),
    ];
    let (types, _) = resolve_unit(&unit);
    let id = TypeId::of_canonical(canonical);
    assert_eq!(types.records.len(), 1);
    assert_eq!(types.records.get(id).expect("entry").name, "T");
}

#[test]
fn enum_entries_are_indexed_by_name_and_by_value() {
    let decl = TagDecl {
        name: "E".to_string(),
        canonical: "enum E".to_string(),
        file: PathBuf::from("include/e.h"),
        definition: "enum E { A = -1, B = 2 }".to_string(),
        size_bits: 32,
        align_bits: 32,
        parents: Vec::new(),
        kind: TagKind::Enum {
            promotion_size_bits: 32,
            enumerators: vec![
                Enumerator {
                    name: "A".to_string(),
                    value: -1,
                },
                Enumerator {
                    name: "B".to_string(),
                    value: 2,
                },
            ],
        },
    };
    let mut unit = TranslationUnit::new("/proj/a.c");
    unit.tags = vec![decl];
    let (types, _) = resolve_unit(&unit);

    let info = types
        .enums
        .get(TypeId::of_canonical("enum E"))
        .expect("enum entry");
    assert_eq!(info.size, 4);
    assert_eq!(info.access, None);
    assert_eq!(info.file, PathBuf::from("/proj/build/include/e.h"));
    assert_eq!(info.names_to_entries["A"].value, "-1");
    assert_eq!(info.names_to_entries["B"].value, "2");
    assert_eq!(info.values_to_entries["-1"].name, "A");
    assert_eq!(info.values_to_entries["2"].name, "B");
}

#[test]
fn nested_enum_access_chain_is_outermost_first() {
    let decl = TagDecl {
        name: "Mode".to_string(),
        canonical: "enum Outer::Inner::Mode".to_string(),
        file: PathBuf::from("/proj/m.h"),
        definition: "enum Mode { On }".to_string(),
        size_bits: 32,
        align_bits: 32,
        parents: vec!["Inner".to_string(), "Outer".to_string()],
        kind: TagKind::Enum {
            promotion_size_bits: 32,
            enumerators: vec![Enumerator {
                name: "On".to_string(),
                value: 0,
            }],
        },
    };
    let mut unit = TranslationUnit::new("/proj/m.cpp");
    unit.tags = vec![decl];
    let (types, _) = resolve_unit(&unit);

    let info = types
        .enums
        .get(TypeId::of_canonical("enum Outer::Inner::Mode"))
        .expect("enum entry");
    assert_eq!(info.access.as_deref(), Some("Outer::Inner"));
}

#[test]
fn function_pointer_fields_synthesize_signatures() {
    let field = FieldDecl {
        name: "cb".to_string(),
        ty: function_pointer(int(), vec![char_ty()]),
        offset_bits: 0,
    };
    let mut unit = TranslationUnit::new("/proj/a.c");
    unit.tags = vec![record_decl("S", "struct S", vec![field])];
    let (types, _) = resolve_unit(&unit);

    let info = types
        .records
        .get(TypeId::of_canonical("struct S"))
        .expect("record entry");
    assert_eq!(info.fields.len(), 1);
    assert_eq!(info.fields[0].size, 8);
    assert_eq!(info.fields[0].ty.canonical, "int (*)(char)");

    let signature = &info.function_fields["cb"];
    assert_eq!(signature.name, "cb");
    assert_eq!(signature.return_type.canonical, "int");
    assert_eq!(signature.params.len(), 1);
    assert_eq!(signature.params[0].name, "param1");
    assert_eq!(signature.params[0].ty.canonical, "char");
    assert!(!signature.is_array);
}

#[test]
fn record_returning_function_pointers_schedule_forward_declarations() {
    let returned = QualType::new(
        "struct Node *",
        "struct Node *",
        64,
        64,
        TypeShape::Pointer(Box::new(QualType::new(
            "struct Node",
            "struct Node",
            128,
            64,
            TypeShape::Record {
                name: "Node".to_string(),
            },
        ))),
    );
    let fn_ty = QualType::new(
        "struct Node *(void)",
        "struct Node *(void)",
        0,
        0,
        TypeShape::Function {
            ret: Box::new(returned),
            params: Vec::new(),
        },
    );
    let field = FieldDecl {
        name: "next".to_string(),
        ty: QualType::new(
            "struct Node *(*)(void)",
            "struct Node *(*)(void)",
            64,
            64,
            TypeShape::Pointer(Box::new(fn_ty)),
        ),
        offset_bits: 0,
    };

    let mut unit = TranslationUnit::new("/proj/list.c");
    unit.tags = vec![record_decl("List", "struct List", vec![field.clone()])];
    let (_, declarations) = resolve_unit(&unit);
    assert!(
        declarations.to_declare[&PathBuf::from("/proj/list.c")].contains("Node"),
        "undeclared return record should be scheduled"
    );

    // Already declared in the unit: nothing to schedule.
    let mut unit = TranslationUnit::new("/proj/list.c");
    unit.declared_records = IndexSet::from(["Node".to_string()]);
    unit.tags = vec![record_decl("List", "struct List", vec![field])];
    let (_, declarations) = resolve_unit(&unit);
    assert!(declarations.to_declare.is_empty());
}

#[test]
fn unions_record_fields_without_offsets_or_signatures() {
    let decl = TagDecl {
        name: "Value".to_string(),
        canonical: "union Value".to_string(),
        file: PathBuf::from("/proj/v.h"),
        definition: "union Value { int i; char c; }".to_string(),
        size_bits: 32,
        align_bits: 32,
        parents: Vec::new(),
        kind: TagKind::Record {
            fields: vec![
                FieldDecl {
                    name: "i".to_string(),
                    ty: int(),
                    offset_bits: 0,
                },
                FieldDecl {
                    name: "handler".to_string(),
                    ty: function_pointer(int(), vec![char_ty()]),
                    offset_bits: 0,
                },
            ],
            is_union: true,
        },
    };
    let mut unit = TranslationUnit::new("/proj/v.c");
    unit.tags = vec![decl];
    let (types, _) = resolve_unit(&unit);

    let info = types
        .unions
        .get(TypeId::of_canonical("union Value"))
        .expect("union entry");
    assert_eq!(info.fields.len(), 2);
    assert!(info.fields.iter().all(|field| field.offset == 0));
    assert!(types.records.is_empty());
}

#[test]
fn resolution_is_idempotent() {
    let field = FieldDecl {
        name: "x".to_string(),
        ty: int(),
        offset_bits: 0,
    };
    let mut unit = TranslationUnit::new("/proj/a.c");
    unit.tags = vec![record_decl("T", "struct T", vec![field])];

    let mut types = ProjectTypes::new();
    let mut declarations = DeclarationPlan::default();
    TypesResolver::new(&mut types, &mut declarations, BUILD_ROOT).resolve_all(&unit);
    let id = TypeId::of_canonical("struct T");
    let first = types.records.get(id).cloned().expect("entry");
    let first_alignment = types.maximum_alignment;

    TypesResolver::new(&mut types, &mut declarations, BUILD_ROOT).resolve_all(&unit);
    assert_eq!(types.records.get(id), Some(&first));
    assert_eq!(types.maximum_alignment, first_alignment);
}

#[test]
fn maximum_alignment_tracks_every_registry() {
    let record = TagDecl {
        align_bits: 64,
        ..record_decl("R", "struct R", Vec::new())
    };
    let union_decl = TagDecl {
        name: "U".to_string(),
        canonical: "union U".to_string(),
        file: PathBuf::from("/proj/u.h"),
        definition: "union U { ... }".to_string(),
        size_bits: 128,
        align_bits: 128,
        parents: Vec::new(),
        kind: TagKind::Record {
            fields: Vec::new(),
            is_union: true,
        },
    };
    let enum_decl = TagDecl {
        name: "E".to_string(),
        canonical: "enum E".to_string(),
        file: PathBuf::from("/proj/e.h"),
        definition: "enum E { A }".to_string(),
        size_bits: 32,
        align_bits: 32,
        parents: Vec::new(),
        kind: TagKind::Enum {
            promotion_size_bits: 32,
            enumerators: vec![Enumerator {
                name: "A".to_string(),
                value: 0,
            }],
        },
    };

    let mut unit = TranslationUnit::new("/proj/a.c");
    unit.tags = vec![record, union_decl, enum_decl];
    let (types, _) = resolve_unit(&unit);

    assert_eq!(types.maximum_alignment, 16);
    let computed = types
        .records
        .iter()
        .map(|(_, info)| info.alignment)
        .chain(types.enums.iter().map(|(_, info)| info.alignment))
        .chain(types.unions.iter().map(|(_, info)| info.alignment))
        .max()
        .unwrap_or(0);
    assert_eq!(types.maximum_alignment, computed);
}
