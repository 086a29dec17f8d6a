//! Tag-declaration resolver: visits parsed declarations and populates the
//! type registries with layout, definition text and source location.
//!
//! Resolution order follows whatever visitation order the caller chose;
//! the registries' first-non-empty-name-wins policy makes the outcome
//! order-independent for correct programs.

use std::path::{Path, PathBuf};

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, warn};

use crate::core::frontend::{
    Enumerator, FieldDecl, QualType, TagDecl, TagKind, TranslationUnit, TypeShape,
};
use crate::core::types::{
    EnumEntry, EnumInfo, Field, FunctionParam, FunctionSignature, InsertOutcome, NamedInfo,
    ProjectTypes, RecordInfo, Registry, SemType, TypeId, UnionInfo,
};

/// Records scheduled for forward declaration, keyed by the translation
/// unit's main file. Consumed by the sibling declaration-planning
/// collaborator when it assembles the test source preamble.
#[derive(Debug, Clone, Default)]
pub struct DeclarationPlan {
    pub to_declare: IndexMap<PathBuf, IndexSet<String>>,
}

impl DeclarationPlan {
    fn schedule(&mut self, file: PathBuf, record: &str) {
        self.to_declare
            .entry(file)
            .or_default()
            .insert(record.to_string());
    }
}

pub struct TypesResolver<'a> {
    types: &'a mut ProjectTypes,
    declarations: &'a mut DeclarationPlan,
    build_root: PathBuf,
}

impl<'a> TypesResolver<'a> {
    pub fn new(
        types: &'a mut ProjectTypes,
        declarations: &'a mut DeclarationPlan,
        build_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            types,
            declarations,
            build_root: build_root.into(),
        }
    }

    /// Resolves every tag declaration of the unit in visitation order.
    pub fn resolve_all(&mut self, unit: &TranslationUnit) {
        for decl in &unit.tags {
            self.resolve(unit, decl);
        }
    }

    /// Entry point for a single declaration; dispatches on the tag kind.
    pub fn resolve(&mut self, unit: &TranslationUnit, decl: &TagDecl) {
        match &decl.kind {
            TagKind::Record {
                fields,
                is_union: false,
            } => self.resolve_record(unit, decl, fields),
            TagKind::Record {
                fields,
                is_union: true,
            } => self.resolve_union(decl, fields),
            TagKind::Enum {
                promotion_size_bits,
                enumerators,
            } => self.resolve_enum(decl, *promotion_size_bits, enumerators),
        }
    }

    fn resolve_record(&mut self, unit: &TranslationUnit, decl: &TagDecl, fields: &[FieldDecl]) {
        let id = TypeId::of_canonical(&decl.canonical);
        if !self.types.records.wants(id, &decl.name) {
            return;
        }
        let file = self.resolve_file(&decl.file);
        if is_runner_header(&file) {
            return;
        }

        let mut info = RecordInfo {
            name: decl.name.clone(),
            file,
            definition: decl.definition.clone(),
            size: decl.size_bits / 8,
            alignment: decl.align_bits / 8,
            ..RecordInfo::default()
        };
        for field in fields {
            if field.ty.is_pointer_to_function() {
                if let Some(fn_ty) = field.ty.function_behind_pointer() {
                    info.function_fields
                        .insert(field.name.clone(), signature_of(fn_ty, &field.name, false));
                    self.schedule_return_record(unit, fn_ty);
                }
            } else if field.ty.is_array_of_pointers_to_function() {
                if let Some(fn_ty) = field.ty.function_behind_pointer() {
                    info.function_fields
                        .insert(field.name.clone(), signature_of(fn_ty, &field.name, true));
                }
            }
            info.fields.push(Field {
                name: field.name.clone(),
                ty: SemType::of(&field.ty),
                size: field.ty.size_bytes(),
                offset: field.offset_bits / 8,
            });
        }

        let alignment = info.alignment;
        let outcome = self.types.records.insert(id, info);
        log_insert(&self.types.records, outcome, id, &decl.name);
        self.types.update_maximum_alignment(alignment);
    }

    fn resolve_union(&mut self, decl: &TagDecl, fields: &[FieldDecl]) {
        let id = TypeId::of_canonical(&decl.canonical);
        if !self.types.unions.wants(id, &decl.name) {
            return;
        }
        let file = self.resolve_file(&decl.file);
        if is_runner_header(&file) {
            return;
        }

        let info = UnionInfo {
            name: decl.name.clone(),
            file,
            definition: decl.definition.clone(),
            size: decl.size_bits / 8,
            alignment: decl.align_bits / 8,
            fields: fields
                .iter()
                .map(|field| Field {
                    name: field.name.clone(),
                    ty: SemType::of(&field.ty),
                    size: field.ty.size_bytes(),
                    offset: 0,
                })
                .collect(),
        };

        let alignment = info.alignment;
        let outcome = self.types.unions.insert(id, info);
        log_insert(&self.types.unions, outcome, id, &decl.name);
        self.types.update_maximum_alignment(alignment);
    }

    fn resolve_enum(&mut self, decl: &TagDecl, promotion_size_bits: u64, enumerators: &[Enumerator]) {
        let id = TypeId::of_canonical(&decl.canonical);
        if !self.types.enums.wants(id, &decl.name) {
            return;
        }

        let mut info = EnumInfo {
            name: decl.name.clone(),
            file: self.resolve_file(&decl.file),
            definition: decl.definition.clone(),
            size: promotion_size_bits / 8,
            alignment: decl.align_bits / 8,
            access: access_of(&decl.parents),
            ..EnumInfo::default()
        };
        for enumerator in enumerators {
            let entry = EnumEntry {
                name: enumerator.name.clone(),
                value: enumerator.value.to_string(),
            };
            info.values_to_entries.insert(entry.value.clone(), entry.clone());
            info.names_to_entries.insert(entry.name.clone(), entry);
        }

        let alignment = info.alignment;
        let outcome = self.types.enums.insert(id, info);
        log_insert(&self.types.enums, outcome, id, &decl.name);
        self.types.update_maximum_alignment(alignment);
    }

    /// A function-pointer field returning `struct T *` needs `T` forward
    /// declared in the generated test source when the unit itself never
    /// declares it.
    fn schedule_return_record(&mut self, unit: &TranslationUnit, fn_ty: &QualType) {
        let TypeShape::Function { ret, .. } = fn_ty.shape() else {
            return;
        };
        if let Some(record) = ret.pointee_record_name() {
            if !unit.declared_records.contains(record) {
                self.declarations.schedule(unit.main_file.clone(), record);
            }
        }
    }

    fn resolve_file(&self, file: &Path) -> PathBuf {
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.build_root.join(file)
        }
    }
}

/// Joins the enclosing named contexts with `::`, outermost first. File
/// scope yields `None`.
fn access_of(parents: &[String]) -> Option<String> {
    let named: Vec<&str> = parents
        .iter()
        .filter(|name| !name.is_empty())
        .map(String::as_str)
        .collect();
    if named.is_empty() {
        return None;
    }
    Some(
        named
            .into_iter()
            .rev()
            .collect::<Vec<&str>>()
            .join("::"),
    )
}

fn signature_of(fn_ty: &QualType, field_name: &str, is_array: bool) -> FunctionSignature {
    let (return_type, params) = match fn_ty.shape() {
        TypeShape::Function { ret, params } => (
            SemType::of(ret),
            params
                .iter()
                .enumerate()
                .map(|(index, param)| FunctionParam {
                    ty: SemType::of(param),
                    name: format!("param{}", index + 1),
                })
                .collect(),
        ),
        _ => (SemType::of(fn_ty), Vec::new()),
    };
    FunctionSignature {
        name: field_name.to_string(),
        return_type,
        params,
        is_array,
    }
}

/// Declarations pulled in from the runner library's own headers never
/// belong to the project model.
fn is_runner_header(path: &Path) -> bool {
    path.components().any(|component| {
        let name = component.as_os_str().to_string_lossy();
        name == "googletest" || name.starts_with("gtest")
    })
}

fn log_insert<T: NamedInfo>(registry: &Registry<T>, outcome: InsertOutcome, id: TypeId, name: &str) {
    match outcome {
        InsertOutcome::Inserted => debug!(%id, name, "registered type"),
        InsertOutcome::ReplacedUnnamed => debug!(%id, name, "replaced unnamed entry with typedef name"),
        InsertOutcome::KeptExisting => debug!(%id, name, "entry already present"),
        InsertOutcome::Collision => {
            let existing = registry.get(id).map(NamedInfo::name).unwrap_or_default();
            warn!(%id, existing, incoming = name, "type name collision, keeping the first");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::frontend::{TagDecl, TagKind};

    fn record_decl(name: &str, canonical: &str, file: &str) -> TagDecl {
        TagDecl {
            name: name.to_string(),
            canonical: canonical.to_string(),
            file: PathBuf::from(file),
            definition: format!("struct {name} {{ int x; }}"),
            size_bits: 32,
            align_bits: 32,
            parents: Vec::new(),
            kind: TagKind::Record {
                fields: Vec::new(),
                is_union: false,
            },
        }
    }

    #[test]
    fn runner_headers_are_dropped() {
        let mut types = ProjectTypes::new();
        let mut declarations = DeclarationPlan::default();
        let mut resolver = TypesResolver::new(&mut types, &mut declarations, "/proj/build");
        let unit = TranslationUnit::new("/proj/a.c");
        resolver.resolve(
            &unit,
            &record_decl("TestInfo", "struct TestInfo", "/utbot/googletest/include/g.h"),
        );
        assert!(types.records.is_empty());
    }

    #[test]
    fn relative_declaration_files_resolve_against_build_root() {
        let mut types = ProjectTypes::new();
        let mut declarations = DeclarationPlan::default();
        let mut resolver = TypesResolver::new(&mut types, &mut declarations, "/proj/build");
        let unit = TranslationUnit::new("/proj/a.c");
        resolver.resolve(&unit, &record_decl("T", "struct T", "sub/a.h"));
        let id = TypeId::of_canonical("struct T");
        assert_eq!(
            types.records.get(id).unwrap().file,
            PathBuf::from("/proj/build/sub/a.h")
        );
    }

    #[test]
    fn access_chain_is_outermost_first() {
        assert_eq!(access_of(&[]), None);
        assert_eq!(
            access_of(&["Inner".to_string(), "Outer".to_string()]),
            Some("Outer::Inner".to_string())
        );
    }
}
