//! The parsing frontend's output, as consumed by the type resolver.
//!
//! An external frontend parses each translation unit and hands the core a
//! canonical projection of its tag declarations: names, definition text,
//! layout in bits, and qualified types carrying both the canonical and the
//! used spelling. The core never parses source itself and never mutates
//! these nodes; the resolver copies what it retains into owned data.

use std::path::PathBuf;

use indexmap::IndexSet;

/// Structural shape of a type, deep enough to recognize function-pointer
/// fields and to look through pointers and arrays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeShape {
    /// Builtin or otherwise opaque type; no structure the resolver needs.
    Scalar,
    Record { name: String },
    Enum { name: String },
    Pointer(Box<QualType>),
    Array(Box<QualType>),
    Function {
        ret: Box<QualType>,
        params: Vec<QualType>,
    },
}

/// A qualified type as the frontend printed it: canonical (sugar-free)
/// form, the spelling used at the occurrence, and layout in bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualType {
    canonical: String,
    spelling: String,
    size_bits: u64,
    align_bits: u64,
    shape: TypeShape,
}

impl QualType {
    pub fn new(
        canonical: impl Into<String>,
        spelling: impl Into<String>,
        size_bits: u64,
        align_bits: u64,
        shape: TypeShape,
    ) -> Self {
        Self {
            canonical: canonical.into(),
            spelling: spelling.into(),
            size_bits,
            align_bits,
            shape,
        }
    }

    /// Scalar with identical canonical and used spelling.
    pub fn scalar(name: &str, size_bits: u64, align_bits: u64) -> Self {
        Self::new(name, name, size_bits, align_bits, TypeShape::Scalar)
    }

    /// 64-bit pointer to `pointee`.
    pub fn pointer(pointee: QualType) -> Self {
        Self::new(
            format!("{} *", pointee.canonical),
            format!("{} *", pointee.spelling),
            64,
            64,
            TypeShape::Pointer(Box::new(pointee)),
        )
    }

    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    pub fn spelling(&self) -> &str {
        &self.spelling
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bits / 8
    }

    pub fn align_bytes(&self) -> u64 {
        self.align_bits / 8
    }

    pub fn shape(&self) -> &TypeShape {
        &self.shape
    }

    pub fn is_pointer_to_function(&self) -> bool {
        matches!(&self.shape, TypeShape::Pointer(pointee)
            if matches!(pointee.shape, TypeShape::Function { .. }))
    }

    pub fn is_array_of_pointers_to_function(&self) -> bool {
        matches!(&self.shape, TypeShape::Array(element) if element.is_pointer_to_function())
    }

    /// The function type behind a function-pointer field, looking through
    /// one array level for arrays of function pointers.
    pub fn function_behind_pointer(&self) -> Option<&QualType> {
        match &self.shape {
            TypeShape::Pointer(pointee) => {
                matches!(pointee.shape, TypeShape::Function { .. }).then(|| pointee.as_ref())
            }
            TypeShape::Array(element) => element.function_behind_pointer(),
            _ => None,
        }
    }

    /// For `T *`, the record name of `T` when it is a record.
    pub fn pointee_record_name(&self) -> Option<&str> {
        match &self.shape {
            TypeShape::Pointer(pointee) => match &pointee.shape {
                TypeShape::Record { name } => Some(name),
                _ => None,
            },
            _ => None,
        }
    }
}

/// A field of a record or union declaration.
#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub name: String,
    pub ty: QualType,
    pub offset_bits: u64,
}

#[derive(Debug, Clone)]
pub struct Enumerator {
    pub name: String,
    pub value: i64,
}

#[derive(Debug, Clone)]
pub enum TagKind {
    Record {
        fields: Vec<FieldDecl>,
        is_union: bool,
    },
    Enum {
        promotion_size_bits: u64,
        enumerators: Vec<Enumerator>,
    },
}

/// A tag declaration (struct, class, union or enum) as parsed.
#[derive(Debug, Clone)]
pub struct TagDecl {
    /// Declared name; empty for anonymous declarations.
    pub name: String,
    /// Canonical printed form of the tag's type, the identity key.
    pub canonical: String,
    /// File containing the spelling location of the declaration.
    pub file: PathBuf,
    /// Source-range text of the declaration.
    pub definition: String,
    pub size_bits: u64,
    pub align_bits: u64,
    /// Enclosing named declaration contexts, innermost first.
    pub parents: Vec<String>,
    pub kind: TagKind,
}

/// One parsed translation unit: its main file, the tag declarations the
/// frontend visited, and the record names already declared in the unit.
#[derive(Debug, Clone)]
pub struct TranslationUnit {
    pub main_file: PathBuf,
    pub tags: Vec<TagDecl>,
    pub declared_records: IndexSet<String>,
}

impl TranslationUnit {
    pub fn new(main_file: impl Into<PathBuf>) -> Self {
        Self {
            main_file: main_file.into(),
            tags: Vec::new(),
            declared_records: IndexSet::new(),
        }
    }
}
