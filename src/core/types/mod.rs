//! Identity-keyed registries for the project's user-defined aggregate
//! types: records, enumerations and unions.
//!
//! The key is a 64-bit identity derived from the canonical (sugar-free)
//! printed form of the type, so the same underlying type reached through
//! different spellings collapses into one entry. Entries accumulate
//! monotonically during a resolution pass and are read-only afterwards.

pub mod resolver;

use std::fmt;
use std::path::PathBuf;

use indexmap::IndexMap;
use indexmap::map::Entry;
use xxhash_rust::xxh3::xxh3_64;

use crate::core::frontend::QualType;

/// Stable identity of a canonical type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(u64);

impl TypeId {
    pub fn of_canonical(canonical: &str) -> Self {
        Self(xxh3_64(canonical.as_bytes()))
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// A semantic type as retained by the registry: canonical form plus the
/// spelling used at the occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemType {
    pub canonical: String,
    pub spelling: String,
}

impl SemType {
    pub fn new(canonical: impl Into<String>, spelling: impl Into<String>) -> Self {
        Self {
            canonical: canonical.into(),
            spelling: spelling.into(),
        }
    }

    pub fn of(ty: &QualType) -> Self {
        Self::new(ty.canonical(), ty.spelling())
    }
}

/// A record or union field. `offset` is meaningful for records only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub ty: SemType,
    /// Size in bytes.
    pub size: u64,
    /// Offset in bytes from the start of the record.
    pub offset: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionParam {
    pub ty: SemType,
    pub name: String,
}

/// Synthesized descriptor for a function pointer crossing an ABI boundary
/// in generated code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSignature {
    pub name: String,
    pub return_type: SemType,
    pub params: Vec<FunctionParam>,
    pub is_array: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordInfo {
    pub name: String,
    pub file: PathBuf,
    pub definition: String,
    /// Size in bytes.
    pub size: u64,
    /// Alignment in bytes.
    pub alignment: u64,
    pub fields: Vec<Field>,
    /// Function-pointer fields by field name.
    pub function_fields: IndexMap<String, FunctionSignature>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumEntry {
    pub name: String,
    /// Stringified signed value.
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnumInfo {
    pub name: String,
    pub file: PathBuf,
    pub definition: String,
    /// Size in bytes of the promotion type.
    pub size: u64,
    pub alignment: u64,
    /// `::`-joined enclosing named contexts, outermost first; `None` at
    /// file scope.
    pub access: Option<String>,
    pub names_to_entries: IndexMap<String, EnumEntry>,
    pub values_to_entries: IndexMap<String, EnumEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnionInfo {
    pub name: String,
    pub file: PathBuf,
    pub definition: String,
    pub size: u64,
    pub alignment: u64,
    pub fields: Vec<Field>,
}

/// Anything the generic registry policy can be expressed over.
pub trait NamedInfo {
    fn name(&self) -> &str;
}

impl NamedInfo for RecordInfo {
    fn name(&self) -> &str {
        &self.name
    }
}

impl NamedInfo for EnumInfo {
    fn name(&self) -> &str {
        &self.name
    }
}

impl NamedInfo for UnionInfo {
    fn name(&self) -> &str {
        &self.name
    }
}

/// What an insertion did; collisions keep the first entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// An unnamed entry was replaced by a named one for the same id.
    ReplacedUnnamed,
    /// The existing entry already wins; nothing changed.
    KeptExisting,
    /// Two differing non-empty names for one id. Reported, not overwritten.
    Collision,
}

/// Keyed table with the first-non-empty-name-wins insertion policy shared
/// by records, enums and unions.
#[derive(Debug, Clone, Default)]
pub struct Registry<T> {
    entries: IndexMap<u64, T>,
}

impl<T: NamedInfo> Registry<T> {
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    /// Whether resolving a declaration with this id and name would change
    /// the registry. Lets the resolver skip work for ids that already
    /// carry a non-empty name.
    pub fn wants(&self, id: TypeId, name: &str) -> bool {
        match self.entries.get(&id.value()) {
            Some(existing) => existing.name().is_empty() && !name.is_empty(),
            None => true,
        }
    }

    pub fn insert(&mut self, id: TypeId, info: T) -> InsertOutcome {
        match self.entries.entry(id.value()) {
            Entry::Vacant(slot) => {
                slot.insert(info);
                InsertOutcome::Inserted
            }
            Entry::Occupied(mut slot) => {
                let existing = slot.get().name();
                if existing.is_empty() && !info.name().is_empty() {
                    slot.insert(info);
                    InsertOutcome::ReplacedUnnamed
                } else if info.name().is_empty() || existing == info.name() {
                    InsertOutcome::KeptExisting
                } else {
                    InsertOutcome::Collision
                }
            }
        }
    }

    pub fn get(&self, id: TypeId) -> Option<&T> {
        self.entries.get(&id.value())
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &T)> {
        self.entries.iter().map(|(&id, info)| (TypeId(id), info))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// All registries of one resolution pass plus the cross-cutting maximum
/// alignment observed over every inserted entry.
#[derive(Debug, Clone, Default)]
pub struct ProjectTypes {
    pub records: Registry<RecordInfo>,
    pub enums: Registry<EnumInfo>,
    pub unions: Registry<UnionInfo>,
    pub maximum_alignment: u64,
}

impl ProjectTypes {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn update_maximum_alignment(&mut self, alignment: u64) {
        self.maximum_alignment = self.maximum_alignment.max(alignment);
    }
}
