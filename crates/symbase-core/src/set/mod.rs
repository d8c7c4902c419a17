//! # Debug Info Set
//!
//! All symbol and type information of one executable: the symbol arena, the
//! file and synthesized type tables, the field table and the label table,
//! plus the identity stamp used to detect a stale set.
//!
//! A set is filled through its insertion API by a
//! [`DebugInfoSource`](crate::source::DebugInfoSource) during [`DebugInfoSet::load`].
//! Queries live in the [`resolver`](crate::resolver) module as further
//! `impl DebugInfoSet` blocks.
//!
//! ## Example
//!
//! ```rust
//! use symbase_core::set::DebugInfoSet;
//! use symbase_core::types::{Address, BaseType};
//!
//! let mut set = DebugInfoSet::new("/opt/app/controller.elf");
//! set.insert_label("Foo::bar", BaseType::Int32.type_number(), 0x1000).unwrap();
//!
//! assert_eq!(set.address_of_label("Foo::bar", Address::ZERO), Some(Address::new(0x1000)));
//! ```

mod renaming;

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

pub use renaming::{rename_label, RenameRule, RenamingRules};
use tracing::{debug, error, trace};

use crate::error::{SymbaseError, SymbaseResult};
use crate::source::{DebugFormat, DebugInfoSource, ExecutableIdentity, ImageInfo, SectionInfo};
use crate::storage::{sanitize_symbol, SymbolArena, SymbolRef};
use crate::tables::{FieldTable, LabelTable, NodeRef, TypeNode, TypeSpec, TypeTable};
use crate::types::{Address, FieldNumber, TypeKind, TypeNumber, TypeOrigin};

/// How label addresses are stored
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AddressingMode
{
    /// Addresses are the final runtime addresses
    #[default]
    Absolute,
    /// Addresses are offsets from the base the image gets loaded at
    Relative,
}

impl fmt::Display for AddressingMode
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Self::Absolute => write!(f, "absolute"),
            Self::Relative => write!(f, "relative"),
        }
    }
}

/// Owned snapshot of one type node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo
{
    pub number: TypeNumber,
    pub kind: TypeKind,
    pub name: String,
    pub points_to: TypeNumber,
    pub fields: Option<FieldNumber>,
    pub byte_size: u64,
    pub element_count: u64,
    pub compile_unit: u32,
}

/// Table sizes of a debug info set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetCounts
{
    pub types: usize,
    pub synthesized_types: usize,
    pub field_groups: usize,
    pub field_members: usize,
    pub labels: usize,
    pub unplaced_labels: usize,
    pub symbol_bytes: usize,
}

/// Symbol and type database of one executable
#[derive(Debug)]
pub struct DebugInfoSet
{
    executable: PathBuf,
    identity: Option<ExecutableIdentity>,
    image: ImageInfo,
    renaming: Vec<RenameRule>,
    pub(crate) arena: SymbolArena,
    pub(crate) file_types: TypeTable,
    pub(crate) synthesized_types: TypeTable,
    pub(crate) fields: FieldTable,
    pub(crate) labels: LabelTable,
    next_field: u32,
    next_synthesized: u32,
}

/// Characters a stored label may consist of, besides ASCII alphanumerics.
const LABEL_PUNCTUATION: &[char] = &['_', ':', '@', '{', '}'];

fn is_valid_label(name: &str) -> bool
{
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || LABEL_PUNCTUATION.contains(&c))
}

impl DebugInfoSet
{
    /// Create an empty set for `executable`.
    #[must_use]
    pub fn new(executable: impl Into<PathBuf>) -> Self
    {
        Self {
            executable: executable.into(),
            identity: None,
            image: ImageInfo::default(),
            renaming: Vec::new(),
            arena: SymbolArena::new(),
            file_types: TypeTable::new(),
            synthesized_types: TypeTable::new(),
            fields: FieldTable::new(),
            labels: LabelTable::new(),
            next_field: FieldNumber::FIRST.raw(),
            next_synthesized: TypeNumber::SYNTHESIZED_TOP,
        }
    }

    /// Attach the label renaming rules applied by [`insert_label`](Self::insert_label).
    #[must_use]
    pub fn with_renaming(mut self, rules: Vec<RenameRule>) -> Self
    {
        self.renaming = rules;
        self
    }

    /// Load a set that belongs to no process
    ///
    /// ## Errors
    ///
    /// See [`load`](Self::load).
    pub fn load_standalone(path: impl Into<PathBuf>, source: &dyn DebugInfoSource) -> SymbaseResult<Self>
    {
        let mut set = Self::new(path);
        set.load(source)?;
        Ok(set)
    }

    #[must_use]
    pub fn executable(&self) -> &Path
    {
        &self.executable
    }

    /// File name of the executable, the key sets are shared by.
    #[must_use]
    pub fn short_name(&self) -> String
    {
        self.executable
            .file_name()
            .map_or_else(|| self.executable.display().to_string(), |name| name.to_string_lossy().into_owned())
    }

    /// Identity stamp recorded by the last successful load.
    #[must_use]
    pub const fn identity(&self) -> Option<ExecutableIdentity>
    {
        self.identity
    }

    /// `true` once a load succeeded and until the set is cleared.
    #[must_use]
    pub const fn is_loaded(&self) -> bool
    {
        self.identity.is_some()
    }

    #[must_use]
    pub const fn image(&self) -> &ImageInfo
    {
        &self.image
    }

    #[must_use]
    pub fn sections(&self) -> &[SectionInfo]
    {
        &self.image.sections
    }

    #[must_use]
    pub const fn pointer_size(&self) -> u64
    {
        self.image.pointer_size
    }

    #[must_use]
    pub const fn addressing(&self) -> AddressingMode
    {
        self.image.addressing
    }

    #[must_use]
    pub fn renaming(&self) -> &[RenameRule]
    {
        &self.renaming
    }

    /// Replace the image information. Loading sets it from the source.
    pub fn set_image(&mut self, image: ImageInfo)
    {
        self.image = image;
    }

    /// Drop every table and the identity stamp
    ///
    /// The set goes back to the state [`new`](Self::new) left it in. The
    /// executable path and the renaming rules stay.
    pub fn clear(&mut self)
    {
        self.identity = None;
        self.image = ImageInfo::default();
        self.arena = SymbolArena::new();
        self.file_types = TypeTable::new();
        self.synthesized_types = TypeTable::new();
        self.fields = FieldTable::new();
        self.labels = LabelTable::new();
        self.next_field = FieldNumber::FIRST.raw();
        self.next_synthesized = TypeNumber::SYNTHESIZED_TOP;
    }

    /// Clear the set and fill it from `source`
    ///
    /// On failure the set is left empty.
    ///
    /// ## Errors
    ///
    /// - `ExecutableUnreadable`: the identity stamp could not be determined
    /// - `AmbiguousDebugFormat` / `UnsupportedFormat`: no usable debug infos
    /// - `LoadFailed`: parsing or populating failed
    pub fn load(&mut self, source: &dyn DebugInfoSource) -> SymbaseResult<()>
    {
        self.clear();
        let started = Instant::now();
        let identity = source
            .identity(&self.executable)
            .map_err(|err| SymbaseError::ExecutableUnreadable {
                path: self.executable.display().to_string(),
                details: err.to_string(),
            })?;

        match self.populate_from(source) {
            Ok(()) => {
                self.identity = Some(identity);
                let counts = self.counts();
                debug!(
                    executable = %self.executable.display(),
                    types = counts.types,
                    labels = counts.labels,
                    elapsed_ms = started.elapsed().as_millis(),
                    "debug infos loaded"
                );
                Ok(())
            }
            Err(err) => {
                self.clear();
                debug!(executable = %self.executable.display(), error = %err, "debug info load failed");
                Err(match err {
                    source_error @ (SymbaseError::AmbiguousDebugFormat(_)
                    | SymbaseError::UnsupportedFormat(_)
                    | SymbaseError::ExecutableUnreadable { .. }
                    | SymbaseError::LoadFailed { .. }) => source_error,
                    other => SymbaseError::LoadFailed {
                        executable: self.executable.display().to_string(),
                        details: other.to_string(),
                    },
                })
            }
        }
    }

    fn populate_from(&mut self, source: &dyn DebugInfoSource) -> SymbaseResult<()>
    {
        let format = source.detect_format(&self.executable)?;
        if format != DebugFormat::Embedded {
            return Err(SymbaseError::UnsupportedFormat(format!(
                "{} keeps its debug infos in a {format}",
                self.executable.display()
            )));
        }
        let executable = self.executable.clone();
        let image = source.image_info(&executable)?;
        self.image = image.clone();
        source.populate(&executable, &image, self)?;
        self.compute_sizes();
        if !self.check_consistency() {
            return Err(SymbaseError::Internal("table indices out of order after population".into()));
        }
        Ok(())
    }

    /// Store a label with an address
    ///
    /// The renaming rules run first, then the name is sanitized. Names that
    /// end up empty or contain anything but ASCII alphanumerics and `_ : @ { }`
    /// are skipped and `Ok(false)` is returned.
    ///
    /// Sanitizing comes before the check, so template names are accepted:
    /// `Table<int, 4>::size` is stored and looked up as `Table{int@4}::size`.
    ///
    /// `address` is taken as stored: relative to the image base for sets with
    /// [`AddressingMode::Relative`].
    ///
    /// ## Errors
    ///
    /// Storage growth failed.
    pub fn insert_label(&mut self, name: &str, type_number: TypeNumber, address: u64) -> SymbaseResult<bool>
    {
        let Some(symbol) = self.intern_label(name) else {
            return Ok(false);
        };
        self.labels.insert(&self.arena, symbol, type_number, address)?;
        trace!(label = name, address, "label inserted");
        Ok(true)
    }

    /// Store a label that has no address (static member, extern declaration)
    ///
    /// `origin` is the type number of the entry that declared it. Names are
    /// filtered as in [`insert_label`](Self::insert_label).
    ///
    /// ## Errors
    ///
    /// Storage growth failed.
    pub fn insert_unplaced_label(&mut self, name: &str, type_number: TypeNumber, origin: TypeNumber)
        -> SymbaseResult<bool>
    {
        let Some(symbol) = self.intern_label(name) else {
            return Ok(false);
        };
        self.labels.insert_unplaced(symbol, type_number, origin)?;
        Ok(true)
    }

    fn intern_label(&mut self, name: &str) -> Option<SymbolRef>
    {
        let renamed = rename_label(&self.renaming, name);
        let stored = sanitize_symbol(&renamed);
        if !is_valid_label(&stored) {
            trace!(label = name, "label skipped");
            return None;
        }
        Some(self.arena.intern(&stored))
    }

    /// Store a type node in the table its number belongs to
    ///
    /// ## Errors
    ///
    /// - `DuplicateTypeNumber`: the number is taken
    /// - `Internal`: the number is a base code, which has no table entry
    pub fn insert_type(&mut self, spec: TypeSpec) -> SymbaseResult<()>
    {
        let name = self.arena.intern(&spec.name);
        let node = TypeNode::from_spec(&spec, name);
        match spec.number.origin() {
            TypeOrigin::Base => {
                return Err(SymbaseError::Internal(format!(
                    "type number {} is a base code and cannot be inserted",
                    spec.number
                )));
            }
            TypeOrigin::File => self.file_types.insert(node)?,
            TypeOrigin::Synthesized => self.synthesized_types.insert(node)?,
        };
        trace!(number = %spec.number, kind = %spec.kind, name = %spec.name, "type inserted");
        Ok(())
    }

    /// Create an empty member list
    ///
    /// ## Errors
    ///
    /// `DuplicateFieldGroup` if the group exists.
    pub fn insert_field_group(&mut self, number: FieldNumber) -> SymbaseResult<()>
    {
        self.fields.insert_group(number).map(|_| ())
    }

    /// Append a member to a field group
    ///
    /// Members keep their insertion order. A member named `public` is an
    /// embedded base class.
    ///
    /// ## Errors
    ///
    /// `UnknownFieldGroup` if the group was never inserted.
    pub fn insert_field_member(
        &mut self,
        group: FieldNumber,
        name: &str,
        type_number: TypeNumber,
        offset: u64,
    ) -> SymbaseResult<()>
    {
        let name = self.arena.intern(name);
        self.fields.push_member(group, name, type_number, offset).map(|_| ())
    }

    /// Turn a forward declaration into a full struct
    ///
    /// Used when a definition refers back to its declaration and shares its
    /// field group. A non-zero `byte_size` replaces the declared size.
    ///
    /// ## Errors
    ///
    /// `NotADeclaration` if `number` is unknown or not a declaration.
    pub fn resolve_declaration(&mut self, number: TypeNumber, byte_size: u64) -> SymbaseResult<()>
    {
        let table = match number.origin() {
            TypeOrigin::File => &mut self.file_types,
            TypeOrigin::Synthesized => &mut self.synthesized_types,
            TypeOrigin::Base => return Err(SymbaseError::NotADeclaration(number)),
        };
        let Some(slot) = table.find(number) else {
            return Err(SymbaseError::NotADeclaration(number));
        };
        let Some(node) = table.get_mut(slot).filter(|node| node.kind == TypeKind::PreDeclaredStruct) else {
            return Err(SymbaseError::NotADeclaration(number));
        };
        node.kind = TypeKind::Struct;
        if byte_size != 0 {
            node.byte_size = byte_size;
        }
        Ok(())
    }

    /// Hand out the next unused field group number.
    pub fn next_field_number(&mut self) -> FieldNumber
    {
        let number = FieldNumber::from_raw(self.next_field);
        self.next_field += 1;
        number
    }

    /// Hand out the next synthesized type number, counting down
    ///
    /// ## Errors
    ///
    /// `SynthesizedTypesExhausted` once the range is used up.
    pub fn next_synthetic_type_number(&mut self) -> SymbaseResult<TypeNumber>
    {
        if self.next_synthesized < TypeNumber::SYNTHESIZED_BASE {
            return Err(SymbaseError::SynthesizedTypesExhausted);
        }
        let number = TypeNumber::from_raw(self.next_synthesized);
        self.next_synthesized -= 1;
        Ok(number)
    }

    /// Check that every index is ordered by its key
    ///
    /// Violations are logged.
    #[must_use]
    pub fn check_consistency(&self) -> bool
    {
        let checks = [
            ("file types", self.file_types.is_sorted()),
            ("synthesized types", self.synthesized_types.is_sorted()),
            ("field groups", self.fields.is_sorted()),
            ("labels", self.labels.is_sorted(&self.arena)),
        ];
        let mut consistent = true;
        for (index, sorted) in checks {
            if !sorted {
                error!(executable = %self.executable.display(), index, "index out of order");
                consistent = false;
            }
        }
        consistent
    }

    #[must_use]
    pub fn counts(&self) -> SetCounts
    {
        SetCounts {
            types: self.file_types.len(),
            synthesized_types: self.synthesized_types.len(),
            field_groups: self.fields.group_count(),
            field_members: self.fields.member_count(),
            labels: self.labels.len(),
            unplaced_labels: self.labels.unplaced_len(),
            symbol_bytes: self.arena.bytes_used(),
        }
    }

    /// Owned copy of a type table entry. Base codes have no entry.
    #[must_use]
    pub fn type_info(&self, number: TypeNumber) -> Option<TypeInfo>
    {
        let node = self.find_node(number).and_then(|node| self.node(node))?;
        Some(self.describe_node(node))
    }

    /// Find a type by name
    ///
    /// Definitions win over forward declarations. The name is sanitized like
    /// stored names, so `Buffer<int, 4>` finds `Buffer{int@4}`.
    #[must_use]
    pub fn find_type_by_name(&self, name: &str) -> Option<TypeNumber>
    {
        let wanted = sanitize_symbol(name);
        if wanted.is_empty() {
            return None;
        }
        let mut declaration = None;
        for (_, node) in self.file_types.iter_sorted() {
            if self.arena.resolve(node.name) != wanted {
                continue;
            }
            if node.kind != TypeKind::PreDeclaredStruct {
                return Some(node.number);
            }
            declaration.get_or_insert(node.number);
        }
        declaration
    }

    pub(crate) fn describe_node(&self, node: &TypeNode) -> TypeInfo
    {
        TypeInfo {
            number: node.number,
            kind: node.kind,
            name: self.arena.resolve(node.name).to_owned(),
            points_to: node.points_to,
            fields: node.fields,
            byte_size: node.byte_size,
            element_count: node.element_count,
            compile_unit: node.compile_unit,
        }
    }

    pub(crate) fn symbol(&self, symbol: SymbolRef) -> &str
    {
        self.arena.resolve(symbol)
    }

    /// Table position of a type number, without following declarations.
    pub(crate) fn find_node(&self, number: TypeNumber) -> Option<NodeRef>
    {
        match number.origin() {
            TypeOrigin::Base => None,
            TypeOrigin::File => self.file_types.find(number).map(|slot| NodeRef {
                synthesized: false,
                slot,
            }),
            TypeOrigin::Synthesized => self.synthesized_types.find(number).map(|slot| NodeRef {
                synthesized: true,
                slot,
            }),
        }
    }

    pub(crate) fn node(&self, node: NodeRef) -> Option<&TypeNode>
    {
        if node.synthesized {
            self.synthesized_types.get(node.slot)
        } else {
            self.file_types.get(node.slot)
        }
    }

    pub(crate) fn node_mut(&mut self, node: NodeRef) -> Option<&mut TypeNode>
    {
        if node.synthesized {
            self.synthesized_types.get_mut(node.slot)
        } else {
            self.file_types.get_mut(node.slot)
        }
    }

    /// Runtime address to stored address. `None` if it lies below `base`.
    #[must_use]
    pub fn to_stored(&self, address: Address, base: Address) -> Option<u64>
    {
        match self.image.addressing {
            AddressingMode::Absolute => Some(address.value()),
            AddressingMode::Relative => address.offset_from(base),
        }
    }

    /// Stored address to runtime address.
    #[must_use]
    pub fn to_runtime(&self, stored: u64, base: Address) -> Address
    {
        match self.image.addressing {
            AddressingMode::Absolute => Address::new(stored),
            AddressingMode::Relative => base + stored,
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::types::BaseType;

    #[test]
    fn test_renaming_applies_before_interning()
    {
        let mut set = DebugInfoSet::new("app.elf").with_renaming(vec![RenameRule::new("^Mod_", "")]);
        assert!(set.insert_label("Mod_Speed", BaseType::Real32.type_number(), 0x2000).unwrap());
        assert_eq!(set.address_of_label("Speed", Address::ZERO), Some(Address::new(0x2000)));
        assert_eq!(set.address_of_label("Mod_Speed", Address::ZERO), None);
    }

    #[test]
    fn test_invalid_labels_are_skipped()
    {
        let mut set = DebugInfoSet::new("app.elf");
        let int32 = BaseType::Int32.type_number();
        assert!(!set.insert_label("", int32, 0x10).unwrap());
        assert!(!set.insert_label("a.b", int32, 0x10).unwrap());
        assert!(!set.insert_label("$x", int32, 0x10).unwrap());
        assert!(set.insert_label("Table<int, 4>::size", int32, 0x10).unwrap());
        assert_eq!(set.counts().labels, 1);
        assert!(set.address_of_label("Table{int@4}::size", Address::ZERO).is_some());
    }

    #[test]
    fn test_number_generators()
    {
        let mut set = DebugInfoSet::new("app.elf");
        assert_eq!(set.next_field_number(), FieldNumber::FIRST);
        assert_eq!(set.next_field_number().raw(), 0x1000_0001);
        assert_eq!(set.next_synthetic_type_number().unwrap().raw(), 0x7fff_ffff);
        assert_eq!(set.next_synthetic_type_number().unwrap().raw(), 0x7fff_fffe);

        set.next_synthesized = TypeNumber::SYNTHESIZED_BASE;
        assert!(set.next_synthetic_type_number().is_ok());
        assert!(matches!(
            set.next_synthetic_type_number(),
            Err(SymbaseError::SynthesizedTypesExhausted)
        ));
    }

    #[test]
    fn test_insert_type_routes_by_origin()
    {
        let mut set = DebugInfoSet::new("app.elf");
        let int32 = BaseType::Int32.type_number();
        set.insert_type(TypeSpec::pointer(TypeNumber::from_raw(0x1000), int32)).unwrap();
        let synthesized = set.next_synthetic_type_number().unwrap();
        set.insert_type(TypeSpec::array(synthesized, int32, 4)).unwrap();

        let counts = set.counts();
        assert_eq!(counts.types, 1);
        assert_eq!(counts.synthesized_types, 1);
        assert_eq!(set.type_info(synthesized).unwrap().name, "[4]");
        assert!(set.insert_type(TypeSpec::pointer(int32, int32)).is_err());
    }

    #[test]
    fn test_resolve_declaration()
    {
        let mut set = DebugInfoSet::new("app.elf");
        let decl = TypeNumber::from_raw(0x1100);
        let group = set.next_field_number();
        set.insert_field_group(group).unwrap();
        set.insert_type(TypeSpec::declaration(decl, "Motor", group)).unwrap();

        set.resolve_declaration(decl, 16).unwrap();
        let info = set.type_info(decl).unwrap();
        assert_eq!(info.kind, TypeKind::Struct);
        assert_eq!(info.byte_size, 16);

        assert!(matches!(
            set.resolve_declaration(decl, 0),
            Err(SymbaseError::NotADeclaration(n)) if n == decl
        ));
    }

    #[test]
    fn test_find_type_by_name_prefers_definition()
    {
        let mut set = DebugInfoSet::new("app.elf");
        let group = set.next_field_number();
        set.insert_field_group(group).unwrap();
        set.insert_type(TypeSpec::declaration(TypeNumber::from_raw(0x1000), "Motor", group)).unwrap();
        set.insert_type(TypeSpec::structure(TypeNumber::from_raw(0x1200), "Motor", group, 8)).unwrap();

        assert_eq!(set.find_type_by_name("Motor"), Some(TypeNumber::from_raw(0x1200)));
        assert_eq!(set.find_type_by_name("Pump"), None);
    }

    #[test]
    fn test_relative_addressing()
    {
        let mut set = DebugInfoSet::new("lib.so");
        set.set_image(ImageInfo {
            addressing: AddressingMode::Relative,
            ..ImageInfo::default()
        });
        let base = Address::new(0x7f00_0000);
        assert_eq!(set.to_stored(Address::new(0x7f00_1000), base), Some(0x1000));
        assert_eq!(set.to_stored(Address::new(0x10), base), None);
        assert_eq!(set.to_runtime(0x1000, base), Address::new(0x7f00_1000));
    }

    #[test]
    fn test_clear_keeps_renaming()
    {
        let mut set = DebugInfoSet::new("app.elf").with_renaming(vec![RenameRule::new("a", "b")]);
        set.insert_label("x", TypeNumber::VOID, 1).unwrap();
        set.clear();
        assert_eq!(set.counts(), SetCounts::default());
        assert_eq!(set.renaming().len(), 1);
        assert!(!set.is_loaded());
    }
}
