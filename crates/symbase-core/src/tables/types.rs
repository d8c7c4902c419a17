//! Type nodes and the type table.

use std::cmp::Ordering;

use once_cell::sync::OnceCell;

use crate::error::{SymbaseError, SymbaseResult};
use crate::storage::{floor_search, BlockVec, SymbolRef};
use crate::types::{FieldNumber, TypeKind, TypeNumber};

/// Resolved location of a type node: which table and which storage slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef
{
    pub(crate) synthesized: bool,
    pub(crate) slot: u32,
}

/// One type record
///
/// Which fields are meaningful depends on [`kind`](Self::kind):
///
/// | kind | `points_to` | `fields` | sizes |
/// |------|-------------|----------|-------|
/// | Struct | - | member list | `byte_size` |
/// | Array | element type | - | `byte_size`, `element_count` |
/// | Pointer | pointee | - | - |
/// | Modifier / Typedef | underlying type | - | - |
/// | PreDeclaredStruct | - | member list of the declaration | - |
#[derive(Debug)]
pub struct TypeNode
{
    pub(crate) number: TypeNumber,
    pub(crate) kind: TypeKind,
    pub(crate) name: SymbolRef,
    pub(crate) points_to: TypeNumber,
    pub(crate) fields: Option<FieldNumber>,
    pub(crate) compile_unit: u32,
    pub(crate) byte_size: u64,
    pub(crate) element_count: u64,
    /// Node `points_to` resolves to, or for a declaration the definition it
    /// redirects to. Only successful lookups are cached.
    pub(crate) target: OnceCell<NodeRef>,
    /// Storage slot of the field group named by `fields`.
    pub(crate) field_group: OnceCell<u32>,
}

impl TypeNode
{
    #[must_use]
    pub const fn number(&self) -> TypeNumber
    {
        self.number
    }

    #[must_use]
    pub const fn kind(&self) -> TypeKind
    {
        self.kind
    }

    #[must_use]
    pub const fn points_to(&self) -> TypeNumber
    {
        self.points_to
    }

    #[must_use]
    pub const fn fields(&self) -> Option<FieldNumber>
    {
        self.fields
    }

    #[must_use]
    pub const fn byte_size(&self) -> u64
    {
        self.byte_size
    }

    #[must_use]
    pub const fn element_count(&self) -> u64
    {
        self.element_count
    }

    #[must_use]
    pub const fn compile_unit(&self) -> u32
    {
        self.compile_unit
    }

    /// `true` once the node's reference has been looked up and cached.
    #[must_use]
    pub fn is_resolved(&self) -> bool
    {
        self.target.get().is_some() || self.field_group.get().is_some()
    }
}

/// Description of a type node handed to
/// [`DebugInfoSet::insert_type`](crate::set::DebugInfoSet::insert_type)
///
/// ## Example
///
/// ```rust
/// use symbase_core::tables::TypeSpec;
/// use symbase_core::types::{BaseType, TypeNumber};
///
/// let counter = TypeSpec::typedef(TypeNumber::from_raw(0x1010), "counter_t", BaseType::UInt32.type_number());
/// let table = TypeSpec::array(TypeNumber::from_raw(0x1020), counter.number, 16).in_unit(3);
/// assert_eq!(table.element_count, 16);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSpec
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

impl TypeSpec
{
    fn new(number: TypeNumber, kind: TypeKind, name: String, points_to: TypeNumber) -> Self
    {
        Self {
            number,
            kind,
            name,
            points_to,
            fields: None,
            byte_size: 0,
            element_count: 0,
            compile_unit: 0,
        }
    }

    /// Qualifier (`const`, `volatile`) or nameless wrapper around a base code.
    #[must_use]
    pub fn modifier(number: TypeNumber, name: impl Into<String>, target: TypeNumber) -> Self
    {
        Self::new(number, TypeKind::Modifier, name.into(), target)
    }

    #[must_use]
    pub fn typedef(number: TypeNumber, name: impl Into<String>, target: TypeNumber) -> Self
    {
        Self::new(number, TypeKind::Typedef, name.into(), target)
    }

    #[must_use]
    pub fn pointer(number: TypeNumber, pointee: TypeNumber) -> Self
    {
        Self::new(number, TypeKind::Pointer, String::new(), pointee)
    }

    /// One array dimension of `element_count` elements.
    ///
    /// The byte size is derived after loading unless set with
    /// [`with_size`](Self::with_size).
    #[must_use]
    pub fn array(number: TypeNumber, element: TypeNumber, element_count: u64) -> Self
    {
        let mut spec = Self::new(number, TypeKind::Array, format!("[{element_count}]"), element);
        spec.element_count = element_count;
        spec
    }

    /// Struct, class or union whose members live in field group `fields`.
    #[must_use]
    pub fn structure(number: TypeNumber, name: impl Into<String>, fields: FieldNumber, byte_size: u64) -> Self
    {
        let mut spec = Self::new(number, TypeKind::Struct, name.into(), TypeNumber::VOID);
        spec.fields = Some(fields);
        spec.byte_size = byte_size;
        spec
    }

    /// Forward declaration of a struct, completed later or defined elsewhere.
    #[must_use]
    pub fn declaration(number: TypeNumber, name: impl Into<String>, fields: FieldNumber) -> Self
    {
        let mut spec = Self::new(number, TypeKind::PreDeclaredStruct, name.into(), TypeNumber::VOID);
        spec.fields = Some(fields);
        spec
    }

    /// Compile unit the type was declared in.
    #[must_use]
    pub const fn in_unit(mut self, compile_unit: u32) -> Self
    {
        self.compile_unit = compile_unit;
        self
    }

    #[must_use]
    pub const fn with_size(mut self, byte_size: u64) -> Self
    {
        self.byte_size = byte_size;
        self
    }
}

/// Type nodes sorted by type number
#[derive(Debug)]
pub(crate) struct TypeTable
{
    nodes: BlockVec<TypeNode>,
    index: Vec<u32>,
}

impl TypeTable
{
    pub(crate) const fn new() -> Self
    {
        Self {
            nodes: BlockVec::new(),
            index: Vec::new(),
        }
    }

    pub(crate) fn len(&self) -> usize
    {
        self.index.len()
    }

    fn number_at(&self, pos: usize) -> Option<TypeNumber>
    {
        let slot = *self.index.get(pos)?;
        self.nodes.get(slot).map(|node| node.number)
    }

    /// Insert a node, keeping the index sorted.
    pub(crate) fn insert(&mut self, node: TypeNode) -> SymbaseResult<u32>
    {
        let number = node.number;
        let pos = self
            .index
            .partition_point(|slot| self.nodes.get(*slot).is_some_and(|existing| existing.number < number));
        if self.number_at(pos) == Some(number) {
            return Err(SymbaseError::DuplicateTypeNumber(number));
        }
        let slot = self.nodes.push(node)?;
        self.index.insert(pos, slot);
        Ok(slot)
    }

    /// Storage slot of the node with `number`.
    pub(crate) fn find(&self, number: TypeNumber) -> Option<u32>
    {
        let pos = floor_search(self.index.len(), |pos| {
            self.number_at(pos).map_or(Ordering::Less, |candidate| candidate.cmp(&number))
        })?;
        (self.number_at(pos) == Some(number)).then(|| self.index[pos])
    }

    pub(crate) fn get(&self, slot: u32) -> Option<&TypeNode>
    {
        self.nodes.get(slot)
    }

    pub(crate) fn get_mut(&mut self, slot: u32) -> Option<&mut TypeNode>
    {
        self.nodes.get_mut(slot)
    }

    /// Nodes in type number order, with their storage slots.
    pub(crate) fn iter_sorted(&self) -> impl Iterator<Item = (u32, &TypeNode)>
    {
        self.index
            .iter()
            .filter_map(|slot| self.nodes.get(*slot).map(|node| (*slot, node)))
    }

    /// `true` if the index is strictly ordered by type number.
    pub(crate) fn is_sorted(&self) -> bool
    {
        let numbers: Vec<_> = self.iter_sorted().map(|(_, node)| node.number).collect();
        numbers.len() == self.index.len() && numbers.windows(2).all(|pair| pair[0] < pair[1])
    }
}

impl TypeNode
{
    pub(crate) fn from_spec(spec: &TypeSpec, name: SymbolRef) -> Self
    {
        Self {
            number: spec.number,
            kind: spec.kind,
            name,
            points_to: spec.points_to,
            fields: spec.fields,
            compile_unit: spec.compile_unit,
            byte_size: spec.byte_size,
            element_count: spec.element_count,
            target: OnceCell::new(),
            field_group: OnceCell::new(),
        }
    }
}
