//! Type chain resolution and the size pass.

use once_cell::sync::OnceCell;
use tracing::{debug, error};

use super::MAX_CHAIN_DEPTH;
use crate::set::DebugInfoSet;
use crate::tables::{NodeRef, TypeNode};
use crate::types::{BaseCode, TypeKind, TypeNumber};

/// Terminal of a type chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedType
{
    /// Never `Modifier` or `Typedef`
    pub kind: TypeKind,
    pub number: TypeNumber,
}

impl ResolvedType
{
    fn of_base(number: TypeNumber, code: BaseCode) -> Self
    {
        let kind = match code {
            BaseCode::PointerTo(_) => TypeKind::Pointer,
            BaseCode::Value(_) | BaseCode::Unknown(_) => TypeKind::Base,
        };
        Self { kind, number }
    }
}

impl DebugInfoSet
{
    /// Table entry for `number`, with forward declarations redirected to
    /// their definition
    ///
    /// A definition from the declaration's compile unit is preferred. A
    /// declaration without any definition resolves to itself.
    pub(crate) fn lookup_node(&self, number: TypeNumber) -> Option<NodeRef>
    {
        let found = self.find_node(number)?;
        let node = self.node(found)?;
        if node.kind != TypeKind::PreDeclaredStruct {
            return Some(found);
        }
        if let Some(target) = node.target.get() {
            return Some(*target);
        }
        let Some(definition) = self.find_definition(node) else {
            return Some(found);
        };
        let _ = node.target.set(definition);
        Some(definition)
    }

    fn find_definition(&self, declaration: &TypeNode) -> Option<NodeRef>
    {
        let name = self.symbol(declaration.name);
        let mut fallback = None;
        for (slot, node) in self.file_types.iter_sorted() {
            if node.kind != TypeKind::Struct || self.symbol(node.name) != name {
                continue;
            }
            let candidate = NodeRef {
                synthesized: false,
                slot,
            };
            if node.compile_unit == declaration.compile_unit {
                return Some(candidate);
            }
            fallback.get_or_insert(candidate);
        }
        fallback
    }

    /// [`lookup_node`](Self::lookup_node) through a cache cell. Misses are not cached.
    pub(crate) fn cached_lookup(&self, cell: &OnceCell<NodeRef>, number: TypeNumber) -> Option<NodeRef>
    {
        if let Some(cached) = cell.get() {
            return Some(*cached);
        }
        let found = self.lookup_node(number)?;
        let _ = cell.set(found);
        Some(found)
    }

    /// Follow modifiers and typedefs to the terminal type
    ///
    /// Pointer base codes resolve to `Pointer`, all other base codes to
    /// `Base`. Returns `None` for unknown numbers and for chains longer than
    /// [`MAX_CHAIN_DEPTH`].
    ///
    /// ## Example
    ///
    /// ```rust
    /// use symbase_core::set::DebugInfoSet;
    /// use symbase_core::tables::TypeSpec;
    /// use symbase_core::types::{BaseType, TypeKind, TypeNumber};
    ///
    /// let mut set = DebugInfoSet::new("app.elf");
    /// let speed = TypeNumber::from_raw(0x1000);
    /// set.insert_type(TypeSpec::typedef(speed, "Speed", BaseType::Real32.type_number())).unwrap();
    ///
    /// let resolved = set.resolve_type(speed).unwrap();
    /// assert_eq!(resolved.kind, TypeKind::Base);
    /// assert_eq!(resolved.number, BaseType::Real32.type_number());
    /// ```
    #[must_use]
    pub fn resolve_type(&self, number: TypeNumber) -> Option<ResolvedType>
    {
        if let Some(code) = BaseCode::decode(number) {
            return Some(ResolvedType::of_base(number, code));
        }
        let start = self.lookup_node(number)?;
        self.resolve_from(start)
    }

    /// Resolve through the cache cell of a label or member.
    pub(crate) fn resolve_cached(&self, cell: &OnceCell<NodeRef>, number: TypeNumber) -> Option<ResolvedType>
    {
        if let Some(code) = BaseCode::decode(number) {
            return Some(ResolvedType::of_base(number, code));
        }
        let start = self.cached_lookup(cell, number)?;
        self.resolve_from(start)
    }

    fn resolve_from(&self, start: NodeRef) -> Option<ResolvedType>
    {
        let mut current = start;
        for _ in 0..MAX_CHAIN_DEPTH {
            let node = self.node(current)?;
            if !node.kind.is_transparent() {
                return Some(ResolvedType {
                    kind: node.kind,
                    number: node.number,
                });
            }
            if let Some(code) = BaseCode::decode(node.points_to) {
                return Some(ResolvedType::of_base(node.points_to, code));
            }
            current = self.cached_lookup(&node.target, node.points_to)?;
        }
        error!(
            executable = %self.executable().display(),
            start = %self.node(start).map_or(TypeNumber::UNKNOWN, |node| node.number),
            "type chain exceeds {MAX_CHAIN_DEPTH} links"
        );
        None
    }

    /// Kind of the terminal type.
    #[must_use]
    pub fn type_kind(&self, number: TypeNumber) -> Option<TypeKind>
    {
        self.resolve_type(number).map(|resolved| resolved.kind)
    }

    /// Size of a type in bytes
    ///
    /// Served from the sizes cached by the load. Unknown numbers give `None`.
    #[must_use]
    pub fn type_size(&self, number: TypeNumber) -> Option<u64>
    {
        self.size_of(number, 0)
    }

    pub(crate) fn size_of(&self, number: TypeNumber, depth: usize) -> Option<u64>
    {
        if let Some(code) = BaseCode::decode(number) {
            return Some(code.size(self.pointer_size()));
        }
        if depth >= MAX_CHAIN_DEPTH {
            error!(number = %number, "size computation exceeds {MAX_CHAIN_DEPTH} levels");
            return None;
        }
        let Some(node) = self.lookup_node(number).and_then(|found| self.node(found)) else {
            error!(executable = %self.executable().display(), number = %number, "size of unknown type");
            return None;
        };
        match node.kind {
            TypeKind::Pointer => Some(self.pointer_size()),
            TypeKind::Struct | TypeKind::PreDeclaredStruct | TypeKind::Base => Some(node.byte_size),
            TypeKind::Modifier | TypeKind::Typedef => {
                if node.byte_size != 0 {
                    return Some(node.byte_size);
                }
                self.size_of(node.points_to, depth + 1)
            }
            TypeKind::Array => {
                if node.byte_size != 0 {
                    return Some(node.byte_size);
                }
                let element = self.size_of(node.points_to, depth + 1)?;
                Some(element.saturating_mul(node.element_count))
            }
        }
    }

    /// Fill in the byte size of every node and the element count of arrays
    /// that only declared a size
    pub(crate) fn compute_sizes(&mut self)
    {
        let mut updates = Vec::new();
        let tables = [(false, &self.file_types), (true, &self.synthesized_types)];
        for (synthesized, table) in tables {
            for (slot, node) in table.iter_sorted() {
                let node_ref = NodeRef { synthesized, slot };
                match node.kind {
                    TypeKind::Array => {
                        let Some(element) = self.size_of(node.points_to, 1) else {
                            continue;
                        };
                        if node.byte_size == 0 {
                            updates.push((node_ref, element.saturating_mul(node.element_count), node.element_count));
                        } else if node.element_count == 0 && element != 0 {
                            updates.push((node_ref, node.byte_size, node.byte_size / element));
                        }
                    }
                    TypeKind::Pointer | TypeKind::Modifier | TypeKind::Typedef if node.byte_size == 0 => {
                        if let Some(size) = self.size_of(node.number, 0) {
                            updates.push((node_ref, size, node.element_count));
                        }
                    }
                    _ => {}
                }
            }
        }

        let updated = updates.len();
        for (node_ref, byte_size, element_count) in updates {
            if let Some(node) = self.node_mut(node_ref) {
                node.byte_size = byte_size;
                node.element_count = element_count;
            }
        }
        debug!(executable = %self.executable().display(), updated, "type sizes computed");
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::tables::TypeSpec;
    use crate::types::BaseType;

    fn n(raw: u32) -> TypeNumber
    {
        TypeNumber::from_raw(raw)
    }

    /// const -> typedef -> pointer -> int32
    fn chain_set() -> DebugInfoSet
    {
        let mut set = DebugInfoSet::new("app.elf");
        set.insert_type(TypeSpec::modifier(n(0x1000), "const", n(0x1100))).unwrap();
        set.insert_type(TypeSpec::typedef(n(0x1100), "IntPtr", n(0x1200))).unwrap();
        set.insert_type(TypeSpec::pointer(n(0x1200), BaseType::Int32.type_number())).unwrap();
        set
    }

    #[test]
    fn test_chain_resolution_is_cached_and_idempotent()
    {
        let set = chain_set();
        let first = set.resolve_type(n(0x1000)).unwrap();
        assert_eq!(first.kind, TypeKind::Pointer);
        assert_eq!(first.number, n(0x1200));

        let head = set.find_node(n(0x1000)).and_then(|found| set.node(found)).unwrap();
        assert!(head.is_resolved());
        assert_eq!(set.resolve_type(n(0x1000)), Some(first));
    }

    #[test]
    fn test_base_codes_resolve_without_table()
    {
        let set = DebugInfoSet::new("app.elf");
        let int32 = BaseType::Int32.type_number();
        assert_eq!(set.resolve_type(int32).unwrap().kind, TypeKind::Base);
        assert_eq!(set.resolve_type(BaseType::Int32.pointer_type_number()).unwrap().kind, TypeKind::Pointer);
        assert_eq!(set.type_size(int32), Some(4));
        assert!(set.resolve_type(n(0x5000)).is_none());
    }

    #[test]
    fn test_cyclic_chain_gives_up()
    {
        let mut set = DebugInfoSet::new("app.elf");
        set.insert_type(TypeSpec::typedef(n(0x1000), "A", n(0x1001))).unwrap();
        set.insert_type(TypeSpec::typedef(n(0x1001), "B", n(0x1000))).unwrap();
        assert!(set.resolve_type(n(0x1000)).is_none());
        assert!(set.type_size(n(0x1000)).is_none());
    }

    #[test]
    fn test_declaration_prefers_same_compile_unit()
    {
        let mut set = DebugInfoSet::new("app.elf");
        let group = set.next_field_number();
        set.insert_field_group(group).unwrap();
        set.insert_type(TypeSpec::structure(n(0x1000), "Motor", group, 8).in_unit(1)).unwrap();
        set.insert_type(TypeSpec::structure(n(0x2000), "Motor", group, 12).in_unit(2)).unwrap();
        set.insert_type(TypeSpec::declaration(n(0x2100), "Motor", group).in_unit(2)).unwrap();
        set.insert_type(TypeSpec::declaration(n(0x3000), "Motor", group).in_unit(3)).unwrap();
        set.insert_type(TypeSpec::declaration(n(0x3100), "Pump", group).in_unit(3)).unwrap();

        assert_eq!(set.resolve_type(n(0x2100)).unwrap().number, n(0x2000));
        assert_eq!(set.resolve_type(n(0x3000)).unwrap().number, n(0x1000));
        let orphan = set.resolve_type(n(0x3100)).unwrap();
        assert_eq!(orphan.kind, TypeKind::PreDeclaredStruct);
        assert_eq!(orphan.number, n(0x3100));
    }

    #[test]
    fn test_compute_sizes_derives_array_size_and_count()
    {
        let mut set = chain_set();
        let int16 = BaseType::Int16.type_number();
        set.insert_type(TypeSpec::array(n(0x1300), int16, 10)).unwrap();
        set.insert_type(TypeSpec::array(n(0x1400), int16, 0).with_size(12)).unwrap();
        set.compute_sizes();

        assert_eq!(set.type_info(n(0x1300)).unwrap().byte_size, 20);
        assert_eq!(set.type_info(n(0x1400)).unwrap().element_count, 6);
        assert_eq!(set.type_info(n(0x1000)).unwrap().byte_size, 4);
        assert_eq!(set.type_size(n(0x1100)), Some(4));
    }
}
