//! Pointer targets, array layout and struct members.

use smallvec::SmallVec;
use tracing::error;

use super::{ResolvedType, MAX_NESTING};
use crate::set::DebugInfoSet;
use crate::tables::{FieldMember, TypeNode};
use crate::types::{BaseCode, TypeKind, TypeNumber};

/// Member name that marks an embedded base class.
pub(crate) const BASE_CLASS_MEMBER: &str = "public";

/// What a pointer or array refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointsTo
{
    /// Pointee or element type as declared (may be a modifier or typedef)
    pub declared: TypeNumber,
    pub resolved: ResolvedType,
}

/// Element type, element size and element count of one array dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayLayout
{
    /// Element type as declared. For multi-dimensional arrays this is the
    /// next dimension.
    pub element: TypeNumber,
    pub element_kind: TypeKind,
    pub element_size: u64,
    pub element_count: u64,
}

/// A member returned by [`DebugInfoSet::next_struct_entry`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructEntry
{
    pub name: String,
    pub type_number: TypeNumber,
    /// Byte offset from the start of the outermost struct
    pub offset: u64,
    /// Base class this member was inherited from
    pub inherited_from: Option<TypeNumber>,
}

/// Member found by [`DebugInfoSet::struct_elem_by_offset`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberHit
{
    pub name: String,
    pub type_number: TypeNumber,
    /// Byte offset of the member from the start of the struct
    pub offset: u64,
    pub base_class: Option<TypeNumber>,
}

#[derive(Debug, Clone, Copy)]
struct MemberFrame
{
    next: Option<u32>,
    remaining: u32,
    base_offset: u64,
    inherited: Option<TypeNumber>,
}

/// Position of a member walk
///
/// Create one per walk and hand it to
/// [`next_struct_entry`](DebugInfoSet::next_struct_entry) until it returns
/// `None`. [`reset`](Self::reset) restarts the walk.
#[derive(Debug, Clone, Default)]
pub struct StructCursor
{
    frames: SmallVec<[MemberFrame; 4]>,
    started: bool,
}

impl StructCursor
{
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    pub fn reset(&mut self)
    {
        self.frames.clear();
        self.started = false;
    }
}

impl DebugInfoSet
{
    /// Pointee of a pointer or element of an array
    ///
    /// Modifiers and typedefs in front of `number` are followed first.
    /// Pointer base codes point to their base type.
    #[must_use]
    pub fn points_to(&self, number: TypeNumber) -> Option<PointsTo>
    {
        let resolved = self.resolve_type(number)?;
        let declared = match BaseCode::decode(resolved.number) {
            Some(BaseCode::PointerTo(base)) => base.type_number(),
            Some(_) => return None,
            None => {
                let node = self.resolved_node(resolved)?;
                if !matches!(node.kind, TypeKind::Pointer | TypeKind::Array) {
                    return None;
                }
                node.points_to
            }
        };
        Some(PointsTo {
            declared,
            resolved: self.resolve_type(declared)?,
        })
    }

    /// Layout of the outermost dimension of an array type.
    #[must_use]
    pub fn array_layout(&self, number: TypeNumber) -> Option<ArrayLayout>
    {
        let resolved = self.resolve_type(number)?;
        if resolved.kind != TypeKind::Array {
            return None;
        }
        let node = self.resolved_node(resolved)?;
        let element_kind = self.resolve_cached(&node.target, node.points_to)?.kind;
        Some(ArrayLayout {
            element: node.points_to,
            element_kind,
            element_size: self.type_size(node.points_to)?,
            element_count: node.element_count,
        })
    }

    #[must_use]
    pub fn array_element_count(&self, number: TypeNumber) -> Option<u64>
    {
        self.array_layout(number).map(|layout| layout.element_count)
    }

    /// Number of direct members, base class entries included.
    #[must_use]
    pub fn struct_member_count(&self, number: TypeNumber) -> Option<u32>
    {
        let group = self.struct_group(number)?;
        self.fields.group(group).map(|group| group.member_count())
    }

    /// Next member of a struct walk
    ///
    /// Members come in declaration order. Base class entries (members named
    /// `public`) are not returned themselves; their members are spliced in
    /// at the base class offset and carry `inherited_from`.
    ///
    /// ## Example
    ///
    /// ```rust
    /// use symbase_core::resolver::StructCursor;
    /// use symbase_core::set::DebugInfoSet;
    /// use symbase_core::tables::TypeSpec;
    /// use symbase_core::types::{BaseType, TypeNumber};
    ///
    /// let mut set = DebugInfoSet::new("app.elf");
    /// let fields = set.next_field_number();
    /// set.insert_field_group(fields).unwrap();
    /// set.insert_field_member(fields, "rpm", BaseType::Int32.type_number(), 0).unwrap();
    /// set.insert_field_member(fields, "load", BaseType::Real32.type_number(), 4).unwrap();
    /// let motor = TypeNumber::from_raw(0x1000);
    /// set.insert_type(TypeSpec::structure(motor, "Motor", fields, 8)).unwrap();
    ///
    /// let mut cursor = StructCursor::new();
    /// let mut names = Vec::new();
    /// while let Some(entry) = set.next_struct_entry(motor, &mut cursor) {
    ///     names.push((entry.name, entry.offset));
    /// }
    /// assert_eq!(names, vec![("rpm".to_string(), 0), ("load".to_string(), 4)]);
    /// ```
    pub fn next_struct_entry(&self, number: TypeNumber, cursor: &mut StructCursor) -> Option<StructEntry>
    {
        if !cursor.started {
            cursor.started = true;
            let frame = self.member_frame(number, 0, None)?;
            cursor.frames.push(frame);
        }

        loop {
            let frame = cursor.frames.last_mut()?;
            let Some(slot) = frame.next.filter(|_| frame.remaining > 0) else {
                cursor.frames.pop();
                continue;
            };
            let Some(member) = self.fields.member(slot) else {
                error!(slot, "field member slot out of range");
                cursor.frames.pop();
                continue;
            };
            frame.next = member.next;
            frame.remaining -= 1;
            let offset = frame.base_offset + member.offset;
            let inherited = frame.inherited;

            if self.symbol(member.name) == BASE_CLASS_MEMBER {
                if cursor.frames.len() >= MAX_NESTING {
                    error!(number = %number, "base class nesting exceeds {MAX_NESTING} levels");
                    continue;
                }
                let base_class = self.resolve_cached(&member.target, member.type_number);
                if let Some(frame) = base_class.and_then(|base| self.member_frame(base.number, offset, Some(base.number))) {
                    cursor.frames.push(frame);
                }
                continue;
            }

            return Some(StructEntry {
                name: self.symbol(member.name).to_owned(),
                type_number: member.type_number,
                offset,
                inherited_from: inherited,
            });
        }
    }

    /// Member covering `offset`
    ///
    /// Picks the member with the largest offset not above `offset`. Of
    /// several members at that offset the last one wins. Base class members
    /// take part with their spliced offsets.
    #[must_use]
    pub fn struct_elem_by_offset(&self, number: TypeNumber, offset: u64) -> Option<MemberHit>
    {
        let mut cursor = StructCursor::new();
        let mut best: Option<StructEntry> = None;
        while let Some(entry) = self.next_struct_entry(number, &mut cursor) {
            if entry.offset <= offset && best.as_ref().map_or(true, |best| entry.offset >= best.offset) {
                best = Some(entry);
            }
        }
        best.map(|entry| MemberHit {
            name: entry.name,
            type_number: entry.type_number,
            offset: entry.offset,
            base_class: entry.inherited_from,
        })
    }

    fn member_frame(&self, number: TypeNumber, base_offset: u64, inherited: Option<TypeNumber>) -> Option<MemberFrame>
    {
        let group = self.fields.group(self.struct_group(number)?)?;
        Some(MemberFrame {
            next: group.head,
            remaining: group.count,
            base_offset,
            inherited,
        })
    }

    /// Field group slot of the struct `number` resolves to.
    pub(crate) fn struct_group(&self, number: TypeNumber) -> Option<u32>
    {
        let resolved = self.resolve_type(number)?;
        if !matches!(resolved.kind, TypeKind::Struct | TypeKind::PreDeclaredStruct) {
            return None;
        }
        let node = self.resolved_node(resolved)?;
        if let Some(slot) = node.field_group.get() {
            return Some(*slot);
        }
        let slot = self.fields.find_group(node.fields?)?;
        let _ = node.field_group.set(slot);
        Some(slot)
    }

    pub(crate) fn resolved_node(&self, resolved: ResolvedType) -> Option<&TypeNode>
    {
        self.lookup_node(resolved.number).and_then(|found| self.node(found))
    }

    pub(crate) fn member_type(&self, member: &FieldMember) -> Option<ResolvedType>
    {
        self.resolve_cached(&member.target, member.type_number)
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

    fn struct_with(set: &mut DebugInfoSet, number: TypeNumber, name: &str, members: &[(&str, TypeNumber, u64)])
    {
        let group = set.next_field_number();
        set.insert_field_group(group).unwrap();
        for (member, type_number, offset) in members {
            set.insert_field_member(group, member, *type_number, *offset).unwrap();
        }
        set.insert_type(TypeSpec::structure(number, name, group, 16)).unwrap();
    }

    #[test]
    fn test_best_fit_offset_takes_last_tie()
    {
        let mut set = DebugInfoSet::new("app.elf");
        let int32 = BaseType::Int32.type_number();
        struct_with(&mut set, n(0x1000), "S", &[("a", int32, 0), ("b", int32, 4), ("c", int32, 4), ("d", int32, 8)]);

        assert_eq!(set.struct_elem_by_offset(n(0x1000), 6).unwrap().name, "c");
        assert_eq!(set.struct_elem_by_offset(n(0x1000), 0).unwrap().name, "a");
        assert_eq!(set.struct_elem_by_offset(n(0x1000), 100).unwrap().name, "d");
        assert_eq!(set.struct_member_count(n(0x1000)), Some(4));
    }

    #[test]
    fn test_base_class_members_are_spliced()
    {
        let mut set = DebugInfoSet::new("app.elf");
        let int32 = BaseType::Int32.type_number();
        struct_with(&mut set, n(0x1000), "Base", &[("id", int32, 0)]);
        struct_with(&mut set, n(0x1100), "Derived", &[("public", n(0x1000), 0), ("speed", int32, 4)]);

        let mut cursor = StructCursor::new();
        let first = set.next_struct_entry(n(0x1100), &mut cursor).unwrap();
        assert_eq!(first.name, "id");
        assert_eq!(first.inherited_from, Some(n(0x1000)));
        let second = set.next_struct_entry(n(0x1100), &mut cursor).unwrap();
        assert_eq!((second.name.as_str(), second.offset, second.inherited_from), ("speed", 4, None));
        assert!(set.next_struct_entry(n(0x1100), &mut cursor).is_none());

        cursor.reset();
        assert_eq!(set.next_struct_entry(n(0x1100), &mut cursor).unwrap().name, "id");
    }

    #[test]
    fn test_array_layout_and_points_to()
    {
        let mut set = DebugInfoSet::new("app.elf");
        let int32 = BaseType::Int32.type_number();
        set.insert_type(TypeSpec::array(n(0x1000), int32, 10)).unwrap();
        set.insert_type(TypeSpec::pointer(n(0x1100), n(0x1000))).unwrap();

        let layout = set.array_layout(n(0x1000)).unwrap();
        assert_eq!(layout.element, int32);
        assert_eq!(layout.element_kind, TypeKind::Base);
        assert_eq!(layout.element_size, 4);
        assert_eq!(set.array_element_count(n(0x1000)), Some(10));

        let target = set.points_to(n(0x1100)).unwrap();
        assert_eq!(target.declared, n(0x1000));
        assert_eq!(target.resolved.kind, TypeKind::Array);
        assert_eq!(set.points_to(BaseType::UInt8.pointer_type_number()).unwrap().declared, BaseType::UInt8.type_number());
        assert!(set.points_to(int32).is_none());
        assert!(set.array_layout(n(0x1100)).is_none());
    }
}
