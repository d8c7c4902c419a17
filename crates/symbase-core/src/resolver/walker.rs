//! Flattening a label into its scalar leaves.

use smallvec::SmallVec;
use tracing::{error, warn};

use super::navigate::BASE_CLASS_MEMBER;
use super::MAX_NESTING;
use crate::set::DebugInfoSet;
use crate::types::{Address, BaseCode, TypeKind, TypeNumber, ValueType};

/// One scalar reachable from a label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leaf
{
    /// Access path such as `motor.gains[2]`
    pub path: String,
    pub address: Address,
    pub value_type: ValueType,
    /// Declared type of the scalar
    pub type_number: TypeNumber,
}

#[derive(Debug, Clone, Copy)]
enum LeafFrame
{
    Struct
    {
        next: Option<u32>,
        remaining: u32,
        base: u64,
        path_len: usize,
        separator: &'static str,
    },
    Array
    {
        element: TypeNumber,
        index: u64,
        count: u64,
        element_size: u64,
        base: u64,
        path_len: usize,
    },
}

/// Position of a leaf walk over one label
///
/// ## Example
///
/// ```rust
/// use symbase_core::resolver::LeafCursor;
/// use symbase_core::set::DebugInfoSet;
/// use symbase_core::tables::TypeSpec;
/// use symbase_core::types::{Address, BaseType, TypeNumber};
///
/// let mut set = DebugInfoSet::new("app.elf");
/// let gains = TypeNumber::from_raw(0x1000);
/// set.insert_type(TypeSpec::array(gains, BaseType::Real32.type_number(), 2)).unwrap();
/// set.insert_label("gains", gains, 0x100).unwrap();
///
/// let mut cursor = LeafCursor::for_label("gains", Address::ZERO);
/// let first = set.next_leaf(&mut cursor).unwrap();
/// assert_eq!(first.path, "gains[0]");
/// assert_eq!(set.next_leaf(&mut cursor).unwrap().address, Address::new(0x104));
/// assert!(set.next_leaf(&mut cursor).is_none());
/// ```
#[derive(Debug, Clone)]
pub struct LeafCursor
{
    label: String,
    base: Address,
    pointers_as_integers: bool,
    frames: SmallVec<[LeafFrame; 8]>,
    path: String,
    started: bool,
}

impl LeafCursor
{
    /// Walk the label `label` of a process loaded at `base`.
    #[must_use]
    pub fn for_label(label: impl Into<String>, base: Address) -> Self
    {
        Self {
            label: label.into(),
            base,
            pointers_as_integers: false,
            frames: SmallVec::new(),
            path: String::new(),
            started: false,
        }
    }

    /// Report pointers as unsigned integers of the pointer width instead of skipping them.
    #[must_use]
    pub const fn pointers_as_integers(mut self, enabled: bool) -> Self
    {
        self.pointers_as_integers = enabled;
        self
    }

    pub fn reset(&mut self)
    {
        self.frames.clear();
        self.path.clear();
        self.started = false;
    }
}

impl DebugInfoSet
{
    /// Next scalar leaf of the label a cursor walks
    ///
    /// Struct members are visited in declaration order, array elements by
    /// index. Base class members are joined with `::`. `void` members are
    /// skipped, as are pointers unless the cursor reports them as integers.
    pub fn next_leaf(&self, cursor: &mut LeafCursor) -> Option<Leaf>
    {
        if !cursor.started {
            cursor.started = true;
            let label = self.find_label(&cursor.label)?;
            cursor.path.push_str(self.symbol(label.name));
            let address = self.to_runtime(label.address, cursor.base).value();
            if let Some(leaf) = self.visit(cursor, label.type_number, address) {
                return Some(leaf);
            }
        }

        loop {
            let frame = cursor.frames.last_mut()?;
            match frame {
                LeafFrame::Struct {
                    next,
                    remaining,
                    base,
                    path_len,
                    separator,
                } => {
                    let Some(slot) = next.filter(|_| *remaining > 0) else {
                        cursor.frames.pop();
                        continue;
                    };
                    let Some(member) = self.fields.member(slot) else {
                        error!(slot, "field member slot out of range");
                        cursor.frames.pop();
                        continue;
                    };
                    *next = member.next;
                    *remaining -= 1;
                    let (address, path_len, separator) = (*base + member.offset, *path_len, *separator);
                    cursor.path.truncate(path_len);

                    let name = self.symbol(member.name);
                    if name == BASE_CLASS_MEMBER {
                        if let Some(base_class) = self.member_type(member) {
                            self.push_struct(cursor, base_class.number, address, "::");
                        }
                        continue;
                    }
                    cursor.path.push_str(separator);
                    cursor.path.push_str(name);
                    if let Some(leaf) = self.visit(cursor, member.type_number, address) {
                        return Some(leaf);
                    }
                }
                LeafFrame::Array {
                    element,
                    index,
                    count,
                    element_size,
                    base,
                    path_len,
                } => {
                    if *index >= *count {
                        cursor.frames.pop();
                        continue;
                    }
                    let current = *index;
                    *index += 1;
                    let (element, address, path_len) = (*element, *base + current * *element_size, *path_len);
                    cursor.path.truncate(path_len);
                    cursor.path.push_str(&format!("[{current}]"));
                    if let Some(leaf) = self.visit(cursor, element, address) {
                        return Some(leaf);
                    }
                }
            }
        }
    }

    /// Yield `type_number` at `address` as a leaf, or push a frame to walk it.
    fn visit(&self, cursor: &mut LeafCursor, type_number: TypeNumber, address: u64) -> Option<Leaf>
    {
        let resolved = self.resolve_type(type_number)?;
        let value_type = match resolved.kind {
            TypeKind::Base => BaseCode::decode(resolved.number)?.value_type()?,
            TypeKind::Pointer if cursor.pointers_as_integers => ValueType::unsigned_of_size(self.pointer_size())?,
            TypeKind::Pointer | TypeKind::Modifier | TypeKind::Typedef => return None,
            TypeKind::Struct | TypeKind::PreDeclaredStruct => {
                self.push_struct(cursor, resolved.number, address, ".");
                return None;
            }
            TypeKind::Array => {
                let layout = self.array_layout(resolved.number)?;
                if self.nesting_exhausted(cursor) {
                    return None;
                }
                cursor.frames.push(LeafFrame::Array {
                    element: layout.element,
                    index: 0,
                    count: layout.element_count,
                    element_size: layout.element_size,
                    base: address,
                    path_len: cursor.path.len(),
                });
                return None;
            }
        };
        Some(Leaf {
            path: cursor.path.clone(),
            address: Address::new(address),
            value_type,
            type_number,
        })
    }

    fn push_struct(&self, cursor: &mut LeafCursor, number: TypeNumber, address: u64, separator: &'static str)
    {
        let Some(group) = self.struct_group(number).and_then(|slot| self.fields.group(slot)) else {
            return;
        };
        if self.nesting_exhausted(cursor) {
            return;
        }
        cursor.frames.push(LeafFrame::Struct {
            next: group.head,
            remaining: group.count,
            base: address,
            path_len: cursor.path.len(),
            separator,
        });
    }

    fn nesting_exhausted(&self, cursor: &LeafCursor) -> bool
    {
        if cursor.frames.len() < MAX_NESTING {
            return false;
        }
        warn!(label = %cursor.label, path = %cursor.path, "leaf walk nesting exceeds {MAX_NESTING} levels");
        true
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

    fn motor_set() -> DebugInfoSet
    {
        let mut set = DebugInfoSet::new("app.elf");
        let int32 = BaseType::Int32.type_number();
        let real32 = BaseType::Real32.type_number();

        let base_fields = set.next_field_number();
        set.insert_field_group(base_fields).unwrap();
        set.insert_field_member(base_fields, "id", int32, 0).unwrap();
        set.insert_type(TypeSpec::structure(n(0x1000), "Device", base_fields, 4)).unwrap();

        let fields = set.next_field_number();
        set.insert_field_group(fields).unwrap();
        set.insert_field_member(fields, "public", n(0x1000), 0).unwrap();
        set.insert_field_member(fields, "gains", n(0x1100), 4).unwrap();
        set.insert_field_member(fields, "next", n(0x1200), 12).unwrap();
        set.insert_field_member(fields, "spare", TypeNumber::VOID, 16).unwrap();
        set.insert_type(TypeSpec::array(n(0x1100), real32, 2)).unwrap();
        set.insert_type(TypeSpec::pointer(n(0x1200), n(0x1300))).unwrap();
        set.insert_type(TypeSpec::structure(n(0x1300), "Motor", fields, 16)).unwrap();
        set.insert_label("motor", n(0x1300), 0x4000).unwrap();
        set.compute_sizes();
        set
    }

    fn walk(set: &DebugInfoSet, mut cursor: LeafCursor) -> Vec<(String, u64)>
    {
        let mut leaves = Vec::new();
        while let Some(leaf) = set.next_leaf(&mut cursor) {
            leaves.push((leaf.path, leaf.address.value()));
        }
        leaves
    }

    #[test]
    fn test_struct_flattening_skips_pointers()
    {
        let set = motor_set();
        let leaves = walk(&set, LeafCursor::for_label("motor", Address::ZERO));
        assert_eq!(
            leaves,
            vec![
                ("motor::id".to_string(), 0x4000),
                ("motor.gains[0]".to_string(), 0x4004),
                ("motor.gains[1]".to_string(), 0x4008),
            ]
        );
    }

    #[test]
    fn test_pointers_as_integers()
    {
        let set = motor_set();
        let mut cursor = LeafCursor::for_label("motor", Address::ZERO).pointers_as_integers(true);
        let leaves: Vec<Leaf> = std::iter::from_fn(|| set.next_leaf(&mut cursor)).collect();
        let pointer = leaves.last().unwrap();
        assert_eq!(pointer.path, "motor.next");
        assert_eq!(pointer.value_type, ValueType::U32);
        assert_eq!(pointer.address, Address::new(0x400c));
    }

    #[test]
    fn test_scalar_label_and_unknown_label()
    {
        let mut set = DebugInfoSet::new("app.elf");
        set.insert_label("speed", BaseType::UInt16.type_number(), 0x10).unwrap();
        assert_eq!(walk(&set, LeafCursor::for_label("speed", Address::ZERO)), vec![("speed".to_string(), 0x10)]);
        assert!(walk(&set, LeafCursor::for_label("missing", Address::ZERO)).is_empty());
    }
}
