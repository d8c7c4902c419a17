//! Field groups and their members.

use std::cmp::Ordering;

use once_cell::sync::OnceCell;

use super::NodeRef;
use crate::error::{SymbaseError, SymbaseResult};
use crate::storage::{floor_search, BlockVec, SymbolRef};
use crate::types::{FieldNumber, TypeNumber};

/// Member list header of one struct/union
#[derive(Debug)]
pub struct FieldGroup
{
    pub(crate) number: FieldNumber,
    pub(crate) head: Option<u32>,
    pub(crate) tail: Option<u32>,
    pub(crate) count: u32,
}

impl FieldGroup
{
    #[must_use]
    pub const fn number(&self) -> FieldNumber
    {
        self.number
    }

    /// Number of members, base class entries included.
    #[must_use]
    pub const fn member_count(&self) -> u32
    {
        self.count
    }
}

/// One struct member: name, type and byte offset inside the struct
///
/// A member named `public` stands for an embedded base class.
#[derive(Debug)]
pub struct FieldMember
{
    pub(crate) name: SymbolRef,
    pub(crate) type_number: TypeNumber,
    pub(crate) offset: u64,
    pub(crate) next: Option<u32>,
    pub(crate) target: OnceCell<NodeRef>,
}

impl FieldMember
{
    #[must_use]
    pub const fn type_number(&self) -> TypeNumber
    {
        self.type_number
    }

    #[must_use]
    pub const fn offset(&self) -> u64
    {
        self.offset
    }
}

/// Field groups sorted by field number, members chained per group
#[derive(Debug)]
pub(crate) struct FieldTable
{
    groups: BlockVec<FieldGroup>,
    index: Vec<u32>,
    members: BlockVec<FieldMember>,
}

impl FieldTable
{
    pub(crate) const fn new() -> Self
    {
        Self {
            groups: BlockVec::new(),
            index: Vec::new(),
            members: BlockVec::new(),
        }
    }

    fn number_at(&self, pos: usize) -> Option<FieldNumber>
    {
        let slot = *self.index.get(pos)?;
        self.groups.get(slot).map(|group| group.number)
    }

    pub(crate) fn insert_group(&mut self, number: FieldNumber) -> SymbaseResult<u32>
    {
        let pos = self
            .index
            .partition_point(|slot| self.groups.get(*slot).is_some_and(|group| group.number < number));
        if self.number_at(pos) == Some(number) {
            return Err(SymbaseError::DuplicateFieldGroup(number));
        }
        let slot = self.groups.push(FieldGroup {
            number,
            head: None,
            tail: None,
            count: 0,
        })?;
        self.index.insert(pos, slot);
        Ok(slot)
    }

    pub(crate) fn find_group(&self, number: FieldNumber) -> Option<u32>
    {
        let pos = floor_search(self.index.len(), |pos| {
            self.number_at(pos).map_or(Ordering::Less, |candidate| candidate.cmp(&number))
        })?;
        (self.number_at(pos) == Some(number)).then(|| self.index[pos])
    }

    pub(crate) fn group(&self, slot: u32) -> Option<&FieldGroup>
    {
        self.groups.get(slot)
    }

    pub(crate) fn member(&self, slot: u32) -> Option<&FieldMember>
    {
        self.members.get(slot)
    }

    /// Append a member to the end of group `number`.
    pub(crate) fn push_member(
        &mut self,
        number: FieldNumber,
        name: SymbolRef,
        type_number: TypeNumber,
        offset: u64,
    ) -> SymbaseResult<u32>
    {
        let group_slot = self.find_group(number).ok_or(SymbaseError::UnknownFieldGroup(number))?;
        let member_slot = self.members.push(FieldMember {
            name,
            type_number,
            offset,
            next: None,
            target: OnceCell::new(),
        })?;

        let previous_tail = {
            let group = self
                .groups
                .get_mut(group_slot)
                .ok_or_else(|| SymbaseError::Internal(format!("field group slot {group_slot} vanished")))?;
            let previous = group.tail.replace(member_slot);
            if group.head.is_none() {
                group.head = Some(member_slot);
            }
            group.count += 1;
            previous
        };
        if let Some(tail) = previous_tail.and_then(|slot| self.members.get_mut(slot)) {
            tail.next = Some(member_slot);
        }
        Ok(member_slot)
    }

    /// Members of a group in declaration order, with their slots.
    #[cfg(test)]
    pub(crate) fn members_of(&self, group_slot: u32) -> impl Iterator<Item = (u32, &FieldMember)>
    {
        let group = self.groups.get(group_slot);
        let mut next = group.and_then(|group| group.head);
        let mut remaining = group.map_or(0, |group| group.count);
        std::iter::from_fn(move || {
            if remaining == 0 {
                return None;
            }
            remaining -= 1;
            let slot = next?;
            let member = self.members.get(slot)?;
            next = member.next;
            Some((slot, member))
        })
    }

    pub(crate) fn group_count(&self) -> usize
    {
        self.index.len()
    }

    pub(crate) fn member_count(&self) -> usize
    {
        self.members.len()
    }

    pub(crate) fn is_sorted(&self) -> bool
    {
        (1..self.index.len()).all(|pos| self.number_at(pos - 1) < self.number_at(pos))
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_members_keep_declaration_order()
    {
        let mut table = FieldTable::new();
        let group = FieldNumber::from_raw(0x1000_0001);
        let slot = table.insert_group(group).unwrap();
        for (offset, raw_type) in [(0, 5), (4, 6), (8, 9)] {
            table
                .push_member(group, SymbolRef::EMPTY, TypeNumber::from_raw(raw_type), offset)
                .unwrap();
        }

        let offsets: Vec<u64> = table.members_of(slot).map(|(_, member)| member.offset()).collect();
        assert_eq!(offsets, vec![0, 4, 8]);
        assert_eq!(table.group(slot).unwrap().member_count(), 3);
    }

    #[test]
    fn test_groups_sorted_and_unknown_group_rejected()
    {
        let mut table = FieldTable::new();
        for raw in [0x1000_0003, 0x1000_0001, 0x1000_0002] {
            table.insert_group(FieldNumber::from_raw(raw)).unwrap();
        }
        assert!(table.is_sorted());
        assert!(table.find_group(FieldNumber::from_raw(0x1000_0002)).is_some());

        let missing = FieldNumber::from_raw(0x1000_0009);
        let err = table
            .push_member(missing, SymbolRef::EMPTY, TypeNumber::VOID, 0)
            .unwrap_err();
        assert!(matches!(err, SymbaseError::UnknownFieldGroup(n) if n == missing));
        assert!(matches!(
            table.insert_group(FieldNumber::from_raw(0x1000_0001)),
            Err(SymbaseError::DuplicateFieldGroup(_))
        ));
    }
}
