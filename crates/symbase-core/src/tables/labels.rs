//! Labels and their address and name indices.

use std::cmp::Ordering;
use std::ops::Range;

use once_cell::sync::OnceCell;

use super::NodeRef;
use crate::error::SymbaseResult;
use crate::storage::{floor_search, BlockVec, SymbolArena, SymbolRef};
use crate::types::TypeNumber;

/// Order of label names: case-insensitive first, case-sensitive to break ties
///
/// Names differing only in case end up next to each other, so a
/// case-insensitive lookup finds them as one contiguous run.
///
/// ## Example
///
/// ```rust
/// use std::cmp::Ordering;
/// use symbase_core::tables::compare_label_names;
///
/// assert_eq!(compare_label_names("alpha", "Beta"), Ordering::Less);
/// assert_eq!(compare_label_names("Speed", "speed"), Ordering::Less);
/// ```
#[must_use]
pub fn compare_label_names(a: &str, b: &str) -> Ordering
{
    compare_folded(a, b).then_with(|| a.cmp(b))
}

fn compare_folded(a: &str, b: &str) -> Ordering
{
    a.bytes()
        .map(|c| c.to_ascii_lowercase())
        .cmp(b.bytes().map(|c| c.to_ascii_lowercase()))
}

/// A variable with an address
#[derive(Debug)]
pub struct Label
{
    pub(crate) name: SymbolRef,
    pub(crate) type_number: TypeNumber,
    pub(crate) address: u64,
    pub(crate) target: OnceCell<NodeRef>,
}

impl Label
{
    #[must_use]
    pub const fn type_number(&self) -> TypeNumber
    {
        self.type_number
    }

    /// Address as stored, i.e. relative to the image base for relative sets.
    #[must_use]
    pub const fn stored_address(&self) -> u64
    {
        self.address
    }
}

/// A variable declared without an address (static members, extern declarations)
///
/// `origin` is the type number of the declaring entry, so that a later
/// out-of-line definition can find the declaration's name and type.
#[derive(Debug)]
pub struct UnplacedLabel
{
    pub(crate) name: SymbolRef,
    pub(crate) type_number: TypeNumber,
    pub(crate) origin: TypeNumber,
}

impl UnplacedLabel
{
    #[must_use]
    pub const fn type_number(&self) -> TypeNumber
    {
        self.type_number
    }

    #[must_use]
    pub const fn origin(&self) -> TypeNumber
    {
        self.origin
    }
}

/// Labels in insertion order plus address and name indices
#[derive(Debug)]
pub(crate) struct LabelTable
{
    labels: BlockVec<Label>,
    by_address: Vec<u32>,
    by_name: Vec<u32>,
    unplaced: BlockVec<UnplacedLabel>,
}

impl LabelTable
{
    pub(crate) const fn new() -> Self
    {
        Self {
            labels: BlockVec::new(),
            by_address: Vec::new(),
            by_name: Vec::new(),
            unplaced: BlockVec::new(),
        }
    }

    pub(crate) fn len(&self) -> usize
    {
        self.labels.len()
    }

    pub(crate) fn unplaced_len(&self) -> usize
    {
        self.unplaced.len()
    }

    /// Insert a label; equal addresses and names are kept in insertion order.
    pub(crate) fn insert(
        &mut self,
        arena: &SymbolArena,
        name: SymbolRef,
        type_number: TypeNumber,
        address: u64,
    ) -> SymbaseResult<u32>
    {
        let new_name = arena.resolve(name);
        let address_pos = self
            .by_address
            .partition_point(|slot| self.labels.get(*slot).is_some_and(|label| label.address <= address));
        let name_pos = self.by_name.partition_point(|slot| {
            self.labels
                .get(*slot)
                .is_some_and(|label| compare_label_names(arena.resolve(label.name), new_name) != Ordering::Greater)
        });

        let slot = self.labels.push(Label {
            name,
            type_number,
            address,
            target: OnceCell::new(),
        })?;
        self.by_address.insert(address_pos, slot);
        self.by_name.insert(name_pos, slot);
        Ok(slot)
    }

    pub(crate) fn insert_unplaced(&mut self, name: SymbolRef, type_number: TypeNumber, origin: TypeNumber)
        -> SymbaseResult<u32>
    {
        self.unplaced.push(UnplacedLabel {
            name,
            type_number,
            origin,
        })
    }

    /// Label at position `pos` of the insertion order.
    pub(crate) fn raw_at(&self, pos: usize) -> Option<(u32, &Label)>
    {
        let slot = u32::try_from(pos).ok()?;
        self.labels.get(slot).map(|label| (slot, label))
    }

    /// Label at position `pos` of the name index.
    pub(crate) fn by_name_at(&self, pos: usize) -> Option<(u32, &Label)>
    {
        let slot = *self.by_name.get(pos)?;
        self.labels.get(slot).map(|label| (slot, label))
    }

    fn by_address_at(&self, pos: usize) -> Option<(u32, &Label)>
    {
        let slot = *self.by_address.get(pos)?;
        self.labels.get(slot).map(|label| (slot, label))
    }

    /// All labels sharing the address of the closest label at or below `address`.
    ///
    /// The run is returned in insertion order. Empty if every label lies above `address`.
    pub(crate) fn floor_address_run(&self, address: u64) -> Vec<(u32, &Label)>
    {
        let Some(hit) = floor_search(self.by_address.len(), |pos| {
            self.by_address_at(pos)
                .map_or(Ordering::Less, |(_, label)| label.address.cmp(&address))
        }) else {
            return Vec::new();
        };
        let Some((_, anchor)) = self.by_address_at(hit) else {
            return Vec::new();
        };
        let floor = anchor.address;

        let mut start = hit;
        while start > 0 && self.by_address_at(start - 1).is_some_and(|(_, label)| label.address == floor) {
            start -= 1;
        }
        (start..self.by_address.len())
            .map_while(|pos| self.by_address_at(pos).filter(|(_, label)| label.address == floor))
            .collect()
    }

    /// Positions in the name index of all labels equal to `name` ignoring case.
    pub(crate) fn name_run(&self, arena: &SymbolArena, name: &str) -> Range<usize>
    {
        let folded_at = |pos: usize| {
            self.by_name_at(pos)
                .map(|(_, label)| compare_folded(arena.resolve(label.name), name))
        };
        let Some(hit) = floor_search(self.by_name.len(), |pos| folded_at(pos).unwrap_or(Ordering::Less)) else {
            return 0..0;
        };
        if folded_at(hit) != Some(Ordering::Equal) {
            return hit..hit;
        }

        let mut start = hit;
        while start > 0 && folded_at(start - 1) == Some(Ordering::Equal) {
            start -= 1;
        }
        let mut end = hit + 1;
        while folded_at(end) == Some(Ordering::Equal) {
            end += 1;
        }
        start..end
    }

    /// Unplaced labels whose name matches exactly.
    pub(crate) fn unplaced_named<'a>(
        &'a self,
        arena: &'a SymbolArena,
        name: &'a str,
    ) -> impl Iterator<Item = &'a UnplacedLabel> + 'a
    {
        self.unplaced
            .iter()
            .filter(move |label| arena.resolve(label.name) == name)
    }

    pub(crate) fn unplaced_by_origin(&self, origin: TypeNumber) -> Option<&UnplacedLabel>
    {
        self.unplaced.iter().find(|label| label.origin == origin)
    }

    pub(crate) fn iter_unplaced(&self) -> impl Iterator<Item = &UnplacedLabel>
    {
        self.unplaced.iter()
    }

    pub(crate) fn is_sorted(&self, arena: &SymbolArena) -> bool
    {
        let addresses_sorted = (1..self.by_address.len()).all(|pos| {
            match (self.by_address_at(pos - 1), self.by_address_at(pos)) {
                (Some((_, a)), Some((_, b))) => a.address <= b.address,
                _ => false,
            }
        });
        let names_sorted = (1..self.by_name.len()).all(|pos| match (self.by_name_at(pos - 1), self.by_name_at(pos)) {
            (Some((_, a)), Some((_, b))) => {
                compare_label_names(arena.resolve(a.name), arena.resolve(b.name)) != Ordering::Greater
            }
            _ => false,
        });
        addresses_sorted
            && names_sorted
            && self.by_address.len() == self.labels.len()
            && self.by_name.len() == self.labels.len()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn table_with(entries: &[(&str, u64)]) -> (SymbolArena, LabelTable)
    {
        let mut arena = SymbolArena::new();
        let mut table = LabelTable::new();
        for (name, address) in entries {
            let symbol = arena.intern(name);
            table.insert(&arena, symbol, TypeNumber::from_raw(5), *address).unwrap();
        }
        (arena, table)
    }

    #[test]
    fn test_indices_sorted_after_random_inserts()
    {
        let (arena, table) = table_with(&[("zeta", 0x30), ("Alpha", 0x10), ("beta", 0x20), ("alpha", 0x10), ("gamma", 0x5)]);
        assert!(table.is_sorted(&arena));
        let names: Vec<&str> = (0..table.len())
            .filter_map(|pos| table.by_name_at(pos))
            .map(|(_, label)| arena.resolve(label.name))
            .collect();
        assert_eq!(names, vec!["Alpha", "alpha", "beta", "gamma", "zeta"]);
    }

    #[test]
    fn test_floor_address_run_collects_duplicates()
    {
        let (arena, table) = table_with(&[("a", 0x100), ("b", 0x200), ("c", 0x200), ("d", 0x300)]);
        let run: Vec<&str> = table
            .floor_address_run(0x250)
            .into_iter()
            .map(|(_, label)| arena.resolve(label.name))
            .collect();
        assert_eq!(run, vec!["b", "c"]);
        assert!(table.floor_address_run(0x50).is_empty());
    }

    #[test]
    fn test_name_run_is_case_insensitive()
    {
        let (arena, table) = table_with(&[("Speed", 1), ("speed", 2), ("SPEED", 3), ("other", 4)]);
        assert_eq!(table.name_run(&arena, "speed").len(), 3);
        assert_eq!(table.name_run(&arena, "missing").len(), 0);
        assert_eq!(table.name_run(&arena, "other").len(), 1);
    }
}
