//! Fixed-capacity, generation-checked slot pool.

use std::fmt;

/// Handle to an occupied [`SlotPool`] slot
///
/// Freeing a slot bumps its generation, so a handle kept past the removal of
/// its value never resolves to whatever moves into the slot afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId
{
    index: u32,
    generation: u32,
}

impl SlotId
{
    /// Position of the slot in its pool.
    #[must_use]
    pub const fn index(self) -> u32
    {
        self.index
    }

    /// Generation the slot had when this handle was issued.
    #[must_use]
    pub const fn generation(self) -> u32
    {
        self.generation
    }
}

impl fmt::Display for SlotId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

#[derive(Debug)]
struct Slot<T>
{
    generation: u32,
    value: Option<T>,
}

/// Pool with a fixed number of slots
///
/// Allocation is a linear scan for the first free slot. The pool never holds
/// more than `capacity` values.
#[derive(Debug)]
pub struct SlotPool<T>
{
    slots: Vec<Slot<T>>,
    capacity: usize,
}

impl<T> SlotPool<T>
{
    /// Create an empty pool that holds at most `capacity` values.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self
    {
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Store `value` in the first free slot.
    ///
    /// Returns the value back if every slot is taken.
    pub fn allocate(&mut self, value: T) -> Result<SlotId, T>
    {
        if let Some((index, slot)) = self.slots.iter_mut().enumerate().find(|(_, slot)| slot.value.is_none()) {
            slot.value = Some(value);
            return Ok(SlotId {
                index: index as u32,
                generation: slot.generation,
            });
        }
        if self.slots.len() >= self.capacity {
            return Err(value);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        Ok(SlotId { index, generation: 0 })
    }

    #[must_use]
    pub fn get(&self, id: SlotId) -> Option<&T>
    {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut T>
    {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    /// Free the slot and return its value.
    pub fn remove(&mut self, id: SlotId) -> Option<T>
    {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)?;
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        Some(value)
    }

    /// Occupied slots with their handles.
    pub fn iter(&self) -> impl Iterator<Item = (SlotId, &T)>
    {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|value| {
                (
                    SlotId {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    value,
                )
            })
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (SlotId, &mut T)>
    {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let generation = slot.generation;
            slot.value.as_mut().map(|value| {
                (
                    SlotId {
                        index: index as u32,
                        generation,
                    },
                    value,
                )
            })
        })
    }

    /// Remove every value, invalidating all handles.
    pub fn drain(&mut self) -> Vec<T>
    {
        self.slots
            .iter_mut()
            .filter_map(|slot| {
                let value = slot.value.take()?;
                slot.generation = slot.generation.wrapping_add(1);
                Some(value)
            })
            .collect()
    }

    /// Number of occupied slots.
    #[must_use]
    pub fn len(&self) -> usize
    {
        self.slots.iter().filter(|slot| slot.value.is_some()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.len() == 0
    }

    #[must_use]
    pub const fn capacity(&self) -> usize
    {
        self.capacity
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_allocate_until_full()
    {
        let mut pool = SlotPool::with_capacity(2);
        let a = pool.allocate("a").unwrap();
        let b = pool.allocate("b").unwrap();
        assert_eq!(pool.allocate("c"), Err("c"));
        assert_eq!(pool.get(a), Some(&"a"));
        assert_eq!(pool.get(b), Some(&"b"));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_stale_handle_does_not_alias_reused_slot()
    {
        let mut pool = SlotPool::with_capacity(1);
        let old = pool.allocate(1).unwrap();
        assert_eq!(pool.remove(old), Some(1));
        let new = pool.allocate(2).unwrap();

        assert_eq!(old.index(), new.index());
        assert_ne!(old, new);
        assert_eq!(pool.get(old), None);
        assert_eq!(pool.remove(old), None);
        assert_eq!(pool.get(new), Some(&2));
    }

    #[test]
    fn test_drain_invalidates_handles()
    {
        let mut pool = SlotPool::with_capacity(4);
        let ids: Vec<_> = (0..3).map(|n| pool.allocate(n).unwrap()).collect();
        assert_eq!(pool.drain(), vec![0, 1, 2]);
        assert!(pool.is_empty());
        assert!(ids.iter().all(|id| pool.get(*id).is_none()));
    }
}
