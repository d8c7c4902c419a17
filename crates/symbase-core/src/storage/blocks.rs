//! Record storage in fixed-size blocks.

use crate::error::{SymbaseError, SymbaseResult};

/// Number of records per block.
pub(crate) const BLOCK_LEN: usize = 1024;

/// Append-only record storage that never moves a record once written
///
/// Records live in blocks of [`BLOCK_LEN`] entries. A block is allocated with
/// its full capacity up front and never grows past it, so pushing new records
/// never reallocates the storage of existing ones. Records are addressed by a
/// `u32` slot number that stays valid until the whole storage is cleared.
///
/// Sorted views over the records are kept as separate `Vec<u32>` indices of
/// slot numbers by the owning tables. Those index vectors are the part that
/// gets shifted and reallocated while inserting.
#[derive(Debug)]
pub(crate) struct BlockVec<T>
{
    blocks: Vec<Vec<T>>,
    len: usize,
}

impl<T> BlockVec<T>
{
    pub(crate) const fn new() -> Self
    {
        Self {
            blocks: Vec::new(),
            len: 0,
        }
    }

    /// Append a record and return its slot.
    ///
    /// ## Errors
    ///
    /// `Internal` if the slot number no longer fits into `u32`.
    pub(crate) fn push(&mut self, item: T) -> SymbaseResult<u32>
    {
        let slot = u32::try_from(self.len)
            .map_err(|_| SymbaseError::Internal(format!("record storage exceeds {} entries", u32::MAX)))?;
        let needs_block = self.blocks.last().map_or(true, |block| block.len() == BLOCK_LEN);
        if needs_block {
            self.blocks.push(Vec::with_capacity(BLOCK_LEN));
        }
        if let Some(block) = self.blocks.last_mut() {
            block.push(item);
        }
        self.len += 1;
        Ok(slot)
    }

    pub(crate) fn get(&self, slot: u32) -> Option<&T>
    {
        let slot = slot as usize;
        self.blocks.get(slot / BLOCK_LEN)?.get(slot % BLOCK_LEN)
    }

    pub(crate) fn get_mut(&mut self, slot: u32) -> Option<&mut T>
    {
        let slot = slot as usize;
        self.blocks.get_mut(slot / BLOCK_LEN)?.get_mut(slot % BLOCK_LEN)
    }

    pub(crate) const fn len(&self) -> usize
    {
        self.len
    }

    /// Records in insertion order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &T>
    {
        self.blocks.iter().flatten()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_push_spans_blocks_without_moving_records()
    {
        let mut storage = BlockVec::new();
        let first = storage.push(String::from("first")).unwrap();
        let first_ptr = storage.get(first).unwrap().as_ptr();

        for n in 0..(BLOCK_LEN * 2) {
            storage.push(n.to_string()).unwrap();
        }

        assert_eq!(storage.len(), BLOCK_LEN * 2 + 1);
        assert_eq!(storage.get(first).unwrap().as_ptr(), first_ptr);
        assert_eq!(storage.get(BLOCK_LEN as u32).map(String::as_str), Some("1023"));
        assert!(storage.get((BLOCK_LEN * 3) as u32).is_none());
    }

    #[test]
    fn test_iter_keeps_insertion_order()
    {
        let mut storage = BlockVec::new();
        for n in [5, 3, 9] {
            storage.push(n).unwrap();
        }
        *storage.get_mut(1).unwrap() = 4;
        assert_eq!(storage.iter().copied().collect::<Vec<_>>(), vec![5, 4, 9]);
    }
}
