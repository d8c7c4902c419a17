//! # Storage
//!
//! Building blocks the tables and registries are made of:
//!
//! - [`SymbolArena`]: chunked, append-only string storage
//! - [`BlockVec`]: record storage in fixed-size blocks that never move
//! - [`floor_search`]: the step-halving binary search used by all sorted indices
//! - [`SlotPool`]: fixed-capacity, generation-checked slots for the registries

mod blocks;
mod search;
mod slots;
mod symbols;

pub(crate) use blocks::BlockVec;
pub(crate) use search::floor_search;
pub use search::MAX_SEARCH_ROUNDS;
pub use slots::{SlotId, SlotPool};
pub use symbols::{sanitize_symbol, SymbolArena, SymbolRef, MAX_SYMBOL_LEN, SYMBOL_CHUNK_SIZE};
