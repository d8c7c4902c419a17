//! # symbase-core
//!
//! In-memory symbol and type database for reading target variables by name.
//!
//! A [`DebugInfoSet`](set::DebugInfoSet) holds the labels, types and struct
//! members of one executable, filled by a [`DebugInfoSource`](source::DebugInfoSource)
//! such as the DWARF reader [`ObjectDwarfSource`](source::ObjectDwarfSource).
//! The [`Registry`](registry::Registry) shares sets between the processes and
//! clients that use the same executable, reloads them when the executable
//! changes on disk and notifies clients of process starts and terminations.
//!
//! ## Modules
//!
//! - **storage**: block-chunked storage, the symbol arena, slot pools
//! - **tables**: type, field and label tables with their sorted indices
//! - **set**: one executable's debug infos and the insertion API
//! - **resolver**: type chains, struct/array navigation, address ↔ label
//! - **registry**: shared sets, process records, client connections
//! - **source**: the executable reader trait and the DWARF implementation
//!
//! ## Example
//!
//! ```rust
//! use symbase_core::prelude::*;
//!
//! let mut set = DebugInfoSet::new("controller.elf");
//! set.insert_label("Motor::speed", BaseType::Real32.type_number(), 0x2000_0010)?;
//!
//! let hit = set.label_by_address(Address::new(0x2000_0010), Address::ZERO).unwrap();
//! assert_eq!(hit.name, "Motor::speed");
//! # Ok::<(), SymbaseError>(())
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod prelude;
pub mod registry;
pub mod resolver;
pub mod set;
pub mod source;
pub mod storage;
pub mod sync;
pub mod tables;
pub mod types;

// Re-export commonly used types
pub use error::{SymbaseError, SymbaseResult};
pub use registry::Registry;
pub use set::DebugInfoSet;
