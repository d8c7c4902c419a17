//! # Resolver
//!
//! Queries over a loaded [`DebugInfoSet`](crate::set::DebugInfoSet), added as
//! further `impl DebugInfoSet` blocks:
//!
//! - **chain**: type chain resolution, forward declaration redirects, sizes
//! - **strings**: human readable type strings
//! - **navigate**: pointer targets, array layout, struct members by cursor or offset
//! - **address**: label ↔ address translation and "explain address"
//! - **walker**: flattening a label into its scalar leaves
//!
//! Resolution results (the table slot a type number refers to) are cached on
//! the referring record the first time they are computed. Every query takes
//! `&self`, so a set can be shared between readers once it is loaded.
//!
//! Lookups that find nothing return `None`. Broken links and runaway chains
//! are logged as errors and also return `None`.

mod address;
mod chain;
mod navigate;
mod strings;
mod walker;

pub use address::{AddressExplanation, LabelCursor, LabelHit, UnplacedInfo};
pub use chain::ResolvedType;
pub(crate) use navigate::BASE_CLASS_MEMBER;
pub use navigate::{ArrayLayout, MemberHit, PointsTo, StructCursor, StructEntry};
pub use strings::TypeDescription;
pub use walker::{Leaf, LeafCursor};

/// Longest modifier/typedef chain followed before giving up.
pub const MAX_CHAIN_DEPTH: usize = 64;

/// Deepest struct/array nesting a traversal descends into.
pub const MAX_NESTING: usize = 32;
