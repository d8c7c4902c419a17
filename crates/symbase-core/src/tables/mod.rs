//! # Tables
//!
//! The per-set tables a debug info parser fills:
//!
//! - [`TypeTable`]: type nodes sorted by type number (one instance for file
//!   types, one for synthesized types)
//! - [`FieldTable`]: field groups sorted by field number, plus their members
//!   chained in declaration order
//! - [`LabelTable`]: labels in insertion order with address and name indices,
//!   plus labels declared without an address
//!
//! All tables store records in [`BlockVec`](crate::storage::BlockVec) blocks
//! and keep their sorted views as separate vectors of slot numbers. Inserting
//! shifts the tail of those vectors; the records themselves never move.
//!
//! References between records are type and field *numbers*. The storage slot
//! a number resolves to is cached on the referring record the first time it is
//! looked up (see [`NodeRef`]).

mod fields;
mod labels;
mod types;

pub use fields::{FieldGroup, FieldMember};
pub(crate) use fields::FieldTable;
pub use labels::{compare_label_names, Label, UnplacedLabel};
pub(crate) use labels::LabelTable;
pub use types::{NodeRef, TypeNode, TypeSpec};
pub(crate) use types::TypeTable;
