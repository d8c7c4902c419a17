//! # Types
//!
//! Small value types shared by the tables, the resolver and the registry.
//!
//! Everything in here is `Copy` and carries no references into a debug info
//! set, so values can be handed across the registry lock freely.

pub mod address;
pub mod base;
pub mod numbers;
pub mod process;

// Re-export all public types
pub use address::Address;
pub use base::{BaseCode, BaseType, ValueType};
pub use numbers::{FieldNumber, TypeKind, TypeNumber, TypeOrigin};
pub use process::{ClientId, ProcessId};
