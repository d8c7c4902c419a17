//! Common module for library exports

pub use crate::config::RegistryConfig;
pub use crate::error::{SymbaseError, SymbaseResult};
pub use crate::events::{Notification, NotificationCallback};
pub use crate::registry::{DebugBinding, DebugInfoHandle, ProcessView, Registry};
pub use crate::resolver::{LabelCursor, LabelHit, LeafCursor, StructCursor};
pub use crate::set::DebugInfoSet;
pub use crate::source::{DebugInfoSource, ObjectDwarfSource};
pub use crate::tables::TypeSpec;
pub use crate::types::{Address, BaseType, ClientId, FieldNumber, ProcessId, TypeKind, TypeNumber, ValueType};
