//! Process and client identifiers.

use std::fmt;

/// Operating system process identifier (PID)
///
/// A [`ProcessRecord`](crate::registry::ProcessRecord) only carries a PID while
/// the target is running. Records created by a client connecting *before* the
/// target starts have none.
///
/// ## Example
///
/// ```rust
/// use symbase_core::types::ProcessId;
///
/// let pid = ProcessId::from(4242);
/// assert_eq!(u32::from(pid), 4242);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessId(pub u32);

impl From<u32> for ProcessId
{
    fn from(pid: u32) -> Self
    {
        ProcessId(pid)
    }
}

impl From<ProcessId> for u32
{
    fn from(pid: ProcessId) -> Self
    {
        pid.0
    }
}

impl fmt::Display for ProcessId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier a client chooses for its connection
///
/// The registry only compares these for equality. Two live connections may
/// never share the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId
{
    /// Wrap a raw client id.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self
    {
        Self(raw)
    }

    /// Raw client id.
    #[must_use]
    pub const fn raw(self) -> u64
    {
        self.0
    }
}

impl fmt::Display for ClientId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "client#{}", self.0)
    }
}
