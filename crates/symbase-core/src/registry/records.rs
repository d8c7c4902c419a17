//! Registry records.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::events::NotificationCallback;
use crate::set::DebugInfoSet;
use crate::source::ExecutableIdentity;
use crate::storage::SlotId;
use crate::sync::TrackedMutex;
use crate::types::{Address, ClientId, ProcessId};

/// Id of a debug info set in the registry
pub type SetId = SlotId;

/// Lifecycle state of a registered debug info set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadState
{
    /// Registered but without tables (never loaded, or the last load failed)
    Empty,
    /// A thread is (re)loading the set; others wait
    Loading,
    Loaded,
}

impl fmt::Display for LoadState
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Self::Empty => write!(f, "empty"),
            Self::Loading => write!(f, "loading"),
            Self::Loaded => write!(f, "loaded"),
        }
    }
}

/// What a process record's debug infos are
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DebugBinding
{
    /// No debug infos are available (yet)
    NoDebugInfo,
    /// Bound to a registered set; the binding holds one attach count on it
    Loaded(SetId),
}

impl DebugBinding
{
    #[must_use]
    pub const fn set_id(self) -> Option<SetId>
    {
        match self {
            Self::NoDebugInfo => None,
            Self::Loaded(id) => Some(id),
        }
    }
}

pub(crate) struct DebugInfoRecord
{
    pub(crate) short_name: String,
    pub(crate) executable: PathBuf,
    pub(crate) set: Arc<TrackedMutex<DebugInfoSet>>,
    pub(crate) state: LoadState,
    pub(crate) identity: Option<ExecutableIdentity>,
    /// Number of process records bound to the set
    pub(crate) attach_count: u32,
    /// Registry clock value when the attach count last dropped to zero
    pub(crate) detached_at: u64,
}

impl DebugInfoRecord
{
    pub(crate) fn new(executable: PathBuf, short_name: String, set: DebugInfoSet, now: u64) -> Self
    {
        Self {
            short_name,
            executable,
            set: Arc::new(TrackedMutex::new("debug info set", set)),
            state: LoadState::Empty,
            identity: None,
            attach_count: 0,
            detached_at: now,
        }
    }

    pub(crate) fn is_evictable(&self) -> bool
    {
        self.state == LoadState::Loaded && self.attach_count == 0
    }
}

/// A process known to the registry, running or referenced before start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRecord
{
    pub(crate) name: String,
    pub(crate) pid: Option<ProcessId>,
    pub(crate) base: Address,
    /// Number of connections referring to the record
    pub(crate) attach_count: u32,
    pub(crate) binding: DebugBinding,
}

impl ProcessRecord
{
    pub(crate) fn new(name: String) -> Self
    {
        Self {
            name,
            pid: None,
            base: Address::ZERO,
            attach_count: 0,
            binding: DebugBinding::NoDebugInfo,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str
    {
        &self.name
    }

    /// PID while the process runs.
    #[must_use]
    pub const fn pid(&self) -> Option<ProcessId>
    {
        self.pid
    }

    #[must_use]
    pub const fn is_running(&self) -> bool
    {
        self.pid.is_some()
    }

    /// Load address of the executable image.
    #[must_use]
    pub const fn base(&self) -> Address
    {
        self.base
    }

    #[must_use]
    pub const fn attach_count(&self) -> u32
    {
        self.attach_count
    }

    #[must_use]
    pub const fn binding(&self) -> DebugBinding
    {
        self.binding
    }

    pub(crate) fn matches(&self, name: &str) -> bool
    {
        self.name.eq_ignore_ascii_case(name)
    }

    /// Neither running nor referenced by any connection.
    pub(crate) const fn is_unused(&self) -> bool
    {
        self.pid.is_none() && self.attach_count == 0
    }
}

pub(crate) struct ConnectionRecord
{
    pub(crate) client: ClientId,
    pub(crate) process: SlotId,
    pub(crate) callback: Option<NotificationCallback>,
}

/// Snapshot of a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo
{
    pub client: ClientId,
    pub process_name: String,
    pub pid: Option<ProcessId>,
    pub base: Address,
    pub binding: DebugBinding,
}
