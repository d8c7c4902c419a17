//! Handles callers query registered debug infos through.

use std::sync::Arc;

use super::{DebugBinding, SetId};
use crate::resolver::{AddressExplanation, LabelHit};
use crate::set::DebugInfoSet;
use crate::sync::TrackedMutex;
use crate::types::{Address, ProcessId, TypeNumber};

/// Shared reference to a registered debug info set
///
/// Reading takes the set's own lock, so a reader waits while the set is
/// being reloaded. The registry lock is never involved.
#[derive(Clone)]
pub struct DebugInfoHandle
{
    pub(crate) id: SetId,
    pub(crate) set: Arc<TrackedMutex<DebugInfoSet>>,
}

impl DebugInfoHandle
{
    #[must_use]
    pub const fn id(&self) -> SetId
    {
        self.id
    }

    /// Run `query` against the set.
    #[track_caller]
    pub fn read<R>(&self, query: impl FnOnce(&DebugInfoSet) -> R) -> R
    {
        let set = self.set.lock();
        query(&set)
    }

    /// `true` if both handles refer to the same set object.
    #[must_use]
    pub fn same_set(&self, other: &Self) -> bool
    {
        Arc::ptr_eq(&self.set, &other.set)
    }
}

impl std::fmt::Debug for DebugInfoHandle
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("DebugInfoHandle")
            .field("id", &self.id)
            .field("lock_holder", &self.set.holder())
            .finish()
    }
}

/// A process together with its debug infos
///
/// Address translations use the process base address.
#[derive(Debug, Clone)]
pub struct ProcessView
{
    pub(crate) name: String,
    pub(crate) pid: Option<ProcessId>,
    pub(crate) base: Address,
    pub(crate) binding: DebugBinding,
    pub(crate) debug_infos: Option<DebugInfoHandle>,
}

impl ProcessView
{
    #[must_use]
    pub fn name(&self) -> &str
    {
        &self.name
    }

    #[must_use]
    pub const fn pid(&self) -> Option<ProcessId>
    {
        self.pid
    }

    #[must_use]
    pub const fn base(&self) -> Address
    {
        self.base
    }

    #[must_use]
    pub const fn binding(&self) -> DebugBinding
    {
        self.binding
    }

    /// Debug infos, `None` for [`DebugBinding::NoDebugInfo`].
    #[must_use]
    pub const fn debug_infos(&self) -> Option<&DebugInfoHandle>
    {
        self.debug_infos.as_ref()
    }

    /// Run `query` against the set, if there is one.
    pub fn read<R>(&self, query: impl FnOnce(&DebugInfoSet) -> R) -> Option<R>
    {
        self.debug_infos.as_ref().map(|handle| handle.read(query))
    }

    #[must_use]
    pub fn address_of_label(&self, name: &str) -> Option<Address>
    {
        self.read(|set| set.address_of_label(name, self.base)).flatten()
    }

    #[must_use]
    pub fn label_by_address(&self, address: Address) -> Option<LabelHit>
    {
        self.read(|set| set.label_by_address(address, self.base)).flatten()
    }

    #[must_use]
    pub fn explain_address(&self, address: Address) -> Option<AddressExplanation>
    {
        self.read(|set| set.explain_address(address, self.base)).flatten()
    }

    #[must_use]
    pub fn type_of_label(&self, name: &str) -> Option<TypeNumber>
    {
        self.read(|set| set.type_of_label(name)).flatten()
    }
}
