//! # Registry
//!
//! Shared state of all clients: the debug info sets, the processes and the
//! client connections, each in a fixed-capacity slot pool.
//!
//! ## Locking
//!
//! One registry lock guards all three pools and every lookup, create and
//! eviction decision. Each set additionally has its own lock that guards its
//! tables. The two are never held at the same time: a (re)load marks the set
//! `Loading` under the registry lock, releases it, loads under the set lock
//! and then re-takes the registry lock to publish the result. Other callers
//! asking for a set that is `Loading` wait on a condition variable instead of
//! starting a second load.
//!
//! Notification callbacks are collected while the registry lock is held and
//! invoked after it was released.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use symbase_core::config::RegistryConfig;
//! use symbase_core::registry::Registry;
//! use symbase_core::source::ObjectDwarfSource;
//! use symbase_core::types::{Address, ClientId, ProcessId};
//!
//! let registry = Registry::init(RegistryConfig::default(), Arc::new(ObjectDwarfSource::new()));
//! let exe = Path::new("/opt/app/controller.elf");
//! let view = registry.connect(ClientId::from_raw(1), exe, None)?;
//! registry.start_process(exe, ProcessId(4242), Address::new(0x40_0000))?;
//! println!("{:?}", view.address_of_label("Foo::bar"));
//! # Ok::<(), symbase_core::error::SymbaseError>(())
//! ```

mod records;
mod view;

use std::path::Path;
use std::sync::Arc;

use parking_lot::Condvar;
pub use records::{ConnectionInfo, DebugBinding, LoadState, ProcessRecord, SetId};
use records::{ConnectionRecord, DebugInfoRecord};
use tracing::{debug, warn};
pub use view::{DebugInfoHandle, ProcessView};

use crate::config::RegistryConfig;
use crate::error::{SymbaseError, SymbaseResult};
use crate::events::{Notification, NotificationCallback};
use crate::set::{DebugInfoSet, RenamingRules};
use crate::source::{DebugInfoSource, ExecutableIdentity, ImageInfo};
use crate::storage::{SlotId, SlotPool};
use crate::sync::{TrackedGuard, TrackedMutex};
use crate::types::{Address, ClientId, ProcessId};

struct RegistryState
{
    sets: SlotPool<DebugInfoRecord>,
    processes: SlotPool<ProcessRecord>,
    connections: SlotPool<ConnectionRecord>,
    /// Logical clock stamping detach times
    clock: u64,
    shut_down: bool,
}

/// Callbacks to run once the registry lock is released.
type Pending = Vec<(NotificationCallback, ClientId, Notification)>;

fn dispatch(pending: Pending)
{
    for (callback, client, notification) in pending {
        callback(client, &notification);
    }
}

/// File name an executable is registered under.
fn short_name(executable: &Path) -> String
{
    executable
        .file_name()
        .map_or_else(|| executable.display().to_string(), |name| name.to_string_lossy().into_owned())
}

impl RegistryState
{
    fn tick(&mut self) -> u64
    {
        self.clock += 1;
        self.clock
    }

    fn find_set(&self, short_name: &str) -> Option<SetId>
    {
        self.sets
            .iter()
            .find(|(_, record)| record.short_name.eq_ignore_ascii_case(short_name))
            .map(|(id, _)| id)
    }

    fn find_process(&self, name: &str) -> Option<SlotId>
    {
        self.processes
            .iter()
            .find(|(_, record)| record.matches(name))
            .map(|(id, _)| id)
    }

    fn find_connection(&self, client: ClientId) -> Option<SlotId>
    {
        self.connections
            .iter()
            .find(|(_, connection)| connection.client == client)
            .map(|(id, _)| id)
    }

    fn handle(&self, id: SetId) -> Option<DebugInfoHandle>
    {
        self.sets.get(id).map(|record| DebugInfoHandle {
            id,
            set: Arc::clone(&record.set),
        })
    }

    fn view(&self, process: SlotId) -> Option<ProcessView>
    {
        let record = self.processes.get(process)?;
        Some(ProcessView {
            name: record.name.clone(),
            pid: record.pid,
            base: record.base,
            binding: record.binding,
            debug_infos: record.binding.set_id().and_then(|id| self.handle(id)),
        })
    }

    /// Queue `notification` for every connection of `process`.
    fn notify_process(&self, process: SlotId, notification: &Notification, pending: &mut Pending)
    {
        for (_, connection) in self.connections.iter() {
            if connection.process != process {
                continue;
            }
            if let Some(callback) = &connection.callback {
                pending.push((Arc::clone(callback), connection.client, notification.clone()));
            }
        }
    }

    /// Queue `notification` for every connection whose process is bound to `set`.
    fn notify_set(&self, set: SetId, notification: &Notification, pending: &mut Pending)
    {
        let bound: Vec<SlotId> = self
            .processes
            .iter()
            .filter(|(_, record)| record.binding == DebugBinding::Loaded(set))
            .map(|(id, _)| id)
            .collect();
        for process in bound {
            self.notify_process(process, notification, pending);
        }
    }

    fn attach_set(&mut self, id: SetId)
    {
        if let Some(record) = self.sets.get_mut(id) {
            record.attach_count += 1;
        }
    }

    fn detach_set(&mut self, id: SetId)
    {
        let now = self.tick();
        if let Some(record) = self.sets.get_mut(id) {
            record.attach_count = record.attach_count.saturating_sub(1);
            if record.attach_count == 0 {
                record.detached_at = now;
            }
        }
    }

    /// Bind an unbound process record to `set`.
    fn bind(&mut self, process: SlotId, set: SetId, pending: &mut Pending)
    {
        let Some(record) = self.processes.get_mut(process) else {
            return;
        };
        if record.binding == DebugBinding::Loaded(set) {
            return;
        }
        let previous = std::mem::replace(&mut record.binding, DebugBinding::Loaded(set));
        if let DebugBinding::Loaded(previous) = previous {
            self.detach_set(previous);
        }
        self.attach_set(set);
        if let Some(executable) = self.sets.get(set).map(|record| record.short_name.clone()) {
            self.notify_process(process, &Notification::DebugInfosLoaded { executable }, pending);
        }
    }

    /// Drop a process record that nothing uses any more.
    fn release_process_if_unused(&mut self, process: SlotId)
    {
        if !self.processes.get(process).is_some_and(ProcessRecord::is_unused) {
            return;
        }
        if let Some(record) = self.processes.remove(process) {
            debug!(process = %record.name, "process record released");
            if let DebugBinding::Loaded(set) = record.binding {
                self.detach_set(set);
            }
        }
    }

    /// Find or create the process record `name`.
    fn process_slot(&mut self, name: &str, capacity: usize) -> SymbaseResult<SlotId>
    {
        if let Some(id) = self.find_process(name) {
            return Ok(id);
        }
        self.processes
            .allocate(ProcessRecord::new(name.to_owned()))
            .map_err(|_| SymbaseError::CapacityExhausted {
                pool: "process",
                capacity,
            })
    }
}

/// Registry of debug info sets, processes and connections
pub struct Registry
{
    state: TrackedMutex<RegistryState>,
    loaded: Condvar,
    config: RegistryConfig,
    source: Arc<dyn DebugInfoSource>,
}

impl Registry
{
    /// Create an empty registry
    ///
    /// `source` loads the debug infos of every executable registered later.
    #[must_use]
    pub fn init(config: RegistryConfig, source: Arc<dyn DebugInfoSource>) -> Self
    {
        let state = RegistryState {
            sets: SlotPool::with_capacity(config.max_debug_infos),
            processes: SlotPool::with_capacity(config.max_processes),
            connections: SlotPool::with_capacity(config.max_connections),
            clock: 0,
            shut_down: false,
        };
        debug!(
            max_debug_infos = config.max_debug_infos,
            max_processes = config.max_processes,
            max_connections = config.max_connections,
            "registry initialized"
        );
        Self {
            state: TrackedMutex::new("registry", state),
            loaded: Condvar::new(),
            config,
            source,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &RegistryConfig
    {
        &self.config
    }

    #[track_caller]
    fn lock(&self) -> SymbaseResult<TrackedGuard<'_, RegistryState>>
    {
        let state = self.state.lock();
        if state.shut_down {
            return Err(SymbaseError::ShutDown);
        }
        Ok(state)
    }

    /// Get the debug infos of `executable`, loading them if needed
    ///
    /// Sets are shared by executable file name (case-insensitive). A set
    /// whose executable changed on disk since it was loaded, or can no longer
    /// be read, is reloaded. Concurrent callers for the same executable wait
    /// for a single load.
    ///
    /// ## Errors
    ///
    /// - `CapacityExhausted`: no free set slot, even after evicting
    /// - the load errors of [`DebugInfoSet::load`]
    /// - `ShutDown`
    pub fn lookup_or_create(&self, executable: &Path) -> SymbaseResult<DebugInfoHandle>
    {
        let name = short_name(executable);
        let current = self.source.identity(executable).ok();
        let mut pending = Pending::new();

        let mut state = self.lock()?;
        let id = loop {
            if state.shut_down {
                return Err(SymbaseError::ShutDown);
            }
            let Some(id) = state.find_set(&name) else {
                break self.create_set(&mut state, executable, &name)?;
            };
            let Some((load_state, identity)) = state.sets.get(id).map(|record| (record.state, record.identity)) else {
                break self.create_set(&mut state, executable, &name)?;
            };
            match load_state {
                LoadState::Loading => {
                    state.wait(&self.loaded);
                    continue;
                }
                LoadState::Loaded if current.is_some() && identity == current => {
                    return state.handle(id).ok_or(SymbaseError::ShutDown);
                }
                LoadState::Loaded => {
                    debug!(executable = %name, "debug infos stale, reloading");
                    break id;
                }
                LoadState::Empty => break id,
            }
        };

        let result = self.load_set(state, id, &mut pending);
        dispatch(pending);
        result
    }

    fn create_set(&self, state: &mut RegistryState, executable: &Path, name: &str) -> SymbaseResult<SetId>
    {
        if state.sets.len() >= state.sets.capacity() {
            self.sweep_locked(state);
        }
        let mut set = DebugInfoSet::new(executable).with_renaming(self.config.rules_for(name));
        set.set_image(ImageInfo {
            pointer_size: self.config.default_pointer_size,
            ..ImageInfo::default()
        });
        let now = state.tick();
        state
            .sets
            .allocate(DebugInfoRecord::new(executable.to_path_buf(), name.to_owned(), set, now))
            .map_err(|_| SymbaseError::CapacityExhausted {
                pool: "debug info",
                capacity: self.config.max_debug_infos,
            })
    }

    /// Load set `id` following the reload protocol. Consumes the registry guard.
    fn load_set(
        &self,
        mut state: TrackedGuard<'_, RegistryState>,
        id: SetId,
        pending: &mut Pending,
    ) -> SymbaseResult<DebugInfoHandle>
    {
        let (set, executable, was_loaded) = {
            let record = state
                .sets
                .get_mut(id)
                .ok_or_else(|| SymbaseError::Internal(format!("debug info slot {id} vanished")))?;
            let was_loaded = record.state == LoadState::Loaded;
            record.state = LoadState::Loading;
            (Arc::clone(&record.set), record.executable.clone(), was_loaded)
        };
        drop(state);

        let outcome: SymbaseResult<Option<ExecutableIdentity>> = {
            let mut guard = set.lock();
            guard.load(self.source.as_ref()).map(|()| guard.identity())
        };

        let mut state = self.state.lock();
        self.loaded.notify_all();
        let Some(record) = state.sets.get_mut(id) else {
            // the registry was shut down meanwhile
            drop(state);
            set.lock().clear();
            return Err(SymbaseError::ShutDown);
        };
        let short = record.short_name.clone();

        match outcome {
            Ok(identity) => {
                record.state = LoadState::Loaded;
                record.identity = identity;
                if record.attach_count == 0 {
                    let now = state.tick();
                    if let Some(record) = state.sets.get_mut(id) {
                        record.detached_at = now;
                    }
                }
                state.notify_set(id, &Notification::DebugInfosLoaded { executable: short }, pending);
                debug!(executable = %executable.display(), "debug info set published");
                state.handle(id).ok_or(SymbaseError::ShutDown)
            }
            Err(err) => {
                record.state = LoadState::Empty;
                record.identity = None;
                warn!(executable = %executable.display(), error = %err, "debug info load failed");
                if was_loaded {
                    state.notify_set(id, &Notification::DebugInfosUnloaded { executable: short }, pending);
                }
                if state.sets.get(id).is_some_and(|record| record.attach_count == 0) {
                    state.sets.remove(id);
                }
                Err(err)
            }
        }
    }

    /// A process started
    ///
    /// Binds the process record (created if no client referenced it before)
    /// to the debug infos of `executable` and notifies its connections. If
    /// the debug infos cannot be loaded the process is still registered,
    /// with [`DebugBinding::NoDebugInfo`].
    ///
    /// ## Errors
    ///
    /// - `ProcessAlreadyRunning`: a process with this name runs already
    /// - `CapacityExhausted`: no free process slot
    /// - `ShutDown`
    pub fn start_process(&self, executable: &Path, pid: ProcessId, base: Address) -> SymbaseResult<ProcessView>
    {
        let name = short_name(executable);
        let debug_infos = match self.lookup_or_create(executable) {
            Ok(handle) => Some(handle),
            Err(SymbaseError::ShutDown) => return Err(SymbaseError::ShutDown),
            Err(err) => {
                warn!(process = %name, error = %err, "process started without debug infos");
                None
            }
        };

        let mut pending = Pending::new();
        let view = {
            let mut state = self.lock()?;
            if let Some(running) = state
                .find_process(&name)
                .and_then(|id| state.processes.get(id))
                .and_then(ProcessRecord::pid)
            {
                return Err(SymbaseError::ProcessAlreadyRunning {
                    name,
                    pid: running.0,
                });
            }
            let process = state.process_slot(&name, self.config.max_processes)?;
            if let Some(record) = state.processes.get_mut(process) {
                record.pid = Some(pid);
                record.base = base;
            }
            if let Some(handle) = &debug_infos {
                if state.sets.get(handle.id).is_some() {
                    state.bind(process, handle.id, &mut pending);
                }
            }
            state.notify_process(process, &Notification::ProcessStarted { name: name.clone(), pid, base }, &mut pending);
            debug!(process = %name, %pid, %base, "process started");
            state
                .view(process)
                .ok_or_else(|| SymbaseError::Internal(format!("process record {name} vanished")))?
        };
        dispatch(pending);
        Ok(view)
    }

    /// A process terminated
    ///
    /// The record stays while connections refer to it; its debug infos stay
    /// cached until evicted.
    ///
    /// ## Errors
    ///
    /// `UnknownProcess` if no running process has this name.
    pub fn terminate_process(&self, name: &str) -> SymbaseResult<()>
    {
        let mut pending = Pending::new();
        {
            let mut state = self.lock()?;
            let process = state
                .find_process(name)
                .filter(|id| state.processes.get(*id).is_some_and(ProcessRecord::is_running))
                .ok_or_else(|| SymbaseError::UnknownProcess(name.to_owned()))?;
            let Some(record) = state.processes.get_mut(process) else {
                return Err(SymbaseError::UnknownProcess(name.to_owned()));
            };
            let pid = record.pid.take();
            let notification = Notification::ProcessTerminated {
                name: record.name.clone(),
                pid,
            };
            state.notify_process(process, &notification, &mut pending);
            state.release_process_if_unused(process);
            debug!(process = name, "process terminated");
        }
        dispatch(pending);
        Ok(())
    }

    /// Connect a client to the process running (or later running) `executable`
    ///
    /// Loads the debug infos if needed. If they cannot be loaded (the
    /// executable is not built yet, say) the connection is still made, with
    /// [`DebugBinding::NoDebugInfo`]; [`start_process`](Self::start_process)
    /// binds it later. `callback` receives the notifications of the process.
    ///
    /// ## Errors
    ///
    /// - `DuplicateConnection`: `client` is connected already
    /// - `CapacityExhausted`: no free connection, process or debug info slot
    /// - `ShutDown`
    pub fn connect(
        &self,
        client: ClientId,
        executable: &Path,
        callback: Option<NotificationCallback>,
    ) -> SymbaseResult<ProcessView>
    {
        {
            let state = self.lock()?;
            if state.find_connection(client).is_some() {
                return Err(SymbaseError::DuplicateConnection(client));
            }
        }
        let name = short_name(executable);
        let handle = match self.lookup_or_create(executable) {
            Ok(handle) => Some(handle),
            Err(err @ (SymbaseError::ShutDown | SymbaseError::CapacityExhausted { .. })) => return Err(err),
            Err(err) => {
                // bound later by start_process once the executable is readable
                warn!(%client, process = %name, error = %err, "client connected without debug infos");
                None
            }
        };

        let mut pending = Pending::new();
        let view = {
            let mut state = self.lock()?;
            if state.find_connection(client).is_some() {
                return Err(SymbaseError::DuplicateConnection(client));
            }
            if state.connections.len() >= state.connections.capacity() {
                return Err(SymbaseError::CapacityExhausted {
                    pool: "connection",
                    capacity: self.config.max_connections,
                });
            }
            let process = state.process_slot(&name, self.config.max_processes)?;
            let connection = ConnectionRecord {
                client,
                process,
                callback,
            };
            if state.connections.allocate(connection).is_err() {
                state.release_process_if_unused(process);
                return Err(SymbaseError::CapacityExhausted {
                    pool: "connection",
                    capacity: self.config.max_connections,
                });
            }
            if let Some(record) = state.processes.get_mut(process) {
                record.attach_count += 1;
            }
            let unbound = state
                .processes
                .get(process)
                .is_some_and(|record| record.binding == DebugBinding::NoDebugInfo);
            if let Some(handle) = handle.filter(|handle| unbound && state.sets.get(handle.id).is_some()) {
                state.bind(process, handle.id, &mut pending);
            }
            debug!(%client, process = %name, "client connected");
            state
                .view(process)
                .ok_or_else(|| SymbaseError::Internal(format!("process record {name} vanished")))?
        };
        dispatch(pending);
        Ok(view)
    }

    /// Drop a connection; an unused process record goes with it
    ///
    /// ## Errors
    ///
    /// `UnknownConnection` if `client` is not connected.
    pub fn disconnect(&self, client: ClientId) -> SymbaseResult<()>
    {
        let mut state = self.lock()?;
        let id = state
            .find_connection(client)
            .ok_or(SymbaseError::UnknownConnection(client))?;
        let Some(connection) = state.connections.remove(id) else {
            return Err(SymbaseError::UnknownConnection(client));
        };
        if let Some(record) = state.processes.get_mut(connection.process) {
            record.attach_count = record.attach_count.saturating_sub(1);
        }
        state.release_process_if_unused(connection.process);
        debug!(%client, "client disconnected");
        Ok(())
    }

    /// Snapshot of a connection.
    #[must_use]
    pub fn connection(&self, client: ClientId) -> Option<ConnectionInfo>
    {
        let state = self.lock().ok()?;
        let connection = state.connections.get(state.find_connection(client)?)?;
        let process = state.processes.get(connection.process)?;
        Some(ConnectionInfo {
            client,
            process_name: process.name.clone(),
            pid: process.pid,
            base: process.base,
            binding: process.binding,
        })
    }

    /// Snapshot of a process record.
    #[must_use]
    pub fn process(&self, name: &str) -> Option<ProcessRecord>
    {
        let state = self.lock().ok()?;
        state.processes.get(state.find_process(name)?).cloned()
    }

    /// The debug infos of a process, with its base address
    ///
    /// ## Errors
    ///
    /// `UnknownProcess` if there is no record for `name`.
    pub fn process_debug_infos(&self, name: &str) -> SymbaseResult<ProcessView>
    {
        let state = self.lock()?;
        state
            .find_process(name)
            .and_then(|id| state.view(id))
            .ok_or_else(|| SymbaseError::UnknownProcess(name.to_owned()))
    }

    /// Load state of the set registered for `executable`.
    #[must_use]
    pub fn load_state(&self, executable: &Path) -> Option<LoadState>
    {
        let state = self.lock().ok()?;
        let id = state.find_set(&short_name(executable))?;
        state.sets.get(id).map(|record| record.state)
    }

    /// Evict the oldest unattached set if more than the threshold exist
    ///
    /// Only loaded sets nobody is attached to count. Returns the number of
    /// evicted sets.
    pub fn sweep_stale_sets(&self) -> usize
    {
        let Ok(mut state) = self.lock() else {
            return 0;
        };
        let evicted = self.sweep_locked(&mut state);
        drop(state);
        let count = evicted.len();
        for set in evicted {
            set.lock().clear();
        }
        count
    }

    fn sweep_locked(&self, state: &mut RegistryState) -> Vec<Arc<TrackedMutex<DebugInfoSet>>>
    {
        let candidates = state.sets.iter().filter(|(_, record)| record.is_evictable()).count();
        if candidates <= self.config.eviction_threshold {
            return Vec::new();
        }
        let oldest = state
            .sets
            .iter()
            .filter(|(_, record)| record.is_evictable())
            .min_by_key(|(_, record)| record.detached_at)
            .map(|(id, _)| id);
        let Some(record) = oldest.and_then(|id| state.sets.remove(id)) else {
            return Vec::new();
        };
        debug!(executable = %record.executable.display(), detached_at = record.detached_at, "debug info set evicted");
        vec![record.set]
    }

    /// Tear everything down
    ///
    /// Connections bound to loaded debug infos are notified of the unload.
    /// Every later call fails with `ShutDown`.
    pub fn shutdown(&self)
    {
        let mut pending = Pending::new();
        let sets = {
            let mut state = self.state.lock();
            if state.shut_down {
                return;
            }
            state.shut_down = true;
            let loaded: Vec<(SetId, String)> = state
                .sets
                .iter()
                .filter(|(_, record)| record.state == LoadState::Loaded)
                .map(|(id, record)| (id, record.short_name.clone()))
                .collect();
            for (id, executable) in loaded {
                state.notify_set(id, &Notification::DebugInfosUnloaded { executable }, &mut pending);
            }
            state.connections.drain();
            state.processes.drain();
            let sets: Vec<_> = state.sets.drain().into_iter().map(|record| record.set).collect();
            self.loaded.notify_all();
            sets
        };
        dispatch(pending);
        for set in sets {
            if let Some(mut guard) = set.try_lock() {
                guard.clear();
            }
        }
        debug!("registry shut down");
    }

    #[must_use]
    pub fn debug_info_count(&self) -> usize
    {
        self.state.lock().sets.len()
    }

    #[must_use]
    pub fn process_count(&self) -> usize
    {
        self.state.lock().processes.len()
    }

    #[must_use]
    pub fn connection_count(&self) -> usize
    {
        self.state.lock().connections.len()
    }

    /// Where the registry lock is held, when lock diagnostics are enabled.
    #[must_use]
    pub fn lock_holder(&self) -> Option<crate::sync::LockHolder>
    {
        self.state.holder()
    }
}

impl std::fmt::Debug for Registry
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("Registry")
            .field("config", &self.config)
            .field("lock_holder", &self.state.holder())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests
{
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn test_short_name()
    {
        assert_eq!(short_name(Path::new("/opt/app/Controller.ELF")), "Controller.ELF");
        assert_eq!(short_name(&PathBuf::from("plain")), "plain");
    }
}
