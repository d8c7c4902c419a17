//! # Tracked Locks
//!
//! [`TrackedMutex`] wraps a `parking_lot::Mutex` and, in debug builds or with
//! the `lock-diagnostics` feature, records which thread holds the lock and
//! where it was taken. When a registry operation hangs, [`TrackedMutex::holder`]
//! names the culprit.
//!
//! In release builds without the feature the wrapper adds nothing but the
//! lock's name.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::panic::Location;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
#[cfg(any(debug_assertions, feature = "lock-diagnostics"))]
use tracing::trace;

/// Thread and call site currently holding a [`TrackedMutex`]
#[derive(Debug, Clone)]
pub struct LockHolder
{
    pub thread: ThreadId,
    pub thread_name: Option<String>,
    pub location: &'static Location<'static>,
    pub since: Instant,
}

impl LockHolder
{
    #[cfg(any(debug_assertions, feature = "lock-diagnostics"))]
    fn current(location: &'static Location<'static>) -> Self
    {
        let current = thread::current();
        Self {
            thread: current.id(),
            thread_name: current.name().map(str::to_owned),
            location,
            since: Instant::now(),
        }
    }

    /// How long the lock has been held.
    #[must_use]
    pub fn held_for(&self) -> Duration
    {
        self.since.elapsed()
    }

    /// `true` if the calling thread is the holder.
    #[must_use]
    pub fn is_current_thread(&self) -> bool
    {
        self.thread == thread::current().id()
    }
}

impl fmt::Display for LockHolder
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let name = self.thread_name.as_deref().unwrap_or("<unnamed>");
        write!(f, "thread {name} ({:?}) at {}", self.thread, self.location)
    }
}

/// Mutex that remembers its holder for diagnostics
pub struct TrackedMutex<T>
{
    name: &'static str,
    inner: Mutex<T>,
    #[cfg(any(debug_assertions, feature = "lock-diagnostics"))]
    holder: Mutex<Option<LockHolder>>,
}

impl<T> TrackedMutex<T>
{
    #[must_use]
    pub const fn new(name: &'static str, value: T) -> Self
    {
        Self {
            name,
            inner: Mutex::new(value),
            #[cfg(any(debug_assertions, feature = "lock-diagnostics"))]
            holder: Mutex::new(None),
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str
    {
        self.name
    }

    /// Block until the lock is available
    ///
    /// The caller's location is recorded as the holder.
    #[track_caller]
    pub fn lock(&self) -> TrackedGuard<'_, T>
    {
        let guard = self.inner.lock();
        self.record_holder(Location::caller());
        TrackedGuard { mutex: self, guard }
    }

    /// Take the lock if it is free.
    #[track_caller]
    pub fn try_lock(&self) -> Option<TrackedGuard<'_, T>>
    {
        let guard = self.inner.try_lock()?;
        self.record_holder(Location::caller());
        Some(TrackedGuard { mutex: self, guard })
    }

    /// Current holder. Always `None` without lock diagnostics.
    #[must_use]
    pub fn holder(&self) -> Option<LockHolder>
    {
        #[cfg(any(debug_assertions, feature = "lock-diagnostics"))]
        {
            self.holder.lock().clone()
        }
        #[cfg(not(any(debug_assertions, feature = "lock-diagnostics")))]
        {
            None
        }
    }

    pub fn get_mut(&mut self) -> &mut T
    {
        self.inner.get_mut()
    }

    pub fn into_inner(self) -> T
    {
        self.inner.into_inner()
    }

    #[cfg_attr(not(any(debug_assertions, feature = "lock-diagnostics")), allow(unused_variables))]
    fn record_holder(&self, location: &'static Location<'static>)
    {
        #[cfg(any(debug_assertions, feature = "lock-diagnostics"))]
        {
            trace!(lock = self.name, %location, "lock acquired");
            *self.holder.lock() = Some(LockHolder::current(location));
        }
    }

    fn clear_holder(&self)
    {
        #[cfg(any(debug_assertions, feature = "lock-diagnostics"))]
        {
            *self.holder.lock() = None;
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for TrackedMutex<T>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("TrackedMutex")
            .field("name", &self.name)
            .field("holder", &self.holder())
            .finish_non_exhaustive()
    }
}

/// Guard of a [`TrackedMutex`]; clears the holder record on drop
pub struct TrackedGuard<'a, T>
{
    mutex: &'a TrackedMutex<T>,
    guard: MutexGuard<'a, T>,
}

impl<T> TrackedGuard<'_, T>
{
    /// Release the lock, wait on `condvar` and take the lock again
    ///
    /// The holder record follows: cleared while waiting, the caller's
    /// location once woken.
    #[track_caller]
    pub fn wait(&mut self, condvar: &Condvar)
    {
        let location = Location::caller();
        self.mutex.clear_holder();
        condvar.wait(&mut self.guard);
        self.mutex.record_holder(location);
    }
}

impl<T> Deref for TrackedGuard<'_, T>
{
    type Target = T;

    fn deref(&self) -> &T
    {
        &self.guard
    }
}

impl<T> DerefMut for TrackedGuard<'_, T>
{
    fn deref_mut(&mut self) -> &mut T
    {
        &mut self.guard
    }
}

impl<T> Drop for TrackedGuard<'_, T>
{
    fn drop(&mut self)
    {
        self.mutex.clear_holder();
    }
}

#[cfg(test)]
mod tests
{
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_lock_and_mutate()
    {
        let mutex = TrackedMutex::new("counter", 0_u32);
        *mutex.lock() += 1;
        *mutex.lock() += 1;
        assert_eq!(mutex.into_inner(), 2);
    }

    #[cfg(any(debug_assertions, feature = "lock-diagnostics"))]
    #[test]
    fn test_holder_is_recorded_and_cleared()
    {
        let mutex = TrackedMutex::new("registry", ());
        assert!(mutex.holder().is_none());
        {
            let _guard = mutex.lock();
            let holder = mutex.holder().unwrap();
            assert!(holder.is_current_thread());
            assert!(holder.location.file().ends_with("sync.rs"));
            assert!(mutex.try_lock().is_none());
        }
        assert!(mutex.holder().is_none());
    }

    #[test]
    fn test_wait_releases_lock()
    {
        let shared = Arc::new((TrackedMutex::new("flag", false), Condvar::new()));
        let waker = Arc::clone(&shared);
        let handle = thread::spawn(move || {
            let (mutex, condvar) = &*waker;
            *mutex.lock() = true;
            condvar.notify_all();
        });

        let (mutex, condvar) = &*shared;
        let mut guard = mutex.lock();
        while !*guard {
            guard.wait(condvar);
        }
        drop(guard);
        handle.join().unwrap();
    }
}
