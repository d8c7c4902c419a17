//! Registry notification types and helpers.
//!
//! Connections receive these whenever the process they are bound to starts
//! or terminates, or whenever the debug infos bound to that process are
//! loaded or unloaded. The registry collects them while it holds its lock and
//! delivers them after releasing it, so a callback may call back into the
//! registry.

use std::sync::mpsc;
use std::sync::Arc;

use crate::types::{Address, ClientId, ProcessId};

/// Event delivered to a connection's callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification
{
    /// The process a connection refers to is running now.
    ProcessStarted
    {
        name: String,
        pid: ProcessId,
        /// Address the executable image was loaded at.
        base: Address,
    },
    /// The process terminated; its debug infos stay cached.
    ProcessTerminated
    {
        name: String,
        pid: Option<ProcessId>,
    },
    /// Debug infos of the executable are loaded (or reloaded) and queryable.
    DebugInfosLoaded
    {
        executable: String,
    },
    /// Debug infos of the executable were dropped.
    DebugInfosUnloaded
    {
        executable: String,
    },
}

impl Notification
{
    /// Human-readable description of the notification.
    #[must_use]
    pub fn describe(&self) -> String
    {
        match self {
            Self::ProcessStarted { name, pid, base } => {
                format!("Process {name} started with PID {pid} at {base}")
            }
            Self::ProcessTerminated { name, pid } => match pid {
                Some(pid) => format!("Process {name} (PID {pid}) terminated"),
                None => format!("Process {name} terminated"),
            },
            Self::DebugInfosLoaded { executable } => format!("Debug infos for {executable} loaded"),
            Self::DebugInfosUnloaded { executable } => format!("Debug infos for {executable} unloaded"),
        }
    }
}

/// Callback a connection is notified through. Gets the connection's id.
pub type NotificationCallback = Arc<dyn Fn(ClientId, &Notification) + Send + Sync>;

/// Sender side of a notification channel.
pub type NotificationSender = mpsc::Sender<(ClientId, Notification)>;
/// Receiver side of a notification channel.
pub type NotificationReceiver = mpsc::Receiver<(ClientId, Notification)>;

/// Create a new notification channel.
#[must_use]
pub fn notification_channel() -> (NotificationSender, NotificationReceiver)
{
    mpsc::channel()
}

/// Callback that forwards every notification into a channel
///
/// Send errors (receiver dropped) are ignored.
///
/// ## Example
///
/// ```rust
/// use symbase_core::events::{channel_callback, notification_channel, Notification};
/// use symbase_core::types::ClientId;
///
/// let (sender, receiver) = notification_channel();
/// let callback = channel_callback(sender);
/// callback(ClientId::from_raw(1), &Notification::DebugInfosLoaded { executable: "app.elf".into() });
///
/// let (client, notification) = receiver.recv().unwrap();
/// assert_eq!(client.raw(), 1);
/// assert_eq!(notification.describe(), "Debug infos for app.elf loaded");
/// ```
#[must_use]
pub fn channel_callback(sender: NotificationSender) -> NotificationCallback
{
    let sender = parking_lot::Mutex::new(sender);
    Arc::new(move |client: ClientId, notification: &Notification| {
        let _ = sender.lock().send((client, notification.clone()));
    })
}
