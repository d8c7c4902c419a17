//! Tests for the registry: sharing, reloading, eviction and notifications

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use symbase_core::config::{RegistryConfig, RenamingEntry};
use symbase_core::error::{SymbaseError, SymbaseResult};
use symbase_core::events::{channel_callback, notification_channel, Notification};
use symbase_core::registry::{DebugBinding, LoadState, Registry};
use symbase_core::set::{DebugInfoSet, RenameRule};
use symbase_core::source::{DebugFormat, DebugInfoSource, ExecutableIdentity, ImageInfo};
use symbase_core::types::{Address, BaseType, ClientId, ProcessId};

/// Source serving a fixed label set, with a controllable identity stamp
#[derive(Default)]
struct MemorySource
{
    loads: AtomicUsize,
    stamp: AtomicU64,
    unreadable: AtomicBool,
    delay_ms: u64,
}

impl MemorySource
{
    fn slow(delay_ms: u64) -> Self
    {
        Self {
            delay_ms,
            ..Self::default()
        }
    }

    fn loads(&self) -> usize
    {
        self.loads.load(Ordering::SeqCst)
    }

    fn touch(&self)
    {
        self.stamp.fetch_add(1, Ordering::SeqCst);
    }
}

impl DebugInfoSource for MemorySource
{
    fn identity(&self, executable: &Path) -> SymbaseResult<ExecutableIdentity>
    {
        if self.unreadable.load(Ordering::SeqCst) {
            return Err(SymbaseError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is gone", executable.display()),
            )));
        }
        Ok(ExecutableIdentity {
            modified: 1_700_000_000,
            checksum: self.stamp.load(Ordering::SeqCst),
        })
    }

    fn image_info(&self, _executable: &Path) -> SymbaseResult<ImageInfo>
    {
        Ok(ImageInfo::default())
    }

    fn populate(&self, _executable: &Path, _image: &ImageInfo, set: &mut DebugInfoSet) -> SymbaseResult<()>
    {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.delay_ms > 0 {
            thread::sleep(Duration::from_millis(self.delay_ms));
        }
        set.insert_label("Mod_Speed", BaseType::Real32.type_number(), 0x2000)?;
        set.insert_label("counter", BaseType::UInt32.type_number(), 0x2004)?;
        Ok(())
    }

    fn detect_format(&self, _executable: &Path) -> SymbaseResult<DebugFormat>
    {
        Ok(DebugFormat::Embedded)
    }
}

fn controller() -> &'static Path
{
    Path::new("/opt/app/controller.elf")
}

fn registry_with(config: RegistryConfig) -> (Registry, Arc<MemorySource>)
{
    let source = Arc::new(MemorySource::default());
    (Registry::init(config, source.clone()), source)
}

#[test]
fn test_stale_set_reloads_exactly_once()
{
    let (registry, source) = registry_with(RegistryConfig::default());
    let view = registry.connect(ClientId::from_raw(1), controller(), None).unwrap();
    let first = view.debug_infos().unwrap().clone();
    assert_eq!(source.loads(), 1);

    let again = registry.lookup_or_create(controller()).unwrap();
    assert!(again.same_set(&first));
    assert_eq!(source.loads(), 1);

    source.touch();
    let reloaded = registry.lookup_or_create(controller()).unwrap();
    assert_eq!(source.loads(), 2);
    assert!(reloaded.same_set(&first));

    registry.lookup_or_create(controller()).unwrap();
    assert_eq!(source.loads(), 2);
    assert_eq!(view.address_of_label("counter"), Some(Address::new(0x2004)));
}

#[test]
fn test_lookup_is_case_insensitive_on_file_name()
{
    let (registry, source) = registry_with(RegistryConfig::default());
    let first = registry.lookup_or_create(controller()).unwrap();
    let other = registry
        .lookup_or_create(Path::new("/mnt/other/CONTROLLER.ELF"))
        .unwrap();
    assert!(first.same_set(&other));
    assert_eq!(source.loads(), 1);
    assert_eq!(registry.debug_info_count(), 1);
}

#[test]
fn test_sweep_evicts_oldest_unattached_set()
{
    let (registry, _source) = registry_with(RegistryConfig::default());
    for name in ["a.elf", "b.elf", "c.elf"] {
        registry.lookup_or_create(Path::new(name)).unwrap();
    }
    assert_eq!(registry.debug_info_count(), 3);

    assert_eq!(registry.sweep_stale_sets(), 1);
    assert_eq!(registry.debug_info_count(), 2);
    assert_eq!(registry.load_state(Path::new("a.elf")), None);
    assert_eq!(registry.load_state(Path::new("c.elf")), Some(LoadState::Loaded));

    assert_eq!(registry.sweep_stale_sets(), 0);
    assert_eq!(registry.debug_info_count(), 2);
}

#[test]
fn test_attached_sets_are_not_evicted()
{
    let (registry, _source) = registry_with(RegistryConfig::default());
    registry.connect(ClientId::from_raw(1), Path::new("a.elf"), None).unwrap();
    for name in ["b.elf", "c.elf"] {
        registry.lookup_or_create(Path::new(name)).unwrap();
    }
    assert_eq!(registry.sweep_stale_sets(), 0);

    registry.lookup_or_create(Path::new("d.elf")).unwrap();
    assert_eq!(registry.sweep_stale_sets(), 1);
    assert_eq!(registry.load_state(Path::new("a.elf")), Some(LoadState::Loaded));
    assert_eq!(registry.load_state(Path::new("b.elf")), None);
}

#[test]
fn test_concurrent_lookups_share_one_load()
{
    let source = Arc::new(MemorySource::slow(50));
    let registry = Registry::init(RegistryConfig::default(), source.clone());

    let (left, right) = thread::scope(|scope| {
        let left = scope.spawn(|| registry.lookup_or_create(controller()).unwrap());
        let right = scope.spawn(|| registry.lookup_or_create(controller()).unwrap());
        (left.join().unwrap(), right.join().unwrap())
    });

    assert_eq!(source.loads(), 1);
    assert!(left.same_set(&right));
    assert_eq!(left.id(), right.id());
}

#[test]
fn test_process_lifecycle_notifications()
{
    let (registry, _source) = registry_with(RegistryConfig::default());
    let (sender, receiver) = notification_channel();
    let client = ClientId::from_raw(7);

    let view = registry
        .connect(client, controller(), Some(channel_callback(sender)))
        .unwrap();
    assert!(matches!(view.binding(), DebugBinding::Loaded(_)));
    assert!(view.pid().is_none());

    registry
        .start_process(controller(), ProcessId(42), Address::new(0x40_0000))
        .unwrap();
    registry.terminate_process("controller.elf").unwrap();

    let received: Vec<_> = receiver.try_iter().collect();
    assert!(received.iter().all(|(id, _)| *id == client));
    let notifications: Vec<_> = received.into_iter().map(|(_, notification)| notification).collect();
    assert_eq!(
        notifications,
        vec![
            Notification::DebugInfosLoaded {
                executable: "controller.elf".into()
            },
            Notification::ProcessStarted {
                name: "controller.elf".into(),
                pid: ProcessId(42),
                base: Address::new(0x40_0000),
            },
            Notification::ProcessTerminated {
                name: "controller.elf".into(),
                pid: Some(ProcessId(42)),
            },
        ]
    );

    // the connection keeps the record alive
    let record = registry.process("controller.elf").unwrap();
    assert!(!record.is_running());
    assert_eq!(record.attach_count(), 1);
}

#[test]
fn test_process_view_uses_base_address()
{
    let (registry, _source) = registry_with(RegistryConfig::default());
    registry
        .start_process(controller(), ProcessId(9), Address::new(0x1000))
        .unwrap();
    let view = registry.process_debug_infos("Controller.elf").unwrap();
    assert_eq!(view.base(), Address::new(0x1000));
    assert_eq!(view.pid(), Some(ProcessId(9)));
    assert_eq!(view.type_of_label("counter"), Some(BaseType::UInt32.type_number()));
}

#[test]
fn test_registry_protocol_errors()
{
    let (registry, _source) = registry_with(RegistryConfig::default());
    registry
        .start_process(controller(), ProcessId(1), Address::ZERO)
        .unwrap();
    assert!(matches!(
        registry.start_process(controller(), ProcessId(2), Address::ZERO),
        Err(SymbaseError::ProcessAlreadyRunning { pid: 1, .. })
    ));
    assert!(matches!(
        registry.terminate_process("unknown.elf"),
        Err(SymbaseError::UnknownProcess(_))
    ));
    assert!(matches!(
        registry.disconnect(ClientId::from_raw(3)),
        Err(SymbaseError::UnknownConnection(_))
    ));
    assert!(matches!(
        registry.process_debug_infos("unknown.elf"),
        Err(SymbaseError::UnknownProcess(_))
    ));

    registry.connect(ClientId::from_raw(3), controller(), None).unwrap();
    assert!(matches!(
        registry.connect(ClientId::from_raw(3), controller(), None),
        Err(SymbaseError::DuplicateConnection(_))
    ));
}

#[test]
fn test_connection_capacity()
{
    let config = RegistryConfig {
        max_connections: 1,
        ..RegistryConfig::default()
    };
    let (registry, _source) = registry_with(config);
    registry.connect(ClientId::from_raw(1), controller(), None).unwrap();
    let refused = registry.connect(ClientId::from_raw(2), controller(), None);
    assert!(matches!(
        refused,
        Err(SymbaseError::CapacityExhausted {
            pool: "connection",
            capacity: 1
        })
    ));
    assert_eq!(registry.connection_count(), 1);

    registry.disconnect(ClientId::from_raw(1)).unwrap();
    assert_eq!(registry.connection_count(), 0);
    assert_eq!(registry.process_count(), 0);
    registry.connect(ClientId::from_raw(2), controller(), None).unwrap();
}

#[test]
fn test_connection_snapshot()
{
    let (registry, _source) = registry_with(RegistryConfig::default());
    registry.connect(ClientId::from_raw(5), controller(), None).unwrap();
    let info = registry.connection(ClientId::from_raw(5)).unwrap();
    assert_eq!(info.process_name, "controller.elf");
    assert!(info.pid.is_none());
    assert!(info.binding.set_id().is_some());
    assert!(registry.connection(ClientId::from_raw(6)).is_none());
}

#[test]
fn test_renaming_rules_from_config()
{
    let config = RegistryConfig {
        renaming: vec![RenamingEntry {
            executable: "controller.elf".into(),
            rule: RenameRule::new("^Mod_", ""),
        }],
        ..RegistryConfig::default()
    };
    let (registry, _source) = registry_with(config);
    let handle = registry.lookup_or_create(controller()).unwrap();
    handle.read(|set| {
        assert_eq!(set.address_of_label("Speed", Address::ZERO), Some(Address::new(0x2000)));
        assert_eq!(set.address_of_label("Mod_Speed", Address::ZERO), None);
    });

    // other executables keep their names
    let other = registry.lookup_or_create(Path::new("other.elf")).unwrap();
    assert!(other.read(|set| set.address_of_label("Mod_Speed", Address::ZERO).is_some()));
}

#[test]
fn test_unreadable_executable()
{
    let (registry, source) = registry_with(RegistryConfig::default());
    source.unreadable.store(true, Ordering::SeqCst);

    let view = registry
        .start_process(controller(), ProcessId(11), Address::ZERO)
        .unwrap();
    assert_eq!(view.binding(), DebugBinding::NoDebugInfo);
    assert!(view.address_of_label("counter").is_none());
    assert_eq!(registry.debug_info_count(), 0);

    let view = registry.connect(ClientId::from_raw(1), controller(), None).unwrap();
    assert_eq!(view.binding(), DebugBinding::NoDebugInfo);
    assert_eq!(registry.connection_count(), 1);
}

#[test]
fn test_connect_before_executable_is_built()
{
    let (registry, source) = registry_with(RegistryConfig::default());
    source.unreadable.store(true, Ordering::SeqCst);
    let (sender, receiver) = notification_channel();

    let view = registry
        .connect(ClientId::from_raw(5), controller(), Some(channel_callback(sender)))
        .unwrap();
    assert_eq!(view.binding(), DebugBinding::NoDebugInfo);
    assert_eq!(registry.connection_count(), 1);
    assert_eq!(registry.debug_info_count(), 0);
    assert_eq!(receiver.try_iter().count(), 0);

    source.unreadable.store(false, Ordering::SeqCst);
    let view = registry
        .start_process(controller(), ProcessId(7), Address::ZERO)
        .unwrap();
    assert!(matches!(view.binding(), DebugBinding::Loaded(_)));
    assert_eq!(view.address_of_label("counter"), Some(Address::new(0x2004)));

    let received: Vec<_> = receiver.try_iter().map(|(_, notification)| notification).collect();
    assert_eq!(received.len(), 2);
    assert!(matches!(&received[0], Notification::DebugInfosLoaded { executable } if executable == "controller.elf"));
    assert!(matches!(&received[1], Notification::ProcessStarted { pid: ProcessId(7), .. }));
}

#[test]
fn test_unreadable_after_load_unloads_bound_set()
{
    let (registry, source) = registry_with(RegistryConfig::default());
    let (sender, receiver) = notification_channel();
    let view = registry
        .connect(ClientId::from_raw(1), controller(), Some(channel_callback(sender)))
        .unwrap();
    let _ = receiver.try_iter().count();

    source.unreadable.store(true, Ordering::SeqCst);
    assert!(registry.lookup_or_create(controller()).is_err());
    assert_eq!(registry.load_state(controller()), Some(LoadState::Empty));
    assert!(view.address_of_label("counter").is_none());

    let unloaded: Vec<_> = receiver.try_iter().map(|(_, notification)| notification).collect();
    assert_eq!(
        unloaded,
        vec![Notification::DebugInfosUnloaded {
            executable: "controller.elf".into()
        }]
    );
}

#[test]
fn test_shutdown_notifies_and_refuses()
{
    let (registry, _source) = registry_with(RegistryConfig::default());
    let (sender, receiver) = notification_channel();
    registry
        .connect(ClientId::from_raw(1), controller(), Some(channel_callback(sender)))
        .unwrap();
    let _ = receiver.try_iter().count();

    registry.shutdown();
    let received: Vec<_> = receiver.try_iter().map(|(_, notification)| notification).collect();
    assert_eq!(
        received,
        vec![Notification::DebugInfosUnloaded {
            executable: "controller.elf".into()
        }]
    );
    assert_eq!(registry.debug_info_count(), 0);
    assert!(matches!(
        registry.lookup_or_create(controller()),
        Err(SymbaseError::ShutDown)
    ));
    assert!(matches!(
        registry.connect(ClientId::from_raw(2), controller(), None),
        Err(SymbaseError::ShutDown)
    ));
}
