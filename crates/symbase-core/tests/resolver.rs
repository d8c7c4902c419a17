//! Loading a set through a source and querying it end to end

use std::path::Path;

use symbase_core::error::{SymbaseError, SymbaseResult};
use symbase_core::resolver::{LabelCursor, LeafCursor};
use symbase_core::set::{AddressingMode, DebugInfoSet};
use symbase_core::source::{DebugFormat, DebugInfoSource, ExecutableIdentity, ImageInfo};
use symbase_core::tables::TypeSpec;
use symbase_core::types::{Address, BaseType, TypeKind, TypeNumber, ValueType};

const MOTOR_DECLARATION: TypeNumber = TypeNumber::from_raw(0x1000);
const MOTOR: TypeNumber = TypeNumber::from_raw(0x2000);
const GAINS: TypeNumber = TypeNumber::from_raw(0x2100);
const MOTOR_T: TypeNumber = TypeNumber::from_raw(0x2200);

/// What goes wrong while loading
#[derive(Clone, Copy, PartialEq, Eq)]
enum Failure
{
    None,
    Identity,
    Populate,
    ProgramDatabase,
}

/// A controller image: one motor struct, declared in one unit, defined in another
struct ControllerSource
{
    failure: Failure,
}

impl ControllerSource
{
    const fn new(failure: Failure) -> Self
    {
        Self { failure }
    }
}

impl DebugInfoSource for ControllerSource
{
    fn identity(&self, executable: &Path) -> SymbaseResult<ExecutableIdentity>
    {
        if self.failure == Failure::Identity {
            return Err(SymbaseError::Io(std::io::Error::other(format!(
                "cannot stat {}",
                executable.display()
            ))));
        }
        Ok(ExecutableIdentity {
            modified: 1,
            checksum: 0xfeed,
        })
    }

    fn image_info(&self, _executable: &Path) -> SymbaseResult<ImageInfo>
    {
        Ok(ImageInfo {
            addressing: AddressingMode::Relative,
            ..ImageInfo::default()
        })
    }

    fn populate(&self, _executable: &Path, _image: &ImageInfo, set: &mut DebugInfoSet) -> SymbaseResult<()>
    {
        let int32 = BaseType::Int32.type_number();
        let real32 = BaseType::Real32.type_number();

        let fields = set.next_field_number();
        set.insert_field_group(fields)?;
        set.insert_type(TypeSpec::declaration(MOTOR_DECLARATION, "Motor", fields).in_unit(1))?;
        set.insert_field_member(fields, "id", int32, 0)?;
        set.insert_field_member(fields, "gains", GAINS, 4)?;
        set.insert_type(TypeSpec::array(GAINS, real32, 2).in_unit(2))?;
        set.insert_type(TypeSpec::structure(MOTOR, "Motor", fields, 12).in_unit(2))?;
        set.insert_type(TypeSpec::typedef(MOTOR_T, "Motor_t", MOTOR).in_unit(2))?;

        set.insert_label("zeta", int32, 0x10)?;
        set.insert_label("motor", MOTOR_DECLARATION, 0x4000)?;
        set.insert_label("alpha", MOTOR_T, 0x5000)?;
        set.insert_unplaced_label("Motor::count", int32, MOTOR)?;

        if self.failure == Failure::Populate {
            return Err(SymbaseError::Internal("truncated .debug_info".into()));
        }
        Ok(())
    }

    fn detect_format(&self, _executable: &Path) -> SymbaseResult<DebugFormat>
    {
        if self.failure == Failure::ProgramDatabase {
            return Ok(DebugFormat::ProgramDatabase);
        }
        Ok(DebugFormat::Embedded)
    }
}

fn loaded() -> DebugInfoSet
{
    DebugInfoSet::load_standalone("controller.elf", &ControllerSource::new(Failure::None)).unwrap()
}

const BASE: Address = Address::new(0x1_0000);

#[test]
fn test_declaration_resolves_across_units()
{
    let set = loaded();
    assert!(set.is_loaded());
    let resolved = set.resolve_type(MOTOR_DECLARATION).unwrap();
    assert_eq!(resolved.number, MOTOR);
    assert_eq!(resolved.kind, TypeKind::Struct);
    assert_eq!(set.type_size(MOTOR_T), Some(12));
    assert_eq!(set.type_size(GAINS), Some(8));
    assert_eq!(set.find_type_by_name("Motor"), Some(MOTOR));
}

#[test]
fn test_relative_labels_follow_process_base()
{
    let set = loaded();
    assert_eq!(set.address_of_label("motor", BASE), Some(Address::new(0x1_4000)));
    assert_eq!(set.address_of_label("motor", Address::ZERO), Some(Address::new(0x4000)));

    let hit = set.label_by_address(Address::new(0x1_4004), BASE).unwrap();
    assert_eq!(hit.name, "motor");
    assert_eq!(hit.address, Address::new(0x1_4000));
}

#[test]
fn test_explain_address_through_declaration()
{
    let set = loaded();
    let explained = set.explain_address(Address::new(0x1_4008), BASE).unwrap();
    assert_eq!(explained.path, "motor.gains[1]");
    assert_eq!(explained.value_type, ValueType::F32);
    assert_eq!(explained.label, "motor");

    let through_typedef = set.explain_address(Address::new(0x1_5000), BASE).unwrap();
    assert_eq!(through_typedef.path, "alpha.id");
    assert_eq!(through_typedef.value_type, ValueType::I32);
}

#[test]
fn test_leaves_of_struct_label()
{
    let set = loaded();
    let mut cursor = LeafCursor::for_label("motor", BASE);
    let leaves: Vec<(String, u64)> = std::iter::from_fn(|| set.next_leaf(&mut cursor))
        .map(|leaf| (leaf.path, leaf.address.value()))
        .collect();
    assert_eq!(
        leaves,
        vec![
            ("motor.id".to_string(), 0x1_4000),
            ("motor.gains[0]".to_string(), 0x1_4004),
            ("motor.gains[1]".to_string(), 0x1_4008),
        ]
    );
}

#[test]
fn test_sorted_label_iteration()
{
    let set = loaded();
    let mut cursor = LabelCursor::new();
    let names: Vec<String> = std::iter::from_fn(|| set.next_sorted_label(&mut cursor, Address::ZERO))
        .map(|hit| hit.name)
        .collect();
    assert_eq!(names, vec!["alpha", "motor", "zeta"]);

    let unplaced = set.unplaced_label("Motor::count").unwrap();
    assert_eq!(unplaced.origin, MOTOR);
    assert!(set.address_of_label("Motor::count", BASE).is_none());
}

#[test]
fn test_failed_population_leaves_set_empty()
{
    let mut set = DebugInfoSet::new("controller.elf");
    let error = set.load(&ControllerSource::new(Failure::Populate)).unwrap_err();
    assert!(matches!(error, SymbaseError::LoadFailed { .. }));
    assert!(!set.is_loaded());
    assert_eq!(set.counts().labels, 0);
    assert!(set.address_of_label("motor", BASE).is_none());
}

#[test]
fn test_unreadable_and_unsupported_executables()
{
    let mut set = DebugInfoSet::new("controller.elf");
    assert!(matches!(
        set.load(&ControllerSource::new(Failure::Identity)),
        Err(SymbaseError::ExecutableUnreadable { .. })
    ));
    assert!(matches!(
        set.load(&ControllerSource::new(Failure::ProgramDatabase)),
        Err(SymbaseError::UnsupportedFormat(_))
    ));
    assert!(!set.is_loaded());

    set.load(&ControllerSource::new(Failure::None)).unwrap();
    assert_eq!(set.identity().map(|identity| identity.checksum), Some(0xfeed));
}
