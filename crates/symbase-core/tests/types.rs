//! Tests for the shared value types

use symbase_core::types::{
    Address, BaseCode, BaseType, ClientId, ProcessId, TypeKind, TypeNumber, TypeOrigin, ValueType,
};

#[test]
fn test_process_id_conversions()
{
    let pid = ProcessId::from(12345);
    assert_eq!(pid.0, 12345);
    let value: u32 = pid.into();
    assert_eq!(value, 12345);
    assert_ne!(pid, ProcessId::from(54321));
}

#[test]
fn test_client_id_display()
{
    let client = ClientId::from_raw(17);
    assert_eq!(client.raw(), 17);
    assert_eq!(client.to_string(), "client#17");
}

#[test]
fn test_address_arithmetic()
{
    let base = Address::new(0x40_0000);
    let label = base + 0x2000;
    assert_eq!(label.value(), 0x40_2000);
    assert_eq!(label.offset_from(base), Some(0x2000));
    assert_eq!(base.offset_from(label), None);
    assert_eq!(Address::new(u64::MAX).checked_add(1), None);
    assert_eq!(format!("{}", Address::new(0x20)), "0x00000020");
}

#[test]
fn test_type_number_ranges()
{
    assert_eq!(BaseType::UInt32.type_number().origin(), TypeOrigin::Base);
    assert_eq!(TypeNumber::UNKNOWN.raw(), 0xfff);
    assert!(TypeNumber::UNKNOWN.is_base());
    assert_eq!(TypeNumber::from_raw(TypeNumber::FILE_BASE).origin(), TypeOrigin::File);
    assert_eq!(TypeNumber::from_raw(TypeNumber::SYNTHESIZED_TOP).origin(), TypeOrigin::Synthesized);
    assert_eq!(TypeNumber::from_raw(0x1a2b).to_string(), "0x1a2b");
}

#[test]
fn test_base_codes_decode()
{
    assert_eq!(BaseCode::decode(TypeNumber::from_raw(9)), Some(BaseCode::Value(BaseType::Real32)));
    assert_eq!(
        BaseCode::decode(BaseType::UInt16.pointer_type_number()),
        Some(BaseCode::PointerTo(BaseType::UInt16))
    );
    assert_eq!(BaseCode::decode(TypeNumber::VOID), Some(BaseCode::Value(BaseType::Void)));
    assert_eq!(BaseCode::decode(TypeNumber::from_raw(0xffe)), Some(BaseCode::Value(BaseType::Int64)));
    assert_eq!(BaseCode::decode(TypeNumber::from_raw(50)), Some(BaseCode::Unknown(50)));
    assert_eq!(BaseCode::decode(TypeNumber::from_raw(0x1000)), None);
}

#[test]
fn test_base_code_names_and_sizes()
{
    let pointer = BaseCode::PointerTo(BaseType::Int8);
    assert_eq!(pointer.name(), "*int8");
    assert_eq!(pointer.size(8), 8);
    assert_eq!(pointer.value_type(), None);

    let real = BaseCode::Value(BaseType::Real64);
    assert_eq!(real.size(4), 8);
    assert_eq!(real.value_type(), Some(ValueType::F64));
    assert_eq!(BaseCode::Value(BaseType::Void).value_type(), None);
}

#[test]
fn test_value_types()
{
    assert_eq!(ValueType::unsigned_of_size(4), Some(ValueType::U32));
    assert_eq!(ValueType::unsigned_of_size(3), None);
    assert_eq!(ValueType::I16.size(), 2);
    assert_eq!(ValueType::U32.to_string(), "UDWORD");
}

#[test]
fn test_transparent_kinds()
{
    assert!(TypeKind::Typedef.is_transparent());
    assert!(TypeKind::Modifier.is_transparent());
    assert!(!TypeKind::Pointer.is_transparent());
    assert_eq!(TypeKind::PreDeclaredStruct.to_string(), "declaration");
}
