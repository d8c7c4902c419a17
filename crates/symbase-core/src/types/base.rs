//! Built-in base types and their scalar value types.
//!
//! Base codes below [`TypeNumber::FILE_BASE`] never have a table entry. Their
//! names, sizes and scalar classification come from the fixed table in this
//! module. Codes `101..=112` and `133` are pointers to the matching base type.

use std::borrow::Cow;
use std::fmt;

use gimli::constants::{
    DW_ATE_address, DW_ATE_boolean, DW_ATE_complex_float, DW_ATE_float, DW_ATE_imaginary_float, DW_ATE_signed,
    DW_ATE_signed_char, DW_ATE_unsigned, DW_ATE_unsigned_char,
};
use gimli::DwAte;

use super::TypeNumber;

/// Offset between a base code and the code of a pointer to it.
const POINTER_CODE_OFFSET: u32 = 100;

/// Built-in scalar base type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseType
{
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Real32,
    Real64,
    /// 32-bit signed integer read via a register-width access
    RInt32,
    /// 32-bit unsigned integer read via a register-width access
    RUInt32,
    Void,
}

impl BaseType
{
    const ALL: [Self; 13] = [
        Self::Int8,
        Self::UInt8,
        Self::Int16,
        Self::UInt16,
        Self::Int32,
        Self::UInt32,
        Self::Int64,
        Self::UInt64,
        Self::Real32,
        Self::Real64,
        Self::RInt32,
        Self::RUInt32,
        Self::Void,
    ];

    /// Base code of this type.
    #[must_use]
    pub const fn code(self) -> u32
    {
        match self {
            Self::Int8 => 1,
            Self::UInt8 => 2,
            Self::Int16 => 3,
            Self::UInt16 => 4,
            Self::Int32 => 5,
            Self::UInt32 => 6,
            Self::Int64 => 7,
            Self::UInt64 => 8,
            Self::Real32 => 9,
            Self::Real64 => 10,
            Self::RInt32 => 11,
            Self::RUInt32 => 12,
            Self::Void => 33,
        }
    }

    /// Type number of this base type.
    #[must_use]
    pub const fn type_number(self) -> TypeNumber
    {
        TypeNumber::from_raw(self.code())
    }

    /// Type number of a pointer to this base type.
    #[must_use]
    pub const fn pointer_type_number(self) -> TypeNumber
    {
        TypeNumber::from_raw(self.code() + POINTER_CODE_OFFSET)
    }

    /// Base type with the given code.
    ///
    /// The two legacy 64-bit codes just below the file range map onto
    /// [`BaseType::Int64`] and [`BaseType::UInt64`].
    #[must_use]
    pub fn from_code(code: u32) -> Option<Self>
    {
        match code {
            0xffe => Some(Self::Int64),
            0xffd => Some(Self::UInt64),
            _ => Self::ALL.into_iter().find(|base| base.code() == code),
        }
    }

    /// Type name used in type strings.
    #[must_use]
    pub const fn name(self) -> &'static str
    {
        match self {
            Self::Int8 => "int8",
            Self::UInt8 => "uint8",
            Self::Int16 => "int16",
            Self::UInt16 => "uint16",
            Self::Int32 => "int32",
            Self::UInt32 => "uint32",
            Self::Int64 => "int64",
            Self::UInt64 => "uint64",
            Self::Real32 => "real32",
            Self::Real64 => "real64",
            Self::RInt32 => "rint32",
            Self::RUInt32 => "ruint32",
            Self::Void => "void",
        }
    }

    /// Size in bytes.
    #[must_use]
    pub const fn size(self) -> u64
    {
        match self {
            Self::Void => 0,
            Self::Int8 | Self::UInt8 => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::UInt32 | Self::Real32 | Self::RInt32 | Self::RUInt32 => 4,
            Self::Int64 | Self::UInt64 | Self::Real64 => 8,
        }
    }

    /// Scalar value type a variable of this type is accessed as.
    ///
    /// `void` has none.
    #[must_use]
    pub const fn value_type(self) -> Option<ValueType>
    {
        Some(match self {
            Self::Int8 => ValueType::I8,
            Self::UInt8 => ValueType::U8,
            Self::Int16 => ValueType::I16,
            Self::UInt16 => ValueType::U16,
            Self::Int32 | Self::RInt32 => ValueType::I32,
            Self::UInt32 | Self::RUInt32 => ValueType::U32,
            Self::Int64 => ValueType::I64,
            Self::UInt64 => ValueType::U64,
            Self::Real32 => ValueType::F32,
            Self::Real64 => ValueType::F64,
            Self::Void => return None,
        })
    }

    /// Map a DWARF base type (`DW_AT_byte_size`, `DW_AT_encoding`) to a base code.
    ///
    /// Booleans map to the unsigned type of their size. Combinations without
    /// a matching base type produce [`TypeNumber::UNKNOWN`].
    ///
    /// ## Example
    ///
    /// ```rust
    /// use gimli::constants::{DW_ATE_boolean, DW_ATE_float};
    /// use symbase_core::types::{BaseType, TypeNumber};
    ///
    /// assert_eq!(BaseType::from_dwarf_encoding(1, DW_ATE_boolean), BaseType::UInt8.type_number());
    /// assert_eq!(BaseType::from_dwarf_encoding(16, DW_ATE_float), TypeNumber::UNKNOWN);
    /// ```
    #[must_use]
    pub fn from_dwarf_encoding(byte_size: u64, encoding: DwAte) -> TypeNumber
    {
        let base = match (encoding, byte_size) {
            (DW_ATE_address, _) => Some(Self::Void),
            (DW_ATE_signed | DW_ATE_signed_char, 1) => Some(Self::Int8),
            (DW_ATE_signed | DW_ATE_signed_char, 2) => Some(Self::Int16),
            (DW_ATE_signed | DW_ATE_signed_char, 4) => Some(Self::Int32),
            (DW_ATE_signed | DW_ATE_signed_char, 8) => Some(Self::Int64),
            (DW_ATE_boolean | DW_ATE_unsigned | DW_ATE_unsigned_char, 1) => Some(Self::UInt8),
            (DW_ATE_boolean | DW_ATE_unsigned | DW_ATE_unsigned_char, 2) => Some(Self::UInt16),
            (DW_ATE_boolean | DW_ATE_unsigned | DW_ATE_unsigned_char, 4) => Some(Self::UInt32),
            (DW_ATE_boolean | DW_ATE_unsigned | DW_ATE_unsigned_char, 8) => Some(Self::UInt64),
            (DW_ATE_complex_float | DW_ATE_float | DW_ATE_imaginary_float, 4) => Some(Self::Real32),
            (DW_ATE_complex_float | DW_ATE_float | DW_ATE_imaginary_float, 8) => Some(Self::Real64),
            _ => None,
        };
        base.map_or(TypeNumber::UNKNOWN, Self::type_number)
    }
}

impl fmt::Display for BaseType
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.name())
    }
}

/// Decoded base code: a value type, a pointer to one, or unknown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseCode
{
    Value(BaseType),
    PointerTo(BaseType),
    Unknown(u32),
}

impl BaseCode
{
    /// Decode a base type number. Returns `None` for file and synthesized numbers.
    #[must_use]
    pub fn decode(number: TypeNumber) -> Option<Self>
    {
        if !number.is_base() {
            return None;
        }
        let code = number.raw();
        if let Some(base) = BaseType::from_code(code) {
            return Some(Self::Value(base));
        }
        let pointee = code
            .checked_sub(POINTER_CODE_OFFSET)
            .and_then(BaseType::from_code)
            .filter(|base| base.code() + POINTER_CODE_OFFSET == code);
        Some(pointee.map_or(Self::Unknown(code), Self::PointerTo))
    }

    /// Name used in type strings; pointers are prefixed with `*`.
    #[must_use]
    pub fn name(self) -> Cow<'static, str>
    {
        match self {
            Self::Value(base) => Cow::Borrowed(base.name()),
            Self::PointerTo(base) => Cow::Owned(format!("*{}", base.name())),
            Self::Unknown(_) => Cow::Borrowed("unknown"),
        }
    }

    /// Size in bytes; pointer codes take the set's pointer width.
    #[must_use]
    pub const fn size(self, pointer_size: u64) -> u64
    {
        match self {
            Self::Value(base) => base.size(),
            Self::PointerTo(_) => pointer_size,
            Self::Unknown(_) => 0,
        }
    }

    /// Scalar access type, `None` for `void`, pointers and unknown codes.
    #[must_use]
    pub const fn value_type(self) -> Option<ValueType>
    {
        match self {
            Self::Value(base) => base.value_type(),
            Self::PointerTo(_) | Self::Unknown(_) => None,
        }
    }
}

/// Scalar type of a value in the shared variable store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType
{
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
}

impl ValueType
{
    /// Size in bytes.
    #[must_use]
    pub const fn size(self) -> u64
    {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
        }
    }

    /// Unsigned integer type of the given width, used for pointers read as integers.
    #[must_use]
    pub const fn unsigned_of_size(size: u64) -> Option<Self>
    {
        match size {
            1 => Some(Self::U8),
            2 => Some(Self::U16),
            4 => Some(Self::U32),
            8 => Some(Self::U64),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let label = match self {
            Self::I8 => "BYTE",
            Self::U8 => "UBYTE",
            Self::I16 => "WORD",
            Self::U16 => "UWORD",
            Self::I32 => "DWORD",
            Self::U32 => "UDWORD",
            Self::I64 => "QWORD",
            Self::U64 => "UQWORD",
            Self::F32 => "FLOAT",
            Self::F64 => "DOUBLE",
        };
        write!(f, "{label}")
    }
}
