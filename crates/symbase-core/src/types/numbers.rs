//! Type numbers, field numbers and type kinds.
//!
//! Type numbers are partitioned into three ranges:
//!
//! - **Base codes** (`< 0x1000`): built-in scalar types, see [`BaseType`](super::BaseType)
//! - **File types** (`0x1000..0x4000_0000`): declared by the debug info parser
//! - **Synthesized types** (`0x4000_0000..=0x7fff_ffff`): generated while loading,
//!   handed out from the top of the range downwards

use std::fmt;

/// Identifier of a type inside one debug info set
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeNumber(u32);

/// Which numbering range a [`TypeNumber`] belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeOrigin
{
    /// Built-in base code, no table entry exists
    Base,
    /// Declared by the debug info parser
    File,
    /// Generated during loading (inner array dimensions and the like)
    Synthesized,
}

impl TypeNumber
{
    /// First number of the file-declared range.
    pub const FILE_BASE: u32 = 0x1000;
    /// First number of the synthesized range.
    pub const SYNTHESIZED_BASE: u32 = 0x4000_0000;
    /// Highest synthesized number, handed out first.
    pub const SYNTHESIZED_TOP: u32 = 0x7fff_ffff;

    /// The `void` base code.
    pub const VOID: Self = Self(33);
    /// Base code used when a parser cannot classify a base type.
    pub const UNKNOWN: Self = Self(Self::FILE_BASE - 1);

    /// Wrap a raw type number.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self
    {
        Self(raw)
    }

    /// Raw type number.
    #[must_use]
    pub const fn raw(self) -> u32
    {
        self.0
    }

    /// Numbering range of this type number.
    #[must_use]
    pub const fn origin(self) -> TypeOrigin
    {
        if self.0 < Self::FILE_BASE {
            TypeOrigin::Base
        } else if self.0 < Self::SYNTHESIZED_BASE {
            TypeOrigin::File
        } else {
            TypeOrigin::Synthesized
        }
    }

    /// `true` for built-in base codes.
    #[must_use]
    pub const fn is_base(self) -> bool
    {
        self.0 < Self::FILE_BASE
    }
}

impl fmt::Display for TypeNumber
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:x}", self.0)
    }
}

/// Identifier of a field group (the member list of one struct/union)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldNumber(u32);

impl FieldNumber
{
    /// First number handed out by a debug info set's field number generator.
    pub const FIRST: Self = Self(0x1000_0000);

    /// Wrap a raw field number.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self
    {
        Self(raw)
    }

    /// Raw field number.
    #[must_use]
    pub const fn raw(self) -> u32
    {
        self.0
    }
}

impl fmt::Display for FieldNumber
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:x}", self.0)
    }
}

/// Discriminator of a type node ("what is this type")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind
{
    /// Built-in base type; the type number is a base code
    Base,
    /// Struct, class or union with a field group
    Struct,
    /// One array dimension; `points_to` is the element type
    Array,
    /// Pointer or reference; `points_to` is the pointee
    Pointer,
    /// Qualifier such as `const`/`volatile`, or a base type wrapper
    Modifier,
    /// Named alias of another type
    Typedef,
    /// Forward declaration of a struct, redirected to its definition
    PreDeclaredStruct,
}

impl TypeKind
{
    /// Modifiers and typedefs only rename or qualify their target.
    #[must_use]
    pub const fn is_transparent(self) -> bool
    {
        matches!(self, Self::Modifier | Self::Typedef)
    }
}

impl fmt::Display for TypeKind
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let label = match self {
            Self::Base => "base",
            Self::Struct => "struct",
            Self::Array => "array",
            Self::Pointer => "pointer",
            Self::Modifier => "modifier",
            Self::Typedef => "typedef",
            Self::PreDeclaredStruct => "declaration",
        };
        write!(f, "{label}")
    }
}
