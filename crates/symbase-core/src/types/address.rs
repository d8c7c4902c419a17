//! Target addresses.

use std::fmt;
use std::ops::Add;

/// Address in the target's memory
///
/// Label addresses, process base addresses and the addresses handed to
/// [`explain_address`](crate::set::DebugInfoSet::explain_address) use this
/// wrapper. Tables store raw `u64` values; whether those are absolute or
/// relative to the image base is decided by the
/// [`AddressingMode`](crate::set::AddressingMode) of the owning set, and only
/// translated values come out as `Address`.
///
/// ## Example
///
/// ```rust
/// use symbase_core::types::Address;
///
/// let motor = Address::new(0x2000_0000);
/// let gains = motor + 0x10;
/// assert_eq!(gains.offset_from(motor), Some(0x10));
/// assert_eq!(gains.to_string(), "0x20000010");
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(u64);

impl Address
{
    /// "No address". Lookups that find nothing report this to scripting clients.
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn new(value: u64) -> Self
    {
        Self(value)
    }

    #[must_use]
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// `self + offset`, or `None` past the end of the address space.
    #[must_use]
    pub const fn checked_add(self, offset: u64) -> Option<Self>
    {
        match self.0.checked_add(offset) {
            Some(value) => Some(Self(value)),
            None => None,
        }
    }

    /// Distance from `base` up to this address, `None` below `base`.
    #[must_use]
    pub const fn offset_from(self, base: Self) -> Option<u64>
    {
        self.0.checked_sub(base.0)
    }
}

impl From<u64> for Address
{
    fn from(value: u64) -> Self
    {
        Self(value)
    }
}

impl From<Address> for u64
{
    fn from(address: Address) -> Self
    {
        address.0
    }
}

impl fmt::Display for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{:#010x}", self.0)
    }
}

/// Wraps around at the end of the address space, like the target's own arithmetic.
impl Add<u64> for Address
{
    type Output = Self;

    fn add(self, offset: u64) -> Self
    {
        Self(self.0.wrapping_add(offset))
    }
}
