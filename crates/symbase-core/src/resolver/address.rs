//! Label ↔ address translation.

use std::fmt;

use super::{ResolvedType, MAX_NESTING};
use crate::set::DebugInfoSet;
use crate::tables::{Label, UnplacedLabel};
use crate::types::{Address, BaseCode, TypeKind, TypeNumber, ValueType};

/// A label with its runtime address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelHit
{
    pub name: String,
    pub address: Address,
    pub type_number: TypeNumber,
}

/// A label declared without an address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnplacedInfo
{
    pub name: String,
    pub type_number: TypeNumber,
    /// Type number of the declaring entry
    pub origin: TypeNumber,
}

/// Scalar variable an address belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressExplanation
{
    /// Access path such as `Foo.bar[3]::baz`
    pub path: String,
    /// Label the path starts at
    pub label: String,
    pub label_address: Address,
    /// Type of the scalar at the address
    pub type_number: TypeNumber,
    pub value_type: ValueType,
}

impl fmt::Display for AddressExplanation
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{} ({})", self.path, self.value_type)
    }
}

/// Position of a label iteration, see [`DebugInfoSet::next_label`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LabelCursor
{
    position: usize,
}

impl LabelCursor
{
    #[must_use]
    pub const fn new() -> Self
    {
        Self { position: 0 }
    }

    pub fn reset(&mut self)
    {
        self.position = 0;
    }
}

impl DebugInfoSet
{
    fn label_hit(&self, label: &Label, base: Address) -> LabelHit
    {
        LabelHit {
            name: self.symbol(label.name).to_owned(),
            address: self.to_runtime(label.address, base),
            type_number: label.type_number,
        }
    }

    fn unplaced_info(&self, label: &UnplacedLabel) -> UnplacedInfo
    {
        UnplacedInfo {
            name: self.symbol(label.name).to_owned(),
            type_number: label.type_number,
            origin: label.origin,
        }
    }

    /// Closest label at or below `address`
    ///
    /// `base` is where the image is loaded; it only matters for sets with
    /// relative addressing. Of several labels at the same address the first
    /// inserted one is returned.
    #[must_use]
    pub fn label_by_address(&self, address: Address, base: Address) -> Option<LabelHit>
    {
        self.labels_at_address(address, base).into_iter().next()
    }

    /// All labels sharing the closest address at or below `address`.
    #[must_use]
    pub fn labels_at_address(&self, address: Address, base: Address) -> Vec<LabelHit>
    {
        let Some(stored) = self.to_stored(address, base) else {
            return Vec::new();
        };
        self.labels
            .floor_address_run(stored)
            .into_iter()
            .map(|(_, label)| self.label_hit(label, base))
            .collect()
    }

    /// Label named `name`: an exact match, else a case-insensitive one.
    pub(crate) fn find_label(&self, name: &str) -> Option<&Label>
    {
        let run = self.labels.name_run(&self.arena, name);
        let mut fallback = None;
        for pos in run {
            let (_, label) = self.labels.by_name_at(pos)?;
            if self.symbol(label.name) == name {
                return Some(label);
            }
            fallback.get_or_insert(label);
        }
        fallback
    }

    /// Runtime address of a label
    ///
    /// An exact name match is preferred over a case-insensitive one.
    #[must_use]
    pub fn address_of_label(&self, name: &str, base: Address) -> Option<Address>
    {
        self.find_label(name).map(|label| self.to_runtime(label.address, base))
    }

    /// Every label whose name matches `name` case-insensitively, in name order.
    #[must_use]
    pub fn labels_named(&self, name: &str, base: Address) -> Vec<LabelHit>
    {
        self.labels
            .name_run(&self.arena, name)
            .filter_map(|pos| self.labels.by_name_at(pos))
            .map(|(_, label)| self.label_hit(label, base))
            .collect()
    }

    /// Declared type of a label, falling back to labels without an address.
    #[must_use]
    pub fn type_of_label(&self, name: &str) -> Option<TypeNumber>
    {
        if let Some(label) = self.find_label(name) {
            return Some(label.type_number);
        }
        self.labels
            .unplaced_named(&self.arena, name)
            .next()
            .map(UnplacedLabel::type_number)
    }

    /// Terminal type of a label, cached on the label.
    #[must_use]
    pub fn resolve_label_type(&self, name: &str) -> Option<ResolvedType>
    {
        let label = self.find_label(name)?;
        self.resolve_cached(&label.target, label.type_number)
    }

    #[must_use]
    pub fn unplaced_label(&self, name: &str) -> Option<UnplacedInfo>
    {
        self.labels
            .unplaced_named(&self.arena, name)
            .next()
            .map(|label| self.unplaced_info(label))
    }

    /// Label without address declared by the entry `origin`.
    #[must_use]
    pub fn unplaced_by_origin(&self, origin: TypeNumber) -> Option<UnplacedInfo>
    {
        self.labels.unplaced_by_origin(origin).map(|label| self.unplaced_info(label))
    }

    #[must_use]
    pub fn unplaced_labels(&self) -> Vec<UnplacedInfo>
    {
        self.labels.iter_unplaced().map(|label| self.unplaced_info(label)).collect()
    }

    /// Next label in insertion order.
    pub fn next_label(&self, cursor: &mut LabelCursor, base: Address) -> Option<LabelHit>
    {
        let (_, label) = self.labels.raw_at(cursor.position)?;
        cursor.position += 1;
        Some(self.label_hit(label, base))
    }

    /// Next label in name order.
    pub fn next_sorted_label(&self, cursor: &mut LabelCursor, base: Address) -> Option<LabelHit>
    {
        let (_, label) = self.labels.by_name_at(cursor.position)?;
        cursor.position += 1;
        Some(self.label_hit(label, base))
    }

    /// Name the scalar variable stored at `address`
    ///
    /// Starts at the closest label at or below the address and descends
    /// through struct members and array elements until the address is the
    /// start of a scalar. Members are joined with `.`, inherited members
    /// with `::` and array elements are written `[i]`. Addresses inside a
    /// scalar, inside padding or behind a pointer give `None`.
    ///
    /// ## Example
    ///
    /// ```rust
    /// use symbase_core::set::DebugInfoSet;
    /// use symbase_core::tables::TypeSpec;
    /// use symbase_core::types::{Address, BaseType, TypeNumber};
    ///
    /// let mut set = DebugInfoSet::new("app.elf");
    /// let samples = TypeNumber::from_raw(0x1000);
    /// set.insert_type(TypeSpec::array(samples, BaseType::Int32.type_number(), 10)).unwrap();
    /// set.insert_label("samples", samples, 0x2000).unwrap();
    ///
    /// let explained = set.explain_address(Address::new(0x2010), Address::ZERO).unwrap();
    /// assert_eq!(explained.path, "samples[4]");
    /// ```
    #[must_use]
    pub fn explain_address(&self, address: Address, base: Address) -> Option<AddressExplanation>
    {
        let stored = self.to_stored(address, base)?;
        self.labels
            .floor_address_run(stored)
            .into_iter()
            .find_map(|(_, label)| self.explain_from(label, stored - label.address, base))
    }

    fn explain_from(&self, label: &Label, mut offset: u64, base: Address) -> Option<AddressExplanation>
    {
        let mut path = self.symbol(label.name).to_owned();
        let mut current = self.resolve_cached(&label.target, label.type_number)?;

        for _ in 0..MAX_NESTING {
            match current.kind {
                TypeKind::Base => {
                    let value_type = BaseCode::decode(current.number)?.value_type()?;
                    if offset != 0 {
                        return None;
                    }
                    return Some(AddressExplanation {
                        path,
                        label: self.symbol(label.name).to_owned(),
                        label_address: self.to_runtime(label.address, base),
                        type_number: current.number,
                        value_type,
                    });
                }
                TypeKind::Struct | TypeKind::PreDeclaredStruct => {
                    let member = self.struct_elem_by_offset(current.number, offset)?;
                    path.push_str(if member.base_class.is_some() { "::" } else { "." });
                    path.push_str(&member.name);
                    offset -= member.offset;
                    current = self.resolve_type(member.type_number)?;
                }
                TypeKind::Array => {
                    let layout = self.array_layout(current.number)?;
                    if layout.element_size == 0 {
                        return None;
                    }
                    let index = offset / layout.element_size;
                    if index >= layout.element_count {
                        return None;
                    }
                    path.push_str(&format!("[{index}]"));
                    offset -= index * layout.element_size;
                    current = self.resolve_type(layout.element)?;
                }
                TypeKind::Pointer | TypeKind::Modifier | TypeKind::Typedef => return None,
            }
        }
        None
    }
}
