//! Human readable type strings.

use std::fmt;

use super::MAX_CHAIN_DEPTH;
use crate::set::DebugInfoSet;
use crate::types::{BaseCode, TypeKind, TypeNumber};

/// Type string plus the kind of the terminal type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescription
{
    pub kind: TypeKind,
    pub text: String,
}

impl fmt::Display for TypeDescription
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{} ({})", self.text, self.kind)
    }
}

impl DebugInfoSet
{
    /// Describe a type
    ///
    /// Base codes give their name, modifiers and typedefs prefix their name
    /// to the type they wrap, pointers append `*` and arrays append one
    /// `[n]` per dimension.
    ///
    /// ## Example
    ///
    /// ```rust
    /// use symbase_core::set::DebugInfoSet;
    /// use symbase_core::tables::TypeSpec;
    /// use symbase_core::types::{BaseType, TypeKind, TypeNumber};
    ///
    /// let mut set = DebugInfoSet::new("app.elf");
    /// let matrix = TypeNumber::from_raw(0x1000);
    /// let row = set.next_synthetic_type_number().unwrap();
    /// set.insert_type(TypeSpec::array(matrix, row, 2)).unwrap();
    /// set.insert_type(TypeSpec::array(row, BaseType::Real32.type_number(), 3)).unwrap();
    ///
    /// let description = set.type_string(matrix).unwrap();
    /// assert_eq!(description.text, "real32[2][3]");
    /// assert_eq!(description.kind, TypeKind::Array);
    /// ```
    #[must_use]
    pub fn type_string(&self, number: TypeNumber) -> Option<TypeDescription>
    {
        let kind = self.resolve_type(number)?.kind;
        let text = self.format_type(number, 0)?;
        Some(TypeDescription { kind, text })
    }

    /// Describe what a pointer points to (the type string without its last `*`)
    ///
    /// `None` if `number` does not resolve to a pointer.
    #[must_use]
    pub fn pointer_type_string(&self, number: TypeNumber) -> Option<TypeDescription>
    {
        if self.type_kind(number)? != TypeKind::Pointer {
            return None;
        }
        let target = self.points_to(number)?;
        self.type_string(target.declared)
    }

    /// Describe the element of an array, skipping its first dimension
    ///
    /// For `real32[2][3]` this is `real32[3]`. `None` if `number` does not
    /// resolve to an array.
    #[must_use]
    pub fn array_type_string(&self, number: TypeNumber) -> Option<TypeDescription>
    {
        let layout = self.array_layout(number)?;
        self.type_string(layout.element)
    }

    fn format_type(&self, number: TypeNumber, depth: usize) -> Option<String>
    {
        if let Some(code) = BaseCode::decode(number) {
            return Some(code.name().into_owned());
        }
        if depth >= MAX_CHAIN_DEPTH {
            return None;
        }
        let node = self.lookup_node(number).and_then(|found| self.node(found))?;
        let name = self.symbol(node.name);
        match node.kind {
            TypeKind::Struct | TypeKind::PreDeclaredStruct | TypeKind::Base => Some(name.to_owned()),
            TypeKind::Modifier | TypeKind::Typedef => {
                let inner = self.format_type(node.points_to, depth + 1)?;
                if name.is_empty() {
                    Some(inner)
                } else {
                    Some(format!("{name} {inner}"))
                }
            }
            TypeKind::Pointer => Some(format!("{}*", self.format_type(node.points_to, depth + 1)?)),
            TypeKind::Array => {
                let mut dimensions = format!("[{}]", node.element_count);
                let mut element = node.points_to;
                for _ in depth..MAX_CHAIN_DEPTH {
                    let inner = self
                        .lookup_node(element)
                        .and_then(|found| self.node(found))
                        .filter(|inner| inner.kind == TypeKind::Array);
                    let Some(inner) = inner else {
                        break;
                    };
                    dimensions.push_str(&format!("[{}]", inner.element_count));
                    element = inner.points_to;
                }
                Some(format!("{}{dimensions}", self.format_type(element, depth + 1)?))
            }
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::tables::TypeSpec;
    use crate::types::BaseType;

    fn n(raw: u32) -> TypeNumber
    {
        TypeNumber::from_raw(raw)
    }

    #[test]
    fn test_modifier_and_pointer_strings()
    {
        let mut set = DebugInfoSet::new("app.elf");
        let int32 = BaseType::Int32.type_number();
        set.insert_type(TypeSpec::modifier(n(0x1000), "const", int32)).unwrap();
        set.insert_type(TypeSpec::pointer(n(0x1100), n(0x1000))).unwrap();
        set.insert_type(TypeSpec::pointer(n(0x1200), n(0x1100))).unwrap();

        assert_eq!(set.type_string(n(0x1000)).unwrap().text, "const int32");
        let pointer = set.type_string(n(0x1200)).unwrap();
        assert_eq!(pointer.text, "const int32**");
        assert_eq!(pointer.kind, TypeKind::Pointer);
        assert_eq!(set.pointer_type_string(n(0x1200)).unwrap().text, "const int32*");
        assert!(set.pointer_type_string(n(0x1000)).is_none());
    }

    #[test]
    fn test_base_code_strings()
    {
        let set = DebugInfoSet::new("app.elf");
        assert_eq!(set.type_string(BaseType::UInt8.type_number()).unwrap().text, "uint8");
        assert_eq!(set.type_string(BaseType::Real64.pointer_type_number()).unwrap().text, "*real64");
        assert!(set.type_string(n(0x1000)).is_none());
    }

    #[test]
    fn test_array_of_struct_strings()
    {
        let mut set = DebugInfoSet::new("app.elf");
        let group = set.next_field_number();
        set.insert_field_group(group).unwrap();
        set.insert_type(TypeSpec::structure(n(0x1000), "Motor", group, 8)).unwrap();
        set.insert_type(TypeSpec::array(n(0x1100), n(0x1000), 4)).unwrap();

        assert_eq!(set.type_string(n(0x1100)).unwrap().text, "Motor[4]");
        let element = set.array_type_string(n(0x1100)).unwrap();
        assert_eq!(element.text, "Motor");
        assert_eq!(element.kind, TypeKind::Struct);
    }
}
