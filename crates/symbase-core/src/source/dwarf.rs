//! DWARF debug infos read with `object` and `gimli`.
//!
//! Every DIE that describes a type becomes one type node numbered after its
//! `.debug_info` offset. Global variables become labels, declarations without
//! an address become unplaced labels. Function bodies are not visited: their
//! locals have no static address.

use std::borrow::Cow;
use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::Hasher;
use std::path::Path;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use gimli::{
    constants, AttributeValue, DebuggingInformationEntry, Dwarf, EndianArcSlice, EntriesTreeNode, Operation, Reader,
    RunTimeEndian, SectionId, Unit, UnitOffset,
};
use object::{BinaryFormat, Object, ObjectKind, ObjectSection, ObjectSegment};
use smallvec::SmallVec;
use tracing::{debug, trace};

use super::{DebugInfoSource, ExecutableIdentity, ImageInfo, SectionInfo};
use crate::error::{SymbaseError, SymbaseResult};
use crate::resolver::BASE_CLASS_MEMBER;
use crate::set::{AddressingMode, DebugInfoSet};
use crate::tables::TypeSpec;
use crate::types::{Address, BaseType, FieldNumber, TypeNumber};

type DwarfReader = EndianArcSlice<RunTimeEndian>;
type OwnedDwarf = Dwarf<DwarfReader>;
type Entry<'abbrev, 'unit> = DebuggingInformationEntry<'abbrev, 'unit, DwarfReader>;

/// Reads DWARF from ELF, Mach-O and PE images
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectDwarfSource;

impl ObjectDwarfSource
{
    #[must_use]
    pub const fn new() -> Self
    {
        Self
    }
}

fn parse_failed(executable: &Path, details: String) -> SymbaseError
{
    SymbaseError::LoadFailed {
        executable: executable.display().to_string(),
        details,
    }
}

fn parse_image<'data>(executable: &Path, data: &'data [u8]) -> SymbaseResult<object::File<'data>>
{
    object::File::parse(data).map_err(|err| parse_failed(executable, format!("failed to parse image: {err}")))
}

fn hex(bytes: &[u8]) -> String
{
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

fn image_signature(file: &object::File<'_>) -> Option<String>
{
    if let Ok(Some(build_id)) = file.build_id() {
        return Some(hex(build_id));
    }
    if let Ok(Some(codeview)) = file.pdb_info() {
        return Some(format!("{}-{}", hex(&codeview.guid()), codeview.age()));
    }
    None
}

fn image_base(file: &object::File<'_>) -> u64
{
    match file.format() {
        BinaryFormat::Pe | BinaryFormat::Coff => file.relative_address_base(),
        _ => file
            .segments()
            .map(|segment| segment.address())
            .min()
            .unwrap_or_else(|| file.relative_address_base()),
    }
}

fn load_section(executable: &Path, file: &object::File<'_>, id: SectionId, endian: RunTimeEndian)
    -> SymbaseResult<DwarfReader>
{
    let name = id.name();
    let macho = format!("__{}", name.trim_start_matches('.'));
    for candidate in [name, macho.as_str()] {
        let Some(section) = file.section_by_name(candidate) else {
            continue;
        };
        let data = section
            .uncompressed_data()
            .map_err(|err| parse_failed(executable, format!("failed to read {name}: {err}")))?;
        let bytes: Arc<[u8]> = match data {
            Cow::Borrowed(bytes) => Arc::from(bytes),
            Cow::Owned(vec) => vec.into(),
        };
        return Ok(EndianArcSlice::new(bytes, endian));
    }
    Ok(EndianArcSlice::new(Arc::from(Vec::new()), endian))
}

impl DebugInfoSource for ObjectDwarfSource
{
    fn identity(&self, executable: &Path) -> SymbaseResult<ExecutableIdentity>
    {
        let metadata = fs::metadata(executable)?;
        let modified = metadata
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map_or(0, |since| since.as_secs());
        let bytes = fs::read(executable)?;
        let mut hasher = DefaultHasher::new();
        hasher.write(&bytes);
        Ok(ExecutableIdentity {
            modified,
            checksum: hasher.finish(),
        })
    }

    fn image_info(&self, executable: &Path) -> SymbaseResult<ImageInfo>
    {
        let data = fs::read(executable)?;
        let file = parse_image(executable, &data)?;

        let sections = file
            .sections()
            .map(|section| {
                let (file_offset, raw_size) = section.file_range().unwrap_or((0, 0));
                SectionInfo {
                    name: section.name().unwrap_or_default().to_owned(),
                    virtual_address: section.address(),
                    virtual_size: section.size(),
                    raw_size,
                    file_offset,
                }
            })
            .collect();

        let addressing = if file.kind() == ObjectKind::Dynamic {
            AddressingMode::Relative
        } else {
            AddressingMode::Absolute
        };

        Ok(ImageInfo {
            image_base: Address::new(image_base(&file)),
            signature: image_signature(&file),
            pointer_size: if file.is_64() { 8 } else { 4 },
            addressing,
            sections,
        })
    }

    fn populate(&self, executable: &Path, image: &ImageInfo, set: &mut DebugInfoSet) -> SymbaseResult<()>
    {
        let data = fs::read(executable)?;
        let file = parse_image(executable, &data)?;
        let endian = if file.is_little_endian() {
            RunTimeEndian::Little
        } else {
            RunTimeEndian::Big
        };
        let dwarf: OwnedDwarf = Dwarf::load(|id| load_section(executable, &file, id, endian))?;

        let mut walker = DieWalker {
            dwarf: &dwarf,
            executable,
            set,
            image_base: image.image_base.value(),
            relative: image.addressing == AddressingMode::Relative,
            compile_unit: 0,
        };

        let mut headers = dwarf.units();
        while let Some(header) = headers
            .next()
            .map_err(|err| walker.dwarf_error("reading unit header", err))?
        {
            let unit = dwarf
                .unit(header)
                .map_err(|err| walker.dwarf_error("parsing compilation unit", err))?;
            walker.compile_unit += 1;
            walker.walk_unit(&unit)?;
        }
        debug!(
            executable = %executable.display(),
            compile_units = walker.compile_unit,
            "DWARF compile units walked"
        );
        Ok(())
    }
}

/// Turns the DIE tree of each compile unit into insertion calls
struct DieWalker<'a>
{
    dwarf: &'a OwnedDwarf,
    executable: &'a Path,
    set: &'a mut DebugInfoSet,
    image_base: u64,
    relative: bool,
    compile_unit: u32,
}

fn qualify(scope: &str, name: &str) -> String
{
    if scope.is_empty() {
        name.to_owned()
    } else {
        format!("{scope}::{name}")
    }
}

impl DieWalker<'_>
{
    fn dwarf_error(&self, context: &str, err: gimli::Error) -> SymbaseError
    {
        parse_failed(self.executable, format!("{context}: {err}"))
    }

    fn walk_unit(&mut self, unit: &Unit<DwarfReader>) -> SymbaseResult<()>
    {
        let mut tree = unit
            .entries_tree(None)
            .map_err(|err| self.dwarf_error("building DIE tree", err))?;
        let root = tree.root().map_err(|err| self.dwarf_error("navigating unit root", err))?;
        self.walk_children(unit, root, "")
    }

    fn walk_children(
        &mut self,
        unit: &Unit<DwarfReader>,
        node: EntriesTreeNode<'_, '_, '_, DwarfReader>,
        scope: &str,
    ) -> SymbaseResult<()>
    {
        let mut children = node.children();
        while let Some(child) = children
            .next()
            .map_err(|err| self.dwarf_error("iterating DIE children", err))?
        {
            self.visit(unit, child, scope)?;
        }
        Ok(())
    }

    fn visit(&mut self, unit: &Unit<DwarfReader>, node: EntriesTreeNode<'_, '_, '_, DwarfReader>, scope: &str)
        -> SymbaseResult<()>
    {
        let entry = node.entry().clone();
        match entry.tag() {
            constants::DW_TAG_namespace => {
                let name = self.entry_name(unit, &entry)?;
                let inner = qualify(scope, name.as_deref().unwrap_or("(anonymous namespace)"));
                self.walk_children(unit, node, &inner)
            }
            constants::DW_TAG_structure_type | constants::DW_TAG_class_type | constants::DW_TAG_union_type => {
                self.structure(unit, node, scope)
            }
            constants::DW_TAG_array_type => self.array(unit, node),
            constants::DW_TAG_variable => self.variable(unit, &entry, scope),
            // locals and nested functions have no static address
            constants::DW_TAG_subprogram | constants::DW_TAG_lexical_block => Ok(()),
            _ => self.simple_type(unit, &entry, scope),
        }
    }

    fn number_of(&self, unit: &Unit<DwarfReader>, offset: UnitOffset<usize>) -> SymbaseResult<TypeNumber>
    {
        let section = offset
            .to_debug_info_offset(&unit.header)
            .ok_or_else(|| parse_failed(self.executable, format!("DIE offset {offset:?} lies outside .debug_info")))?;
        self.file_number(section.0)
    }

    fn file_number(&self, offset: usize) -> SymbaseResult<TypeNumber>
    {
        u32::try_from(offset)
            .ok()
            .and_then(|offset| offset.checked_add(TypeNumber::FILE_BASE))
            .filter(|raw| *raw < TypeNumber::SYNTHESIZED_BASE)
            .map(TypeNumber::from_raw)
            .ok_or_else(|| parse_failed(self.executable, format!(".debug_info offset 0x{offset:x} is out of range")))
    }

    /// Type number a reference attribute points at.
    fn reference(&self, unit: &Unit<DwarfReader>, entry: &Entry<'_, '_>, attribute: constants::DwAt)
        -> SymbaseResult<Option<TypeNumber>>
    {
        let value = entry
            .attr_value(attribute)
            .map_err(|err| self.dwarf_error("reading reference", err))?;
        match value {
            Some(AttributeValue::UnitRef(offset)) => self.number_of(unit, offset).map(Some),
            Some(AttributeValue::DebugInfoRef(offset)) => self.file_number(offset.0).map(Some),
            Some(_) => Ok(Some(TypeNumber::UNKNOWN)),
            None => Ok(None),
        }
    }

    fn type_of(&self, unit: &Unit<DwarfReader>, entry: &Entry<'_, '_>) -> SymbaseResult<TypeNumber>
    {
        Ok(self
            .reference(unit, entry, constants::DW_AT_type)?
            .unwrap_or(TypeNumber::VOID))
    }

    fn entry_name(&self, unit: &Unit<DwarfReader>, entry: &Entry<'_, '_>) -> SymbaseResult<Option<String>>
    {
        let Some(value) = entry
            .attr_value(constants::DW_AT_name)
            .map_err(|err| self.dwarf_error("reading DW_AT_name", err))?
        else {
            return Ok(None);
        };
        let reader = self
            .dwarf
            .attr_string(unit, value)
            .map_err(|err| self.dwarf_error("resolving DWARF string", err))?;
        let name = reader
            .to_string_lossy()
            .map_err(|err| self.dwarf_error("decoding DWARF string", err))?;
        Ok(Some(name.into_owned()))
    }

    fn udata(&self, entry: &Entry<'_, '_>, attribute: constants::DwAt) -> SymbaseResult<Option<u64>>
    {
        Ok(entry
            .attr(attribute)
            .map_err(|err| self.dwarf_error("reading attribute", err))?
            .and_then(|attr| attr.udata_value()))
    }

    fn flag(&self, entry: &Entry<'_, '_>, attribute: constants::DwAt) -> SymbaseResult<bool>
    {
        let value = entry
            .attr_value(attribute)
            .map_err(|err| self.dwarf_error("reading flag", err))?;
        Ok(matches!(value, Some(AttributeValue::Flag(true))))
    }

    fn simple_type(&mut self, unit: &Unit<DwarfReader>, entry: &Entry<'_, '_>, scope: &str) -> SymbaseResult<()>
    {
        let spec = match entry.tag() {
            constants::DW_TAG_base_type => {
                let size = self.udata(entry, constants::DW_AT_byte_size)?.unwrap_or(0);
                let encoding = match entry
                    .attr_value(constants::DW_AT_encoding)
                    .map_err(|err| self.dwarf_error("reading DW_AT_encoding", err))?
                {
                    Some(AttributeValue::Encoding(encoding)) => encoding,
                    _ => gimli::DwAte(0),
                };
                TypeSpec::modifier(self.number_of(unit, entry.offset())?, "", BaseType::from_dwarf_encoding(size, encoding))
            }
            constants::DW_TAG_typedef => {
                let name = self.entry_name(unit, entry)?.unwrap_or_default();
                TypeSpec::typedef(self.number_of(unit, entry.offset())?, qualify(scope, &name), self.type_of(unit, entry)?)
            }
            constants::DW_TAG_const_type => {
                TypeSpec::modifier(self.number_of(unit, entry.offset())?, "const", self.type_of(unit, entry)?)
            }
            constants::DW_TAG_volatile_type => {
                TypeSpec::modifier(self.number_of(unit, entry.offset())?, "volatile", self.type_of(unit, entry)?)
            }
            constants::DW_TAG_restrict_type | constants::DW_TAG_atomic_type => {
                TypeSpec::modifier(self.number_of(unit, entry.offset())?, "", self.type_of(unit, entry)?)
            }
            constants::DW_TAG_pointer_type
            | constants::DW_TAG_reference_type
            | constants::DW_TAG_rvalue_reference_type => {
                TypeSpec::pointer(self.number_of(unit, entry.offset())?, self.type_of(unit, entry)?)
            }
            constants::DW_TAG_enumeration_type => {
                let size = self.udata(entry, constants::DW_AT_byte_size)?.unwrap_or(4);
                let underlying = match self.reference(unit, entry, constants::DW_AT_type)? {
                    Some(underlying) => underlying,
                    None => BaseType::from_dwarf_encoding(size, constants::DW_ATE_signed),
                };
                let name = self.entry_name(unit, entry)?.unwrap_or_default();
                TypeSpec::typedef(self.number_of(unit, entry.offset())?, qualify(scope, &name), underlying)
            }
            // referenced through pointers only; nothing to read behind them
            constants::DW_TAG_subroutine_type
            | constants::DW_TAG_unspecified_type
            | constants::DW_TAG_ptr_to_member_type => {
                TypeSpec::modifier(self.number_of(unit, entry.offset())?, "", TypeNumber::VOID)
            }
            _ => return Ok(()),
        };
        self.set.insert_type(spec.in_unit(self.compile_unit))
    }

    fn array(&mut self, unit: &Unit<DwarfReader>, node: EntriesTreeNode<'_, '_, '_, DwarfReader>) -> SymbaseResult<()>
    {
        let entry = node.entry().clone();
        let number = self.number_of(unit, entry.offset())?;
        let element = self.type_of(unit, &entry)?;
        let byte_size = self.udata(&entry, constants::DW_AT_byte_size)?.unwrap_or(0);

        let mut dimensions: SmallVec<[u64; 4]> = SmallVec::new();
        let mut children = node.children();
        while let Some(child) = children
            .next()
            .map_err(|err| self.dwarf_error("iterating array dimensions", err))?
        {
            let range = child.entry();
            if matches!(range.tag(), constants::DW_TAG_subrange_type | constants::DW_TAG_enumeration_type) {
                dimensions.push(self.element_count(range)?);
            }
        }
        if dimensions.is_empty() {
            dimensions.push(0);
        }

        // inner dimensions become synthesized nodes, innermost first
        let mut inner = element;
        for &count in dimensions[1..].iter().rev() {
            let synthesized = self.set.next_synthetic_type_number()?;
            self.set
                .insert_type(TypeSpec::array(synthesized, inner, count).in_unit(self.compile_unit))?;
            inner = synthesized;
        }
        let mut outer = TypeSpec::array(number, inner, dimensions[0]).in_unit(self.compile_unit);
        if byte_size != 0 {
            outer = outer.with_size(byte_size);
        }
        self.set.insert_type(outer)
    }

    fn element_count(&self, range: &Entry<'_, '_>) -> SymbaseResult<u64>
    {
        if let Some(count) = self.udata(range, constants::DW_AT_count)? {
            return Ok(count);
        }
        let upper = range
            .attr(constants::DW_AT_upper_bound)
            .map_err(|err| self.dwarf_error("reading DW_AT_upper_bound", err))?;
        let Some(upper) = upper else {
            return Ok(0);
        };
        let lower = self.udata(range, constants::DW_AT_lower_bound)?.unwrap_or(0);
        // flexible arrays carry an upper bound of -1
        let upper = match upper.value() {
            AttributeValue::Sdata(value) => u64::try_from(value).ok(),
            _ => upper.udata_value(),
        };
        Ok(upper.map_or(0, |upper| upper.saturating_sub(lower).saturating_add(1)))
    }

    fn member_offset(&self, unit: &Unit<DwarfReader>, entry: &Entry<'_, '_>) -> SymbaseResult<u64>
    {
        let value = entry
            .attr_value(constants::DW_AT_data_member_location)
            .map_err(|err| self.dwarf_error("reading DW_AT_data_member_location", err))?;
        let offset = match value {
            Some(AttributeValue::Exprloc(expression)) => {
                let mut operations = expression.operations(unit.encoding());
                match operations
                    .next()
                    .map_err(|err| self.dwarf_error("decoding member location", err))?
                {
                    Some(Operation::PlusConstant { value }) => value,
                    _ => 0,
                }
            }
            Some(AttributeValue::Udata(value)) => value,
            Some(AttributeValue::Data1(value)) => value.into(),
            Some(AttributeValue::Data2(value)) => value.into(),
            Some(AttributeValue::Data4(value)) => value.into(),
            Some(AttributeValue::Data8(value)) => value,
            Some(AttributeValue::Sdata(value)) => u64::try_from(value).unwrap_or(0),
            _ => match self.udata(entry, constants::DW_AT_data_bit_offset)? {
                Some(bits) => bits / 8,
                None => 0,
            },
        };
        Ok(offset)
    }

    fn structure(
        &mut self,
        unit: &Unit<DwarfReader>,
        node: EntriesTreeNode<'_, '_, '_, DwarfReader>,
        scope: &str,
    ) -> SymbaseResult<()>
    {
        let entry = node.entry().clone();
        let number = self.number_of(unit, entry.offset())?;
        let name = self.entry_name(unit, &entry)?.unwrap_or_default();
        let qualified = qualify(scope, &name);
        let byte_size = self.udata(&entry, constants::DW_AT_byte_size)?.unwrap_or(0);

        // a definition completing a declaration seen before shares its member list
        let completes = match self.reference(unit, &entry, constants::DW_AT_specification)? {
            Some(declared) => self
                .set
                .type_info(declared)
                .and_then(|info| info.fields.map(|group| (declared, group))),
            None => None,
        };

        let group = if let Some((declared, group)) = completes {
            self.set.resolve_declaration(declared, byte_size)?;
            self.set
                .insert_type(TypeSpec::typedef(number, "", declared).in_unit(self.compile_unit))?;
            group
        } else {
            let group = self.set.next_field_number();
            self.set.insert_field_group(group)?;
            let spec = if self.flag(&entry, constants::DW_AT_declaration)? {
                TypeSpec::declaration(number, qualified.as_str(), group)
            } else {
                TypeSpec::structure(number, qualified.as_str(), group, byte_size)
            };
            self.set.insert_type(spec.in_unit(self.compile_unit))?;
            group
        };
        trace!(%number, name = %qualified, %group, "structure mapped");

        let mut children = node.children();
        while let Some(child) = children
            .next()
            .map_err(|err| self.dwarf_error("iterating members", err))?
        {
            let member = child.entry().clone();
            match member.tag() {
                constants::DW_TAG_member => self.member(unit, &member, group, &qualified)?,
                constants::DW_TAG_inheritance => {
                    let base = self.type_of(unit, &member)?;
                    let offset = self.member_offset(unit, &member)?;
                    self.set.insert_field_member(group, BASE_CLASS_MEMBER, base, offset)?;
                }
                constants::DW_TAG_variant_part => {}
                _ => self.visit(unit, child, &qualified)?,
            }
        }
        Ok(())
    }

    fn member(&mut self, unit: &Unit<DwarfReader>, entry: &Entry<'_, '_>, group: FieldNumber, owner: &str)
        -> SymbaseResult<()>
    {
        let name = self.entry_name(unit, entry)?.unwrap_or_default();
        let type_number = self.type_of(unit, entry)?;
        // static data members are declarations (DWARF 4)
        if self.flag(entry, constants::DW_AT_external)? || self.flag(entry, constants::DW_AT_declaration)? {
            let origin = self.number_of(unit, entry.offset())?;
            self.set
                .insert_unplaced_label(&qualify(owner, &name), type_number, origin)?;
            return Ok(());
        }
        let offset = self.member_offset(unit, entry)?;
        self.set.insert_field_member(group, &name, type_number, offset)
    }

    fn static_address(&self, unit: &Unit<DwarfReader>, entry: &Entry<'_, '_>) -> SymbaseResult<Option<u64>>
    {
        let Some(AttributeValue::Exprloc(expression)) = entry
            .attr_value(constants::DW_AT_location)
            .map_err(|err| self.dwarf_error("reading DW_AT_location", err))?
        else {
            return Ok(None);
        };
        let mut operations = expression.operations(unit.encoding());
        let address = match operations
            .next()
            .map_err(|err| self.dwarf_error("decoding location", err))?
        {
            Some(Operation::Address { address }) => address,
            Some(Operation::AddressIndex { index }) => self
                .dwarf
                .address(unit, index)
                .map_err(|err| self.dwarf_error("reading .debug_addr", err))?,
            _ => return Ok(None),
        };
        // DW_OP_addr followed by more operations is thread-local or computed
        if operations
            .next()
            .map_err(|err| self.dwarf_error("decoding location", err))?
            .is_some()
        {
            return Ok(None);
        }
        Ok(Some(address))
    }

    fn variable(&mut self, unit: &Unit<DwarfReader>, entry: &Entry<'_, '_>, scope: &str) -> SymbaseResult<()>
    {
        let own_type = self.reference(unit, entry, constants::DW_AT_type)?;
        let declared = match self.reference(unit, entry, constants::DW_AT_specification)? {
            Some(origin) => self.set.unplaced_by_origin(origin),
            None => None,
        };
        let (name, type_number) = match declared {
            Some(info) => (info.name, own_type.unwrap_or(info.type_number)),
            None => {
                let Some(name) = self.entry_name(unit, entry)? else {
                    return Ok(());
                };
                (qualify(scope, &name), own_type.unwrap_or(TypeNumber::VOID))
            }
        };

        let has_location = entry
            .attr_value(constants::DW_AT_location)
            .map_err(|err| self.dwarf_error("reading DW_AT_location", err))?
            .is_some();
        if !has_location {
            let origin = self.number_of(unit, entry.offset())?;
            self.set.insert_unplaced_label(&name, type_number, origin)?;
            return Ok(());
        }

        let Some(address) = self.static_address(unit, entry)? else {
            return Ok(());
        };
        let stored = if self.relative {
            let Some(offset) = address.checked_sub(self.image_base) else {
                trace!(label = %name, address, "label below image base skipped");
                return Ok(());
            };
            offset
        } else {
            address
        };
        self.set.insert_label(&name, type_number, stored)?;
        Ok(())
    }
}
