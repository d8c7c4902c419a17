//! # Debug Info Sources
//!
//! A [`DebugInfoSource`] is the collaborator that knows how to read one kind
//! of executable. It reports the executable's identity stamp and image layout
//! and populates a [`DebugInfoSet`] through its insertion API.
//!
//! [`ObjectDwarfSource`] reads DWARF from ELF (and other `object`-supported)
//! files. Tests and embedders can plug in their own implementations.

mod dwarf;

use std::fmt;
use std::path::Path;

pub use dwarf::ObjectDwarfSource;

use crate::error::{SymbaseError, SymbaseResult};
use crate::set::{AddressingMode, DebugInfoSet};
use crate::types::Address;

/// Freshness stamp of an executable on disk
///
/// Two stamps are compared to decide whether a loaded debug info set still
/// describes the executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExecutableIdentity
{
    /// Modification time in seconds since the Unix epoch
    pub modified: u64,
    /// Checksum over the file contents
    pub checksum: u64,
}

/// One section of the executable image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionInfo
{
    pub name: String,
    pub virtual_address: u64,
    pub virtual_size: u64,
    pub raw_size: u64,
    pub file_offset: u64,
}

/// Layout information of an executable image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo
{
    /// Link-time base address of the image
    pub image_base: Address,
    /// Linker or build signature (build id, PDB signature and age, ...)
    pub signature: Option<String>,
    /// Pointer width of the target in bytes
    pub pointer_size: u64,
    /// Whether label addresses are stored relative to the image base
    pub addressing: AddressingMode,
    pub sections: Vec<SectionInfo>,
}

impl Default for ImageInfo
{
    fn default() -> Self
    {
        Self {
            image_base: Address::ZERO,
            signature: None,
            pointer_size: 4,
            addressing: AddressingMode::Absolute,
            sections: Vec::new(),
        }
    }
}

/// Where the debug infos of an executable live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugFormat
{
    /// Inside the executable itself (DWARF)
    Embedded,
    /// In a separate program database next to the executable
    ProgramDatabase,
}

impl fmt::Display for DebugFormat
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Self::Embedded => write!(f, "embedded"),
            Self::ProgramDatabase => write!(f, "program database"),
        }
    }
}

/// Decide where the debug infos of `executable` are stored
///
/// A `.pdb` next to the executable means a program database. A `.pdb` *and*
/// a `.dbg` file next to it are ambiguous. Everything else is read from the
/// executable itself.
///
/// ## Errors
///
/// - `AmbiguousDebugFormat`: both a `.pdb` and a `.dbg` file exist
pub fn detect_debug_format(executable: &Path) -> SymbaseResult<DebugFormat>
{
    let pdb = executable.with_extension("pdb").is_file();
    let dbg = executable.with_extension("dbg").is_file();
    match (pdb, dbg) {
        (true, true) => Err(SymbaseError::AmbiguousDebugFormat(executable.display().to_string())),
        (true, false) => Ok(DebugFormat::ProgramDatabase),
        _ => Ok(DebugFormat::Embedded),
    }
}

/// Reader for one kind of executable and debug info format
pub trait DebugInfoSource: Send + Sync
{
    /// Identity stamp of the executable as it is on disk right now.
    ///
    /// ## Errors
    ///
    /// Any error means the executable is unreadable.
    fn identity(&self, executable: &Path) -> SymbaseResult<ExecutableIdentity>;

    /// Section table, image base and signature.
    ///
    /// ## Errors
    ///
    /// The image could not be parsed.
    fn image_info(&self, executable: &Path) -> SymbaseResult<ImageInfo>;

    /// Feed all types, field groups and labels into `set`.
    ///
    /// `set` is empty and already carries the image information.
    ///
    /// ## Errors
    ///
    /// Parse failures and insertion errors; the set is cleared afterwards.
    fn populate(&self, executable: &Path, image: &ImageInfo, set: &mut DebugInfoSet) -> SymbaseResult<()>;

    /// Where the debug infos are stored. Sources only read [`DebugFormat::Embedded`].
    ///
    /// ## Errors
    ///
    /// See [`detect_debug_format`].
    fn detect_format(&self, executable: &Path) -> SymbaseResult<DebugFormat>
    {
        detect_debug_format(executable)
    }
}

#[cfg(test)]
mod tests
{
    use std::fs;

    use super::*;

    #[test]
    fn test_detect_format_next_to_executable()
    {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("app.exe");
        fs::write(&exe, b"MZ").unwrap();
        assert_eq!(detect_debug_format(&exe).unwrap(), DebugFormat::Embedded);

        fs::write(dir.path().join("app.pdb"), b"").unwrap();
        assert_eq!(detect_debug_format(&exe).unwrap(), DebugFormat::ProgramDatabase);

        fs::write(dir.path().join("app.dbg"), b"").unwrap();
        assert!(matches!(detect_debug_format(&exe), Err(SymbaseError::AmbiguousDebugFormat(_))));
    }
}
