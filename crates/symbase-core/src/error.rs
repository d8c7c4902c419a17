//! # Error Types
//!
//! Error handling for the debug info database.
//!
//! Lookups that simply find nothing (unknown label, type or field) are not
//! errors: they return `None`. This enum covers the failures that callers
//! have to react to, namely load failures, exhausted registry pools, registry
//! protocol violations and inconsistent input from a debug info parser.

use thiserror::Error;

use crate::types::{ClientId, FieldNumber, TypeNumber};

/// Main error type for debug info database operations
///
/// ## Error Categories
///
/// 1. **Source errors**: ExecutableUnreadable, AmbiguousDebugFormat, UnsupportedFormat, LoadFailed
/// 2. **Capacity errors**: CapacityExhausted
/// 3. **Registry errors**: DuplicateConnection, UnknownConnection, ProcessAlreadyRunning, UnknownProcess, ShutDown
/// 4. **Parser errors**: DuplicateTypeNumber, DuplicateFieldGroup, UnknownFieldGroup, NotADeclaration, SynthesizedTypesExhausted
/// 5. **Configuration errors**: Config
/// 6. **Internal errors**: Internal
/// 7. **I/O errors**: Io
#[derive(Error, Debug)]
pub enum SymbaseError
{
    /// The executable a debug info set belongs to cannot be read
    ///
    /// Reported when the identity stamp (timestamp, checksum) of the
    /// executable cannot be determined. A previously loaded set for this
    /// executable is discarded.
    #[error("Executable {path} is unreadable: {details}")]
    ExecutableUnreadable
    {
        /// Path of the executable
        path: String,
        /// What went wrong while reading it
        details: String,
    },

    /// More than one external debug info file matches the executable
    ///
    /// For example both a `.pdb` and a `.dbg` file lie next to the
    /// executable, so it is not clear which one describes it.
    #[error("Ambiguous debug info for {0}: more than one debug info file found")]
    AmbiguousDebugFormat(String),

    /// The debug info of the executable is stored in a format no source supports
    #[error("Unsupported debug info format: {0}")]
    UnsupportedFormat(String),

    /// Parsing or populating the debug info failed
    ///
    /// The partially built set is torn down and goes back to empty.
    #[error("Failed to load debug infos for {executable}: {details}")]
    LoadFailed
    {
        /// Executable whose debug infos were being loaded
        executable: String,
        /// Description of the failure
        details: String,
    },

    /// A fixed-capacity registry pool has no free slot left
    ///
    /// Nothing was allocated. Disconnect clients or terminate processes to
    /// free slots, or raise the capacity in the registry configuration.
    #[error("Resource exhausted: all {capacity} {pool} slots are in use")]
    CapacityExhausted
    {
        /// Name of the exhausted pool
        pool: &'static str,
        /// Configured capacity of the pool
        capacity: usize,
    },

    /// A client tried to connect with an id that is already connected
    #[error("Connection {0} already exists")]
    DuplicateConnection(ClientId),

    /// No connection exists for the given client id
    #[error("No connection with id {0}")]
    UnknownConnection(ClientId),

    /// A process with this name is already running
    #[error("Process {name} is already running with PID {pid}")]
    ProcessAlreadyRunning
    {
        /// Process name
        name: String,
        /// PID of the running instance
        pid: u32,
    },

    /// No process record exists for the given name
    #[error("Process not found: {0}")]
    UnknownProcess(String),

    /// The registry was shut down and accepts no further requests
    #[error("Registry has been shut down")]
    ShutDown,

    /// A parser inserted the same type number twice
    #[error("Type number {0} already exists")]
    DuplicateTypeNumber(TypeNumber),

    /// A parser inserted the same field group twice
    #[error("Field group {0} already exists")]
    DuplicateFieldGroup(FieldNumber),

    /// A parser added a member to a field group that was never inserted
    #[error("Field group {0} does not exist")]
    UnknownFieldGroup(FieldNumber),

    /// A parser tried to resolve a type that is not a forward declaration
    #[error("Type {0} is not a forward declaration")]
    NotADeclaration(TypeNumber),

    /// The synthesized type number range has been used up
    #[error("No synthesized type numbers left")]
    SynthesizedTypesExhausted,

    /// The registry configuration could not be read or parsed
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// An internal invariant was violated
    ///
    /// These are logged where they occur. Seeing one means a table was
    /// corrupted, typically by a parser feeding inconsistent data.
    #[error("Internal error: {0}")]
    Internal(String),

    /// I/O error (for file operations, etc.)
    ///
    /// This is a standard Rust `std::io::Error` converted to our error type.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for `Result<T, SymbaseError>`
///
/// ```rust
/// use symbase_core::error::SymbaseResult;
/// fn foo() -> SymbaseResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type SymbaseResult<T> = std::result::Result<T, SymbaseError>;
