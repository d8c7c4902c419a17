//! # Registry Configuration
//!
//! Capacities, the eviction threshold and the label renaming rules, read
//! from TOML. Every key is optional.
//!
//! ```toml
//! max_debug_infos = 64
//! max_processes = 64
//! max_connections = 100
//! eviction_threshold = 2
//! default_pointer_size = 4
//!
//! [[renaming]]
//! executable = "controller.elf"
//! from = "^Mod_"
//! to = ""
//! ```

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{SymbaseError, SymbaseResult};
use crate::set::{RenameRule, RenamingRules};

/// One `[[renaming]]` entry
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RenamingEntry
{
    /// File name of the executable the rule applies to (case-insensitive)
    pub executable: String,
    #[serde(flatten)]
    pub rule: RenameRule,
}

/// Registry settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig
{
    /// Capacity of the debug info set pool
    pub max_debug_infos: usize,
    /// Capacity of the process record pool
    pub max_processes: usize,
    /// Capacity of the connection pool
    pub max_connections: usize,
    /// Unattached loaded sets kept before the oldest is evicted
    pub eviction_threshold: usize,
    /// Pointer width assumed before an image reports its own
    pub default_pointer_size: u64,
    pub renaming: Vec<RenamingEntry>,
}

impl Default for RegistryConfig
{
    fn default() -> Self
    {
        Self {
            max_debug_infos: 64,
            max_processes: 64,
            max_connections: 100,
            eviction_threshold: 2,
            default_pointer_size: 4,
            renaming: Vec::new(),
        }
    }
}

impl RegistryConfig
{
    /// Parse a TOML document
    ///
    /// ## Errors
    ///
    /// `Config` if the document is malformed, has unknown keys or sets a
    /// capacity to zero.
    ///
    /// ## Example
    ///
    /// ```rust
    /// use symbase_core::config::RegistryConfig;
    ///
    /// let config = RegistryConfig::from_toml_str("max_connections = 8").unwrap();
    /// assert_eq!(config.max_connections, 8);
    /// assert_eq!(config.max_processes, 64);
    /// ```
    pub fn from_toml_str(text: &str) -> SymbaseResult<Self>
    {
        let config: Self = toml::from_str(text).map_err(|err| SymbaseError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    ///
    /// ## Errors
    ///
    /// `Io` if the file cannot be read, otherwise see [`from_toml_str`](Self::from_toml_str).
    pub fn from_file(path: &Path) -> SymbaseResult<Self>
    {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text).map_err(|err| match err {
            SymbaseError::Config(details) => SymbaseError::Config(format!("{}: {details}", path.display())),
            other => other,
        })
    }

    fn validate(&self) -> SymbaseResult<()>
    {
        let capacities = [
            ("max_debug_infos", self.max_debug_infos),
            ("max_processes", self.max_processes),
            ("max_connections", self.max_connections),
        ];
        for (key, value) in capacities {
            if value == 0 {
                return Err(SymbaseError::Config(format!("{key} must be at least 1")));
            }
        }
        if !matches!(self.default_pointer_size, 2 | 4 | 8) {
            return Err(SymbaseError::Config(format!(
                "default_pointer_size must be 2, 4 or 8, not {}",
                self.default_pointer_size
            )));
        }
        Ok(())
    }
}

impl RenamingRules for RegistryConfig
{
    fn rules_for(&self, executable: &str) -> Vec<RenameRule>
    {
        self.renaming
            .iter()
            .filter(|entry| entry.executable.eq_ignore_ascii_case(executable))
            .map(|entry| entry.rule.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests
{
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults()
    {
        let config = RegistryConfig::from_toml_str("").unwrap();
        assert_eq!(config, RegistryConfig::default());
        assert_eq!(config.eviction_threshold, 2);
    }

    #[test]
    fn test_renaming_entries_per_executable()
    {
        let config = RegistryConfig::from_toml_str(
            r#"
            [[renaming]]
            executable = "Controller.elf"
            from = "^Mod_"
            to = ""

            [[renaming]]
            executable = "other.elf"
            from = "x"
            to = "y"
            "#,
        )
        .unwrap();

        let rules = config.rules_for("controller.elf");
        assert_eq!(rules, vec![RenameRule::new("^Mod_", "")]);
        assert!(config.rules_for("unknown.elf").is_empty());
    }

    #[test]
    fn test_invalid_documents()
    {
        let error = RegistryConfig::from_toml_str("max_processes = 0").unwrap_err();
        assert!(format!("{error}").contains("max_processes"));
        assert!(RegistryConfig::from_toml_str("bogus = 1").is_err());
        assert!(RegistryConfig::from_toml_str("default_pointer_size = 3").is_err());
    }

    #[test]
    fn test_from_file()
    {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_debug_infos = 3").unwrap();
        let config = RegistryConfig::from_file(file.path()).unwrap();
        assert_eq!(config.max_debug_infos, 3);

        let missing = RegistryConfig::from_file(Path::new("/nonexistent/symbase.toml"));
        assert!(matches!(missing, Err(SymbaseError::Io(_))));
    }
}
