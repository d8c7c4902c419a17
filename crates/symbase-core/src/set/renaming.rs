//! Label renaming rules.

use std::borrow::Cow;

use serde::Deserialize;
use tracing::warn;

use crate::storage::MAX_SYMBOL_LEN;

/// One label rewrite rule
///
/// The `from` pattern selects how the rule matches:
///
/// - `^prefix` replaces `prefix` at the start of the label
/// - `suffix$` replaces `suffix` at the end of the label
/// - anything else replaces every occurrence
///
/// ## Example
///
/// ```rust
/// use symbase_core::set::RenameRule;
///
/// let rule = RenameRule::new("^Mod_", "");
/// assert_eq!(rule.apply("Mod_Speed").as_deref(), Some("Speed"));
/// assert_eq!(rule.apply("Speed_Mod_"), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RenameRule
{
    pub from: String,
    pub to: String,
}

impl RenameRule
{
    #[must_use]
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self
    {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Rewrite `label`, or `None` if the rule does not match.
    #[must_use]
    pub fn apply(&self, label: &str) -> Option<String>
    {
        if let Some(prefix) = self.from.strip_prefix('^') {
            let rest = label.strip_prefix(prefix)?;
            return Some(format!("{}{rest}", self.to));
        }
        if let Some(suffix) = self.from.strip_suffix('$') {
            let rest = label.strip_suffix(suffix)?;
            return Some(format!("{rest}{}", self.to));
        }
        if self.from.is_empty() || !label.contains(self.from.as_str()) {
            return None;
        }
        Some(label.replace(self.from.as_str(), &self.to))
    }
}

/// Apply `rules` in order to `label`
///
/// A rule whose result would exceed the maximum label length is skipped.
#[must_use]
pub fn rename_label<'a>(rules: &[RenameRule], label: &'a str) -> Cow<'a, str>
{
    let mut current = Cow::Borrowed(label);
    for rule in rules {
        let Some(renamed) = rule.apply(&current) else {
            continue;
        };
        if renamed.len() > MAX_SYMBOL_LEN {
            warn!(label = %current, from = %rule.from, "renamed label exceeds {MAX_SYMBOL_LEN} bytes, rule skipped");
            continue;
        }
        current = Cow::Owned(renamed);
    }
    current
}

/// External store of renaming rules, keyed by executable
///
/// Consulted once when a debug info set is created.
pub trait RenamingRules: Send + Sync
{
    /// Rules for the executable with file name `executable` (no directory).
    fn rules_for(&self, executable: &str) -> Vec<RenameRule>;
}

/// Store without any rules.
impl RenamingRules for ()
{
    fn rules_for(&self, _executable: &str) -> Vec<RenameRule>
    {
        Vec::new()
    }
}
