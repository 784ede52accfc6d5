//! Module identifiers
//!
//! A module name typed by a human becomes a token that is safe as a
//! directory name, a PHP namespace segment and a translation category prefix.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::GeneratorError;

/// Strip every character outside `[A-Za-z0-9_]`, then lowercase the rest.
///
/// Never fails. An input made only of disallowed characters yields `""`,
/// which [`ModuleIdentifier::parse`] rejects.
pub fn sanitize(raw_name: &str) -> String {
    raw_name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Sanitized, non-empty module token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModuleIdentifier(String);

impl ModuleIdentifier {
    /// Sanitize `raw_name` and reject an empty result.
    pub fn parse(raw_name: &str) -> Result<Self, GeneratorError> {
        let token = sanitize(raw_name);
        if token.is_empty() {
            return Err(GeneratorError::InvalidInput(format!(
                "module name {raw_name:?} contains no characters from [A-Za-z0-9_]"
            )));
        }
        Ok(Self(token))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Token with its first character uppercased (`kudosboard` -> `Kudosboard`).
    pub fn display_name(&self) -> String {
        let mut chars = self.0.chars();
        match chars.next() {
            Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
            None => String::new(),
        }
    }

    /// PHP namespace of the generated module.
    pub fn namespace(&self) -> String {
        format!("humhub\\modules\\{}", self.0)
    }

    /// Translation category used by `Yii::t` in generated code.
    pub fn message_category(&self) -> String {
        format!("{}Module.base", self.0)
    }

    /// File name of the archive produced for this token.
    pub fn archive_file_name(&self) -> String {
        format!("{}.zip", self.0)
    }
}

impl fmt::Display for ModuleIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ModuleIdentifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ModuleIdentifier {
    type Error = GeneratorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ModuleIdentifier> for String {
    fn from(id: ModuleIdentifier) -> Self {
        id.0
    }
}
