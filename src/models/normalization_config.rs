use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{ConfigError, ExportError};

/// One step of the rule chain. `pattern` is a regular expression, `replace`
/// may reference groups with `$1` / `${name}`; `\1` is accepted too and
/// rewritten to `${1}` when the rule is compiled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplacementRule {
    pub pattern: String,
    pub replace: String,
}

impl ReplacementRule {
    pub fn new(pattern: impl Into<String>, replace: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            replace: replace.into(),
        }
    }
}

/// Mapping document loaded by operators (JSON). A missing field leaves the
/// engine's current value for it untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NormalizationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacements: Option<Vec<ReplacementRule>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mappings: Option<BTreeMap<String, String>>,
}

/// Default chain: French school-name abbreviations and filler words.
const BUILTIN_REPLACEMENTS: &[(&str, &str)] = &[
    (r"\bSTE\b", "SAINTE"),
    (r"\bST\b", "SAINT"),
    (r"MATERNELLEELEMENTAIRE", "MATERNELLE ELEMENTAIRE"),
    (r"ELEMENTAIREMATERNELLE", "ELEMENTAIRE MATERNELLE"),
    (r"\bMAT\b", "MATERNELLE"),
    (r"\bELEM\b", "ELEMENTAIRE"),
    (r"\bELE\b", "ELEMENTAIRE"),
    (r"\bECOLE\b", ""),
    (r"\bCANTINE SCOLAIRE\b", ""),
    (r"\bRESTAURATION\b", ""),
    (r"\+", " "),
    (r"\bET\b", ""),
    (r"\s+", " "),
];

impl NormalizationConfig {
    /// Rule chain the engine starts with.
    pub fn builtin() -> Self {
        Self {
            version: None,
            description: None,
            replacements: Some(
                BUILTIN_REPLACEMENTS
                    .iter()
                    .map(|(pattern, replace)| ReplacementRule::new(*pattern, *replace))
                    .collect(),
            ),
            mappings: Some(BTreeMap::new()),
        }
    }

    /// Starter document handed to operators.
    pub fn template() -> Self {
        let replacements = [
            (r"\bSTE\b", "SAINTE"),
            (r"\bST\b", "SAINT"),
            (r"\bMAT\b", "MATERNELLE"),
            (r"\bELEM\b", "ELEMENTAIRE"),
        ]
        .iter()
        .map(|(pattern, replace)| ReplacementRule::new(*pattern, *replace))
        .collect();
        let mappings = [
            ("_exemple_1", "STE AURELIE MAT -> SAINTE AURELIE"),
            ("STE AURELIE MAT", "SAINTE AURELIE"),
            ("SAINTE AURELIE MATERNELLE", "SAINTE AURELIE"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Self {
            version: Some("1.0".to_string()),
            description: Some("School name normalization mapping template".to_string()),
            replacements: Some(replacements),
            mappings: Some(mappings),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Write as pretty JSON (non-ASCII kept as is).
    pub fn write(&self, path: &Path) -> Result<(), ExportError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| ExportError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}
