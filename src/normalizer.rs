//! School name normalization: exact-match mapping table first, then an
//! ordered regex rule chain over the uppercased, accent-free name.

use chrono::Local;
use regex::{Captures, Regex};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::error::{ConfigError, ExportError};
use crate::models::NormalizationConfig;

/// Canonical name returned for empty input or names the rules erase.
pub const UNKNOWN_SCHOOL: &str = "ECOLE_INCONNUE";

/// File name prefix of the found-schools export.
pub const FOUND_SCHOOLS_PREFIX: &str = "ecoles_trouvees_";

/// Trim, uppercase and drop combining marks (NFD), e.g. "Écôle" -> "ECOLE".
pub fn fold_key(text: &str) -> String {
    text.trim()
        .to_uppercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect()
}

/// Rewrite `\1`-style group references (as written for Python `re.sub`) to
/// the `${1}` form the regex crate expects. `$1` / `${name}` pass through.
fn translate_group_refs(replace: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let backref = RE.get_or_init(|| Regex::new(r"\\(\d+)").expect("group reference regex"));
    backref
        .replace_all(replace, |caps: &Captures| format!("${{{}}}", &caps[1]))
        .into_owned()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone)]
struct CompiledRule {
    regex: Regex,
    replace: String,
}

/// A name whose canonical form changes again when normalized a second time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotenceViolation {
    pub input: String,
    pub first: String,
    pub second: String,
}

/// Run-scoped normalization state. One instance is handed to every extractor
/// call of a batch; only the batch worker mutates it.
#[derive(Debug)]
pub struct NormalizationEngine {
    rules: Vec<CompiledRule>,
    mappings: HashMap<String, String>,
    found_schools: BTreeSet<String>,
    consolidations: BTreeMap<String, Vec<String>>,
}

impl Default for NormalizationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl NormalizationEngine {
    /// Engine with the built-in rule chain and an empty mapping table.
    pub fn new() -> Self {
        let mut engine = Self::empty();
        if let Err(e) = engine.load_config(&NormalizationConfig::builtin()) {
            tracing::error!(error = %e, "built-in normalization rules rejected");
        }
        engine
    }

    /// Engine with no rules and no mappings.
    pub fn empty() -> Self {
        Self {
            rules: Vec::new(),
            mappings: HashMap::new(),
            found_schools: BTreeSet::new(),
            consolidations: BTreeMap::new(),
        }
    }

    /// Replace the rule chain and/or the mapping table. Every pattern is
    /// compiled before anything is swapped in, so on error the engine keeps
    /// its previous configuration.
    pub fn load_config(&mut self, config: &NormalizationConfig) -> Result<(), ConfigError> {
        let rules = match &config.replacements {
            Some(replacements) => {
                let mut compiled = Vec::with_capacity(replacements.len());
                for rule in replacements {
                    let regex =
                        Regex::new(&rule.pattern).map_err(|source| ConfigError::InvalidPattern {
                            pattern: rule.pattern.clone(),
                            source,
                        })?;
                    compiled.push(CompiledRule {
                        regex,
                        replace: translate_group_refs(&rule.replace),
                    });
                }
                Some(compiled)
            }
            None => None,
        };
        let mappings = config.mappings.as_ref().map(|mappings| {
            mappings
                .iter()
                .map(|(key, canonical)| (fold_key(key), canonical.clone()))
                .collect::<HashMap<_, _>>()
        });

        if let Some(rules) = rules {
            self.rules = rules;
        }
        if let Some(mappings) = mappings {
            self.mappings = mappings;
        }
        debug!(
            rules = self.rules.len(),
            mappings = self.mappings.len(),
            "normalization config loaded"
        );
        Ok(())
    }

    /// Read a JSON mapping document and apply it with [`Self::load_config`].
    pub fn load_mapping_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let config = NormalizationConfig::load(path)?;
        self.load_config(&config)?;
        debug!(path = %path.display(), "mapping file loaded");
        Ok(())
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn mapping_count(&self) -> usize {
        self.mappings.len()
    }

    /// Canonical name for `raw` without recording anything.
    pub fn canonicalize(&self, raw: &str) -> String {
        if raw.trim().is_empty() {
            return UNKNOWN_SCHOOL.to_string();
        }
        let key = fold_key(raw);
        if let Some(canonical) = self.mappings.get(&key) {
            return canonical.clone();
        }
        let mut name = key;
        for rule in &self.rules {
            name = rule
                .regex
                .replace_all(&name, rule.replace.as_str())
                .into_owned();
        }
        let name = collapse_whitespace(&name);
        if name.is_empty() {
            UNKNOWN_SCHOOL.to_string()
        } else {
            name
        }
    }

    /// Canonical name for `raw`, recording the spelling in the found-schools
    /// set and the consolidation index. Empty input records nothing.
    pub fn normalize(&mut self, raw: &str) -> String {
        let canonical = self.canonicalize(raw);
        if raw.trim().is_empty() {
            return canonical;
        }
        self.found_schools.insert(raw.to_string());
        let originals = self.consolidations.entry(canonical.clone()).or_default();
        if !originals.iter().any(|o| o == raw) {
            originals.push(raw.to_string());
        }
        canonical
    }

    /// Names whose canonical form is not a fixed point of the active
    /// configuration.
    pub fn check_idempotence<'a, I>(&self, names: I) -> Vec<IdempotenceViolation>
    where
        I: IntoIterator<Item = &'a str>,
    {
        names
            .into_iter()
            .filter_map(|name| {
                let first = self.canonicalize(name);
                let second = self.canonicalize(&first);
                (first != second).then(|| IdempotenceViolation {
                    input: name.to_string(),
                    first,
                    second,
                })
            })
            .collect()
    }

    /// Distinct original spellings seen so far, sorted.
    pub fn found_schools(&self) -> Vec<&str> {
        self.found_schools.iter().map(String::as_str).collect()
    }

    /// Canonical name -> original spellings, in first-seen order.
    pub fn consolidations(&self) -> &BTreeMap<String, Vec<String>> {
        &self.consolidations
    }

    /// Human-readable list of canonical names that absorbed more than one
    /// spelling.
    pub fn report(&self) -> String {
        let merged: Vec<_> = self
            .consolidations
            .iter()
            .filter(|(_, originals)| originals.len() > 1)
            .collect();
        if merged.is_empty() {
            return "No school names consolidated".to_string();
        }
        let mut report = format!("{} school names consolidated\n\n", merged.len());
        for (canonical, originals) in merged {
            report.push_str(&format!("{}:\n", canonical));
            for original in originals {
                report.push_str(&format!("   <- {}\n", original));
            }
            report.push('\n');
        }
        report
    }

    /// Write the found schools to `ecoles_trouvees_<timestamp>.json` and
    /// `.txt` in `output_dir`. Returns (json path, txt path).
    pub fn export_found_schools(
        &self,
        output_dir: &Path,
    ) -> Result<(PathBuf, PathBuf), ExportError> {
        fs::create_dir_all(output_dir).map_err(|source| ExportError::Write {
            path: output_dir.to_path_buf(),
            source,
        })?;
        let now = Local::now();
        let timestamp = now.format("%Y%m%d_%H%M%S");
        let schools = self.found_schools();

        let json_path = output_dir.join(format!("{}{}.json", FOUND_SCHOOLS_PREFIX, timestamp));
        let document = serde_json::json!({
            "date": now.to_rfc3339(),
            "total_schools": schools.len(),
            "schools": schools,
        });
        let json = serde_json::to_string_pretty(&document)?;
        fs::write(&json_path, json).map_err(|source| ExportError::Write {
            path: json_path.clone(),
            source,
        })?;

        let txt_path = output_dir.join(format!("{}{}.txt", FOUND_SCHOOLS_PREFIX, timestamp));
        let mut text = format!(
            "Schools found - {}\nTotal: {} schools\n{}\n\n",
            now.format("%Y-%m-%d %H:%M:%S"),
            schools.len(),
            "=".repeat(80)
        );
        for school in &schools {
            text.push_str(school);
            text.push('\n');
        }
        fs::write(&txt_path, text).map_err(|source| ExportError::Write {
            path: txt_path.clone(),
            source,
        })?;

        info!(schools = schools.len(), json = %json_path.display(), "found schools exported");
        Ok((json_path, txt_path))
    }
}
