//! Header metadata found above the order table: school, agent and period.

use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

use crate::normalizer::fold_key;

fn label_value_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r":\s*(.+)").expect("label value regex"))
}

/// Text after the first colon, trimmed. `None` when there is no colon or
/// nothing follows it.
fn label_value(text: &str) -> Option<String> {
    let value = label_value_regex().captures(text)?.get(1)?.as_str().trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentHeader {
    pub school: Option<String>,
    pub agent: Option<String>,
    pub period: Option<String>,
}

impl DocumentHeader {
    /// Scan text cells (or lines) in order. Later matches overwrite earlier
    /// ones.
    pub fn scan<'a, I>(texts: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut header = Self::default();
        for text in texts {
            header.scan_text(text);
        }
        header
    }

    fn scan_text(&mut self, text: &str) {
        let key = fold_key(text);
        if key.contains("RESTAURANT") || key.contains("ECOLE") {
            if let Some(school) = label_value(text) {
                self.school = Some(school);
            }
        }
        if key.contains("AGENT") {
            if let Some(agent) = label_value(text) {
                self.agent = Some(agent);
            }
        }
        if key.contains("PERIODE") || key.contains("SEMAINE") {
            self.period = Some(text.trim().to_string());
        }
    }

    /// School name, or `fallback` (the file stem) when none was found.
    pub fn school_or(&self, fallback: &str) -> String {
        self.school.clone().unwrap_or_else(|| fallback.to_string())
    }
}

pub fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|o| o.to_str())
        .unwrap_or("")
        .to_string()
}

pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|o| o.to_str())
        .unwrap_or("")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_school_match_wins() {
        let header = DocumentHeader::scan([
            "RESTAURANT SCOLAIRE : Jules Ferry",
            "Nom de l'école: Ste Marie ",
            "Agent : M. Dupont",
            "Semaine du 12 au 16 mai",
        ]);
        assert_eq!(header.school.as_deref(), Some("Ste Marie"));
        assert_eq!(header.agent.as_deref(), Some("M. Dupont"));
        assert_eq!(header.period.as_deref(), Some("Semaine du 12 au 16 mai"));
    }

    #[test]
    fn keyword_without_value_is_ignored() {
        let header = DocumentHeader::scan(["ECOLE", "Ecole :   ", "Commande repas"]);
        assert_eq!(header.school, None);
        assert_eq!(header.school_or("bon_commande_s12"), "bon_commande_s12");
    }

    #[test]
    fn file_stem_drops_extension() {
        let path = Path::new("/data/2024/Pasteur S12.xlsx");
        assert_eq!(file_stem(path), "Pasteur S12");
        assert_eq!(file_name(path), "Pasteur S12.xlsx");
    }
}
