//! Input file discovery.

use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::ExtractError;
use crate::normalizer::FOUND_SCHOOLS_PREFIX;

/// Extractor a file is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Spreadsheet read with the table extractor.
    Workbook,
    /// PDF read page by page with the text-block extractor.
    Pdf,
    /// Pre-extracted page text (form-feed separated) for the text-block extractor.
    PageText,
}

impl DocumentKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "xlsx" | "xlsm" | "xls" | "ods" => Some(DocumentKind::Workbook),
            "pdf" => Some(DocumentKind::Pdf),
            "txt" => Some(DocumentKind::PageText),
            _ => None,
        }
    }
}

fn is_candidate(path: &Path) -> bool {
    let name = path.file_name().and_then(|o| o.to_str()).unwrap_or("");
    // Skip Office lock files and our own school-list exports.
    if name.starts_with("~$") || name.starts_with(FOUND_SCHOOLS_PREFIX) {
        return false;
    }
    DocumentKind::from_path(path).is_some()
}

/// All supported documents under `dir`, recursively, sorted by path.
/// Symlinked directories are not descended into; symlinked files are kept.
pub fn discover_files(dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry.map_err(|e| ExtractError::Read {
            path: e.path().unwrap_or(dir).to_path_buf(),
            source: e.into(),
        })?;
        if entry.file_type().is_dir() {
            continue;
        }
        let path = entry.path();
        if path.is_file() && is_candidate(path) {
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    debug!(dir = %dir.display(), files = files.len(), "input files discovered");
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn kind_follows_extension_case_insensitively() {
        assert_eq!(DocumentKind::from_path(Path::new("a/B.XLSX")), Some(DocumentKind::Workbook));
        assert_eq!(DocumentKind::from_path(Path::new("b.xls")), Some(DocumentKind::Workbook));
        assert_eq!(DocumentKind::from_path(Path::new("c.Pdf")), Some(DocumentKind::Pdf));
        assert_eq!(DocumentKind::from_path(Path::new("d.txt")), Some(DocumentKind::PageText));
        assert_eq!(DocumentKind::from_path(Path::new("e.docx")), None);
        assert_eq!(DocumentKind::from_path(Path::new("noext")), None);
    }

    #[test]
    fn discovery_recurses_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("semaine_2");
        fs::create_dir_all(&nested).unwrap();
        for path in [
            dir.path().join("b.pdf"),
            dir.path().join("a.xlsx"),
            dir.path().join("notes.docx"),
            dir.path().join("~$a.xlsx"),
            dir.path().join("ecoles_trouvees_20240101_120000.txt"),
            nested.join("c.xls"),
        ] {
            fs::write(&path, b"x").unwrap();
        }

        let files = discover_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(names, vec!["a.xlsx", "b.pdf", "semaine_2/c.xls"]);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_directories_are_not_followed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"Standard 1 0 0 0").unwrap();
        std::os::unix::fs::symlink(dir.path(), dir.path().join("loop")).unwrap();
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("b.pdf"), b"x").unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("elsewhere")).unwrap();

        let files = discover_files(dir.path()).unwrap();
        assert_eq!(files, vec![dir.path().join("a.txt")]);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover_files(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, ExtractError::Read { .. }));
    }
}
