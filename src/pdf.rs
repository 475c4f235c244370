//! Order extraction from page text (PDF pages or pre-extracted text dumps).
//!
//! The PDF layout prints one line per category followed by the quantities of
//! the first four weekdays. Quantities are mapped by position onto Monday to
//! Thursday; a fifth number on the line is not read and is reported as a
//! warning.

use lopdf::Document;
use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::error::ExtractError;
use crate::metadata::{file_name, file_stem, DocumentHeader};
use crate::normalizer::NormalizationEngine;
use crate::types::{Category, OrderRecord, Weekday};

/// Days covered by the captured quantity groups, in order.
const TEXT_WEEKDAYS: [Weekday; 4] = [
    Weekday::Monday,
    Weekday::Tuesday,
    Weekday::Wednesday,
    Weekday::Thursday,
];

/// Separator between pages in `.txt` dumps (form feed, as written by pdftotext).
pub const PAGE_BREAK: char = '\x0c';

fn category_patterns() -> &'static [(Category, Regex)] {
    static PATTERNS: OnceLock<Vec<(Category, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        Category::TEXT
            .into_iter()
            .map(|category| {
                let pattern = match category {
                    // The children line may carry a caption before the numbers.
                    Category::Children => r"Enfants.*?(\d+)\s+(\d+)\s+(\d+)\s+(\d+)".to_string(),
                    _ => format!(
                        r"{}\s+(\d+)\s+(\d+)\s+(\d+)\s+(\d+)",
                        regex::escape(category.label())
                    ),
                };
                (category, Regex::new(&pattern).expect("category regex"))
            })
            .collect()
    })
}

fn trailing_number_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[ \t]+(\d+)").expect("trailing number regex"))
}

/// Text of every page, in page order. Pages whose content stream cannot be
/// decoded come back empty.
pub fn read_pdf_pages(path: &Path) -> Result<Vec<String>, ExtractError> {
    let document = Document::load(path).map_err(|e| ExtractError::Pdf {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let mut pages = Vec::new();
    for page_number in document.get_pages().keys() {
        match document.extract_text(&[*page_number]) {
            Ok(text) => pages.push(text),
            Err(e) => {
                warn!(
                    file = %path.display(),
                    page = page_number,
                    error = %e,
                    "page text unavailable"
                );
                pages.push(String::new());
            }
        }
    }
    Ok(pages)
}

/// Pages of a text dump, split on form feeds.
pub fn read_text_pages(path: &Path) -> Result<Vec<String>, ExtractError> {
    let text = fs::read_to_string(path).map_err(|source| ExtractError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(text.split(PAGE_BREAK).map(str::to_string).collect())
}

/// Extract records from a sequence of pages. Each page is read on its own:
/// header lines give the school and agent, category lines give quantities.
pub fn extract_pages(
    pages: &[String],
    source_file: &str,
    fallback_school: &str,
    engine: &mut NormalizationEngine,
) -> Vec<OrderRecord> {
    let mut records = Vec::new();
    for (page_idx, page) in pages.iter().enumerate() {
        if page.trim().is_empty() {
            continue;
        }
        let header = DocumentHeader::scan(page.lines());
        let school = header.school_or(fallback_school);
        let school_normalized = engine.normalize(&school);

        for (category, regex) in category_patterns() {
            let Some(caps) = regex.captures(page) else {
                continue;
            };
            if let Some(whole) = caps.get(0) {
                if let Some(extra) = trailing_number_regex().captures(&page[whole.end()..]) {
                    warn!(
                        file = source_file,
                        page = page_idx + 1,
                        category = category.label(),
                        dropped = &extra[1],
                        "quantity after the fourth day column is not read"
                    );
                }
            }
            for (group, weekday) in TEXT_WEEKDAYS.iter().enumerate() {
                let Some(raw) = caps.get(group + 1) else {
                    continue;
                };
                let quantity = match raw.as_str().parse::<u32>() {
                    Ok(q) => q,
                    Err(e) => {
                        warn!(
                            file = source_file,
                            value = raw.as_str(),
                            error = %e,
                            "unreadable quantity"
                        );
                        continue;
                    }
                };
                if quantity == 0 {
                    continue;
                }
                records.push(OrderRecord {
                    school: school.clone(),
                    school_normalized: school_normalized.clone(),
                    agent: header.agent.clone(),
                    period: header.period.clone(),
                    meal_type: None,
                    category: *category,
                    weekday: *weekday,
                    quantity,
                    source_file: source_file.to_string(),
                });
            }
        }
    }
    debug!(file = source_file, pages = pages.len(), records = records.len(), "text pages parsed");
    records
}

pub fn extract_pdf(
    path: &Path,
    engine: &mut NormalizationEngine,
) -> Result<Vec<OrderRecord>, ExtractError> {
    let pages = read_pdf_pages(path)?;
    Ok(extract_pages(&pages, &file_name(path), &file_stem(path), engine))
}

pub fn extract_text_dump(
    path: &Path,
    engine: &mut NormalizationEngine,
) -> Result<Vec<OrderRecord>, ExtractError> {
    let pages = read_text_pages(path)?;
    Ok(extract_pages(&pages, &file_name(path), &file_stem(path), engine))
}
