use calamine::{open_workbook_auto, Data, Range, Reader};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use crate::error::ExtractError;
use crate::metadata::{file_name, file_stem, DocumentHeader};
use crate::normalizer::NormalizationEngine;
use crate::types::{Category, MealType, OrderRecord, Weekday};

/// Rows scanned for school / agent / period labels.
const METADATA_ROWS: usize = 20;

/// Spreadsheet cell reduced to what the extractor cares about.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

impl Cell {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Cell rendered as text, whole numbers without a decimal part.
    pub fn to_text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Number(n) if n.fract() == 0.0 => format!("{}", *n as i64),
            Cell::Number(n) => n.to_string(),
        }
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty | Data::Error(_) => Cell::Empty,
            Data::String(s) if s.is_empty() => Cell::Empty,
            Data::String(s) => Cell::Text(s.clone()),
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Float(f) => Cell::Number(*f),
            other => Cell::Text(other.to_string()),
        }
    }
}

/// One worksheet as a grid anchored at A1 (row 0, column 0).
#[derive(Debug, Clone, Default)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<Cell>>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    /// calamine ranges start at the first used cell; pad back to A1 so
    /// "first column" means column A.
    fn from_range(name: &str, range: &Range<Data>) -> Self {
        let (row_offset, col_offset) = range
            .start()
            .map(|(r, c)| (r as usize, c as usize))
            .unwrap_or((0, 0));
        let mut rows = vec![Vec::new(); row_offset];
        for row in range.rows() {
            let mut cells = vec![Cell::Empty; col_offset];
            cells.extend(row.iter().map(Cell::from));
            rows.push(cells);
        }
        Self::new(name, rows)
    }
}

/// Read every worksheet of an `.xlsx` / `.xlsm` / `.xls` / `.ods` file.
pub fn read_workbook(path: &Path) -> Result<Vec<Sheet>, ExtractError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| ExtractError::Workbook {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let names = workbook.sheet_names().to_vec();
    let mut sheets = Vec::with_capacity(names.len());
    for name in names {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| ExtractError::Workbook {
                path: path.to_path_buf(),
                message: format!("sheet '{}': {}", name, e),
            })?;
        sheets.push(Sheet::from_range(&name, &range));
    }
    Ok(sheets)
}

/// Row holding the weekday names and the column of each day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekHeader {
    pub row: usize,
    pub columns: Vec<(usize, Weekday)>,
}

fn weekday_cells(row: &[Cell]) -> impl Iterator<Item = (usize, Weekday)> + '_ {
    row.iter()
        .enumerate()
        .filter_map(|(col, cell)| {
            cell.as_text()
                .and_then(Weekday::from_label)
                .map(|day| (col, day))
        })
}

/// First row with at least one weekday cell. Weekday cells in the row right
/// below it are merged in (headers split over two rows); a later cell in the
/// same column wins.
pub fn detect_week_header(rows: &[Vec<Cell>]) -> Option<WeekHeader> {
    let row = rows
        .iter()
        .position(|cells| weekday_cells(cells).next().is_some())?;
    let mut columns: BTreeMap<usize, Weekday> = weekday_cells(&rows[row]).collect();
    if let Some(next) = rows.get(row + 1) {
        columns.extend(weekday_cells(next));
    }
    Some(WeekHeader {
        row,
        columns: columns.into_iter().collect(),
    })
}

/// Positive whole quantity from a numeric cell. Fractions are truncated;
/// anything below one is dropped.
fn cell_quantity(cell: &Cell) -> Option<u32> {
    let value = cell.as_number()?.trunc();
    if value >= 1.0 {
        Some(value as u32)
    } else {
        None
    }
}

/// Parse one sheet. Below the weekday header, a meal-type row ("Enfants",
/// "Adultes", "Maternelle") sets the context for the category rows that
/// follow it; category rows yield one record per positive day cell.
pub fn extract_sheet(
    sheet: &Sheet,
    source_file: &str,
    fallback_school: &str,
    engine: &mut NormalizationEngine,
) -> Vec<OrderRecord> {
    let header = DocumentHeader::scan(
        sheet
            .rows
            .iter()
            .take(METADATA_ROWS)
            .flatten()
            .filter_map(Cell::as_text),
    );
    let school = header.school_or(fallback_school);
    let school_normalized = engine.normalize(&school);

    let Some(week) = detect_week_header(&sheet.rows) else {
        debug!(sheet = %sheet.name, file = source_file, "no weekday header row");
        return Vec::new();
    };

    let mut records = Vec::new();
    let mut meal_type: Option<MealType> = None;
    for row in sheet.rows.iter().skip(week.row + 1) {
        let label = row.first().map(Cell::to_text).unwrap_or_default();
        let label = label.trim();
        if let Some(found) = MealType::from_label(label) {
            meal_type = Some(found);
            continue;
        }
        let Some(category) = Category::from_table_label(label) else {
            continue;
        };
        for &(col, weekday) in &week.columns {
            let Some(quantity) = row.get(col).and_then(cell_quantity) else {
                continue;
            };
            records.push(OrderRecord {
                school: school.clone(),
                school_normalized: school_normalized.clone(),
                agent: header.agent.clone(),
                period: header.period.clone(),
                meal_type,
                category,
                weekday,
                quantity,
                source_file: source_file.to_string(),
            });
        }
    }
    debug!(sheet = %sheet.name, records = records.len(), "sheet parsed");
    records
}

/// Extract order records from every sheet of a workbook.
pub fn extract_workbook(
    path: &Path,
    engine: &mut NormalizationEngine,
) -> Result<Vec<OrderRecord>, ExtractError> {
    let sheets = read_workbook(path)?;
    if sheets.is_empty() {
        return Err(ExtractError::NoStructure {
            path: path.to_path_buf(),
            reason: "workbook has no sheets".to_string(),
        });
    }
    let source_file = file_name(path);
    let fallback_school = file_stem(path);
    let mut records = Vec::new();
    for sheet in &sheets {
        records.extend(extract_sheet(sheet, &source_file, &fallback_school, engine));
    }
    Ok(records)
}
