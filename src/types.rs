use serde::{Deserialize, Serialize};

use crate::normalizer::fold_key;

/// School day an order quantity applies to. Documents always cover a fixed
/// Monday to Friday week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
}

impl Weekday {
    pub const ALL: [Weekday; 5] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
    ];

    /// Label as printed on order sheets and stored in the database.
    pub fn label(self) -> &'static str {
        match self {
            Weekday::Monday => "Lundi",
            Weekday::Tuesday => "Mardi",
            Weekday::Wednesday => "Mercredi",
            Weekday::Thursday => "Jeudi",
            Weekday::Friday => "Vendredi",
        }
    }

    /// Match a header cell against the day names (case and accents ignored).
    pub fn from_label(text: &str) -> Option<Weekday> {
        let key = fold_key(text);
        Weekday::ALL
            .into_iter()
            .find(|day| fold_key(day.label()) == key)
    }
}

/// Dietary variant of a meal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Standard,
    PorkFree,
    Vegetarian,
    Halal,
    /// Aggregate children row printed on the PDF layout.
    Children,
}

impl Category {
    /// Category rows recognised in spreadsheet bodies.
    pub const TABLE: [Category; 4] = [
        Category::Standard,
        Category::PorkFree,
        Category::Vegetarian,
        Category::Halal,
    ];

    /// Category lines searched for in page text, in search order.
    pub const TEXT: [Category; 5] = [
        Category::Children,
        Category::Standard,
        Category::PorkFree,
        Category::Vegetarian,
        Category::Halal,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Category::Standard => "Standard",
            Category::PorkFree => "Sans porc",
            Category::Vegetarian => "Végétarien",
            Category::Halal => "Halal",
            Category::Children => "Enfants",
        }
    }

    /// Match the first cell of a table row against the table categories.
    pub fn from_table_label(text: &str) -> Option<Category> {
        let key = fold_key(text);
        if key.is_empty() {
            return None;
        }
        Category::TABLE
            .into_iter()
            .find(|category| fold_key(category.label()) == key)
    }
}

/// Audience a block of category rows belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MealType {
    Children,
    Adults,
    Kindergarten,
}

impl MealType {
    pub const ALL: [MealType; 3] = [MealType::Children, MealType::Adults, MealType::Kindergarten];

    pub fn label(self) -> &'static str {
        match self {
            MealType::Children => "Enfants",
            MealType::Adults => "Adultes",
            MealType::Kindergarten => "Maternelle",
        }
    }

    pub fn from_label(text: &str) -> Option<MealType> {
        let key = fold_key(text);
        MealType::ALL
            .into_iter()
            .find(|meal_type| fold_key(meal_type.label()) == key)
    }
}

/// One extracted quantity. Quantity is always positive: empty and zero cells
/// never become records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    /// School name as written in the document (or the file stem).
    pub school: String,
    pub school_normalized: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    /// Period / week label found in the sheet header, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meal_type: Option<MealType>,
    pub category: Category,
    pub weekday: Weekday,
    pub quantity: u32,
    pub source_file: String,
}

/// Log level attached to batch events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// A file the batch could not extract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedFile {
    pub file_path: String,
    pub file_name: String,
    pub error: String,
}

/// Counters for one extraction run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionBatchResult {
    pub files_total: usize,
    pub files_processed: usize,
    pub files_skipped_empty: usize,
    pub files_errored: usize,
    pub records_extracted: usize,
    pub failures: Vec<FailedFile>,
    /// Set when the run stopped early on a cancel request.
    #[serde(default)]
    pub cancelled: bool,
}
