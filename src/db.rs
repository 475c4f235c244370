use chrono::Local;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

use crate::error::PersistenceError;
use crate::types::{MealType, OrderRecord};

/// Value of the `version` metadata key written at creation.
pub const FORMAT_VERSION: &str = "meal_orders_v1";

/// Destination for extracted records. Appends happen once per input file.
pub trait OrderSink {
    fn append_records(&mut self, records: &[OrderRecord]) -> Result<(), PersistenceError>;

    fn close(self) -> Result<(), PersistenceError>
    where
        Self: Sized;
}

/// In-memory sink.
impl OrderSink for Vec<OrderRecord> {
    fn append_records(&mut self, records: &[OrderRecord]) -> Result<(), PersistenceError> {
        self.extend_from_slice(records);
        Ok(())
    }

    fn close(self) -> Result<(), PersistenceError> {
        Ok(())
    }
}

/// Append-only SQLite store. Re-extracting a document appends its rows again;
/// nothing is deduplicated.
pub struct Db {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl Db {
    /// Open (or create) the database file and make sure both tables exist.
    pub fn create(db_path: PathBuf) -> Result<Self, PersistenceError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| PersistenceError::Open {
                    path: db_path.clone(),
                    message: e.to_string(),
                })?;
            }
        }
        let conn = Connection::open(&db_path).map_err(|e| PersistenceError::Open {
            path: db_path.clone(),
            message: e.to_string(),
        })?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS commandes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ecole TEXT NOT NULL,
                ecole_normalized TEXT NOT NULL,
                agent TEXT,
                date_commande TEXT,
                jour TEXT,
                jour_semaine TEXT,
                type_repas TEXT,
                categorie TEXT,
                quantite INTEGER,
                source_fichier TEXT,
                date_extraction TEXT
            );
            CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT
            );
            ",
        )
        .map_err(PersistenceError::Schema)?;
        conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
            params!["created_at", Local::now().to_rfc3339()],
        )
        .map_err(PersistenceError::Schema)?;
        conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
            params!["version", FORMAT_VERSION],
        )
        .map_err(PersistenceError::Schema)?;

        debug!(path = %db_path.display(), "order database ready");
        Ok(Db {
            conn: Mutex::new(conn),
            path: db_path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn count_records(&self) -> Result<i64, PersistenceError> {
        let conn = self.conn.lock().map_err(|_| PersistenceError::Poisoned)?;
        conn.query_row("SELECT COUNT(*) FROM commandes", [], |row| row.get(0))
            .map_err(PersistenceError::Query)
    }

    pub fn metadata_value(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let conn = self.conn.lock().map_err(|_| PersistenceError::Poisoned)?;
        conn.query_row(
            "SELECT value FROM metadata WHERE key = ?1",
            params![key],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()
        .map(Option::flatten)
        .map_err(PersistenceError::Query)
    }

    /// Total quantity per canonical school, ordered by school.
    pub fn totals_by_school(&self) -> Result<Vec<(String, i64)>, PersistenceError> {
        let conn = self.conn.lock().map_err(|_| PersistenceError::Poisoned)?;
        let mut stmt = conn
            .prepare(
                "SELECT ecole_normalized, SUM(quantite) FROM commandes
                 GROUP BY ecole_normalized ORDER BY ecole_normalized",
            )
            .map_err(PersistenceError::Query)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(PersistenceError::Query)?;
        let mut totals = Vec::new();
        for row in rows {
            totals.push(row.map_err(PersistenceError::Query)?);
        }
        Ok(totals)
    }
}

impl OrderSink for Db {
    /// All records of one file go in a single transaction.
    fn append_records(&mut self, records: &[OrderRecord]) -> Result<(), PersistenceError> {
        let conn = self.conn.get_mut().map_err(|_| PersistenceError::Poisoned)?;
        let tx = conn.transaction().map_err(PersistenceError::Append)?;
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT INTO commandes (
                        ecole, ecole_normalized, agent, date_commande, jour_semaine,
                        type_repas, categorie, quantite, source_fichier, date_extraction
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                )
                .map_err(PersistenceError::Append)?;
            let extracted_at = Local::now().to_rfc3339();
            for record in records {
                stmt.execute(params![
                    &record.school,
                    &record.school_normalized,
                    &record.agent,
                    &record.period,
                    record.weekday.label(),
                    record.meal_type.map(MealType::label),
                    record.category.label(),
                    record.quantity,
                    &record.source_file,
                    &extracted_at,
                ])
                .map_err(PersistenceError::Append)?;
            }
        }
        tx.commit().map_err(PersistenceError::Append)?;
        debug!(records = records.len(), "records appended");
        Ok(())
    }

    fn close(self) -> Result<(), PersistenceError> {
        let conn = self
            .conn
            .into_inner()
            .map_err(|_| PersistenceError::Poisoned)?;
        conn.close().map_err(|(_, e)| PersistenceError::Close(e))
    }
}
