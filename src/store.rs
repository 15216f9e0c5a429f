//! Relational store of previous-year questions, backed by SQLite.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::Result;
use crate::record::{NewQuestion, QuestionRecord, SubjectFilter};

/// Read path used by the retrieval pipeline.
pub trait RecordStore {
    /// All records matching the filter, in id order.
    fn find(&self, filter: &SubjectFilter) -> Result<Vec<QuestionRecord>>;
}

pub struct SqliteStore {
    conn: Connection,
    db_path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (or create) a store file and make sure the schema exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&path)?;
        let store = Self {
            conn,
            db_path: Some(path),
        };
        store.create_tables()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
            db_path: None,
        };
        store.create_tables()?;
        Ok(store)
    }

    fn create_tables(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS pyqs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                question TEXT NOT NULL,
                subject TEXT NOT NULL,
                sub_topic TEXT,
                year INTEGER,
                marks REAL
            );

            CREATE INDEX IF NOT EXISTS idx_pyqs_subject ON pyqs(subject);
            CREATE INDEX IF NOT EXISTS idx_pyqs_sub_topic ON pyqs(sub_topic);
            CREATE INDEX IF NOT EXISTS idx_pyqs_year ON pyqs(year);
            "#,
        )?;
        Ok(())
    }

    /// Bulk insert. Rows without a question, or without a subject once the
    /// fallback `subject` is applied, are skipped. Returns the number inserted.
    pub fn store(&mut self, records: &[NewQuestion], subject: &str) -> Result<usize> {
        let fallback = subject.trim();
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO pyqs (question, subject, sub_topic, year, marks) VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for record in records {
                let question = match record.question.as_deref().map(str::trim) {
                    Some(q) if !q.is_empty() => q,
                    _ => {
                        log::debug!("skipping record without question text");
                        continue;
                    }
                };
                let subject = match record.subject.as_deref().map(str::trim) {
                    Some(s) if !s.is_empty() => s,
                    _ if !fallback.is_empty() => fallback,
                    _ => {
                        log::debug!("skipping record without subject: {}", question);
                        continue;
                    }
                };
                let sub_topic = record
                    .sub_topic
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty());
                stmt.execute(params![question, subject, sub_topic, record.year, record.marks])?;
                inserted += 1;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    pub fn count(&self, filter: &SubjectFilter) -> Result<usize> {
        let count: i64 = match filter {
            SubjectFilter::AllSubjects => {
                self.conn
                    .query_row("SELECT COUNT(*) FROM pyqs", [], |row| row.get(0))?
            }
            SubjectFilter::Subject(name) => self.conn.query_row(
                "SELECT COUNT(*) FROM pyqs WHERE subject = ?1",
                params![name],
                |row| row.get(0),
            )?,
        };
        Ok(count as usize)
    }

    /// Distinct subjects with their record counts, alphabetically.
    pub fn subjects(&self) -> Result<Vec<(String, usize)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT subject, COUNT(*) FROM pyqs GROUP BY subject ORDER BY subject")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn get(&self, id: i64) -> Result<Option<QuestionRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT id, question, subject, sub_topic, year, marks FROM pyqs WHERE id = ?1",
                params![id],
                map_record,
            )
            .optional()?;
        Ok(record)
    }

    /// Cheap liveness probe.
    pub fn ping(&self) -> Result<()> {
        self.conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }
}

impl RecordStore for SqliteStore {
    fn find(&self, filter: &SubjectFilter) -> Result<Vec<QuestionRecord>> {
        let records = match filter {
            SubjectFilter::AllSubjects => {
                let mut stmt = self.conn.prepare(
                    "SELECT id, question, subject, sub_topic, year, marks FROM pyqs ORDER BY id",
                )?;
                let rows = stmt
                    .query_map([], map_record)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
            SubjectFilter::Subject(name) => {
                let mut stmt = self.conn.prepare(
                    "SELECT id, question, subject, sub_topic, year, marks FROM pyqs WHERE subject = ?1 ORDER BY id",
                )?;
                let rows = stmt
                    .query_map(params![name], map_record)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
        };
        Ok(records)
    }
}

fn map_record(row: &Row) -> rusqlite::Result<QuestionRecord> {
    Ok(QuestionRecord {
        id: row.get(0)?,
        question: row.get(1)?,
        subject: row.get(2)?,
        sub_topic: row.get(3)?,
        year: row.get(4)?,
        marks: row.get(5)?,
    })
}
