//! Bulk loading of question banks from JSON files, one file per subject.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{MatchError, Result};
use crate::record::{NewQuestion, SubjectFilter};
use crate::store::SqliteStore;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadReport {
    pub subject: String,
    pub path: PathBuf,
    /// Array elements in the file, well-formed or not.
    pub read: usize,
    /// Elements that did not deserialize as a question row.
    pub malformed: usize,
    pub inserted: usize,
}

impl LoadReport {
    pub fn skipped(&self) -> usize {
        self.read.saturating_sub(self.inserted)
    }
}

/// Rows parsed from a question file. Malformed elements are dropped one at a
/// time rather than failing the file.
#[derive(Debug, Default)]
pub struct ParsedFile {
    pub rows: Vec<NewQuestion>,
    pub malformed: usize,
}

/// Parse a JSON array of questions. The subject defaults to the file stem.
pub fn read_file(path: &Path) -> Result<ParsedFile> {
    let raw = fs::read_to_string(path)?;
    let values: Vec<serde_json::Value> = serde_json::from_str(&raw)?;
    let mut parsed = ParsedFile::default();
    for (position, value) in values.into_iter().enumerate() {
        match serde_json::from_value::<NewQuestion>(value) {
            Ok(row) => parsed.rows.push(row),
            Err(err) => {
                log::debug!("{}: row {} is malformed: {}", path.display(), position, err);
                parsed.malformed += 1;
            }
        }
    }
    Ok(parsed)
}

pub fn subject_from_path(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn load_file(store: &mut SqliteStore, path: &Path, subject: Option<&str>) -> Result<LoadReport> {
    let subject = subject
        .map(str::to_string)
        .or_else(|| subject_from_path(path))
        .ok_or_else(|| MatchError::Config(format!("cannot derive a subject from {}", path.display())))?;
    let parsed = read_file(path)?;
    if parsed.rows.is_empty() && parsed.malformed == 0 {
        log::warn!("no questions found in {}", path.display());
    }
    let inserted = store.store(&parsed.rows, &subject)?;
    let report = LoadReport {
        subject,
        path: path.to_path_buf(),
        read: parsed.rows.len() + parsed.malformed,
        malformed: parsed.malformed,
        inserted,
    };
    if report.skipped() > 0 {
        log::warn!(
            "{}: {} of {} records skipped ({} malformed, the rest missing question or subject)",
            path.display(),
            report.skipped(),
            report.read,
            report.malformed
        );
    }
    log::info!("loaded {} questions for {}", report.inserted, report.subject);
    Ok(report)
}

/// Load every `*.json` file in `dir`, in file-name order. A file that fails to
/// parse is logged and skipped so the others still load.
pub fn load_dir(store: &mut SqliteStore, dir: &Path) -> Result<Vec<LoadReport>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json")))
        .collect();
    files.sort();

    let mut reports = Vec::with_capacity(files.len());
    for path in files {
        match load_file(store, &path, None) {
            Ok(report) => reports.push(report),
            Err(err) => log::error!("failed to load {}: {}", path.display(), err),
        }
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RecordStore;

    #[test]
    fn test_load_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("Cyber Security.json"),
            r#"[
                {"question": "What is a firewall?", "sub_topic": "Firewall", "year": 2021, "marks": 2},
                {"question": "Define malware.", "sub_topic": "Malware", "year": 2020, "marks": 3.5},
                {"sub_topic": "Orphan"}
            ]"#,
        )
        .unwrap();
        fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut store = SqliteStore::open_in_memory().unwrap();
        let reports = load_dir(&mut store, dir.path()).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].subject, "Cyber Security");
        assert_eq!(reports[0].read, 3);
        assert_eq!(reports[0].inserted, 2);
        assert_eq!(reports[0].skipped(), 1);

        let subjects = store.subjects().unwrap();
        assert_eq!(subjects, vec![("Cyber Security".to_string(), 2)]);
    }

    #[test]
    fn test_malformed_rows_are_skipped_individually() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("Cyber Security.json"),
            r#"[
                {"question": "What is a firewall?", "year": 2021},
                {"question": "Define malware.", "year": "2020"},
                null,
                {"question": "Explain phishing.", "marks": 5}
            ]"#,
        )
        .unwrap();

        let mut store = SqliteStore::open_in_memory().unwrap();
        let reports = load_dir(&mut store, dir.path()).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].read, 4);
        assert_eq!(reports[0].malformed, 2);
        assert_eq!(reports[0].inserted, 2);
        assert_eq!(reports[0].skipped(), 2);

        let questions: Vec<String> = store
            .find(&SubjectFilter::AllSubjects)
            .unwrap()
            .into_iter()
            .map(|r| r.question)
            .collect();
        assert_eq!(questions, vec!["What is a firewall?", "Explain phishing."]);
    }

    #[test]
    fn test_explicit_subject_overrides_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bank.json");
        fs::write(&path, r#"[{"question": "What is entropy?"}]"#).unwrap();
        let mut store = SqliteStore::open_in_memory().unwrap();
        let report = load_file(&mut store, &path, Some("Physics")).unwrap();
        assert_eq!(report.subject, "Physics");
        assert_eq!(store.count(&SubjectFilter::Subject("Physics".to_string())).unwrap(), 1);
    }
}
