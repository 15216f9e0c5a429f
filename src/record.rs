use serde::{Deserialize, Serialize};
use std::fmt;

/// A previous-year question as held by the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub id: i64,
    pub question: String,
    pub subject: String,
    pub sub_topic: Option<String>,
    pub year: Option<i32>,
    pub marks: Option<f64>,
}

/// Input row accepted by the bulk write path. Every field is optional so that
/// malformed rows can be counted and skipped instead of failing the batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewQuestion {
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub sub_topic: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub marks: Option<f64>,
}

impl NewQuestion {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: Some(question.into()),
            ..Self::default()
        }
    }

    pub fn sub_topic(mut self, sub_topic: impl Into<String>) -> Self {
        self.sub_topic = Some(sub_topic.into());
        self
    }

    pub fn year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn marks(mut self, marks: f64) -> Self {
        self.marks = Some(marks);
        self
    }
}

/// Which slice of the record store an index is built from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubjectFilter {
    AllSubjects,
    Subject(String),
}

impl SubjectFilter {
    /// Blank names mean "no filter".
    pub fn from_name(name: Option<&str>) -> Self {
        match name.map(str::trim) {
            Some(name) if !name.is_empty() => SubjectFilter::Subject(name.to_string()),
            _ => SubjectFilter::AllSubjects,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            SubjectFilter::AllSubjects => None,
            SubjectFilter::Subject(name) => Some(name),
        }
    }
}

impl fmt::Display for SubjectFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectFilter::AllSubjects => write!(f, "<all subjects>"),
            SubjectFilter::Subject(name) => write!(f, "{}", name),
        }
    }
}
