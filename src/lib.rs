//! Match previous-year exam questions to study notes.
//!
//! Notes are split into sentence chunks, each chunk is ranked against a
//! subject's question bank by embedding similarity, and a completion model
//! pulls the supporting excerpt for every surfaced question.

pub mod ann;
pub mod cache;
pub mod chunker;
pub mod completion;
pub mod config;
pub mod embedding;
pub mod error;
pub mod excerpt;
pub mod index;
pub mod loader;
pub mod pipeline;
pub mod record;
pub mod search;
pub mod store;
pub mod subtopic;
pub mod vector_ops;

pub use error::{MatchError, Result};
pub use pipeline::{MatchOptions, MatchOutcome, MatchStatus, Matcher, QuestionMatch};
pub use record::{NewQuestion, QuestionRecord, SubjectFilter};
