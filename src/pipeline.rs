//! Orchestration: chunk the notes, build the subject index once, then
//! retrieve questions and extract excerpts chunk by chunk.

use std::rc::Rc;

use serde::Serialize;

use crate::cache::IndexCache;
use crate::chunker::{self, NoteChunk, DEFAULT_MAX_SENTENCES};
use crate::completion::CompletionProvider;
use crate::config::{Settings, DEFAULT_TOP_K};
use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::excerpt::{Excerpt, ExcerptExtractor};
use crate::index::{IndexOptions, SimilarityIndex};
use crate::record::SubjectFilter;
use crate::search::{search, RetrievalResult};
use crate::store::RecordStore;
use crate::subtopic;

/// Questions surfaced per chunk, independent of the retrieval breadth `k`.
pub const MAX_SURFACED: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchStatus {
    Matched,
    NoMatches,
    /// Retrieval could not run for this chunk (store or embedding failure).
    Unavailable { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionMatch {
    pub result: RetrievalResult,
    pub excerpt: Excerpt,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchOutcome {
    pub chunk: NoteChunk,
    pub subtopic: String,
    pub status: MatchStatus,
    pub matches: Vec<QuestionMatch>,
}

impl MatchOutcome {
    fn empty(chunk: NoteChunk, status: MatchStatus) -> Self {
        Self {
            chunk,
            subtopic: subtopic::NO_MATCHES.to_string(),
            status,
            matches: Vec::new(),
        }
    }

    /// Every non-empty excerpt sentence for this chunk, in match order.
    pub fn highlights(&self) -> Vec<&str> {
        self.matches
            .iter()
            .flat_map(|m| m.excerpt.sentences.iter())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MatchOptions {
    pub max_sentences: usize,
    pub index: IndexOptions,
    pub infer_subtopics: bool,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            max_sentences: DEFAULT_MAX_SENTENCES,
            index: IndexOptions::default(),
            infer_subtopics: false,
        }
    }
}

impl From<&Settings> for MatchOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            max_sentences: settings.max_sentences,
            index: IndexOptions {
                search_method: settings.search_method,
                ann_num_tables: settings.ann_num_tables,
                ann_num_projections: settings.ann_num_projections,
            },
            infer_subtopics: settings.infer_subtopics,
        }
    }
}

pub struct Matcher<S, E, C> {
    store: S,
    embedder: E,
    extractor: ExcerptExtractor<C>,
    options: MatchOptions,
    cache: Option<IndexCache>,
}

impl<S, E, C> Matcher<S, E, C>
where
    S: RecordStore,
    E: EmbeddingProvider,
    C: CompletionProvider,
{
    pub fn new(store: S, embedder: E, extractor: ExcerptExtractor<C>, options: MatchOptions) -> Self {
        Self {
            store,
            embedder,
            extractor,
            options,
            cache: None,
        }
    }

    /// Reuse subject indices across runs while their record sets are unchanged.
    pub fn with_cache(mut self) -> Self {
        self.cache = Some(IndexCache::new());
        self
    }

    /// Mutable store access. Drops any cached index for `written`.
    pub fn store_mut(&mut self, written: &SubjectFilter) -> &mut S {
        if let Some(cache) = self.cache.as_mut() {
            cache.invalidate(written);
        }
        &mut self.store
    }

    pub fn extractor(&self) -> &ExcerptExtractor<C> {
        &self.extractor
    }

    pub fn cache(&self) -> Option<&IndexCache> {
        self.cache.as_ref()
    }

    /// Match `note_text` against the subject's questions with the default
    /// breadth of [`DEFAULT_TOP_K`].
    pub fn process_default(&mut self, note_text: &str, subject: &SubjectFilter) -> Vec<MatchOutcome> {
        self.process(note_text, subject, DEFAULT_TOP_K)
    }

    pub fn process(&mut self, note_text: &str, subject: &SubjectFilter, k: usize) -> Vec<MatchOutcome> {
        let chunks = chunker::chunk(note_text, self.options.max_sentences);
        self.run(chunks, subject, k)
    }

    /// Like [`Matcher::process`], but chunk boundaries never cross pages.
    pub fn process_pages<T: AsRef<str>>(&mut self, pages: &[T], subject: &SubjectFilter, k: usize) -> Vec<MatchOutcome> {
        let chunks = chunker::chunk_pages(pages, self.options.max_sentences);
        self.run(chunks, subject, k)
    }

    fn run(&mut self, chunks: Vec<NoteChunk>, subject: &SubjectFilter, k: usize) -> Vec<MatchOutcome> {
        if chunks.is_empty() {
            return Vec::new();
        }
        log::info!("matching {} chunks against {}", chunks.len(), subject);

        let index = match self.index_for(subject) {
            Ok(index) => {
                if let Some(index) = index.as_deref() {
                    log::debug!("using {} question index for {}", index.len(), index.filter());
                }
                Ok(index)
            }
            Err(err) => {
                log::error!("could not build question index for {}: {}", subject, err);
                Err(err.to_string())
            }
        };

        chunks
            .into_iter()
            .map(|chunk| match &index {
                Err(reason) => MatchOutcome::empty(
                    chunk,
                    MatchStatus::Unavailable {
                        reason: reason.clone(),
                    },
                ),
                Ok(index) => self.match_chunk(chunk, index.as_deref(), k),
            })
            .collect()
    }

    fn index_for(&mut self, subject: &SubjectFilter) -> Result<Option<Rc<SimilarityIndex>>> {
        match self.cache.as_mut() {
            Some(cache) => cache.get_or_build(&self.store, &self.embedder, subject, self.options.index),
            None => Ok(SimilarityIndex::build(&self.store, &self.embedder, subject, self.options.index)?.map(Rc::new)),
        }
    }

    fn match_chunk(&self, chunk: NoteChunk, index: Option<&SimilarityIndex>, k: usize) -> MatchOutcome {
        let results = match search(index, &self.embedder, &chunk.text, k) {
            Ok(results) => results,
            Err(err) => {
                log::warn!("retrieval failed for chunk {}: {}", chunk.index, err);
                return MatchOutcome::empty(
                    chunk,
                    MatchStatus::Unavailable {
                        reason: err.to_string(),
                    },
                );
            }
        };
        if results.is_empty() {
            return MatchOutcome::empty(chunk, MatchStatus::NoMatches);
        }

        let top_has_label = results[0]
            .record
            .sub_topic
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty());
        let subtopic = if self.options.infer_subtopics && !top_has_label {
            subtopic::infer(self.extractor.provider(), &chunk.text)
        } else {
            subtopic::from_results(&results)
        };

        let matches = results
            .into_iter()
            .take(MAX_SURFACED)
            .map(|result| {
                let excerpt = self.extractor.extract(&chunk.text, &result.record.question);
                QuestionMatch { result, excerpt }
            })
            .collect();

        MatchOutcome {
            chunk,
            subtopic,
            status: MatchStatus::Matched,
            matches,
        }
    }
}
