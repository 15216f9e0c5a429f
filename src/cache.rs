use std::collections::HashMap;
use std::rc::Rc;

use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::index::{record_set_checksum, IndexOptions, SimilarityIndex};
use crate::record::SubjectFilter;
use crate::store::RecordStore;

/// Per-subject similarity indices, reused while the subject's record set is
/// unchanged. The record set is re-read on every lookup; only embedding work
/// is saved.
#[derive(Default)]
pub struct IndexCache {
    entries: HashMap<SubjectFilter, Rc<SimilarityIndex>>,
    hits: usize,
    misses: usize,
}

impl IndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Ok(None)` when the store has no records for `filter`.
    pub fn get_or_build<S, E>(
        &mut self,
        store: &S,
        embedder: &E,
        filter: &SubjectFilter,
        options: IndexOptions,
    ) -> Result<Option<Rc<SimilarityIndex>>>
    where
        S: RecordStore + ?Sized,
        E: EmbeddingProvider + ?Sized,
    {
        let records = store.find(filter)?;
        if records.is_empty() {
            self.entries.remove(filter);
            return Ok(None);
        }

        let checksum = record_set_checksum(&records);
        if let Some(index) = self.entries.get(filter) {
            if index.checksum() == checksum
                && index.model_id() == embedder.model_id()
                && index.search_method() == options.search_method
            {
                self.hits += 1;
                log::debug!("index cache hit for {}", filter);
                return Ok(Some(Rc::clone(index)));
            }
            log::debug!("index cache entry for {} is stale", filter);
        }

        self.misses += 1;
        let index = Rc::new(SimilarityIndex::from_records(records, embedder, filter.clone(), options)?);
        self.entries.insert(filter.clone(), Rc::clone(&index));
        Ok(Some(index))
    }

    /// Drop the cached index for one subject (call after writing its records).
    pub fn invalidate(&mut self, filter: &SubjectFilter) {
        self.entries.remove(filter);
        if matches!(filter, SubjectFilter::Subject(_)) {
            self.entries.remove(&SubjectFilter::AllSubjects);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn misses(&self) -> usize {
        self.misses
    }
}
