//! Ephemeral similarity index over one subject's question embeddings.

use sha2::{Digest, Sha256};

use crate::ann::RandomProjectionIndex;
use crate::config::{Number, SearchMethod};
use crate::embedding::EmbeddingProvider;
use crate::error::{MatchError, Result};
use crate::record::{QuestionRecord, SubjectFilter};
use crate::store::RecordStore;
use crate::vector_ops::normalize_vector;

#[derive(Debug, Clone)]
pub struct IndexedQuestion {
    pub record: QuestionRecord,
    pub vector: Vec<Number>,
}

#[derive(Debug, Clone, Copy)]
pub struct IndexOptions {
    pub search_method: SearchMethod,
    pub ann_num_tables: Option<usize>,
    pub ann_num_projections: Option<usize>,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            search_method: SearchMethod::Exact,
            ann_num_tables: None,
            ann_num_projections: None,
        }
    }
}

/// Question vectors in insertion (record id) order, tagged with their records.
#[derive(Debug, Clone)]
pub struct SimilarityIndex {
    filter: SubjectFilter,
    entries: Vec<IndexedQuestion>,
    model_id: String,
    dimensions: usize,
    checksum: String,
    search_method: SearchMethod,
    ann: Option<RandomProjectionIndex>,
}

impl SimilarityIndex {
    /// Fetch the filter's records and embed them. `Ok(None)` means the store
    /// has no records for the filter.
    pub fn build<S, E>(store: &S, embedder: &E, filter: &SubjectFilter, options: IndexOptions) -> Result<Option<Self>>
    where
        S: RecordStore + ?Sized,
        E: EmbeddingProvider + ?Sized,
    {
        let records = store.find(filter)?;
        if records.is_empty() {
            log::info!("no questions stored for {}", filter);
            return Ok(None);
        }
        Self::from_records(records, embedder, filter.clone(), options).map(Some)
    }

    pub fn from_records<E>(
        records: Vec<QuestionRecord>,
        embedder: &E,
        filter: SubjectFilter,
        options: IndexOptions,
    ) -> Result<Self>
    where
        E: EmbeddingProvider + ?Sized,
    {
        let checksum = record_set_checksum(&records);
        let texts: Vec<&str> = records.iter().map(|r| r.question.as_str()).collect();
        let vectors = embedder.embed_batch(&texts)?;
        if vectors.len() != records.len() {
            return Err(MatchError::Provider(format!(
                "embedding provider returned {} vectors for {} questions",
                vectors.len(),
                records.len()
            )));
        }

        let dimensions = vectors.first().map_or(0, Vec::len);
        let mut entries = Vec::with_capacity(records.len());
        for (record, mut vector) in records.into_iter().zip(vectors) {
            if vector.len() != dimensions {
                return Err(MatchError::DimensionMismatch {
                    expected: dimensions,
                    actual: vector.len(),
                });
            }
            normalize_vector(&mut vector);
            entries.push(IndexedQuestion { record, vector });
        }

        let ann = match options.search_method {
            SearchMethod::Exact => None,
            SearchMethod::Ann | SearchMethod::Hybrid => {
                let mut ann = RandomProjectionIndex::new(
                    dimensions,
                    entries.len(),
                    options.ann_num_tables,
                    options.ann_num_projections,
                );
                for (position, entry) in entries.iter().enumerate() {
                    ann.add(&entry.vector, position);
                }
                Some(ann)
            }
        };

        log::info!(
            "built {} index for {}: {} questions, {} dims, model {}",
            options.search_method,
            filter,
            entries.len(),
            dimensions,
            embedder.model_id()
        );

        Ok(Self {
            filter,
            entries,
            model_id: embedder.model_id().to_string(),
            dimensions,
            checksum,
            search_method: options.search_method,
            ann,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexedQuestion] {
        &self.entries
    }

    pub fn filter(&self) -> &SubjectFilter {
        &self.filter
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// SHA-256 over the indexed record set.
    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    pub fn search_method(&self) -> SearchMethod {
        self.search_method
    }

    pub(crate) fn ann(&self) -> Option<&RandomProjectionIndex> {
        self.ann.as_ref()
    }
}

/// Content version of a record set: any change to an id, question text or
/// metadata field produces a different checksum.
pub fn record_set_checksum(records: &[QuestionRecord]) -> String {
    let mut hasher = Sha256::new();
    for record in records {
        hasher.update(record.id.to_le_bytes());
        for field in [
            Some(record.question.as_str()),
            Some(record.subject.as_str()),
            record.sub_topic.as_deref(),
        ] {
            match field {
                Some(value) => {
                    hasher.update((value.len() as u64).to_le_bytes());
                    hasher.update(value.as_bytes());
                }
                None => hasher.update([0xffu8]),
            }
        }
        hasher.update(record.year.map_or([0xffu8; 4], i32::to_le_bytes));
        hasher.update(record.marks.map_or([0xffu8; 8], f64::to_le_bytes));
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use crate::record::NewQuestion;
    use crate::store::SqliteStore;

    fn store() -> SqliteStore {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store
            .store(
                &[
                    NewQuestion::new("What is a firewall?").sub_topic("Firewall"),
                    NewQuestion::new("Define malware.").sub_topic("Malware"),
                ],
                "Cyber Security",
            )
            .unwrap();
        store
    }

    #[test]
    fn test_build_indexes_every_record() {
        let store = store();
        let embedder = HashingEmbedder::new(64);
        let filter = SubjectFilter::Subject("Cyber Security".to_string());
        let index = SimilarityIndex::build(&store, &embedder, &filter, IndexOptions::default())
            .unwrap()
            .unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.dimensions(), 64);
        assert_eq!(index.model_id(), "hashing-64");
        assert_eq!(index.filter(), &filter);
        assert_eq!(index.entries()[0].record.question, "What is a firewall?");
        assert!(index.ann().is_none());
    }

    #[test]
    fn test_no_records_is_absent() {
        let store = store();
        let embedder = HashingEmbedder::new(8);
        let filter = SubjectFilter::Subject("Probability".to_string());
        assert!(SimilarityIndex::build(&store, &embedder, &filter, IndexOptions::default())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_ann_structure_is_built_on_request() {
        let store = store();
        let embedder = HashingEmbedder::new(32);
        let options = IndexOptions {
            search_method: SearchMethod::Hybrid,
            ..IndexOptions::default()
        };
        let index = SimilarityIndex::build(&store, &embedder, &SubjectFilter::AllSubjects, options)
            .unwrap()
            .unwrap();
        assert!(index.ann().is_some());
    }

    #[test]
    fn test_checksum_tracks_content() {
        let store = store();
        let records = store.find(&SubjectFilter::AllSubjects).unwrap();
        let same = record_set_checksum(&records);
        assert_eq!(same, record_set_checksum(&records.clone()));
        assert_eq!(same.len(), 64);

        let mut changed = records.clone();
        changed[1].marks = Some(5.0);
        assert_ne!(same, record_set_checksum(&changed));
    }
}
