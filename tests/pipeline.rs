use std::cell::Cell;

use intelliject::completion::CompletionProvider;
use intelliject::config::{ExcerptPolicy, Number, DEFAULT_HASHING_DIMENSIONS};
use intelliject::embedding::{EmbeddingProvider, HashingEmbedder};
use intelliject::excerpt::ExcerptExtractor;
use intelliject::index::SimilarityIndex;
use intelliject::store::SqliteStore;
use intelliject::subtopic::{GENERAL, NO_MATCHES};
use intelliject::{MatchError, MatchOptions, MatchStatus, Matcher, NewQuestion, Result, SubjectFilter};

const CYBER: &str = "Cyber Security";
const FIREWALL_NOTE: &str = "A firewall blocks unauthorized network traffic.";

/// Replies with the text paired with the first key found in the prompt.
struct Scripted {
    replies: Vec<(&'static str, &'static str)>,
    calls: Cell<usize>,
}

impl Scripted {
    fn new(replies: Vec<(&'static str, &'static str)>) -> Self {
        Self {
            replies,
            calls: Cell::new(0),
        }
    }
}

impl CompletionProvider for Scripted {
    fn complete(&self, prompt: &str) -> Result<String> {
        self.calls.set(self.calls.get() + 1);
        Ok(self
            .replies
            .iter()
            .find(|(key, _)| prompt.contains(key))
            .map_or("", |(_, reply)| reply)
            .to_string())
    }
}

struct Unreachable;

impl CompletionProvider for Unreachable {
    fn complete(&self, _prompt: &str) -> Result<String> {
        Err(MatchError::Provider("connection refused".to_string()))
    }
}

struct BrokenEmbedder;

impl EmbeddingProvider for BrokenEmbedder {
    fn embed(&self, _text: &str) -> Result<Vec<Number>> {
        Err(MatchError::Provider("quota exceeded".to_string()))
    }

    fn model_id(&self) -> &str {
        "broken"
    }
}

fn cyber_store() -> SqliteStore {
    let mut store = SqliteStore::open_in_memory().unwrap();
    store
        .store(
            &[
                NewQuestion::new("What is a firewall?")
                    .sub_topic("Firewall")
                    .year(2021)
                    .marks(2.0),
                NewQuestion::new("Define malware.").sub_topic("Malware").year(2020).marks(3.0),
            ],
            CYBER,
        )
        .unwrap();
    store
}

fn embedder() -> HashingEmbedder {
    HashingEmbedder::new(DEFAULT_HASHING_DIMENSIONS)
}

fn firewall_completer() -> Scripted {
    Scripted::new(vec![("\"\"\"What is a firewall?\"\"\"", FIREWALL_NOTE)])
}

fn cyber() -> SubjectFilter {
    SubjectFilter::Subject(CYBER.to_string())
}

#[test]
fn test_cyber_security_scenario() {
    let store = cyber_store();
    let index = SimilarityIndex::build(&store, &embedder(), &cyber(), Default::default())
        .unwrap()
        .unwrap();
    assert_eq!(index.len(), 2);

    let extractor = ExcerptExtractor::new(firewall_completer(), ExcerptPolicy::Verified);
    let mut matcher = Matcher::new(store, embedder(), extractor, MatchOptions::default());
    let outcomes = matcher.process(FIREWALL_NOTE, &cyber(), 3);

    assert_eq!(outcomes.len(), 1);
    let outcome = &outcomes[0];
    assert_eq!(outcome.chunk.text, FIREWALL_NOTE);
    assert_eq!(outcome.status, MatchStatus::Matched);
    assert_eq!(outcome.subtopic, "Firewall");
    assert_eq!(outcome.matches.len(), 2);

    let first = &outcome.matches[0];
    assert_eq!(first.result.record.question, "What is a firewall?");
    assert_eq!(first.result.record.year, Some(2021));
    assert_eq!(first.result.record.marks, Some(2.0));
    assert_eq!(first.result.rank, 0);
    assert_eq!(first.excerpt.text, FIREWALL_NOTE);

    let second = &outcome.matches[1];
    assert_eq!(second.result.record.question, "Define malware.");
    assert!(second.result.score < first.result.score);
    assert!(second.excerpt.is_empty());

    assert_eq!(outcome.highlights(), vec![FIREWALL_NOTE]);
}

#[test]
fn test_subject_without_records() {
    let extractor = ExcerptExtractor::new(firewall_completer(), ExcerptPolicy::Verified);
    let options = MatchOptions {
        max_sentences: 1,
        ..Default::default()
    };
    let mut matcher = Matcher::new(cyber_store(), embedder(), extractor, options);
    let outcomes = matcher.process(
        "Entropy measures disorder. Heat flows from hot to cold.",
        &SubjectFilter::Subject("Thermodynamics".to_string()),
        3,
    );

    assert_eq!(outcomes.len(), 2);
    for outcome in &outcomes {
        assert_eq!(outcome.subtopic, NO_MATCHES);
        assert_eq!(outcome.status, MatchStatus::NoMatches);
        assert!(outcome.matches.is_empty());
    }
}

#[test]
fn test_excerpt_failure_keeps_questions() {
    let extractor = ExcerptExtractor::new(Unreachable, ExcerptPolicy::Verified);
    let mut matcher = Matcher::new(cyber_store(), embedder(), extractor, MatchOptions::default());
    let outcomes = matcher.process(FIREWALL_NOTE, &cyber(), 3);

    assert_eq!(outcomes[0].status, MatchStatus::Matched);
    assert_eq!(outcomes[0].matches.len(), 2);
    assert!(outcomes[0].matches.iter().all(|m| m.excerpt.is_empty()));
}

#[test]
fn test_embedding_failure_marks_chunks_unavailable() {
    let extractor = ExcerptExtractor::new(firewall_completer(), ExcerptPolicy::Verified);
    let options = MatchOptions {
        max_sentences: 1,
        ..Default::default()
    };
    let mut matcher = Matcher::new(cyber_store(), BrokenEmbedder, extractor, options);
    let outcomes = matcher.process("Firewalls filter packets. Malware is hostile software.", &cyber(), 3);

    assert_eq!(outcomes.len(), 2);
    for outcome in &outcomes {
        assert!(matches!(outcome.status, MatchStatus::Unavailable { ref reason } if reason.contains("quota")));
        assert_eq!(outcome.subtopic, NO_MATCHES);
        assert!(outcome.matches.is_empty());
    }
}

#[test]
fn test_k_zero_and_empty_text() {
    let completer = firewall_completer();
    let extractor = ExcerptExtractor::new(completer, ExcerptPolicy::Verified);
    let mut matcher = Matcher::new(cyber_store(), embedder(), extractor, MatchOptions::default());

    let outcomes = matcher.process(FIREWALL_NOTE, &cyber(), 0);
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].status, MatchStatus::NoMatches);
    assert!(outcomes[0].matches.is_empty());

    assert!(matcher.process("   \n\t ", &cyber(), 3).is_empty());
    assert!(matcher.process("", &cyber(), 3).is_empty());
}

#[test]
fn test_surfaces_at_most_three_questions() {
    let mut store = SqliteStore::open_in_memory().unwrap();
    store
        .store(
            &[
                NewQuestion::new("What is a firewall?"),
                NewQuestion::new("Explain firewall rules."),
                NewQuestion::new("Describe packet filtering in a firewall."),
                NewQuestion::new("What is port scanning?"),
                NewQuestion::new("Define malware."),
            ],
            CYBER,
        )
        .unwrap();
    let completer = Scripted::new(Vec::new());
    let extractor = ExcerptExtractor::new(completer, ExcerptPolicy::Verified);
    let mut matcher = Matcher::new(store, embedder(), extractor, MatchOptions::default());

    let outcomes = matcher.process(FIREWALL_NOTE, &cyber(), 5);
    let outcome = &outcomes[0];
    assert_eq!(outcome.matches.len(), 3);
    let ranks: Vec<usize> = outcome.matches.iter().map(|m| m.result.rank).collect();
    assert_eq!(ranks, vec![0, 1, 2]);
    assert!(outcome
        .matches
        .windows(2)
        .all(|w| w[0].result.score >= w[1].result.score));
    assert_eq!(outcome.subtopic, GENERAL);
    assert_eq!(matcher.process(FIREWALL_NOTE, &cyber(), 3)[0].matches.len(), 3);
    // One excerpt call per surfaced question.
    assert_eq!(matcher.extractor().provider().calls.get(), 6);
}

#[test]
fn test_rebuild_is_idempotent() {
    let extractor = ExcerptExtractor::new(firewall_completer(), ExcerptPolicy::Verified);
    let mut matcher = Matcher::new(cyber_store(), embedder(), extractor, MatchOptions::default());
    let ids = |outcomes: Vec<intelliject::MatchOutcome>| -> Vec<i64> {
        outcomes[0].matches.iter().map(|m| m.result.record.id).collect()
    };
    let first = ids(matcher.process(FIREWALL_NOTE, &cyber(), 3));
    let second = ids(matcher.process(FIREWALL_NOTE, &cyber(), 3));
    assert_eq!(first, second);
}

#[test]
fn test_all_subjects_filter() {
    let mut store = cyber_store();
    store
        .store(&[NewQuestion::new("What is entropy?").sub_topic("Entropy")], "Physics")
        .unwrap();
    let extractor = ExcerptExtractor::new(firewall_completer(), ExcerptPolicy::Verified);
    let mut matcher = Matcher::new(store, embedder(), extractor, MatchOptions::default());

    let outcomes = matcher.process(FIREWALL_NOTE, &SubjectFilter::AllSubjects, 5);
    assert_eq!(outcomes[0].matches.len(), 3);
    assert_eq!(outcomes[0].matches[0].result.record.subject, CYBER);

    let physics = matcher.process(
        "Entropy measures disorder.",
        &SubjectFilter::Subject("Physics".to_string()),
        3,
    );
    assert_eq!(physics[0].subtopic, "Entropy");
    assert_eq!(physics[0].matches.len(), 1);
}

#[test]
fn test_cache_reuses_index_until_store_changes() {
    let extractor = ExcerptExtractor::new(firewall_completer(), ExcerptPolicy::Verified);
    let mut matcher = Matcher::new(cyber_store(), embedder(), extractor, MatchOptions::default()).with_cache();

    matcher.process(FIREWALL_NOTE, &cyber(), 3);
    matcher.process(FIREWALL_NOTE, &cyber(), 3);
    let cache = matcher.cache().unwrap();
    assert_eq!((cache.hits(), cache.misses()), (1, 1));

    matcher
        .store_mut(&cyber())
        .store(&[NewQuestion::new("Explain firewall rules.")], CYBER)
        .unwrap();
    let outcomes = matcher.process(FIREWALL_NOTE, &cyber(), 3);
    assert_eq!(outcomes[0].matches.len(), 3);
    let cache = matcher.cache().unwrap();
    assert_eq!((cache.hits(), cache.misses()), (1, 2));
}

#[test]
fn test_inferred_subtopic_for_unlabelled_questions() {
    let mut store = SqliteStore::open_in_memory().unwrap();
    store.store(&[NewQuestion::new("What is a firewall?")], CYBER).unwrap();
    let completer = Scripted::new(vec![("Subtopic:", "Network Security")]);
    let extractor = ExcerptExtractor::new(completer, ExcerptPolicy::Verified);
    let options = MatchOptions {
        infer_subtopics: true,
        ..Default::default()
    };
    let mut matcher = Matcher::new(store, embedder(), extractor, options);

    let outcomes = matcher.process(FIREWALL_NOTE, &cyber(), 3);
    assert_eq!(outcomes[0].subtopic, "Network Security");
}

#[test]
fn test_pages_keep_their_chunks() {
    let extractor = ExcerptExtractor::new(firewall_completer(), ExcerptPolicy::Verified);
    let mut matcher = Matcher::new(cyber_store(), embedder(), extractor, MatchOptions::default());
    let pages = ["Malware is hostile software.", FIREWALL_NOTE];
    let outcomes = matcher.process_pages(&pages, &cyber(), 3);

    assert_eq!(outcomes.len(), 2);
    assert_eq!((outcomes[0].chunk.index, outcomes[0].chunk.page), (0, 0));
    assert_eq!((outcomes[1].chunk.index, outcomes[1].chunk.page), (1, 1));
    assert_eq!(outcomes[0].subtopic, "Malware");
    assert_eq!(outcomes[1].subtopic, "Firewall");
}

#[test]
fn test_outcomes_serialize_with_status_kind() {
    let extractor = ExcerptExtractor::new(firewall_completer(), ExcerptPolicy::Verified);
    let mut matcher = Matcher::new(cyber_store(), embedder(), extractor, MatchOptions::default());
    let outcomes = matcher.process(FIREWALL_NOTE, &cyber(), 3);
    let json = serde_json::to_value(&outcomes).unwrap();
    assert_eq!(json[0]["status"]["kind"], "matched");
    assert_eq!(json[0]["matches"][0]["excerpt"]["text"], FIREWALL_NOTE);
}
