//! Literal supporting excerpts pulled from a note chunk by a generative model.

use serde::{Deserialize, Serialize};

use crate::chunker::split_sentences;
use crate::completion::CompletionProvider;
use crate::config::ExcerptPolicy;

/// Model replies that mean "no excerpt".
const EMPTY_REPLIES: &[&str] = &[
    "none",
    "n/a",
    "na",
    "nothing",
    "no answer",
    "no excerpt",
    "no direct answer found",
    "no relevant excerpt",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Excerpt {
    pub text: String,
    /// `text` split for sentence-level highlighting.
    pub sentences: Vec<String>,
}

impl Excerpt {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

pub struct ExcerptExtractor<C> {
    provider: C,
    policy: ExcerptPolicy,
}

impl<C: CompletionProvider> ExcerptExtractor<C> {
    pub fn new(provider: C, policy: ExcerptPolicy) -> Self {
        Self { provider, policy }
    }

    pub fn provider(&self) -> &C {
        &self.provider
    }

    /// Never fails: a provider error is logged and yields an empty excerpt.
    pub fn extract(&self, chunk_text: &str, question: &str) -> Excerpt {
        let reply = match self.provider.complete(&excerpt_prompt(chunk_text, question)) {
            Ok(reply) => reply,
            Err(err) => {
                log::warn!("excerpt extraction failed for '{}': {}", question, err);
                return Excerpt::default();
            }
        };
        let reply = clean_reply(&reply);
        if reply.is_empty() {
            return Excerpt::default();
        }

        let mut sentences = split_sentences(&reply);
        if self.policy == ExcerptPolicy::Verified {
            let haystack = normalize(chunk_text);
            let before = sentences.len();
            sentences.retain(|s| {
                let needle = normalize(s);
                !needle.is_empty() && haystack.contains(&needle)
            });
            if sentences.len() < before {
                log::debug!(
                    "dropped {} excerpt sentence(s) not found in the chunk",
                    before - sentences.len()
                );
            }
        }

        Excerpt {
            text: sentences.join(" "),
            sentences,
        }
    }
}

pub fn excerpt_prompt(chunk_text: &str, question: &str) -> String {
    format!(
        "Given the following notes and a question, extract the exact sentence(s) from the notes \
         that directly answer the question if possible. Only return the excerpt(s), not any \
         explanation. If nothing in the notes answers the question, return an empty reply.\n\n\
         Notes:\n\"\"\"{}\"\"\"\n\nQuestion:\n\"\"\"{}\"\"\"\n\nAnswer/excerpt:\n",
        chunk_text, question
    )
}

/// Strip wrapping quotes, a leading "Answer:" label and "no answer" replies.
fn clean_reply(reply: &str) -> String {
    let mut text = reply.trim();
    for label in ["Answer/excerpt:", "Answer:", "Excerpt:"] {
        if text.get(..label.len()).is_some_and(|head| head.eq_ignore_ascii_case(label)) {
            text = text[label.len()..].trim_start();
        }
    }
    let text = strip_wrapping_quotes(text);

    let verdict = text
        .trim_matches(|c: char| c == '(' || c == ')' || c == '.' || c.is_whitespace())
        .to_lowercase();
    if EMPTY_REPLIES.contains(&verdict.as_str()) {
        return String::new();
    }
    text.to_string()
}

/// Remove one pair of quotes around the whole reply. Quotes inside the reply
/// must stay balanced, so a closing quote that belongs to the excerpt is kept.
fn strip_wrapping_quotes(text: &str) -> &str {
    for (open, close) in [('"', '"'), ('\u{201C}', '\u{201D}')] {
        let Some(inner) = text.strip_prefix(open).and_then(|t| t.strip_suffix(close)) else {
            continue;
        };
        let balanced = if open == close {
            inner.matches(open).count() % 2 == 0
        } else {
            inner.matches(open).count() == inner.matches(close).count()
        };
        if balanced {
            return inner.trim();
        }
    }
    text
}

/// Lower-case and collapse whitespace for containment checks.
fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
