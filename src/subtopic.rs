use crate::completion::CompletionProvider;
use crate::search::RetrievalResult;

pub const GENERAL: &str = "General";
pub const NO_MATCHES: &str = "No matches found";

/// Label taken from the best retrieval result.
pub fn from_results(results: &[RetrievalResult]) -> String {
    match results.first() {
        None => NO_MATCHES.to_string(),
        Some(top) => top
            .record
            .sub_topic
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(GENERAL)
            .to_string(),
    }
}

pub fn subtopic_prompt(text: &str) -> String {
    format!(
        "Read the following academic content and suggest the most relevant subtopic \
         (like 'Firewall', 'Water Pollution', etc.) in 2-3 words:\n\n{}\n\nSubtopic:",
        text
    )
}

/// Ask the model for a short label; "General" when the call fails or the
/// reply is unusable.
pub fn infer<C: CompletionProvider + ?Sized>(provider: &C, text: &str) -> String {
    match provider.complete(&subtopic_prompt(text)) {
        Ok(reply) => {
            let label = reply
                .lines()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .unwrap_or("")
                .trim_start_matches("Subtopic:")
                .trim()
                .trim_matches(|c: char| c == '"' || c == '\'' || c == '.' || c == '*')
                .trim();
            if label.is_empty() || label.split_whitespace().count() > 6 {
                GENERAL.to_string()
            } else {
                label.to_string()
            }
        }
        Err(err) => {
            log::warn!("subtopic inference failed: {}", err);
            GENERAL.to_string()
        }
    }
}
