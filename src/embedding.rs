//! Embedding providers: an OpenAI-compatible HTTP client and a local
//! feature-hashing embedder.

use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::{Number, ProviderConfig, ProviderKind, DEFAULT_HASHING_DIMENSIONS};
use crate::error::{MatchError, Result};
use crate::vector_ops::normalize_vector;

/// Maps text to fixed-length vectors. An index and the queries run against it
/// must come from providers with the same `model_id`.
pub trait EmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<Number>>;

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<Number>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    fn model_id(&self) -> &str;
}

impl<T: EmbeddingProvider + ?Sized> EmbeddingProvider for Box<T> {
    fn embed(&self, text: &str) -> Result<Vec<Number>> {
        (**self).embed(text)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<Number>>> {
        (**self).embed_batch(texts)
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }
}

/// Build the provider selected in `config`.
pub fn from_config(config: &ProviderConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.kind {
        ProviderKind::OpenAi => Ok(Box::new(OpenAiEmbedder::new(config)?)),
        ProviderKind::Hashing => Ok(Box::new(HashingEmbedder::new(
            config.dimensions.unwrap_or(DEFAULT_HASHING_DIMENSIONS),
        ))),
    }
}

/// Blocking embeddings client for OpenAI-compatible `/embeddings` endpoints.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: Option<usize>,
    max_retries: usize,
    batch_size: usize,
}

impl OpenAiEmbedder {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| MatchError::Config("missing embedding API key".to_string()))?;
        if config.model_name.trim().is_empty() {
            return Err(MatchError::Config("missing embedding model name".to_string()));
        }

        let client = build_client(api_key, config.timeout_secs)?;
        let endpoint = format!("{}/embeddings", config.base_url.trim_end_matches('/'));
        Ok(Self {
            client,
            endpoint,
            model: config.model_name.clone(),
            dimensions: config.dimensions,
            max_retries: config.max_retries.max(1),
            batch_size: config.batch_size.max(1),
        })
    }

    fn request_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<Number>>> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: inputs,
            dimensions: self.dimensions,
        };
        let mut parsed: EmbeddingResponse = send_with_retry(&self.client, &self.endpoint, &request, self.max_retries)?;
        parsed.data.sort_by_key(|entry| entry.index);
        if parsed.data.len() != inputs.len() {
            return Err(MatchError::Provider(format!(
                "embedding endpoint returned {} vectors for {} inputs",
                parsed.data.len(),
                inputs.len()
            )));
        }
        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

impl EmbeddingProvider for OpenAiEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<Number>> {
        let mut vectors = self.request_batch(&[text])?;
        vectors
            .pop()
            .ok_or_else(|| MatchError::Provider("embedding endpoint returned no vector".to_string()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<Number>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            log::debug!("embedding batch of {} texts with {}", batch.len(), self.model);
            vectors.extend(self.request_batch(batch)?);
        }
        Ok(vectors)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

pub(crate) fn build_client(api_key: &str, timeout_secs: u64) -> Result<Client> {
    let mut headers = HeaderMap::new();
    let auth = format!("Bearer {}", api_key);
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&auth).map_err(|_| MatchError::Config("invalid API key".to_string()))?,
    );
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    let client = Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .default_headers(headers)
        .build()?;
    Ok(client)
}

/// POST `body` as JSON, retrying rate limits, server errors and transient
/// transport failures with exponential backoff.
pub(crate) fn send_with_retry<B, R>(client: &Client, endpoint: &str, body: &B, max_retries: usize) -> Result<R>
where
    B: Serialize + ?Sized,
    R: for<'de> Deserialize<'de>,
{
    let mut attempt = 0usize;
    loop {
        match client.post(endpoint).json(body).send() {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    return Ok(resp.json()?);
                }
                let text = resp
                    .text()
                    .unwrap_or_else(|_| "<body unavailable>".to_string());
                if should_retry(status) && attempt + 1 < max_retries {
                    attempt += 1;
                    log::warn!("{} returned {}, retrying (attempt {})", endpoint, status, attempt);
                    thread::sleep(retry_backoff(attempt));
                    continue;
                }
                return Err(MatchError::Provider(format!("{} returned {}: {}", endpoint, status, text)));
            }
            Err(err) => {
                if is_retryable_error(&err) && attempt + 1 < max_retries {
                    attempt += 1;
                    log::warn!("request to {} failed ({}), retrying (attempt {})", endpoint, err, attempt);
                    thread::sleep(retry_backoff(attempt));
                    continue;
                }
                return Err(err.into());
            }
        }
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(500 * (1 << capped))
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<Number>,
    index: usize,
}

/// Offline embedder: lower-cased word tokens (stop words removed) are hashed
/// with SHA-256 into signed buckets, and the result is L2-normalized.
/// Deterministic across runs and platforms.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
    model_id: String,
}

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "define", "describe", "explain", "for", "from",
    "how", "in", "is", "it", "its", "of", "on", "or", "that", "the", "this", "to", "was", "what",
    "when", "which", "why", "with",
];

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        let dimensions = dimensions.max(1);
        Self {
            dimensions,
            model_id: format!("hashing-{}", dimensions),
        }
    }
}

impl EmbeddingProvider for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<Number>> {
        let mut vector = vec![0.0; self.dimensions];
        let lowered = text.to_lowercase();
        let tokens = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty() && !STOP_WORDS.contains(t));
        for token in tokens {
            let digest = Sha256::digest(token.as_bytes());
            let bucket = u64::from_le_bytes([
                digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
            ]) as usize
                % self.dimensions;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        normalize_vector(&mut vector);
        Ok(vector)
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
