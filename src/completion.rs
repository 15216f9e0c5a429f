use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::config::{ProviderConfig, ProviderKind};
use crate::embedding::{build_client, send_with_retry};
use crate::error::{MatchError, Result};

/// Generative text model used for excerpt extraction and subtopic inference.
pub trait CompletionProvider {
    fn complete(&self, prompt: &str) -> Result<String>;
}

impl<T: CompletionProvider + ?Sized> CompletionProvider for Box<T> {
    fn complete(&self, prompt: &str) -> Result<String> {
        (**self).complete(prompt)
    }
}

pub fn from_config(config: &ProviderConfig) -> Result<Box<dyn CompletionProvider>> {
    match config.kind {
        ProviderKind::OpenAi => Ok(Box::new(OpenAiCompleter::new(config)?)),
        ProviderKind::Hashing => Err(MatchError::Config(
            "the hashing provider cannot generate text; configure completion.provider = \"openai\"".to_string(),
        )),
    }
}

/// Chat-completions client for OpenAI-compatible endpoints, run at
/// temperature 0 so repeated runs over the same notes agree.
pub struct OpenAiCompleter {
    client: Client,
    endpoint: String,
    model: String,
    max_retries: usize,
    max_tokens: usize,
}

impl OpenAiCompleter {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| MatchError::Config("missing completion API key".to_string()))?;
        if config.model_name.trim().is_empty() {
            return Err(MatchError::Config("missing completion model name".to_string()));
        }
        Ok(Self {
            client: build_client(api_key, config.timeout_secs)?,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model_name.clone(),
            max_retries: config.max_retries.max(1),
            max_tokens: 512,
        })
    }
}

impl CompletionProvider for OpenAiCompleter {
    fn complete(&self, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            temperature: 0.0,
            max_tokens: self.max_tokens,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };
        let parsed: ChatResponse = send_with_retry(&self.client, &self.endpoint, &body, self.max_retries)?;
        parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| MatchError::Provider("completion response missing message content".to_string()))
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: usize,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}
