//! Enrichment capability and the chat-completions client
//!
//! The pipeline only sees `EnrichCapability`. `ChatCompletionEnricher` posts
//! each article to an OpenAI-compatible chat-completions endpoint and turns
//! the reply into a language-learning analysis: CEFR level, topics,
//! vocabulary and grammar patterns.

use crate::config::AiConfig;
use crate::model::{EnrichmentOutput, RawItem};
use crate::retry::{classify_http_status, classify_reqwest_error, Classify};
use crate::state::FailureKind;
use crate::HarvestError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

const SYSTEM_PROMPT: &str = "You are a German language expert specializing in CEFR level \
     assessment and language learning. Provide accurate, structured analysis.";

const REQUIRED_FIELDS: [&str; 4] = ["language_level", "topics", "vocabulary", "grammar_patterns"];

const CEFR_LEVELS: [&str; 6] = ["A1", "A2", "B1", "B2", "C1", "C2"];

/// Rough prompt size per token, used only for cost estimates
const CHARS_PER_TOKEN: usize = 4;

/// Error returned by a single enrichment attempt
#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("API request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("API request timed out after {0:?}")]
    Timeout(Duration),

    #[error("unusable model output: {0}")]
    InvalidOutput(String),

    #[error("{message}")]
    Failed { kind: FailureKind, message: String },
}

impl EnrichError {
    /// Builds an error of an explicit kind
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Failed {
            kind,
            message: message.into(),
        }
    }
}

impl Classify for EnrichError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Status { status, .. } => classify_http_status(*status),
            Self::Transport(e) => classify_reqwest_error(e),
            Self::Timeout(_) => FailureKind::TransientNetwork,
            Self::InvalidOutput(_) => FailureKind::Extraction,
            Self::Failed { kind, .. } => *kind,
        }
    }

    /// Model output varies between calls, so a malformed reply is worth another try
    fn is_retryable(&self) -> bool {
        match self {
            Self::InvalidOutput(_) => true,
            other => other.failure_kind().is_retryable(),
        }
    }
}

/// Something that can enrich a stored item
#[async_trait]
pub trait EnrichCapability: Send + Sync {
    /// Performs one enrichment attempt
    async fn enrich(&self, item: &RawItem) -> Result<EnrichmentOutput, EnrichError>;

    /// Upper-bound cost estimate used for the budget reservation
    fn estimate_cost(&self, item: &RawItem) -> f64;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}

/// Cuts `text` to at most `max_chars` characters
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Builds the user prompt for one article
pub fn build_prompt(title: &str, content: &str, max_content_chars: usize) -> String {
    format!(
        r#"Analyze this German article for language learning purposes. Provide a structured JSON response.

Article Title: {title}

Article Content:
{content}

Provide analysis in this exact JSON format:
{{
  "language_level": "A1|A2|B1|B2|C1|C2",
  "topics": ["topic1", "topic2", "topic3"],
  "vocabulary": [
    {{
      "word": "example",
      "artikel": "der|die|das",
      "english": "translation",
      "plural": "plural_form"
    }}
  ],
  "grammar_patterns": [
    "Pattern 1: Brief explanation",
    "Pattern 2: Brief explanation"
  ]
}}

Guidelines:
1. Language Level (CEFR): Assess vocabulary complexity, sentence structure, and topic sophistication
2. Topics: Identify 2-4 main topics (e.g., "politics", "technology", "health", "culture")
3. Vocabulary: Extract 5-15 most important topic-related words with the German word, its artikel, English translation and plural form
4. Grammar Patterns: Identify 2-4 key grammar structures worth learning (e.g., "Passive voice: werden + past participle")

Return ONLY the JSON, no additional text."#,
        title = title,
        content = truncate_chars(content, max_content_chars),
    )
}

/// Extracts and validates the analysis object from a model reply
///
/// The reply may wrap the object in prose; everything between the first `{`
/// and the last `}` is parsed. An unknown CEFR level is replaced with `B2`.
pub fn parse_analysis(reply: &str) -> Result<Value, EnrichError> {
    let (start, end) = match (reply.find('{'), reply.rfind('}')) {
        (Some(start), Some(end)) if start < end => (start, end),
        _ => return Err(EnrichError::InvalidOutput("no JSON object in reply".to_string())),
    };

    let mut analysis: Value = serde_json::from_str(&reply[start..=end])
        .map_err(|e| EnrichError::InvalidOutput(e.to_string()))?;

    let object = analysis
        .as_object_mut()
        .ok_or_else(|| EnrichError::InvalidOutput("reply is not a JSON object".to_string()))?;

    let missing: Vec<&str> = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|field| !object.contains_key(*field))
        .collect();
    if !missing.is_empty() {
        return Err(EnrichError::InvalidOutput(format!(
            "missing fields: {}",
            missing.join(", ")
        )));
    }

    let level_ok = object
        .get("language_level")
        .and_then(Value::as_str)
        .is_some_and(|level| CEFR_LEVELS.contains(&level));
    if !level_ok {
        warn!(
            "Invalid language level {}, defaulting to B2",
            object["language_level"]
        );
        object.insert("language_level".to_string(), Value::from("B2"));
    }

    Ok(analysis)
}

/// OpenAI-compatible chat-completions client
#[derive(Debug, Clone)]
pub struct ChatCompletionEnricher {
    client: Client,
    config: AiConfig,
    api_key: String,
}

impl ChatCompletionEnricher {
    pub fn new(client: Client, config: AiConfig, api_key: impl Into<String>) -> Self {
        Self {
            client,
            config,
            api_key: api_key.into(),
        }
    }

    /// Builds a client reading the API key from the configured variable
    ///
    /// # Returns
    ///
    /// * `Ok(ChatCompletionEnricher)` - Key found and client built
    /// * `Err(HarvestError::MissingApiKey)` - The variable is unset or empty
    pub fn from_env(config: AiConfig) -> Result<Self, HarvestError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| HarvestError::MissingApiKey(config.api_key_env.clone()))?;

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self::new(client, config, api_key))
    }

    /// Cost in dollars of the given token usage
    pub fn cost_of(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        prompt_tokens as f64 / 1_000_000.0 * self.config.input_cost_per_million
            + completion_tokens as f64 / 1_000_000.0 * self.config.output_cost_per_million
    }

    fn prompt_for(&self, item: &RawItem) -> String {
        build_prompt(&item.title, &item.raw_content, self.config.max_content_chars)
    }

    async fn post(&self, prompt: &str) -> Result<ChatResponse, EnrichError> {
        let timeout = self.config.request_timeout();
        let transport = |e: reqwest::Error| {
            if e.is_timeout() {
                EnrichError::Timeout(timeout)
            } else {
                EnrichError::Transport(e)
            }
        };

        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.api_key)
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EnrichError::Status {
                status: status.as_u16(),
                body: truncate_chars(&body, 200).to_string(),
            });
        }

        let body = response.text().await.map_err(|e| transport(e))?;
        serde_json::from_str(&body).map_err(|e| EnrichError::InvalidOutput(e.to_string()))
    }
}

#[async_trait]
impl EnrichCapability for ChatCompletionEnricher {
    async fn enrich(&self, item: &RawItem) -> Result<EnrichmentOutput, EnrichError> {
        let prompt = self.prompt_for(item);
        let response = self.post(&prompt).await?;

        let reply = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| EnrichError::InvalidOutput("empty reply".to_string()))?;
        let outputs = parse_analysis(&reply)?;

        let (tokens_used, cost_usd) = match response.usage {
            Some(usage) => (
                usage.total_tokens,
                self.cost_of(usage.prompt_tokens, usage.completion_tokens),
            ),
            None => {
                warn!("No token usage reported for {}, charging the estimate", item.url);
                (0, self.estimate_cost(item))
            }
        };

        debug!(
            "Enriched {}: {} tokens, ${:.6}",
            item.url, tokens_used, cost_usd
        );

        Ok(EnrichmentOutput {
            outputs,
            tokens_used,
            cost_usd,
        })
    }

    /// Prompt characters over four for the input, `max_tokens` for the output
    fn estimate_cost(&self, item: &RawItem) -> f64 {
        let prompt_chars = SYSTEM_PROMPT.len() + self.prompt_for(item).chars().count();
        let prompt_tokens = prompt_chars.div_ceil(CHARS_PER_TOKEN) as u64;
        self.cost_of(prompt_tokens, self.config.max_tokens as u64)
    }
}
