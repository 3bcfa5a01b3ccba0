//! Article generation. The publisher only sees the [`Generator`] trait; the
//! [`HttpGenerator`] implementation talks to OpenAI-compatible chat-completions
//! endpoints, walking a chain of [`ProviderConfig`]s inside a [`RetryPolicy`].

use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::draft::{self, ArticleDraft, RawDraft, MAX_DESCRIPTION_CHARS, MAX_TAGS};

const SYSTEM_PROMPT: &str = "You are a precise senior technical writer.
Write an original, accurate longform technical article with headings, code examples, steps, pitfalls, and a short TL;DR.
No marketing fluff. If something is uncertain, state assumptions.
Return strictly JSON as instructed by the user.
";

const TEMPERATURE: f32 = 0.6;

/// The default timeout for one HTTP request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Produces an article draft for a topic.
pub trait Generator {
    fn generate(&self, topic: &str) -> Result<ArticleDraft>;
}

/// The chat-completions services the publisher knows how to call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    OpenRouter,
}

impl ProviderKind {
    pub fn name(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::OpenRouter => "openrouter",
        }
    }

    pub fn endpoint(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "https://api.openai.com/v1/chat/completions",
            ProviderKind::OpenRouter => "https://openrouter.ai/api/v1/chat/completions",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "gpt-4o-mini",
            ProviderKind::OpenRouter => "meta-llama/llama-3.1-8b-instruct:free",
        }
    }
}

impl fmt::Display for ProviderKind {
    /// Implements [`fmt::Display`] for [`ProviderKind`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<ProviderKind> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "openrouter" => Ok(ProviderKind::OpenRouter),
            _ => Err(Error::UnknownProvider(s.to_owned())),
        }
    }
}

/// Everything needed to call one provider. Built once from configuration and
/// handed to the generator; nothing about the provider is global.
#[derive(Clone, PartialEq)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub api_key: String,
    pub model: String,
    pub endpoint: String,

    /// Sent as `HTTP-Referer` to OpenRouter.
    pub referer: Option<String>,

    /// Sent as `X-Title` to OpenRouter.
    pub title: Option<String>,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("referer", &self.referer)
            .field("title", &self.title)
            .finish()
    }
}

impl ProviderConfig {
    pub fn new(kind: ProviderKind, api_key: &str, model: Option<&str>) -> ProviderConfig {
        ProviderConfig {
            kind,
            api_key: api_key.to_owned(),
            model: model.unwrap_or_else(|| kind.default_model()).to_owned(),
            endpoint: kind.endpoint().to_owned(),
            referer: None,
            title: None,
        }
    }
}

/// The provider settings read from configuration.
#[derive(Clone, Debug, Default)]
pub struct Credentials<'a> {
    /// Forces the primary provider.
    pub forced: Option<ProviderKind>,
    pub openai_key: Option<&'a str>,
    pub openrouter_key: Option<&'a str>,

    /// Overrides the primary provider's model.
    pub model: Option<&'a str>,

    /// Whether OpenAI failures fall back to OpenRouter.
    pub fallback: bool,

    pub referer: Option<&'a str>,
    pub title: Option<&'a str>,
}

/// Builds the ordered list of providers to try. OpenRouter is primary when it
/// is forced or when it is the only provider with a key; otherwise OpenAI is,
/// followed by OpenRouter if fallback is enabled and it has a key. A primary
/// provider without a key is left out, so no credentials gives an empty chain.
pub fn chain(credentials: &Credentials<'_>) -> Vec<ProviderConfig> {
    let primary = match (credentials.forced, credentials.openai_key, credentials.openrouter_key) {
        (Some(kind), _, _) => kind,
        (None, None, Some(_)) => ProviderKind::OpenRouter,
        (None, _, _) => ProviderKind::OpenAi,
    };

    let openrouter = |model: Option<&str>| {
        credentials.openrouter_key.map(|key| {
            let mut provider = ProviderConfig::new(ProviderKind::OpenRouter, key, model);
            provider.referer = credentials.referer.map(str::to_owned);
            provider.title = credentials.title.map(str::to_owned);
            provider
        })
    };

    let mut providers = Vec::new();
    match primary {
        ProviderKind::OpenRouter => providers.extend(openrouter(credentials.model)),
        ProviderKind::OpenAi => {
            if let Some(key) = credentials.openai_key {
                providers.push(ProviderConfig::new(ProviderKind::OpenAi, key, credentials.model));
            }
            if credentials.fallback {
                providers.extend(openrouter(None));
            }
        }
    }
    providers
}

/// How often and how patiently to retry a failing operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// The wait after failed attempt number `attempt` (starting at 1): the
    /// initial backoff doubled per earlier attempt, capped at the maximum.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .map_or(self.max_backoff, |d| d.min(self.max_backoff))
    }

    /// Calls `op` until it succeeds or the attempts run out, returning the
    /// last error. `op` receives the attempt number.
    pub fn retry<T, E, F>(&self, mut op: F) -> std::result::Result<T, E>
    where
        E: fmt::Display,
        F: FnMut(u32) -> std::result::Result<T, E>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= attempts => return Err(err),
                Err(err) => {
                    let delay = self.delay(attempt);
                    warn!(attempt, attempts, error = %err, delay_ms = delay.as_millis() as u64, "Attempt failed, retrying");
                    thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [Message<'a>; 2],

    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// The outermost `{...}` span of `s`, for models that wrap their JSON in
/// prose or code fences.
pub fn extract_json(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let end = s.rfind('}')?;
    match end > start {
        true => Some(&s[start..=end]),
        false => None,
    }
}

/// Parses a model reply into a draft. A strict reply must be exactly a JSON
/// object; otherwise the outermost object is extracted from the text first.
pub fn parse_draft(content: &str, strict: bool) -> Result<ArticleDraft> {
    let json = match strict {
        true => content,
        false => extract_json(content).ok_or(Error::NoJson)?,
    };
    let raw: RawDraft = serde_json::from_str(json)?;
    Ok(ArticleDraft::try_from(raw)?)
}

/// Generates drafts by calling chat-completions endpoints over HTTP.
pub struct HttpGenerator {
    agent: ureq::Agent,
    providers: Vec<ProviderConfig>,
    retry: RetryPolicy,
    target_words: u32,
}

impl HttpGenerator {
    pub fn new(providers: Vec<ProviderConfig>, retry: RetryPolicy, target_words: u32) -> HttpGenerator {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(DEFAULT_TIMEOUT))
            .build();
        HttpGenerator {
            agent: ureq::Agent::new_with_config(config),
            providers,
            retry,
            target_words,
        }
    }

    fn user_prompt(&self, topic: &str) -> String {
        format!(
            r#"
Topic: {topic}

Return JSON with:
- title: string (unique, specific)
- slug: string (url-safe, short; no date)
- description: string (<={description} chars, SEO meta description)
- tags: string[] (<={tags})
- html_body: string (the full HTML of the article body ONLY, no <html> or <head>):
  - starts with a <p><strong>TL;DR:</strong> ...</p>
  - uses <h2>/<h3>, <p>, <pre><code> for code, <ul>/<ol>
  - include "Key Takeaways" at the end as a list
Target length: ~{words} words.
NO markdown, return pure HTML in html_body.
"#,
            topic = topic,
            description = MAX_DESCRIPTION_CHARS,
            tags = MAX_TAGS,
            words = self.target_words,
        )
    }

    fn complete(&self, provider: &ProviderConfig, prompt: &str, json_mode: bool) -> Result<String> {
        let body = ChatRequest {
            model: &provider.model,
            temperature: TEMPERATURE,
            messages: [
                Message {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Message {
                    role: "user",
                    content: prompt,
                },
            ],
            response_format: match json_mode {
                true => Some(ResponseFormat { kind: "json_object" }),
                false => None,
            },
        };

        let mut request = self
            .agent
            .post(provider.endpoint.as_str())
            .header("Authorization", format!("Bearer {}", provider.api_key));
        if let Some(referer) = &provider.referer {
            request = request.header("HTTP-Referer", referer.as_str());
        }
        if let Some(title) = &provider.title {
            request = request.header("X-Title", title.as_str());
        }

        debug!(provider = %provider.kind, model = %provider.model, json_mode, "Requesting completion");
        let http = |err: ureq::Error| Error::Http {
            provider: provider.kind,
            err,
        };
        let mut response = request.send_json(&body).map_err(http)?;
        let chat: ChatResponse = response.body_mut().read_json().map_err(http)?;
        chat.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(Error::EmptyResponse(provider.kind))
    }

    /// Asks one provider for a draft, first in JSON mode and then without it.
    fn generate_with(&self, provider: &ProviderConfig, prompt: &str) -> Result<ArticleDraft> {
        let strict = self
            .complete(provider, prompt, true)
            .and_then(|content| parse_draft(&content, true));
        match strict {
            Ok(draft) => Ok(draft),
            Err(err) => {
                debug!(provider = %provider.kind, error = %err, "JSON mode failed, retrying without it");
                let content = self.complete(provider, prompt, false)?;
                parse_draft(&content, false)
            }
        }
    }

    /// One pass over the provider chain.
    fn attempt(&self, prompt: &str) -> Result<ArticleDraft> {
        let mut last = Error::NoCredentials;
        for (i, provider) in self.providers.iter().enumerate() {
            if i > 0 {
                info!(provider = %provider.kind, model = %provider.model, "Falling back to next provider");
            }
            match self.generate_with(provider, prompt) {
                Ok(draft) => return Ok(draft),
                Err(err) => {
                    warn!(provider = %provider.kind, error = %err, "Provider failed");
                    last = err;
                }
            }
        }
        Err(last)
    }
}

impl Generator for HttpGenerator {
    fn generate(&self, topic: &str) -> Result<ArticleDraft> {
        if self.providers.is_empty() {
            return Err(Error::NoCredentials);
        }
        let prompt = self.user_prompt(topic);
        self.retry.retry(|_| self.attempt(&prompt))
    }
}

type Result<T> = std::result::Result<T, Error>;

/// Represents a failure to generate a draft.
#[derive(Debug)]
pub enum Error {
    /// Returned when no provider has an API key.
    NoCredentials,

    /// Returned when a provider name isn't recognized.
    UnknownProvider(String),

    /// Returned for transport failures and non-success HTTP statuses.
    Http {
        provider: ProviderKind,
        err: ureq::Error,
    },

    /// Returned when the reply has no message content.
    EmptyResponse(ProviderKind),

    /// Returned when the reply contains no JSON object.
    NoJson,

    /// Returned when the reply's JSON doesn't have the draft's shape.
    Json(serde_json::Error),

    /// Returned when the reply's fields don't make a valid draft.
    Draft(draft::Error),
}

impl fmt::Display for Error {
    /// Implements [`fmt::Display`] for [`Error`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::NoCredentials => {
                write!(f, "No provider credentials; set OPENAI_API_KEY or OPENROUTER_API_KEY")
            }
            Error::UnknownProvider(name) => {
                write!(f, "Unknown provider '{}'; expected 'openai' or 'openrouter'", name)
            }
            Error::Http { provider, err } => write!(f, "Calling {}: {}", provider, err),
            Error::EmptyResponse(provider) => write!(f, "{} returned no message content", provider),
            Error::NoJson => write!(f, "Model reply contains no JSON object"),
            Error::Json(err) => write!(f, "Parsing model reply: {}", err),
            Error::Draft(err) => write!(f, "Invalid draft: {}", err),
        }
    }
}

impl std::error::Error for Error {
    /// Implements [`std::error::Error`] for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Http { err, .. } => Some(err),
            Error::Json(err) => Some(err),
            Error::Draft(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    /// Converts a [`serde_json::Error`] into an [`Error`]. This allows us to
    /// use the `?` operator when decoding model replies.
    fn from(err: serde_json::Error) -> Error {
        Error::Json(err)
    }
}

impl From<draft::Error> for Error {
    /// Converts [`draft::Error`]s into [`Error`]. This allows us to use the `?`
    /// operator.
    fn from(err: draft::Error) -> Error {
        Error::Draft(err)
    }
}
