//! Defines [`ArticleDraft`], the structured article content produced by the
//! generation provider (or by [`ArticleDraft::placeholder`]) and consumed once
//! by the renderer.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::convert::TryFrom;
use std::fmt;

/// The maximum length of a draft's description, in characters.
pub const MAX_DESCRIPTION_CHARS: usize = 150;

/// The maximum number of tags a draft keeps.
pub const MAX_TAGS: usize = 8;

/// The title of the post published when generation fails.
pub const PLACEHOLDER_TITLE: &str = "Publishing temporarily unavailable";

const PLACEHOLDER_DESCRIPTION: &str = "Automated publishing is temporarily unavailable.";

/// Structured article content prior to rendering. Fields are private so the
/// length limits established by [`ArticleDraft::new`] always hold.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArticleDraft {
    title: String,
    slug_hint: String,
    description: String,
    tags: Vec<String>,
    body: String,
}

impl ArticleDraft {
    /// Builds a draft, normalizing its fields: the title and description are
    /// trimmed, the description is cut to [`MAX_DESCRIPTION_CHARS`], blank tags
    /// are dropped and at most [`MAX_TAGS`] are kept. A missing slug hint falls
    /// back to the title. The body is trusted HTML and is kept as-is.
    pub fn new<T, S>(
        title: &str,
        slug_hint: Option<&str>,
        description: &str,
        tags: T,
        body: String,
    ) -> Result<ArticleDraft>
    where
        T: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let title = title.trim();
        if title.is_empty() {
            return Err(Error::MissingTitle);
        }

        let slug_hint = match slug_hint.map(str::trim) {
            Some(hint) if !hint.is_empty() => hint,
            _ => title,
        };

        Ok(ArticleDraft {
            title: title.to_owned(),
            slug_hint: slug_hint.to_owned(),
            description: description.trim().chars().take(MAX_DESCRIPTION_CHARS).collect(),
            tags: tags
                .into_iter()
                .map(|t| t.as_ref().trim().to_owned())
                .filter(|t| !t.is_empty())
                .take(MAX_TAGS)
                .collect(),
            body,
        })
    }

    /// The draft published in place of a generated article. `now` is noted in
    /// the body so the post records when the outage was observed.
    pub fn placeholder(now: DateTime<Utc>) -> ArticleDraft {
        let body = format!(
            r#"
<p><strong>TL;DR:</strong> Automated publishing could not reach the model provider today.</p>
<p>This is a placeholder post generated at {}. The job will retry tomorrow.</p>
<h2>What happened?</h2>
<p>Most likely the provider was unavailable or rejected the request. The job logs have the details.</p>
<ul><li>Provider outage</li><li>Missing or invalid API key</li><li>Model access not enabled</li></ul>
<h2>Key Takeaways</h2>
<ul><li>The site is healthy; only the generation call failed.</li><li>The daily job keeps running.</li></ul>
"#,
            now.format("%Y-%m-%dT%H:%M:%SZ"),
        );

        ArticleDraft {
            title: PLACEHOLDER_TITLE.to_owned(),
            slug_hint: PLACEHOLDER_TITLE.to_owned(),
            description: PLACEHOLDER_DESCRIPTION.to_owned(),
            tags: Vec::new(),
            body,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// The text the post's slug is derived from.
    pub fn slug_hint(&self) -> &str {
        &self.slug_hint
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// The article body as an HTML fragment.
    pub fn body(&self) -> &str {
        &self.body
    }
}

/// The JSON shape the provider is asked to return. Every field is optional
/// here; [`ArticleDraft::new`] decides what is actually required.
#[derive(Debug, Default, Deserialize)]
pub struct RawDraft {
    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub slug: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub tags: Option<Vec<String>>,

    #[serde(default)]
    pub html_body: Option<String>,
}

impl TryFrom<RawDraft> for ArticleDraft {
    type Error = Error;

    fn try_from(raw: RawDraft) -> Result<ArticleDraft> {
        ArticleDraft::new(
            raw.title.as_deref().unwrap_or_default(),
            raw.slug.as_deref(),
            raw.description.as_deref().unwrap_or_default(),
            raw.tags.unwrap_or_default(),
            raw.html_body.unwrap_or_default(),
        )
    }
}

type Result<T> = std::result::Result<T, Error>;

/// Returned when a draft can't be built from the provided fields.
#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// The title was missing or blank.
    MissingTitle,
}

impl fmt::Display for Error {
    /// Implements [`fmt::Display`] for [`Error`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::MissingTitle => write!(f, "Draft has no title"),
        }
    }
}

impl std::error::Error for Error {}
