//! Advisory complaint classification.
//!
//! An external model endpoint can suggest a category, a priority, and
//! keywords for a complaint's text. The suggestion is a hint and nothing
//! more: complaint creation never waits on it being right, and never fails
//! because of it. Callers fall back to [`fallback_hint`] when the provider is
//! absent or errors.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::model::Priority;

/// Category recorded when neither the reporter nor the classifier supplied
/// one.
pub const DEFAULT_CATEGORY: &str = "other";

/// Timeout for the classification call. Deliberately short: this sits on the
/// complaint-creation path and is purely advisory.
const SUGGEST_TIMEOUT: Duration = Duration::from_secs(4);

/// Structured suggestion returned by the classifier.
#[derive(Debug, Clone, Default)]
pub struct ClassificationHint {
    pub category: Option<String>,
    pub priority: Option<Priority>,
    pub keywords: Vec<String>,
}

/// The provider's wire form. `priority` arrives as free text and is parsed
/// leniently; anything unrecognized is dropped rather than rejected.
#[derive(Debug, Deserialize)]
struct RawHint {
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    keywords: Vec<String>,
}

impl From<RawHint> for ClassificationHint {
    fn from(raw: RawHint) -> Self {
        ClassificationHint {
            category: raw.category.filter(|c| !c.trim().is_empty()),
            priority: raw
                .priority
                .and_then(|p| p.trim().to_lowercase().parse().ok()),
            keywords: raw.keywords,
        }
    }
}

/// The fixed suggestion used when no provider is configured or the call
/// failed: default category, no priority opinion.
pub fn fallback_hint() -> ClassificationHint {
    ClassificationHint {
        category: Some(DEFAULT_CATEGORY.to_string()),
        priority: None,
        keywords: Vec::new(),
    }
}

/// Client for an HTTP classification endpoint.
#[derive(Clone)]
pub struct HintClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HintClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(SUGGEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// Ask the provider to classify a complaint's text.
    ///
    /// Errors here are the caller's cue to fall back, not to fail the
    /// request.
    pub async fn suggest(&self, text: &str) -> anyhow::Result<ClassificationHint> {
        let url = format!("{}/classify", self.base_url);

        let mut request = self.client.post(&url).json(&json!({ "text": text }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?.error_for_status()?;
        let raw: RawHint = response.json().await?;

        Ok(raw.into())
    }
}
