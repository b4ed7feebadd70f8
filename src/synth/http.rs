//! HTTP client for a Piper-style synthesis server.
//!
//! The server exposes `POST /synthesize` taking `{"text": "..."}` and
//! answering with `audio/wav` on success or `{"error": "..."}` otherwise,
//! plus a plain status page at `GET /`.

use crate::audio::wav;
use crate::defaults::SYNTHESIZE_ROUTE;
use crate::error::{ReadaloudError, Result};
use crate::synth::Synthesizer;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Longest slice of an error body quoted in a failure reason.
const MAX_REASON_CHARS: usize = 200;

/// Connection settings for [`HttpSynthesizer`].
#[derive(Debug, Clone, PartialEq)]
pub struct HttpConfig {
    /// Base URL of the server, e.g. `http://127.0.0.1:5100`.
    pub base_url: String,
    /// Client-side request timeout.
    pub timeout: Duration,
    /// Voice identifier, forwarded as-is when set.
    pub voice: Option<String>,
    /// Model identifier, forwarded as-is when set.
    pub model: Option<String>,
}

/// Result of a backend status check.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendHealth {
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl BackendHealth {
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Synthesizer that calls a remote HTTP backend.
pub struct HttpSynthesizer {
    client: reqwest::Client,
    base_url: String,
    endpoint: String,
    voice: Option<String>,
    model: Option<String>,
}

impl HttpSynthesizer {
    /// Build a client for the given backend.
    pub fn new(config: HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ReadaloudError::Other(format!("Failed to create HTTP client: {e}")))?;

        let base_url = config.base_url.trim_end_matches('/').to_string();
        let endpoint = format!("{base_url}{SYNTHESIZE_ROUTE}");

        Ok(Self {
            client,
            base_url,
            endpoint,
            voice: config.voice,
            model: config.model,
        })
    }

    /// URL that synthesis requests are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Fetch the backend's status page.
    ///
    /// # Errors
    /// Returns an error only when the backend cannot be reached at all;
    /// non-success statuses are reported in [`BackendHealth`].
    pub async fn health(&self) -> Result<BackendHealth> {
        let url = format!("{}/", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ReadaloudError::Other(format!("Cannot reach backend at {url}: {e}")))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ReadaloudError::Other(format!("Failed to read status page: {e}")))?;

        Ok(BackendHealth { url, status, body })
    }
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        if text.trim().is_empty() {
            return Err(ReadaloudError::synthesis("refusing to synthesize empty text"));
        }

        let request = SynthesizeRequest {
            text,
            voice: self.voice.as_deref(),
            model: self.model.as_deref(),
        };

        debug!("POST {} ({} chars)", self.endpoint, text.chars().count());

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| ReadaloudError::synthesis(transport_reason(&self.endpoint, &e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReadaloudError::synthesis(failure_reason(status.as_u16(), &body)));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| ReadaloudError::synthesis(format!("failed to read audio body: {e}")))?;

        if audio.is_empty() {
            return Err(ReadaloudError::synthesis("backend returned no audio data"));
        }
        // A valid header over a truncated data chunk only fails a full decode.
        wav::decode(&audio)
            .map_err(|e| ReadaloudError::synthesis(format!("backend returned malformed audio: {e}")))?;

        Ok(audio.to_vec())
    }

    fn name(&self) -> &str {
        &self.base_url
    }
}

fn transport_reason(url: &str, error: &reqwest::Error) -> String {
    if error.is_timeout() {
        format!("request to {url} timed out")
    } else if error.is_connect() {
        format!("cannot connect to {url}")
    } else {
        format!("request to {url} failed: {error}")
    }
}

/// Turns a non-success response into a readable reason.
///
/// JSON bodies of the form `{"error": "..."}` are quoted verbatim; anything
/// else is trimmed and truncated.
fn failure_reason(status: u16, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        return format!("status {status}: {}", parsed.error);
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return format!("status {status}");
    }
    let mut snippet: String = trimmed.chars().take(MAX_REASON_CHARS).collect();
    if trimmed.chars().count() > MAX_REASON_CHARS {
        snippet.push_str("...");
    }
    format!("status {status}: {snippet}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> HttpConfig {
        HttpConfig {
            base_url: url.to_string(),
            timeout: Duration::from_secs(5),
            voice: None,
            model: None,
        }
    }

    #[test]
    fn endpoint_joins_route_without_double_slash() {
        let synth = HttpSynthesizer::new(config("http://localhost:5100/")).unwrap();
        assert_eq!(synth.endpoint(), "http://localhost:5100/synthesize");
        assert_eq!(synth.name(), "http://localhost:5100");
    }

    #[test]
    fn failure_reason_uses_json_error_field() {
        let reason = failure_reason(500, r#"{"error": "Piper failed: model not found"}"#);
        assert_eq!(reason, "status 500: Piper failed: model not found");
    }

    #[test]
    fn failure_reason_truncates_plain_bodies() {
        let body = "x".repeat(500);
        let reason = failure_reason(502, &body);
        assert!(reason.starts_with("status 502: xxx"));
        assert!(reason.ends_with("..."));
        assert_eq!(reason.len(), "status 502: ".len() + MAX_REASON_CHARS + 3);
    }

    #[test]
    fn failure_reason_handles_empty_body() {
        assert_eq!(failure_reason(404, "  "), "status 404");
    }

    #[test]
    fn request_omits_unset_identifiers() {
        let request = SynthesizeRequest {
            text: "hi",
            voice: None,
            model: None,
        };
        assert_eq!(serde_json::to_string(&request).unwrap(), r#"{"text":"hi"}"#);

        let request = SynthesizeRequest {
            text: "hi",
            voice: Some("en_US-hfc_male-medium"),
            model: None,
        };
        assert_eq!(
            serde_json::to_string(&request).unwrap(),
            r#"{"text":"hi","voice":"en_US-hfc_male-medium"}"#
        );
    }

    #[test]
    fn health_status_classification() {
        let ok = BackendHealth {
            url: "http://x/".to_string(),
            status: 200,
            body: String::new(),
        };
        assert!(ok.is_ok());
        let down = BackendHealth { status: 503, ..ok };
        assert!(!down.is_ok());
    }

    #[tokio::test]
    async fn empty_text_is_rejected_without_a_request() {
        // Port 9 (discard) is never contacted; the check happens first.
        let synth = HttpSynthesizer::new(config("http://127.0.0.1:9")).unwrap();
        let result = synth.synthesize("   ").await;
        match result {
            Err(ReadaloudError::Synthesis { reason }) => assert!(reason.contains("empty text")),
            other => panic!("Expected Synthesis error, got {:?}", other.map(|b| b.len())),
        }
    }
}
