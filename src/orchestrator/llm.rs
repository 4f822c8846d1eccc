//! Loopback-only Ollama wire client.
//!
//! Ported from `classifier.py::OllamaClient`. The wire contract restricts
//! all traffic to `127.0.0.1:11434`/`localhost:11434` (`SPEC_FULL.md` §6);
//! [`crate::core::config::is_loopback_host`] is checked at config-load time,
//! and this client never accepts an endpoint override at the call site.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::config::LlmConfig;
use crate::core::errors::{DmError, Result};

/// The fixed system prompt instructing the model to emit a JSON array and
/// never request or reference file contents (`SPEC_FULL.md` §4.3).
pub const SYSTEM_PROMPT: &str = r#"You are a Windows storage management assistant. You analyze file metadata
and classify files into categories. You NEVER see file contents. You only see:
name, extension, size, path, last_accessed, last_modified.

Classify each file as one of: KEEP, MOVE_APP, MOVE_DATA, DELETE_JUNK,
DELETE_UNUSED, ARCHIVE. Include a confidence score (0.0-1.0) and a brief reason.

RULES:
- Documents (.doc, .pdf, .txt, etc.) are NEVER classified as DELETE
- Photos and videos are NEVER classified as DELETE
- Source code is NEVER classified as DELETE
- Installer packages (.msi, .exe in Downloads) CAN be DELETE_JUNK
- Temp files, caches, logs older than 30 days CAN be DELETE_JUNK
- Apps not accessed in 6+ months CAN be DELETE_UNUSED
- When uncertain, prefer KEEP over DELETE

Respond ONLY with a JSON array — no markdown fences, no extra text:
[{"path": "...", "action": "...", "confidence": 0.0, "reason": "...", "category": "..."}]
"#;

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f64,
    num_predict: u32,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Minimal, loopback-only REST client for the local Ollama runtime.
pub struct OllamaClient {
    host: String,
    model: String,
    client: reqwest::blocking::Client,
    request_timeout: Duration,
    availability_timeout: Duration,
    temperature: f64,
    num_predict: u32,
}

impl OllamaClient {
    /// Build a client from config. Returns a `ConfigurationRejection` if the
    /// configured host is not loopback — the same check `Config::load`
    /// already performs, re-asserted here so a client can never be built
    /// against an untrusted endpoint even if constructed directly.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        if !crate::core::config::is_loopback_host(&config.host) {
            return Err(DmError::ConfigurationRejection {
                details: format!("llm.host must be loopback, got {:?}", config.host),
            });
        }
        Ok(Self {
            host: config.host.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            client: reqwest::blocking::Client::new(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            availability_timeout: Duration::from_secs(config.availability_timeout_secs),
            temperature: config.temperature,
            num_predict: config.num_predict,
        })
    }

    /// `GET /api/tags` reachability probe.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.client
            .get(format!("{}/api/tags", self.host))
            .timeout(self.availability_timeout)
            .send()
            .is_ok_and(|resp| resp.status().is_success())
    }

    /// Whether `model` (or the client's configured model, if `None`) is
    /// present in `/api/tags`. Matches the exact tag or the name without its
    /// `:tag` suffix, same as the original.
    #[must_use]
    pub fn has_model(&self, model: Option<&str>) -> bool {
        let target = model.unwrap_or(&self.model);
        let Ok(resp) = self
            .client
            .get(format!("{}/api/tags", self.host))
            .timeout(self.availability_timeout)
            .send()
        else {
            return false;
        };
        let Ok(parsed) = resp.json::<TagsResponse>() else {
            return false;
        };
        parsed.models.iter().any(|m| {
            m.name == target || m.name.split(':').next() == target.split(':').next()
        })
    }

    /// `POST /api/generate`, `stream: false`. Returns the raw `response`
    /// text — callers pass it through [`crate::orchestrator::parse`].
    pub fn generate(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            system: SYSTEM_PROMPT,
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
                num_predict: self.num_predict,
            },
        };
        let response = self
            .client
            .post(format!("{}/api/generate", self.host))
            .timeout(self.request_timeout)
            .json(&request)
            .send()
            .map_err(|source| DmError::TransportFailure {
                endpoint: format!("{}/api/generate", self.host),
                details: source.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(DmError::TransportFailure {
                endpoint: format!("{}/api/generate", self.host),
                details: format!("HTTP {}", response.status()),
            });
        }

        let body: GenerateResponse = response.json().map_err(|source| DmError::TransportFailure {
            endpoint: format!("{}/api/generate", self.host),
            details: source.to_string(),
        })?;
        Ok(body.response)
    }

    /// `{ llm_reachable, model_loaded }`, per `SPEC_FULL.md` §4.3's `preflight()`.
    #[must_use]
    pub fn preflight(&self) -> PreflightResult {
        let reachable = self.is_available();
        let model_loaded = reachable && self.has_model(None);
        PreflightResult {
            llm_reachable: reachable,
            model_loaded,
        }
    }
}

/// Result of `preflight()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreflightResult {
    pub llm_reachable: bool,
    pub model_loaded: bool,
}
