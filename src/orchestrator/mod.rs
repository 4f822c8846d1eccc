//! The Classification Orchestrator: batches unclassified files to the local
//! LLM, reconciles its response against what was asked, runs every result
//! through the Safety Engine, and persists the outcome.
//!
//! Ported from `classifier.py::FileClassifier` (see `DESIGN.md`).

pub mod llm;
pub mod parse;

use chrono::Utc;

use crate::catalog::db::Catalog;
use crate::catalog::models::{Classification, FileRecord};
use crate::core::config::{Config, OrchestratorConfig};
use crate::core::errors::Result;
use crate::orchestrator::llm::{OllamaClient, PreflightResult};
use crate::orchestrator::parse::{RawClassification, parse_response};
use crate::safety::engine::SafetyEngine;

/// Totals accumulated across a whole [`Orchestrator::classify_all`] run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClassificationSummary {
    pub classified: u64,
    pub overridden: u64,
    pub errors: u64,
    pub batches: u32,
    pub aborted: bool,
}

/// Drives classification batches against the Catalog.
pub struct Orchestrator<'a> {
    catalog: &'a mut Catalog,
    llm: OllamaClient,
    safety: SafetyEngine,
    config: OrchestratorConfig,
    now: fn() -> String,
}

impl<'a> Orchestrator<'a> {
    pub fn new(catalog: &'a mut Catalog, config: &Config, now: fn() -> String) -> Result<Self> {
        Ok(Self {
            catalog,
            llm: OllamaClient::new(&config.llm)?,
            safety: SafetyEngine::default(),
            config: config.orchestrator.clone(),
            now,
        })
    }

    /// Check that Ollama is reachable and the configured model is loaded,
    /// without classifying anything.
    pub fn preflight(&self) -> PreflightResult {
        self.llm.preflight()
    }

    /// Classify every unclassified file in the Catalog, batch by batch, until
    /// none remain or the run is aborted by the zero-progress circuit breaker.
    pub fn classify_all(&mut self) -> Result<ClassificationSummary> {
        let mut summary = ClassificationSummary::default();
        let mut consecutive_zero_progress = 0u32;

        loop {
            let files = self.catalog.unclassified_files(self.config.batch_size)?;
            if files.is_empty() {
                break;
            }

            summary.batches += 1;
            let classified_before = summary.classified;

            self.classify_batch(&files, &mut summary)?;

            if summary.classified == classified_before {
                consecutive_zero_progress += 1;
                if consecutive_zero_progress >= self.config.max_consecutive_zero_progress_batches {
                    summary.aborted = true;
                    break;
                }
            } else {
                consecutive_zero_progress = 0;
            }
        }

        Ok(summary)
    }

    fn classify_batch(
        &mut self,
        files: &[FileRecord],
        summary: &mut ClassificationSummary,
    ) -> Result<()> {
        let prompt = build_batch_prompt(files);

        let ai_results = match self.llm.generate(&prompt) {
            Ok(response) => parse_response(&response, files.len()).results,
            Err(_) => {
                // The whole batch is unreachable this round; every file in it
                // counts as an error and stays unclassified for the next pass.
                summary.errors += files.len() as u64;
                return Ok(());
            }
        };

        self.apply_safety_and_store(files, &ai_results, summary)
    }

    fn apply_safety_and_store(
        &mut self,
        files: &[FileRecord],
        ai_results: &[RawClassification],
        summary: &mut ClassificationSummary,
    ) -> Result<()> {
        for file in files {
            let found = ai_results.iter().find(|r| r.path == file.path).cloned();
            let ai = match found {
                Some(result) => result,
                None => {
                    summary.errors += 1;
                    synthesize_missing_result(&file.path)
                }
            };

            let verdict = self.safety.check(
                &file.path,
                ai.action,
                ai.confidence,
                &file.owner,
                &file.extension,
            );

            if verdict.overridden {
                summary.overridden += 1;
            }

            let Some(file_id) = file.id else {
                summary.errors += 1;
                continue;
            };

            let classification = Classification {
                id: None,
                file_id,
                action: verdict.final_action,
                confidence: ai.confidence,
                reason: ai.reason,
                category: ai.category,
                overridden: verdict.overridden,
                override_reason: verdict.override_reason,
                classified_at: (self.now)(),
            };

            match self.catalog.upsert_classification(&classification) {
                Ok(_) => summary.classified += 1,
                Err(_) => summary.errors += 1,
            }
        }
        Ok(())
    }
}

fn synthesize_missing_result(path: &str) -> RawClassification {
    RawClassification {
        path: path.to_string(),
        action: crate::catalog::models::Action::Keep,
        confidence: 0.0,
        reason: "No AI classification returned".to_string(),
        category: "unknown".to_string(),
    }
}

/// Metadata-only prompt: name, extension, size, path, and dates. Never file
/// contents — the model only ever sees what this function writes.
fn build_batch_prompt(files: &[FileRecord]) -> String {
    let mut lines = vec!["Classify these files:\n".to_string()];
    for f in files {
        lines.push(format!(
            "- path: {}, name: {}, ext: {}, size: {} bytes, modified: {}, accessed: {}",
            f.path, f.leaf, f.extension, f.size_bytes, f.modified_at, f.accessed_at
        ));
    }
    lines.join("\n")
}

/// Current UTC timestamp in millisecond-precision ISO-8601, the default
/// clock passed to [`Orchestrator::new`] outside of tests.
#[must_use]
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
