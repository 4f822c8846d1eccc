//! The four-layer `check()` pipeline: absolute override authority over any
//! AI verdict.
//!
//! Ported 1:1 from the original `safety.py` (see `DESIGN.md`). Pure function
//! of its inputs plus [`SafetyConfig`] — cannot fail, cannot be skipped, and
//! never touches the filesystem or the Catalog.

use std::path::Path;

use crate::catalog::models::Action;
use crate::safety::config::SafetyConfig;

/// The Safety Engine's verdict: final action, whether it was overridden, and
/// review flags the Orchestrator persists onto the `Classification` row.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub original_action: Action,
    pub final_action: Action,
    pub overridden: bool,
    pub override_reason: Option<String>,
    pub is_protected: bool,
    pub is_guardian_protected: bool,
    pub is_sensitive: bool,
    pub needs_review: bool,
    pub warnings: Vec<String>,
}

impl Verdict {
    fn pristine(action: Action) -> Self {
        Self {
            original_action: action,
            final_action: action,
            overridden: false,
            override_reason: None,
            is_protected: false,
            is_guardian_protected: false,
            is_sensitive: false,
            needs_review: false,
            warnings: Vec::new(),
        }
    }

    /// Force `KEEP`, mark overridden, and record `reason` as the override
    /// reason *only if* no earlier layer has already set one — the earliest
    /// tripped layer wins per `SPEC_FULL.md` §4.2's tie-break rule.
    fn override_to_keep(&mut self, reason: &str) {
        self.final_action = Action::Keep;
        self.overridden = true;
        if self.override_reason.is_none() {
            self.override_reason = Some(reason.to_string());
        }
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

/// The Safety Engine: stateless, holds only its (injectable) configuration.
#[derive(Debug, Clone)]
pub struct SafetyEngine {
    config: SafetyConfig,
}

impl Default for SafetyEngine {
    fn default() -> Self {
        Self::new(SafetyConfig::production())
    }
}

impl SafetyEngine {
    #[must_use]
    pub const fn new(config: SafetyConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &SafetyConfig {
        &self.config
    }

    /// Run the four-layer pipeline. Cannot fail: malformed input (empty
    /// extension, missing owner) is treated conservatively (absent owner is
    /// unprotected, absent extension is non-guardian, inferred from the
    /// path's suffix when not supplied).
    #[must_use]
    pub fn check(
        &self,
        path: &str,
        proposed_action: Action,
        confidence: f64,
        owner: &str,
        extension: &str,
    ) -> Verdict {
        let mut verdict = Verdict::pristine(proposed_action);

        // Layer 1 — protected paths and owners. Absolute; short-circuits.
        if self.is_protected_path(path) || self.is_protected_owner(owner) {
            verdict.is_protected = true;
            verdict.override_to_keep("protected path or owner");
            verdict.needs_review = false;
            return verdict;
        }

        let extension = effective_extension(extension, path);

        // Layer 2 — Document Guardian (deletion-only).
        if verdict.final_action.is_delete() && self.is_guardian_extension(&extension) {
            verdict.is_guardian_protected = true;
            verdict.override_to_keep("document guardian: deletion of protected file type");
            verdict.needs_review = true;
        }

        // Layer 2b — sensitive filename patterns.
        let leaf = leaf_of(path).to_ascii_lowercase();
        if self.is_sensitive_name(&leaf) {
            verdict.is_sensitive = true;
            if verdict.final_action.is_delete() {
                verdict.override_to_keep("sensitive filename pattern: deletion blocked");
                verdict.needs_review = true;
            }
        }

        // Layer 3 — confidence gates. Only meaningful if a delete survived.
        if verdict.final_action.is_delete() {
            if confidence < self.config.confidence_delete_min {
                verdict.override_to_keep("confidence below delete threshold");
                verdict.needs_review = true;
            } else if confidence < self.config.confidence_uncertain {
                verdict.needs_review = true;
                verdict.warn("confidence below uncertainty threshold");
            } else if confidence < self.config.confidence_auto_approve {
                verdict.needs_review = true;
            }
        } else if confidence < self.config.confidence_uncertain {
            verdict.needs_review = true;
            verdict.warn("confidence below uncertainty threshold");
        } else if confidence < self.config.confidence_auto_approve {
            verdict.needs_review = true;
        }

        verdict
    }

    /// Layer 1 path containment: is `path` equal to, or a descendant of, any
    /// configured protected root? Compared component-wise and
    /// case-insensitively (Windows native-path semantics), never by substring.
    #[must_use]
    pub fn is_protected_path(&self, path: &str) -> bool {
        self.config
            .protected_paths
            .iter()
            .any(|root| is_descendant_or_equal(path, root))
    }

    #[must_use]
    pub fn is_protected_owner(&self, owner: &str) -> bool {
        if owner.trim().is_empty() {
            return false;
        }
        let owner = owner.to_ascii_lowercase();
        self.config
            .protected_owners
            .iter()
            .any(|candidate| candidate.to_ascii_lowercase() == owner)
    }

    #[must_use]
    pub fn is_guardian_extension(&self, extension: &str) -> bool {
        if extension.is_empty() {
            return false;
        }
        self.config
            .guardian_extensions
            .contains(&extension.to_ascii_lowercase())
    }

    #[must_use]
    pub fn is_sensitive_name(&self, lowercased_leaf: &str) -> bool {
        self.config
            .sensitive_patterns
            .iter()
            .any(|pattern| lowercased_leaf.contains(pattern.as_str()))
    }
}

/// If `extension` is empty, infer it from `path`'s suffix (still possibly empty).
fn effective_extension(extension: &str, path: &str) -> String {
    if !extension.is_empty() {
        return extension.to_ascii_lowercase();
    }
    Path::new(path)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default()
        .to_ascii_lowercase()
}

fn leaf_of(path: &str) -> &str {
    path.rsplit(['\\', '/']).next().unwrap_or(path)
}

/// Native-path containment: split both sides on `\` and `/`, compare
/// component-wise case-insensitively. `candidate` is contained in `root` if
/// every component of `root` matches the corresponding component of
/// `candidate` (equal length = equal path; candidate longer = descendant).
fn is_descendant_or_equal(candidate: &str, root: &str) -> bool {
    let candidate_components: Vec<String> = split_components(candidate);
    let root_components: Vec<String> = split_components(root);

    if root_components.is_empty() || candidate_components.len() < root_components.len() {
        return false;
    }
    candidate_components
        .iter()
        .zip(root_components.iter())
        .all(|(c, r)| c == r)
}

fn split_components(path: &str) -> Vec<String> {
    path.split(['\\', '/'])
        .filter(|segment| !segment.is_empty())
        .map(str::to_ascii_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> SafetyEngine {
        SafetyEngine::default()
    }

    // Property 1 (SPEC_FULL §8): guardian extensions never survive a delete.
    #[test]
    fn guardian_extension_always_kept_on_delete() {
        let engine = engine();
        for confidence in [0.0, 0.5, 0.85, 1.0] {
            for action in [Action::DeleteJunk, Action::DeleteUnused] {
                let v = engine.check(
                    r"C:\Users\Alice\Documents\thesis.docx",
                    action,
                    confidence,
                    "",
                    ".docx",
                );
                assert_eq!(v.final_action, Action::Keep, "confidence={confidence}");
                assert!(v.is_guardian_protected);
                assert!(v.overridden);
            }
        }
    }

    // Property 2: protected path/owner always wins, regardless of confidence.
    #[test]
    fn protected_path_always_kept() {
        let engine = engine();
        let v = engine.check(
            r"C:\Windows\System32\notepad.exe",
            Action::DeleteJunk,
            1.0,
            "",
            ".exe",
        );
        assert_eq!(v.final_action, Action::Keep);
        assert!(v.is_protected);
        assert!(v.overridden);
    }

    #[test]
    fn protected_owner_always_kept() {
        let engine = engine();
        let v = engine.check(r"C:\Users\bob\file.tmp", Action::DeleteJunk, 1.0, "SYSTEM", ".tmp");
        assert_eq!(v.final_action, Action::Keep);
        assert!(v.is_protected);
    }

    #[test]
    fn protected_path_containment_is_component_wise_not_substring() {
        let engine = engine();
        // "C:\WindowsXYZ" is NOT a descendant of "C:\Windows".
        let v = engine.check(r"C:\WindowsXYZ\foo.tmp", Action::DeleteJunk, 1.0, "", ".tmp");
        assert!(!v.is_protected);
    }

    #[test]
    fn protected_path_is_case_insensitive() {
        let engine = engine();
        let v = engine.check(r"c:\windows\system32\x.dll", Action::DeleteJunk, 1.0, "", ".dll");
        assert!(v.is_protected);
    }

    // Property 3: non-sensitive, non-guardian, non-protected delete below 0.85 -> KEEP + needs_review.
    #[test]
    fn low_confidence_delete_forced_to_keep() {
        let engine = engine();
        let v = engine.check(r"C:\Users\bob\junk.tmp", Action::DeleteJunk, 0.5, "", ".tmp");
        assert_eq!(v.final_action, Action::Keep);
        assert!(v.needs_review);
        assert!(v.overridden);
    }

    // Boundary: exactly 0.85 passes, 0.84999 does not.
    #[test]
    fn delete_threshold_boundary() {
        let engine = engine();
        let at_threshold = engine.check(r"C:\Users\bob\junk.tmp", Action::DeleteJunk, 0.85, "", ".tmp");
        assert_eq!(at_threshold.final_action, Action::DeleteJunk);
        assert!(!at_threshold.overridden);

        let below_threshold =
            engine.check(r"C:\Users\bob\junk.tmp", Action::DeleteJunk, 0.84999, "", ".tmp");
        assert_eq!(below_threshold.final_action, Action::Keep);
        assert!(below_threshold.overridden);
    }

    #[test]
    fn sensitive_filename_blocks_delete() {
        let engine = engine();
        let v = engine.check(r"C:\Users\bob\.env", Action::DeleteUnused, 0.99, "", "");
        assert_eq!(v.final_action, Action::Keep);
        assert!(v.is_sensitive);
        assert!(v.overridden);
    }

    #[test]
    fn sensitive_filename_does_not_block_move_or_archive() {
        let engine = engine();
        let v = engine.check(r"C:\Users\bob\id_rsa", Action::MoveData, 0.99, "", "");
        assert_eq!(v.final_action, Action::MoveData);
        assert!(v.is_sensitive);
        assert!(!v.overridden);
    }

    #[test]
    fn guardian_does_not_interfere_with_move_or_archive() {
        let engine = engine();
        let moved = engine.check(r"C:\Users\bob\photo.jpg", Action::MoveData, 0.2, "", ".jpg");
        assert_eq!(moved.final_action, Action::MoveData);
        assert!(!moved.is_guardian_protected);

        let archived = engine.check(r"C:\Users\bob\photo.jpg", Action::Archive, 0.2, "", ".jpg");
        assert_eq!(archived.final_action, Action::Archive);
    }

    // Boundary behavior: missing extension + guardian-named leaf (e.g. Makefile)
    // is NOT guardian-protected — the set is extension-based, not name-based.
    #[test]
    fn missing_extension_with_guardian_like_name_is_not_protected() {
        let engine = engine();
        let v = engine.check(r"C:\Users\bob\project\Makefile", Action::DeleteJunk, 0.99, "", "");
        assert!(!v.is_guardian_protected);
        assert_eq!(v.final_action, Action::DeleteJunk);
        assert!(!v.overridden);
    }

    #[test]
    fn mid_confidence_sets_needs_review_without_changing_action() {
        let engine = engine();
        let v = engine.check(r"C:\Users\bob\report.pdf", Action::MoveData, 0.5, "", ".pdf");
        assert_eq!(v.final_action, Action::MoveData);
        assert!(v.needs_review);
        assert!(!v.overridden);
    }

    #[test]
    fn high_confidence_sets_no_review_flag() {
        let engine = engine();
        let v = engine.check(r"C:\Users\bob\report.pdf", Action::MoveData, 0.95, "", ".pdf");
        assert!(!v.needs_review);
        assert!(!v.overridden);
    }

    #[test]
    fn extension_inferred_from_path_when_missing() {
        let engine = engine();
        let v = engine.check(r"C:\Users\bob\thesis.docx", Action::DeleteJunk, 0.99, "", "");
        assert!(v.is_guardian_protected);
    }

    #[test]
    fn earliest_layer_override_reason_wins() {
        let engine = engine();
        // Protected path AND would also be guardian/sensitive — Layer 1 wins and short-circuits.
        let v = engine.check(
            r"C:\Windows\.env",
            Action::DeleteJunk,
            1.0,
            "",
            "",
        );
        assert!(v.is_protected);
        assert!(!v.is_sensitive, "layer 1 short-circuits before layer 2b runs");
        assert_eq!(v.override_reason.as_deref(), Some("protected path or owner"));
    }
}
