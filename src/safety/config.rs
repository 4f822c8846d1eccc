//! Compile-time safety tables — the AI cannot override any of this.
//!
//! Every list here is ported verbatim from the triage system's original
//! protection tables. They are intentionally NOT part of [`crate::core::config::Config`]:
//! a config file on disk is operator-controlled, and the whole point of the
//! Safety Engine is that its guardrails are not.

use std::collections::HashSet;

/// Directories that are always `KEEP`, regardless of AI classification.
///
/// Compared case-insensitively, component-wise, as a path prefix (see
/// [`crate::safety::engine::is_protected_path`]).
pub const PROTECTED_PATHS: &[&str] = &[
    r"C:\Windows",
    r"C:\Program Files\WindowsApps",
    r"C:\Program Files\Windows Defender",
    r"C:\Program Files\Windows Defender Advanced Threat Protection",
    r"C:\Program Files\Windows Mail",
    r"C:\Program Files\Windows Media Player",
    r"C:\Program Files\Windows Multimedia Platform",
    r"C:\Program Files\Windows NT",
    r"C:\Program Files\Windows Photo Viewer",
    r"C:\Program Files\Windows Portable Devices",
    r"C:\Program Files\Windows Security",
    r"C:\Program Files\Windows Sidebar",
    r"C:\ProgramData\Microsoft",
    r"C:\Program Files (x86)\Windows Defender",
    r"C:\Recovery",
    r"C:\$Recycle.Bin",
    r"C:\System Volume Information",
    r"C:\Boot",
    r"C:\bootmgr",
    r"C:\BOOTNXT",
];

/// File owners that are always `KEEP`, regardless of path or AI classification.
pub const PROTECTED_OWNERS: &[&str] = &[
    "TrustedInstaller",
    "NT SERVICE\\TrustedInstaller",
    "SYSTEM",
    "NT AUTHORITY\\SYSTEM",
];

/// Text/office document extensions — never `DELETE_*`.
pub const DOCUMENT_EXTENSIONS: &[&str] = &[
    ".doc", ".docx", ".pdf", ".txt", ".md", ".rtf", ".odt", ".tex", ".pages", ".xls", ".xlsx",
    ".csv", ".ods", ".numbers", ".ppt", ".pptx", ".odp", ".key", ".epub", ".mobi",
];

/// Photo/video/audio media extensions — never `DELETE_*`.
pub const PHOTO_VIDEO_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".bmp", ".tiff", ".tif", ".webp", ".svg", ".raw", ".cr2",
    ".nef", ".heic", ".heif", ".mp4", ".mov", ".avi", ".mkv", ".wmv", ".flv", ".webm", ".m4v",
    ".mp3", ".wav", ".flac", ".aac", ".ogg", ".wma", ".m4a",
];

/// Audio-only subset of [`PHOTO_VIDEO_EXTENSIONS`], used to subcategorize
/// `MOVE_DATA` destinations into `media_music` vs `media_videos`/`media_photos`.
pub const MUSIC_EXTENSIONS: &[&str] = &[
    ".mp3", ".wav", ".flac", ".aac", ".ogg", ".wma", ".m4a",
];

/// Video-only subset of [`PHOTO_VIDEO_EXTENSIONS`].
pub const VIDEO_EXTENSIONS: &[&str] = &[
    ".mp4", ".mov", ".avi", ".mkv", ".wmv", ".flv", ".webm", ".m4v",
];

/// Source code / plain-text config extensions — never `DELETE_*`.
pub const SOURCE_CODE_EXTENSIONS: &[&str] = &[
    ".py", ".js", ".ts", ".jsx", ".tsx", ".java", ".cpp", ".c", ".h", ".hpp", ".cs", ".go",
    ".rs", ".rb", ".php", ".swift", ".kt", ".scala", ".r", ".m", ".sql", ".sh", ".bash", ".ps1",
    ".bat", ".cmd", ".yaml", ".yml", ".json", ".xml", ".toml", ".ini", ".cfg", ".html", ".css",
    ".scss", ".less", ".vue", ".svelte",
];

/// Substrings in a lowercased filename that mark it sensitive (credentials,
/// private keys, `.env` files). A match flags the file and blocks deletion,
/// regardless of confidence.
pub const SENSITIVE_FILE_PATTERNS: &[&str] = &[
    ".env",
    ".env.local",
    ".env.production",
    ".env.development",
    "_key",
    "_secret",
    "_token",
    "credentials",
    "secret",
    "private_key",
    "id_rsa",
    "id_ed25519",
    ".pem",
    ".key",
    ".pfx",
    ".p12",
];

/// Minimum confidence a `DELETE_JUNK`/`DELETE_UNUSED` verdict needs to survive
/// Layer 3 unmodified.
pub const CONFIDENCE_DELETE_MIN: f64 = 0.85;

/// Below this confidence, any verdict is flagged `needs_review`.
pub const CONFIDENCE_UNCERTAIN: f64 = 0.4;

/// Below this confidence (but at/above [`CONFIDENCE_UNCERTAIN`]), a verdict is
/// still flagged `needs_review` even though it is not "uncertain".
pub const CONFIDENCE_AUTO_APPROVE: f64 = 0.7;

/// Union of [`DOCUMENT_EXTENSIONS`], [`PHOTO_VIDEO_EXTENSIONS`], and
/// [`SOURCE_CODE_EXTENSIONS`] — the full Document Guardian allowlist.
#[must_use]
pub fn guardian_extensions() -> HashSet<&'static str> {
    DOCUMENT_EXTENSIONS
        .iter()
        .chain(PHOTO_VIDEO_EXTENSIONS)
        .chain(SOURCE_CODE_EXTENSIONS)
        .copied()
        .collect()
}

/// Injectable safety configuration.
///
/// Production code always builds this via [`SafetyConfig::production`], which
/// is wired straight to the constants above. Tests may build a narrower
/// [`SafetyConfig`] directly to exercise individual layers in isolation,
/// per the "lift ambient singleton config to an explicit value" design note.
#[derive(Debug, Clone)]
pub struct SafetyConfig {
    pub protected_paths: Vec<String>,
    pub protected_owners: Vec<String>,
    pub guardian_extensions: HashSet<String>,
    pub sensitive_patterns: Vec<String>,
    pub confidence_delete_min: f64,
    pub confidence_uncertain: f64,
    pub confidence_auto_approve: f64,
}

impl SafetyConfig {
    /// The real, compile-time-constant configuration used in production.
    #[must_use]
    pub fn production() -> Self {
        Self {
            protected_paths: PROTECTED_PATHS.iter().map(|s| (*s).to_string()).collect(),
            protected_owners: PROTECTED_OWNERS.iter().map(|s| (*s).to_string()).collect(),
            guardian_extensions: guardian_extensions()
                .into_iter()
                .map(str::to_string)
                .collect(),
            sensitive_patterns: SENSITIVE_FILE_PATTERNS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            confidence_delete_min: CONFIDENCE_DELETE_MIN,
            confidence_uncertain: CONFIDENCE_UNCERTAIN,
            confidence_auto_approve: CONFIDENCE_AUTO_APPROVE,
        }
    }
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self::production()
    }
}
