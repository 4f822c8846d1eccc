//! The Safety Engine: a pure, non-bypassable override authority over AI verdicts.
//!
//! Everything here is deterministic and side-effect free — `check()` takes a
//! proposed action plus file facts and returns a final verdict. No layer can
//! be skipped or reordered by configuration; only the *content* of the
//! compile-time tables in [`config`] is injectable (for tests).

pub mod config;
pub mod engine;
pub mod network;

pub use config::SafetyConfig;
pub use engine::{SafetyEngine, Verdict};
pub use network::{NetworkViolation, check_outbound_connections};
