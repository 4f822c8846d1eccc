//! Undo: batch-scoped reversal of everything the Execution Engine did.

pub mod manager;

pub use manager::{UndoManager, UndoSummary};
