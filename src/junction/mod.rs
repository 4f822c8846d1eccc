//! Windows Directory Junction primitive and the `MOVE_APP`-on-directory flow
//! built on top of it.

pub mod driver;

pub use driver::{AppMigrator, MigrationOutcome};
