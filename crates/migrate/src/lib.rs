pub mod error;
pub mod executor;
pub mod progress;
pub mod runner;
pub mod set;
pub mod targets;

pub use error::{MigrationError, Result};
pub use executor::{
    FailurePolicy, MigrationExecutor, MigrationReport, ParallelExecutor, StandardExecutor,
};
pub use progress::{Progress, RunState};
pub use runner::{MigrateOptions, SchemaMigrator, SqlxSchemaMigrator};
pub use set::{MigrationSet, MigrationTarget, SyncScript};
pub use targets::{resolve_targets, MigrationScope};
