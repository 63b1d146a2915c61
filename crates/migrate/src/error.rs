use crate::progress::Progress;
use schemata_database::DatabaseError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MigrationError>;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("{schema} {progress}: {message}")]
    SchemaFailed {
        schema: String,
        progress: Progress,
        message: String,
    },

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("Failed to read migrations from {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Schema '{0}' is neither public nor a registered tenant")]
    UnknownSchema(String),

    #[error("{failed} of {total} schemas failed to migrate, first failure: {first}")]
    WorkersFailed {
        failed: usize,
        total: usize,
        first: String,
    },
}

impl MigrationError {
    pub fn schema_failed(schema: &str, progress: Progress, err: impl std::fmt::Display) -> Self {
        Self::SchemaFailed {
            schema: schema.to_string(),
            progress,
            message: err.to_string(),
        }
    }

    pub fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
