use schemata_models::InvalidSchemaName;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DatabaseError>;

/// SQLSTATE for "current transaction is aborted, commands ignored until end of transaction block"
pub const IN_FAILED_SQL_TRANSACTION: &str = "25P02";

/// SQLSTATE for unique_violation
pub const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error(transparent)]
    InvalidSchemaName(#[from] InvalidSchemaName),

    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Cross-tenant violation: {0}")]
    CrossTenantViolation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unsupported on {engine}: {operation}")]
    Unsupported { engine: String, operation: String },

    #[error("Schema sync failed for '{schema}': {message}")]
    SchemaSync { schema: String, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DatabaseError {
    pub fn not_found(entity: &str, id: &str) -> Self {
        Self::NotFound(format!("{} with id {} not found", entity, id))
    }

    pub fn duplicate(entity: &str, field: &str) -> Self {
        Self::DuplicateEntry(format!("{} with {} already exists", entity, field))
    }

    pub fn schema_exists(schema_name: &str) -> Self {
        Self::DuplicateEntry(format!("schema '{}' already exists", schema_name))
    }

    /// Map a unique violation raised by an insert to `DuplicateEntry`.
    pub fn from_insert(err: sqlx::Error, entity: &str, field: &str) -> Self {
        if sqlstate(&err).as_deref() == Some(UNIQUE_VIOLATION) {
            return Self::duplicate(entity, field);
        }
        Self::ConnectionError(err)
    }
}

impl From<validator::ValidationErrors> for DatabaseError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

/// SQLSTATE of a database error, if the driver reported one.
pub fn sqlstate(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) => db.code().map(|code| code.into_owned()),
        _ => None,
    }
}

/// Whether a statement failed only because the surrounding transaction already had.
pub fn is_aborted_transaction(err: &sqlx::Error) -> bool {
    sqlstate(err).as_deref() == Some(IN_FAILED_SQL_TRANSACTION)
}
