//! Schema name identity rules.
//!
//! Schema (or database) names are embedded directly in DDL and in the
//! search-path statement because SQL cannot bind identifiers as parameters.
//! Every such statement must pass its names through [`validate_schema_name`]
//! first.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Longest unquoted identifier PostgreSQL keeps without truncation.
pub const POSTGRES_MAX_IDENTIFIER_LEN: usize = 63;

/// Longest database name MySQL accepts.
pub const MYSQL_MAX_IDENTIFIER_LEN: usize = 64;

const MYSQL_SYSTEM_DATABASES: &[&str] = &["mysql", "information_schema", "performance_schema", "sys"];

lazy_static::lazy_static! {
    pub static ref POSTGRES_SCHEMA_REGEX: regex::Regex =
        regex::Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").unwrap();
    pub static ref MYSQL_SCHEMA_REGEX: regex::Regex =
        regex::Regex::new(r"^[A-Za-z0-9_$]{1,64}$").unwrap();
}

/// Database engine a tenant layout is deployed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// One database, one schema per tenant, scoped through `search_path`.
    #[default]
    Postgres,
    /// One database per tenant, scoped through `USE`.
    #[serde(alias = "mariadb")]
    MySql,
}

impl Engine {
    pub fn max_identifier_len(&self) -> usize {
        match self {
            Self::Postgres => POSTGRES_MAX_IDENTIFIER_LEN,
            Self::MySql => MYSQL_MAX_IDENTIFIER_LEN,
        }
    }

    /// Quote an identifier for embedding in a statement.
    ///
    /// Callers validate the name first; quoting keeps mixed-case names stable
    /// between the statement that creates a schema and the ones that use it.
    pub fn quote_identifier(&self, name: &str) -> String {
        match self {
            Self::Postgres => format!("\"{}\"", name.replace('"', "\"\"")),
            Self::MySql => format!("`{}`", name.replace('`', "``")),
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Postgres => write!(f, "postgres"),
            Self::MySql => write!(f, "mysql"),
        }
    }
}

/// The rule a rejected schema name broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaNameRule {
    Empty,
    TooLong { max: usize },
    InvalidCharacters,
    ReservedPrefix { prefix: &'static str },
    ReservedName,
}

impl fmt::Display for SchemaNameRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "name must not be empty"),
            Self::TooLong { max } => write!(f, "name must be at most {} characters", max),
            Self::InvalidCharacters => write!(
                f,
                "name must start with a letter or underscore and contain only letters, digits and underscores"
            ),
            Self::ReservedPrefix { prefix } => {
                write!(f, "names starting with '{}' are reserved for system schemas", prefix)
            }
            Self::ReservedName => write!(f, "name is reserved for a system database"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid schema name '{name}': {rule}")]
pub struct InvalidSchemaName {
    pub name: String,
    pub rule: SchemaNameRule,
}

impl InvalidSchemaName {
    fn new(name: &str, rule: SchemaNameRule) -> Self {
        Self {
            name: name.to_string(),
            rule,
        }
    }
}

/// Validate a schema (PostgreSQL) or database (MySQL) name.
pub fn validate_schema_name(engine: Engine, name: &str) -> Result<(), InvalidSchemaName> {
    if name.is_empty() {
        return Err(InvalidSchemaName::new(name, SchemaNameRule::Empty));
    }

    let max = engine.max_identifier_len();
    if name.len() > max {
        return Err(InvalidSchemaName::new(name, SchemaNameRule::TooLong { max }));
    }

    match engine {
        Engine::Postgres => {
            if !POSTGRES_SCHEMA_REGEX.is_match(name) {
                return Err(InvalidSchemaName::new(name, SchemaNameRule::InvalidCharacters));
            }
            if name.to_ascii_lowercase().starts_with("pg_") {
                return Err(InvalidSchemaName::new(
                    name,
                    SchemaNameRule::ReservedPrefix { prefix: "pg_" },
                ));
            }
        }
        Engine::MySql => {
            // MySQL accepts names made only of digits, but they are ambiguous with numbers.
            if !MYSQL_SCHEMA_REGEX.is_match(name) || name.chars().all(|c| c.is_ascii_digit()) {
                return Err(InvalidSchemaName::new(name, SchemaNameRule::InvalidCharacters));
            }
            let lowered = name.to_ascii_lowercase();
            if MYSQL_SYSTEM_DATABASES.contains(&lowered.as_str()) {
                return Err(InvalidSchemaName::new(name, SchemaNameRule::ReservedName));
            }
        }
    }

    Ok(())
}

/// Check a name without caring which rule failed.
pub fn is_valid_schema_name(engine: Engine, name: &str) -> bool {
    validate_schema_name(engine, name).is_ok()
}
