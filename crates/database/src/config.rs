//! Tenancy settings.
//!
//! Loaded once at startup from an optional `schemata.toml` (or `.yaml`/`.json`)
//! layered under `SCHEMATA_*` environment variables. Every problem found here
//! is fatal: the process must not start with a misreferenced public schema or
//! a malformed extra search path.

use crate::error::{DatabaseError, Result};
use schemata_models::{validate_schema_name, Engine};
use serde::Deserialize;
use std::collections::HashSet;

pub const DEFAULT_PUBLIC_SCHEMA: &str = "public";

#[derive(Debug, Clone, Deserialize)]
pub struct TenancyConfig {
    #[serde(default)]
    pub engine: Engine,

    /// Schema holding the tenant registry and shared tables
    #[serde(default = "default_public_schema")]
    pub public_schema: String,

    /// Schemas appended after public in every search path (extensions, shared types)
    #[serde(default)]
    pub extra_search_paths: Vec<String>,

    /// Apply the search path once per state change instead of once per cursor
    #[serde(default = "default_true")]
    pub limit_set_calls: bool,

    /// Create (and sync) the physical schema when a tenant row is created
    #[serde(default = "default_true")]
    pub auto_create_schema: bool,

    /// Drop the physical schema when a tenant row is deleted
    #[serde(default)]
    pub auto_drop_schema: bool,

    /// Database selected for the public scope on MySQL
    #[serde(default)]
    pub default_database: Option<String>,

    /// Schema new tenants are cloned from instead of migrated from scratch
    #[serde(default)]
    pub clone_reference: Option<String>,

    /// Allowed tenant types when multi-type tenancy is in use
    #[serde(default)]
    pub tenant_types: Vec<String>,

    /// Root directory holding `shared/`, `tenant/`, `types/<type>/` and `syncdb/`
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: String,

    /// Worker count for the parallel migration executor
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Schemas handed to a worker at a time by the parallel migration executor
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_public_schema() -> String {
    DEFAULT_PUBLIC_SCHEMA.to_string()
}

fn default_true() -> bool {
    true
}

fn default_migrations_dir() -> String {
    "migrations".to_string()
}

fn default_max_workers() -> usize {
    2
}

fn default_chunk_size() -> usize {
    2
}

impl Default for TenancyConfig {
    fn default() -> Self {
        Self {
            engine: Engine::default(),
            public_schema: default_public_schema(),
            extra_search_paths: Vec::new(),
            limit_set_calls: true,
            auto_create_schema: true,
            auto_drop_schema: false,
            default_database: None,
            clone_reference: None,
            tenant_types: Vec::new(),
            migrations_dir: default_migrations_dir(),
            max_workers: default_max_workers(),
            chunk_size: default_chunk_size(),
        }
    }
}

impl TenancyConfig {
    /// Load configuration from `schemata.*` and `SCHEMATA_*` environment variables
    ///
    /// List values in the environment are comma separated, e.g.
    /// `SCHEMATA_EXTRA_SEARCH_PATHS=extensions,shared_types`.
    pub fn load() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("schemata").required(false))
            .add_source(
                config::Environment::with_prefix("SCHEMATA")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("extra_search_paths")
                    .with_list_parse_key("tenant_types"),
            )
            .build()
            .map_err(|e| DatabaseError::Configuration(e.to_string()))?;

        let config: Self = settings
            .try_deserialize()
            .map_err(|e| DatabaseError::Configuration(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Check the settings for contradictions that must stop startup
    pub fn validate(&self) -> Result<()> {
        if self.engine == Engine::Postgres {
            validate_schema_name(self.engine, &self.public_schema).map_err(|e| {
                DatabaseError::Configuration(format!("public_schema is not usable: {}", e))
            })?;
        } else if self.public_schema.is_empty() {
            return Err(DatabaseError::Configuration(
                "public_schema must not be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for schema in &self.extra_search_paths {
            validate_schema_name(self.engine, schema).map_err(|e| {
                DatabaseError::Configuration(format!("extra_search_paths entry rejected: {}", e))
            })?;
            if schema.eq_ignore_ascii_case(&self.public_schema) {
                return Err(DatabaseError::Configuration(format!(
                    "extra_search_paths must not contain the public schema '{}'",
                    self.public_schema
                )));
            }
            if !seen.insert(schema.to_ascii_lowercase()) {
                return Err(DatabaseError::Configuration(format!(
                    "extra_search_paths lists '{}' more than once",
                    schema
                )));
            }
        }

        if self.engine == Engine::MySql {
            let database = self.default_database.as_deref().ok_or_else(|| {
                DatabaseError::Configuration(
                    "default_database is required when engine is mysql".to_string(),
                )
            })?;
            validate_schema_name(self.engine, database).map_err(|e| {
                DatabaseError::Configuration(format!("default_database is not usable: {}", e))
            })?;
            if !self.extra_search_paths.is_empty() {
                return Err(DatabaseError::Configuration(
                    "extra_search_paths has no meaning when engine is mysql".to_string(),
                ));
            }
        }

        if let Some(reference) = &self.clone_reference {
            validate_schema_name(self.engine, reference).map_err(|e| {
                DatabaseError::Configuration(format!("clone_reference is not usable: {}", e))
            })?;
            if reference.eq_ignore_ascii_case(&self.public_schema) {
                return Err(DatabaseError::Configuration(
                    "clone_reference must not be the public schema".to_string(),
                ));
            }
        }

        if self.max_workers == 0 || self.chunk_size == 0 {
            return Err(DatabaseError::Configuration(
                "max_workers and chunk_size must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    pub fn is_public(&self, schema_name: &str) -> bool {
        schema_name.eq_ignore_ascii_case(&self.public_schema)
    }

    /// Reject tenant types that are not configured; any type is accepted when none are.
    pub fn check_tenant_type(&self, tenant_type: Option<&str>) -> Result<()> {
        match tenant_type {
            Some(t) if !self.tenant_types.is_empty() && !self.tenant_types.iter().any(|c| c == t) => {
                Err(DatabaseError::InvalidInput(format!(
                    "unknown tenant type '{}', expected one of: {}",
                    t,
                    self.tenant_types.join(", ")
                )))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = TenancyConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.public_schema, "public");
        assert!(config.limit_set_calls);
        assert!(!config.auto_drop_schema);
    }

    #[test]
    fn test_extra_search_paths_must_not_include_public() {
        let config = TenancyConfig {
            extra_search_paths: vec!["extensions".to_string(), "PUBLIC".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(DatabaseError::Configuration(_))
        ));
    }

    #[test]
    fn test_extra_search_paths_are_validated() {
        let config = TenancyConfig {
            extra_search_paths: vec!["pg_catalog".to_string()],
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = TenancyConfig {
            extra_search_paths: vec!["ext".to_string(), "ext".to_string()],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mysql_requires_default_database() {
        let config = TenancyConfig {
            engine: Engine::MySql,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = TenancyConfig {
            engine: Engine::MySql,
            default_database: Some("app".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_tenant_type_check() {
        let config = TenancyConfig {
            tenant_types: vec!["school".to_string(), "district".to_string()],
            ..Default::default()
        };
        assert!(config.check_tenant_type(Some("school")).is_ok());
        assert!(config.check_tenant_type(None).is_ok());
        assert!(config.check_tenant_type(Some("shop")).is_err());
        assert!(TenancyConfig::default().check_tenant_type(Some("shop")).is_ok());
    }
}
