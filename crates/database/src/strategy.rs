//! Statements that apply a [`TenantState`] to a physical connection.

use crate::error::Result;
use crate::state::TenantState;
use schemata_models::{validate_schema_name, Engine};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStrategy {
    /// PostgreSQL: one schema per tenant, scoped with `SET search_path`
    SearchPath {
        public_schema: String,
        extra_schemas: Vec<String>,
    },
    /// MySQL: one database per tenant, scoped with `USE`
    DatabaseSwitch {
        public_schema: String,
        default_database: String,
    },
}

impl SessionStrategy {
    pub fn engine(&self) -> Engine {
        match self {
            Self::SearchPath { .. } => Engine::Postgres,
            Self::DatabaseSwitch { .. } => Engine::MySql,
        }
    }

    /// Ordered schemas the search path should hold for `state`.
    pub fn search_path(&self, state: &TenantState) -> Vec<String> {
        match self {
            Self::SearchPath {
                public_schema,
                extra_schemas,
            } => {
                let mut path = Vec::with_capacity(extra_schemas.len() + 2);
                if state.is_public() {
                    path.push(public_schema.clone());
                } else if state.include_public() {
                    path.push(state.current_schema().to_string());
                    path.push(public_schema.clone());
                } else {
                    return vec![state.current_schema().to_string()];
                }
                path.extend(extra_schemas.iter().cloned());
                path
            }
            Self::DatabaseSwitch { .. } => vec![self.target_database(state).to_string()],
        }
    }

    /// `SET search_path = ...` for the state, every name validated and quoted.
    pub fn search_path_statement(&self, state: &TenantState) -> Result<String> {
        let engine = self.engine();
        let path = self.search_path(state);
        let mut quoted = Vec::with_capacity(path.len());
        for schema in &path {
            validate_schema_name(engine, schema)?;
            quoted.push(engine.quote_identifier(schema));
        }
        Ok(format!("SET search_path = {}", quoted.join(", ")))
    }

    /// Database a MySQL connection must have selected for the state.
    pub fn target_database<'a>(&'a self, state: &'a TenantState) -> &'a str {
        match self {
            Self::DatabaseSwitch {
                default_database, ..
            } if state.is_public() => default_database,
            _ => state.current_schema(),
        }
    }

    /// `USE <db>` when the target differs from `selected`, otherwise nothing.
    pub fn use_statement(&self, state: &TenantState, selected: Option<&str>) -> Result<Option<String>> {
        let target = self.target_database(state);
        if selected == Some(target) {
            return Ok(None);
        }
        validate_schema_name(Engine::MySql, target)?;
        Ok(Some(format!("USE {}", Engine::MySql.quote_identifier(target))))
    }

    pub fn public_schema(&self) -> &str {
        match self {
            Self::SearchPath { public_schema, .. } => public_schema,
            Self::DatabaseSwitch { public_schema, .. } => public_schema,
        }
    }
}
