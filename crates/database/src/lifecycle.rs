//! Physical schema operations.
//!
//! Every statement here embeds a schema name, so each name is validated and
//! quoted before it is formatted into SQL.

use crate::error::{DatabaseError, Result};
use crate::session::{SessionConnection, TenantSession};
use schemata_models::{validate_schema_name, Engine};

const CLONE_FUNCTION_SQL: &str = include_str!("../sql/clone_schema.sql");
const CLONE_FUNCTION_PLACEHOLDER: &str = "__PUBLIC_SCHEMA__";

const PG_SCHEMA_EXISTS: &str =
    "SELECT EXISTS(SELECT 1 FROM pg_catalog.pg_namespace WHERE lower(nspname) = lower($1))";
const MYSQL_SCHEMA_EXISTS: &str =
    "SELECT EXISTS(SELECT 1 FROM information_schema.SCHEMATA WHERE lower(SCHEMA_NAME) = lower(?))";
const PG_CLONE_FUNCTION_EXISTS: &str = "SELECT EXISTS(
    SELECT 1 FROM pg_catalog.pg_proc p
    JOIN pg_catalog.pg_namespace n ON n.oid = p.pronamespace
    WHERE p.proname = 'clone_schema' AND n.nspname = $1
)";

#[derive(Debug, Clone)]
pub struct SchemaManager {
    engine: Engine,
    public_schema: String,
}

impl SchemaManager {
    pub fn new(engine: Engine, public_schema: impl Into<String>) -> Self {
        Self {
            engine,
            public_schema: public_schema.into(),
        }
    }

    pub fn engine(&self) -> Engine {
        self.engine
    }

    pub fn public_schema(&self) -> &str {
        &self.public_schema
    }

    fn quoted(&self, schema_name: &str) -> Result<String> {
        validate_schema_name(self.engine, schema_name)?;
        Ok(self.engine.quote_identifier(schema_name))
    }

    fn ensure_public<C>(&self, session: &mut TenantSession<C>) {
        if !session.state().is_public() {
            session.set_schema_to_public();
        }
    }

    fn unsupported(&self, operation: &str) -> DatabaseError {
        DatabaseError::Unsupported {
            engine: self.engine.to_string(),
            operation: operation.to_string(),
        }
    }

    /// Case-insensitive catalog lookup.
    pub async fn schema_exists<C: SessionConnection>(
        &self,
        session: &mut TenantSession<C>,
        schema_name: &str,
    ) -> Result<bool> {
        let sql = match self.engine {
            Engine::Postgres => PG_SCHEMA_EXISTS,
            Engine::MySql => MYSQL_SCHEMA_EXISTS,
        };
        let exists = session.cursor().await?.query_flag(sql, schema_name).await?;
        Ok(exists)
    }

    pub fn create_statement(&self, schema_name: &str) -> Result<String> {
        let quoted = self.quoted(schema_name)?;
        Ok(match self.engine {
            Engine::Postgres => format!("CREATE SCHEMA {}", quoted),
            Engine::MySql => format!("CREATE DATABASE {}", quoted),
        })
    }

    pub fn drop_statement(&self, schema_name: &str) -> Result<String> {
        let quoted = self.quoted(schema_name)?;
        Ok(match self.engine {
            Engine::Postgres => format!("DROP SCHEMA IF EXISTS {} CASCADE", quoted),
            Engine::MySql => format!("DROP DATABASE IF EXISTS {}", quoted),
        })
    }

    pub fn rename_statement(&self, from: &str, to: &str) -> Result<String> {
        let from = self.quoted(from)?;
        let to = self.quoted(to)?;
        match self.engine {
            Engine::Postgres => Ok(format!("ALTER SCHEMA {} RENAME TO {}", from, to)),
            Engine::MySql => Err(self.unsupported("rename schema")),
        }
    }

    /// Create an empty schema from public scope.
    pub async fn create_schema<C: SessionConnection>(
        &self,
        session: &mut TenantSession<C>,
        schema_name: &str,
    ) -> Result<()> {
        let statement = self.create_statement(schema_name)?;
        self.ensure_public(session);

        if self.schema_exists(session, schema_name).await? {
            return Err(DatabaseError::schema_exists(schema_name));
        }

        session.cursor().await?.run_statement(&statement).await?;
        tracing::info!(schema = %schema_name, "Schema created");
        Ok(())
    }

    /// Drop a schema and everything in it.
    ///
    /// Only allowed while the session is scoped to that schema or to public;
    /// the session ends up scoped to public.
    pub async fn drop_schema<C: SessionConnection>(
        &self,
        session: &mut TenantSession<C>,
        schema_name: &str,
    ) -> Result<()> {
        if schema_name.eq_ignore_ascii_case(&self.public_schema) {
            return Err(DatabaseError::InvalidInput(format!(
                "refusing to drop the public schema '{}'",
                schema_name
            )));
        }
        let statement = self.drop_statement(schema_name)?;

        let current = session.current_schema();
        if current != schema_name && !current.eq_ignore_ascii_case(&self.public_schema) {
            return Err(DatabaseError::CrossTenantViolation(format!(
                "cannot drop schema '{}' while scoped to '{}'",
                schema_name, current
            )));
        }

        self.ensure_public(session);
        session.cursor().await?.run_statement(&statement).await?;
        tracing::info!(schema = %schema_name, "Schema dropped");
        Ok(())
    }

    /// Check a rename can go ahead: source present, destination free.
    pub async fn check_rename<C: SessionConnection>(
        &self,
        session: &mut TenantSession<C>,
        from: &str,
        to: &str,
    ) -> Result<String> {
        let statement = self.rename_statement(from, to)?;
        self.ensure_public(session);

        if self.schema_exists(session, to).await? {
            return Err(DatabaseError::schema_exists(to));
        }
        if !self.schema_exists(session, from).await? {
            return Err(DatabaseError::not_found("Schema", from));
        }
        Ok(statement)
    }

    /// Install `clone_schema` into public unless it is already there.
    pub async fn install_clone_function<C: SessionConnection>(
        &self,
        session: &mut TenantSession<C>,
    ) -> Result<()> {
        if self.engine != Engine::Postgres {
            return Err(self.unsupported("clone schema"));
        }
        let public = self.quoted(&self.public_schema)?;
        self.ensure_public(session);

        let conn = session.cursor().await?;
        if conn
            .query_flag(PG_CLONE_FUNCTION_EXISTS, &self.public_schema)
            .await?
        {
            return Ok(());
        }

        let sql = CLONE_FUNCTION_SQL.replace(CLONE_FUNCTION_PLACEHOLDER, &public);
        conn.run_statement(&sql).await?;
        tracing::info!(schema = %self.public_schema, "Installed clone_schema function");
        Ok(())
    }

    /// Copy `source` into a new schema `dest`, optionally with its rows.
    pub async fn clone_schema<C: SessionConnection>(
        &self,
        session: &mut TenantSession<C>,
        source: &str,
        dest: &str,
        include_rows: bool,
    ) -> Result<()> {
        if self.engine != Engine::Postgres {
            return Err(self.unsupported("clone schema"));
        }
        self.quoted(source)?;
        self.quoted(dest)?;
        let public = self.quoted(&self.public_schema)?;
        self.ensure_public(session);

        if self.schema_exists(session, dest).await? {
            return Err(DatabaseError::schema_exists(dest));
        }
        if !self.schema_exists(session, source).await? {
            return Err(DatabaseError::not_found("Schema", source));
        }

        self.install_clone_function(session).await?;

        // Validated names cannot contain quotes, so they are safe as literals
        let sql = format!(
            "SELECT {}.clone_schema('{}', '{}', {})",
            public, source, dest, include_rows
        );
        session.cursor().await?.run_statement(&sql).await?;
        tracing::info!(source = %source, schema = %dest, include_rows, "Schema cloned");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TenancyConfig;
    use crate::session::testing::RecordingConnection;
    use crate::session::SessionSettings;

    fn session(existing: &[&str]) -> TenantSession<RecordingConnection> {
        TenantSession::new(
            RecordingConnection::with_existing(existing),
            &SessionSettings::default(),
        )
    }

    fn manager() -> SchemaManager {
        SchemaManager::new(Engine::Postgres, "public")
    }

    #[test]
    fn test_statements() {
        let pg = manager();
        assert_eq!(pg.create_statement("north").unwrap(), "CREATE SCHEMA \"north\"");
        assert_eq!(
            pg.drop_statement("north").unwrap(),
            "DROP SCHEMA IF EXISTS \"north\" CASCADE"
        );
        assert_eq!(
            pg.rename_statement("north", "north_v2").unwrap(),
            "ALTER SCHEMA \"north\" RENAME TO \"north_v2\""
        );
        assert!(pg.create_statement("pg_north").is_err());

        let mysql = SchemaManager::new(Engine::MySql, "public");
        assert_eq!(mysql.create_statement("shop").unwrap(), "CREATE DATABASE `shop`");
        assert!(matches!(
            mysql.rename_statement("a", "b"),
            Err(DatabaseError::Unsupported { .. })
        ));
    }

    #[tokio::test]
    async fn test_create_refuses_existing_schema() {
        let mut session = session(&["North"]);
        let err = manager().create_schema(&mut session, "north").await.unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[tokio::test]
    async fn test_create_switches_to_public() {
        let mut session = session(&[]);
        session.set_schema("south", false, None);
        manager().create_schema(&mut session, "north").await.unwrap();
        assert_eq!(session.current_schema(), "public");
        let conn = session.into_inner();
        assert_eq!(
            conn.statements,
            vec!["SET search_path = \"public\"", "CREATE SCHEMA \"north\""]
        );
    }

    #[tokio::test]
    async fn test_drop_rejects_other_tenant_scope() {
        let mut session = session(&["north", "south"]);
        session.set_schema("south", true, None);
        let err = manager().drop_schema(&mut session, "north").await.unwrap_err();
        assert!(matches!(err, DatabaseError::CrossTenantViolation(_)));
    }

    #[tokio::test]
    async fn test_drop_from_own_scope() {
        let mut session = session(&["north"]);
        session.set_schema("north", true, None);
        manager().drop_schema(&mut session, "north").await.unwrap();
        assert_eq!(session.current_schema(), "public");

        let err = manager().drop_schema(&mut session, "public").await.unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_check_rename() {
        let mut session = session(&["north", "south"]);
        let m = manager();
        assert!(m.check_rename(&mut session, "north", "south").await.is_err());
        assert!(matches!(
            m.check_rename(&mut session, "east", "west").await,
            Err(DatabaseError::NotFound(_))
        ));
        assert!(m.check_rename(&mut session, "north", "west").await.is_ok());
        assert!(m.check_rename(&mut session, "north", "1west").await.is_err());
    }

    #[tokio::test]
    async fn test_clone_installs_function_once() {
        let mut session = session(&["template"]);
        manager()
            .clone_schema(&mut session, "template", "north", false)
            .await
            .unwrap();
        let conn = session.into_inner();
        assert!(conn.statements[1].contains("CREATE OR REPLACE FUNCTION \"public\".clone_schema"));
        assert_eq!(
            conn.statements.last().map(String::as_str),
            Some("SELECT \"public\".clone_schema('template', 'north', false)")
        );
    }

    #[tokio::test]
    async fn test_clone_unsupported_on_mysql() {
        let settings = SessionSettings::from_config(&TenancyConfig {
            engine: Engine::MySql,
            default_database: Some("app".to_string()),
            ..Default::default()
        });
        let mut session = TenantSession::new(RecordingConnection::default(), &settings);
        let err = SchemaManager::new(Engine::MySql, "public")
            .clone_schema(&mut session, "template", "north", false)
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Unsupported { .. }));
    }
}
