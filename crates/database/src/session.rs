//! Tenant-aware sessions.
//!
//! A [`TenantSession`] owns one physical connection and its [`TenantState`].
//! Switch calls only touch the state; the search path (or selected database)
//! is applied lazily when the connection is handed out through
//! [`TenantSession::cursor`].

use crate::config::TenancyConfig;
use crate::error::{is_aborted_transaction, Result};
use crate::state::TenantState;
use crate::strategy::SessionStrategy;
use async_trait::async_trait;
use schemata_models::{Engine, Tenant};
use sqlx::pool::PoolConnection;
use sqlx::{MySql, MySqlConnection, PgConnection, Postgres};
use std::ops::{Deref, DerefMut};

/// The narrow slice of a driver connection the session layer needs.
#[async_trait]
pub trait SessionConnection: Send {
    /// Execute one statement without parameters.
    async fn run_statement(&mut self, sql: &str) -> std::result::Result<(), sqlx::Error>;

    /// Evaluate a single-row boolean query with one text parameter.
    async fn query_flag(&mut self, sql: &str, arg: &str) -> std::result::Result<bool, sqlx::Error>;
}

#[async_trait]
impl SessionConnection for PgConnection {
    async fn run_statement(&mut self, sql: &str) -> std::result::Result<(), sqlx::Error> {
        sqlx::Executor::execute(&mut *self, sqlx::raw_sql(sql)).await?;
        Ok(())
    }

    async fn query_flag(&mut self, sql: &str, arg: &str) -> std::result::Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(sql)
            .bind(arg.to_owned())
            .fetch_one(&mut *self)
            .await
    }
}

#[async_trait]
impl SessionConnection for PoolConnection<Postgres> {
    async fn run_statement(&mut self, sql: &str) -> std::result::Result<(), sqlx::Error> {
        (**self).run_statement(sql).await
    }

    async fn query_flag(&mut self, sql: &str, arg: &str) -> std::result::Result<bool, sqlx::Error> {
        (**self).query_flag(sql, arg).await
    }
}

#[async_trait]
impl SessionConnection for MySqlConnection {
    async fn run_statement(&mut self, sql: &str) -> std::result::Result<(), sqlx::Error> {
        sqlx::Executor::execute(&mut *self, sqlx::raw_sql(sql)).await?;
        Ok(())
    }

    async fn query_flag(&mut self, sql: &str, arg: &str) -> std::result::Result<bool, sqlx::Error> {
        // MySQL has no boolean type; EXISTS comes back as an integer
        let flag = sqlx::query_scalar::<_, i64>(sql)
            .bind(arg.to_owned())
            .fetch_one(&mut *self)
            .await?;
        Ok(flag != 0)
    }
}

#[async_trait]
impl SessionConnection for PoolConnection<MySql> {
    async fn run_statement(&mut self, sql: &str) -> std::result::Result<(), sqlx::Error> {
        (**self).run_statement(sql).await
    }

    async fn query_flag(&mut self, sql: &str, arg: &str) -> std::result::Result<bool, sqlx::Error> {
        (**self).query_flag(sql, arg).await
    }
}

/// How sessions apply state, shared by every session of a process.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub strategy: SessionStrategy,
    /// Skip re-applying an unchanged state on every cursor
    pub limit_set_calls: bool,
}

impl SessionSettings {
    pub fn from_config(config: &TenancyConfig) -> Self {
        let strategy = match config.engine {
            Engine::Postgres => SessionStrategy::SearchPath {
                public_schema: config.public_schema.clone(),
                extra_schemas: config.extra_search_paths.clone(),
            },
            Engine::MySql => SessionStrategy::DatabaseSwitch {
                public_schema: config.public_schema.clone(),
                default_database: config
                    .default_database
                    .clone()
                    .unwrap_or_else(|| config.public_schema.clone()),
            },
        };

        Self {
            strategy,
            limit_set_calls: config.limit_set_calls,
        }
    }

    pub fn public_schema(&self) -> &str {
        self.strategy.public_schema()
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&TenancyConfig::default())
    }
}

pub struct TenantSession<C> {
    conn: C,
    state: TenantState,
    strategy: SessionStrategy,
    limit_set_calls: bool,
    /// Database last selected with `USE`; unknown for a fresh connection
    selected_database: Option<String>,
}

pub type PgTenantSession = TenantSession<PoolConnection<Postgres>>;
pub type MySqlTenantSession = TenantSession<PoolConnection<MySql>>;

impl<C> TenantSession<C> {
    /// Wrap a connection. The state starts at public and unapplied.
    pub fn new(conn: C, settings: &SessionSettings) -> Self {
        Self {
            conn,
            state: TenantState::new(settings.public_schema()),
            strategy: settings.strategy.clone(),
            limit_set_calls: settings.limit_set_calls,
            selected_database: None,
        }
    }

    pub fn set_tenant(&mut self, tenant: Tenant, include_public: bool) {
        self.state.set_tenant(tenant, include_public);
    }

    pub fn set_schema(
        &mut self,
        schema_name: impl Into<String>,
        include_public: bool,
        tenant_type: Option<String>,
    ) {
        self.state.set_schema(schema_name, include_public, tenant_type);
    }

    pub fn set_schema_to_public(&mut self) {
        self.state.set_schema_to_public();
    }

    pub fn current_schema(&self) -> &str {
        self.state.current_schema()
    }

    pub fn state(&self) -> &TenantState {
        &self.state
    }

    pub fn strategy(&self) -> &SessionStrategy {
        &self.strategy
    }

    pub fn engine(&self) -> Engine {
        self.strategy.engine()
    }

    /// Switch to a tenant until the returned guard is dropped.
    pub fn scoped_tenant(&mut self, tenant: Tenant, include_public: bool) -> SchemaGuard<'_, C> {
        let previous = self.state.clone();
        self.state.set_tenant(tenant, include_public);
        SchemaGuard {
            session: self,
            previous: Some(previous),
        }
    }

    /// Switch to a schema until the returned guard is dropped.
    pub fn scoped_schema(
        &mut self,
        schema_name: impl Into<String>,
        include_public: bool,
    ) -> SchemaGuard<'_, C> {
        let previous = self.state.clone();
        self.state.set_schema(schema_name, include_public, None);
        SchemaGuard {
            session: self,
            previous: Some(previous),
        }
    }

    /// Give up the connection as is, without resetting its scope.
    pub fn into_inner(self) -> C {
        self.conn
    }

    fn restore(&mut self, mut previous: TenantState) {
        previous.mark_unapplied();
        self.state = previous;
    }
}

impl<C: SessionConnection> TenantSession<C> {
    /// Apply the logical state to the connection if needed.
    ///
    /// A statement rejected because the surrounding transaction already
    /// failed is swallowed: the state stays unapplied and the next cursor
    /// retries once the caller has rolled back.
    pub async fn materialize(&mut self) -> Result<()> {
        if self.state.is_applied() && self.limit_set_calls {
            return Ok(());
        }

        let statement = match &self.strategy {
            SessionStrategy::SearchPath { .. } => {
                Some(self.strategy.search_path_statement(&self.state)?)
            }
            SessionStrategy::DatabaseSwitch { .. } => self
                .strategy
                .use_statement(&self.state, self.selected_database.as_deref())?,
        };

        if let Some(sql) = statement {
            match self.conn.run_statement(&sql).await {
                Ok(()) => {
                    tracing::debug!(schema = %self.state.current_schema(), "{}", sql);
                    if let SessionStrategy::DatabaseSwitch { .. } = self.strategy {
                        self.selected_database =
                            Some(self.strategy.target_database(&self.state).to_string());
                    }
                }
                Err(err) if is_aborted_transaction(&err) => {
                    tracing::debug!(
                        schema = %self.state.current_schema(),
                        "Transaction aborted, deferring scope change"
                    );
                    self.state.mark_unapplied();
                    return Ok(());
                }
                Err(err) => return Err(err.into()),
            }
        }

        self.state.mark_applied();
        Ok(())
    }

    /// Materialize the state and hand out the connection.
    pub async fn cursor(&mut self) -> Result<&mut C> {
        self.materialize().await?;
        Ok(&mut self.conn)
    }

    /// Reset to public, apply it and give the connection back.
    pub async fn release(mut self) -> Result<C> {
        self.state.set_schema_to_public();
        self.materialize().await?;
        Ok(self.conn)
    }
}

impl TenantSession<PoolConnection<Postgres>> {
    /// Materialize and borrow the underlying `PgConnection` for sqlx queries.
    pub async fn pg(&mut self) -> Result<&mut PgConnection> {
        let conn = self.cursor().await?;
        Ok(&mut **conn)
    }
}

/// Scoped switch that puts the previous scope back when dropped.
///
/// The restored state is unapplied, so the next cursor re-issues the
/// statement for it.
pub struct SchemaGuard<'a, C> {
    session: &'a mut TenantSession<C>,
    previous: Option<TenantState>,
}

impl<C> Deref for SchemaGuard<'_, C> {
    type Target = TenantSession<C>;

    fn deref(&self) -> &Self::Target {
        self.session
    }
}

impl<C> DerefMut for SchemaGuard<'_, C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session
    }
}

impl<C> Drop for SchemaGuard<'_, C> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            self.session.restore(previous);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingConnection;
    use super::*;
    use crate::error::DatabaseError;

    fn settings() -> SessionSettings {
        SessionSettings::from_config(&TenancyConfig {
            extra_search_paths: vec!["extensions".to_string()],
            ..Default::default()
        })
    }

    fn session() -> TenantSession<RecordingConnection> {
        TenantSession::new(RecordingConnection::default(), &settings())
    }

    fn tenant(schema: &str) -> Tenant {
        Tenant {
            id: uuid::Uuid::new_v4(),
            schema_name: schema.to_string(),
            name: schema.to_uppercase(),
            tenant_type: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_fresh_session_applies_public() {
        let mut session = session();
        session.cursor().await.unwrap();
        assert_eq!(
            session.conn.statements,
            vec!["SET search_path = \"public\", \"extensions\""]
        );
    }

    #[tokio::test]
    async fn test_limit_set_calls_skips_unchanged_state() {
        let mut session = session();
        session.set_schema("north", true, None);
        session.cursor().await.unwrap();
        session.cursor().await.unwrap();
        assert_eq!(session.conn.statements.len(), 1);

        session.set_schema("north", true, None);
        session.cursor().await.unwrap();
        assert_eq!(session.conn.statements.len(), 2);
    }

    #[tokio::test]
    async fn test_without_limit_every_cursor_applies() {
        let settings = SessionSettings {
            limit_set_calls: false,
            ..settings()
        };
        let mut session = TenantSession::new(RecordingConnection::default(), &settings);
        session.cursor().await.unwrap();
        session.cursor().await.unwrap();
        assert_eq!(session.conn.statements.len(), 2);
    }

    #[tokio::test]
    async fn test_only_latest_switch_is_applied() {
        let mut session = session();
        session.set_schema("north", true, None);
        session.set_schema("south", false, None);
        session.cursor().await.unwrap();
        assert_eq!(session.conn.statements, vec!["SET search_path = \"south\""]);
    }

    #[tokio::test]
    async fn test_aborted_transaction_is_swallowed() {
        let mut session = session();
        session.set_schema("north", true, None);
        session.conn.failures.push_back("25P02".to_string());

        assert!(session.cursor().await.is_ok());
        assert!(!session.state().is_applied());

        session.cursor().await.unwrap();
        assert!(session.state().is_applied());
        assert_eq!(
            session.conn.statements,
            vec!["SET search_path = \"north\", \"public\", \"extensions\""]
        );
    }

    #[tokio::test]
    async fn test_other_errors_propagate() {
        let mut session = session();
        session.conn.failures.push_back("3F000".to_string());
        let err = session.cursor().await.unwrap_err();
        assert!(matches!(err, DatabaseError::ConnectionError(_)));
        assert!(!session.state().is_applied());
    }

    #[tokio::test]
    async fn test_invalid_schema_never_executes() {
        let mut session = session();
        session.set_schema("bad name", true, None);
        let err = session.cursor().await.unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidSchemaName(_)));
        assert!(session.conn.statements.is_empty());
    }

    #[tokio::test]
    async fn test_guard_restores_previous_scope() {
        let mut session = session();
        session.set_schema("north", true, None);
        session.cursor().await.unwrap();

        {
            let mut guard = session.scoped_schema("south", false);
            assert_eq!(guard.current_schema(), "south");
            guard.cursor().await.unwrap();
        }

        assert_eq!(session.current_schema(), "north");
        assert!(!session.state().is_applied());
        session.cursor().await.unwrap();
        assert_eq!(
            session.conn.statements.last().map(String::as_str),
            Some("SET search_path = \"north\", \"public\", \"extensions\"")
        );
    }

    #[tokio::test]
    async fn test_tenant_guard_restores_public() {
        let mut session = session();
        let north = tenant("north");

        {
            let mut guard = session.scoped_tenant(north.clone(), false);
            assert_eq!(guard.state().tenant().tenant(), Some(&north));
            guard.cursor().await.unwrap();
        }

        assert!(session.state().is_public());
        assert!(session.state().tenant().tenant().is_none());
        session.cursor().await.unwrap();
        assert_eq!(
            session.conn.statements,
            vec![
                "SET search_path = \"north\"",
                "SET search_path = \"public\", \"extensions\"",
            ]
        );
    }

    #[tokio::test]
    async fn test_switching_back_to_a_tenant_matches_first_switch() {
        let mut direct = session();
        direct.set_tenant(tenant("north"), true);
        direct.cursor().await.unwrap();

        let mut session = session();
        session.set_tenant(tenant("north"), true);
        session.cursor().await.unwrap();
        session.set_schema_to_public();
        session.cursor().await.unwrap();
        session.set_tenant(tenant("north"), true);
        session.cursor().await.unwrap();

        assert_eq!(session.conn.statements.len(), 3);
        assert_eq!(session.conn.statements.last(), direct.conn.statements.last());
        assert_eq!(session.conn.statements[0], session.conn.statements[2]);
        assert_eq!(session.current_schema(), "north");
    }

    #[tokio::test]
    async fn test_release_resets_to_public() {
        let mut session = session();
        session.set_schema("north", false, None);
        session.cursor().await.unwrap();

        let conn = session.release().await.unwrap();
        assert_eq!(
            conn.statements.last().map(String::as_str),
            Some("SET search_path = \"public\", \"extensions\"")
        );
    }

    #[tokio::test]
    async fn test_database_switch_tracks_selected_database() {
        let settings = SessionSettings::from_config(&TenancyConfig {
            engine: Engine::MySql,
            default_database: Some("app".to_string()),
            ..Default::default()
        });
        let mut session = TenantSession::new(RecordingConnection::default(), &settings);

        session.cursor().await.unwrap();
        session.set_schema("shop_eu", true, None);
        session.cursor().await.unwrap();
        session.set_schema("shop_eu", false, None);
        session.cursor().await.unwrap();
        session.set_schema_to_public();
        session.cursor().await.unwrap();

        assert_eq!(
            session.conn.statements,
            vec!["USE `app`", "USE `shop_eu`", "USE `app`"]
        );
    }
}
