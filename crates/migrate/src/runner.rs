//! Migrates one schema at a time.

use crate::error::{MigrationError, Result};
use crate::progress::Progress;
use crate::set::{MigrationSet, MigrationTarget};
use async_trait::async_trait;
use schemata_database::{
    Database, DatabaseError, EventBus, PgTenantSession, SchemaEvent, SchemaSync, SessionSettings,
};
use sqlx::migrate::{Migrate, Migrator};
use sqlx::PgConnection;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

/// Options shared by every schema of a run.
#[derive(Debug, Clone, Copy, Default)]
pub struct MigrateOptions {
    /// Record migrations as applied without running them
    pub fake: bool,
    /// Run the `syncdb` scripts before migrating
    pub run_syncdb: bool,
}

#[async_trait]
pub trait SchemaMigrator: Send + Sync {
    async fn migrate_schema(&self, target: &MigrationTarget, progress: Progress) -> Result<()>;
}

/// Runs the sqlx migrators of a [`MigrationSet`] inside each schema.
///
/// Every schema gets its own pooled connection, scoped to that schema alone
/// so the unqualified `_sqlx_migrations` table resolves inside it.
pub struct SqlxSchemaMigrator {
    database: Database,
    settings: SessionSettings,
    set: Arc<MigrationSet>,
    options: MigrateOptions,
    events: EventBus,
}

impl SqlxSchemaMigrator {
    pub fn new(database: Database, settings: SessionSettings, set: Arc<MigrationSet>) -> Self {
        Self {
            database,
            settings,
            set,
            options: MigrateOptions::default(),
            events: EventBus::new(),
        }
    }

    pub fn with_options(mut self, options: MigrateOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    async fn apply(&self, session: &mut PgTenantSession, target: &MigrationTarget) -> Result<()> {
        let conn = session.pg().await?;
        conn.ensure_migrations_table().await?;

        if self.options.run_syncdb {
            for script in self.set.syncdb() {
                tracing::debug!(schema = %target.schema_name, script = %script.name, "Running sync script");
                sqlx::Executor::execute(&mut *conn, sqlx::raw_sql(&script.sql)).await?;
            }
        }

        for migrator in self
            .set
            .for_target(target, self.settings.public_schema())
        {
            if self.options.fake {
                fake_apply(&mut *conn, migrator).await?;
            } else {
                migrator.run_direct(&mut *conn).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SchemaMigrator for SqlxSchemaMigrator {
    async fn migrate_schema(&self, target: &MigrationTarget, progress: Progress) -> Result<()> {
        let started = Instant::now();
        let mut session = self
            .database
            .session(&self.settings)
            .await
            .map_err(|e| MigrationError::schema_failed(&target.schema_name, progress, e))?;
        session.set_schema(target.schema_name.clone(), false, target.tenant_type.clone());

        let outcome = self.apply(&mut session, target).await;

        if let Err(e) = session.release().await {
            tracing::warn!(schema = %target.schema_name, error = %e, "Failed to reset connection to public");
        }
        outcome.map_err(|e| MigrationError::schema_failed(&target.schema_name, progress, e))?;

        tracing::info!(
            schema = %target.schema_name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "{} Migrated",
            progress
        );
        self.events.publish(SchemaEvent::SchemaMigrated {
            schema_name: target.schema_name.clone(),
        });
        Ok(())
    }
}

#[async_trait]
impl SchemaSync for SqlxSchemaMigrator {
    async fn sync_schema(
        &self,
        schema_name: &str,
        tenant_type: Option<&str>,
    ) -> schemata_database::Result<()> {
        let target = MigrationTarget::new(schema_name).with_tenant_type(tenant_type.map(str::to_string));
        self.migrate_schema(&target, Progress::new(1, 1))
            .await
            .map_err(|e| DatabaseError::SchemaSync {
                schema: schema_name.to_string(),
                message: e.to_string(),
            })
    }
}

/// Record every pending migration as applied without executing it.
async fn fake_apply(conn: &mut PgConnection, migrator: &Migrator) -> Result<()> {
    let applied: HashSet<i64> = conn
        .list_applied_migrations()
        .await?
        .into_iter()
        .map(|m| m.version)
        .collect();

    for migration in migrator.iter() {
        if migration.migration_type.is_down_migration() || applied.contains(&migration.version) {
            continue;
        }
        sqlx::query(
            r#"
            INSERT INTO _sqlx_migrations (version, description, success, checksum, execution_time)
            VALUES ($1, $2, TRUE, $3, -1)
            "#,
        )
        .bind(migration.version)
        .bind(&*migration.description)
        .bind(&*migration.checksum)
        .execute(&mut *conn)
        .await?;
        tracing::debug!(version = migration.version, "Faked migration {}", migration.description);
    }
    Ok(())
}
