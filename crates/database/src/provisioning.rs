//! Tenant provisioning: the registry rows and the schemas behind them.

use crate::config::TenancyConfig;
use crate::error::{DatabaseError, Result};
use crate::events::{EventBus, SchemaEvent};
use crate::lifecycle::SchemaManager;
use crate::repositories::{DomainRepository, TenantRepository};
use crate::session::{PgTenantSession, SessionConnection, TenantSession};
use crate::sync::SchemaSync;
use schemata_models::{validate_schema_name, Domain, NewDomain, NewTenant, Tenant};
use sqlx::Connection;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

pub struct TenantService {
    config: Arc<TenancyConfig>,
    manager: SchemaManager,
    events: EventBus,
    sync: Option<Arc<dyn SchemaSync>>,
}

impl TenantService {
    pub fn new(config: Arc<TenancyConfig>) -> Self {
        let manager = SchemaManager::new(config.engine, config.public_schema.clone());
        Self {
            config,
            manager,
            events: EventBus::new(),
            sync: None,
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Sync new schemas with this instead of only announcing them.
    pub fn with_sync(mut self, sync: Arc<dyn SchemaSync>) -> Self {
        self.sync = Some(sync);
        self
    }

    pub fn config(&self) -> &TenancyConfig {
        &self.config
    }

    pub fn manager(&self) -> &SchemaManager {
        &self.manager
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Tenant rows may only be touched from their own scope or from public.
    pub fn ensure_scope<C>(&self, session: &TenantSession<C>, schema_name: &str) -> Result<()> {
        let current = session.current_schema();
        if current == schema_name || self.config.is_public(current) {
            return Ok(());
        }
        Err(DatabaseError::CrossTenantViolation(format!(
            "tenant '{}' cannot be modified while scoped to '{}'",
            schema_name, current
        )))
    }

    fn check_new_tenant(&self, request: &NewTenant, domain: Option<&NewDomain>) -> Result<()> {
        validate_schema_name(self.config.engine, &request.schema_name)?;
        request.validate()?;
        if self.config.is_public(&request.schema_name) {
            return Err(DatabaseError::InvalidInput(format!(
                "'{}' is the public schema and cannot belong to a tenant",
                request.schema_name
            )));
        }
        self.config.check_tenant_type(request.tenant_type.as_deref())?;
        if let Some(domain) = domain {
            domain.validate()?;
        }
        Ok(())
    }

    /// Register a tenant and provision its schema.
    ///
    /// If anything fails after the row is inserted, the row and the schema
    /// are removed on a best-effort basis and the original error is returned.
    pub async fn create_tenant(
        &self,
        session: &mut PgTenantSession,
        request: NewTenant,
        domain: Option<NewDomain>,
    ) -> Result<Tenant> {
        self.check_new_tenant(&request, domain.as_ref())?;
        self.ensure_scope(session, &request.schema_name)?;
        session.set_schema_to_public();

        if self.manager.schema_exists(session, &request.schema_name).await? {
            return Err(DatabaseError::schema_exists(&request.schema_name));
        }

        let tenant = TenantRepository::create(session.pg().await?, &request).await?;
        tracing::info!(schema = %tenant.schema_name, tenant_id = %tenant.id, "Tenant registered");

        let provisioned = async {
            if let Some(domain) = &domain {
                DomainRepository::save(session.pg().await?, tenant.id, domain).await?;
            }
            if self.config.auto_create_schema {
                self.provision_schema(session, &tenant.schema_name, tenant.tenant_type.as_deref())
                    .await?;
            }
            Ok::<(), DatabaseError>(())
        }
        .await;

        if let Err(err) = provisioned {
            tracing::error!(schema = %tenant.schema_name, error = %err, "Provisioning failed");
            self.rollback_tenant(session, &tenant).await;
            return Err(err);
        }

        Ok(tenant)
    }

    /// Create the schema for a registered tenant, by cloning the reference
    /// schema when one is configured or by creating it empty and syncing it.
    pub async fn provision_schema(
        &self,
        session: &mut PgTenantSession,
        schema_name: &str,
        tenant_type: Option<&str>,
    ) -> Result<()> {
        if let Some(reference) = &self.config.clone_reference {
            self.manager
                .clone_schema(session, reference, schema_name, false)
                .await?;
            self.events.publish(SchemaEvent::SchemaCloned {
                source: reference.clone(),
                target: schema_name.to_string(),
            });
            return Ok(());
        }

        self.manager.create_schema(session, schema_name).await?;
        self.events.publish(SchemaEvent::SchemaCreated {
            schema_name: schema_name.to_string(),
        });

        match &self.sync {
            Some(sync) => sync.sync_schema(schema_name, tenant_type).await?,
            None => self.events.publish(SchemaEvent::SchemaNeedsSync {
                schema_name: schema_name.to_string(),
            }),
        }
        Ok(())
    }

    async fn rollback_tenant(&self, session: &mut PgTenantSession, tenant: &Tenant) {
        session.set_schema_to_public();

        if let Err(e) = self.delete_row(session, tenant.id).await {
            tracing::warn!(schema = %tenant.schema_name, error = %e, "Failed to remove tenant row after provisioning error");
        }
        if let Err(e) = self.manager.drop_schema(session, &tenant.schema_name).await {
            tracing::warn!(schema = %tenant.schema_name, error = %e, "Failed to drop schema after provisioning error");
        }
    }

    async fn delete_row(&self, session: &mut PgTenantSession, id: Uuid) -> Result<()> {
        TenantRepository::delete(session.pg().await?, id).await
    }

    /// Delete a tenant row. The schema is dropped only when asked to, or when
    /// `auto_drop_schema` is set.
    pub async fn delete_tenant(
        &self,
        session: &mut PgTenantSession,
        schema_name: &str,
        force_drop: bool,
    ) -> Result<Tenant> {
        self.ensure_scope(session, schema_name)?;
        session.set_schema_to_public();

        let tenant = TenantRepository::find_by_schema_name(session.pg().await?, schema_name).await?;
        TenantRepository::delete(session.pg().await?, tenant.id).await?;
        tracing::info!(schema = %schema_name, tenant_id = %tenant.id, "Tenant deleted");
        self.events.publish(SchemaEvent::TenantDeleted {
            schema_name: schema_name.to_string(),
        });

        if force_drop || self.config.auto_drop_schema {
            self.manager.drop_schema(session, schema_name).await?;
            self.events.publish(SchemaEvent::SchemaDropped {
                schema_name: schema_name.to_string(),
            });
        }

        Ok(tenant)
    }

    pub async fn add_domain(
        &self,
        session: &mut PgTenantSession,
        schema_name: &str,
        domain: NewDomain,
    ) -> Result<Domain> {
        domain.validate()?;
        self.ensure_scope(session, schema_name)?;
        session.set_schema_to_public();

        let tenant = TenantRepository::find_by_schema_name(session.pg().await?, schema_name).await?;
        let domain = DomainRepository::save(session.pg().await?, tenant.id, &domain).await?;
        tracing::info!(schema = %schema_name, domain = %domain.domain, primary = domain.is_primary, "Domain added");
        Ok(domain)
    }

    /// Remove a domain; its tenant is kept.
    pub async fn delete_domain(&self, session: &mut PgTenantSession, domain: &str) -> Result<Domain> {
        session.set_schema_to_public();
        let deleted = DomainRepository::delete(session.pg().await?, domain).await?;
        tracing::info!(domain = %deleted.domain, tenant_id = %deleted.tenant_id, "Domain deleted");
        Ok(deleted)
    }

    /// Rename a schema and the registry row pointing at it in one transaction.
    pub async fn rename_schema(
        &self,
        session: &mut PgTenantSession,
        from: &str,
        to: &str,
    ) -> Result<Option<Tenant>> {
        self.ensure_scope(session, from)?;
        if self.config.is_public(from) || self.config.is_public(to) {
            return Err(DatabaseError::InvalidInput(
                "the public schema cannot be renamed".to_string(),
            ));
        }
        let statement = self.manager.check_rename(session, from, to).await?;

        let conn = session.pg().await?;
        let tenant = TenantRepository::get_by_schema_name(&mut *conn, from).await?;

        let mut tx = conn.begin().await?;
        sqlx::raw_sql(&statement).execute(&mut *tx).await?;
        let renamed = match tenant {
            Some(tenant) => {
                Some(TenantRepository::update_schema_name(&mut *tx, tenant.id, to).await?)
            }
            None => None,
        };
        tx.commit().await?;

        tracing::info!(from = %from, to = %to, "Schema renamed");
        self.events.publish(SchemaEvent::SchemaRenamed {
            from: from.to_string(),
            to: to.to_string(),
        });
        Ok(renamed)
    }

    /// Register a tenant whose schema is a copy of `source`.
    pub async fn clone_tenant(
        &self,
        session: &mut PgTenantSession,
        source: &str,
        request: NewTenant,
        include_rows: bool,
        domain: Option<NewDomain>,
    ) -> Result<Tenant> {
        self.check_new_tenant(&request, domain.as_ref())?;
        validate_schema_name(self.config.engine, source)?;
        self.ensure_scope(session, &request.schema_name)?;
        session.set_schema_to_public();

        if self.manager.schema_exists(session, &request.schema_name).await? {
            return Err(DatabaseError::schema_exists(&request.schema_name));
        }

        let tenant = TenantRepository::create(session.pg().await?, &request).await?;

        let cloned = async {
            self.manager
                .clone_schema(session, source, &tenant.schema_name, include_rows)
                .await?;
            if let Some(domain) = &domain {
                DomainRepository::save(session.pg().await?, tenant.id, domain).await?;
            }
            Ok::<(), DatabaseError>(())
        }
        .await;

        if let Err(err) = cloned {
            tracing::error!(source = %source, schema = %tenant.schema_name, error = %err, "Clone failed");
            self.rollback_tenant(session, &tenant).await;
            return Err(err);
        }

        self.events.publish(SchemaEvent::SchemaCloned {
            source: source.to_string(),
            target: tenant.schema_name.clone(),
        });
        Ok(tenant)
    }

    /// Create the schema of every registered tenant that lacks one.
    ///
    /// Returns the schemas created; running it again creates nothing.
    pub async fn create_missing_schemas(&self, session: &mut PgTenantSession) -> Result<Vec<String>> {
        session.set_schema_to_public();
        let tenants = TenantRepository::list(session.pg().await?).await?;

        let mut created = Vec::new();
        for tenant in tenants {
            if self.manager.schema_exists(session, &tenant.schema_name).await? {
                continue;
            }
            tracing::info!(schema = %tenant.schema_name, "Creating missing schema");
            self.provision_schema(session, &tenant.schema_name, tenant.tenant_type.as_deref())
                .await?;
            created.push(tenant.schema_name);
        }

        Ok(created)
    }

    pub async fn schema_exists(&self, session: &mut PgTenantSession, schema_name: &str) -> Result<bool> {
        self.manager.schema_exists(session, schema_name).await
    }

    pub async fn get_tenant(&self, session: &mut PgTenantSession, schema_name: &str) -> Result<Tenant> {
        session.set_schema_to_public();
        TenantRepository::find_by_schema_name(session.pg().await?, schema_name).await
    }

    pub async fn list_tenants(&self, session: &mut PgTenantSession) -> Result<Vec<Tenant>> {
        session.set_schema_to_public();
        TenantRepository::list(session.pg().await?).await
    }

    pub async fn list_tenants_of_type(
        &self,
        session: &mut PgTenantSession,
        tenant_type: &str,
    ) -> Result<Vec<Tenant>> {
        session.set_schema_to_public();
        TenantRepository::list_by_type(session.pg().await?, tenant_type).await
    }

    pub async fn list_domains(&self, session: &mut PgTenantSession, tenant_id: Uuid) -> Result<Vec<Domain>> {
        session.set_schema_to_public();
        DomainRepository::list_for_tenant(session.pg().await?, tenant_id).await
    }

    /// Whether the registry tables have been created yet.
    pub async fn registry_exists(&self, session: &mut PgTenantSession) -> Result<bool> {
        session.set_schema_to_public();
        let conn = session.cursor().await?;
        let exists = conn
            .query_flag("SELECT to_regclass($1) IS NOT NULL", "tenants")
            .await?;
        Ok(exists)
    }

    /// Startup check: no extra search path may shadow a tenant schema.
    pub async fn check_extra_search_paths(&self, session: &mut PgTenantSession) -> Result<()> {
        if self.config.extra_search_paths.is_empty() {
            return Ok(());
        }
        let tenants = self.list_tenants(session).await?;
        for extra in &self.config.extra_search_paths {
            if let Some(tenant) = tenants
                .iter()
                .find(|t| t.schema_name.eq_ignore_ascii_case(extra))
            {
                return Err(DatabaseError::Configuration(format!(
                    "extra_search_paths entry '{}' is the schema of tenant '{}'",
                    extra, tenant.name
                )));
            }
        }
        Ok(())
    }
}
