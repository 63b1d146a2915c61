//! Tenant lookups against the registry, with a cache in front.

use async_trait::async_trait;
use moka::future::Cache;
use schemata_database::{
    Database, DomainRepository, PgTenantSession, Result, SessionSettings, TenantRepository,
};
use schemata_models::Tenant;
use std::time::Duration;

#[async_trait]
pub trait TenantLookup: Send + Sync {
    /// Tenant owning a normalized hostname (or subfolder token)
    async fn tenant_by_domain(&self, domain: &str) -> Result<Option<Tenant>>;

    async fn tenant_by_schema(&self, schema_name: &str) -> Result<Option<Tenant>>;
}

#[derive(Debug, Clone)]
pub struct LookupCacheConfig {
    /// Maximum number of cached entries per lookup kind
    pub max_entries: u64,
    /// How long a cached answer (including "no tenant") is trusted
    pub ttl: Duration,
}

impl Default for LookupCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            ttl: Duration::from_secs(60),
        }
    }
}

impl LookupCacheConfig {
    pub fn from_env() -> Self {
        Self {
            max_entries: std::env::var("TENANT_CACHE_MAX_ENTRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10_000),
            ttl: Duration::from_secs(
                std::env::var("TENANT_CACHE_TTL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(60),
            ),
        }
    }
}

/// Looks tenants up in the public registry tables.
///
/// Each lookup checks out its own session scoped to public, so a pooled
/// connection left on a tenant schema by someone else cannot skew it.
#[derive(Clone)]
pub struct RegistryLookup {
    database: Database,
    settings: SessionSettings,
    by_domain: Cache<String, Option<Tenant>>,
    by_schema: Cache<String, Option<Tenant>>,
}

impl RegistryLookup {
    pub fn new(database: Database, settings: SessionSettings, config: LookupCacheConfig) -> Self {
        let build = || {
            Cache::builder()
                .max_capacity(config.max_entries)
                .time_to_live(config.ttl)
                .build()
        };

        Self {
            database,
            settings,
            by_domain: build(),
            by_schema: build(),
        }
    }

    async fn public_session(&self) -> Result<PgTenantSession> {
        let mut session = self.database.session(&self.settings).await?;
        session.set_schema_to_public();
        Ok(session)
    }

    /// Forget what is cached for a domain, e.g. after it was added or deleted.
    pub async fn invalidate_domain(&self, domain: &str) {
        self.by_domain.invalidate(&domain.to_lowercase()).await;
    }

    pub async fn invalidate_schema(&self, schema_name: &str) {
        self.by_schema.invalidate(schema_name).await;
    }
}

#[async_trait]
impl TenantLookup for RegistryLookup {
    async fn tenant_by_domain(&self, domain: &str) -> Result<Option<Tenant>> {
        let key = domain.to_lowercase();
        if let Some(cached) = self.by_domain.get(&key).await {
            return Ok(cached);
        }

        let mut session = self.public_session().await?;
        let tenant = DomainRepository::find_tenant_by_domain(session.pg().await?, &key).await?;
        session.release().await?;

        self.by_domain.insert(key, tenant.clone()).await;
        Ok(tenant)
    }

    async fn tenant_by_schema(&self, schema_name: &str) -> Result<Option<Tenant>> {
        if let Some(cached) = self.by_schema.get(schema_name).await {
            return Ok(cached);
        }

        let mut session = self.public_session().await?;
        let tenant = TenantRepository::get_by_schema_name(session.pg().await?, schema_name).await?;
        session.release().await?;

        self.by_schema
            .insert(schema_name.to_string(), tenant.clone())
            .await;
        Ok(tenant)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;
    use uuid::Uuid;

    pub fn tenant(schema: &str) -> Tenant {
        Tenant {
            id: Uuid::new_v4(),
            schema_name: schema.to_string(),
            name: schema.to_uppercase(),
            tenant_type: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    /// In-memory registry: domain -> schema.
    #[derive(Default)]
    pub struct StaticLookup {
        pub domains: HashMap<String, String>,
        pub tenants: HashMap<String, Tenant>,
    }

    impl StaticLookup {
        pub fn with(entries: &[(&str, &str)]) -> Self {
            let mut lookup = Self::default();
            for (domain, schema) in entries {
                lookup.domains.insert(domain.to_string(), schema.to_string());
                lookup
                    .tenants
                    .entry(schema.to_string())
                    .or_insert_with(|| tenant(schema));
            }
            lookup
        }
    }

    #[async_trait]
    impl TenantLookup for StaticLookup {
        async fn tenant_by_domain(&self, domain: &str) -> Result<Option<Tenant>> {
            Ok(self
                .domains
                .get(domain)
                .and_then(|schema| self.tenants.get(schema))
                .cloned())
        }

        async fn tenant_by_schema(&self, schema_name: &str) -> Result<Option<Tenant>> {
            Ok(self.tenants.get(schema_name).cloned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_config_defaults() {
        let config = LookupCacheConfig::from_env();
        assert_eq!(config.max_entries, 10_000);
        assert_eq!(config.ttl, Duration::from_secs(60));
    }

    mod database {
        use super::*;
        use schemata_database::{DatabaseConfig, TenancyConfig, TenantService};
        use schemata_models::{NewDomain, NewTenant};
        use sqlx::migrate::Migrator;
        use std::path::Path;
        use std::sync::Arc;
        use uuid::Uuid;

        async fn setup(ttl: Duration) -> (RegistryLookup, TenantService, PgTenantSession) {
            let database = Database::new(DatabaseConfig::from_env())
                .await
                .expect("Failed to connect to database");
            let registry = Migrator::new(Path::new("../../migrations/shared"))
                .await
                .unwrap();
            let mut conn = database.pool().acquire().await.unwrap();
            registry.run(&mut *conn).await.unwrap();

            let settings = SessionSettings::default();
            let session = database.session(&settings).await.unwrap();
            let lookup = RegistryLookup::new(
                database,
                settings,
                LookupCacheConfig {
                    max_entries: 100,
                    ttl,
                },
            );
            let service = TenantService::new(Arc::new(TenancyConfig::default()));
            (lookup, service, session)
        }

        fn unique(prefix: &str) -> String {
            format!("{}_{}", prefix, &Uuid::new_v4().simple().to_string()[..8])
        }

        #[tokio::test]
        #[ignore] // Only run with database available
        async fn test_misses_are_cached_until_invalidated() {
            let (lookup, service, mut session) = setup(Duration::from_secs(300)).await;
            let schema = unique("north");
            let host = format!("{}.example.com", schema.replace('_', "-"));

            service
                .create_tenant(&mut session, NewTenant::new(&schema, "North"), None)
                .await
                .unwrap();
            assert_eq!(lookup.tenant_by_domain(&host).await.unwrap(), None);

            service
                .add_domain(&mut session, &schema, NewDomain::new(&host))
                .await
                .unwrap();
            assert_eq!(lookup.tenant_by_domain(&host).await.unwrap(), None);

            lookup.invalidate_domain(&host.to_uppercase()).await;
            let found = lookup.tenant_by_domain(&host).await.unwrap().unwrap();
            assert_eq!(found.schema_name, schema);

            // Cached under the lowercased host: still served once the row is gone
            service.delete_domain(&mut session, &host).await.unwrap();
            let cached = lookup
                .tenant_by_domain(&host.to_uppercase())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(cached.id, found.id);

            lookup.invalidate_domain(&host).await;
            assert_eq!(lookup.tenant_by_domain(&host).await.unwrap(), None);

            service.delete_tenant(&mut session, &schema, true).await.unwrap();
            session.release().await.unwrap();
        }

        #[tokio::test]
        #[ignore] // Only run with database available
        async fn test_schema_lookups_expire_and_invalidate() {
            let (lookup, service, mut session) = setup(Duration::from_millis(200)).await;
            let schema = unique("south");

            assert_eq!(lookup.tenant_by_schema(&schema).await.unwrap(), None);
            let tenant = service
                .create_tenant(&mut session, NewTenant::new(&schema, "South"), None)
                .await
                .unwrap();
            assert_eq!(lookup.tenant_by_schema(&schema).await.unwrap(), None);

            tokio::time::sleep(Duration::from_millis(400)).await;
            assert_eq!(lookup.tenant_by_schema(&schema).await.unwrap(), Some(tenant));

            service.delete_tenant(&mut session, &schema, true).await.unwrap();
            lookup.invalidate_schema(&schema).await;
            assert_eq!(lookup.tenant_by_schema(&schema).await.unwrap(), None);
            session.release().await.unwrap();
        }
    }
}
