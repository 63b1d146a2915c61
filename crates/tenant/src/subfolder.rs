//! Path based tenant resolution: `/<prefix>/<schema>/...`.

use crate::context::{ResolutionSource, TenantContext};
use crate::error::RoutingError;
use crate::lookup::TenantLookup;
use crate::TenantResolver;
use async_trait::async_trait;
use std::sync::Arc;

pub struct SubfolderTenantResolver {
    lookup: Arc<dyn TenantLookup>,
    prefix: String,
    public_schema: String,
}

impl SubfolderTenantResolver {
    pub fn new(
        lookup: Arc<dyn TenantLookup>,
        prefix: impl Into<String>,
        public_schema: impl Into<String>,
    ) -> Self {
        Self {
            lookup,
            prefix: prefix.into().trim_matches('/').to_string(),
            public_schema: public_schema.into(),
        }
    }

    /// Paths outside the prefix are served from public. Under the prefix the
    /// next segment must name a registered tenant.
    pub async fn resolve_path(&self, path: &str) -> Result<TenantContext, RoutingError> {
        let mut segments = path.trim_start_matches('/').split('/');

        if segments.next() != Some(self.prefix.as_str()) {
            return Ok(TenantContext::public(&self.public_schema, ResolutionSource::Subfolder));
        }

        let schema_name = segments.next().filter(|s| !s.is_empty()).ok_or_else(|| {
            RoutingError::TenantNotFound(format!("/{}/", self.prefix))
        })?;

        let tenant = self
            .lookup
            .tenant_by_schema(schema_name)
            .await?
            .ok_or_else(|| RoutingError::TenantNotFound(schema_name.to_string()))?;

        tracing::debug!(schema = %tenant.schema_name, "Resolved tenant by subfolder");
        let prefix = format!("/{}/{}", self.prefix, schema_name);
        Ok(TenantContext::for_tenant(tenant, ResolutionSource::Subfolder).with_path_prefix(prefix))
    }
}

#[async_trait]
impl TenantResolver for SubfolderTenantResolver {
    async fn resolve(&self, _host: Option<&str>, path: &str) -> Result<TenantContext, RoutingError> {
        self.resolve_path(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::testing::StaticLookup;

    fn resolver() -> SubfolderTenantResolver {
        let lookup = StaticLookup::with(&[("north", "north")]);
        SubfolderTenantResolver::new(Arc::new(lookup), "/clients/", "public")
    }

    #[tokio::test]
    async fn test_outside_prefix_is_public() {
        for path in ["/", "/about", "/clientsx/north"] {
            let ctx = resolver().resolve_path(path).await.unwrap();
            assert_eq!(ctx.schema_name, "public", "{}", path);
        }
    }

    #[tokio::test]
    async fn test_known_tenant() {
        let ctx = resolver().resolve_path("/clients/north/orders/7").await.unwrap();
        assert_eq!(ctx.schema_name, "north");
        assert_eq!(ctx.path_prefix.as_deref(), Some("/clients/north"));
        assert_eq!(ctx.source, ResolutionSource::Subfolder);
    }

    #[tokio::test]
    async fn test_unknown_tenant_under_prefix() {
        assert!(matches!(
            resolver().resolve_path("/clients/south/").await,
            Err(RoutingError::TenantNotFound(_))
        ));
        assert!(matches!(
            resolver().resolve_path("/clients/").await,
            Err(RoutingError::TenantNotFound(_))
        ));
    }
}
