//! Request and command routing to tenant schemas.
//!
//! A resolver turns a request (host, path) into a [`TenantContext`]; the
//! [`middleware::resolve_tenant`] layer stores it on the request, handlers
//! extract it and ask the [`TenantRouter`] for a session switched to it.

pub mod command;
pub mod context;
pub mod error;
pub mod host;
pub mod lookup;
pub mod middleware;
pub mod router;
pub mod subfolder;

use async_trait::async_trait;

pub use command::{context_for, resolve_command_tenant, schema_choices, SchemaChoice};
pub use context::{ResolutionSource, TenantContext};
pub use error::{ErrorResponse, RoutingError};
pub use host::{normalize_host, HostTenantResolver, NotFoundHandler, NotFoundPolicy};
pub use lookup::{LookupCacheConfig, RegistryLookup, TenantLookup};
pub use middleware::resolve_tenant;
pub use router::TenantRouter;
pub use subfolder::SubfolderTenantResolver;

#[async_trait]
pub trait TenantResolver: Send + Sync {
    async fn resolve(&self, host: Option<&str>, path: &str) -> Result<TenantContext, RoutingError>;
}
