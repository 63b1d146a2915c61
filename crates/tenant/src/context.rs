use crate::error::RoutingError;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use schemata_database::TenantSession;
use schemata_models::Tenant;

/// How a request or command ended up on its schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    Host,
    Subfolder,
    /// No tenant matched and the default schema was used instead
    Default,
    /// A custom not-found handler picked the schema
    Handler,
    Command,
}

/// The tenant a request was routed to.
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub schema_name: String,
    /// `None` when routed to public or to a schema without a registry row
    pub tenant: Option<Tenant>,
    pub source: ResolutionSource,
    /// URL prefix the tenant was found under, for subfolder routing
    pub path_prefix: Option<String>,
}

impl TenantContext {
    pub fn public(public_schema: &str, source: ResolutionSource) -> Self {
        Self {
            schema_name: public_schema.to_string(),
            tenant: None,
            source,
            path_prefix: None,
        }
    }

    pub fn schema(schema_name: impl Into<String>, source: ResolutionSource) -> Self {
        Self {
            schema_name: schema_name.into(),
            tenant: None,
            source,
            path_prefix: None,
        }
    }

    pub fn for_tenant(tenant: Tenant, source: ResolutionSource) -> Self {
        Self {
            schema_name: tenant.schema_name.clone(),
            tenant: Some(tenant),
            source,
            path_prefix: None,
        }
    }

    pub fn with_path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.path_prefix = Some(prefix.into());
        self
    }

    /// Switch a session to this context.
    pub fn apply<C>(&self, session: &mut TenantSession<C>) {
        match &self.tenant {
            Some(tenant) => session.set_tenant(tenant.clone(), true),
            None if self.schema_name.eq_ignore_ascii_case(session.state().public_schema()) => {
                session.set_schema_to_public()
            }
            None => session.set_schema(self.schema_name.clone(), true, None),
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = RoutingError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<TenantContext>()
            .cloned()
            .ok_or(RoutingError::MissingContext)
    }
}
