//! Hostname based tenant resolution.

use crate::context::{ResolutionSource, TenantContext};
use crate::error::RoutingError;
use crate::lookup::TenantLookup;
use crate::TenantResolver;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Reduce a Host header (or URL) to the form stored in `domains`.
///
/// Drops the scheme, any path, the port and a leading `www.`, and lowercases
/// the rest.
pub fn normalize_host(raw: &str) -> String {
    let mut host = raw.trim();

    if let Some((_, rest)) = host.split_once("://") {
        host = rest;
    }
    if let Some(end) = host.find(['/', '?', '#']) {
        host = &host[..end];
    }
    if let Some((_, rest)) = host.rsplit_once('@') {
        host = rest;
    }

    if host.starts_with('[') {
        // IPv6 literal: keep the brackets, drop a port after them
        if let Some(end) = host.find(']') {
            host = &host[..=end];
        }
    } else if let Some((name, port)) = host.rsplit_once(':') {
        if port.chars().all(|c| c.is_ascii_digit()) {
            host = name;
        }
    }

    let host = host.trim_end_matches('.').to_ascii_lowercase();
    match host.strip_prefix("www.") {
        Some(stripped) => stripped.to_string(),
        None => host,
    }
}

pub type NotFoundHandler = Arc<dyn Fn(&str) -> Result<TenantContext, RoutingError> + Send + Sync>;

/// What to do with a hostname no tenant owns.
#[derive(Clone)]
pub enum NotFoundPolicy {
    /// Reject the request with 404
    NotFound,
    /// Route to this schema instead
    DefaultSchema(String),
    /// Let a custom function decide, given the normalized host
    Handler(NotFoundHandler),
}

impl Default for NotFoundPolicy {
    fn default() -> Self {
        Self::NotFound
    }
}

impl fmt::Debug for NotFoundPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "NotFound"),
            Self::DefaultSchema(schema) => f.debug_tuple("DefaultSchema").field(schema).finish(),
            Self::Handler(_) => write!(f, "Handler(..)"),
        }
    }
}

pub struct HostTenantResolver {
    lookup: Arc<dyn TenantLookup>,
    public_schema: String,
    /// Hostnames served from the public schema
    public_domains: Vec<String>,
    policy: NotFoundPolicy,
}

impl HostTenantResolver {
    pub fn new(lookup: Arc<dyn TenantLookup>, public_schema: impl Into<String>) -> Self {
        Self {
            lookup,
            public_schema: public_schema.into(),
            public_domains: Vec::new(),
            policy: NotFoundPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: NotFoundPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_public_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.public_domains = domains
            .into_iter()
            .map(|d| normalize_host(d.as_ref()))
            .collect();
        self
    }

    pub async fn resolve_host(&self, raw_host: &str) -> Result<TenantContext, RoutingError> {
        let host = normalize_host(raw_host);

        if self.public_domains.iter().any(|d| d == &host) {
            return Ok(TenantContext::public(&self.public_schema, ResolutionSource::Host));
        }

        if let Some(tenant) = self.lookup.tenant_by_domain(&host).await? {
            tracing::debug!(host = %host, schema = %tenant.schema_name, "Resolved tenant by host");
            return Ok(TenantContext::for_tenant(tenant, ResolutionSource::Host));
        }

        match &self.policy {
            NotFoundPolicy::NotFound => Err(RoutingError::TenantNotFound(host)),
            NotFoundPolicy::DefaultSchema(schema) => {
                tracing::debug!(host = %host, schema = %schema, "No tenant for host, using default schema");
                Ok(TenantContext::schema(schema.clone(), ResolutionSource::Default))
            }
            NotFoundPolicy::Handler(handler) => handler(&host),
        }
    }
}

#[async_trait]
impl TenantResolver for HostTenantResolver {
    async fn resolve(&self, host: Option<&str>, _path: &str) -> Result<TenantContext, RoutingError> {
        let host = host.ok_or(RoutingError::MissingHost)?;
        self.resolve_host(host).await
    }
}
