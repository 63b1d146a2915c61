use crate::error::RoutingError;
use crate::TenantResolver;
use axum::{
    extract::{Request, State},
    http::header::HOST,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Resolve the tenant of a request and attach it as a [`crate::TenantContext`] extension.
///
/// ```ignore
/// let app = Router::new()
///     .route("/", get(handler))
///     .layer(from_fn_with_state(resolver, resolve_tenant));
/// ```
pub async fn resolve_tenant(
    State(resolver): State<Arc<dyn TenantResolver>>,
    mut request: Request,
    next: Next,
) -> Result<Response, RoutingError> {
    let host = request
        .headers()
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .or_else(|| request.uri().host().map(str::to_string));

    let context = resolver
        .resolve(host.as_deref(), request.uri().path())
        .await?;

    tracing::debug!(
        schema = %context.schema_name,
        source = ?context.source,
        "Request routed"
    );
    request.extensions_mut().insert(context);

    Ok(next.run(request).await)
}
