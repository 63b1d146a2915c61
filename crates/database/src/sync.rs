use crate::error::Result;
use async_trait::async_trait;

/// Brings a freshly created schema up to date with its migration set.
///
/// Implemented by the migration runner; provisioning calls it right after
/// `CREATE SCHEMA` so a new tenant is usable as soon as it is registered.
#[async_trait]
pub trait SchemaSync: Send + Sync {
    async fn sync_schema(&self, schema_name: &str, tenant_type: Option<&str>) -> Result<()>;
}
