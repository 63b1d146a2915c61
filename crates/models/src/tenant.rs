use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// A registered tenant. Its data lives in the schema named `schema_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Tenant {
    pub id: Uuid,
    pub schema_name: String,
    pub name: String,

    /// Only set when multi-type tenancy is in use
    pub tenant_type: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create tenant request.
///
/// Only the shape is checked here; whether `schema_name` is legal depends on
/// the engine and is decided by `validate_schema_name`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewTenant {
    #[validate(length(min = 1, max = 64))]
    pub schema_name: String,

    #[validate(length(min = 1, max = 255))]
    pub name: String,

    #[validate(length(min = 1, max = 100))]
    pub tenant_type: Option<String>,
}

impl NewTenant {
    pub fn new(schema_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema_name: schema_name.into(),
            name: name.into(),
            tenant_type: None,
        }
    }

    pub fn with_tenant_type(mut self, tenant_type: impl Into<String>) -> Self {
        self.tenant_type = Some(tenant_type.into());
        self
    }
}
