//! Logical tenant scope of one connection.
//!
//! Nothing here talks to the database. The session layer reads the state and
//! applies it before handing the connection out.

use schemata_models::Tenant;

/// Stand-in for a tenant that is only known by its schema name.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaPlaceholder {
    pub schema_name: String,
    pub tenant_type: Option<String>,
}

/// What the connection is currently scoped to.
#[derive(Debug, Clone, PartialEq)]
pub enum ActiveTenant {
    Public,
    Tenant(Tenant),
    Placeholder(SchemaPlaceholder),
}

impl ActiveTenant {
    pub fn tenant_type(&self) -> Option<&str> {
        match self {
            Self::Public => None,
            Self::Tenant(t) => t.tenant_type.as_deref(),
            Self::Placeholder(p) => p.tenant_type.as_deref(),
        }
    }

    pub fn tenant(&self) -> Option<&Tenant> {
        match self {
            Self::Tenant(t) => Some(t),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TenantState {
    public_schema: String,
    schema_name: String,
    tenant: ActiveTenant,
    include_public: bool,
    applied: bool,
}

impl TenantState {
    /// Fresh state scoped to public and not yet applied.
    pub fn new(public_schema: impl Into<String>) -> Self {
        let public_schema = public_schema.into();
        Self {
            schema_name: public_schema.clone(),
            public_schema,
            tenant: ActiveTenant::Public,
            include_public: true,
            applied: false,
        }
    }

    pub fn set_tenant(&mut self, tenant: Tenant, include_public: bool) {
        self.schema_name = tenant.schema_name.clone();
        self.tenant = ActiveTenant::Tenant(tenant);
        self.include_public = include_public;
        self.applied = false;
    }

    pub fn set_schema(
        &mut self,
        schema_name: impl Into<String>,
        include_public: bool,
        tenant_type: Option<String>,
    ) {
        let schema_name = schema_name.into();
        if schema_name.eq_ignore_ascii_case(&self.public_schema) {
            self.tenant = ActiveTenant::Public;
            self.schema_name = self.public_schema.clone();
        } else {
            self.tenant = ActiveTenant::Placeholder(SchemaPlaceholder {
                schema_name: schema_name.clone(),
                tenant_type,
            });
            self.schema_name = schema_name;
        }
        self.include_public = include_public;
        self.applied = false;
    }

    pub fn set_schema_to_public(&mut self) {
        self.schema_name = self.public_schema.clone();
        self.tenant = ActiveTenant::Public;
        self.include_public = true;
        self.applied = false;
    }

    pub fn current_schema(&self) -> &str {
        &self.schema_name
    }

    pub fn current(&self) -> (&str, &ActiveTenant) {
        (&self.schema_name, &self.tenant)
    }

    pub fn tenant(&self) -> &ActiveTenant {
        &self.tenant
    }

    pub fn public_schema(&self) -> &str {
        &self.public_schema
    }

    pub fn include_public(&self) -> bool {
        self.include_public
    }

    pub fn is_public(&self) -> bool {
        self.schema_name.eq_ignore_ascii_case(&self.public_schema)
    }

    pub fn is_applied(&self) -> bool {
        self.applied
    }

    pub fn mark_applied(&mut self) {
        self.applied = true;
    }

    pub fn mark_unapplied(&mut self) {
        self.applied = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn tenant(schema: &str) -> Tenant {
        Tenant {
            id: Uuid::new_v4(),
            schema_name: schema.to_string(),
            name: schema.to_uppercase(),
            tenant_type: Some("school".to_string()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_starts_public_and_dirty() {
        let state = TenantState::new("public");
        assert_eq!(state.current_schema(), "public");
        assert!(state.is_public());
        assert!(!state.is_applied());
        assert_eq!(state.tenant(), &ActiveTenant::Public);
    }

    #[test]
    fn test_setters_mark_unapplied() {
        let mut state = TenantState::new("public");
        state.mark_applied();
        state.set_tenant(tenant("north"), true);
        assert!(!state.is_applied());

        state.mark_applied();
        state.set_schema("south", false, None);
        assert!(!state.is_applied());

        state.mark_applied();
        state.set_schema_to_public();
        assert!(!state.is_applied());
    }

    #[test]
    fn test_last_switch_wins() {
        let mut state = TenantState::new("public");
        state.set_tenant(tenant("north"), true);
        state.set_schema("south", false, Some("shop".to_string()));

        let (schema, active) = state.current();
        assert_eq!(schema, "south");
        assert_eq!(active.tenant_type(), Some("shop"));
        assert!(!state.include_public());
        assert!(active.tenant().is_none());

        state.set_schema_to_public();
        assert!(state.is_public());
        assert!(state.include_public());
    }

    #[test]
    fn test_set_schema_to_public_name_is_public_placeholder() {
        let mut state = TenantState::new("shared");
        state.set_schema("shared", true, None);
        assert_eq!(state.tenant(), &ActiveTenant::Public);
        assert!(state.is_public());
    }

    #[test]
    fn test_public_name_matches_any_case() {
        let mut state = TenantState::new("public");
        state.set_schema("PUBLIC", false, Some("school".to_string()));
        assert_eq!(state.tenant(), &ActiveTenant::Public);
        assert_eq!(state.current_schema(), "public");
        assert!(state.is_public());
    }

    #[test]
    fn test_full_tenant_is_kept() {
        let mut state = TenantState::new("public");
        let t = tenant("north");
        state.set_tenant(t.clone(), true);
        assert_eq!(state.tenant().tenant(), Some(&t));
        assert_eq!(state.tenant().tenant_type(), Some("school"));
    }
}
