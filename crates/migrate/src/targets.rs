use crate::error::{MigrationError, Result};
use crate::set::MigrationTarget;
use schemata_models::Tenant;

/// Which schemas a `migrate-schemas` run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationScope {
    All,
    Shared,
    Tenants,
    Schema(String),
}

/// Turn a scope into the ordered targets handed to an executor.
pub fn resolve_targets(
    scope: &MigrationScope,
    tenants: &[Tenant],
    public_schema: &str,
) -> Result<Vec<MigrationTarget>> {
    let public = || MigrationTarget::new(public_schema);
    let tenant_targets = || {
        tenants
            .iter()
            .filter(|t| !t.schema_name.eq_ignore_ascii_case(public_schema))
            .map(MigrationTarget::from)
    };

    let targets: Vec<MigrationTarget> = match scope {
        MigrationScope::All => std::iter::once(public()).chain(tenant_targets()).collect(),
        MigrationScope::Shared => vec![public()],
        MigrationScope::Tenants => tenant_targets().collect(),
        MigrationScope::Schema(name) if name.eq_ignore_ascii_case(public_schema) => vec![public()],
        MigrationScope::Schema(name) => {
            let tenant = tenants
                .iter()
                .find(|t| &t.schema_name == name)
                .ok_or_else(|| MigrationError::UnknownSchema(name.clone()))?;
            vec![MigrationTarget::from(tenant)]
        }
    };
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn tenant(schema: &str, tenant_type: Option<&str>) -> Tenant {
        Tenant {
            id: Uuid::new_v4(),
            schema_name: schema.to_string(),
            name: schema.to_string(),
            tenant_type: tenant_type.map(str::to_string),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn names(targets: &[MigrationTarget]) -> Vec<&str> {
        targets.iter().map(|t| t.schema_name.as_str()).collect()
    }

    #[test]
    fn test_scopes() {
        let tenants = vec![tenant("north", None), tenant("south", Some("school"))];

        let all = resolve_targets(&MigrationScope::All, &tenants, "public").unwrap();
        assert_eq!(names(&all), vec!["public", "north", "south"]);

        let shared = resolve_targets(&MigrationScope::Shared, &tenants, "public").unwrap();
        assert_eq!(names(&shared), vec!["public"]);

        let only = resolve_targets(&MigrationScope::Tenants, &tenants, "public").unwrap();
        assert_eq!(names(&only), vec!["north", "south"]);

        let one = resolve_targets(&MigrationScope::Schema("south".into()), &tenants, "public").unwrap();
        assert_eq!(one[0].tenant_type.as_deref(), Some("school"));

        assert!(matches!(
            resolve_targets(&MigrationScope::Schema("east".into()), &tenants, "public"),
            Err(MigrationError::UnknownSchema(_))
        ));

        let upper = resolve_targets(&MigrationScope::Schema("PUBLIC".into()), &tenants, "public").unwrap();
        assert_eq!(names(&upper), vec!["public"]);
    }
}
