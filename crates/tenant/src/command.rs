//! Tenant selection for command line tools.

use crate::context::{ResolutionSource, TenantContext};
use crate::error::RoutingError;
use schemata_models::Tenant;
use std::io;

/// One entry of the schema picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaChoice {
    pub schema_name: String,
    pub label: String,
}

/// Schemas a command may run in: public first, then every tenant.
pub fn schema_choices(tenants: &[Tenant], public_schema: &str) -> Vec<SchemaChoice> {
    let mut choices = Vec::with_capacity(tenants.len() + 1);
    choices.push(SchemaChoice {
        schema_name: public_schema.to_string(),
        label: format!("{} (shared)", public_schema),
    });
    choices.extend(
        tenants
            .iter()
            .filter(|t| !t.schema_name.eq_ignore_ascii_case(public_schema))
            .map(|t| SchemaChoice {
                schema_name: t.schema_name.clone(),
                label: format!("{} - {}", t.schema_name, t.name),
            }),
    );
    choices
}

/// Pick the schema a command runs in.
///
/// An explicit name must be public or a registered tenant. Without one,
/// `pick` is shown the choices and returns the index picked, or `None` when
/// the user backed out.
pub fn resolve_command_tenant<F>(
    explicit: Option<&str>,
    tenants: &[Tenant],
    public_schema: &str,
    pick: F,
) -> Result<TenantContext, RoutingError>
where
    F: FnOnce(&[SchemaChoice]) -> io::Result<Option<usize>>,
{
    let schema_name = match explicit {
        Some(name) => name.to_string(),
        None => {
            let choices = schema_choices(tenants, public_schema);
            let index = pick(&choices)?.ok_or(RoutingError::NoSelection)?;
            choices
                .into_iter()
                .nth(index)
                .map(|c| c.schema_name)
                .ok_or(RoutingError::NoSelection)?
        }
    };
    context_for(&schema_name, tenants, public_schema)
}

/// Context for a schema named on the command line.
pub fn context_for(
    schema_name: &str,
    tenants: &[Tenant],
    public_schema: &str,
) -> Result<TenantContext, RoutingError> {
    if schema_name.eq_ignore_ascii_case(public_schema) {
        return Ok(TenantContext::public(public_schema, ResolutionSource::Command));
    }
    tenants
        .iter()
        .find(|t| t.schema_name == schema_name)
        .map(|t| TenantContext::for_tenant(t.clone(), ResolutionSource::Command))
        .ok_or_else(|| RoutingError::TenantNotFound(schema_name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::testing::tenant;

    fn tenants() -> Vec<Tenant> {
        vec![tenant("north"), tenant("south")]
    }

    #[test]
    fn test_choices_list_public_then_tenants() {
        let choices = schema_choices(&tenants(), "public");
        let labels: Vec<_> = choices.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["public (shared)", "north - NORTH", "south - SOUTH"]);
        assert_eq!(choices[2].schema_name, "south");
    }

    #[test]
    fn test_choices_skip_a_tenant_registered_on_public() {
        let mut registered = tenants();
        registered.push(tenant("PUBLIC"));
        let choices = schema_choices(&registered, "public");
        assert_eq!(choices.len(), 3);
    }

    #[test]
    fn test_picked_index_resolves_context() {
        let ctx = resolve_command_tenant(None, &tenants(), "public", |choices| {
            assert_eq!(choices.len(), 3);
            Ok(Some(2))
        })
        .unwrap();
        assert_eq!(ctx.schema_name, "south");
        assert_eq!(ctx.source, ResolutionSource::Command);

        let ctx = resolve_command_tenant(None, &tenants(), "public", |_| Ok(Some(0))).unwrap();
        assert_eq!(ctx.schema_name, "public");
        assert!(ctx.tenant.is_none());
    }

    #[test]
    fn test_no_selection() {
        assert!(matches!(
            resolve_command_tenant(None, &tenants(), "public", |_| Ok(None)),
            Err(RoutingError::NoSelection)
        ));
        assert!(matches!(
            resolve_command_tenant(None, &tenants(), "public", |_| Ok(Some(9))),
            Err(RoutingError::NoSelection)
        ));
    }

    #[test]
    fn test_picker_errors_are_passed_on() {
        let result = resolve_command_tenant(None, &tenants(), "public", |_| {
            Err(io::Error::new(io::ErrorKind::Other, "not a terminal"))
        });
        assert!(matches!(result, Err(RoutingError::Io(_))));
    }

    #[test]
    fn test_explicit_schema_skips_picker() {
        let ctx = resolve_command_tenant(Some("south"), &tenants(), "public", |_| {
            panic!("picker must not run")
        })
        .unwrap();
        assert_eq!(ctx.schema_name, "south");

        assert!(matches!(
            resolve_command_tenant(Some("east"), &tenants(), "public", |_| Ok(Some(1))),
            Err(RoutingError::TenantNotFound(_))
        ));
    }

    #[test]
    fn test_context_for_public_in_any_case() {
        let ctx = context_for("PUBLIC", &tenants(), "public").unwrap();
        assert_eq!(ctx.schema_name, "public");
    }
}
