use clap::{Args, Parser, Subcommand, ValueEnum};
use schemata_migrate::{FailurePolicy, MigrateOptions, MigrationScope};

#[derive(Parser, Debug)]
#[command(
    name = "schemata",
    version,
    about = "Schema-per-tenant management for Postgres"
)]
pub struct Cli {
    /// Never prompt; a missing required value is a usage error
    #[arg(long, global = true)]
    pub no_input: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply migrations to the public schema and the tenant schemas
    MigrateSchemas(MigrateArgs),
    /// Register a tenant and provision its schema
    CreateTenant(CreateTenantArgs),
    /// Delete a tenant, optionally dropping its schema
    DeleteTenant(DeleteTenantArgs),
    /// Remove a domain from its tenant
    DeleteDomain(DeleteDomainArgs),
    /// Register a tenant whose schema is a copy of another
    CloneTenant(CloneTenantArgs),
    /// Rename a schema and the tenant pointing at it
    RenameSchema(RenameSchemaArgs),
    /// Create the schema of every tenant that has none
    CreateMissingSchemas(CreateMissingSchemasArgs),
    /// List registered tenants and their domains
    ListTenants(ListTenantsArgs),
    /// Run SQL inside a tenant schema, or inside every tenant schema
    TenantSql(TenantSqlArgs),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorKind {
    Standard,
    Parallel,
}

#[derive(Args, Debug)]
pub struct MigrateArgs {
    /// Only migrate the public schema
    #[arg(long, conflicts_with_all = ["tenant", "schema"])]
    pub shared: bool,

    /// Only migrate tenant schemas
    #[arg(long, conflicts_with = "schema")]
    pub tenant: bool,

    /// Only migrate this schema
    #[arg(short, long)]
    pub schema: Option<String>,

    #[arg(long, value_enum, default_value_t = ExecutorKind::Standard)]
    pub executor: ExecutorKind,

    /// Record migrations as applied without running them
    #[arg(long)]
    pub fake: bool,

    /// Run the syncdb scripts in each schema before migrating
    #[arg(long)]
    pub run_syncdb: bool,

    /// Keep migrating the remaining tenants when one fails
    #[arg(long)]
    pub continue_on_error: bool,

    /// Parallel executor workers (defaults to `max_workers` from config)
    #[arg(long)]
    pub max_workers: Option<usize>,

    /// Schemas per worker batch (defaults to `chunk_size` from config)
    #[arg(long)]
    pub chunk_size: Option<usize>,
}

impl MigrateArgs {
    pub fn scope(&self) -> MigrationScope {
        match (&self.schema, self.shared, self.tenant) {
            (Some(schema), _, _) => MigrationScope::Schema(schema.clone()),
            (None, true, false) => MigrationScope::Shared,
            (None, false, true) => MigrationScope::Tenants,
            _ => MigrationScope::All,
        }
    }

    pub fn options(&self) -> MigrateOptions {
        MigrateOptions {
            fake: self.fake,
            run_syncdb: self.run_syncdb,
        }
    }

    pub fn policy(&self) -> FailurePolicy {
        if self.continue_on_error {
            FailurePolicy::Continue
        } else {
            FailurePolicy::Abort
        }
    }
}

#[derive(Args, Debug)]
pub struct CreateTenantArgs {
    #[arg(short, long)]
    pub schema: Option<String>,

    /// Display name
    #[arg(short, long)]
    pub name: Option<String>,

    #[arg(short, long)]
    pub tenant_type: Option<String>,

    /// Primary domain
    #[arg(short, long)]
    pub domain: Option<String>,

    /// Create the schema without migrating it
    #[arg(long)]
    pub no_sync: bool,
}

#[derive(Args, Debug)]
pub struct DeleteTenantArgs {
    #[arg(short, long)]
    pub schema: Option<String>,

    /// Drop the schema and everything in it
    #[arg(long)]
    pub drop_schema: bool,

    /// Skip the confirmation
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Args, Debug)]
pub struct DeleteDomainArgs {
    #[arg(short, long)]
    pub domain: Option<String>,

    /// Skip the confirmation
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Args, Debug)]
pub struct CloneTenantArgs {
    /// Schema to copy
    #[arg(long = "from")]
    pub source: Option<String>,

    /// Schema of the new tenant
    #[arg(short, long)]
    pub schema: Option<String>,

    #[arg(short, long)]
    pub name: Option<String>,

    #[arg(short, long)]
    pub tenant_type: Option<String>,

    #[arg(short, long)]
    pub domain: Option<String>,

    /// Copy table rows as well as structure
    #[arg(long)]
    pub with_data: bool,
}

#[derive(Args, Debug)]
pub struct RenameSchemaArgs {
    #[arg(long)]
    pub from: Option<String>,

    #[arg(long)]
    pub to: Option<String>,
}

#[derive(Args, Debug)]
pub struct CreateMissingSchemasArgs {
    /// Create the schemas without migrating them
    #[arg(long)]
    pub no_sync: bool,
}

#[derive(Args, Debug)]
pub struct ListTenantsArgs {
    /// Only list tenants of this type
    #[arg(short, long)]
    pub tenant_type: Option<String>,
}

#[derive(Args, Debug)]
pub struct TenantSqlArgs {
    /// Statement(s) to run
    pub sql: String,

    /// Schema to run in; prompted for when omitted
    #[arg(short, long, conflicts_with = "all")]
    pub schema: Option<String>,

    /// Run in every tenant schema
    #[arg(long)]
    pub all: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("schemata").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_migrate_scope() {
        let Command::MigrateSchemas(args) = parse(&["migrate-schemas"]).command else {
            panic!("expected migrate-schemas");
        };
        assert_eq!(args.scope(), MigrationScope::All);
        assert_eq!(args.executor, ExecutorKind::Standard);
        assert_eq!(args.policy(), FailurePolicy::Abort);

        let Command::MigrateSchemas(args) = parse(&["migrate-schemas", "--shared"]).command else {
            panic!("expected migrate-schemas");
        };
        assert_eq!(args.scope(), MigrationScope::Shared);

        let Command::MigrateSchemas(args) = parse(&[
            "migrate-schemas",
            "--tenant",
            "--executor",
            "parallel",
            "--continue-on-error",
            "--fake",
        ])
        .command
        else {
            panic!("expected migrate-schemas");
        };
        assert_eq!(args.scope(), MigrationScope::Tenants);
        assert_eq!(args.executor, ExecutorKind::Parallel);
        assert_eq!(args.policy(), FailurePolicy::Continue);
        assert!(args.options().fake);
        assert!(!args.options().run_syncdb);

        let Command::MigrateSchemas(args) = parse(&["migrate-schemas", "--schema", "north"]).command
        else {
            panic!("expected migrate-schemas");
        };
        assert_eq!(args.scope(), MigrationScope::Schema("north".to_string()));
    }

    #[test]
    fn test_conflicting_flags_are_rejected() {
        let err = Cli::try_parse_from(["schemata", "migrate-schemas", "--shared", "--schema", "north"])
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);

        assert!(Cli::try_parse_from(["schemata", "tenant-sql", "SELECT 1", "--all", "-s", "north"]).is_err());
    }

    #[test]
    fn test_global_no_input() {
        let cli = parse(&["delete-tenant", "--schema", "north", "--no-input"]);
        assert!(cli.no_input);
        let Command::DeleteTenant(args) = cli.command else {
            panic!("expected delete-tenant");
        };
        assert_eq!(args.schema.as_deref(), Some("north"));
        assert!(!args.drop_schema);
        assert!(!args.yes);
    }
}
