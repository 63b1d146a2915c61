use crate::cli::{
    CloneTenantArgs, Command, CreateMissingSchemasArgs, CreateTenantArgs, DeleteDomainArgs,
    DeleteTenantArgs, ExecutorKind, ListTenantsArgs, MigrateArgs, RenameSchemaArgs, TenantSqlArgs,
};
use crate::{prompt, usage_error};
use anyhow::{bail, Context, Result};
use schemata_database::{
    Database, EventBus, LoggingListener, PgTenantSession, SessionSettings, TenancyConfig,
    TenantService,
};
use schemata_migrate::{
    resolve_targets, MigrateOptions, MigrationExecutor, MigrationScope, MigrationSet,
    ParallelExecutor, SqlxSchemaMigrator, StandardExecutor,
};
use schemata_models::{NewDomain, NewTenant, Tenant};
use schemata_tenant::resolve_command_tenant;
use std::io;
use std::sync::Arc;

/// Everything a command needs, built once at startup.
pub struct App {
    config: Arc<TenancyConfig>,
    database: Database,
    settings: SessionSettings,
    events: EventBus,
    no_input: bool,
}

impl App {
    pub fn new(config: TenancyConfig, database: Database, no_input: bool) -> Self {
        let settings = SessionSettings::from_config(&config);
        let mut events = EventBus::new();
        events.subscribe(Arc::new(LoggingListener));

        Self {
            config: Arc::new(config),
            database,
            settings,
            events,
            no_input,
        }
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    fn public_schema(&self) -> &str {
        &self.config.public_schema
    }

    async fn session(&self) -> Result<PgTenantSession> {
        Ok(self.database.session(&self.settings).await?)
    }

    fn migrator(&self, set: Arc<MigrationSet>, options: MigrateOptions) -> SqlxSchemaMigrator {
        SqlxSchemaMigrator::new(self.database.clone(), self.settings.clone(), set)
            .with_options(options)
            .with_events(self.events.clone())
    }

    /// Tenant service; new schemas are migrated right away unless `sync` is off.
    async fn service(&self, sync: bool) -> Result<TenantService> {
        let service = TenantService::new(self.config.clone()).with_events(self.events.clone());
        if !sync {
            return Ok(service);
        }
        let set = MigrationSet::load(&self.config.migrations_dir).await?;
        let migrator = self.migrator(Arc::new(set), MigrateOptions::default());
        Ok(service.with_sync(Arc::new(migrator)))
    }

    /// Refuse to start when an extra search path shadows a tenant schema.
    pub async fn check_startup(&self) -> Result<()> {
        let service = self.service(false).await?;
        let mut session = self.session().await?;
        if service.registry_exists(&mut session).await? {
            service
                .check_extra_search_paths(&mut session)
                .await
                .context("Invalid extra_search_paths")?;
        }
        session.release().await?;
        Ok(())
    }

    /// Registered tenants, or none when the registry has not been migrated yet.
    async fn registered_tenants(&self, service: &TenantService) -> Result<Vec<Tenant>> {
        let mut session = self.session().await?;
        let tenants = if service.registry_exists(&mut session).await? {
            service.list_tenants(&mut session).await?
        } else {
            Vec::new()
        };
        session.release().await?;
        Ok(tenants)
    }

    fn required(&self, given: Option<String>, flag: &str, label: &str) -> Result<String> {
        if let Some(value) = given {
            return Ok(value);
        }
        if self.no_input {
            usage_error(&format!("--{} is required with --no-input", flag));
        }
        prompt::ask(label).with_context(|| format!("No value given for --{}", flag))
    }

    fn optional(&self, given: Option<String>, label: &str) -> Result<Option<String>> {
        if given.is_some() || self.no_input {
            return Ok(given);
        }
        Ok(prompt::ask_optional(label)?)
    }

    /// Destructive commands answer "no" on their own unless `--yes` is given.
    fn confirmed(&self, yes: bool, question: &str) -> Result<bool> {
        if yes {
            return Ok(true);
        }
        if self.no_input {
            return Ok(false);
        }
        Ok(prompt::confirm(question)?)
    }
}

pub async fn run(app: &App, command: Command) -> Result<()> {
    match command {
        Command::MigrateSchemas(args) => migrate_schemas(app, args).await,
        Command::CreateTenant(args) => create_tenant(app, args).await,
        Command::DeleteTenant(args) => delete_tenant(app, args).await,
        Command::DeleteDomain(args) => delete_domain(app, args).await,
        Command::CloneTenant(args) => clone_tenant(app, args).await,
        Command::RenameSchema(args) => rename_schema(app, args).await,
        Command::CreateMissingSchemas(args) => create_missing_schemas(app, args).await,
        Command::ListTenants(args) => list_tenants(app, args).await,
        Command::TenantSql(args) => tenant_sql(app, args).await,
    }
}

async fn migrate_schemas(app: &App, args: MigrateArgs) -> Result<()> {
    let scope = args.scope();
    let set = MigrationSet::load(&app.config.migrations_dir)
        .await
        .with_context(|| format!("Failed to load migrations from {}", app.config.migrations_dir))?;
    if set.is_empty() {
        tracing::warn!(dir = %app.config.migrations_dir, "No migrations found");
    }

    let tenants = match scope {
        MigrationScope::Shared => Vec::new(),
        _ => app.registered_tenants(&app.service(false).await?).await?,
    };
    let targets = resolve_targets(&scope, &tenants, app.public_schema())?;

    let migrator = Arc::new(app.migrator(Arc::new(set), args.options()));
    let executor: Box<dyn MigrationExecutor> = match args.executor {
        ExecutorKind::Standard => Box::new(
            StandardExecutor::new(migrator, app.public_schema()).with_policy(args.policy()),
        ),
        ExecutorKind::Parallel => Box::new(
            ParallelExecutor::new(
                migrator,
                app.public_schema(),
                args.max_workers.unwrap_or(app.config.max_workers),
                args.chunk_size.unwrap_or(app.config.chunk_size),
            )
            .with_policy(args.policy()),
        ),
    };

    tracing::info!(
        executor = executor.name(),
        schemas = targets.len(),
        fake = args.fake,
        "Migrating schemas"
    );
    let report = executor.run_migrations(targets).await?;

    for (schema, error) in &report.failed {
        tracing::error!(schema = %schema, "{}", error);
    }
    if !report.is_success() {
        bail!(
            "{} schema(s) failed to migrate, {} migrated",
            report.failed.len(),
            report.migrated.len()
        );
    }
    println!("Migrated {} schema(s)", report.migrated.len());
    Ok(())
}

async fn create_tenant(app: &App, args: CreateTenantArgs) -> Result<()> {
    let schema = app.required(args.schema, "schema", "Schema name")?;
    let name = app.required(args.name, "name", "Tenant name")?;
    let tenant_type = if app.config.tenant_types.is_empty() {
        args.tenant_type
    } else {
        Some(app.required(args.tenant_type, "tenant-type", "Tenant type")?)
    };
    let domain = app.optional(args.domain, "Primary domain")?;

    let mut request = NewTenant::new(schema, name);
    if let Some(tenant_type) = tenant_type {
        request = request.with_tenant_type(tenant_type);
    }

    let service = app.service(!args.no_sync).await?;
    let mut session = app.session().await?;
    let tenant = service
        .create_tenant(&mut session, request, domain.map(NewDomain::new))
        .await?;
    session.release().await?;

    println!("Tenant '{}' created in schema '{}'", tenant.name, tenant.schema_name);
    Ok(())
}

async fn delete_tenant(app: &App, args: DeleteTenantArgs) -> Result<()> {
    let schema = app.required(args.schema, "schema", "Schema name")?;
    let drop_schema = args.drop_schema || app.config.auto_drop_schema;

    let question = if drop_schema {
        format!("Delete tenant '{}' and drop its schema with all data?", schema)
    } else {
        format!("Delete tenant '{}'? Its schema is kept.", schema)
    };
    if !app.confirmed(args.yes, &question)? {
        println!("Aborted");
        return Ok(());
    }

    let service = app.service(false).await?;
    let mut session = app.session().await?;
    let tenant = service
        .delete_tenant(&mut session, &schema, args.drop_schema)
        .await?;
    session.release().await?;

    println!("Tenant '{}' deleted", tenant.name);
    Ok(())
}

async fn delete_domain(app: &App, args: DeleteDomainArgs) -> Result<()> {
    let domain = app.required(args.domain, "domain", "Domain")?;
    if !app.confirmed(args.yes, &format!("Delete domain '{}'?", domain))? {
        println!("Aborted");
        return Ok(());
    }

    let service = app.service(false).await?;
    let mut session = app.session().await?;
    let deleted = service.delete_domain(&mut session, &domain).await?;
    session.release().await?;

    println!("Domain '{}' deleted", deleted.domain);
    Ok(())
}

async fn clone_tenant(app: &App, args: CloneTenantArgs) -> Result<()> {
    let source = app.required(args.source, "from", "Schema to clone")?;
    let schema = app.required(args.schema, "schema", "New schema name")?;
    let name = app.required(args.name, "name", "Tenant name")?;
    let domain = app.optional(args.domain, "Primary domain")?;

    let mut request = NewTenant::new(schema, name);
    if let Some(tenant_type) = args.tenant_type {
        request = request.with_tenant_type(tenant_type);
    }

    let service = app.service(false).await?;
    let mut session = app.session().await?;
    let tenant = service
        .clone_tenant(
            &mut session,
            &source,
            request,
            args.with_data,
            domain.map(NewDomain::new),
        )
        .await?;
    session.release().await?;

    println!("Schema '{}' cloned to '{}'", source, tenant.schema_name);
    Ok(())
}

async fn rename_schema(app: &App, args: RenameSchemaArgs) -> Result<()> {
    let from = app.required(args.from, "from", "Current schema name")?;
    let to = app.required(args.to, "to", "New schema name")?;

    let service = app.service(false).await?;
    let mut session = app.session().await?;
    let renamed = service.rename_schema(&mut session, &from, &to).await?;
    session.release().await?;

    match renamed {
        Some(tenant) => println!("Schema '{}' renamed to '{}' (tenant '{}')", from, to, tenant.name),
        None => println!("Schema '{}' renamed to '{}'", from, to),
    }
    Ok(())
}

async fn create_missing_schemas(app: &App, args: CreateMissingSchemasArgs) -> Result<()> {
    let service = app.service(!args.no_sync).await?;
    let mut session = app.session().await?;
    let created = service.create_missing_schemas(&mut session).await?;
    session.release().await?;

    if created.is_empty() {
        println!("No missing schemas");
    } else {
        println!("Created {} schema(s): {}", created.len(), created.join(", "));
    }
    Ok(())
}

async fn list_tenants(app: &App, args: ListTenantsArgs) -> Result<()> {
    let service = app.service(false).await?;
    let mut session = app.session().await?;
    let tenants = match &args.tenant_type {
        Some(tenant_type) => service.list_tenants_of_type(&mut session, tenant_type).await?,
        None => service.list_tenants(&mut session).await?,
    };

    for tenant in &tenants {
        let domains = service.list_domains(&mut session, tenant.id).await?;
        let domains = domains
            .iter()
            .map(|d| {
                if d.is_primary {
                    format!("{}*", d.domain)
                } else {
                    d.domain.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "{:<24} {:<32} {:<12} {}",
            tenant.schema_name,
            tenant.name,
            tenant.tenant_type.as_deref().unwrap_or("-"),
            domains
        );
    }
    session.release().await?;
    Ok(())
}

async fn tenant_sql(app: &App, args: TenantSqlArgs) -> Result<()> {
    if !args.all && args.schema.is_none() && app.no_input {
        usage_error("--schema or --all is required with --no-input");
    }

    let service = app.service(false).await?;
    let mut session = app.session().await?;
    let tenants = service.list_tenants(&mut session).await?;

    if args.all {
        for tenant in tenants {
            let schema = tenant.schema_name.clone();
            session.set_tenant(tenant, true);
            let affected = run_sql(&mut session, &args.sql)
                .await
                .with_context(|| format!("Statement failed in schema '{}'", schema))?;
            println!("{}: {} row(s) affected", schema, affected);
        }
    } else {
        let context = resolve_command_tenant(
            args.schema.as_deref(),
            &tenants,
            app.public_schema(),
            |choices| prompt::select_schema(choices).map_err(io::Error::from),
        )?;
        context.apply(&mut session);
        let affected = run_sql(&mut session, &args.sql).await?;
        println!("{}: {} row(s) affected", context.schema_name, affected);
    }

    session.release().await?;
    Ok(())
}

async fn run_sql(session: &mut PgTenantSession, sql: &str) -> Result<u64> {
    let conn = session.pg().await?;
    let result = sqlx::raw_sql(sql).execute(&mut *conn).await?;
    Ok(result.rows_affected())
}
