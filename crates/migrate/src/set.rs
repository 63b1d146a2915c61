//! Migration sets loaded from disk.
//!
//! ```text
//! migrations/
//!   shared/            applied to the public schema only
//!   tenant/            applied to every tenant schema
//!   types/<type>/      applied after `tenant/` to tenants of that type
//!   syncdb/*.sql       initial sync scripts, run on request before migrations
//! ```

use crate::error::{MigrationError, Result};
use schemata_models::Tenant;
use sqlx::migrate::Migrator;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// A schema to migrate, with the type that picks its extra migrations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationTarget {
    pub schema_name: String,
    pub tenant_type: Option<String>,
}

impl MigrationTarget {
    pub fn new(schema_name: impl Into<String>) -> Self {
        Self {
            schema_name: schema_name.into(),
            tenant_type: None,
        }
    }

    pub fn with_tenant_type(mut self, tenant_type: Option<String>) -> Self {
        self.tenant_type = tenant_type;
        self
    }
}

impl From<&Tenant> for MigrationTarget {
    fn from(tenant: &Tenant) -> Self {
        Self {
            schema_name: tenant.schema_name.clone(),
            tenant_type: tenant.tenant_type.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncScript {
    pub name: String,
    pub sql: String,
}

#[derive(Debug, Default)]
pub struct MigrationSet {
    shared: Option<Migrator>,
    tenant: Option<Migrator>,
    per_type: HashMap<String, Migrator>,
    syncdb: Vec<SyncScript>,
}

impl MigrationSet {
    /// Load every set found under `root`; missing directories are empty sets.
    pub async fn load(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let shared = load_migrator(root.join("shared")).await?;
        let tenant = load_migrator(root.join("tenant")).await?;

        let mut per_type = HashMap::new();
        let types_dir = root.join("types");
        if types_dir.is_dir() {
            let mut entries = tokio::fs::read_dir(&types_dir)
                .await
                .map_err(|e| MigrationError::io(&types_dir, e))?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| MigrationError::io(&types_dir, e))?
            {
                let path = entry.path();
                if !path.is_dir() {
                    continue;
                }
                let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                    continue;
                };
                if let Some(migrator) = load_migrator(path).await? {
                    per_type.insert(name, migrator);
                }
            }
        }

        let syncdb = load_sync_scripts(&root.join("syncdb")).await?;

        tracing::debug!(
            root = %root.display(),
            shared = shared.as_ref().map_or(0, |m| m.iter().count()),
            tenant = tenant.as_ref().map_or(0, |m| m.iter().count()),
            types = per_type.len(),
            syncdb = syncdb.len(),
            "Loaded migration sets"
        );

        Ok(Self {
            shared,
            tenant,
            per_type,
            syncdb,
        })
    }

    /// Migrators to run for `target`, in order.
    pub fn for_target(&self, target: &MigrationTarget, public_schema: &str) -> Vec<&Migrator> {
        if target.schema_name.eq_ignore_ascii_case(public_schema) {
            return self.shared.iter().collect();
        }

        let mut migrators: Vec<&Migrator> = self.tenant.iter().collect();
        if let Some(migrator) = target
            .tenant_type
            .as_deref()
            .and_then(|t| self.per_type.get(t))
        {
            migrators.push(migrator);
        }
        migrators
    }

    pub fn syncdb(&self) -> &[SyncScript] {
        &self.syncdb
    }

    pub fn is_empty(&self) -> bool {
        self.shared.is_none() && self.tenant.is_none() && self.per_type.is_empty()
    }
}

async fn load_migrator(dir: PathBuf) -> Result<Option<Migrator>> {
    if !dir.is_dir() {
        return Ok(None);
    }
    let mut migrator = Migrator::new(dir).await?;
    // Workers migrate different schemas of one database at the same time
    migrator.set_locking(false);
    // Tenant and type sets share one bookkeeping table per schema
    migrator.set_ignore_missing(true);
    Ok(Some(migrator))
}

async fn load_sync_scripts(dir: &Path) -> Result<Vec<SyncScript>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut paths = Vec::new();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| MigrationError::io(dir, e))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| MigrationError::io(dir, e))?
    {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("sql") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut scripts = Vec::with_capacity(paths.len());
    for path in paths {
        let sql = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| MigrationError::io(&path, e))?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        scripts.push(SyncScript { name, sql });
    }
    Ok(scripts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("schemata-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_load_tree() {
        let root = scratch_dir("sets");
        std::fs::create_dir_all(root.join("shared")).unwrap();
        std::fs::create_dir_all(root.join("tenant")).unwrap();
        std::fs::create_dir_all(root.join("types/school")).unwrap();
        std::fs::create_dir_all(root.join("syncdb")).unwrap();
        std::fs::write(
            root.join("shared/1_registry.sql"),
            "CREATE TABLE registry (id INT);",
        )
        .unwrap();
        std::fs::write(root.join("tenant/1_items.sql"), "CREATE TABLE items (id INT);").unwrap();
        std::fs::write(root.join("tenant/2_tags.sql"), "CREATE TABLE tags (id INT);").unwrap();
        std::fs::write(
            root.join("types/school/3_classes.sql"),
            "CREATE TABLE classes (id INT);",
        )
        .unwrap();
        std::fs::write(root.join("syncdb/b.sql"), "SELECT 2;").unwrap();
        std::fs::write(root.join("syncdb/a.sql"), "SELECT 1;").unwrap();
        std::fs::write(root.join("syncdb/readme.txt"), "ignored").unwrap();

        let set = MigrationSet::load(&root).await.unwrap();

        let public = set.for_target(&MigrationTarget::new("public"), "public");
        assert_eq!(public.len(), 1);
        assert_eq!(public[0].iter().count(), 1);

        let plain = set.for_target(&MigrationTarget::new("north"), "public");
        assert_eq!(plain.len(), 1);
        assert_eq!(plain[0].iter().count(), 2);

        let school = MigrationTarget::new("south").with_tenant_type(Some("school".to_string()));
        assert_eq!(set.for_target(&school, "public").len(), 2);

        let names: Vec<_> = set.syncdb().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a.sql", "b.sql"]);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn test_missing_directories_are_empty() {
        let root = scratch_dir("empty");
        let set = MigrationSet::load(&root).await.unwrap();
        assert!(set.is_empty());
        assert!(set.for_target(&MigrationTarget::new("north"), "public").is_empty());
        let _ = std::fs::remove_dir_all(&root);
    }
}
