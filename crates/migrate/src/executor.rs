//! Migration executors.
//!
//! Both executors migrate the public schema first, and only then the
//! tenants. Public is never migrated twice even if it also appears among the
//! tenant targets.

use crate::error::{MigrationError, Result};
use crate::progress::{Progress, RunState};
use crate::runner::SchemaMigrator;
use crate::set::MigrationTarget;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

/// What to do with the rest of a batch when one schema fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    #[default]
    Abort,
    Continue,
}

#[derive(Debug, Default)]
pub struct MigrationReport {
    pub state: RunState,
    pub migrated: Vec<String>,
    /// Schema name and error message of each failed schema
    pub failed: Vec<(String, String)>,
}

impl MigrationReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    fn finish(&mut self) {
        self.state = if self.failed.is_empty() {
            RunState::Completed
        } else {
            RunState::Failed
        };
    }
}

#[async_trait]
pub trait MigrationExecutor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run_migrations(&self, targets: Vec<MigrationTarget>) -> Result<MigrationReport>;
}

/// Split off the public target, dropping any duplicates of it.
fn split_public(
    targets: Vec<MigrationTarget>,
    public_schema: &str,
) -> (Option<MigrationTarget>, Vec<MigrationTarget>) {
    let mut public = None;
    let mut tenants = Vec::with_capacity(targets.len());
    for target in targets {
        if target.schema_name.eq_ignore_ascii_case(public_schema) {
            public.get_or_insert(target);
        } else {
            tenants.push(target);
        }
    }
    (public, tenants)
}

async fn migrate_public(
    migrator: &dyn SchemaMigrator,
    public: Option<MigrationTarget>,
    report: &mut MigrationReport,
) -> Result<()> {
    if let Some(public) = public {
        tracing::info!(schema = %public.schema_name, "Migrating public schema");
        if let Err(e) = migrator.migrate_schema(&public, Progress::new(1, 1)).await {
            tracing::error!(schema = %public.schema_name, error = %e, "Public schema migration failed");
            report.failed.push((public.schema_name, e.to_string()));
            report.finish();
            return Err(e);
        }
        report.migrated.push(public.schema_name);
    }
    Ok(())
}

/// Migrates schemas one after another, in the order given.
pub struct StandardExecutor {
    migrator: Arc<dyn SchemaMigrator>,
    public_schema: String,
    policy: FailurePolicy,
}

impl StandardExecutor {
    pub fn new(migrator: Arc<dyn SchemaMigrator>, public_schema: impl Into<String>) -> Self {
        Self {
            migrator,
            public_schema: public_schema.into(),
            policy: FailurePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[async_trait]
impl MigrationExecutor for StandardExecutor {
    fn name(&self) -> &'static str {
        "standard"
    }

    async fn run_migrations(&self, targets: Vec<MigrationTarget>) -> Result<MigrationReport> {
        let (public, tenants) = split_public(targets, &self.public_schema);
        let mut report = MigrationReport {
            state: RunState::Running,
            ..Default::default()
        };

        migrate_public(self.migrator.as_ref(), public, &mut report).await?;

        let total = tenants.len();
        for (i, target) in tenants.into_iter().enumerate() {
            let progress = Progress::new(i + 1, total);
            tracing::info!(schema = %target.schema_name, "{} Migrating", progress);

            match self.migrator.migrate_schema(&target, progress).await {
                Ok(()) => report.migrated.push(target.schema_name),
                Err(e) => {
                    tracing::error!(error = %e, "Schema migration failed");
                    if self.policy == FailurePolicy::Abort {
                        report.failed.push((target.schema_name, e.to_string()));
                        report.finish();
                        return Err(e);
                    }
                    report.failed.push((target.schema_name, e.to_string()));
                }
            }
        }

        report.finish();
        Ok(report)
    }
}

/// Migrates tenant schemas concurrently.
///
/// Tenants are split into chunks of `chunk_size`; at most `max_workers`
/// chunks run at once, each on its own tokio task with its own pooled
/// connection per schema. The executor itself holds no connection.
pub struct ParallelExecutor {
    migrator: Arc<dyn SchemaMigrator>,
    public_schema: String,
    max_workers: usize,
    chunk_size: usize,
    policy: FailurePolicy,
}

impl ParallelExecutor {
    pub fn new(
        migrator: Arc<dyn SchemaMigrator>,
        public_schema: impl Into<String>,
        max_workers: usize,
        chunk_size: usize,
    ) -> Self {
        Self {
            migrator,
            public_schema: public_schema.into(),
            max_workers: max_workers.max(1),
            chunk_size: chunk_size.max(1),
            policy: FailurePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[async_trait]
impl MigrationExecutor for ParallelExecutor {
    fn name(&self) -> &'static str {
        "parallel"
    }

    async fn run_migrations(&self, targets: Vec<MigrationTarget>) -> Result<MigrationReport> {
        let (public, tenants) = split_public(targets, &self.public_schema);
        let mut report = MigrationReport {
            state: RunState::Running,
            ..Default::default()
        };

        migrate_public(self.migrator.as_ref(), public, &mut report).await?;

        let total = tenants.len();
        if total == 0 {
            report.finish();
            return Ok(report);
        }

        let indexed: Vec<(usize, MigrationTarget)> = tenants
            .into_iter()
            .enumerate()
            .map(|(i, t)| (i + 1, t))
            .collect();

        tracing::info!(
            schemas = total,
            workers = self.max_workers,
            chunk_size = self.chunk_size,
            "Starting parallel migration"
        );

        let scheduled: Vec<(usize, String)> = indexed
            .iter()
            .map(|(index, target)| (*index, target.schema_name.clone()))
            .collect();

        // Outcomes are sent as each schema finishes, so a worker that panics
        // halfway through its chunk still reports the schemas it completed
        let (finished_tx, mut finished_rx) = mpsc::unbounded_channel();
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut workers = JoinSet::new();
        for chunk in indexed.chunks(self.chunk_size) {
            let chunk = chunk.to_vec();
            let migrator = self.migrator.clone();
            let semaphore = semaphore.clone();
            let finished = finished_tx.clone();

            workers.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                for (index, target) in chunk {
                    let progress = Progress::new(index, total);
                    tracing::info!(schema = %target.schema_name, "{} Migrating", progress);
                    let outcome = migrator
                        .migrate_schema(&target, progress)
                        .await
                        .map_err(|e| e.to_string());
                    if let Err(e) = &outcome {
                        tracing::error!(error = %e, "Schema migration failed");
                    }
                    let _ = finished.send((index, target.schema_name, outcome));
                }
            });
        }
        drop(finished_tx);

        let mut panics = Vec::new();
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Migration worker stopped");
                panics.push(e.to_string());
            }
        }

        let mut results = Vec::with_capacity(total);
        while let Ok(outcome) = finished_rx.try_recv() {
            results.push(outcome);
        }
        if !panics.is_empty() {
            let reported: HashSet<usize> = results.iter().map(|(index, _, _)| *index).collect();
            let message = format!("migration worker stopped: {}", panics.join("; "));
            for (index, schema_name) in scheduled {
                if !reported.contains(&index) {
                    results.push((index, schema_name, Err(message.clone())));
                }
            }
        }
        results.sort_by_key(|(index, _, _)| *index);

        for (_, schema_name, outcome) in results {
            match outcome {
                Ok(()) => report.migrated.push(schema_name),
                Err(e) => report.failed.push((schema_name, e)),
            }
        }
        report.finish();

        if !report.failed.is_empty() && self.policy == FailurePolicy::Abort {
            return Err(MigrationError::WorkersFailed {
                failed: report.failed.len(),
                total,
                first: report.failed[0].1.clone(),
            });
        }
        Ok(report)
    }
}
