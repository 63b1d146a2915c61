use crate::context::TenantContext;
use schemata_database::{Database, PgTenantSession, Result, SessionSettings};

/// Hands out sessions already switched to a resolved tenant.
///
/// Sessions start from a fresh pool checkout; the switch is applied on the
/// first cursor. Call `release()` when done to leave the connection on public.
#[derive(Clone)]
pub struct TenantRouter {
    database: Database,
    settings: SessionSettings,
}

impl TenantRouter {
    pub fn new(database: Database, settings: SessionSettings) -> Self {
        Self { database, settings }
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub async fn session(&self, context: &TenantContext) -> Result<PgTenantSession> {
        let mut session = self.database.session(&self.settings).await?;
        context.apply(&mut session);
        Ok(session)
    }
}
