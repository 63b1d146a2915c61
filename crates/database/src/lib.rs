pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod provisioning;
pub mod repositories;
pub mod session;
pub mod state;
pub mod strategy;
pub mod sync;

pub use config::TenancyConfig;
pub use connection::{Database, DatabaseConfig};
pub use error::{DatabaseError, Result};
pub use events::{EventBus, LoggingListener, SchemaEvent, SchemaEventListener};
pub use lifecycle::SchemaManager;
pub use provisioning::TenantService;
pub use repositories::{DomainRepository, TenantRepository};
pub use session::{
    MySqlTenantSession, PgTenantSession, SchemaGuard, SessionConnection, SessionSettings,
    TenantSession,
};
pub use state::{ActiveTenant, SchemaPlaceholder, TenantState};
pub use strategy::SessionStrategy;
pub use sync::SchemaSync;
