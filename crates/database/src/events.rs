//! Schema lifecycle notifications.
//!
//! Listeners run synchronously on the task that published the event, in
//! subscription order.

use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaEvent {
    SchemaCreated { schema_name: String },
    /// A schema exists but its tables still have to be created
    SchemaNeedsSync { schema_name: String },
    SchemaMigrated { schema_name: String },
    SchemaDropped { schema_name: String },
    SchemaRenamed { from: String, to: String },
    SchemaCloned { source: String, target: String },
    TenantDeleted { schema_name: String },
}

impl SchemaEvent {
    pub fn schema_name(&self) -> &str {
        match self {
            Self::SchemaCreated { schema_name }
            | Self::SchemaNeedsSync { schema_name }
            | Self::SchemaMigrated { schema_name }
            | Self::SchemaDropped { schema_name }
            | Self::TenantDeleted { schema_name } => schema_name,
            Self::SchemaRenamed { to, .. } => to,
            Self::SchemaCloned { target, .. } => target,
        }
    }
}

impl fmt::Display for SchemaEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SchemaCreated { schema_name } => write!(f, "schema_created({})", schema_name),
            Self::SchemaNeedsSync { schema_name } => write!(f, "schema_needs_sync({})", schema_name),
            Self::SchemaMigrated { schema_name } => write!(f, "schema_migrated({})", schema_name),
            Self::SchemaDropped { schema_name } => write!(f, "schema_dropped({})", schema_name),
            Self::SchemaRenamed { from, to } => write!(f, "schema_renamed({} -> {})", from, to),
            Self::SchemaCloned { source, target } => {
                write!(f, "schema_cloned({} -> {})", source, target)
            }
            Self::TenantDeleted { schema_name } => write!(f, "tenant_deleted({})", schema_name),
        }
    }
}

pub trait SchemaEventListener: Send + Sync {
    fn on_event(&self, event: &SchemaEvent);
}

#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Vec<Arc<dyn SchemaEventListener>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: Arc<dyn SchemaEventListener>) {
        self.listeners.push(listener);
    }

    pub fn publish(&self, event: SchemaEvent) {
        for listener in &self.listeners {
            listener.on_event(&event);
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Writes every event to the log.
pub struct LoggingListener;

impl SchemaEventListener for LoggingListener {
    fn on_event(&self, event: &SchemaEvent) {
        tracing::info!(schema = %event.schema_name(), event = %event, "Schema event");
    }
}
