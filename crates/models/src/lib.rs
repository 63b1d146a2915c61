// Core modules
pub mod schema_name;
pub mod tenant;
pub mod domain;

// Re-export commonly used types
pub use schema_name::{
    is_valid_schema_name, validate_schema_name, Engine, InvalidSchemaName, SchemaNameRule,
};
pub use tenant::{NewTenant, Tenant};
pub use domain::{Domain, NewDomain};
