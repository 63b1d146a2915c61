use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Hostname (or subfolder token) routed to a tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Domain {
    pub id: Uuid,
    pub domain: String,
    pub tenant_id: Uuid,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

/// Create domain request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewDomain {
    #[validate(length(min = 1, max = 253), regex(path = *DOMAIN_REGEX))]
    pub domain: String,

    #[serde(default = "default_primary")]
    pub is_primary: bool,
}

impl NewDomain {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into().to_lowercase(),
            is_primary: true,
        }
    }

    pub fn secondary(domain: impl Into<String>) -> Self {
        Self {
            is_primary: false,
            ..Self::new(domain)
        }
    }
}

fn default_primary() -> bool {
    true
}

// Hostnames, optionally followed by a subfolder token
lazy_static::lazy_static! {
    static ref DOMAIN_REGEX: regex::Regex =
        regex::Regex::new(r"^[a-z0-9]([a-z0-9.-]*[a-z0-9])?(/[A-Za-z0-9_-]+)?$").unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_domain_is_lowercased_and_primary() {
        let domain = NewDomain::new("Acme.Example.COM");
        assert_eq!(domain.domain, "acme.example.com");
        assert!(domain.is_primary);
        assert!(domain.validate().is_ok());
        assert!(!NewDomain::secondary("acme.example.com").is_primary);
    }

    #[test]
    fn test_domain_validation() {
        assert!(NewDomain::new("localhost").validate().is_ok());
        assert!(NewDomain::new("example.com/acme").validate().is_ok());
        assert!(NewDomain::new("").validate().is_err());
        assert!(NewDomain::new("acme example.com").validate().is_err());
        assert!(NewDomain::new("-acme.com").validate().is_err());
    }
}
