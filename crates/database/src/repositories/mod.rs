pub mod domains;
pub mod tenants;

pub use domains::DomainRepository;
pub use tenants::TenantRepository;
