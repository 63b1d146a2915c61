use crate::error::{DatabaseError, Result};
use schemata_models::{Domain, NewDomain, Tenant};
use sqlx::{Connection, PgConnection};
use uuid::Uuid;

pub struct DomainRepository;

impl DomainRepository {
    /// Store a domain for a tenant.
    ///
    /// A new primary demotes the tenant's current primary in the same
    /// transaction, so there is never more than one.
    pub async fn save(conn: &mut PgConnection, tenant_id: Uuid, request: &NewDomain) -> Result<Domain> {
        let mut tx = conn.begin().await?;
        let id = Uuid::new_v4();

        if request.is_primary {
            sqlx::query(
                "UPDATE domains SET is_primary = false WHERE tenant_id = $1 AND is_primary AND id <> $2",
            )
            .bind(tenant_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }

        let domain = sqlx::query_as::<_, Domain>(
            r#"
            INSERT INTO domains (id, domain, tenant_id, is_primary)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(request.domain.to_lowercase())
        .bind(tenant_id)
        .bind(request.is_primary)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| DatabaseError::from_insert(e, "Domain", "this name"))?;

        tx.commit().await?;
        Ok(domain)
    }

    /// Tenant owning `domain`, if any
    pub async fn find_tenant_by_domain(conn: &mut PgConnection, domain: &str) -> Result<Option<Tenant>> {
        let tenant = sqlx::query_as::<_, Tenant>(
            r#"
            SELECT t.* FROM tenants t
            JOIN domains d ON d.tenant_id = t.id
            WHERE d.domain = $1
            "#,
        )
        .bind(domain.to_lowercase())
        .fetch_optional(&mut *conn)
        .await?;

        Ok(tenant)
    }

    /// Domains of a tenant, primary first
    pub async fn list_for_tenant(conn: &mut PgConnection, tenant_id: Uuid) -> Result<Vec<Domain>> {
        let domains = sqlx::query_as::<_, Domain>(
            "SELECT * FROM domains WHERE tenant_id = $1 ORDER BY is_primary DESC, domain",
        )
        .bind(tenant_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(domains)
    }

    /// Remove one domain. The tenant stays, even if this was its last domain.
    pub async fn delete(conn: &mut PgConnection, domain: &str) -> Result<Domain> {
        sqlx::query_as::<_, Domain>("DELETE FROM domains WHERE domain = $1 RETURNING *")
            .bind(domain.to_lowercase())
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| DatabaseError::not_found("Domain", domain))
    }
}
