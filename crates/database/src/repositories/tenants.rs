use crate::error::{DatabaseError, Result};
use schemata_models::{NewTenant, Tenant};
use sqlx::PgConnection;
use uuid::Uuid;

/// Queries against the `tenants` registry table.
///
/// The table lives in public, so callers pass a connection whose session is
/// scoped to public.
pub struct TenantRepository;

impl TenantRepository {
    pub async fn create(conn: &mut PgConnection, request: &NewTenant) -> Result<Tenant> {
        let tenant = sqlx::query_as::<_, Tenant>(
            r#"
            INSERT INTO tenants (id, schema_name, name, tenant_type)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&request.schema_name)
        .bind(&request.name)
        .bind(&request.tenant_type)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| DatabaseError::from_insert(e, "Tenant", "this schema_name"))?;

        Ok(tenant)
    }

    pub async fn find_by_schema_name(conn: &mut PgConnection, schema_name: &str) -> Result<Tenant> {
        Self::get_by_schema_name(conn, schema_name)
            .await?
            .ok_or_else(|| DatabaseError::not_found("Tenant", schema_name))
    }

    pub async fn get_by_schema_name(
        conn: &mut PgConnection,
        schema_name: &str,
    ) -> Result<Option<Tenant>> {
        let tenant = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE schema_name = $1")
            .bind(schema_name)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(tenant)
    }

    /// All tenants, oldest first
    pub async fn list(conn: &mut PgConnection) -> Result<Vec<Tenant>> {
        let tenants = sqlx::query_as::<_, Tenant>(
            "SELECT * FROM tenants ORDER BY created_at, schema_name",
        )
        .fetch_all(&mut *conn)
        .await?;

        Ok(tenants)
    }

    pub async fn list_by_type(conn: &mut PgConnection, tenant_type: &str) -> Result<Vec<Tenant>> {
        let tenants = sqlx::query_as::<_, Tenant>(
            "SELECT * FROM tenants WHERE tenant_type = $1 ORDER BY created_at, schema_name",
        )
        .bind(tenant_type)
        .fetch_all(&mut *conn)
        .await?;

        Ok(tenants)
    }

    pub async fn update_schema_name(
        conn: &mut PgConnection,
        id: Uuid,
        schema_name: &str,
    ) -> Result<Tenant> {
        let tenant = sqlx::query_as::<_, Tenant>(
            r#"
            UPDATE tenants
            SET schema_name = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(schema_name)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| DatabaseError::from_insert(e, "Tenant", "this schema_name"))?
        .ok_or_else(|| DatabaseError::not_found("Tenant", &id.to_string()))?;

        Ok(tenant)
    }

    /// Delete a tenant row; its domains go with it
    pub async fn delete(conn: &mut PgConnection, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM tenants WHERE id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("Tenant", &id.to_string()));
        }

        Ok(())
    }
}
