//! PostgreSQL implementation of the engine collaborators.
//!
//! One pool serves the integrity store, the permission store and ancestor oracle, the
//! audit sink and the user directory.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::FromRow;
use tracing::instrument;

use crate::integrity::{Digestible, IntegrityStore, RecordSnapshot, TrackedTable};
use crate::models::{
    AdminUser, AuditEvent, Customer, HorizontalDigest, Order, PermissionEdge, PermissionRecord,
    Product,
};
use crate::permissions::{AncestorOracle, PermissionGraph, PermissionStore, PlannedNode};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::{AuditSink, UserDirectory};

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_snapshots<T>(
        &self,
        sql: &str,
        record_id: Option<i64>,
    ) -> Result<Vec<RecordSnapshot>, anyhow::Error>
    where
        T: for<'r> FromRow<'r, PgRow> + Digestible + Send + Unpin,
    {
        let mut query = sqlx::query_as::<_, T>(sql);
        if let Some(id) = record_id {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(RecordSnapshot::capture).collect())
    }

    async fn snapshots(
        &self,
        table: TrackedTable,
        record_id: Option<i64>,
    ) -> Result<Vec<RecordSnapshot>, anyhow::Error> {
        let filter = if record_id.is_some() {
            "WHERE id = $1"
        } else {
            "ORDER BY id"
        };
        let sql = format!(
            "SELECT {} FROM {} {}",
            select_list(table),
            table.name(),
            filter
        );

        match table {
            TrackedTable::Products => self.fetch_snapshots::<Product>(&sql, record_id).await,
            TrackedTable::Customers => self.fetch_snapshots::<Customer>(&sql, record_id).await,
            TrackedTable::Orders => self.fetch_snapshots::<Order>(&sql, record_id).await,
        }
    }
}

fn select_list(table: TrackedTable) -> &'static str {
    match table {
        TrackedTable::Products => {
            "id, sku, name, description, price, stock, category, active, updated_utc, tags, dvh"
        }
        TrackedTable::Customers => "id, email, full_name, phone, blocked, created_utc, dvh",
        TrackedTable::Orders => "id, customer_id, status, total, placed_utc, dvh",
    }
}

// ==================== Integrity Store ====================

#[async_trait]
impl IntegrityStore for Database {
    async fn get_horizontal_digest(
        &self,
        table: TrackedTable,
        record_id: i64,
    ) -> Result<Option<String>, anyhow::Error> {
        let digest = sqlx::query_scalar::<_, String>(
            "SELECT digest FROM integrity_horizontal_digests WHERE table_name = $1 AND record_id = $2",
        )
        .bind(table.name())
        .bind(record_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(digest)
    }

    async fn list_horizontal_digests(
        &self,
        table: TrackedTable,
    ) -> Result<Vec<HorizontalDigest>, anyhow::Error> {
        let digests = sqlx::query_as::<_, HorizontalDigest>(
            r#"
            SELECT table_name, record_id, digest
            FROM integrity_horizontal_digests
            WHERE table_name = $1
            ORDER BY record_id
            "#,
        )
        .bind(table.name())
        .fetch_all(&self.pool)
        .await?;
        Ok(digests)
    }

    /// Upserts the digest record and mirrors it into the entity's `dvh` column.
    async fn put_horizontal_digest(
        &self,
        table: TrackedTable,
        record_id: i64,
        digest: &str,
    ) -> Result<(), anyhow::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO integrity_horizontal_digests (table_name, record_id, digest, updated_utc)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (table_name, record_id)
            DO UPDATE SET digest = EXCLUDED.digest, updated_utc = NOW()
            "#,
        )
        .bind(table.name())
        .bind(record_id)
        .bind(digest)
        .execute(&mut *tx)
        .await?;

        sqlx::query(&format!("UPDATE {} SET dvh = $1 WHERE id = $2", table.name()))
            .bind(digest)
            .bind(record_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete_horizontal_digest(
        &self,
        table: TrackedTable,
        record_id: i64,
    ) -> Result<(), anyhow::Error> {
        sqlx::query(
            "DELETE FROM integrity_horizontal_digests WHERE table_name = $1 AND record_id = $2",
        )
        .bind(table.name())
        .bind(record_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_vertical_digest(
        &self,
        table: TrackedTable,
        column: &str,
    ) -> Result<Option<String>, anyhow::Error> {
        let digest = sqlx::query_scalar::<_, String>(
            "SELECT digest FROM integrity_vertical_digests WHERE table_name = $1 AND column_name = $2",
        )
        .bind(table.name())
        .bind(column)
        .fetch_optional(&self.pool)
        .await?;
        Ok(digest)
    }

    async fn put_vertical_digest(
        &self,
        table: TrackedTable,
        column: &str,
        digest: &str,
    ) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"
            INSERT INTO integrity_vertical_digests (table_name, column_name, digest, updated_utc)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (table_name, column_name)
            DO UPDATE SET digest = EXCLUDED.digest, updated_utc = NOW()
            "#,
        )
        .bind(table.name())
        .bind(column)
        .bind(digest)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_records(
        &self,
        table: TrackedTable,
    ) -> Result<Vec<RecordSnapshot>, anyhow::Error> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_records"])
            .start_timer();
        let records = self.snapshots(table, None).await;
        timer.observe_duration();
        records
    }

    async fn find_record(
        &self,
        table: TrackedTable,
        record_id: i64,
    ) -> Result<Option<RecordSnapshot>, anyhow::Error> {
        Ok(self.snapshots(table, Some(record_id)).await?.into_iter().next())
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map_err(|e| {
            tracing::error!("Database health check failed: {}", e);
            anyhow::anyhow!("Database health check failed: {}", e)
        })?;
        Ok(())
    }
}

// ==================== Permission Store ====================

#[async_trait]
impl AncestorOracle for Database {
    async fn is_ancestor(
        &self,
        candidate_ancestor_id: i64,
        node_id: i64,
    ) -> Result<bool, anyhow::Error> {
        // UNION (not UNION ALL) deduplicates rows, so a corrupt cycle still terminates.
        let found = sqlx::query_scalar::<_, bool>(
            r#"
            WITH RECURSIVE descendants(id) AS (
                SELECT child_id FROM permission_edges WHERE parent_id = $1
                UNION
                SELECT e.child_id
                FROM permission_edges e
                JOIN descendants d ON e.parent_id = d.id
            )
            SELECT EXISTS (SELECT 1 FROM descendants WHERE id = $2)
            "#,
        )
        .bind(candidate_ancestor_id)
        .bind(node_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(found)
    }
}

#[async_trait]
impl PermissionStore for Database {
    #[instrument(skip(self))]
    async fn load_graph(&self) -> Result<PermissionGraph, anyhow::Error> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["load_permission_graph"])
            .start_timer();

        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;

        let records = sqlx::query_as::<_, PermissionRecord>(
            "SELECT id, name, is_composite FROM permissions ORDER BY id",
        )
        .fetch_all(&mut *tx)
        .await?;
        let edges = sqlx::query_as::<_, PermissionEdge>(
            "SELECT parent_id, child_id, position FROM permission_edges ORDER BY parent_id, position",
        )
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        timer.observe_duration();
        Ok(PermissionGraph::new(records, edges))
    }

    #[instrument(skip(self, plan), fields(nodes = plan.len()))]
    async fn save_tree(&self, plan: &[PlannedNode]) -> Result<i64, anyhow::Error> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["save_permission_tree"])
            .start_timer();

        let mut tx = self.pool.begin().await?;
        let mut ids = vec![0_i64; plan.len()];

        for step in plan {
            let id = if step.id == 0 {
                sqlx::query_scalar::<_, i64>(
                    "INSERT INTO permissions (name, is_composite) VALUES ($1, $2) RETURNING id",
                )
                .bind(&step.name)
                .bind(step.is_composite)
                .fetch_one(&mut *tx)
                .await?
            } else {
                if step.write {
                    let updated = sqlx::query(
                        "UPDATE permissions SET name = $1 WHERE id = $2 AND is_composite = $3",
                    )
                    .bind(&step.name)
                    .bind(step.id)
                    .bind(step.is_composite)
                    .execute(&mut *tx)
                    .await?;
                    if updated.rows_affected() != 1 {
                        return Err(anyhow::anyhow!(
                            "permission {} vanished or changed kind during save",
                            step.id
                        ));
                    }
                }
                step.id
            };
            ids[step.key] = id;

            if step.write && step.is_composite {
                // Children are replaced wholesale inside the transaction.
                sqlx::query("DELETE FROM permission_edges WHERE parent_id = $1")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;

                for (position, child_key) in step.children.iter().enumerate() {
                    sqlx::query(
                        "INSERT INTO permission_edges (parent_id, child_id, position) VALUES ($1, $2, $3)",
                    )
                    .bind(id)
                    .bind(ids[*child_key])
                    .bind(position as i32)
                    .execute(&mut *tx)
                    .await?;
                }
            }
        }

        let root_id = ids
            .last()
            .copied()
            .ok_or_else(|| anyhow::anyhow!("empty save plan"))?;
        tx.commit().await?;

        timer.observe_duration();
        Ok(root_id)
    }

    async fn delete_node(&self, id: i64) -> Result<bool, anyhow::Error> {
        // Edges and grants cascade.
        let result = sqlx::query("DELETE FROM permissions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn held_roots(&self, user_id: i64) -> Result<Vec<i64>, anyhow::Error> {
        let roots = sqlx::query_scalar::<_, i64>(
            "SELECT permission_id FROM user_permissions WHERE user_id = $1 ORDER BY permission_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(roots)
    }

    async fn grant_roots(&self, user_id: i64, root_ids: &[i64]) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"
            INSERT INTO user_permissions (user_id, permission_id)
            SELECT $1, UNNEST($2::BIGINT[])
            ON CONFLICT (user_id, permission_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(root_ids)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// ==================== Audit & Users ====================

#[async_trait]
impl AuditSink for Database {
    async fn record(&self, event: AuditEvent) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"
            INSERT INTO audit_events (event_id, actor, event_type_code, target_type, target_id, event_data, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(event.event_id)
        .bind(&event.actor)
        .bind(&event.event_type_code)
        .bind(&event.target_type)
        .bind(&event.target_id)
        .bind(&event.event_data)
        .bind(event.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for Database {
    async fn find_by_username(&self, username: &str) -> Result<Option<AdminUser>, anyhow::Error> {
        let user = sqlx::query_as::<_, AdminUser>(
            "SELECT id, username, password_hash, is_blocked, created_utc FROM admin_users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }
}
