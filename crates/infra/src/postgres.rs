//! Postgres-backed permission source.
//!
//! Reads (never writes) three tables:
//!
//! ```sql
//! role_hierarchy            (child_role text, parent_role text)
//! role_permission_snapshots (role text primary key, permissions jsonb)
//! role_permissions          (role text, table_name text, action text,
//!                            condition_sql text, condition jsonb)
//! ```
//!
//! ## Error Mapping
//!
//! | SQLx Error | SourceError |
//! |------------|-------------|
//! | PoolClosed, Io, Tls, PoolTimedOut | `Unavailable` |
//! | Database, other | `Unavailable` (logged with the operation name) |
//! | ColumnDecode, Decode, ColumnNotFound | `Malformed` |
//!
//! Duplicate `role_permissions` rows for one rule are `Malformed` too.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::{instrument, warn};

use contentgate_auth::{ConditionRecord, HierarchyEdge, PermissionSource, SourceError};
use contentgate_core::{Action, GateError, GateResult, Resource, Role};

#[derive(Debug, Clone)]
pub struct PgPermissionSource {
    pool: Arc<PgPool>,
}

impl PgPermissionSource {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a small pool against `database_url`.
    pub async fn connect(database_url: &str) -> GateResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await
            .map_err(|e| GateError::configuration(format!("cannot connect to database: {e}")))?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl PermissionSource for PgPermissionSource {
    #[instrument(skip_all, err)]
    async fn list_hierarchy_edges(&self) -> Result<Vec<HierarchyEdge>, SourceError> {
        let rows = sqlx::query(
            r#"
            SELECT child_role, parent_role
            FROM role_hierarchy
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_hierarchy_edges", e))?;

        let mut edges = Vec::with_capacity(rows.len());
        for row in rows {
            let child: Option<String> = row
                .try_get("child_role")
                .map_err(|e| map_sqlx_error("list_hierarchy_edges", e))?;
            let parent: Option<String> = row
                .try_get("parent_role")
                .map_err(|e| map_sqlx_error("list_hierarchy_edges", e))?;
            match (child, parent) {
                (Some(child), Some(parent)) => edges.push(HierarchyEdge::new(child, parent)),
                _ => warn!("skipping role_hierarchy row with null role"),
            }
        }
        Ok(edges)
    }

    #[instrument(skip_all, fields(role = %role), err)]
    async fn permission_snapshot(&self, role: &Role) -> Result<Option<JsonValue>, SourceError> {
        let row = sqlx::query(
            r#"
            SELECT permissions
            FROM role_permission_snapshots
            WHERE role = $1
            "#,
        )
        .bind(role.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("permission_snapshot", e))?;

        match row {
            Some(row) => row
                .try_get::<Option<JsonValue>, _>("permissions")
                .map_err(|e| map_sqlx_error("permission_snapshot", e)),
            None => Ok(None),
        }
    }

    #[instrument(skip_all, fields(role = %role, resource = %resource, action = %action), err)]
    async fn condition_for_rule(
        &self,
        role: &Role,
        resource: &Resource,
        action: Action,
    ) -> Result<Option<ConditionRecord>, SourceError> {
        // Two rows are enough to tell a duplicate rule apart.
        let rows = sqlx::query(
            r#"
            SELECT condition_sql, condition
            FROM role_permissions
            WHERE role = $1 AND table_name = $2 AND action = $3
            LIMIT 2
            "#,
        )
        .bind(role.as_str())
        .bind(resource.as_str())
        .bind(action.as_str())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("condition_for_rule", e))?;

        let Some(row) = single_rule_row(rows, role, resource, action)? else {
            return Ok(None);
        };
        let sql: Option<String> = row
            .try_get("condition_sql")
            .map_err(|e| map_sqlx_error("condition_for_rule", e))?;
        let predicate: Option<JsonValue> = row
            .try_get("condition")
            .map_err(|e| map_sqlx_error("condition_for_rule", e))?;

        Ok(condition_record(sql, predicate))
    }
}

/// More than one row for a (role, table, action) is ambiguous and fails the
/// lookup instead of picking one.
fn single_rule_row<T>(
    mut rows: Vec<T>,
    role: &Role,
    resource: &Resource,
    action: Action,
) -> Result<Option<T>, SourceError> {
    match rows.len() {
        0 => Ok(None),
        1 => Ok(rows.pop()),
        _ => Err(SourceError::Malformed(format!(
            "duplicate role_permissions rows for {role} / {resource} / {action}"
        ))),
    }
}

/// A rule row with neither a template nor a predicate carries no condition.
fn condition_record(sql: Option<String>, predicate: Option<JsonValue>) -> Option<ConditionRecord> {
    let sql = sql.unwrap_or_default();
    let predicate = predicate.filter(|p| !p.is_null());
    if sql.trim().is_empty() && predicate.is_none() {
        return None;
    }
    Some(ConditionRecord { sql, predicate })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> SourceError {
    match err {
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            SourceError::Malformed(format!("{operation}: {err}"))
        }
        sqlx::Error::Database(db_err) => {
            SourceError::Unavailable(format!("database error in {operation}: {}", db_err.message()))
        }
        sqlx::Error::PoolClosed => SourceError::Unavailable(format!("connection pool closed in {operation}")),
        sqlx::Error::PoolTimedOut => SourceError::Unavailable(format!("connection pool timed out in {operation}")),
        _ => SourceError::Unavailable(format!("sqlx error in {operation}: {err}")),
    }
}
