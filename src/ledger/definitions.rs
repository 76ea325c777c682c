//! Query definition persistence.
//!
//! CRUD operations for reusable, named SQL templates. Deleting a definition
//! also deletes every run recorded against it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use sqlx::FromRow;
use uuid::Uuid;

use super::{format_timestamp, now, parse_id, parse_timestamp, runs};
use crate::error::{Result, ZeusError};

/// A saved SQL template with optional `{{param}}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryDefinition {
    pub id: Uuid,
    pub name: String,
    pub sql: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Raw database row for a query definition.
#[derive(Debug, Clone, FromRow)]
struct DefinitionRow {
    id: String,
    name: String,
    sql: String,
    description: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<DefinitionRow> for QueryDefinition {
    type Error = ZeusError;

    fn try_from(row: DefinitionRow) -> Result<Self> {
        Ok(Self {
            id: parse_id(&row.id)?,
            name: row.name,
            sql: row.sql,
            description: row.description,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

/// Fields for creating a definition.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDefinition {
    pub name: String,
    #[serde(default)]
    pub sql: String,
    #[serde(default)]
    pub description: String,
}

/// Partial update: only provided fields change.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionUpdate {
    pub name: Option<String>,
    pub sql: Option<String>,
    pub description: Option<String>,
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(ZeusError::validation("Query name is required"));
    }
    Ok(())
}

/// Creates a new definition.
pub async fn create_definition(
    pool: &SqlitePool,
    definition: &NewDefinition,
) -> Result<QueryDefinition> {
    validate_name(&definition.name)?;

    let created = now();
    let record = QueryDefinition {
        id: Uuid::new_v4(),
        name: definition.name.clone(),
        sql: definition.sql.clone(),
        description: definition.description.clone(),
        created_at: created,
        updated_at: created,
    };

    sqlx::query(
        r#"
        INSERT INTO query_definitions (id, name, sql, description, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.id.to_string())
    .bind(&record.name)
    .bind(&record.sql)
    .bind(&record.description)
    .bind(format_timestamp(&record.created_at))
    .bind(format_timestamp(&record.updated_at))
    .execute(pool)
    .await
    .map_err(|e| ZeusError::persistence(format!("Failed to create query: {e}")))?;

    Ok(record)
}

/// Gets a definition by ID.
pub async fn get_definition(pool: &SqlitePool, id: Uuid) -> Result<Option<QueryDefinition>> {
    let row: Option<DefinitionRow> = sqlx::query_as(
        r#"
        SELECT id, name, sql, description, created_at, updated_at
        FROM query_definitions
        WHERE id = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await
    .map_err(|e| ZeusError::persistence(format!("Failed to get query: {e}")))?;

    row.map(QueryDefinition::try_from).transpose()
}

/// Lists all definitions, oldest first.
pub async fn list_definitions(pool: &SqlitePool) -> Result<Vec<QueryDefinition>> {
    let rows: Vec<DefinitionRow> = sqlx::query_as(
        r#"
        SELECT id, name, sql, description, created_at, updated_at
        FROM query_definitions
        ORDER BY created_at, rowid
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(|e| ZeusError::persistence(format!("Failed to list queries: {e}")))?;

    rows.into_iter().map(QueryDefinition::try_from).collect()
}

/// Applies a partial update. Returns `None` if the definition does not exist.
pub async fn update_definition(
    pool: &SqlitePool,
    id: Uuid,
    update: &DefinitionUpdate,
) -> Result<Option<QueryDefinition>> {
    if let Some(name) = &update.name {
        validate_name(name)?;
    }

    let result = sqlx::query(
        r#"
        UPDATE query_definitions
        SET name = COALESCE(?, name),
            sql = COALESCE(?, sql),
            description = COALESCE(?, description),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(update.name.as_deref())
    .bind(update.sql.as_deref())
    .bind(update.description.as_deref())
    .bind(format_timestamp(&now()))
    .bind(id.to_string())
    .execute(pool)
    .await
    .map_err(|e| ZeusError::persistence(format!("Failed to update query: {e}")))?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }

    get_definition(pool, id).await
}

/// Deletes a definition and all of its runs in one transaction.
///
/// Returns the number of runs deleted, or `None` if the definition does not exist.
pub async fn delete_definition(pool: &SqlitePool, id: Uuid) -> Result<Option<u64>> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| ZeusError::persistence(format!("Failed to begin transaction: {e}")))?;

    let result = sqlx::query("DELETE FROM query_definitions WHERE id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(|e| ZeusError::persistence(format!("Failed to delete query: {e}")))?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }

    let deleted_runs = runs::delete_runs_for_definition(&mut *tx, id).await?;

    tx.commit()
        .await
        .map_err(|e| ZeusError::persistence(format!("Failed to commit delete: {e}")))?;

    Ok(Some(deleted_runs))
}
