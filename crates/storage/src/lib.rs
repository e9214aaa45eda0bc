use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use shared::{
    domain::{DatabaseHandle, FlatRecord, ItemKind, Meta},
    error::{ApiException, ErrorCode},
};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tokio::sync::broadcast;

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Local SQLite-backed item store.
///
/// Every successful write publishes a [`StoreChange`] so open feeds can
/// reload the affected project.
#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
    changes: broadcast::Sender<StoreChange>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    Records { project: String },
    Databases,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        // Every connection to `sqlite::memory:` opens its own empty database.
        let max_connections = if database_url.starts_with("sqlite::memory:") {
            1
        } else {
            5
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self { pool, changes })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub fn subscribe_changes(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    pub async fn create_database(&self, handle: &DatabaseHandle) -> Result<()> {
        sqlx::query("INSERT INTO databases (project, title, created_at) VALUES (?, ?, ?)")
            .bind(&handle.project)
            .bind(&handle.title)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to create database {}", handle.project))?;
        self.publish(StoreChange::Databases);
        Ok(())
    }

    pub async fn list_databases(&self) -> Result<Vec<DatabaseHandle>> {
        let rows = sqlx::query("SELECT project, title FROM databases ORDER BY project")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| {
                Ok(DatabaseHandle {
                    project: row.try_get("project")?,
                    title: row.try_get("title")?,
                })
            })
            .collect()
    }

    pub async fn database(&self, project: &str) -> Result<Option<DatabaseHandle>> {
        let row = sqlx::query("SELECT project, title FROM databases WHERE project = ?")
            .bind(project)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| {
            Ok(DatabaseHandle {
                project: row.try_get("project")?,
                title: row.try_get("title")?,
            })
        })
        .transpose()
    }

    pub async fn rename_database(&self, project: &str, title: &str) -> Result<bool> {
        let updated = sqlx::query("UPDATE databases SET title = ? WHERE project = ?")
            .bind(title)
            .bind(project)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if updated > 0 {
            self.publish(StoreChange::Databases);
            self.publish(StoreChange::Records {
                project: project.to_string(),
            });
        }
        Ok(updated > 0)
    }

    /// Removes a database together with its records.
    pub async fn delete_database(&self, project: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM records WHERE project = ?")
            .bind(project)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM databases WHERE project = ?")
            .bind(project)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        if deleted > 0 {
            self.publish(StoreChange::Databases);
        }
        Ok(deleted > 0)
    }

    pub async fn list_records(&self, project: &str) -> Result<Vec<FlatRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT kind, number, title, meta_json
            FROM records
            WHERE project = ?
            ORDER BY kind, number
            "#,
        )
        .bind(project)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let kind: String = row.try_get("kind")?;
                let kind = ItemKind::parse(&kind)
                    .ok_or_else(|| anyhow!("unknown record kind '{kind}' in project {project}"))?;
                let meta_json: Option<String> = row.try_get("meta_json")?;
                let meta = meta_json
                    .map(|raw| serde_json::from_str::<Meta>(&raw))
                    .transpose()
                    .context("record meta is not a JSON object")?;
                Ok(FlatRecord {
                    kind,
                    number: row.try_get("number")?,
                    title: row.try_get("title")?,
                    meta,
                })
            })
            .collect()
    }

    /// Inserts or replaces a record. Project records are rejected; projects
    /// live in the `databases` table.
    pub async fn upsert_record(&self, project: &str, record: &FlatRecord) -> Result<()> {
        if record.kind == ItemKind::Project {
            return Err(ApiException::new(
                ErrorCode::Validation,
                "project records are stored as databases",
            )
            .into());
        }
        let meta_json = record
            .meta
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        sqlx::query(
            r#"
            INSERT INTO records (project, kind, number, title, meta_json, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(project, kind, number) DO UPDATE SET
                title = excluded.title,
                meta_json = excluded.meta_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(project)
        .bind(record.kind.as_str())
        .bind(&record.number)
        .bind(&record.title)
        .bind(meta_json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .with_context(|| {
            format!(
                "failed to write {} {} in project {project}",
                record.kind, record.number
            )
        })?;
        self.publish(StoreChange::Records {
            project: project.to_string(),
        });
        Ok(())
    }

    pub async fn delete_record(&self, project: &str, kind: ItemKind, number: &str) -> Result<bool> {
        let deleted =
            sqlx::query("DELETE FROM records WHERE project = ? AND kind = ? AND number = ?")
                .bind(project)
                .bind(kind.as_str())
                .bind(number)
                .execute(&self.pool)
                .await?
                .rows_affected();
        if deleted > 0 {
            self.publish(StoreChange::Records {
                project: project.to_string(),
            });
        }
        Ok(deleted > 0)
    }

    fn publish(&self, change: StoreChange) {
        // No subscribers is not an error.
        let _ = self.changes.send(change);
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
