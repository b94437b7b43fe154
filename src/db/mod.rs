//! This module is responsible for reading, writing and managing the SQLite template store.

mod migrations;

use crate::model::{DetectionPatterns, FileKind, LearnedTemplate, NewTemplate};
use crate::Result;
use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteQueryResult};
use sqlx::{FromRow, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// The persistence boundary for learned templates. Every operation is scoped to the owning user;
/// a template owned by someone else behaves as if it did not exist.
#[async_trait::async_trait]
pub trait TemplateStore: Send + Sync {
    /// Stores a new template. The whole record becomes visible at once or not at all.
    async fn create(&self, owner: &str, template: NewTemplate) -> Result<LearnedTemplate>;

    async fn get(&self, owner: &str, id: i64) -> Result<Option<LearnedTemplate>>;

    /// All templates of `owner`, oldest first.
    async fn list(&self, owner: &str) -> Result<Vec<LearnedTemplate>>;

    /// The templates of `owner` that take part in matching, oldest first.
    async fn list_active(&self, owner: &str) -> Result<Vec<LearnedTemplate>>;

    /// Increments the usage counter and sets the last-used time to now.
    async fn record_usage(&self, owner: &str, id: i64) -> Result<()>;

    async fn set_active(&self, owner: &str, id: i64, active: bool) -> Result<()>;

    async fn update_patterns(&self, owner: &str, id: i64, patterns: DetectionPatterns)
        -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct Db {
    pool: SqlitePool,
}

const COLUMNS: &str = "id, owner, name, institution, statement_type, file_kind, field_mapping, \
    detection_patterns, sample_headers, sample_rows, is_active, times_used, last_used_at, \
    created_at";

impl Db {
    /// Creates a new SQLite file at `path` and brings its schema up to date. Fails if a file
    /// already exists there.
    pub(crate) async fn init(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            bail!("A database already exists at '{}'", path.display());
        }
        let pool = connect(path, true).await?;
        sqlx::query("CREATE TABLE schema_version (version INTEGER NOT NULL)")
            .execute(&pool)
            .await
            .context("Failed to create schema_version table")?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (0)")
            .execute(&pool)
            .await
            .context("Failed to insert initial schema version")?;
        migrations::run(&pool, 0, migrations::CURRENT_VERSION).await?;
        info!("Created template database at {}", path.display());
        Ok(Self { pool })
    }

    /// Opens the SQLite file at `path` and migrates it if it is out of date.
    pub(crate) async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            bail!("The database file is missing '{}'", path.display());
        }
        let pool = connect(path, false).await?;
        let db = Self { pool };
        let version = db.schema_version().await?;
        migrations::run(&db.pool, version, migrations::CURRENT_VERSION).await?;
        Ok(db)
    }

    pub(crate) async fn schema_version(&self) -> Result<i32> {
        let row: (i32,) = sqlx::query_as("SELECT MAX(version) FROM schema_version")
            .fetch_one(&self.pool)
            .await
            .context("Failed to read the schema version")?;
        Ok(row.0)
    }

    async fn fetch(&self, owner: &str, filter: &str) -> Result<Vec<LearnedTemplate>> {
        let sql = format!("SELECT {COLUMNS} FROM templates WHERE owner = ? {filter} ORDER BY id");
        let rows: Vec<TemplateRow> = sqlx::query_as(&sql)
            .bind(owner)
            .fetch_all(&self.pool)
            .await
            .context("Failed to query templates")?;
        rows.into_iter().map(LearnedTemplate::try_from).collect()
    }
}

/// Fails when an update touched no row, i.e. the template does not exist for `owner`.
fn ensure_updated(done: SqliteQueryResult, owner: &str, id: i64) -> Result<()> {
    if done.rows_affected() == 0 {
        bail!("Template {id} was not found for owner '{owner}'");
    }
    Ok(())
}

async fn connect(path: &Path, create: bool) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
        .context("Failed to parse SQLite connection string")?
        .create_if_missing(create);
    SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open SQLite database at {}", path.display()))
}

#[async_trait::async_trait]
impl TemplateStore for Db {
    async fn create(&self, owner: &str, template: NewTemplate) -> Result<LearnedTemplate> {
        let created_at = Utc::now().to_rfc3339();
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO templates (owner, name, institution, statement_type, file_kind, \
             field_mapping, detection_patterns, sample_headers, sample_rows, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(owner)
        .bind(&template.name)
        .bind(&template.institution)
        .bind(&template.statement_type)
        .bind(template.file_kind.to_string())
        .bind(serde_json::to_string(&template.field_mapping)?)
        .bind(serde_json::to_string(&template.detection_patterns)?)
        .bind(serde_json::to_string(&template.sample_headers)?)
        .bind(serde_json::to_string(&template.sample_rows)?)
        .bind(&created_at)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to insert template")?;
        let row: TemplateRow =
            sqlx::query_as(&format!("SELECT {COLUMNS} FROM templates WHERE id = ?"))
                .bind(id)
                .fetch_one(&mut *tx)
                .await
                .context("Failed to read back the new template")?;
        tx.commit().await.context("Failed to commit template")?;
        debug!("Stored template {id} '{}' for '{owner}'", template.name);
        LearnedTemplate::try_from(row)
    }

    async fn get(&self, owner: &str, id: i64) -> Result<Option<LearnedTemplate>> {
        let row: Option<TemplateRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM templates WHERE owner = ? AND id = ?"
        ))
        .bind(owner)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to query template {id}"))?;
        row.map(LearnedTemplate::try_from).transpose()
    }

    async fn list(&self, owner: &str) -> Result<Vec<LearnedTemplate>> {
        self.fetch(owner, "").await
    }

    async fn list_active(&self, owner: &str) -> Result<Vec<LearnedTemplate>> {
        self.fetch(owner, "AND is_active = 1").await
    }

    async fn record_usage(&self, owner: &str, id: i64) -> Result<()> {
        let done = sqlx::query(
            "UPDATE templates SET times_used = times_used + 1, last_used_at = ? \
             WHERE owner = ? AND id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(owner)
        .bind(id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to record usage of template {id}"))?;
        ensure_updated(done, owner, id)
    }

    async fn set_active(&self, owner: &str, id: i64, active: bool) -> Result<()> {
        let done = sqlx::query("UPDATE templates SET is_active = ? WHERE owner = ? AND id = ?")
            .bind(active)
            .bind(owner)
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to update template {id}"))?;
        ensure_updated(done, owner, id)
    }

    async fn update_patterns(
        &self,
        owner: &str,
        id: i64,
        patterns: DetectionPatterns,
    ) -> Result<()> {
        let done = sqlx::query(
            "UPDATE templates SET detection_patterns = ? WHERE owner = ? AND id = ?",
        )
        .bind(serde_json::to_string(&patterns)?)
        .bind(owner)
        .bind(id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to update template {id}"))?;
        ensure_updated(done, owner, id)
    }
}

/// A `templates` row as stored, with JSON and timestamp columns still encoded.
#[derive(Debug, FromRow)]
struct TemplateRow {
    id: i64,
    owner: String,
    name: String,
    institution: String,
    statement_type: String,
    file_kind: String,
    field_mapping: String,
    detection_patterns: String,
    sample_headers: String,
    sample_rows: String,
    is_active: bool,
    times_used: i64,
    last_used_at: Option<String>,
    created_at: String,
}

impl TryFrom<TemplateRow> for LearnedTemplate {
    type Error = anyhow::Error;

    fn try_from(row: TemplateRow) -> Result<Self> {
        let id = row.id;
        let json = |column: &str| format!("Template {id} has an invalid {column} column");
        Ok(LearnedTemplate {
            id,
            owner: row.owner,
            name: row.name,
            institution: row.institution,
            statement_type: row.statement_type,
            file_kind: FileKind::from_str(&row.file_kind).with_context(|| json("file_kind"))?,
            field_mapping: serde_json::from_str(&row.field_mapping)
                .with_context(|| json("field_mapping"))?,
            detection_patterns: serde_json::from_str(&row.detection_patterns)
                .with_context(|| json("detection_patterns"))?,
            sample_headers: serde_json::from_str(&row.sample_headers)
                .with_context(|| json("sample_headers"))?,
            sample_rows: serde_json::from_str(&row.sample_rows)
                .with_context(|| json("sample_rows"))?,
            is_active: row.is_active,
            times_used: row.times_used,
            last_used_at: row
                .last_used_at
                .as_deref()
                .map(parse_timestamp)
                .transpose()
                .with_context(|| json("last_used_at"))?,
            created_at: parse_timestamp(&row.created_at).with_context(|| json("created_at"))?,
        })
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}
