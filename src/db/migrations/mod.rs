//! Schema migrations for the template store.
//!
//! `migration_NN_up.sql` takes the schema from version `NN - 1` to `NN`, and
//! `migration_NN_down.sql` takes it back.

use anyhow::{bail, Context};
use sqlx::{Executor, SqlitePool};
use tracing::debug;

use crate::Result;

struct Migration {
    version: i32,
    up: &'static str,
    down: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    up: include_str!("migration_01_up.sql"),
    down: include_str!("migration_01_down.sql"),
}];

/// The schema version this build expects.
pub(crate) const CURRENT_VERSION: i32 = 1;

/// Moves the schema from `from` to `to`, up or down, one version at a time. Each step and its
/// `schema_version` update share a transaction. Nothing runs if a needed migration is missing.
pub(crate) async fn run(pool: &SqlitePool, from: i32, to: i32) -> Result<()> {
    if from == to {
        debug!("Schema is at version {to}, nothing to migrate");
        return Ok(());
    }
    let steps = plan(from, to)?;
    for (migration, up) in steps {
        let (sql, version) = if up {
            (migration.up, migration.version)
        } else {
            (migration.down, migration.version - 1)
        };
        debug!(
            "Applying migration {:02} ({})",
            migration.version,
            if up { "up" } else { "down" }
        );
        apply(pool, sql, version).await?;
    }
    debug!("Schema migrated from version {from} to {to}");
    Ok(())
}

/// The migrations to apply, in order, each paired with its direction (`true` for up).
fn plan(from: i32, to: i32) -> Result<Vec<(&'static Migration, bool)>> {
    let up = from < to;
    let versions: Vec<i32> = if up {
        (from + 1..=to).collect()
    } else {
        (to + 1..=from).rev().collect()
    };
    let mut steps = Vec::with_capacity(versions.len());
    for version in versions {
        match MIGRATIONS.iter().find(|m| m.version == version) {
            Some(m) => steps.push((m, up)),
            None => bail!("Migration {version} is needed to go from version {from} to {to}"),
        }
    }
    Ok(steps)
}

async fn apply(pool: &SqlitePool, sql: &str, version: i32) -> Result<()> {
    let mut tx = pool
        .begin()
        .await
        .context("Failed to begin migration transaction")?;
    tx.execute(sql)
        .await
        .context("Failed to execute migration SQL")?;
    sqlx::query("DELETE FROM schema_version")
        .execute(&mut *tx)
        .await
        .context("Failed to clear schema_version")?;
    sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(&mut *tx)
        .await
        .context("Failed to update schema_version")?;
    tx.commit()
        .await
        .context("Failed to commit migration transaction")
}
