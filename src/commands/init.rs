use crate::commands::Out;
use crate::{Config, Result};
use anyhow::Context;
use std::path::Path;

/// Creates the home directory with an initial `config.json` owned by `owner` and an empty
/// template database.
///
/// # Arguments
/// - `home` - The directory that will hold the config and templates, e.g. `$HOME/statements`
/// - `owner` - The user who owns every template learned in this home directory.
///
/// # Errors
/// - Returns an error if the directory is already initialized or any file operation fails.
pub async fn init(home: &Path, owner: &str) -> Result<Out<()>> {
    let config = Config::create(home, owner)
        .await
        .context("Unable to create the home directory and configs")?;
    Ok(format!(
        "Successfully created the learner home directory at {}",
        config.root().display()
    )
    .into())
}
