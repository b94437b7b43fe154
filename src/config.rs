//! Configuration file handling.
//!
//! The configuration file is stored at `$LEARNER_HOME/config.json`. It names the user who owns
//! the templates in this home directory and configures the PDF collaborator.

use crate::db::Db;
use crate::{utils, Result};
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APP_NAME: &str = "statement-learner";
const CONFIG_VERSION: u8 = 1;
const CONFIG_JSON: &str = "config.json";
const TEMPLATES_SQLITE: &str = "templates.sqlite";

const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// The `Config` object represents a learner home directory: its `config.json` and its template
/// database. Use [`Config::create`] for a new directory and [`Config::load`] for an existing one.
#[derive(Debug, Clone)]
pub struct Config {
    root: PathBuf,
    config_path: PathBuf,
    config_file: ConfigFile,
    db: Db,
    sqlite_path: PathBuf,
}

impl Config {
    /// Creates the home directory if needed, writes an initial `config.json` for `owner` and
    /// creates the template database.
    ///
    /// # Errors
    /// - Returns an error if a config file or database already exists, or if any file operation
    ///   fails.
    pub async fn create(dir: impl Into<PathBuf>, owner: &str) -> Result<Self> {
        if owner.trim().is_empty() {
            bail!("The owner must not be empty");
        }
        let maybe_relative = dir.into();
        utils::make_dir(&maybe_relative)
            .await
            .context("Unable to create the learner home directory")?;
        let root = utils::canonicalize(&maybe_relative).await?;

        let config_path = root.join(CONFIG_JSON);
        if config_path.exists() {
            bail!("A config file already exists at '{}'", config_path.display());
        }
        let config_file = ConfigFile {
            owner: owner.trim().to_string(),
            ..ConfigFile::default()
        };
        config_file.save(&config_path).await?;

        let sqlite_path = root.join(TEMPLATES_SQLITE);
        let db = Db::init(&sqlite_path)
            .await
            .context("Unable to create SQLite DB")?;

        Ok(Self {
            root,
            config_path,
            config_file,
            db,
            sqlite_path,
        })
    }

    /// Validates that the home directory and its config file exist, loads the config file and
    /// opens (and if needed migrates) the template database.
    pub async fn load(home: impl Into<PathBuf>) -> Result<Self> {
        let maybe_relative = home.into();
        let root = utils::canonicalize(&maybe_relative)
            .await
            .context("The learner home directory is missing")?;

        let config_path = root.join(CONFIG_JSON);
        if !config_path.is_file() {
            bail!("The config file is missing '{}'", config_path.display())
        }
        let config_file = ConfigFile::load(&config_path).await?;

        let sqlite_path = root.join(TEMPLATES_SQLITE);
        let db = Db::load(&sqlite_path)
            .await
            .context("Unable to load SQLite DB")?;

        Ok(Self {
            root,
            config_path,
            config_file,
            db,
            sqlite_path,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn sqlite_path(&self) -> &Path {
        &self.sqlite_path
    }

    pub(crate) fn db(&self) -> &Db {
        &self.db
    }

    /// The user that owns every template created or read through this configuration.
    pub fn owner(&self) -> &str {
        &self.config_file.owner
    }

    pub fn pdf(&self) -> &PdfSettings {
        &self.config_file.pdf
    }
}

/// How the PDF collaborator is run.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct PdfSettings {
    /// Program and leading arguments for structure extraction. The PDF path and the optional
    /// password are appended.
    pub extract_command: Vec<String>,

    /// Program and leading arguments for parsing. The PDF path, the field mapping as JSON and the
    /// optional password are appended.
    pub parse_command: Vec<String>,

    /// The collaborator is killed and the request fails after this many seconds.
    pub timeout_secs: u64,

    /// The collaborator is killed and the request fails if it prints more than this to stdout.
    pub max_output_bytes: usize,
}

impl Default for PdfSettings {
    fn default() -> Self {
        Self {
            extract_command: vec!["python3".into(), "template_extractor.py".into()],
            parse_command: vec!["python3".into(), "template_parser.py".into()],
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

/// Represents the serialization and deserialization format of the configuration file.
///
/// Example configuration:
/// ```json
/// {
///   "app_name": "statement-learner",
///   "config_version": 1,
///   "owner": "alice",
///   "pdf": {
///     "extract_command": ["python3", "/opt/parsers/template_extractor.py"],
///     "parse_command": ["python3", "/opt/parsers/template_parser.py"],
///     "timeout_secs": 120,
///     "max_output_bytes": 10485760
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
struct ConfigFile {
    /// Application name, should always be "statement-learner"
    app_name: String,

    config_version: u8,

    owner: String,

    #[serde(default)]
    pdf: PdfSettings,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            app_name: APP_NAME.to_string(),
            config_version: CONFIG_VERSION,
            owner: String::new(),
            pdf: PdfSettings::default(),
        }
    }
}

impl ConfigFile {
    /// Loads and validates a ConfigFile from `path`.
    async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = utils::read(path).await?;
        let config: ConfigFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file at {}", path.display()))?;

        anyhow::ensure!(
            config.app_name == APP_NAME,
            "Invalid app_name in config file: expected '{}', got '{}'",
            APP_NAME,
            config.app_name
        );
        anyhow::ensure!(
            !config.owner.trim().is_empty(),
            "The config file at {} has no owner",
            path.display()
        );
        Ok(config)
    }

    async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("Unable to serialize config")?;
        utils::write(path, data)
            .await
            .context("Unable to write config file")
    }
}
