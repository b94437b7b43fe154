//! These structs provide the CLI interface for the learner CLI.

use crate::model::{ColumnSource, SystemField};
use clap::{Parser, Subcommand};
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::error;
use tracing_subscriber::filter::LevelFilter;

/// learner: learns how to read your bank statements.
///
/// Show it one sample export of a statement (CSV, Excel or PDF) and it finds the header row,
/// works out which column is the date, the description and the amounts, and saves that as a
/// template. Later statements in the same format are recognized and parsed into transactions.
///
/// PDF statements are handled by an external extractor program configured in
/// `$LEARNER_HOME/config.json`.
#[derive(Debug, Parser, Clone)]
pub struct Args {
    #[clap(flatten)]
    common: Common,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    pub fn new(common: Common, command: Command) -> Self {
        Self { common, command }
    }

    pub fn common(&self) -> &Common {
        &self.common
    }

    pub fn command(&self) -> &Command {
        &self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create the home directory, its config file and the template database.
    ///
    /// This is the first command you should run. By default the home directory is
    /// $HOME/statements; pass --home or set LEARNER_HOME to put it somewhere else.
    Init(InitArgs),
    /// Learn a template from a sample statement.
    Learn(LearnArgs),
    /// Parse a statement into transactions with a learned template.
    Parse(ParseArgs),
    /// Score every active template against a statement.
    Match(MatchArgs),
    /// List, show, activate, deactivate or edit learned templates.
    Templates(TemplatesArgs),
}

/// Arguments common to all subcommands.
#[derive(Debug, Parser, Clone)]
pub struct Common {
    /// The logging verbosity. One of, from least to most verbose:
    /// off, error, warn, info, debug, trace
    ///
    /// This can be overridden by RUST_LOG. See the tracing-subscriber crate for instructions.
    #[arg(long, default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,

    /// The directory where the config and templates are held. Defaults to ~/statements
    #[arg(long, env = "LEARNER_HOME", default_value_t = default_home())]
    home: DisplayPath,
}

impl Common {
    pub fn new(log_level: LevelFilter, home: PathBuf) -> Self {
        Self {
            log_level,
            home: home.into(),
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    pub fn home(&self) -> &DisplayPath {
        &self.home
    }
}

/// Args for the `learner init` command.
#[derive(Debug, Parser, Clone)]
pub struct InitArgs {
    /// The user who owns the templates in this home directory.
    #[arg(long, env = "USER")]
    owner: String,
}

impl InitArgs {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }
}

/// A manual `field=column` assignment, e.g. `narration=2` or `date=col_0`.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Assignment {
    pub field: SystemField,
    pub column: usize,
}

impl FromStr for Assignment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((field, column)) = s.split_once('=') else {
            return Err(format!("'{s}' should look like field=column, e.g. narration=2"));
        };
        let field = SystemField::from_str(field.trim())
            .map_err(|_| format!("'{}' is not a field name", field.trim()))?;
        let column = ColumnSource::from_str(column)?.index();
        Ok(Self { field, column })
    }
}

/// Args for the `learner learn` command.
#[derive(Debug, Parser, Clone)]
pub struct LearnArgs {
    /// The sample statement: .csv, .tsv, .txt, .xlsx, .xls, .xlsm, .xlsb, .ods or .pdf
    file: PathBuf,

    /// A name for the template.
    #[arg(long)]
    name: String,

    /// The bank or card issuer. Guessed from the sample when omitted.
    #[arg(long)]
    institution: Option<String>,

    /// The kind of statement, e.g. savings or credit_card.
    #[arg(long, default_value = "bank_statement")]
    statement_type: String,

    /// The password of an encrypted PDF.
    #[arg(long)]
    password: Option<String>,

    /// Override the suggested mapping, e.g. --map narration=2. A column taken from another field
    /// is removed from that field. May be repeated.
    #[arg(long = "map")]
    assignments: Vec<Assignment>,

    /// Remove a field from the suggested mapping. May be repeated.
    #[arg(long = "unmap")]
    unassigned: Vec<SystemField>,

    /// An extra substring that identifies this format in a file's text. May be repeated.
    #[arg(long = "text-pattern")]
    text_patterns: Vec<String>,

    /// A substring or regular expression that identifies this format by file name. May be
    /// repeated.
    #[arg(long = "filename-pattern")]
    filename_patterns: Vec<String>,

    /// Show what would be learned without saving a template.
    #[arg(long)]
    dry_run: bool,
}

impl LearnArgs {
    pub fn new(file: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            name: name.into(),
            institution: None,
            statement_type: "bank_statement".to_string(),
            password: None,
            assignments: Vec::new(),
            unassigned: Vec::new(),
            text_patterns: Vec::new(),
            filename_patterns: Vec::new(),
            dry_run: false,
        }
    }

    pub fn with_institution(mut self, institution: impl Into<String>) -> Self {
        self.institution = Some(institution.into());
        self
    }

    pub fn with_assignment(mut self, field: SystemField, column: usize) -> Self {
        self.assignments.push(Assignment { field, column });
        self
    }

    pub fn with_unassigned(mut self, field: SystemField) -> Self {
        self.unassigned.push(field);
        self
    }

    pub fn with_filename_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.filename_patterns.push(pattern.into());
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn institution(&self) -> Option<&str> {
        self.institution.as_deref()
    }

    pub fn statement_type(&self) -> &str {
        &self.statement_type
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }

    pub fn unassigned(&self) -> &[SystemField] {
        &self.unassigned
    }

    pub fn text_patterns(&self) -> &[String] {
        &self.text_patterns
    }

    pub fn filename_patterns(&self) -> &[String] {
        &self.filename_patterns
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }
}

/// Args for the `learner parse` command.
#[derive(Debug, Parser, Clone)]
pub struct ParseArgs {
    /// The statement to parse.
    file: PathBuf,

    /// The template to parse with. When omitted the best matching active template is used.
    #[arg(long)]
    template: Option<i64>,

    /// The password of an encrypted PDF.
    #[arg(long)]
    password: Option<String>,
}

impl ParseArgs {
    pub fn new(file: impl Into<PathBuf>, template: Option<i64>) -> Self {
        Self {
            file: file.into(),
            template,
            password: None,
        }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn template(&self) -> Option<i64> {
        self.template
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }
}

/// Args for the `learner match` command.
#[derive(Debug, Parser, Clone)]
pub struct MatchArgs {
    /// The statement to recognize.
    file: PathBuf,

    /// The password of an encrypted PDF.
    #[arg(long)]
    password: Option<String>,
}

impl MatchArgs {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            password: None,
        }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }
}

/// Args for the `learner templates` command.
#[derive(Debug, Parser, Clone)]
pub struct TemplatesArgs {
    #[command(subcommand)]
    action: TemplatesSubcommand,
}

impl TemplatesArgs {
    pub fn new(action: TemplatesSubcommand) -> Self {
        Self { action }
    }

    pub fn action(&self) -> &TemplatesSubcommand {
        &self.action
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum TemplatesSubcommand {
    /// List every template, active or not.
    List,
    /// Show one template in full.
    Show(TemplateId),
    /// Let a template take part in matching again.
    Activate(TemplateId),
    /// Stop a template from taking part in matching. It is kept and can be reactivated.
    Deactivate(TemplateId),
    /// Replace the detection patterns of a template.
    Patterns(PatternArgs),
}

#[derive(Debug, Parser, Clone)]
pub struct TemplateId {
    id: i64,
}

impl TemplateId {
    pub fn new(id: i64) -> Self {
        Self { id }
    }

    pub fn id(&self) -> i64 {
        self.id
    }
}

/// Args for `learner templates patterns`.
#[derive(Debug, Parser, Clone)]
pub struct PatternArgs {
    id: i64,

    /// A substring that identifies this format in a file's text. May be repeated.
    #[arg(long = "text-pattern")]
    text_patterns: Vec<String>,

    /// A substring or regular expression matched against file names. May be repeated.
    #[arg(long = "filename-pattern")]
    filename_patterns: Vec<String>,
}

impl PatternArgs {
    pub fn new(id: i64, text_patterns: Vec<String>, filename_patterns: Vec<String>) -> Self {
        Self {
            id,
            text_patterns,
            filename_patterns,
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn text_patterns(&self) -> &[String] {
        &self.text_patterns
    }

    pub fn filename_patterns(&self) -> &[String] {
        &self.filename_patterns
    }
}

fn default_home() -> DisplayPath {
    DisplayPath(match dirs::home_dir() {
        Some(home) => home.join("statements"),
        None => {
            error!(
                "There was an error when trying to get your home directory. You can get around \
                this by providing --home or LEARNER_HOME instead of relying on the default \
                home directory.",
            );
            PathBuf::from("statements")
        }
    })
}

/// A path that can be used as a clap default value.
#[derive(Debug, Clone)]
pub struct DisplayPath(PathBuf);

impl From<PathBuf> for DisplayPath {
    fn from(value: PathBuf) -> Self {
        DisplayPath(value)
    }
}

impl Deref for DisplayPath {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<Path> for DisplayPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl Display for DisplayPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_string_lossy())
    }
}

impl FromStr for DisplayPath {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(PathBuf::from(s)))
    }
}

impl DisplayPath {
    pub fn path(&self) -> &Path {
        &self.0
    }
}
