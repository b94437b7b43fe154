use clap::Parser;
use statement_learner::args::{Args, Command, TemplatesSubcommand};
use statement_learner::{commands, Config, Result};
use std::process::ExitCode;
use tracing::{debug, error, trace};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let log_level = args.common().log_level();
    init_logger(log_level);
    debug!("Log level set to {}", log_level.to_string().to_lowercase());

    match main_inner(args).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Exiting with error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

pub async fn main_inner(args: Args) -> Result<()> {
    trace!("{args:?}");
    let home = args.common().home().path();

    // Route to appropriate command handler
    let _: () = match args.command() {
        Command::Init(init_args) => commands::init(home, init_args.owner()).await?.print(),

        Command::Learn(learn_args) => {
            let config = Config::load(home).await?;
            commands::learn(config, learn_args.clone()).await?.print()
        }

        Command::Parse(parse_args) => {
            let config = Config::load(home).await?;
            commands::parse(config, parse_args.clone()).await?.print()
        }

        Command::Match(match_args) => {
            let config = Config::load(home).await?;
            commands::match_file(config, match_args.clone())
                .await?
                .print()
        }

        Command::Templates(templates_args) => {
            let config = Config::load(home).await?;
            match templates_args.action() {
                TemplatesSubcommand::List => commands::list_templates(config).await?.print(),
                TemplatesSubcommand::Show(id) => {
                    commands::show_template(config, id.id()).await?.print()
                }
                TemplatesSubcommand::Activate(id) => {
                    commands::activate_template(config, id.id()).await?.print()
                }
                TemplatesSubcommand::Deactivate(id) => {
                    commands::deactivate_template(config, id.id())
                        .await?
                        .print()
                }
                TemplatesSubcommand::Patterns(pattern_args) => {
                    commands::set_template_patterns(config, pattern_args.clone())
                        .await?
                        .print()
                }
            }
        }
    };
    Ok(())
}

/// Initializes the tracing subscriber.
pub fn init_logger(level: LevelFilter) {
    let filter = match std::env::var("RUST_LOG").ok() {
        Some(_) => {
            // RUST_LOG exists; use it.
            EnvFilter::from_default_env()
        }
        None => {
            // RUST_LOG does not exist; use default log level for this crate only.
            EnvFilter::new(format!(
                "{}={},{}={}",
                env!("CARGO_CRATE_NAME"),
                level,
                "statement_learner",
                level
            ))
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
