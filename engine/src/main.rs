// Annotator
// Main entry point for the annotator binary

use annotator_engine::cli::{Cli, Command, SessionAction};
use annotator_engine::config::Config;
use annotator_engine::handlers::{
    handle_run, handle_sessions_delete, handle_sessions_list, handle_sessions_view,
    handle_strategies, OutputFormat,
};
use annotator_engine::telemetry::init_telemetry_with_level;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log wins over the config file; RUST_LOG wins over both
    let level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(level);

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    tracing::info!("Annotator v{} ({} - {})", version, commit, timestamp);

    // Handle commands
    match cli.command {
        Command::Run(args) => handle_run(args, &config, format).await,

        Command::Strategies => handle_strategies(format),

        Command::Sessions { action } => match action {
            SessionAction::List { limit } => handle_sessions_list(limit, &config, format).await,
            SessionAction::View { key } => handle_sessions_view(key, &config, format).await,
            SessionAction::Delete { key } => handle_sessions_delete(key, &config, format).await,
        },
    }
}
