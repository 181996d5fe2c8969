//! devicegrant CLI binary entry point.

use clap::Parser;
use devicegrant::cli::errors::format_error_help;
use devicegrant::cli::{auth, Cli, Commands};
use devicegrant::config::GrantConfig;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", format_error_help(&e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> devicegrant::error::Result<()> {
    let config = GrantConfig::from_env()?;
    match cli.command {
        Commands::Login(args) => auth::handle_login(config, args).await,
        Commands::Status => auth::handle_status(config).await,
        Commands::Logout => auth::handle_logout(config).await,
        Commands::Token(args) => auth::handle_token(config, args).await,
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}
