mod cli;
mod mcp;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands, Context};
use gtags_nav::SearchKind;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries results and the MCP transport; logs go to stderr.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gtags_nav=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();

    let cli = Cli::parse();
    let ctx = Context::from_cli(&cli);

    match cli.command {
        Commands::Root { path } => {
            cli::show_root(&ctx, &path)?;
        }
        Commands::Version => {
            cli::show_version(&ctx)?;
        }
        Commands::Symbols { prefix } => {
            cli::symbols(&ctx, prefix.as_deref())?;
        }
        Commands::Definition { name } => {
            cli::find_symbol(&ctx, &name, SearchKind::Definition)?;
        }
        Commands::References { name } => {
            cli::find_symbol(&ctx, &name, SearchKind::Reference)?;
        }
        Commands::Rebuild { dir } => {
            cli::rebuild(&ctx, &dir).await?;
        }
        Commands::Update { file } => {
            cli::update_file(&ctx, &file)?;
        }
        Commands::Watch { dir } => {
            cli::watch(&ctx, &dir).await?;
        }
        Commands::Serve => {
            cli::run_mcp_server(&ctx).await?;
        }
    }

    Ok(())
}
