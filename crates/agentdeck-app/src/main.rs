use std::sync::Arc;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing::info;

use agentdeck::app::{format_saved_sessions, run_fleet, run_hosts, run_launch};
use agentdeck::logging::init_tracing;
use agentdeck::{setup_from_cli, Cli, Commands};
use agentdeck_sessions::SessionManager;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        let mut command = Cli::command();
        clap_complete::generate(shell, &mut command, "agentdeck", &mut std::io::stdout());
        return Ok(());
    }

    init_tracing(cli.verbose);

    let app_config = setup_from_cli(&cli)?;
    info!(data_dir = %app_config.data_dir.display(), "agentdeck starting");

    let settings = app_config.settings.clone();
    let manager = Arc::new(SessionManager::new(app_config.orchestrator, app_config.settings));

    match &cli.command {
        Commands::Hosts { command } => {
            let output = run_hosts(command, &manager).await?;
            println!("{}", output);
        }
        Commands::Launch(args) => run_launch(args, Arc::clone(&manager)).await?,
        Commands::Fleet { file, save } => run_fleet(file, *save, Arc::clone(&manager)).await?,
        Commands::Sessions => println!("{}", format_saved_sessions(&settings.saved_sessions())),
        Commands::Completions { .. } => {}
    }

    manager.shutdown();
    Ok(())
}
