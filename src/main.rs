use anyhow::Result;
use clap::Parser;

use lab_work_orders::cli::commands::config::{InitConfigCommand, ShowConfigCommand};
use lab_work_orders::cli::commands::simulate::SimulateCommand;
use lab_work_orders::cli::commands::Command;
use lab_work_orders::cli::{Cli, Commands, ConfigAction};
use lab_work_orders::config::{config, init_config, ObservabilityConfig};
use lab_work_orders::telemetry::init_telemetry;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let observability = config()
        .map(|c| c.observability.clone())
        .unwrap_or_else(|_| ObservabilityConfig::default());
    if let Err(e) = init_telemetry(&observability) {
        eprintln!("⚠️  Could not initialize logging: {e}");
    }
    init_config()?;

    tokio::runtime::Runtime::new()?.block_on(async {
        match cli.command {
            Commands::Simulate {
                scenario,
                dispatch,
                complete_jobs,
                persist,
                live_services,
            } => {
                SimulateCommand {
                    scenario,
                    dispatch,
                    complete_jobs,
                    persist,
                    live_services,
                }
                .execute()
                .await
            }
            Commands::Config { action } => match action {
                ConfigAction::Show => ShowConfigCommand.execute().await,
                ConfigAction::Init { path, force } => {
                    InitConfigCommand { path, force }.execute().await
                }
            },
        }
    })
}
