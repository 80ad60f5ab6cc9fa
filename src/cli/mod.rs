use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

#[derive(Parser)]
#[command(name = "work-orders")]
#[command(about = "Multi-stage laboratory work-order orchestration")]
#[command(long_about = "Creates work orders for a product's processes, locks each order's input \
                       sample set, splits it into per-container jobs and dispatches them to the \
                       LIMS strictly in sequence. Try 'work-orders simulate --scenario demos/scenario.json'.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a plan end to end against in-memory collaborators
    Simulate {
        /// JSON scenario describing the plan, its sets, materials and containers
        #[arg(long, help = "Path to a JSON scenario file")]
        scenario: PathBuf,
        /// Order indexes to dispatch, in the given order (defaults to every order in sequence)
        #[arg(long, num_args = 1.., help = "Order indexes to dispatch")]
        dispatch: Vec<usize>,
        /// Start and complete every job after each dispatch
        #[arg(long, help = "Complete every job of an order after dispatching it")]
        complete_jobs: bool,
        /// Keep plan records in the configured SQLite database
        #[arg(long, help = "Persist records in the configured database (needs the database feature)")]
        persist: bool,
        /// Send jobs and module checks to the configured LIMS and billing services
        #[arg(long, help = "Use the configured LIMS and billing endpoints instead of in-process doubles")]
        live_services: bool,
    },
    /// Show or write configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Write the default configuration to a file
    Init {
        #[arg(long, default_value = "work-orders.toml", help = "Where to write the configuration")]
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long, help = "Overwrite the file if it exists")]
        force: bool,
    },
}
