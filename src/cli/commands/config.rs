use anyhow::{bail, Result};
use std::path::PathBuf;

use super::Command;
use crate::config::{config, WorkOrdersConfig};

pub struct ShowConfigCommand;

impl Command for ShowConfigCommand {
    async fn execute(&self) -> Result<()> {
        let config = config()?;
        println!("{}", toml::to_string_pretty(config)?);
        Ok(())
    }
}

pub struct InitConfigCommand {
    pub path: PathBuf,
    pub force: bool,
}

impl Command for InitConfigCommand {
    async fn execute(&self) -> Result<()> {
        if self.path.exists() && !self.force {
            bail!(
                "{} already exists; pass --force to overwrite it",
                self.path.display()
            );
        }
        WorkOrdersConfig::default().save_to_file(&self.path)?;
        println!("✅ Wrote default configuration to {}", self.path.display());
        Ok(())
    }
}
