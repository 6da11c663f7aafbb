//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了配置校验命令的实现。

use crate::cli::{load_config, Cli};
use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

pub async fn execute(cli: &Cli, args: &ConfigArgs) -> Result<()> {
    match &args.command {
        ConfigSubcommand::Validate => {
            if cli.config.is_none() {
                bail!("No configuration file given, use --config <path>");
            }
            let config = load_config(cli)?;
            match config.validate() {
                Ok(()) => {
                    println!("✅ Configuration is valid.");
                    println!("Storage backend: {:?} ({})", config.storage.backend, config.storage.path);
                    println!(
                        "Remote store:    {}",
                        config
                            .remote
                            .as_ref()
                            .map(|r| r.url.as_str())
                            .unwrap_or("none (local-only)")
                    );
                    Ok(())
                }
                Err(e) => bail!("Invalid configuration: {}", e),
            }
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum ConfigSubcommand {
    #[command(name = "validate", about = "Validate the configuration file")]
    Validate,
}

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}
