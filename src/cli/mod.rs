//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了CLI命令行接口。

use crate::config::Config;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "wealthcache")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true, help = "Path to the TOML configuration file")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Override the local storage file path")]
    pub storage: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(name = "status", about = "Show persisted sync queue state")]
    Status(StatusArgs),

    #[command(name = "admin", about = "Admin operations (clean, reset-migration)")]
    Admin(AdminArgs),

    #[command(name = "config", about = "Configuration utilities")]
    Config(ConfigArgs),
}

#[derive(Parser, Debug)]
pub struct StatusArgs {
    #[arg(short, long, help = "List every queued operation")]
    pub detailed: bool,

    #[arg(short, long, help = "Output in JSON format")]
    pub json: bool,
}

mod admin;
mod config;
mod status;

pub use admin::{AdminArgs, AdminSubcommand, CleanArgs, ResetMigrationArgs};
pub use config::{ConfigArgs, ConfigSubcommand};

/// 读取配置文件（未指定时使用默认配置），并应用命令行覆盖项
pub(crate) fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(storage) = &cli.storage {
        config.storage.path = storage.display().to_string();
    }
    Ok(config)
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "warn" };
    crate::telemetry::init_tracing("wealthcache", level);

    match &cli.command {
        Commands::Status(args) => status::execute(&cli, args).await,
        Commands::Admin(args) => admin::execute(&cli, args).await,
        Commands::Config(args) => config::execute(&cli, args).await,
    }
}
