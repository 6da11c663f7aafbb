//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了管理员操作命令的实现。

use crate::cli::{load_config, Cli};
use crate::manager::open_storage;
use crate::storage::{LocalStorage, StorageExt};
use crate::sync::migration::{migration_flag_key, storage_mode_key};
use crate::sync::{errors_key, queue_key};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::Write;

pub async fn execute(cli: &Cli, args: &AdminArgs) -> Result<()> {
    match &args.command {
        AdminSubcommand::Clean(clean_args) => execute_clean(cli, clean_args).await,
        AdminSubcommand::ResetMigration(reset_args) => execute_reset(cli, reset_args).await,
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N]: ", prompt);
    std::io::stdout().flush()?;
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

async fn execute_clean(cli: &Cli, args: &CleanArgs) -> Result<()> {
    if !args.queue && !args.errors && !args.preferences {
        println!("Nothing selected. Use --queue, --errors or --preferences.");
        return Ok(());
    }

    let config = load_config(cli)?;
    let storage = open_storage(&config.storage)?;
    let prefix = &config.sync.storage_prefix;

    if !args.yes {
        println!("Preparing to clean {}:", config.storage.path);
        if args.queue {
            println!("  - pending sync operations");
        }
        if args.errors {
            println!("  - recorded sync errors");
        }
        if args.preferences {
            println!("  - persisted preferences");
        }
        if !confirm("\nDo you want to continue?")? {
            println!("Operation cancelled.");
            return Ok(());
        }
    }

    if args.queue {
        storage.remove_item(&queue_key(prefix))?;
        println!("Sync queue cleared.");
    }

    if args.errors {
        storage.remove_item(&errors_key(prefix))?;
        println!("Sync errors cleared.");
    }

    if args.preferences {
        let keys = storage.keys_with_prefix(&config.cache.preference_prefix)?;
        for key in &keys {
            storage.remove_item(key)?;
        }
        println!("{} preferences removed.", keys.len());
    }

    println!("\n✅ Cleanup completed.");
    Ok(())
}

async fn execute_reset(cli: &Cli, args: &ResetMigrationArgs) -> Result<()> {
    let config = load_config(cli)?;
    let storage = open_storage(&config.storage)?;
    let prefix = &config.sync.storage_prefix;

    if !args.yes && !confirm("Reset the migration flag so local data is migrated again?")? {
        println!("Operation cancelled.");
        return Ok(());
    }

    reset_migration(storage.as_ref(), prefix)?;
    println!("✅ Migration flag and storage mode reset.");
    Ok(())
}

/// 删除迁移完成标记和存储模式标记
pub(crate) fn reset_migration(storage: &dyn LocalStorage, prefix: &str) -> crate::error::Result<()> {
    storage.remove_item(&migration_flag_key(prefix))?;
    storage.remove_item(&storage_mode_key(prefix))?;
    Ok(())
}

#[derive(Parser, Debug)]
pub struct CleanArgs {
    #[arg(long, help = "Drop all queued sync operations")]
    pub queue: bool,

    #[arg(long, help = "Clear recorded sync errors")]
    pub errors: bool,

    #[arg(long, help = "Remove persisted preferences")]
    pub preferences: bool,

    #[arg(short, long, help = "Skip confirmation")]
    pub yes: bool,
}

#[derive(Parser, Debug)]
pub struct ResetMigrationArgs {
    #[arg(short, long, help = "Skip confirmation")]
    pub yes: bool,
}

#[derive(Subcommand, Debug)]
pub enum AdminSubcommand {
    #[command(name = "clean", about = "Clear persisted sync state")]
    Clean(CleanArgs),

    #[command(name = "reset-migration", about = "Forget that local data was migrated")]
    ResetMigration(ResetMigrationArgs),
}

#[derive(Parser, Debug)]
pub struct AdminArgs {
    #[command(subcommand)]
    pub command: AdminSubcommand,
}
