//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了CLI命令行接口。

use crate::config::Config;
use crate::manager::CacheManager;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fleetcache")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true, help = "Path to a TOML config file")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(name = "status", about = "Check shared tier health and namespace sizes")]
    Status(StatusArgs),

    #[command(name = "clear", about = "Clear one namespace on this host and in the shared tier")]
    Clear(NamespaceArgs),

    #[command(name = "publish-clear", about = "Broadcast a clear signal for a namespace to every instance")]
    PublishClear(NamespaceArgs),

    #[command(name = "get", about = "Read a cached value as JSON")]
    Get(GetArgs),
}

#[derive(Parser, Debug)]
pub struct StatusArgs {
    #[arg(short, long, help = "Namespaces to inspect")]
    pub namespace: Vec<String>,

    #[arg(short, long, help = "Show detailed information")]
    pub verbose: bool,
}

#[derive(Parser, Debug)]
pub struct NamespaceArgs {
    #[arg(help = "Cache namespace")]
    pub namespace: String,

    #[arg(short = 'y', long, help = "Skip confirmation")]
    pub yes: bool,
}

#[derive(Parser, Debug)]
pub struct GetArgs {
    #[arg(help = "Cache namespace")]
    pub namespace: String,

    #[arg(help = "Logical key inside the namespace")]
    pub key: String,
}

mod admin;
mod status;

/// 加载配置：指定文件时从文件读取，否则使用默认值加环境变量覆盖
pub fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => {
            let mut config = Config::default();
            config.apply_env()?;
            config.validate()?;
            Ok(config)
        }
    }
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    crate::telemetry::init_tracing("fleetcache", None);

    let config = load_config(cli.config.as_ref())?;
    let manager = CacheManager::connect(config)
        .await
        .context("Failed to connect to the shared cache")?;

    let result = match &cli.command {
        Commands::Status(args) => status::execute(&manager, args).await,
        Commands::Clear(args) => admin::execute_clear(&manager, args).await,
        Commands::PublishClear(args) => admin::execute_publish_clear(&manager, args).await,
        Commands::Get(args) => admin::execute_get(&manager, args).await,
    };
    manager.shutdown().await?;
    result
}
