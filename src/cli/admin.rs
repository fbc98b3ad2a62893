//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了管理员操作命令的实现。

use crate::cli::{GetArgs, NamespaceArgs};
use crate::client::{CacheExt, CacheOps};
use crate::manager::CacheManager;
use anyhow::{Context, Result};
use std::io::Write;

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N]: ", prompt);
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

pub async fn execute_clear(manager: &CacheManager, args: &NamespaceArgs) -> Result<()> {
    let client = manager
        .client(&args.namespace)
        .with_context(|| format!("Invalid namespace '{}'", args.namespace))?;

    if !args.yes
        && !confirm(&format!(
            "Delete every shared entry under '{}:*'?",
            args.namespace
        ))?
    {
        println!("Operation cancelled.");
        return Ok(());
    }

    println!("Clearing namespace {}...", args.namespace);
    client.clear_all().await?;
    println!("✅ Namespace '{}' cleared.", args.namespace);
    println!("Other instances keep their local entries until a clear signal or TTL expiry.");
    Ok(())
}

pub async fn execute_publish_clear(manager: &CacheManager, args: &NamespaceArgs) -> Result<()> {
    let client = manager
        .client(&args.namespace)
        .with_context(|| format!("Invalid namespace '{}'", args.namespace))?;

    if !args.yes
        && !confirm(&format!(
            "Broadcast a clear signal on '{}' to every instance?",
            client.topic()
        ))?
    {
        println!("Operation cancelled.");
        return Ok(());
    }

    client.publish_clear().await?;
    println!("✅ Clear signal published on '{}'.", client.topic());
    Ok(())
}

pub async fn execute_get(manager: &CacheManager, args: &GetArgs) -> Result<()> {
    let client = manager
        .client(&args.namespace)
        .with_context(|| format!("Invalid namespace '{}'", args.namespace))?;

    match client.get::<serde_json::Value>(&args.key).await? {
        Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        None => println!("(miss) {}:{}", args.namespace, args.key),
    }
    Ok(())
}
