//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了状态查询命令的实现。

use crate::backend::namespace_pattern;
use crate::cli::StatusArgs;
use crate::manager::CacheManager;
use crate::recovery::health::{HealthChecker, HealthState, HealthTracker};
use anyhow::Result;
use std::time::Duration;

pub async fn execute(manager: &CacheManager, args: &StatusArgs) -> Result<()> {
    println!("=== fleetcache status ===\n");

    let tracker = HealthTracker::new("l2");
    let checker = HealthChecker::new(
        manager.l2(),
        tracker.clone(),
        Duration::from_secs(manager.config().global.health_check_interval),
        Duration::from_millis(manager.config().l2.command_timeout_ms),
    );
    checker.check_once().await;
    print_health("Shared tier", &tracker.state().await, args.verbose);

    if args.namespace.is_empty() {
        println!("\nNo namespaces requested. Pass --namespace <name> to count shared entries.");
        return Ok(());
    }

    println!();
    let l2 = manager.l2();
    for namespace in &args.namespace {
        let client = manager.client(namespace)?;
        match l2.scan_keys(&namespace_pattern(namespace)).await {
            Ok(keys) => {
                println!("Namespace: {}", namespace);
                println!("  Topic:          {}", client.topic());
                println!("  Shared entries: {}", keys.len());
                if args.verbose {
                    for key in keys.iter().take(20) {
                        println!("    {}", key);
                    }
                    if keys.len() > 20 {
                        println!("    ... {} more", keys.len() - 20);
                    }
                }
            }
            Err(e) => println!("Namespace: {}\n  ❌ scan failed: {}", namespace, e),
        }
    }

    Ok(())
}

fn print_health(label: &str, state: &HealthState, verbose: bool) {
    let status = match state {
        HealthState::Healthy => "✅ HEALTHY".to_string(),
        HealthState::Degraded {
            since,
            failure_count,
        } => {
            if verbose {
                let elapsed = since.elapsed().as_secs();
                format!("⚠️ DEGRADED ({} failures, {}s ago)", failure_count, elapsed)
            } else {
                "⚠️ DEGRADED".to_string()
            }
        }
        HealthState::Recovering {
            since,
            success_count,
        } => {
            if verbose {
                let elapsed = since.elapsed().as_secs();
                format!(
                    "🔄 RECOVERING ({} successes, {}s ago)",
                    success_count, elapsed
                )
            } else {
                "🔄 RECOVERING".to_string()
            }
        }
    };
    println!("{}: {}", label, status);
}
