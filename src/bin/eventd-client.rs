// Copyright (c) 2025 - Cowboy AI, Inc.
//! eventd Client Service
//!
//! Connects to the eventd NATS server at boot, then publishes a heartbeat
//! event on a fixed interval and logs the heartbeats it receives back.
//!
//! Run with: cargo run --bin eventd-client
//!
//! Configuration:
//! 1. EVENTD_CONFIG: path to the host configuration file (default: etc/config.yaml,
//!    skipped when missing)
//! 2. EVENTD_HOST / EVENTD_PORT / EVENTD_DISABLED / EVENTD_NKEY / EVENTD_NKEY_FILE
//!    override the `eventd` section
//! 3. EVENTD_RUN_IN_CLI=true skips connecting, as a one-shot CLI command would
//! 4. EVENTD_HEARTBEAT_TOPIC: topic for heartbeats (default: eventd.heartbeat)

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use eventd_sdk::{
    EventdClient, EventdError, EventdOptions, HostMode, StartupAction, StartupOutcome,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

const DEFAULT_CONFIG_PATH: &str = "etc/config.yaml";
const DEFAULT_HEARTBEAT_TOPIC: &str = "eventd.heartbeat";
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Heartbeat published by this service
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Heartbeat {
    instance_id: Uuid,
    sequence: u64,
    timestamp: DateTime<Utc>,
}

/// Configuration for the client service
#[derive(Debug, Clone)]
struct ServiceConfig {
    /// eventd connection options
    eventd: EventdOptions,
    /// Whether the process runs as a one-shot CLI command
    mode: HostMode,
    /// Topic heartbeats are published to
    heartbeat_topic: String,
}

impl ServiceConfig {
    /// Load the configuration file, then apply environment overrides
    fn from_env() -> Result<Self> {
        let config_path = std::env::var("EVENTD_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        let eventd = if config_path.exists() {
            EventdOptions::from_file(&config_path)
                .with_context(|| format!("Invalid configuration file {}", config_path.display()))?
        } else {
            EventdOptions::default()
        };
        let eventd = eventd
            .with_env_overrides()
            .context("Invalid EVENTD_* environment override")?;

        let run_in_cli = std::env::var("EVENTD_RUN_IN_CLI")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);

        let heartbeat_topic = std::env::var("EVENTD_HEARTBEAT_TOPIC")
            .unwrap_or_else(|_| DEFAULT_HEARTBEAT_TOPIC.to_string());

        Ok(Self {
            eventd,
            mode: if run_in_cli { HostMode::Cli } else { HostMode::Service },
            heartbeat_topic,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("🚀 Starting eventd client service");

    let config = ServiceConfig::from_env()?;
    info!("📋 Configuration loaded:");
    info!("  - Server: {}", config.eventd);
    info!("  - Disabled: {}", config.eventd.disabled());
    info!("  - Mode: {:?}", config.mode);
    info!("  - Heartbeat topic: {}", config.heartbeat_topic);

    let client = EventdClient::new(config.eventd.clone());
    client.on_reconnected(|| info!("🔁 Reconnected to eventd, heartbeats resume"));

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("🛑 Shutdown requested");
            signal_token.cancel();
        }
    });

    let startup = StartupAction::for_client(client.clone(), config.mode).spawn(shutdown.clone());
    match startup.await.context("Startup task panicked")?.context("eventd startup failed")? {
        StartupOutcome::Connected { attempts } => {
            info!("✅ Connected to eventd after {} attempt(s)", attempts);
        }
        StartupOutcome::Skipped(reason) => {
            info!("⏭️ eventd startup skipped: {:?}", reason);
            return Ok(());
        }
        StartupOutcome::Cancelled { attempts } => {
            warn!("⚠️ Shut down before connecting ({} attempt(s))", attempts);
            return Ok(());
        }
    }

    let subscription = client
        .subscribe_json(&config.heartbeat_topic, |heartbeat: Heartbeat| async move {
            info!(
                "💓 Heartbeat {} from {} at {}",
                heartbeat.sequence, heartbeat.instance_id, heartbeat.timestamp
            );
            Ok::<(), EventdError>(())
        })
        .await
        .context("Failed to subscribe to heartbeats")?;

    let instance_id = Uuid::now_v7();
    let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
    let mut sequence = 0u64;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                sequence += 1;
                let heartbeat = Heartbeat {
                    instance_id,
                    sequence,
                    timestamp: Utc::now(),
                };
                if let Err(e) = client.publish(&config.heartbeat_topic, &heartbeat).await {
                    error!("❌ Failed to publish heartbeat {}: {}", sequence, e);
                }
            }
        }
    }

    subscription.unsubscribe();
    if let Err(e) = client.flush().await {
        warn!("⚠️ Failed to flush pending events: {}", e);
    }
    client.disconnect().await;
    info!("👋 eventd client service stopped");
    Ok(())
}
