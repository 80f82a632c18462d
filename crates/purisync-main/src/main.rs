// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of PuriSync.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use std::{path::PathBuf, sync::Arc};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use config::AppConfig;
use purisync_core::{DeviceRegistry, RefreshScheduler, SensorStore, StatisticsStore};
use purisync_ha::{
    HomeAssistantClient, HomeAssistantStateSource, JsonBinClient, JsonBinStatisticsSource,
};

/// Air purifier fleet monitor for Home Assistant
#[derive(Debug, Parser)]
#[command(name = "purisync", version)]
struct Args {
    /// Configuration file (TOML or JSON); defaults to ./config.toml or ./config.json
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Refresh everything once, print the result as JSON and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Installed before the config loads so its messages are kept; the
    // configured level replaces the default once known, RUST_LOG wins
    let (initial, from_env) = match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, true),
        Err(_) => (EnvFilter::new("info"), false),
    };
    let builder = FmtSubscriber::builder()
        .with_env_filter(initial)
        .with_filter_reloading();
    let filter = builder.reload_handle();
    tracing::subscriber::set_global_default(builder.finish())
        .context("Failed to install tracing subscriber")?;

    let config = AppConfig::load(args.config.as_deref())?;
    if !from_env {
        filter
            .reload(config.log_filter()?)
            .context("Failed to apply configured log level")?;
    }

    log_summary(&config);

    let ha_client = Arc::new(HomeAssistantClient::from_config(
        config.hub.base_url.clone(),
        config.hub.token.clone(),
    )?);
    info!("🏠 Home Assistant at {}", ha_client.base_url());

    let source = Arc::new(HomeAssistantStateSource::new(ha_client.clone()));
    let registry = Arc::new(DeviceRegistry::new(source.clone(), config.registry_settings()));
    let sensors = Arc::new(SensorStore::new(source, config.sensors.layout()));

    let statistics = if config.statistics_enabled() {
        let client = Arc::new(JsonBinClient::from_config(
            config.statistics.base_url.clone(),
            config.statistics.access_key.clone(),
        )?);
        let source = Arc::new(JsonBinStatisticsSource::new(client));
        Some(Arc::new(StatisticsStore::new(
            source,
            config.statistics.bins.clone(),
        )))
    } else {
        warn!("⚠️ Statistics disabled (no access key configured)");
        None
    };

    if args.once {
        return run_once(&registry, &sensors, statistics.as_deref()).await;
    }

    match ha_client.ping().await {
        Ok(true) => info!("✅ Home Assistant reachable"),
        Ok(false) => warn!("⚠️ Home Assistant responded but API is not available"),
        Err(e) => warn!("⚠️ Home Assistant not reachable yet: {}", e),
    }

    let mut scheduler = RefreshScheduler::new(
        registry.clone(),
        sensors.clone(),
        config.refresh_intervals(),
    );
    if let Some(statistics) = statistics {
        scheduler = scheduler.with_statistics(statistics);
    }
    let handle = scheduler.start();

    let mut updates = registry.subscribe();
    let reporter = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let snapshot = updates.borrow_and_update().clone();
            let on = snapshot.devices.iter().filter(|d| d.is_on).count();
            info!(
                devices = snapshot.devices.len(),
                on,
                pm25 = snapshot.air_quality.pm25,
                aqi = snapshot.air_quality.aqi(),
                source = snapshot.air_quality.source.as_str(),
                "📊 Fleet updated"
            );
        }
    });

    info!("🚀 PuriSync running, press Ctrl+C to stop");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }

    info!("🛑 Shutting down");
    handle.shutdown().await;
    reporter.abort();

    Ok(())
}

fn log_summary(config: &AppConfig) {
    info!("🚀 Starting PuriSync");
    info!("📋 Configuration Summary:");
    info!("   Devices: {}", config.devices.len());
    for device in &config.devices {
        info!(
            "     - {} ({}) - {} [{}]",
            device.id, device.model, device.entities.power, device.location
        );
    }
    info!(
        "   Site: {} / {}",
        config.sensors.location, config.sensors.city
    );
    info!("   Auto mode flag: {}", config.controls.auto_mode_flag);
    info!(
        "   Refresh: devices {}s, sensors {}s, statistics {}s",
        config.refresh.devices_secs, config.refresh.sensors_secs, config.refresh.statistics_secs
    );
    info!("   Statistics: {}", config.statistics_enabled());
}

async fn run_once(
    registry: &Arc<DeviceRegistry>,
    sensors: &SensorStore,
    statistics: Option<&StatisticsStore>,
) -> Result<()> {
    let fetched = async {
        match statistics {
            Some(store) => store.fetch_all().await,
            None => 0,
        }
    };
    let ((), (), fetched) = tokio::join!(registry.refresh(), sensors.refresh(), fetched);
    info!("Fetched {} statistics series", fetched);

    let report = json!({
        "summary": registry.summary(),
        "snapshot": registry.snapshot(),
        "sensors": sensors.diagnostics(),
        "statistics": statistics.map(StatisticsStore::snapshot),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
