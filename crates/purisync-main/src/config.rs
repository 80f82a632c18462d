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

use anyhow::{Context, Result};
use purisync_core::{
    ControlEntities, DeviceEntities, DeviceSpec, PoleEntities, RefreshIntervals, RegistrySettings,
    SensorLayout, SiteLabel, StatisticsBins,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Hub connection
    #[serde(default)]
    pub hub: HubConfig,

    /// Aggregate statistics store
    #[serde(default)]
    pub statistics: StatisticsConfig,

    /// Purifier roster
    #[serde(default = "default_devices")]
    pub devices: Vec<DeviceSpec>,

    /// Sensor poles and site labels
    #[serde(default)]
    pub sensors: SensorsConfig,

    /// Hub-wide control entities
    #[serde(default)]
    pub controls: ControlEntities,

    #[serde(default)]
    pub refresh: RefreshConfig,

    #[serde(default)]
    pub system: SystemConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HubConfig {
    /// Base URL, e.g. `http://homeassistant.local:8123`
    pub base_url: Option<String>,

    /// Long-lived access token (usually supplied through HA_TOKEN)
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    pub base_url: Option<String>,

    /// Access key sent as `X-Master-Key` (usually supplied through STATS_ACCESS_KEY)
    pub access_key: Option<String>,

    #[serde(default)]
    pub bins: StatisticsBins,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: None,
            access_key: None,
            bins: StatisticsBins::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorsConfig {
    pub location: String,
    pub city: String,
    pub pole1: PoleEntities,
    pub pole2: PoleEntities,
    pub mean: PoleEntities,
}

impl Default for SensorsConfig {
    fn default() -> Self {
        let site = SiteLabel::default();
        let layout = SensorLayout::default();
        Self {
            location: site.location,
            city: site.city,
            pole1: layout.pole1,
            pole2: layout.pole2,
            mean: layout.mean,
        }
    }
}

impl SensorsConfig {
    pub fn layout(&self) -> SensorLayout {
        SensorLayout {
            pole1: self.pole1.clone(),
            pole2: self.pole2.clone(),
            mean: self.mean.clone(),
        }
    }

    pub fn site(&self) -> SiteLabel {
        SiteLabel {
            location: self.location.clone(),
            city: self.city.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Devices and fused air quality (seconds)
    #[serde(default = "default_device_interval")]
    pub devices_secs: u64,

    /// Diagnostic pole status (seconds)
    #[serde(default = "default_sensor_interval")]
    pub sensors_secs: u64,

    #[serde(default = "default_statistics_interval")]
    pub statistics_secs: u64,

    /// Delay before re-polling after an auto mode change (milliseconds)
    #[serde(default = "default_settle_millis")]
    pub auto_mode_settle_millis: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            devices_secs: default_device_interval(),
            sensors_secs: default_sensor_interval(),
            statistics_secs: default_statistics_interval(),
            auto_mode_settle_millis: default_settle_millis(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_device_interval() -> u64 {
    30
}

fn default_sensor_interval() -> u64 {
    30
}

fn default_statistics_interval() -> u64 {
    1800
}

fn default_settle_millis() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn purifier(id: &str, model: &str) -> DeviceSpec {
    DeviceSpec {
        id: id.to_owned(),
        model: model.to_owned(),
        location: "Main Room".to_owned(),
        entities: DeviceEntities {
            power: format!("fan.{id}"),
            filter_life: format!("sensor.{id}_filter_lifetime"),
            aqi: format!("sensor.{id}_air_quality"),
            pm25: format!("sensor.{id}_pm2_5"),
            note: format!("input_text.{id}_note"),
        },
        level_select: None,
    }
}

fn default_devices() -> Vec<DeviceSpec> {
    vec![
        purifier("core_600s", "Core 600s"),
        purifier("core_600s_2", "Core 600s (2)"),
        purifier("core_600s_3", "Core 600s (3)"),
        purifier("core_400s", "Core 400s"),
    ]
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            hub: HubConfig::default(),
            statistics: StatisticsConfig::default(),
            devices: default_devices(),
            sensors: SensorsConfig::default(),
            controls: ControlEntities::default(),
            refresh: RefreshConfig::default(),
            system: SystemConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `path`, or from config.toml / config.json in
    /// the working directory, or from defaults; environment overrides apply
    /// on top in every case
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::discover()?,
        };

        let config = config.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn discover() -> Result<Self> {
        for candidate in ["config.toml", "config.json"] {
            let path = Path::new(candidate);
            if path.exists() {
                return Self::from_file(path);
            }
        }

        warn!("No configuration file found, using defaults with environment overrides");
        Ok(Self::default())
    }

    /// Parse a TOML or JSON (by extension) configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let config: AppConfig = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            toml::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))?
        };

        info!("✅ Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Apply HA_BASE_URL, HA_TOKEN, STATS_BASE_URL, STATS_ACCESS_KEY and LOG_LEVEL
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup("HA_BASE_URL") {
            self.hub.base_url = Some(url);
        }
        if let Some(token) = lookup("HA_TOKEN") {
            self.hub.token = Some(token);
        }
        if let Some(url) = lookup("STATS_BASE_URL") {
            self.statistics.base_url = Some(url);
        }
        if let Some(key) = lookup("STATS_ACCESS_KEY") {
            self.statistics.access_key = Some(key);
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.system.log_level = level;
        }
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.devices.is_empty() {
            anyhow::bail!("Configuration must include at least one device");
        }

        let mut seen = HashSet::new();
        for (idx, device) in self.devices.iter().enumerate() {
            if device.id.trim().is_empty() {
                anyhow::bail!("Device {} has empty ID", idx);
            }
            if !seen.insert(device.id.as_str()) {
                anyhow::bail!("Duplicate device ID '{}'", device.id);
            }

            let entities = &device.entities;
            for (field, entity) in [
                ("power", &entities.power),
                ("filter_life", &entities.filter_life),
                ("aqi", &entities.aqi),
                ("pm25", &entities.pm25),
                ("note", &entities.note),
            ] {
                if entity.trim().is_empty() {
                    anyhow::bail!("Device '{}' has empty {} entity", device.id, field);
                }
            }
        }

        for (name, entity) in [
            ("sensors.pole1.pm25", &self.sensors.pole1.pm25),
            ("sensors.pole1.temperature", &self.sensors.pole1.temperature),
            ("sensors.pole2.pm25", &self.sensors.pole2.pm25),
            ("sensors.pole2.temperature", &self.sensors.pole2.temperature),
            ("sensors.mean.pm25", &self.sensors.mean.pm25),
            ("sensors.mean.temperature", &self.sensors.mean.temperature),
            ("controls.auto_mode_flag", &self.controls.auto_mode_flag),
            ("controls.fan_level_select", &self.controls.fan_level_select),
        ] {
            if entity.trim().is_empty() {
                anyhow::bail!("{} cannot be empty", name);
            }
        }

        if self.refresh.devices_secs == 0
            || self.refresh.sensors_secs == 0
            || self.refresh.statistics_secs == 0
        {
            anyhow::bail!("Refresh intervals must be at least 1 second");
        }

        self.log_filter()?;

        if self.hub.token.as_deref().is_none_or(|token| token.trim().is_empty()) {
            anyhow::bail!("Hub token missing: set hub.token or the HA_TOKEN environment variable");
        }

        Ok(())
    }

    /// Tracing filter for the configured log level
    pub fn log_filter(&self) -> Result<EnvFilter> {
        EnvFilter::try_new(&self.system.log_level)
            .with_context(|| format!("Invalid log level '{}'", self.system.log_level))
    }

    /// Statistics are fetched only when enabled and an access key is known
    pub fn statistics_enabled(&self) -> bool {
        self.statistics.enabled
            && self
                .statistics
                .access_key
                .as_deref()
                .is_some_and(|key| !key.trim().is_empty())
    }

    pub fn refresh_intervals(&self) -> RefreshIntervals {
        RefreshIntervals {
            devices: Duration::from_secs(self.refresh.devices_secs),
            sensors: Duration::from_secs(self.refresh.sensors_secs),
            statistics: Duration::from_secs(self.refresh.statistics_secs),
        }
    }

    pub fn registry_settings(&self) -> RegistrySettings {
        RegistrySettings {
            devices: self.devices.clone(),
            controls: self.controls.clone(),
            sensors: self.sensors.layout(),
            site: self.sensors.site(),
            auto_mode_settle: Duration::from_millis(self.refresh.auto_mode_settle_millis),
        }
    }
}
