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

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::aqi::AirQualityStatus;
use crate::level::FanLevel;

/// Hub entities backing one purifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEntities {
    /// Fan entity carrying on/off state and the `percentage` attribute
    pub power: String,
    pub filter_life: String,
    pub aqi: String,
    pub pm25: String,
    /// Free-text entity (`input_text.*`)
    pub note: String,
}

/// Static description of a purifier from the configured roster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSpec {
    pub id: String,
    pub model: String,
    pub location: String,
    pub entities: DeviceEntities,
    /// Level select entity for this device, when it differs from the shared one
    #[serde(default)]
    pub level_select: Option<String>,
}

/// Operating mode, driven by one hub-wide flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceMode {
    #[default]
    Auto,
    Manual,
}

impl DeviceMode {
    /// Mode selected by the state of the auto-mode flag entity
    pub fn from_flag(state: &str) -> Self {
        if state == "on" { Self::Auto } else { Self::Manual }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
        }
    }
}

/// Filter wear bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterHealth {
    Good,
    Fair,
    Low,
    Replace,
}

impl FilterHealth {
    pub fn from_life(filter_life: i32) -> Self {
        match filter_life {
            70.. => Self::Good,
            40..=69 => Self::Fair,
            10..=39 => Self::Low,
            _ => Self::Replace,
        }
    }
}

/// Observed state of one purifier
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Device {
    pub id: String,
    pub model: String,
    pub location: String,
    pub entities: DeviceEntities,
    pub is_on: bool,
    pub mode: DeviceMode,
    /// Fan power, 0-100
    pub percentage: u8,
    /// Always the bucket of `percentage`
    pub fan_level: FanLevel,
    pub filter_life: i32,
    pub pm25: f64,
    pub aqi: i32,
    pub note: Option<String>,
    /// A command for this device is waiting for the hub
    pub in_flight: bool,
}

impl Device {
    pub fn from_spec(spec: &DeviceSpec) -> Self {
        Self {
            id: spec.id.clone(),
            model: spec.model.clone(),
            location: spec.location.clone(),
            entities: spec.entities.clone(),
            is_on: false,
            mode: DeviceMode::default(),
            percentage: 0,
            fan_level: FanLevel::Off,
            filter_life: 0,
            pm25: 0.0,
            aqi: 0,
            note: None,
            in_flight: false,
        }
    }

    /// Set the percentage and resynchronize the level
    pub fn set_percentage(&mut self, percentage: u8) {
        self.percentage = percentage.min(100);
        self.fan_level = FanLevel::from_percentage(i64::from(self.percentage));
    }

    /// Set the level and resynchronize the percentage
    pub fn set_fan_level(&mut self, level: FanLevel) {
        self.fan_level = level;
        self.percentage = level.percentage();
    }

    pub fn filter_health(&self) -> FilterHealth {
        FilterHealth::from_life(self.filter_life)
    }

    pub fn air_quality_status(&self) -> AirQualityStatus {
        AirQualityStatus::from_pm25(self.pm25)
    }
}

/// Read the `percentage` attribute of a fan entity
///
/// Integers and integral floats are accepted; anything else counts as 0.
pub fn percentage_attribute(attributes: &Map<String, Value>) -> u8 {
    attributes
        .get("percentage")
        .and_then(|value| {
            value.as_i64().or_else(|| {
                value
                    .as_f64()
                    .filter(|f| f.is_finite() && f.fract().abs() < f64::EPSILON)
                    .map(|f| f as i64)
            })
        })
        .unwrap_or(0)
        .clamp(0, 100) as u8
}
