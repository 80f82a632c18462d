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

//! Fusion of the two redundant sensor poles into one air-quality reading.
//!
//! Precedence: both poles online uses the hub's mean entities, a single
//! online pole is used directly, and no pole at all yields a zero reading.
//! Pole temperatures arrive in Fahrenheit and leave in Celsius.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::aqi::{AirQualityStatus, aqi_from_concentration};
use crate::traits::{StateSource, is_valid_state};

/// PM2.5 and temperature entities of one pole (or of the mean pair)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoleEntities {
    pub pm25: String,
    pub temperature: String,
}

impl PoleEntities {
    pub fn new(pm25: impl Into<String>, temperature: impl Into<String>) -> Self {
        Self {
            pm25: pm25.into(),
            temperature: temperature.into(),
        }
    }
}

/// Entities of both poles and of the hub-computed mean
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorLayout {
    pub pole1: PoleEntities,
    pub pole2: PoleEntities,
    pub mean: PoleEntities,
}

impl Default for SensorLayout {
    fn default() -> Self {
        Self {
            pole1: PoleEntities::new("sensor.dust_pole_pm2_5", "sensor.dust_pole_temperature"),
            pole2: PoleEntities::new("sensor.dust_pole_pm2_5_2", "sensor.dust_pole_temperature_2"),
            mean: PoleEntities::new(
                "sensor.dust_pole_pm2_5_mean",
                "sensor.dust_pole_temperature_mean",
            ),
        }
    }
}

/// Display labels attached to every fused reading
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteLabel {
    pub location: String,
    pub city: String,
}

impl Default for SiteLabel {
    fn default() -> Self {
        Self {
            location: "Ban Bang Khae 2".to_owned(),
            city: "Bangkok, Bang Khae".to_owned(),
        }
    }
}

/// Raw states of one pole, kept verbatim for display
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoleReading {
    pub pm25: String,
    pub temperature: String,
}

impl PoleReading {
    pub fn new(pm25: impl Into<String>, temperature: impl Into<String>) -> Self {
        Self {
            pm25: pm25.into(),
            temperature: temperature.into(),
        }
    }

    /// Both raw states are real readings
    pub fn is_online(&self) -> bool {
        is_valid_state(&self.pm25) && is_valid_state(&self.temperature)
    }

    fn parsed(&self) -> Option<(f64, f64)> {
        let pm25 = self.pm25.trim().parse::<f64>().ok().filter(|v| v.is_finite())?;
        let temperature = self.temperature.trim().parse::<f64>().ok().filter(|v| v.is_finite())?;
        Some((pm25, temperature))
    }
}

/// Which input produced a fused reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionSource {
    Mean,
    Pole1,
    Pole2,
    #[default]
    NoData,
}

impl FusionSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Pole1 => "pole1",
            Self::Pole2 => "pole2",
            Self::NoData => "no_data",
        }
    }
}

/// Pick the fusion input from pole availability alone
pub fn select_source(pole1: &PoleReading, pole2: &PoleReading) -> FusionSource {
    match (pole1.is_online(), pole2.is_online()) {
        (true, true) => FusionSource::Mean,
        (true, false) => FusionSource::Pole1,
        (false, true) => FusionSource::Pole2,
        (false, false) => FusionSource::NoData,
    }
}

pub fn fahrenheit_to_celsius(fahrenheit: f64) -> f64 {
    (fahrenheit - 32.0) * 5.0 / 9.0
}

/// Numeric outcome of one fusion pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusedValues {
    pub pm25: f64,
    pub temperature_c: f64,
    pub source: FusionSource,
}

impl FusedValues {
    /// Zero reading used when neither pole reports
    pub fn no_data() -> Self {
        Self {
            pm25: 0.0,
            temperature_c: 0.0,
            source: FusionSource::NoData,
        }
    }

    fn from_pole(reading: &PoleReading, source: FusionSource) -> Option<Self> {
        let (pm25, fahrenheit) = reading.parsed()?;
        Some(Self {
            pm25,
            temperature_c: fahrenheit_to_celsius(fahrenheit),
            source,
        })
    }
}

/// Authoritative air-quality reading for the site
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusedReading {
    pub location: String,
    pub city: String,
    pub pm25: f64,
    pub temperature_c: f64,
    pub source: FusionSource,
    /// Time of the last successful fusion, `None` before the first one
    pub last_updated: Option<DateTime<Utc>>,
}

impl FusedReading {
    pub fn placeholder(site: &SiteLabel) -> Self {
        Self {
            location: site.location.clone(),
            city: site.city.clone(),
            pm25: 0.0,
            temperature_c: 0.0,
            source: FusionSource::NoData,
            last_updated: None,
        }
    }

    pub fn from_values(site: &SiteLabel, values: FusedValues, at: DateTime<Utc>) -> Self {
        Self {
            location: site.location.clone(),
            city: site.city.clone(),
            pm25: values.pm25,
            temperature_c: values.temperature_c,
            source: values.source,
            last_updated: Some(at),
        }
    }

    pub fn aqi(&self) -> i32 {
        aqi_from_concentration(self.pm25)
    }

    pub fn status(&self) -> AirQualityStatus {
        AirQualityStatus::from_pm25(self.pm25)
    }
}

/// Read all four pole entities concurrently
pub async fn read_poles(source: &dyn StateSource, layout: &SensorLayout) -> (PoleReading, PoleReading) {
    let (pm1, temp1, pm2, temp2) = tokio::join!(
        source.get_state(&layout.pole1.pm25),
        source.get_state(&layout.pole1.temperature),
        source.get_state(&layout.pole2.pm25),
        source.get_state(&layout.pole2.temperature),
    );

    (
        PoleReading::new(pm1.state, temp1.state),
        PoleReading::new(pm2.state, temp2.state),
    )
}

/// Apply the precedence policy to two pole readings
///
/// Mean entities are fetched only when both poles are online. `None` means
/// the selected input did not parse and the previous reading should stay.
pub async fn fuse(
    source: &dyn StateSource,
    layout: &SensorLayout,
    pole1: &PoleReading,
    pole2: &PoleReading,
) -> Option<FusedValues> {
    let selected = select_source(pole1, pole2);
    debug!(source = selected.as_str(), "Fusing sensor poles");

    match selected {
        FusionSource::Mean => {
            let (pm25, temperature) = tokio::join!(
                source.get_state(&layout.mean.pm25),
                source.get_state(&layout.mean.temperature),
            );
            let mean = PoleReading::new(pm25.state, temperature.state);
            if let Some(values) = FusedValues::from_pole(&mean, FusionSource::Mean) {
                return Some(values);
            }
            warn!(
                pm25 = %mean.pm25,
                temperature = %mean.temperature,
                "Mean entities did not parse, falling back to pole 1"
            );
            parse_selected(pole1, FusionSource::Pole1)
        }
        FusionSource::Pole1 => parse_selected(pole1, FusionSource::Pole1),
        FusionSource::Pole2 => parse_selected(pole2, FusionSource::Pole2),
        FusionSource::NoData => Some(FusedValues::no_data()),
    }
}

fn parse_selected(reading: &PoleReading, source: FusionSource) -> Option<FusedValues> {
    let values = FusedValues::from_pole(reading, source);
    if values.is_none() {
        warn!(
            source = source.as_str(),
            pm25 = %reading.pm25,
            temperature = %reading.temperature,
            "Pole reading is not numeric, keeping previous air quality"
        );
    }
    values
}

/// Read both poles and fuse them in one pass
pub async fn read_and_fuse(source: &dyn StateSource, layout: &SensorLayout) -> Option<FusedValues> {
    let (pole1, pole2) = read_poles(source, layout).await;
    fuse(source, layout, &pole1, &pole2).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockStateSource;

    fn online(pm: &str, temp: &str) -> PoleReading {
        PoleReading::new(pm, temp)
    }

    fn seed_poles(source: &MockStateSource, pole1: (&str, &str), pole2: (&str, &str)) {
        let layout = SensorLayout::default();
        source.set(&layout.pole1.pm25, pole1.0);
        source.set(&layout.pole1.temperature, pole1.1);
        source.set(&layout.pole2.pm25, pole2.0);
        source.set(&layout.pole2.temperature, pole2.1);
    }

    #[test]
    fn test_select_source_table() {
        let up = online("10", "80");
        let down = online("unavailable", "80");
        assert_eq!(select_source(&up, &up), FusionSource::Mean);
        assert_eq!(select_source(&up, &down), FusionSource::Pole1);
        assert_eq!(select_source(&down, &up), FusionSource::Pole2);
        assert_eq!(select_source(&down, &down), FusionSource::NoData);
    }

    #[test]
    fn test_pole_needs_both_values() {
        assert!(!online("12", "").is_online());
        assert!(!online("unknown", "90").is_online());
        assert!(online("abc", "90").is_online());
    }

    #[test]
    fn test_fahrenheit_conversion() {
        assert!((fahrenheit_to_celsius(86.0) - 30.0).abs() < 1e-9);
        assert!((fahrenheit_to_celsius(32.0)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_both_poles_use_mean() {
        let source = MockStateSource::new();
        let layout = SensorLayout::default();
        seed_poles(&source, ("10", "80"), ("30", "90"));
        source.set(&layout.mean.pm25, "17");
        source.set(&layout.mean.temperature, "86");

        let values = read_and_fuse(&source, &layout).await.unwrap();
        assert_eq!(values.source, FusionSource::Mean);
        assert!((values.pm25 - 17.0).abs() < 1e-9);
        assert!((values.temperature_c - 30.0).abs() < 1e-9);
        assert_eq!(source.reads(&layout.mean.pm25), 1);
    }

    #[tokio::test]
    async fn test_single_pole_skips_mean() {
        let source = MockStateSource::new();
        let layout = SensorLayout::default();
        seed_poles(&source, ("15.5", "86"), ("unavailable", "unavailable"));

        let values = read_and_fuse(&source, &layout).await.unwrap();
        assert_eq!(values.source, FusionSource::Pole1);
        assert!((values.pm25 - 15.5).abs() < 1e-9);
        assert!((values.temperature_c - 30.0).abs() < 1e-9);
        assert_eq!(source.reads(&layout.mean.pm25), 0);
        assert_eq!(source.reads(&layout.mean.temperature), 0);
    }

    #[tokio::test]
    async fn test_second_pole_alone() {
        let source = MockStateSource::new();
        let layout = SensorLayout::default();
        seed_poles(&source, ("unknown", "86"), ("42", "95"));

        let values = read_and_fuse(&source, &layout).await.unwrap();
        assert_eq!(values.source, FusionSource::Pole2);
        assert!((values.pm25 - 42.0).abs() < 1e-9);
        assert!((values.temperature_c - 35.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_no_pole_gives_zero_reading() {
        let source = MockStateSource::new();
        let layout = SensorLayout::default();

        let values = read_and_fuse(&source, &layout).await.unwrap();
        assert_eq!(values, FusedValues::no_data());
        assert_eq!(source.reads(&layout.mean.pm25), 0);
    }

    #[tokio::test]
    async fn test_unparseable_mean_falls_back_to_pole1() {
        let source = MockStateSource::new();
        let layout = SensorLayout::default();
        seed_poles(&source, ("11", "77"), ("13", "79"));
        source.set(&layout.mean.pm25, "unavailable");
        source.set(&layout.mean.temperature, "78");

        let values = read_and_fuse(&source, &layout).await.unwrap();
        assert_eq!(values.source, FusionSource::Pole1);
        assert!((values.pm25 - 11.0).abs() < 1e-9);
        assert!((values.temperature_c - 25.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_non_numeric_pole_keeps_previous() {
        let source = MockStateSource::new();
        let layout = SensorLayout::default();
        seed_poles(&source, ("n/a", "77"), ("", ""));

        assert!(read_and_fuse(&source, &layout).await.is_none());
    }

    #[test]
    fn test_fused_reading_views() {
        let site = SiteLabel::default();
        let reading = FusedReading::from_values(
            &site,
            FusedValues {
                pm25: 20.0,
                temperature_c: 30.0,
                source: FusionSource::Mean,
            },
            Utc::now(),
        );
        assert_eq!(reading.aqi(), 68);
        assert_eq!(reading.status(), AirQualityStatus::Moderate);
        assert_eq!(reading.location, "Ban Bang Khae 2");

        let placeholder = FusedReading::placeholder(&site);
        assert!(placeholder.last_updated.is_none());
        assert_eq!(placeholder.status(), AirQualityStatus::NoSensor);
    }
}
