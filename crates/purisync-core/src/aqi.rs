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

//! PM2.5 concentration to air quality index conversion

use serde::{Deserialize, Serialize};

/// Highest index reported; concentrations above the table clamp to it
pub const MAX_AQI: i32 = 500;

/// One row of the PM2.5 breakpoint table (µg/m³ → index)
#[derive(Debug, Clone, Copy)]
struct Breakpoint {
    concentration_low: f64,
    concentration_high: f64,
    index_low: i32,
    index_high: i32,
}

impl Breakpoint {
    const fn new(concentration_low: f64, concentration_high: f64, index_low: i32, index_high: i32) -> Self {
        Self {
            concentration_low,
            concentration_high,
            index_low,
            index_high,
        }
    }

    fn contains(&self, pm: f64) -> bool {
        pm >= self.concentration_low && pm <= self.concentration_high
    }

    fn interpolate(&self, pm: f64) -> i32 {
        let slope = f64::from(self.index_high - self.index_low)
            / (self.concentration_high - self.concentration_low);
        (f64::from(self.index_low) + slope * (pm - self.concentration_low)).round() as i32
    }
}

const BREAKPOINTS: [Breakpoint; 7] = [
    Breakpoint::new(0.0, 12.0, 0, 50),
    Breakpoint::new(12.1, 35.4, 51, 100),
    Breakpoint::new(35.5, 55.4, 101, 150),
    Breakpoint::new(55.5, 150.4, 151, 200),
    Breakpoint::new(150.5, 250.4, 201, 300),
    Breakpoint::new(250.5, 350.4, 301, 400),
    Breakpoint::new(350.5, 500.4, 401, 500),
];

/// Convert a PM2.5 concentration (µg/m³) to an air quality index
///
/// Linear interpolation inside the first breakpoint range containing `pm`.
/// Values inside the 0.1 µg/m³ gaps between ranges take the upper index of
/// the range below; negative and NaN input yields 0, anything above the
/// table yields [`MAX_AQI`].
pub fn aqi_from_concentration(pm: f64) -> i32 {
    if pm.is_nan() || pm <= 0.0 {
        return 0;
    }

    let mut index_below = 0;
    for breakpoint in &BREAKPOINTS {
        if breakpoint.contains(pm) {
            return breakpoint.interpolate(pm);
        }
        if pm < breakpoint.concentration_low {
            return index_below;
        }
        index_below = breakpoint.index_high;
    }

    MAX_AQI
}

/// Coarse PM2.5 classification shown next to readings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AirQualityStatus {
    /// Reading is zero, i.e. the sensor reported nothing
    NoSensor,
    Excellent,
    Moderate,
    Unhealthy,
}

impl AirQualityStatus {
    pub fn from_pm25(pm25: f64) -> Self {
        match pm25 {
            pm if pm < 0.1 => Self::NoSensor,
            pm if pm < 9.1 => Self::Excellent,
            pm if pm < 55.5 => Self::Moderate,
            _ => Self::Unhealthy,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::NoSensor => "No sensor",
            Self::Excellent => "EXCELLENT",
            Self::Moderate => "MODERATE",
            Self::Unhealthy => "UNHEALTHY",
        }
    }
}
