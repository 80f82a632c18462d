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

pub mod aqi;
pub mod device;
pub mod fusion;
pub mod level;
pub mod registry;
pub mod scheduler;
pub mod sensors;
pub mod statistics;
pub mod ticket;
pub mod traits;

#[cfg(test)]
pub(crate) mod mock;

pub use aqi::{AirQualityStatus, MAX_AQI, aqi_from_concentration};
pub use device::{Device, DeviceEntities, DeviceMode, DeviceSpec, FilterHealth};
pub use fusion::{
    FusedReading, FusedValues, FusionSource, PoleEntities, PoleReading, SensorLayout, SiteLabel,
    fahrenheit_to_celsius, select_source,
};
pub use level::{FanLevel, level_to_percentage, percentage_to_level};
pub use registry::{
    ControlEntities, DEFAULT_AUTO_MODE_SETTLE, DeviceRegistry, FleetSummary, RegistrySettings,
    RegistrySnapshot,
};
pub use scheduler::{RefreshIntervals, RefreshScheduler, SchedulerHandle};
pub use sensors::{PoleStatus, SensorDiagnostics, SensorStore};
pub use statistics::{
    AggregateStatistics, Pm25ByDate, Pm25ByDay, Pm25ByTimeSlot, StatisticsBins, StatisticsStore,
    TemperatureByDate, TemperatureByDay, TemperatureByTimeSlot,
};
pub use traits::{EntitySnapshot, StateSource, StatisticsSource, is_valid_state};
