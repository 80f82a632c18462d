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

//! Pre-aggregated PM2.5 and temperature series.
//!
//! The series are computed elsewhere; this module only fetches them, decodes
//! the rows and keeps the latest good copy of each.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::traits::StatisticsSource;

const REPORT_DATE_FORMAT: &str = "%Y-%m-%d";

fn parse_report_date(raw: &str) -> Option<NaiveDate> {
    let date = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date, REPORT_DATE_FORMAT).ok()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pm25ByDate {
    #[serde(rename = "ReportDate")]
    pub report_date: String,
    #[serde(rename = "AveragePM25")]
    pub average_pm25: Option<f64>,
}

impl Pm25ByDate {
    pub fn date(&self) -> Option<NaiveDate> {
        parse_report_date(&self.report_date)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pm25ByDay {
    #[serde(rename = "DayOfWeek")]
    pub day_of_week: String,
    #[serde(rename = "AveragePM25")]
    pub average_pm25: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pm25ByTimeSlot {
    #[serde(rename = "TimeSlot")]
    pub time_slot: String,
    #[serde(rename = "AveragePM25")]
    pub average_pm25: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureByDate {
    #[serde(rename = "ReportDate")]
    pub report_date: String,
    #[serde(rename = "AverageCelsius")]
    pub average_celsius: Option<f64>,
}

impl TemperatureByDate {
    pub fn date(&self) -> Option<NaiveDate> {
        parse_report_date(&self.report_date)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureByDay {
    #[serde(rename = "DayOfWeek")]
    pub day_of_week: String,
    #[serde(rename = "AverageCelsius")]
    pub average_celsius: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureByTimeSlot {
    #[serde(rename = "TimeSlot")]
    pub time_slot: String,
    #[serde(rename = "AverageCelsius")]
    pub average_celsius: Option<f64>,
}

/// Storage ids of the six series
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsBins {
    pub pm25_by_date: String,
    pub pm25_by_day: String,
    pub pm25_by_time_slot: String,
    pub temperature_by_date: String,
    pub temperature_by_day: String,
    pub temperature_by_time_slot: String,
}

impl Default for StatisticsBins {
    fn default() -> Self {
        Self {
            pm25_by_date: "68cac8cfd0ea881f40811a8d".to_owned(),
            pm25_by_day: "68cac914d0ea881f40811aeb".to_owned(),
            pm25_by_time_slot: "68cac94cae596e708ff1e64f".to_owned(),
            temperature_by_date: "68cac8e7d0ea881f40811aa7".to_owned(),
            temperature_by_day: "68cac932ae596e708ff1e627".to_owned(),
            temperature_by_time_slot: "68cac97a43b1c97be9462a0d".to_owned(),
        }
    }
}

/// Latest copy of every series
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateStatistics {
    pub pm25_by_date: Vec<Pm25ByDate>,
    pub pm25_by_day: Vec<Pm25ByDay>,
    pub pm25_by_time_slot: Vec<Pm25ByTimeSlot>,
    pub temperature_by_date: Vec<TemperatureByDate>,
    pub temperature_by_day: Vec<TemperatureByDay>,
    pub temperature_by_time_slot: Vec<TemperatureByTimeSlot>,
    /// Time of the last fetch that replaced at least one series
    pub fetched_at: Option<DateTime<Utc>>,
}

pub struct StatisticsStore {
    source: Arc<dyn StatisticsSource>,
    bins: StatisticsBins,
    state: RwLock<AggregateStatistics>,
}

impl fmt::Debug for StatisticsStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatisticsStore")
            .field("source", &self.source.name())
            .field("bins", &self.bins)
            .finish_non_exhaustive()
    }
}

/// Replace `target` when a series decoded
fn replace<T>(target: &mut Vec<T>, fetched: Option<Vec<T>>) -> bool {
    match fetched {
        Some(rows) => {
            *target = rows;
            true
        }
        None => false,
    }
}

impl StatisticsStore {
    pub fn new(source: Arc<dyn StatisticsSource>, bins: StatisticsBins) -> Self {
        Self {
            source,
            bins,
            state: RwLock::new(AggregateStatistics::default()),
        }
    }

    pub fn snapshot(&self) -> AggregateStatistics {
        self.state.read().clone()
    }

    /// Fetch all six series concurrently
    ///
    /// Returns how many series were replaced; failed ones keep their previous
    /// rows.
    pub async fn fetch_all(&self) -> usize {
        let bins = &self.bins;
        let (pm_date, pm_day, pm_slot, temp_date, temp_day, temp_slot) = tokio::join!(
            self.fetch_series::<Pm25ByDate>("pm25_by_date", &bins.pm25_by_date),
            self.fetch_series::<Pm25ByDay>("pm25_by_day", &bins.pm25_by_day),
            self.fetch_series::<Pm25ByTimeSlot>("pm25_by_time_slot", &bins.pm25_by_time_slot),
            self.fetch_series::<TemperatureByDate>("temperature_by_date", &bins.temperature_by_date),
            self.fetch_series::<TemperatureByDay>("temperature_by_day", &bins.temperature_by_day),
            self.fetch_series::<TemperatureByTimeSlot>(
                "temperature_by_time_slot",
                &bins.temperature_by_time_slot
            ),
        );

        let mut state = self.state.write();
        let replaced = [
            replace(&mut state.pm25_by_date, pm_date),
            replace(&mut state.pm25_by_day, pm_day),
            replace(&mut state.pm25_by_time_slot, pm_slot),
            replace(&mut state.temperature_by_date, temp_date),
            replace(&mut state.temperature_by_day, temp_day),
            replace(&mut state.temperature_by_time_slot, temp_slot),
        ]
        .into_iter()
        .filter(|replaced| *replaced)
        .count();

        if replaced > 0 {
            state.fetched_at = Some(Utc::now());
        }
        drop(state);

        info!(replaced, total = 6, "Statistics refresh complete");
        replaced
    }

    async fn fetch_series<T: DeserializeOwned>(&self, series: &str, bin_id: &str) -> Option<Vec<T>> {
        let records = match self.source.fetch_records(bin_id).await {
            Ok(records) => records,
            Err(e) => {
                warn!(series, bin_id, error = %e, "Failed to fetch statistics series");
                return None;
            }
        };

        match records
            .into_iter()
            .map(decode_row::<T>)
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(rows) => {
                debug!(series, rows = rows.len(), "Statistics series decoded");
                Some(rows)
            }
            Err(e) => {
                warn!(series, bin_id, error = %e, "Failed to decode statistics series");
                None
            }
        }
    }
}

/// Decode one row outside the store
pub fn decode_row<T: DeserializeOwned>(row: Value) -> serde_json::Result<T> {
    serde_json::from_value(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockStatisticsSource;
    use serde_json::json;

    fn seeded_source(bins: &StatisticsBins) -> Arc<MockStatisticsSource> {
        let source = Arc::new(MockStatisticsSource::new());
        source.set(
            &bins.pm25_by_date,
            json!([
                { "ReportDate": "2025-09-15", "AveragePM25": 18.4 },
                { "ReportDate": "2025-09-16T00:00:00", "AveragePM25": null }
            ]),
        );
        source.set(
            &bins.pm25_by_day,
            json!([{ "DayOfWeek": "Monday", "AveragePM25": 21.0 }]),
        );
        source.set(
            &bins.pm25_by_time_slot,
            json!([{ "TimeSlot": "06:00-09:00", "AveragePM25": 30.2 }]),
        );
        source.set(
            &bins.temperature_by_date,
            json!([{ "ReportDate": "2025-09-15", "AverageCelsius": 31.5 }]),
        );
        source.set(
            &bins.temperature_by_day,
            json!([{ "DayOfWeek": "Monday", "AverageCelsius": 30.0 }]),
        );
        source.set(
            &bins.temperature_by_time_slot,
            json!([{ "TimeSlot": "12:00-15:00", "AverageCelsius": 34.1 }]),
        );
        source
    }

    #[tokio::test]
    async fn test_fetch_all_replaces_every_series() {
        let bins = StatisticsBins::default();
        let source = seeded_source(&bins);
        let store = StatisticsStore::new(source.clone(), bins);

        assert_eq!(store.fetch_all().await, 6);
        assert_eq!(source.fetches(), 6);

        let stats = store.snapshot();
        assert_eq!(stats.pm25_by_date.len(), 2);
        assert_eq!(
            stats.pm25_by_date[0].date(),
            NaiveDate::from_ymd_opt(2025, 9, 15)
        );
        assert_eq!(
            stats.pm25_by_date[1].date(),
            NaiveDate::from_ymd_opt(2025, 9, 16)
        );
        assert!(stats.pm25_by_date[1].average_pm25.is_none());
        assert_eq!(stats.temperature_by_time_slot[0].time_slot, "12:00-15:00");
        assert!(stats.fetched_at.is_some());
    }

    #[tokio::test]
    async fn test_failed_series_keeps_previous_rows() {
        let bins = StatisticsBins::default();
        let source = seeded_source(&bins);
        let store = StatisticsStore::new(source.clone(), bins.clone());
        store.fetch_all().await;

        source.remove(&bins.pm25_by_day);
        source.set(&bins.temperature_by_day, json!([{ "DayOfWeek": 3 }]));

        assert_eq!(store.fetch_all().await, 4);

        let stats = store.snapshot();
        assert_eq!(stats.pm25_by_day[0].day_of_week, "Monday");
        assert_eq!(stats.temperature_by_day[0].average_celsius, Some(30.0));
    }

    #[tokio::test]
    async fn test_nothing_fetched_leaves_timestamp_unset() {
        let source = Arc::new(MockStatisticsSource::new());
        let store = StatisticsStore::new(source, StatisticsBins::default());

        assert_eq!(store.fetch_all().await, 0);
        assert!(store.snapshot().fetched_at.is_none());
    }

    #[test]
    fn test_decode_row_field_names() {
        let row: TemperatureByDay =
            decode_row(json!({ "DayOfWeek": "Friday", "AverageCelsius": 29.9 })).unwrap();
        assert_eq!(row.day_of_week, "Friday");
        assert_eq!(row.average_celsius, Some(29.9));
        assert!(decode_row::<Pm25ByDay>(json!({ "AveragePM25": 1.0 })).is_err());
    }
}
