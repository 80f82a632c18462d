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

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::registry::DeviceRegistry;
use crate::sensors::SensorStore;
use crate::statistics::StatisticsStore;

/// Smallest period a cycle will run at
const MIN_PERIOD: Duration = Duration::from_millis(100);

/// Periods of the three refresh cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshIntervals {
    /// Devices plus the fused air-quality reading
    pub devices: Duration,
    /// Diagnostic pole status
    pub sensors: Duration,
    pub statistics: Duration,
}

impl Default for RefreshIntervals {
    fn default() -> Self {
        Self {
            devices: Duration::from_secs(30),
            sensors: Duration::from_secs(30),
            statistics: Duration::from_secs(1800),
        }
    }
}

/// Drives periodic refreshes of the registry and the stores
#[derive(Debug)]
pub struct RefreshScheduler {
    registry: Arc<DeviceRegistry>,
    sensors: Arc<SensorStore>,
    statistics: Option<Arc<StatisticsStore>>,
    intervals: RefreshIntervals,
}

impl RefreshScheduler {
    pub fn new(registry: Arc<DeviceRegistry>, sensors: Arc<SensorStore>, intervals: RefreshIntervals) -> Self {
        Self {
            registry,
            sensors,
            statistics: None,
            intervals,
        }
    }

    pub fn with_statistics(mut self, statistics: Arc<StatisticsStore>) -> Self {
        self.statistics = Some(statistics);
        self
    }

    /// Spawn every cycle; the first tick of each fires immediately
    pub fn start(self) -> SchedulerHandle {
        let (shutdown, stop) = watch::channel(false);
        let mut tasks = Vec::with_capacity(3);

        let registry = self.registry;
        tasks.push(spawn_cycle("devices", self.intervals.devices, stop.clone(), move || {
            let registry = Arc::clone(&registry);
            async move { registry.refresh().await }
        }));

        let sensors = self.sensors;
        tasks.push(spawn_cycle("sensors", self.intervals.sensors, stop.clone(), move || {
            let sensors = Arc::clone(&sensors);
            async move { sensors.refresh().await }
        }));

        if let Some(statistics) = self.statistics {
            tasks.push(spawn_cycle("statistics", self.intervals.statistics, stop, move || {
                let statistics = Arc::clone(&statistics);
                async move {
                    statistics.fetch_all().await;
                }
            }));
        }

        info!(cycles = tasks.len(), "Refresh scheduler started");
        SchedulerHandle { shutdown, tasks }
    }
}

/// Run `job` every `period` until told to stop
///
/// Each tick spawns the job without waiting for the previous one.
fn spawn_cycle<F, Fut>(
    name: &'static str,
    period: Duration,
    mut stop: watch::Receiver<bool>,
    job: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period.max(MIN_PERIOD));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        debug!(cycle = name, period_secs = period.as_secs(), "Refresh cycle running");

        loop {
            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    debug!(cycle = name, "Refresh tick");
                    tokio::spawn(job());
                }
            }
        }

        debug!(cycle = name, "Refresh cycle stopped");
    })
}

/// Running scheduler; dropping it also stops the cycles
#[derive(Debug)]
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub fn is_running(&self) -> bool {
        self.tasks.iter().any(|task| !task.is_finished())
    }

    /// Stop every cycle and wait for the loops to exit
    ///
    /// Refreshes already spawned are left to finish on their own.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Refresh cycle ended abnormally");
            }
        }
        info!("Refresh scheduler stopped");
    }
}
