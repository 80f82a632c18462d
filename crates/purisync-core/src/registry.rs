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

//! Device registry: the polled mirror of every purifier plus the fused
//! air-quality reading, and the commands that mutate them.
//!
//! Reads fan out concurrently and are applied under a short write lock.
//! Every poll and command carries a [`Ticket`]; a completion older than the
//! last one applied to the same field group is dropped.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::device::{Device, DeviceEntities, DeviceMode, DeviceSpec, percentage_attribute};
use crate::fusion::{self, FusedReading, SensorLayout, SiteLabel};
use crate::level::FanLevel;
use crate::ticket::{FieldClock, Ticket, TicketDispenser};
use crate::traits::{EntitySnapshot, StateSource, is_valid_state};

/// Default wait between enabling auto mode and the confirming re-poll
pub const DEFAULT_AUTO_MODE_SETTLE: Duration = Duration::from_secs(1);

/// Hub-wide control entities shared by all purifiers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlEntities {
    /// `input_boolean` whose state selects auto (on) or manual mode
    pub auto_mode_flag: String,
    /// `input_select` taking the upper-case level options
    pub fan_level_select: String,
    /// Automation triggered after auto mode is switched on (without `automation.`)
    pub auto_on_automation: String,
    pub auto_off_automation: String,
}

impl Default for ControlEntities {
    fn default() -> Self {
        Self {
            auto_mode_flag: "input_boolean.auto_air_purifier".to_owned(),
            fan_level_select: "input_select.air_purifier_manual_control".to_owned(),
            auto_on_automation: "auto_on_all_devices".to_owned(),
            auto_off_automation: "auto_off_all_devices".to_owned(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub devices: Vec<DeviceSpec>,
    pub controls: ControlEntities,
    pub sensors: SensorLayout,
    pub site: SiteLabel,
    pub auto_mode_settle: Duration,
}

impl RegistrySettings {
    pub fn new(devices: Vec<DeviceSpec>) -> Self {
        Self {
            devices,
            controls: ControlEntities::default(),
            sensors: SensorLayout::default(),
            site: SiteLabel::default(),
            auto_mode_settle: DEFAULT_AUTO_MODE_SETTLE,
        }
    }
}

/// Point-in-time copy published to observers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistrySnapshot {
    pub devices: Vec<Device>,
    pub air_quality: FusedReading,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FleetSummary {
    pub devices: usize,
    pub devices_on: usize,
    pub auto_mode: usize,
    pub in_flight: usize,
    /// Mean of device PM2.5 values above zero
    pub average_pm25: Option<f64>,
}

/// Entity polled per device during a full refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeviceField {
    Power,
    FilterLife,
    Aqi,
    Pm25,
    Note,
}

impl DeviceField {
    const ALL: [DeviceField; 5] = [
        DeviceField::Power,
        DeviceField::FilterLife,
        DeviceField::Aqi,
        DeviceField::Pm25,
        DeviceField::Note,
    ];

    fn entity(self, entities: &DeviceEntities) -> &str {
        match self {
            Self::Power => &entities.power,
            Self::FilterLife => &entities.filter_life,
            Self::Aqi => &entities.aqi,
            Self::Pm25 => &entities.pm25,
            Self::Note => &entities.note,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Power => "power",
            Self::FilterLife => "filter_life",
            Self::Aqi => "aqi",
            Self::Pm25 => "pm25",
            Self::Note => "note",
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct DeviceClocks {
    power: FieldClock,
    fan: FieldClock,
    filter: FieldClock,
    aqi: FieldClock,
    pm25: FieldClock,
    note: FieldClock,
}

#[derive(Debug)]
struct TrackedDevice {
    device: Device,
    level_select: Option<String>,
    clocks: DeviceClocks,
    pending_commands: u32,
}

impl TrackedDevice {
    fn begin_command(&mut self) {
        self.pending_commands += 1;
        self.device.in_flight = true;
    }

    fn finish_command(&mut self) {
        self.pending_commands = self.pending_commands.saturating_sub(1);
        self.device.in_flight = self.pending_commands > 0;
    }

    fn apply_power(&mut self, ticket: Ticket, snapshot: &EntitySnapshot) {
        if snapshot.is_empty() {
            debug!(device = %self.device.id, "No power state this cycle");
            return;
        }

        if self.clocks.power.admit(ticket) {
            self.device.is_on = snapshot.state == "on";
        } else {
            debug!(device = %self.device.id, ticket = ticket.value(), "Stale power state dropped");
        }

        if self.clocks.fan.admit(ticket) {
            self.device.set_percentage(percentage_attribute(&snapshot.attributes));
        } else {
            debug!(device = %self.device.id, ticket = ticket.value(), "Stale fan percentage dropped");
        }
    }

    fn apply_field(&mut self, field: DeviceField, ticket: Ticket, snapshot: &EntitySnapshot) {
        let entity = field.entity(&self.device.entities).to_owned();
        let admitted = match field {
            DeviceField::Power => {
                self.apply_power(ticket, snapshot);
                return;
            }
            DeviceField::FilterLife => parse_reading::<i32>(&entity, &snapshot.state).map(|value| {
                let admitted = self.clocks.filter.admit(ticket);
                if admitted {
                    self.device.filter_life = value;
                }
                admitted
            }),
            DeviceField::Aqi => parse_reading::<i32>(&entity, &snapshot.state).map(|value| {
                let admitted = self.clocks.aqi.admit(ticket);
                if admitted {
                    self.device.aqi = value;
                }
                admitted
            }),
            DeviceField::Pm25 => parse_reading::<f64>(&entity, &snapshot.state)
                .filter(|value| value.is_finite())
                .map(|value| {
                    let admitted = self.clocks.pm25.admit(ticket);
                    if admitted {
                        self.device.pm25 = value;
                    }
                    admitted
                }),
            DeviceField::Note if snapshot.is_empty() => {
                debug!(device = %self.device.id, "No note state this cycle");
                None
            }
            DeviceField::Note => {
                let admitted = self.clocks.note.admit(ticket);
                if admitted {
                    self.device.note = is_valid_state(&snapshot.state).then(|| snapshot.state.clone());
                }
                Some(admitted)
            }
        };

        if admitted == Some(false) {
            debug!(
                device = %self.device.id,
                field = field.as_str(),
                ticket = ticket.value(),
                "Stale reading dropped"
            );
        }
    }
}

/// Parse a numeric entity state, logging why it was rejected
fn parse_reading<T: FromStr>(entity_id: &str, state: &str) -> Option<T> {
    match state.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) if !is_valid_state(state) => {
            debug!(entity = entity_id, state, "Entity has no reading");
            None
        }
        Err(_) => {
            warn!(entity = entity_id, state, "Failed to parse entity state, keeping previous value");
            None
        }
    }
}

#[derive(Debug)]
struct RegistryState {
    devices: Vec<TrackedDevice>,
    mode_clock: FieldClock,
    air_quality: FusedReading,
    air_clock: FieldClock,
}

impl RegistryState {
    fn device_mut(&mut self, id: &str) -> Option<&mut TrackedDevice> {
        self.devices.iter_mut().find(|tracked| tracked.device.id == id)
    }

    fn device(&self, id: &str) -> Option<&TrackedDevice> {
        self.devices.iter().find(|tracked| tracked.device.id == id)
    }

    fn apply_mode(&mut self, ticket: Ticket, snapshot: &EntitySnapshot) {
        if snapshot.is_empty() {
            debug!("No auto mode flag state this cycle");
            return;
        }
        if !self.mode_clock.admit(ticket) {
            debug!(ticket = ticket.value(), "Stale auto mode flag dropped");
            return;
        }

        let mode = DeviceMode::from_flag(&snapshot.state);
        for tracked in &mut self.devices {
            tracked.device.mode = mode;
        }
    }

    fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            devices: self.devices.iter().map(|tracked| tracked.device.clone()).collect(),
            air_quality: self.air_quality.clone(),
        }
    }
}

pub struct DeviceRegistry {
    source: Arc<dyn StateSource>,
    controls: ControlEntities,
    sensors: SensorLayout,
    site: SiteLabel,
    auto_mode_settle: Duration,
    tickets: TicketDispenser,
    state: RwLock<RegistryState>,
    updates: watch::Sender<RegistrySnapshot>,
}

impl fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("source", &self.source.name())
            .field("devices", &self.state.read().devices.len())
            .finish_non_exhaustive()
    }
}

impl DeviceRegistry {
    pub fn new(source: Arc<dyn StateSource>, settings: RegistrySettings) -> Self {
        let devices = settings
            .devices
            .iter()
            .map(|spec| TrackedDevice {
                device: Device::from_spec(spec),
                level_select: spec.level_select.clone(),
                clocks: DeviceClocks::default(),
                pending_commands: 0,
            })
            .collect();

        let state = RegistryState {
            devices,
            mode_clock: FieldClock::default(),
            air_quality: FusedReading::placeholder(&settings.site),
            air_clock: FieldClock::default(),
        };
        let (updates, _) = watch::channel(state.snapshot());

        Self {
            source,
            controls: settings.controls,
            sensors: settings.sensors,
            site: settings.site,
            auto_mode_settle: settings.auto_mode_settle,
            tickets: TicketDispenser::new(),
            state: RwLock::new(state),
            updates,
        }
    }

    // ============= Observation =============

    pub fn snapshot(&self) -> RegistrySnapshot {
        self.state.read().snapshot()
    }

    pub fn devices(&self) -> Vec<Device> {
        self.snapshot().devices
    }

    pub fn device(&self, id: &str) -> Option<Device> {
        self.state.read().device(id).map(|tracked| tracked.device.clone())
    }

    pub fn air_quality(&self) -> FusedReading {
        self.state.read().air_quality.clone()
    }

    /// Receiver notified after every applied change
    pub fn subscribe(&self) -> watch::Receiver<RegistrySnapshot> {
        self.updates.subscribe()
    }

    pub fn summary(&self) -> FleetSummary {
        let state = self.state.read();
        let devices: Vec<&Device> = state.devices.iter().map(|tracked| &tracked.device).collect();
        let readings: Vec<f64> = devices
            .iter()
            .map(|device| device.pm25)
            .filter(|pm25| *pm25 > 0.0)
            .collect();

        FleetSummary {
            devices: devices.len(),
            devices_on: devices.iter().filter(|device| device.is_on).count(),
            auto_mode: devices.iter().filter(|device| device.mode == DeviceMode::Auto).count(),
            in_flight: devices.iter().filter(|device| device.in_flight).count(),
            average_pm25: (!readings.is_empty())
                .then(|| readings.iter().sum::<f64>() / readings.len() as f64),
        }
    }

    /// Mutate state under the write lock and publish the result
    fn apply<R>(&self, change: impl FnOnce(&mut RegistryState) -> R) -> R {
        let mut state = self.state.write();
        let result = change(&mut state);
        self.updates.send_replace(state.snapshot());
        result
    }

    // ============= Polling =============

    /// Full device refresh plus air-quality fusion
    pub async fn refresh(&self) {
        tokio::join!(self.refresh_all_devices(), self.refresh_air_quality());
    }

    /// Re-read one device's power entity and the shared mode flag
    ///
    /// Returns false for an unknown device id.
    pub async fn refresh_device_state(&self, id: &str) -> bool {
        let Some(power_entity) = self
            .state
            .read()
            .device(id)
            .map(|tracked| tracked.device.entities.power.clone())
        else {
            warn!(device = id, "Refresh requested for unknown device");
            return false;
        };

        let ticket = self.tickets.issue();
        let (power, flag) = tokio::join!(
            self.source.get_state(&power_entity),
            self.source.get_state(&self.controls.auto_mode_flag),
        );

        self.apply(|state| {
            if let Some(tracked) = state.device_mut(id) {
                tracked.apply_power(ticket, &power);
            }
            state.apply_mode(ticket, &flag);
        });
        true
    }

    /// Re-read every entity of every device, and the mode flag once
    pub async fn refresh_all_devices(&self) {
        let ticket = self.tickets.issue();
        let roster: Vec<(String, DeviceEntities)> = self
            .state
            .read()
            .devices
            .iter()
            .map(|tracked| (tracked.device.id.clone(), tracked.device.entities.clone()))
            .collect();

        debug!(devices = roster.len(), ticket = ticket.value(), "Refreshing all devices");

        let polls = roster.iter().flat_map(|(id, entities)| {
            DeviceField::ALL
                .into_iter()
                .map(move |field| self.poll_field(id, entities, field, ticket))
        });
        let mode = async {
            let flag = self.source.get_state(&self.controls.auto_mode_flag).await;
            self.apply(|state| state.apply_mode(ticket, &flag));
        };

        tokio::join!(join_all(polls), mode);

        let summary = self.summary();
        info!(
            devices = summary.devices,
            on = summary.devices_on,
            auto = summary.auto_mode,
            "Device refresh complete"
        );
    }

    async fn poll_field(&self, id: &str, entities: &DeviceEntities, field: DeviceField, ticket: Ticket) {
        let snapshot = self.source.get_state(field.entity(entities)).await;
        self.apply(|state| {
            if let Some(tracked) = state.device_mut(id) {
                tracked.apply_field(field, ticket, &snapshot);
            }
        });
    }

    /// Fuse the sensor poles into the site reading
    pub async fn refresh_air_quality(&self) {
        let ticket = self.tickets.issue();
        let Some(values) = fusion::read_and_fuse(self.source.as_ref(), &self.sensors).await else {
            return;
        };

        let reading = FusedReading::from_values(&self.site, values, Utc::now());
        let applied = self.apply(|state| {
            let admitted = state.air_clock.admit(ticket);
            if admitted {
                state.air_quality = reading;
            }
            admitted
        });

        if applied {
            info!(
                source = values.source.as_str(),
                pm25 = values.pm25,
                temperature_c = values.temperature_c,
                "Air quality updated"
            );
        } else {
            debug!(ticket = ticket.value(), "Stale air quality reading dropped");
        }
    }

    // ============= Commands =============

    /// Flip a device's power; on success the local state follows
    pub async fn toggle_power(&self, id: &str) -> bool {
        let Some((entity, was_on)) = self.apply(|state| {
            state.device_mut(id).map(|tracked| {
                tracked.begin_command();
                (tracked.device.entities.power.clone(), tracked.device.is_on)
            })
        }) else {
            warn!(device = id, "Power toggle requested for unknown device");
            return false;
        };

        let ticket = self.tickets.issue();
        let service = if was_on { "turn_off" } else { "turn_on" };
        info!(device = id, service, "Toggling power");

        let success = self
            .source
            .call_service("fan", service, json!({ "entity_id": entity }))
            .await;

        self.apply(|state| {
            if let Some(tracked) = state.device_mut(id) {
                if success && tracked.clocks.power.admit(ticket) {
                    tracked.device.is_on = !was_on;
                }
                tracked.finish_command();
            }
        });

        if success {
            info!(device = id, is_on = !was_on, "Power toggled");
        } else {
            error!(device = id, service, "Power toggle rejected by hub");
        }
        success
    }

    /// Switch the hub-wide auto mode, trigger the matching automation and
    /// schedule a full re-poll
    pub async fn set_auto_mode(self: &Arc<Self>, enabled: bool) -> bool {
        let service = if enabled { "turn_on" } else { "turn_off" };
        info!(enabled, "Setting auto mode");

        let success = self
            .source
            .call_service(
                "input_boolean",
                service,
                json!({ "entity_id": self.controls.auto_mode_flag }),
            )
            .await;
        if !success {
            error!(enabled, "Auto mode change rejected by hub");
            return false;
        }

        let automation = if enabled {
            &self.controls.auto_on_automation
        } else {
            &self.controls.auto_off_automation
        };
        let triggered = self
            .source
            .call_service(
                "automation",
                "trigger",
                json!({ "entity_id": format!("automation.{automation}") }),
            )
            .await;
        if triggered {
            info!(automation = %automation, "Automation triggered");
        } else {
            warn!(automation = %automation, "Automation trigger failed");
        }

        let registry = Arc::clone(self);
        let settle = self.auto_mode_settle;
        tokio::spawn(async move {
            tokio::time::sleep(settle).await;
            registry.refresh_all_devices().await;
        });

        true
    }

    /// Select a fan level; on success level and percentage follow
    pub async fn set_fan_level(&self, id: &str, level: FanLevel) -> bool {
        let Some(select) = self.apply(|state| {
            state.device_mut(id).map(|tracked| {
                tracked.begin_command();
                tracked
                    .level_select
                    .clone()
                    .unwrap_or_else(|| self.controls.fan_level_select.clone())
            })
        }) else {
            warn!(device = id, "Fan level requested for unknown device");
            return false;
        };

        let ticket = self.tickets.issue();
        info!(device = id, level = %level, "Setting fan level");

        let success = self
            .source
            .call_service(
                "input_select",
                "select_option",
                json!({ "entity_id": select, "option": level.option() }),
            )
            .await;

        self.apply(|state| {
            if let Some(tracked) = state.device_mut(id) {
                if success && tracked.clocks.fan.admit(ticket) {
                    tracked.device.set_fan_level(level);
                }
                tracked.finish_command();
            }
        });

        if !success {
            error!(device = id, level = %level, "Fan level change rejected by hub");
        }
        success
    }

    /// Edit the local note; `None` or blank text clears it
    ///
    /// Returns false for an unknown device id.
    pub fn set_note(&self, id: &str, text: Option<String>) -> bool {
        let ticket = self.tickets.issue();
        self.apply(|state| {
            let Some(tracked) = state.device_mut(id) else {
                return false;
            };
            if tracked.clocks.note.admit(ticket) {
                tracked.device.note = text.filter(|note| !note.trim().is_empty());
            }
            true
        })
    }

    /// Push the local note to the hub (empty string when there is none)
    pub async fn update_note(&self, id: &str) -> bool {
        let Some((entity, note)) = self.apply(|state| {
            state.device_mut(id).map(|tracked| {
                tracked.begin_command();
                (
                    tracked.device.entities.note.clone(),
                    tracked.device.note.clone().unwrap_or_default(),
                )
            })
        }) else {
            warn!(device = id, "Note update requested for unknown device");
            return false;
        };

        let success = self
            .source
            .call_service(
                "input_text",
                "set_value",
                json!({ "entity_id": entity, "value": note }),
            )
            .await;

        self.apply(|state| {
            if let Some(tracked) = state.device_mut(id) {
                tracked.finish_command();
            }
        });

        if success {
            info!(device = id, "Note saved");
        } else {
            error!(device = id, "Note update rejected by hub");
        }
        success
    }
}
