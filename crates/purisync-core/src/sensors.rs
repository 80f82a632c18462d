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

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::fusion::{self, FusionSource, PoleReading, SensorLayout};
use crate::ticket::{FieldClock, TicketDispenser};
use crate::traits::StateSource;

/// Online flag and raw values of one pole
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoleStatus {
    pub online: bool,
    pub pm25: String,
    pub temperature: String,
}

impl From<&PoleReading> for PoleStatus {
    fn from(reading: &PoleReading) -> Self {
        Self {
            online: reading.is_online(),
            pm25: reading.pm25.clone(),
            temperature: reading.temperature.clone(),
        }
    }
}

/// Per-pole diagnostics and the input the fusion policy would pick
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SensorDiagnostics {
    pub pole1: PoleStatus,
    pub pole2: PoleStatus,
    pub active_source: FusionSource,
    pub last_checked: Option<DateTime<Utc>>,
}

impl SensorDiagnostics {
    pub fn online_poles(&self) -> usize {
        usize::from(self.pole1.online) + usize::from(self.pole2.online)
    }
}

#[derive(Debug, Default)]
struct SensorState {
    diagnostics: SensorDiagnostics,
    clock: FieldClock,
}

/// Diagnostic view of the two sensor poles
///
/// Polls on its own cadence and never reads the mean entities.
pub struct SensorStore {
    source: Arc<dyn StateSource>,
    layout: SensorLayout,
    tickets: TicketDispenser,
    state: RwLock<SensorState>,
    updates: watch::Sender<SensorDiagnostics>,
}

impl fmt::Debug for SensorStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SensorStore")
            .field("source", &self.source.name())
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

impl SensorStore {
    pub fn new(source: Arc<dyn StateSource>, layout: SensorLayout) -> Self {
        let (updates, _) = watch::channel(SensorDiagnostics::default());
        Self {
            source,
            layout,
            tickets: TicketDispenser::new(),
            state: RwLock::new(SensorState::default()),
            updates,
        }
    }

    pub fn diagnostics(&self) -> SensorDiagnostics {
        self.state.read().diagnostics.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SensorDiagnostics> {
        self.updates.subscribe()
    }

    /// Read both poles and publish their status
    pub async fn refresh(&self) {
        let ticket = self.tickets.issue();
        let (pole1, pole2) = fusion::read_poles(self.source.as_ref(), &self.layout).await;

        let diagnostics = SensorDiagnostics {
            pole1: PoleStatus::from(&pole1),
            pole2: PoleStatus::from(&pole2),
            active_source: fusion::select_source(&pole1, &pole2),
            last_checked: Some(Utc::now()),
        };

        let mut state = self.state.write();
        if !state.clock.admit(ticket) {
            debug!(ticket = ticket.value(), "Stale pole status dropped");
            return;
        }

        let active = diagnostics.active_source;
        let changed = state.diagnostics.active_source != active;
        state.diagnostics = diagnostics.clone();
        self.updates.send_replace(diagnostics);
        drop(state);

        if changed {
            info!(source = active.as_str(), "Sensor fusion source changed");
        }
    }
}
