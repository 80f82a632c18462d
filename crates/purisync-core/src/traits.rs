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

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Raw states meaning "no current reading" (besides the empty string)
pub const SENTINEL_STATES: [&str; 2] = ["unknown", "unavailable"];

/// A raw state counts as a reading unless it is a sentinel or empty
pub fn is_valid_state(state: &str) -> bool {
    !(state.is_empty() || SENTINEL_STATES.contains(&state))
}

/// Raw state and attributes of one hub entity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntitySnapshot {
    pub state: String,
    pub attributes: Map<String, Value>,
}

impl EntitySnapshot {
    pub fn new(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            attributes: Map::new(),
        }
    }

    /// Snapshot returned when the hub could not be read
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// True when nothing came back (transport or decoding failure)
    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    pub fn is_valid(&self) -> bool {
        is_valid_state(&self.state)
    }
}

// ============= Data Source Traits =============

/// Access to hub entity state and services
///
/// Implementations are fail-soft: a read that cannot be completed yields
/// [`EntitySnapshot::empty`], a service call that is not acknowledged with a
/// 2xx status yields `false`. Both are logged by the implementation.
#[async_trait]
pub trait StateSource: Send + Sync {
    /// Read one entity
    async fn get_state(&self, entity_id: &str) -> EntitySnapshot;

    /// Call `{domain}.{service}` with a JSON payload
    async fn call_service(&self, domain: &str, service: &str, payload: Value) -> bool;

    /// Get the name of this data source
    fn name(&self) -> &str;
}

/// Source of pre-aggregated statistics series
#[async_trait]
pub trait StatisticsSource: Send + Sync {
    /// Fetch the latest rows stored under `bin_id`
    async fn fetch_records(&self, bin_id: &str) -> Result<Vec<Value>>;

    /// Get the name of this data source
    fn name(&self) -> &str;
}
