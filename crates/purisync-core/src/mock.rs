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

//! Scripted in-memory sources for unit tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::traits::{EntitySnapshot, StateSource, StatisticsSource};

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceCall {
    pub domain: String,
    pub service: String,
    pub payload: Value,
}

/// Hub stand-in: unknown entities read as empty, service calls succeed
/// unless rejected
#[derive(Debug, Default)]
pub struct MockStateSource {
    states: Mutex<HashMap<String, EntitySnapshot>>,
    delays: Mutex<HashMap<String, Duration>>,
    service_delays: Mutex<HashMap<String, Duration>>,
    reads: Mutex<HashMap<String, usize>>,
    calls: Mutex<Vec<ServiceCall>>,
    reject_services: AtomicBool,
}

impl MockStateSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, entity_id: &str, state: &str) {
        self.set_snapshot(entity_id, EntitySnapshot::new(state));
    }

    pub fn set_snapshot(&self, entity_id: &str, snapshot: EntitySnapshot) {
        self.states.lock().insert(entity_id.to_owned(), snapshot);
    }

    /// Hold reads of `entity_id` for `delay` before answering
    pub fn delay(&self, entity_id: &str, delay: Duration) {
        self.delays.lock().insert(entity_id.to_owned(), delay);
    }

    /// Hold calls of `domain.service` for `delay` before answering
    pub fn delay_service(&self, service: &str, delay: Duration) {
        self.service_delays.lock().insert(service.to_owned(), delay);
    }

    pub fn reject_services(&self, reject: bool) {
        self.reject_services.store(reject, Ordering::SeqCst);
    }

    pub fn reads(&self, entity_id: &str) -> usize {
        self.reads.lock().get(entity_id).copied().unwrap_or(0)
    }

    pub fn calls(&self) -> Vec<ServiceCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl StateSource for MockStateSource {
    async fn get_state(&self, entity_id: &str) -> EntitySnapshot {
        *self.reads.lock().entry(entity_id.to_owned()).or_default() += 1;

        let delay = self.delays.lock().get(entity_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.states.lock().get(entity_id).cloned().unwrap_or_default()
    }

    async fn call_service(&self, domain: &str, service: &str, payload: Value) -> bool {
        self.calls.lock().push(ServiceCall {
            domain: domain.to_owned(),
            service: service.to_owned(),
            payload,
        });

        let delay = self.service_delays.lock().get(&format!("{domain}.{service}")).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        !self.reject_services.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Statistics stand-in keyed by bin id; unknown bins fail
#[derive(Debug, Default)]
pub struct MockStatisticsSource {
    bins: Mutex<HashMap<String, Value>>,
    fetches: Mutex<usize>,
}

impl MockStatisticsSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `records` (expected to be a JSON array) for `bin_id`
    pub fn set(&self, bin_id: &str, records: Value) {
        self.bins.lock().insert(bin_id.to_owned(), records);
    }

    pub fn remove(&self, bin_id: &str) {
        self.bins.lock().remove(bin_id);
    }

    pub fn fetches(&self) -> usize {
        *self.fetches.lock()
    }
}

#[async_trait]
impl StatisticsSource for MockStatisticsSource {
    async fn fetch_records(&self, bin_id: &str) -> Result<Vec<Value>> {
        *self.fetches.lock() += 1;
        match self.bins.lock().get(bin_id) {
            Some(Value::Array(rows)) => Ok(rows.clone()),
            Some(other) => Err(anyhow!("bin {} is not an array: {}", bin_id, other)),
            None => Err(anyhow!("bin {} not found", bin_id)),
        }
    }

    fn name(&self) -> &str {
        "mock-statistics"
    }
}
