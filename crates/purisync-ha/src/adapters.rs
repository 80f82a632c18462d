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

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::client::HomeAssistantClient;
use crate::errors::HaError;
use crate::statistics::JsonBinClient;
use purisync_core::{EntitySnapshot, StateSource, StatisticsSource};

/// Fail-soft [`StateSource`] over the strict hub client
///
/// Read failures become an empty snapshot and rejected service calls become
/// `false`; both are logged here.
#[derive(Debug, Clone)]
pub struct HomeAssistantStateSource {
    client: Arc<HomeAssistantClient>,
}

impl HomeAssistantStateSource {
    pub fn new(client: Arc<HomeAssistantClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StateSource for HomeAssistantStateSource {
    async fn get_state(&self, entity_id: &str) -> EntitySnapshot {
        match self.client.fetch_state(entity_id).await {
            Ok(state) => EntitySnapshot {
                state: state.state,
                attributes: state.attributes,
            },
            Err(HaError::EntityNotFound(_)) => {
                debug!("⚠️ [ADAPTER] {} does not exist on the hub", entity_id);
                EntitySnapshot::empty()
            }
            Err(e) => {
                warn!("⚠️ [ADAPTER] Failed to read {}: {}", entity_id, e);
                EntitySnapshot::empty()
            }
        }
    }

    async fn call_service(&self, domain: &str, service: &str, payload: Value) -> bool {
        match self.client.call_service(domain, service, payload).await {
            Ok(()) => true,
            Err(e) => {
                error!("❌ [ADAPTER] {}.{} failed: {}", domain, service, e);
                false
            }
        }
    }

    fn name(&self) -> &str {
        "Home Assistant"
    }
}

/// [`StatisticsSource`] backed by the JSON bin store
#[derive(Debug, Clone)]
pub struct JsonBinStatisticsSource {
    client: Arc<JsonBinClient>,
}

impl JsonBinStatisticsSource {
    pub fn new(client: Arc<JsonBinClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StatisticsSource for JsonBinStatisticsSource {
    async fn fetch_records(&self, bin_id: &str) -> Result<Vec<Value>> {
        let bin = self
            .client
            .fetch_latest(bin_id)
            .await
            .with_context(|| format!("Failed to fetch statistics bin {}", bin_id))?;
        Ok(bin.record)
    }

    fn name(&self) -> &str {
        "JSONBin"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;
    use serde_json::json;

    #[tokio::test]
    async fn test_read_failure_is_empty_snapshot() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/states/sensor.core_600s_pm2_5")
            .with_status(500)
            .create_async()
            .await;

        let client = Arc::new(HomeAssistantClient::new(server.url(), "token").unwrap());
        let source = HomeAssistantStateSource::new(client);

        let snapshot = source.get_state("sensor.core_600s_pm2_5").await;
        assert!(snapshot.is_empty());
        assert!(snapshot.attributes.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_hub_is_empty_snapshot() {
        let client = Arc::new(HomeAssistantClient::new("http://127.0.0.1:1", "token").unwrap());
        let source = HomeAssistantStateSource::new(client);

        assert!(source.get_state("fan.core_600s").await.is_empty());
        assert!(!source.call_service("fan", "turn_on", json!({})).await);
    }

    #[tokio::test]
    async fn test_state_and_attributes_pass_through() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/states/fan.core_600s")
            .with_status(200)
            .with_body(json!({ "state": "on", "attributes": { "percentage": 50 } }).to_string())
            .create_async()
            .await;

        let client = Arc::new(HomeAssistantClient::new(server.url(), "token").unwrap());
        let source = HomeAssistantStateSource::new(client);

        let snapshot = source.get_state("fan.core_600s").await;
        assert_eq!(snapshot.state, "on");
        assert_eq!(snapshot.attributes["percentage"], json!(50));
    }

    #[tokio::test]
    async fn test_rejected_service_is_false() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/services/input_boolean/turn_on")
            .with_status(400)
            .create_async()
            .await;

        let client = Arc::new(HomeAssistantClient::new(server.url(), "token").unwrap());
        let source = HomeAssistantStateSource::new(client);

        let ok = source
            .call_service(
                "input_boolean",
                "turn_on",
                json!({ "entity_id": "input_boolean.auto_air_purifier" }),
            )
            .await;
        assert!(!ok);
    }

    #[tokio::test]
    async fn test_statistics_source_returns_records() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/b/pm/latest")
            .with_status(200)
            .with_body(json!({ "record": [{ "TimeSlot": "00:00-03:00", "AveragePM25": 9.5 }] }).to_string())
            .create_async()
            .await;

        let client = Arc::new(JsonBinClient::new(server.url(), "key").unwrap());
        let source = JsonBinStatisticsSource::new(client);

        let records = source.fetch_records("pm").await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(source.fetch_records("missing").await.is_err());
    }
}
