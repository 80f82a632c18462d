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

use crate::errors::{HaError, HaResult};
use crate::types::HaEntityState;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8123";

/// Per-request timeout of every HTTP call
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) fn build_http_client() -> HaResult<Client> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| HaError::ConfigError(format!("Failed to build HTTP client: {}", e)))
}

/// Home Assistant REST API client
///
/// Every call is a single attempt; callers decide what a failure means.
#[derive(Clone)]
pub struct HomeAssistantClient {
    base_url: String,
    token: String,
    client: Client,
}

impl fmt::Debug for HomeAssistantClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HomeAssistantClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HomeAssistantClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> HaResult<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        let token = token.into();
        if base_url.is_empty() {
            return Err(HaError::ConfigError("Hub base URL is empty".to_owned()));
        }
        if token.trim().is_empty() {
            return Err(HaError::ConfigError("Hub access token is empty".to_owned()));
        }

        Ok(Self {
            base_url,
            token,
            client: build_http_client()?,
        })
    }

    /// Create a client from configuration values
    /// Falls back to environment variables if config values are not set
    pub fn from_config(ha_base_url: Option<String>, ha_token: Option<String>) -> HaResult<Self> {
        let base_url = ha_base_url
            .filter(|url| !url.is_empty())
            .or_else(|| std::env::var("HA_BASE_URL").ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_owned());

        let token = ha_token
            .filter(|token| !token.is_empty())
            .or_else(|| std::env::var("HA_TOKEN").ok())
            .ok_or_else(|| {
                HaError::ConfigError(
                    "HA token not found in config or HA_TOKEN environment variable".to_owned(),
                )
            })?;

        info!("Initializing HA client from configuration: {}", base_url);
        Self::new(base_url, token)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the state of a specific entity
    pub async fn fetch_state(&self, entity_id: &str) -> HaResult<HaEntityState> {
        let url = format!("{}/api/states/{}", self.base_url, entity_id);
        debug!("🔍 [HA QUERY] Getting state for entity: {}", entity_id);
        trace!("   URL: {}", url);

        let response = self.client.get(&url).bearer_auth(&self.token).send().await?;

        match response.status() {
            StatusCode::OK => {
                let body = response.text().await?;
                let state: HaEntityState = serde_json::from_str(&body).map_err(|e| {
                    HaError::InvalidResponse(format!("Unexpected body for {}: {}", entity_id, e))
                })?;
                debug!("✅ [HA RESULT] Entity: {} = '{}'", entity_id, state.state);
                trace!("   Attributes: {:?}", state.attributes);
                Ok(state)
            }
            StatusCode::NOT_FOUND => {
                warn!("❌ [HA ERROR] Entity not found: {}", entity_id);
                Err(HaError::EntityNotFound(entity_id.to_owned()))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                error!("❌ [HA ERROR] Authentication failed for entity: {}", entity_id);
                Err(HaError::AuthenticationFailed)
            }
            status => {
                let error_text = response.text().await.unwrap_or_default();
                warn!("❌ [HA ERROR] Status {} for {}: {}", status, entity_id, error_text);
                Err(HaError::ApiError {
                    status: status.as_u16(),
                    message: error_text,
                })
            }
        }
    }

    /// Call `{domain}.{service}` with a JSON body
    ///
    /// Any 2xx answer counts as success.
    ///
    /// # Example
    /// ```no_run
    /// # use purisync_ha::client::HomeAssistantClient;
    /// # use serde_json::json;
    /// # async fn example() {
    /// # let client = HomeAssistantClient::from_config(None, None).unwrap();
    /// client.call_service(
    ///     "input_select",
    ///     "select_option",
    ///     json!({
    ///         "entity_id": "input_select.air_purifier_manual_control",
    ///         "option": "TURBO"
    ///     })
    /// ).await.unwrap();
    /// # }
    /// ```
    pub async fn call_service(&self, domain: &str, service: &str, data: Value) -> HaResult<()> {
        let name = format!("{}.{}", domain, service);
        let valid_part = |part: &str| !part.is_empty() && !part.contains(['/', '.']);
        if !valid_part(domain) || !valid_part(service) {
            error!("❌ [HA ERROR] Invalid service name: {}", name);
            return Err(HaError::ServiceCallFailed {
                service: name,
                reason: "Domain and service must be non-empty names".to_owned(),
            });
        }

        let url = format!("{}/api/services/{}/{}", self.base_url, domain, service);
        info!("📞 [HA SERVICE] Calling: {}", name);
        debug!("   Data: {}", data);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&data)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            info!("✅ [HA SERVICE] Success: {}", name);
            return Ok(());
        }

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                error!("❌ [HA SERVICE] Authentication failed for: {}", name);
                Err(HaError::AuthenticationFailed)
            }
            _ => {
                let error_msg = response.text().await.unwrap_or_default();
                error!("❌ [HA SERVICE] Failed: {} (status: {})", name, status);
                debug!("   Error: {}", error_msg);
                Err(HaError::ServiceCallFailed {
                    service: name,
                    reason: format!("status {}: {}", status.as_u16(), error_msg),
                })
            }
        }
    }

    /// Health check - ping HA API
    pub async fn ping(&self) -> HaResult<bool> {
        let url = format!("{}/api/", self.base_url);
        debug!("Performing health check");

        match self.client.get(&url).bearer_auth(&self.token).send().await {
            Ok(response) => {
                let status = response.status();
                if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                    return Err(HaError::AuthenticationFailed);
                }
                let is_ok = status.is_success();
                if is_ok {
                    debug!("Health check passed");
                } else {
                    warn!("Health check failed: status {}", status);
                }
                Ok(is_ok)
            }
            Err(e) => {
                warn!("Health check failed: {}", e);
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    #[tokio::test]
    async fn test_fetch_state_success() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/states/fan.core_600s")
            .match_header("authorization", "Bearer test_token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "entity_id": "fan.core_600s",
                    "state": "on",
                    "attributes": { "percentage": 75, "preset_mode": "manual" },
                    "last_changed": "2025-09-17T10:00:00Z",
                    "last_updated": "2025-09-17T10:00:00Z"
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = HomeAssistantClient::new(server.url(), "test_token").unwrap();
        let state = client.fetch_state("fan.core_600s").await.unwrap();

        assert_eq!(state.entity_id, "fan.core_600s");
        assert_eq!(state.state, "on");
        assert_eq!(state.attributes["percentage"], json!(75));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_state_not_found() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/states/sensor.nonexistent")
            .with_status(404)
            .create_async()
            .await;

        let client = HomeAssistantClient::new(server.url(), "test_token").unwrap();
        let result = client.fetch_state("sensor.nonexistent").await;

        assert!(matches!(result, Err(HaError::EntityNotFound(_))));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_state_unauthorized() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/states/sensor.dust_pole_pm2_5")
            .with_status(401)
            .create_async()
            .await;

        let client = HomeAssistantClient::new(server.url(), "bad_token").unwrap();
        let result = client.fetch_state("sensor.dust_pole_pm2_5").await;

        assert!(matches!(result, Err(HaError::AuthenticationFailed)));
    }

    #[tokio::test]
    async fn test_fetch_state_malformed_body() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/states/sensor.dust_pole_pm2_5")
            .with_status(200)
            .with_body("{\"attributes\": {}}")
            .create_async()
            .await;

        let client = HomeAssistantClient::new(server.url(), "test_token").unwrap();
        let result = client.fetch_state("sensor.dust_pole_pm2_5").await;

        assert!(matches!(result, Err(HaError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_call_service_success() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/services/input_select/select_option")
            .match_header("authorization", "Bearer test_token")
            .match_body(Matcher::Json(json!({
                "entity_id": "input_select.air_purifier_manual_control",
                "option": "TURBO"
            })))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let client = HomeAssistantClient::new(server.url(), "test_token").unwrap();
        let result = client
            .call_service(
                "input_select",
                "select_option",
                json!({"entity_id": "input_select.air_purifier_manual_control", "option": "TURBO"}),
            )
            .await;

        assert!(result.is_ok());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_call_service_accepts_any_2xx() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/services/fan/turn_on")
            .with_status(201)
            .create_async()
            .await;

        let client = HomeAssistantClient::new(server.url(), "test_token").unwrap();
        let result = client
            .call_service("fan", "turn_on", json!({"entity_id": "fan.core_600s"}))
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_call_service_failure_status() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/services/fan/turn_off")
            .with_status(500)
            .with_body("boom")
            .expect(1)
            .create_async()
            .await;

        let client = HomeAssistantClient::new(server.url(), "test_token").unwrap();
        let result = client
            .call_service("fan", "turn_off", json!({"entity_id": "fan.core_600s"}))
            .await;

        assert!(matches!(result, Err(HaError::ServiceCallFailed { .. })));
        // single attempt, no retry
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_call_service_invalid_name() {
        let client = HomeAssistantClient::new("http://localhost", "token").unwrap();
        let result = client.call_service("fan.turn_on", "", json!({})).await;

        assert!(matches!(result, Err(HaError::ServiceCallFailed { .. })));
    }

    #[tokio::test]
    async fn test_ping_success() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/")
            .match_header("authorization", "Bearer test_token")
            .with_status(200)
            .create_async()
            .await;

        let client = HomeAssistantClient::new(server.url(), "test_token").unwrap();
        let result = client.ping().await.unwrap();

        assert!(result);
        mock.assert_async().await;
    }

    #[test]
    fn test_new_rejects_empty_token() {
        let result = HomeAssistantClient::new("http://localhost:8123", " ");
        assert!(matches!(result, Err(HaError::ConfigError(_))));
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let client = HomeAssistantClient::new("http://localhost:8123/", "token").unwrap();
        assert_eq!(client.base_url(), "http://localhost:8123");
    }
}
