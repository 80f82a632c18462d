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

use crate::client::build_http_client;
use crate::errors::{HaError, HaResult};
use crate::types::BinResponse;
use reqwest::{Client, StatusCode};
use std::fmt;
use tracing::{debug, warn};

pub const DEFAULT_STATS_BASE_URL: &str = "https://api.jsonbin.io/v3";

const ACCESS_KEY_HEADER: &str = "X-Master-Key";

/// Client for the JSON bin store holding pre-aggregated statistics
#[derive(Clone)]
pub struct JsonBinClient {
    base_url: String,
    access_key: String,
    client: Client,
}

impl fmt::Debug for JsonBinClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonBinClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl JsonBinClient {
    pub fn new(base_url: impl Into<String>, access_key: impl Into<String>) -> HaResult<Self> {
        let access_key = access_key.into();
        if access_key.trim().is_empty() {
            return Err(HaError::ConfigError("Statistics access key is empty".to_owned()));
        }

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            access_key,
            client: build_http_client()?,
        })
    }

    /// Create a client from configuration values, falling back to
    /// `STATS_BASE_URL` and `STATS_ACCESS_KEY`
    pub fn from_config(base_url: Option<String>, access_key: Option<String>) -> HaResult<Self> {
        let base_url = base_url
            .filter(|url| !url.is_empty())
            .or_else(|| std::env::var("STATS_BASE_URL").ok())
            .unwrap_or_else(|| DEFAULT_STATS_BASE_URL.to_owned());
        let access_key = access_key
            .filter(|key| !key.is_empty())
            .or_else(|| std::env::var("STATS_ACCESS_KEY").ok())
            .ok_or_else(|| {
                HaError::ConfigError(
                    "Statistics access key not found in config or STATS_ACCESS_KEY".to_owned(),
                )
            })?;

        Self::new(base_url, access_key)
    }

    /// Fetch the latest version of one bin
    pub async fn fetch_latest(&self, bin_id: &str) -> HaResult<BinResponse> {
        let url = format!("{}/b/{}/latest", self.base_url, bin_id);
        debug!("📊 [STATS QUERY] Fetching bin: {}", bin_id);

        let response = self
            .client
            .get(&url)
            .header(ACCESS_KEY_HEADER, &self.access_key)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let body = response.text().await?;
                let bin: BinResponse = serde_json::from_str(&body)?;
                debug!("✅ [STATS RESULT] Bin {} has {} records", bin_id, bin.record.len());
                Ok(bin)
            }
            StatusCode::NOT_FOUND => {
                warn!("❌ [STATS ERROR] Bin not found: {}", bin_id);
                Err(HaError::EntityNotFound(bin_id.to_owned()))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                warn!("❌ [STATS ERROR] Access key rejected for bin: {}", bin_id);
                Err(HaError::AuthenticationFailed)
            }
            status => {
                let message = response.text().await.unwrap_or_default();
                warn!("❌ [STATS ERROR] Status {} for bin {}: {}", status, bin_id, message);
                Err(HaError::ApiError {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }
}
