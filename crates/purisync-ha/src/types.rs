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

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Entity state as returned by `GET /api/states/{entity_id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HaEntityState {
    #[serde(default)]
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub last_changed: Option<String>,
    #[serde(default)]
    pub last_updated: Option<String>,
}

/// Body of `GET /b/{bin_id}/latest`
#[derive(Debug, Clone, Deserialize)]
pub struct BinResponse {
    pub record: Vec<Value>,
    #[serde(default)]
    pub metadata: Option<BinMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinMetadata {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "createdAt")]
    pub created_at: Option<String>,
    #[serde(default)]
    pub private: Option<bool>,
}
