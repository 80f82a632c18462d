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
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Discrete fan power bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanLevel {
    #[default]
    Off,
    Low,
    Mid,
    High,
    Turbo,
}

impl FanLevel {
    /// Canonical percentage for this level
    pub fn percentage(self) -> u8 {
        match self {
            Self::Off => 0,
            Self::Low => 25,
            Self::Mid => 50,
            Self::High => 75,
            Self::Turbo => 100,
        }
    }

    /// Bucket a fan percentage
    ///
    /// Buckets: 0 (and below) is off, 1..=25 low, 26..=50 mid, 51..=75 high,
    /// everything above is turbo.
    pub fn from_percentage(percentage: i64) -> Self {
        match percentage {
            i64::MIN..=0 => Self::Off,
            1..=25 => Self::Low,
            26..=50 => Self::Mid,
            51..=75 => Self::High,
            _ => Self::Turbo,
        }
    }

    /// Option string understood by the hub's level select entity
    pub fn option(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Low => "LOW",
            Self::Mid => "MID",
            Self::High => "HIGH",
            Self::Turbo => "TURBO",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Low => "low",
            Self::Mid => "mid",
            Self::High => "high",
            Self::Turbo => "turbo",
        }
    }

    /// All levels in ascending order
    pub fn all() -> &'static [FanLevel] {
        &[Self::Off, Self::Low, Self::Mid, Self::High, Self::Turbo]
    }
}

impl fmt::Display for FanLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FanLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|level| level.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Unknown fan level: '{}'. Supported levels: off, low, mid, high, turbo",
                    s
                )
            })
    }
}

/// Map a continuous 0-100 percentage to its level
pub fn percentage_to_level(percentage: i64) -> FanLevel {
    FanLevel::from_percentage(percentage)
}

/// Exact inverse table lookup (not a bucket midpoint)
pub fn level_to_percentage(level: FanLevel) -> u8 {
    level.percentage()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_percentages_round_trip() {
        for level in FanLevel::all() {
            let percentage = level_to_percentage(*level);
            assert_eq!(percentage_to_level(i64::from(percentage)), *level);
        }
    }

    #[test]
    fn test_bucket_boundaries() {
        assert_eq!(percentage_to_level(0), FanLevel::Off);
        assert_eq!(percentage_to_level(1), FanLevel::Low);
        assert_eq!(percentage_to_level(25), FanLevel::Low);
        assert_eq!(percentage_to_level(26), FanLevel::Mid);
        assert_eq!(percentage_to_level(30), FanLevel::Mid);
        assert_eq!(percentage_to_level(50), FanLevel::Mid);
        assert_eq!(percentage_to_level(51), FanLevel::High);
        assert_eq!(percentage_to_level(75), FanLevel::High);
        assert_eq!(percentage_to_level(76), FanLevel::Turbo);
        assert_eq!(percentage_to_level(250), FanLevel::Turbo);
    }

    #[test]
    fn test_negative_percentage_is_off() {
        assert_eq!(percentage_to_level(-5), FanLevel::Off);
    }

    #[test]
    fn test_option_strings() {
        let options: Vec<_> = FanLevel::all().iter().map(|l| l.option()).collect();
        assert_eq!(options, vec!["OFF", "LOW", "MID", "HIGH", "TURBO"]);
    }

    #[test]
    fn test_from_str() {
        assert_eq!("Turbo".parse::<FanLevel>().unwrap(), FanLevel::Turbo);
        assert_eq!(" mid ".parse::<FanLevel>().unwrap(), FanLevel::Mid);
        assert!("max".parse::<FanLevel>().is_err());
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&FanLevel::High).unwrap();
        assert_eq!(json, "\"high\"");
        let level: FanLevel = serde_json::from_str("\"low\"").unwrap();
        assert_eq!(level, FanLevel::Low);
    }
}
