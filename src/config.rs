//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! The two fixed JRA lookup tables (course names → 2-digit codes, Japanese
//! bet-type names → English codes) live here as injectable configuration
//! values with compiled defaults, so tests can substitute them.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub sync: SyncConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub tables: LookupTables,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    /// Seconds between sync/settle cycles.
    pub interval_secs: u64,
    /// Directory watched for manually downloaded JRA CSV exports.
    pub csv_export_dir: String,
    /// Directory where the results collaborator drops one JSON per race.
    pub results_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// sqlite connection URL; overridden by DATABASE_URL when set.
    pub database_url: String,
}

/// The two fixed JRA lookup tables consumed by the Normalizer.
#[derive(Debug, Deserialize, Clone)]
pub struct LookupTables {
    /// Japanese course name → 2-digit JRA course code.
    #[serde(default = "LookupTables::default_course_codes")]
    pub course_codes: HashMap<String, String>,
    /// Japanese bet-type name → fixed English code.
    #[serde(default = "LookupTables::default_bet_types")]
    pub bet_types: HashMap<String, String>,
}

impl Default for LookupTables {
    fn default() -> Self {
        Self {
            course_codes: Self::default_course_codes(),
            bet_types: Self::default_bet_types(),
        }
    }
}

impl LookupTables {
    /// The 10 JRA courses.
    fn default_course_codes() -> HashMap<String, String> {
        [
            ("札幌", "01"),
            ("函館", "02"),
            ("福島", "03"),
            ("新潟", "04"),
            ("東京", "05"),
            ("中山", "06"),
            ("中京", "07"),
            ("京都", "08"),
            ("阪神", "09"),
            ("小倉", "10"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    /// The 8 wager categories. Keys use the full-width ３ the official
    /// vocabulary prints; lookups fold half-width 3 before matching.
    fn default_bet_types() -> HashMap<String, String> {
        [
            ("単勝", "WIN"),
            ("複勝", "PLACE"),
            ("枠連", "BRACKET_QUINELLA"),
            ("馬連", "QUINELLA"),
            ("ワイド", "QUINELLA_PLACE"),
            ("馬単", "EXACTA"),
            ("３連複", "TRIO"),
            ("３連単", "TRIFECTA"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// The effective database URL (env var wins over config).
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| self.storage.database_url.clone())
    }
}
