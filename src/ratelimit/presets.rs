//! Named rate limit presets.
//!
//! Each logical subsystem of the dashboard gets its own (max, window) pair.
//! The built-in values can be overridden from the configuration file and
//! from numeric environment values read once at process start.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Default maximum number of requests per window.
pub const DEFAULT_MAX_REQUESTS: u32 = 10;
/// Default window length in milliseconds.
pub const DEFAULT_WINDOW_MS: u64 = 60_000;

/// A (max requests, window) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitPreset {
    /// Maximum requests admitted inside one window
    pub max_requests: u32,
    /// Window length in milliseconds
    pub window_ms: u64,
}

impl RateLimitPreset {
    pub const fn new(max_requests: u32, window_ms: u64) -> Self {
        Self {
            max_requests,
            window_ms,
        }
    }
}

impl Default for RateLimitPreset {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW_MS)
    }
}

/// The known preset names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PresetName {
    /// Bulk data reads and writes
    Bulk,
    /// Report generation
    Report,
    /// Chat assistant
    Chat,
    /// Market intelligence refresh
    MarketIntel,
    /// Everything else
    Default,
}

impl PresetName {
    pub const ALL: [PresetName; 5] = [
        PresetName::Bulk,
        PresetName::Report,
        PresetName::Chat,
        PresetName::MarketIntel,
        PresetName::Default,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PresetName::Bulk => "bulk",
            PresetName::Report => "report",
            PresetName::Chat => "chat",
            PresetName::MarketIntel => "market-intel",
            PresetName::Default => "default",
        }
    }

    /// Parse a preset name, ignoring case and treating `_` as `-`.
    pub fn parse(name: &str) -> Option<Self> {
        let normalized = name.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|preset| preset.as_str() == normalized)
    }

    /// Built-in limits for this preset.
    pub fn builtin(&self) -> RateLimitPreset {
        match self {
            PresetName::Bulk => RateLimitPreset::new(5, 60_000),
            PresetName::Report => RateLimitPreset::new(3, 300_000),
            PresetName::Chat => RateLimitPreset::new(20, 60_000),
            PresetName::MarketIntel => RateLimitPreset::new(10, 3_600_000),
            PresetName::Default => RateLimitPreset::default(),
        }
    }

    /// Prefix of the environment values that override this preset,
    /// e.g. `RATE_LIMIT_MARKET_INTEL`.
    pub fn env_prefix(&self) -> String {
        format!(
            "RATE_LIMIT_{}",
            self.as_str().to_ascii_uppercase().replace('-', "_")
        )
    }
}

impl std::fmt::Display for PresetName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Partial override for a preset, as it appears in the configuration file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetOverride {
    #[serde(default)]
    pub max_requests: Option<u32>,
    #[serde(default)]
    pub window_ms: Option<u64>,
}

/// The effective preset table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresetTable {
    presets: HashMap<PresetName, RateLimitPreset>,
}

impl PresetTable {
    /// Table holding only the built-in values.
    pub fn builtin() -> Self {
        let presets = PresetName::ALL
            .into_iter()
            .map(|name| (name, name.builtin()))
            .collect();
        Self { presets }
    }

    /// Apply overrides from a file-level map keyed by preset name.
    ///
    /// Unknown names are logged and skipped.
    pub fn apply_overrides(&mut self, overrides: &HashMap<String, PresetOverride>) {
        for (raw_name, over) in overrides {
            let Some(name) = PresetName::parse(raw_name) else {
                warn!(preset = %raw_name, "Ignoring override for unknown rate limit preset");
                continue;
            };
            let preset = self.presets.entry(name).or_insert_with(|| name.builtin());
            if let Some(max) = over.max_requests.filter(|v| *v > 0) {
                preset.max_requests = max;
            }
            if let Some(window) = over.window_ms.filter(|v| *v > 0) {
                preset.window_ms = window;
            }
            debug!(
                preset = %name,
                max = preset.max_requests,
                window_ms = preset.window_ms,
                "Applied preset override"
            );
        }
    }

    /// Apply `RATE_LIMIT_<NAME>_MAX` / `RATE_LIMIT_<NAME>_WINDOW_MS` values
    /// obtained through `lookup`.
    ///
    /// Absent values keep the current setting; non-numeric or zero values
    /// are logged and ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for name in PresetName::ALL {
            let prefix = name.env_prefix();
            let preset = self.presets.entry(name).or_insert_with(|| name.builtin());

            let max_key = format!("{}_MAX", prefix);
            if let Some(max) = parse_positive(&max_key, lookup(max_key.as_str())) {
                preset.max_requests = u32::try_from(max).unwrap_or(u32::MAX);
            }

            let window_key = format!("{}_WINDOW_MS", prefix);
            if let Some(window) = parse_positive(&window_key, lookup(window_key.as_str())) {
                preset.window_ms = window;
            }
        }
    }

    /// Look up a preset by name, falling back to `default` for unknown names.
    pub fn get(&self, name: &str) -> RateLimitPreset {
        let name = PresetName::parse(name).unwrap_or(PresetName::Default);
        self.preset(name)
    }

    /// Look up a known preset.
    pub fn preset(&self, name: PresetName) -> RateLimitPreset {
        self.presets
            .get(&name)
            .copied()
            .unwrap_or_else(|| name.builtin())
    }

    /// Snapshot keyed by preset name, in a stable order.
    pub fn to_map(&self) -> BTreeMap<&'static str, RateLimitPreset> {
        PresetName::ALL
            .into_iter()
            .map(|name| (name.as_str(), self.preset(name)))
            .collect()
    }
}

impl Default for PresetTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Look up a preset in the built-in table.
///
/// Unknown names resolve to the default preset; this never fails.
pub fn get_rate_limit_preset(name: &str) -> RateLimitPreset {
    PresetName::parse(name)
        .unwrap_or(PresetName::Default)
        .builtin()
}

fn parse_positive(key: &str, raw: Option<String>) -> Option<u64> {
    let raw = raw?;
    match raw.trim().parse::<u64>() {
        Ok(value) if value > 0 => Some(value),
        _ => {
            warn!(key = %key, value = %raw, "Ignoring non-numeric rate limit override");
            None
        }
    }
}
