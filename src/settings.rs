//! Viewer settings and the unit tag attached to recorded sessions
//!
//! Persisted as JSON: LocalStorage on the web, a config file natively.

use serde::{Deserialize, Deserializer, Serialize};

use crate::consts::{BALANCE_SECONDS, FRAME_RATE};

/// Study group a rig belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Group {
    /// Simulation enabled on this machine
    Experiment,
    Control,
    /// Prerecorded sample data
    Sample,
}

impl Group {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "experiment" => Some(Group::Experiment),
            "control" => Some(Group::Control),
            "sample" => Some(Group::Sample),
            _ => None,
        }
    }
}

/// Identifies which rig a replay came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitSettings {
    #[serde(default = "unknown_unit_number", deserialize_with = "deserialize_unit_number")]
    pub unit_number: i64,
    #[serde(default, deserialize_with = "deserialize_group")]
    pub group: Option<Group>,
}

impl UnitSettings {
    /// Tag used when no unit has been configured
    pub const UNKNOWN: UnitSettings = UnitSettings {
        unit_number: -1,
        group: None,
    };
}

impl Default for UnitSettings {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawUnitNumber {
    Integer(i64),
    Float(f64),
    Text(String),
}

/// Accept a unit number sent as a JSON number or as typed text
///
/// Text that is not a number maps to the unknown unit.
pub fn deserialize_unit_number<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<RawUnitNumber>::deserialize(deserializer)? {
        Some(RawUnitNumber::Integer(n)) => n,
        Some(RawUnitNumber::Float(n)) if n.is_finite() => n as i64,
        Some(RawUnitNumber::Text(text)) => text.trim().parse().unwrap_or_else(|_| {
            log::warn!("Unit number {:?} is not numeric, using unknown", text);
            UnitSettings::UNKNOWN.unit_number
        }),
        _ => UnitSettings::UNKNOWN.unit_number,
    })
}

/// Accept any casing of a group tag; unknown tags become `None`
pub fn deserialize_group<'de, D>(deserializer: D) -> Result<Option<Group>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|tag| {
        let group = Group::from_str(&tag);
        if group.is_none() {
            log::warn!("Ignoring unknown group {:?}", tag);
        }
        group
    }))
}

pub(crate) fn unknown_unit_number() -> i64 {
    UnitSettings::UNKNOWN.unit_number
}

/// Source of the unit tag for new sessions
///
/// Implementations that can gather the tag interactively are expected to
/// do so before returning.
pub trait SettingsProvider {
    fn unit_settings(&mut self) -> UnitSettings;
}

/// Viewer settings/preferences
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // === Balance detection ===
    /// Seconds the ball must stay in the center band to count as balanced
    pub balance_seconds: f32,
    /// Render and playback cadence
    pub frame_rate: u32,

    // === Audio ===
    /// Play a chime when the ball balances
    pub sound: bool,
    /// Master volume (0.0 - 1.0)
    pub master_volume: f32,

    // === Unit ===
    pub unit: Option<UnitSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            balance_seconds: BALANCE_SECONDS,
            frame_rate: FRAME_RATE,

            sound: true,
            master_volume: 0.8,

            unit: None,
        }
    }
}

impl Settings {
    /// LocalStorage key
    #[cfg(target_arch = "wasm32")]
    const STORAGE_KEY: &'static str = "pidui-settings";

    /// Default settings file for native builds
    pub const SETTINGS_FILE: &'static str = "config/settings.json";

    /// Environment variable overriding [`Self::SETTINGS_FILE`]
    pub const SETTINGS_ENV: &'static str = "PID_BEAM_SETTINGS";

    /// Frames making up one balance window (at least one)
    pub fn balance_frames(&self) -> u32 {
        if !(self.balance_seconds.is_finite() && self.balance_seconds > 0.0) {
            log::warn!(
                "balance_seconds {} is not a positive duration, using {}",
                self.balance_seconds,
                BALANCE_SECONDS
            );
            return crate::balance_frames(BALANCE_SECONDS, self.frame_rate.max(1));
        }
        crate::balance_frames(self.balance_seconds, self.frame_rate.max(1))
    }

    /// Delay between simulated frames in milliseconds
    pub fn tick_interval_ms(&self) -> f64 {
        1000.0 / self.frame_rate.max(1) as f64
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Load settings from LocalStorage (WASM only)
    #[cfg(target_arch = "wasm32")]
    pub fn load() -> Self {
        let storage = web_sys::window()
            .and_then(|w| w.local_storage().ok())
            .flatten();

        if let Some(storage) = storage {
            if let Ok(Some(json)) = storage.get_item(Self::STORAGE_KEY) {
                if let Ok(settings) = Self::from_json(&json) {
                    log::info!("Loaded settings from LocalStorage");
                    return settings;
                }
            }
        }

        log::info!("Using default settings");
        Self::default()
    }

    /// Load settings from the config file, or defaults if it is missing
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load() -> Self {
        let path = std::env::var(Self::SETTINGS_ENV)
            .unwrap_or_else(|_| Self::SETTINGS_FILE.to_string());
        Self::load_from(std::path::Path::new(&path))
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn load_from(path: &std::path::Path) -> Self {
        let json = match std::fs::read_to_string(path) {
            Ok(json) => json,
            Err(_) => {
                log::info!("No settings at {}, using defaults", path.display());
                return Self::default();
            }
        };
        match Self::from_json(&json) {
            Ok(settings) => {
                log::info!("Loaded settings from {}", path.display());
                settings
            }
            Err(e) => {
                log::warn!("Failed to parse {}: {}, using defaults", path.display(), e);
                Self::default()
            }
        }
    }
}

/// Provider backed by the stored settings
#[derive(Debug, Clone, Default)]
pub struct StoredSettings {
    unit: Option<UnitSettings>,
}

impl StoredSettings {
    pub fn new(settings: &Settings) -> Self {
        Self {
            unit: settings.unit.clone(),
        }
    }
}

impl SettingsProvider for StoredSettings {
    fn unit_settings(&mut self) -> UnitSettings {
        match &self.unit {
            Some(unit) => unit.clone(),
            None => {
                log::warn!("No unit configured, tagging session as unknown");
                UnitSettings::UNKNOWN
            }
        }
    }
}
