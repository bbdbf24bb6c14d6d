use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard},
    time::Duration,
};

use crate::calibration::CalibrationTiming;

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "kiosk::settings";

use crate::log_warn;

/// Env var naming the settings file.
pub const SETTINGS_ENV_VAR: &str = "KIOSK_SETTINGS";
const DEFAULT_SETTINGS_FILE: &str = "kiosk-settings.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KioskSettings {
    pub screen_width: u32,
    pub screen_height: u32,
    pub calibration_dwell_ms: u64,
    pub calibration_gap_ms: u64,
    pub sample_period_ms: u64,
    pub story_reveal_secs: u64,
    pub countdown_ticks: u32,
    pub jpeg_quality: u8,
    pub report_dir: PathBuf,
    pub default_user_id: u32,
}

impl Default for KioskSettings {
    fn default() -> Self {
        Self {
            screen_width: 1280,
            screen_height: 800,
            calibration_dwell_ms: 3000,
            calibration_gap_ms: 500,
            sample_period_ms: 500,
            story_reveal_secs: 20,
            countdown_ticks: 5,
            jpeg_quality: 80,
            report_dir: PathBuf::from("reports"),
            default_user_id: 1,
        }
    }
}

impl KioskSettings {
    pub fn calibration_timing(&self) -> CalibrationTiming {
        CalibrationTiming {
            dwell: Duration::from_millis(self.calibration_dwell_ms),
            gap: Duration::from_millis(self.calibration_gap_ms),
        }
    }

    /// Never shorter than 1 ms; a zero period would spin.
    pub fn sample_period(&self) -> Duration {
        Duration::from_millis(self.sample_period_ms.max(1))
    }

    pub fn story_reveal(&self) -> Duration {
        Duration::from_secs(self.story_reveal_secs)
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<KioskSettings>,
}

impl SettingsStore {
    /// Reads `path`. A missing file gives the defaults; so does a file that
    /// is not valid settings JSON, with a warning.
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            parse_or_default(&path, &contents)
        } else {
            KioskSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Opens the file named by `KIOSK_SETTINGS`, or `kiosk-settings.json` in
    /// the working directory.
    pub fn from_env() -> Result<Self> {
        let path = std::env::var_os(SETTINGS_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE));
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> KioskSettings {
        self.read().clone()
    }

    /// Writes the current settings out when the file does not exist yet, so
    /// operators have something to edit.
    pub fn ensure_written(&self) -> Result<bool> {
        if self.path.exists() {
            return Ok(false);
        }
        self.persist(&self.read())?;
        Ok(true)
    }

    fn persist(&self, data: &KioskSettings) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, KioskSettings> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn parse_or_default(path: &Path, contents: &str) -> KioskSettings {
    match serde_json::from_str(contents) {
        Ok(settings) => settings,
        Err(err) => {
            log_warn!(
                "ignoring unreadable settings in {}: {err}; using defaults",
                path.display()
            );
            KioskSettings::default()
        }
    }
}
