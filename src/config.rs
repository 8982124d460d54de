// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Application configuration management.
//!
//! This module handles persistent configuration storage using TOML format
//! through `confy`. It covers the vehicle address and link timing, the
//! sensor/relay/servo layout of the vehicle and the joystick bindings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rov_link::tcp::DEFAULT_VEHICLE_ADDRESS;
use rov_link::telemetry::DEFAULT_WINDOW_SECS;
use rov_link::VehicleConfig;
use serde::{Deserialize, Serialize};

use crate::joystick::JoystickConfig;

pub const APP_NAME: &str = "monterey";
const CONFIG_NAME: &str = "config";

/// Lower bound for every configured interval.
const MIN_INTERVAL_MS: u64 = 10;

/// Application configuration stored in TOML format
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    /// Configuration schema version for migrations
    #[serde(default = "default_config_version")]
    pub config_version: u32,

    /// Vehicle address in host:port format
    #[serde(default = "default_vehicle_address")]
    pub vehicle_address: String,

    /// Delay between reconnect attempts
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// A heartbeat link is lost when no beat arrives within this time
    #[serde(default = "default_link_timeout_ms")]
    pub link_timeout_ms: u64,

    /// Interval between batched control frames to the vehicle
    #[serde(default = "default_control_interval_ms")]
    pub control_interval_ms: u64,

    /// Controller processing tick and UI refresh interval
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,

    /// Length of the depth trace in seconds
    #[serde(default = "default_depth_window_secs")]
    pub depth_window_secs: u64,

    /// Sensor, relay and servo layout
    #[serde(default)]
    pub vehicle: VehicleConfig,

    /// Gamepad button bindings
    #[serde(default)]
    pub joystick: JoystickConfig,
}

// Default value functions for serde
fn default_config_version() -> u32 {
    1 // Current schema version
}

fn default_vehicle_address() -> String {
    DEFAULT_VEHICLE_ADDRESS.to_string()
}

fn default_reconnect_delay_ms() -> u64 {
    2000
}

fn default_link_timeout_ms() -> u64 {
    1000
}

fn default_control_interval_ms() -> u64 {
    100
}

fn default_refresh_interval_ms() -> u64 {
    50 // refresh 20x a second
}

fn default_depth_window_secs() -> u64 {
    DEFAULT_WINDOW_SECS
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_version: default_config_version(),
            vehicle_address: default_vehicle_address(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            link_timeout_ms: default_link_timeout_ms(),
            control_interval_ms: default_control_interval_ms(),
            refresh_interval_ms: default_refresh_interval_ms(),
            depth_window_secs: default_depth_window_secs(),
            vehicle: VehicleConfig::default(),
            joystick: JoystickConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `path`, or from the platform config directory.
    pub fn load(path: Option<&Path>) -> Result<Self, confy::ConfyError> {
        let config: AppConfig = match path {
            Some(path) => confy::load_path(path)?,
            None => confy::load(APP_NAME, CONFIG_NAME)?,
        };
        Ok(config.sanitized())
    }

    /// Save configuration and return the file it was written to.
    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf, confy::ConfyError> {
        match path {
            Some(path) => {
                confy::store_path(path, self)?;
                Ok(path.to_path_buf())
            }
            None => {
                confy::store(APP_NAME, CONFIG_NAME, self)?;
                Self::get_config_path(None)
            }
        }
    }

    /// Get the config file path for display to user
    pub fn get_config_path(path: Option<&Path>) -> Result<PathBuf, confy::ConfyError> {
        match path {
            Some(path) => Ok(path.to_path_buf()),
            None => confy::get_configuration_file_path(APP_NAME, CONFIG_NAME),
        }
    }

    /// Clamp hand-edited values into workable ranges.
    #[must_use]
    pub fn sanitized(mut self) -> Self {
        self.reconnect_delay_ms = self.reconnect_delay_ms.max(MIN_INTERVAL_MS);
        self.link_timeout_ms = self.link_timeout_ms.max(MIN_INTERVAL_MS);
        self.control_interval_ms = self.control_interval_ms.max(MIN_INTERVAL_MS);
        self.refresh_interval_ms = self.refresh_interval_ms.max(MIN_INTERVAL_MS);
        self.depth_window_secs = self.depth_window_secs.max(1);
        if self.vehicle_address.trim().is_empty() {
            self.vehicle_address = default_vehicle_address();
        }
        self
    }

    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    #[must_use]
    pub fn link_timeout(&self) -> Duration {
        Duration::from_millis(self.link_timeout_ms)
    }

    #[must_use]
    pub fn control_interval(&self) -> Duration {
        Duration::from_millis(self.control_interval_ms)
    }

    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    #[must_use]
    pub fn depth_window(&self) -> Duration {
        Duration::from_secs(self.depth_window_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.refresh_interval(), Duration::from_millis(50));
        assert_eq!(config.depth_window(), Duration::from_secs(10));
        assert_eq!(config.vehicle.relays.len(), 3);
        assert_eq!(config.vehicle.servos.len(), 2);
        assert_eq!(config.joystick.relay_toggles.len(), 3);
    }

    #[test]
    fn test_sanitized_clamps_values() {
        let config = AppConfig {
            refresh_interval_ms: 0,
            depth_window_secs: 0,
            vehicle_address: "  ".to_string(),
            ..AppConfig::default()
        }
        .sanitized();

        assert_eq!(config.refresh_interval_ms, MIN_INTERVAL_MS);
        assert_eq!(config.depth_window_secs, 1);
        assert_eq!(config.vehicle_address, DEFAULT_VEHICLE_ADDRESS);
    }

    #[test]
    fn test_save_and_load_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monterey.toml");

        let mut config = AppConfig::default();
        config.vehicle_address = "10.0.0.2:6000".to_string();
        config.vehicle.relays[0].name = "Flood".to_string();

        let written = config.save(Some(&path)).unwrap();
        assert_eq!(written, path);

        let loaded = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "vehicle_address = \"rov.local:5000\"\n").unwrap();

        let loaded = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded.vehicle_address, "rov.local:5000");
        assert_eq!(loaded.link_timeout_ms, 1000);
        assert_eq!(loaded.vehicle, VehicleConfig::default());
    }
}
