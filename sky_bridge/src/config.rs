//! Bridge configuration.
//!
//! Loaded from `bridge_config.json` with support for an environment variable override.

use std::{
    env, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use bevy::prelude::Resource;
use serde::Deserialize;
use sky_proto::{Planet, SiteLocation};
use thiserror::Error;

pub const BUILTIN_BRIDGE_CONFIG: &str = include_str!("data/bridge_config.json");
pub const CONFIG_PATH_ENV: &str = "SKY_BRIDGE_CONFIG_PATH";

/// Root configuration for the bridge.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub remote: RemoteConfig,
    pub snapshot: SnapshotConfig,
    pub site: SiteConfig,
    pub light: LightConfig,
    pub start_live: bool,
    pub skybox_script: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            remote: RemoteConfig::default(),
            snapshot: SnapshotConfig::default(),
            site: SiteConfig::default(),
            light: LightConfig::default(),
            start_live: false,
            skybox_script: "skybox.ssc".to_string(),
        }
    }
}

/// Connection to the remote simulator.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: String,
    pub api_prefix: String,
    pub request_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub http_backoff_ms: u64,
    pub object_info_backoff_ms: u64,
    /// Consecutive failed delta polls tolerated before live mode is abandoned.
    pub delta_failure_threshold: u32,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8090".to_string(),
            api_prefix: "/api".to_string(),
            request_timeout_ms: 5000,
            poll_interval_ms: 250,
            http_backoff_ms: 250,
            object_info_backoff_ms: 2500,
            delta_failure_threshold: 3,
        }
    }
}

impl RemoteConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn http_backoff(&self) -> Duration {
        Duration::from_millis(self.http_backoff_ms)
    }

    pub fn object_info_backoff(&self) -> Duration {
        Duration::from_millis(self.object_info_backoff_ms)
    }
}

/// Where the pre-baked sky description lives.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// File path, or an `http://`/`https://` URL.
    pub location: String,
    pub watch: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            location: "skyboxes/live/unityData.txt".to_string(),
            watch: true,
        }
    }
}

/// Observer site pushed to the remote after connecting.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub name: String,
    pub country: String,
    pub planet: Planet,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_m: f64,
    pub atmosphere_temperature_c: f64,
    pub atmosphere_pressure_mbar: f64,
    /// Magnitudes per airmass.
    pub extinction_coefficient: f64,
    pub bortle_index: u8,
    /// Azimuth of true north in the scene's grid coordinates.
    pub north_angle_deg: f64,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: "Bridge".to_string(),
            country: "Austria".to_string(),
            planet: Planet::Earth,
            latitude: 48.2,
            longitude: 16.25,
            altitude_m: 280.0,
            atmosphere_temperature_c: 10.0,
            atmosphere_pressure_mbar: 1013.0,
            extinction_coefficient: 0.2,
            bortle_index: 2,
            north_angle_deg: 0.0,
        }
    }
}

impl SiteConfig {
    pub fn location(&self) -> SiteLocation {
        SiteLocation {
            latitude: self.latitude,
            longitude: self.longitude,
            altitude: self.altitude_m,
            name: self.name.clone(),
            country: self.country.clone(),
            planet: self.planet,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LightConfig {
    /// Below this field of view the flare is suppressed.
    pub flare_min_fov_deg: f64,
    /// Distance at which the snapshot-mode sun impostor is placed.
    pub impostor_distance: f64,
    /// Initial direct-light intensity multiplier, clamped to 0..=8.
    pub exposure: f32,
}

impl Default for LightConfig {
    fn default() -> Self {
        Self {
            flare_min_fov_deg: 10.0,
            impostor_distance: 250.0,
            exposure: 1.0,
        }
    }
}

impl BridgeConfig {
    pub fn builtin() -> Arc<Self> {
        Arc::new(
            serde_json::from_str(BUILTIN_BRIDGE_CONFIG).expect("builtin bridge config should parse"),
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = BridgeConfig::from_json_str(&contents)?;
        Ok(config)
    }

    /// Full URL of an endpoint path such as `main/status`.
    pub fn endpoint_url(&self, path: &str) -> String {
        let base = self.remote.base_url.trim_end_matches('/');
        let prefix = self.remote.api_prefix.trim_matches('/');
        if prefix.is_empty() {
            format!("{base}/{path}")
        } else {
            format!("{base}/{prefix}/{path}")
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse bridge config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read bridge config from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Handle for sharing the configuration with frame-loop systems.
#[derive(Resource, Debug, Clone)]
pub struct BridgeConfigHandle(pub Arc<BridgeConfig>);

impl BridgeConfigHandle {
    pub fn new(config: Arc<BridgeConfig>) -> Self {
        Self(config)
    }

    pub fn get(&self) -> Arc<BridgeConfig> {
        Arc::clone(&self.0)
    }
}

/// Load the configuration from `SKY_BRIDGE_CONFIG_PATH`, falling back to the builtin.
pub fn load_bridge_config_from_env() -> Arc<BridgeConfig> {
    let Some(path) = env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from) else {
        tracing::info!(target: "sky_bridge::config", "bridge_config.loaded=builtin");
        return BridgeConfig::builtin();
    };

    match BridgeConfig::from_file(&path) {
        Ok(config) => {
            tracing::info!(
                target: "sky_bridge::config",
                path = %path.display(),
                "bridge_config.loaded=file"
            );
            Arc::new(config)
        }
        Err(err) => {
            tracing::warn!(
                target: "sky_bridge::config",
                path = %path.display(),
                error = %err,
                "bridge_config.load_failed"
            );
            BridgeConfig::builtin()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_config_parses() {
        let config = BridgeConfig::builtin();
        assert_eq!(config.remote.poll_interval_ms, 250);
        assert_eq!(config.site.planet, Planet::Earth);
        assert!(!config.start_live);
        assert_eq!(config.skybox_script, "skybox.ssc");
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = BridgeConfig::from_json_str(r#"{"remote": {"base_url": "http://sim:9000/"}}"#)
            .expect("partial config parses");
        assert_eq!(config.remote.base_url, "http://sim:9000/");
        assert_eq!(config.remote.http_backoff_ms, 250);
        assert_eq!(config.light.flare_min_fov_deg, 10.0);
    }

    #[test]
    fn endpoint_url_joins_prefix() {
        let mut config = BridgeConfig::default();
        config.remote.base_url = "http://sim:9000/".into();
        assert_eq!(
            config.endpoint_url("main/status"),
            "http://sim:9000/api/main/status"
        );
        config.remote.api_prefix = String::new();
        assert_eq!(config.endpoint_url("main/view"), "http://sim:9000/main/view");
    }

    #[test]
    fn unreadable_file_reports_path() {
        let err = BridgeConfig::from_file(Path::new("/nonexistent/bridge.json"))
            .expect_err("missing file");
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
