//! Snapshot source: the flat `key:value` sky description written by the skybox script.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::SnapshotError;
use crate::state::{CelestialBody, SkyState, SkyTime};

pub const SUN_ALTITUDE: &str = "Sun Altitude";
pub const SUN_AZIMUTH: &str = "Sun Azimuth";
pub const SUN_MAGNITUDE: &str = "Sun Magnitude";
pub const SUN_MAGNITUDE_EXTINCTED: &str = "Sun Magnitude (after extinction)";
pub const SUN_LONGITUDE: &str = "Sun Longitude";
pub const SUN_SIZE: &str = "Sun Size";
pub const MOON_ALTITUDE: &str = "Moon Altitude";
pub const MOON_AZIMUTH: &str = "Moon Azimuth";
pub const MOON_ILLUMINATION: &str = "Moon illumination";
pub const MOON_MAGNITUDE: &str = "Moon Magnitude";
pub const MOON_MAGNITUDE_EXTINCTED: &str = "Moon Magnitude (after extinction)";
pub const MOON_SIZE: &str = "Moon Size";
pub const VENUS_ALTITUDE: &str = "Venus Altitude";
pub const VENUS_AZIMUTH: &str = "Venus Azimuth";
pub const VENUS_MAGNITUDE: &str = "Venus Magnitude";
pub const VENUS_MAGNITUDE_EXTINCTED: &str = "Venus Magnitude (after extinction)";
pub const JULIAN_DAY: &str = "JD";
pub const DATE_UTC: &str = "Date (UTC)";
pub const DATE_LOCAL: &str = "Date";
pub const LANDSCAPE_BRIGHTNESS: &str = "Landscape Brightness";

pub const DEFAULT_DIAMETER_DEG: f64 = 0.5;
pub const DEFAULT_LANDSCAPE_BRIGHTNESS: f64 = 0.05;

/// Split `text` into key/value pairs at the first colon of each line.
///
/// Lines without a colon are ignored; later duplicates replace earlier ones.
pub fn parse_pairs(text: &str) -> HashMap<String, String> {
    text.lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}

/// Parse a whole snapshot. Any missing required key fails the parse.
pub fn parse_snapshot(text: &str) -> Result<SkyState, SnapshotError> {
    let pairs = Pairs(parse_pairs(text));
    let landscape = pairs.optional(LANDSCAPE_BRIGHTNESS, DEFAULT_LANDSCAPE_BRIGHTNESS)?;

    Ok(SkyState {
        sun: CelestialBody {
            altitude: pairs.number(SUN_ALTITUDE)?,
            azimuth: pairs.number(SUN_AZIMUTH)?,
            magnitude: pairs.number(SUN_MAGNITUDE)?,
            magnitude_extincted: pairs.number(SUN_MAGNITUDE_EXTINCTED)?,
            diameter: pairs.optional(SUN_SIZE, DEFAULT_DIAMETER_DEG)?,
        },
        sun_longitude: pairs.number(SUN_LONGITUDE)?,
        moon: CelestialBody {
            altitude: pairs.number(MOON_ALTITUDE)?,
            azimuth: pairs.number(MOON_AZIMUTH)?,
            magnitude: pairs.number(MOON_MAGNITUDE)?,
            magnitude_extincted: pairs.number(MOON_MAGNITUDE_EXTINCTED)?,
            diameter: pairs.optional(MOON_SIZE, DEFAULT_DIAMETER_DEG)?,
        },
        moon_illumination: pairs.number(MOON_ILLUMINATION)? / 100.0,
        venus: CelestialBody {
            altitude: pairs.number(VENUS_ALTITUDE)?,
            azimuth: pairs.number(VENUS_AZIMUTH)?,
            magnitude: pairs.number(VENUS_MAGNITUDE)?,
            magnitude_extincted: pairs.number(VENUS_MAGNITUDE_EXTINCTED)?,
            diameter: 0.0,
        },
        ambient_intensity: landscape.max(0.0),
        time: SkyTime {
            julian_day: pairs.number(JULIAN_DAY)?,
            utc: pairs.text(DATE_UTC)?.to_string(),
            local: pairs.text(DATE_LOCAL)?.to_string(),
            is_time_now: false,
            time_rate: 0.0,
        },
    })
}

struct Pairs(HashMap<String, String>);

impl Pairs {
    fn text(&self, key: &'static str) -> Result<&str, SnapshotError> {
        self.0
            .get(key)
            .map(String::as_str)
            .ok_or(SnapshotError::MissingKey(key))
    }

    fn number(&self, key: &'static str) -> Result<f64, SnapshotError> {
        let value = self.text(key)?;
        value
            .parse::<f64>()
            .ok()
            .filter(|number| number.is_finite())
            .ok_or_else(|| SnapshotError::InvalidNumber {
                key,
                value: value.to_string(),
            })
    }

    fn optional(&self, key: &'static str, default: f64) -> Result<f64, SnapshotError> {
        match self.0.get(key) {
            Some(_) => self.number(key),
            None => Ok(default),
        }
    }
}

/// Where the snapshot text comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotLocation {
    File(PathBuf),
    Url(String),
}

impl SnapshotLocation {
    pub fn parse(location: &str) -> Self {
        if location.starts_with("http://") || location.starts_with("https://") {
            SnapshotLocation::Url(location.to_string())
        } else {
            SnapshotLocation::File(PathBuf::from(location))
        }
    }

    pub fn file_path(&self) -> Option<&PathBuf> {
        match self {
            SnapshotLocation::File(path) => Some(path),
            SnapshotLocation::Url(_) => None,
        }
    }
}

impl std::fmt::Display for SnapshotLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotLocation::File(path) => write!(f, "{}", path.display()),
            SnapshotLocation::Url(url) => f.write_str(url),
        }
    }
}

/// Reads and parses the snapshot from a file or URL.
#[derive(Debug, Clone)]
pub struct SnapshotSource {
    location: SnapshotLocation,
    http: reqwest::Client,
}

impl SnapshotSource {
    pub fn new(location: SnapshotLocation, timeout: Duration) -> Result<Self, SnapshotError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| SnapshotError::Read {
                location: location.to_string(),
                reason: err.to_string(),
            })?;
        Ok(Self { location, http })
    }

    pub fn location(&self) -> &SnapshotLocation {
        &self.location
    }

    pub async fn read_text(&self) -> Result<String, SnapshotError> {
        let read_error = |reason: String| SnapshotError::Read {
            location: self.location.to_string(),
            reason,
        };
        match &self.location {
            SnapshotLocation::File(path) => tokio::fs::read_to_string(path)
                .await
                .map_err(|err| read_error(err.to_string())),
            SnapshotLocation::Url(url) => {
                let response = self
                    .http
                    .get(url)
                    .send()
                    .await
                    .map_err(|err| read_error(err.to_string()))?;
                if !response.status().is_success() {
                    return Err(read_error(format!("HTTP {}", response.status())));
                }
                response
                    .text()
                    .await
                    .map_err(|err| read_error(err.to_string()))
            }
        }
    }

    pub async fn load(&self) -> Result<SkyState, SnapshotError> {
        let text = self.read_text().await?;
        let state = parse_snapshot(&text);
        match &state {
            Ok(state) => tracing::debug!(
                target: "sky_bridge::snapshot",
                location = %self.location,
                jd = state.time.julian_day,
                "snapshot.loaded"
            ),
            Err(err) => tracing::warn!(
                target: "sky_bridge::snapshot",
                location = %self.location,
                error = %err,
                "snapshot.parse_failed"
            ),
        }
        state
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    pub const SNAPSHOT: &str = "\
Sun Altitude:-12.5
Sun Azimuth:290.1
Sun Magnitude:-26.74
Sun Magnitude (after extinction):-26.1
Sun Longitude:334.2
Sun Size:0.54
Moon Altitude:35.0
Moon Azimuth:120.4
Moon illumination:87.5
Moon Magnitude:-11.9
Moon Magnitude (after extinction):-11.7
Venus Altitude:8.2
Venus Azimuth:260.0
Venus Magnitude:-4.3
Venus Magnitude (after extinction):-3.9
JD:2460000.25
Date (UTC):2023-02-23T18:00:00
Date:2023-02-23T19:00:00
Landscape Brightness:0.02
";
}
