//! Wire contract with the remote sky simulator.
//!
//! Everything here mirrors what the simulator's remote-control endpoint sends and
//! accepts. Nothing performs I/O; the bridge crate owns transport and state.

use std::fmt;

use serde::{Deserialize, Serialize};

mod commands;

pub use commands::{Command, CommandKind, SiteLocation};

/// Path of the status endpoint below the API prefix.
pub const STATUS_ENDPOINT: &str = "main/status";
/// Path of the object info endpoint below the API prefix.
pub const OBJECT_INFO_ENDPOINT: &str = "objects/info";

/// Top-level status section carrying action state.
pub const ACTION_CHANGES: &str = "actionChanges";
/// Top-level status section carrying property state.
pub const PROPERTY_CHANGES: &str = "propertyChanges";
/// Top-level status section carrying the simulation clock.
pub const TIME: &str = "time";
/// Nested map of changed values inside the action/property sections.
pub const CHANGES: &str = "changes";
/// Change-set id field inside the action/property sections.
pub const ID: &str = "id";

/// The three top-level sections a status response may carry.
pub const STATUS_SECTIONS: [&str; 3] = [ACTION_CHANGES, PROPERTY_CHANGES, TIME];

/// Change-set ids identifying the state version a mirror has seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeIds {
    pub action: i64,
    pub property: i64,
}

impl ChangeIds {
    /// Sentinel id that asks the remote for its complete state.
    pub const FULL_STATE_SENTINEL: i64 = -2;

    pub const FULL_STATE: ChangeIds = ChangeIds {
        action: Self::FULL_STATE_SENTINEL,
        property: Self::FULL_STATE_SENTINEL,
    };

    pub fn new(action: i64, property: i64) -> Self {
        Self { action, property }
    }

    pub fn is_full_state(&self) -> bool {
        self.action < 0 && self.property < 0
    }

    /// Query parameters for `GET main/status`.
    pub fn status_query(&self) -> [(&'static str, String); 2] {
        [
            ("propId", self.property.to_string()),
            ("actionId", self.action.to_string()),
        ]
    }
}

impl fmt::Display for ChangeIds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "action={} property={}", self.action, self.property)
    }
}

/// The `time` section of a status response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeSection {
    pub jday: f64,
    pub utc: String,
    pub local: String,
    #[serde(rename = "isTimeNow")]
    pub is_time_now: bool,
    pub timerate: f64,
}

impl Default for TimeSection {
    fn default() -> Self {
        Self {
            jday: 0.0,
            utc: String::new(),
            local: String::new(),
            is_time_now: false,
            timerate: 0.0,
        }
    }
}

/// Bodies the bridge may ask about when picking a light source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Body {
    Sun,
    Moon,
    Venus,
}

impl Body {
    pub const ALL: [Body; 3] = [Body::Sun, Body::Moon, Body::Venus];

    pub fn name(self) -> &'static str {
        match self {
            Body::Sun => "Sun",
            Body::Moon => "Moon",
            Body::Venus => "Venus",
        }
    }

    /// Query parameters for `GET objects/info`.
    pub fn info_query(self) -> [(&'static str, String); 2] {
        [("name", self.name().to_string()), ("format", "map".to_string())]
    }
}

impl fmt::Display for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Subset of the flat object info map the light resolver needs.
///
/// `illumination` is reported for the Moon (percent), `elong` for the Sun.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub altitude: f64,
    pub azimuth: f64,
    pub vmag: f64,
    pub vmage: f64,
    #[serde(default)]
    pub diameter: f64,
    #[serde(default, rename = "ambientInt")]
    pub ambient_int: f64,
    #[serde(default)]
    pub illumination: Option<f64>,
    #[serde(default)]
    pub elong: Option<f64>,
}

pub fn decode_object_info(body: &str) -> serde_json::Result<ObjectInfo> {
    serde_json::from_str(body)
}

pub fn decode_time_section(value: &serde_json::Value) -> serde_json::Result<TimeSection> {
    TimeSection::deserialize(value)
}

/// Planet names accepted by the location endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Planet {
    Sun,
    Mercury,
    Venus,
    #[default]
    Earth,
    Moon,
    Mars,
    Jupiter,
    Saturn,
    Uranus,
    Neptune,
    Pluto,
    Io,
    Europa,
    Ganymede,
    Callisto,
}

impl fmt::Display for Planet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn full_state_query_uses_sentinels() {
        let query = ChangeIds::FULL_STATE.status_query();
        assert_eq!(query[0], ("propId", "-2".to_string()));
        assert_eq!(query[1], ("actionId", "-2".to_string()));
        assert!(ChangeIds::FULL_STATE.is_full_state());
        assert!(!ChangeIds::new(4, 17).is_full_state());
    }

    #[test]
    fn object_info_ignores_unknown_keys() {
        let info = decode_object_info(
            r#"{"altitude":12.5,"azimuth":201.0,"vmag":-4.4,"vmage":-4.1,
                "diameter":0.0004,"ambientInt":0.07,"name":"Venus","type":"Planet"}"#,
        )
        .expect("info decodes");
        assert_eq!(info.altitude, 12.5);
        assert_eq!(info.ambient_int, 0.07);
        assert_eq!(info.illumination, None);
    }

    #[test]
    fn object_info_requires_position() {
        assert!(decode_object_info(r#"{"vmag":-26.7,"vmage":-26.5}"#).is_err());
    }

    #[test]
    fn time_section_tolerates_missing_fields() {
        let time = decode_time_section(&json!({
            "jday": 2460000.25,
            "local": "2023-02-24T18:00:00",
            "isTimeNow": true
        }))
        .expect("time decodes");
        assert_eq!(time.jday, 2460000.25);
        assert!(time.is_time_now);
        assert_eq!(time.utc, "");
    }

    #[test]
    fn planet_display_matches_remote_names() {
        assert_eq!(Planet::Earth.to_string(), "Earth");
        assert_eq!(Planet::Ganymede.to_string(), "Ganymede");
    }
}
