use sky_proto::{Body, ObjectInfo, TimeSection};

/// Position and brightness of one body at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CelestialBody {
    /// Degrees above the horizon, negative below.
    pub altitude: f64,
    /// Degrees, 0..360.
    pub azimuth: f64,
    /// Apparent visual magnitude.
    pub magnitude: f64,
    /// Apparent visual magnitude after atmospheric extinction.
    pub magnitude_extincted: f64,
    /// Angular diameter in degrees.
    pub diameter: f64,
}

impl CelestialBody {
    /// Extra magnitudes lost to the atmosphere; grows towards the horizon.
    pub fn extinction_delta(&self) -> f64 {
        self.magnitude_extincted - self.magnitude
    }
}

impl From<&ObjectInfo> for CelestialBody {
    fn from(info: &ObjectInfo) -> Self {
        Self {
            altitude: info.altitude,
            azimuth: info.azimuth,
            magnitude: info.vmag,
            magnitude_extincted: info.vmage,
            diameter: info.diameter,
        }
    }
}

/// Simulation clock at the instant a [`SkyState`] describes.
#[derive(Debug, Clone, PartialEq)]
pub struct SkyTime {
    pub julian_day: f64,
    pub utc: String,
    pub local: String,
    pub is_time_now: bool,
    pub time_rate: f64,
}

impl From<&TimeSection> for SkyTime {
    fn from(time: &TimeSection) -> Self {
        Self {
            julian_day: time.jday,
            utc: time.utc.clone(),
            local: time.local.clone(),
            is_time_now: time.is_time_now,
            time_rate: time.timerate,
        }
    }
}

/// One fully populated instant of sky state.
///
/// Instances are rebuilt wholesale from each fetch or parse; there is no partially
/// filled variant. Absence of state is expressed by not having a `SkyState` at all.
#[derive(Debug, Clone, PartialEq)]
pub struct SkyState {
    pub sun: CelestialBody,
    /// Ecliptic longitude of the Sun in degrees.
    pub sun_longitude: f64,
    pub moon: CelestialBody,
    /// Illuminated fraction of the lunar disk, 0..1.
    pub moon_illumination: f64,
    pub venus: CelestialBody,
    /// Scene-wide ambient brightness, taken from the Sun record.
    pub ambient_intensity: f64,
    pub time: SkyTime,
}

impl SkyState {
    pub fn body(&self, body: Body) -> &CelestialBody {
        match body {
            Body::Sun => &self.sun,
            Body::Moon => &self.moon,
            Body::Venus => &self.venus,
        }
    }

    /// Assemble a state from the three live object infos and the mirrored clock.
    ///
    /// Returns `None` unless all inputs are present.
    pub fn from_object_infos(
        sun: Option<&ObjectInfo>,
        moon: Option<&ObjectInfo>,
        venus: Option<&ObjectInfo>,
        time: Option<&TimeSection>,
    ) -> Option<Self> {
        let (sun, moon, venus, time) = (sun?, moon?, venus?, time?);
        Some(Self {
            sun: CelestialBody::from(sun),
            sun_longitude: sun.elong.unwrap_or_default(),
            moon: CelestialBody::from(moon),
            moon_illumination: moon.illumination.unwrap_or_default() / 100.0,
            venus: CelestialBody::from(venus),
            ambient_intensity: sun.ambient_int.max(0.0),
            time: SkyTime::from(time),
        })
    }
}
