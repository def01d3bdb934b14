//! Light resolution: picks the dominant body of a [`SkyState`] and shapes its light.

use std::fmt;

use bevy::math::Vec3;
use bevy::prelude::Resource;

use crate::config::BridgeConfig;
use crate::error::SyncError;
use crate::mode::BridgeMode;
use crate::state::{CelestialBody, SkyState};

/// The Sun stays the light source until it is this far below the horizon (degrees).
pub const SUN_MIN_ALTITUDE: f64 = -3.0;
pub const MOON_MIN_ALTITUDE: f64 = 0.0;
pub const VENUS_MIN_ALTITUDE: f64 = 0.0;

const SUN_POWER: f64 = 1.4;
const AMBIENT_TINT: [f64; 3] = [0.8, 0.9, 1.0];
const AMBIENT_CAP: f64 = 0.3;
const FOG_FACTOR: f64 = 0.7;
const FALLBACK_AMBIENT: f32 = 0.15;
const FALLBACK_FOG: f32 = 0.1;
const IMPOSTOR_MAX_BLUE: f32 = 0.9;
/// Upper bound of the manual light intensity multiplier.
pub const MAX_EXPOSURE: f32 = 8.0;
pub const DEFAULT_EXPOSURE: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightSource {
    Sun,
    Moon,
    Venus,
    None,
}

impl LightSource {
    pub fn name(self) -> &'static str {
        match self {
            LightSource::Sun => "Sun",
            LightSource::Moon => "Moon",
            LightSource::Venus => "Venus",
            LightSource::None => "none",
        }
    }

    pub fn is_lit(self) -> bool {
        self != LightSource::None
    }
}

impl fmt::Display for LightSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowHardness {
    Soft,
    Hard,
    None,
}

/// Linear RGB, unclamped.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LinearColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl LinearColor {
    pub const BLACK: LinearColor = LinearColor::grey(0.0);

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub const fn grey(value: f32) -> Self {
        Self::new(value, value, value)
    }

    fn from_f64(r: f64, g: f64, b: f64) -> Self {
        Self::new(r as f32, g as f32, b as f32)
    }

    /// Clamped to `0..=1` per channel for display.
    pub fn clamped(self) -> Self {
        Self::new(
            self.r.clamp(0.0, 1.0),
            self.g.clamp(0.0, 1.0),
            self.b.clamp(0.0, 1.0),
        )
    }
}

/// Direction of the light in radians, azimuth already corrected by the north angle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LightDirection {
    pub altitude: f64,
    pub azimuth: f64,
}

impl LightDirection {
    /// Unit vector towards the light; `y` up, azimuth measured from `+z` towards `+x`.
    pub fn to_vector(self) -> Vec3 {
        let (sin_alt, cos_alt) = self.altitude.sin_cos();
        let (sin_az, cos_az) = self.azimuth.sin_cos();
        Vec3::new(
            (cos_alt * sin_az) as f32,
            sin_alt as f32,
            (cos_alt * cos_az) as f32,
        )
    }
}

/// Emissive sphere standing in for the solar disk when no live view is streamed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SunImpostor {
    pub scale: f32,
    pub emission: LinearColor,
}

/// Resolved lighting decision for one [`SkyState`].
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveLight {
    pub source: LightSource,
    pub direction: LightDirection,
    pub color: LinearColor,
    pub ambient: LinearColor,
    pub fog: LinearColor,
    /// Raw ambient reading the ambient and fog colors were derived from.
    pub ambient_intensity: f64,
    pub shadows: ShadowHardness,
    pub enabled: bool,
    /// Intensity multiplier of the direct light, 0..=8. Raised by hand to make faint
    /// lunar or Venus shadows visible.
    pub intensity: f32,
    pub impostor: Option<SunImpostor>,
}

impl ActiveLight {
    /// Dark ambient-only light used when nothing has ever been resolved.
    pub fn fallback() -> Self {
        Self {
            source: LightSource::None,
            direction: LightDirection::default(),
            color: LinearColor::BLACK,
            ambient: LinearColor::grey(FALLBACK_AMBIENT),
            fog: LinearColor::grey(FALLBACK_FOG),
            ambient_intensity: f64::from(FALLBACK_AMBIENT),
            shadows: ShadowHardness::None,
            enabled: false,
            intensity: DEFAULT_EXPOSURE,
            impostor: None,
        }
    }
}

#[derive(Resource, Debug, Clone, Copy, PartialEq)]
pub struct LightResolver {
    pub north_angle_deg: f64,
    pub impostor_distance: f64,
    exposure: f32,
}

impl Default for LightResolver {
    fn default() -> Self {
        Self {
            north_angle_deg: 0.0,
            impostor_distance: 250.0,
            exposure: DEFAULT_EXPOSURE,
        }
    }
}

/// Clamp to `0..=MAX_EXPOSURE`; non-finite input keeps `current`.
fn clamp_exposure(factor: f32, current: f32) -> f32 {
    if factor.is_finite() {
        factor.clamp(0.0, MAX_EXPOSURE)
    } else {
        current
    }
}

impl LightResolver {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            north_angle_deg: config.site.north_angle_deg,
            impostor_distance: config.light.impostor_distance,
            exposure: clamp_exposure(config.light.exposure, DEFAULT_EXPOSURE),
        }
    }

    pub fn exposure(&self) -> f32 {
        self.exposure
    }

    /// Set the intensity multiplier applied to every later resolution; returns the clamped value.
    pub fn overexpose(&mut self, factor: f32) -> f32 {
        self.exposure = clamp_exposure(factor, self.exposure);
        self.exposure
    }

    /// First body above its threshold, in Sun, Moon, Venus order.
    pub fn select_source(state: &SkyState) -> LightSource {
        if state.sun.altitude > SUN_MIN_ALTITUDE {
            LightSource::Sun
        } else if state.moon.altitude > MOON_MIN_ALTITUDE {
            LightSource::Moon
        } else if state.venus.altitude > VENUS_MIN_ALTITUDE {
            LightSource::Venus
        } else {
            LightSource::None
        }
    }

    pub fn resolve(&self, state: &SkyState, mode: BridgeMode) -> ActiveLight {
        let source = Self::select_source(state);
        // Ambient is sky-wide and always read from the Sun record.
        let ambient_intensity = state.ambient_intensity;
        let capped = ambient_intensity.min(AMBIENT_CAP);
        let ambient = LinearColor::from_f64(
            AMBIENT_TINT[0] * capped,
            AMBIENT_TINT[1] * capped,
            AMBIENT_TINT[2] * capped,
        );
        let fog = LinearColor::grey((FOG_FACTOR * ambient_intensity) as f32);

        let body = match source {
            LightSource::Sun => &state.sun,
            LightSource::Moon => &state.moon,
            LightSource::Venus => &state.venus,
            LightSource::None => {
                return ActiveLight {
                    source,
                    direction: LightDirection::default(),
                    color: LinearColor::BLACK,
                    ambient,
                    fog,
                    ambient_intensity,
                    shadows: ShadowHardness::None,
                    enabled: false,
                    intensity: self.exposure,
                    impostor: None,
                };
            }
        };

        let color = light_color(source, body, state.moon_illumination);
        let shadows = match source {
            LightSource::Venus => ShadowHardness::Hard,
            _ => ShadowHardness::Soft,
        };
        let impostor = (source == LightSource::Sun && mode == BridgeMode::Snapshot)
            .then(|| self.sun_impostor(body, color));

        ActiveLight {
            source,
            direction: LightDirection {
                altitude: body.altitude.to_radians(),
                azimuth: (body.azimuth + self.north_angle_deg).to_radians(),
            },
            color,
            ambient,
            fog,
            ambient_intensity,
            shadows,
            enabled: true,
            intensity: self.exposure,
            impostor,
        }
    }

    /// `Unknown` when there is no state to resolve.
    pub fn try_resolve(
        &self,
        state: Option<&SkyState>,
        mode: BridgeMode,
    ) -> Result<ActiveLight, SyncError> {
        state
            .map(|state| self.resolve(state, mode))
            .ok_or(SyncError::Unknown)
    }

    fn sun_impostor(&self, sun: &CelestialBody, color: LinearColor) -> SunImpostor {
        let scale = (sun.diameter.to_radians() * 0.5).tan() * 2.0 * self.impostor_distance;
        SunImpostor {
            scale: scale as f32,
            emission: LinearColor::new(color.r, color.g, color.b.min(IMPOSTOR_MAX_BLUE)),
        }
    }
}

/// Direct color of a lit source. Extinction reddens: blue falls fastest, then green.
fn light_color(source: LightSource, body: &CelestialBody, moon_illumination: f64) -> LinearColor {
    let delta = body.extinction_delta();
    let tint = |power: f64| {
        LinearColor::from_f64(
            power,
            0.85f64.powf(0.6 * delta) * power,
            0.6f64.powf(0.5 * delta) * power,
        )
    };
    match source {
        LightSource::Sun => LinearColor::from_f64(
            SUN_POWER,
            0.75f64.powf(delta) * SUN_POWER,
            0.42f64.powf(0.9 * delta) * SUN_POWER,
        ),
        // Quadratic in phase: a quarter of full brightness at full moon, little otherwise.
        LightSource::Moon => tint(0.25 * moon_illumination * moon_illumination),
        LightSource::Venus => tint(body.magnitude * -0.01),
        LightSource::None => LinearColor::BLACK,
    }
}

/// World-space occlusion test along a ray.
pub trait Occluder: Send + Sync {
    fn blocks(&self, origin: Vec3, direction: Vec3) -> bool;
}

/// Scene without geometry.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenSky;

impl Occluder for OpenSky {
    fn blocks(&self, _origin: Vec3, _direction: Vec3) -> bool {
        false
    }
}

/// Whether glare effects should be drawn for `light` from a camera at `origin`.
pub fn flare_visible(
    light: &ActiveLight,
    fov_deg: f64,
    min_fov_deg: f64,
    origin: Vec3,
    occluder: &dyn Occluder,
) -> bool {
    if !light.enabled || fov_deg < min_fov_deg {
        return false;
    }
    !occluder.blocks(origin, light.direction.to_vector())
}

/// Last good light; failures keep it instead of replacing it.
#[derive(Resource, Debug, Clone, Default)]
pub struct LightCache {
    current: Option<ActiveLight>,
    source_changes: u64,
}

impl LightCache {
    /// Fold a resolution result into the cache and return the light to render.
    pub fn apply(&mut self, result: Result<ActiveLight, SyncError>) -> &ActiveLight {
        match result {
            Ok(light) => {
                let previous = self.current.as_ref().map(|current| current.source);
                if previous.is_some_and(|source| source != light.source) {
                    self.source_changes += 1;
                }
                self.current = Some(light);
            }
            Err(err) => {
                tracing::warn!(
                    target: "sky_bridge::light",
                    error = %err,
                    kept_previous = self.current.is_some(),
                    "light.resolve_failed"
                );
            }
        }
        self.current.get_or_insert_with(ActiveLight::fallback)
    }

    pub fn current(&self) -> Option<&ActiveLight> {
        self.current.as_ref()
    }

    pub fn light_or_fallback(&self) -> ActiveLight {
        self.current.clone().unwrap_or_else(ActiveLight::fallback)
    }

    pub fn source_changes(&self) -> u64 {
        self.source_changes
    }

    /// Apply a new intensity multiplier to the light being rendered.
    pub fn set_intensity(&mut self, intensity: f32) {
        if let Some(light) = self.current.as_mut() {
            light.intensity = intensity;
        }
    }
}
