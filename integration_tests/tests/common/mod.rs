#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Once};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use sky_bridge::{
    BridgeConfig, BridgeEvent, CelestialBody, SkyState, SkyTime, Transport, TransportError,
    TransportResponse,
};
use sky_proto::{OBJECT_INFO_ENDPOINT, STATUS_ENDPOINT};

static INIT: Once = Once::new();

pub fn ensure_test_config() {
    INIT.call_once(|| {
        let config_path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join("test_bridge_config.json");

        debug_assert!(
            config_path.exists(),
            "missing test bridge config at {}",
            config_path.display()
        );

        std::env::set_var("SKY_BRIDGE_CONFIG_PATH", &config_path);
    });
}

pub const FULL_STATE: &str = r#"{
    "actionChanges": {"id": 4, "changes": {"actionShow_Ground": true}},
    "propertyChanges": {"id": 7, "changes": {"SolarSystem.flagMoonScale": false}},
    "time": {"jday": 2460100.5, "utc": "2023-06-02T00:00:00Z", "local": "2023-06-02T02:00:00", "isTimeNow": false, "timerate": 0.0}
}"#;

pub const ECHO_DELTA: &str =
    r#"{"actionChanges": {"id": 4, "changes": {}}, "propertyChanges": {"id": 7, "changes": {}}}"#;

pub const SUN_INFO: &str = r#"{"altitude": 41.0, "azimuth": 200.0, "vmag": -26.7, "vmage": -26.6,
    "diameter": 0.53, "ambientInt": 0.25, "illumination": 100.0, "elong": 71.5}"#;

pub const SNAPSHOT: &str = "\
Sun Altitude:-20.0
Sun Azimuth:310.0
Sun Magnitude:-26.74
Sun Magnitude (after extinction):-26.1
Sun Longitude:71.0
Sun Size:0.53
Moon Altitude:22.5
Moon Azimuth:140.0
Moon illumination:64
Moon Magnitude:-11.2
Moon Magnitude (after extinction):-10.9
Venus Altitude:-5.0
Venus Azimuth:290.0
Venus Magnitude:-4.1
Venus Magnitude (after extinction):-3.8
JD:2460100.0
Date (UTC):2023-06-01T12:00:00
Date:2023-06-01T14:00:00
Landscape Brightness:0.01
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: &'static str,
    pub path: String,
    pub params: Vec<(&'static str, String)>,
}

#[derive(Default)]
struct RemoteState {
    queued: HashMap<String, VecDeque<TransportResponse>>,
    defaults: HashMap<String, TransportResponse>,
    offline: bool,
    requests: Vec<Request>,
}

/// In-process stand-in for the simulator's HTTP interface.
///
/// Queued replies are served first; afterwards each path answers with its default,
/// and paths without a default answer `200 ok`.
#[derive(Clone, Default)]
pub struct FakeRemote {
    state: Arc<Mutex<RemoteState>>,
}

impl FakeRemote {
    /// A remote that serves [`FULL_STATE`] once, then echoes its ids with the Sun up.
    pub fn healthy() -> Self {
        let remote = Self::default();
        remote.queue(STATUS_ENDPOINT, 200, FULL_STATE);
        remote.default_reply(STATUS_ENDPOINT, 200, ECHO_DELTA);
        remote.default_reply(OBJECT_INFO_ENDPOINT, 200, SUN_INFO);
        remote
    }

    pub fn queue(&self, path: &str, status: u16, body: &str) {
        self.state
            .lock()
            .queued
            .entry(path.to_string())
            .or_default()
            .push_back(TransportResponse {
                status,
                body: body.to_string(),
            });
    }

    pub fn default_reply(&self, path: &str, status: u16, body: &str) {
        self.state.lock().defaults.insert(
            path.to_string(),
            TransportResponse {
                status,
                body: body.to_string(),
            },
        );
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    pub fn requests(&self) -> Vec<Request> {
        self.state.lock().requests.clone()
    }

    pub fn posts_to(&self, path: &str) -> Vec<Request> {
        self.requests()
            .into_iter()
            .filter(|request| request.method == "POST" && request.path == path)
            .collect()
    }

    fn answer(
        &self,
        method: &'static str,
        path: &str,
        params: &[(&'static str, String)],
    ) -> Result<TransportResponse, TransportError> {
        let mut state = self.state.lock();
        state.requests.push(Request {
            method,
            path: path.to_string(),
            params: params.to_vec(),
        });
        if state.offline {
            return Err(TransportError::Network("connection refused".to_string()));
        }
        if let Some(reply) = state.queued.get_mut(path).and_then(VecDeque::pop_front) {
            return Ok(reply);
        }
        Ok(state
            .defaults
            .get(path)
            .cloned()
            .unwrap_or_else(|| TransportResponse::ok("ok")))
    }
}

#[async_trait]
impl Transport for FakeRemote {
    async fn get(
        &self,
        path: &str,
        query: &[(&'static str, String)],
    ) -> Result<TransportResponse, TransportError> {
        self.answer("GET", path, query)
    }

    async fn post_form(
        &self,
        path: &str,
        form: &[(&'static str, String)],
    ) -> Result<TransportResponse, TransportError> {
        self.answer("POST", path, form)
    }
}

/// Config pointing at a snapshot written into `dir`, polling fast.
pub fn bridge_config(dir: &std::path::Path) -> Arc<BridgeConfig> {
    let path = dir.join("unityData.txt");
    std::fs::write(&path, SNAPSHOT).expect("write snapshot");
    let mut config = BridgeConfig::default();
    config.snapshot.location = path.display().to_string();
    config.snapshot.watch = false;
    config.remote.poll_interval_ms = 10;
    config.remote.delta_failure_threshold = 2;
    Arc::new(config)
}

/// Wait for the first event matching `predicate`, discarding the others.
pub fn wait_for_event(
    events: &Receiver<BridgeEvent>,
    mut predicate: impl FnMut(&BridgeEvent) -> bool,
) -> BridgeEvent {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match events.recv_timeout(remaining) {
            Ok(event) if predicate(&event) => return event,
            Ok(_) => continue,
            Err(err) => panic!("no matching bridge event: {err}"),
        }
    }
}

pub fn body(altitude: f64, azimuth: f64, magnitude: f64) -> CelestialBody {
    CelestialBody {
        altitude,
        azimuth,
        magnitude,
        magnitude_extincted: magnitude + 0.3,
        diameter: 0.5,
    }
}

pub fn sky(sun_alt: f64, moon_alt: f64, venus_alt: f64) -> SkyState {
    SkyState {
        sun: body(sun_alt, 180.0, -26.7),
        sun_longitude: 71.0,
        moon: body(moon_alt, 90.0, -11.0),
        moon_illumination: 0.8,
        venus: CelestialBody {
            diameter: 0.0,
            ..body(venus_alt, 270.0, -4.3)
        },
        ambient_intensity: 0.1,
        time: SkyTime {
            julian_day: 2460100.5,
            utc: "2023-06-02T00:00:00Z".to_string(),
            local: "2023-06-02T02:00:00".to_string(),
            is_time_now: false,
            time_rate: 0.0,
        },
    }
}
