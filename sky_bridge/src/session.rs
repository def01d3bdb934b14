//! Remote session: keeps a [`RemoteMirror`] current via full and delta status fetches.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use sky_proto::{Body, ChangeIds, ObjectInfo, TimeSection, STATUS_ENDPOINT};

use crate::error::SyncError;
use crate::guard::InFlightGuard;
use crate::mirror::{RemoteMirror, UNKNOWN_PROPERTY};
use crate::state::SkyState;
use crate::transport::{expect_success, Transport};

/// Solar altitude reported before any Sun info has been fetched.
pub const DEFAULT_SOLAR_ALTITUDE: f64 = 30.0;

/// Result of a single poll of the status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaOutcome {
    Applied(ChangeIds),
    /// The response predated the mirror and was ignored.
    Stale,
    /// Another status fetch was still in flight.
    Skipped,
}

pub struct RemoteSession<T: Transport> {
    transport: T,
    mirror: RwLock<Option<RemoteMirror>>,
    objects: RwLock<HashMap<Body, ObjectInfo>>,
    reachable: AtomicBool,
    needs_resync: AtomicBool,
    status_guard: InFlightGuard,
}

impl<T: Transport> RemoteSession<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            mirror: RwLock::new(None),
            objects: RwLock::new(HashMap::new()),
            reachable: AtomicBool::new(false),
            needs_resync: AtomicBool::new(false),
            status_guard: InFlightGuard::new("status"),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Fetch the complete remote state and replace the mirror with it.
    ///
    /// Failure leaves the session without a mirror; it is not retried here. A non-2xx
    /// answer counts as unreachable, like a network failure.
    pub async fn initialize_full(&self) -> Result<ChangeIds, SyncError> {
        let result = expect_success(
            self.transport
                .get(STATUS_ENDPOINT, &ChangeIds::FULL_STATE.status_query())
                .await,
        )
        .map_err(|err| match err {
            SyncError::HttpError { status, body } => {
                SyncError::Unreachable(format!("full state answered HTTP {status}: {body}"))
            }
            other => other,
        })
        .and_then(|body| RemoteMirror::from_full_state(&body));

        match result {
            Ok(mirror) => {
                let ids = mirror.ids();
                *self.mirror.write() = Some(mirror);
                self.reachable.store(true, Ordering::Release);
                self.needs_resync.store(false, Ordering::Release);
                tracing::info!(target: "sky_bridge::session", ids = %ids, "session.initialized");
                Ok(ids)
            }
            Err(err) => {
                *self.mirror.write() = None;
                if err.is_connectivity() {
                    self.reachable.store(false, Ordering::Release);
                }
                tracing::warn!(target: "sky_bridge::session", error = %err, "session.initialize_failed");
                Err(err)
            }
        }
    }

    /// Poll for changes since the mirror's ids and merge them.
    pub async fn fetch_delta(&self) -> Result<DeltaOutcome, SyncError> {
        let ids = self.ids().ok_or(SyncError::NotInitialized)?;
        let Some(_permit) = self.status_guard.try_acquire() else {
            tracing::trace!(target: "sky_bridge::session", "delta.dropped=in_flight");
            return Ok(DeltaOutcome::Skipped);
        };

        let body = match expect_success(
            self.transport
                .get(STATUS_ENDPOINT, &ids.status_query())
                .await,
        ) {
            Ok(body) => body,
            Err(err) => {
                if err.is_connectivity() {
                    self.reachable.store(false, Ordering::Release);
                }
                tracing::warn!(target: "sky_bridge::session", error = %err, "delta.fetch_failed");
                return Err(err);
            }
        };
        self.reachable.store(true, Ordering::Release);

        let mut guard = self.mirror.write();
        let Some(mirror) = guard.as_mut() else {
            return Err(SyncError::NotInitialized);
        };
        match mirror.apply_delta(&body) {
            Ok(summary) => {
                tracing::debug!(
                    target: "sky_bridge::session",
                    ids = %summary.ids,
                    sections = summary.sections,
                    "delta.applied"
                );
                Ok(DeltaOutcome::Applied(summary.ids))
            }
            Err(SyncError::StaleDelta { received, current }) => {
                tracing::debug!(
                    target: "sky_bridge::session",
                    received = %received,
                    current = %current,
                    "delta.rejected=stale"
                );
                Ok(DeltaOutcome::Stale)
            }
            Err(err) => {
                *guard = None;
                self.needs_resync.store(true, Ordering::Release);
                tracing::warn!(target: "sky_bridge::session", error = %err, "delta.mirror_discarded");
                Err(err)
            }
        }
    }

    /// Delta fetch when a mirror exists, full fetch otherwise.
    pub async fn refresh(&self) -> Result<DeltaOutcome, SyncError> {
        if self.has_mirror() {
            self.fetch_delta().await
        } else {
            self.initialize_full().await.map(DeltaOutcome::Applied)
        }
    }

    /// Drop the mirror and cached object infos.
    pub fn reset(&self) {
        *self.mirror.write() = None;
        self.objects.write().clear();
        self.needs_resync.store(false, Ordering::Release);
    }

    pub fn has_mirror(&self) -> bool {
        self.mirror.read().is_some()
    }

    pub fn ids(&self) -> Option<ChangeIds> {
        self.mirror.read().as_ref().map(RemoteMirror::ids)
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::Acquire)
    }

    pub fn mark_unreachable(&self) {
        self.reachable.store(false, Ordering::Release);
    }

    pub fn needs_resync(&self) -> bool {
        self.needs_resync.load(Ordering::Acquire)
    }

    /// Outbound commands are only sent while a trusted mirror exists.
    pub fn commands_enabled(&self) -> bool {
        self.is_reachable() && self.has_mirror() && !self.needs_resync()
    }

    /// Cached property value, or `"null"` when unknown.
    pub fn read_property(&self, name: &str) -> String {
        self.mirror
            .read()
            .as_ref()
            .map(|mirror| mirror.property_string(name))
            .unwrap_or_else(|| UNKNOWN_PROPERTY.to_string())
    }

    pub fn property_bool(&self, name: &str) -> Option<bool> {
        match self.read_property(name).as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        }
    }

    pub fn time(&self) -> Option<TimeSection> {
        self.mirror.read().as_ref().and_then(RemoteMirror::time)
    }

    pub fn julian_day(&self) -> Option<f64> {
        self.time().map(|time| time.jday)
    }

    pub fn store_object_info(&self, body: Body, info: ObjectInfo) {
        self.objects.write().insert(body, info);
    }

    pub fn object_info(&self, body: Body) -> Option<ObjectInfo> {
        self.objects.read().get(&body).cloned()
    }

    pub fn solar_longitude(&self) -> Option<f64> {
        self.object_info(Body::Sun).and_then(|info| info.elong)
    }

    pub fn solar_altitude(&self) -> f64 {
        self.object_info(Body::Sun)
            .map(|info| info.altitude)
            .unwrap_or(DEFAULT_SOLAR_ALTITUDE)
    }

    /// Live sky state, present only once every body and the clock are known.
    pub fn sky_state(&self) -> Option<SkyState> {
        let objects = self.objects.read();
        let time = self.time();
        SkyState::from_object_infos(
            objects.get(&Body::Sun),
            objects.get(&Body::Moon),
            objects.get(&Body::Venus),
            time.as_ref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::fixtures::{ECHO_DELTA, FULL_STATE};
    use crate::transport::scripted::ScriptedTransport;
    use crate::transport::TransportError;

    fn session() -> RemoteSession<ScriptedTransport> {
        RemoteSession::new(ScriptedTransport::new())
    }

    #[tokio::test]
    async fn initialize_full_uses_sentinel_ids() {
        let session = session();
        session.transport().reply(STATUS_ENDPOINT, 200, FULL_STATE);

        let ids = session.initialize_full().await.expect("full fetch");
        assert_eq!(ids, ChangeIds::new(10, 20));
        assert!(session.commands_enabled());

        let requests = session.transport().requests();
        assert_eq!(
            requests[0].params,
            vec![("propId", "-2".to_string()), ("actionId", "-2".to_string())]
        );
    }

    #[tokio::test]
    async fn initialize_full_unreachable_leaves_no_mirror() {
        let session = session();
        session
            .transport()
            .fail(STATUS_ENDPOINT, TransportError::Network("refused".into()));

        let err = session.initialize_full().await.unwrap_err();
        assert!(matches!(err, SyncError::Unreachable(_)));
        assert!(!session.has_mirror());
        assert!(!session.commands_enabled());
        assert_eq!(session.read_property("SolarSystem.flagMoonScale"), "null");
    }

    #[tokio::test]
    async fn full_fetch_http_error_is_unreachable() {
        let session = session();
        session.transport().reply(STATUS_ENDPOINT, 503, "busy");
        let err = session.initialize_full().await.unwrap_err();
        assert_eq!(
            err,
            SyncError::Unreachable("full state answered HTTP 503: busy".into())
        );
        assert!(!session.is_reachable());
        assert!(!session.has_mirror());
    }

    #[tokio::test]
    async fn delta_carries_current_ids_and_merges() {
        let session = session();
        session.transport().reply(STATUS_ENDPOINT, 200, FULL_STATE);
        session.transport().reply(
            STATUS_ENDPOINT,
            200,
            r#"{"propertyChanges": {"id": 21, "changes": {"SolarSystem.flagMoonScale": true}}}"#,
        );
        session.initialize_full().await.expect("full fetch");

        let outcome = session.fetch_delta().await.expect("delta");
        assert_eq!(outcome, DeltaOutcome::Applied(ChangeIds::new(10, 21)));
        assert_eq!(session.property_bool("SolarSystem.flagMoonScale"), Some(true));
        assert_eq!(
            session.transport().requests()[1].params,
            vec![("propId", "20".to_string()), ("actionId", "10".to_string())]
        );
    }

    #[tokio::test]
    async fn echo_delta_after_full_fetch_is_a_no_op() {
        let session = session();
        session.transport().reply(STATUS_ENDPOINT, 200, FULL_STATE);
        session.transport().reply(STATUS_ENDPOINT, 200, ECHO_DELTA);
        session.initialize_full().await.expect("full fetch");
        let before = session.mirror.read().clone();

        session.fetch_delta().await.expect("delta");
        assert_eq!(*session.mirror.read(), before);
    }

    #[tokio::test]
    async fn malformed_delta_discards_mirror_and_disables_commands() {
        let session = session();
        session.transport().reply(STATUS_ENDPOINT, 200, FULL_STATE);
        session.transport().reply(STATUS_ENDPOINT, 200, "");
        session.initialize_full().await.expect("full fetch");

        let err = session.fetch_delta().await.unwrap_err();
        assert!(err.requires_resync());
        assert!(!session.has_mirror());
        assert!(session.needs_resync());
        assert!(!session.commands_enabled());

        session.transport().reply(STATUS_ENDPOINT, 200, FULL_STATE);
        session.refresh().await.expect("rebuild");
        assert!(session.commands_enabled());
    }

    #[tokio::test]
    async fn stale_delta_is_not_an_error() {
        let session = session();
        session.transport().reply(STATUS_ENDPOINT, 200, FULL_STATE);
        session.transport().reply(
            STATUS_ENDPOINT,
            200,
            r#"{"actionChanges": {"id": 3, "changes": {"actionShow_Ground": false}}}"#,
        );
        session.initialize_full().await.expect("full fetch");
        assert_eq!(session.fetch_delta().await, Ok(DeltaOutcome::Stale));
        assert_eq!(session.ids(), Some(ChangeIds::new(10, 20)));
    }

    #[tokio::test]
    async fn fetch_delta_without_mirror_requires_full_fetch() {
        assert_eq!(session().fetch_delta().await, Err(SyncError::NotInitialized));
    }

    #[tokio::test]
    async fn typed_accessors_read_mirror_and_objects() {
        let session = session();
        assert_eq!(session.solar_altitude(), DEFAULT_SOLAR_ALTITUDE);
        session.transport().reply(STATUS_ENDPOINT, 200, FULL_STATE);
        session.initialize_full().await.expect("full fetch");

        assert_eq!(session.julian_day(), Some(2460000.5));
        assert_eq!(session.read_property("StelSkyDrawer.bortleScaleIndex"), "3");
        assert_eq!(session.property_bool("StelSkyDrawer.bortleScaleIndex"), None);
        assert!(session.sky_state().is_none());

        let info = |altitude: f64| ObjectInfo {
            altitude,
            azimuth: 100.0,
            vmag: -1.0,
            vmage: -0.8,
            diameter: 0.5,
            ambient_int: 0.2,
            illumination: Some(50.0),
            elong: Some(12.0),
        };
        for (body, alt) in [(Body::Sun, 12.0), (Body::Moon, 5.0), (Body::Venus, -3.0)] {
            session.store_object_info(body, info(alt));
        }
        assert_eq!(session.solar_altitude(), 12.0);
        assert_eq!(session.solar_longitude(), Some(12.0));
        let sky = session.sky_state().expect("complete state");
        assert_eq!(sky.moon_illumination, 0.5);
        assert_eq!(sky.time.julian_day, 2460000.5);
    }
}
