//! Command dispatcher: fire-and-forget commands with single-flight guards and backoff.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use sky_proto::{decode_object_info, Body, Command, CommandKind, ObjectInfo, OBJECT_INFO_ENDPOINT};

use crate::config::BridgeConfig;
use crate::error::SyncError;
use crate::guard::InFlightGuard;
use crate::session::RemoteSession;
use crate::transport::{expect_success, Transport};

/// Whether a successful command is followed by a delta fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    After,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// A request of the same family is still outstanding.
    InFlight,
    /// The family is cooling down after an HTTP error.
    Backoff,
    /// The session has no trusted connection.
    Offline,
    /// The mirror does not hold the value the command derives from.
    MissingState,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Applied,
    /// The remote answered 2xx with an unexpected body.
    Rejected(String),
    Dropped(DropReason),
    Failed(SyncError),
}

impl CommandOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, CommandOutcome::Applied)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InfoOutcome {
    Fetched(ObjectInfo),
    Dropped(DropReason),
    Failed(SyncError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Family {
    Command(CommandKind),
    ObjectInfo,
}

pub struct CommandDispatcher<T: Transport> {
    session: Arc<RemoteSession<T>>,
    config: Arc<BridgeConfig>,
    object_info_guard: InFlightGuard,
    view_guard: InFlightGuard,
    cooldowns: Mutex<HashMap<Family, Instant>>,
}

impl<T: Transport> CommandDispatcher<T> {
    pub fn new(session: Arc<RemoteSession<T>>, config: Arc<BridgeConfig>) -> Self {
        Self {
            session,
            config,
            object_info_guard: InFlightGuard::new("object_info"),
            view_guard: InFlightGuard::new("view"),
            cooldowns: Mutex::new(HashMap::new()),
        }
    }

    pub fn session(&self) -> &Arc<RemoteSession<T>> {
        &self.session
    }

    /// Send one command. Never retries; a failed exchange only arms the family's backoff.
    pub async fn send(&self, command: Command, refresh: Refresh) -> CommandOutcome {
        let kind = command.kind();
        if !self.session.commands_enabled() {
            tracing::trace!(target: "sky_bridge::dispatch", kind = kind.label(), "command.dropped=offline");
            return CommandOutcome::Dropped(DropReason::Offline);
        }
        if self.cooling_down(Family::Command(kind)) {
            tracing::debug!(target: "sky_bridge::dispatch", kind = kind.label(), "command.dropped=backoff");
            return CommandOutcome::Dropped(DropReason::Backoff);
        }

        let form = command.form();
        let result = expect_success(
            self.session
                .transport()
                .post_form(command.endpoint(), &form)
                .await,
        );

        match result {
            Ok(reply) if command.accepts(&reply) => {
                tracing::debug!(target: "sky_bridge::dispatch", kind = kind.label(), "command.applied");
                if refresh == Refresh::After {
                    if let Err(err) = self.session.fetch_delta().await {
                        tracing::warn!(
                            target: "sky_bridge::dispatch",
                            kind = kind.label(),
                            error = %err,
                            "command.refresh_failed"
                        );
                    }
                }
                CommandOutcome::Applied
            }
            Ok(reply) => {
                tracing::warn!(
                    target: "sky_bridge::dispatch",
                    kind = kind.label(),
                    reply = %reply.trim(),
                    "command.rejected"
                );
                CommandOutcome::Rejected(reply)
            }
            Err(err) => {
                if matches!(err, SyncError::HttpError { .. }) {
                    self.arm_cooldown(Family::Command(kind), self.config.remote.http_backoff());
                }
                tracing::warn!(
                    target: "sky_bridge::dispatch",
                    kind = kind.label(),
                    error = %err,
                    "command.failed"
                );
                CommandOutcome::Failed(err)
            }
        }
    }

    pub async fn run_script(&self, id: impl Into<String>) -> CommandOutcome {
        self.send(Command::RunScript { id: id.into() }, Refresh::After)
            .await
    }

    /// Ask the remote to re-render the skybox snapshot.
    pub async fn run_skybox_script(&self) -> CommandOutcome {
        self.run_script(self.config.skybox_script.clone()).await
    }

    pub async fn set_time(&self, julian_day: f64, time_rate: f64) -> CommandOutcome {
        self.send(
            Command::SetTime {
                julian_day: Some(julian_day),
                time_rate,
            },
            Refresh::After,
        )
        .await
    }

    pub async fn set_time_rate(&self, time_rate: f64) -> CommandOutcome {
        self.send(
            Command::SetTime {
                julian_day: None,
                time_rate,
            },
            Refresh::After,
        )
        .await
    }

    /// Move the clock by `hours` from the mirrored Julian day and stop it.
    pub async fn shift_time(&self, hours: f64) -> CommandOutcome {
        let Some(julian_day) = self.session.julian_day() else {
            tracing::warn!(target: "sky_bridge::dispatch", hours, "time_shift.skipped=no_time");
            return CommandOutcome::Dropped(DropReason::MissingState);
        };
        self.set_time(julian_day + hours / 24.0, 0.0).await
    }

    pub async fn set_fov(&self, fov: f64) -> CommandOutcome {
        self.send(Command::SetFov { fov }, Refresh::After).await
    }

    /// Point the remote view; calls arriving while one is outstanding are dropped.
    pub async fn set_view_direction(&self, az: f64, alt: f64) -> CommandOutcome {
        let Some(_permit) = self.view_guard.try_acquire() else {
            tracing::trace!(target: "sky_bridge::dispatch", "command.dropped=in_flight");
            return CommandOutcome::Dropped(DropReason::InFlight);
        };
        self.send(Command::SetView { az, alt }, Refresh::Skip).await
    }

    pub async fn set_location_by_id(&self, id: impl Into<String>) -> CommandOutcome {
        self.send(Command::SetLocationById { id: id.into() }, Refresh::After)
            .await
    }

    pub async fn do_action(&self, id: impl Into<String>) -> CommandOutcome {
        self.send(Command::DoAction { id: id.into() }, Refresh::After)
            .await
    }

    pub async fn set_property(
        &self,
        id: impl Into<String>,
        value: impl Into<String>,
        refresh: Refresh,
    ) -> CommandOutcome {
        self.send(
            Command::SetProperty {
                id: id.into(),
                value: value.into(),
            },
            refresh,
        )
        .await
    }

    /// Flip a boolean property; values the mirror does not know are left alone.
    pub async fn toggle_property(&self, id: &str) -> CommandOutcome {
        let Some(current) = self.session.property_bool(id) else {
            tracing::warn!(target: "sky_bridge::dispatch", property = id, "property_toggle.skipped=unknown");
            return CommandOutcome::Dropped(DropReason::MissingState);
        };
        self.set_property(id, (!current).to_string(), Refresh::After)
            .await
    }

    /// Push the configured observer site. Only the last command refreshes the mirror.
    pub async fn apply_site_settings(&self) -> CommandOutcome {
        let site = &self.config.site;
        let burst = [
            Command::SetProperty {
                id: "StelCore.currentProjectionTypeKey".into(),
                value: "ProjectionPerspective".into(),
            },
            Command::SetProperty {
                id: "StelMovementMgr.viewportVerticalOffsetTarget".into(),
                value: "0.0".into(),
            },
            Command::SetLocation(site.location()),
            Command::SetProperty {
                id: "StelSkyDrawer.extinctionCoefficient".into(),
                value: site.extinction_coefficient.to_string(),
            },
            Command::SetProperty {
                id: "StelSkyDrawer.atmosphereTemperature".into(),
                value: site.atmosphere_temperature_c.to_string(),
            },
            Command::SetProperty {
                id: "StelSkyDrawer.atmospherePressure".into(),
                value: site.atmosphere_pressure_mbar.to_string(),
            },
            Command::SetProperty {
                id: "StelSkyDrawer.bortleScaleIndex".into(),
                value: site.bortle_index.to_string(),
            },
        ];

        let last = burst.len() - 1;
        let mut failures = 0usize;
        let mut outcome = CommandOutcome::Applied;
        for (index, command) in burst.into_iter().enumerate() {
            let refresh = if index == last { Refresh::After } else { Refresh::Skip };
            outcome = self.send(command, refresh).await;
            if !outcome.is_applied() {
                failures += 1;
            }
        }
        tracing::info!(
            target: "sky_bridge::dispatch",
            site = %site.name,
            failures,
            "site.applied"
        );
        outcome
    }

    /// Fetch one body's info and cache it in the session.
    pub async fn query_object_info(&self, body: Body) -> InfoOutcome {
        if !self.session.is_reachable() {
            return InfoOutcome::Dropped(DropReason::Offline);
        }
        let Some(_permit) = self.object_info_guard.try_acquire() else {
            tracing::trace!(target: "sky_bridge::dispatch", body = %body, "object_info.dropped=in_flight");
            return InfoOutcome::Dropped(DropReason::InFlight);
        };
        if self.cooling_down(Family::ObjectInfo) {
            return InfoOutcome::Dropped(DropReason::Backoff);
        }

        let result = expect_success(
            self.session
                .transport()
                .get(OBJECT_INFO_ENDPOINT, &body.info_query())
                .await,
        )
        .and_then(|text| {
            decode_object_info(&text).map_err(|err| SyncError::InvalidObjectInfo {
                body,
                reason: err.to_string(),
            })
        });

        match result {
            Ok(info) => {
                self.session.store_object_info(body, info.clone());
                InfoOutcome::Fetched(info)
            }
            Err(err) => {
                if !matches!(err, SyncError::Unreachable(_)) {
                    self.arm_cooldown(Family::ObjectInfo, self.config.remote.object_info_backoff());
                }
                tracing::warn!(
                    target: "sky_bridge::dispatch",
                    body = %body,
                    error = %err,
                    "object_info.failed"
                );
                InfoOutcome::Failed(err)
            }
        }
    }

    /// Query Sun, Moon and Venus in turn; stops at the first body that is not fetched.
    pub async fn refresh_light_bodies(&self) -> usize {
        let mut fetched = 0;
        for body in Body::ALL {
            match self.query_object_info(body).await {
                InfoOutcome::Fetched(_) => fetched += 1,
                InfoOutcome::Dropped(_) | InfoOutcome::Failed(_) => break,
            }
        }
        fetched
    }

    fn cooling_down(&self, family: Family) -> bool {
        let mut cooldowns = self.cooldowns.lock();
        match cooldowns.get(&family) {
            Some(until) if Instant::now() < *until => true,
            Some(_) => {
                cooldowns.remove(&family);
                false
            }
            None => false,
        }
    }

    fn arm_cooldown(&self, family: Family, pause: Duration) {
        if pause.is_zero() {
            return;
        }
        self.cooldowns.lock().insert(family, Instant::now() + pause);
    }
}
