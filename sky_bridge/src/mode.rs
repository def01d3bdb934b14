use std::fmt;

use crate::error::SyncError;
use crate::session::DeltaOutcome;

/// Which provider currently feeds the light.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BridgeMode {
    /// Remote session plus dispatcher drive a direct view.
    Live,
    /// Pre-baked snapshot only; no outbound commands.
    #[default]
    Snapshot,
}

impl fmt::Display for BridgeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BridgeMode::Live => "live",
            BridgeMode::Snapshot => "snapshot",
        })
    }
}

/// The two mutually exclusive ways the scene background is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackgroundStrategy {
    /// Cube-mapped skybox rendered from the snapshot.
    Skybox,
    /// The remote view streamed behind the scene.
    DirectView,
}

impl BackgroundStrategy {
    pub fn for_mode(mode: BridgeMode) -> Self {
        match mode {
            BridgeMode::Live => BackgroundStrategy::DirectView,
            BridgeMode::Snapshot => BackgroundStrategy::Skybox,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionReason {
    Connected,
    UserToggle,
    Unreachable,
    Malformed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeTransition {
    pub from: BridgeMode,
    pub to: BridgeMode,
    pub background: BackgroundStrategy,
    pub reason: TransitionReason,
}

/// Tracks the active mode and keeps the background strategy in step with it.
///
/// `Snapshot -> Live` needs both the live flag and a successful full fetch.
/// Any fallback to `Snapshot` clears the flag.
#[derive(Debug, Clone)]
pub struct ModeCoordinator {
    mode: BridgeMode,
    background: BackgroundStrategy,
    live_requested: bool,
    consecutive_failures: u32,
    failure_threshold: u32,
    transitions: u64,
}

impl Default for ModeCoordinator {
    fn default() -> Self {
        Self::new(3)
    }
}

impl ModeCoordinator {
    pub fn new(failure_threshold: u32) -> Self {
        Self {
            mode: BridgeMode::Snapshot,
            background: BackgroundStrategy::Skybox,
            live_requested: false,
            consecutive_failures: 0,
            failure_threshold: failure_threshold.max(1),
            transitions: 0,
        }
    }

    pub fn mode(&self) -> BridgeMode {
        self.mode
    }

    pub fn background(&self) -> BackgroundStrategy {
        self.background
    }

    pub fn live_requested(&self) -> bool {
        self.live_requested
    }

    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    /// Set the live flag. The switch itself waits for [`Self::on_connected`].
    pub fn request_live(&mut self) {
        self.live_requested = true;
    }

    pub fn request_snapshot(&mut self) -> Option<ModeTransition> {
        self.live_requested = false;
        self.switch(BridgeMode::Snapshot, TransitionReason::UserToggle)
    }

    /// Flip the live flag; returns a transition only when leaving live mode.
    pub fn toggle(&mut self) -> Option<ModeTransition> {
        if self.live_requested {
            self.request_snapshot()
        } else {
            self.request_live();
            None
        }
    }

    /// A full fetch succeeded.
    pub fn on_connected(&mut self) -> Option<ModeTransition> {
        self.consecutive_failures = 0;
        if self.live_requested {
            self.switch(BridgeMode::Live, TransitionReason::Connected)
        } else {
            None
        }
    }

    pub fn on_initialize_failed(&mut self, err: &SyncError) -> Option<ModeTransition> {
        tracing::warn!(target: "sky_bridge::mode", error = %err, "mode.live_unavailable");
        self.fall_back(reason_for(err))
    }

    /// Fold one poll result in; persistent connectivity loss or a malformed delta ends live mode.
    pub fn on_sync_result(&mut self, result: &Result<DeltaOutcome, SyncError>) -> Option<ModeTransition> {
        match result {
            Ok(_) => {
                self.consecutive_failures = 0;
                None
            }
            Err(err) if err.requires_resync() => self.fall_back(TransitionReason::Malformed),
            Err(err) if err.is_connectivity() => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.failure_threshold {
                    self.fall_back(TransitionReason::Unreachable)
                } else {
                    None
                }
            }
            Err(_) => None,
        }
    }

    fn fall_back(&mut self, reason: TransitionReason) -> Option<ModeTransition> {
        self.live_requested = false;
        self.consecutive_failures = 0;
        self.switch(BridgeMode::Snapshot, reason)
    }

    fn switch(&mut self, to: BridgeMode, reason: TransitionReason) -> Option<ModeTransition> {
        if self.mode == to {
            return None;
        }
        let transition = ModeTransition {
            from: self.mode,
            to,
            background: BackgroundStrategy::for_mode(to),
            reason,
        };
        self.mode = to;
        self.background = transition.background;
        self.transitions += 1;
        tracing::info!(
            target: "sky_bridge::mode",
            from = %transition.from,
            to = %transition.to,
            reason = ?reason,
            "mode.transition"
        );
        Some(transition)
    }
}

fn reason_for(err: &SyncError) -> TransitionReason {
    if err.requires_resync() {
        TransitionReason::Malformed
    } else {
        TransitionReason::Unreachable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sky_proto::ChangeIds;

    fn unreachable() -> Result<DeltaOutcome, SyncError> {
        Err(SyncError::Unreachable("refused".into()))
    }

    fn live() -> ModeCoordinator {
        let mut coordinator = ModeCoordinator::new(3);
        coordinator.request_live();
        coordinator.on_connected().expect("enters live");
        coordinator
    }

    #[test]
    fn starts_in_snapshot_with_skybox() {
        let coordinator = ModeCoordinator::default();
        assert_eq!(coordinator.mode(), BridgeMode::Snapshot);
        assert_eq!(coordinator.background(), BackgroundStrategy::Skybox);
    }

    #[test]
    fn live_needs_flag_and_connection() {
        let mut coordinator = ModeCoordinator::new(3);
        assert!(coordinator.on_connected().is_none());
        assert_eq!(coordinator.mode(), BridgeMode::Snapshot);

        coordinator.request_live();
        assert_eq!(coordinator.mode(), BridgeMode::Snapshot);
        let transition = coordinator.on_connected().expect("transition");
        assert_eq!(transition.to, BridgeMode::Live);
        assert_eq!(coordinator.background(), BackgroundStrategy::DirectView);
    }

    #[test]
    fn failed_initialize_clears_flag() {
        let mut coordinator = ModeCoordinator::new(3);
        coordinator.request_live();
        assert!(coordinator
            .on_initialize_failed(&SyncError::Unreachable("refused".into()))
            .is_none());
        assert!(!coordinator.live_requested());
        assert!(coordinator.on_connected().is_none());
    }

    #[test]
    fn malformed_delta_falls_back_immediately() {
        let mut coordinator = live();
        let transition = coordinator
            .on_sync_result(&Err(SyncError::MalformedDelta("empty".into())))
            .expect("fallback");
        assert_eq!(transition.reason, TransitionReason::Malformed);
        assert_eq!(coordinator.background(), BackgroundStrategy::Skybox);
    }

    #[test]
    fn unreachable_falls_back_only_when_persistent() {
        let mut coordinator = live();
        assert!(coordinator.on_sync_result(&unreachable()).is_none());
        assert!(coordinator.on_sync_result(&unreachable()).is_none());
        assert!(coordinator
            .on_sync_result(&Ok(DeltaOutcome::Applied(ChangeIds::new(1, 1))))
            .is_none());
        assert!(coordinator.on_sync_result(&unreachable()).is_none());
        assert!(coordinator.on_sync_result(&unreachable()).is_none());
        let transition = coordinator.on_sync_result(&unreachable()).expect("fallback");
        assert_eq!(transition.reason, TransitionReason::Unreachable);
        assert_eq!(coordinator.mode(), BridgeMode::Snapshot);
    }

    #[test]
    fn toggle_leaves_live() {
        let mut coordinator = live();
        let transition = coordinator.toggle().expect("leaves live");
        assert_eq!(transition.reason, TransitionReason::UserToggle);
        assert!(coordinator.toggle().is_none());
        assert!(coordinator.live_requested());
        assert_eq!(coordinator.transitions(), 2);
    }

    #[test]
    fn background_always_matches_mode() {
        let mut coordinator = live();
        for step in 0..10 {
            if step % 3 == 0 {
                coordinator.toggle();
            } else {
                coordinator.on_connected();
            }
            assert_eq!(
                coordinator.background(),
                BackgroundStrategy::for_mode(coordinator.mode())
            );
        }
    }
}
