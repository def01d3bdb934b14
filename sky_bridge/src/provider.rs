use std::sync::Arc;

use async_trait::async_trait;

use crate::dispatcher::CommandDispatcher;
use crate::error::SyncError;
use crate::mode::BridgeMode;
use crate::snapshot::SnapshotSource;
use crate::state::SkyState;
use crate::transport::Transport;

/// A source of complete [`SkyState`]s; the mode coordinator picks one at runtime.
#[async_trait]
pub trait SkyStateProvider: Send + Sync {
    fn mode(&self) -> BridgeMode;

    async fn current(&self) -> Result<SkyState, SyncError>;
}

/// Live state: refreshes the three light bodies, then assembles them with the mirrored clock.
pub struct NetworkProvider<T: Transport> {
    dispatcher: Arc<CommandDispatcher<T>>,
}

impl<T: Transport> NetworkProvider<T> {
    pub fn new(dispatcher: Arc<CommandDispatcher<T>>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl<T: Transport> SkyStateProvider for NetworkProvider<T> {
    fn mode(&self) -> BridgeMode {
        BridgeMode::Live
    }

    async fn current(&self) -> Result<SkyState, SyncError> {
        self.dispatcher.refresh_light_bodies().await;
        self.dispatcher
            .session()
            .sky_state()
            .ok_or(SyncError::Unknown)
    }
}

pub struct SnapshotProvider {
    source: SnapshotSource,
}

impl SnapshotProvider {
    pub fn new(source: SnapshotSource) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &SnapshotSource {
        &self.source
    }
}

#[async_trait]
impl SkyStateProvider for SnapshotProvider {
    fn mode(&self) -> BridgeMode {
        BridgeMode::Snapshot
    }

    async fn current(&self) -> Result<SkyState, SyncError> {
        Ok(self.source.load().await?)
    }
}
