//! Evidence readers - best-effort checks of who is playing
//!
//! Each reader inspects one signal (the ALSA substream status, a backend log
//! tail, the MPD player-control utility) and degrades to "no evidence" on
//! any I/O problem. The [`Evidence`] trait is the seam the resolver reads
//! through; [`SystemEvidence`] is the implementation backed by the real
//! system.

pub mod airplay;
pub mod device;
pub mod radio;
pub mod spotify;
pub mod tail;

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::EvidenceConfig;
use crate::error::ResolveError;
use crate::state::Source;

pub use radio::PlayerControl;

/// A `(source, detail)` guess produced by a reader
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reading {
    pub source: Option<Source>,
    pub detail: Option<String>,
}

impl Reading {
    pub fn new(source: Source, detail: Option<String>) -> Self {
        Self {
            source: Some(source),
            detail,
        }
    }

    /// No evidence
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_none(&self) -> bool {
        self.source.is_none()
    }
}

/// Access to every evidence reader
///
/// Readers never report missing evidence as an error. `Err` is reserved
/// for failures of the surrounding machinery (a panicked blocking task).
#[async_trait]
pub trait Evidence: Send + Sync {
    /// PID owning a running audio substream
    async fn owner_pid(&self) -> Result<Option<String>, ResolveError>;

    /// Command line of `pid`
    async fn cmdline(&self, pid: &str) -> Result<Option<String>, ResolveError>;

    /// Confirmed track from the librespot log
    async fn spotify_track(&self) -> Result<Option<String>, ResolveError>;

    /// Connected AirPlay client, or the unknown-device sentinel
    async fn airplay_device(&self) -> Result<String, ResolveError>;

    /// Station and detail from the player-control utility
    async fn radio(&self) -> Result<Reading, ResolveError>;
}

/// Evidence read from procfs, log files and `mpc`
#[derive(Debug, Clone)]
pub struct SystemEvidence {
    config: Arc<EvidenceConfig>,
    player: PlayerControl,
}

impl SystemEvidence {
    pub fn new(config: EvidenceConfig) -> Self {
        let player = PlayerControl::new(&config.mpc_command, config.command_timeout());
        Self {
            config: Arc::new(config),
            player,
        }
    }

    /// Run a blocking filesystem read off the async workers
    async fn blocking<T, F>(reader: &'static str, read: F) -> Result<T, ResolveError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        tokio::task::spawn_blocking(read)
            .await
            .map_err(|source| ResolveError::Task { reader, source })
    }
}

#[async_trait]
impl Evidence for SystemEvidence {
    async fn owner_pid(&self) -> Result<Option<String>, ResolveError> {
        let root = PathBuf::from(&self.config.asound_root);
        Self::blocking("device", move || device::find_running_owner(&root)).await
    }

    async fn cmdline(&self, pid: &str) -> Result<Option<String>, ResolveError> {
        let root = PathBuf::from(&self.config.proc_root);
        let pid = pid.to_string();
        Self::blocking("process", move || device::process_cmdline(&root, &pid)).await
    }

    async fn spotify_track(&self) -> Result<Option<String>, ResolveError> {
        let log = PathBuf::from(&self.config.spotify_log);
        let depth = self.config.spotify_tail_lines;
        Self::blocking("spotify", move || spotify::read_current_track(&log, depth)).await
    }

    async fn airplay_device(&self) -> Result<String, ResolveError> {
        let log = PathBuf::from(&self.config.airplay_log);
        let depth = self.config.airplay_tail_lines;
        Self::blocking("airplay", move || airplay::read_client_device(&log, depth)).await
    }

    async fn radio(&self) -> Result<Reading, ResolveError> {
        Ok(self.player.read().await)
    }
}
