//! State resolver - combines device ownership with backend evidence
//!
//! One call to [`StateResolver::resolve`] produces one [`AudioState`]:
//!
//! 1. no running substream: clear the cache, report idle
//! 2. owner command line unreadable: report the PID alone
//! 3. classify the command line into a backend
//! 4. ask that backend's reader (through the cache) for source and detail

use std::sync::Arc;
use tracing::{debug, trace};

use crate::cache::{ReadCache, AIRPLAY_KEY, RADIO_KEY, SPOTIFY_KEY};
use crate::error::ResolveError;
use crate::evidence::airplay::UNKNOWN_DEVICE;
use crate::evidence::{Evidence, Reading};
use crate::state::{AudioState, Source};

/// Backend family owning the audio device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Spotify,
    AirPlay,
    Radio,
    Unknown,
}

/// Maps an owner command line to a backend
pub type Classifier = fn(&str) -> Backend;

/// Process-name substrings, checked in order; first match wins
const BACKEND_PATTERNS: &[(&str, Backend)] = &[
    ("librespot", Backend::Spotify),
    ("shairport-sync", Backend::AirPlay),
    ("mpd", Backend::Radio),
];

/// Default classification by substring match on the command line
pub fn classify_cmdline(cmdline: &str) -> Backend {
    BACKEND_PATTERNS
        .iter()
        .find(|(pattern, _)| cmdline.contains(pattern))
        .map(|(_, backend)| *backend)
        .unwrap_or(Backend::Unknown)
}

/// Resolves the current audio state, reading evidence through the cache
#[derive(Clone)]
pub struct StateResolver {
    evidence: Arc<dyn Evidence>,
    cache: ReadCache<Reading>,
    classify: Classifier,
}

impl StateResolver {
    pub fn new(evidence: Arc<dyn Evidence>, cache: ReadCache<Reading>) -> Self {
        Self {
            evidence,
            cache,
            classify: classify_cmdline,
        }
    }

    /// Replace the command-line classification policy
    pub fn with_classifier(mut self, classify: Classifier) -> Self {
        self.classify = classify;
        self
    }

    pub fn cache(&self) -> &ReadCache<Reading> {
        &self.cache
    }

    /// Compute a fresh snapshot
    pub async fn resolve(&self) -> Result<AudioState, ResolveError> {
        let Some(pid) = self.evidence.owner_pid().await? else {
            self.cache.clear();
            trace!("no running audio substream");
            return Ok(AudioState::idle());
        };

        let Some(cmdline) = self.evidence.cmdline(&pid).await? else {
            debug!(pid = %pid, "audio owner could not be identified");
            return Ok(AudioState::unidentified(pid));
        };

        let backend = (self.classify)(&cmdline);
        trace!(pid = %pid, ?backend, "classified audio owner");

        let reading = match backend {
            Backend::Spotify => self.spotify().await?,
            Backend::AirPlay => self.airplay().await?,
            Backend::Radio => self.radio().await?,
            Backend::Unknown => Reading::new(Source::Unknown, Some(format!("PID: {}", pid))),
        };

        Ok(AudioState::new(Some(pid), reading.source, reading.detail))
    }

    async fn spotify(&self) -> Result<Reading, ResolveError> {
        if let Some(reading) = self.cache.get(SPOTIFY_KEY) {
            return Ok(reading);
        }

        let track = self.evidence.spotify_track().await?;
        let reading = Reading::new(Source::Spotify, track);
        if reading.detail.is_some() {
            self.cache.set(SPOTIFY_KEY, reading.clone());
        }
        Ok(reading)
    }

    async fn airplay(&self) -> Result<Reading, ResolveError> {
        if let Some(reading) = self.cache.get(AIRPLAY_KEY) {
            return Ok(reading);
        }

        // The sentinel is not cached; a client may connect any moment
        let device = self.evidence.airplay_device().await?;
        let named = device != UNKNOWN_DEVICE;
        let reading = Reading::new(Source::AirPlay, Some(device));
        if named {
            self.cache.set(AIRPLAY_KEY, reading.clone());
        }
        Ok(reading)
    }

    async fn radio(&self) -> Result<Reading, ResolveError> {
        if let Some(reading) = self.cache.get(RADIO_KEY) {
            return Ok(reading);
        }

        // Absent readings stay uncached so the next cycle asks again
        let reading = self.evidence.radio().await?;
        if !reading.is_none() {
            self.cache.set(RADIO_KEY, reading.clone());
        }
        Ok(reading)
    }
}
