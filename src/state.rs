//! Audio ownership snapshot
//!
//! An [`AudioState`] captures who owns the audio device at one instant:
//! the owning PID, the backend that PID belongs to, and a backend-specific
//! detail string (track title, AirPlay client name, radio station).
//! Snapshots are immutable and compared by value, ignoring when they were
//! taken.

use chrono::{DateTime, Local};
use std::fmt;

/// Playback source classification
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Source {
    Spotify,
    AirPlay,
    Radio,
    Unknown,
    /// Station label reported by the player-control utility
    Station(String),
}

impl Source {
    /// Label published on the source topic
    pub fn as_str(&self) -> &str {
        match self {
            Source::Spotify => "Spotify",
            Source::AirPlay => "AirPlay",
            Source::Radio => "Radio",
            Source::Unknown => "Unknown",
            Source::Station(name) => name,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of audio device ownership
#[derive(Debug, Clone)]
pub struct AudioState {
    owner_pid: Option<String>,
    source: Option<Source>,
    detail: Option<String>,
    observed_at: DateTime<Local>,
}

impl AudioState {
    /// Build a snapshot stamped with the current time.
    ///
    /// A detail without a source is dropped.
    pub fn new(owner_pid: Option<String>, source: Option<Source>, detail: Option<String>) -> Self {
        Self::observed(owner_pid, source, detail, Local::now())
    }

    /// Build a snapshot with an explicit observation time
    pub fn observed(
        owner_pid: Option<String>,
        source: Option<Source>,
        detail: Option<String>,
        observed_at: DateTime<Local>,
    ) -> Self {
        let detail = if source.is_some() { detail } else { None };
        Self {
            owner_pid,
            source,
            detail,
            observed_at,
        }
    }

    /// No device is running
    pub fn idle() -> Self {
        Self::new(None, None, None)
    }

    /// Device is claimed but the owner could not be identified
    pub fn unidentified(owner_pid: impl Into<String>) -> Self {
        Self::new(Some(owner_pid.into()), None, None)
    }

    pub fn owner_pid(&self) -> Option<&str> {
        self.owner_pid.as_deref()
    }

    pub fn source(&self) -> Option<&Source> {
        self.source.as_ref()
    }

    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    pub fn observed_at(&self) -> DateTime<Local> {
        self.observed_at
    }

    /// True when no process holds the audio device
    pub fn is_idle(&self) -> bool {
        self.owner_pid.is_none()
    }

    /// Source label as published (empty when absent)
    pub fn source_label(&self) -> &str {
        self.source.as_ref().map(Source::as_str).unwrap_or("")
    }

    /// Detail as published (empty when absent)
    pub fn detail_label(&self) -> &str {
        self.detail.as_deref().unwrap_or("")
    }
}

impl Default for AudioState {
    fn default() -> Self {
        Self::idle()
    }
}

impl PartialEq for AudioState {
    fn eq(&self, other: &Self) -> bool {
        self.owner_pid == other.owner_pid
            && self.source == other.source
            && self.detail == other.detail
    }
}

impl Eq for AudioState {}

impl fmt::Display for AudioState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            None => f.write_str("No active playback"),
            Some(source) => write!(
                f,
                "Source: {} | Details: {}",
                source,
                self.detail.as_deref().unwrap_or("-")
            ),
        }
    }
}
