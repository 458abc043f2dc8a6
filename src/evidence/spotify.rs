//! Streaming-service (librespot) reader
//!
//! librespot logs `Loading <title> with Spotify URI ...` when it fetches a
//! track and `kPlayStatusPlay` once playback actually starts. Scanning the
//! tail newest-first, a `Loading` line only counts after a play marker has
//! been seen, so queued-but-unplayed tracks are never reported.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::debug;

use super::tail::read_tail_lines;

const PLAY_MARKER: &str = "kPlayStatusPlay";
const LOADING_MARKER: &str = "Loading <";

static LOADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Loading <(.+?)> with").expect("loading pattern is valid"));

/// Most recent confirmed track in `lines` (oldest first)
pub fn confirmed_track<S: AsRef<str>>(lines: &[S]) -> Option<String> {
    let mut playing = false;

    for line in lines.iter().rev().map(AsRef::as_ref) {
        if line.contains(PLAY_MARKER) {
            playing = true;
            continue;
        }

        if playing && line.contains(LOADING_MARKER) {
            if let Some(caps) = LOADING_RE.captures(line) {
                return caps.get(1).map(|m| m.as_str().to_string());
            }
        }
    }
    None
}

/// Read the log tail and return the confirmed track, if any
pub fn read_current_track(log_path: &Path, max_lines: usize) -> Option<String> {
    match read_tail_lines(log_path, max_lines) {
        Ok(lines) => {
            let track = confirmed_track(&lines);
            if track.is_none() {
                debug!(log = %log_path.display(), "no confirmed track in log tail");
            }
            track
        }
        Err(e) => {
            debug!(log = %log_path.display(), "cannot read librespot log: {}", e);
            None
        }
    }
}
