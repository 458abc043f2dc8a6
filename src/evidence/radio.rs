//! Radio reader backed by the MPD player-control utility (`mpc`)
//!
//! `mpc status` prints the current song on its first line and the transport
//! state (`[playing]`, `[paused]`) on the second. Only a playing transport
//! counts as evidence; a stopped or paused player reports nothing even when
//! stale song text is still shown.

use once_cell::sync::Lazy;
use regex::Regex;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use super::Reading;
use crate::state::Source;

const PLAYING_MARKER: &str = "[playing]";
const CURRENT_FILE_FORMAT: &str = "%file%";

/// Host labels that carry no station identity
const DOMAIN_SUFFIXES: &[&str] = &[
    "com", "net", "org", "info", "io", "fm", "am", "tv", "eu", "uk", "co", "de", "fr", "nl", "be",
    "ch", "at", "it", "es", "ru", "us", "ca", "au", "www",
];
const REDUNDANT_KEYWORDS: &[&str] = &["live", "stream", "streams", "streaming", "ice", "icecast"];

static TRANSPORT_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+\*\s+[+-]?\d+\s*$").expect("transport suffix pattern is valid"));

/// Runs player-control queries with a hard timeout
#[derive(Debug, Clone)]
pub struct PlayerControl {
    program: String,
    base_args: Vec<String>,
    timeout: Duration,
}

impl PlayerControl {
    /// `command` is split on whitespace: `"mpc -h localhost"` works
    pub fn new(command: &str, timeout: Duration) -> Self {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().unwrap_or_else(|| "mpc".to_string());
        Self {
            program,
            base_args: parts.collect(),
            timeout,
        }
    }

    /// Query the player and classify what it is playing
    pub async fn read(&self) -> Reading {
        let Some(status) = self.query(&["status"]).await else {
            return Reading::none();
        };

        if !is_playing(&status) {
            debug!("player transport is not playing");
            return Reading::none();
        }

        let first_line = status.lines().next().unwrap_or("").trim();
        if let Some(reading) = classify_status_line(first_line) {
            return reading;
        }

        match self.query(&["current", "-f", CURRENT_FILE_FORMAT]).await {
            Some(current) if !current.trim().is_empty() => classify_current_file(current.trim()),
            _ if !first_line.is_empty() => {
                Reading::new(Source::Radio, Some(strip_transport_suffix(first_line).to_string()))
            }
            _ => Reading::new(Source::Radio, None),
        }
    }

    async fn query(&self, args: &[&str]) -> Option<String> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.base_args)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!(program = %self.program, ?args, "player-control query failed: {}", e);
                return None;
            }
            Err(_) => {
                warn!(
                    program = %self.program,
                    ?args,
                    "player-control query timed out after {:?}",
                    self.timeout
                );
                return None;
            }
        };

        if !output.status.success() {
            warn!(
                program = %self.program,
                ?args,
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "player-control query exited with error"
            );
            return None;
        }

        Some(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// True when any status line reports a playing transport
pub fn is_playing(status: &str) -> bool {
    status
        .lines()
        .any(|line| line.trim_start().starts_with(PLAYING_MARKER))
}

/// Classify the first `mpc status` line as a stream URL or `label: detail`
pub fn classify_status_line(line: &str) -> Option<Reading> {
    if line.is_empty() {
        return None;
    }

    if is_url(line) {
        return station_from_url(line).map(|name| Reading::new(Source::Station(name), None));
    }

    let (label, detail) = line.split_once(':')?;
    let label = label.trim();
    if label.is_empty() {
        return None;
    }
    let detail = strip_transport_suffix(detail.trim());
    let detail = (!detail.is_empty()).then(|| detail.to_string());
    Some(Reading::new(Source::Station(label.to_string()), detail))
}

fn classify_current_file(current: &str) -> Reading {
    if is_url(current) {
        if let Some(name) = station_from_url(current) {
            return Reading::new(Source::Station(name), None);
        }
    }
    Reading::new(Source::Radio, Some(strip_transport_suffix(current).to_string()))
}

fn is_url(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Derive an uppercase station name from a stream URL
///
/// `http://mystream.live.example.com:8000/` becomes `MYSTREAM EXAMPLE`.
pub fn station_from_url(url: &str) -> Option<String> {
    let rest = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or("");
    let host_port = authority.rsplit('@').next().unwrap_or(authority);
    let host = host_port.split(':').next().unwrap_or("").trim_end_matches('.');
    if host.is_empty() {
        return None;
    }

    let labels: Vec<String> = host
        .split(['.', '-'])
        .map(str::to_ascii_lowercase)
        .filter(|label| !label.is_empty())
        .filter(|label| !DOMAIN_SUFFIXES.contains(&label.as_str()))
        .filter(|label| !REDUNDANT_KEYWORDS.contains(&label.as_str()))
        .filter(|label| !label.chars().all(|c| c.is_ascii_digit()))
        .collect();

    if labels.is_empty() {
        Some(host.to_ascii_uppercase())
    } else {
        Some(labels.join(" ").to_ascii_uppercase())
    }
}

/// Drop a trailing ` * <signed integer>` transport annotation
pub fn strip_transport_suffix(detail: &str) -> &str {
    match TRANSPORT_SUFFIX_RE.find(detail) {
        Some(m) => detail[..m.start()].trim_end(),
        None => detail.trim_end(),
    }
}
