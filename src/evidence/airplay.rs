//! AirPlay (shairport-sync) reader
//!
//! An AirPlay session is active whenever shairport-sync owns the device, so
//! this reader never reports "inactive": when no client name can be found it
//! falls back to [`UNKNOWN_DEVICE`].

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::debug;

use super::tail::read_tail_lines;

/// Detail reported when the client name is not in the log tail
pub const UNKNOWN_DEVICE: &str = "Unknown device";

const CONNECTION_MARKER: &str = "connection from";

static CLIENT_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\("([^"]+)"\)"#).expect("client name pattern is valid"));

/// Name of the most recently connected client in `lines` (oldest first)
pub fn connected_client<S: AsRef<str>>(lines: &[S]) -> Option<String> {
    lines
        .iter()
        .rev()
        .map(AsRef::as_ref)
        .filter(|line| line.contains(CONNECTION_MARKER))
        .find_map(|line| {
            CLIENT_NAME_RE
                .captures(line)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
        })
}

/// Read the log tail and return the client name or the sentinel
pub fn read_client_device(log_path: &Path, max_lines: usize) -> String {
    match read_tail_lines(log_path, max_lines) {
        Ok(lines) => connected_client(&lines).unwrap_or_else(|| {
            debug!(log = %log_path.display(), "no AirPlay client in log tail");
            UNKNOWN_DEVICE.to_string()
        }),
        Err(e) => {
            debug!(log = %log_path.display(), "cannot read shairport-sync log: {}", e);
            UNKNOWN_DEVICE.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CONNECT: &str =
        r#"Connection 1: New connection from 192.168.1.20:49152 ("Kitchen iPhone") to self at 192.168.1.5:7000."#;

    #[test]
    fn test_extracts_quoted_client() {
        let lines = vec!["startup", CONNECT, "Connection 1: Playback started"];
        assert_eq!(connected_client(&lines), Some("Kitchen iPhone".to_string()));
    }

    #[test]
    fn test_latest_connection_wins() {
        let newer = CONNECT.replace("Kitchen iPhone", "Living Room Mac");
        let lines = vec![CONNECT.to_string(), newer];
        assert_eq!(connected_client(&lines), Some("Living Room Mac".to_string()));
    }

    #[test]
    fn test_connection_without_name_is_skipped() {
        let lines = vec![
            CONNECT.to_string(),
            "Connection 2: New connection from 10.0.0.2:1000 to self".to_string(),
        ];
        assert_eq!(connected_client(&lines), Some("Kitchen iPhone".to_string()));
    }

    #[test]
    fn test_sentinel_when_no_match_or_no_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Connection 1: Playback started").unwrap();
        file.flush().unwrap();
        assert_eq!(read_client_device(file.path(), 30), UNKNOWN_DEVICE);

        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_client_device(&dir.path().join("missing.log"), 30), UNKNOWN_DEVICE);
    }

    #[test]
    fn test_reads_from_log_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", CONNECT).unwrap();
        file.flush().unwrap();
        assert_eq!(read_client_device(file.path(), 30), "Kitchen iPhone");
    }
}
