//! Device ownership and process identity
//!
//! Walks `<asound_root>/card*/pcm*/sub*/status` looking for a running
//! substream and reads the owning process command line from
//! `<proc_root>/<pid>/cmdline`.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

static OWNER_PID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"owner_pid\s*:\s*(\d+)").expect("owner_pid pattern is valid"));

const RUNNING_MARKER: &str = "state: RUNNING";

/// PID owning the first running substream, if any
pub fn find_running_owner(asound_root: &Path) -> Option<String> {
    for status_path in substream_status_files(asound_root) {
        let content = match fs::read_to_string(&status_path) {
            Ok(content) => content,
            Err(e) => {
                debug!(path = %status_path.display(), "cannot read substream status: {}", e);
                continue;
            }
        };

        if let Some(pid) = running_owner(&content) {
            debug!(path = %status_path.display(), pid = %pid, "running substream found");
            return Some(pid);
        }
    }
    None
}

/// Extract the owner PID from one status file if the substream is running
pub fn running_owner(status: &str) -> Option<String> {
    if !status.contains(RUNNING_MARKER) {
        return None;
    }
    OWNER_PID_RE
        .captures(status)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Command line of `pid` with NUL separators turned into spaces
pub fn process_cmdline(proc_root: &Path, pid: &str) -> Option<String> {
    if pid.is_empty() || !pid.chars().all(|c| c.is_ascii_digit()) {
        debug!(pid, "refusing non-numeric pid");
        return None;
    }

    let path = proc_root.join(pid).join("cmdline");
    match fs::read(&path) {
        Ok(raw) => {
            let cmdline = String::from_utf8_lossy(&raw).replace('\0', " ");
            let cmdline = cmdline.trim();
            if cmdline.is_empty() {
                None
            } else {
                Some(cmdline.to_string())
            }
        }
        Err(e) => {
            debug!(path = %path.display(), "cannot read process cmdline: {}", e);
            None
        }
    }
}

fn substream_status_files(asound_root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for card in children_with_prefix(asound_root, "card") {
        for pcm in children_with_prefix(&card, "pcm") {
            for sub in children_with_prefix(&pcm, "sub") {
                files.push(sub.join("status"));
            }
        }
    }
    files
}

fn children_with_prefix(dir: &Path, prefix: &str) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %dir.display(), "cannot list directory: {}", e);
            return Vec::new();
        }
    };

    let mut children: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(prefix))
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    children.sort();
    children
}
