//! Bounded log tail reader
//!
//! Reads a file backwards in fixed-size chunks until enough newlines have
//! been seen, so the cost of a read depends on the tail depth and not on
//! the size of the log.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

const CHUNK_SIZE: u64 = 8 * 1024;

/// Return at most the last `max_lines` lines of `path`, oldest first
pub fn read_tail_lines(path: &Path, max_lines: usize) -> io::Result<Vec<String>> {
    if max_lines == 0 {
        return Ok(Vec::new());
    }

    let mut file = File::open(path)?;
    let mut pos = file.metadata()?.len();
    let mut buf: Vec<u8> = Vec::new();
    let mut newlines = 0usize;

    // One extra newline guarantees the first kept line is complete
    while pos > 0 && newlines <= max_lines {
        let step = CHUNK_SIZE.min(pos);
        pos -= step;
        file.seek(SeekFrom::Start(pos))?;

        let mut chunk = vec![0u8; step as usize];
        file.read_exact(&mut chunk)?;
        newlines += chunk.iter().filter(|b| **b == b'\n').count();

        chunk.extend_from_slice(&buf);
        buf = chunk;
    }

    let text = String::from_utf8_lossy(&buf);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    Ok(lines[start..].iter().map(|line| line.to_string()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn log_with(lines: &[String]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_short_file_returns_everything() {
        let file = log_with(&["a".into(), "b".into()]);
        let lines = read_tail_lines(file.path(), 10).unwrap();
        assert_eq!(lines, vec!["a", "b"]);
    }

    #[test]
    fn test_tail_spans_multiple_chunks() {
        let lines: Vec<String> = (0..5_000).map(|i| format!("line {:05} {}", i, "x".repeat(40))).collect();
        let file = log_with(&lines);

        let tail = read_tail_lines(file.path(), 100).unwrap();
        assert_eq!(tail.len(), 100);
        assert_eq!(tail.first().unwrap(), &lines[4_900]);
        assert_eq!(tail.last().unwrap(), &lines[4_999]);
    }

    #[test]
    fn test_missing_trailing_newline() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "one\ntwo\nthree").unwrap();
        file.flush().unwrap();

        let tail = read_tail_lines(file.path(), 2).unwrap();
        assert_eq!(tail, vec!["two", "three"]);
    }

    #[test]
    fn test_zero_depth_and_empty_file() {
        let file = log_with(&["a".into()]);
        assert!(read_tail_lines(file.path(), 0).unwrap().is_empty());

        let empty = NamedTempFile::new().unwrap();
        assert!(read_tail_lines(empty.path(), 5).unwrap().is_empty());
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_tail_lines(&dir.path().join("nope.log"), 5).is_err());
    }
}
