//! Interval files
//!
//! Timelines are exchanged as a JSON array of
//! `{level, locator, message, from, to}` objects with RFC 3339 timestamps.

use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::Result;
use crate::interval::Intervals;

/// Render a timeline as a pretty-printed JSON array.
pub fn intervals_to_json(intervals: &Intervals) -> Result<String> {
    Ok(serde_json::to_string_pretty(intervals)?)
}

/// Parse a JSON array of intervals.
pub fn intervals_from_json(json: &str) -> Result<Intervals> {
    Ok(serde_json::from_str(json)?)
}

/// Write a timeline to `path`, replacing any existing file.
pub fn write_intervals_file(path: &Path, intervals: &Intervals) -> Result<()> {
    let file = fs::File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, intervals)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Read a timeline written by [`write_intervals_file`] or any producer of
/// the same schema.
pub fn read_intervals_file(path: &Path) -> Result<Intervals> {
    let file = fs::File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::interval::{Condition, EventInterval};
    use chrono::{TimeZone, Utc};

    fn sample() -> Intervals {
        let at = |s: i64| Utc.timestamp_opt(1_700_000_000 + s, 0).unwrap();
        vec![
            EventInterval::instant(Condition::info("ns/a pod/b", "reason/Created"), at(0)),
            EventInterval::new(
                Condition::warning("ns/a pod/b", "pathological/true reason/X (21 times)"),
                at(5),
                at(6),
            ),
        ]
        .into()
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("e2e-events.json");
        write_intervals_file(&path, &sample()).unwrap();
        assert_eq!(read_intervals_file(&path).unwrap(), sample());
    }

    #[test]
    fn reads_foreign_producer_schema() {
        let json = r#"[
            {"level":"Error","locator":"ns/x","message":"boom",
             "from":"2024-03-01T10:00:00Z","to":"2024-03-01T10:00:05.250Z"}
        ]"#;
        let intervals = intervals_from_json(json).unwrap();
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].message(), "boom");
        assert!(!intervals[0].is_instant());
    }

    #[test]
    fn empty_timeline_is_an_empty_array() {
        let json = intervals_to_json(&Intervals::new()).unwrap();
        assert_eq!(json, "[]");
    }

    #[test]
    fn malformed_input_is_a_json_error() {
        assert!(matches!(intervals_from_json("{"), Err(Error::Json(_))));
        let missing = Path::new("/nonexistent/clustermon/intervals.json");
        assert!(matches!(read_intervals_file(missing), Err(Error::Io(_))));
    }
}
