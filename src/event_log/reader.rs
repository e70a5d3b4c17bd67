// Reading a detection log back into a HistoryRecord
//
// Current rows carry `timestamp,value,kind,timely`. Older logs only stored
// `timestamp,value`; for those the kind is recovered from alternation,
// anchored on the nearest row with an explicit kind or, failing that, on the
// direction of the first value step.

use std::path::Path;

use crate::acquisition::replay::{parse_timestamp, parse_value};
use crate::analysis::history::{DetectionEvent, ExtremumKind, HistoryRecord, Timeliness};
use crate::error::CalibrationError;

struct Row {
    timestamp: i64,
    value: f64,
    kind: Option<ExtremumKind>,
    timely: Option<Timeliness>,
}

fn parse_kind(field: &str) -> Option<ExtremumKind> {
    match field.trim().to_ascii_lowercase().as_str() {
        "peak" => Some(ExtremumKind::Peak),
        "trough" => Some(ExtremumKind::Trough),
        _ => None,
    }
}

fn parse_timely(field: &str) -> Option<Timeliness> {
    match field.trim().to_ascii_lowercase().as_str() {
        "immediate" => Some(Timeliness::Immediate),
        "delayed" => Some(Timeliness::Delayed),
        _ => None,
    }
}

/// Read a detection log written by the event logger
///
/// The log does not store confirmation lag; reconstructed events get the
/// smallest lag consistent with their timeliness (1 or 2).
pub fn read_event_log<P: AsRef<Path>>(path: P) -> Result<HistoryRecord, CalibrationError> {
    let path_display = path.as_ref().display().to_string();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path.as_ref())
        .map_err(|e| CalibrationError::SourceUnreadable {
            path: path_display.clone(),
            reason: e.to_string(),
        })?;

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let line = index as u64 + 1;
        let record = record.map_err(|e| CalibrationError::SourceUnreadable {
            path: path_display.clone(),
            reason: e.to_string(),
        })?;

        let timestamp = record.get(0).and_then(parse_timestamp);
        let value = record.get(1).and_then(parse_value);
        let (timestamp, value) = match (timestamp, value) {
            (Some(t), Some(v)) => (t, v),
            _ => {
                return Err(CalibrationError::Unparseable {
                    line,
                    reason: "expected numeric timestamp and value".to_string(),
                })
            }
        };

        let kind = match record.get(2).filter(|f| !f.is_empty()) {
            Some(field) => Some(parse_kind(field).ok_or_else(|| CalibrationError::Unparseable {
                line,
                reason: format!("unknown kind {:?}", field),
            })?),
            None => None,
        };
        let timely = record.get(3).and_then(parse_timely);

        rows.push(Row {
            timestamp,
            value,
            kind,
            timely,
        });
    }

    let Some(mut kind) = first_kind(&rows) else {
        return Ok(HistoryRecord::new());
    };

    let mut events = Vec::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        if index > 0 {
            kind = row.kind.unwrap_or_else(|| kind.opposite());
        }
        let timely = row.timely.unwrap_or(Timeliness::Immediate);
        events.push(DetectionEvent {
            kind,
            timestamp: row.timestamp,
            value: row.value,
            timely,
            lag: match timely {
                Timeliness::Immediate => 1,
                Timeliness::Delayed => 2,
            },
        });
    }

    HistoryRecord::from_events(events)
}

/// Kind of the first row, inferred when the row does not state it
fn first_kind(rows: &[Row]) -> Option<ExtremumKind> {
    let first = rows.first()?;
    if let Some(kind) = first.kind {
        return Some(kind);
    }

    if let Some((index, kind)) = rows
        .iter()
        .enumerate()
        .find_map(|(i, row)| row.kind.map(|k| (i, k)))
    {
        return Some(if index % 2 == 0 { kind } else { kind.opposite() });
    }

    match rows.get(1) {
        Some(second) if second.value > first.value => Some(ExtremumKind::Trough),
        _ => Some(ExtremumKind::Peak),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_file(contents: &str) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), contents).unwrap();
        file
    }

    fn kinds(history: &HistoryRecord) -> Vec<ExtremumKind> {
        history.events().iter().map(|e| e.kind).collect()
    }

    #[test]
    fn test_reads_current_format() {
        let file = log_file("40,2.0,peak,immediate\n60,0.0,trough,delayed\n");
        let history = read_event_log(file.path()).unwrap();

        assert_eq!(kinds(&history), vec![ExtremumKind::Peak, ExtremumKind::Trough]);
        assert_eq!(history.events()[1].timely, Timeliness::Delayed);
        assert_eq!(history.events()[1].lag, 2);
    }

    #[test]
    fn test_legacy_rows_infer_kind_from_first_step() {
        let rising = log_file("0,0.0\n10,1.0\n20,0.1\n");
        assert_eq!(
            kinds(&read_event_log(rising.path()).unwrap()),
            vec![ExtremumKind::Trough, ExtremumKind::Peak, ExtremumKind::Trough]
        );

        let falling = log_file("0,1.0\n10,0.0\n");
        assert_eq!(
            kinds(&read_event_log(falling.path()).unwrap()),
            vec![ExtremumKind::Peak, ExtremumKind::Trough]
        );
    }

    #[test]
    fn test_mixed_rows_anchor_on_explicit_kind() {
        let file = log_file("0,5.0\n10,6.0\n20,4.0,peak,immediate\n");
        assert_eq!(
            kinds(&read_event_log(file.path()).unwrap()),
            vec![ExtremumKind::Peak, ExtremumKind::Trough, ExtremumKind::Peak]
        );
    }

    #[test]
    fn test_conflicting_kinds_rejected() {
        let file = log_file("0,1.0,peak,immediate\n10,2.0,peak,immediate\n");
        assert_eq!(
            read_event_log(file.path()),
            Err(CalibrationError::NonAlternating { index: 1 })
        );
    }

    #[test]
    fn test_bad_rows_report_line() {
        let file = log_file("0,1.0,peak,immediate\n10,x,trough,immediate\n");
        assert!(matches!(
            read_event_log(file.path()),
            Err(CalibrationError::Unparseable { line: 2, .. })
        ));

        let file = log_file("0,1.0,summit,immediate\n");
        assert!(matches!(
            read_event_log(file.path()),
            Err(CalibrationError::Unparseable { line: 1, .. })
        ));
    }

    #[test]
    fn test_empty_log_is_empty_history() {
        let file = log_file("");
        assert!(read_event_log(file.path()).unwrap().is_empty());
    }
}
