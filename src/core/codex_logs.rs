//! Scanner for cumulative-counter session logs (Codex family).
//!
//! Session files live under `sessions/YYYY/MM/DD/*.jsonl`. `turn_context`
//! records announce the active model; `event_msg` records of payload type
//! `token_count` carry *cumulative* session totals, so each record's
//! contribution is the clamped difference against the previous totals.

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

use chrono::{DateTime, NaiveDate};
use serde::Deserialize;

use crate::error::Result;

use super::dayrange::{day_key, DayRange};
use super::ledger::{add_delta, CumulativeCarry, DayModelDeltas, ScanPass, CODEX_SLOTS};

#[derive(Debug, Deserialize)]
struct SessionLine {
    #[serde(rename = "type")]
    line_type: Option<String>,
    timestamp: Option<String>,
    payload: Option<SessionPayload>,
}

#[derive(Debug, Deserialize)]
struct SessionPayload {
    #[serde(rename = "type")]
    payload_type: Option<String>,
    model: Option<String>,
    info: Option<TokenInfo>,
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    total_token_usage: Option<TokenTotals>,
    model_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenTotals {
    #[serde(default)]
    input_tokens: i64,
    #[serde(default)]
    cached_input_tokens: i64,
    #[serde(default)]
    output_tokens: i64,
}

/// Cheap pre-filter applied before JSON parsing.
fn is_candidate(line: &str) -> bool {
    line.contains("\"token_count\"") || line.contains("\"turn_context\"")
}

fn parse_event_day(timestamp: Option<&str>) -> Option<String> {
    let ts = timestamp?;
    DateTime::parse_from_rfc3339(ts)
        .map(|dt| day_key(dt.date_naive()))
        .ok()
        .or_else(|| {
            let head = ts.get(..10)?;
            NaiveDate::parse_from_str(head, "%Y-%m-%d")
                .ok()
                .map(day_key)
        })
}

/// Incrementally scan one session file from `offset`.
///
/// Only lines terminated by `\n` are consumed; a trailing partial line is
/// left for the next pass. Malformed lines are skipped. Cumulative carry is
/// advanced for every token-count record, but day contributions are recorded
/// only inside the padded scan range.
pub fn scan_file(
    path: &Path,
    offset: u64,
    carry: CumulativeCarry,
    range: &DayRange,
) -> Result<ScanPass<CODEX_SLOTS>> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    if offset > 0 {
        reader.seek(SeekFrom::Start(offset))?;
    }

    let mut carry = carry;
    let mut days = DayModelDeltas::<CODEX_SLOTS>::new();
    let mut consumed = offset;
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = reader.read_until(b'\n', &mut buf)?;
        if read == 0 {
            break;
        }
        if buf.last() != Some(&b'\n') {
            // Partial trailing line, likely mid-write. Pick it up next pass.
            break;
        }
        consumed += read as u64;

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim();
        if line.is_empty() || !is_candidate(line) {
            continue;
        }

        let parsed: SessionLine = match serde_json::from_str(line) {
            Ok(p) => p,
            Err(err) => {
                tracing::debug!(path = %path.display(), %err, "skipping malformed session line");
                continue;
            }
        };
        let Some(payload) = parsed.payload else {
            continue;
        };

        if parsed.line_type.as_deref() == Some("turn_context") {
            if let Some(model) = payload.model {
                carry.model = Some(model);
            }
            continue;
        }

        if parsed.line_type.as_deref() != Some("event_msg")
            || payload.payload_type.as_deref() != Some("token_count")
        {
            continue;
        }
        let Some(totals) = payload.info.as_ref().and_then(|i| i.total_token_usage.as_ref()) else {
            continue;
        };

        // Both input and output shrinking means the session counters reset.
        if totals.input_tokens < carry.input && totals.output_tokens < carry.output {
            carry.input = 0;
            carry.cached = 0;
            carry.output = 0;
        }

        let d_input = (totals.input_tokens - carry.input).max(0);
        let d_output = (totals.output_tokens - carry.output).max(0);
        let d_cached = (totals.cached_input_tokens - carry.cached)
            .max(0)
            .min(d_input);

        carry.input = totals.input_tokens;
        carry.cached = totals.cached_input_tokens;
        carry.output = totals.output_tokens;

        if d_input == 0 && d_cached == 0 && d_output == 0 {
            continue;
        }

        let Some(day) = parse_event_day(parsed.timestamp.as_deref()) else {
            continue;
        };
        if !range.scan_contains(&day) {
            continue;
        }

        let model = carry
            .model
            .clone()
            .or_else(|| {
                payload
                    .info
                    .as_ref()
                    .and_then(|i| i.model_name.clone())
            })
            .unwrap_or_else(|| "unknown".to_string());

        add_delta(&mut days, &day, &model, [d_input, d_cached, d_output]);
    }

    Ok(ScanPass {
        end_offset: consumed,
        days,
        carry: Some(carry),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use chrono::NaiveDate;
    use tempfile::NamedTempFile;

    fn range() -> DayRange {
        DayRange::new(
            NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 8, 31).unwrap(),
        )
    }

    fn turn_context(model: &str) -> String {
        format!(
            r#"{{"timestamp":"2026-08-10T10:00:00Z","type":"turn_context","payload":{{"model":"{model}"}}}}"#
        )
    }

    fn token_count(input: i64, cached: i64, output: i64) -> String {
        format!(
            r#"{{"timestamp":"2026-08-10T10:01:00Z","type":"event_msg","payload":{{"type":"token_count","info":{{"total_token_usage":{{"input_tokens":{input},"cached_input_tokens":{cached},"output_tokens":{output}}}}}}}}}"#
        )
    }

    fn write_lines(lines: &[String]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        file.flush().unwrap();
        file
    }

    #[test]
    fn cumulative_totals_become_deltas() {
        let file = write_lines(&[
            turn_context("gpt-5"),
            token_count(100, 0, 40),
            token_count(250, 0, 90),
            token_count(400, 0, 160),
        ]);

        let pass = scan_file(file.path(), 0, CumulativeCarry::default(), &range()).unwrap();
        // 100 + (250-100) + (400-250) = 400 total input; deltas were 100/150/150.
        assert_eq!(pass.days["2026-08-10"]["gpt-5"], [400, 0, 160]);
        let carry = pass.carry.unwrap();
        assert_eq!(carry.input, 400);
        assert_eq!(carry.output, 160);
    }

    #[test]
    fn cached_delta_clamped_to_input_delta() {
        let file = write_lines(&[
            turn_context("gpt-5"),
            token_count(100, 10, 0),
            // Cached jumps by 80 but input only by 50.
            token_count(150, 90, 0),
        ]);

        let pass = scan_file(file.path(), 0, CumulativeCarry::default(), &range()).unwrap();
        assert_eq!(pass.days["2026-08-10"]["gpt-5"], [150, 60, 0]);
    }

    #[test]
    fn counter_shrink_in_both_categories_is_a_reset() {
        let file = write_lines(&[
            turn_context("gpt-5"),
            token_count(1000, 0, 500),
            // Fresh session state: both totals below the carry.
            token_count(80, 0, 30),
        ]);

        let pass = scan_file(file.path(), 0, CumulativeCarry::default(), &range()).unwrap();
        assert_eq!(pass.days["2026-08-10"]["gpt-5"], [1080, 0, 530]);
    }

    #[test]
    fn resume_from_offset_is_idempotent() {
        let file = write_lines(&[
            turn_context("gpt-5"),
            token_count(100, 0, 40),
            token_count(250, 0, 90),
        ]);

        let first = scan_file(file.path(), 0, CumulativeCarry::default(), &range()).unwrap();
        let second = scan_file(
            file.path(),
            first.end_offset,
            first.carry.clone().unwrap(),
            &range(),
        )
        .unwrap();
        assert!(second.days.is_empty());
        assert_eq!(second.end_offset, first.end_offset);
        assert_eq!(second.carry, first.carry);
    }

    #[test]
    fn partial_trailing_line_is_not_consumed() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", turn_context("gpt-5")).unwrap();
        writeln!(file, "{}", token_count(100, 0, 40)).unwrap();
        // No trailing newline.
        write!(file, "{}", &token_count(250, 0, 90)[..40]).unwrap();
        file.flush().unwrap();

        let pass = scan_file(file.path(), 0, CumulativeCarry::default(), &range()).unwrap();
        assert_eq!(pass.days["2026-08-10"]["gpt-5"], [100, 0, 40]);

        // Finish the line; a resumed pass picks up exactly the remainder.
        write!(file, "{}", &token_count(250, 0, 90)[40..]).unwrap();
        writeln!(file).unwrap();
        file.flush().unwrap();

        let next = scan_file(file.path(), pass.end_offset, pass.carry.unwrap(), &range()).unwrap();
        assert_eq!(next.days["2026-08-10"]["gpt-5"], [150, 0, 50]);
    }

    #[test]
    fn malformed_lines_and_other_types_are_skipped() {
        let file = write_lines(&[
            "not json at all {{{".to_string(),
            r#"{"timestamp":"2026-08-10T10:00:00Z","type":"event_msg","payload":{"type":"agent_message"}}"#
                .to_string(),
            turn_context("gpt-5"),
            token_count(10, 0, 5),
        ]);

        let pass = scan_file(file.path(), 0, CumulativeCarry::default(), &range()).unwrap();
        assert_eq!(pass.days["2026-08-10"]["gpt-5"], [10, 0, 5]);
    }

    #[test]
    fn out_of_range_days_advance_carry_but_record_nothing() {
        let file = write_lines(&[
            turn_context("gpt-5"),
            r#"{"timestamp":"2026-06-01T10:00:00Z","type":"event_msg","payload":{"type":"token_count","info":{"total_token_usage":{"input_tokens":100,"cached_input_tokens":0,"output_tokens":50}}}}"#
                .to_string(),
            token_count(160, 0, 80),
        ]);

        let pass = scan_file(file.path(), 0, CumulativeCarry::default(), &range()).unwrap();
        // June event skipped, but its totals seeded the carry.
        assert_eq!(pass.days["2026-08-10"]["gpt-5"], [60, 0, 30]);
    }
}
