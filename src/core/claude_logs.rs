//! Scanner for per-message delta session logs (Claude Code family).
//!
//! Project logs are `*.jsonl` files nested under the projects root. Each
//! assistant record carries final token deltas for one API response plus a
//! `message.id` / `requestId` pair; stream retries rewrite the same pair, so
//! repeats within a pass are dropped. Cost is priced at parse time and packed
//! into the fifth slot as integer nano-USD.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

use chrono::{DateTime, NaiveDate};
use serde::Deserialize;

use crate::error::Result;

use super::dayrange::{day_key, DayRange};
use super::ledger::{add_delta, DayModelDeltas, ScanPass, CLAUDE_SLOTS};
use super::pricing::{nano_usd, PriceBook, TokenCounts};
use super::provider::Provider;

#[derive(Debug, Deserialize)]
struct ProjectLine {
    #[serde(rename = "type")]
    line_type: Option<String>,
    timestamp: Option<String>,
    #[serde(rename = "requestId")]
    request_id: Option<String>,
    message: Option<ProjectMessage>,
}

#[derive(Debug, Deserialize)]
struct ProjectMessage {
    id: Option<String>,
    model: Option<String>,
    usage: Option<ProjectUsage>,
}

#[derive(Debug, Deserialize)]
struct ProjectUsage {
    #[serde(default)]
    input_tokens: i64,
    #[serde(default)]
    output_tokens: i64,
    #[serde(default)]
    cache_read_input_tokens: i64,
    #[serde(default)]
    cache_creation_input_tokens: i64,
}

/// Cheap pre-filter applied before JSON parsing.
fn is_candidate(line: &str) -> bool {
    line.contains("\"usage\"")
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

/// Incrementally scan one project log from `offset`.
///
/// Only lines terminated by `\n` are consumed. Malformed lines, synthetic
/// models, all-zero usage, and in-pass duplicate `message.id`/`requestId`
/// pairs are skipped without aborting the pass.
pub fn scan_file(
    path: &Path,
    offset: u64,
    range: &DayRange,
    book: &PriceBook,
) -> Result<ScanPass<CLAUDE_SLOTS>> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    if offset > 0 {
        reader.seek(SeekFrom::Start(offset))?;
    }

    let mut days = DayModelDeltas::<CLAUDE_SLOTS>::new();
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut consumed = offset;
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = reader.read_until(b'\n', &mut buf)?;
        if read == 0 {
            break;
        }
        if buf.last() != Some(&b'\n') {
            break;
        }
        consumed += read as u64;

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim();
        if line.is_empty() || !is_candidate(line) {
            continue;
        }

        let parsed: ProjectLine = match serde_json::from_str(line) {
            Ok(p) => p,
            Err(err) => {
                tracing::debug!(path = %path.display(), %err, "skipping malformed project line");
                continue;
            }
        };
        if parsed.line_type.as_deref() != Some("assistant") {
            continue;
        }
        let Some(message) = parsed.message else {
            continue;
        };
        let (Some(model), Some(usage)) = (message.model, message.usage) else {
            continue;
        };
        if model.contains("<synthetic>") {
            continue;
        }

        let counts = TokenCounts {
            input: usage.input_tokens.max(0),
            cache_read: usage.cache_read_input_tokens.max(0),
            cache_creation: usage.cache_creation_input_tokens.max(0),
            output: usage.output_tokens.max(0),
        };
        if counts == TokenCounts::default() {
            continue;
        }

        // Retried streams re-emit the same message/request pair; first wins.
        let message_id = message.id.unwrap_or_default();
        let request_id = parsed.request_id.unwrap_or_default();
        if (!message_id.is_empty() || !request_id.is_empty())
            && !seen.insert((message_id, request_id))
        {
            continue;
        }

        let Some(day) = parse_event_day(parsed.timestamp.as_deref()) else {
            continue;
        };
        if !range.scan_contains(&day) {
            continue;
        }

        let normalized = book.normalize_model(Provider::Claude, &model);
        let cost_nano = book
            .token_price(Provider::Claude, &normalized)
            .map_or(0, |price| nano_usd(price.cost(&counts)));

        add_delta(
            &mut days,
            &day,
            &normalized,
            [
                counts.input,
                counts.cache_read,
                counts.cache_creation,
                counts.output,
                cost_nano,
            ],
        );
    }

    Ok(ScanPass {
        end_offset: consumed,
        days,
        carry: None,
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

    fn assistant_line(msg_id: &str, req_id: &str, model: &str, input: i64, output: i64) -> String {
        format!(
            r#"{{"type":"assistant","timestamp":"2026-08-12T09:30:00Z","requestId":"{req_id}","message":{{"id":"{msg_id}","model":"{model}","usage":{{"input_tokens":{input},"output_tokens":{output},"cache_read_input_tokens":0,"cache_creation_input_tokens":0}}}}}}"#
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
    fn records_aggregate_by_day_and_model() {
        let book = PriceBook::current();
        let file = write_lines(&[
            assistant_line("m1", "r1", "claude-sonnet-4-5-20250929", 1000, 200),
            assistant_line("m2", "r2", "claude-sonnet-4-5-20250929", 500, 100),
        ]);

        let pass = scan_file(file.path(), 0, &range(), &book).unwrap();
        let cell = pass.days["2026-08-12"]["claude-sonnet-4-5"];
        assert_eq!(&cell[..4], &[1500, 0, 0, 300]);
        // 1500 input at $3/M + 300 output at $15/M.
        assert_eq!(cell[4], nano_usd(1500.0 * 3.0 / 1e6 + 300.0 * 15.0 / 1e6));
    }

    #[test]
    fn duplicate_message_and_request_id_counted_once() {
        let book = PriceBook::current();
        let file = write_lines(&[
            assistant_line("m1", "r1", "claude-sonnet-4-5", 1000, 200),
            assistant_line("m1", "r1", "claude-sonnet-4-5", 1000, 200),
            assistant_line("m1", "r1", "claude-sonnet-4-5", 1000, 200),
        ]);

        let pass = scan_file(file.path(), 0, &range(), &book).unwrap();
        assert_eq!(pass.days["2026-08-12"]["claude-sonnet-4-5"][0], 1000);
    }

    #[test]
    fn synthetic_and_zero_usage_records_skipped() {
        let book = PriceBook::current();
        let file = write_lines(&[
            assistant_line("m1", "r1", "<synthetic>", 1000, 200),
            assistant_line("m2", "r2", "claude-sonnet-4-5", 0, 0),
        ]);

        let pass = scan_file(file.path(), 0, &range(), &book).unwrap();
        assert!(pass.days.is_empty());
    }

    #[test]
    fn unknown_model_contributes_tokens_with_zero_cost() {
        let book = PriceBook::current();
        let file = write_lines(&[assistant_line("m1", "r1", "claude-mystery", 1000, 200)]);

        let pass = scan_file(file.path(), 0, &range(), &book).unwrap();
        let cell = pass.days["2026-08-12"]["claude-mystery"];
        assert_eq!(cell[0], 1000);
        assert_eq!(cell[4], 0);
    }

    #[test]
    fn resume_from_offset_skips_already_counted_lines() {
        let book = PriceBook::current();
        let mut file = write_lines(&[assistant_line("m1", "r1", "claude-sonnet-4-5", 1000, 200)]);

        let first = scan_file(file.path(), 0, &range(), &book).unwrap();
        writeln!(
            file,
            "{}",
            assistant_line("m2", "r2", "claude-sonnet-4-5", 300, 50)
        )
        .unwrap();
        file.flush().unwrap();

        let second = scan_file(file.path(), first.end_offset, &range(), &book).unwrap();
        assert_eq!(second.days["2026-08-12"]["claude-sonnet-4-5"][0], 300);
    }

    #[test]
    fn non_assistant_lines_are_ignored() {
        let book = PriceBook::current();
        let file = write_lines(&[
            r#"{"type":"user","timestamp":"2026-08-12T09:00:00Z","message":{"usage":{"input_tokens":9}}}"#
                .to_string(),
            "garbage line".to_string(),
            assistant_line("m1", "r1", "claude-sonnet-4-5", 10, 5),
        ]);

        let pass = scan_file(file.path(), 0, &range(), &book).unwrap();
        assert_eq!(pass.days["2026-08-12"]["claude-sonnet-4-5"][0], 10);
    }
}
