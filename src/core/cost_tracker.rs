//! Cost history: log discovery, incremental scanning, and summaries.
//!
//! `CostTracker` owns one ledger per log-scanning provider, each behind its
//! own mutex so concurrent refreshes of different providers never contend.
//! A refresh discovers session files, replays truncated or vanished files,
//! scans new bytes, prunes stale days, and folds the resulting aggregates
//! into a `CostUsageSummary` over the nominal window.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::Utc;

use crate::error::{EngineError, Result};

use super::claude_logs;
use super::codex_logs;
use super::dayrange::{parse_day_key, DayRange};
use super::ledger::{CumulativeCarry, LedgerCache, ScanPass, CLAUDE_SLOTS, CODEX_SLOTS};
use super::models::{CostUsageDailyEntry, CostUsageSummary, CostUsageTotals};
use super::pricing::{usd_from_nano, PriceBook, TokenCounts};
use super::provider::Provider;

/// Incremental cost scanner over local session logs.
pub struct CostTracker {
    book: PriceBook,
    claude_root: Option<PathBuf>,
    codex_root: Option<PathBuf>,
    claude: Mutex<LedgerCache<CLAUDE_SLOTS>>,
    codex: Mutex<LedgerCache<CODEX_SLOTS>>,
}

impl CostTracker {
    /// Tracker using each provider's default log root.
    #[must_use]
    pub fn new(book: PriceBook) -> Self {
        Self {
            book,
            claude_root: None,
            codex_root: None,
            claude: Mutex::new(LedgerCache::default()),
            codex: Mutex::new(LedgerCache::default()),
        }
    }

    /// Override a provider's log root (config override, test fixtures).
    #[must_use]
    pub fn with_log_root(mut self, provider: Provider, root: PathBuf) -> Self {
        match provider {
            Provider::Claude => self.claude_root = Some(root),
            Provider::Codex => self.codex_root = Some(root),
            Provider::Gemini => {}
        }
        self
    }

    fn log_root(&self, provider: Provider) -> Option<PathBuf> {
        match provider {
            Provider::Claude => self
                .claude_root
                .clone()
                .or_else(|| provider.default_log_root()),
            Provider::Codex => self
                .codex_root
                .clone()
                .or_else(|| provider.default_log_root()),
            Provider::Gemini => None,
        }
    }

    /// Refresh and summarize over the rolling window ending today (UTC).
    pub fn summary(&self, provider: Provider, window_days: u32) -> Result<CostUsageSummary> {
        let range = DayRange::last_days(window_days, Utc::now().date_naive());
        self.summary_for_range(provider, &range)
    }

    /// Refresh and summarize over an explicit day range.
    pub fn summary_for_range(
        &self,
        provider: Provider,
        range: &DayRange,
    ) -> Result<CostUsageSummary> {
        match provider {
            Provider::Claude => self.refresh_claude(range),
            Provider::Codex => self.refresh_codex(range),
            Provider::Gemini => Err(EngineError::Config(format!(
                "provider \"{provider}\" has no local session logs to scan"
            ))),
        }
    }

    // -------------------------------------------------------------------------
    // Per-provider refresh
    // -------------------------------------------------------------------------

    fn refresh_claude(&self, range: &DayRange) -> Result<CostUsageSummary> {
        let mut cache = self
            .claude
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(root) = self.log_root(Provider::Claude) {
            let files = discover_recursive(&root);
            sync_files(&mut cache, &files, |path, offset, _carry| {
                claude_logs::scan_file(path, offset, range, &self.book)
            });
        } else {
            tracing::debug!("no log root for claude, serving cached data only");
        }
        cache.prune(range);

        Ok(build_summary(
            Provider::Claude,
            range,
            claude_daily(&cache, range, &self.book),
        ))
    }

    fn refresh_codex(&self, range: &DayRange) -> Result<CostUsageSummary> {
        let mut cache = self
            .codex
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(root) = self.log_root(Provider::Codex) {
            let files = discover_dated(&root, range);
            sync_files(&mut cache, &files, |path, offset, carry| {
                codex_logs::scan_file(path, offset, carry, range)
            });
        } else {
            tracing::debug!("no log root for codex, serving cached data only");
        }
        cache.prune(range);

        Ok(build_summary(
            Provider::Codex,
            range,
            codex_daily(&cache, range, &self.book),
        ))
    }

}

fn build_summary(
    provider: Provider,
    range: &DayRange,
    mut daily: Vec<CostUsageDailyEntry>,
) -> CostUsageSummary {
    // Most recent first.
    daily.sort_by(|a, b| b.date.cmp(&a.date));

    let mut totals = CostUsageTotals::default();
    for entry in &daily {
        totals.input_tokens += entry.input_tokens;
        totals.output_tokens += entry.output_tokens;
        totals.cache_read_tokens += entry.cache_read_tokens;
        totals.cache_creation_tokens += entry.cache_creation_tokens;
        totals.total_tokens += entry.total_tokens;
        if let Some(cost) = entry.cost_usd {
            totals.cost_usd = Some(totals.cost_usd.unwrap_or(0.0) + cost);
        }
    }

    CostUsageSummary {
        provider,
        updated_at: Utc::now(),
        window_days: window_days_of(range),
        daily,
        totals,
    }
}

fn window_days_of(range: &DayRange) -> u32 {
    match (parse_day_key(&range.since), parse_day_key(&range.until)) {
        (Some(since), Some(until)) => {
            u32::try_from((until - since).num_days() + 1).unwrap_or(0)
        }
        _ => 0,
    }
}

// =============================================================================
// File sync
// =============================================================================

/// Bring a ledger up to date against the discovered file set.
///
/// Files that vanished are evicted. A stored offset beyond the on-disk
/// length means the file was truncated and rewritten: its recorded
/// contribution is subtracted and the file rescanned from zero.
fn sync_files<const N: usize>(
    cache: &mut LedgerCache<N>,
    files: &[PathBuf],
    mut scan: impl FnMut(&Path, u64, CumulativeCarry) -> Result<ScanPass<N>>,
) {
    let on_disk: HashSet<&PathBuf> = files.iter().collect();
    let gone: Vec<PathBuf> = cache
        .files
        .keys()
        .filter(|p| !on_disk.contains(p))
        .cloned()
        .collect();
    for path in gone {
        tracing::debug!(path = %path.display(), "session file removed, dropping its contribution");
        cache.evict(&path);
    }

    for path in files {
        let len = match fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(err) => {
                tracing::debug!(path = %path.display(), %err, "cannot stat session file");
                continue;
            }
        };

        let mut offset = cache.files.get(path).map_or(0, |s| s.offset);
        if offset > len {
            tracing::debug!(path = %path.display(), offset, len, "session file truncated, rescanning");
            cache.evict(path);
            offset = 0;
        }
        if offset == len {
            continue;
        }

        let carry = cache
            .files
            .get(path)
            .and_then(|s| s.carry.clone())
            .unwrap_or_default();
        match scan(path, offset, carry) {
            Ok(pass) => cache.commit(path, pass),
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "session file scan failed");
            }
        }
    }
}

// =============================================================================
// Discovery
// =============================================================================

/// Collect `*.jsonl` recursively (project-log layout, nesting unknown).
fn discover_recursive(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    collect_jsonl(root, &mut files, 6);
    files.sort();
    files
}

/// Collect `*.jsonl` from a `YYYY/MM/DD` tree, skipping day directories
/// outside the padded scan range.
fn discover_dated(root: &Path, range: &DayRange) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for year in read_dirs(root) {
        for month in read_dirs(&year) {
            for day in read_dirs(&month) {
                if let Some(key) = dir_day_key(&year, &month, &day) {
                    if !range.scan_contains(&key) {
                        continue;
                    }
                }
                collect_jsonl(&day, &mut files, 1);
            }
        }
    }
    files.sort();
    files
}

fn dir_day_key(year: &Path, month: &Path, day: &Path) -> Option<String> {
    let y = year.file_name()?.to_str()?;
    let m = month.file_name()?.to_str()?;
    let d = day.file_name()?.to_str()?;
    if y.len() == 4 && m.len() == 2 && d.len() == 2 {
        Some(format!("{y}-{m}-{d}"))
    } else {
        None
    }
}

fn read_dirs(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect()
}

fn collect_jsonl(dir: &Path, files: &mut Vec<PathBuf>, max_depth: u32) {
    if max_depth == 0 {
        return;
    }
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("jsonl") {
            files.push(path);
        } else if path.is_dir() {
            collect_jsonl(&path, files, max_depth - 1);
        }
    }
}

// =============================================================================
// Summary assembly
// =============================================================================

fn claude_daily(
    cache: &LedgerCache<CLAUDE_SLOTS>,
    range: &DayRange,
    book: &PriceBook,
) -> Vec<CostUsageDailyEntry> {
    let mut daily = Vec::new();
    for (day, models) in &cache.days {
        if !range.contains(day) {
            continue;
        }
        let mut entry = empty_entry(day);
        let mut any_priced = false;
        let mut cost_nano = 0_i64;
        for (model, slots) in models {
            entry.input_tokens += slots[0];
            entry.cache_read_tokens += slots[1];
            entry.cache_creation_tokens += slots[2];
            entry.output_tokens += slots[3];
            cost_nano += slots[4];
            if book.token_price(Provider::Claude, model).is_some() {
                any_priced = true;
            }
            entry.models.push(model.clone());
        }
        finish_entry(&mut entry, any_priced.then(|| usd_from_nano(cost_nano)));
        daily.push(entry);
    }
    daily
}

fn codex_daily(
    cache: &LedgerCache<CODEX_SLOTS>,
    range: &DayRange,
    book: &PriceBook,
) -> Vec<CostUsageDailyEntry> {
    let mut daily = Vec::new();
    for (day, models) in &cache.days {
        if !range.contains(day) {
            continue;
        }
        let mut entry = empty_entry(day);
        let mut cost = None;
        for (model, slots) in models {
            let [input, cached, output] = *slots;
            entry.input_tokens += input;
            entry.cache_read_tokens += cached;
            entry.output_tokens += output;

            // Cumulative input totals include cached reads; bill the
            // non-cached remainder at the input rate.
            let counts = TokenCounts {
                input: (input - cached).max(0),
                cache_read: cached,
                cache_creation: 0,
                output,
            };
            if let Some(model_cost) = book.token_cost_usd(Provider::Codex, model, &counts) {
                cost = Some(cost.unwrap_or(0.0) + model_cost);
            }
            entry.models.push(model.clone());
        }
        finish_entry(&mut entry, cost);
        daily.push(entry);
    }
    daily
}

fn empty_entry(day: &str) -> CostUsageDailyEntry {
    CostUsageDailyEntry {
        date: day.to_string(),
        input_tokens: 0,
        output_tokens: 0,
        cache_read_tokens: 0,
        cache_creation_tokens: 0,
        total_tokens: 0,
        cost_usd: None,
        models: Vec::new(),
    }
}

fn finish_entry(entry: &mut CostUsageDailyEntry, cost_usd: Option<f64>) {
    entry.total_tokens = entry.input_tokens
        + entry.output_tokens
        + entry.cache_read_tokens
        + entry.cache_creation_tokens;
    entry.cost_usd = cost_usd;
    entry.models.sort();
    entry.models.dedup();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn range() -> DayRange {
        DayRange::new(
            NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 8, 31).unwrap(),
        )
    }

    fn codex_fixture(dir: &Path, day_path: &str, name: &str, lines: &[&str]) -> PathBuf {
        let day_dir = dir.join(day_path);
        fs::create_dir_all(&day_dir).unwrap();
        let path = day_dir.join(name);
        let mut file = File::create(&path).unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        path
    }

    const TURN: &str = r#"{"timestamp":"2026-08-10T10:00:00Z","type":"turn_context","payload":{"model":"gpt-5"}}"#;

    fn count_line(input: i64, output: i64) -> String {
        format!(
            r#"{{"timestamp":"2026-08-10T10:01:00Z","type":"event_msg","payload":{{"type":"token_count","info":{{"total_token_usage":{{"input_tokens":{input},"cached_input_tokens":0,"output_tokens":{output}}}}}}}}}"#
        )
    }

    #[test]
    fn codex_summary_end_to_end() {
        let dir = TempDir::new().unwrap();
        codex_fixture(
            dir.path(),
            "2026/08/10",
            "a.jsonl",
            &[TURN, &count_line(100, 40), &count_line(250, 90)],
        );

        let tracker = CostTracker::new(PriceBook::current())
            .with_log_root(Provider::Codex, dir.path().to_path_buf());
        let summary = tracker.summary_for_range(Provider::Codex, &range()).unwrap();

        assert_eq!(summary.daily.len(), 1);
        let day = &summary.daily[0];
        assert_eq!(day.date, "2026-08-10");
        assert_eq!(day.input_tokens, 250);
        assert_eq!(day.output_tokens, 90);
        assert_eq!(day.models, vec!["gpt-5"]);
        // 250 input at $1.25/M + 90 output at $10/M.
        let expected = 250.0 * 1.25 / 1e6 + 90.0 * 10.0 / 1e6;
        assert!((day.cost_usd.unwrap() - expected).abs() < 1e-9);
        assert_eq!(summary.totals.total_tokens, 340);
    }

    #[test]
    fn rescan_is_idempotent() {
        let dir = TempDir::new().unwrap();
        codex_fixture(
            dir.path(),
            "2026/08/10",
            "a.jsonl",
            &[TURN, &count_line(100, 40)],
        );

        let tracker = CostTracker::new(PriceBook::current())
            .with_log_root(Provider::Codex, dir.path().to_path_buf());
        let first = tracker.summary_for_range(Provider::Codex, &range()).unwrap();
        let second = tracker.summary_for_range(Provider::Codex, &range()).unwrap();

        assert_eq!(first.daily[0].input_tokens, second.daily[0].input_tokens);
        assert_eq!(first.totals.total_tokens, second.totals.total_tokens);
    }

    #[test]
    fn appended_lines_extend_the_day() {
        let dir = TempDir::new().unwrap();
        let path = codex_fixture(
            dir.path(),
            "2026/08/10",
            "a.jsonl",
            &[TURN, &count_line(100, 40)],
        );

        let tracker = CostTracker::new(PriceBook::current())
            .with_log_root(Provider::Codex, dir.path().to_path_buf());
        let first = tracker.summary_for_range(Provider::Codex, &range()).unwrap();
        assert_eq!(first.daily[0].input_tokens, 100);

        let mut file = fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{}", count_line(250, 90)).unwrap();

        let second = tracker.summary_for_range(Provider::Codex, &range()).unwrap();
        assert_eq!(second.daily[0].input_tokens, 250);
        assert_eq!(second.daily[0].output_tokens, 90);
    }

    #[test]
    fn truncated_file_is_replayed_without_double_counting() {
        let dir = TempDir::new().unwrap();
        let path = codex_fixture(
            dir.path(),
            "2026/08/10",
            "a.jsonl",
            &[TURN, &count_line(100, 40), &count_line(250, 90)],
        );

        let tracker = CostTracker::new(PriceBook::current())
            .with_log_root(Provider::Codex, dir.path().to_path_buf());
        let first = tracker.summary_for_range(Provider::Codex, &range()).unwrap();
        assert_eq!(first.daily[0].input_tokens, 250);

        // Rewrite the file shorter than the recorded offset.
        let mut file = File::create(&path).unwrap();
        writeln!(file, "{TURN}").unwrap();
        writeln!(file, "{}", count_line(60, 20)).unwrap();

        let second = tracker.summary_for_range(Provider::Codex, &range()).unwrap();
        assert_eq!(second.daily[0].input_tokens, 60);
        assert_eq!(second.daily[0].output_tokens, 20);
    }

    #[test]
    fn removed_file_contribution_is_subtracted() {
        let dir = TempDir::new().unwrap();
        let keep = codex_fixture(
            dir.path(),
            "2026/08/10",
            "a.jsonl",
            &[TURN, &count_line(100, 40)],
        );
        let gone = codex_fixture(
            dir.path(),
            "2026/08/10",
            "b.jsonl",
            &[TURN, &count_line(500, 200)],
        );

        let tracker = CostTracker::new(PriceBook::current())
            .with_log_root(Provider::Codex, dir.path().to_path_buf());
        let first = tracker.summary_for_range(Provider::Codex, &range()).unwrap();
        assert_eq!(first.daily[0].input_tokens, 600);

        fs::remove_file(&gone).unwrap();
        let second = tracker.summary_for_range(Provider::Codex, &range()).unwrap();
        assert_eq!(second.daily[0].input_tokens, 100);
        let _ = keep;
    }

    #[test]
    fn claude_summary_prices_from_inline_slot() {
        let dir = TempDir::new().unwrap();
        let project = dir.path().join("proj-a");
        fs::create_dir_all(&project).unwrap();
        let mut file = File::create(project.join("session.jsonl")).unwrap();
        writeln!(
            file,
            r#"{{"type":"assistant","timestamp":"2026-08-12T09:30:00Z","requestId":"r1","message":{{"id":"m1","model":"claude-sonnet-4-5","usage":{{"input_tokens":1000,"output_tokens":200,"cache_read_input_tokens":50,"cache_creation_input_tokens":0}}}}}}"#
        )
        .unwrap();

        let tracker = CostTracker::new(PriceBook::current())
            .with_log_root(Provider::Claude, dir.path().to_path_buf());
        let summary = tracker.summary_for_range(Provider::Claude, &range()).unwrap();

        assert_eq!(summary.daily.len(), 1);
        let day = &summary.daily[0];
        assert_eq!(day.input_tokens, 1000);
        assert_eq!(day.cache_read_tokens, 50);
        let expected = 1000.0 * 3.0 / 1e6 + 50.0 * 0.3 / 1e6 + 200.0 * 15.0 / 1e6;
        assert!((day.cost_usd.unwrap() - expected).abs() < 1e-6);
    }

    #[test]
    fn gemini_has_no_log_scanner() {
        let tracker = CostTracker::new(PriceBook::current());
        assert!(tracker.summary_for_range(Provider::Gemini, &range()).is_err());
    }

    #[test]
    fn out_of_window_days_are_excluded_from_summary() {
        let dir = TempDir::new().unwrap();
        // Scan range admits the padded day, but the nominal summary must not.
        codex_fixture(
            dir.path(),
            "2026/07/31",
            "edge.jsonl",
            &[
                r#"{"timestamp":"2026-07-31T23:00:00Z","type":"turn_context","payload":{"model":"gpt-5"}}"#,
                r#"{"timestamp":"2026-07-31T23:01:00Z","type":"event_msg","payload":{"type":"token_count","info":{"total_token_usage":{"input_tokens":70,"cached_input_tokens":0,"output_tokens":30}}}}"#,
            ],
        );

        let tracker = CostTracker::new(PriceBook::current())
            .with_log_root(Provider::Codex, dir.path().to_path_buf());
        let summary = tracker.summary_for_range(Provider::Codex, &range()).unwrap();
        assert!(summary.daily.is_empty());
        assert_eq!(summary.window_days, 31);
    }
}
