//! Packed day/model aggregate caches shared by both log scanners.
//!
//! Usage is bucketed as `day -> model -> [i64; N]`, where the slot layout
//! differs per log family. A `BTreeMap` keyed by day strings keeps entries in
//! chronological order for free because day keys are fixed-width.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use super::dayrange::DayRange;

/// Slot layout for cumulative-counter session logs:
/// `[input, cached_input, output]`.
pub const CODEX_SLOTS: usize = 3;

/// Slot layout for per-message delta logs:
/// `[input, cache_read, cache_creation, output, cost_nano_usd]`.
pub const CLAUDE_SLOTS: usize = 5;

/// Day-keyed, model-keyed packed aggregates.
pub type DayModelDeltas<const N: usize> = BTreeMap<String, HashMap<String, [i64; N]>>;

/// Whether every slot of a packed vector is zero.
#[must_use]
pub fn is_all_zero<const N: usize>(slots: &[i64; N]) -> bool {
    slots.iter().all(|&v| v == 0)
}

/// Add one packed delta into a day/model cell.
pub fn add_delta<const N: usize>(
    cache: &mut DayModelDeltas<N>,
    day: &str,
    model: &str,
    delta: [i64; N],
) {
    if is_all_zero(&delta) {
        return;
    }
    let cell = cache
        .entry(day.to_string())
        .or_default()
        .entry(model.to_string())
        .or_insert([0; N]);
    for (slot, d) in cell.iter_mut().zip(delta) {
        *slot += d;
    }
}

/// Apply a file's recorded day contributions to the provider cache, either
/// adding (`sign = 1`) or subtracting (`sign = -1`).
///
/// Slots are clamped at zero after subtraction so replay of a rewritten file
/// can never drive an aggregate negative. Cells and days that end up empty
/// are removed so pruning and summaries never see ghosts.
pub fn apply_file_days<const N: usize>(
    cache: &mut DayModelDeltas<N>,
    file_days: &DayModelDeltas<N>,
    sign: i64,
) {
    for (day, models) in file_days {
        let day_cell = cache.entry(day.clone()).or_default();
        for (model, delta) in models {
            let cell = day_cell.entry(model.clone()).or_insert([0; N]);
            for (slot, d) in cell.iter_mut().zip(delta) {
                *slot = (*slot + sign * d).max(0);
            }
            if is_all_zero(&day_cell[model]) {
                day_cell.remove(model);
            }
        }
        if cache.get(day).is_some_and(HashMap::is_empty) {
            cache.remove(day);
        }
    }
}

/// Fold a scan pass's day contributions into a file's accumulated record.
pub fn merge_file_days<const N: usize>(acc: &mut DayModelDeltas<N>, delta: &DayModelDeltas<N>) {
    for (day, models) in delta {
        for (model, slots) in models {
            add_delta(acc, day, model, *slots);
        }
    }
}

/// Drop days that have fallen outside the padded scan range.
pub fn prune_days<const N: usize>(cache: &mut DayModelDeltas<N>, range: &DayRange) {
    cache.retain(|day, _| range.scan_contains(day));
}

// =============================================================================
// Per-file scan state
// =============================================================================

/// Cumulative-counter state carried between passes over one session file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CumulativeCarry {
    /// Model announced by the most recent turn-context record.
    pub model: Option<String>,
    pub input: i64,
    pub cached: i64,
    pub output: i64,
}

/// Resumable per-file scan state.
#[derive(Debug, Clone, Default)]
pub struct FileScanState<const N: usize> {
    /// Byte offset just past the last fully consumed line.
    pub offset: u64,

    /// This file's total contribution to the provider cache, day-keyed.
    /// Needed to subtract the file back out when it is truncated or removed.
    pub days: DayModelDeltas<N>,

    /// Cumulative-counter carry; unused by the delta log family.
    pub carry: Option<CumulativeCarry>,
}

/// Result of one incremental pass over a single file.
#[derive(Debug, Clone)]
pub struct ScanPass<const N: usize> {
    /// Byte offset to resume from next time.
    pub end_offset: u64,

    /// Day contributions discovered by this pass alone.
    pub days: DayModelDeltas<N>,

    /// Updated cumulative carry, for the cumulative family.
    pub carry: Option<CumulativeCarry>,
}

/// One provider's complete cost cache: per-file state plus the merged
/// day/model aggregates.
#[derive(Debug, Default)]
pub struct LedgerCache<const N: usize> {
    pub files: HashMap<PathBuf, FileScanState<N>>,
    pub days: DayModelDeltas<N>,
}

impl<const N: usize> LedgerCache<N> {
    /// Commit a scan pass for `path`: merge the pass's days into both the
    /// file record and the provider aggregate, and advance the offset.
    pub fn commit(&mut self, path: &PathBuf, pass: ScanPass<N>) {
        apply_file_days(&mut self.days, &pass.days, 1);
        let state = self.files.entry(path.clone()).or_default();
        merge_file_days(&mut state.days, &pass.days);
        state.offset = pass.end_offset;
        state.carry = pass.carry;
    }

    /// Forget a file entirely, subtracting its recorded contribution.
    ///
    /// Used both when a file disappears from disk and as the first half of
    /// truncation replay (subtract, then rescan from offset zero).
    pub fn evict(&mut self, path: &PathBuf) {
        if let Some(state) = self.files.remove(path) {
            apply_file_days(&mut self.days, &state.days, -1);
        }
    }

    /// Drop aggregate days and per-file day records outside the scan range.
    pub fn prune(&mut self, range: &DayRange) {
        prune_days(&mut self.days, range);
        for state in self.files.values_mut() {
            prune_days(&mut state.days, range);
        }
    }
}
