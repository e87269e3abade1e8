use std::fmt;
use std::time::{Duration, Instant};

use super::RunCounters;

pub const DEFAULT_REPORT_INTERVAL: u64 = 50_000;

/// Format whole seconds as `"Hh Mm Ss"`, truncating each unit.
pub fn format_elapsed_time(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{}h {}m {}s", hours, minutes, seconds)
}

pub fn format_duration(duration: Duration) -> String {
    format_elapsed_time(duration.as_secs())
}

fn per_second(delta: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        delta as f64 / secs
    } else {
        0.0
    }
}

/// What the ETA is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workload {
    /// Total number of input lines is known or assumed.
    Lines(u64),
    /// Input size in bytes; the line total is extrapolated from the average
    /// line length seen so far.
    Bytes(u64),
    Unknown,
}

impl Workload {
    fn remaining_lines(&self, counters: &RunCounters) -> Option<u64> {
        match *self {
            Workload::Lines(total) => Some(total.saturating_sub(counters.lines_read)),
            Workload::Bytes(total) => {
                if counters.bytes_read == 0 || counters.lines_read == 0 {
                    return None;
                }
                let estimated_total =
                    counters.lines_read as u128 * total as u128 / counters.bytes_read as u128;
                Some((estimated_total as u64).saturating_sub(counters.lines_read))
            }
            Workload::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressReport {
    pub lines_read: u64,
    pub features_parsed: u64,
    pub lines_per_sec: f64,
    pub imported: u64,
    pub skipped_irrelevant: u64,
    pub duplicates: u64,
    pub imported_per_min: f64,
    pub elapsed: Duration,
    pub eta: Option<Duration>,
}

impl fmt::Display for ProgressReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let eta = self
            .eta
            .map(format_duration)
            .unwrap_or_else(|| "unknown".to_string());

        write!(
            f,
            "Processed {} lines ({} features) at {:.0} lines/sec | \
             imported {}, skipped {}, duplicates {} | \
             {:.0} features/min | elapsed {} | ETA {}",
            self.lines_read,
            self.features_parsed,
            self.lines_per_sec,
            self.imported,
            self.skipped_irrelevant,
            self.duplicates,
            self.imported_per_min,
            format_duration(self.elapsed),
            eta
        )
    }
}

/// Periodic throughput and ETA reports derived from [`RunCounters`].
///
/// Pure observer: it only reads counters.
#[derive(Debug)]
pub struct ProgressReporter {
    interval: u64,
    workload: Workload,
    started: Instant,
    last_at: Instant,
    last_lines: u64,
    last_imported: u64,
    reports: u64,
}

impl ProgressReporter {
    /// An `interval` of zero disables reporting.
    pub fn new(interval: u64, workload: Workload, started: Instant) -> Self {
        Self {
            interval,
            workload,
            started,
            last_at: started,
            last_lines: 0,
            last_imported: 0,
            reports: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.interval > 0
    }

    pub fn reports_emitted(&self) -> u64 {
        self.reports
    }

    /// Produce a report when `lines_read` has crossed another interval
    /// boundary since the previous report.
    pub fn observe(&mut self, counters: &RunCounters, now: Instant) -> Option<ProgressReport> {
        if !self.is_enabled() {
            return None;
        }
        if counters.lines_read / self.interval <= self.last_lines / self.interval {
            return None;
        }

        Some(self.report(counters, now))
    }

    pub fn report(&mut self, counters: &RunCounters, now: Instant) -> ProgressReport {
        let window = now.saturating_duration_since(self.last_at);
        let lines_per_sec = per_second(
            counters.lines_read.saturating_sub(self.last_lines),
            window,
        );
        let imported_per_min = per_second(
            counters.imported.saturating_sub(self.last_imported),
            window,
        ) * 60.0;

        let eta = self
            .workload
            .remaining_lines(counters)
            .filter(|_| lines_per_sec > 0.0)
            .map(|remaining| Duration::from_secs_f64(remaining as f64 / lines_per_sec));

        self.last_at = now;
        self.last_lines = counters.lines_read;
        self.last_imported = counters.imported;
        self.reports += 1;

        ProgressReport {
            lines_read: counters.lines_read,
            features_parsed: counters.features_parsed,
            lines_per_sec,
            imported: counters.imported,
            skipped_irrelevant: counters.skipped_irrelevant,
            duplicates: counters.duplicates,
            imported_per_min,
            elapsed: now.saturating_duration_since(self.started),
            eta,
        }
    }
}

/// Final figures for one import run.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportSummary {
    pub counters: RunCounters,
    pub elapsed: Duration,
}

impl ImportSummary {
    pub fn lines_per_sec(&self) -> f64 {
        per_second(self.counters.lines_read, self.elapsed)
    }

    pub fn imported_per_min(&self) -> f64 {
        per_second(self.counters.imported, self.elapsed) * 60.0
    }
}

impl fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.counters;
        writeln!(f, "Import summary:")?;
        writeln!(f, "  Lines read:          {}", c.lines_read)?;
        writeln!(f, "  Features parsed:     {}", c.features_parsed)?;
        writeln!(f, "  Parse errors:        {}", c.parse_errors)?;
        writeln!(f, "  Imported:            {}", c.imported)?;
        writeln!(f, "  Skipped:             {}", c.skipped_irrelevant)?;
        writeln!(f, "  Invalid records:     {}", c.invalid)?;
        writeln!(f, "  Duplicates:          {}", c.duplicates)?;
        writeln!(f, "  Batches flushed:     {}", c.batches_flushed)?;
        writeln!(f, "  Elapsed:             {}", format_duration(self.elapsed))?;
        write!(
            f,
            "  Throughput:          {:.0} lines/sec, {:.0} features/min",
            self.lines_per_sec(),
            self.imported_per_min()
        )
    }
}
