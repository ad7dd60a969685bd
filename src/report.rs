//! Human-readable report and baseline comparisons.

use crate::client::BenchResults;
use crate::harness::CodecResult;
use crate::Format;
use serde::Serialize;
use std::fmt::{self, Write};

/// One candidate format measured against the baseline. Positive values mean
/// the candidate was faster or smaller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub format: Format,
    pub baseline: Format,
    pub transfer_time_gained_ms: f64,
    pub total_time_gained_ms: f64,
    pub size_gained_bytes: i64,
    /// `None` when the baseline body was empty.
    pub size_reduction_percent: Option<f64>,
}

impl Comparison {
    pub fn between(baseline: &CodecResult, candidate: &CodecResult) -> Self {
        let size_reduction_percent = if baseline.size_bytes == 0 {
            None
        } else {
            Some((1.0 - candidate.size_bytes as f64 / baseline.size_bytes as f64) * 100.0)
        };
        Self {
            format: candidate.format,
            baseline: baseline.format,
            transfer_time_gained_ms: baseline.transfer_ms() - candidate.transfer_ms(),
            total_time_gained_ms: baseline.total_ms() - candidate.total_ms(),
            size_gained_bytes: baseline.size_bytes as i64 - candidate.size_bytes as i64,
            size_reduction_percent,
        }
    }

    pub fn size_gained_kb(&self) -> f64 {
        self.size_gained_bytes as f64 / 1024.0
    }
}

/// Comparisons for every format after the baseline. The baseline is never
/// compared to itself.
pub fn comparisons(results: &BenchResults) -> Vec<Comparison> {
    let Some(baseline) = results.baseline() else {
        return Vec::new();
    };
    results
        .iter()
        .skip(1)
        .map(|candidate| Comparison::between(baseline, candidate))
        .collect()
}

fn write_result(out: &mut String, r: &CodecResult) -> fmt::Result {
    writeln!(out, "\n{}:", r.format.display_name())?;
    writeln!(out, "Transfer Time: {:.2}ms", r.transfer_ms())?;
    writeln!(out, "Parse Time: {:.2}ms", r.parse_ms())?;
    writeln!(out, "Total Time: {:.2}ms", r.total_ms())?;
    writeln!(out, "Size: {:.2}KB", r.size_kb())
}

fn write_comparison(out: &mut String, c: &Comparison) -> fmt::Result {
    writeln!(out, "\n{}:", c.format.display_name())?;
    writeln!(out, "Transfer Time gained: {:.2}ms", c.transfer_time_gained_ms)?;
    writeln!(out, "Total Time gained: {:.2}ms", c.total_time_gained_ms)?;
    writeln!(out, "Size gained: {:.2}KB", c.size_gained_kb())?;
    match c.size_reduction_percent {
        Some(p) => writeln!(out, "Size reduction: {p:.2}%"),
        None => writeln!(out, "Size reduction: undefined (baseline size is 0)"),
    }
}

fn render_into(out: &mut String, results: &BenchResults) -> fmt::Result {
    writeln!(out, "Results:")?;
    writeln!(out, "-----------------")?;
    for r in results.iter() {
        write_result(out, r)?;
    }

    if let Some(baseline) = results.baseline() {
        let comparisons = comparisons(results);
        if !comparisons.is_empty() {
            writeln!(out, "\nComparisons with {}:", baseline.format.display_name())?;
            for c in &comparisons {
                write_comparison(out, c)?;
            }
        }
    }

    if !results.notes().is_empty() {
        writeln!(out, "\nNotes:")?;
        for (format, note) in results.notes() {
            writeln!(out, "{}: {note}", format.display_name())?;
        }
    }
    Ok(())
}

/// Render the text report.
pub fn render_text(results: &BenchResults) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = render_into(&mut out, results);
    out
}
