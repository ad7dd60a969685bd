use crate::client::BenchResults;
use crate::harness::CodecResult;
use crate::report::{comparisons, Comparison};
use crate::Format;
use serde::{Deserialize, Serialize};

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMeta {
    pub schema_version: u32,
    pub bench_version: String,
    pub base_url: String,
    pub baseline: Option<Format>,
    pub timestamp_utc: String,
    pub git_sha: Option<String>,
}

impl RunMeta {
    pub fn new(base_url: &str, baseline: Option<Format>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            bench_version: env!("CARGO_PKG_VERSION").to_string(),
            base_url: base_url.to_string(),
            baseline,
            timestamp_utc: crate::dataset::timestamp_now(),
            git_sha: git_sha_short(),
        }
    }
}

/// Commit the run was built from, as exported by CI (`GIT_SHA`, then `GITHUB_SHA`).
fn git_sha_short() -> Option<String> {
    ["GIT_SHA", "GITHUB_SHA"]
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .find_map(|raw| abbreviate_sha(&raw))
}

/// First 12 hex digits of a commit id; blank or non-hex values are ignored.
fn abbreviate_sha(raw: &str) -> Option<String> {
    let sha = raw.trim();
    if sha.is_empty() || !sha.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(sha.chars().take(12).collect::<String>().to_ascii_lowercase())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Measurement {
    pub format: Format,
    pub transfer_ms: f64,
    pub parse_ms: f64,
    pub total_ms: f64,
    pub size_bytes: u64,
    pub size_kb: f64,
    pub records: u64,
}

impl From<&CodecResult> for Measurement {
    fn from(r: &CodecResult) -> Self {
        Self {
            format: r.format,
            transfer_ms: r.transfer_ms(),
            parse_ms: r.parse_ms(),
            total_ms: r.total_ms(),
            size_bytes: r.size_bytes,
            size_kb: r.size_kb(),
            records: r.records,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub format: Format,
    pub note: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BenchReport {
    pub run: RunMeta,
    pub measurements: Vec<Measurement>,
    pub comparisons: Vec<Comparison>,
    pub notes: Vec<Note>,
}

impl BenchReport {
    pub fn new(base_url: &str, results: &BenchResults) -> Self {
        Self {
            run: RunMeta::new(base_url, results.baseline().map(|b| b.format)),
            measurements: results.iter().map(Measurement::from).collect(),
            comparisons: comparisons(results),
            notes: results
                .notes()
                .iter()
                .map(|(format, note)| Note {
                    format: *format,
                    note: note.to_string(),
                })
                .collect(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
