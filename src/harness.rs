//! Timing model for one fetch/decode cycle.
//!
//! A cycle captures four instants: request issued (T0), body fully received
//! (T1), decode started (T2) and decode finished (T3). Transfer time is
//! `T1 - T0`, parse time is `T3 - T2` and total time is their sum. T2 is
//! taken immediately after T1, so parse time includes the small amount of
//! bookkeeping between the two marks.

use crate::Format;
use std::time::{Duration, Instant};

/// Cycle with only T0 taken; the request is in flight.
#[derive(Debug, Clone, Copy)]
pub struct Transfer {
    t0: Instant,
}

/// Body received (T1), decode not yet started.
#[derive(Debug, Clone, Copy)]
pub struct Received {
    t0: Instant,
    t1: Instant,
}

/// Decode in progress (T2 taken).
#[derive(Debug, Clone, Copy)]
pub struct Decoding {
    t0: Instant,
    t1: Instant,
    t2: Instant,
}

impl Transfer {
    pub fn start() -> Self {
        Self { t0: Instant::now() }
    }

    pub fn received(self) -> Received {
        Received {
            t0: self.t0,
            t1: Instant::now(),
        }
    }
}

impl Received {
    pub fn begin_decode(self) -> Decoding {
        Decoding {
            t0: self.t0,
            t1: self.t1,
            t2: Instant::now(),
        }
    }
}

impl Decoding {
    /// Take T3 and build the result for this cycle.
    pub fn finish(self, format: Format, size_bytes: u64, records: u64) -> CodecResult {
        let t3 = Instant::now();
        CodecResult {
            format,
            size_bytes,
            records,
            transfer: self.t1.saturating_duration_since(self.t0),
            parse: t3.saturating_duration_since(self.t2),
        }
    }
}

/// Measurements for one format in one run.
#[derive(Clone, Debug, PartialEq)]
pub struct CodecResult {
    pub format: Format,
    /// Length of the raw response body.
    pub size_bytes: u64,
    /// Records the body decoded to.
    pub records: u64,
    pub transfer: Duration,
    pub parse: Duration,
}

impl CodecResult {
    pub fn total(&self) -> Duration {
        self.transfer + self.parse
    }

    pub fn transfer_ms(&self) -> f64 {
        millis(self.transfer)
    }

    pub fn parse_ms(&self) -> f64 {
        millis(self.parse)
    }

    pub fn total_ms(&self) -> f64 {
        self.transfer_ms() + self.parse_ms()
    }

    pub fn size_kb(&self) -> f64 {
        self.size_bytes as f64 / 1024.0
    }
}

pub fn millis(d: Duration) -> f64 {
    d.as_nanos() as f64 / 1e6
}
