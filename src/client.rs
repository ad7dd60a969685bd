//! Benchmark client: fetch every format in turn, time transfer and decode.
//!
//! Formats are benchmarked strictly one after another so no decode competes
//! for CPU with another format's transfer. The first failure aborts the run;
//! there are no retries and no partial results.

use crate::codec::CodecRegistry;
use crate::harness::{CodecResult, Transfer};
use crate::server::{Health, Lifecycle};
use crate::{BenchError, Format, Result};
use reqwest::header::CONTENT_TYPE;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Results of one run, in the order the formats were requested. The first
/// entry is the baseline.
#[derive(Debug, Clone, Default)]
pub struct BenchResults {
    results: Vec<CodecResult>,
    notes: Vec<(Format, &'static str)>,
}

impl BenchResults {
    pub fn new(results: Vec<CodecResult>, notes: Vec<(Format, &'static str)>) -> Self {
        Self { results, notes }
    }

    pub fn baseline(&self) -> Option<&CodecResult> {
        self.results.first()
    }

    pub fn get(&self, format: Format) -> Option<&CodecResult> {
        self.results.iter().find(|r| r.format == format)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CodecResult> {
        self.results.iter()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Precision notes for the formats in this run.
    pub fn notes(&self) -> &[(Format, &'static str)] {
        &self.notes
    }
}

#[derive(Debug, Clone)]
pub struct BenchmarkClient {
    http: reqwest::Client,
    base_url: String,
    registry: CodecRegistry,
}

impl BenchmarkClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BenchError::Config(format!("cannot build HTTP client: {e}")))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(BenchError::Config(format!(
                "base URL must start with http:// or https://, got {base_url}"
            )));
        }
        Ok(Self {
            http,
            base_url,
            registry: CodecRegistry::full(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// One transfer/decode cycle for `format`.
    pub async fn fetch(&self, format: Format) -> Result<CodecResult> {
        let codec = self.registry.get(format)?;
        let url = format!("{}{}", self.base_url, format.path());
        debug!(%format, %url, "requesting");

        let transfer = Transfer::start();
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| BenchError::Request { format, source })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BenchError::Status {
                format,
                status: status.as_u16(),
                body,
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !content_type.starts_with(codec.content_type()) {
            return Err(BenchError::decode(
                format,
                format!(
                    "response content-type {content_type:?}, expected {}",
                    codec.content_type()
                ),
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| BenchError::Request { format, source })?;
        let decoding = transfer.received().begin_decode();
        let records = codec.decode(&body)?;
        let result = decoding.finish(format, body.len() as u64, records.len() as u64);

        if let Some((i, r)) = records
            .iter()
            .enumerate()
            .find(|(i, r)| r.id != *i as u64)
        {
            return Err(BenchError::decode(
                format,
                format!("record {i} has id {}", r.id),
            ));
        }

        info!(
            %format,
            transfer_ms = result.transfer_ms(),
            parse_ms = result.parse_ms(),
            bytes = result.size_bytes,
            records = result.records,
            "fetched"
        );
        Ok(result)
    }

    /// Benchmark `formats` in order. The first format is the baseline.
    pub async fn run(&self, formats: &[Format]) -> Result<BenchResults> {
        validate_formats(formats)?;

        let mut results = Vec::with_capacity(formats.len());
        for &format in formats {
            results.push(self.fetch(format).await?);
        }

        let notes = self
            .registry
            .precision_notes()
            .into_iter()
            .filter(|(f, _)| formats.contains(f))
            .collect();
        Ok(BenchResults::new(results, notes))
    }

    /// Poll `/health` until the server reports `ready` or `timeout` elapses.
    pub async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let url = format!("{}/health", self.base_url);
        let deadline = Instant::now() + timeout;
        loop {
            let health = match self.http.get(&url).send().await {
                Ok(resp) => resp.json::<Health>().await.ok(),
                Err(_) => None,
            };
            if let Some(Health {
                phase: Lifecycle::Ready,
                ..
            }) = health
            {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(BenchError::Startup(format!(
                    "server at {} not ready after {:?}",
                    self.base_url, timeout
                )));
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

fn validate_formats(formats: &[Format]) -> Result<()> {
    if formats.is_empty() {
        return Err(BenchError::Config("at least one format is required".into()));
    }
    let mut seen = HashSet::new();
    for f in formats {
        if !seen.insert(f) {
            return Err(BenchError::Config(format!("format {f} listed twice")));
        }
    }
    Ok(())
}

/// Benchmark `formats` against the server at `base_url` with the default timeout.
pub async fn run_benchmark(base_url: &str, formats: &[Format]) -> Result<BenchResults> {
    BenchmarkClient::new(base_url, DEFAULT_TIMEOUT)?
        .run(formats)
        .await
}
