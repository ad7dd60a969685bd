use super::Codec;
use crate::dataset::Record;
use crate::{BenchError, Format, Result};

/// JSON array of records via `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn format(&self) -> Format {
        Format::Json
    }

    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn encode(&self, records: &[Record]) -> Result<Vec<u8>> {
        serde_json::to_vec(records).map_err(|e| BenchError::encode(Format::Json, e))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<Record>> {
        serde_json::from_slice(bytes).map_err(|e| BenchError::decode(Format::Json, e))
    }
}
