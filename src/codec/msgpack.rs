use super::Codec;
use crate::dataset::Record;
use crate::{BenchError, Format, Result};

/// MessagePack array of records. Records are written as maps keyed by
/// field name so the payload is self-describing like the JSON one.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgpackCodec;

impl Codec for MsgpackCodec {
    fn format(&self) -> Format {
        Format::Msgpack
    }

    fn content_type(&self) -> &'static str {
        "application/x-msgpack"
    }

    fn encode(&self, records: &[Record]) -> Result<Vec<u8>> {
        rmp_serde::to_vec_named(records).map_err(|e| BenchError::encode(Format::Msgpack, e))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<Record>> {
        rmp_serde::from_slice(bytes).map_err(|e| BenchError::decode(Format::Msgpack, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{generate_dataset, GenerateConfig};

    #[test]
    fn test_records_are_named_maps() {
        let ds = generate_dataset(&GenerateConfig { count: 1, seed: 0 });
        let bytes = MsgpackCodec.encode(&ds).unwrap();
        // fixarray(1) followed by fixmap(7)
        assert_eq!(bytes[0], 0x91);
        assert_eq!(bytes[1], 0x87);
        let needle = b"lastModified";
        assert!(bytes.windows(needle.len()).any(|w| w == needle));
    }
}
