//! Codec registry: one encode/decode pair per serialization format.
//!
//! JSON, MessagePack and PSON are available immediately. The protobuf codec
//! is attached once its schema file has been checked against the compiled
//! message types; until then [`CodecRegistry::get`] answers
//! [`BenchError::NotReady`] for it.

use crate::dataset::Record;
use crate::{BenchError, Format, Result};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

pub mod json;
pub mod msgpack;
pub mod protobuf;
pub mod pson;

pub use json::JsonCodec;
pub use msgpack::MsgpackCodec;
pub use protobuf::ProtobufCodec;
pub use pson::PsonCodec;

/// Paired encode/decode for one serialization format.
pub trait Codec: Send + Sync {
    fn format(&self) -> Format;

    /// Value of the `Content-Type` header for encoded bodies.
    fn content_type(&self) -> &'static str;

    fn encode(&self, records: &[Record]) -> Result<Vec<u8>>;

    fn decode(&self, bytes: &[u8]) -> Result<Vec<Record>>;

    /// Precision the format gives up relative to the in-memory record, if any.
    fn precision_note(&self) -> Option<&'static str> {
        None
    }
}

#[derive(Clone, Default)]
pub struct CodecRegistry {
    codecs: BTreeMap<Format, Arc<dyn Codec>>,
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.codecs.keys()).finish()
    }
}

impl CodecRegistry {
    /// Registry holding the codecs that need no schema (JSON, MessagePack, PSON).
    pub fn new() -> Self {
        let mut registry = Self::default();
        registry.insert(Arc::new(JsonCodec));
        registry.insert(Arc::new(MsgpackCodec));
        registry.insert(Arc::new(PsonCodec::default()));
        registry
    }

    /// Registry with every format, protobuf using the compiled message types as-is.
    pub fn full() -> Self {
        Self::new().with_protobuf(ProtobufCodec::compiled())
    }

    /// Registry with every format, checking the protobuf schema file first.
    ///
    /// A schema that cannot be read or does not match the compiled types is a
    /// [`BenchError::Startup`].
    pub fn load<P: AsRef<Path>>(schema: P) -> Result<Self> {
        Ok(Self::new().with_protobuf(ProtobufCodec::load(schema)?))
    }

    pub fn with_protobuf(mut self, codec: ProtobufCodec) -> Self {
        self.insert(Arc::new(codec));
        self
    }

    pub fn insert(&mut self, codec: Arc<dyn Codec>) {
        self.codecs.insert(codec.format(), codec);
    }

    pub fn get(&self, format: Format) -> Result<Arc<dyn Codec>> {
        self.codecs
            .get(&format)
            .cloned()
            .ok_or(BenchError::NotReady(format))
    }

    pub fn contains(&self, format: Format) -> bool {
        self.codecs.contains_key(&format)
    }

    /// True once every format has a codec.
    pub fn is_complete(&self) -> bool {
        Format::ALL.iter().all(|f| self.contains(*f))
    }

    /// `(format, note)` for every registered codec that loses precision.
    pub fn precision_notes(&self) -> Vec<(Format, &'static str)> {
        self.codecs
            .iter()
            .filter_map(|(f, c)| c.precision_note().map(|n| (*f, n)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{generate_dataset, GenerateConfig};

    #[test]
    fn test_protobuf_absent_until_attached() {
        let registry = CodecRegistry::new();
        assert!(!registry.is_complete());
        assert!(matches!(
            registry.get(Format::Protobuf),
            Err(BenchError::NotReady(Format::Protobuf))
        ));
        assert!(registry.get(Format::Json).is_ok());

        let registry = registry.with_protobuf(ProtobufCodec::compiled());
        assert!(registry.is_complete());
    }

    #[test]
    fn test_load_checks_schema() {
        let schema = concat!(env!("CARGO_MANIFEST_DIR"), "/proto/item.proto");
        assert!(CodecRegistry::load(schema).unwrap().is_complete());
        assert!(matches!(
            CodecRegistry::load("missing.proto"),
            Err(BenchError::Startup(_))
        ));
    }

    #[test]
    fn test_round_trip_every_codec() {
        let ds = generate_dataset(&GenerateConfig { count: 500, seed: 3 });
        let registry = CodecRegistry::full();

        for format in Format::ALL {
            let codec = registry.get(format).unwrap();
            let bytes = codec.encode(&ds).unwrap();
            let decoded = codec.decode(&bytes).unwrap();

            assert_eq!(decoded.len(), ds.len(), "{format}");
            for (i, (orig, got)) in ds.iter().zip(decoded.iter()).enumerate() {
                assert_eq!(got.id, i as u64, "{format}");
                assert_eq!(got.name, orig.name, "{format}");
                assert_eq!(got.description, orig.description, "{format}");
                assert_eq!(got.quantity, orig.quantity, "{format}");
                assert_eq!(got.tags, orig.tags, "{format}");
                assert_eq!(got.metadata, orig.metadata, "{format}");
                if codec.precision_note().is_none() {
                    assert_eq!(got.price, orig.price, "{format}");
                } else {
                    assert_eq!(got.price, orig.price as f32 as f64, "{format}");
                }
            }
        }
    }

    #[test]
    fn test_empty_dataset_every_codec() {
        let registry = CodecRegistry::full();
        for format in Format::ALL {
            let codec = registry.get(format).unwrap();
            let bytes = codec.encode(&[]).unwrap();
            assert!(codec.decode(&bytes).unwrap().is_empty(), "{format}");
        }
    }

    #[test]
    fn test_only_protobuf_reports_precision_loss() {
        let notes = CodecRegistry::full().precision_notes();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].0, Format::Protobuf);
    }

    #[test]
    fn test_malformed_bytes_are_decode_errors() {
        let registry = CodecRegistry::full();
        let garbage = [0xffu8, 0x00, 0x13, 0x37];
        for format in Format::ALL {
            let err = registry.get(format).unwrap().decode(&garbage).unwrap_err();
            assert!(
                matches!(err, BenchError::Decode { format: f, .. } if f == format),
                "{format}: {err}"
            );
        }
    }
}
