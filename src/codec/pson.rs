//! PSON codec.
//!
//! PSON is a compact binary rendition of the JSON data model. Every value
//! starts with a one-byte token; small integers are folded into the token
//! itself, everything else is followed by a varint length or a fixed-width
//! little-endian number.
//!
//! ```text
//! 0x00..=0xEF  zig-zag encoded integer in -120..=119
//! 0xF0 NULL        0xF1 TRUE        0xF2 FALSE
//! 0xF3 EOBJECT     0xF4 EARRAY      0xF5 ESTRING
//! 0xF6 OBJECT      varint count, then (key, value) pairs
//! 0xF7 ARRAY       varint count, then values
//! 0xF8 INTEGER     zig-zag varint32
//! 0xF9 LONG        zig-zag varint64
//! 0xFA FLOAT       f32 LE
//! 0xFB DOUBLE      f64 LE
//! 0xFC STRING      varint length, UTF-8 bytes
//! 0xFD STRING_ADD  as STRING, and appended to the dictionary
//! 0xFE STRING_GET  varint dictionary index
//! 0xFF BINARY      varint length, raw bytes
//! ```
//!
//! The codec is a static pair: encoder and decoder share a fixed dictionary
//! (empty by default) and the encoder never grows it.

use super::Codec;
use crate::dataset::Record;
use crate::{BenchError, Format, Result};
use serde_json::{Map, Number, Value};
use std::collections::HashMap;

mod token {
    pub const MAX: u8 = 0xEF;
    pub const NULL: u8 = 0xF0;
    pub const TRUE: u8 = 0xF1;
    pub const FALSE: u8 = 0xF2;
    pub const EOBJECT: u8 = 0xF3;
    pub const EARRAY: u8 = 0xF4;
    pub const ESTRING: u8 = 0xF5;
    pub const OBJECT: u8 = 0xF6;
    pub const ARRAY: u8 = 0xF7;
    pub const INTEGER: u8 = 0xF8;
    pub const LONG: u8 = 0xF9;
    pub const FLOAT: u8 = 0xFA;
    pub const DOUBLE: u8 = 0xFB;
    pub const STRING: u8 = 0xFC;
    pub const STRING_ADD: u8 = 0xFD;
    pub const STRING_GET: u8 = 0xFE;
    pub const BINARY: u8 = 0xFF;
}

/// Deepest array/object nesting the decoder accepts.
pub const MAX_DEPTH: usize = 128;

fn zigzag32(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

fn unzigzag32(z: u32) -> i32 {
    ((z >> 1) as i32) ^ -((z & 1) as i32)
}

fn zigzag64(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

fn unzigzag64(z: u64) -> i64 {
    ((z >> 1) as i64) ^ -((z & 1) as i64)
}

fn write_varint(out: &mut Vec<u8>, mut v: u64) {
    while v >= 0x80 {
        out.push((v as u8) | 0x80);
        v >>= 7;
    }
    out.push(v as u8);
}

#[derive(Debug, Clone, Default)]
pub struct PsonCodec {
    dictionary: Vec<String>,
    index: HashMap<String, u32>,
}

impl PsonCodec {
    /// Static pair sharing `dictionary` between encoder and decoder.
    pub fn with_dictionary(dictionary: Vec<String>) -> Self {
        let index = dictionary
            .iter()
            .enumerate()
            .map(|(i, s)| (s.clone(), i as u32))
            .collect();
        Self { dictionary, index }
    }

    pub fn encode_value(&self, value: &Value) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_value(&mut out, value);
        out
    }

    pub fn decode_value(&self, bytes: &[u8]) -> std::result::Result<Value, String> {
        let mut reader = Reader {
            buf: bytes,
            pos: 0,
            depth: 0,
            dictionary: self.dictionary.clone(),
        };
        let value = reader.read_value()?;
        if reader.pos != bytes.len() {
            return Err(format!(
                "{} trailing bytes after value",
                bytes.len() - reader.pos
            ));
        }
        Ok(value)
    }

    fn write_string(&self, out: &mut Vec<u8>, s: &str) {
        if s.is_empty() {
            out.push(token::ESTRING);
        } else if let Some(&idx) = self.index.get(s) {
            out.push(token::STRING_GET);
            write_varint(out, u64::from(idx));
        } else {
            out.push(token::STRING);
            write_varint(out, s.len() as u64);
            out.extend_from_slice(s.as_bytes());
        }
    }

    fn write_number(&self, out: &mut Vec<u8>, n: &Number) {
        if let Some(i) = n.as_i64() {
            if let Ok(small) = i32::try_from(i) {
                let zz = zigzag32(small);
                if zz <= u32::from(token::MAX) {
                    out.push(zz as u8);
                } else {
                    out.push(token::INTEGER);
                    write_varint(out, u64::from(zz));
                }
            } else {
                out.push(token::LONG);
                write_varint(out, zigzag64(i));
            }
            return;
        }

        // u64 beyond i64::MAX or a true float.
        let f = n.as_f64().unwrap_or(f64::NAN);
        if f64::from(f as f32) == f {
            out.push(token::FLOAT);
            out.extend_from_slice(&(f as f32).to_le_bytes());
        } else {
            out.push(token::DOUBLE);
            out.extend_from_slice(&f.to_le_bytes());
        }
    }

    fn write_value(&self, out: &mut Vec<u8>, value: &Value) {
        match value {
            Value::Null => out.push(token::NULL),
            Value::Bool(true) => out.push(token::TRUE),
            Value::Bool(false) => out.push(token::FALSE),
            Value::Number(n) => self.write_number(out, n),
            Value::String(s) => self.write_string(out, s),
            Value::Array(items) if items.is_empty() => out.push(token::EARRAY),
            Value::Array(items) => {
                out.push(token::ARRAY);
                write_varint(out, items.len() as u64);
                for item in items {
                    self.write_value(out, item);
                }
            }
            Value::Object(map) if map.is_empty() => out.push(token::EOBJECT),
            Value::Object(map) => {
                out.push(token::OBJECT);
                write_varint(out, map.len() as u64);
                for (k, v) in map {
                    self.write_string(out, k);
                    self.write_value(out, v);
                }
            }
        }
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    depth: usize,
    dictionary: Vec<String>,
}

impl Reader<'_> {
    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn byte(&mut self) -> std::result::Result<u8, String> {
        let b = *self
            .buf
            .get(self.pos)
            .ok_or_else(|| format!("unexpected end of input at offset {}", self.pos))?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, len: usize) -> std::result::Result<&[u8], String> {
        if len > self.remaining() {
            return Err(format!(
                "length {len} at offset {} exceeds remaining {} bytes",
                self.pos,
                self.remaining()
            ));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn varint(&mut self, max_bytes: u32) -> std::result::Result<u64, String> {
        let mut v = 0u64;
        for i in 0..max_bytes {
            let b = self.byte()?;
            v |= u64::from(b & 0x7f) << (7 * i);
            if b & 0x80 == 0 {
                return Ok(v);
            }
        }
        Err(format!("varint longer than {max_bytes} bytes"))
    }

    fn varint32(&mut self) -> std::result::Result<u32, String> {
        let v = self.varint(5)?;
        u32::try_from(v).map_err(|_| format!("varint {v} at offset {} exceeds 32 bits", self.pos))
    }

    fn length(&mut self) -> std::result::Result<usize, String> {
        Ok(self.varint32()? as usize)
    }

    fn enter(&mut self) -> std::result::Result<(), String> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(format!("nesting deeper than {MAX_DEPTH} levels"));
        }
        Ok(())
    }

    fn string(&mut self) -> std::result::Result<String, String> {
        let len = self.length()?;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| format!("invalid UTF-8 string: {e}"))
    }

    fn float(v: f64) -> std::result::Result<Value, String> {
        Number::from_f64(v)
            .map(Value::Number)
            .ok_or_else(|| format!("non-finite number {v} has no JSON representation"))
    }

    fn read_value(&mut self) -> std::result::Result<Value, String> {
        let t = self.byte()?;
        if t <= token::MAX {
            return Ok(Value::from(unzigzag32(u32::from(t))));
        }
        match t {
            token::NULL => Ok(Value::Null),
            token::TRUE => Ok(Value::Bool(true)),
            token::FALSE => Ok(Value::Bool(false)),
            token::EOBJECT => Ok(Value::Object(Map::new())),
            token::EARRAY => Ok(Value::Array(Vec::new())),
            token::ESTRING => Ok(Value::String(String::new())),
            token::OBJECT => {
                let n = self.length()?;
                self.enter()?;
                let mut map = Map::new();
                for _ in 0..n {
                    let key = match self.read_value()? {
                        Value::String(k) => k,
                        other => return Err(format!("object key is not a string: {other}")),
                    };
                    let value = self.read_value()?;
                    map.insert(key, value);
                }
                self.depth -= 1;
                Ok(Value::Object(map))
            }
            token::ARRAY => {
                let n = self.length()?;
                self.enter()?;
                // Every element takes at least one byte.
                let mut items = Vec::with_capacity(n.min(self.remaining()));
                for _ in 0..n {
                    items.push(self.read_value()?);
                }
                self.depth -= 1;
                Ok(Value::Array(items))
            }
            token::INTEGER => Ok(Value::from(unzigzag32(self.varint32()?))),
            token::LONG => Ok(Value::from(unzigzag64(self.varint(10)?))),
            token::FLOAT => {
                let mut b = [0u8; 4];
                b.copy_from_slice(self.take(4)?);
                Self::float(f64::from(f32::from_le_bytes(b)))
            }
            token::DOUBLE => {
                let mut b = [0u8; 8];
                b.copy_from_slice(self.take(8)?);
                Self::float(f64::from_le_bytes(b))
            }
            token::STRING => self.string().map(Value::String),
            token::STRING_ADD => {
                let s = self.string()?;
                self.dictionary.push(s.clone());
                Ok(Value::String(s))
            }
            token::STRING_GET => {
                let idx = self.length()?;
                self.dictionary
                    .get(idx)
                    .cloned()
                    .map(Value::String)
                    .ok_or_else(|| format!("dictionary index {idx} out of range"))
            }
            token::BINARY => Err("binary values have no record representation".to_string()),
            other => Err(format!("unknown token 0x{other:02x}")),
        }
    }
}

impl Codec for PsonCodec {
    fn format(&self) -> Format {
        Format::Pson
    }

    fn content_type(&self) -> &'static str {
        "application/x-pson"
    }

    fn encode(&self, records: &[Record]) -> Result<Vec<u8>> {
        let value = serde_json::to_value(records).map_err(|e| BenchError::encode(Format::Pson, e))?;
        Ok(self.encode_value(&value))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<Record>> {
        let value = self
            .decode_value(bytes)
            .map_err(|e| BenchError::decode(Format::Pson, e))?;
        serde_json::from_value(value).map_err(|e| BenchError::decode(Format::Pson, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_small_integers_fold_into_token() {
        let codec = PsonCodec::default();
        assert_eq!(codec.encode_value(&json!(0)), vec![0x00]);
        assert_eq!(codec.encode_value(&json!(-1)), vec![0x01]);
        assert_eq!(codec.encode_value(&json!(1)), vec![0x02]);
        assert_eq!(codec.encode_value(&json!(119)), vec![0xEE]);
        assert_eq!(codec.encode_value(&json!(-120)), vec![0xEF]);
        // 120 zig-zags to 240, past the token range.
        assert_eq!(codec.encode_value(&json!(120)), vec![token::INTEGER, 0xF0, 0x01]);
    }

    #[test]
    fn test_float_vs_double() {
        let codec = PsonCodec::default();
        let half = codec.encode_value(&json!(0.5));
        assert_eq!(half[0], token::FLOAT);
        assert_eq!(half.len(), 5);
        let tenth = codec.encode_value(&json!(0.1));
        assert_eq!(tenth[0], token::DOUBLE);
        assert_eq!(codec.decode_value(&tenth).unwrap(), json!(0.1));
    }

    #[test]
    fn test_empty_containers_and_strings() {
        let codec = PsonCodec::default();
        assert_eq!(codec.encode_value(&json!([])), vec![token::EARRAY]);
        assert_eq!(codec.encode_value(&json!({})), vec![token::EOBJECT]);
        assert_eq!(codec.encode_value(&json!("")), vec![token::ESTRING]);
        assert_eq!(
            codec.encode_value(&json!([null, true, false])),
            vec![token::ARRAY, 3, token::NULL, token::TRUE, token::FALSE]
        );
    }

    #[test]
    fn test_nested_document() {
        let codec = PsonCodec::default();
        let doc = json!({
            "id": 70000,
            "big": 5_000_000_000i64,
            "neg": -3,
            "name": "Item 7",
            "tags": ["a", "", "c"],
            "meta": {"x": {}, "y": []}
        });
        let bytes = codec.encode_value(&doc);
        assert_eq!(codec.decode_value(&bytes).unwrap(), doc);
    }

    #[test]
    fn test_static_dictionary() {
        let dict = vec!["tags".to_string(), "tag1".to_string()];
        let codec = PsonCodec::with_dictionary(dict);
        let doc = json!({"tags": ["tag1", "tag2"]});
        let bytes = codec.encode_value(&doc);
        assert_eq!(&bytes[..4], &[token::OBJECT, 1, token::STRING_GET, 0]);
        assert_eq!(codec.decode_value(&bytes).unwrap(), doc);

        // Without the shared dictionary the reference cannot be resolved.
        assert!(PsonCodec::default().decode_value(&bytes).is_err());
    }

    #[test]
    fn test_string_add_extends_dictionary() {
        let codec = PsonCodec::default();
        let bytes = [token::ARRAY, 2, token::STRING_ADD, 1, b'k', token::STRING_GET, 0];
        assert_eq!(codec.decode_value(&bytes).unwrap(), json!(["k", "k"]));
    }

    #[test]
    fn test_truncated_and_trailing_input_rejected() {
        let codec = PsonCodec::default();
        assert!(codec.decode_value(&[token::STRING, 10, b'a']).is_err());
        assert!(codec.decode_value(&[token::ARRAY, 2, 0x00]).is_err());
        assert!(codec.decode_value(&[0x00, 0x00]).is_err());
        assert!(codec.decode_value(&[]).is_err());
    }

    #[test]
    fn test_deep_nesting_rejected() {
        let codec = PsonCodec::default();

        let mut ok = [token::ARRAY, 1].repeat(MAX_DEPTH);
        ok.push(token::NULL);
        assert!(codec.decode_value(&ok).is_ok());

        let mut deep = [token::ARRAY, 1].repeat(1_000_000);
        deep.push(token::NULL);
        let err = codec.decode(&deep).unwrap_err();
        assert!(matches!(err, BenchError::Decode { format: Format::Pson, .. }), "{err}");
        assert!(err.to_string().contains("nesting"), "{err}");
    }

    #[test]
    fn test_oversized_length_rejected() {
        let codec = PsonCodec::default();
        // 2^32 + 1 as a 5-byte varint; truncating would read it as length 1.
        let bytes = [token::STRING, 0x81, 0x80, 0x80, 0x80, 0x10, b'a'];
        let err = codec.decode_value(&bytes).unwrap_err();
        assert!(err.contains("32 bits"), "{err}");

        let int = [token::INTEGER, 0xff, 0xff, 0xff, 0xff, 0x7f];
        assert!(codec.decode_value(&int).is_err());
    }

    #[test]
    fn test_non_string_key_rejected() {
        let codec = PsonCodec::default();
        let err = codec.decode_value(&[token::OBJECT, 1, 0x02, 0x02]).unwrap_err();
        assert!(err.contains("key"), "{err}");
    }
}
