use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod client;
pub mod codec;
pub mod dataset;
pub mod error;
pub mod harness;
pub mod report;
pub mod schema;
pub mod server;

pub use error::{BenchError, Result};

/// Serialization format served by the benchmark server.
#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Textual JSON array of records.
    Json,
    /// MessagePack array of record maps.
    Msgpack,
    /// Protobuf `ItemList` message.
    Protobuf,
    /// PSON token stream (static dictionary).
    Pson,
}

impl Format {
    /// Every format, in the reference reporting order. JSON comes first and is the baseline.
    pub const ALL: [Format; 4] = [Format::Json, Format::Msgpack, Format::Protobuf, Format::Pson];

    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Msgpack => "msgpack",
            Format::Protobuf => "protobuf",
            Format::Pson => "pson",
        }
    }

    /// Human-readable name used in the text report.
    pub fn display_name(&self) -> &'static str {
        match self {
            Format::Json => "JSON",
            Format::Msgpack => "MessagePack",
            Format::Protobuf => "Protobuf",
            Format::Pson => "PSON",
        }
    }

    /// Route the server exposes this format on.
    pub fn path(&self) -> &'static str {
        match self {
            Format::Json => "/json",
            Format::Msgpack => "/msgpack",
            Format::Protobuf => "/protobuf",
            Format::Pson => "/pson",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Format::Json),
            "msgpack" => Ok(Format::Msgpack),
            "protobuf" => Ok(Format::Protobuf),
            "pson" => Ok(Format::Pson),
            other => Err(BenchError::UnknownFormat(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parse_is_case_insensitive() {
        assert_eq!("MsgPack".parse::<Format>().unwrap(), Format::Msgpack);
        assert_eq!(" pson ".parse::<Format>().unwrap(), Format::Pson);
        assert!("bson".parse::<Format>().is_err());
    }

    #[test]
    fn test_json_is_first() {
        assert_eq!(Format::ALL[0], Format::Json);
        for f in Format::ALL {
            assert_eq!(f.path(), format!("/{}", f.as_str()));
        }
    }
}
