//! Protobuf codec over the `ItemList` message from `proto/item.proto`.
//!
//! The message types are generated from that schema at build time. At
//! startup the schema file is parsed again and its messages are compared
//! against the compiled descriptors, so the server never serves bytes that
//! disagree with the published `.proto`.

use super::Codec;
use crate::dataset::{Metadata, Record};
use crate::{BenchError, Format, Result};
use prost::Message;
use prost_types::{DescriptorProto, FieldDescriptorProto, FileDescriptorSet};
use std::collections::BTreeMap;
use std::path::Path;

pub mod pb {
    include!(concat!(env!("OUT_DIR"), "/bench.rs"));
}

pub use pb::{item, Item, ItemList};

/// Descriptors of `proto/item.proto` as compiled into this binary.
const COMPILED_DESCRIPTORS: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/item_descriptor.bin"));

/// Messages keyed by their name relative to the package (`Item.Metadata`),
/// with the package they were declared in.
fn messages(set: &FileDescriptorSet) -> BTreeMap<String, (&str, &DescriptorProto)> {
    fn visit<'a>(
        out: &mut BTreeMap<String, (&'a str, &'a DescriptorProto)>,
        package: &'a str,
        prefix: &str,
        message: &'a DescriptorProto,
    ) {
        let name = if prefix.is_empty() {
            message.name().to_string()
        } else {
            format!("{prefix}.{}", message.name())
        };
        for nested in &message.nested_type {
            visit(out, package, &name, nested);
        }
        out.insert(name, (package, message));
    }

    let mut out = BTreeMap::new();
    for file in &set.file {
        for message in &file.message_type {
            visit(&mut out, file.package(), "", message);
        }
    }
    out
}

/// Message type reference with the leading `.package.` removed.
fn relative_type<'a>(type_name: &'a str, package: &str) -> &'a str {
    let name = type_name.trim_start_matches('.');
    if package.is_empty() {
        return name;
    }
    name.strip_prefix(package)
        .and_then(|rest| rest.strip_prefix('.'))
        .unwrap_or(name)
}

fn describe(field: &FieldDescriptorProto, package: &str) -> String {
    let mut ty = format!("{:?}", field.r#type());
    if !field.type_name().is_empty() {
        ty = relative_type(field.type_name(), package).to_string();
    }
    format!("{:?} {ty} = {}", field.label(), field.number())
}

/// Every message and field the compiled types use must be declared the same
/// way in `declared`. Extra messages, fields, enums and services are allowed.
fn check_schema(declared: &FileDescriptorSet) -> std::result::Result<(), String> {
    let compiled = FileDescriptorSet::decode(COMPILED_DESCRIPTORS)
        .map_err(|e| format!("compiled descriptors are corrupt: {e}"))?;
    let declared = messages(declared);

    for (name, (package, expected)) in messages(&compiled) {
        let (found_package, found) = declared
            .get(&name)
            .ok_or_else(|| format!("schema is missing message {name}"))?;
        for field in &expected.field {
            let other = found
                .field
                .iter()
                .find(|f| f.name() == field.name())
                .ok_or_else(|| format!("schema is missing {name}.{}", field.name()))?;
            let want = describe(field, package);
            let got = describe(other, found_package);
            if want != got {
                return Err(format!(
                    "{name}.{} is declared as `{got}`, expected `{want}`",
                    field.name()
                ));
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProtobufCodec {
    _private: (),
}

impl ProtobufCodec {
    /// Codec backed by the compiled message types, without reading the schema file.
    pub fn compiled() -> Self {
        Self { _private: () }
    }

    /// Parse the schema at `path` and verify it declares the messages this codec encodes.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let startup = |e: String| BenchError::Startup(format!("protobuf schema {}: {e}", path.display()));

        let file = path
            .file_name()
            .ok_or_else(|| startup("not a file path".to_string()))?;
        let include = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let declared = protox::compile([file], [include]).map_err(|e| startup(e.to_string()))?;
        check_schema(&declared).map_err(startup)?;
        Ok(Self::compiled())
    }
}

fn to_item(record: &Record) -> Result<Item> {
    let id = i32::try_from(record.id)
        .map_err(|_| BenchError::encode(Format::Protobuf, format!("id {} exceeds int32", record.id)))?;
    let quantity = i32::try_from(record.quantity).map_err(|_| {
        BenchError::encode(
            Format::Protobuf,
            format!("quantity {} exceeds int32", record.quantity),
        )
    })?;
    Ok(Item {
        id,
        name: record.name.clone(),
        description: record.description.clone(),
        price: record.price as f32,
        quantity,
        tags: record.tags.clone(),
        metadata: Some(item::Metadata {
            created: record.metadata.created.clone(),
            last_modified: record.metadata.last_modified.clone(),
            category: record.metadata.category.clone(),
        }),
    })
}

fn from_item(item: Item) -> Result<Record> {
    let id = u64::try_from(item.id)
        .map_err(|_| BenchError::decode(Format::Protobuf, format!("negative id {}", item.id)))?;
    let quantity = u32::try_from(item.quantity).map_err(|_| {
        BenchError::decode(Format::Protobuf, format!("negative quantity {}", item.quantity))
    })?;
    let metadata = item.metadata.unwrap_or_default();
    Ok(Record {
        id,
        name: item.name,
        description: item.description,
        price: f64::from(item.price),
        quantity,
        tags: item.tags,
        metadata: Metadata {
            created: metadata.created,
            last_modified: metadata.last_modified,
            category: metadata.category,
        },
    })
}

impl Codec for ProtobufCodec {
    fn format(&self) -> Format {
        Format::Protobuf
    }

    fn content_type(&self) -> &'static str {
        "application/x-protobuf"
    }

    fn encode(&self, records: &[Record]) -> Result<Vec<u8>> {
        let items = records.iter().map(to_item).collect::<Result<Vec<_>>>()?;
        Ok(ItemList { items }.encode_to_vec())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<Record>> {
        let list = ItemList::decode(bytes).map_err(|e| BenchError::decode(Format::Protobuf, e))?;
        list.items.into_iter().map(from_item).collect()
    }

    fn precision_note(&self) -> Option<&'static str> {
        Some("price is a 32-bit float and id/quantity are int32 in item.proto; prices lose precision beyond ~7 significant digits")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const SCHEMA: &str = include_str!("../../proto/item.proto");

    fn schema_file(contents: &str) -> (TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("item.proto");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    fn load(contents: &str) -> Result<ProtobufCodec> {
        let (_dir, path) = schema_file(contents);
        ProtobufCodec::load(path)
    }

    #[test]
    fn test_bundled_schema_matches_compiled_types() {
        load(SCHEMA).unwrap();
        let bundled = concat!(env!("CARGO_MANIFEST_DIR"), "/proto/item.proto");
        ProtobufCodec::load(bundled).unwrap();
    }

    #[test]
    fn test_missing_file_is_startup_error() {
        let err = ProtobufCodec::load("/nonexistent/item.proto").unwrap_err();
        assert!(matches!(err, BenchError::Startup(_)), "{err}");
    }

    #[test]
    fn test_renumbered_field_rejected() {
        let err = load(&SCHEMA.replace("float price = 4;", "float price = 9;")).unwrap_err();
        assert!(matches!(err, BenchError::Startup(_)), "{err}");
        assert!(err.to_string().contains("Item.price"), "{err}");
    }

    #[test]
    fn test_retyped_field_rejected() {
        let err = load(&SCHEMA.replace("float price", "double price")).unwrap_err();
        assert!(err.to_string().contains("Item.price"), "{err}");
    }

    #[test]
    fn test_missing_message_rejected() {
        let broken = SCHEMA.replace("message ItemList", "message Items");
        let err = load(&broken).unwrap_err();
        assert!(err.to_string().contains("ItemList"), "{err}");
    }

    #[test]
    fn test_syntax_error_rejected() {
        let broken = SCHEMA.trim_end().trim_end_matches('}');
        assert!(matches!(load(broken), Err(BenchError::Startup(_))));
    }

    #[test]
    fn test_additional_declarations_accepted() {
        let extended = SCHEMA.replace(
            "message ItemList {",
            "enum Kind {\n  KIND_UNSPECIFIED = 0;\n}\n\n\
             message Extra {\n  map<string, int32> counts = 1;\n  oneof choice {\n    string a = 2;\n    int32 b = 3;\n  }\n  Kind kind = 4;\n}\n\n\
             message ItemList {",
        );
        load(&extended).unwrap();
    }

    #[test]
    fn test_comments_and_qualified_types_accepted() {
        let variant = SCHEMA
            .replace("Metadata metadata = 7;", "Item.Metadata metadata = 7; // nested")
            .replace("package bench;", "// bench schema\npackage other.bench;");
        load(&variant).unwrap();
    }

    #[test]
    fn test_id_beyond_int32_is_encode_error() {
        let ds = crate::dataset::generate_dataset(&crate::dataset::GenerateConfig { count: 1, seed: 0 });
        let mut record = ds[0].clone();
        record.id = u64::from(u32::MAX);
        let err = ProtobufCodec::compiled().encode(&[record]).unwrap_err();
        assert!(matches!(err, BenchError::Encode { format: Format::Protobuf, .. }));
    }
}
