//! # s7db: data block declarations, layout and codec
//!
//! Parses the textual declaration of a controller data block (as exported from the
//! engineering tool, `.db` / `.udt` sources) with a PEST grammar, resolves it into a
//! flat schema of leaf fields with exact byte/bit offsets, and encodes/decodes those
//! fields in a raw block image.
//!
//! ## Pipeline
//!
//! - [`parse`]: declaration text -> [`SourceUnit`] (type blocks + one data block)
//! - [`build_schema`]: expand named types, compute offsets -> [`Schema`]
//! - [`decode`] / [`encode`]: one [`Element`] against a caller-owned byte buffer
//!
//! ## Example
//!
//! ```
//! use s7db::{decode, encode, load_schema, Value};
//!
//! let schema = load_schema(r#"
//! DATA_BLOCK "Motor"
//! VERSION : 0.1
//!    STRUCT
//!       run : Bool;
//!       speed : Int;
//!    END_STRUCT;
//! BEGIN
//! END_DATA_BLOCK
//! "#).unwrap();
//!
//! let mut image = vec![0u8; schema.size()];
//! let speed = schema.element("speed").unwrap();
//! encode(&mut image, speed, &Value::I16(1500)).unwrap();
//! assert_eq!(decode(&image, speed).unwrap(), Value::I16(1500));
//! ```
//!
//! Buffers are neither read from nor written to a controller here; transport and
//! file access belong to the caller.

pub mod ast;
pub mod codec;
pub mod dump;
pub mod error;
pub mod parser;
pub mod schema;
pub mod types;
pub mod value;

pub use ast::{BlockBody, BlockDefinition, DeclKind, ElementDecl, SourceUnit, TypeDefinition, Version};
pub use codec::{decode, encode, encode_truncating, CodecError};
pub use error::{Error, Result};
pub use parser::{parse, ParseError};
pub use schema::{
    build_schema, build_schema_with, resolve_path, Element, LayoutOptions, Schema, SchemaError,
    TypeRegistry,
};
pub use types::{Alignment, PrimitiveKind};
pub use value::Value;

/// Parse `source` and build its schema with default [`LayoutOptions`].
pub fn load_schema(source: &str) -> Result<Schema> {
    load_schema_with(source, &LayoutOptions::default())
}

pub fn load_schema_with(source: &str, options: &LayoutOptions) -> Result<Schema> {
    let unit = parse(source)?;
    Ok(build_schema_with(&unit, options)?)
}
