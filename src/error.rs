//! Crate-level error covering every stage of the pipeline.

use crate::codec::CodecError;
use crate::parser::ParseError;
use crate::schema::SchemaError;
use thiserror::Error;

/// Result type alias for whole-pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("parse: {0}")]
    Parse(#[from] ParseError),
    #[error("schema: {0}")]
    Schema(#[from] SchemaError),
    #[error("codec: {0}")]
    Codec(#[from] CodecError),
}
