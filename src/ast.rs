//! Parse tree for data block declarations.
//!
//! Mirrors the grammar one-to-one: element kinds still carry unresolved type names
//! (primitive names as written, named types by their quoted name). Nothing here has
//! an offset; see [`crate::schema`] for the resolved form.

use std::fmt;

/// One parsed source unit: zero or more type blocks followed by exactly one data block.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    pub types: Vec<TypeDefinition>,
    pub block: BlockDefinition,
}

/// `TYPE "Name" VERSION : x.y STRUCT ... END_STRUCT; END_TYPE`
#[derive(Debug, Clone)]
pub struct TypeDefinition {
    pub name: String,
    pub version: Version,
    pub elements: Vec<ElementDecl>,
}

/// Root of a `DATA_BLOCK`.
#[derive(Debug, Clone)]
pub enum BlockBody {
    Struct(Vec<ElementDecl>),
    /// `DATA_BLOCK "X" ... "SomeType" BEGIN ...`: the block is an instance of a named type.
    Instance(String),
}

#[derive(Debug, Clone)]
pub struct BlockDefinition {
    pub name: String,
    pub version: Version,
    pub non_retain: bool,
    pub body: BlockBody,
}

/// A declared field inside a struct scope.
#[derive(Debug, Clone)]
pub struct ElementDecl {
    pub name: String,
    pub kind: DeclKind,
    /// 1-based line in the source, for diagnostics.
    pub line: usize,
}

#[derive(Debug, Clone)]
pub enum DeclKind {
    /// Primitive type as written (`Int`, `String`), plus an optional `[n]` length annotation.
    Primitive { type_name: String, length: Option<i64> },
    /// Reference to a `TYPE` block by its name (without quotes).
    Named(String),
    Array {
        inner: Box<DeclKind>,
        start: i64,
        end: i64,
    },
    Struct(Vec<ElementDecl>),
}

impl DeclKind {
    pub fn is_struct(&self) -> bool {
        matches!(self, DeclKind::Struct(_))
    }
}

/// `VERSION : 0.1` literal, kept as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version(pub String);

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
