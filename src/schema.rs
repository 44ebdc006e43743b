//! Resolve a parsed source unit into an offset-annotated schema.
//!
//! Named types are expanded against a registry of every `TYPE` block in the unit, then
//! all leaves are placed depth-first in declaration order with one running cursor:
//!
//! - a non-BOOL primitive closes any partially used bit byte, aligns to an even offset
//!   when its type requires it, then takes `size` bytes;
//! - consecutive BOOLs share a byte (bits 0..7), across struct boundaries too;
//! - arrays start on a fresh byte and never share bits with their neighbours.

use crate::ast::{BlockBody, DeclKind, ElementDecl, SourceUnit, TypeDefinition, Version};
use crate::codec::{self, CodecError};
use crate::types::{Alignment, PrimitiveKind};
use crate::value::Value;
use std::collections::{HashMap, HashSet};

/// Largest max-length a STRING header byte can hold on the controller.
pub const MAX_STRING_LENGTH: i64 = 254;

/// Default limit on the block image: a standard-access DB holds at most 64 KiB.
pub const MAX_BLOCK_SIZE: usize = 65_536;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("unknown type \"{name}\" referenced by {referenced_by}")]
    UnknownType { name: String, referenced_by: String },
    #[error("unsupported primitive type {name} at {path}")]
    UnsupportedType { path: String, name: String },
    #[error("cyclic type reference: {}", .chain.join(" -> "))]
    CyclicReference { chain: Vec<String> },
    #[error("{kind} at {path} needs a declared length")]
    MissingLength { path: String, kind: PrimitiveKind },
    #[error("{kind} at {path} takes no length annotation")]
    UnexpectedLength { path: String, kind: PrimitiveKind },
    #[error("{kind} at {path}: invalid length {length}")]
    InvalidLength {
        path: String,
        kind: PrimitiveKind,
        length: i64,
    },
    #[error("duplicate field {name} in {scope}")]
    DuplicateField { scope: String, name: String },
    #[error("type \"{0}\" is declared more than once")]
    DuplicateType(String),
    #[error("array {path} [{start}..{end}] has too many elements")]
    ArrayTooLarge { path: String, start: i64, end: i64 },
    #[error("{path} ends at byte {end}, beyond the {max} byte block limit")]
    BlockTooLarge { path: String, end: usize, max: usize },
    #[error("path {0} names more than one element")]
    AmbiguousPath(String),
    #[error("no element at path {0}")]
    PathNotFound(String),
}

/// Layout knobs. Passed explicitly; nothing is read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutOptions {
    /// Max length given to a `String` declared without `[n]`. `None` rejects such fields.
    pub default_string_length: Option<u16>,
    /// Largest block image, in bytes, a declaration may lay out.
    pub max_block_size: usize,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        LayoutOptions {
            default_string_length: None,
            max_block_size: MAX_BLOCK_SIZE,
        }
    }
}

impl LayoutOptions {
    /// Options matching the controller's own default of `String` = `String[254]`.
    pub fn tia_defaults() -> Self {
        LayoutOptions {
            default_string_length: Some(MAX_STRING_LENGTH as u16),
            ..LayoutOptions::default()
        }
    }
}

/// A leaf of the resolved schema: one primitive value at a fixed place in the block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Dotted path from the block root, e.g. `outer.inner[2].field`.
    pub path: String,
    /// Declared name of the leaf, with its index for array items (`field`, `flags[3]`).
    pub name: String,
    pub kind: PrimitiveKind,
    pub byte_offset: usize,
    /// Bit inside `byte_offset`; always 0 unless `kind` is BOOL.
    pub bit_offset: u8,
    /// Declared length of STRING / FSTRING content.
    pub declared_length: Option<usize>,
}

impl Element {
    /// Bytes touched by this element (1 for BOOL).
    pub fn byte_size(&self) -> usize {
        match self.kind.byte_size(self.declared_length) {
            Some(0) | None => 1,
            Some(n) => n,
        }
    }
}

/// Fully resolved data block layout.
#[derive(Debug, Clone)]
pub struct Schema {
    name: String,
    version: Version,
    size: usize,
    leaves: Vec<Element>,
    index: HashMap<String, usize>,
}

impl Schema {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Byte length of the block image; the read length to request from a controller.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Leaves in declaration order.
    pub fn leaves(&self) -> &[Element] {
        &self.leaves
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    pub fn element(&self, path: &str) -> Result<&Element, SchemaError> {
        resolve_path(self, path)
    }

    /// Decode every leaf of `buffer`, in declaration order. Stops at the first failure.
    pub fn decode_all(&self, buffer: &[u8]) -> Result<Vec<(String, Value)>, CodecError> {
        self.leaves
            .iter()
            .map(|el| Ok((el.path.clone(), codec::decode(buffer, el)?)))
            .collect()
    }
}

/// Look up a leaf by dotted path.
pub fn resolve_path<'s>(schema: &'s Schema, path: &str) -> Result<&'s Element, SchemaError> {
    schema
        .index
        .get(path)
        .map(|&i| &schema.leaves[i])
        .ok_or_else(|| SchemaError::PathNotFound(path.to_string()))
}

/// Build a schema with default [`LayoutOptions`].
pub fn build_schema(unit: &SourceUnit) -> Result<Schema, SchemaError> {
    build_schema_with(unit, &LayoutOptions::default())
}

pub fn build_schema_with(unit: &SourceUnit, options: &LayoutOptions) -> Result<Schema, SchemaError> {
    let registry = TypeRegistry::new(&unit.types)?;
    registry.check_references()?;

    let block = &unit.block;
    let mut layout = Layout {
        registry: &registry,
        options,
        leaves: Vec::new(),
    };
    let mut cursor = Cursor::default();
    match &block.body {
        BlockBody::Struct(elements) => layout.lay_out_elements(elements, "", &mut cursor)?,
        BlockBody::Instance(type_name) => {
            let def = layout.lookup(type_name, &block.name)?;
            layout.lay_out_elements(&def.elements, "", &mut cursor)?;
        }
    }
    cursor.close_bits();

    let leaves = layout.leaves;
    let mut index = HashMap::with_capacity(leaves.len());
    for (i, el) in leaves.iter().enumerate() {
        // Names may contain '.', so `"a.b"` and `a` -> `b` can collide.
        if index.insert(el.path.clone(), i).is_some() {
            return Err(SchemaError::AmbiguousPath(el.path.clone()));
        }
    }
    log::debug!(
        "built schema for {:?}: {} leaves, {} bytes",
        block.name,
        leaves.len(),
        cursor.byte
    );
    Ok(Schema {
        name: block.name.clone(),
        version: block.version.clone(),
        size: cursor.byte,
        leaves,
        index,
    })
}

/// Every `TYPE` block of one source unit, by name. Read-only once built.
#[derive(Debug, Clone)]
pub struct TypeRegistry<'a> {
    types: HashMap<&'a str, &'a TypeDefinition>,
    order: Vec<&'a str>,
}

impl<'a> TypeRegistry<'a> {
    pub fn new(types: &'a [TypeDefinition]) -> Result<Self, SchemaError> {
        let mut map = HashMap::new();
        let mut order = Vec::new();
        for def in types {
            if map.insert(def.name.as_str(), def).is_some() {
                return Err(SchemaError::DuplicateType(def.name.clone()));
            }
            order.push(def.name.as_str());
        }
        Ok(TypeRegistry { types: map, order })
    }

    pub fn get(&self, name: &str) -> Option<&'a TypeDefinition> {
        self.types.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Fail on the first reference to an undeclared type or on any reference cycle,
    /// including cycles between types the data block never uses.
    pub fn check_references(&self) -> Result<(), SchemaError> {
        let mut done = HashSet::new();
        let mut stack = Vec::new();
        for &name in &self.order {
            self.visit(name, name, &mut stack, &mut done)?;
        }
        Ok(())
    }

    fn visit(
        &self,
        name: &'a str,
        referenced_by: &str,
        stack: &mut Vec<&'a str>,
        done: &mut HashSet<&'a str>,
    ) -> Result<(), SchemaError> {
        if done.contains(name) {
            return Ok(());
        }
        if let Some(pos) = stack.iter().position(|n| *n == name) {
            let mut chain: Vec<String> = stack[pos..].iter().map(|s| s.to_string()).collect();
            chain.push(name.to_string());
            return Err(SchemaError::CyclicReference { chain });
        }
        let def = self.get(name).ok_or_else(|| SchemaError::UnknownType {
            name: name.to_string(),
            referenced_by: referenced_by.to_string(),
        })?;
        log::trace!("expanding type {:?}", name);
        stack.push(name);
        let mut refs = Vec::new();
        collect_named_refs(&def.elements, &mut refs);
        for r in refs {
            self.visit(r, name, stack, done)?;
        }
        stack.pop();
        done.insert(name);
        Ok(())
    }
}

fn collect_named_refs<'a>(elements: &'a [ElementDecl], out: &mut Vec<&'a str>) {
    fn walk<'a>(kind: &'a DeclKind, out: &mut Vec<&'a str>) {
        match kind {
            DeclKind::Named(n) => out.push(n),
            DeclKind::Array { inner, .. } => walk(inner, out),
            DeclKind::Struct(children) => collect_named_refs(children, out),
            DeclKind::Primitive { .. } => {}
        }
    }
    for el in elements {
        walk(&el.kind, out);
    }
}

/// Byte cursor plus the next free bit of a byte shared by consecutive BOOLs.
#[derive(Debug, Clone, Copy, Default)]
struct Cursor {
    byte: usize,
    bit: Option<u8>,
}

impl Cursor {
    fn at(byte: usize) -> Self {
        Cursor { byte, bit: None }
    }

    fn close_bits(&mut self) {
        if self.bit.take().is_some() {
            self.byte += 1;
        }
    }

    fn align_even(&mut self) {
        self.byte += self.byte % 2;
    }

    fn place_bool(&mut self) -> (usize, u8) {
        let bit = self.bit.unwrap_or(0);
        let at = (self.byte, bit);
        if bit == 7 {
            self.byte += 1;
            self.bit = None;
        } else {
            self.bit = Some(bit + 1);
        }
        at
    }
}

struct Layout<'r, 'a> {
    registry: &'r TypeRegistry<'a>,
    options: &'r LayoutOptions,
    leaves: Vec<Element>,
}

impl<'r, 'a> Layout<'r, 'a> {
    fn lookup(&self, name: &str, referenced_by: &str) -> Result<&'a TypeDefinition, SchemaError> {
        self.registry.get(name).ok_or_else(|| SchemaError::UnknownType {
            name: name.to_string(),
            referenced_by: referenced_by.to_string(),
        })
    }

    fn lay_out_elements(
        &mut self,
        elements: &'a [ElementDecl],
        prefix: &str,
        cursor: &mut Cursor,
    ) -> Result<(), SchemaError> {
        let mut seen = HashSet::new();
        for el in elements {
            if !seen.insert(el.name.as_str()) {
                return Err(SchemaError::DuplicateField {
                    scope: if prefix.is_empty() { "<root>".to_string() } else { prefix.to_string() },
                    name: el.name.clone(),
                });
            }
            let path = if prefix.is_empty() {
                el.name.clone()
            } else {
                format!("{}.{}", prefix, el.name)
            };
            self.lay_out_kind(&el.kind, &path, &el.name, cursor)?;
        }
        Ok(())
    }

    fn lay_out_kind(
        &mut self,
        kind: &'a DeclKind,
        path: &str,
        name: &str,
        cursor: &mut Cursor,
    ) -> Result<(), SchemaError> {
        match kind {
            DeclKind::Primitive { type_name, length } => {
                let (prim, len) = self.primitive(type_name, *length, path)?;
                self.place(prim, len, path, name, cursor)?;
            }
            DeclKind::Named(name) => {
                let def = self.lookup(name, path)?;
                self.lay_out_elements(&def.elements, path, cursor)?;
            }
            DeclKind::Struct(children) => self.lay_out_elements(children, path, cursor)?,
            DeclKind::Array { inner, start, end } => {
                self.lay_out_array(inner, *start, *end, path, name, cursor)?
            }
        }
        Ok(())
    }

    fn lay_out_array(
        &mut self,
        inner: &'a DeclKind,
        start: i64,
        end: i64,
        path: &str,
        name: &str,
        cursor: &mut Cursor,
    ) -> Result<(), SchemaError> {
        let too_large = || SchemaError::ArrayTooLarge {
            path: path.to_string(),
            start,
            end,
        };
        let count = end
            .checked_sub(start)
            .and_then(|d| d.checked_add(1))
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(too_large)?;
        let index = |i: usize| start + i as i64;
        let item_path = |i: usize| format!("{}[{}]", path, index(i));
        let item_name = |i: usize| format!("{}[{}]", name, index(i));
        cursor.close_bits();

        if let DeclKind::Primitive { type_name, length } = inner {
            let (prim, len) = self.primitive(type_name, *length, path)?;
            if prim.is_bit_packed() {
                let base = cursor.byte;
                let used = base.checked_add(count.div_ceil(8)).ok_or_else(too_large)?;
                self.ensure_fits(path, used)?;
                for i in 0..count {
                    self.push(&item_path(i), &item_name(i), prim, base + i / 8, (i % 8) as u8, None);
                }
                cursor.byte = used;
                return Ok(());
            }
            if prim.alignment() == Alignment::Even {
                cursor.align_even();
            }
            let size = prim.byte_size(len).unwrap_or(0);
            let base = cursor.byte;
            let used = count
                .checked_mul(size)
                .and_then(|n| base.checked_add(n))
                .ok_or_else(too_large)?;
            self.ensure_fits(path, used)?;
            for i in 0..count {
                self.push(&item_path(i), &item_name(i), prim, base + i * size, 0, len);
            }
            cursor.byte = used;
            return Ok(());
        }

        // Struct or named type: lay out the first item to learn the stride, then place
        // every item from its own fresh cursor so bits never cross item boundaries.
        cursor.align_even();
        let base = cursor.byte;
        let mut first = Cursor::at(base);
        self.lay_out_kind(inner, &item_path(0), &item_name(0), &mut first)?;
        first.close_bits();
        let mut stride = first.byte - base;
        stride += stride % 2;
        let used = count
            .checked_mul(stride)
            .and_then(|n| base.checked_add(n))
            .ok_or_else(too_large)?;
        self.ensure_fits(path, used)?;
        for i in 1..count {
            let mut item = Cursor::at(base + i * stride);
            self.lay_out_kind(inner, &item_path(i), &item_name(i), &mut item)?;
        }
        cursor.byte = used;
        Ok(())
    }

    fn place(
        &mut self,
        kind: PrimitiveKind,
        len: Option<usize>,
        path: &str,
        name: &str,
        cursor: &mut Cursor,
    ) -> Result<(), SchemaError> {
        if kind.is_bit_packed() {
            let (byte, bit) = cursor.place_bool();
            self.ensure_fits(path, byte + 1)?;
            self.push(path, name, kind, byte, bit, None);
            return Ok(());
        }
        cursor.close_bits();
        if kind.alignment() == Alignment::Even {
            cursor.align_even();
        }
        let offset = cursor.byte;
        cursor.byte += kind.byte_size(len).unwrap_or(0);
        self.ensure_fits(path, cursor.byte)?;
        self.push(path, name, kind, offset, 0, len);
        Ok(())
    }

    fn ensure_fits(&self, path: &str, end: usize) -> Result<(), SchemaError> {
        let max = self.options.max_block_size;
        if end > max {
            return Err(SchemaError::BlockTooLarge {
                path: path.to_string(),
                end,
                max,
            });
        }
        Ok(())
    }

    fn push(
        &mut self,
        path: &str,
        name: &str,
        kind: PrimitiveKind,
        byte_offset: usize,
        bit_offset: u8,
        declared_length: Option<usize>,
    ) {
        log::trace!("{} {} @ {}.{}", path, kind, byte_offset, bit_offset);
        self.leaves.push(Element {
            path: path.to_string(),
            name: name.to_string(),
            kind,
            byte_offset,
            bit_offset,
            declared_length,
        });
    }

    /// Resolve a primitive name and validate its length annotation.
    fn primitive(
        &self,
        type_name: &str,
        length: Option<i64>,
        path: &str,
    ) -> Result<(PrimitiveKind, Option<usize>), SchemaError> {
        let kind = PrimitiveKind::from_name(type_name).ok_or_else(|| SchemaError::UnsupportedType {
            path: path.to_string(),
            name: type_name.to_string(),
        })?;
        if !kind.needs_length() {
            if length.is_some() {
                return Err(SchemaError::UnexpectedLength {
                    path: path.to_string(),
                    kind,
                });
            }
            return Ok((kind, None));
        }
        let fallback = match kind {
            PrimitiveKind::String => self.options.default_string_length.map(i64::from),
            _ => None,
        };
        let n = length.or(fallback).ok_or_else(|| SchemaError::MissingLength {
            path: path.to_string(),
            kind,
        })?;
        let valid = match kind {
            PrimitiveKind::String => (0..=MAX_STRING_LENGTH).contains(&n),
            _ => (1..=i64::from(u16::MAX)).contains(&n),
        };
        if !valid {
            return Err(SchemaError::InvalidLength {
                path: path.to_string(),
                kind,
                length: n,
            });
        }
        Ok((kind, Some(n as usize)))
    }
}
