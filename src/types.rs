//! Primitive types of the declaration language and their memory footprint.
//!
//! This table is the only place that maps type names to layout rules. Names are
//! matched case-insensitively (`Int`, `INT` and `int` are the same type).

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Bool,
    Byte,
    Char,
    SInt,
    USInt,
    Int,
    UInt,
    Word,
    DInt,
    UDInt,
    DWord,
    Real,
    LReal,
    Date,
    Time,
    /// Length-prefixed string: max-length byte, current-length byte, content.
    String,
    /// Fixed-length, space padded text without a header.
    FString,
}

/// Where a field may start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    Byte,
    /// Round the byte cursor up to the next even offset.
    Even,
}

/// Size of a primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Size {
    /// One bit, packed with neighbouring booleans.
    Bit,
    Bytes(usize),
    /// Depends on the element's declared length; see [`PrimitiveKind::byte_size`].
    Declared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeInfo {
    pub kind: PrimitiveKind,
    pub name: &'static str,
    pub size: Size,
    pub alignment: Alignment,
}

impl TypeInfo {
    pub fn is_bit_packed(&self) -> bool {
        self.size == Size::Bit
    }
}

const fn info(kind: PrimitiveKind, name: &'static str, size: Size, alignment: Alignment) -> TypeInfo {
    TypeInfo {
        kind,
        name,
        size,
        alignment,
    }
}

/// Header bytes in front of STRING content (max length, current length).
pub const STRING_HEADER_LEN: usize = 2;

static TYPE_TABLE: [TypeInfo; 17] = [
    info(PrimitiveKind::Bool, "Bool", Size::Bit, Alignment::Byte),
    info(PrimitiveKind::Byte, "Byte", Size::Bytes(1), Alignment::Byte),
    info(PrimitiveKind::Char, "Char", Size::Bytes(1), Alignment::Byte),
    info(PrimitiveKind::SInt, "SInt", Size::Bytes(1), Alignment::Byte),
    info(PrimitiveKind::USInt, "USInt", Size::Bytes(1), Alignment::Byte),
    info(PrimitiveKind::Int, "Int", Size::Bytes(2), Alignment::Even),
    info(PrimitiveKind::UInt, "UInt", Size::Bytes(2), Alignment::Even),
    info(PrimitiveKind::Word, "Word", Size::Bytes(2), Alignment::Even),
    info(PrimitiveKind::DInt, "DInt", Size::Bytes(4), Alignment::Even),
    info(PrimitiveKind::UDInt, "UDInt", Size::Bytes(4), Alignment::Even),
    info(PrimitiveKind::DWord, "DWord", Size::Bytes(4), Alignment::Even),
    info(PrimitiveKind::Real, "Real", Size::Bytes(4), Alignment::Even),
    info(PrimitiveKind::LReal, "LReal", Size::Bytes(8), Alignment::Even),
    info(PrimitiveKind::Date, "Date", Size::Bytes(2), Alignment::Even),
    info(PrimitiveKind::Time, "Time", Size::Bytes(4), Alignment::Even),
    info(PrimitiveKind::String, "String", Size::Declared, Alignment::Even),
    info(PrimitiveKind::FString, "FString", Size::Declared, Alignment::Byte),
];

impl PrimitiveKind {
    /// Look up a primitive by its declared name (case-insensitive).
    pub fn from_name(name: &str) -> Option<PrimitiveKind> {
        TYPE_TABLE
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
            .map(|t| t.kind)
    }

    pub fn info(self) -> &'static TypeInfo {
        // Table order matches declaration order of the enum.
        &TYPE_TABLE[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    pub fn alignment(self) -> Alignment {
        self.info().alignment
    }

    pub fn is_bit_packed(self) -> bool {
        self.info().is_bit_packed()
    }

    /// True for STRING and FSTRING, whose size comes from a declared length.
    pub fn needs_length(self) -> bool {
        self.info().size == Size::Declared
    }

    /// Bytes occupied by one value. `declared_length` is required for variable-length
    /// kinds and ignored otherwise; BOOL reports 0 because it occupies a single bit.
    pub fn byte_size(self, declared_length: Option<usize>) -> Option<usize> {
        match self.info().size {
            Size::Bit => Some(0),
            Size::Bytes(n) => Some(n),
            Size::Declared => {
                let n = declared_length?;
                match self {
                    PrimitiveKind::String => n.checked_add(STRING_HEADER_LEN),
                    _ => Some(n),
                }
            }
        }
    }

    pub fn all() -> impl Iterator<Item = PrimitiveKind> {
        TYPE_TABLE.iter().map(|t| t.kind)
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
