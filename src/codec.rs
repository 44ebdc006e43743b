//! Decode/encode leaf values at their schema offsets inside a raw block image.
//!
//! All multi-byte numbers are big-endian. Text is Latin-1: one byte per `char`.
//! The buffer belongs to the caller; `encode` only touches the bytes (or the single
//! bit) of the element being written.

use crate::schema::{Element, MAX_STRING_LENGTH};
use crate::types::{PrimitiveKind, STRING_HEADER_LEN};
use crate::value::Value;
use byteorder::{BigEndian, ByteOrder};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    #[error("{path}: buffer too short ({len} bytes) for {size} byte(s) at offset {offset}")]
    BufferTooShort {
        path: String,
        offset: usize,
        size: usize,
        len: usize,
    },
    #[error("{path}: cannot store {value} in a {kind}")]
    TypeMismatch {
        path: String,
        kind: PrimitiveKind,
        value: String,
    },
    #[error("{path}: {value} is out of range for {kind}")]
    OutOfRange {
        path: String,
        kind: PrimitiveKind,
        value: String,
    },
    #[error("{path}: text of {len} bytes exceeds declared length {max}")]
    StringTooLong { path: String, len: usize, max: usize },
    #[error("{path}: stored length {current} exceeds declared length {max}")]
    InvalidStringHeader {
        path: String,
        current: usize,
        max: usize,
    },
    #[error("{path}: {ch:?} cannot be stored in a single byte")]
    InvalidChar { path: String, ch: char },
    #[error("{path}: {kind} has no declared length")]
    MissingLength { path: String, kind: PrimitiveKind },
    #[error("{path}: declared length {length} is invalid for {kind}")]
    InvalidLength {
        path: String,
        kind: PrimitiveKind,
        length: usize,
    },
    #[error("{path}: bit offset {bit} is outside 0..=7")]
    InvalidBitOffset { path: String, bit: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Overflow {
    Reject,
    Truncate,
}

/// Read the value of `element` from `buffer`.
pub fn decode(buffer: &[u8], element: &Element) -> Result<Value, CodecError> {
    let b = region(buffer, element)?;
    Ok(match element.kind {
        PrimitiveKind::Bool => {
            let bit = bit_offset(element)?;
            Value::Bool((b[0] >> bit) & 1 == 1)
        }
        PrimitiveKind::Byte | PrimitiveKind::USInt => Value::U8(b[0]),
        PrimitiveKind::SInt => Value::I8(b[0] as i8),
        PrimitiveKind::Char => Value::Char(b[0] as char),
        PrimitiveKind::Int => Value::I16(BigEndian::read_i16(b)),
        PrimitiveKind::UInt | PrimitiveKind::Word | PrimitiveKind::Date => {
            Value::U16(BigEndian::read_u16(b))
        }
        PrimitiveKind::DInt => Value::I32(BigEndian::read_i32(b)),
        PrimitiveKind::UDInt | PrimitiveKind::DWord | PrimitiveKind::Time => {
            Value::U32(BigEndian::read_u32(b))
        }
        PrimitiveKind::Real => Value::Float(BigEndian::read_f32(b)),
        PrimitiveKind::LReal => Value::Double(BigEndian::read_f64(b)),
        PrimitiveKind::String => {
            let max = declared_length(element)?;
            let current = b[1] as usize;
            if current > max {
                return Err(CodecError::InvalidStringHeader {
                    path: element.path.clone(),
                    current,
                    max,
                });
            }
            Value::String(latin1_decode(&b[STRING_HEADER_LEN..STRING_HEADER_LEN + current]))
        }
        PrimitiveKind::FString => {
            let text = latin1_decode(b);
            Value::String(text.trim_end_matches(' ').to_string())
        }
    })
}

/// Write `value` into `buffer` at `element`'s place. Text longer than the declared
/// length is an error; see [`encode_truncating`] to clip it instead.
pub fn encode(buffer: &mut [u8], element: &Element, value: &Value) -> Result<(), CodecError> {
    encode_with(buffer, element, value, Overflow::Reject)
}

/// Like [`encode`], but STRING/FSTRING text is cut to the declared length.
pub fn encode_truncating(buffer: &mut [u8], element: &Element, value: &Value) -> Result<(), CodecError> {
    encode_with(buffer, element, value, Overflow::Truncate)
}

fn encode_with(
    buffer: &mut [u8],
    element: &Element,
    value: &Value,
    overflow: Overflow,
) -> Result<(), CodecError> {
    let kind = element.kind;
    // Values are converted and checked before the buffer is touched; a failed encode writes nothing.
    match kind {
        PrimitiveKind::Bool => {
            let bit = bit_offset(element)?;
            let on = value.as_bool().ok_or_else(|| mismatch(element, value))?;
            let b = region_mut(buffer, element)?;
            if on {
                b[0] |= 1 << bit;
            } else {
                b[0] &= !(1 << bit);
            }
        }
        PrimitiveKind::Byte | PrimitiveKind::USInt => {
            let v: u8 = integer(element, value)?;
            region_mut(buffer, element)?[0] = v;
        }
        PrimitiveKind::SInt => {
            let v: i8 = integer(element, value)?;
            region_mut(buffer, element)?[0] = v as u8;
        }
        PrimitiveKind::Char => {
            let Value::Char(c) = value else {
                return Err(mismatch(element, value));
            };
            let v = latin1_byte(element, *c)?;
            region_mut(buffer, element)?[0] = v;
        }
        PrimitiveKind::Int => {
            let v: i16 = integer(element, value)?;
            BigEndian::write_i16(region_mut(buffer, element)?, v);
        }
        PrimitiveKind::UInt | PrimitiveKind::Word | PrimitiveKind::Date => {
            let v: u16 = integer(element, value)?;
            BigEndian::write_u16(region_mut(buffer, element)?, v);
        }
        PrimitiveKind::DInt => {
            let v: i32 = integer(element, value)?;
            BigEndian::write_i32(region_mut(buffer, element)?, v);
        }
        PrimitiveKind::UDInt | PrimitiveKind::DWord | PrimitiveKind::Time => {
            let v: u32 = integer(element, value)?;
            BigEndian::write_u32(region_mut(buffer, element)?, v);
        }
        PrimitiveKind::Real => {
            let v = match value {
                Value::Float(x) => *x,
                Value::Double(x) if x.is_finite() && x.abs() > f32::MAX as f64 => {
                    return Err(out_of_range(element, value));
                }
                Value::Double(x) => *x as f32,
                _ => return Err(mismatch(element, value)),
            };
            BigEndian::write_f32(region_mut(buffer, element)?, v);
        }
        PrimitiveKind::LReal => {
            let v = value.as_f64().ok_or_else(|| mismatch(element, value))?;
            BigEndian::write_f64(region_mut(buffer, element)?, v);
        }
        PrimitiveKind::String => {
            let max = declared_length(element)?;
            let text = text_bytes(element, value, max, overflow)?;
            let b = region_mut(buffer, element)?;
            // b[0] holds the max length and is left as the controller wrote it.
            b[1] = text.len() as u8;
            b[STRING_HEADER_LEN..STRING_HEADER_LEN + text.len()].copy_from_slice(&text);
        }
        PrimitiveKind::FString => {
            let len = declared_length(element)?;
            let text = text_bytes(element, value, len, overflow)?;
            let b = region_mut(buffer, element)?;
            b[..text.len()].copy_from_slice(&text);
            b[text.len()..].fill(b' ');
        }
    }
    Ok(())
}

fn region<'b>(buffer: &'b [u8], element: &Element) -> Result<&'b [u8], CodecError> {
    let (start, end) = bounds(buffer.len(), element)?;
    Ok(&buffer[start..end])
}

fn region_mut<'b>(buffer: &'b mut [u8], element: &Element) -> Result<&'b mut [u8], CodecError> {
    let (start, end) = bounds(buffer.len(), element)?;
    Ok(&mut buffer[start..end])
}

fn bounds(len: usize, element: &Element) -> Result<(usize, usize), CodecError> {
    if element.kind.needs_length() {
        declared_length(element)?;
    }
    let size = element.byte_size();
    let start = element.byte_offset;
    match start.checked_add(size) {
        Some(end) if end <= len => Ok((start, end)),
        _ => Err(CodecError::BufferTooShort {
            path: element.path.clone(),
            offset: start,
            size,
            len,
        }),
    }
}

fn declared_length(element: &Element) -> Result<usize, CodecError> {
    let n = element.declared_length.ok_or_else(|| CodecError::MissingLength {
        path: element.path.clone(),
        kind: element.kind,
    })?;
    // The STRING header stores both lengths in one byte each.
    if element.kind == PrimitiveKind::String && n > MAX_STRING_LENGTH as usize {
        return Err(CodecError::InvalidLength {
            path: element.path.clone(),
            kind: element.kind,
            length: n,
        });
    }
    Ok(n)
}

fn bit_offset(element: &Element) -> Result<u8, CodecError> {
    match element.bit_offset {
        bit @ 0..=7 => Ok(bit),
        bit => Err(CodecError::InvalidBitOffset {
            path: element.path.clone(),
            bit,
        }),
    }
}

fn integer<T: TryFrom<i128>>(element: &Element, value: &Value) -> Result<T, CodecError> {
    let n = value.as_i128().ok_or_else(|| mismatch(element, value))?;
    T::try_from(n).map_err(|_| out_of_range(element, value))
}

fn text_bytes(element: &Element, value: &Value, max: usize, overflow: Overflow) -> Result<Vec<u8>, CodecError> {
    let Value::String(s) = value else {
        return Err(mismatch(element, value));
    };
    let mut bytes = s
        .chars()
        .map(|c| latin1_byte(element, c))
        .collect::<Result<Vec<u8>, _>>()?;
    if bytes.len() > max {
        match overflow {
            Overflow::Reject => {
                return Err(CodecError::StringTooLong {
                    path: element.path.clone(),
                    len: bytes.len(),
                    max,
                })
            }
            Overflow::Truncate => bytes.truncate(max),
        }
    }
    Ok(bytes)
}

fn latin1_byte(element: &Element, c: char) -> Result<u8, CodecError> {
    u8::try_from(u32::from(c)).map_err(|_| CodecError::InvalidChar {
        path: element.path.clone(),
        ch: c,
    })
}

fn latin1_decode(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

fn mismatch(element: &Element, value: &Value) -> CodecError {
    CodecError::TypeMismatch {
        path: element.path.clone(),
        kind: element.kind,
        value: value.to_string(),
    }
}

fn out_of_range(element: &Element, value: &Value) -> CodecError {
    CodecError::OutOfRange {
        path: element.path.clone(),
        kind: element.kind,
        value: value.to_string(),
    }
}
