//! Format a schema layout or a decoded snapshot as aligned text.

use crate::schema::{Element, Schema};
use crate::value::Value;

/// `byte.bit` for BOOLs, plain byte offset otherwise.
pub fn format_offset(el: &Element) -> String {
    if el.kind.is_bit_packed() {
        format!("{}.{}", el.byte_offset, el.bit_offset)
    } else {
        format!("{}", el.byte_offset)
    }
}

fn type_label(el: &Element) -> String {
    match el.declared_length {
        Some(n) => format!("{}[{}]", el.kind, n),
        None => el.kind.to_string(),
    }
}

/// One line per leaf: offset, type and path, with a header naming the block.
///
/// ```text
/// "Motor" (version 0.1, 12 bytes)
///   0.0    Bool        run
///   2      Int         speed
/// ```
pub fn layout_table(schema: &Schema) -> String {
    let offsets: Vec<String> = schema.leaves().iter().map(format_offset).collect();
    let types: Vec<String> = schema.leaves().iter().map(type_label).collect();
    let ow = offsets.iter().map(String::len).max().unwrap_or(0);
    let tw = types.iter().map(String::len).max().unwrap_or(0);

    let mut lines = vec![format!(
        "{:?} (version {}, {} bytes)",
        schema.name(),
        schema.version(),
        schema.size()
    )];
    for ((el, off), ty) in schema.leaves().iter().zip(&offsets).zip(&types) {
        lines.push(format!("  {:<ow$}  {:<tw$}  {}", off, ty, el.path, ow = ow, tw = tw));
    }
    lines.join("\n")
}

/// `path = value` lines for a snapshot from [`Schema::decode_all`].
pub fn snapshot_to_dump(snapshot: &[(String, Value)]) -> String {
    let width = snapshot.iter().map(|(p, _)| p.len()).max().unwrap_or(0);
    snapshot
        .iter()
        .map(|(path, v)| format!("{:<width$} = {}", path, v, width = width))
        .collect::<Vec<_>>()
        .join("\n")
}
