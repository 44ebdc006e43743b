//! Parse declaration source into a [`SourceUnit`] using PEST.

use crate::ast::*;
use pest::error::LineColLocation;
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser as PestParser;

#[derive(PestParser)]
#[grammar = "grammar.pest"]
struct DeclarationParser;

/// Failure to turn declaration text into a parse tree. No partial tree is ever returned.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("syntax error at {line}:{column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },
    #[error("block at {line}:{column} follows the DATA_BLOCK, which must be last")]
    DataBlockNotLast { line: usize, column: usize },
    #[error("second DATA_BLOCK at {line}:{column}; a unit declares exactly one")]
    MultipleDataBlocks { line: usize, column: usize },
    #[error("source unit has no DATA_BLOCK")]
    MissingDataBlock,
    #[error("array {name}: lower bound {start} is greater than upper bound {end}")]
    InvalidArrayBounds { name: String, start: i64, end: i64 },
    #[error("invalid number {text:?} at {line}:{column}")]
    InvalidNumber {
        text: String,
        line: usize,
        column: usize,
    },
}

impl From<pest::error::Error<Rule>> for ParseError {
    fn from(e: pest::error::Error<Rule>) -> Self {
        let (line, column) = match e.line_col {
            LineColLocation::Pos(pos) => pos,
            LineColLocation::Span(start, _) => start,
        };
        ParseError::Syntax {
            line,
            column,
            message: e.variant.message().into_owned(),
        }
    }
}

/// Parse one source unit. A leading UTF-8 byte-order mark is ignored.
pub fn parse(source: &str) -> Result<SourceUnit, ParseError> {
    let source = source.strip_prefix('\u{feff}').unwrap_or(source);
    let mut pairs = DeclarationParser::parse(Rule::source_unit, source)?;
    let unit = pairs.next().ok_or(ParseError::MissingDataBlock)?;
    build_source_unit(unit)
}

fn build_source_unit(pair: Pair<Rule>) -> Result<SourceUnit, ParseError> {
    let mut types = Vec::new();
    let mut block: Option<BlockDefinition> = None;

    for inner in pair.into_inner() {
        let (line, column) = inner.as_span().start_pos().line_col();
        match inner.as_rule() {
            Rule::type_block => {
                if block.is_some() {
                    return Err(ParseError::DataBlockNotLast { line, column });
                }
                types.push(build_type_block(inner)?);
            }
            Rule::data_block => {
                if block.is_some() {
                    return Err(ParseError::MultipleDataBlocks { line, column });
                }
                block = Some(build_data_block(inner)?);
            }
            _ => {}
        }
    }

    let block = block.ok_or(ParseError::MissingDataBlock)?;
    log::debug!(
        "parsed source unit: {} type(s), data block {:?}",
        types.len(),
        block.name
    );
    Ok(SourceUnit { types, block })
}

fn build_type_block(pair: Pair<Rule>) -> Result<TypeDefinition, ParseError> {
    let mut name = None;
    let mut version = None;
    let mut elements = Vec::new();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            // Later quoted names come from AUTHOR/FAMILY/NAME header lines.
            Rule::quoted_name if name.is_none() => name = Some(unquote(inner)),
            Rule::version => version = Some(build_version(inner)),
            Rule::root_struct => elements = build_elements(inner)?,
            _ => {}
        }
    }
    Ok(TypeDefinition {
        name: name.unwrap_or_default(),
        version: version.unwrap_or_else(|| Version(String::new())),
        elements,
    })
}

fn build_data_block(pair: Pair<Rule>) -> Result<BlockDefinition, ParseError> {
    let mut name = None;
    let mut version = None;
    let mut non_retain = false;
    let mut body = None;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::quoted_name if name.is_none() => name = Some(unquote(inner)),
            Rule::version => version = Some(build_version(inner)),
            Rule::non_retain => non_retain = true,
            Rule::root_struct => body = Some(BlockBody::Struct(build_elements(inner)?)),
            Rule::named_ty => body = Some(BlockBody::Instance(named_type(inner))),
            _ => {}
        }
    }
    Ok(BlockDefinition {
        name: name.unwrap_or_default(),
        version: version.unwrap_or_else(|| Version(String::new())),
        non_retain,
        body: body.unwrap_or(BlockBody::Struct(Vec::new())),
    })
}

fn build_version(pair: Pair<Rule>) -> Version {
    let lit = pair
        .into_inner()
        .find(|p| p.as_rule() == Rule::version_lit)
        .map(|p| p.as_str().to_string())
        .unwrap_or_default();
    Version(lit)
}

/// Children of a `STRUCT ... END_STRUCT;` body, in declaration order.
fn build_elements(pair: Pair<Rule>) -> Result<Vec<ElementDecl>, ParseError> {
    let mut out = Vec::new();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::struct_elem | Rule::plain_elem => out.push(build_element(inner)?),
            _ => {}
        }
    }
    Ok(out)
}

fn build_element(pair: Pair<Rule>) -> Result<ElementDecl, ParseError> {
    let line = pair.as_span().start_pos().line_col().0;
    let mut name = None;
    let mut kind = None;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::quoted_name if name.is_none() => name = Some(unquote(inner)),
            Rule::bare_ident if name.is_none() => name = Some(inner.as_str().to_string()),
            Rule::struct_body
            | Rule::struct_array
            | Rule::array_ty
            | Rule::named_ty
            | Rule::primitive_ty => {
                let field = name.as_deref().unwrap_or_default();
                kind = Some(build_kind(inner, field)?);
            }
            _ => {}
        }
    }
    let name = name.unwrap_or_default();
    match kind {
        Some(kind) => Ok(ElementDecl { name, kind, line }),
        None => Err(ParseError::Syntax {
            line,
            column: 1,
            message: format!("element {} has no type", name),
        }),
    }
}

fn build_kind(pair: Pair<Rule>, field: &str) -> Result<DeclKind, ParseError> {
    let (line, column) = pair.as_span().start_pos().line_col();
    match pair.as_rule() {
        Rule::struct_body => Ok(DeclKind::Struct(build_elements(pair)?)),
        Rule::named_ty => Ok(DeclKind::Named(named_type(pair))),
        Rule::primitive_ty => {
            let mut type_name = String::new();
            let mut length = None;
            for inner in pair.into_inner() {
                match inner.as_rule() {
                    Rule::type_name => type_name = inner.as_str().to_string(),
                    Rule::length_spec => {
                        if let Some(n) = inner.into_inner().next() {
                            length = Some(parse_int(n)?);
                        }
                    }
                    _ => {}
                }
            }
            Ok(DeclKind::Primitive { type_name, length })
        }
        Rule::array_ty | Rule::struct_array => {
            let mut bounds = None;
            let mut inner_kind = None;
            for inner in pair.into_inner() {
                match inner.as_rule() {
                    Rule::array_bounds => {
                        let mut it = inner.into_inner();
                        let (Some(lo), Some(hi)) = (it.next(), it.next()) else {
                            continue;
                        };
                        bounds = Some((parse_int(lo)?, parse_int(hi)?));
                    }
                    Rule::struct_body | Rule::named_ty | Rule::primitive_ty => {
                        inner_kind = Some(build_kind(inner, field)?);
                    }
                    _ => {}
                }
            }
            let (start, end) = bounds.unwrap_or((0, 0));
            if start > end {
                return Err(ParseError::InvalidArrayBounds {
                    name: field.to_string(),
                    start,
                    end,
                });
            }
            let inner = inner_kind.ok_or_else(|| ParseError::Syntax {
                line,
                column,
                message: format!("array {} has no element type", field),
            })?;
            Ok(DeclKind::Array {
                inner: Box::new(inner),
                start,
                end,
            })
        }
        other => Err(ParseError::Syntax {
            line,
            column,
            message: format!("unexpected rule {:?}", other),
        }),
    }
}

fn named_type(pair: Pair<Rule>) -> String {
    pair.into_inner()
        .next()
        .map(unquote)
        .unwrap_or_default()
}

/// `"Some Name"` -> `Some Name`
fn unquote(pair: Pair<Rule>) -> String {
    pair.into_inner()
        .find(|p| p.as_rule() == Rule::quoted_inner)
        .map(|p| p.as_str().to_string())
        .unwrap_or_default()
}

fn parse_int(pair: Pair<Rule>) -> Result<i64, ParseError> {
    let (line, column) = pair.as_span().start_pos().line_col();
    pair.as_str().parse().map_err(|_| ParseError::InvalidNumber {
        text: pair.as_str().to_string(),
        line,
        column,
    })
}
