//! RPP parser.
//!
//! The value grammar (numbers, strings, parameter lists) is written with
//! winnow combinators in [`lexical`]; blocks are assembled line by line in
//! `block`, with an explicit nesting limit from [`CodecConfig::max_depth`].

mod block;
pub mod lexical;

use serde::{Deserialize, Serialize};
use tracing::debug;
use winnow::error::ContextError;
use winnow::Parser;

use crate::codec::is_base64_char;
use crate::config::CodecConfig;
use crate::error::{ParseError, Result};
use crate::node::{Node, Param};

use block::{split_lines, BlockParser};

/// Parse a whole document into its root node.
pub fn parse(source: &str, config: &CodecConfig) -> Result<Node> {
    debug!(bytes = source.len(), "parsing document");
    let node = BlockParser::new(source, config).document()?;
    debug!(token = %node.token, children = node.children.len(), "parsed document");
    Ok(node)
}

/// Grammar entry points that can be invoked on their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    Int,
    Decimal,
    String,
    Params,
    Object,
    Base64,
}

/// The value produced by [`parse_rule`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Parsed {
    Int(i64),
    Decimal(f64),
    String(String),
    Params(Vec<Param>),
    Node(Node),
    /// Payload lines joined into flat base64 text.
    Base64(String),
}

/// Parse all of `input` with a single grammar rule.
pub fn parse_rule(input: &str, rule: Rule, config: &CodecConfig) -> Result<Parsed> {
    let rule_error = |e: winnow::error::ParseError<&str, ContextError>| {
        offset_error(input, e.offset(), &e.inner().to_string())
    };

    let parsed = match rule {
        Rule::Int => lexical::int.map(Parsed::Int).parse(input).map_err(rule_error)?,
        Rule::Decimal => lexical::number.map(Parsed::Decimal).parse(input).map_err(rule_error)?,
        Rule::String => lexical::string.map(Parsed::String).parse(input).map_err(rule_error)?,
        Rule::Params => lexical::params.map(Parsed::Params).parse(input).map_err(rule_error)?,
        Rule::Object => Parsed::Node(parse(input, config)?),
        Rule::Base64 => Parsed::Base64(base64_body(input)?),
    };
    Ok(parsed)
}

fn base64_body(input: &str) -> std::result::Result<String, ParseError> {
    let mut flat = String::new();
    for line in split_lines(input) {
        let content = line.text.trim();
        if let Some(bad) = content.find(|c: char| !is_base64_char(c)) {
            let byte = line.text.len() - line.text.trim_start().len() + bad;
            return Err(offset_error(input, line.offset + byte, "expected base64 text"));
        }
        flat.push_str(content);
    }
    Ok(flat)
}

fn offset_error(input: &str, offset: usize, message: &str) -> ParseError {
    let offset = offset.min(input.len());
    let before = &input[..offset];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    let column = before[line_start..].chars().count() + 1;
    let message = if message.is_empty() {
        "unexpected input"
    } else {
        message
    };
    ParseError::new(message.replace('\n', "; "), line, column).with_span(offset, input.len())
}
