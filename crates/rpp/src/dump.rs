//! Serializer: the exact inverse of the parser for canonical text.

use tracing::{debug, trace};

use crate::codec::{indent, struct_text, wrap_base64};
use crate::config::CodecConfig;
use crate::error::{EncodingError, Result};
use crate::node::{Child, Node, Param, Struct};

/// Serialize `node` at indentation level 0.
pub fn dump(node: &Node, config: &CodecConfig) -> Result<String> {
    let mut out = String::new();
    write_node(&mut out, node, 0, config)?;
    debug!(token = %node.token, bytes = out.len(), "dumped document");
    Ok(out)
}

/// Serialize `node` with its first line at `level`.
pub fn dump_at(node: &Node, level: usize, config: &CodecConfig) -> Result<String> {
    let mut out = String::new();
    write_node(&mut out, node, level, config)?;
    Ok(out)
}

/// One struct line at `level`, including any `|` side-channel blocks.
pub fn dump_struct(s: &Struct, level: usize) -> Result<String> {
    Ok(format!("{}{}", indent(level), struct_text(&s.token, &s.params, level)?))
}

fn write_node(out: &mut String, node: &Node, level: usize, config: &CodecConfig) -> Result<()> {
    trace!(token = %node.token, level, "dumping block");
    let pad = indent(level);

    for (token, params) in node.attributes.leading() {
        out.push_str(&pad);
        out.push_str(&struct_text(token, params, level)?);
        out.push('\n');
    }

    out.push_str(&pad);
    out.push('<');
    if config.is_text(&node.token) {
        write_text_body(out, node, level)?;
    } else {
        out.push_str(&struct_text(&node.token, &node.params, level)?);
        out.push('\n');
        write_children(out, node, level, config)?;
    }
    out.push_str(&pad);
    out.push('>');

    for (token, params) in node.attributes.trailing() {
        out.push('\n');
        out.push_str(&pad);
        out.push_str(&struct_text(token, params, level)?);
    }
    Ok(())
}

fn write_children(out: &mut String, node: &Node, level: usize, config: &CodecConfig) -> Result<()> {
    for child in &node.children {
        match child {
            Child::Node(n) => write_node(out, n, level + 1, config)?,
            Child::Struct(s) => out.push_str(&dump_struct(s, level + 1)?),
        }
        out.push('\n');
    }

    let pad = indent(level + 1);
    for chunk in &node.chunks {
        let flat = chunk.to_base64();
        for line in wrap_base64(&flat) {
            out.push_str(&pad);
            out.push_str(line);
            out.push('\n');
        }
    }
    Ok(())
}

/// Free-text block: open line carries the parameters after the text, and
/// the text follows as `|` lines.
fn write_text_body(out: &mut String, node: &Node, level: usize) -> Result<()> {
    if !node.children.is_empty() {
        return Err(EncodingError::TextBlockContent {
            token: node.token.clone(),
            what: "children",
        }
        .into());
    }
    if !node.chunks.is_empty() {
        return Err(EncodingError::TextBlockContent {
            token: node.token.clone(),
            what: "payload chunks",
        }
        .into());
    }

    let Some((first, rest)) = node.params.split_first() else {
        out.push_str(&node.token);
        out.push('\n');
        return Ok(());
    };
    let Param::String(text) = first else {
        return Err(EncodingError::ExpectedString {
            token: node.token.clone(),
            index: 0,
        }
        .into());
    };

    if text.contains('\r') {
        return Err(EncodingError::LineBreakInString(text.clone()).into());
    }

    out.push_str(&struct_text(&node.token, rest, level)?);
    out.push('\n');
    let pad = indent(level + 1);
    for line in text.split('\n') {
        out.push_str(&pad);
        out.push('|');
        out.push_str(line);
        out.push('\n');
    }
    Ok(())
}
