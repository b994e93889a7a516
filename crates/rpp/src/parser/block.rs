//! Block assembly: turns lines into nested nodes.
//!
//! Structure comes from the `<`/`>` brackets alone; indentation is
//! ignored on read.

use tracing::trace;
use winnow::Parser;

use super::lexical;
use crate::codec::{is_base64_char, needs_side_channel, BASE64_LINE_WIDTH};
use crate::config::CodecConfig;
use crate::error::ParseError;
use crate::node::{Child, Chunk, Node, Param, PluginAttributes, Struct};

/// One physical line of the source, `\r` stripped.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Line<'a> {
    /// 1-based line number.
    pub number: usize,
    /// Byte offset of the first character in the source.
    pub offset: usize,
    pub text: &'a str,
}

impl<'a> Line<'a> {
    fn indent_len(&self) -> usize {
        self.text.len() - self.text.trim_start().len()
    }

    fn content(&self) -> &'a str {
        self.text.trim()
    }
}

pub(crate) fn split_lines(source: &str) -> Vec<Line<'_>> {
    let mut lines = Vec::new();
    let mut offset = 0;
    for (i, raw) in source.split('\n').enumerate() {
        lines.push(Line {
            number: i + 1,
            offset,
            text: raw.strip_suffix('\r').unwrap_or(raw),
        });
        offset += raw.len() + 1;
    }
    lines
}

/// Result of closing a block.
enum Block {
    Node(Node),
    /// `<TOKEN` with a single `|raw` line: the exact value of a folded parameter.
    SideChannel {
        token: String,
        raw: String,
        line: usize,
        byte: usize,
    },
}

pub(crate) struct BlockParser<'a> {
    config: &'a CodecConfig,
    source: &'a str,
    lines: Vec<Line<'a>>,
    pos: usize,
}

impl<'a> BlockParser<'a> {
    pub fn new(source: &'a str, config: &'a CodecConfig) -> Self {
        BlockParser {
            config,
            source,
            lines: split_lines(source),
            pos: 0,
        }
    }

    /// Parse one top-level object and require nothing but blank lines after it.
    pub fn document(mut self) -> Result<Node, ParseError> {
        let Some(open) = self.next_content_line() else {
            return Err(self.error_at_end("empty document, expected `<`"));
        };
        if !open.content().starts_with('<') {
            return Err(self.error_at(&open, open.indent_len(), "expected `<` to open a block"));
        }

        let node = match self.object(open, 1)? {
            Block::Node(node) => node,
            Block::SideChannel { line, byte, .. } => {
                return Err(self.error_pos(line, byte, "a `|` block cannot be the document root"));
            }
        };

        if let Some(extra) = self.next_content_line() {
            return Err(self.error_at(
                &extra,
                extra.indent_len(),
                "unexpected content after the closing `>`",
            ));
        }
        Ok(node)
    }

    fn next_line(&mut self) -> Option<Line<'a>> {
        let line = self.lines.get(self.pos).copied();
        if line.is_some() {
            self.pos += 1;
        }
        line
    }

    fn next_content_line(&mut self) -> Option<Line<'a>> {
        while let Some(line) = self.next_line() {
            if !line.content().is_empty() {
                return Some(line);
            }
        }
        None
    }

    /// Parse the block opened on `open` through its closing `>`.
    fn object(&mut self, open: Line<'a>, depth: usize) -> Result<Block, ParseError> {
        let lt = open.indent_len();
        if depth > self.config.max_depth {
            return Err(self.error_at(
                &open,
                lt,
                &format!("blocks nested deeper than {}", self.config.max_depth),
            ));
        }

        let (token, params) = self.struct_line(&open, lt + 1)?;
        trace!(token = %token, line = open.number, depth, "block opened");

        let mut node = Node {
            token: token.clone(),
            params,
            children: Vec::new(),
            chunks: Vec::new(),
            attributes: PluginAttributes::default(),
        };

        let text_block = self.config.is_text(&token);
        let binary = self.config.is_binary(&token);
        let mut text: Vec<&str> = Vec::new();
        let mut raw_lines: Vec<Line<'a>> = Vec::new();
        let mut chunk = String::new();
        let mut in_payload = false;

        loop {
            let Some(line) = self.next_line() else {
                return Err(self
                    .error_at(&open, lt, &format!("unclosed <{token}> block"))
                    .with_span(open.offset + lt, self.source.len()));
            };
            let content = line.content();
            let col = line.indent_len();

            if content.is_empty() {
                continue;
            }

            if content.starts_with('>') {
                if content != ">" {
                    return Err(self.error_at(&line, col + 1, "unexpected content after `>`"));
                }
                break;
            }

            if text_block {
                let Some(body) = line.text.trim_start().strip_prefix('|') else {
                    return Err(self.error_at(
                        &line,
                        col,
                        &format!("expected a `|` line in free-text block <{token}>"),
                    ));
                };
                text.push(body);
                continue;
            }

            if content.starts_with('|') {
                raw_lines.push(line);
                continue;
            }

            if binary && content.chars().all(is_base64_char) {
                in_payload = true;
                chunk.push_str(content);
                if content.len() < BASE64_LINE_WIDTH || content.ends_with('=') {
                    node.chunks.push(Chunk::Base64(std::mem::take(&mut chunk)));
                }
                continue;
            }

            if in_payload {
                return Err(self.error_at(
                    &line,
                    col,
                    &format!("<{token}> payload must be the last part of the block"),
                ));
            }

            if content.starts_with('<') {
                match self.object(line, depth + 1)? {
                    Block::Node(child) => node.children.push(Child::Node(child)),
                    Block::SideChannel {
                        token: owner,
                        raw,
                        line: at,
                        byte,
                    } => {
                        if !restore_side_channel(&mut node, &owner, &raw) {
                            return Err(self.error_pos(
                                at,
                                byte,
                                &format!("`|` block <{owner}> has no folded parameter to restore"),
                            ));
                        }
                    }
                }
                continue;
            }

            let (child_token, child_params) = self.struct_line(&line, col)?;
            node.children.push(Child::Struct(Struct {
                token: child_token,
                params: child_params,
            }));
        }

        if !chunk.is_empty() {
            node.chunks.push(Chunk::Base64(chunk));
        }

        if text_block {
            if !text.is_empty() {
                node.params.insert(0, Param::String(text.join("\n")));
            } else if !node.params.is_empty() {
                // open-line parameters always follow a text parameter
                return Err(self.error_at(
                    &open,
                    lt,
                    &format!("free-text block <{token}> has parameters but no `|` lines"),
                ));
            }
        }

        trace!(token = %node.token, children = node.children.len(), chunks = node.chunks.len(), "block closed");

        if let Some(first) = raw_lines.first() {
            let lone = raw_lines.len() == 1
                && node.params.is_empty()
                && node.children.is_empty()
                && node.chunks.is_empty();
            if !lone {
                return Err(self.error_at(
                    first,
                    first.indent_len(),
                    "`|` lines are only allowed in free-text blocks or alone in a side-channel block",
                ));
            }
            let raw = first.text.trim_start();
            return Ok(Block::SideChannel {
                token: node.token,
                raw: raw[1..].to_string(),
                line: open.number,
                byte: lt,
            });
        }

        Ok(Block::Node(node))
    }

    /// Parse `TOKEN params...` starting at byte `start` of `line`.
    fn struct_line(&self, line: &Line<'a>, start: usize) -> Result<(String, Vec<Param>), ParseError> {
        let body = &line.text[start..];
        lexical::struct_line(self.config)
            .parse(body)
            .map(|(token, params)| (token.to_string(), params))
            .map_err(|e| {
                let message = e.inner().to_string();
                let message = if message.is_empty() {
                    "malformed line".to_string()
                } else {
                    message.replace('\n', "; ")
                };
                self.error_at(line, start + e.offset(), &message)
            })
    }

    fn error_at(&self, line: &Line<'_>, byte: usize, message: &str) -> ParseError {
        let byte = byte.min(line.text.len());
        let column = line.text[..byte].chars().count() + 1;
        ParseError::new(message, line.number, column)
            .with_span(line.offset + byte, line.offset + line.text.len())
    }

    fn error_pos(&self, number: usize, byte: usize, message: &str) -> ParseError {
        match self.lines.get(number.saturating_sub(1)) {
            Some(line) => self.error_at(line, byte, message),
            None => ParseError::new(message, number, byte + 1),
        }
    }

    fn error_at_end(&self, message: &str) -> ParseError {
        let last = self.lines.len().max(1);
        let column = self.lines.last().map_or(0, |l| l.text.chars().count()) + 1;
        ParseError::new(message, last, column).with_span(self.source.len(), self.source.len())
    }
}

/// Put the exact `raw` value back into the parameter it was folded from.
///
/// The owner is the struct just before the `|` block, or the enclosing
/// block itself while it has no children yet.
fn restore_side_channel(node: &mut Node, token: &str, raw: &str) -> bool {
    if !needs_side_channel(raw) {
        return false;
    }
    let folded = raw.replace('`', "'");

    if let Some(Child::Struct(prev)) = node.children.last_mut() {
        if prev.token == token && restore_param(&mut prev.params, &folded, raw) {
            return true;
        }
    }
    node.children.is_empty() && node.token == token && restore_param(&mut node.params, &folded, raw)
}

fn restore_param(params: &mut [Param], folded: &str, raw: &str) -> bool {
    match params
        .iter_mut()
        .find(|p| matches!(p, Param::String(s) if s == folded))
    {
        Some(param) => {
            *param = Param::String(raw.to_string());
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params;
    use pretty_assertions::assert_eq;

    fn parse(source: &str) -> Result<Node, ParseError> {
        BlockParser::new(source, &CodecConfig::default()).document()
    }

    #[test]
    fn test_split_lines_tracks_offsets() {
        let lines = split_lines("<A\r\n  B 1\n>");
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].text, "<A");
        assert_eq!(lines[1].offset, 4);
        assert_eq!(lines[2].number, 3);
    }

    #[test]
    fn test_parse_ignores_indentation() {
        let node = parse("<TRACK\nNAME x\n      <FXCHAIN\n  SHOW 0\n>\n  >").unwrap();
        assert_eq!(node.children.len(), 2);
        assert_eq!(node.children[1].as_node().unwrap().children[0].token(), "SHOW");
    }

    #[test]
    fn test_unclosed_block() {
        let err = parse("<TRACK\n  NAME x\n").unwrap_err();
        assert_eq!(err.line, 1);
        assert_eq!(err.column, 1);
        assert!(err.message.contains("unclosed <TRACK>"));
    }

    #[test]
    fn test_trailing_content_rejected() {
        let err = parse("<A\n>\nB 1").unwrap_err();
        assert_eq!(err.line, 3);
    }

    #[test]
    fn test_depth_limit() {
        let mut config = CodecConfig::default();
        config.max_depth = 2;
        let err = BlockParser::new("<A\n  <B\n    <C\n    >\n  >\n>", &config)
            .document()
            .unwrap_err();
        assert_eq!(err.line, 3);
        assert_eq!(err.column, 5);
    }

    #[test]
    fn test_unterminated_quote_position() {
        let err = parse("<TRACK\n  NAME \"GUITAR\n>").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.column > 7);
    }

    #[test]
    fn test_payload_chunks_split_on_short_lines() {
        let full = "A".repeat(128);
        let source = format!("<VST x\n  {full}\n  BBBB\n  CCCC\n>");
        let node = parse(&source).unwrap();
        assert_eq!(
            node.chunks,
            vec![
                Chunk::Base64(format!("{full}BBBB")),
                Chunk::Base64("CCCC".to_string())
            ]
        );
    }

    #[test]
    fn test_struct_after_payload_rejected() {
        let err = parse("<VST x\n  AAAA\n  BYPASS 0 0\n>").unwrap_err();
        assert_eq!(err.line, 3);
    }

    #[test]
    fn test_text_block_with_open_params() {
        let node = parse("<NOTES 0 2\n  |first\n  |  second  \n>").unwrap();
        assert_eq!(node.params, params!["first\n  second  ", 0, 2]);
    }

    #[test]
    fn test_text_block_empty() {
        assert_eq!(parse("<NOTES\n>").unwrap().params, vec![]);
        assert_eq!(parse("<NOTES\n  |\n>").unwrap().params, params![""]);
        assert_eq!(parse("<NOTES 0 2\n  |\n>").unwrap().params, params!["", 0, 2]);
    }

    #[test]
    fn test_text_block_params_need_body() {
        let err = parse("<PROJ\n  <NOTES 0 2\n  >\n>").unwrap_err();
        assert_eq!((err.line, err.column), (2, 3));
        assert!(err.message.contains("no `|` lines"));
    }

    #[test]
    fn test_side_channel_restores_struct_param() {
        let node = parse("<TRACK\n  NAME `''''''\"\"\"`\n    <NAME\n      |'''```\"\"\"\n    >\n>").unwrap();
        assert_eq!(node.children.len(), 1);
        assert_eq!(node.children[0].params(), &params!["'''```\"\"\""][..]);
    }

    #[test]
    fn test_orphan_side_channel_rejected() {
        let err = parse("<TRACK\n  <NAME\n    |'''```\"\"\"\n  >\n>").unwrap_err();
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_pipe_lines_outside_text_blocks_rejected() {
        assert!(parse("<TRACK\n  |a\n  |b\n>").is_err());
    }
}
