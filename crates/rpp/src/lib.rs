//! Round-trip parser and serializer for REAPER project (RPP) text.
//!
//! An RPP document is a tree of bracketed blocks and one-line structs:
//!
//! ```text
//! <REAPER_PROJECT 0.1 6.13/OSX64 1596785244
//!   TEMPO 120 4 4
//!   <TRACK
//!     NAME "lead guitar"
//!   >
//! >
//! ```
//!
//! Parsing canonical text and dumping the resulting [`Node`] reproduces
//! the text byte for byte.
//!
//! # Example
//!
//! ```
//! use rpp::{dump, parse, Param};
//!
//! let mut track = parse("<TRACK\n  NAME scream\n>").unwrap();
//! track.get_or_create_child("VOLPAN", 0).unwrap().set_param(0, 0.5).unwrap();
//!
//! assert_eq!(track.find_child("NAME", 0).unwrap().params()[0], Param::from("scream"));
//! assert_eq!(dump(&track).unwrap(), "<TRACK\n  NAME scream\n  VOLPAN 0.5\n>");
//! ```

pub mod codec;
pub mod config;
pub mod dump;
pub mod error;
pub mod header;
pub mod node;
pub mod parser;
pub mod source;
pub mod specialize;
pub mod template;

pub use config::CodecConfig;
pub use error::{ConfigError, EncodingError, Error, ParseError, Result};
pub use header::{ChannelMask, PluginHeader, PluginId};
pub use node::{Child, Chunk, Node, Param, PluginAttributes, Struct};
pub use parser::{parse_rule, Parsed, Rule};
pub use specialize::{specialize, EnvelopeKind, NodeKind, SourceKind};
pub use template::Template;

/// Parse a document with the default configuration.
pub fn parse(source: &str) -> Result<Node> {
    parser::parse(source, CodecConfig::global())
}

/// Parse a document using the token tables and depth limit in `config`.
pub fn parse_with(source: &str, config: &CodecConfig) -> Result<Node> {
    parser::parse(source, config)
}

/// Serialize a node with the default configuration.
pub fn dump(node: &Node) -> Result<String> {
    dump::dump(node, CodecConfig::global())
}

/// Serialize a node using the token tables in `config`.
pub fn dump_with(node: &Node, config: &CodecConfig) -> Result<String> {
    dump::dump(node, config)
}

/// A new project built from the bundled template.
pub fn new_project() -> Result<Node> {
    Ok(Template::bundled()?.instantiate())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_minimal_round_trip() {
        let node = parse("<TEST 1\n>").unwrap();
        assert_eq!(node.token, "TEST");
        assert_eq!(node.params, params![1]);
        assert!(node.children.is_empty());
        assert_eq!(dump(&node).unwrap(), "<TEST 1\n>");
    }

    #[test]
    fn test_quoted_name_block() {
        let node = parse("<NAME \"GUITAR\"\n  VOLUME 11\n>").unwrap();
        assert_eq!(node.params, params!["GUITAR"]);
        assert_eq!(
            node.children,
            vec![Child::Struct(Struct::new("VOLUME", params![11]).unwrap())]
        );
        // the quotes are not needed, so the canonical form drops them
        assert_eq!(dump(&node).unwrap(), "<NAME GUITAR\n  VOLUME 11\n>");
    }

    #[test]
    fn test_indented_input() {
        let node = parse("  <NAME \"GUITAR\"\n    VOLUME 11\n  >").unwrap();
        assert_eq!(node.children[0].params(), &params![11][..]);
    }

    #[test]
    fn test_custom_text_tokens() {
        let mut config = CodecConfig::default();
        config.text_tokens.insert("COMMENT".to_string());

        let source = "<COMMENT\n  |hello there\n>";
        let node = parse_with(source, &config).unwrap();
        assert_eq!(node.params, params!["hello there"]);
        assert_eq!(dump_with(&node, &config).unwrap(), source);

        // without the table entry a `|` line is not allowed
        assert!(parse(source).is_err());
    }

    #[test]
    fn test_new_project() {
        let project = new_project().unwrap();
        assert_eq!(NodeKind::of(&project), NodeKind::Project);
    }

    #[test]
    fn test_parse_error_context() {
        let source = "<TRACK\n  NAME \"open\n>";
        let Err(Error::Parse(err)) = parse(source) else {
            panic!("expected a parse error");
        };
        let rendered = err.render_context(source, 1);
        assert!(rendered.contains("> 2 |   NAME \"open"));
    }
}
