//! Media source helpers.
//!
//! A section source wraps another source to trim or reverse it:
//!
//! ```text
//! <SOURCE SECTION
//!   MODE 2
//!   <SOURCE MP3
//!     FILE "media/909-kick.mp3"
//!   >
//! >
//! ```
//!
//! Preconditions that fail here only log a warning and leave the node as
//! it was.

use tracing::warn;

use crate::error::{EncodingError, Result};
use crate::node::{Child, Node, Param};
use crate::specialize::{NodeKind, SourceKind};

/// `MODE` bit that plays a section backwards.
pub const MODE_REVERSED: u32 = 2;

fn source_kind(node: &Node) -> Option<SourceKind> {
    match NodeKind::of(node) {
        NodeKind::Source(kind) => Some(kind),
        _ => None,
    }
}

/// Wrap a media source in a `SOURCE SECTION`.
pub fn make_section_source(node: Node) -> Result<Node> {
    match source_kind(&node) {
        None => {
            warn!(token = %node.token, "not a SOURCE block, leaving it unchanged");
            Ok(node)
        }
        Some(SourceKind::Section) => Ok(node),
        Some(SourceKind::Midi) => {
            warn!("MIDI sources cannot be wrapped in a section, leaving it unchanged");
            Ok(node)
        }
        Some(_) => {
            let mut section = Node::with_params("SOURCE", vec![Param::from("SECTION")])?;
            section.append(node);
            Ok(section)
        }
    }
}

/// Whether a section source plays backwards.
pub fn is_reversed(node: &Node) -> bool {
    source_kind(node) == Some(SourceKind::Section)
        && node
            .find_child("MODE", 0)
            .and_then(|c| c.params().first())
            .and_then(Param::as_number)
            .is_some_and(|mode| (mode as u32) & MODE_REVERSED != 0)
}

/// Set or clear the reverse flag of a section source.
///
/// A non-section source is wrapped first. Returns the node unchanged when
/// wrapping is impossible or the section holds more than one source.
pub fn set_reversed(node: Node, reversed: bool) -> Result<Node> {
    let mut section = make_section_source(node)?;
    if source_kind(&section) != Some(SourceKind::Section) {
        return Ok(section);
    }

    let inner = section
        .nodes()
        .filter(|n| n.token == "SOURCE")
        .count();
    if inner > 1 {
        warn!(sources = inner, "section holds several sources, leaving it unchanged");
        return Ok(section);
    }

    let index = match section.children.iter().position(|c| c.token() == "MODE") {
        Some(i) => i,
        None => {
            section.insert_child("MODE", 0)?;
            0
        }
    };
    let mode = &mut section.children[index];
    let current = mode
        .params()
        .first()
        .and_then(Param::as_number)
        .map_or(0, |m| m as u32);
    let next = if reversed {
        current | MODE_REVERSED
    } else {
        current & !MODE_REVERSED
    };
    mode.set_param(0, next)?;
    Ok(section)
}

/// The source a section wraps.
///
/// Fails when `node` is not a section source; `Ok(None)` means an empty section.
pub fn inner_source(node: &Node) -> Result<Option<&Node>> {
    if source_kind(node) != Some(SourceKind::Section) {
        return Err(EncodingError::NotASection(node.token.clone()).into());
    }
    Ok(node.children.iter().find_map(|c| match c {
        Child::Node(n) if n.token == "SOURCE" => Some(n),
        _ => None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CodecConfig;
    use crate::node::Struct;
    use crate::params;
    use crate::parser::parse;
    use pretty_assertions::assert_eq;

    const MP3: &str = "<SOURCE MP3\n  FILE \"media/909-kick.mp3\"\n>";
    const SECTION: &str = "<SOURCE SECTION\n  LENGTH 0.4071655328798\n  MODE 1\n  STARTPOS 0.05\n  OVERLAP 0.01\n  <SOURCE MP3\n    FILE \"media/909-kick.mp3\"\n  >\n>";

    fn mp3() -> Node {
        let mut node = Node::with_params("SOURCE", params!["MP3"]).unwrap();
        node.append(Struct::new("FILE", params!["media/909-kick.mp3"]).unwrap());
        node
    }

    #[test]
    fn test_make_section_source_wraps() {
        let source = parse(MP3, &CodecConfig::default()).unwrap();
        assert_eq!(source, mp3());

        let section = make_section_source(source).unwrap();
        assert_eq!(NodeKind::of(&section), NodeKind::Source(SourceKind::Section));
        assert_eq!(inner_source(&section).unwrap(), Some(&mp3()));
    }

    #[test]
    fn test_inner_source_requires_section() {
        assert!(inner_source(&mp3()).is_err());
        let empty = Node::with_params("SOURCE", params!["SECTION"]).unwrap();
        assert_eq!(inner_source(&empty).unwrap(), None);
    }

    #[test]
    fn test_make_section_source_leaves_midi_and_sections() {
        let midi = Node::with_params("SOURCE", params!["MIDI"]).unwrap();
        assert_eq!(make_section_source(midi.clone()).unwrap(), midi);

        let section = parse(SECTION, &CodecConfig::default()).unwrap();
        assert_eq!(make_section_source(section.clone()).unwrap(), section);

        let track = Node::new("TRACK").unwrap();
        assert_eq!(make_section_source(track.clone()).unwrap(), track);
    }

    #[test]
    fn test_set_reversed_toggles_mode_bit() {
        let section = parse(SECTION, &CodecConfig::default()).unwrap();
        assert!(!is_reversed(&section));

        let reversed = set_reversed(section, true).unwrap();
        assert_eq!(reversed.find_child("MODE", 0).unwrap().params(), &params![3][..]);
        assert!(is_reversed(&reversed));

        let forward = set_reversed(reversed, false).unwrap();
        assert_eq!(forward.find_child("MODE", 0).unwrap().params(), &params![1][..]);
    }

    #[test]
    fn test_set_reversed_wraps_plain_source() {
        let reversed = set_reversed(mp3(), true).unwrap();
        assert_eq!(reversed.children[0].token(), "MODE");
        assert_eq!(reversed.children[0].params(), &params![2][..]);
        assert!(is_reversed(&reversed));
    }

    #[test]
    fn test_set_reversed_skips_multi_source_sections() {
        let mut section = make_section_source(mp3()).unwrap();
        section.append(mp3());
        let out = set_reversed(section.clone(), true).unwrap();
        assert_eq!(out, section);
    }

    #[test]
    fn test_set_reversed_skips_midi() {
        let midi = Node::with_params("SOURCE", params!["MIDI"]).unwrap();
        assert_eq!(set_reversed(midi.clone(), true).unwrap(), midi);
    }
}
