//! Typed views over generic nodes.
//!
//! [`NodeKind::of`] maps a block's token (and, for `SOURCE`, its first
//! parameter) to a variant. [`specialize`] is a single-pass transform that
//! moves FX-chain sibling attributes into the plugin nodes they belong to.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::CodecConfig;
use crate::error::Result;
use crate::node::{Child, Node, Param, PluginAttributes};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    Wave,
    Midi,
    Mp3,
    Section,
    Other,
}

impl SourceKind {
    pub fn of(first_param: Option<&Param>) -> Self {
        match first_param.and_then(Param::as_str) {
            Some("WAVE") => SourceKind::Wave,
            Some("MIDI") => SourceKind::Midi,
            Some("MP3") => SourceKind::Mp3,
            Some("SECTION") => SourceKind::Section,
            _ => SourceKind::Other,
        }
    }

    pub fn token(self) -> Option<&'static str> {
        match self {
            SourceKind::Wave => Some("WAVE"),
            SourceKind::Midi => Some("MIDI"),
            SourceKind::Mp3 => Some("MP3"),
            SourceKind::Section => Some("SECTION"),
            SourceKind::Other => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvelopeKind {
    Volume,
    Pan,
    Width,
    Param,
    Tempo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Project,
    Track,
    Item,
    Source(SourceKind),
    Notes,
    Plugin,
    FxChain,
    Envelope(EnvelopeKind),
    Other,
}

impl NodeKind {
    pub fn of(node: &Node) -> Self {
        match node.token.as_str() {
            "REAPER_PROJECT" => NodeKind::Project,
            "TRACK" => NodeKind::Track,
            "ITEM" => NodeKind::Item,
            "SOURCE" => NodeKind::Source(SourceKind::of(node.params.first())),
            "NOTES" => NodeKind::Notes,
            "VST" | "AU" | "DX" | "LV2" | "CLAP" | "JS" => NodeKind::Plugin,
            "FXCHAIN" | "TAKEFX" | "FXCHAIN_REC" | "MASTERFXLIST" => NodeKind::FxChain,
            "VOLENV" | "VOLENV2" | "VOLENV3" => NodeKind::Envelope(EnvelopeKind::Volume),
            "PANENV" | "PANENV2" => NodeKind::Envelope(EnvelopeKind::Pan),
            "WIDTHENV" | "WIDTHENV2" => NodeKind::Envelope(EnvelopeKind::Width),
            "PARMENV" => NodeKind::Envelope(EnvelopeKind::Param),
            "TEMPOENVEX" => NodeKind::Envelope(EnvelopeKind::Tempo),
            _ => NodeKind::Other,
        }
    }
}

/// Fold every FX chain's sibling attributes into its plugins, recursively.
///
/// A `BYPASS` struct directly before a plugin and the run of `PRESETNAME`,
/// `FLOATPOS`, `FXID` and `WAK` structs directly after it move into the
/// plugin's [`PluginAttributes`]. Everything else keeps its position.
pub fn specialize(mut node: Node, config: &CodecConfig) -> Result<Node> {
    let children = std::mem::take(&mut node.children);
    let mut children = children
        .into_iter()
        .map(|child| match child {
            Child::Node(n) => specialize(n, config).map(Child::Node),
            other => Ok(other),
        })
        .collect::<Result<Vec<_>>>()?;

    if NodeKind::of(&node) == NodeKind::FxChain {
        children = fold_plugin_attributes(children, config)?;
    }
    node.children = children;
    Ok(node)
}

fn fold_plugin_attributes(children: Vec<Child>, config: &CodecConfig) -> Result<Vec<Child>> {
    let mut out: Vec<Child> = Vec::with_capacity(children.len());
    let mut iter = children.into_iter().peekable();

    while let Some(child) = iter.next() {
        let mut plugin = match child {
            Child::Node(n) if config.is_plugin(&n.token) => n,
            other => {
                out.push(other);
                continue;
            }
        };

        if let Some(Child::Struct(prev)) = out.last() {
            if PluginAttributes::LEADING.contains(&prev.token.as_str()) {
                if let Some(Child::Struct(prev)) = out.pop() {
                    store(&mut plugin, &prev.token, prev.params)?;
                }
            }
        }

        // Trailing lines fold only while they keep the written order, so a
        // run the dumper cannot reproduce stays in the child list.
        let mut last = None;
        while let Some(Child::Struct(next)) = iter.peek() {
            let Some(pos) = PluginAttributes::TRAILING.iter().position(|t| *t == next.token) else {
                break;
            };
            if last.is_some_and(|last| pos <= last) {
                debug!(plugin = %plugin.token, attribute = %next.token, "attribute out of order, left in place");
                break;
            }
            last = Some(pos);
            if let Some(Child::Struct(next)) = iter.next() {
                store(&mut plugin, &next.token, next.params)?;
            }
        }

        out.push(Child::Node(plugin));
    }
    Ok(out)
}

fn store(plugin: &mut Node, token: &str, params: Vec<Param>) -> Result<()> {
    trace!(plugin = %plugin.token, attribute = token, "folding attribute");
    plugin.attributes.insert(token, params)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Struct;
    use crate::params;
    use pretty_assertions::assert_eq;

    fn vst(name: &str) -> Child {
        Child::Node(Node::with_params("VST", params![name]).unwrap())
    }

    fn line(token: &str, params: Vec<Param>) -> Child {
        Child::Struct(Struct::new(token, params).unwrap())
    }

    #[test]
    fn test_node_kind_dispatch() {
        let kind = |token: &str, params: Vec<Param>| NodeKind::of(&Node::with_params(token, params).unwrap());
        assert_eq!(kind("REAPER_PROJECT", vec![]), NodeKind::Project);
        assert_eq!(kind("SOURCE", params!["MIDI"]), NodeKind::Source(SourceKind::Midi));
        assert_eq!(kind("SOURCE", params!["SECTION"]), NodeKind::Source(SourceKind::Section));
        assert_eq!(kind("SOURCE", params!["FLAC"]), NodeKind::Source(SourceKind::Other));
        assert_eq!(kind("SOURCE", vec![]), NodeKind::Source(SourceKind::Other));
        assert_eq!(kind("VOLENV2", vec![]), NodeKind::Envelope(EnvelopeKind::Volume));
        assert_eq!(kind("TEMPOENVEX", vec![]), NodeKind::Envelope(EnvelopeKind::Tempo));
        assert_eq!(kind("JS", vec![]), NodeKind::Plugin);
        assert_eq!(kind("METRONOME", vec![]), NodeKind::Other);
    }

    #[test]
    fn test_source_kind_token() {
        for kind in [SourceKind::Wave, SourceKind::Midi, SourceKind::Mp3, SourceKind::Section] {
            let token = kind.token().unwrap();
            assert_eq!(SourceKind::of(Some(&Param::from(token))), kind);
        }
        assert_eq!(SourceKind::Other.token(), None);
    }

    #[test]
    fn test_specialize_folds_attributes() {
        let mut chain = Node::new("FXCHAIN").unwrap();
        chain.children = vec![
            line("SHOW", params![0]),
            line("BYPASS", params![0, 0, 0]),
            vst("A"),
            line("PRESETNAME", params!["Init"]),
            line("FLOATPOS", params![0, 0, 0, 0]),
            line("FXID", params!["{A}"]),
            line("WAK", params![0, 0]),
            line("BYPASS", params![1, 0, 0]),
            vst("B"),
            line("FXID", params!["{B}"]),
            line("DOCKED", params![0]),
        ];

        let chain = specialize(chain, &CodecConfig::default()).unwrap();
        let tokens: Vec<_> = chain.children.iter().map(Child::token).collect();
        assert_eq!(tokens, vec!["SHOW", "VST", "VST", "DOCKED"]);

        let a = chain.children[1].as_node().unwrap();
        assert_eq!(a.attributes.get("BYPASS"), Some(&params![0, 0, 0][..]));
        assert_eq!(a.attributes.get("WAK"), Some(&params![0, 0][..]));
        assert!(a.attributes.contains("FLOATPOS"));

        let b = chain.children[2].as_node().unwrap();
        assert_eq!(b.attributes.get("BYPASS"), Some(&params![1, 0, 0][..]));
        assert_eq!(b.attributes.get("FXID"), Some(&params!["{B}"][..]));
    }

    #[test]
    fn test_specialize_recurses_and_leaves_other_blocks() {
        let mut take_fx = Node::new("TAKEFX").unwrap();
        take_fx.children = vec![line("BYPASS", params![0, 0]), vst("C")];
        let mut item = Node::new("ITEM").unwrap();
        item.append(take_fx);
        item.append(Struct::new("BYPASS", params![0]).unwrap());

        let item = specialize(item, &CodecConfig::default()).unwrap();
        assert_eq!(item.children[1].token(), "BYPASS");
        let take_fx = item.children[0].as_node().unwrap();
        assert_eq!(take_fx.children.len(), 1);
        assert!(take_fx.children[0].as_node().unwrap().attributes.contains("BYPASS"));
    }

    fn round_trip(text: &str) {
        let config = CodecConfig::default();
        let chain = specialize(crate::parser::parse(text, &config).unwrap(), &config).unwrap();
        assert_eq!(crate::dump::dump(&chain, &config).unwrap(), text);
    }

    #[test]
    fn test_specialize_keeps_out_of_order_attributes() {
        let text = "<FXCHAIN\n  <VST A\n  >\n  FXID {X}\n  PRESETNAME p\n>";
        round_trip(text);

        let config = CodecConfig::default();
        let chain = specialize(crate::parser::parse(text, &config).unwrap(), &config).unwrap();
        let tokens: Vec<_> = chain.children.iter().map(Child::token).collect();
        assert_eq!(tokens, vec!["VST", "PRESETNAME"]);
        assert!(chain.children[0].as_node().unwrap().attributes.contains("FXID"));
    }

    #[test]
    fn test_specialize_keeps_repeated_attributes() {
        round_trip("<FXCHAIN\n  <VST A\n  >\n  FXID {X}\n  FXID {Y}\n>");
        round_trip("<FXCHAIN\n  BYPASS 0 0\n  <VST A\n  >\n  PRESETNAME p\n  FLOATPOS 0 0 0 0\n  FXID {X}\n  WAK 0 0\n>");
    }
}
