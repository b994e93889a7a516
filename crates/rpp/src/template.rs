//! Default document for new projects.

use std::sync::OnceLock;

use tracing::debug;

use crate::config::CodecConfig;
use crate::error::Result;
use crate::node::Node;
use crate::parser;

const EMPTY_PROJECT: &str = include_str!("../data/empty.rpp");

/// A parsed project used as the starting point for new documents.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    root: Node,
}

impl Template {
    /// The bundled empty project, parsed once per process.
    pub fn bundled() -> Result<&'static Template> {
        static BUNDLED: OnceLock<Template> = OnceLock::new();
        if let Some(template) = BUNDLED.get() {
            return Ok(template);
        }
        let template = Template::from_text(EMPTY_PROJECT, CodecConfig::global())?;
        debug!(children = template.root.children.len(), "loaded bundled project template");
        Ok(BUNDLED.get_or_init(|| template))
    }

    /// Build a template from caller-supplied project text.
    pub fn from_text(text: &str, config: &CodecConfig) -> Result<Self> {
        Ok(Template {
            root: parser::parse(text, config)?,
        })
    }

    pub fn from_node(root: Node) -> Self {
        Template { root }
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    /// A fresh copy of the template tree.
    pub fn instantiate(&self) -> Node {
        self.root.clone()
    }
}

/// The bundled text, as compiled into the crate.
pub fn bundled_text() -> &'static str {
    EMPTY_PROJECT
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dump::dump;
    use crate::node::Struct;
    use crate::params;
    use crate::specialize::NodeKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_bundled_is_project() {
        let template = Template::bundled().unwrap();
        assert_eq!(NodeKind::of(template.root()), NodeKind::Project);
        assert!(template.root().find_child("RECORD_CFG", 0).is_some());
        assert!(std::ptr::eq(template, Template::bundled().unwrap()));
    }

    #[test]
    fn test_bundled_round_trips() {
        let template = Template::bundled().unwrap();
        let text = dump(template.root(), CodecConfig::global()).unwrap();
        assert_eq!(text, bundled_text().trim_end());
    }

    #[test]
    fn test_instances_are_independent() {
        let template = Template::from_text("<REAPER_PROJECT 0.1 test 0\n  TEMPO 120 4 4\n>", &CodecConfig::default()).unwrap();
        let mut a = template.instantiate();
        a.append(Struct::new("MARKER", params![1, 0, "intro"]).unwrap());

        let b = template.instantiate();
        assert_eq!(b.children.len(), 1);
        assert_eq!(a.children.len(), 2);
    }
}
