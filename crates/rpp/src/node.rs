//! The generic tree every RPP document parses into.
//!
//! A document is one root [`Node`]. Inside a node, a child is either a
//! single-line [`Struct`] (`VOLUME 11`) or another bracketed [`Node`]
//! (`<SOURCE WAVE ... >`). Plugin nodes may also carry base64 payload
//! [`Chunk`]s and a side-table of adjacent sibling attributes.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::header::PluginHeader;

/// One positional parameter: a number or a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Param {
    Number(f64),
    String(String),
}

impl Param {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Param::Number(n) => Some(*n),
            Param::String(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Param::String(s) => Some(s),
            Param::Number(_) => None,
        }
    }
}

impl From<f64> for Param {
    fn from(n: f64) -> Self {
        Param::Number(n)
    }
}

impl From<i32> for Param {
    fn from(n: i32) -> Self {
        Param::Number(n.into())
    }
}

impl From<u32> for Param {
    fn from(n: u32) -> Self {
        Param::Number(n.into())
    }
}

impl From<&str> for Param {
    fn from(s: &str) -> Self {
        Param::String(s.to_string())
    }
}

impl From<String> for Param {
    fn from(s: String) -> Self {
        Param::String(s)
    }
}

/// Build a `Vec<Param>` from mixed literals: `params![0.1, "6.13/OSX64", 1596785244]`.
#[macro_export]
macro_rules! params {
    ($($p:expr),* $(,)?) => {
        vec![$($crate::Param::from($p)),*]
    };
}

/// Check that `token` can stand at the start of a line.
pub fn validate_token(token: &str) -> Result<()> {
    if token.is_empty() {
        return Err(Error::Validation("token must not be empty".into()));
    }
    if token.starts_with(['"', '\'', '`', '|']) {
        return Err(Error::Validation(format!(
            "token {token:?} must not start with a quote or pipe"
        )));
    }
    if token
        .chars()
        .any(|c| c.is_whitespace() || c == '<' || c == '>')
    {
        return Err(Error::Validation(format!(
            "token {token:?} must not contain whitespace or angle brackets"
        )));
    }
    Ok(())
}

/// A single-line record: token plus parameters, no nesting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Struct {
    pub token: String,
    #[serde(default)]
    pub params: Vec<Param>,
}

impl Struct {
    pub fn new(token: impl Into<String>, params: Vec<Param>) -> Result<Self> {
        let token = token.into();
        validate_token(&token)?;
        Ok(Struct { token, params })
    }
}

/// An entry of [`Node::children`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Child {
    Node(Node),
    Struct(Struct),
}

impl Child {
    pub fn token(&self) -> &str {
        match self {
            Child::Node(n) => &n.token,
            Child::Struct(s) => &s.token,
        }
    }

    pub fn params(&self) -> &[Param] {
        match self {
            Child::Node(n) => &n.params,
            Child::Struct(s) => &s.params,
        }
    }

    pub fn params_mut(&mut self) -> &mut Vec<Param> {
        match self {
            Child::Node(n) => &mut n.params,
            Child::Struct(s) => &mut s.params,
        }
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Child::Node(n) => Some(n),
            Child::Struct(_) => None,
        }
    }

    pub fn as_node_mut(&mut self) -> Option<&mut Node> {
        match self {
            Child::Node(n) => Some(n),
            Child::Struct(_) => None,
        }
    }

    pub fn as_struct(&self) -> Option<&Struct> {
        match self {
            Child::Struct(s) => Some(s),
            Child::Node(_) => None,
        }
    }

    pub fn is_node(&self) -> bool {
        matches!(self, Child::Node(_))
    }

    /// Set parameter `index`, appending when `index == params.len()`.
    pub fn set_param(&mut self, index: usize, value: impl Into<Param>) -> Result<()> {
        set_param_at(self.params_mut(), index, value.into())
    }
}

impl From<Node> for Child {
    fn from(node: Node) -> Self {
        Child::Node(node)
    }
}

impl From<Struct> for Child {
    fn from(s: Struct) -> Self {
        Child::Struct(s)
    }
}

/// One embedded binary payload of a node.
///
/// Chunks are stored unwrapped; the dumper re-wraps them to the fixed
/// line width.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Chunk {
    Base64(String),
    Header(PluginHeader),
}

impl Chunk {
    /// The flat base64 text of this chunk.
    pub fn to_base64(&self) -> String {
        match self {
            Chunk::Base64(s) => s.clone(),
            Chunk::Header(h) => h.to_base64(),
        }
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Chunk::Base64(s) => f.write_str(s),
            Chunk::Header(h) => f.write_str(&h.to_base64()),
        }
    }
}

impl From<String> for Chunk {
    fn from(s: String) -> Self {
        Chunk::Base64(s)
    }
}

impl From<&str> for Chunk {
    fn from(s: &str) -> Self {
        Chunk::Base64(s.to_string())
    }
}

impl From<PluginHeader> for Chunk {
    fn from(h: PluginHeader) -> Self {
        Chunk::Header(h)
    }
}

/// Sibling structs that belong to a plugin but sit next to it in the
/// enclosing FX chain, keyed by their token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginAttributes(BTreeMap<String, Vec<Param>>);

impl PluginAttributes {
    /// Attributes written on the line before the plugin block.
    pub const LEADING: &'static [&'static str] = &["BYPASS"];
    /// Attributes written after the plugin block, in output order.
    pub const TRAILING: &'static [&'static str] = &["PRESETNAME", "FLOATPOS", "FXID", "WAK"];

    pub fn is_known(token: &str) -> bool {
        Self::LEADING.contains(&token) || Self::TRAILING.contains(&token)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, token: &str) -> Option<&[Param]> {
        self.0.get(token).map(Vec::as_slice)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.0.contains_key(token)
    }

    /// Store `params` under `token`; only the known attribute tokens are accepted.
    pub fn insert(&mut self, token: &str, params: Vec<Param>) -> Result<Option<Vec<Param>>> {
        if !Self::is_known(token) {
            return Err(Error::Logic(format!(
                "{token} is not a plugin attribute (expected one of {:?} or {:?})",
                Self::LEADING,
                Self::TRAILING
            )));
        }
        Ok(self.0.insert(token.to_string(), params))
    }

    pub fn remove(&mut self, token: &str) -> Option<Vec<Param>> {
        self.0.remove(token)
    }

    pub fn leading(&self) -> impl Iterator<Item = (&'static str, &[Param])> {
        Self::ordered(&self.0, Self::LEADING)
    }

    pub fn trailing(&self) -> impl Iterator<Item = (&'static str, &[Param])> {
        Self::ordered(&self.0, Self::TRAILING)
    }

    fn ordered<'a>(
        map: &'a BTreeMap<String, Vec<Param>>,
        order: &'static [&'static str],
    ) -> impl Iterator<Item = (&'static str, &'a [Param])> {
        order
            .iter()
            .filter_map(move |token| map.get(*token).map(|p| (*token, p.as_slice())))
    }
}

/// A bracketed block: `<TOKEN params...` followed by a body and `>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub token: String,
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default)]
    pub children: Vec<Child>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chunks: Vec<Chunk>,
    #[serde(default, skip_serializing_if = "PluginAttributes::is_empty")]
    pub attributes: PluginAttributes,
}

impl Node {
    /// An empty block with the given token.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_parts(token, Vec::new(), Vec::new(), Vec::new())
    }

    pub fn with_params(token: impl Into<String>, params: Vec<Param>) -> Result<Self> {
        Self::with_parts(token, params, Vec::new(), Vec::new())
    }

    /// Build a node from all of its parts, validating the token.
    pub fn with_parts(
        token: impl Into<String>,
        params: Vec<Param>,
        children: Vec<Child>,
        chunks: Vec<Chunk>,
    ) -> Result<Self> {
        let token = token.into();
        validate_token(&token)?;
        Ok(Node {
            token,
            params,
            children,
            chunks,
            attributes: PluginAttributes::default(),
        })
    }

    /// The `occurrence`-th (0-based) child whose token is `token`.
    pub fn find_child(&self, token: &str, occurrence: usize) -> Option<&Child> {
        self.children
            .iter()
            .filter(|c| c.token() == token)
            .nth(occurrence)
    }

    pub fn find_child_mut(&mut self, token: &str, occurrence: usize) -> Option<&mut Child> {
        self.children
            .iter_mut()
            .filter(|c| c.token() == token)
            .nth(occurrence)
    }

    /// Like [`Node::find_child`], but appends an empty struct with that
    /// token when nothing matches.
    pub fn get_or_create_child(&mut self, token: &str, occurrence: usize) -> Result<&mut Child> {
        let position = self
            .children
            .iter()
            .enumerate()
            .filter(|(_, c)| c.token() == token)
            .nth(occurrence)
            .map(|(i, _)| i);

        match position {
            Some(i) => Ok(&mut self.children[i]),
            None => {
                let end = self.children.len();
                self.insert_child(token, end)
            }
        }
    }

    /// Splice an empty struct with `token` into the children at `index`.
    pub fn insert_child(&mut self, token: &str, index: usize) -> Result<&mut Child> {
        if index > self.children.len() {
            return Err(Error::Logic(format!(
                "cannot insert {token} at index {index}: <{}> has {} children",
                self.token,
                self.children.len()
            )));
        }
        let child = Struct::new(token, Vec::new())?;
        self.children.insert(index, Child::Struct(child));
        Ok(&mut self.children[index])
    }

    /// Remove and return the child at `index`.
    pub fn remove_child(&mut self, index: usize) -> Result<Child> {
        if index >= self.children.len() {
            return Err(Error::Logic(format!(
                "cannot remove child {index}: <{}> has {} children",
                self.token,
                self.children.len()
            )));
        }
        Ok(self.children.remove(index))
    }

    /// Push a child at the end. Chainable.
    pub fn append(&mut self, child: impl Into<Child>) -> &mut Self {
        self.children.push(child.into());
        self
    }

    /// Set parameter `index`, appending when `index == params.len()`.
    pub fn set_param(&mut self, index: usize, value: impl Into<Param>) -> Result<()> {
        set_param_at(&mut self.params, index, value.into())
    }

    /// Child blocks only, skipping single-line structs.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.children.iter().filter_map(Child::as_node)
    }
}

fn set_param_at(params: &mut Vec<Param>, index: usize, value: Param) -> Result<()> {
    match index.cmp(&params.len()) {
        std::cmp::Ordering::Less => {
            params[index] = value;
            Ok(())
        }
        std::cmp::Ordering::Equal => {
            params.push(value);
            Ok(())
        }
        std::cmp::Ordering::Greater => Err(Error::Logic(format!(
            "cannot set parameter {index}: only {} present",
            params.len()
        ))),
    }
}
