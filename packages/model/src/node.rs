//! # Document Nodes
//!
//! A node is the atomic unit of document structure. Its `type` is an open tag
//! looked up in a [`NodeRegistry`](crate::NodeRegistry); the registry decides
//! what the node is allowed to do. The node itself only carries identity,
//! tree links and a type-specific payload.

use crate::key::NodeKey;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::ops::BitOr;

/// Open set of node type tags
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeType(Cow<'static, str>);

impl NodeType {
    pub const ROOT: NodeType = NodeType(Cow::Borrowed("root"));
    pub const PARAGRAPH: NodeType = NodeType(Cow::Borrowed("paragraph"));
    pub const HEADING: NodeType = NodeType(Cow::Borrowed("heading"));
    pub const QUOTE: NodeType = NodeType(Cow::Borrowed("quote"));
    pub const LINK: NodeType = NodeType(Cow::Borrowed("link"));
    pub const TEXT: NodeType = NodeType(Cow::Borrowed("text"));
    pub const MENTION: NodeType = NodeType(Cow::Borrowed("mention"));
    pub const LINE_BREAK: NodeType = NodeType(Cow::Borrowed("linebreak"));
    pub const DECORATOR: NodeType = NodeType(Cow::Borrowed("decorator"));

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeType {
    fn from(name: &str) -> Self {
        NodeType::new(name)
    }
}

/// Formatting bitmask for text runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TextFormat(u32);

impl TextFormat {
    pub const BOLD: TextFormat = TextFormat(1);
    pub const ITALIC: TextFormat = TextFormat(1 << 1);
    pub const STRIKETHROUGH: TextFormat = TextFormat(1 << 2);
    pub const UNDERLINE: TextFormat = TextFormat(1 << 3);
    pub const CODE: TextFormat = TextFormat(1 << 4);
    pub const SUBSCRIPT: TextFormat = TextFormat(1 << 5);
    pub const SUPERSCRIPT: TextFormat = TextFormat(1 << 6);

    pub const fn empty() -> Self {
        TextFormat(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        TextFormat(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: TextFormat) -> bool {
        self.0 & other.0 == other.0
    }

    /// Flip the given flags
    pub fn toggle(self, other: TextFormat) -> Self {
        TextFormat(self.0 ^ other.0)
    }
}

impl BitOr for TextFormat {
    type Output = TextFormat;

    fn bitor(self, rhs: TextFormat) -> TextFormat {
        TextFormat(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TextContent {
    pub text: String,
    #[serde(default, skip_serializing_if = "TextFormat::is_empty")]
    pub format: TextFormat,
}

/// Type-specific node payload
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum NodeContent {
    /// Structural nodes with nothing but children
    #[default]
    Empty,

    /// A run of text
    Text(TextContent),

    /// Opaque payload owned by a node-type plugin
    Data { value: serde_json::Value },
}

impl NodeContent {
    pub fn text(text: impl Into<String>) -> Self {
        NodeContent::Text(TextContent {
            text: text.into(),
            format: TextFormat::empty(),
        })
    }

    pub fn formatted(text: impl Into<String>, format: TextFormat) -> Self {
        NodeContent::Text(TextContent {
            text: text.into(),
            format,
        })
    }

    pub fn data(value: serde_json::Value) -> Self {
        NodeContent::Data { value }
    }

    pub fn as_text(&self) -> Option<&TextContent> {
        match self {
            NodeContent::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_text_mut(&mut self) -> Option<&mut TextContent> {
        match self {
            NodeContent::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Length in chars, zero for non-text payloads
    pub fn text_len(&self) -> usize {
        self.as_text().map(|t| t.text.chars().count()).unwrap_or(0)
    }
}

/// A single document node.
///
/// Fields are only writable through [`NodeStore`](crate::NodeStore), which
/// keeps the tree links consistent.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub(crate) key: NodeKey,
    pub(crate) node_type: NodeType,
    pub(crate) parent: Option<NodeKey>,
    pub(crate) children: Vec<NodeKey>,
    pub(crate) content: NodeContent,
}

impl Node {
    pub(crate) fn new(key: NodeKey, node_type: NodeType, content: NodeContent) -> Self {
        Self {
            key,
            node_type,
            parent: None,
            children: Vec::new(),
            content,
        }
    }

    pub fn key(&self) -> NodeKey {
        self.key
    }

    pub fn node_type(&self) -> &NodeType {
        &self.node_type
    }

    pub fn parent(&self) -> Option<NodeKey> {
        self.parent
    }

    pub fn children(&self) -> &[NodeKey] {
        &self.children
    }

    pub fn content(&self) -> &NodeContent {
        &self.content
    }

    pub fn is_text(&self) -> bool {
        matches!(self.content, NodeContent::Text(_))
    }

    pub fn text(&self) -> Option<&str> {
        self.content.as_text().map(|t| t.text.as_str())
    }

    pub fn text_len(&self) -> usize {
        self.content.text_len()
    }
}

/// Byte index of the `char_offset`-th char, clamped to the end
pub fn byte_offset(text: &str, char_offset: usize) -> usize {
    text.char_indices()
        .nth(char_offset)
        .map(|(i, _)| i)
        .unwrap_or(text.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_type_equality_ignores_storage() {
        assert_eq!(NodeType::PARAGRAPH, NodeType::new("paragraph"));
        assert_ne!(NodeType::PARAGRAPH, NodeType::HEADING);
    }

    #[test]
    fn test_text_format_flags() {
        let format = TextFormat::BOLD | TextFormat::ITALIC;
        assert!(format.contains(TextFormat::BOLD));
        assert!(!format.contains(TextFormat::CODE));

        let toggled = format.toggle(TextFormat::BOLD);
        assert!(!toggled.contains(TextFormat::BOLD));
        assert!(toggled.contains(TextFormat::ITALIC));
    }

    #[test]
    fn test_text_len_counts_chars() {
        let content = NodeContent::text("すし🍣");
        assert_eq!(content.text_len(), 3);
        assert_eq!(NodeContent::Empty.text_len(), 0);
    }

    #[test]
    fn test_byte_offset() {
        assert_eq!(byte_offset("héllo", 2), 3);
        assert_eq!(byte_offset("abc", 10), 3);
    }

    #[test]
    fn test_content_serialization() {
        let content = NodeContent::formatted("Hi", TextFormat::BOLD);
        let json = serde_json::to_string(&content).unwrap();
        assert_eq!(json, r#"{"kind":"text","text":"Hi","format":1}"#);

        let back: NodeContent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, content);
    }

    #[test]
    fn test_plain_text_omits_format() {
        let json = serde_json::to_string(&NodeContent::text("Hi")).unwrap();
        assert_eq!(json, r#"{"kind":"text","text":"Hi"}"#);

        let back: NodeContent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, NodeContent::text("Hi"));
    }
}
