//! XML node representation
//!
//! Nodes live in the [`NodeArena`](super::NodeArena) and refer to each other
//! through [`NodeId`]s. A `NodeId` is also the handle scripts hold, so it
//! carries the slot generation it was issued for.

use std::fmt;
use std::num::NonZeroU32;

const INDEX_BITS: u32 = 20;
const INDEX_MASK: u32 = (1 << INDEX_BITS) - 1;
const GENERATION_BITS: u32 = 11;

/// Mask applied to slot generations before they are packed into a handle.
pub const GENERATION_MASK: u32 = (1 << GENERATION_BITS) - 1;

/// Largest number of nodes that can be alive at the same time.
pub const MAX_NODES: usize = INDEX_MASK as usize;

/// Generation-checked node handle.
///
/// Layout: bits 0..20 hold `slot index + 1`, bits 20..31 hold the slot
/// generation, bit 31 is always clear. The raw value is therefore a positive
/// 32-bit integer and never 0, which scripts use as "no node".
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(NonZeroU32);

impl NodeId {
    pub(crate) fn new(index: usize, generation: u32) -> Self {
        debug_assert!(index < MAX_NODES);
        let packed = ((generation & GENERATION_MASK) << INDEX_BITS) | (index as u32 & INDEX_MASK);
        // the low field can't overflow: index < INDEX_MASK
        NodeId(NonZeroU32::MIN.saturating_add(packed))
    }

    /// Rebuild a handle from its raw value. Returns `None` for values that
    /// could never have been issued (0, negative cells, empty index field).
    pub fn from_raw(raw: u32) -> Option<Self> {
        if raw >> (INDEX_BITS + GENERATION_BITS) != 0 || raw & INDEX_MASK == 0 {
            return None;
        }
        NonZeroU32::new(raw).map(NodeId)
    }

    #[inline]
    pub fn into_raw(self) -> u32 {
        self.0.get()
    }

    #[inline]
    pub fn index(self) -> usize {
        ((self.0.get() & INDEX_MASK) - 1) as usize
    }

    #[inline]
    pub fn generation(self) -> u32 {
        (self.0.get() >> INDEX_BITS) & GENERATION_MASK
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({}v{})", self.index(), self.generation())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.into_raw())
    }
}

/// Node type tag.
///
/// The discriminants are part of the script interface (`e_XML_NODE_TYPE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum NodeType {
    Document = 0,
    Element = 1,
    Comment = 2,
    Unknown = 3,
    Text = 4,
    Declaration = 5,
}

impl NodeType {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(NodeType::Document),
            1 => Some(NodeType::Element),
            2 => Some(NodeType::Comment),
            3 => Some(NodeType::Unknown),
            4 => Some(NodeType::Text),
            5 => Some(NodeType::Declaration),
            _ => None,
        }
    }

    #[inline]
    pub fn as_raw(self) -> i32 {
        self as i32
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::Document => "document",
            NodeType::Element => "element",
            NodeType::Comment => "comment",
            NodeType::Unknown => "unknown",
            NodeType::Text => "text",
            NodeType::Declaration => "declaration",
        }
    }

    /// Whether nodes of this type may own children.
    #[inline]
    pub fn is_container(self) -> bool {
        matches!(self, NodeType::Document | NodeType::Element)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attribute on an element, kept in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Attribute {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Contents of an `<?xml ...?>` declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Declaration {
    pub version: String,
    pub encoding: String,
    pub standalone: String,
}

/// Type-specific payload of a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    /// Document root; the value is the file it was loaded from or will be saved to
    Document { path: String },
    Element {
        name: String,
        attributes: Vec<Attribute>,
    },
    Comment(String),
    /// Character data; `cdata` marks text that came from (and is written as) a CDATA section
    Text { content: String, cdata: bool },
    Declaration(Declaration),
    /// `<!DOCTYPE ...>`, processing instructions and other markup kept verbatim
    Unknown(String),
}

/// An XML node in the arena
#[derive(Debug, Clone)]
pub struct XmlNode {
    pub data: NodeData,
    pub parent: Option<NodeId>,
    pub first_child: Option<NodeId>,
    pub last_child: Option<NodeId>,
    pub prev_sibling: Option<NodeId>,
    pub next_sibling: Option<NodeId>,
}

impl XmlNode {
    fn with_data(data: NodeData) -> Self {
        XmlNode {
            data,
            parent: None,
            first_child: None,
            last_child: None,
            prev_sibling: None,
            next_sibling: None,
        }
    }

    pub fn document(path: impl Into<String>) -> Self {
        Self::with_data(NodeData::Document { path: path.into() })
    }

    pub fn element(name: impl Into<String>) -> Self {
        Self::with_data(NodeData::Element {
            name: name.into(),
            attributes: Vec::new(),
        })
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self::with_data(NodeData::Text {
            content: content.into(),
            cdata: false,
        })
    }

    pub fn cdata(content: impl Into<String>) -> Self {
        Self::with_data(NodeData::Text {
            content: content.into(),
            cdata: true,
        })
    }

    pub fn comment(content: impl Into<String>) -> Self {
        Self::with_data(NodeData::Comment(content.into()))
    }

    pub fn declaration(declaration: Declaration) -> Self {
        Self::with_data(NodeData::Declaration(declaration))
    }

    pub fn unknown(raw: impl Into<String>) -> Self {
        Self::with_data(NodeData::Unknown(raw.into()))
    }

    pub fn node_type(&self) -> NodeType {
        match self.data {
            NodeData::Document { .. } => NodeType::Document,
            NodeData::Element { .. } => NodeType::Element,
            NodeData::Comment(_) => NodeType::Comment,
            NodeData::Text { .. } => NodeType::Text,
            NodeData::Declaration(_) => NodeType::Declaration,
            NodeData::Unknown(_) => NodeType::Unknown,
        }
    }

    /// The node's value: document path, element name, comment or text
    /// content, raw unknown markup. Declarations have an empty value.
    pub fn value(&self) -> &str {
        match &self.data {
            NodeData::Document { path } => path,
            NodeData::Element { name, .. } => name,
            NodeData::Comment(text) | NodeData::Unknown(text) => text,
            NodeData::Text { content, .. } => content,
            NodeData::Declaration(_) => "",
        }
    }

    /// Replace the node's value. Declarations have no value and ignore it.
    pub fn set_value(&mut self, value: String) {
        match &mut self.data {
            NodeData::Document { path } => *path = value,
            NodeData::Element { name, .. } => *name = value,
            NodeData::Comment(text) | NodeData::Unknown(text) => *text = value,
            NodeData::Text { content, .. } => *content = value,
            NodeData::Declaration(_) => {}
        }
    }

    #[inline]
    pub fn is_element(&self) -> bool {
        matches!(self.data, NodeData::Element { .. })
    }

    #[inline]
    pub fn has_children(&self) -> bool {
        self.first_child.is_some()
    }

    /// Attributes of an element, `None` for every other node type.
    pub fn attributes(&self) -> Option<&[Attribute]> {
        match &self.data {
            NodeData::Element { attributes, .. } => Some(attributes),
            _ => None,
        }
    }

    pub fn attributes_mut(&mut self) -> Option<&mut Vec<Attribute>> {
        match &mut self.data {
            NodeData::Element { attributes, .. } => Some(attributes),
            _ => None,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes()?
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }
}
