//! XPath values and their conversions
//!
//! Attribute steps produce [`XPathValue::Attributes`] instead of nodes:
//! attributes live inside their element and have no handle of their own,
//! so each one is carried with its owner.

use crate::dom::{node_string_value, DocumentAccess, NodeId};

/// An attribute selected by an attribute step
#[derive(Debug, Clone, PartialEq)]
pub struct Attr {
    pub owner: NodeId,
    pub name: String,
    pub value: String,
}

impl Attr {
    pub fn new(owner: NodeId, name: &str, value: &str) -> Self {
        Attr {
            owner,
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub enum XPathValue {
    /// Nodes in document order without duplicates
    NodeSet(Vec<NodeId>),
    Boolean(bool),
    Number(f64),
    String(String),
    /// Attributes in document order of their owners
    Attributes(Vec<Attr>),
}

impl Default for XPathValue {
    fn default() -> Self {
        XPathValue::NodeSet(Vec::new())
    }
}

impl XPathValue {
    pub fn single_node(id: NodeId) -> Self {
        XPathValue::NodeSet(vec![id])
    }

    /// `boolean()`
    pub fn to_boolean(&self) -> bool {
        match self {
            XPathValue::NodeSet(nodes) => !nodes.is_empty(),
            XPathValue::Attributes(attrs) => !attrs.is_empty(),
            XPathValue::Boolean(b) => *b,
            XPathValue::Number(n) => !(n.is_nan() || *n == 0.0),
            XPathValue::String(s) => !s.is_empty(),
        }
    }

    /// `number()` for everything but node sets, which give NaN here and
    /// need [`resolve_number`](Self::resolve_number).
    pub fn to_number(&self) -> f64 {
        match self {
            XPathValue::NodeSet(_) => f64::NAN,
            XPathValue::Boolean(b) => f64::from(u8::from(*b)),
            XPathValue::Number(n) => *n,
            XPathValue::String(s) => string_to_number(s),
            XPathValue::Attributes(attrs) => attrs.first().map_or(f64::NAN, |a| string_to_number(&a.value)),
        }
    }

    /// `string()` for everything but node sets, which give "" here and need
    /// [`resolve_string`](Self::resolve_string).
    pub fn to_string_value(&self) -> String {
        match self {
            XPathValue::NodeSet(_) => String::new(),
            XPathValue::Boolean(b) => b.to_string(),
            XPathValue::Number(n) => number_to_string(*n),
            XPathValue::String(s) => s.clone(),
            XPathValue::Attributes(attrs) => attrs.first().map(|a| a.value.clone()).unwrap_or_default(),
        }
    }

    /// `string()`; a node set converts through its first node.
    pub fn resolve_string<D: DocumentAccess>(&self, doc: &D) -> String {
        match self {
            XPathValue::NodeSet(nodes) => nodes
                .first()
                .map_or_else(String::new, |&id| node_string_value(doc, id)),
            other => other.to_string_value(),
        }
    }

    /// `number()`
    pub fn resolve_number<D: DocumentAccess>(&self, doc: &D) -> f64 {
        match self {
            XPathValue::NodeSet(_) => string_to_number(&self.resolve_string(doc)),
            other => other.to_number(),
        }
    }

    pub fn as_nodeset(&self) -> Option<&Vec<NodeId>> {
        match self {
            XPathValue::NodeSet(nodes) => Some(nodes),
            _ => None,
        }
    }
}

impl From<bool> for XPathValue {
    fn from(b: bool) -> Self {
        XPathValue::Boolean(b)
    }
}

impl From<f64> for XPathValue {
    fn from(n: f64) -> Self {
        XPathValue::Number(n)
    }
}

impl From<String> for XPathValue {
    fn from(s: String) -> Self {
        XPathValue::String(s)
    }
}

impl From<&str> for XPathValue {
    fn from(s: &str) -> Self {
        XPathValue::String(s.to_owned())
    }
}

impl From<Vec<NodeId>> for XPathValue {
    fn from(nodes: Vec<NodeId>) -> Self {
        XPathValue::NodeSet(nodes)
    }
}

/// Parse with the XPath `Number` grammar: `-? (digits ('.' digits?)? |
/// '.' digits)` inside optional XML whitespace. No exponents, no `inf`,
/// no leading `+`; anything else is NaN.
pub fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim_matches([' ', '\t', '\n', '\r']);
    let unsigned = trimmed.strip_prefix('-').unwrap_or(trimmed);
    let (int, frac) = match unsigned.split_once('.') {
        Some((int, frac)) => (int, Some(frac)),
        None => (unsigned, None),
    };

    let digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    let has_digits = !int.is_empty() || frac.is_some_and(|f| !f.is_empty());
    if !(has_digits && digits(int) && frac.is_none_or(digits)) {
        return f64::NAN;
    }
    trimmed.parse().unwrap_or(f64::NAN)
}

/// `string()` of a number: integral values without a fraction, never
/// exponent notation for them.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == n.trunc() && n.abs() < 1e15 {
        (n as i64).to_string()
    } else {
        n.to_string()
    }
}
