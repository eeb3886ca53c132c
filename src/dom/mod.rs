//! DOM Module - mutable arena-based XML trees
//!
//! - One [`NodeArena`] holds the nodes of every open document
//! - [`NodeId`] handles are generation-checked and double as script handles
//! - [`DocumentAccess`] is the read-only view the XPath engine works against

pub mod arena;
pub mod document;
pub mod node;
pub mod writer;

pub use arena::NodeArena;
pub use document::Direction;
pub use node::{Attribute, Declaration, NodeData, NodeId, NodeType, XmlNode};

/// Read-only tree access used by XPath evaluation
pub trait DocumentAccess {
    fn node_type_of(&self, id: NodeId) -> Option<NodeType>;

    fn parent_of(&self, id: NodeId) -> Option<NodeId>;

    fn first_child_of(&self, id: NodeId) -> Option<NodeId>;

    fn next_sibling_of(&self, id: NodeId) -> Option<NodeId>;

    fn prev_sibling_of(&self, id: NodeId) -> Option<NodeId>;

    /// Element name
    fn node_name(&self, id: NodeId) -> Option<&str>;

    /// Content of text, comment and unknown nodes
    fn text_content(&self, id: NodeId) -> Option<&str>;

    fn get_attribute(&self, id: NodeId, name: &str) -> Option<&str>;

    /// All attribute names and values of an element, in source order
    fn attribute_pairs(&self, id: NodeId) -> Vec<(&str, &str)>;

    fn children_vec(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut child = self.first_child_of(id);
        while let Some(c) = child {
            result.push(c);
            child = self.next_sibling_of(c);
        }
        result
    }

    /// Descendants in document order
    fn descendants_vec(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut stack = self.children_vec(id);
        stack.reverse();
        while let Some(current) = stack.pop() {
            result.push(current);
            let mut children = self.children_vec(current);
            children.reverse();
            stack.extend(children);
        }
        result
    }

    /// Topmost ancestor (the document for attached nodes)
    fn root_of(&self, id: NodeId) -> NodeId {
        let mut current = id;
        while let Some(parent) = self.parent_of(current) {
            current = parent;
        }
        current
    }
}

impl DocumentAccess for NodeArena {
    fn node_type_of(&self, id: NodeId) -> Option<NodeType> {
        self.get(id).map(XmlNode::node_type)
    }

    fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.get(id)?.parent
    }

    fn first_child_of(&self, id: NodeId) -> Option<NodeId> {
        self.get(id)?.first_child
    }

    fn next_sibling_of(&self, id: NodeId) -> Option<NodeId> {
        self.get(id)?.next_sibling
    }

    fn prev_sibling_of(&self, id: NodeId) -> Option<NodeId> {
        self.get(id)?.prev_sibling
    }

    fn node_name(&self, id: NodeId) -> Option<&str> {
        match &self.get(id)?.data {
            NodeData::Element { name, .. } => Some(name),
            _ => None,
        }
    }

    fn text_content(&self, id: NodeId) -> Option<&str> {
        match &self.get(id)?.data {
            NodeData::Text { content, .. } => Some(content),
            NodeData::Comment(text) | NodeData::Unknown(text) => Some(text),
            _ => None,
        }
    }

    fn get_attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.get(id)?.attribute(name)
    }

    fn attribute_pairs(&self, id: NodeId) -> Vec<(&str, &str)> {
        self.get(id)
            .and_then(XmlNode::attributes)
            .map(|attrs| {
                attrs
                    .iter()
                    .map(|a| (a.name.as_str(), a.value.as_str()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn children_vec(&self, id: NodeId) -> Vec<NodeId> {
        self.children(id).collect()
    }

    fn descendants_vec(&self, id: NodeId) -> Vec<NodeId> {
        self.descendants(id)
    }

    fn root_of(&self, id: NodeId) -> NodeId {
        NodeArena::root_of(self, id)
    }
}

/// XPath string-value of a node.
///
/// Documents and elements concatenate their descendant text, text and
/// comment nodes yield their content, everything else is empty.
pub fn node_string_value<D: DocumentAccess>(doc: &D, id: NodeId) -> String {
    match doc.node_type_of(id) {
        Some(NodeType::Text) | Some(NodeType::Comment) => {
            doc.text_content(id).unwrap_or("").to_string()
        }
        Some(NodeType::Document) | Some(NodeType::Element) => {
            let mut result = String::new();
            for desc in doc.descendants_vec(id) {
                if doc.node_type_of(desc) == Some(NodeType::Text) {
                    if let Some(text) = doc.text_content(desc) {
                        result.push_str(text);
                    }
                }
            }
            result
        }
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_value_concatenates_descendant_text() {
        let mut arena = NodeArena::new();
        let root = arena.insert(XmlNode::element("a")).unwrap();
        let b = arena.insert(XmlNode::element("b")).unwrap();
        let t1 = arena.insert(XmlNode::text("4")).unwrap();
        let note = arena.insert(XmlNode::comment("skip")).unwrap();
        let t2 = arena.insert(XmlNode::cdata("2")).unwrap();
        arena.append_child(root, b).unwrap();
        arena.append_child(b, t1).unwrap();
        arena.append_child(root, note).unwrap();
        arena.append_child(root, t2).unwrap();

        assert_eq!(node_string_value(&arena, root), "42");
        assert_eq!(node_string_value(&arena, note), "skip");
        assert_eq!(arena.children_vec(root), vec![b, note, t2]);
    }
}
