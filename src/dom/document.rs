//! Tree operations on top of the arena
//!
//! Navigation with optional value filters, value access and the
//! element-only attribute operations.

use super::arena::NodeArena;
use super::node::{Attribute, Declaration, NodeData, NodeId, NodeType, XmlNode};
use crate::error::{Error, Result};

/// Direction for filtered navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    FirstChild,
    LastChild,
    NextSibling,
    PreviousSibling,
}

impl NodeArena {
    /// Create an empty document node with a declaration child.
    pub fn create_document(&mut self, path: &str, declaration: Declaration) -> Result<NodeId> {
        let doc = self.insert(XmlNode::document(path))?;
        let decl = self.insert(XmlNode::declaration(declaration))?;
        self.append_child(doc, decl)?;
        Ok(doc)
    }

    /// Step from `id` in `direction`. With a filter, keep walking the same
    /// way until a node whose value equals it.
    pub fn navigate(
        &self,
        id: NodeId,
        direction: Direction,
        filter: Option<&str>,
    ) -> Result<Option<NodeId>> {
        let node = self.node(id)?;
        let mut candidate = match direction {
            Direction::FirstChild => node.first_child,
            Direction::LastChild => node.last_child,
            Direction::NextSibling => node.next_sibling,
            Direction::PreviousSibling => node.prev_sibling,
        };

        let Some(filter) = filter else {
            return Ok(candidate);
        };

        while let Some(current) = candidate {
            let node = self.node(current)?;
            if node.value() == filter {
                return Ok(Some(current));
            }
            candidate = match direction {
                Direction::FirstChild | Direction::NextSibling => node.next_sibling,
                Direction::LastChild | Direction::PreviousSibling => node.prev_sibling,
            };
        }
        Ok(None)
    }

    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>> {
        Ok(self.node(id)?.parent)
    }

    pub fn node_type(&self, id: NodeId) -> Result<NodeType> {
        Ok(self.node(id)?.node_type())
    }

    pub fn value(&self, id: NodeId) -> Result<&str> {
        Ok(self.node(id)?.value())
    }

    pub fn set_value(&mut self, id: NodeId, value: String) -> Result<()> {
        self.node_mut(id)?.set_value(value);
        Ok(())
    }

    fn element(&self, id: NodeId) -> Result<&[Attribute]> {
        let node = self.node(id)?;
        node.attributes().ok_or(Error::WrongNodeType {
            expected: NodeType::Element,
            found: node.node_type(),
        })
    }

    fn element_mut(&mut self, id: NodeId) -> Result<&mut Vec<Attribute>> {
        let node = self.node_mut(id)?;
        let found = node.node_type();
        node.attributes_mut().ok_or(Error::WrongNodeType {
            expected: NodeType::Element,
            found,
        })
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Result<Option<&str>> {
        Ok(self
            .element(id)?
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str()))
    }

    /// Set an attribute, replacing an existing value in place.
    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> Result<()> {
        let attributes = self.element_mut(id)?;
        match attributes.iter_mut().find(|a| a.name == name) {
            Some(existing) => existing.value = value.to_string(),
            None => attributes.push(Attribute::new(name, value)),
        }
        Ok(())
    }

    /// Remove an attribute. Returns whether it was present.
    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> Result<bool> {
        let attributes = self.element_mut(id)?;
        let before = attributes.len();
        attributes.retain(|a| a.name != name);
        Ok(attributes.len() != before)
    }

    /// The declaration child of a document, if it has one.
    pub fn declaration_of(&self, doc: NodeId) -> Option<&Declaration> {
        self.children(doc)
            .filter_map(|c| self.get(c))
            .find_map(|n| match &n.data {
                NodeData::Declaration(decl) => Some(decl),
                _ => None,
            })
    }
}
