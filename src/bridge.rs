//! XmlBridge - every script operation as a safe method
//!
//! The bridge owns the node arena (and with it every open document), the
//! compiled-XPath cache, the path configuration and the console logger.
//! Handles come in as [`NodeId`]s; each call resolves them through the
//! arena, so a destroyed node is reported as [`Error::InvalidHandle`] and
//! never touched.

use std::fs;

use tracing::{debug, warn};

use crate::config::BridgeConfig;
use crate::core::encoding::decode_document;
use crate::core::parser::{parse_into, ErrorCode, ParseError};
use crate::dom::writer::write_document;
use crate::dom::{Declaration, Direction, NodeArena, NodeId, NodeType, XmlNode};
use crate::error::{Error, Result};
use crate::log::HostLog;
use crate::xpath::{self, XPathEngine, XPathValue};

pub const DEFAULT_VERSION: &str = "1.0";
pub const DEFAULT_ENCODING: &str = "ISO-8859-1";

pub struct XmlBridge {
    arena: NodeArena,
    xpath: XPathEngine,
    config: BridgeConfig,
    log: Box<dyn HostLog>,
}

impl XmlBridge {
    pub fn new(config: BridgeConfig, log: Box<dyn HostLog>) -> Self {
        XmlBridge {
            arena: NodeArena::new(),
            xpath: XPathEngine::new(config.xpath_cache_capacity),
            config,
            log,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Nodes currently alive across all documents
    pub fn live_nodes(&self) -> usize {
        self.arena.len()
    }

    // ========================================================================
    // Documents
    // ========================================================================

    /// New empty document with a declaration. The file is not touched until
    /// the document is saved.
    pub fn create_document(
        &mut self,
        filename: &str,
        version: Option<&str>,
        encoding: Option<&str>,
    ) -> Result<NodeId> {
        let path = self.config.complete_path(filename);
        let declaration = Declaration {
            version: version.unwrap_or(DEFAULT_VERSION).to_string(),
            encoding: encoding.unwrap_or(DEFAULT_ENCODING).to_string(),
            standalone: String::new(),
        };
        let doc = self.arena.create_document(&path, declaration)?;
        debug!(%path, handle = %doc, "document created");
        Ok(doc)
    }

    /// Read and parse a document. Failures are reported on the console in
    /// the `XML Error` format and leave nothing allocated.
    pub fn load_document(&mut self, filename: &str) -> Result<NodeId> {
        let path = self.config.complete_path(filename);
        let doc = self.arena.insert(XmlNode::document(path.as_str()))?;

        match self.read_into(doc, &path) {
            Ok(()) => {
                debug!(%path, handle = %doc, nodes = self.arena.len(), "document loaded");
                Ok(doc)
            }
            Err(err) => {
                self.arena.remove_subtree(doc)?;
                if let Error::Parse(parse) = &err {
                    self.log.log(&parse.to_string());
                }
                Err(err)
            }
        }
    }

    fn read_into(&mut self, doc: NodeId, path: &str) -> Result<()> {
        let bytes = fs::read(path).map_err(|err| {
            debug!(%path, error = %err, "cannot read document");
            ParseError::unlocated(ErrorCode::OpeningFile)
        })?;
        let text = decode_document(&bytes).map_err(|reason| {
            debug!(%path, %reason, "cannot decode document");
            ParseError::unlocated(ErrorCode::Error)
        })?;
        parse_into(&mut self.arena, doc, &text)
    }

    /// Serialize a document to its own path, or to `target` exactly as the
    /// script passed it. The document keeps its path either way.
    pub fn save_document(&self, doc: NodeId, target: Option<&str>) -> Result<()> {
        self.expect_type(doc, NodeType::Document)?;
        let path = match target {
            Some(target) => target.to_string(),
            None => self.arena.value(doc)?.to_string(),
        };
        let bytes = write_document(&self.arena, doc)?;
        fs::write(&path, bytes).map_err(|err| Error::io(&path, err))?;
        debug!(%path, handle = %doc, "document saved");
        Ok(())
    }

    /// Free a document and every node in it. Returns the number of nodes
    /// freed.
    pub fn unload_document(&mut self, doc: NodeId) -> Result<usize> {
        self.expect_type(doc, NodeType::Document)?;
        let freed = self.arena.remove_subtree(doc)?;
        debug!(handle = %doc, freed, "document unloaded");
        Ok(freed)
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    /// Append a new element, comment or text node under `parent`. Any other
    /// type creates an element.
    pub fn create_node(&mut self, parent: NodeId, value: &str, node_type: NodeType) -> Result<NodeId> {
        let parent_type = self.arena.node_type(parent)?;
        if !parent_type.is_container() {
            return Err(Error::CannotHaveChildren(parent_type));
        }

        let node = match node_type {
            NodeType::Comment => XmlNode::comment(value),
            NodeType::Text => XmlNode::text(value),
            _ => XmlNode::element(value),
        };
        let id = self.arena.insert(node)?;
        self.arena.append_child(parent, id)?;
        Ok(id)
    }

    /// Unlink `child` from `parent`. The subtree stays alive and its handles
    /// stay valid until it is destroyed.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.arena.node(parent)?;
        if self.arena.node(child)?.parent != Some(parent) {
            return Err(Error::NotAChild { parent, child });
        }
        self.arena.detach(child)
    }

    /// Unlink and free a node with its subtree. Returns the number of nodes
    /// freed.
    pub fn destroy_node(&mut self, node: NodeId) -> Result<usize> {
        self.arena.remove_subtree(node)
    }

    pub fn navigate(&self, node: NodeId, direction: Direction, filter: Option<&str>) -> Result<Option<NodeId>> {
        self.arena.navigate(node, direction, filter)
    }

    pub fn parent(&self, node: NodeId) -> Result<Option<NodeId>> {
        self.arena.parent(node)
    }

    pub fn node_type(&self, node: NodeId) -> Result<NodeType> {
        self.arena.node_type(node)
    }

    pub fn value(&self, node: NodeId) -> Result<&str> {
        self.arena.value(node)
    }

    /// Set a node's value. A document's value is its path and is resolved
    /// like a file name.
    pub fn set_value(&mut self, node: NodeId, value: &str) -> Result<()> {
        let value = match self.arena.node_type(node)? {
            NodeType::Document => self.config.complete_path(value),
            _ => value.to_string(),
        };
        self.arena.set_value(node, value)
    }

    // ========================================================================
    // Attributes
    // ========================================================================

    pub fn attribute(&self, element: NodeId, name: &str) -> Result<Option<&str>> {
        self.arena.attribute(element, name)
    }

    pub fn set_attribute(&mut self, element: NodeId, name: &str, value: &str) -> Result<()> {
        self.arena.set_attribute(element, name, value)
    }

    /// Returns whether the attribute existed
    pub fn remove_attribute(&mut self, element: NodeId, name: &str) -> Result<bool> {
        self.arena.remove_attribute(element, name)
    }

    // ========================================================================
    // XPath
    // ========================================================================

    /// Evaluate with `context` as the context node. A query that does not
    /// compile or evaluate is logged and yields `None`; only a bad handle is
    /// an error.
    fn evaluate(&mut self, context: NodeId, query: &str) -> Result<Option<XPathValue>> {
        self.arena.node(context)?;
        match self.xpath.evaluate(&self.arena, context, query) {
            Ok(value) => Ok(Some(value)),
            Err(reason) => {
                warn!(xpath = query, %reason, "XPath query failed");
                Ok(None)
            }
        }
    }

    pub fn xpath_int(&mut self, context: NodeId, query: &str) -> Result<i32> {
        Ok(self
            .evaluate(context, query)?
            .map_or(0, |v| xpath::to_int(&v, &self.arena)))
    }

    pub fn xpath_bool(&mut self, context: NodeId, query: &str) -> Result<bool> {
        Ok(self.evaluate(context, query)?.is_some_and(|v| xpath::to_bool(&v)))
    }

    pub fn xpath_double(&mut self, context: NodeId, query: &str) -> Result<f64> {
        Ok(self
            .evaluate(context, query)?
            .map_or(0.0, |v| xpath::to_double(&v, &self.arena)))
    }

    pub fn xpath_string(&mut self, context: NodeId, query: &str) -> Result<String> {
        Ok(self
            .evaluate(context, query)?
            .map(|v| xpath::to_string(&v, &self.arena))
            .unwrap_or_default())
    }

    pub fn xpath_node(&mut self, context: NodeId, query: &str) -> Result<Option<NodeId>> {
        Ok(self.evaluate(context, query)?.and_then(|v| xpath::to_node(&v)))
    }

    fn expect_type(&self, node: NodeId, expected: NodeType) -> Result<()> {
        let found = self.arena.node_type(node)?;
        if found != expected {
            return Err(Error::WrongNodeType { expected, found });
        }
        Ok(())
    }
}
