//! Node arena and handle registry
//!
//! Every node of every document lives in one arena of slots. A slot keeps a
//! generation counter that is bumped each time its node is freed, so a
//! [`NodeId`] issued before the free no longer matches and is rejected
//! instead of reaching whatever node reuses the slot.
//!
//! Freed slots are recycled oldest-first to keep reuse of any single slot
//! (and therefore generation wrap-around) as rare as possible.

use std::collections::VecDeque;

use super::node::{NodeId, XmlNode, GENERATION_MASK, MAX_NODES};
use crate::error::{Error, Result};

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<XmlNode>,
}

#[derive(Debug, Default)]
pub struct NodeArena {
    slots: Vec<Slot>,
    free: VecDeque<usize>,
    live: usize,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Store a node and issue its handle. The node is not linked anywhere.
    pub fn insert(&mut self, node: XmlNode) -> Result<NodeId> {
        let index = match self.free.pop_front() {
            Some(index) => index,
            None => {
                if self.slots.len() >= MAX_NODES {
                    return Err(Error::ArenaFull(self.live));
                }
                self.slots.push(Slot {
                    generation: 0,
                    node: None,
                });
                self.slots.len() - 1
            }
        };
        let slot = &mut self.slots[index];
        slot.node = Some(node);
        self.live += 1;
        Ok(NodeId::new(index, slot.generation))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: NodeId) -> Option<&XmlNode> {
        let slot = self.slots.get(id.index())?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.node.as_ref()
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut XmlNode> {
        let slot = self.slots.get_mut(id.index())?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.node.as_mut()
    }

    /// Like [`get`](Self::get) but reports a stale handle as an error.
    pub fn node(&self, id: NodeId) -> Result<&XmlNode> {
        self.get(id).ok_or(Error::InvalidHandle(id.into_raw()))
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut XmlNode> {
        self.get_mut(id).ok_or(Error::InvalidHandle(id.into_raw()))
    }

    /// Link an unattached node as the last child of `parent`.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        let parent_type = self.node(parent)?.node_type();
        if !parent_type.is_container() {
            return Err(Error::CannotHaveChildren(parent_type));
        }
        if self.node(child)?.parent.is_some() {
            self.detach(child)?;
        }

        let prev_last = self.node(parent)?.last_child;
        {
            let node = self.node_mut(child)?;
            node.parent = Some(parent);
            node.prev_sibling = prev_last;
            node.next_sibling = None;
        }
        if let Some(last) = prev_last {
            self.node_mut(last)?.next_sibling = Some(child);
        }
        let parent_node = self.node_mut(parent)?;
        if parent_node.first_child.is_none() {
            parent_node.first_child = Some(child);
        }
        parent_node.last_child = Some(child);
        Ok(())
    }

    /// Unlink a node from its parent and siblings. Its subtree stays intact
    /// and every handle into it stays valid.
    pub fn detach(&mut self, id: NodeId) -> Result<()> {
        let (parent, prev, next) = {
            let node = self.node(id)?;
            (node.parent, node.prev_sibling, node.next_sibling)
        };

        if let Some(prev) = prev {
            self.node_mut(prev)?.next_sibling = next;
        }
        if let Some(next) = next {
            self.node_mut(next)?.prev_sibling = prev;
        }
        if let Some(parent) = parent {
            let parent_node = self.node_mut(parent)?;
            if parent_node.first_child == Some(id) {
                parent_node.first_child = next;
            }
            if parent_node.last_child == Some(id) {
                parent_node.last_child = prev;
            }
        }

        let node = self.node_mut(id)?;
        node.parent = None;
        node.prev_sibling = None;
        node.next_sibling = None;
        Ok(())
    }

    /// Detach a node and free it together with all of its descendants.
    /// Returns the number of freed nodes.
    pub fn remove_subtree(&mut self, id: NodeId) -> Result<usize> {
        self.detach(id)?;

        let mut freed = 0;
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.take(current) else {
                continue;
            };
            let mut child = node.first_child;
            while let Some(c) = child {
                child = self.get(c).and_then(|n| n.next_sibling);
                stack.push(c);
            }
            freed += 1;
        }
        Ok(freed)
    }

    fn take(&mut self, id: NodeId) -> Option<XmlNode> {
        let slot = self.slots.get_mut(id.index())?;
        if slot.generation != id.generation() {
            return None;
        }
        let node = slot.node.take()?;
        slot.generation = (slot.generation + 1) & GENERATION_MASK;
        self.free.push_back(id.index());
        self.live -= 1;
        Some(node)
    }

    /// Children of a node in document order. Empty for stale handles.
    pub fn children(&self, id: NodeId) -> Children<'_> {
        Children {
            arena: self,
            next: self.get(id).and_then(|n| n.first_child),
        }
    }

    /// All descendants of a node in document order (pre-order).
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).collect();
        stack.reverse();
        while let Some(current) = stack.pop() {
            result.push(current);
            let start = stack.len();
            stack.extend(self.children(current));
            stack[start..].reverse();
        }
        result
    }

    /// Topmost ancestor of a node: its document, or the root of a detached subtree.
    pub fn root_of(&self, id: NodeId) -> NodeId {
        let mut current = id;
        while let Some(parent) = self.get(current).and_then(|n| n.parent) {
            current = parent;
        }
        current
    }
}

pub struct Children<'a> {
    arena: &'a NodeArena,
    next: Option<NodeId>,
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.arena.get(current).and_then(|n| n.next_sibling);
        Some(current)
    }
}
