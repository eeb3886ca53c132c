//! XPath Axes Implementation
//!
//! Every axis returns nodes in axis order: reverse axes (ancestor,
//! preceding, preceding-sibling) walk away from the context node, which is
//! what positional predicates count along. The attribute axis is handled by
//! the evaluator since attributes are not nodes here, and the namespace
//! axis is always empty.

use super::compiler::CompiledNodeTest;
use super::parser::Axis;
use crate::dom::{DocumentAccess, NodeId, NodeType};

/// Navigate along an axis from a context node
pub fn navigate<D: DocumentAccess>(doc: &D, context: NodeId, axis: Axis) -> Vec<NodeId> {
    match axis {
        Axis::Child => doc.children_vec(context),
        Axis::Descendant => doc.descendants_vec(context),
        Axis::DescendantOrSelf => {
            let mut result = vec![context];
            result.extend(doc.descendants_vec(context));
            result
        }
        Axis::Parent => doc.parent_of(context).into_iter().collect(),
        Axis::Ancestor => ancestor_axis(doc, context),
        Axis::AncestorOrSelf => {
            let mut result = vec![context];
            result.extend(ancestor_axis(doc, context));
            result
        }
        Axis::FollowingSibling => siblings(doc, context, D::next_sibling_of),
        Axis::PrecedingSibling => siblings(doc, context, D::prev_sibling_of),
        Axis::Following => following_axis(doc, context),
        Axis::Preceding => preceding_axis(doc, context),
        Axis::Self_ => vec![context],
        Axis::Attribute | Axis::Namespace => Vec::new(),
    }
}

/// ancestor:: axis - parent, grandparent, up to the root
fn ancestor_axis<D: DocumentAccess>(doc: &D, context: NodeId) -> Vec<NodeId> {
    let mut result = Vec::new();
    let mut current = context;

    while let Some(parent) = doc.parent_of(current) {
        result.push(parent);
        current = parent;
    }

    result
}

fn siblings<D: DocumentAccess>(
    doc: &D,
    context: NodeId,
    step: fn(&D, NodeId) -> Option<NodeId>,
) -> Vec<NodeId> {
    let mut result = Vec::new();
    let mut sibling = step(doc, context);
    while let Some(id) = sibling {
        result.push(id);
        sibling = step(doc, id);
    }
    result
}

/// following:: axis - everything after the context node in document order,
/// descendants excluded
fn following_axis<D: DocumentAccess>(doc: &D, context: NodeId) -> Vec<NodeId> {
    let mut result = Vec::new();
    let mut current = Some(context);

    while let Some(node) = current {
        let mut sibling = doc.next_sibling_of(node);
        while let Some(id) = sibling {
            result.push(id);
            result.extend(doc.descendants_vec(id));
            sibling = doc.next_sibling_of(id);
        }
        current = doc.parent_of(node);
    }

    result
}

/// preceding:: axis - everything before the context node, ancestors
/// excluded, nearest first
fn preceding_axis<D: DocumentAccess>(doc: &D, context: NodeId) -> Vec<NodeId> {
    let mut result = Vec::new();
    let mut current = Some(context);

    while let Some(node) = current {
        let mut sibling = doc.prev_sibling_of(node);
        while let Some(id) = sibling {
            let mut subtree = vec![id];
            subtree.extend(doc.descendants_vec(id));
            result.extend(subtree.into_iter().rev());
            sibling = doc.prev_sibling_of(id);
        }
        current = doc.parent_of(node);
    }

    result
}

/// Target of a processing instruction stored as raw `?target data?` markup
pub fn pi_target(raw: &str) -> Option<&str> {
    let body = raw.strip_prefix('?')?;
    let end = body
        .find(|c: char| c.is_whitespace() || c == '?')
        .unwrap_or(body.len());
    Some(&body[..end])
}

/// Check if a node matches a node test
pub fn matches_node_test<D: DocumentAccess>(
    doc: &D,
    node_id: NodeId,
    node_test: &CompiledNodeTest,
) -> bool {
    let Some(kind) = doc.node_type_of(node_id) else {
        return false;
    };

    match node_test {
        // * matches any element
        CompiledNodeTest::Any => kind == NodeType::Element,
        CompiledNodeTest::Name(name) => doc.node_name(node_id) == Some(name.as_str()),
        CompiledNodeTest::Prefix(prefix) => doc
            .node_name(node_id)
            .and_then(|n| n.strip_prefix(prefix.as_str()))
            .is_some_and(|rest| rest.starts_with(':')),
        CompiledNodeTest::Node => true,
        CompiledNodeTest::Text => kind == NodeType::Text,
        CompiledNodeTest::Comment => kind == NodeType::Comment,
        CompiledNodeTest::ProcessingInstruction(target) => {
            if kind != NodeType::Unknown {
                return false;
            }
            match (doc.text_content(node_id).and_then(pi_target), target) {
                (Some(actual), Some(expected)) => actual == expected,
                (Some(_), None) => true,
                (None, _) => false,
            }
        }
    }
}
