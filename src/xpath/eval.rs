//! XPath Evaluation Engine
//!
//! Evaluates compiled XPath expressions against any [`DocumentAccess`]
//! implementation. Handles carry no order, so node sets are sorted against
//! a preorder index of the context node's tree, built on first use.
//!
//! Attributes are values carrying their owner element. From an attribute,
//! `parent` and `ancestor` lead back into the tree, `self::node()` keeps
//! it, and the downward and sibling axes are empty.

use super::axes::{matches_node_test, navigate};
use super::compiler::{CompiledExpr, CompiledNodeTest, CompiledPredicate, CompiledStep, Op};
use super::functions;
use super::parser::{Axis, BinaryOp};
use super::value::{string_to_number, Attr, XPathValue};
use crate::dom::{node_string_value, DocumentAccess, NodeId};
use std::cell::OnceCell;
use std::collections::{HashMap, HashSet};

/// Document order of the tree an evaluation runs in
pub struct DocumentOrder {
    root: NodeId,
    positions: OnceCell<HashMap<NodeId, usize>>,
}

impl DocumentOrder {
    pub fn new(root: NodeId) -> Self {
        DocumentOrder {
            root,
            positions: OnceCell::new(),
        }
    }

    fn positions<D: DocumentAccess>(&self, doc: &D) -> &HashMap<NodeId, usize> {
        self.positions.get_or_init(|| {
            std::iter::once(self.root)
                .chain(doc.descendants_vec(self.root))
                .enumerate()
                .map(|(i, id)| (id, i))
                .collect()
        })
    }

    /// Sort nodes into document order. Nodes outside the tree go last.
    pub fn sort<D: DocumentAccess>(&self, doc: &D, nodes: &mut [NodeId]) {
        if nodes.len() < 2 {
            return;
        }
        let positions = self.positions(doc);
        nodes.sort_by_key(|id| positions.get(id).copied().unwrap_or(usize::MAX));
    }

    /// Stable sort by owner, keeping each element's attributes in source order
    fn sort_attributes<D: DocumentAccess>(&self, doc: &D, attrs: &mut [Attr]) {
        if attrs.len() < 2 {
            return;
        }
        let positions = self.positions(doc);
        attrs.sort_by_key(|attr| positions.get(&attr.owner).copied().unwrap_or(usize::MAX));
    }
}

/// Evaluation context - generic over document type
pub struct EvalContext<'a, D: DocumentAccess> {
    pub doc: &'a D,
    pub order: &'a DocumentOrder,
    pub context_node: NodeId,
    /// Set inside predicates on attributes; `context_node` is then the owner
    pub context_attribute: Option<&'a Attr>,
    pub context_position: usize,
    pub context_size: usize,
}

impl<'a, D: DocumentAccess> EvalContext<'a, D> {
    pub fn new(doc: &'a D, order: &'a DocumentOrder, context_node: NodeId) -> Self {
        EvalContext {
            doc,
            order,
            context_node,
            context_attribute: None,
            context_position: 1,
            context_size: 1,
        }
    }

    fn at(&self, node: NodeId, position: usize, size: usize) -> Self {
        EvalContext {
            doc: self.doc,
            order: self.order,
            context_node: node,
            context_attribute: None,
            context_position: position,
            context_size: size,
        }
    }

    fn on_attribute<'b>(&'b self, attr: &'b Attr, position: usize, size: usize) -> EvalContext<'b, D> {
        EvalContext {
            doc: self.doc,
            order: self.order,
            context_node: attr.owner,
            context_attribute: Some(attr),
            context_position: position,
            context_size: size,
        }
    }
}

/// Evaluate a compiled expression with `context_node` as the context
pub fn evaluate_at<D: DocumentAccess>(
    expr: &CompiledExpr,
    doc: &D,
    context_node: NodeId,
) -> Result<XPathValue, String> {
    let order = DocumentOrder::new(doc.root_of(context_node));
    evaluate_compiled(expr, &EvalContext::new(doc, &order, context_node))
}

/// Evaluate a compiled expression
pub fn evaluate_compiled<D: DocumentAccess>(
    expr: &CompiledExpr,
    ctx: &EvalContext<'_, D>,
) -> Result<XPathValue, String> {
    let mut stack: Vec<XPathValue> = Vec::new();

    for op in &expr.ops {
        match op {
            Op::Root => {
                stack.push(XPathValue::single_node(ctx.doc.root_of(ctx.context_node)));
            }

            Op::Context => stack.push(match ctx.context_attribute {
                Some(attr) => XPathValue::Attributes(vec![attr.clone()]),
                None => XPathValue::single_node(ctx.context_node),
            }),

            Op::Step(step) => {
                let input = stack
                    .pop()
                    .unwrap_or_else(|| XPathValue::single_node(ctx.context_node));
                let result = match input {
                    XPathValue::NodeSet(nodes) => apply_step(step, &nodes, ctx)?,
                    XPathValue::Attributes(attrs) => step_from_attributes(step, &attrs, ctx)?,
                    _ => {
                        return Err("Location step applied to a value that is not a node-set".to_string())
                    }
                };
                stack.push(result);
            }

            Op::Filter(predicate) => {
                let filtered = match stack.pop().unwrap_or_default() {
                    XPathValue::NodeSet(nodes) => XPathValue::NodeSet(apply_predicate(predicate, nodes, ctx)?),
                    XPathValue::Attributes(attrs) => {
                        XPathValue::Attributes(filter_attributes(predicate, attrs, ctx)?)
                    }
                    _ => return Err("Predicate applied to a value that is not a node-set".to_string()),
                };
                stack.push(filtered);
            }

            Op::Union => {
                let right = stack.pop().unwrap_or_default();
                let left = stack.pop().unwrap_or_default();
                stack.push(union(left, right, ctx)?);
            }

            Op::Number(n) => stack.push(XPathValue::Number(*n)),

            Op::String(s) => stack.push(XPathValue::String(s.clone())),

            Op::Call(name, arg_count) => {
                let split = stack
                    .len()
                    .checked_sub(*arg_count)
                    .ok_or_else(|| format!("Stack underflow calling {}()", name))?;
                let args = stack.split_off(split);
                stack.push(functions::call(name, args, ctx)?);
            }

            Op::Binary(op) => {
                let right = stack.pop().unwrap_or_default();
                let left = stack.pop().unwrap_or_default();
                stack.push(binary(*op, &left, &right, ctx.doc));
            }

            Op::Negate => {
                let value = stack.pop().unwrap_or_default();
                stack.push(XPathValue::Number(-value.resolve_number(ctx.doc)));
            }
        }
    }

    Ok(stack.pop().unwrap_or_default())
}

/// Run one location step from every node of the input set
fn apply_step<D: DocumentAccess>(
    step: &CompiledStep,
    nodes: &[NodeId],
    ctx: &EvalContext<'_, D>,
) -> Result<XPathValue, String> {
    if step.axis == Axis::Attribute {
        let mut selected = Vec::new();
        for &node in nodes {
            let mut attrs = attributes_of(ctx.doc, node, &step.test);
            for predicate in &step.predicates {
                attrs = filter_attributes(predicate, attrs, ctx)?;
            }
            selected.extend(attrs);
        }
        return Ok(XPathValue::Attributes(selected));
    }

    let mut seen = HashSet::with_capacity(nodes.len());
    let mut result = Vec::with_capacity(nodes.len());

    for &node in nodes {
        let mut candidates: Vec<NodeId> = navigate(ctx.doc, node, step.axis)
            .into_iter()
            .filter(|&candidate| matches_node_test(ctx.doc, candidate, &step.test))
            .collect();

        // Positions count along the axis from this context node
        for predicate in &step.predicates {
            candidates = apply_predicate(predicate, candidates, ctx)?;
        }

        result.extend(candidates.into_iter().filter(|&c| seen.insert(c)));
    }

    ctx.order.sort(ctx.doc, &mut result);
    Ok(XPathValue::NodeSet(result))
}

/// Attributes of `node` passing the node test of an attribute step
fn attributes_of<D: DocumentAccess>(doc: &D, node: NodeId, test: &CompiledNodeTest) -> Vec<Attr> {
    doc.attribute_pairs(node)
        .into_iter()
        .filter(|&(name, _)| match test {
            CompiledNodeTest::Name(wanted) => name == wanted.as_str(),
            CompiledNodeTest::Any | CompiledNodeTest::Node => true,
            CompiledNodeTest::Prefix(prefix) => name
                .strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.starts_with(':')),
            _ => false,
        })
        .map(|(name, value)| Attr::new(node, name, value))
        .collect()
}

/// A location step whose input is a set of attributes
fn step_from_attributes<D: DocumentAccess>(
    step: &CompiledStep,
    attrs: &[Attr],
    ctx: &EvalContext<'_, D>,
) -> Result<XPathValue, String> {
    match step.axis {
        Axis::Self_ | Axis::DescendantOrSelf => {
            if !matches!(step.test, CompiledNodeTest::Node) {
                return Ok(XPathValue::default());
            }
            let mut kept = Vec::new();
            for attr in attrs {
                let mut current = vec![attr.clone()];
                for predicate in &step.predicates {
                    current = filter_attributes(predicate, current, ctx)?;
                }
                kept.extend(current);
            }
            Ok(XPathValue::Attributes(kept))
        }
        Axis::Parent | Axis::Ancestor => {
            let mut seen = HashSet::new();
            let mut result = Vec::new();
            for attr in attrs {
                let mut candidates = vec![attr.owner];
                if step.axis == Axis::Ancestor {
                    candidates.extend(navigate(ctx.doc, attr.owner, Axis::Ancestor));
                }
                candidates.retain(|&node| matches_node_test(ctx.doc, node, &step.test));
                for predicate in &step.predicates {
                    candidates = apply_predicate(predicate, candidates, ctx)?;
                }
                result.extend(candidates.into_iter().filter(|&c| seen.insert(c)));
            }
            ctx.order.sort(ctx.doc, &mut result);
            Ok(XPathValue::NodeSet(result))
        }
        Axis::AncestorOrSelf | Axis::Following | Axis::Preceding => {
            Err(format!("{:?} axis from an attribute is not supported", step.axis))
        }
        Axis::Child
        | Axis::Descendant
        | Axis::Attribute
        | Axis::Namespace
        | Axis::FollowingSibling
        | Axis::PrecedingSibling => Ok(XPathValue::default()),
    }
}

/// `[n]` keeps the n-th item, anything else keeps items whose predicate is
/// true; a number result compares against the position.
fn predicate_holds(result: XPathValue, position: usize) -> bool {
    match result {
        XPathValue::Number(n) => position as f64 == n,
        other => other.to_boolean(),
    }
}

fn filter_attributes<D: DocumentAccess>(
    predicate: &CompiledPredicate,
    attrs: Vec<Attr>,
    ctx: &EvalContext<'_, D>,
) -> Result<Vec<Attr>, String> {
    match predicate {
        CompiledPredicate::Position(position) => Ok(attrs.into_iter().nth(position - 1).into_iter().collect()),
        // attributes carry no attributes of their own
        CompiledPredicate::AttrEq(..) => Ok(Vec::new()),
        CompiledPredicate::Expr(expr) => {
            let size = attrs.len();
            let mut kept = Vec::new();
            for (i, attr) in attrs.into_iter().enumerate() {
                let result = evaluate_compiled(expr, &ctx.on_attribute(&attr, i + 1, size))?;
                if predicate_holds(result, i + 1) {
                    kept.push(attr);
                }
            }
            Ok(kept)
        }
    }
}

fn apply_predicate<D: DocumentAccess>(
    predicate: &CompiledPredicate,
    nodes: Vec<NodeId>,
    ctx: &EvalContext<'_, D>,
) -> Result<Vec<NodeId>, String> {
    match predicate {
        CompiledPredicate::Position(position) => {
            Ok(nodes.get(position - 1).copied().into_iter().collect())
        }

        // Fast path: [@attr = 'value'] - direct attribute lookup
        CompiledPredicate::AttrEq(name, value) => Ok(nodes
            .into_iter()
            .filter(|&node| ctx.doc.get_attribute(node, name) == Some(value.as_str()))
            .collect()),

        CompiledPredicate::Expr(expr) => {
            let size = nodes.len();
            let mut filtered = Vec::new();
            for (i, node) in nodes.into_iter().enumerate() {
                let result = evaluate_compiled(expr, &ctx.at(node, i + 1, size))?;
                if predicate_holds(result, i + 1) {
                    filtered.push(node);
                }
            }
            Ok(filtered)
        }
    }
}

fn union<D: DocumentAccess>(
    left: XPathValue,
    right: XPathValue,
    ctx: &EvalContext<'_, D>,
) -> Result<XPathValue, String> {
    match (left, right) {
        (XPathValue::NodeSet(mut left), XPathValue::NodeSet(right)) => {
            let mut seen: HashSet<NodeId> = left.iter().copied().collect();
            left.extend(right.into_iter().filter(|&id| seen.insert(id)));
            ctx.order.sort(ctx.doc, &mut left);
            Ok(XPathValue::NodeSet(left))
        }
        (XPathValue::Attributes(mut left), XPathValue::Attributes(right)) => {
            for attr in right {
                if !left.iter().any(|a| a.owner == attr.owner && a.name == attr.name) {
                    left.push(attr);
                }
            }
            ctx.order.sort_attributes(ctx.doc, &mut left);
            Ok(XPathValue::Attributes(left))
        }
        _ => Err("Union operands must be node-sets".to_string()),
    }
}

fn binary<D: DocumentAccess>(op: BinaryOp, left: &XPathValue, right: &XPathValue, doc: &D) -> XPathValue {
    match op {
        BinaryOp::Or => XPathValue::Boolean(left.to_boolean() || right.to_boolean()),
        BinaryOp::And => XPathValue::Boolean(left.to_boolean() && right.to_boolean()),
        BinaryOp::Eq
        | BinaryOp::NotEq
        | BinaryOp::Lt
        | BinaryOp::LtEq
        | BinaryOp::Gt
        | BinaryOp::GtEq => XPathValue::Boolean(compare(doc, left, right, op)),
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            let l = left.resolve_number(doc);
            let r = right.resolve_number(doc);
            XPathValue::Number(match op {
                BinaryOp::Add => l + r,
                BinaryOp::Sub => l - r,
                BinaryOp::Mul => l * r,
                BinaryOp::Div => l / r,
                _ => l % r,
            })
        }
    }
}

/// String values of a node set or attribute list, None for scalars
fn member_strings<D: DocumentAccess>(doc: &D, value: &XPathValue) -> Option<Vec<String>> {
    match value {
        XPathValue::NodeSet(nodes) => Some(nodes.iter().map(|&id| node_string_value(doc, id)).collect()),
        XPathValue::Attributes(attrs) => Some(attrs.iter().map(|a| a.value.clone()).collect()),
        _ => None,
    }
}

/// Comparison with the XPath 1.0 conversion rules: sets compare
/// existentially, otherwise boolean beats number beats string for
/// equality and relational operators always compare numbers.
fn compare<D: DocumentAccess>(doc: &D, left: &XPathValue, right: &XPathValue, op: BinaryOp) -> bool {
    match (member_strings(doc, left), member_strings(doc, right)) {
        (Some(l), Some(r)) => l.iter().any(|a| r.iter().any(|b| compare_strings(a, b, op))),
        (Some(set), None) => compare_set(&set, right, op, false),
        (None, Some(set)) => compare_set(&set, left, op, true),
        (None, None) => compare_scalars(left, right, op),
    }
}

/// `flipped` when the set was the right operand
fn compare_set(set: &[String], scalar: &XPathValue, op: BinaryOp, flipped: bool) -> bool {
    match scalar {
        XPathValue::Boolean(b) => {
            let present = !set.is_empty();
            let (l, r) = if flipped { (*b, present) } else { (present, *b) };
            compare_booleans(l, r, op)
        }
        XPathValue::Number(n) => set.iter().any(|s| {
            let v = string_to_number(s);
            let (l, r) = if flipped { (*n, v) } else { (v, *n) };
            compare_numbers(l, r, op)
        }),
        _ => {
            let other = scalar.to_string_value();
            set.iter().any(|s| {
                let (l, r) = if flipped {
                    (other.as_str(), s.as_str())
                } else {
                    (s.as_str(), other.as_str())
                };
                compare_strings(l, r, op)
            })
        }
    }
}

fn compare_scalars(left: &XPathValue, right: &XPathValue, op: BinaryOp) -> bool {
    let is_bool = |v: &XPathValue| matches!(v, XPathValue::Boolean(_));
    let is_number = |v: &XPathValue| matches!(v, XPathValue::Number(_));

    if !matches!(op, BinaryOp::Eq | BinaryOp::NotEq) {
        compare_numbers(left.to_number(), right.to_number(), op)
    } else if is_bool(left) || is_bool(right) {
        compare_booleans(left.to_boolean(), right.to_boolean(), op)
    } else if is_number(left) || is_number(right) {
        compare_numbers(left.to_number(), right.to_number(), op)
    } else {
        compare_strings(&left.to_string_value(), &right.to_string_value(), op)
    }
}

fn compare_strings(a: &str, b: &str, op: BinaryOp) -> bool {
    match op {
        BinaryOp::Eq => a == b,
        BinaryOp::NotEq => a != b,
        _ => compare_numbers(string_to_number(a), string_to_number(b), op),
    }
}

fn compare_booleans(a: bool, b: bool, op: BinaryOp) -> bool {
    match op {
        BinaryOp::Eq => a == b,
        BinaryOp::NotEq => a != b,
        _ => compare_numbers(f64::from(u8::from(a)), f64::from(u8::from(b)), op),
    }
}

fn compare_numbers(a: f64, b: f64, op: BinaryOp) -> bool {
    match op {
        BinaryOp::Eq => a == b,
        BinaryOp::NotEq => a != b,
        BinaryOp::Lt => a < b,
        BinaryOp::LtEq => a <= b,
        BinaryOp::Gt => a > b,
        BinaryOp::GtEq => a >= b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser::parse_into;
    use crate::dom::{Declaration, NodeArena};
    use crate::xpath::compiler::compile;

    fn load(xml: &str) -> (NodeArena, NodeId) {
        let mut arena = NodeArena::new();
        let doc = arena.create_document("mem.xml", Declaration::default()).unwrap();
        parse_into(&mut arena, doc, xml).unwrap();
        (arena, doc)
    }

    fn evaluate_from_node(arena: &NodeArena, context: NodeId, xpath: &str) -> Result<XPathValue, String> {
        evaluate_at(&compile(xpath)?, arena, context)
    }

    fn names(arena: &NodeArena, value: &XPathValue) -> Vec<String> {
        value
            .as_nodeset()
            .unwrap()
            .iter()
            .map(|&id| arena.node_name(id).unwrap_or("#").to_string())
            .collect()
    }

    fn values(value: &XPathValue) -> Vec<String> {
        match value {
            XPathValue::Attributes(attrs) => attrs.iter().map(|a| a.value.clone()).collect(),
            other => panic!("not attributes: {other:?}"),
        }
    }

    const LIST: &str = "<list><a id='1'><x/><x/></a><b id='2'><x/></b><a id='3'>7</a></list>";

    #[test]
    fn test_simple_path() {
        let (arena, doc) = load("<root><item/><item/></root>");
        let result = evaluate_from_node(&arena, doc, "/root/item").unwrap();
        assert_eq!(result.as_nodeset().unwrap().len(), 2);
    }

    #[test]
    fn test_descendant() {
        let (arena, doc) = load("<root><a><item/></a><item/></root>");
        let result = evaluate_from_node(&arena, doc, "//item").unwrap();
        assert_eq!(result.as_nodeset().unwrap().len(), 2);
    }

    #[test]
    fn test_predicates_are_per_step() {
        let (arena, doc) = load(LIST);
        let firsts = evaluate_from_node(&arena, doc, "/list/*/x[1]").unwrap();
        assert_eq!(firsts.as_nodeset().unwrap().len(), 2);
        let global = evaluate_from_node(&arena, doc, "(/list/*/x)[1]").unwrap();
        assert_eq!(global.as_nodeset().unwrap().len(), 1);
    }

    #[test]
    fn test_reverse_axis_position() {
        let (arena, doc) = load(LIST);
        let result = evaluate_from_node(&arena, doc, "/list/a[2]/preceding-sibling::*[1]").unwrap();
        assert_eq!(names(&arena, &result), vec!["b"]);
    }

    #[test]
    fn test_union_is_document_ordered() {
        let (arena, doc) = load(LIST);
        let result = evaluate_from_node(&arena, doc, "/list/b | /list/a").unwrap();
        assert_eq!(names(&arena, &result), vec!["a", "b", "a"]);
    }

    #[test]
    fn test_attribute_predicates_and_values() {
        let (arena, doc) = load(LIST);
        let result = evaluate_from_node(&arena, doc, "/list/a[@id='3']").unwrap();
        assert_eq!(result.as_nodeset().unwrap().len(), 1);
        let ids = evaluate_from_node(&arena, doc, "/list/*/@id").unwrap();
        assert_eq!(values(&ids), vec!["1", "2", "3"]);
        let sum = evaluate_from_node(&arena, doc, "sum(//@id) + 1").unwrap();
        assert_eq!(sum.to_number(), 7.0);
    }

    #[test]
    fn test_comparisons() {
        let (arena, doc) = load(LIST);
        let check = |xpath: &str| evaluate_from_node(&arena, doc, xpath).unwrap().to_boolean();
        assert!(check("/list/a = 7"));
        assert!(check("7 = /list/a"));
        assert!(check("/list/a/@id > 2"));
        assert!(!check("/list/a/@id > 3"));
        assert!(check("/list/missing != 'x' or true()"));
        assert!(!check("/list/missing = ''"));
        assert!(check("'2' = 2.0"));
        assert!(check("1 < '2'"));
    }

    #[test]
    fn test_relative_to_context_node() {
        let (arena, doc) = load(LIST);
        let b = evaluate_from_node(&arena, doc, "/list/b").unwrap().as_nodeset().unwrap()[0];
        assert_eq!(evaluate_from_node(&arena, b, "count(x)").unwrap().to_number(), 1.0);
        assert_eq!(evaluate_from_node(&arena, b, "count(/list/*)").unwrap().to_number(), 3.0);
        let parent = evaluate_from_node(&arena, b, "..").unwrap();
        assert_eq!(names(&arena, &parent), vec!["list"]);
        assert_eq!(evaluate_from_node(&arena, b, "string(.)").unwrap().to_string_value(), "");
    }

    #[test]
    fn test_arithmetic_on_node_sets() {
        let (arena, doc) = load("<r><v>4</v><w>2.5</w></r>");
        let result = evaluate_from_node(&arena, doc, "/r/v * /r/w - -1").unwrap();
        assert_eq!(result.to_number(), 11.0);
        let result = evaluate_from_node(&arena, doc, "/r/v mod 3").unwrap();
        assert_eq!(result.to_number(), 1.0);
    }

    #[test]
    fn test_errors() {
        let (arena, doc) = load(LIST);
        assert!(evaluate_from_node(&arena, doc, "unknown()").is_err());
        assert!(evaluate_from_node(&arena, doc, "'a' | /list").is_err());
        assert!(evaluate_from_node(&arena, doc, "//@id/following::*").is_err());
    }

    #[test]
    fn attributes_keep_their_owner() {
        let (arena, doc) = load(LIST);
        let eval = |xpath: &str| evaluate_from_node(&arena, doc, xpath).unwrap();

        assert_eq!(values(&eval("//a/@id[. = '3']")), vec!["3"]);
        assert_eq!(values(&eval("(//@id)[2]")), vec!["2"]);
        assert_eq!(values(&eval("//@id[. > 1][last()]")), vec!["2", "3"]);
        assert_eq!(eval("name(//@id/..)").to_string_value(), "a");
        assert_eq!(eval("name(//b/@*)").to_string_value(), "id");
        assert_eq!(names(&arena, &eval("//@id[. = 2]/ancestor::*")), vec!["list", "b"]);
        assert_eq!(eval("count(//@id/../x)").to_number(), 3.0);
        assert_eq!(eval("count(//@id/x)").to_number(), 0.0);
        assert_eq!(values(&eval("//@id/self::node()[string-length() = 1]")).len(), 3);
        assert_eq!(values(&eval("//b/@id | //a/@id")), vec!["1", "2", "3"]);
    }
}
