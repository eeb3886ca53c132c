//! Lowering to a stack program
//!
//! Each expression becomes a flat list of [`Op`]s run by the evaluator.
//! Predicates stay on the step they filter so positions are counted along
//! that step's axis, per context node. `[n]` and `[@a='v']` are decoded
//! up front and skip the general evaluator.

use super::parser::{Axis, BinaryOp, Expr, NodeTest, Step};

#[derive(Debug, Clone)]
pub struct CompiledExpr {
    pub ops: Vec<Op>,
}

#[derive(Debug, Clone)]
pub enum Op {
    /// Push the root of the context node's tree
    Root,
    Context,
    /// Replace the node set on top with the step applied to each member
    Step(CompiledStep),
    /// Filter the node set on top
    Filter(CompiledPredicate),
    Union,
    Number(f64),
    String(String),
    /// Function name and argument count; arguments are on the stack
    Call(String, usize),
    Binary(BinaryOp),
    Negate,
}

#[derive(Debug, Clone)]
pub struct CompiledStep {
    pub axis: Axis,
    pub test: CompiledNodeTest,
    pub predicates: Vec<CompiledPredicate>,
}

#[derive(Debug, Clone)]
pub enum CompiledPredicate {
    /// `[n]`, 1-based
    Position(usize),
    /// `[@name='value']` in either operand order
    AttrEq(String, String),
    Expr(CompiledExpr),
}

#[derive(Debug, Clone)]
pub enum CompiledNodeTest {
    Any,
    Name(String),
    Prefix(String),
    Node,
    Text,
    Comment,
    ProcessingInstruction(Option<String>),
}

impl From<&NodeTest> for CompiledNodeTest {
    fn from(test: &NodeTest) -> Self {
        match test {
            NodeTest::Any => CompiledNodeTest::Any,
            NodeTest::Name(name) => CompiledNodeTest::Name(name.clone()),
            NodeTest::Prefix(prefix) => CompiledNodeTest::Prefix(prefix.clone()),
            NodeTest::Node => CompiledNodeTest::Node,
            NodeTest::Text => CompiledNodeTest::Text,
            NodeTest::Comment => CompiledNodeTest::Comment,
            NodeTest::ProcessingInstruction(target) => {
                CompiledNodeTest::ProcessingInstruction(target.clone())
            }
        }
    }
}

impl CompiledExpr {
    pub fn compile(expr: &Expr) -> Self {
        let mut ops = Vec::new();
        lower(expr, &mut ops);
        CompiledExpr { ops }
    }
}

fn lower(expr: &Expr, ops: &mut Vec<Op>) {
    let op = match expr {
        Expr::Root => Op::Root,
        Expr::Context => Op::Context,
        Expr::Number(n) => Op::Number(*n),
        Expr::String(s) => Op::String(s.clone()),
        Expr::Negate(inner) => {
            lower(inner, ops);
            Op::Negate
        }
        Expr::Binary(left, op, right) => {
            lower(left, ops);
            lower(right, ops);
            Op::Binary(*op)
        }
        Expr::Union(left, right) => {
            lower(left, ops);
            lower(right, ops);
            Op::Union
        }
        Expr::Path(base, step) => {
            lower(base, ops);
            Op::Step(lower_step(step))
        }
        Expr::Step(step) => {
            ops.push(Op::Context);
            Op::Step(lower_step(step))
        }
        Expr::Filter(base, predicate) => {
            lower(base, ops);
            Op::Filter(lower_predicate(predicate))
        }
        Expr::Function(name, args) => {
            args.iter().for_each(|arg| lower(arg, ops));
            Op::Call(name.clone(), args.len())
        }
    };
    ops.push(op);
}

fn lower_step(step: &Step) -> CompiledStep {
    CompiledStep {
        axis: step.axis,
        test: CompiledNodeTest::from(&step.node_test),
        predicates: step.predicates.iter().map(lower_predicate).collect(),
    }
}

fn lower_predicate(predicate: &Expr) -> CompiledPredicate {
    match predicate {
        Expr::Number(n) if *n >= 1.0 && n.fract() == 0.0 => CompiledPredicate::Position(*n as usize),
        Expr::Binary(left, BinaryOp::Eq, right) => attribute_equals(left, right)
            .or_else(|| attribute_equals(right, left))
            .unwrap_or_else(|| CompiledPredicate::Expr(CompiledExpr::compile(predicate))),
        _ => CompiledPredicate::Expr(CompiledExpr::compile(predicate)),
    }
}

/// `@name = 'literal'`, where `@name` has no predicates of its own
fn attribute_equals(attribute: &Expr, literal: &Expr) -> Option<CompiledPredicate> {
    let (Expr::Step(step), Expr::String(value)) = (attribute, literal) else {
        return None;
    };
    match &step.node_test {
        NodeTest::Name(name) if step.axis == Axis::Attribute && step.predicates.is_empty() => {
            Some(CompiledPredicate::AttrEq(name.clone(), value.clone()))
        }
        _ => None,
    }
}

pub fn compile(xpath: &str) -> Result<CompiledExpr, String> {
    Ok(CompiledExpr::compile(&super::parser::parse(xpath)?))
}
