//! XPath 1.0 Engine
//!
//! - All axes except namespace, evaluated over arena handles
//! - 27 core functions
//! - Compiled expression caching
//! - Typed extraction of results into script values

pub mod axes;
pub mod compiler;
pub mod eval;
pub mod functions;
pub mod lexer;
pub mod parser;
pub mod value;

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;

pub use compiler::CompiledExpr;
pub use eval::evaluate_at;
pub use value::XPathValue;

use crate::dom::{DocumentAccess, NodeId};

/// Compiles expressions once and keeps the most recently used ones
pub struct XPathEngine {
    cache: LruCache<String, Arc<CompiledExpr>>,
}

impl XPathEngine {
    pub fn new(capacity: NonZeroUsize) -> Self {
        XPathEngine {
            cache: LruCache::new(capacity),
        }
    }

    /// Compile `xpath`, or fetch it from the cache
    pub fn compile(&mut self, xpath: &str) -> Result<Arc<CompiledExpr>, String> {
        if let Some(compiled) = self.cache.get(xpath) {
            return Ok(Arc::clone(compiled));
        }
        let compiled = Arc::new(compiler::compile(xpath)?);
        self.cache.put(xpath.to_string(), Arc::clone(&compiled));
        Ok(compiled)
    }

    /// Evaluate `xpath` with `context` as the context node
    pub fn evaluate<D: DocumentAccess>(
        &mut self,
        doc: &D,
        context: NodeId,
        xpath: &str,
    ) -> Result<XPathValue, String> {
        let compiled = self.compile(xpath)?;
        evaluate_at(&compiled, doc, context)
    }

    /// Number of cached expressions
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

/// Integer result: numbers truncate toward zero and saturate, everything
/// else parses the leading integer of its string value, 0 if there is none.
pub fn to_int<D: DocumentAccess>(value: &XPathValue, doc: &D) -> i32 {
    match value {
        XPathValue::Number(n) => truncate(*n),
        XPathValue::Boolean(b) => i32::from(*b),
        other => leading_int(&other.resolve_string(doc)),
    }
}

/// boolean() of the result
pub fn to_bool(value: &XPathValue) -> bool {
    value.to_boolean()
}

/// number() of the result, with NaN reported as 0
pub fn to_double<D: DocumentAccess>(value: &XPathValue, doc: &D) -> f64 {
    let n = value.resolve_number(doc);
    if n.is_nan() {
        0.0
    } else {
        n
    }
}

/// string() of the result
pub fn to_string<D: DocumentAccess>(value: &XPathValue, doc: &D) -> String {
    value.resolve_string(doc)
}

/// First node of a node-set result in document order
pub fn to_node(value: &XPathValue) -> Option<NodeId> {
    value.as_nodeset().and_then(|nodes| nodes.first().copied())
}

fn truncate(n: f64) -> i32 {
    if n.is_nan() {
        0
    } else {
        // float-to-int casts saturate
        n.trunc() as i32
    }
}

/// atoi: optional whitespace and sign, then digits
fn leading_int(s: &str) -> i32 {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let magnitude = digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0i64, |acc, d| (acc * 10 + i64::from(d - b'0')).min(i64::from(i32::MAX) + 1));

    let value = if negative { -magnitude } else { magnitude };
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser::parse_into;
    use crate::dom::{NodeArena, XmlNode};
    use rstest::rstest;

    fn load(xml: &str) -> (NodeArena, NodeId) {
        let mut arena = NodeArena::new();
        let doc = arena.insert(XmlNode::document("q.xml")).unwrap();
        parse_into(&mut arena, doc, xml).unwrap();
        (arena, doc)
    }

    fn engine() -> XPathEngine {
        XPathEngine::new(NonZeroUsize::new(2).unwrap())
    }

    #[test]
    fn typed_extraction() {
        let (arena, doc) = load("<a><b>42</b><c>2.5</c><d>x</d></a>");
        let mut xpath = engine();
        let mut eval = |q: &str| xpath.evaluate(&arena, doc, q).unwrap();

        assert_eq!(to_int(&eval("/a/b"), &arena), 42);
        assert!(to_bool(&eval("/a/b")));
        assert!(!to_bool(&eval("/a/missing")));
        assert_eq!(to_double(&eval("/a/c"), &arena), 2.5);
        assert_eq!(to_double(&eval("/a/d"), &arena), 0.0);
        assert_eq!(to_string(&eval("/a/b"), &arena), "42");
        assert_eq!(to_string(&eval("count(/a/*)"), &arena), "3");
        assert_eq!(to_int(&eval("/a/c"), &arena), 2);
        assert_eq!(to_int(&eval("/a/c * 3"), &arena), 7);

        let b = to_node(&eval("/a/*")).unwrap();
        assert_eq!(arena.node_name(b), Some("b"));
        assert_eq!(to_node(&eval("1")), None);
    }

    #[rstest]
    #[case("123abc", 123)]
    #[case("  -7", -7)]
    #[case("+5", 5)]
    #[case("abc", 0)]
    #[case("", 0)]
    #[case("99999999999", i32::MAX)]
    #[case("-99999999999", i32::MIN)]
    fn leading_int_parses_like_atoi(#[case] input: &str, #[case] expected: i32) {
        assert_eq!(leading_int(input), expected);
    }

    #[test]
    fn truncation_saturates() {
        assert_eq!(truncate(-2.9), -2);
        assert_eq!(truncate(f64::NAN), 0);
        assert_eq!(truncate(1e12), i32::MAX);
    }

    #[test]
    fn cache_keeps_recent_expressions() {
        let mut xpath = engine();
        let first = xpath.compile("/a").unwrap();
        let again = xpath.compile("/a").unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        xpath.compile("/b").unwrap();
        xpath.compile("/c").unwrap();
        assert_eq!(xpath.cached(), 2);
        assert!(!Arc::ptr_eq(&first, &xpath.compile("/a").unwrap()));
        assert!(xpath.compile("/a[").is_err());
    }
}
