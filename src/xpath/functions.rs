//! XPath 1.0 core function library
//!
//! Everything except `id()`, which needs DTD attribute types these
//! documents never carry. Arguments arrive evaluated; node-set arguments
//! convert through the string-value of their first node.

use std::ops::RangeInclusive;

use super::axes::pi_target;
use super::eval::EvalContext;
use super::value::{string_to_number, Attr, XPathValue};
use crate::dom::{node_string_value, DocumentAccess, NodeId, NodeType};

pub fn call<D: DocumentAccess>(
    name: &str,
    args: Vec<XPathValue>,
    ctx: &EvalContext<'_, D>,
) -> Result<XPathValue, String> {
    let doc = ctx.doc;
    let context = ctx.context_node;
    let string = |i: usize| args[i].resolve_string(doc);
    let number = |i: usize| args[i].resolve_number(doc);
    let context_string = || match ctx.context_attribute {
        Some(attr) => attr.value.clone(),
        None => node_string_value(doc, context),
    };
    // the argument, or the context's string-value when omitted
    let string_or_context = || match args.first() {
        Some(arg) => arg.resolve_string(doc),
        None => context_string(),
    };
    let expect = |arity: RangeInclusive<usize>| check_arity(name, &args, arity);

    let value = match name {
        "last" => {
            expect(0..=0)?;
            XPathValue::Number(ctx.context_size as f64)
        }
        "position" => {
            expect(0..=0)?;
            XPathValue::Number(ctx.context_position as f64)
        }
        "count" => {
            expect(1..=1)?;
            let count = match &args[0] {
                XPathValue::NodeSet(nodes) => nodes.len(),
                XPathValue::Attributes(attrs) => attrs.len(),
                _ => return Err("count() expects a node-set".to_string()),
            };
            XPathValue::Number(count as f64)
        }
        "name" | "local-name" | "namespace-uri" => {
            expect(0..=1)?;
            let target = match args.first() {
                None => Some(ctx.context_attribute.map_or(Named::Node(context), Named::Attribute)),
                Some(XPathValue::NodeSet(nodes)) => nodes.first().map(|&node| Named::Node(node)),
                Some(XPathValue::Attributes(attrs)) => attrs.first().map(Named::Attribute),
                Some(_) => return Err(format!("{name}() expects a node-set")),
            };
            let result = target.map_or_else(String::new, |target| {
                let qname = match target {
                    Named::Node(node) => qualified_name(doc, node),
                    Named::Attribute(attr) => attr.name.as_str(),
                };
                match name {
                    "name" => qname.to_string(),
                    "local-name" => local_part(qname).to_string(),
                    _ => match target {
                        Named::Node(node) => namespace_uri(doc, node),
                        Named::Attribute(attr) => attribute_namespace_uri(doc, attr),
                    },
                }
            });
            XPathValue::String(result)
        }
        "id" => return Err("id() is not supported: documents carry no DTD".to_string()),

        "string" => {
            expect(0..=1)?;
            XPathValue::String(string_or_context())
        }
        "concat" => {
            expect(2..=usize::MAX)?;
            XPathValue::String(args.iter().map(|arg| arg.resolve_string(doc)).collect())
        }
        "starts-with" => {
            expect(2..=2)?;
            XPathValue::Boolean(string(0).starts_with(&string(1)))
        }
        "contains" => {
            expect(2..=2)?;
            XPathValue::Boolean(string(0).contains(&string(1)))
        }
        "substring-before" => {
            expect(2..=2)?;
            let (s, pattern) = (string(0), string(1));
            XPathValue::String(s.find(&pattern).map_or_else(String::new, |at| s[..at].to_string()))
        }
        "substring-after" => {
            expect(2..=2)?;
            let (s, pattern) = (string(0), string(1));
            XPathValue::String(
                s.find(&pattern)
                    .map_or_else(String::new, |at| s[at + pattern.len()..].to_string()),
            )
        }
        "substring" => {
            expect(2..=3)?;
            let length = (args.len() == 3).then(|| number(2));
            XPathValue::String(substring(&string(0), number(1), length))
        }
        "string-length" => {
            expect(0..=1)?;
            XPathValue::Number(string_or_context().chars().count() as f64)
        }
        "normalize-space" => {
            expect(0..=1)?;
            XPathValue::String(string_or_context().split_whitespace().collect::<Vec<_>>().join(" "))
        }
        "translate" => {
            expect(3..=3)?;
            XPathValue::String(translate(&string(0), &string(1), &string(2)))
        }

        "boolean" => {
            expect(1..=1)?;
            XPathValue::Boolean(args[0].to_boolean())
        }
        "not" => {
            expect(1..=1)?;
            XPathValue::Boolean(!args[0].to_boolean())
        }
        "true" | "false" => {
            expect(0..=0)?;
            XPathValue::Boolean(name == "true")
        }
        "lang" => {
            expect(1..=1)?;
            XPathValue::Boolean(lang_matches(doc, context, &string(0)))
        }

        "number" => {
            expect(0..=1)?;
            let n = match args.first() {
                Some(arg) => arg.resolve_number(doc),
                None => string_to_number(&context_string()),
            };
            XPathValue::Number(n)
        }
        "sum" => {
            expect(1..=1)?;
            let total: f64 = match &args[0] {
                XPathValue::NodeSet(nodes) => nodes
                    .iter()
                    .map(|&node| string_to_number(&node_string_value(doc, node)))
                    .sum(),
                XPathValue::Attributes(attrs) => attrs.iter().map(|a| string_to_number(&a.value)).sum(),
                _ => return Err("sum() expects a node-set".to_string()),
            };
            XPathValue::Number(total)
        }
        "floor" | "ceiling" | "round" => {
            expect(1..=1)?;
            let n = number(0);
            XPathValue::Number(match name {
                "floor" => n.floor(),
                "ceiling" => n.ceil(),
                _ => xpath_round(n),
            })
        }

        _ => return Err(format!("unknown function {name}()")),
    };
    Ok(value)
}

fn check_arity(name: &str, args: &[XPathValue], arity: RangeInclusive<usize>) -> Result<(), String> {
    if arity.contains(&args.len()) {
        return Ok(());
    }
    let expected = match (*arity.start(), *arity.end()) {
        (min, usize::MAX) => format!("at least {min}"),
        (min, max) if min == max => min.to_string(),
        (min, max) => format!("{min} to {max}"),
    };
    Err(format!("{name}() takes {expected} arguments, got {}", args.len()))
}

/// What `name()` and friends report on
#[derive(Clone, Copy)]
enum Named<'a> {
    Node(NodeId),
    Attribute(&'a Attr),
}

/// Element name, or the target of a processing instruction
fn qualified_name<D: DocumentAccess>(doc: &D, node: NodeId) -> &str {
    match doc.node_type_of(node) {
        Some(NodeType::Element) => doc.node_name(node).unwrap_or(""),
        Some(NodeType::Unknown) => doc.text_content(node).and_then(pi_target).unwrap_or(""),
        _ => "",
    }
}

fn local_part(qname: &str) -> &str {
    qname.split_once(':').map_or(qname, |(_, local)| local)
}

/// URI bound to the element's prefix, or the default namespace
fn namespace_uri<D: DocumentAccess>(doc: &D, node: NodeId) -> String {
    if doc.node_type_of(node) != Some(NodeType::Element) {
        return String::new();
    }
    let prefix = doc.node_name(node).and_then(|n| n.split_once(':')).map(|(p, _)| p);
    bound_namespace(doc, node, prefix)
}

/// Unprefixed attributes are in no namespace
fn attribute_namespace_uri<D: DocumentAccess>(doc: &D, attr: &Attr) -> String {
    match attr.name.split_once(':') {
        Some(("xml", _)) => "http://www.w3.org/XML/1998/namespace".to_string(),
        Some(("xmlns", _)) | None => String::new(),
        Some((prefix, _)) => bound_namespace(doc, attr.owner, Some(prefix)),
    }
}

/// Value of the nearest `xmlns` / `xmlns:prefix` attribute on the
/// ancestor-or-self chain of `node`
fn bound_namespace<D: DocumentAccess>(doc: &D, node: NodeId, prefix: Option<&str>) -> String {
    let attribute = match prefix {
        Some(prefix) => format!("xmlns:{prefix}"),
        None => "xmlns".to_string(),
    };
    std::iter::successors(Some(node), |&id| doc.parent_of(id))
        .find_map(|id| doc.get_attribute(id, &attribute))
        .unwrap_or("")
        .to_string()
}

/// Nearest `xml:lang` decides; `en` matches `en` and `en-US`.
fn lang_matches<D: DocumentAccess>(doc: &D, context: NodeId, wanted: &str) -> bool {
    let Some(lang) = std::iter::successors(Some(context), |&id| doc.parent_of(id))
        .find_map(|id| doc.get_attribute(id, "xml:lang"))
    else {
        return false;
    };
    let (lang, wanted) = (lang.to_lowercase(), wanted.to_lowercase());
    lang == wanted || lang.strip_prefix(&wanted).is_some_and(|rest| rest.starts_with('-'))
}

/// Characters at 1-based positions `p` with `round(start) <= p <
/// round(start) + round(length)`. NaN bounds select nothing.
fn substring(s: &str, start: f64, length: Option<f64>) -> String {
    let first = xpath_round(start);
    let end = length.map_or(f64::INFINITY, |len| first + xpath_round(len));
    s.chars()
        .zip(1u32..)
        .filter(|&(_, pos)| f64::from(pos) >= first && f64::from(pos) < end)
        .map(|(c, _)| c)
        .collect()
}

/// Map each character found in `from` to the one at the same index in
/// `to`, dropping it if `to` is shorter. The first occurrence in `from`
/// wins.
fn translate(s: &str, from: &str, to: &str) -> String {
    let to: Vec<char> = to.chars().collect();
    s.chars()
        .filter_map(|c| match from.chars().position(|f| f == c) {
            Some(index) => to.get(index).copied(),
            None => Some(c),
        })
        .collect()
}

/// `round()`: halves go towards positive infinity
fn xpath_round(n: f64) -> f64 {
    if n.is_finite() {
        (n + 0.5).floor()
    } else {
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{NodeArena, XmlNode};
    use crate::xpath::eval::DocumentOrder;
    use rstest::rstest;

    /// `<root xml:lang="en-US" xmlns:ns="http://example.com"><ns:child/>text</root>`
    fn tree() -> (NodeArena, NodeId, NodeId) {
        let mut arena = NodeArena::new();
        let root = arena.insert(XmlNode::element("root")).unwrap();
        let child = arena.insert(XmlNode::element("ns:child")).unwrap();
        let text = arena.insert(XmlNode::text("  some   text ")).unwrap();
        arena.append_child(root, child).unwrap();
        arena.append_child(root, text).unwrap();
        arena.set_attribute(root, "xml:lang", "en-US").unwrap();
        arena.set_attribute(root, "xmlns:ns", "http://example.com").unwrap();
        (arena, root, child)
    }

    fn try_call(arena: &NodeArena, context: NodeId, name: &str, args: Vec<XPathValue>) -> Result<XPathValue, String> {
        let order = DocumentOrder::new(arena.root_of(context));
        let ctx = EvalContext::new(arena, &order, context);
        call(name, args, &ctx)
    }

    fn eval(name: &str, args: &[XPathValue]) -> XPathValue {
        let (arena, root, _) = tree();
        try_call(&arena, root, name, args.to_vec()).unwrap()
    }

    fn s(value: &str) -> XPathValue {
        XPathValue::from(value)
    }

    #[rstest]
    #[case(&[s("hello"), 2.0.into(), 3.0.into()], "ell")]
    #[case(&[s("hello"), 1.5.into(), 2.6.into()], "ell")]
    #[case(&[s("hello"), 0.0.into(), 3.0.into()], "he")]
    #[case(&[s("hello"), f64::NAN.into(), 3.0.into()], "")]
    #[case(&[s("hello"), 4.0.into()], "lo")]
    #[case(&[s("hello"), f64::NEG_INFINITY.into(), f64::INFINITY.into()], "")]
    fn substring_rounding(#[case] args: &[XPathValue], #[case] expected: &str) {
        assert_eq!(eval("substring", args).to_string_value(), expected);
    }

    #[test]
    fn string_functions() {
        assert_eq!(eval("concat", &[s("a"), 1.0.into(), true.into()]).to_string_value(), "a1true");
        assert!(eval("starts-with", &[s("hello"), s("he")]).to_boolean());
        assert!(!eval("contains", &[s("hello"), s("lo!")]).to_boolean());
        assert_eq!(eval("substring-before", &[s("1999/04/01"), s("/")]).to_string_value(), "1999");
        assert_eq!(eval("substring-after", &[s("1999/04/01"), s("/")]).to_string_value(), "04/01");
        assert_eq!(eval("substring-after", &[s("abc"), s("x")]).to_string_value(), "");
        assert_eq!(eval("translate", &[s("bar"), s("abc"), s("ABC")]).to_string_value(), "BAr");
        assert_eq!(eval("translate", &[s("--aaa--"), s("abc-"), s("ABC")]).to_string_value(), "AAA");
        assert_eq!(eval("string-length", &[s("café")]).to_number(), 4.0);
    }

    #[test]
    fn context_defaults() {
        assert_eq!(eval("normalize-space", &[]).to_string_value(), "some text");
        assert_eq!(eval("string", &[]).to_string_value(), "  some   text ");
        assert!(eval("number", &[]).to_number().is_nan());
    }

    #[rstest]
    #[case(2.5, 3.0)]
    #[case(-2.5, -2.0)]
    #[case(-0.4, 0.0)]
    #[case(1.49, 1.0)]
    fn rounding(#[case] input: f64, #[case] expected: f64) {
        assert_eq!(eval("round", &[input.into()]).to_number(), expected);
    }

    #[test]
    fn numeric_functions() {
        assert_eq!(eval("floor", &[(-1.5).into()]).to_number(), -2.0);
        assert_eq!(eval("ceiling", &[s("1.2")]).to_number(), 2.0);
        assert!(eval("round", &[f64::NAN.into()]).to_number().is_nan());
        let owner = NodeId::from_raw(1).unwrap();
        let values = XPathValue::Attributes(vec![Attr::new(owner, "a", "1"), Attr::new(owner, "b", "2.5")]);
        assert_eq!(eval("sum", &[values.clone()]).to_number(), 3.5);
        assert_eq!(eval("count", &[values]).to_number(), 2.0);
    }

    #[test]
    fn names_and_namespaces() {
        let (arena, root, child) = tree();
        let call_on = |name: &str, args: Vec<XPathValue>| try_call(&arena, child, name, args).unwrap().to_string_value();
        assert_eq!(call_on("name", vec![]), "ns:child");
        assert_eq!(call_on("local-name", vec![]), "child");
        assert_eq!(call_on("namespace-uri", vec![]), "http://example.com");
        assert_eq!(call_on("namespace-uri", vec![XPathValue::single_node(root)]), "");
        assert_eq!(call_on("name", vec![XPathValue::default()]), "");
        assert!(try_call(&arena, child, "name", vec![s("x")]).is_err());

        let lang = XPathValue::Attributes(vec![Attr::new(root, "xml:lang", "en-US")]);
        assert_eq!(call_on("name", vec![lang.clone()]), "xml:lang");
        assert_eq!(call_on("local-name", vec![lang.clone()]), "lang");
        assert_eq!(call_on("namespace-uri", vec![lang]), "http://www.w3.org/XML/1998/namespace");
        let kind = XPathValue::Attributes(vec![Attr::new(child, "ns:kind", "x")]);
        assert_eq!(call_on("namespace-uri", vec![kind]), "http://example.com");
        let plain = XPathValue::Attributes(vec![Attr::new(child, "kind", "x")]);
        assert_eq!(call_on("namespace-uri", vec![plain]), "");
    }

    #[test]
    fn lang_uses_nearest_declaration() {
        let (arena, _, child) = tree();
        let lang = |wanted: &str| try_call(&arena, child, "lang", vec![s(wanted)]).unwrap().to_boolean();
        assert!(lang("en"));
        assert!(lang("EN-us"));
        assert!(!lang("e"));
        assert!(!lang("de"));
    }

    #[test]
    fn errors() {
        let (arena, root, _) = tree();
        let err = |name: &str, args: Vec<XPathValue>| try_call(&arena, root, name, args).unwrap_err();
        assert!(err("id", vec![s("a")]).contains("not supported"));
        assert_eq!(err("concat", vec![s("a")]), "concat() takes at least 2 arguments, got 1");
        assert_eq!(err("true", vec![s("a")]), "true() takes 0 arguments, got 1");
        assert_eq!(err("substring", vec![]), "substring() takes 2 to 3 arguments, got 0");
        assert!(err("count", vec![s("a")]).contains("node-set"));
        assert!(err("no-such", vec![]).contains("unknown function"));
    }
}
