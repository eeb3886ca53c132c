//! Serialization
//!
//! Output layout: one top-level node per line, four spaces of indentation
//! per depth, elements whose only child is text printed inline, childless
//! elements as `<name />`.

use super::arena::NodeArena;
use super::node::{NodeData, NodeId};
use crate::core::encoding::{encode_document, TextEncoding};
use crate::core::entities::encode_text;
use crate::error::Result;

const INDENT: &str = "    ";

/// Serialize a whole document into bytes in its declared encoding.
pub fn write_document(arena: &NodeArena, doc: NodeId) -> Result<Vec<u8>> {
    let encoding = arena
        .declaration_of(doc)
        .map_or(TextEncoding::Utf8, |decl| TextEncoding::from_label(&decl.encoding));

    let mut writer = Writer {
        arena,
        latin1: encoding == TextEncoding::Latin1,
        out: String::new(),
    };
    writer.write_tree(doc)?;
    Ok(encode_document(&writer.out, encoding))
}

/// Pending work while walking the tree. Children are pushed in reverse so
/// they pop in document order.
enum Frame<'a> {
    Enter(NodeId, usize),
    Newline,
    Close { name: &'a str, depth: usize, block: bool },
}

struct Writer<'a> {
    arena: &'a NodeArena,
    latin1: bool,
    out: String,
}

impl<'a> Writer<'a> {
    fn indent(&mut self, depth: usize) {
        for _ in 0..depth {
            self.out.push_str(INDENT);
        }
    }

    fn write_tree(&mut self, top: NodeId) -> Result<()> {
        let mut stack = vec![Frame::Enter(top, 0)];
        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Enter(id, depth) => self.enter(id, depth, &mut stack)?,
                Frame::Newline => self.out.push('\n'),
                Frame::Close { name, depth, block } => {
                    if block {
                        self.out.push('\n');
                        self.indent(depth);
                    }
                    self.close(name);
                }
            }
        }
        Ok(())
    }

    fn enter(&mut self, id: NodeId, depth: usize, stack: &mut Vec<Frame<'a>>) -> Result<()> {
        let arena = self.arena;
        let node = arena.node(id)?;
        match &node.data {
            NodeData::Document { .. } => {
                let children: Vec<NodeId> = arena.children(id).collect();
                for &child in children.iter().rev() {
                    stack.push(Frame::Newline);
                    stack.push(Frame::Enter(child, depth));
                }
            }
            NodeData::Element { name, attributes } => {
                self.indent(depth);
                self.out.push('<');
                self.out.push_str(name);
                for attr in attributes {
                    self.out.push(' ');
                    self.out.push_str(&attr.name);
                    self.out.push_str("=\"");
                    self.out.push_str(&encode_text(&attr.value, self.latin1));
                    self.out.push('"');
                }

                match (node.first_child, node.last_child) {
                    (None, _) => self.out.push_str(" />"),
                    (Some(first), Some(last)) if first == last && self.is_plain_text(first) => {
                        self.out.push('>');
                        stack.push(Frame::Close { name, depth, block: false });
                        stack.push(Frame::Enter(first, depth + 1));
                    }
                    _ => {
                        self.out.push('>');
                        stack.push(Frame::Close { name, depth, block: true });
                        let children: Vec<NodeId> = arena.children(id).collect();
                        for &child in children.iter().rev() {
                            stack.push(Frame::Enter(child, depth + 1));
                            if !self.is_plain_text(child) {
                                stack.push(Frame::Newline);
                            }
                        }
                    }
                }
            }
            NodeData::Text { content, cdata: true } => {
                self.out.push('\n');
                self.indent(depth);
                self.out.push_str("<![CDATA[");
                self.out.push_str(content);
                self.out.push_str("]]>\n");
            }
            NodeData::Text { content, cdata: false } => {
                self.out.push_str(&encode_text(content, self.latin1));
            }
            NodeData::Comment(text) => {
                self.indent(depth);
                self.out.push_str("<!--");
                self.out.push_str(text);
                self.out.push_str("-->");
            }
            NodeData::Declaration(decl) => {
                self.out.push_str("<?xml ");
                for (key, value) in [
                    ("version", &decl.version),
                    ("encoding", &decl.encoding),
                    ("standalone", &decl.standalone),
                ] {
                    if !value.is_empty() {
                        self.out.push_str(&format!("{key}=\"{value}\" "));
                    }
                }
                self.out.push_str("?>");
            }
            NodeData::Unknown(raw) => {
                self.indent(depth);
                self.out.push('<');
                self.out.push_str(raw);
                self.out.push('>');
            }
        }
        Ok(())
    }

    fn close(&mut self, name: &str) {
        self.out.push_str("</");
        self.out.push_str(name);
        self.out.push('>');
    }

    fn is_plain_text(&self, id: NodeId) -> bool {
        matches!(
            self.arena.get(id).map(|n| &n.data),
            Some(NodeData::Text { cdata: false, .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{Declaration, XmlNode};
    use pretty_assertions::assert_eq;

    fn document() -> (NodeArena, NodeId) {
        let mut arena = NodeArena::new();
        let doc = arena
            .create_document(
                "scriptfiles/w.xml",
                Declaration {
                    version: "1.0".into(),
                    encoding: "ISO-8859-1".into(),
                    standalone: String::new(),
                },
            )
            .unwrap();
        let root = arena.insert(XmlNode::element("config")).unwrap();
        arena.append_child(doc, root).unwrap();
        arena.set_attribute(root, "mode", "a<b").unwrap();

        let name = arena.insert(XmlNode::element("name")).unwrap();
        let text = arena.insert(XmlNode::text("café & co")).unwrap();
        let note = arena.insert(XmlNode::comment(" note ")).unwrap();
        let empty = arena.insert(XmlNode::element("empty")).unwrap();
        arena.append_child(root, name).unwrap();
        arena.append_child(name, text).unwrap();
        arena.append_child(root, note).unwrap();
        arena.append_child(root, empty).unwrap();
        (arena, doc)
    }

    #[test]
    fn writes_indented_layout() {
        let (arena, doc) = document();
        let bytes = write_document(&arena, doc).unwrap();
        let expected = "<?xml version=\"1.0\" encoding=\"ISO-8859-1\" ?>\n\
                        <config mode=\"a&lt;b\">\n    \
                        <name>caf\u{e9} &amp; co</name>\n    \
                        <!-- note -->\n    \
                        <empty />\n\
                        </config>\n";
        assert_eq!(String::from_utf8_lossy(&bytes), expected.replace('\u{e9}', "\u{fffd}"));
        assert!(bytes.windows(4).any(|w| w == b"caf\xE9"));
    }

    #[test]
    fn mixed_content_breaks_before_elements() {
        let mut arena = NodeArena::new();
        let doc = arena.create_document("m.xml", Declaration::default()).unwrap();
        let root = arena.insert(XmlNode::element("r")).unwrap();
        arena.append_child(doc, root).unwrap();
        let lead = arena.insert(XmlNode::text("x")).unwrap();
        let child = arena.insert(XmlNode::element("c")).unwrap();
        arena.append_child(root, lead).unwrap();
        arena.append_child(root, child).unwrap();

        let bytes = write_document(&arena, doc).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "<?xml ?>\n<r>x\n    <c />\n</r>\n");
    }

    #[test]
    fn deep_trees_do_not_exhaust_the_stack() {
        const DEPTH: usize = 2_000;
        let mut arena = NodeArena::new();
        let doc = arena.create_document("deep.xml", Declaration::default()).unwrap();
        let mut parent = doc;
        for _ in 0..DEPTH {
            let child = arena.insert(XmlNode::element("n")).unwrap();
            arena.append_child(parent, child).unwrap();
            parent = child;
        }
        let leaf = arena.insert(XmlNode::text("end")).unwrap();
        arena.append_child(parent, leaf).unwrap();

        // A recursive walk needs far more than this much stack at this depth.
        let bytes = std::thread::Builder::new()
            .stack_size(64 * 1024)
            .spawn(move || write_document(&arena, doc).unwrap())
            .unwrap()
            .join()
            .unwrap();

        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text.matches("<n>").count(), DEPTH);
        assert_eq!(text.matches("</n>").count(), DEPTH);
        let innermost = format!("\n{}<n>end</n>\n", INDENT.repeat(DEPTH - 1));
        assert!(text.contains(&innermost));
        assert!(text.ends_with("</n>\n"));
    }
}
