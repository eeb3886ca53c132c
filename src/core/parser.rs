//! Document parser
//!
//! Builds nodes straight into the arena under an existing document node.
//! Text is whitespace-condensed (runs collapse to one space, leading and
//! trailing whitespace is dropped, whitespace-only text disappears), CDATA
//! is kept verbatim, and `<!...>` / `<?...?>` markup other than the XML
//! declaration is kept as UNKNOWN nodes.
//!
//! Failures carry a numeric code, a fixed description and the 1-based
//! line and column of the offending markup.

use memchr::{memchr, memchr_iter, memrchr};
use thiserror::Error;

use super::entities::decode_text;
use super::scanner::{is_name_start_char, Scanner};
use crate::dom::{Attribute, Declaration, NodeArena, NodeData, NodeId, XmlNode};
use crate::error::Result;

/// Parse failure categories, numbered as scripts expect them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Error = 1,
    OpeningFile = 2,
    ParsingElement = 3,
    FailedToReadElementName = 4,
    ReadingElementValue = 5,
    ReadingAttributes = 6,
    ParsingEmpty = 7,
    ReadingEndTag = 8,
    ParsingUnknown = 9,
    ParsingComment = 10,
    ParsingDeclaration = 11,
    DocumentEmpty = 12,
    EmbeddedNull = 13,
    ParsingCdata = 14,
}

impl ErrorCode {
    #[inline]
    pub fn number(self) -> i32 {
        self as i32
    }

    pub fn description(self) -> &'static str {
        match self {
            ErrorCode::Error => "Error",
            ErrorCode::OpeningFile => "Failed to open file",
            ErrorCode::ParsingElement => "Error parsing Element.",
            ErrorCode::FailedToReadElementName => "Failed to read Element name",
            ErrorCode::ReadingElementValue => "Error reading Element value.",
            ErrorCode::ReadingAttributes => "Error reading Attributes.",
            ErrorCode::ParsingEmpty => "Error: empty tag.",
            ErrorCode::ReadingEndTag => "Error reading end tag.",
            ErrorCode::ParsingUnknown => "Error parsing Unknown.",
            ErrorCode::ParsingComment => "Error parsing Comment.",
            ErrorCode::ParsingDeclaration => "Error parsing Declaration.",
            ErrorCode::DocumentEmpty => "Error document empty.",
            ErrorCode::EmbeddedNull => "Error null (0) or unexpected EOF found in input stream.",
            ErrorCode::ParsingCdata => "Error parsing CDATA.",
        }
    }
}

/// A located parse failure. Displays as the host diagnostic line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error(
    "XML Error {}: {} (line: {}, col: {})",
    .code.number(),
    .code.description(),
    .line,
    .column
)]
pub struct ParseError {
    pub code: ErrorCode,
    /// 1-based; 0 when the failure has no position (file could not be opened)
    pub line: usize,
    pub column: usize,
}

impl ParseError {
    pub fn at(code: ErrorCode, input: &str, pos: usize) -> Self {
        let (line, column) = location(input, pos);
        ParseError { code, line, column }
    }

    pub fn unlocated(code: ErrorCode) -> Self {
        ParseError {
            code,
            line: 0,
            column: 0,
        }
    }
}

/// 1-based line and column (in characters) of a byte offset.
fn location(input: &str, pos: usize) -> (usize, usize) {
    let before = &input.as_bytes()[..pos.min(input.len())];
    let line = memchr_iter(b'\n', before).count() + 1;
    let line_start = memrchr(b'\n', before).map_or(0, |i| i + 1);
    let column = before[line_start..]
        .iter()
        .filter(|&&b| b & 0xC0 != 0x80)
        .count()
        + 1;
    (line, column)
}

/// Parse `input` and append the resulting nodes to `doc`.
///
/// On failure the nodes built so far stay attached; the caller decides
/// whether to keep or free the partial tree.
pub fn parse_into(arena: &mut NodeArena, doc: NodeId, input: &str) -> Result<()> {
    Parser {
        input,
        scanner: Scanner::new(input.as_bytes()),
        arena,
        doc,
        open: Vec::new(),
    }
    .run()
}

struct Parser<'a, 'r> {
    input: &'a str,
    scanner: Scanner<'a>,
    arena: &'r mut NodeArena,
    doc: NodeId,
    /// Open elements with the offset of their start tag
    open: Vec<(NodeId, usize)>,
}

impl Parser<'_, '_> {
    fn run(mut self) -> Result<()> {
        if let Some(nul) = memchr(0, self.input.as_bytes()) {
            return Err(self.error(ErrorCode::EmbeddedNull, nul));
        }

        self.scanner.skip_whitespace();
        if self.scanner.is_eof() {
            return Err(self.error(ErrorCode::DocumentEmpty, 0));
        }

        loop {
            if self.open.is_empty() {
                self.scanner.skip_whitespace();
                // anything after the last top-level markup that is not markup is ignored
                if self.scanner.peek() != Some(b'<') {
                    break;
                }
            } else {
                self.read_text()?;
            }
            self.read_markup()?;
        }
        Ok(())
    }

    fn error(&self, code: ErrorCode, pos: usize) -> crate::error::Error {
        ParseError::at(code, self.input, pos).into()
    }

    fn parent(&self) -> NodeId {
        self.open.last().map_or(self.doc, |&(id, _)| id)
    }

    fn append(&mut self, node: XmlNode) -> Result<NodeId> {
        let id = self.arena.insert(node)?;
        self.arena.append_child(self.parent(), id)?;
        Ok(id)
    }

    fn read_text(&mut self) -> Result<()> {
        let start = self.scanner.position();
        let Some(end) = self.scanner.find_tag_start() else {
            let open_at = self.open.last().map_or(start, |&(_, at)| at);
            return Err(self.error(ErrorCode::ReadingElementValue, open_at));
        };

        let condensed = condense_whitespace(&self.input[start..end]);
        if !condensed.is_empty() {
            let text = decode_text(&condensed).into_owned();
            self.append(XmlNode::text(text))?;
        }
        self.scanner.set_position(end);
        Ok(())
    }

    fn read_markup(&mut self) -> Result<()> {
        let s = &self.scanner;
        if s.starts_with(b"<?xml")
            && matches!(s.peek_at(5), Some(b' ' | b'\t' | b'\r' | b'\n' | b'?'))
        {
            self.read_declaration()
        } else if s.starts_with(b"<!--") {
            self.read_delimited(4, b"-->", ErrorCode::ParsingComment, XmlNode::comment)
        } else if s.starts_with(b"<![CDATA[") {
            self.read_delimited(9, b"]]>", ErrorCode::ParsingCdata, XmlNode::cdata)
        } else if s.starts_with(b"</") {
            self.read_end_tag()
        } else if s.peek_at(1).is_some_and(is_name_start_char) {
            self.read_element()
        } else {
            self.read_unknown()
        }
    }

    /// Comments and CDATA: raw content between an opener and a terminator.
    fn read_delimited(
        &mut self,
        opener_len: usize,
        terminator: &[u8],
        code: ErrorCode,
        make: fn(String) -> XmlNode,
    ) -> Result<()> {
        let start = self.scanner.position();
        self.scanner.advance(opener_len);
        let content_start = self.scanner.position();
        let Some(end) = self.scanner.find(terminator) else {
            return Err(self.error(code, start));
        };
        let content = self.input[content_start..end].to_string();
        self.append(make(content))?;
        self.scanner.set_position(end + terminator.len());
        Ok(())
    }

    fn read_declaration(&mut self) -> Result<()> {
        let start = self.scanner.position();
        self.scanner.advance(5);
        let inner_start = self.scanner.position();
        let Some(end) = self.scanner.find(b"?>") else {
            return Err(self.error(ErrorCode::ParsingDeclaration, start));
        };

        let mut declaration = Declaration::default();
        let mut inner = Scanner::new(&self.input.as_bytes()[inner_start..end]);
        loop {
            inner.skip_whitespace();
            if inner.is_eof() {
                break;
            }
            let pair = read_attribute(&mut inner, self.input, inner_start)
                .ok_or_else(|| self.error(ErrorCode::ParsingDeclaration, start))?;
            match pair.name.as_str() {
                "version" => declaration.version = pair.value,
                "encoding" => declaration.encoding = pair.value,
                "standalone" => declaration.standalone = pair.value,
                _ => {}
            }
        }

        self.append(XmlNode::declaration(declaration))?;
        self.scanner.set_position(end + 2);
        Ok(())
    }

    fn read_unknown(&mut self) -> Result<()> {
        let start = self.scanner.position();
        self.scanner.advance(1);
        let Some(end) = self.scanner.find_markup_end() else {
            return Err(self.error(ErrorCode::ParsingUnknown, start));
        };
        let raw = self.input[start + 1..end].to_string();
        self.append(XmlNode::unknown(raw))?;
        self.scanner.set_position(end + 1);
        Ok(())
    }

    fn read_end_tag(&mut self) -> Result<()> {
        let start = self.scanner.position();
        self.scanner.advance(2);
        let name_start = self.scanner.position();
        if self.scanner.read_name().is_none() {
            return Err(self.error(ErrorCode::ReadingEndTag, start));
        }
        let name = &self.input[name_start..self.scanner.position()];
        self.scanner.skip_whitespace();
        if self.scanner.peek() != Some(b'>') {
            return Err(self.error(ErrorCode::ReadingEndTag, start));
        }

        let matches_open = self
            .open
            .last()
            .and_then(|&(id, _)| self.arena.get(id))
            .is_some_and(|node| node.value() == name);
        if !matches_open {
            return Err(self.error(ErrorCode::ReadingEndTag, start));
        }

        self.open.pop();
        self.scanner.advance(1);
        Ok(())
    }

    fn read_element(&mut self) -> Result<()> {
        let start = self.scanner.position();
        self.scanner.advance(1);
        let name_start = self.scanner.position();
        if self.scanner.read_name().is_none() {
            return Err(self.error(ErrorCode::FailedToReadElementName, start));
        }
        let name = self.input[name_start..self.scanner.position()].to_string();

        let mut attributes: Vec<Attribute> = Vec::new();
        let self_closing = loop {
            self.scanner.skip_whitespace();
            match self.scanner.peek() {
                None => return Err(self.error(ErrorCode::ParsingElement, start)),
                Some(b'/') => {
                    if self.scanner.peek_at(1) != Some(b'>') {
                        return Err(self.error(ErrorCode::ParsingEmpty, self.scanner.position()));
                    }
                    self.scanner.advance(2);
                    break true;
                }
                Some(b'>') => {
                    self.scanner.advance(1);
                    break false;
                }
                Some(_) => {
                    let at = self.scanner.position();
                    let attribute = read_attribute(&mut self.scanner, self.input, 0)
                        .ok_or_else(|| self.error(ErrorCode::ReadingAttributes, self.scanner.position()))?;
                    if attributes.iter().any(|a| a.name == attribute.name) {
                        return Err(self.error(ErrorCode::ParsingElement, at));
                    }
                    attributes.push(attribute);
                }
            }
        };

        let id = self.append(XmlNode {
            data: NodeData::Element { name, attributes },
            ..XmlNode::element(String::new())
        })?;
        if !self_closing {
            self.open.push((id, start));
        }
        Ok(())
    }
}

/// Read `name = value` at the scanner position. Values may be single- or
/// double-quoted, or unquoted up to whitespace, `/` or `>`. `base` is the
/// offset of the scanner's input within `source`.
fn read_attribute(scanner: &mut Scanner<'_>, source: &str, base: usize) -> Option<Attribute> {
    let name_start = scanner.position();
    scanner.read_name()?;
    let name = &source[base + name_start..base + scanner.position()];

    scanner.skip_whitespace();
    if scanner.peek() != Some(b'=') {
        return None;
    }
    scanner.advance(1);
    scanner.skip_whitespace();

    let raw = match scanner.peek()? {
        quote @ (b'"' | b'\'') => {
            scanner.advance(1);
            let value_start = scanner.position();
            let end = scanner.find_byte(quote)?;
            scanner.set_position(end + 1);
            &source[base + value_start..base + end]
        }
        _ => {
            let value_start = scanner.position();
            while let Some(b) = scanner.peek() {
                if matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'/' | b'>') {
                    break;
                }
                scanner.advance(1);
            }
            if scanner.position() == value_start {
                return None;
            }
            &source[base + value_start..base + scanner.position()]
        }
    };

    Some(Attribute::new(name, decode_text(raw)))
}

fn condense_whitespace(raw: &str) -> String {
    raw.split([' ', '\t', '\r', '\n'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
