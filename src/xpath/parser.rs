//! XPath 1.0 grammar
//!
//! Recursive descent over the lexer's tokens. Binary operators are parsed
//! by precedence level (see [`binary_op`]); abbreviations are expanded
//! here, so `//` becomes a `descendant-or-self::node()` step and `.`/`..`
//! become `self::node()`/`parent::node()`.
//!
//! Queries come from scripts, so their size is bounded: at most
//! [`MAX_TOKENS`] tokens and [`MAX_NESTING`] levels of parentheses,
//! predicates and function arguments. That bounds the depth of every
//! recursive walk over the resulting tree.

use super::lexer::{Lexer, Token};

#[derive(Debug, Clone)]
pub enum Expr {
    /// `/`: root of the tree holding the context node
    Root,
    /// `.` as a primary expression
    Context,
    Union(Box<Expr>, Box<Expr>),
    Path(Box<Expr>, Box<Step>),
    /// Primary expression followed by a predicate
    Filter(Box<Expr>, Box<Expr>),
    Function(String, Vec<Expr>),
    Binary(Box<Expr>, BinaryOp, Box<Expr>),
    Negate(Box<Expr>),
    Number(f64),
    String(String),
    /// Step relative to the context node
    Step(Box<Step>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone)]
pub struct Step {
    pub axis: Axis,
    pub node_test: NodeTest,
    pub predicates: Vec<Expr>,
}

impl Step {
    fn abbreviated(axis: Axis) -> Self {
        Step {
            axis,
            node_test: NodeTest::Node,
            predicates: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    Parent,
    Ancestor,
    AncestorOrSelf,
    FollowingSibling,
    PrecedingSibling,
    Following,
    Preceding,
    Self_,
    Attribute,
    Namespace,
}

impl Axis {
    pub fn from_name(name: &str) -> Option<Self> {
        let axis = match name {
            "child" => Axis::Child,
            "descendant" => Axis::Descendant,
            "descendant-or-self" => Axis::DescendantOrSelf,
            "parent" => Axis::Parent,
            "ancestor" => Axis::Ancestor,
            "ancestor-or-self" => Axis::AncestorOrSelf,
            "following-sibling" => Axis::FollowingSibling,
            "preceding-sibling" => Axis::PrecedingSibling,
            "following" => Axis::Following,
            "preceding" => Axis::Preceding,
            "self" => Axis::Self_,
            "attribute" => Axis::Attribute,
            "namespace" => Axis::Namespace,
            _ => return None,
        };
        Some(axis)
    }
}

#[derive(Debug, Clone)]
pub enum NodeTest {
    /// `*`
    Any,
    /// Exact name, prefix included
    Name(String),
    /// `prefix:*`
    Prefix(String),
    Node,
    Text,
    Comment,
    /// `processing-instruction()` with an optional target literal
    ProcessingInstruction(Option<String>),
}

/// Longest accepted query, in tokens
pub const MAX_TOKENS: usize = 1024;

/// Deepest accepted nesting of `(...)`, `[...]` and function arguments
pub const MAX_NESTING: usize = 64;

/// Number of binary precedence levels, loosest first
const BINARY_LEVELS: usize = 6;

/// The operator `token` denotes at precedence `level`, if any.
fn binary_op(token: &Token, level: usize) -> Option<BinaryOp> {
    let op = match (level, token) {
        (0, Token::Or) => BinaryOp::Or,
        (1, Token::And) => BinaryOp::And,
        (2, Token::Eq) => BinaryOp::Eq,
        (2, Token::NotEq) => BinaryOp::NotEq,
        (3, Token::Lt) => BinaryOp::Lt,
        (3, Token::LtEq) => BinaryOp::LtEq,
        (3, Token::Gt) => BinaryOp::Gt,
        (3, Token::GtEq) => BinaryOp::GtEq,
        (4, Token::Plus) => BinaryOp::Add,
        (4, Token::Minus) => BinaryOp::Sub,
        (5, Token::Star) => BinaryOp::Mul,
        (5, Token::Div) => BinaryOp::Div,
        (5, Token::Mod) => BinaryOp::Mod,
        _ => return None,
    };
    Some(op)
}

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    peeked: Option<Token>,
    depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Self {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_token();
        Parser {
            lexer,
            current,
            peeked: None,
            depth: 0,
        }
    }

    /// Parse one expression spanning the whole input.
    pub fn parse(&mut self) -> Result<Expr, String> {
        let expr = self.parse_binary(0)?;
        match &self.current {
            Token::Eof => Ok(expr),
            token => Err(format!("unexpected {token:?} after expression")),
        }
    }

    /// Move to the next token, returning the one left behind.
    fn bump(&mut self) -> Token {
        let next = self.peeked.take().unwrap_or_else(|| self.lexer.next_token());
        std::mem::replace(&mut self.current, next)
    }

    fn peek(&mut self) -> &Token {
        let lexer = &mut self.lexer;
        self.peeked.get_or_insert_with(|| lexer.next_token())
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<(), String> {
        if self.current != token {
            return Err(format!("expected {what}, found {:?}", self.current));
        }
        self.bump();
        Ok(())
    }

    fn at_step_start(&self) -> bool {
        matches!(
            self.current,
            Token::Name(_)
                | Token::NameTest(_)
                | Token::NodeType(_)
                | Token::Star
                | Token::At
                | Token::Axis(_)
                | Token::Dot
                | Token::DoubleDot
        )
    }

    fn parse_binary(&mut self, level: usize) -> Result<Expr, String> {
        if level == BINARY_LEVELS {
            return self.parse_unary();
        }
        let mut left = self.parse_binary(level + 1)?;
        while let Some(op) = binary_op(&self.current, level) {
            self.bump();
            let right = self.parse_binary(level + 1)?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    /// A whole expression one nesting level down
    fn parse_nested(&mut self) -> Result<Expr, String> {
        if self.depth == MAX_NESTING {
            return Err(format!("expression nested deeper than {MAX_NESTING} levels"));
        }
        self.depth += 1;
        let expr = self.parse_binary(0);
        self.depth -= 1;
        expr
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        let mut negations = 0;
        while self.current == Token::Minus {
            self.bump();
            negations += 1;
        }
        let mut expr = self.parse_path()?;
        while self.current == Token::Pipe {
            self.bump();
            expr = Expr::Union(Box::new(expr), Box::new(self.parse_path()?));
        }
        for _ in 0..negations {
            expr = Expr::Negate(Box::new(expr));
        }
        Ok(expr)
    }

    fn parse_path(&mut self) -> Result<Expr, String> {
        let start = match self.current {
            Token::Slash => {
                self.bump();
                if !self.at_step_start() {
                    return Ok(Expr::Root);
                }
                self.join(Expr::Root, false)?
            }
            Token::DoubleSlash => {
                self.bump();
                self.join(Expr::Root, true)?
            }
            _ => {
                let primary = self.parse_primary()?;
                self.parse_predicates()?
                    .into_iter()
                    .fold(primary, |expr, pred| Expr::Filter(Box::new(expr), Box::new(pred)))
            }
        };

        let mut expr = start;
        loop {
            let descend = match self.current {
                Token::Slash => false,
                Token::DoubleSlash => true,
                _ => return Ok(expr),
            };
            self.bump();
            expr = self.join(expr, descend)?;
        }
    }

    /// `base/step`, or `base//step` when `descend` is set
    fn join(&mut self, base: Expr, descend: bool) -> Result<Expr, String> {
        let base = if descend {
            Expr::Path(Box::new(base), Box::new(Step::abbreviated(Axis::DescendantOrSelf)))
        } else {
            base
        };
        Ok(Expr::Path(Box::new(base), Box::new(self.parse_step()?)))
    }

    fn parse_predicates(&mut self) -> Result<Vec<Expr>, String> {
        let mut predicates = Vec::new();
        while self.current == Token::LeftBracket {
            self.bump();
            predicates.push(self.parse_nested()?);
            self.expect(Token::RightBracket, "']'")?;
        }
        Ok(predicates)
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match &self.current {
            Token::Number(n) => {
                let n = *n;
                self.bump();
                Ok(Expr::Number(n))
            }
            Token::String(s) => {
                let s = s.clone();
                self.bump();
                Ok(Expr::String(s))
            }
            Token::LeftParen => {
                self.bump();
                let inner = self.parse_nested()?;
                self.expect(Token::RightParen, "')'")?;
                Ok(inner)
            }
            Token::Dot => {
                self.bump();
                Ok(Expr::Context)
            }
            Token::Dollar => Err("variable references are not supported".to_string()),
            Token::Name(name) => {
                let name = name.clone();
                if *self.peek() != Token::LeftParen {
                    return Ok(Expr::Step(Box::new(self.parse_step()?)));
                }
                self.bump();
                self.bump();
                Ok(Expr::Function(name, self.parse_arguments()?))
            }
            _ if self.at_step_start() => Ok(Expr::Step(Box::new(self.parse_step()?))),
            token => Err(format!("unexpected {token:?}")),
        }
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expr>, String> {
        let mut args = Vec::new();
        if self.current != Token::RightParen {
            args.push(self.parse_nested()?);
            while self.current == Token::Comma {
                self.bump();
                args.push(self.parse_nested()?);
            }
        }
        self.expect(Token::RightParen, "')' after arguments")?;
        Ok(args)
    }

    fn parse_step(&mut self) -> Result<Step, String> {
        let axis = match &self.current {
            Token::Dot => {
                self.bump();
                return Ok(Step::abbreviated(Axis::Self_));
            }
            Token::DoubleDot => {
                self.bump();
                return Ok(Step::abbreviated(Axis::Parent));
            }
            Token::At => {
                self.bump();
                Axis::Attribute
            }
            Token::Axis(name) => {
                let axis = Axis::from_name(name).ok_or_else(|| format!("unknown axis '{name}'"))?;
                self.bump();
                self.expect(Token::DoubleColon, "'::'")?;
                axis
            }
            _ => Axis::Child,
        };

        let node_test = match self.bump() {
            Token::Star => NodeTest::Any,
            Token::Name(name) => NodeTest::Name(name),
            Token::NameTest(qname) => match qname.strip_suffix(":*") {
                Some(prefix) => NodeTest::Prefix(prefix.to_string()),
                None => NodeTest::Name(qname),
            },
            Token::NodeType(kind) => self.parse_kind_test(&kind)?,
            token => return Err(format!("expected a node test, found {token:?}")),
        };

        Ok(Step {
            axis,
            node_test,
            predicates: self.parse_predicates()?,
        })
    }

    /// The parenthesized part of `node()`, `text()`, `comment()` and
    /// `processing-instruction('target'?)`
    fn parse_kind_test(&mut self, kind: &str) -> Result<NodeTest, String> {
        self.expect(Token::LeftParen, "'('")?;
        let target = match &self.current {
            Token::String(s) if kind == "processing-instruction" => {
                let s = s.clone();
                self.bump();
                Some(s)
            }
            _ => None,
        };
        self.expect(Token::RightParen, "')'")?;

        Ok(match kind {
            "node" => NodeTest::Node,
            "text" => NodeTest::Text,
            "comment" => NodeTest::Comment,
            _ => NodeTest::ProcessingInstruction(target),
        })
    }
}

pub fn parse(input: &str) -> Result<Expr, String> {
    if Lexer::new(input).tokenize().len() > MAX_TOKENS {
        return Err(format!("expression longer than {MAX_TOKENS} tokens"));
    }
    Parser::new(input).parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn last_step(expr: &Expr) -> &Step {
        match expr {
            Expr::Path(_, step) => step,
            Expr::Step(step) => step,
            other => panic!("not a path: {other:?}"),
        }
    }

    #[test]
    fn absolute_and_descendant_paths() {
        let expr = parse("/root/child").unwrap();
        assert!(matches!(&last_step(&expr).node_test, NodeTest::Name(n) if n == "child"));

        match parse("//item").unwrap() {
            Expr::Path(base, step) => {
                assert!(matches!(&step.node_test, NodeTest::Name(n) if n == "item"));
                assert_eq!(last_step(&base).axis, Axis::DescendantOrSelf);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn predicates_stay_on_their_step() {
        let expr = parse("a[1]/b[@id='x'][2]").unwrap();
        let b = last_step(&expr);
        assert_eq!(b.predicates.len(), 2);
        match &expr {
            Expr::Path(a, _) => assert_eq!(last_step(a).predicates.len(), 1),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn filter_on_primary_expression() {
        assert!(matches!(parse("(//a)[1]").unwrap(), Expr::Filter(..)));
        assert!(matches!(parse("(//a)[1]/b").unwrap(), Expr::Path(..)));
    }

    #[test]
    fn abbreviations() {
        let step = last_step(&parse("a/..").unwrap()).clone();
        assert_eq!(step.axis, Axis::Parent);
        assert!(matches!(step.node_test, NodeTest::Node));
        assert_eq!(last_step(&parse("@id").unwrap()).axis, Axis::Attribute);
        assert!(matches!(parse(".").unwrap(), Expr::Context));
        assert!(matches!(parse("/").unwrap(), Expr::Root));
        assert!(matches!(parse("/ | a").unwrap(), Expr::Union(..)));
    }

    #[test]
    fn precedence() {
        // 1 + (2 * 3) = 7 or ...
        match parse("1 + 2 * 3 = 7 or false()").unwrap() {
            Expr::Binary(lhs, BinaryOp::Or, _) => match *lhs {
                Expr::Binary(sum, BinaryOp::Eq, _) => {
                    assert!(matches!(*sum, Expr::Binary(_, BinaryOp::Add, _)))
                }
                other => panic!("unexpected {other:?}"),
            },
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(parse("-a | b").unwrap(), Expr::Negate(_)));
        match parse("--1").unwrap() {
            Expr::Negate(inner) => assert!(matches!(*inner, Expr::Negate(_))),
            other => panic!("unexpected {other:?}"),
        }
    }

    fn nested(open: &str, inner: &str, close: &str, levels: usize) -> String {
        format!("{}{inner}{}", open.repeat(levels), close.repeat(levels))
    }

    #[test]
    fn nesting_is_bounded() {
        assert!(parse(&nested("(", "1", ")", MAX_NESTING)).is_ok());
        assert!(parse(&nested("a[", "1", "]", MAX_NESTING)).is_ok());

        let err = parse(&nested("(", "1", ")", MAX_NESTING + 1)).unwrap_err();
        assert!(err.contains("nested deeper"), "{err}");
        assert!(parse(&nested("a[", "1", "]", MAX_NESTING + 1)).is_err());
        assert!(parse(&nested("not(", "1", ")", MAX_NESTING + 1)).is_err());
    }

    #[test]
    fn long_queries_are_rejected_before_parsing() {
        let err = parse(&nested("(", "1", ")", 10_000)).unwrap_err();
        assert!(err.contains("tokens"), "{err}");
        assert!(parse(&vec!["1"; 2_000].join("+")).is_err());
        assert!(parse(&"-".repeat(5_000)).is_err());
        assert!(parse(&vec!["a"; 2_000].join("/")).is_err());
        assert!(parse(&vec!["1"; 500].join("+")).is_ok());
    }

    #[test]
    fn node_tests() {
        assert!(matches!(
            &last_step(&parse("svg:*").unwrap()).node_test,
            NodeTest::Prefix(p) if p == "svg"
        ));
        assert!(matches!(
            &last_step(&parse("processing-instruction('php')").unwrap()).node_test,
            NodeTest::ProcessingInstruction(Some(t)) if t == "php"
        ));
        let step = last_step(&parse("ancestor-or-self::comment()").unwrap()).clone();
        assert_eq!(step.axis, Axis::AncestorOrSelf);
        assert!(matches!(step.node_test, NodeTest::Comment));
    }

    #[test]
    fn function_calls() {
        match parse("concat('a', name(..), 3)").unwrap() {
            Expr::Function(name, args) => {
                assert_eq!(name, "concat");
                assert_eq!(args.len(), 3);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(parse("true()").unwrap(), Expr::Function(_, args) if args.is_empty()));
    }

    #[test]
    fn malformed_input_is_rejected() {
        for bad in ["", "a[", "a b", "$var", "'open", "count(a", "bogus::a", "/a/", "1 +", "text(1)"] {
            assert!(parse(bad).is_err(), "{bad:?} parsed");
        }
    }
}
