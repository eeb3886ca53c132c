//! XPath tokenizer
//!
//! Operator names (`and`, `or`, `mod`, `div`) and `*` are ambiguous in
//! XPath 1.0: after an operand they are operators, anywhere else they are
//! name tests. The lexer tracks the previous token to tell them apart.

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Slash,
    DoubleSlash,
    Dot,
    DoubleDot,
    At,
    Pipe,
    Plus,
    Minus,
    /// Wildcard name test or multiplication, depending on position
    Star,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Mod,
    Div,

    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    DoubleColon,
    Comma,
    Dollar,

    Number(f64),
    String(String),
    Name(String),
    /// `prefix:*` or `prefix:local`
    NameTest(String),
    /// `node`, `text`, `comment` or `processing-instruction` before `(`
    NodeType(String),
    /// Axis name before `::`
    Axis(String),

    /// Character that cannot start a token, or the quote of an unterminated
    /// literal
    Invalid(char),
    Eof,
}

impl Token {
    fn ends_operand(&self) -> bool {
        matches!(
            self,
            Token::Number(_)
                | Token::String(_)
                | Token::Name(_)
                | Token::NameTest(_)
                | Token::Dot
                | Token::DoubleDot
                | Token::RightParen
                | Token::RightBracket
        )
    }
}

pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    after_operand: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer {
            input,
            pos: 0,
            after_operand: false,
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.rest().chars().nth(1)
    }

    /// Consume characters while `pred` holds and return them.
    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let rest = self.rest();
        let len = rest.find(|c| !pred(c)).unwrap_or(rest.len());
        self.pos += len;
        &rest[..len]
    }

    fn skip_whitespace(&mut self) {
        self.take_while(char::is_whitespace);
    }

    /// `long` if the next character after the current one is `second`,
    /// `short` otherwise. Consumes what it matched.
    fn one_or_two(&mut self, second: char, long: Token, short: Token) -> Token {
        self.pos += 1;
        if self.peek() == Some(second) {
            self.pos += second.len_utf8();
            long
        } else {
            short
        }
    }

    pub fn next_token(&mut self) -> Token {
        let token = self.scan_token();
        self.after_operand = match token {
            // a star after an operand is multiplication, which expects one next
            Token::Star => !self.after_operand,
            ref other => other.ends_operand(),
        };
        token
    }

    fn scan_token(&mut self) -> Token {
        self.skip_whitespace();
        let Some(c) = self.peek() else {
            return Token::Eof;
        };

        let single = match c {
            '@' => Some(Token::At),
            '|' => Some(Token::Pipe),
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '=' => Some(Token::Eq),
            '(' => Some(Token::LeftParen),
            ')' => Some(Token::RightParen),
            '[' => Some(Token::LeftBracket),
            ']' => Some(Token::RightBracket),
            ',' => Some(Token::Comma),
            '$' => Some(Token::Dollar),
            _ => None,
        };
        if let Some(token) = single {
            self.pos += 1;
            return token;
        }

        match c {
            '/' => self.one_or_two('/', Token::DoubleSlash, Token::Slash),
            '<' => self.one_or_two('=', Token::LtEq, Token::Lt),
            '>' => self.one_or_two('=', Token::GtEq, Token::Gt),
            '!' => self.one_or_two('=', Token::NotEq, Token::Invalid('!')),
            ':' => self.one_or_two(':', Token::DoubleColon, Token::Invalid(':')),
            '.' if self.peek_second().is_some_and(|c| c.is_ascii_digit()) => self.read_number(),
            '.' => self.one_or_two('.', Token::DoubleDot, Token::Dot),
            '"' | '\'' => self.read_literal(c),
            '0'..='9' => self.read_number(),
            _ if is_name_start_char(c) => self.read_name(),
            _ => {
                self.pos += c.len_utf8();
                Token::Invalid(c)
            }
        }
    }

    /// `digits ('.' digits?)?` or `'.' digits`
    fn read_number(&mut self) -> Token {
        let start = self.pos;
        self.take_while(|c| c.is_ascii_digit());
        if self.peek() == Some('.') {
            self.pos += 1;
            self.take_while(|c| c.is_ascii_digit());
        }
        Token::Number(self.input[start..self.pos].parse().unwrap_or(f64::NAN))
    }

    fn read_literal(&mut self, quote: char) -> Token {
        self.pos += 1;
        match self.rest().find(quote) {
            Some(len) => {
                let value = self.rest()[..len].to_string();
                self.pos += len + 1;
                Token::String(value)
            }
            None => {
                self.pos = self.input.len();
                Token::Invalid(quote)
            }
        }
    }

    fn read_name(&mut self) -> Token {
        let name = self.take_while(is_name_char);

        if self.after_operand {
            match name {
                "and" => return Token::And,
                "or" => return Token::Or,
                "mod" => return Token::Mod,
                "div" => return Token::Div,
                _ => {}
            }
        }

        self.skip_whitespace();
        if self.rest().starts_with("::") {
            return Token::Axis(name.to_string());
        }
        if self.peek() == Some('(') {
            return match name {
                "node" | "text" | "comment" | "processing-instruction" => {
                    Token::NodeType(name.to_string())
                }
                _ => Token::Name(name.to_string()),
            };
        }
        if self.peek() == Some(':') && self.peek_second() != Some(':') {
            self.pos += 1;
            let local = if self.peek() == Some('*') {
                self.pos += 1;
                "*"
            } else {
                self.take_while(is_name_char)
            };
            return Token::NameTest(format!("{name}:{local}"));
        }
        Token::Name(name.to_string())
    }

    /// Every token up to, not including, `Eof`
    pub fn tokenize(&mut self) -> Vec<Token> {
        std::iter::from_fn(|| Some(self.next_token()).filter(|t| *t != Token::Eof)).collect()
    }
}

fn is_name_start_char(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> Token {
        Token::Name(s.to_string())
    }

    #[test]
    fn location_paths() {
        assert_eq!(
            Lexer::new("/root//child").tokenize(),
            vec![Token::Slash, name("root"), Token::DoubleSlash, name("child")]
        );
        assert_eq!(
            Lexer::new("../@id").tokenize(),
            vec![Token::DoubleDot, Token::Slash, Token::At, name("id")]
        );
    }

    #[test]
    fn predicates_and_literals() {
        assert_eq!(
            Lexer::new("item[@id = \"it's\"]").tokenize(),
            vec![
                name("item"),
                Token::LeftBracket,
                Token::At,
                name("id"),
                Token::Eq,
                Token::String("it's".to_string()),
                Token::RightBracket,
            ]
        );
    }

    #[test]
    fn axes_node_types_and_prefixes() {
        assert_eq!(
            Lexer::new("child :: text()").tokenize(),
            vec![
                Token::Axis("child".to_string()),
                Token::DoubleColon,
                Token::NodeType("text".to_string()),
                Token::LeftParen,
                Token::RightParen,
            ]
        );
        assert_eq!(
            Lexer::new("svg:* | svg:rect").tokenize(),
            vec![
                Token::NameTest("svg:*".to_string()),
                Token::Pipe,
                Token::NameTest("svg:rect".to_string()),
            ]
        );
    }

    #[test]
    fn operator_names_depend_on_position() {
        let tokens = Lexer::new("/div/and[. = 1 or mod]").tokenize();
        assert_eq!(tokens[1], name("div"));
        assert_eq!(tokens[3], name("and"));
        assert!(tokens.contains(&Token::Or));
        assert_eq!(tokens[tokens.len() - 2], name("mod"));
    }

    #[test]
    fn star_is_wildcard_or_multiply() {
        assert_eq!(
            Lexer::new("* * 2").tokenize(),
            vec![Token::Star, Token::Star, Token::Number(2.0)]
        );
        let tokens = Lexer::new("3 * *").tokenize();
        assert_eq!(tokens.len(), 3);
    }

    #[test]
    fn numbers() {
        assert_eq!(
            Lexer::new(".5 12. 3.25").tokenize(),
            vec![Token::Number(0.5), Token::Number(12.0), Token::Number(3.25)]
        );
    }

    #[test]
    fn invalid_input() {
        let mut lexer = Lexer::new("'abc");
        assert_eq!(lexer.next_token(), Token::Invalid('\''));
        assert_eq!(lexer.next_token(), Token::Eof);
        assert_eq!(Lexer::new("a ! b").tokenize()[1], Token::Invalid('!'));
        assert_eq!(Lexer::new("#").tokenize(), vec![Token::Invalid('#')]);
    }
}
