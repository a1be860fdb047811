//! Lexer
//!
//! Produces tokens on demand; the compiler pulls one token at a time and
//! can clone the lexer for lookahead.

use crate::error::CompileError;

/// Script token types
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Int(i64),
    Str(String),
    /// Identifier, keyword or variable name including its sigils
    Ident(String),

    // Arithmetic
    Plus,           // +
    Minus,          // -
    Star,           // *
    Slash,          // /
    Percent,        // %

    // Comparison
    Equal,          // ==
    NotEqual,       // !=
    Less,           // <
    Greater,        // >
    LessEqual,      // <=
    GreaterEqual,   // >=

    // Logical
    And,            // &&
    Or,             // ||
    Not,            // !

    // Bitwise
    BitAnd,         // &
    BitOr,          // |
    BitXor,         // ^
    BitNot,         // ~
    LeftShift,      // <<
    RightShift,     // >>

    // Assignment
    Assign,         // =
    PlusEqual,      // +=
    MinusEqual,     // -=
    StarEqual,      // *=
    SlashEqual,     // /=
    PercentEqual,   // %=
    AndEqual,       // &=
    OrEqual,        // |=
    XorEqual,       // ^=
    ShlEqual,       // <<=
    ShrEqual,       // >>=

    // Increment/Decrement
    Increment,      // ++
    Decrement,      // --

    // Delimiters
    LParen,         // (
    RParen,         // )
    LBrace,         // {
    RBrace,         // }
    LBracket,       // [
    RBracket,       // ]
    Semicolon,      // ;
    Comma,          // ,
    Colon,          // :
    Question,       // ?

    EOF,
}

impl Token {
    pub fn describe(&self) -> String {
        match self {
            Token::Int(n) => format!("number {}", n),
            Token::Str(_) => "string".to_string(),
            Token::Ident(name) => format!("'{}'", name),
            Token::EOF => "end of script".to_string(),
            other => format!("{:?}", other),
        }
    }
}

/// Script lexer
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
        }
    }

    pub fn source(&self) -> &'a str {
        self.source
    }

    /// Byte offset of the next unread character
    pub fn offset(&self) -> usize {
        self.pos
    }

    fn error(&self, offset: usize, message: impl Into<String>) -> CompileError {
        CompileError::at(self.source, offset, message)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.pos + ahead).copied()
    }

    /// Skip whitespace and comments; returns the start of the next token
    pub fn skip_trivia(&mut self) -> Result<usize, CompileError> {
        loop {
            match self.peek() {
                Some(c) if c.is_ascii_whitespace() => self.pos += 1,
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    let start = self.pos;
                    self.pos += 2;
                    loop {
                        match self.peek() {
                            None => return Err(self.error(start, "unterminated comment")),
                            Some(b'*') if self.peek_at(1) == Some(b'/') => {
                                self.pos += 2;
                                break;
                            }
                            Some(_) => self.pos += 1,
                        }
                    }
                }
                _ => return Ok(self.pos),
            }
        }
    }

    /// Get the next token and its start offset
    pub fn next_token(&mut self) -> Result<(Token, usize), CompileError> {
        let start = self.skip_trivia()?;

        let Some(c) = self.peek() else {
            return Ok((Token::EOF, start));
        };

        let token = match c {
            b'0'..=b'9' => self.read_number()?,
            b'"' => self.read_string()?,
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.read_identifier(start)?,
            b'.' | b'@' | b'$' | b'#' | b'\'' => self.read_identifier(start)?,
            _ => self.read_operator(start)?,
        };

        Ok((token, start))
    }

    fn read_number(&mut self) -> Result<Token, CompileError> {
        let start = self.pos;
        let (radix, digits_start) = if self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'x' | b'X')) {
            (16, start + 2)
        } else {
            (10, start)
        };
        self.pos = digits_start;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == b'_' {
                self.pos += 1;
            } else {
                break;
            }
        }

        let text = &self.source[digits_start..self.pos];
        i64::from_str_radix(text, radix)
            .map(Token::Int)
            .map_err(|_| self.error(start, format!("invalid number '{}'", &self.source[start..self.pos])))
    }

    fn read_string(&mut self) -> Result<Token, CompileError> {
        let start = self.pos;
        self.pos += 1;
        let mut text = String::new();

        loop {
            let rest = &self.source[self.pos..];
            let Some(c) = rest.chars().next() else {
                return Err(self.error(start, "unterminated string"));
            };
            match c {
                '"' => {
                    self.pos += 1;
                    break;
                }
                '\n' => return Err(self.error(start, "unterminated string")),
                '\\' => {
                    let escaped = rest[1..].chars().next();
                    match escaped {
                        Some('n') => text.push('\n'),
                        Some('t') => text.push('\t'),
                        Some('r') => text.push('\r'),
                        Some('"') => text.push('"'),
                        Some('\\') => text.push('\\'),
                        Some('0') => {
                            return Err(self.error(self.pos, "NUL is not allowed in strings"));
                        }
                        Some(other) => text.push(other),
                        None => return Err(self.error(start, "unterminated string")),
                    }
                    self.pos += 1 + escaped.map_or(0, char::len_utf8);
                }
                '\0' => return Err(self.error(self.pos, "NUL is not allowed in strings")),
                c => {
                    text.push(c);
                    self.pos += c.len_utf8();
                }
            }
        }

        Ok(Token::Str(text))
    }

    fn read_identifier(&mut self, start: usize) -> Result<Token, CompileError> {
        // variable sigils: .@ . ' @ $@ $ ## #
        match self.peek() {
            Some(b'.') => {
                self.pos += 1;
                if self.peek() == Some(b'@') {
                    self.pos += 1;
                }
            }
            Some(b'$') => {
                self.pos += 1;
                if self.peek() == Some(b'@') {
                    self.pos += 1;
                }
            }
            Some(b'#') => {
                self.pos += 1;
                if self.peek() == Some(b'#') {
                    self.pos += 1;
                }
            }
            Some(b'@') | Some(b'\'') => self.pos += 1,
            _ => {}
        }

        match self.peek() {
            Some(c) if c.is_ascii_alphabetic() || c == b'_' => {}
            _ => return Err(self.error(start, "invalid variable name")),
        }
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == b'_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        if self.peek() == Some(b'$') {
            self.pos += 1;
        }

        Ok(Token::Ident(self.source[start..self.pos].to_string()))
    }

    fn read_operator(&mut self, start: usize) -> Result<Token, CompileError> {
        let c = self.bytes[self.pos];
        let next = self.peek_at(1);
        let third = self.peek_at(2);

        let (token, len) = match (c, next) {
            (b'+', Some(b'+')) => (Token::Increment, 2),
            (b'+', Some(b'=')) => (Token::PlusEqual, 2),
            (b'+', _) => (Token::Plus, 1),
            (b'-', Some(b'-')) => (Token::Decrement, 2),
            (b'-', Some(b'=')) => (Token::MinusEqual, 2),
            (b'-', _) => (Token::Minus, 1),
            (b'*', Some(b'=')) => (Token::StarEqual, 2),
            (b'*', _) => (Token::Star, 1),
            (b'/', Some(b'=')) => (Token::SlashEqual, 2),
            (b'/', _) => (Token::Slash, 1),
            (b'%', Some(b'=')) => (Token::PercentEqual, 2),
            (b'%', _) => (Token::Percent, 1),
            (b'=', Some(b'=')) => (Token::Equal, 2),
            (b'=', _) => (Token::Assign, 1),
            (b'!', Some(b'=')) => (Token::NotEqual, 2),
            (b'!', _) => (Token::Not, 1),
            (b'<', Some(b'<')) if third == Some(b'=') => (Token::ShlEqual, 3),
            (b'<', Some(b'<')) => (Token::LeftShift, 2),
            (b'<', Some(b'=')) => (Token::LessEqual, 2),
            (b'<', _) => (Token::Less, 1),
            (b'>', Some(b'>')) if third == Some(b'=') => (Token::ShrEqual, 3),
            (b'>', Some(b'>')) => (Token::RightShift, 2),
            (b'>', Some(b'=')) => (Token::GreaterEqual, 2),
            (b'>', _) => (Token::Greater, 1),
            (b'&', Some(b'&')) => (Token::And, 2),
            (b'&', Some(b'=')) => (Token::AndEqual, 2),
            (b'&', _) => (Token::BitAnd, 1),
            (b'|', Some(b'|')) => (Token::Or, 2),
            (b'|', Some(b'=')) => (Token::OrEqual, 2),
            (b'|', _) => (Token::BitOr, 1),
            (b'^', Some(b'=')) => (Token::XorEqual, 2),
            (b'^', _) => (Token::BitXor, 1),
            (b'~', _) => (Token::BitNot, 1),
            (b'(', _) => (Token::LParen, 1),
            (b')', _) => (Token::RParen, 1),
            (b'{', _) => (Token::LBrace, 1),
            (b'}', _) => (Token::RBrace, 1),
            (b'[', _) => (Token::LBracket, 1),
            (b']', _) => (Token::RBracket, 1),
            (b';', _) => (Token::Semicolon, 1),
            (b',', _) => (Token::Comma, 1),
            (b':', _) => (Token::Colon, 1),
            (b'?', _) => (Token::Question, 1),
            _ => {
                let ch = self.source[start..].chars().next().unwrap_or('?');
                return Err(self.error(start, format!("unexpected character '{}'", ch)));
            }
        };

        self.pos += len;
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(source: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(source);
        let mut out = Vec::new();
        loop {
            let (token, _) = lexer.next_token().unwrap();
            if token == Token::EOF {
                break;
            }
            out.push(token);
        }
        out
    }

    #[test]
    fn test_variable_sigils() {
        let toks = tokens(".@i .count 'arg @menu $@tmp $global$ ##cash #bank plain");
        let names: Vec<_> = toks
            .into_iter()
            .map(|t| match t {
                Token::Ident(s) => s,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(
            names,
            vec![".@i", ".count", "'arg", "@menu", "$@tmp", "$global$", "##cash", "#bank", "plain"]
        );
    }

    #[test]
    fn test_operators_longest_match() {
        assert_eq!(
            tokens("a <<= 1 >> 2 != 3 && b++"),
            vec![
                Token::Ident("a".into()),
                Token::ShlEqual,
                Token::Int(1),
                Token::RightShift,
                Token::Int(2),
                Token::NotEqual,
                Token::Int(3),
                Token::And,
                Token::Ident("b".into()),
                Token::Increment,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(tokens("0 42 0x1F 9223372036854775807"), vec![
            Token::Int(0),
            Token::Int(42),
            Token::Int(31),
            Token::Int(i64::MAX),
        ]);
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(tokens(r#""a\"b\n""#), vec![Token::Str("a\"b\n".into())]);
    }

    #[test]
    fn test_comments_skipped() {
        assert_eq!(
            tokens("// line\nmes /* block\n */ ;"),
            vec![Token::Ident("mes".into()), Token::Semicolon]
        );
    }

    #[test]
    fn test_unterminated_string_reports_start() {
        let mut lexer = Lexer::new("mes \"oops;\n");
        lexer.next_token().unwrap();
        let err = lexer.next_token().unwrap_err();
        assert_eq!(err.offset, 4);
        assert_eq!(err.message, "unterminated string");
    }

    #[test]
    fn test_unterminated_comment() {
        let mut lexer = Lexer::new("/* never closed");
        assert!(lexer.next_token().is_err());
    }

    #[test]
    fn test_bad_number() {
        let mut lexer = Lexer::new("12abc");
        let err = lexer.next_token().unwrap_err();
        assert!(err.message.contains("invalid number"));
    }
}
