//! Tokenization for the streaming query language.
//!
//! The lexer is a single-pass byte reader handing out one token per
//! [`Lexer::next_token`] call. Runs of whitespace collapse into a single
//! space token so clause parsers can reassemble expression text with its
//! original spacing. String literals keep their surrounding quotes; the
//! parser strips them where needed.

/// Token types recognized by the query lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    // Keywords
    Select,
    From,
    Where,
    Group,
    By,
    As,
    With,
    And,
    Or,
    Order,
    Timestamp, // TIMESTAMP property in WITH clause
    TimeUnit,  // TIMEUNIT property in WITH clause

    // Window keywords
    Tumbling, // TUMBLINGWINDOW
    Sliding,  // SLIDINGWINDOW
    Counting, // COUNTINGWINDOW
    Session,  // SESSIONWINDOW

    // Literals and identifiers
    Ident,
    Number,
    String,

    // Punctuation
    Comma,
    LParen,
    RParen,

    // Arithmetic operators
    Plus,
    Minus,
    Asterisk,
    Slash,

    // Comparison operators
    Eq,       // = or ==
    NotEq,    // !=
    Lt,       // <
    LtEq,     // <=
    Gt,       // >
    GtEq,     // >=

    // A collapsed run of whitespace
    Space,

    // End of input
    Eof,
}

impl TokenType {
    /// Window-call keywords are handled uniformly wherever one can appear.
    pub fn is_window_keyword(&self) -> bool {
        matches!(
            self,
            TokenType::Tumbling | TokenType::Sliding | TokenType::Counting | TokenType::Session
        )
    }
}

/// A token with its type, lexeme, and byte position in the query text.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    pub value: String,
    pub position: usize,
}

impl Token {
    fn new(token_type: TokenType, value: impl Into<String>, position: usize) -> Token {
        Token {
            token_type,
            value: value.into(),
            position,
        }
    }
}

/// Single-pass lexer over the query text.
///
/// State is mutable and consumed token by token; restart by constructing a
/// new lexer over the same text.
pub struct Lexer {
    input: Vec<u8>,
    /// Position of `ch`.
    pos: usize,
    /// Position of the next unread byte.
    read_pos: usize,
    ch: u8,
}

impl Lexer {
    pub fn new(input: &str) -> Lexer {
        let mut lexer = Lexer {
            input: input.as_bytes().to_vec(),
            pos: 0,
            read_pos: 0,
            ch: 0,
        };
        lexer.read_char();
        lexer
    }

    /// Produce the next token. Unrecognized bytes are skipped by yielding
    /// end-of-input.
    pub fn next_token(&mut self) -> Token {
        if is_whitespace(self.ch) {
            return self.read_space();
        }

        let position = self.pos;
        match self.ch {
            0 => Token::new(TokenType::Eof, "", position),
            b',' => {
                self.read_char();
                Token::new(TokenType::Comma, ",", position)
            }
            b'(' => {
                self.read_char();
                Token::new(TokenType::LParen, "(", position)
            }
            b')' => {
                self.read_char();
                Token::new(TokenType::RParen, ")", position)
            }
            b'+' => {
                self.read_char();
                Token::new(TokenType::Plus, "+", position)
            }
            b'-' => {
                self.read_char();
                Token::new(TokenType::Minus, "-", position)
            }
            b'*' => {
                self.read_char();
                Token::new(TokenType::Asterisk, "*", position)
            }
            b'/' => {
                self.read_char();
                Token::new(TokenType::Slash, "/", position)
            }
            b'=' => {
                if self.peek_char() == b'=' {
                    self.read_char();
                    self.read_char();
                    Token::new(TokenType::Eq, "==", position)
                } else {
                    self.read_char();
                    Token::new(TokenType::Eq, "=", position)
                }
            }
            b'>' => {
                if self.peek_char() == b'=' {
                    self.read_char();
                    self.read_char();
                    Token::new(TokenType::GtEq, ">=", position)
                } else {
                    self.read_char();
                    Token::new(TokenType::Gt, ">", position)
                }
            }
            b'<' => {
                if self.peek_char() == b'=' {
                    self.read_char();
                    self.read_char();
                    Token::new(TokenType::LtEq, "<=", position)
                } else {
                    self.read_char();
                    Token::new(TokenType::Lt, "<", position)
                }
            }
            b'!' if self.peek_char() == b'=' => {
                self.read_char();
                self.read_char();
                Token::new(TokenType::NotEq, "!=", position)
            }
            b'\'' => Token::new(TokenType::String, self.read_string(), position),
            _ if is_letter(self.ch) => {
                let ident = self.read_identifier();
                self.lookup_ident_at(&ident, position)
            }
            _ if is_digit(self.ch) => Token::new(TokenType::Number, self.read_number(), position),
            _ => {
                self.read_char();
                Token::new(TokenType::Eof, "", position)
            }
        }
    }

    /// Byte after the current one, without consuming anything.
    pub fn peek_char(&self) -> u8 {
        if self.read_pos >= self.input.len() {
            0
        } else {
            self.input[self.read_pos]
        }
    }

    /// Consume whitespace without producing a token.
    pub fn skip_whitespace(&mut self) {
        while is_whitespace(self.ch) {
            self.read_char();
        }
    }

    /// Scan backwards from the current position over letters to recover the
    /// most recently consumed identifier. Used to detect a window keyword
    /// that terminated the WHERE clause.
    pub fn read_previous_identifier(&self) -> String {
        let end = self.pos;
        let mut start = end;
        while start > 0 && is_letter(self.input[start - 1]) {
            start -= 1;
        }
        String::from_utf8_lossy(&self.input[start..end]).into_owned()
    }

    /// Classify an identifier against the keyword table,
    /// case-insensitively.
    pub fn lookup_ident(&self, ident: &str) -> Token {
        self.lookup_ident_at(ident, self.pos)
    }

    fn lookup_ident_at(&self, ident: &str, position: usize) -> Token {
        let token_type = match ident.to_ascii_uppercase().as_str() {
            "SELECT" => TokenType::Select,
            "FROM" => TokenType::From,
            "WHERE" => TokenType::Where,
            "GROUP" => TokenType::Group,
            "BY" => TokenType::By,
            "AS" => TokenType::As,
            "WITH" => TokenType::With,
            "AND" => TokenType::And,
            "OR" => TokenType::Or,
            "ORDER" => TokenType::Order,
            "TIMESTAMP" => TokenType::Timestamp,
            "TIMEUNIT" => TokenType::TimeUnit,
            "TUMBLINGWINDOW" => TokenType::Tumbling,
            "SLIDINGWINDOW" => TokenType::Sliding,
            "COUNTINGWINDOW" => TokenType::Counting,
            "SESSIONWINDOW" => TokenType::Session,
            _ => TokenType::Ident,
        };
        Token::new(token_type, ident, position)
    }

    fn read_char(&mut self) {
        if self.read_pos >= self.input.len() {
            self.ch = 0;
        } else {
            self.ch = self.input[self.read_pos];
        }
        self.pos = self.read_pos;
        self.read_pos += 1;
    }

    fn read_identifier(&mut self) -> String {
        let start = self.pos;
        while is_letter(self.ch) {
            self.read_char();
        }
        String::from_utf8_lossy(&self.input[start..self.pos]).into_owned()
    }

    fn read_number(&mut self) -> String {
        let start = self.pos;
        while is_digit(self.ch) || self.ch == b'.' {
            self.read_char();
        }
        String::from_utf8_lossy(&self.input[start..self.pos]).into_owned()
    }

    /// Read a single-quoted string literal, quotes included in the lexeme.
    fn read_string(&mut self) -> String {
        let start = self.pos;
        self.read_char();
        loop {
            if self.ch == b'\'' {
                self.read_char();
                break;
            }
            if self.ch == 0 {
                break;
            }
            self.read_char();
        }
        String::from_utf8_lossy(&self.input[start..self.pos]).into_owned()
    }

    /// Collapse a run of whitespace into one space token.
    fn read_space(&mut self) -> Token {
        let position = self.pos;
        while is_whitespace(self.ch) {
            self.read_char();
        }
        Token::new(TokenType::Space, " ", position)
    }
}

fn is_letter(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_'
}

fn is_digit(ch: u8) -> bool {
    ch.is_ascii_digit()
}

fn is_whitespace(ch: u8) -> bool {
    matches!(ch, b' ' | b'\t' | b'\n' | b'\r')
}
