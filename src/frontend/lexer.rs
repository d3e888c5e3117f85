use crate::frontend::token::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub line: usize,
    pub col: usize,
}

#[derive(Debug, Clone)]
pub struct Spanned {
    pub token: Token,
    pub span: Span,
}

#[derive(Debug)]
pub struct LexerError {
    pub message: String,
    pub line: usize,
    pub col: usize,
}

impl std::fmt::Display for LexerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.col, self.message)
    }
}

impl std::error::Error for LexerError {}

pub struct Lexer {
    source: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            source: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn current(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    fn peek(&self) -> Option<char> {
        self.source.get(self.pos + 1).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.source.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.current();
        if ch == Some('\n') {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        self.pos += 1;
        ch
    }

    fn span(&self) -> Span {
        Span {
            line: self.line,
            col: self.col,
        }
    }

    fn error(&self, message: impl Into<String>, span: Span) -> LexerError {
        LexerError {
            message: message.into(),
            line: span.line,
            col: span.col,
        }
    }

    /// Skips whitespace, comments and preprocessor lines.
    fn skip_trivia(&mut self) -> Result<(), LexerError> {
        loop {
            match (self.current(), self.peek()) {
                (Some(ch), _) if ch.is_whitespace() => {
                    self.advance();
                }
                (Some('/'), Some('/')) | (Some('#'), _) => {
                    while let Some(ch) = self.current() {
                        if ch == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                (Some('/'), Some('*')) => {
                    let start = self.span();
                    self.advance();
                    self.advance();
                    loop {
                        match (self.current(), self.peek()) {
                            (Some('*'), Some('/')) => {
                                self.advance();
                                self.advance();
                                break;
                            }
                            (Some(_), _) => {
                                self.advance();
                            }
                            (None, _) => {
                                return Err(self.error("unterminated block comment", start));
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn read_number(&mut self) -> Result<Token, LexerError> {
        let start = self.span();

        // Hex: 0x... or 0X...
        if self.current() == Some('0') && matches!(self.peek(), Some('x') | Some('X')) {
            self.advance(); // '0'
            self.advance(); // 'x' or 'X'

            let mut hex = String::new();
            while let Some(ch) = self.current() {
                if ch.is_ascii_hexdigit() {
                    hex.push(ch);
                    self.advance();
                } else {
                    break;
                }
            }

            if hex.is_empty() {
                return Err(self.error("expected hex digits after 0x", start));
            }

            let value = i64::from_str_radix(&hex, 16)
                .map_err(|_| self.error(format!("invalid hex number: 0x{}", hex), start))?;
            return Ok(Token::Integer(value));
        }

        let mut digits = String::new();
        while let Some(ch) = self.current() {
            if ch.is_ascii_digit() {
                digits.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        if self
            .current()
            .map(|c| c.is_alphabetic() || c == '_')
            .unwrap_or(false)
        {
            return Err(self.error(format!("invalid suffix on integer {}", digits), start));
        }

        let value: i64 = digits
            .parse()
            .map_err(|_| self.error(format!("invalid integer: {}", digits), start))?;
        Ok(Token::Integer(value))
    }

    /// Reads a character literal such as `'a'`, `'\n'` or `'\101'`.
    fn read_char(&mut self) -> Result<Token, LexerError> {
        let start = self.span();
        self.advance(); // opening quote

        let value = match self.current() {
            Some('\\') => {
                self.advance();
                match self.current() {
                    Some('n') => {
                        self.advance();
                        '\n'
                    }
                    Some('t') => {
                        self.advance();
                        '\t'
                    }
                    Some('r') => {
                        self.advance();
                        '\r'
                    }
                    Some('\\') => {
                        self.advance();
                        '\\'
                    }
                    Some('\'') => {
                        self.advance();
                        '\''
                    }
                    Some('"') => {
                        self.advance();
                        '"'
                    }
                    Some(ch) if ch.is_digit(8) => {
                        let mut code = 0u32;
                        let mut count = 0;
                        while let Some(d) = self.current().and_then(|c| c.to_digit(8)) {
                            if count == 3 {
                                break;
                            }
                            code = code * 8 + d;
                            count += 1;
                            self.advance();
                        }
                        char::from_u32(code).ok_or_else(|| {
                            self.error(format!("invalid character code: {}", code), start)
                        })?
                    }
                    Some(ch) => {
                        return Err(self.error(
                            format!("unknown escape sequence: \\{}", ch),
                            self.span(),
                        ));
                    }
                    None => {
                        return Err(self.error("unexpected EOF in escape sequence", self.span()));
                    }
                }
            }
            Some('\'') | Some('\n') | None => {
                return Err(self.error("empty or unterminated character literal", start));
            }
            Some(ch) => {
                self.advance();
                ch
            }
        };

        if self.current() != Some('\'') {
            return Err(self.error("unterminated character literal", start));
        }
        self.advance();
        Ok(Token::Char(value))
    }

    fn read_identifier(&mut self) -> Token {
        let mut ident = String::new();
        while let Some(ch) = self.current() {
            if ch.is_alphanumeric() || ch == '_' {
                ident.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        match ident.as_str() {
            "true" => Token::Bool(true),
            "false" => Token::Bool(false),

            "return" => Token::Return,
            "if" => Token::If,
            "else" => Token::Else,
            "while" => Token::While,
            "for" => Token::For,
            "break" => Token::Break,

            "int" => Token::Int,
            "bool" => Token::BoolType,
            "char" => Token::CharType,
            "void" => Token::Void,

            _ => Token::Ident(ident),
        }
    }

    /// Longest-match operator scan: `<<<` wins over `<<`, which wins over `<`.
    fn read_operator(&mut self) -> Option<Token> {
        let ch = self.current()?;
        let next = self.peek();
        let third = self.peek_at(2);

        let (token, width) = match (ch, next, third) {
            ('<', Some('<'), Some('<')) => (Token::RotateLeft, 3),
            ('>', Some('>'), Some('>')) => (Token::RotateRight, 3),
            ('<', Some('<'), _) => (Token::ShiftLeft, 2),
            ('>', Some('>'), _) => (Token::ShiftRight, 2),
            ('<', Some('='), _) => (Token::LtEq, 2),
            ('>', Some('='), _) => (Token::GtEq, 2),
            ('=', Some('='), _) => (Token::EqEq, 2),
            ('!', Some('='), _) => (Token::NotEq, 2),
            ('&', Some('&'), _) => (Token::AmpAmp, 2),
            ('|', Some('|'), _) => (Token::PipePipe, 2),
            ('<', _, _) => (Token::Lt, 1),
            ('>', _, _) => (Token::Gt, 1),
            ('=', _, _) => (Token::Assign, 1),
            ('!', _, _) => (Token::Bang, 1),
            ('&', _, _) => (Token::Amp, 1),
            ('|', _, _) => (Token::Pipe, 1),
            ('+', _, _) => (Token::Plus, 1),
            ('-', _, _) => (Token::Minus, 1),
            ('*', _, _) => (Token::Star, 1),
            ('^', _, _) => (Token::Caret, 1),
            ('~', _, _) => (Token::Tilde, 1),
            ('(', _, _) => (Token::LParen, 1),
            (')', _, _) => (Token::RParen, 1),
            ('[', _, _) => (Token::LBracket, 1),
            (']', _, _) => (Token::RBracket, 1),
            ('{', _, _) => (Token::LBrace, 1),
            ('}', _, _) => (Token::RBrace, 1),
            (';', _, _) => (Token::Semicolon, 1),
            (',', _, _) => (Token::Comma, 1),
            _ => return None,
        };

        for _ in 0..width {
            self.advance();
        }
        Some(token)
    }

    pub fn tokenize(&mut self) -> Result<Vec<Spanned>, LexerError> {
        let mut tokens = Vec::new();

        loop {
            self.skip_trivia()?;
            let span = self.span();

            match self.current() {
                None => {
                    tokens.push(Spanned {
                        token: Token::Eof,
                        span,
                    });
                    break;
                }
                Some('\'') => {
                    let token = self.read_char()?;
                    tokens.push(Spanned { token, span });
                }
                Some(ch) if ch.is_ascii_digit() => {
                    let token = self.read_number()?;
                    tokens.push(Spanned { token, span });
                }
                Some(ch) if ch.is_alphabetic() || ch == '_' => {
                    let token = self.read_identifier();
                    tokens.push(Spanned { token, span });
                }
                Some(ch) => {
                    if let Some(token) = self.read_operator() {
                        tokens.push(Spanned { token, span });
                    } else {
                        return Err(self.error(format!("unexpected character: '{}'", ch), span));
                    }
                }
            }
        }

        log::debug!("scanned {} tokens", tokens.len());
        Ok(tokens)
    }
}
