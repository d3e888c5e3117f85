#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Integer(i64),
    Bool(bool),
    Char(char),

    // Keywords
    Return,
    If,
    Else,
    While,
    For,
    Break,

    // Types
    Int,
    BoolType,
    CharType,
    Void,

    // Arithmetic and bitwise
    Plus,
    Minus,
    Star,
    ShiftLeft,
    ShiftRight,
    RotateLeft,
    RotateRight,
    Amp,
    Pipe,
    Caret,
    Tilde,

    // Comparison
    EqEq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,

    // Logic
    AmpAmp,
    PipePipe,
    Bang,

    Assign,
    Semicolon,
    Comma,

    // Delimiters
    LParen,   // (
    RParen,   // )
    LBracket, // [
    RBracket, // ]
    LBrace,   // {
    RBrace,   // }

    Ident(std::string::String),

    Eof,
}

impl Token {
    /// Returns true if this token names a declaration type.
    pub fn is_type(&self) -> bool {
        matches!(
            self,
            Token::Int | Token::BoolType | Token::CharType | Token::Void
        )
    }

    /// Returns true if this token can appear as an expression operator.
    pub fn is_operator(&self) -> bool {
        matches!(
            self,
            Token::Plus
                | Token::Minus
                | Token::Star
                | Token::ShiftLeft
                | Token::ShiftRight
                | Token::RotateLeft
                | Token::RotateRight
                | Token::Amp
                | Token::Pipe
                | Token::Caret
                | Token::Tilde
                | Token::EqEq
                | Token::NotEq
                | Token::Lt
                | Token::Gt
                | Token::LtEq
                | Token::GtEq
                | Token::AmpAmp
                | Token::PipePipe
                | Token::Bang
        )
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Integer(n) => write!(f, "{}", n),
            Token::Bool(b) => write!(f, "{}", b),
            Token::Char(c) => write!(f, "{:?}", c),
            Token::Return => write!(f, "return"),
            Token::If => write!(f, "if"),
            Token::Else => write!(f, "else"),
            Token::While => write!(f, "while"),
            Token::For => write!(f, "for"),
            Token::Break => write!(f, "break"),
            Token::Int => write!(f, "int"),
            Token::BoolType => write!(f, "bool"),
            Token::CharType => write!(f, "char"),
            Token::Void => write!(f, "void"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::ShiftLeft => write!(f, "<<"),
            Token::ShiftRight => write!(f, ">>"),
            Token::RotateLeft => write!(f, "<<<"),
            Token::RotateRight => write!(f, ">>>"),
            Token::Amp => write!(f, "&"),
            Token::Pipe => write!(f, "|"),
            Token::Caret => write!(f, "^"),
            Token::Tilde => write!(f, "~"),
            Token::EqEq => write!(f, "=="),
            Token::NotEq => write!(f, "!="),
            Token::Lt => write!(f, "<"),
            Token::Gt => write!(f, ">"),
            Token::LtEq => write!(f, "<="),
            Token::GtEq => write!(f, ">="),
            Token::AmpAmp => write!(f, "&&"),
            Token::PipePipe => write!(f, "||"),
            Token::Bang => write!(f, "!"),
            Token::Assign => write!(f, "="),
            Token::Semicolon => write!(f, ";"),
            Token::Comma => write!(f, ","),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::Ident(s) => write!(f, "{}", s),
            Token::Eof => write!(f, "EOF"),
        }
    }
}
