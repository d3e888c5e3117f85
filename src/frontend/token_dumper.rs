use crate::frontend::lexer::Spanned;
use crate::frontend::token::Token;

pub struct TokenDumper {
    pub color: bool,
    pub show_debug_repr: bool, // if false, prints the source spelling instead
}

impl Default for TokenDumper {
    fn default() -> Self {
        Self {
            color: true,
            show_debug_repr: true,
        }
    }
}

impl TokenDumper {
    // ANSI colors
    const RESET: &'static str = "\x1b[0m";
    const DIM: &'static str = "\x1b[2m";
    const GRN: &'static str = "\x1b[32m";
    const YEL: &'static str = "\x1b[33m";
    const CYN: &'static str = "\x1b[36m";
    const MAG: &'static str = "\x1b[35m";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn no_color(mut self) -> Self {
        self.color = false;
        self
    }

    pub fn pretty(mut self) -> Self {
        self.show_debug_repr = false;
        self
    }

    pub fn dump(&self, tokens: &[Spanned]) {
        for s in tokens {
            println!("{}", self.format_one(s));
        }
    }

    pub fn format_one(&self, s: &Spanned) -> String {
        let line = s.span.line;
        let col = s.span.col;

        let kind = self.kind(&s.token);
        let colr = if self.color { self.color(&s.token) } else { "" };
        let reset = if self.color { Self::RESET } else { "" };

        if self.show_debug_repr {
            format!(
                "[{:02}:{:02}] {}{:<8} {:?}{}",
                line, col, colr, kind, s.token, reset
            )
        } else {
            format!(
                "[{:02}:{:02}] {}{:<8} {}{}",
                line, col, colr, kind, s.token, reset
            )
        }
    }

    fn kind(&self, t: &Token) -> &'static str {
        use Token::*;
        match t {
            Eof => "EOF",

            // literals
            Integer(_) => "INT",
            Bool(_) => "BOOL",
            Char(_) => "CHAR",

            // names
            Ident(_) => "IDENT",

            Int | BoolType | CharType | Void => "TYPE",
            Return | If | Else | While | For | Break => "KEYWORD",

            // structure
            LParen | RParen | LBracket | RBracket => "BRACKET",
            LBrace | RBrace => "BRACE",
            Semicolon | Comma => "PUNCT",
            Assign => "ASSIGN",

            EqEq | NotEq | Lt | LtEq | Gt | GtEq => "CMP",

            // everything else is an operator
            _ => "OP",
        }
    }

    fn color(&self, t: &Token) -> &'static str {
        use Token::*;
        match t {
            Eof | Semicolon | Comma => Self::DIM,
            Char(_) => Self::GRN,
            Integer(_) | Bool(_) => Self::CYN,
            Ident(_) => Self::YEL,
            t if t.is_operator() => Self::MAG,
            Assign => Self::MAG,
            _ => Self::RESET,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;

    #[test]
    fn test_plain_format() {
        let tokens = Lexer::new("x = 'a';").tokenize().unwrap();
        let dumper = TokenDumper::new().no_color().pretty();
        let lines: Vec<String> = tokens.iter().map(|t| dumper.format_one(t)).collect();
        assert_eq!(lines[0], "[01:01] IDENT    x");
        assert_eq!(lines[1], "[01:03] ASSIGN   =");
        assert_eq!(lines[2], "[01:05] CHAR     'a'");
        assert_eq!(lines[4], "[01:09] EOF      EOF");
    }

    #[test]
    fn test_debug_format_is_colored() {
        let tokens = Lexer::new("1").tokenize().unwrap();
        let line = TokenDumper::new().format_one(&tokens[0]);
        assert!(line.starts_with("[01:01] \x1b[36mINT"));
        assert!(line.contains("Integer(1)"));
    }
}
