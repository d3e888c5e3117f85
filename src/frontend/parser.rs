use crate::frontend::expression::ExpressionParser;
use crate::frontend::lexer::{Span, Spanned};
use crate::frontend::parser_error::ParserError;
use crate::frontend::token::Token;
use crate::lang::element::{Element, Keyword, Marker};
use crate::lang::operand::{Constant, Operand, Storage, Variable};
use crate::lang::program::{Function, Global, Program};
use crate::lang::types::DataType;
use crate::symbols::call_table::CallTable;
use crate::symbols::function_table::FunctionTable;
use crate::symbols::variable_table::VariableTable;

/// Output of a successful parse.
#[derive(Debug)]
pub struct ParsedUnit {
    pub program: Program,
    pub calls: CallTable,
}

/// Token that ends the expression being collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminator {
    /// `;`
    Semicolon,
    /// `)` of an `if`/`while` condition or a `for` header
    Bracket,
    /// `,` or `;` after a declarator
    Declarator,
}

/// Recursive-descent statement driver for the C subset.
///
/// The driver walks declarations and statements, appends keyword and marker
/// elements to the current function's linear form, and hands every
/// expression token to the `ExpressionParser`.
///
/// Storage is assigned here:
/// - file-scope variables are addressed by their name,
/// - parameter `i` of `n` sits at `ebp + (n - i + 1)`, above the saved frame
///   pointer and the return address,
/// - locals get consecutive negative offsets; an array of `N` words reserves
///   `N` slots and its variable is the lowest address.
pub struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    /// Span of the most recently consumed token.
    last_span: Option<Span>,

    variables: VariableTable,
    functions: FunctionTable,
    calls: CallTable,
    globals: Vec<Global>,
    expression: ExpressionParser,

    /// Linear form of the function being parsed.
    body: Vec<Element>,
    frame_size: usize,
    loop_depth: usize,
    return_type: DataType,
}

impl Parser {
    pub fn new(tokens: Vec<Spanned>) -> Self {
        Parser {
            tokens,
            pos: 0,
            last_span: None,
            variables: VariableTable::new(),
            functions: FunctionTable::new(),
            calls: CallTable::new(),
            globals: Vec::new(),
            expression: ExpressionParser::new(),
            body: Vec::new(),
            frame_size: 0,
            loop_depth: 0,
            return_type: DataType::Void,
        }
    }

    fn current(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn advance(&mut self) -> Option<&Spanned> {
        let token = self.tokens.get(self.pos);
        if let Some(s) = token {
            self.last_span = Some(s.span);
        }
        self.pos += 1;
        token
    }

    fn span(&self) -> Span {
        self.current()
            .map(|s| s.span)
            .or(self.last_span)
            .unwrap_or(Span { line: 1, col: 1 })
    }

    /// Constructs a `ParserError` at the current token, or at the last
    /// consumed one when the input has run out.
    fn error(&self, message: &str) -> ParserError {
        self.error_at(self.span(), message)
    }

    fn error_at(&self, span: Span, message: &str) -> ParserError {
        ParserError {
            message: message.to_string(),
            line: span.line,
            col: span.col,
        }
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == Some(token)
    }

    fn expect(&mut self, token: Token, context: &str) -> Result<Span, ParserError> {
        if self.check(&token) {
            let span = self.span();
            self.advance();
            Ok(span)
        } else {
            let found = self
                .peek()
                .map(|t| t.to_string())
                .unwrap_or_else(|| "EOF".to_string());
            Err(self.error(&format!("expected `{}` {}, found `{}`", token, context, found)))
        }
    }

    fn expect_ident(&mut self, context: &str) -> Result<(String, Span), ParserError> {
        let span = self.span();
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.advance();
                Ok((name, span))
            }
            _ => Err(self.error(&format!("expected identifier {}", context))),
        }
    }

    /// Parses a complete translation unit.
    ///
    /// ```text
    /// program := (global | function)* EOF
    /// ```
    pub fn parse(mut self) -> Result<ParsedUnit, ParserError> {
        while let Some(spanned) = self.current() {
            if matches!(spanned.token, Token::Eof) {
                break;
            }

            let base = self.parse_base_type()?;
            let data_type = self.parse_pointers(base);
            let (name, span) = self.expect_ident("after type")?;

            if self.check(&Token::LParen) {
                self.parse_function(data_type, name, span)?;
            } else {
                self.parse_global(data_type, name, span)?;
            }
        }

        Ok(ParsedUnit {
            program: Program {
                globals: self.globals,
                functions: self.functions.into_functions(),
            },
            calls: self.calls,
        })
    }

    fn parse_base_type(&mut self) -> Result<DataType, ParserError> {
        let data_type = match self.peek() {
            Some(Token::Int) => DataType::Int,
            Some(Token::BoolType) => DataType::Bool,
            Some(Token::CharType) => DataType::Char,
            Some(Token::Void) => DataType::Void,
            _ => return Err(self.error("expected a type")),
        };
        self.advance();
        Ok(data_type)
    }

    fn parse_pointers(&mut self, mut data_type: DataType) -> DataType {
        while self.check(&Token::Star) {
            self.advance();
            data_type = data_type.pointer_to();
        }
        data_type
    }

    /// Parses a file-scope variable.
    ///
    /// ```text
    /// global := type ident ('=' '-'? literal)? ';'
    /// ```
    ///
    /// Initializers must be constants; they become the variable's data word.
    fn parse_global(
        &mut self,
        data_type: DataType,
        name: String,
        span: Span,
    ) -> Result<(), ParserError> {
        if data_type.is_void() {
            return Err(self.error_at(span, &format!("variable `{}` declared void", name)));
        }
        if self.check(&Token::LBracket) {
            return Err(self.error("global arrays are not supported"));
        }

        let mut value = 0;
        if self.check(&Token::Assign) {
            self.advance();
            let negative = self.check(&Token::Minus);
            if negative {
                self.advance();
            }
            value = match self.peek() {
                Some(Token::Integer(n)) => *n,
                Some(Token::Bool(b)) => *b as i64,
                Some(Token::Char(c)) => *c as i64,
                _ => return Err(self.error("global initializer must be a constant")),
            };
            self.advance();
            if negative {
                value = -value;
            }
        }
        self.expect(Token::Semicolon, "after global declaration")?;

        self.variables
            .declare(Variable {
                name: name.clone(),
                data_type: data_type.clone(),
                storage: Storage::Global(name.clone()),
                length: None,
            })
            .map_err(|e| self.error_at(span, &e.to_string()))?;
        self.globals.push(Global {
            name,
            data_type,
            value,
        });
        Ok(())
    }

    /// Parses a function prototype or definition.
    ///
    /// ```text
    /// function := type ident '(' params? ')' (block | ';')
    /// params   := 'void' | type ident (',' type ident)*
    /// ```
    fn parse_function(
        &mut self,
        return_type: DataType,
        name: String,
        span: Span,
    ) -> Result<(), ParserError> {
        self.expect(Token::LParen, "after function name")?;

        let mut declared = Vec::new();
        if self.check(&Token::Void)
            && matches!(self.tokens.get(self.pos + 1).map(|s| &s.token), Some(Token::RParen))
        {
            self.advance();
        }
        while !self.check(&Token::RParen) {
            let base = self.parse_base_type()?;
            let data_type = self.parse_pointers(base);
            if data_type.is_void() {
                return Err(self.error("parameter declared void"));
            }
            let (param, param_span) = self.expect_ident("for parameter")?;
            declared.push((param, data_type, param_span));
            if !self.check(&Token::RParen) {
                self.expect(Token::Comma, "between parameters")?;
            }
        }
        self.expect(Token::RParen, "after parameters")?;

        let count = declared.len() as i64;
        let parameters: Vec<(Variable, Span)> = declared
            .into_iter()
            .enumerate()
            .map(|(i, (param, data_type, param_span))| {
                let variable = Variable {
                    name: param,
                    data_type,
                    storage: Storage::Frame(count - i as i64 + 1),
                    length: None,
                };
                (variable, param_span)
            })
            .collect();

        if self.check(&Token::Semicolon) {
            self.advance();
            let function = Function {
                name,
                return_type,
                parameters: parameters.into_iter().map(|(v, _)| v).collect(),
                body: None,
                frame_size: 0,
            };
            return self
                .functions
                .declare(function)
                .map_err(|e| self.error_at(span, &e.to_string()));
        }

        self.expect(Token::LBrace, "to open function body")?;

        self.variables.enter_scope();
        for (variable, param_span) in &parameters {
            self.variables
                .declare(variable.clone())
                .map_err(|e| self.error_at(*param_span, &e.to_string()))?;
        }
        self.body = vec![Element::Marker(Marker::FunctionStart)];
        self.frame_size = 0;
        self.loop_depth = 0;
        self.return_type = return_type.clone();

        while !self.check(&Token::RBrace) {
            if self.check(&Token::Eof) {
                return Err(self.error("unexpected EOF, expected `}`"));
            }
            self.parse_statement()?;
        }
        self.advance(); // consume '}'
        self.variables.exit_scope();
        self.body.push(Element::Marker(Marker::FunctionEnd));

        log::debug!(
            "function `{}`: {} elements, {} local words",
            name,
            self.body.len(),
            self.frame_size
        );

        let function = Function {
            name,
            return_type,
            parameters: parameters.into_iter().map(|(v, _)| v).collect(),
            body: Some(std::mem::take(&mut self.body)),
            frame_size: self.frame_size,
        };
        self.functions
            .declare(function)
            .map_err(|e| self.error_at(span, &e.to_string()))
    }

    /// Parses one statement of a function body.
    fn parse_statement(&mut self) -> Result<(), ParserError> {
        let token = match self.peek() {
            Some(token) => token.clone(),
            None => return Err(self.error("unexpected end of input")),
        };

        match token {
            t if t.is_type() => {
                for expression in self.parse_declaration()? {
                    self.push_expression(expression, Marker::ExpressionEnd);
                }
                Ok(())
            }
            Token::Return => self.parse_return(),
            Token::Break => {
                if self.loop_depth == 0 {
                    return Err(self.error("`break` outside of a loop"));
                }
                self.advance();
                self.expect(Token::Semicolon, "after `break`")?;
                self.body.push(Element::Keyword(Keyword::Break));
                Ok(())
            }
            Token::If => self.parse_if(),
            Token::While => self.parse_while(),
            Token::For => self.parse_for(),
            Token::LBrace => self.parse_body(),
            Token::Semicolon => {
                self.advance();
                Ok(())
            }
            Token::Else => Err(self.error("`else` without a matching `if`")),
            _ => {
                let expression = self.parse_expression(Terminator::Semicolon)?;
                self.expect(Token::Semicolon, "after expression")?;
                self.push_expression(expression, Marker::ExpressionEnd);
                Ok(())
            }
        }
    }

    /// Parses a local declaration and returns the initializer expressions.
    ///
    /// ```text
    /// declaration := type declarator (',' declarator)* ';'
    /// declarator  := '*'* ident ('[' integer ']')? ('=' expr)?
    /// ```
    fn parse_declaration(&mut self) -> Result<Vec<Vec<Element>>, ParserError> {
        let base = self.parse_base_type()?;
        let mut initializers = Vec::new();

        loop {
            let data_type = self.parse_pointers(base.clone());
            let (name, span) = self.expect_ident("in declaration")?;
            if data_type.is_void() {
                return Err(self.error_at(span, &format!("variable `{}` declared void", name)));
            }

            let mut length = None;
            if self.check(&Token::LBracket) {
                self.advance();
                let size = match self.peek() {
                    Some(Token::Integer(n)) if *n > 0 => *n as usize,
                    _ => return Err(self.error("array size must be a positive integer")),
                };
                self.advance();
                self.expect(Token::RBracket, "after array size")?;
                length = Some(size);
            }

            self.frame_size += length.unwrap_or(1);
            let variable = Variable {
                name: name.clone(),
                data_type,
                storage: Storage::Frame(-(self.frame_size as i64)),
                length,
            };
            self.variables
                .declare(variable.clone())
                .map_err(|e| self.error_at(span, &e.to_string()))?;

            if self.check(&Token::Assign) {
                if length.is_some() {
                    return Err(self.error("array initializers are not supported"));
                }
                let assign_span = self.span();
                self.advance();
                let started = self
                    .expression
                    .add_declared_variable(variable)
                    .and_then(|_| self.expression.add_assignment());
                if let Err(e) = started {
                    self.expression.reset();
                    return Err(self.error_at(assign_span, &e.to_string()));
                }
                initializers.push(self.parse_expression(Terminator::Declarator)?);
            } else if !self.check(&Token::Comma) {
                self.expect(Token::Semicolon, "after declaration")?;
                break;
            } else {
                self.advance();
                continue;
            }

            // The initializer stopped at `,` or `;` without consuming it.
            match self.peek() {
                Some(Token::Comma) => {
                    self.advance();
                }
                _ => {
                    self.expect(Token::Semicolon, "after declaration")?;
                    break;
                }
            }
        }

        Ok(initializers)
    }

    /// ```text
    /// return := 'return' expr? ';'
    /// ```
    fn parse_return(&mut self) -> Result<(), ParserError> {
        let span = self.span();
        self.advance(); // consume 'return'
        self.body.push(Element::Keyword(Keyword::Return));

        if self.check(&Token::Semicolon) {
            if !self.return_type.is_void() {
                return Err(self.error_at(
                    span,
                    &format!("`return` without a value in a function returning {}", self.return_type),
                ));
            }
            self.advance();
            self.body.push(Element::Marker(Marker::ExpressionEnd));
            return Ok(());
        }

        if self.return_type.is_void() {
            return Err(self.error_at(span, "`return` with a value in a void function"));
        }
        let expression = self.parse_expression(Terminator::Semicolon)?;
        self.expect(Token::Semicolon, "after `return` value")?;
        self.push_expression(expression, Marker::ExpressionEnd);
        Ok(())
    }

    /// ```text
    /// if := 'if' '(' expr ')' body ('else' 'if' '(' expr ')' body)* ('else' body)?
    /// ```
    ///
    /// `else if` first emits `ELSE`, which is rewritten in place to `ELSE_IF`
    /// as soon as the `if` is seen.
    fn parse_if(&mut self) -> Result<(), ParserError> {
        self.advance(); // consume 'if'
        self.body.push(Element::Keyword(Keyword::If));
        self.parse_condition("after `if`")?;
        self.parse_body()?;

        while self.check(&Token::Else) {
            self.advance();
            self.body.push(Element::Keyword(Keyword::Else));

            if self.check(&Token::If) {
                self.advance();
                if let Some(last) = self.body.last_mut() {
                    *last = Element::Keyword(Keyword::ElseIf);
                }
                self.parse_condition("after `else if`")?;
                self.parse_body()?;
            } else {
                self.parse_body()?;
                break;
            }
        }
        Ok(())
    }

    /// ```text
    /// while := 'while' '(' expr ')' body
    /// ```
    fn parse_while(&mut self) -> Result<(), ParserError> {
        self.advance(); // consume 'while'
        self.body.push(Element::Keyword(Keyword::While));
        self.parse_condition("after `while`")?;

        self.loop_depth += 1;
        let result = self.parse_body();
        self.loop_depth -= 1;
        result
    }

    /// Parses a `for` loop.
    ///
    /// ```text
    /// for := 'for' '(' (declaration | expr? ';') expr? ';' expr? ')' body
    /// ```
    ///
    /// Emits `FOR init EXPRESSION_END cond EQUAL_ZERO_JUMP incr EXPRESSION_END body`.
    /// Declarations with several initializers run all but the last before
    /// the `FOR` keyword. A missing condition is the constant 1.
    fn parse_for(&mut self) -> Result<(), ParserError> {
        self.advance(); // consume 'for'
        self.expect(Token::LParen, "after `for`")?;
        self.variables.enter_scope();

        let mut init = if self.peek().map(|t| t.is_type()).unwrap_or(false) {
            self.parse_declaration()?
        } else {
            let expression = self.parse_optional_expression(Terminator::Semicolon)?;
            self.expect(Token::Semicolon, "after `for` initializer")?;
            expression.into_iter().collect()
        };
        let last_init = init.pop();
        for expression in init {
            self.push_expression(expression, Marker::ExpressionEnd);
        }

        self.body.push(Element::Keyword(Keyword::For));
        match last_init {
            Some(expression) => self.push_expression(expression, Marker::ExpressionEnd),
            None => self.body.push(Element::Marker(Marker::ExpressionEnd)),
        }

        let condition = self
            .parse_optional_expression(Terminator::Semicolon)?
            .unwrap_or_else(|| vec![Element::Operand(Operand::Constant(Constant::int(1)))]);
        self.expect(Token::Semicolon, "after `for` condition")?;
        self.push_expression(condition, Marker::EqualZeroJump);

        match self.parse_optional_expression(Terminator::Bracket)? {
            Some(increment) => self.push_expression(increment, Marker::ExpressionEnd),
            None => self.body.push(Element::Marker(Marker::ExpressionEnd)),
        }
        self.expect(Token::RParen, "after `for` header")?;

        self.loop_depth += 1;
        let result = self.parse_body();
        self.loop_depth -= 1;
        self.variables.exit_scope();
        result
    }

    /// `'(' expr ')'` followed by `EQUAL_ZERO_JUMP`.
    fn parse_condition(&mut self, context: &str) -> Result<(), ParserError> {
        self.expect(Token::LParen, context)?;
        let condition = self.parse_expression(Terminator::Bracket)?;
        self.expect(Token::RParen, "after condition")?;
        self.push_expression(condition, Marker::EqualZeroJump);
        Ok(())
    }

    /// A braced block or a single statement, wrapped in scope markers.
    fn parse_body(&mut self) -> Result<(), ParserError> {
        self.body.push(Element::Marker(Marker::ScopeIncrement));
        self.variables.enter_scope();

        if self.check(&Token::LBrace) {
            self.advance();
            while !self.check(&Token::RBrace) {
                if self.check(&Token::Eof) {
                    return Err(self.error("unexpected EOF, expected `}`"));
                }
                self.parse_statement()?;
            }
            self.advance(); // consume '}'
        } else {
            self.parse_statement()?;
        }

        self.variables.exit_scope();
        self.body.push(Element::Marker(Marker::ScopeDecrement));
        Ok(())
    }

    fn push_expression(&mut self, expression: Vec<Element>, end: Marker) {
        self.body.extend(expression);
        self.body.push(Element::Marker(end));
    }

    fn parse_expression(&mut self, terminator: Terminator) -> Result<Vec<Element>, ParserError> {
        match self.parse_optional_expression(terminator)? {
            Some(expression) => Ok(expression),
            None => Err(self.error("expected expression")),
        }
    }

    /// Feeds tokens to the expression parser up to (not including) the
    /// terminator at bracket depth zero.
    fn parse_optional_expression(
        &mut self,
        terminator: Terminator,
    ) -> Result<Option<Vec<Element>>, ParserError> {
        let start = self.span();

        loop {
            let (token, span) = match self.current() {
                Some(s) => (s.token.clone(), s.span),
                None => return Err(self.error("unexpected end of input in expression")),
            };

            let at_end = !self.expression.is_nested()
                && match (&token, terminator) {
                    (Token::Semicolon, Terminator::Semicolon | Terminator::Declarator) => true,
                    (Token::Comma, Terminator::Declarator) => true,
                    (Token::RParen, Terminator::Bracket) => true,
                    _ => false,
                };
            if at_end {
                break;
            }

            match &token {
                Token::Eof | Token::LBrace | Token::RBrace | Token::Semicolon => {
                    self.expression.reset();
                    return Err(self.error_at(span, &format!("unexpected `{}` in expression", token)));
                }
                t if t.is_type() => {
                    self.expression.reset();
                    return Err(self.error_at(span, &format!("unexpected type `{}` in expression", t)));
                }
                _ => {}
            }

            if let Err(e) = self.expression.add_token(&token, &self.variables) {
                self.expression.reset();
                return Err(self.error_at(span, &e.to_string()));
            }
            self.advance();
        }

        if self.expression.is_empty() {
            return Ok(None);
        }

        let span = self.span();
        let expression = match self.expression.retrieve_expression() {
            Ok(expression) => expression,
            Err(e) => {
                self.expression.reset();
                return Err(self.error_at(span, &e.to_string()));
            }
        };

        for element in &expression {
            if let Element::Operand(Operand::ReturnValue(call)) = element {
                self.calls.record(&call.name, call.arity, start);
            }
        }
        Ok(Some(expression))
    }
}
