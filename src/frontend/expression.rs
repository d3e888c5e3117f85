use crate::frontend::expression_error::ExpressionError;
use crate::frontend::token::Token;
use crate::lang::element::Element;
use crate::lang::operand::{CallRef, Constant, Operand, Variable};
use crate::lang::operator::Operator;
use crate::symbols::variable_table::VariableTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// A prefix operator, literal, identifier or `(` may come next.
    ExpectOperand,
    /// A binary operator, `)`, `]`, `,` or `[` may come next.
    ExpectOperator,
    /// An identifier that is not a variable was seen; only `(` may follow.
    CallTarget,
}

#[derive(Debug, Clone)]
struct PendingCall {
    name: String,
    arity: usize,
}

/// Operator and operand stacks of an enclosing context, parked while a
/// bracketed sub-expression is parsed.
#[derive(Debug)]
struct SavedContext {
    operators: Vec<Operator>,
    operands: Vec<Operand>,
    call: Option<PendingCall>,
}

#[derive(Debug)]
struct SavedIndex {
    context: SavedContext,
    /// Round-bracket depth when the `[` opened; `]` must see the same depth.
    bracket_depth: usize,
}

/// Operator-precedence parser turning one expression into linear form.
///
/// The statement driver feeds it one event per token (`add_*`) and collects
/// the result with [`ExpressionParser::retrieve_expression`]. Parsing is
/// iterative: brackets and index expressions park the current stacks in
/// explicit context stacks instead of recursing.
///
/// Every reduction appends its operands followed by its operator and pushes
/// an `Intermediate` placeholder for the result. Placeholders are numbered
/// like stack slots: consuming one frees its number, and the next result
/// takes the lowest free number.
pub struct ExpressionParser {
    state: State,
    operators: Vec<Operator>,
    operands: Vec<Operand>,
    output: Vec<Element>,
    brackets: Vec<SavedContext>,
    indexes: Vec<SavedIndex>,
    call: Option<PendingCall>,
    callee: Option<String>,
    intermediate_count: u32,
}

impl Default for ExpressionParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpressionParser {
    pub fn new() -> Self {
        ExpressionParser {
            state: State::ExpectOperand,
            operators: Vec::new(),
            operands: Vec::new(),
            output: Vec::new(),
            brackets: Vec::new(),
            indexes: Vec::new(),
            call: None,
            callee: None,
            intermediate_count: 0,
        }
    }

    /// Dispatches one expression token to the matching `add_*` event.
    ///
    /// Identifiers are resolved against `variables`: known names become
    /// operands, unknown names start a call.
    pub fn add_token(
        &mut self,
        token: &Token,
        variables: &VariableTable,
    ) -> Result<(), ExpressionError> {
        match token {
            Token::Ident(name) => self.add_identifier(name, variables),
            Token::Integer(value) => self.add_constant(Constant::int(*value)),
            Token::Bool(value) => self.add_constant(Constant::bool(*value)),
            Token::Char(value) => self.add_constant(Constant::char(*value)),
            Token::Assign => self.add_assignment(),
            Token::LParen => self.add_opened_bracket(),
            Token::RParen => self.add_closed_bracket(),
            Token::LBracket => self.add_opened_square_bracket(),
            Token::RBracket => self.add_closed_square_bracket(),
            Token::Comma => self.add_comma(),
            other => match Operator::from_token(other) {
                Some(op) => self.add_operator(op),
                None => Err(ExpressionError::UnexpectedOperand(other.to_string())),
            },
        }
    }

    /// An identifier: a variable operand if declared, otherwise a call target.
    pub fn add_identifier(
        &mut self,
        name: &str,
        variables: &VariableTable,
    ) -> Result<(), ExpressionError> {
        match variables.find(name) {
            Some(variable) => self.add_variable(variable.clone()),
            None => {
                self.expect_operand(name)?;
                self.callee = Some(name.to_string());
                self.state = State::CallTarget;
                Ok(())
            }
        }
    }

    /// A variable that was just declared by the statement being parsed.
    pub fn add_declared_variable(&mut self, variable: Variable) -> Result<(), ExpressionError> {
        self.add_variable(variable)
    }

    pub fn add_variable(&mut self, variable: Variable) -> Result<(), ExpressionError> {
        self.expect_operand(&variable.name)?;
        self.operands.push(Operand::Variable(variable));
        self.state = State::ExpectOperator;
        Ok(())
    }

    pub fn add_constant(&mut self, constant: Constant) -> Result<(), ExpressionError> {
        self.expect_operand(&constant.value.to_string())?;
        self.operands.push(Operand::Constant(constant));
        self.state = State::ExpectOperator;
        Ok(())
    }

    /// An operator token in its binary form.
    ///
    /// Where an operand is expected, `+`, `-` and `*` are promoted to their
    /// prefix forms and pushed without reducing anything.
    pub fn add_operator(&mut self, operator: Operator) -> Result<(), ExpressionError> {
        match self.state {
            State::ExpectOperand => {
                let prefix = operator
                    .as_prefix()
                    .ok_or(ExpressionError::UnexpectedOperator(operator))?;
                self.operators.push(prefix);
                Ok(())
            }
            State::ExpectOperator if !operator.is_unary() && operator != Operator::Assignment => {
                self.reduce_while(operator.precedence())?;
                self.operators.push(operator);
                self.state = State::ExpectOperand;
                Ok(())
            }
            State::ExpectOperator if operator == Operator::Assignment => self.add_assignment(),
            _ => Err(self.unexpected_after_callee(ExpressionError::UnexpectedOperator(operator))),
        }
    }

    /// `=`. Right-associative: pending assignments stay on the stack.
    ///
    /// The left side must be a plain variable or the result of the
    /// dereference just emitted, which is rewritten to its store form.
    pub fn add_assignment(&mut self) -> Result<(), ExpressionError> {
        if self.state != State::ExpectOperator {
            return Err(self.unexpected_after_callee(ExpressionError::UnexpectedOperator(
                Operator::Assignment,
            )));
        }
        self.reduce_while(1)?;

        match self.operands.last() {
            Some(Operand::Variable(v)) if !v.is_array() => {}
            Some(Operand::Intermediate(_)) => {
                let rewritten = match self.output.last() {
                    Some(Element::Operator(op)) => op.assignment_variant(),
                    _ => None,
                };
                match (rewritten, self.output.last_mut()) {
                    (Some(variant), Some(last)) => *last = Element::Operator(variant),
                    _ => return Err(ExpressionError::NotAssignable),
                }
            }
            _ => return Err(ExpressionError::NotAssignable),
        }

        self.operators.push(Operator::Assignment);
        self.state = State::ExpectOperand;
        Ok(())
    }

    /// `(`: either a grouping bracket or the start of a call's argument list.
    pub fn add_opened_bracket(&mut self) -> Result<(), ExpressionError> {
        match self.state {
            State::CallTarget => {
                let name = self.callee.take().ok_or(ExpressionError::UnexpectedBracket('('))?;
                self.save_context(Some(PendingCall { name, arity: 0 }));
                self.operators.push(Operator::ParameterPossibleAssignment);
                self.operands.push(Operand::Parameter(0));
                self.state = State::ExpectOperand;
                Ok(())
            }
            State::ExpectOperand => {
                self.save_context(None);
                Ok(())
            }
            State::ExpectOperator => Err(ExpressionError::UnexpectedBracket('(')),
        }
    }

    /// `)`: closes a group or a call.
    pub fn add_closed_bracket(&mut self) -> Result<(), ExpressionError> {
        if self.brackets.is_empty() {
            return Err(self.unexpected_after_callee(ExpressionError::UnexpectedBracket(')')));
        }
        if let Some(index) = self.indexes.last() {
            if index.bracket_depth == self.brackets.len() {
                return Err(ExpressionError::InterleavedBrackets);
            }
        }

        match self.call.take() {
            Some(mut call) => {
                let collapsed = self.state == State::ExpectOperand
                    && call.arity == 0
                    && self.operators == [Operator::ParameterPossibleAssignment]
                    && self.operands == [Operand::Parameter(0)];

                if !collapsed {
                    if self.state != State::ExpectOperator {
                        return Err(self.unexpected_after_callee(
                            ExpressionError::UnexpectedBracket(')'),
                        ));
                    }
                    self.finish_argument()?;
                    call.arity += 1;
                }

                self.output.push(Element::Operand(Operand::ReturnValue(CallRef {
                    name: call.name,
                    arity: call.arity,
                })));
                self.restore_context()?;
                self.push_intermediate();
            }
            None => {
                if self.state != State::ExpectOperator {
                    return Err(self.unexpected_after_callee(ExpressionError::UnexpectedBracket(')')));
                }
                self.reduce_while(-1)?;
                let value = self.single_operand()?;
                self.restore_context()?;
                self.operands.push(value);
            }
        }

        self.state = State::ExpectOperator;
        Ok(())
    }

    /// `,` between call arguments.
    pub fn add_comma(&mut self) -> Result<(), ExpressionError> {
        if self.state != State::ExpectOperator {
            return Err(self.unexpected_after_callee(ExpressionError::UnexpectedComma));
        }
        if self.indexes.last().map(|i| i.bracket_depth) == Some(self.brackets.len()) {
            return Err(ExpressionError::UnexpectedComma);
        }
        let arity = match self.call.as_mut() {
            Some(call) => {
                call.arity += 1;
                call.arity
            }
            None => return Err(ExpressionError::UnexpectedComma),
        };
        self.finish_argument()?;

        self.operators.push(Operator::ParameterAssignment);
        self.operands.push(Operand::Parameter(arity));
        self.state = State::ExpectOperand;
        Ok(())
    }

    /// `[` after an indexable operand.
    pub fn add_opened_square_bracket(&mut self) -> Result<(), ExpressionError> {
        if self.state != State::ExpectOperator {
            return Err(self.unexpected_after_callee(ExpressionError::UnexpectedBracket('[')));
        }
        let bracket_depth = self.brackets.len();
        let context = SavedContext {
            operators: std::mem::take(&mut self.operators),
            operands: std::mem::take(&mut self.operands),
            call: self.call.take(),
        };
        self.indexes.push(SavedIndex {
            context,
            bracket_depth,
        });
        self.state = State::ExpectOperand;
        Ok(())
    }

    /// `]`: reduces `base[index]` to an offset dereference.
    pub fn add_closed_square_bracket(&mut self) -> Result<(), ExpressionError> {
        if self.state != State::ExpectOperator {
            return Err(self.unexpected_after_callee(ExpressionError::UnexpectedBracket(']')));
        }
        let saved = self
            .indexes
            .pop()
            .ok_or(ExpressionError::UnexpectedBracket(']'))?;
        if saved.bracket_depth != self.brackets.len() {
            return Err(ExpressionError::InterleavedBrackets);
        }

        self.reduce_while(-1)?;
        let index = self.single_operand()?;

        self.operators = saved.context.operators;
        self.operands = saved.context.operands;
        self.call = saved.context.call;

        let base = self
            .operands
            .pop()
            .ok_or(ExpressionError::MissingOperand(Operator::OffsetDereference))?;
        self.emit(vec![base, index], Operator::OffsetDereference);
        self.state = State::ExpectOperator;
        Ok(())
    }

    /// True when the expression could end at this point.
    pub fn is_expression_valid(&self) -> bool {
        self.state == State::ExpectOperator
            && self.brackets.is_empty()
            && self.indexes.is_empty()
            && self.callee.is_none()
    }

    /// True while inside a bracket, an index or right after a call target.
    pub fn is_nested(&self) -> bool {
        !self.brackets.is_empty() || !self.indexes.is_empty() || self.state == State::CallTarget
    }

    /// True when nothing has been fed since the last retrieval.
    pub fn is_empty(&self) -> bool {
        self.state == State::ExpectOperand
            && self.operators.is_empty()
            && self.operands.is_empty()
            && !self.is_nested()
    }

    /// Finishes the expression and returns its linear form.
    ///
    /// Exactly one value must remain. A plain variable or constant is
    /// appended to the output; a computed result is already there.
    pub fn retrieve_expression(&mut self) -> Result<Vec<Element>, ExpressionError> {
        if let Some(name) = self.callee.take() {
            return Err(ExpressionError::UndeclaredIdentifier(name));
        }
        if !self.is_expression_valid() {
            return Err(ExpressionError::Incomplete);
        }
        self.reduce_while(-1)?;

        let value = self.single_operand()?;
        let expected_count = match value {
            Operand::Intermediate(_) => 1,
            _ => 0,
        };
        if self.intermediate_count != expected_count {
            return Err(ExpressionError::Incomplete);
        }
        if matches!(value, Operand::Variable(_) | Operand::Constant(_)) {
            self.output.push(Element::Operand(value));
        }

        let output = std::mem::take(&mut self.output);
        self.reset();
        Ok(output)
    }

    /// Drops all state, e.g. after an error.
    pub fn reset(&mut self) {
        *self = ExpressionParser::new();
    }

    fn expect_operand(&self, text: &str) -> Result<(), ExpressionError> {
        match self.state {
            State::ExpectOperand => Ok(()),
            _ => Err(self.unexpected_after_callee(ExpressionError::UnexpectedOperand(
                text.to_string(),
            ))),
        }
    }

    /// A call target followed by anything but `(` is an unknown variable.
    fn unexpected_after_callee(&self, error: ExpressionError) -> ExpressionError {
        match (&self.state, &self.callee) {
            (State::CallTarget, Some(name)) => ExpressionError::UndeclaredIdentifier(name.clone()),
            _ => error,
        }
    }

    fn save_context(&mut self, call: Option<PendingCall>) {
        let context = SavedContext {
            operators: std::mem::take(&mut self.operators),
            operands: std::mem::take(&mut self.operands),
            call: std::mem::replace(&mut self.call, call),
        };
        self.brackets.push(context);
    }

    fn restore_context(&mut self) -> Result<(), ExpressionError> {
        let context = self
            .brackets
            .pop()
            .ok_or(ExpressionError::UnexpectedBracket(')'))?;
        self.operators = context.operators;
        self.operands = context.operands;
        self.call = context.call;
        Ok(())
    }

    /// Reduces the current argument and emits its parameter assignment.
    fn finish_argument(&mut self) -> Result<(), ExpressionError> {
        self.reduce_while(0)?;
        match self.operators.last() {
            Some(Operator::ParameterAssignment | Operator::ParameterPossibleAssignment) => {
                self.reduce_one()
            }
            _ => Err(ExpressionError::Incomplete),
        }
    }

    /// Pops and applies operators while their precedence is at least `min`.
    /// Parameter assignments are a floor and are never reduced here.
    fn reduce_while(&mut self, min: i32) -> Result<(), ExpressionError> {
        while let Some(&top) = self.operators.last() {
            let is_parameter = matches!(
                top,
                Operator::ParameterAssignment | Operator::ParameterPossibleAssignment
            );
            if is_parameter || top.precedence() < min {
                break;
            }
            self.reduce_one()?;
        }
        Ok(())
    }

    fn reduce_one(&mut self) -> Result<(), ExpressionError> {
        let operator = match self.operators.pop() {
            Some(Operator::ParameterPossibleAssignment) => Operator::ParameterAssignment,
            Some(op) => op,
            None => return Err(ExpressionError::Incomplete),
        };
        let arity = operator.arity();
        if self.operands.len() < arity {
            return Err(ExpressionError::MissingOperand(operator));
        }
        let args = self.operands.split_off(self.operands.len() - arity);
        self.emit(args, operator);
        Ok(())
    }

    fn emit(&mut self, args: Vec<Operand>, operator: Operator) {
        for arg in &args {
            if matches!(arg, Operand::Intermediate(_)) {
                self.intermediate_count = self.intermediate_count.saturating_sub(1);
            }
        }
        self.output.extend(args.into_iter().map(Element::Operand));
        self.output.push(Element::Operator(operator));
        if operator.produces_value() {
            self.push_intermediate();
        }
    }

    fn push_intermediate(&mut self) {
        self.operands
            .push(Operand::Intermediate(self.intermediate_count));
        self.intermediate_count += 1;
    }

    fn single_operand(&mut self) -> Result<Operand, ExpressionError> {
        if self.operands.len() != 1 || !self.operators.is_empty() {
            return Err(ExpressionError::Incomplete);
        }
        self.operands.pop().ok_or(ExpressionError::Incomplete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;
    use crate::lang::operand::Storage;
    use crate::lang::types::DataType;

    fn table(names: &[&str]) -> VariableTable {
        let mut variables = VariableTable::new();
        for (i, name) in names.iter().enumerate() {
            let length = if name.starts_with("arr") { Some(4) } else { None };
            variables
                .declare(Variable {
                    name: name.to_string(),
                    data_type: DataType::Int,
                    storage: Storage::Frame(-(i as i64) - 1),
                    length,
                })
                .unwrap();
        }
        variables
    }

    fn parse(source: &str, names: &[&str]) -> Result<Vec<Element>, ExpressionError> {
        let variables = table(names);
        let mut parser = ExpressionParser::new();
        let tokens = Lexer::new(source).tokenize().unwrap();
        for spanned in tokens {
            if matches!(spanned.token, Token::Eof) {
                break;
            }
            parser.add_token(&spanned.token, &variables)?;
        }
        parser.retrieve_expression()
    }

    fn linear(source: &str, names: &[&str]) -> String {
        parse(source, names)
            .unwrap()
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_multiplication_binds_tighter() {
        assert_eq!(linear("a + b * c", &["a", "b", "c"]), "b c * a %0 +");
        assert_eq!(linear("a * b + c", &["a", "b", "c"]), "a b * %0 c +");
    }

    #[test]
    fn test_left_associative_chain() {
        assert_eq!(linear("a - b - c", &["a", "b", "c"]), "a b - %0 c -");
    }

    #[test]
    fn test_assignment_scenario() {
        assert_eq!(linear("x = 1 + 2 * 3", &["x"]), "#2 #3 * #1 %0 + x %0 =");
    }

    #[test]
    fn test_chained_assignment_is_right_associative() {
        assert_eq!(linear("a = b = c", &["a", "b", "c"]), "b c = a %0 =");
    }

    #[test]
    fn test_precedence_ladder() {
        assert_eq!(
            linear("a || b && c | d ^ e & f == g < h << i", &[
                "a", "b", "c", "d", "e", "f", "g", "h", "i"
            ]),
            "h i << g %0 < f %0 == e %0 & d %0 ^ c %0 | b %0 && a %0 ||"
        );
    }

    #[test]
    fn test_unary_promotion() {
        assert_eq!(linear("-a * b", &["a", "b"]), "a U- %0 b *");
        assert_eq!(linear("a - -b", &["a", "b"]), "b U- a %0 -");
        assert_eq!(linear("*p + 1", &["p"]), "p U* %0 #1 +");
        assert_eq!(linear("!a == ~b", &["a", "b"]), "a ! b ~ %0 %1 ==");
        assert_eq!(linear("- - a", &["a"]), "a U- %0 U-");
    }

    #[test]
    fn test_brackets_override_precedence() {
        assert_eq!(linear("(a + b) * c", &["a", "b", "c"]), "a b + %0 c *");
        assert_eq!(linear("((a))", &["a"]), "a");
    }

    #[test]
    fn test_single_operand() {
        assert_eq!(linear("42", &[]), "#42");
        assert_eq!(linear("true", &[]), "#1");
        assert_eq!(linear("'A'", &[]), "#65");
    }

    #[test]
    fn test_call_without_arguments() {
        assert_eq!(linear("f()", &[]), "f/0()");
        assert_eq!(linear("x = f() + 1", &["x"]), "f/0() %0 #1 + x %0 =");
    }

    #[test]
    fn test_call_argument_order() {
        assert_eq!(
            linear("f(a, b + 1, g())", &["a", "b"]),
            "P0 a := b #1 + P1 %0 := g/0() P2 %0 := f/3()"
        );
    }

    #[test]
    fn test_nested_call_keeps_outer_context() {
        assert_eq!(
            linear("x = f(g(a), b) * 2", &["x", "a", "b"]),
            "P0 a := g/1() P0 %0 := P1 b := f/2() %0 #2 * x %0 ="
        );
    }

    #[test]
    fn test_indexing() {
        assert_eq!(linear("arr[i + 1]", &["arr", "i"]), "i #1 + arr %0 []");
        assert_eq!(linear("-arr[0]", &["arr"]), "arr #0 [] %0 U-");
    }

    #[test]
    fn test_indexed_assignment_is_rewritten() {
        assert_eq!(linear("arr[2] = 7", &["arr"]), "arr #2 []= %0 #7 =");
        assert_eq!(linear("*p = 7", &["p"]), "p U*= %0 #7 =");
    }

    #[test]
    fn test_assignment_to_non_lvalue_fails() {
        assert_eq!(parse("a + b = 1", &["a", "b"]), Err(ExpressionError::NotAssignable));
        assert_eq!(parse("1 = a", &["a"]), Err(ExpressionError::NotAssignable));
        assert_eq!(parse("arr = 1", &["arr"]), Err(ExpressionError::NotAssignable));
    }

    #[test]
    fn test_malformed_sequences() {
        assert!(matches!(
            parse("a + < b", &["a", "b"]),
            Err(ExpressionError::UnexpectedOperator(_))
        ));
        assert!(matches!(
            parse("a b", &["a", "b"]),
            Err(ExpressionError::UnexpectedOperand(_))
        ));
        assert_eq!(parse("(a", &["a"]), Err(ExpressionError::Incomplete));
        assert_eq!(parse("a +", &["a"]), Err(ExpressionError::Incomplete));
        assert_eq!(parse("a, b", &["a", "b"]), Err(ExpressionError::UnexpectedComma));
        assert_eq!(parse("f(a,)", &["a"]), Err(ExpressionError::UnexpectedBracket(')')));
        assert_eq!(
            parse("arr[(1])", &["arr"]),
            Err(ExpressionError::InterleavedBrackets)
        );
    }

    #[test]
    fn test_unknown_identifier() {
        assert_eq!(
            parse("y + 1", &[]),
            Err(ExpressionError::UndeclaredIdentifier("y".to_string()))
        );
        assert_eq!(
            parse("y", &[]),
            Err(ExpressionError::UndeclaredIdentifier("y".to_string()))
        );
    }

    #[test]
    fn test_parser_is_reusable_after_retrieve() {
        let variables = table(&["a"]);
        let mut parser = ExpressionParser::new();
        parser.add_token(&Token::Ident("a".to_string()), &variables).unwrap();
        assert!(parser.is_expression_valid());
        parser.retrieve_expression().unwrap();
        assert!(parser.is_empty());
        assert!(parser.retrieve_expression().is_err());
    }
}
