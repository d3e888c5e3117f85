use serde::{Deserialize, Serialize};

use super::operand::Operand;
use super::operator::Operator;

/// Structural markers of the linear form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Marker {
    ExpressionEnd,
    FunctionStart,
    FunctionEnd,
    ScopeIncrement,
    ScopeDecrement,
    /// Ends a condition: branch away when its value is zero.
    EqualZeroJump,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Keyword {
    Return,
    If,
    ElseIf,
    Else,
    While,
    For,
    Break,
}

/// One element of the flat linear form.
///
/// Expressions are postfix: each reduction contributes its operands and then
/// its operator. Nesting exists only implicitly, through the markers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Element {
    Operand(Operand),
    Operator(Operator),
    Marker(Marker),
    Keyword(Keyword),
}

impl Element {
    /// True for elements that terminate an expression.
    pub fn ends_expression(&self) -> bool {
        matches!(
            self,
            Element::Marker(Marker::ExpressionEnd) | Element::Marker(Marker::EqualZeroJump)
        )
    }
}

impl From<Operand> for Element {
    fn from(operand: Operand) -> Self {
        Element::Operand(operand)
    }
}

impl From<Operator> for Element {
    fn from(operator: Operator) -> Self {
        Element::Operator(operator)
    }
}

impl std::fmt::Display for Marker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Marker::ExpressionEnd => "EXPRESSION_END",
            Marker::FunctionStart => "FUNCTION_START",
            Marker::FunctionEnd => "FUNCTION_END",
            Marker::ScopeIncrement => "SCOPE_INCREMENT",
            Marker::ScopeDecrement => "SCOPE_DECREMENT",
            Marker::EqualZeroJump => "EQUAL_ZERO_JUMP",
        };
        write!(f, "{}", name)
    }
}

impl std::fmt::Display for Keyword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Keyword::Return => "return",
            Keyword::If => "if",
            Keyword::ElseIf => "else if",
            Keyword::Else => "else",
            Keyword::While => "while",
            Keyword::For => "for",
            Keyword::Break => "break",
        };
        write!(f, "{}", name)
    }
}

impl std::fmt::Display for Element {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Element::Operand(o) => write!(f, "{}", o),
            Element::Operator(o) => write!(f, "{}", o),
            Element::Marker(m) => write!(f, "{}", m),
            Element::Keyword(k) => write!(f, "{}", k),
        }
    }
}
