use crate::lang::operator::Operator;

/// An event reached the expression parser in a state that cannot accept it.
///
/// The statement driver attaches the offending token's position when it
/// turns one of these into a `ParserError`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExpressionError {
    #[error("malformed expression: unexpected operand `{0}`")]
    UnexpectedOperand(String),

    #[error("malformed expression: unexpected operator `{0}`")]
    UnexpectedOperator(Operator),

    #[error("malformed expression: unexpected `{0}`")]
    UnexpectedBracket(char),

    #[error("malformed expression: `,` outside of a call")]
    UnexpectedComma,

    #[error("malformed expression: missing operand for `{0}`")]
    MissingOperand(Operator),

    #[error("malformed expression: left side of `=` is not assignable")]
    NotAssignable,

    #[error("malformed expression: `[` and `(` closed out of order")]
    InterleavedBrackets,

    #[error("malformed expression: expression is incomplete")]
    Incomplete,

    #[error("use of undeclared identifier `{0}`")]
    UndeclaredIdentifier(String),
}
