use serde::{Deserialize, Serialize};

use crate::codegen::instr::Mnemonic;
use crate::frontend::token::Token;

/// Expression operators, grouped by precedence level (tightest first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    // =================================================================
    // Level 11: unary prefix
    // =================================================================
    LogicalNot,
    BitwiseNot,
    UnaryPlus,
    UnaryMinus,
    Dereference,
    /// Dereference on the left of `=`: yields the address, not the value.
    AssignmentDereference,

    // Postfix indexing, reduced directly when `]` closes
    OffsetDereference,
    OffsetAssignmentDereference,

    // =================================================================
    // Binary levels 10..1
    // =================================================================
    Multiply,

    Plus,
    Minus,

    ShiftLeft,
    ShiftRight,
    RotateLeft,
    RotateRight,

    Less,
    LessEqual,
    Greater,
    GreaterEqual,

    Equal,
    NotEqual,

    BitwiseAnd,
    BitwiseXor,
    BitwiseOr,

    LogicalAnd,
    LogicalOr,

    // =================================================================
    // Level 0: assignment and argument passing
    // =================================================================
    Assignment,
    ParameterAssignment,
    /// Pushed when a call's bracket opens; becomes a `ParameterAssignment`
    /// once the first argument is complete, or disappears for `f()`.
    ParameterPossibleAssignment,
}

impl Operator {
    pub fn precedence(self) -> i32 {
        use Operator::*;
        match self {
            LogicalNot
            | BitwiseNot
            | UnaryPlus
            | UnaryMinus
            | Dereference
            | AssignmentDereference
            | OffsetDereference
            | OffsetAssignmentDereference => 11,
            Multiply => 10,
            Plus | Minus => 9,
            ShiftLeft | ShiftRight | RotateLeft | RotateRight => 8,
            Less | LessEqual | Greater | GreaterEqual => 7,
            Equal | NotEqual => 6,
            BitwiseAnd => 5,
            BitwiseXor => 4,
            BitwiseOr => 3,
            LogicalAnd => 2,
            LogicalOr => 1,
            Assignment | ParameterAssignment | ParameterPossibleAssignment => 0,
        }
    }

    pub fn is_unary(self) -> bool {
        use Operator::*;
        matches!(
            self,
            LogicalNot | BitwiseNot | UnaryPlus | UnaryMinus | Dereference | AssignmentDereference
        )
    }

    /// Operand count consumed by one application.
    pub fn arity(self) -> usize {
        if self.is_unary() { 1 } else { 2 }
    }

    /// Parameter assignments consume their operands without producing a value.
    pub fn produces_value(self) -> bool {
        !matches!(
            self,
            Operator::ParameterAssignment | Operator::ParameterPossibleAssignment
        )
    }

    /// The instruction a reduction of this operator lowers to.
    ///
    /// `LogicalNot` compares against zero and `UnaryPlus` adds zero, so both
    /// reuse binary instructions with an implicit constant operand.
    pub fn mnemonic(self) -> Mnemonic {
        use Operator::*;
        match self {
            LogicalNot => Mnemonic::Eq,
            BitwiseNot => Mnemonic::Not,
            UnaryPlus => Mnemonic::Add,
            UnaryMinus => Mnemonic::Neg,
            Dereference | OffsetDereference => Mnemonic::Load,
            AssignmentDereference => Mnemonic::Mov,
            OffsetAssignmentDereference => Mnemonic::Add,
            Multiply => Mnemonic::Mul,
            Plus => Mnemonic::Add,
            Minus => Mnemonic::Sub,
            ShiftLeft => Mnemonic::Shl,
            ShiftRight => Mnemonic::Shr,
            RotateLeft => Mnemonic::Rol,
            RotateRight => Mnemonic::Ror,
            Less => Mnemonic::Lt,
            LessEqual => Mnemonic::Lte,
            Greater => Mnemonic::Gt,
            GreaterEqual => Mnemonic::Gte,
            Equal => Mnemonic::Eq,
            NotEqual => Mnemonic::Neq,
            BitwiseAnd | LogicalAnd => Mnemonic::And,
            BitwiseXor => Mnemonic::Xor,
            BitwiseOr | LogicalOr => Mnemonic::Or,
            Assignment => Mnemonic::Mov,
            ParameterAssignment | ParameterPossibleAssignment => Mnemonic::Push,
        }
    }

    /// The assignment form of a dereferencing operator, if it has one.
    pub fn assignment_variant(self) -> Option<Operator> {
        match self {
            Operator::Dereference => Some(Operator::AssignmentDereference),
            Operator::OffsetDereference => Some(Operator::OffsetAssignmentDereference),
            _ => None,
        }
    }

    /// Maps an operator token to its binary (or, for `!`/`~`, unary) form.
    pub fn from_token(token: &Token) -> Option<Operator> {
        use Operator::*;
        Some(match token {
            Token::Bang => LogicalNot,
            Token::Tilde => BitwiseNot,
            Token::Star => Multiply,
            Token::Plus => Plus,
            Token::Minus => Minus,
            Token::ShiftLeft => ShiftLeft,
            Token::ShiftRight => ShiftRight,
            Token::RotateLeft => RotateLeft,
            Token::RotateRight => RotateRight,
            Token::Lt => Less,
            Token::LtEq => LessEqual,
            Token::Gt => Greater,
            Token::GtEq => GreaterEqual,
            Token::EqEq => Equal,
            Token::NotEq => NotEqual,
            Token::Amp => BitwiseAnd,
            Token::Caret => BitwiseXor,
            Token::Pipe => BitwiseOr,
            Token::AmpAmp => LogicalAnd,
            Token::PipePipe => LogicalOr,
            Token::Assign => Assignment,
            _ => return None,
        })
    }

    /// The prefix form of an operator seen where an operand was expected.
    pub fn as_prefix(self) -> Option<Operator> {
        use Operator::*;
        match self {
            Plus | UnaryPlus => Some(UnaryPlus),
            Minus | UnaryMinus => Some(UnaryMinus),
            Multiply | Dereference => Some(Dereference),
            LogicalNot => Some(LogicalNot),
            BitwiseNot => Some(BitwiseNot),
            _ => None,
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use Operator::*;
        let symbol = match self {
            LogicalNot => "!",
            BitwiseNot => "~",
            UnaryPlus => "U+",
            UnaryMinus => "U-",
            Dereference => "U*",
            AssignmentDereference => "U*=",
            OffsetDereference => "[]",
            OffsetAssignmentDereference => "[]=",
            Multiply => "*",
            Plus => "+",
            Minus => "-",
            ShiftLeft => "<<",
            ShiftRight => ">>",
            RotateLeft => "<<<",
            RotateRight => ">>>",
            Less => "<",
            LessEqual => "<=",
            Greater => ">",
            GreaterEqual => ">=",
            Equal => "==",
            NotEqual => "!=",
            BitwiseAnd => "&",
            BitwiseXor => "^",
            BitwiseOr => "|",
            LogicalAnd => "&&",
            LogicalOr => "||",
            Assignment => "=",
            ParameterAssignment => ":=",
            ParameterPossibleAssignment => "?=",
        };
        write!(f, "{}", symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence_levels() {
        assert!(Operator::UnaryMinus.precedence() > Operator::Multiply.precedence());
        assert!(Operator::Multiply.precedence() > Operator::Plus.precedence());
        assert!(Operator::Plus.precedence() > Operator::ShiftLeft.precedence());
        assert!(Operator::ShiftLeft.precedence() > Operator::Less.precedence());
        assert!(Operator::Less.precedence() > Operator::Equal.precedence());
        assert!(Operator::Equal.precedence() > Operator::BitwiseAnd.precedence());
        assert!(Operator::BitwiseAnd.precedence() > Operator::BitwiseXor.precedence());
        assert!(Operator::BitwiseXor.precedence() > Operator::BitwiseOr.precedence());
        assert!(Operator::BitwiseOr.precedence() > Operator::LogicalAnd.precedence());
        assert!(Operator::LogicalAnd.precedence() > Operator::LogicalOr.precedence());
        assert!(Operator::LogicalOr.precedence() > Operator::Assignment.precedence());
        assert_eq!(Operator::ParameterAssignment.precedence(), 0);
    }

    #[test]
    fn test_prefix_promotion() {
        assert_eq!(Operator::Plus.as_prefix(), Some(Operator::UnaryPlus));
        assert_eq!(Operator::Minus.as_prefix(), Some(Operator::UnaryMinus));
        assert_eq!(Operator::Multiply.as_prefix(), Some(Operator::Dereference));
        assert_eq!(Operator::Less.as_prefix(), None);
    }

    #[test]
    fn test_assignment_variants() {
        assert_eq!(
            Operator::Dereference.assignment_variant(),
            Some(Operator::AssignmentDereference)
        );
        assert_eq!(
            Operator::OffsetDereference.assignment_variant(),
            Some(Operator::OffsetAssignmentDereference)
        );
        assert_eq!(Operator::Plus.assignment_variant(), None);
    }

    #[test]
    fn test_mnemonics() {
        assert_eq!(Operator::RotateLeft.mnemonic(), Mnemonic::Rol);
        assert_eq!(Operator::GreaterEqual.mnemonic(), Mnemonic::Gte);
        assert_eq!(Operator::ParameterAssignment.mnemonic(), Mnemonic::Push);
        assert_eq!(Operator::LogicalAnd.mnemonic(), Mnemonic::And);
    }
}
