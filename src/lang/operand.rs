use serde::{Deserialize, Serialize};

use super::types::DataType;

/// Where a variable lives. Fixed when the declaration is processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Storage {
    /// Offset from the frame pointer: negative for locals, positive for parameters.
    Frame(i64),
    /// File-scope variable addressed by its label.
    Global(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub data_type: DataType,
    pub storage: Storage,
    /// Element count for arrays. An array variable evaluates to its base address.
    pub length: Option<usize>,
}

impl Variable {
    pub fn is_array(&self) -> bool {
        self.length.is_some()
    }

    pub fn is_global(&self) -> bool {
        matches!(self.storage, Storage::Global(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constant {
    pub data_type: DataType,
    pub value: i64,
}

impl Constant {
    pub fn int(value: i64) -> Self {
        Constant {
            data_type: DataType::Int,
            value,
        }
    }

    pub fn bool(value: bool) -> Self {
        Constant {
            data_type: DataType::Bool,
            value: value as i64,
        }
    }

    pub fn char(value: char) -> Self {
        Constant {
            data_type: DataType::Char,
            value: value as i64,
        }
    }
}

/// A call whose result has not been materialized yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallRef {
    pub name: String,
    pub arity: usize,
}

/// An operand of the linear form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operand {
    Variable(Variable),
    Constant(Constant),
    /// Transient value produced by an operator reduction, numbered per expression.
    Intermediate(u32),
    /// Result of a call. Appears once, right after the call's argument pushes.
    ReturnValue(CallRef),
    /// Argument slot `n` of the enclosing call, consumed by a parameter assignment.
    Parameter(usize),
}

impl std::fmt::Display for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Variable(v) => write!(f, "{}", v),
            Operand::Constant(c) => write!(f, "#{}", c.value),
            Operand::Intermediate(n) => write!(f, "%{}", n),
            Operand::ReturnValue(call) => write!(f, "{}/{}()", call.name, call.arity),
            Operand::Parameter(n) => write!(f, "P{}", n),
        }
    }
}
