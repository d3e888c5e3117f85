use serde::{Deserialize, Serialize};

use super::element::Element;
use super::operand::Variable;
use super::types::DataType;

/// A file-scope variable with its constant initial value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Global {
    pub name: String,
    pub data_type: DataType,
    pub value: i64,
}

/// One function: its signature plus the linear form of its body.
///
/// Prototypes (declarations without a body) have `body == None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub return_type: DataType,
    pub parameters: Vec<Variable>,
    pub body: Option<Vec<Element>>,
    /// Words reserved below the frame pointer for locals.
    pub frame_size: usize,
}

impl Function {
    pub fn arity(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_defined(&self) -> bool {
        self.body.is_some()
    }
}

/// A whole compilation unit in linear form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub globals: Vec<Global>,
    pub functions: Vec<Function>,
}

impl Program {
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }
}
