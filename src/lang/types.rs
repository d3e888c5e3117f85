use serde::{Deserialize, Serialize};

/// Declared type of a variable, constant or function result.
///
/// Every value occupies one machine word; the type only matters for
/// diagnostics and for telling pointers apart from plain words.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Void,
    Int,
    Bool,
    Char,
    Pointer(Box<DataType>),
}

impl DataType {
    pub fn pointer_to(self) -> DataType {
        DataType::Pointer(Box::new(self))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, DataType::Void)
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Void => write!(f, "void"),
            DataType::Int => write!(f, "int"),
            DataType::Bool => write!(f, "bool"),
            DataType::Char => write!(f, "char"),
            DataType::Pointer(inner) => write!(f, "{}*", inner),
        }
    }
}
