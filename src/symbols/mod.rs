//! Symbol tables filled by the statement driver.
//!
//! - `variable_table`: scoped variables with their storage locations
//! - `function_table`: declared functions and their linear form
//! - `call_table`: every call site, checked after parsing

pub mod call_table;
pub mod function_table;
pub mod variable_table;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SymbolError {
    #[error("redeclaration of `{0}` in the same scope")]
    Redeclared(String),

    #[error("redefinition of function `{0}`")]
    Redefined(String),

    #[error("conflicting declarations of `{name}`: {expected} vs {found} parameters")]
    Conflicting {
        name: String,
        expected: usize,
        found: usize,
    },
}
