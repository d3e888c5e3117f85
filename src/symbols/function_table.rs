use std::collections::HashMap;

use super::SymbolError;
use crate::lang::program::Function;

/// Declared functions in source order.
#[derive(Debug, Default)]
pub struct FunctionTable {
    functions: Vec<Function>,
    index: HashMap<String, usize>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a prototype or a definition.
    ///
    /// A definition may follow a prototype with the same arity; two
    /// definitions of one name are rejected.
    pub fn declare(&mut self, function: Function) -> Result<(), SymbolError> {
        match self.index.get(&function.name) {
            Some(&i) => {
                let existing = &mut self.functions[i];
                let found = function.arity();
                if existing.arity() != found {
                    return Err(SymbolError::Conflicting {
                        name: function.name,
                        expected: existing.arity(),
                        found,
                    });
                }
                if existing.is_defined() && function.is_defined() {
                    return Err(SymbolError::Redefined(function.name));
                }
                if function.is_defined() {
                    *existing = function;
                }
                Ok(())
            }
            None => {
                self.index
                    .insert(function.name.clone(), self.functions.len());
                self.functions.push(function);
                Ok(())
            }
        }
    }

    pub fn find(&self, name: &str) -> Option<&Function> {
        self.index.get(name).map(|&i| &self.functions[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Function> {
        self.functions.iter()
    }

    pub fn into_functions(self) -> Vec<Function> {
        self.functions
    }
}
