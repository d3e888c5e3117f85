use std::collections::HashMap;

use super::SymbolError;
use crate::lang::operand::Variable;

/// Variables visible at the current point of the parse, innermost scope last.
///
/// The first scope holds file-scope variables and is never popped.
#[derive(Debug)]
pub struct VariableTable {
    scopes: Vec<HashMap<String, Variable>>,
}

impl Default for VariableTable {
    fn default() -> Self {
        Self::new()
    }
}

impl VariableTable {
    pub fn new() -> Self {
        VariableTable {
            scopes: vec![HashMap::new()],
        }
    }

    pub fn enter_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn exit_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn is_global_scope(&self) -> bool {
        self.scopes.len() == 1
    }

    pub fn depth(&self) -> usize {
        self.scopes.len() - 1
    }

    /// Declares in the innermost scope. Shadowing an outer scope is allowed.
    pub fn declare(&mut self, variable: Variable) -> Result<(), SymbolError> {
        let scope = self
            .scopes
            .last_mut()
            .ok_or_else(|| SymbolError::Redeclared(variable.name.clone()))?;
        if scope.contains_key(&variable.name) {
            return Err(SymbolError::Redeclared(variable.name));
        }
        scope.insert(variable.name.clone(), variable);
        Ok(())
    }

    /// Innermost declaration of `name`.
    pub fn find(&self, name: &str) -> Option<&Variable> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.find(name).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::operand::Storage;
    use crate::lang::types::DataType;

    fn local(name: &str, offset: i64) -> Variable {
        Variable {
            name: name.to_string(),
            data_type: DataType::Int,
            storage: Storage::Frame(offset),
            length: None,
        }
    }

    #[test]
    fn test_shadowing_and_scope_exit() {
        let mut table = VariableTable::new();
        table.declare(local("x", -1)).unwrap();
        table.enter_scope();
        table.declare(local("x", -2)).unwrap();
        assert_eq!(table.find("x").unwrap().storage, Storage::Frame(-2));
        table.exit_scope();
        assert_eq!(table.find("x").unwrap().storage, Storage::Frame(-1));
    }

    #[test]
    fn test_redeclaration_fails() {
        let mut table = VariableTable::new();
        table.declare(local("x", -1)).unwrap();
        assert_eq!(
            table.declare(local("x", -2)),
            Err(SymbolError::Redeclared("x".to_string()))
        );
    }

    #[test]
    fn test_global_scope_is_never_popped() {
        let mut table = VariableTable::new();
        table.exit_scope();
        assert!(table.is_global_scope());
        table.enter_scope();
        assert_eq!(table.depth(), 1);
        table.declare(local("y", -1)).unwrap();
        table.exit_scope();
        assert!(!table.exists("y"));
    }
}
