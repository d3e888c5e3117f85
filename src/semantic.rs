use std::collections::HashMap;

use thiserror::Error;

use crate::frontend::lexer::Span;
use crate::lang::program::Program;
use crate::symbols::call_table::CallTable;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SemanticError {
    #[error("{}:{}: call to undeclared function `{name}`", .span.line, .span.col)]
    UndeclaredFunction { name: String, span: Span },

    #[error(
        "{}:{}: `{name}` takes {expected} argument(s), called with {found}",
        .span.line, .span.col
    )]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
        span: Span,
    },

    #[error("no `main` function defined")]
    MissingMain,

    #[error("`main` must not take parameters, found {0}")]
    MainWithParameters(usize),

    #[error("extern `{0}` conflicts with a function of the same name")]
    ConflictingExtern(String),
}

/// A function supplied by a hand-written assembly library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternFunction {
    pub name: String,
    pub arity: usize,
}

impl std::str::FromStr for ExternFunction {
    type Err = String;

    /// Parses `name/arity`, e.g. `putchar/1`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, arity) = s
            .split_once('/')
            .ok_or_else(|| format!("expected NAME/ARITY, got `{}`", s))?;
        let arity = arity
            .parse::<usize>()
            .map_err(|_| format!("invalid arity in `{}`", s))?;
        if name.is_empty() {
            return Err(format!("missing name in `{}`", s));
        }
        Ok(ExternFunction {
            name: name.to_string(),
            arity,
        })
    }
}

/// Checks every call site against the declared functions and `main`.
///
/// Errors come out in source order; the caller reports the first.
pub fn check(
    program: &Program,
    calls: &CallTable,
    externs: &[ExternFunction],
) -> Result<(), Vec<SemanticError>> {
    let mut errors = Vec::new();
    let mut arities: HashMap<&str, usize> = program
        .functions
        .iter()
        .map(|f| (f.name.as_str(), f.arity()))
        .collect();

    for ext in externs {
        match arities.get(ext.name.as_str()) {
            Some(&arity) if arity != ext.arity => {
                errors.push(SemanticError::ConflictingExtern(ext.name.clone()));
            }
            _ => {
                arities.insert(ext.name.as_str(), ext.arity);
            }
        }
    }

    for call in calls.iter() {
        match arities.get(call.name.as_str()) {
            None => errors.push(SemanticError::UndeclaredFunction {
                name: call.name.clone(),
                span: call.span,
            }),
            Some(&expected) if expected != call.arity => {
                errors.push(SemanticError::ArityMismatch {
                    name: call.name.clone(),
                    expected,
                    found: call.arity,
                    span: call.span,
                })
            }
            Some(_) => {}
        }
    }

    match program.function("main") {
        Some(main) if !main.is_defined() => errors.push(SemanticError::MissingMain),
        Some(main) if main.arity() > 0 => {
            errors.push(SemanticError::MainWithParameters(main.arity()))
        }
        Some(_) => {}
        None => errors.push(SemanticError::MissingMain),
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;
    use crate::frontend::parser::Parser;

    fn check_source(source: &str, externs: &[ExternFunction]) -> Result<(), Vec<SemanticError>> {
        let tokens = Lexer::new(source).tokenize().unwrap();
        let unit = Parser::new(tokens).parse().unwrap();
        check(&unit.program, &unit.calls, externs)
    }

    #[test]
    fn test_valid_program() {
        let source = "int f(int a) { return a; } int main() { return f(1); }";
        assert_eq!(check_source(source, &[]), Ok(()));
    }

    #[test]
    fn test_undeclared_function() {
        let errors = check_source("int main() { g(); return 0; }", &[]).unwrap_err();
        assert!(matches!(
            &errors[0],
            SemanticError::UndeclaredFunction { name, span } if name == "g" && span.line == 1
        ));
    }

    #[test]
    fn test_arity_mismatch() {
        let source = "int f(int a); int main() { return f(1, 2); }";
        let errors = check_source(source, &[]).unwrap_err();
        assert!(matches!(
            &errors[0],
            SemanticError::ArityMismatch { expected: 1, found: 2, .. }
        ));
    }

    #[test]
    fn test_externs_satisfy_calls() {
        let putchar: ExternFunction = "putchar/1".parse().unwrap();
        let source = "int main() { putchar(65); return 0; }";
        assert_eq!(check_source(source, &[putchar]), Ok(()));
    }

    #[test]
    fn test_main_rules() {
        assert_eq!(
            check_source("int f() { return 0; }", &[]),
            Err(vec![SemanticError::MissingMain])
        );
        assert_eq!(
            check_source("int main();", &[]),
            Err(vec![SemanticError::MissingMain])
        );
        assert_eq!(
            check_source("int main(int a) { return a; }", &[]),
            Err(vec![SemanticError::MainWithParameters(1)])
        );
    }

    #[test]
    fn test_extern_parsing() {
        assert_eq!(
            "getc/0".parse::<ExternFunction>(),
            Ok(ExternFunction {
                name: "getc".to_string(),
                arity: 0
            })
        );
        assert!("getc".parse::<ExternFunction>().is_err());
        assert!("/2".parse::<ExternFunction>().is_err());
        assert!("f/x".parse::<ExternFunction>().is_err());
    }
}
