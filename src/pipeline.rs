//! Stage sequencing: source text to target assembly.

use crate::codegen::{self, writer};
use crate::config::CompilerConfig;
use crate::error::Error;
use crate::frontend::lexer::{Lexer, Spanned};
use crate::frontend::parser::Parser;
use crate::lang::balance;
use crate::lang::program::Program;
use crate::semantic;
use crate::target;

/// The two assembly texts of one compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub high: String,
    pub target: String,
}

pub fn tokenize(source: &str) -> Result<Vec<Spanned>, Error> {
    Ok(Lexer::new(source).tokenize()?)
}

/// Lexes, parses and checks a compilation unit.
pub fn front_end(source: &str, config: &CompilerConfig) -> Result<Program, Error> {
    let tokens = tokenize(source)?;
    let unit = Parser::new(tokens).parse()?;
    log::info!(
        "parsed {} globals, {} functions, {} calls",
        unit.program.globals.len(),
        unit.program.functions.len(),
        unit.calls.len()
    );

    if let Err(errors) = semantic::check(&unit.program, &unit.calls, &config.externs) {
        for extra in errors.iter().skip(1) {
            log::debug!("also: {}", extra);
        }
        if let Some(first) = errors.into_iter().next() {
            return Err(first.into());
        }
    }
    Ok(unit.program)
}

/// Generates high assembly for a checked program.
pub fn high_assembly(program: &Program, config: &CompilerConfig) -> Result<String, Error> {
    for function in &program.functions {
        balance::check_function(function)?;
    }
    let lines = codegen::generate(program, config.registers)?;
    Ok(writer::render(&lines))
}

pub fn back_end(program: &Program, config: &CompilerConfig) -> Result<Output, Error> {
    let high = high_assembly(program, config)?;
    let target = target::translate(&high)?;
    log::info!("translated to {} lines of target assembly", target.lines().count());
    Ok(Output { high, target })
}

pub fn compile(source: &str, config: &CompilerConfig) -> Result<Output, Error> {
    let program = front_end(source, config)?;
    back_end(&program, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::SemanticError;
    use crate::target::translate_error::TranslateError;

    const PROGRAM: &str = "
        int total = 0;

        int add(int a, int b) {
            return a + b;
        }

        int main() {
            int i;
            for (i = 0; i < 4; i = i + 1) {
                if (i == 2) {
                    report(i);
                } else {
                    total = add(total, i);
                }
            }
            return total;
        }
    ";

    fn config() -> CompilerConfig {
        CompilerConfig::default()
    }

    fn compile_ok(source: &str, config: &CompilerConfig) -> Output {
        match compile(source, config) {
            Ok(output) => output,
            Err(e) => panic!("compilation failed: {}", e),
        }
    }

    #[test]
    fn test_whole_program() {
        let config = config().with_extern("report/1".parse().unwrap());
        let output = compile_ok(PROGRAM, &config);

        assert!(output.high.starts_with("@total: 0\n"));
        assert!(output.high.contains("$add:\n"));
        assert!(output.high.contains("$main:\n"));
        assert!(output.high.contains("    CALL add"));
        assert!(output.high.contains("    CALL report"));
        assert!(!output.high.contains("$report:"));
        assert!(output.high.contains("main.for_0_start:"));

        assert!(output.target.contains("@data total {"));
        assert!(output.target.contains("@code add {"));
        assert!(output.target.contains("   JAL @edx, *add"));
        assert!(output.target.contains("main_for_0_start:"));
        assert!(output.target.contains("@code __init {"));
    }

    #[test]
    fn test_undeclared_call_is_reported() {
        let err = compile(PROGRAM, &config()).unwrap_err();
        assert!(matches!(
            err,
            Error::Semantic(SemanticError::UndeclaredFunction { ref name, .. }) if name == "report"
        ));
    }

    #[test]
    fn test_extern_arity_is_checked() {
        let config = config().with_extern("report/2".parse().unwrap());
        let err = compile(PROGRAM, &config).unwrap_err();
        assert!(matches!(
            err,
            Error::Semantic(SemanticError::ArityMismatch { expected: 2, found: 1, .. })
        ));
    }

    #[test]
    fn test_small_register_pool() {
        let source = "int main() { int x; x = (1 + 2) * (3 + 4) - (5 + 6) * (7 + 8); return x; }";
        let output = compile_ok(source, &config().with_registers(2));
        assert!(output.high.contains("    PUSH r"));
        assert!(output.target.contains("@code main {"));
    }

    #[test]
    fn test_large_pool_does_not_fit_target() {
        let source = "int main() { int x; x = (1 + 2) * (3 + 4) - (5 + 6) * (7 + 8); return x; }";
        let err = compile(source, &config().with_registers(8)).unwrap_err();
        assert!(matches!(
            err,
            Error::Translate(TranslateError::UnsupportedRegister { .. })
        ));
        // the high assembly alone is fine
        let program = front_end(source, &config()).unwrap();
        assert!(high_assembly(&program, &config().with_registers(8)).is_ok());
    }

    #[test]
    fn test_syntax_error_position() {
        let err = compile("int main() { return 1 }", &config()).unwrap_err();
        match err {
            Error::Parser(e) => assert_eq!(e.line, 1),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_back_end_from_artifact() {
        let program = front_end("int main() { return 3; }", &config()).unwrap();
        let bytes = crate::artifact::to_bytes(&program).unwrap();
        let loaded = crate::artifact::from_bytes(&bytes).unwrap();
        assert_eq!(
            back_end(&loaded, &config()).unwrap(),
            back_end(&program, &config()).unwrap()
        );
    }
}
