use std::fmt::Write;

use crate::lang::element::{Element, Marker};
use crate::lang::program::{Function, Program};

/// Renders a program's linear form, one expression per line.
///
/// `indent` is repeated once per open scope.
pub fn dump_program(program: &Program, indent: &str) -> String {
    let mut out = String::new();

    if !program.globals.is_empty() {
        out.push_str("globals:\n");
        for global in &program.globals {
            let _ = writeln!(
                out,
                "{}{} {} = {}",
                indent, global.data_type, global.name, global.value
            );
        }
        out.push('\n');
    }

    for function in &program.functions {
        dump_function(&mut out, function, indent);
    }
    out
}

fn dump_function(out: &mut String, function: &Function, indent: &str) {
    let params: Vec<String> = function
        .parameters
        .iter()
        .map(|p| format!("{} {}", p.data_type, p.name))
        .collect();
    let _ = write!(
        out,
        "{} {}({})",
        function.return_type,
        function.name,
        params.join(", ")
    );

    let Some(body) = &function.body else {
        out.push_str(";\n\n");
        return;
    };
    let _ = writeln!(out, " [frame {}]", function.frame_size);

    let mut depth = 0usize;
    let mut line: Vec<String> = Vec::new();

    for element in body {
        match element {
            Element::Operand(_) | Element::Operator(_) => line.push(element.to_string()),
            Element::Marker(Marker::ExpressionEnd) | Element::Marker(Marker::EqualZeroJump) => {
                line.push(element.to_string());
                flush(out, &mut line, indent, depth);
            }
            Element::Marker(Marker::ScopeIncrement) | Element::Marker(Marker::FunctionStart) => {
                flush(out, &mut line, indent, depth);
                line.push(element.to_string());
                flush(out, &mut line, indent, depth);
                depth += 1;
            }
            Element::Marker(Marker::ScopeDecrement) | Element::Marker(Marker::FunctionEnd) => {
                flush(out, &mut line, indent, depth);
                depth = depth.saturating_sub(1);
                line.push(element.to_string());
                flush(out, &mut line, indent, depth);
            }
            Element::Keyword(_) => {
                flush(out, &mut line, indent, depth);
                line.push(element.to_string());
                flush(out, &mut line, indent, depth);
            }
        }
    }
    flush(out, &mut line, indent, depth);
    out.push('\n');
}

fn flush(out: &mut String, line: &mut Vec<String>, indent: &str, depth: usize) {
    if line.is_empty() {
        return;
    }
    let _ = writeln!(out, "{}{}", indent.repeat(depth), line.join(" "));
    line.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;
    use crate::frontend::parser::Parser;

    fn dump(source: &str) -> String {
        let tokens = Lexer::new(source).tokenize().unwrap();
        let unit = Parser::new(tokens).parse().unwrap();
        dump_program(&unit.program, "  ")
    }

    #[test]
    fn test_dump_nested_scopes() {
        let text = dump("int g = 2; int f(int a); void main() { int x; if (x) { x = g; } }");
        assert_eq!(
            text,
            "globals:\n  int g = 2\n\n\
             int f(int a);\n\n\
             void main() [frame 1]\n\
             FUNCTION_START\n\
             \x20 if\n\
             \x20 x EQUAL_ZERO_JUMP\n\
             \x20 SCOPE_INCREMENT\n\
             \x20   x g = EXPRESSION_END\n\
             \x20 SCOPE_DECREMENT\n\
             FUNCTION_END\n\n"
        );
    }

    #[test]
    fn test_indent_is_a_parameter() {
        let tokens = Lexer::new("void main() { return; }").tokenize().unwrap();
        let unit = Parser::new(tokens).parse().unwrap();
        let text = dump_program(&unit.program, "\t");
        assert!(text.contains("\treturn\n\tEXPRESSION_END\n"));
    }
}
