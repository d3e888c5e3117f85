use crate::lang::element::{Element, Marker};
use crate::lang::operand::Operand;
use crate::lang::program::Function;

#[derive(Debug)]
pub struct BalanceError {
    pub message: String,
}

impl std::fmt::Display for BalanceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "balance error: {}", self.message)
    }
}

impl std::error::Error for BalanceError {}

impl BalanceError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Operator and operand counts of one checked expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExpressionBalance {
    pub unary: usize,
    pub binary: usize,
    /// Operand elements consumed by operators (a trailing lone operand is not counted).
    pub operand_slots: usize,
}

/// Replays one expression with a postfix evaluator.
///
/// Plain operands push a slot; an operator pops its arity and parks its
/// result as a live intermediate; an `Intermediate(n)` reference moves
/// result `n` back onto the slot stack. Results are numbered the way the
/// expression parser numbers them, so an out-of-order reference fails.
pub fn check_expression(elements: &[Element]) -> Result<ExpressionBalance, BalanceError> {
    let mut slots: Vec<bool> = Vec::new(); // true for intermediate references
    let mut live: Vec<u32> = Vec::new();
    let mut count: u32 = 0;
    let mut balance = ExpressionBalance::default();

    for (i, element) in elements.iter().enumerate() {
        match element {
            Element::Operand(Operand::Intermediate(n)) => {
                let position = live.iter().position(|l| l == n).ok_or_else(|| {
                    BalanceError::new(format!(
                        "intermediate %{} referenced at {} before it was produced",
                        n, i
                    ))
                })?;
                live.remove(position);
                slots.push(true);
            }
            Element::Operand(Operand::ReturnValue(_)) => {
                live.push(count);
                count += 1;
            }
            Element::Operand(_) => slots.push(false),
            Element::Operator(op) => {
                let arity = op.arity();
                if slots.len() < arity {
                    return Err(BalanceError::new(format!(
                        "operand underflow at {}, `{}` needed {} operands",
                        i, op, arity
                    )));
                }
                for is_intermediate in slots.split_off(slots.len() - arity) {
                    if is_intermediate {
                        count = count.saturating_sub(1);
                    }
                }
                balance.operand_slots += arity;
                if op.is_unary() {
                    balance.unary += 1;
                } else {
                    balance.binary += 1;
                }
                if op.produces_value() {
                    if live.contains(&count) {
                        return Err(BalanceError::new(format!(
                            "intermediate %{} produced at {} while still live",
                            count, i
                        )));
                    }
                    live.push(count);
                    count += 1;
                }
            }
            Element::Marker(m) => {
                return Err(BalanceError::new(format!("marker {} inside expression", m)));
            }
            Element::Keyword(k) => {
                return Err(BalanceError::new(format!("keyword `{}` inside expression", k)));
            }
        }
    }

    match (slots.len(), live.len()) {
        (1, 0) | (0, 1) => Ok(balance),
        (s, l) => Err(BalanceError::new(format!(
            "expression leaves {} operands and {} results, expected one value",
            s, l
        ))),
    }
}

/// Checks every expression of a function body.
pub fn check_function(function: &Function) -> Result<(), BalanceError> {
    let Some(body) = &function.body else {
        return Ok(());
    };

    let mut start = 0;
    for (i, element) in body.iter().enumerate() {
        match element {
            Element::Operand(_) | Element::Operator(_) => continue,
            Element::Marker(Marker::ExpressionEnd) | Element::Marker(Marker::EqualZeroJump) => {
                if i > start {
                    check_expression(&body[start..i]).map_err(|e| {
                        BalanceError::new(format!("in `{}`: {}", function.name, e.message))
                    })?;
                }
            }
            _ => {
                if i > start {
                    return Err(BalanceError::new(format!(
                        "in `{}`: unterminated expression before {}",
                        function.name, element
                    )));
                }
            }
        }
        start = i + 1;
    }

    if start < body.len() {
        return Err(BalanceError::new(format!(
            "in `{}`: body ends inside an expression",
            function.name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::operand::{CallRef, Constant};
    use crate::lang::operator::Operator;
    use proptest::prelude::*;

    fn c(value: i64) -> Element {
        Element::Operand(Operand::Constant(Constant::int(value)))
    }

    fn ir(n: u32) -> Element {
        Element::Operand(Operand::Intermediate(n))
    }

    fn op(o: Operator) -> Element {
        Element::Operator(o)
    }

    #[test]
    fn test_simple_binary() {
        let b = check_expression(&[c(1), c(2), op(Operator::Plus)]).unwrap();
        assert_eq!(
            b,
            ExpressionBalance {
                unary: 0,
                binary: 1,
                operand_slots: 2
            }
        );
    }

    #[test]
    fn test_underflow() {
        let result = check_expression(&[c(1), op(Operator::Plus)]);
        assert!(result.unwrap_err().message.contains("underflow"));
    }

    #[test]
    fn test_dangling_values() {
        assert!(check_expression(&[c(1), c(2)]).is_err());
        assert!(check_expression(&[c(1), c(2), op(Operator::Plus), c(3)]).is_err());
    }

    #[test]
    fn test_reference_before_production() {
        assert!(check_expression(&[ir(0), c(1), op(Operator::Plus)]).is_err());
    }

    #[test]
    fn test_call_with_arguments() {
        let elements = vec![
            Element::Operand(Operand::Parameter(0)),
            c(1),
            op(Operator::ParameterAssignment),
            Element::Operand(Operand::ReturnValue(CallRef {
                name: "f".to_string(),
                arity: 1,
            })),
            ir(0),
            c(2),
            op(Operator::Multiply),
        ];
        let b = check_expression(&elements).unwrap();
        assert_eq!(b.binary, 2);
        assert_eq!(b.operand_slots, 4);
    }

    #[test]
    fn test_unterminated_function_body() {
        let function = Function {
            name: "f".to_string(),
            return_type: crate::lang::types::DataType::Void,
            parameters: Vec::new(),
            body: Some(vec![
                Element::Marker(Marker::FunctionStart),
                c(1),
                Element::Marker(Marker::FunctionEnd),
            ]),
            frame_size: 0,
        };
        assert!(check_function(&function).is_err());
    }

    /// Random expressions over a handful of operators and variables.
    fn expression_source() -> impl Strategy<Value = String> {
        let leaf = prop_oneof![
            (0i64..100).prop_map(|n| n.to_string()),
            prop::sample::select(vec!["a", "b", "c"]).prop_map(|s| s.to_string()),
        ];
        leaf.prop_recursive(4, 32, 2, |inner| {
            prop_oneof![
                (
                    inner.clone(),
                    prop::sample::select(vec!["+", "-", "*", "<<", "<", "==", "&", "|", "&&"]),
                    inner.clone()
                )
                    .prop_map(|(l, o, r)| format!("{} {} {}", l, o, r)),
                inner.clone().prop_map(|e| format!("-({})", e)),
                inner.clone().prop_map(|e| format!("!{}", e)),
                inner.clone().prop_map(|e| format!("({})", e)),
                (inner.clone(), inner).prop_map(|(l, r)| format!("f({}, {})", l, r)),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_parsed_expressions_balance(source in expression_source()) {
            let program = format!(
                "int f(int x, int y); void main() {{ int a; int b; int c; a = {}; }}",
                source
            );
            let tokens = crate::frontend::lexer::Lexer::new(&program).tokenize().unwrap();
            let unit = crate::frontend::parser::Parser::new(tokens).parse().unwrap();
            let main = unit.program.function("main").unwrap();
            prop_assert!(check_function(main).is_ok());

            let body = main.body.as_ref().unwrap();
            let end = body
                .iter()
                .position(|e| *e == Element::Marker(Marker::ExpressionEnd))
                .unwrap();
            let b = check_expression(&body[1..end]).unwrap();
            prop_assert_eq!(b.operand_slots, b.unary + 2 * b.binary);
        }
    }
}
