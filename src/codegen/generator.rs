use std::fmt::Display;
use std::ops::Range;

use crate::codegen::codegen_error::CodegenError;
use crate::codegen::instr::{Arg, Line, Mnemonic, Reg};
use crate::codegen::labels::{Construct, LabelAllocator, LabelBase};
use crate::codegen::registers::{Binding, MIN_REGISTERS, RegisterFile};
use crate::codegen::writer::Writer;
use crate::lang::element::{Element, Keyword, Marker};
use crate::lang::operand::{CallRef, Operand};
use crate::lang::operator::Operator;
use crate::lang::program::{Function, Program};

/// Lowers a program to high assembly: globals first, then every defined
/// function in declaration order.
pub fn generate(program: &Program, registers: usize) -> Result<Vec<Line>, CodegenError> {
    if registers < MIN_REGISTERS {
        return Err(CodegenError::PoolTooSmall {
            requested: registers,
            minimum: MIN_REGISTERS,
        });
    }

    let mut data = Writer::new();
    for global in &program.globals {
        data.global(global.name.clone(), global.value);
    }
    let mut lines = data.into_lines();
    for function in program.functions.iter().filter(|f| f.is_defined()) {
        log::debug!("generating `{}`", function.name);
        lines.extend(FunctionGenerator::new(function, registers)?.run()?);
    }
    log::info!("generated {} lines of high assembly", lines.len());
    Ok(lines)
}

/// What the next `SCOPE_INCREMENT` opens.
enum Opening {
    Branch,
    Else,
    While { base: LabelBase, depth: usize },
    For,
}

enum Scope {
    Block,
    /// Body of an `if` or `else if`; the chain is on top of `chains`.
    Branch,
    Else,
    While {
        base: LabelBase,
        depth: usize,
    },
    For {
        base: LabelBase,
        depth: usize,
        increment: Range<usize>,
    },
}

struct IfChain {
    base: LabelBase,
    depth: usize,
    branches: usize,
    /// Some branch jumped to the chain's `_end` label.
    jumped: bool,
    /// Skip label of the branch being generated.
    skip: String,
}

enum ForPhase {
    Init,
    Condition,
    /// Increment elements start at this index and are skipped until the body ends.
    Increment(usize),
    Ready(Range<usize>),
}

struct ForSetup {
    base: LabelBase,
    depth: usize,
    phase: ForPhase,
}

struct FunctionGenerator<'a> {
    function: &'a Function,
    body: &'a [Element],
    registers: RegisterFile,
    out: Writer,
    labels: LabelAllocator,

    // control flow
    depth: usize,
    scopes: Vec<Scope>,
    chains: Vec<IfChain>,
    loops: Vec<String>,
    for_setup: Option<ForSetup>,
    opening: Option<Opening>,
    condition_target: Option<String>,
    returning: bool,

    // current expression
    pending: Vec<Operand>,
    count: u32,
    store_targets: Vec<u32>,
    last_result: Option<Reg>,
    has_values: bool,
}

impl<'a> FunctionGenerator<'a> {
    fn new(function: &'a Function, registers: usize) -> Result<Self, CodegenError> {
        let body = function
            .body
            .as_deref()
            .ok_or_else(|| CodegenError::MissingBody(function.name.clone()))?;
        Ok(Self {
            function,
            body,
            registers: RegisterFile::new(registers)?,
            out: Writer::new(),
            labels: LabelAllocator::new(function.name.clone()),
            depth: 0,
            scopes: Vec::new(),
            chains: Vec::new(),
            loops: Vec::new(),
            for_setup: None,
            opening: None,
            condition_target: None,
            returning: false,
            pending: Vec::new(),
            count: 0,
            store_targets: Vec::new(),
            last_result: None,
            has_values: false,
        })
    }

    fn run(mut self) -> Result<Vec<Line>, CodegenError> {
        for index in 0..self.body.len() {
            if self.in_increment(index) {
                continue;
            }
            self.element(index)?;
        }
        Ok(self.out.into_lines())
    }

    /// A `for` increment is generated after the body, so its elements are
    /// only recorded on the first pass.
    fn in_increment(&mut self, index: usize) -> bool {
        let Some(setup) = self.for_setup.as_mut() else {
            return false;
        };
        let ForPhase::Increment(start) = setup.phase else {
            return false;
        };
        if self.body[index] == Element::Marker(Marker::ExpressionEnd) {
            setup.phase = ForPhase::Ready(start..index);
        }
        true
    }

    fn element(&mut self, index: usize) -> Result<(), CodegenError> {
        let body = self.body;
        match &body[index] {
            Element::Operand(Operand::ReturnValue(call)) => self.call(call),
            Element::Operand(operand) => {
                self.pending.push(operand.clone());
                self.has_values = true;
                Ok(())
            }
            Element::Operator(op) => self.operator(*op, index),
            Element::Marker(marker) => self.marker(*marker, index),
            Element::Keyword(keyword) => self.keyword(*keyword),
        }
    }

    fn unexpected(&self, what: impl Display) -> CodegenError {
        CodegenError::UnexpectedElement {
            function: self.function.name.clone(),
            element: what.to_string(),
        }
    }

    // =================================================================
    // Expressions
    // =================================================================

    fn load(&mut self, operand: &Operand) -> Result<Reg, CodegenError> {
        let binding = match operand {
            Operand::Variable(v) => Binding::Variable(v.clone()),
            Operand::Constant(c) => Binding::Constant(c.value),
            Operand::Intermediate(n) => Binding::Intermediate(*n),
            other => return Err(self.unexpected(other)),
        };
        self.registers.load_operand(binding, &mut self.out)
    }

    /// Constants become immediates, everything else a register.
    fn operand_arg(&mut self, operand: &Operand) -> Result<Arg, CodegenError> {
        match operand {
            Operand::Constant(c) => Ok(Arg::Imm(c.value)),
            other => Ok(Arg::Reg(self.load(other)?)),
        }
    }

    fn result(&mut self, n: u32) -> Result<Reg, CodegenError> {
        self.registers.bind_result(n, &mut self.out)
    }

    fn operator(&mut self, op: Operator, index: usize) -> Result<(), CodegenError> {
        let arity = op.arity();
        if self.pending.len() < arity {
            return Err(CodegenError::MissingOperands {
                function: self.function.name.clone(),
                operator: op.to_string(),
            });
        }
        let args = self.pending.split_off(self.pending.len() - arity);
        self.has_values = true;

        // Same numbering as the expression parser.
        for arg in &args {
            if matches!(arg, Operand::Intermediate(_)) {
                self.count = self.count.saturating_sub(1);
            }
        }
        let n = self.count;
        if op.produces_value() {
            self.count += 1;
        }

        let result = match op {
            Operator::ParameterAssignment | Operator::ParameterPossibleAssignment => {
                self.argument(&args)?;
                None
            }
            Operator::Assignment => Some(self.assign(&args, n, index)?),
            _ if op.is_unary() => Some(self.unary(op, &args[0], n)?),
            _ => Some(self.binary(op, &args[0], &args[1], n)?),
        };
        if result.is_some() {
            self.last_result = result;
        }
        debug_assert!(self.registers.bindings_are_unique());
        Ok(())
    }

    fn unary(&mut self, op: Operator, a: &Operand, n: u32) -> Result<Reg, CodegenError> {
        if let (Operator::BitwiseNot | Operator::UnaryMinus, Operand::Constant(c)) = (op, a) {
            let d = self.result(n)?;
            self.out
                .emit(op.mnemonic(), vec![Arg::Reg(d), Arg::Imm(c.value)]);
            return Ok(d);
        }

        let r = self.load(a)?;
        let d = self.result(n)?;
        match op {
            Operator::LogicalNot | Operator::UnaryPlus => self
                .out
                .emit(op.mnemonic(), vec![Arg::Reg(d), Arg::Reg(r), Arg::Imm(0)]),
            Operator::BitwiseNot | Operator::UnaryMinus => self
                .out
                .emit(op.mnemonic(), vec![Arg::Reg(d), Arg::Reg(r)]),
            Operator::Dereference => self.out.emit(
                Mnemonic::Load,
                vec![Arg::Reg(d), Arg::Mem { base: r, offset: 0 }],
            ),
            Operator::AssignmentDereference => {
                self.out.emit_commented(
                    Mnemonic::Mov,
                    vec![Arg::Reg(d), Arg::Reg(r)],
                    format!("address %{}", n),
                );
                self.store_targets.push(n);
            }
            other => return Err(self.unexpected(other)),
        }
        Ok(d)
    }

    fn binary(&mut self, op: Operator, a: &Operand, b: &Operand, n: u32) -> Result<Reg, CodegenError> {
        let ra = self.load(a)?;
        let b = self.operand_arg(b)?;
        let d = self.result(n)?;
        match op {
            Operator::OffsetDereference => {
                self.out
                    .emit(Mnemonic::Add, vec![Arg::Reg(d), Arg::Reg(ra), b]);
                self.out.emit(
                    Mnemonic::Load,
                    vec![Arg::Reg(d), Arg::Mem { base: d, offset: 0 }],
                );
            }
            Operator::OffsetAssignmentDereference => {
                self.out.emit_commented(
                    Mnemonic::Add,
                    vec![Arg::Reg(d), Arg::Reg(ra), b],
                    format!("address %{}", n),
                );
                self.store_targets.push(n);
            }
            _ => self
                .out
                .emit(op.mnemonic(), vec![Arg::Reg(d), Arg::Reg(ra), b]),
        }
        Ok(d)
    }

    /// `[Pk, v, :=]` pushes one call argument.
    fn argument(&mut self, args: &[Operand]) -> Result<(), CodegenError> {
        let [parameter, value] = args else {
            return Err(self.unexpected(Operator::ParameterAssignment));
        };
        let Operand::Parameter(k) = parameter else {
            return Err(self.unexpected(parameter));
        };
        let r = self.load(value)?;
        if *k == 0 {
            self.registers.begin_call(&mut self.out);
        }
        self.out
            .emit_commented(Mnemonic::Push, vec![Arg::Reg(r)], format!("argument {}", k));
        self.registers.record_push();
        self.registers.release_operands();
        Ok(())
    }

    fn call(&mut self, call: &CallRef) -> Result<(), CodegenError> {
        self.has_values = true;
        self.registers.release_operands();
        self.registers.store_written_globals(&mut self.out);
        self.out
            .emit(Mnemonic::Call, vec![Arg::Label(call.name.clone())]);
        self.registers.end_call(&call.name, call.arity)?;
        self.registers.invalidate_globals();

        let n = self.count;
        self.count += 1;
        let d = self.result(n)?;
        self.out
            .emit(Mnemonic::Mov, vec![Arg::Reg(d), Arg::Reg(Reg::Eax)]);
        self.last_result = Some(d);
        Ok(())
    }

    fn assign(&mut self, args: &[Operand], n: u32, index: usize) -> Result<Reg, CodegenError> {
        let [target, value] = args else {
            return Err(self.unexpected(Operator::Assignment));
        };
        let written = match target {
            Operand::Variable(variable) if !variable.is_array() => {
                let source = self.operand_arg(value)?;
                let rx = self.registers.bind_for_write(variable, &mut self.out)?;
                self.out.emit_commented(
                    Mnemonic::Mov,
                    vec![Arg::Reg(rx), source],
                    variable.name.clone(),
                );
                self.registers.release_operands();
                rx
            }
            Operand::Intermediate(t) if self.store_targets.contains(t) => {
                let address = self.load(target)?;
                let rv = self.load(value)?;
                self.out.emit(
                    Mnemonic::Store,
                    vec![
                        Arg::Mem {
                            base: address,
                            offset: 0,
                        },
                        Arg::Reg(rv),
                    ],
                );
                self.store_targets.retain(|s| s != t);
                self.registers.release_operands();
                rv
            }
            other => return Err(self.unexpected(other)),
        };

        if !self.result_needed(n, index) {
            return Ok(written);
        }
        let d = self.result(n)?;
        self.out
            .emit(Mnemonic::Mov, vec![Arg::Reg(d), Arg::Reg(written)]);
        Ok(d)
    }

    /// True when `%n` is read again before the expression ends.
    fn result_needed(&self, n: u32, index: usize) -> bool {
        self.body[index + 1..]
            .iter()
            .take_while(|e| !e.ends_expression())
            .any(|e| matches!(e, Element::Operand(Operand::Intermediate(m)) if *m == n))
    }

    /// The register holding the value of the finished expression.
    fn expression_value(&mut self) -> Result<Reg, CodegenError> {
        if let Some(operand) = self.pending.pop() {
            let r = self.load(&operand)?;
            self.registers.release_operands();
            return Ok(r);
        }
        match self.last_result {
            Some(r) => Ok(r),
            None => Err(self.unexpected("empty expression")),
        }
    }

    fn finish_expression(&mut self) {
        self.pending.clear();
        self.registers.end_expression(&mut self.out);
        self.count = 0;
        self.store_targets.clear();
        self.last_result = None;
        self.has_values = false;
    }

    // =================================================================
    // Markers
    // =================================================================

    fn marker(&mut self, marker: Marker, index: usize) -> Result<(), CodegenError> {
        match marker {
            Marker::FunctionStart => {
                self.out.function(self.function.name.clone());
                self.registers
                    .create_stack_frame(self.function.frame_size, &mut self.out);
                Ok(())
            }
            Marker::FunctionEnd => {
                if self.out.last_mnemonic() != Some(Mnemonic::Ret) {
                    self.epilogue();
                }
                Ok(())
            }
            Marker::ExpressionEnd => self.expression_end(),
            Marker::EqualZeroJump => self.conditional_jump(index),
            Marker::ScopeIncrement => self.open_scope(),
            Marker::ScopeDecrement => self.close_scope(index),
        }
    }

    fn expression_end(&mut self) -> Result<(), CodegenError> {
        if self.returning {
            return self.return_statement();
        }
        self.finish_expression();

        if let Some(setup) = self.for_setup.as_mut() {
            if matches!(setup.phase, ForPhase::Init) {
                setup.phase = ForPhase::Condition;
                let start = setup.base.start();
                self.registers.store_written(&mut self.out);
                self.out.label(start);
                self.registers.invalidate();
            }
        }
        Ok(())
    }

    fn conditional_jump(&mut self, index: usize) -> Result<(), CodegenError> {
        let value = self.expression_value()?;

        let for_condition = matches!(
            self.for_setup.as_ref().map(|s| &s.phase),
            Some(ForPhase::Condition)
        );
        let target = if for_condition {
            match self.for_setup.as_mut() {
                Some(setup) => {
                    setup.phase = ForPhase::Increment(index + 1);
                    setup.base.end()
                }
                None => return Err(self.unexpected(Marker::EqualZeroJump)),
            }
        } else {
            match self.condition_target.take() {
                Some(target) => target,
                None => return Err(self.unexpected(Marker::EqualZeroJump)),
            }
        };

        self.finish_expression();
        self.registers.store_written(&mut self.out);
        self.out
            .emit(Mnemonic::Jz, vec![Arg::Reg(value), Arg::Label(target)]);
        self.registers.invalidate();
        Ok(())
    }

    fn return_statement(&mut self) -> Result<(), CodegenError> {
        self.returning = false;
        if self.has_values {
            let value = self.expression_value()?;
            self.out
                .emit(Mnemonic::Mov, vec![Arg::Reg(Reg::Eax), Arg::Reg(value)]);
        }
        self.finish_expression();
        self.epilogue();
        self.registers.invalidate();
        Ok(())
    }

    fn epilogue(&mut self) {
        self.registers.store_written_globals(&mut self.out);
        self.registers.destroy_stack_frame(&mut self.out);
        self.out.emit(
            Mnemonic::Ret,
            vec![Arg::Imm(self.function.arity() as i64)],
        );
    }

    // =================================================================
    // Scopes and keywords
    // =================================================================

    fn open_scope(&mut self) -> Result<(), CodegenError> {
        let scope = match self.opening.take() {
            None => Scope::Block,
            Some(Opening::Branch) => Scope::Branch,
            Some(Opening::Else) => Scope::Else,
            Some(Opening::While { base, depth }) => {
                self.loops.push(base.end());
                Scope::While { base, depth }
            }
            Some(Opening::For) => {
                let Some(setup) = self.for_setup.take() else {
                    return Err(self.unexpected(Keyword::For));
                };
                let ForPhase::Ready(increment) = setup.phase else {
                    return Err(self.unexpected(Keyword::For));
                };
                self.loops.push(setup.base.end());
                Scope::For {
                    base: setup.base,
                    depth: setup.depth,
                    increment,
                }
            }
        };
        if !matches!(scope, Scope::Block) {
            self.depth += 1;
        }
        self.scopes.push(scope);
        Ok(())
    }

    fn close_scope(&mut self, index: usize) -> Result<(), CodegenError> {
        let Some(scope) = self.scopes.pop() else {
            return Err(self.unexpected(Marker::ScopeDecrement));
        };
        match scope {
            Scope::Block => {}
            Scope::Branch => {
                self.depth -= 1;
                let continues = matches!(
                    self.body.get(index + 1),
                    Some(Element::Keyword(Keyword::ElseIf | Keyword::Else))
                );
                self.registers.store_written(&mut self.out);
                let Some(chain) = self.chains.last_mut() else {
                    return Err(self.unexpected(Keyword::If));
                };
                if continues {
                    self.out
                        .emit(Mnemonic::Jmp, vec![Arg::Label(chain.base.end())]);
                    chain.jumped = true;
                }
                self.out.label(chain.skip.clone());
                if !continues && chain.jumped {
                    self.out.label(chain.base.end());
                }
                self.registers.invalidate();
                if !continues {
                    self.close_chain();
                }
            }
            Scope::Else => {
                self.depth -= 1;
                self.registers.store_written(&mut self.out);
                let Some(end) = self.chains.last().map(|c| c.base.end()) else {
                    return Err(self.unexpected(Keyword::Else));
                };
                self.out.label(end);
                self.registers.invalidate();
                self.close_chain();
            }
            Scope::While { base, depth } => {
                self.depth -= 1;
                self.loops.pop();
                self.close_loop(&base);
                self.labels.close(Construct::While, depth);
            }
            Scope::For {
                base,
                depth,
                increment,
            } => {
                for j in increment {
                    self.element(j)?;
                }
                self.finish_expression();
                self.depth -= 1;
                self.loops.pop();
                self.close_loop(&base);
                self.labels.close(Construct::For, depth);
            }
        }
        Ok(())
    }

    fn close_loop(&mut self, base: &LabelBase) {
        self.registers.store_written(&mut self.out);
        self.out
            .emit(Mnemonic::Jmp, vec![Arg::Label(base.start())]);
        self.out.label(base.end());
        self.registers.invalidate();
    }

    fn close_chain(&mut self) {
        if let Some(chain) = self.chains.pop() {
            self.labels.close(Construct::If, chain.depth);
        }
    }

    fn keyword(&mut self, keyword: Keyword) -> Result<(), CodegenError> {
        match keyword {
            Keyword::Return => self.returning = true,
            Keyword::If => {
                let base = self.labels.open(Construct::If, self.depth);
                let skip = base.skip();
                self.condition_target = Some(skip.clone());
                self.chains.push(IfChain {
                    base,
                    depth: self.depth,
                    branches: 0,
                    jumped: false,
                    skip,
                });
                self.opening = Some(Opening::Branch);
            }
            Keyword::ElseIf => {
                let Some(chain) = self.chains.last_mut() else {
                    return Err(self.unexpected(keyword));
                };
                let skip = chain.base.branch_skip(chain.branches);
                chain.branches += 1;
                chain.skip = skip.clone();
                self.condition_target = Some(skip);
                self.opening = Some(Opening::Branch);
            }
            Keyword::Else => self.opening = Some(Opening::Else),
            Keyword::While => {
                self.registers.store_written(&mut self.out);
                self.registers.invalidate();
                let base = self.labels.open(Construct::While, self.depth);
                self.out.label(base.start());
                self.condition_target = Some(base.end());
                self.opening = Some(Opening::While {
                    base,
                    depth: self.depth,
                });
            }
            Keyword::For => {
                let base = self.labels.open(Construct::For, self.depth);
                self.for_setup = Some(ForSetup {
                    base,
                    depth: self.depth,
                    phase: ForPhase::Init,
                });
                self.opening = Some(Opening::For);
            }
            Keyword::Break => {
                let Some(end) = self.loops.last().cloned() else {
                    return Err(CodegenError::BreakOutsideLoop(self.function.name.clone()));
                };
                self.registers.store_written(&mut self.out);
                self.out.emit(Mnemonic::Jmp, vec![Arg::Label(end)]);
                self.registers.invalidate();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;
    use crate::frontend::parser::Parser;
    use std::collections::HashSet;

    fn compile(source: &str, registers: usize) -> Vec<String> {
        let tokens = Lexer::new(source).tokenize().unwrap();
        let unit = Parser::new(tokens).parse().unwrap();
        generate(&unit.program, registers)
            .unwrap()
            .iter()
            .map(|l| {
                let text = l.to_string();
                match text.find(';') {
                    Some(i) => text[..i].trim_end().to_string(),
                    None => text,
                }
            })
            .collect()
    }

    fn after_prologue(lines: &[String]) -> Vec<&str> {
        let start = lines.iter().position(|l| l == "    PUSHA").unwrap() + 1;
        lines[start..].iter().map(|l| l.as_str()).collect()
    }

    const EPILOGUE: [&str; 4] = ["    POPA", "    MOV esp ebp", "    POP ebp", "    RET 0"];

    #[test]
    fn test_arithmetic_then_store() {
        let lines = compile("void main() { int x; x = 1 + 2 * 3; if (x) {} }", 3);
        assert_eq!(
            lines[..5],
            ["$main:", "    PUSH ebp", "    MOV ebp esp", "    SUB esp esp 1", "    PUSHA"]
        );
        let mut expected = vec![
            "    MOV r1 2",
            "    MUL r2 r1 3",
            "    MOV r3 1",
            "    ADD r2 r3 r2",
            "    MOV r1 r2",
            "    STORE [ebp-1] r1",
            "    JZ r1 main.if_0_skip",
            "main.if_0_skip:",
        ];
        expected.extend(EPILOGUE);
        assert_eq!(after_prologue(&lines), expected);
    }

    #[test]
    fn test_if_else_flushes_before_jumps() {
        let lines = compile(
            "void main() { int a; int b; int x; if (a < b) { x = 1; } else { x = 2; } }",
            3,
        );
        let mut expected = vec![
            "    LOAD r1 [ebp-1]",
            "    LOAD r2 [ebp-2]",
            "    LT r3 r1 r2",
            "    JZ r3 main.if_0_skip",
            "    MOV r1 1",
            "    STORE [ebp-3] r1",
            "    JMP main.if_0_end",
            "main.if_0_skip:",
            "    MOV r1 2",
            "    STORE [ebp-3] r1",
            "main.if_0_end:",
        ];
        expected.extend(EPILOGUE);
        assert_eq!(after_prologue(&lines), expected);
    }

    #[test]
    fn test_for_increment_follows_body() {
        let lines = compile(
            "void main() { int s; for (int i = 0; i < 10; i = i + 1) { s = s + i; } }",
            3,
        );
        let mut expected = vec![
            "    MOV r1 0",
            "    STORE [ebp-2] r1",
            "main.for_0_start:",
            "    LOAD r1 [ebp-2]",
            "    LT r2 r1 10",
            "    JZ r2 main.for_0_end",
            "    LOAD r1 [ebp-1]",
            "    LOAD r2 [ebp-2]",
            "    ADD r3 r1 r2",
            "    MOV r1 r3",
            "    ADD r3 r2 1",
            "    MOV r2 r3",
            "    STORE [ebp-1] r1",
            "    STORE [ebp-2] r2",
            "    JMP main.for_0_start",
            "main.for_0_end:",
        ];
        expected.extend(EPILOGUE);
        assert_eq!(after_prologue(&lines), expected);
    }

    #[test]
    fn test_else_if_chain_labels() {
        let lines = compile(
            "void main() { int a; if (a) a = 1; else if (a < 2) a = 2; }",
            3,
        );
        let body = after_prologue(&lines);
        let jz: Vec<&&str> = body.iter().filter(|l| l.starts_with("    JZ")).collect();
        assert_eq!(jz.len(), 2);
        assert!(jz[0].ends_with("main.if_0_skip"));
        assert!(jz[1].ends_with("main.elseif_0.0_skip"));
        assert!(body.contains(&"    JMP main.if_0_end"));
        assert!(body.contains(&"main.elseif_0.0_skip:"));
        assert!(body.contains(&"main.if_0_end:"));
    }

    #[test]
    fn test_two_registers_spill_once() {
        let lines = compile(
            "void main() { int a; int b; int c; int d; int e; int x; \
             x = a * b + (c * d + e * 2); }",
            2,
        );
        let pushes: Vec<usize> = lines
            .iter()
            .enumerate()
            .filter(|(_, l)| l.starts_with("    PUSH r"))
            .map(|(i, _)| i)
            .collect();
        let pops: Vec<usize> = lines
            .iter()
            .enumerate()
            .filter(|(_, l)| l.starts_with("    POP r"))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(pushes.len(), 1);
        assert_eq!(pops.len(), 1);
        assert!(pushes[0] < pops[0]);
        assert!(!lines.iter().any(|l| l.contains("r3")));
    }

    #[test]
    fn test_labels_are_unique() {
        let lines = compile(
            "void main() { int a; \
               if (a) { if (a) {} else {} } else if (a) { while (a) { if (a) {} } } \
               if (a) {} \
               while (a) { for (;;) { break; } for (;;) { if (a) break; } } \
               for (a = 0; a < 3; a = a + 1) { while (a) {} } }",
            3,
        );
        let labels: Vec<&str> = lines
            .iter()
            .filter(|l| l.ends_with(':') && !l.starts_with(' ') && !l.starts_with('$'))
            .map(|l| l.trim_end_matches(':'))
            .collect();
        let unique: HashSet<&str> = labels.iter().copied().collect();
        assert_eq!(unique.len(), labels.len());

        for line in &lines {
            if line.starts_with("    JMP") || line.starts_with("    JZ") {
                let target = line.rsplit(' ').next().unwrap();
                assert!(unique.contains(target), "undefined target {}", target);
            }
        }
    }

    #[test]
    fn test_break_jumps_to_loop_end() {
        let lines = compile("void main() { while (1) { break; } }", 3);
        let body = after_prologue(&lines);
        assert_eq!(
            body[..6],
            [
                "main.while_0_start:",
                "    MOV r1 1",
                "    JZ r1 main.while_0_end",
                "    JMP main.while_0_end",
                "    JMP main.while_0_start",
                "main.while_0_end:"
            ]
        );
    }

    #[test]
    fn test_call_argument_order() {
        let lines = compile(
            "int f(int a, int b); void main() { int x; x = f(1, 2); }",
            3,
        );
        assert!(!lines.iter().any(|l| l == "$f:"));
        let body = after_prologue(&lines);
        assert_eq!(
            body[..7],
            [
                "    MOV r1 1",
                "    PUSH r1",
                "    MOV r2 2",
                "    PUSH r2",
                "    CALL f",
                "    MOV r3 eax",
                "    MOV r1 r3"
            ]
        );
    }

    /// Replays the pushes and pops of `function`, checking that every call
    /// finds exactly its arguments on top of the stack.
    fn check_call_stack(lines: &[Line], function: &str, arities: &[(&str, usize)]) {
        let start = lines
            .iter()
            .position(|l| *l == Line::Function { name: function.to_string() })
            .unwrap();
        let mut stack: Vec<bool> = Vec::new(); // true for arguments
        let mut in_body = false;
        for line in &lines[start + 1..] {
            let Line::Instruction { mnemonic, args, comment } = line else {
                if matches!(line, Line::Function { .. }) {
                    break;
                }
                continue;
            };
            let comment = comment.as_deref().unwrap_or("");
            match mnemonic {
                Mnemonic::Pusha => in_body = true,
                Mnemonic::Popa => in_body = false,
                _ if !in_body => {}
                Mnemonic::Push => stack.push(comment.starts_with("argument")),
                Mnemonic::Pop => assert_eq!(stack.pop(), Some(false), "{}", line),
                Mnemonic::Add if args[0] == Arg::Reg(Reg::Esp) => {
                    let Arg::Imm(k) = args[2] else { panic!("{}", line) };
                    for _ in 0..k {
                        assert_eq!(stack.pop(), Some(false), "{}", line);
                    }
                }
                Mnemonic::Call => {
                    let Arg::Label(name) = &args[0] else { panic!("{}", line) };
                    let arity = arities.iter().find(|(n, _)| n == name).unwrap().1;
                    for _ in 0..arity {
                        assert_eq!(stack.pop(), Some(true), "arguments of {}", name);
                    }
                }
                _ => {}
            }
        }
        assert!(stack.is_empty());
    }

    #[test]
    fn test_live_results_survive_argument_spills() {
        let source = "int f(int x, int y) { return x * 10 + y; } \
             int main() { int a = 1; int b = 2; int c = 3; int d = 4; \
             return (a + b) + f(a, (a + b) * (c + d) + (a + c) * (b + d)); }";
        for registers in [2, 3] {
            let tokens = Lexer::new(source).tokenize().unwrap();
            let unit = Parser::new(tokens).parse().unwrap();
            let lines = generate(&unit.program, registers).unwrap();
            check_call_stack(&lines, "main", &[("f", 2)]);
        }

        let source = "int g(int x, int y, int z) { return x + y + z; } \
             int main() { int a = 1; int b = 2; int c = 3; int d = 4; \
             return (a * b) + (c * d) + g(a + b, (a + b) * (c + d) + (a + c) * (b + d), \
             g(a, b * c, (c + d) * (a + b))); }";
        for registers in [2, 3, 4] {
            let tokens = Lexer::new(source).tokenize().unwrap();
            let unit = Parser::new(tokens).parse().unwrap();
            let lines = generate(&unit.program, registers).unwrap();
            check_call_stack(&lines, "main", &[("g", 3)]);
        }
    }

    #[test]
    fn test_return_value_and_parameters() {
        let lines = compile(
            "int f(int a) { return a + 1; } void main() { f(2); }",
            3,
        );
        assert_eq!(
            lines[..12],
            [
                "$f:",
                "    PUSH ebp",
                "    MOV ebp esp",
                "    PUSHA",
                "    LOAD r1 [ebp+2]",
                "    ADD r2 r1 1",
                "    MOV eax r2",
                "    POPA",
                "    MOV esp ebp",
                "    POP ebp",
                "    RET 1",
                "$main:"
            ]
        );
    }

    #[test]
    fn test_globals_come_first_and_are_flushed() {
        let lines = compile("int g = 5; void main() { g = g + 1; }", 3);
        assert_eq!(lines[0], "@g: 5");
        let body = after_prologue(&lines);
        assert_eq!(
            body,
            [
                "    LOAD r1 @g",
                "    ADD r2 r1 1",
                "    MOV r1 r2",
                "    STORE @g r1",
                "    POPA",
                "    MOV esp ebp",
                "    POP ebp",
                "    RET 0"
            ]
        );
    }

    #[test]
    fn test_globals_flushed_around_calls() {
        let lines = compile(
            "int g; void h(); void main() { g = 1; h(); g = g + 1; }",
            3,
        );
        let body = after_prologue(&lines);
        assert_eq!(
            body[..5],
            [
                "    MOV r1 1",
                "    STORE @g r1",
                "    CALL h",
                "    MOV r1 eax",
                "    LOAD r1 @g"
            ]
        );
    }

    #[test]
    fn test_array_element_store_and_load() {
        let lines = compile(
            "void main() { int arr[3]; int y; arr[1] = 7; y = arr[2]; }",
            3,
        );
        let body = after_prologue(&lines);
        assert_eq!(
            body[..4],
            [
                "    ADD r1 ebp -3",
                "    ADD r2 r1 1",
                "    MOV r3 7",
                "    STORE [r2+0] r3"
            ]
        );
        assert!(body.contains(&"    LOAD r2 [r2+0]"));
    }

    #[test]
    fn test_unary_operators() {
        let lines = compile("void main() { int a; a = -a; a = !a; a = ~5; }", 3);
        let body = after_prologue(&lines);
        assert!(body.contains(&"    NEG r2 r1"));
        assert!(body.iter().any(|l| l.starts_with("    EQ ") && l.ends_with(" 0")));
        assert!(body.iter().any(|l| l.starts_with("    NOT ") && l.ends_with(" 5")));
    }

    #[test]
    fn test_pool_size_is_checked() {
        let err = generate(&Program::default(), 1).unwrap_err();
        assert_eq!(
            err,
            CodegenError::PoolTooSmall {
                requested: 1,
                minimum: 2
            }
        );
    }
}
