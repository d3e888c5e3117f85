use crate::codegen::instr::{Arg, Line, Mnemonic, Reg};
use crate::target::translate_error::TranslateError;

const INDENT: &str = "   ";
const COMMENT_COLUMN: usize = 40;

/// Special registers live in the upper half of the target register file.
const REGISTER_DEFINITIONS: [(&str, &str); 4] =
    [("eax", "r4"), ("edx", "r5"), ("ebp", "r6"), ("esp", "r7")];

/// General purpose registers the target actually has.
const TARGET_GENERAL_REGISTERS: u8 = 3;

/// One parsed line of high assembly.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceLine {
    Line(Line),
    /// `&name:` opens a library function that sets up no stack frame.
    Frameless(String),
    Blank,
}

/// A parsed line plus its trailing `; comment`.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    pub line: SourceLine,
    pub comment: Option<String>,
}

/// Translates high assembly text to target assembly text.
///
/// The output starts with the register definitions, wraps every function in
/// an `@code` block, and ends with the `__init` block that calls `main`.
pub fn translate(source: &str) -> Result<String, TranslateError> {
    let mut translator = Translator::default();
    translator.header();
    for (i, text) in source.lines().enumerate() {
        let parsed = parse_line(i + 1, text)?;
        translator.line(i + 1, text, parsed)?;
    }
    translator.finish();
    log::debug!("translated {} lines", source.lines().count());
    Ok(translator.out)
}

// =====================================================================
// Parsing
// =====================================================================

pub fn parse_line(number: usize, text: &str) -> Result<Parsed, TranslateError> {
    let unrecognized = || TranslateError::Unrecognized {
        line: number,
        text: text.trim().to_string(),
    };

    let (code, comment) = match text.find(';') {
        Some(i) => (&text[..i], Some(text[i + 1..].trim().to_string())),
        None => (text, None),
    };
    let comment = comment.filter(|c| !c.is_empty());
    let code = code.trim();

    if code.is_empty() {
        let line = match comment {
            Some(c) => SourceLine::Line(Line::Comment(c)),
            None => SourceLine::Blank,
        };
        return Ok(Parsed {
            line,
            comment: None,
        });
    }

    let line = if let Some(rest) = code.strip_prefix('@') {
        let (name, value) = rest.split_once(':').ok_or_else(unrecognized)?;
        let name = name.trim();
        let value = value.trim().parse::<i64>().map_err(|_| unrecognized())?;
        if !is_identifier(name, false) {
            return Err(unrecognized());
        }
        SourceLine::Line(Line::Global {
            name: name.to_string(),
            value,
        })
    } else if let Some(rest) = code.strip_prefix('$') {
        let name = block_name(rest).ok_or_else(unrecognized)?;
        SourceLine::Line(Line::Function { name })
    } else if let Some(rest) = code.strip_prefix('&') {
        SourceLine::Frameless(block_name(rest).ok_or_else(unrecognized)?)
    } else if let Some(name) = code.strip_suffix(':') {
        let name = name.trim();
        if !is_identifier(name, true) {
            return Err(unrecognized());
        }
        SourceLine::Line(Line::Label {
            name: name.to_string(),
        })
    } else {
        let mut tokens = code
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|t| !t.is_empty());
        let mnemonic = tokens
            .next()
            .and_then(Mnemonic::from_name)
            .ok_or_else(unrecognized)?;
        let args = tokens
            .map(parse_arg)
            .collect::<Option<Vec<Arg>>>()
            .ok_or_else(unrecognized)?;
        SourceLine::Line(Line::instruction(mnemonic, args))
    };

    Ok(Parsed { line, comment })
}

fn block_name(rest: &str) -> Option<String> {
    let name = rest.strip_suffix(':')?.trim();
    is_identifier(name, false).then(|| name.to_string())
}

fn is_identifier(text: &str, allow_dots: bool) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || (allow_dots && c == '.'))
}

fn parse_arg(token: &str) -> Option<Arg> {
    if let Some(inner) = token.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
        let split = inner
            .char_indices()
            .skip(1)
            .find(|(_, c)| *c == '+' || *c == '-')
            .map(|(i, _)| i)?;
        let base = Reg::from_name(inner[..split].trim())?;
        let offset = inner[split..].trim().parse::<i64>().ok()?;
        return Some(Arg::Mem { base, offset });
    }
    if let Some(name) = token.strip_prefix('@') {
        return is_identifier(name, false).then(|| Arg::Global(name.to_string()));
    }
    if let Ok(value) = token.parse::<i64>() {
        return Some(Arg::Imm(value));
    }
    if let Some(reg) = Reg::from_name(token) {
        return Some(Arg::Reg(reg));
    }
    is_identifier(token, true).then(|| Arg::Label(token.to_string()))
}

// =====================================================================
// Emission
// =====================================================================

#[derive(Default)]
struct Translator {
    out: String,
    block_open: bool,
}

impl Translator {
    fn raw(&mut self, text: &str, comment: Option<&str>) {
        match comment {
            Some(c) => {
                let width = COMMENT_COLUMN.max(text.len() + 1);
                self.out
                    .push_str(&format!("{:<width$}; {}", text, c, width = width));
            }
            None => self.out.push_str(text),
        }
        self.out.push('\n');
    }

    fn instruction(&mut self, text: &str, comment: Option<&str>) {
        self.raw(&format!("{}{}", INDENT, text), comment);
    }

    fn header(&mut self) {
        for (name, register) in REGISTER_DEFINITIONS {
            self.raw(
                &format!("#define {} \"{}\"", name, register),
                Some("register definitions"),
            );
        }
        self.out.push('\n');
    }

    fn open_block(&mut self, kind: &str, name: &str, comment: Option<&str>) {
        self.close_block();
        self.raw(&format!("@{} {} {{", kind, name), comment);
        self.block_open = true;
    }

    fn close_block(&mut self) {
        if self.block_open {
            self.raw("@}", None);
            self.block_open = false;
        }
    }

    fn finish(&mut self) {
        self.close_block();
        self.open_block("code", "__init", None);
        self.instruction("DPMA", Some("set data memory access"));
        self.instruction("DEI", Some("disable interrupts"));
        self.instruction("LDI @esp, #0x7FFF", Some("init stack pointer"));
        self.instruction("JAL @edx, *main", Some("call main"));
        self.raw("idle:", None);
        self.instruction("JMP #idle", Some("idle after main returns"));
        self.close_block();
    }

    fn line(&mut self, number: usize, text: &str, parsed: Parsed) -> Result<(), TranslateError> {
        let comment = parsed.comment.as_deref();
        match parsed.line {
            SourceLine::Blank => {}
            SourceLine::Frameless(name) => self.open_block("code", &name, comment),
            SourceLine::Line(Line::Comment(c)) => self.raw(&format!("; {}", c), None),
            SourceLine::Line(Line::Global { name, value }) => {
                self.close_block();
                self.raw(&format!("@data {} {{", name), comment);
                self.instruction(&format!("#{}", value), None);
                self.raw("@}", None);
            }
            SourceLine::Line(Line::Function { name }) => {
                self.open_block("code", &name, comment);
                self.instruction("SUBI @esp, @esp, #1", Some("return address"));
                self.instruction("STORE @edx, @esp, #0", None);
            }
            SourceLine::Line(Line::Label { name }) => {
                self.raw(&format!("{}:", label_name(&name)), comment)
            }
            SourceLine::Line(Line::Instruction { mnemonic, args, .. }) => {
                self.instruction_line(number, text, mnemonic, &args, comment)?
            }
        }
        Ok(())
    }

    fn instruction_line(
        &mut self,
        number: usize,
        text: &str,
        mnemonic: Mnemonic,
        args: &[Arg],
        comment: Option<&str>,
    ) -> Result<(), TranslateError> {
        let reg = |r: &Reg| register(number, *r);

        match (mnemonic, args) {
            (Mnemonic::Load, [Arg::Reg(r), Arg::Mem { base, offset }]) => {
                let line = format!("LOAD {}, {}, #{}", reg(r)?, reg(base)?, offset);
                self.instruction(&line, comment);
            }
            (Mnemonic::Load, [Arg::Reg(r), Arg::Global(g)]) => {
                let line = format!("LOAD {}, @r0, *d*{}", reg(r)?, g);
                self.instruction(&line, comment);
            }
            (Mnemonic::Store, [Arg::Mem { base, offset }, Arg::Reg(r)]) => {
                let line = format!("STORE {}, {}, #{}", reg(r)?, reg(base)?, offset);
                self.instruction(&line, comment);
            }
            (Mnemonic::Store, [Arg::Global(g), Arg::Reg(r)]) => {
                let line = format!("STORE {}, @r0, *d*{}", reg(r)?, g);
                self.instruction(&line, comment);
            }
            (Mnemonic::Mov, [Arg::Reg(d), Arg::Imm(k)]) => {
                let line = format!("LDI {}, #{}", reg(d)?, k);
                self.instruction(&line, comment);
            }
            (Mnemonic::Mov, [Arg::Reg(d), Arg::Reg(s)]) => {
                let line = format!("MOV {}, {}", reg(d)?, reg(s)?);
                self.instruction(&line, comment);
            }
            (Mnemonic::Push, [Arg::Reg(r)]) => {
                let r = reg(r)?;
                self.instruction("SUBI @esp, @esp, #1", None);
                self.instruction(&format!("STORE {}, @esp, #0", r), comment);
            }
            (Mnemonic::Pop, [Arg::Reg(r)]) => {
                let r = reg(r)?;
                self.instruction(&format!("LOAD {}, @esp, #0", r), comment);
                self.instruction("ADDI @esp, @esp, #1", None);
            }
            (Mnemonic::Pusha, []) => {
                self.instruction("SUBI @esp, @esp, #3", comment.or(Some("save r1..r3")));
                for n in 1..=TARGET_GENERAL_REGISTERS {
                    self.instruction(&format!("STORE @r{}, @esp, #{}", n, n - 1), None);
                }
            }
            (Mnemonic::Popa, []) => {
                for n in (1..=TARGET_GENERAL_REGISTERS).rev() {
                    let note = match n {
                        TARGET_GENERAL_REGISTERS => comment.or(Some("restore r1..r3")),
                        _ => None,
                    };
                    self.instruction(&format!("LOAD @r{}, @esp, #{}", n, n - 1), note);
                }
                self.instruction("ADDI @esp, @esp, #3", None);
            }
            (m, [Arg::Reg(d), Arg::Reg(a), Arg::Imm(k)]) if m.is_alu() => {
                let line = format!("{}I {}, {}, #{}", alu_name(m), reg(d)?, reg(a)?, k);
                self.instruction(&line, comment);
            }
            (m, [Arg::Reg(d), Arg::Reg(a), Arg::Reg(b)]) if m.is_alu() => {
                let line = format!("{} {}, {}, {}", alu_name(m), reg(d)?, reg(a)?, reg(b)?);
                self.instruction(&line, comment);
            }
            (Mnemonic::Not, [Arg::Reg(d), Arg::Imm(k)]) => {
                let line = format!("LDI {}, #{}", reg(d)?, !k & 0xFFFF);
                self.instruction(&line, comment);
            }
            (Mnemonic::Not, [Arg::Reg(d), Arg::Reg(s)]) => {
                let line = format!("XORI {}, {}, #-1", reg(d)?, reg(s)?);
                self.instruction(&line, comment);
            }
            (Mnemonic::Neg, [Arg::Reg(d), Arg::Imm(k)]) => {
                let line = format!("LDI {}, #{}", reg(d)?, k.wrapping_neg() & 0xFFFF);
                self.instruction(&line, comment);
            }
            (Mnemonic::Neg, [Arg::Reg(d), Arg::Reg(s)]) => {
                let (d, s) = (reg(d)?, reg(s)?);
                self.instruction(&format!("XORI {}, {}, #-1", d, s), comment);
                self.instruction(&format!("ADDI {}, {}, #1", d, d), None);
            }
            (Mnemonic::Call, [Arg::Label(f)]) => {
                self.instruction(&format!("JAL @edx, *{}", f), comment);
            }
            (Mnemonic::Ret, [Arg::Imm(n)]) => {
                self.instruction("LOAD @edx, @esp, #0", Some("return address"));
                self.instruction(&format!("ADDI @esp, @esp, #{}", n + 1), None);
                self.instruction("JREG @edx", comment);
            }
            (Mnemonic::Ret, []) => self.instruction("JREG @edx", comment),
            (Mnemonic::Jmp, [Arg::Label(l)]) => {
                self.instruction(&format!("JMP #{}", label_name(l)), comment);
            }
            (Mnemonic::Jz, [Arg::Reg(r), Arg::Label(l)]) => {
                let line = format!("BEQZ {}, #{}", reg(r)?, label_name(l));
                self.instruction(&line, comment);
            }
            (Mnemonic::Jnz, [Arg::Reg(r), Arg::Label(l)]) => {
                let line = format!("BNEZ {}, #{}", reg(r)?, label_name(l));
                self.instruction(&line, comment);
            }
            (Mnemonic::In | Mnemonic::Out, [Arg::Reg(r), Arg::Imm(k)]) => {
                let line = format!("{} {}, #{}", mnemonic, reg(r)?, k);
                self.instruction(&line, comment);
            }
            _ => {
                return Err(TranslateError::BadOperands {
                    line: number,
                    mnemonic: mnemonic.to_string(),
                    text: text.trim().to_string(),
                });
            }
        }
        Ok(())
    }
}

fn register(line: usize, reg: Reg) -> Result<String, TranslateError> {
    match reg {
        Reg::General(n) if n > TARGET_GENERAL_REGISTERS => Err(TranslateError::UnsupportedRegister {
            line,
            register: reg.to_string(),
        }),
        other => Ok(format!("@{}", other)),
    }
}

fn alu_name(mnemonic: Mnemonic) -> &'static str {
    match mnemonic {
        Mnemonic::Rol => "CSHL",
        Mnemonic::Ror => "CSHR",
        Mnemonic::Eq => "SEQ",
        Mnemonic::Neq => "SNE",
        Mnemonic::Lt => "SLT",
        Mnemonic::Gt => "SGT",
        Mnemonic::Lte => "SLE",
        Mnemonic::Gte => "SGR",
        other => other.name(),
    }
}

/// Target labels cannot contain dots.
fn label_name(label: &str) -> String {
    label.replace('.', "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Translated lines without comments, header and `__init` block.
    fn body(source: &str) -> Vec<String> {
        let text = translate(source).unwrap();
        let lines: Vec<String> = text
            .lines()
            .map(|l| match l.find(';') {
                Some(i) => l[..i].trim_end().to_string(),
                None => l.to_string(),
            })
            .collect();
        let start = lines.iter().position(|l| l.is_empty()).unwrap() + 1;
        let end = lines.iter().position(|l| l == "@code __init {").unwrap();
        lines[start..end].to_vec()
    }

    #[test]
    fn test_header_and_init_block() {
        let text = translate("").unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("#define eax \"r4\""));
        assert!(lines[3].starts_with("#define esp \"r7\""));
        assert!(text.contains("@code __init {\n"));
        assert!(text.contains("   JAL @edx, *main"));
        assert!(text.contains("idle:\n   JMP #idle"));
        assert!(text.ends_with("@}\n"));
    }

    #[test]
    fn test_function_blocks() {
        assert_eq!(
            body("$f:\n    PUSH ebp\n    RET 1\n$main:\n    RET 0\n"),
            [
                "@code f {",
                "   SUBI @esp, @esp, #1",
                "   STORE @edx, @esp, #0",
                "   SUBI @esp, @esp, #1",
                "   STORE @ebp, @esp, #0",
                "   LOAD @edx, @esp, #0",
                "   ADDI @esp, @esp, #2",
                "   JREG @edx",
                "@}",
                "@code main {",
                "   SUBI @esp, @esp, #1",
                "   STORE @edx, @esp, #0",
                "   LOAD @edx, @esp, #0",
                "   ADDI @esp, @esp, #1",
                "   JREG @edx",
                "@}"
            ]
        );
    }

    #[test]
    fn test_globals() {
        assert_eq!(body("@g: -2\n"), ["@data g {", "   #-2", "@}"]);
    }

    #[test]
    fn test_memory_operands() {
        assert_eq!(
            body("$m:\n    LOAD r1 [ebp-3]\n    STORE [r2+0] r1\n    LOAD r3 @g\n    STORE @g r3\n")[3..7],
            [
                "   LOAD @r1, @ebp, #-3",
                "   STORE @r1, @r2, #0",
                "   LOAD @r3, @r0, *d*g",
                "   STORE @r3, @r0, *d*g"
            ]
        );
    }

    #[test]
    fn test_moves_and_alu() {
        let lines = body(
            "$m:\n    MOV r1 5\n    MOV ebp esp\n    ADD r1 r2 5\n    ROL r1 r2 r3\n    GTE r1 r1 0\n    ADD esp esp 2\n",
        );
        assert_eq!(
            lines[3..9],
            [
                "   LDI @r1, #5",
                "   MOV @ebp, @esp",
                "   ADDI @r1, @r2, #5",
                "   CSHL @r1, @r2, @r3",
                "   SGRI @r1, @r1, #0",
                "   ADDI @esp, @esp, #2"
            ]
        );
    }

    #[test]
    fn test_not_and_neg() {
        let lines = body("$m:\n    NOT r1 5\n    NEG r1 1\n    NOT r1 r2\n    NEG r1 r2\n");
        assert_eq!(
            lines[3..8],
            [
                "   LDI @r1, #65530",
                "   LDI @r1, #65535",
                "   XORI @r1, @r2, #-1",
                "   XORI @r1, @r2, #-1",
                "   ADDI @r1, @r1, #1"
            ]
        );
    }

    #[test]
    fn test_stack_operations() {
        let lines = body("$m:\n    PUSH r2\n    POP r3\n    PUSHA\n    POPA\n");
        assert_eq!(
            lines[3..15],
            [
                "   SUBI @esp, @esp, #1",
                "   STORE @r2, @esp, #0",
                "   LOAD @r3, @esp, #0",
                "   ADDI @esp, @esp, #1",
                "   SUBI @esp, @esp, #3",
                "   STORE @r1, @esp, #0",
                "   STORE @r2, @esp, #1",
                "   STORE @r3, @esp, #2",
                "   LOAD @r3, @esp, #2",
                "   LOAD @r2, @esp, #1",
                "   LOAD @r1, @esp, #0",
                "   ADDI @esp, @esp, #3"
            ]
        );
    }

    #[test]
    fn test_jumps_and_labels() {
        let lines = body(
            "$main:\nmain.while_0_start:\n    JZ r1 main.while_0_end\n    JNZ r1 main.while_0_start\n    JMP main.while_0_start\n    CALL f\nmain.while_0_end:\n",
        );
        assert_eq!(
            lines[3..9],
            [
                "main_while_0_start:",
                "   BEQZ @r1, #main_while_0_end",
                "   BNEZ @r1, #main_while_0_start",
                "   JMP #main_while_0_start",
                "   JAL @edx, *f",
                "main_while_0_end:"
            ]
        );
    }

    #[test]
    fn test_frameless_library_function() {
        assert_eq!(
            body("&putchar:\n    OUT r1 1\n    IN r2 3\n    RET\n"),
            [
                "@code putchar {",
                "   OUT @r1, #1",
                "   IN @r2, #3",
                "   JREG @edx",
                "@}"
            ]
        );
    }

    #[test]
    fn test_comments_are_kept() {
        let text = translate("; library\n$main:\n    MOV r1 2                            ; x\n").unwrap();
        assert!(text.contains("\n; library\n"));
        let line = text.lines().find(|l| l.starts_with("   LDI @r1, #2")).unwrap();
        assert_eq!(line.find(';'), Some(40));
        assert!(line.ends_with("; x"));
    }

    #[test]
    fn test_errors_carry_line_numbers() {
        assert_eq!(
            translate("$main:\n    FOO r1\n").unwrap_err(),
            TranslateError::Unrecognized {
                line: 2,
                text: "FOO r1".to_string()
            }
        );
        assert!(matches!(
            translate("    LOAD r1 5\n").unwrap_err(),
            TranslateError::BadOperands { line: 1, .. }
        ));
        assert_eq!(
            translate("\n\n    MOV r4 1\n").unwrap_err(),
            TranslateError::UnsupportedRegister {
                line: 3,
                register: "r4".to_string()
            }
        );
    }

    #[test]
    fn test_parse_line_shapes() {
        let parsed = parse_line(1, "    STORE [ebp+2] r1    ; param").unwrap();
        assert_eq!(parsed.comment.as_deref(), Some("param"));
        assert_eq!(
            parsed.line,
            SourceLine::Line(Line::instruction(
                Mnemonic::Store,
                vec![
                    Arg::Mem {
                        base: Reg::Ebp,
                        offset: 2
                    },
                    Arg::Reg(Reg::General(1))
                ]
            ))
        );
        assert_eq!(parse_line(2, "   ").unwrap().line, SourceLine::Blank);
        assert!(parse_line(3, "@g: x").is_err());
    }
}
