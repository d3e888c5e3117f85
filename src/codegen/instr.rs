/// High assembly mnemonics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mnemonic {
    // =================================================================
    // Memory and moves
    // =================================================================
    Load,
    Store,
    Mov,
    Push,
    Pop,
    Pusha,
    Popa,

    // =================================================================
    // Arithmetic and logic: MNEMONIC dst src (src|imm)
    // =================================================================
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Rol,
    Ror,
    Not,
    Neg,

    // Comparisons produce 0 or 1
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    Neq,

    // =================================================================
    // Control flow
    // =================================================================
    Call,
    Ret,
    Jmp,
    Jz,
    Jnz,

    // Port I/O, only found in hand-written library code
    In,
    Out,
}

impl Mnemonic {
    const ALL: [Mnemonic; 32] = [
        Mnemonic::Load,
        Mnemonic::Store,
        Mnemonic::Mov,
        Mnemonic::Push,
        Mnemonic::Pop,
        Mnemonic::Pusha,
        Mnemonic::Popa,
        Mnemonic::Add,
        Mnemonic::Sub,
        Mnemonic::Mul,
        Mnemonic::And,
        Mnemonic::Or,
        Mnemonic::Xor,
        Mnemonic::Shl,
        Mnemonic::Shr,
        Mnemonic::Rol,
        Mnemonic::Ror,
        Mnemonic::Not,
        Mnemonic::Neg,
        Mnemonic::Lt,
        Mnemonic::Lte,
        Mnemonic::Gt,
        Mnemonic::Gte,
        Mnemonic::Eq,
        Mnemonic::Neq,
        Mnemonic::Call,
        Mnemonic::Ret,
        Mnemonic::Jmp,
        Mnemonic::Jz,
        Mnemonic::Jnz,
        Mnemonic::In,
        Mnemonic::Out,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Mnemonic::Load => "LOAD",
            Mnemonic::Store => "STORE",
            Mnemonic::Mov => "MOV",
            Mnemonic::Push => "PUSH",
            Mnemonic::Pop => "POP",
            Mnemonic::Pusha => "PUSHA",
            Mnemonic::Popa => "POPA",
            Mnemonic::Add => "ADD",
            Mnemonic::Sub => "SUB",
            Mnemonic::Mul => "MUL",
            Mnemonic::And => "AND",
            Mnemonic::Or => "OR",
            Mnemonic::Xor => "XOR",
            Mnemonic::Shl => "SHL",
            Mnemonic::Shr => "SHR",
            Mnemonic::Rol => "ROL",
            Mnemonic::Ror => "ROR",
            Mnemonic::Not => "NOT",
            Mnemonic::Neg => "NEG",
            Mnemonic::Lt => "LT",
            Mnemonic::Lte => "LTE",
            Mnemonic::Gt => "GT",
            Mnemonic::Gte => "GTE",
            Mnemonic::Eq => "EQ",
            Mnemonic::Neq => "NEQ",
            Mnemonic::Call => "CALL",
            Mnemonic::Ret => "RET",
            Mnemonic::Jmp => "JMP",
            Mnemonic::Jz => "JZ",
            Mnemonic::Jnz => "JNZ",
            Mnemonic::In => "IN",
            Mnemonic::Out => "OUT",
        }
    }

    /// Case-insensitive lookup by name.
    pub fn from_name(name: &str) -> Option<Mnemonic> {
        Mnemonic::ALL
            .iter()
            .copied()
            .find(|m| m.name().eq_ignore_ascii_case(name))
    }

    /// Three-operand ALU instructions whose last operand may be an immediate.
    pub fn is_alu(self) -> bool {
        use Mnemonic::*;
        matches!(
            self,
            Add | Sub | Mul | And | Or | Xor | Shl | Shr | Rol | Ror | Lt | Lte | Gt | Gte | Eq | Neq
        )
    }
}

impl std::fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Register names. `General(n)` is `rn`, counted from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg {
    /// `r0`, hard-wired to zero on the target.
    Zero,
    General(u8),
    /// Accumulator: return values.
    Eax,
    /// Spare temporary; holds the return address on the target.
    Edx,
    Ebp,
    Esp,
}

impl Reg {
    pub fn from_name(name: &str) -> Option<Reg> {
        match name.to_ascii_lowercase().as_str() {
            "r0" => Some(Reg::Zero),
            "eax" => Some(Reg::Eax),
            "edx" => Some(Reg::Edx),
            "ebp" => Some(Reg::Ebp),
            "esp" => Some(Reg::Esp),
            other => other
                .strip_prefix('r')
                .and_then(|n| n.parse::<u8>().ok())
                .filter(|n| *n > 0)
                .map(Reg::General),
        }
    }
}

impl std::fmt::Display for Reg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reg::Zero => write!(f, "r0"),
            Reg::General(n) => write!(f, "r{}", n),
            Reg::Eax => write!(f, "eax"),
            Reg::Edx => write!(f, "edx"),
            Reg::Ebp => write!(f, "ebp"),
            Reg::Esp => write!(f, "esp"),
        }
    }
}

/// One instruction operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Reg(Reg),
    Imm(i64),
    /// `[base+offset]`
    Mem { base: Reg, offset: i64 },
    /// `@name`
    Global(String),
    /// Jump or call target.
    Label(String),
}

impl std::fmt::Display for Arg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Arg::Reg(r) => write!(f, "{}", r),
            Arg::Imm(n) => write!(f, "{}", n),
            Arg::Mem { base, offset } => write!(f, "[{}{:+}]", base, offset),
            Arg::Global(name) => write!(f, "@{}", name),
            Arg::Label(name) => write!(f, "{}", name),
        }
    }
}

impl From<Reg> for Arg {
    fn from(reg: Reg) -> Self {
        Arg::Reg(reg)
    }
}

/// Column where trailing comments start.
const COMMENT_COLUMN: usize = 40;

/// One line of high assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// `@name: value`
    Global { name: String, value: i64 },
    /// `$name:` opens a function with a stack frame.
    Function { name: String },
    /// `name:`
    Label { name: String },
    Instruction {
        mnemonic: Mnemonic,
        args: Vec<Arg>,
        comment: Option<String>,
    },
    Comment(String),
}

impl Line {
    pub fn instruction(mnemonic: Mnemonic, args: Vec<Arg>) -> Line {
        Line::Instruction {
            mnemonic,
            args,
            comment: None,
        }
    }

    pub fn mnemonic(&self) -> Option<Mnemonic> {
        match self {
            Line::Instruction { mnemonic, .. } => Some(*mnemonic),
            _ => None,
        }
    }
}

impl std::fmt::Display for Line {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Line::Global { name, value } => write!(f, "@{}: {}", name, value),
            Line::Function { name } => write!(f, "${}:", name),
            Line::Label { name } => write!(f, "{}:", name),
            Line::Comment(text) => write!(f, "; {}", text),
            Line::Instruction {
                mnemonic,
                args,
                comment,
            } => {
                let mut text = format!("    {}", mnemonic);
                for arg in args {
                    text.push(' ');
                    text.push_str(&arg.to_string());
                }
                match comment {
                    Some(comment) => {
                        let width = COMMENT_COLUMN.max(text.len() + 1);
                        write!(f, "{:<width$}; {}", text, comment, width = width)
                    }
                    None => write!(f, "{}", text),
                }
            }
        }
    }
}
