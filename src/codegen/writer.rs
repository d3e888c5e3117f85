use crate::codegen::instr::{Arg, Line, Mnemonic};

/// Collects high assembly lines in emission order.
#[derive(Debug, Default)]
pub struct Writer {
    lines: Vec<Line>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, mnemonic: Mnemonic, args: Vec<Arg>) {
        self.lines.push(Line::instruction(mnemonic, args));
    }

    pub fn emit_commented(&mut self, mnemonic: Mnemonic, args: Vec<Arg>, comment: impl Into<String>) {
        self.lines.push(Line::Instruction {
            mnemonic,
            args,
            comment: Some(comment.into()),
        });
    }

    pub fn label(&mut self, name: impl Into<String>) {
        self.lines.push(Line::Label { name: name.into() });
    }

    pub fn function(&mut self, name: impl Into<String>) {
        self.lines.push(Line::Function { name: name.into() });
    }

    pub fn global(&mut self, name: impl Into<String>, value: i64) {
        self.lines.push(Line::Global {
            name: name.into(),
            value,
        });
    }

    /// Mnemonic of the last line, if it is an instruction.
    pub fn last_mnemonic(&self) -> Option<Mnemonic> {
        self.lines.last().and_then(|l| l.mnemonic())
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<Line> {
        self.lines
    }
}

/// Renders lines as text, one per line, with a trailing newline.
pub fn render(lines: &[Line]) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(&line.to_string());
        out.push('\n');
    }
    out
}
