use crate::codegen::registers::{DEFAULT_REGISTERS, MIN_REGISTERS};
use crate::semantic::ExternFunction;

/// Largest register pool accepted on the command line.
pub const MAX_REGISTERS: usize = 64;

/// Settings that change what the compiler produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerConfig {
    /// General purpose registers available to the allocator.
    pub registers: usize,
    /// Functions provided by assembly libraries.
    pub externs: Vec<ExternFunction>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            registers: DEFAULT_REGISTERS,
            externs: Vec::new(),
        }
    }
}

impl CompilerConfig {
    pub fn with_registers(mut self, registers: usize) -> Self {
        self.registers = registers.clamp(MIN_REGISTERS, MAX_REGISTERS);
        self
    }

    pub fn with_extern(mut self, function: ExternFunction) -> Self {
        self.externs.push(function);
        self
    }
}
