//! Linear form to high assembly.
//!
//! `generator` walks each function body once, `registers` decides where
//! values live, and `writer` collects the emitted `instr::Line`s.

pub mod codegen_error;
pub mod generator;
pub mod instr;
pub mod labels;
pub mod registers;
pub mod writer;

pub use codegen_error::CodegenError;
pub use generator::generate;
