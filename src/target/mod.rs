//! High assembly to target assembly, one line at a time.

pub mod translate_error;
pub mod translator;

pub use translator::translate;
