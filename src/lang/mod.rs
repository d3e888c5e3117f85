//! # Linear form
//!
//! The intermediate representation shared by the front end and the code
//! generator: a flat sequence of operands, operators, structural markers
//! and keywords per function.
//!
//! ## Conventions
//!
//! - Expressions are postfix: operands first, operator last.
//! - `%n` is an intermediate result, `#n` a constant, `Pn` an argument slot
//!   and `f/n()` the result of calling `f` with `n` arguments.

pub mod balance;
pub mod dump;
pub mod element;
pub mod operand;
pub mod operator;
pub mod program;
pub mod types;
