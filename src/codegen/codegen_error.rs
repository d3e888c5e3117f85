use thiserror::Error;

/// Failures while lowering linear form to high assembly.
///
/// Everything except `PoolTooSmall` points at an inconsistency between the
/// parser's output and the generator, not at a problem in the user program.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodegenError {
    #[error("register pool of {requested} is too small, at least {minimum} registers are needed")]
    PoolTooSmall { requested: usize, minimum: usize },

    #[error("internal error: intermediate result %{0} is neither in a register nor spilled")]
    IntermediateNotFound(u32),

    #[error("internal error: every register is pinned by the current instruction")]
    NoRegisterAvailable,

    #[error("internal error: a spilled result sits between the arguments of `{0}`")]
    SpillAcrossCall(String),

    #[error("internal error: call to `{0}` returned without a recorded argument list")]
    UnmatchedCall(String),

    #[error("internal error in `{function}`: unexpected {element}")]
    UnexpectedElement { function: String, element: String },

    #[error("internal error in `{function}`: `{operator}` is missing operands")]
    MissingOperands { function: String, operator: String },

    #[error("internal error in `{0}`: `break` outside of a loop")]
    BreakOutsideLoop(String),

    #[error("`{0}` has no body")]
    MissingBody(String),
}
