use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TranslateError {
    #[error("line {line}: unrecognized high assembly `{text}`")]
    Unrecognized { line: usize, text: String },

    #[error("line {line}: operands do not fit `{mnemonic}` in `{text}`")]
    BadOperands {
        line: usize,
        mnemonic: String,
        text: String,
    },

    #[error("line {line}: register `{register}` does not exist on the target")]
    UnsupportedRegister { line: usize, register: String },
}
