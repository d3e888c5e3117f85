use std::path::PathBuf;

use thiserror::Error;

use crate::codegen::CodegenError;
use crate::frontend::lexer::LexerError;
use crate::frontend::parser_error::ParserError;
use crate::lang::balance::BalanceError;
use crate::semantic::SemanticError;
use crate::target::translate_error::TranslateError;

/// Any failure between reading the source and writing the assembly.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Lexer(#[from] LexerError),

    #[error("{0}")]
    Parser(#[from] ParserError),

    #[error("{0}")]
    Semantic(#[from] SemanticError),

    #[error("internal error: {0}")]
    Balance(#[from] BalanceError),

    #[error("internal error: {0}")]
    Codegen(#[from] CodegenError),

    #[error("{0}")]
    Translate(#[from] TranslateError),

    #[error("IR artifact: {0}")]
    Artifact(#[from] postcard::Error),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
