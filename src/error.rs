//! Typed error taxonomy, one variant per distinct process exit code.
//!
//! Constructing an [`Error`] and picking its exit code are never two separate
//! decisions: [`Error::exit_code`] maps each variant to the code the
//! surrounding binary must terminate with.

use thiserror::Error;

/// Every error the loader or executor can raise, in one closed taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot open document or input file: {0}")]
    MissingFile(String),

    #[error("program document is not well-formed: {0}")]
    BadDocument(String),

    #[error("malformed program structure: {0}")]
    BadStructure(String),

    #[error("semantic error: {0}")]
    SemanticError(String),

    #[error("type error in instruction {order}: {message}")]
    TypeError { order: u32, message: String },

    #[error("access to undefined variable in instruction {order}: {name}")]
    AccessUndefinedVariable { order: u32, name: String },

    #[error("access to undefined frame in instruction {order}")]
    UndefinedFrame { order: u32 },

    #[error("missing value in instruction {order}: {message}")]
    MissingValue { order: u32, message: String },

    #[error("bad operand value in instruction {order}: {message}")]
    BadValue { order: u32, message: String },

    #[error("string operation error in instruction {order}: {message}")]
    StringError { order: u32, message: String },
}

impl Error {
    /// The process exit status this error kind terminates the run with.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::MissingFile(_) => 11,
            Error::BadDocument(_) => 31,
            Error::BadStructure(_) => 32,
            Error::SemanticError(_) => 52,
            Error::TypeError { .. } => 53,
            Error::AccessUndefinedVariable { .. } => 54,
            Error::UndefinedFrame { .. } => 55,
            Error::MissingValue { .. } => 56,
            Error::BadValue { .. } => 57,
            Error::StringError { .. } => 58,
        }
    }
}

impl From<String> for Error {
    /// A bare validation message from an operand/structure check is always
    /// a `BadStructure` — the one load-time catch-all for lexical problems.
    fn from(message: String) -> Self {
        Error::BadStructure(message)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
