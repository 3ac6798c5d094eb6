use thiserror::Error;

macro_rules! corrupt_dump {
    ($offset:expr, $msg:expr) => {
        crate::Error::CorruptDump {
            offset: $offset as u64,
            message: $msg.to_string(),
        }
    };

    ($offset:expr, $fmt:expr, $($arg:tt)*) => {
        crate::Error::CorruptDump {
            offset: $offset as u64,
            message: format!($fmt, $($arg)*),
        }
    };
}

pub(crate) use corrupt_dump;

/// Errors produced while reading a dump, building its indexes, or running
/// queries against it.
#[derive(Error, Debug)]
pub enum Error {
    /// The dump violates the HPROF layout. `offset` is the byte position of
    /// the offending record.
    #[error("corrupt heap dump at offset {offset:#x}: {message}")]
    CorruptDump { offset: u64, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid class name pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// The query text does not follow `select <expr> [from [instanceof] <class> <ident> [where <expr>]]`.
    #[error("query syntax error: {0}")]
    QuerySyntax(String),

    /// A selection or predicate failed to compile or raised an error while running.
    #[error("error evaluating '{expression}': {message}")]
    QueryEvaluation { expression: String, message: String },

    #[error("query engine is not available in this build")]
    UnsupportedQuery,
}

pub type Result<T> = std::result::Result<T, Error>;
