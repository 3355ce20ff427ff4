//! Error types for the Sable engine

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Engine error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Source text could not be parsed
    #[error("parse error at line {line}: {message}")]
    Parse {
        /// 1-based source line of the offending token
        line: u32,
        /// What went wrong
        message: String,
    },

    /// A runtime error raised by the VM or by script code via `error(...)`
    #[error("{0}")]
    Runtime(String),

    /// A slot held a value of the wrong kind
    #[error("expected {expected}, received {got}")]
    Type {
        /// Name of the expected kind
        expected: &'static str,
        /// Name of the actual kind
        got: &'static str,
    },

    /// Constructor overload resolution found no matching arity
    #[error("no constructor of arity {got} for '{type_name}'")]
    Arity {
        /// The registered user-type name
        type_name: String,
        /// Number of arguments provided
        got: usize,
    },

    /// A stack index was out of range for the current frame
    #[error("invalid stack index {0}")]
    InvalidIndex(i32),

    /// A script file could not be read
    #[error("cannot open script: {0}")]
    Io(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
