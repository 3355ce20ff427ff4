//! Error types for the embedding layer

/// Result type for embedding operations
pub type Result<T> = std::result::Result<T, Error>;

/// Embedding error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// A stack slot or script value held the wrong kind for the requested
    /// host type
    #[error("expected {expected}, received {got}")]
    TypeMismatch {
        /// Name of the expected kind
        expected: &'static str,
        /// Name of the actual kind
        got: &'static str,
    },

    /// A call crossed the boundary with an argument count no overload
    /// accepts
    #[error("no overload of '{name}' takes {got} arguments")]
    ArityMismatch {
        /// The callable's registered name
        name: String,
        /// Number of arguments provided
        got: usize,
    },

    /// A script failed to parse or raised a runtime error
    #[error("{0}")]
    Script(String),

    /// A user-type registration was invalid or missing
    #[error("registration error: {0}")]
    Registration(String),
}

impl From<sable_engine::Error> for Error {
    fn from(e: sable_engine::Error) -> Self {
        match e {
            sable_engine::Error::Type { expected, got } => Error::TypeMismatch { expected, got },
            sable_engine::Error::Arity { type_name, got } => Error::ArityMismatch {
                name: type_name,
                got,
            },
            other => Error::Script(other.to_string()),
        }
    }
}

impl Error {
    /// Lower a host-side error back into the engine's error space, for
    /// surfacing out of native trampolines.
    pub(crate) fn into_engine(self) -> sable_engine::Error {
        match self {
            Error::TypeMismatch { expected, got } => sable_engine::Error::Type { expected, got },
            other => sable_engine::Error::Runtime(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_type_errors_convert_losslessly() {
        let e = Error::from(sable_engine::Error::Type {
            expected: "number",
            got: "string",
        });
        assert_eq!(e.to_string(), "expected number, received string");
        assert!(matches!(e, Error::TypeMismatch { .. }));
    }

    #[test]
    fn engine_arity_errors_convert() {
        let e = Error::from(sable_engine::Error::Arity {
            type_name: "fuser".into(),
            got: 3,
        });
        assert!(matches!(e, Error::ArityMismatch { got: 3, .. }));
    }

    #[test]
    fn runtime_errors_become_script_errors() {
        let e = Error::from(sable_engine::Error::Runtime("boom".into()));
        assert_eq!(e.to_string(), "boom");
        assert!(matches!(e, Error::Script(_)));
    }
}
