use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while compiling or rendering a template.
///
/// Compilation is all-or-nothing: any `Syntax` error aborts it. Likewise a
/// render aborts on the first error; no partial output is ever returned.
#[derive(Debug, Error)]
pub enum Error {
    /// The template text does not conform to the grammar. Positions are
    /// 1-based and refer to the original source text.
    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax {
        message: String,
        line: usize,
        column: usize,
    },

    /// A dotted name could not be resolved against the context by any of the
    /// three resolution shapes (mapping key, zero-arg method, attribute).
    #[error("unknown context variable '{name}' (unresolved segment '{segment}')")]
    UnknownContextValue { name: String, segment: String },

    /// A filter name was not present in the registry at render time.
    #[error("unknown filter '{name}'")]
    UnrecognisedFilter { name: String },

    /// A filter was invoked with arguments outside its arity spec.
    #[error("unexpected filter arguments in '{filter}': {detail}")]
    UnexpectedFilterArguments { filter: String, detail: String },

    /// A `for` loop was given a value that cannot be iterated.
    #[error("'{type_name}' value is not iterable")]
    NotIterable { type_name: &'static str },

    /// A call expression targeted a value that is not callable.
    #[error("'{type_name}' value is not callable")]
    NotCallable { type_name: &'static str },

    /// An index or slice expression targeted a value that supports neither.
    #[error("cannot index into '{type_name}' value")]
    NotIndexable { type_name: &'static str },

    /// An operator was applied to operand types it is not defined for.
    #[error("unsupported operand types for '{op}': '{left}' and '{right}'")]
    UnsupportedOperand {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    /// A multi-target `for` loop received an item whose shape does not match
    /// the target list.
    #[error("cannot unpack item of length {got} into {expected} loop targets")]
    UnpackMismatch { expected: usize, got: usize },

    /// Any other failure while evaluating an expression (bad index, zero
    /// slice step, non-string map key, and similar).
    #[error("evaluation error: {message}")]
    Evaluation { message: String },

    /// A context payload could not be used as a render context.
    #[error("invalid context: {message}")]
    InvalidContext { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for an [`Error::Evaluation`] with the given message. Also
    /// handy in custom filters and callable context values.
    pub fn eval(message: impl Into<String>) -> Self {
        Error::Evaluation {
            message: message.into(),
        }
    }
}
