use onair_detect::DetectError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OnairError {
    #[error("detection failed: {0}")]
    Detection(#[from] DetectError),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Compile- or evaluation-time failure of a display expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("unknown name `{0}`")]
    UnknownName(String),

    #[error("unknown function `{0}`")]
    UnknownFunction(String),

    #[error("{function}() takes {expected} argument(s), {found} given")]
    Arity {
        function: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("type error: {0}")]
    Type(String),

    /// A field the current record does not carry (no record, or no timeline).
    #[error("`{0}` is not available")]
    Missing(&'static str),
}
