use thiserror::Error;

/// Every fallible operation of the engine reports one of these.
///
/// Non-convergence of an SCF or embedding loop is deliberately absent: it is
/// reported through a `converged` flag and a log warning, not as an error.
#[derive(Error, Debug)]
pub enum XtpError {
    /// A required option is missing, malformed, or names an unknown choice.
    #[error("configuration error: {0}")]
    Config(String),

    /// The requested combination of inputs is not supported, e.g. mixed
    /// complex screening frequencies or reordering of f-functions.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Two quantities that must agree in size do not.
    #[error("dimension mismatch in {context}: expected {expected}, found {found}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        found: usize,
    },

    /// A derived quantity was requested before the data it is derived from exists.
    #[error("missing data: {0}")]
    MissingData(String),

    /// A matrix decomposition failed (singular, not positive definite, no convergence).
    #[error("numerical failure: {0}")]
    Numerical(String),

    /// No excited state passed the configured oscillator-strength/charge-transfer filters.
    #[error("excited state filter yields no states")]
    NoStatesSurviveFilter,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, XtpError>;
