use miette::Diagnostic;
use thiserror::Error;

/// Unified error type for the non-resolution parts of depot.
///
/// Resolution failures have their own structured type in `depot-resolver`;
/// this one covers configuration loading and the plumbing around it.
#[derive(Debug, Error, Diagnostic)]
pub enum DepotError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or malformed configuration file.
    #[error("Configuration error: {message}")]
    #[diagnostic(
        code(depot::config),
        help("Check your depot.toml for syntax errors and unknown keys")
    )]
    Config { message: String },

    /// A version or constraint string could not be parsed.
    #[error("Invalid version: {message}")]
    Version { message: String },

    /// Catch-all for miscellaneous errors.
    #[error("{message}")]
    Generic { message: String },
}

/// Convenience alias for `miette::Result<T>`.
pub type DepotResult<T> = miette::Result<T>;
