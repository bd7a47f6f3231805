//! Crate-wide error type.
//!
//! Every fallible operation returns [`CraterError`]. The `kind` lets callers
//! branch on the failure category; the exit code lets a front-end abort the
//! process with a distinct status per fatal category.

/// Failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A named production/chronology/epoch system is absent from the definitions.
    ConfigNotFound,
    /// Unknown binning policy name.
    InvalidBinningPolicy,
    /// Nothing to fit.
    EmptyFitRange,
    /// Buffered Poisson requested for a count without a perimeter.
    BufferedCountMissingPerimeter,
    /// Malformed count data or arguments.
    InvalidInput,
    /// Malformed model definition.
    InvalidDefinition,
    /// Chronology formula failed to parse or references unknown names.
    InvalidExpression,
    /// File access or (de)serialisation failure.
    Io,
    /// Random sampling could not satisfy its constraints.
    Sampling,
}

impl ErrorKind {
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorKind::InvalidInput | ErrorKind::InvalidBinningPolicy => 2,
            ErrorKind::EmptyFitRange => 3,
            ErrorKind::ConfigNotFound
            | ErrorKind::InvalidDefinition
            | ErrorKind::InvalidExpression => 4,
            ErrorKind::BufferedCountMissingPerimeter => 5,
            ErrorKind::Io => 6,
            ErrorKind::Sampling => 7,
        }
    }
}

#[derive(Clone)]
pub struct CraterError {
    kind: ErrorKind,
    message: String,
}

impl CraterError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn exit_code(&self) -> u8 {
        self.kind.exit_code()
    }

    pub fn config_not_found(what: &str, name: &str) -> Self {
        Self::new(ErrorKind::ConfigNotFound, format!("{what} not found: {name}"))
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    pub fn invalid_definition(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidDefinition, message)
    }
}

impl std::fmt::Display for CraterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for CraterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CraterError")
            .field("kind", &self.kind)
            .field("exit_code", &self.exit_code())
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for CraterError {}

impl From<std::io::Error> for CraterError {
    fn from(e: std::io::Error) -> Self {
        Self::new(ErrorKind::Io, e.to_string())
    }
}

impl From<serde_json::Error> for CraterError {
    fn from(e: serde_json::Error) -> Self {
        Self::new(ErrorKind::Io, format!("JSON error: {e}"))
    }
}
