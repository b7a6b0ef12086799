use std::borrow::Cow;
use std::error::Error;
use std::fmt::{self, Display};

/// The kind of error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ToolErrorKind {
    /// The model asked for a capability that is not registered.
    UnknownCapability,
    /// The arguments provided by the model were invalid.
    InvalidArguments,
    /// Error occurred while executing the capability.
    ExecutionError,
    /// The capability observed cancellation and gave up.
    Cancelled,
}

impl Display for ToolErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolErrorKind::UnknownCapability => write!(f, "Unknown function"),
            ToolErrorKind::InvalidArguments => write!(f, "Invalid arguments"),
            ToolErrorKind::ExecutionError => write!(f, "Execution error"),
            ToolErrorKind::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Describes a failed capability call.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ToolError {
    kind: ToolErrorKind,
    reason: Option<String>,
}

impl ToolError {
    /// Creates an error for a capability name that is not registered.
    #[inline]
    pub fn unknown_capability(name: &str) -> Self {
        Self {
            kind: ToolErrorKind::UnknownCapability,
            reason: Some(format!("Unknown function: {name}")),
        }
    }

    /// Creates a new error with the `InvalidArguments` kind.
    #[inline]
    pub fn invalid_arguments() -> Self {
        Self {
            kind: ToolErrorKind::InvalidArguments,
            reason: None,
        }
    }

    /// Creates a new error with the `ExecutionError` kind.
    #[inline]
    pub fn execution_error() -> Self {
        Self {
            kind: ToolErrorKind::ExecutionError,
            reason: None,
        }
    }

    /// Creates a new error with the `Cancelled` kind.
    ///
    /// Returning it from a tool ends the whole run.
    #[inline]
    pub fn cancelled() -> Self {
        Self {
            kind: ToolErrorKind::Cancelled,
            reason: None,
        }
    }

    /// Attaches a reason to the error.
    #[inline]
    pub fn with_reason<S: Into<String>>(self, reason: S) -> Self {
        Self {
            kind: self.kind,
            reason: Some(reason.into()),
        }
    }

    /// Returns the kind of the error.
    #[inline]
    pub fn kind(&self) -> ToolErrorKind {
        self.kind
    }

    /// Returns the reason for the error.
    #[inline]
    pub fn reason(&self) -> Cow<'_, str> {
        match self.reason.as_deref() {
            Some(reason) => Cow::Borrowed(reason),
            None => Cow::Owned(format!("{}", self.kind)),
        }
    }
}

impl Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason())
    }
}

impl Error for ToolError {}
