use std::fmt::{self, Display};

/// The kind of error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The backend sent a frame that violates the stream contract.
    MalformedFrame,
    /// The request could not be delivered or the stream was interrupted.
    Transport,
    /// Any other errors.
    Other,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::MalformedFrame => write!(f, "Malformed stream frame"),
            ErrorKind::Transport => write!(f, "Transport error"),
            ErrorKind::Other => write!(f, "Backend error"),
        }
    }
}
