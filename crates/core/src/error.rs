use relay_model::{ErrorKind, ModelProviderError};

/// Errors that end a run.
///
/// Failures of individual tool calls never show up here, they are turned
/// into `tool` messages so that the model can react to them.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum Error {
    /// The cancellation token fired.
    #[error("the run was cancelled")]
    Cancelled,
    /// The model kept calling tools for the whole turn budget.
    #[error("exceeded the maximum of {0} turns without a final answer")]
    MaxTurnsExceeded(u32),
    /// The backend violated the stream frame contract.
    #[error("malformed stream frame: {0}")]
    MalformedStreamFrame(String),
    /// The backend could not be reached or rejected the request.
    #[error("{kind}: {message}")]
    Backend {
        /// What went wrong.
        kind: ErrorKind,
        /// The message reported by the provider.
        message: String,
    },
    /// Two capabilities of one agent share a name.
    #[error("duplicate capability name: {0}")]
    DuplicateCapability(String),
}

impl Error {
    pub(crate) fn from_provider(err: &dyn ModelProviderError) -> Self {
        match err.kind() {
            ErrorKind::MalformedFrame => {
                Error::MalformedStreamFrame(err.to_string())
            }
            kind => Error::Backend {
                kind,
                message: err.to_string(),
            },
        }
    }
}
