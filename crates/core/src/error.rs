use std::error::Error as StdError;
use std::fmt::{self, Display};

use neo_model::{ErrorKind, ModelProviderError};

use crate::settings::ValidationError;

/// Errors reported by a chat session.
///
/// None of them are fatal. After any of them the session is idle again and
/// the history is intact, except for the turn that failed.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// A settings value outside its domain. Nothing was changed.
    Validation(ValidationError),
    /// The provider could not be reached or refused the request.
    ProviderCallFailed {
        /// Classification of the failure.
        kind: ErrorKind,
        /// The diagnostic message reported by the provider.
        message: String,
    },
    /// The call succeeded, but the reply lacks the expected fields.
    UnexpectedResponse(String),
    /// The provider answered without any text.
    EmptyResponse,
    /// A turn is already in flight.
    TurnInProgress,
    /// The turn is no longer current, for example because the history was
    /// cleared while it was in flight. Its outcome was dropped.
    TurnDiscarded,
}

impl Error {
    /// Converts a provider error, keeping its kind and message.
    pub fn from_provider(err: &dyn ModelProviderError) -> Self {
        match err.kind() {
            ErrorKind::InvalidResponse => {
                Error::UnexpectedResponse(err.message())
            }
            kind => Error::ProviderCallFailed {
                kind,
                message: err.message(),
            },
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Validation(err) => write!(f, "invalid setting: {err}"),
            Error::ProviderCallFailed { kind, message } => {
                write!(f, "provider call failed ({kind}): {message}")
            }
            Error::UnexpectedResponse(message) => {
                write!(f, "unexpected response format: {message}")
            }
            Error::EmptyResponse => write!(f, "the model returned no text"),
            Error::TurnInProgress => {
                write!(f, "a response is still being generated")
            }
            Error::TurnDiscarded => {
                write!(f, "the response was dropped since the history changed")
            }
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Validation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for Error {
    #[inline]
    fn from(err: ValidationError) -> Self {
        Error::Validation(err)
    }
}
