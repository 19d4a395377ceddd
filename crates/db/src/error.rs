use core::fmt::{self, Display};
use model::Invalid;

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// The quiz violates one of its invariants.
    BadInput(Invalid),
    /// No quiz exists under the requested name.
    NotFound,
    /// Unrecoverable storage error.
    Fatal,
}

impl From<Invalid> for Error {
    fn from(err: Invalid) -> Self {
        Self::BadInput(err)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadInput(err) => err.fmt(f),
            Self::NotFound => f.write_str("Quiz not found."),
            Self::Fatal => f.write_str("We encountered an unexpected storage error on our end."),
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;
