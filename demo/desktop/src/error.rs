use std::fmt::Display;

use crosscall_boundary::{InvocationError, LoadError, SignatureError, TryFromError};

#[derive(Debug)]
pub enum Error {
    Load(LoadError),
    Invocation(InvocationError),
    Signature(SignatureError),
    Conversion(TryFromError),
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Load(e) => e.fmt(f),
            Error::Invocation(e) => e.fmt(f),
            Error::Signature(e) => write!(f, "invalid declaration: {e}"),
            Error::Conversion(e) => write!(f, "unexpected native result: {e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<LoadError> for Error {
    fn from(err: LoadError) -> Self {
        Error::Load(err)
    }
}

impl From<InvocationError> for Error {
    fn from(err: InvocationError) -> Self {
        Error::Invocation(err)
    }
}

impl From<SignatureError> for Error {
    fn from(err: SignatureError) -> Self {
        Error::Signature(err)
    }
}

impl From<TryFromError> for Error {
    fn from(err: TryFromError) -> Self {
        Error::Conversion(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
