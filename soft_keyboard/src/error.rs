use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The soft keyboard was never shown, so there is no input to edit.
    MissingWidget,
    /// The activity was destroyed.
    Destroyed,
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::MissingWidget => write!(f, "no keyboard initialized"),
            Error::Destroyed => write!(f, "activity was destroyed"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
