use std::fmt::Display;

use crate::ValueType;

/// A native module could not be loaded. Fatal for the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// No loader could locate the module. `searched` lists what was tried.
    NotFound {
        identifier: String,
        searched: Vec<String>,
    },
    /// The module was found but could not be opened or refused to initialize.
    InitFailed { identifier: String, reason: String },
}

impl Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::NotFound {
                identifier,
                searched,
            } => {
                write!(f, "native module '{identifier}' not found")?;
                if !searched.is_empty() {
                    write!(f, " (searched: {})", searched.join(", "))?;
                }
                Ok(())
            }
            LoadError::InitFailed { identifier, reason } => {
                write!(f, "native module '{identifier}' failed to initialize: {reason}")
            }
        }
    }
}

impl std::error::Error for LoadError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    /// No loaded module exports the entry point.
    NotFound { name: String },
}

impl Display for ResolutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolutionError::NotFound { name } => {
                write!(f, "no loaded module exports entry point '{name}'")
            }
        }
    }
}

impl std::error::Error for ResolutionError {}

/// A call through the dispatcher failed. Type mismatches between declaration
/// and arguments are programming errors and panic instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationError {
    Unresolved(ResolutionError),
    NativeFault {
        entry_point: String,
        message: String,
    },
}

impl Display for InvocationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvocationError::Unresolved(e) => write!(f, "unresolved: {e}"),
            InvocationError::NativeFault {
                entry_point,
                message,
            } => write!(f, "native fault in '{entry_point}': {message}"),
        }
    }
}

impl std::error::Error for InvocationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InvocationError::Unresolved(e) => Some(e),
            InvocationError::NativeFault { .. } => None,
        }
    }
}

impl From<ResolutionError> for InvocationError {
    fn from(err: ResolutionError) -> Self {
        InvocationError::Unresolved(err)
    }
}

/// A host callback made by native code failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackError {
    NoSuchClass(String),
    NoSuchMethod { class: String, method: String },
    SignatureMismatch { method: String, reason: String },
    UnknownObject(String),
    /// The managed method itself failed or panicked.
    Failed(String),
}

impl Display for CallbackError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallbackError::NoSuchClass(class) => write!(f, "no such class '{class}'"),
            CallbackError::NoSuchMethod { class, method } => {
                write!(f, "class '{class}' has no method '{method}'")
            }
            CallbackError::SignatureMismatch { method, reason } => {
                write!(f, "signature mismatch calling '{method}': {reason}")
            }
            CallbackError::UnknownObject(reason) => write!(f, "unknown object: {reason}"),
            CallbackError::Failed(reason) => write!(f, "callback failed: {reason}"),
        }
    }
}

impl std::error::Error for CallbackError {}

/// Malformed signature descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    MissingOpenParen,
    MissingCloseParen,
    UnknownTypeCode(char),
    VoidParameter(usize),
    MissingReturnType,
    TrailingCharacters(String),
}

impl Display for SignatureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignatureError::MissingOpenParen => write!(f, "descriptor must start with '('"),
            SignatureError::MissingCloseParen => write!(f, "descriptor is missing ')'"),
            SignatureError::UnknownTypeCode(c) => write!(f, "unknown type code '{c}'"),
            SignatureError::VoidParameter(i) => write!(f, "parameter {i} can not be void"),
            SignatureError::MissingReturnType => write!(f, "descriptor is missing return type"),
            SignatureError::TrailingCharacters(rest) => {
                write!(f, "unexpected characters after return type: '{rest}'")
            }
        }
    }
}

impl std::error::Error for SignatureError {}

/// Values do not fit a signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureMismatch {
    Arity {
        expected: usize,
        found: usize,
    },
    Argument {
        index: usize,
        expected: ValueType,
        found: ValueType,
    },
    Return {
        expected: ValueType,
        found: ValueType,
    },
}

impl Display for SignatureMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignatureMismatch::Arity { expected, found } => {
                write!(f, "expected {expected} arguments, got {found}")
            }
            SignatureMismatch::Argument {
                index,
                expected,
                found,
            } => write!(f, "argument {index} should be {expected}, got {found}"),
            SignatureMismatch::Return { expected, found } => {
                write!(f, "return value should be {expected}, got {found}")
            }
        }
    }
}

impl std::error::Error for SignatureMismatch {}
