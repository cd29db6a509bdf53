
//! Error type definitions and conversion helpers.

use std::borrow::Cow;
use std::convert::TryFrom;
use std::fmt;
use std::io::Error as IoError;

/// A result that may contain an error from this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// A result that, if successful, contains nothing.
pub type UnitResult = Result<()>;


/// An error that may happen while reading, converting or writing deep images.
#[derive(Debug)]
pub enum Error {

    /// Reading or writing a file failed.
    Io(IoError),

    /// The file is not supported, contains unknown features,
    /// or uses a feature that this crate deliberately does not implement.
    NotSupported(Cow<'static, str>),

    /// The contents of the file or the supplied data are not valid.
    Invalid(Cow<'static, str>),
}

impl Error {

    /// Create an error declaring that the given feature is not supported.
    pub fn unsupported(message: impl Into<Cow<'static, str>>) -> Self {
        Error::NotSupported(message.into())
    }

    /// Create an error declaring that the contents are invalid.
    pub fn invalid(message: impl Into<Cow<'static, str>>) -> Self {
        Error::Invalid(message.into())
    }
}

/// Enable using the `?` operator on `std::io::Result`.
impl From<IoError> for Error {
    fn from(error: IoError) -> Self {
        Error::Io(error)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(error) => Some(error),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(error) => write!(formatter, "io error: {}", error),
            Error::NotSupported(message) => write!(formatter, "not supported: {}", message),
            Error::Invalid(message) => write!(formatter, "invalid: {}", message),
        }
    }
}


/// Convert an `i32` to `usize`, returning a descriptive error on negative numbers.
pub fn i32_to_usize(value: i32, error_message: &'static str) -> Result<usize> {
    usize::try_from(value).map_err(|_| Error::invalid(error_message))
}

/// Convert a `u64` to `usize`, returning a descriptive error where it does not fit.
pub fn u64_to_usize(value: u64, error_message: &'static str) -> Result<usize> {
    usize::try_from(value).map_err(|_| Error::invalid(error_message))
}

/// Convert a `usize` to `i32`, returning a descriptive error where it does not fit.
pub fn usize_to_i32(value: usize, error_message: &'static str) -> Result<i32> {
    i32::try_from(value).map_err(|_| Error::invalid(error_message))
}
