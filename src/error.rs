//! Error type for email envelopes

use std::{
    error::Error as StdError,
    fmt::{self, Display, Formatter},
};

/// Error type for email envelopes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Missing from in envelope
    MissingFrom,
    /// Missing to in envelope
    MissingTo,
    /// An envelope address contains a CR or LF character
    InvalidAddress,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Error::MissingFrom => "missing source address, invalid envelope",
            Error::MissingTo => "missing destination address, invalid envelope",
            Error::InvalidAddress => "envelope address must not contain CR or LF",
        })
    }
}

impl StdError for Error {}
