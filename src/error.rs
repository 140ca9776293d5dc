// created = 2026-10-19
// modified = 2026-10-19
// driver = "Isaac Clayton"

//! Error type shared by every module of the crate.
//!
//! Decoding never panics on malformed input; it returns one of the
//! variants below. Invariant violations inside the struct store are
//! programming errors and panic instead.

use thiserror::Error;

/// Errors surfaced by decoding and by misuse of the shared-type API.
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// The buffer ended before a value was fully read.
    #[error("unexpected end of buffer")]
    EndOfBuffer,

    /// A variable-length integer carried more bits than its target width.
    #[error("variable-length integer exceeds {bits} bits")]
    VarIntOverflow { bits: u32 },

    /// A length-prefixed string was not valid UTF-8.
    #[error("invalid utf-8 in string")]
    InvalidUtf8,

    /// A tag byte did not name any known variant.
    #[error("unexpected {kind} tag: {tag}")]
    UnexpectedTag { kind: &'static str, tag: u32 },

    /// A legacy JSON content entry could not be parsed.
    #[error("invalid json content: {reason}")]
    InvalidJson { reason: String },

    /// A decoded struct referenced a clock range that cannot exist.
    #[error("malformed update: {reason}")]
    MalformedUpdate { reason: String },

    /// An index or range reached past the end of a sequence.
    #[error("length exceeded: index {index} is past length {len}")]
    LengthExceeded { index: u32, len: u32 },

    /// The shared type handle no longer resolves (its item was deleted
    /// and collected, or it belongs to another document).
    #[error("shared type is not reachable from this document")]
    TypeNotFound,

    /// Snapshot restoration needs the full history kept around.
    #[error("garbage collection must be disabled on the source document")]
    GcEnabled,
}

impl Error {
    /// True for errors that come from reading bytes.
    pub fn is_decode_error(&self) -> bool {
        return matches!(
            self,
            Error::EndOfBuffer
                | Error::VarIntOverflow { .. }
                | Error::InvalidUtf8
                | Error::UnexpectedTag { .. }
                | Error::InvalidJson { .. }
                | Error::MalformedUpdate { .. }
        );
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
