use thiserror::Error;

use crate::value::ValueType;

/// A parse-time failure, positioned at the byte offset where it was detected.
///
/// Mirrors the kinds described for the Reader: most variants of
/// [`ReaderErrorKind`] realize either `IncompleteData` or `UnsupportedType`;
/// `TypeMismatch` is raised separately by accessors after a successful parse
/// (see [`TypeMismatch`]) since it is not a framing failure.
#[derive(Debug, Error)]
#[error("marshal parse error at byte {offset}: {kind}")]
pub struct ReaderError {
    pub offset: usize,
    pub kind: ReaderErrorKind,
}

impl ReaderError {
    pub(crate) fn new(offset: usize, kind: ReaderErrorKind) -> Self {
        ReaderError { offset, kind }
    }
}

#[derive(Debug, Error)]
pub enum ReaderErrorKind {
    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("expected {needed} more byte(s), only {available} available")]
    IncompleteData { needed: usize, available: usize },

    #[error("unrecognized tag byte 0x{0:02x}")]
    UnsupportedType(u8),

    #[error("invalid object-cache reference index {0}")]
    InvalidObjectReference(u32),

    #[error("invalid symbol-cache reference index {0}")]
    InvalidSymbolReference(u32),

    #[error("user-defined object's class name must be a symbol")]
    InvalidUserDefinedClassName,

    #[error("invalid floating point literal {0:?}")]
    InvalidFloatLiteral(String),

    #[error("trailing bytes after the root object")]
    TrailingData,

    #[error("object graph nested more than {0} levels deep")]
    TooDeeplyNested(usize),
}

/// Raised by a typed accessor when the node's actual kind differs from the
/// one requested. Distinct from [`ReaderError`] because it is an
/// accessor-time, not a parse-time, failure — the node already exists.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("type mismatch: expected {expected:?}, found {actual:?}")]
pub struct TypeMismatch {
    pub expected: ValueType,
    pub actual: ValueType,
}

/// Failures from the session-cookie transport layer.
#[derive(Debug, Error)]
pub enum CookieError {
    #[error("cookie is not shaped as the expected `--`-joined segments")]
    InvalidCookie,

    #[error("signature verification failed")]
    InvalidSignature,

    #[error("failed to decode a cookie segment: {0}")]
    DecodeError(String),

    #[error("cipher operation failed: {0}")]
    CryptoError(String),
}
