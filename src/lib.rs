//! Decodes encrypted, signed Rails-style session cookies and parses the
//! decrypted payload — Ruby's native `Marshal` binary object-graph format —
//! into a typed, navigable tree of values.
//!
//! [`decrypt_signed`] and [`decrypt_authenticated`] turn a URL-escaped
//! cookie string plus key-derivation parameters into raw bytes;
//! [`Document::parse`] turns those bytes into a [`Node`] tree. This is a
//! read-only client library: it does not re-marshal a [`Node`] tree back
//! into bytes, and it does not interpret the opaque payload of a
//! [`ValueType::UserDefined`] object.

mod cookie;
mod de;
mod error;
mod tags;
mod value;

pub use crate::cookie::{decrypt_authenticated, decrypt_signed, encrypt_signed};
pub use crate::de::{Document, EXPECTED_MAJOR_VERSION, EXPECTED_MINOR_VERSION};
pub use crate::error::{CookieError, ReaderError, ReaderErrorKind, TypeMismatch};
pub use crate::value::{Node, ValueType};
