//! The Object Reader: decodes a byte buffer holding one Marshal-format
//! object tree into a [`Document`] (§4.1).
//!
//! A cursor (`Cursor`) tracks the read position over the borrowed byte
//! slice, a small mutable state (`ReaderState`) tracks recursion depth, and
//! an `ArenaBuilder` accumulates the symbol/object caches as decoding
//! proceeds. Decoding is a single eager depth-first walk: there is no
//! separate "sizing" pass, because the cursor's position always advances by
//! exactly the number of bytes each tag consumes.

use crate::error::{ReaderError, ReaderErrorKind};
use crate::tags::Tag;
use crate::value::{Arena, ArenaBuilder, CachedObject, Node, StringData, ValueRepr};

/// Guards against stack overflow on maliciously or accidentally
/// deeply-nested input.
const RECURSION_DEPTH_LIMIT: usize = 256;

/// The version pair this format revision expects (§4.1.1, §6.1). Other
/// values are not rejected — behavior for them is undefined — but this is
/// the pair every fixture below uses.
pub const EXPECTED_MAJOR_VERSION: u8 = 4;
pub const EXPECTED_MINOR_VERSION: u8 = 8;

/// A fully-decoded object tree plus the arena of shared/cyclic references
/// it was built from. Produced by [`Document::parse`]; [`Document::root`]
/// hands out navigable [`Node`]s that borrow the arena.
pub struct Document {
    arena: Arena,
    root: ValueRepr,
    major_version: u8,
    minor_version: u8,
}

impl Document {
    /// Parses `bytes` as one complete Marshal object stream: a two-byte
    /// version prefix followed by exactly one root object, with no
    /// trailing data.
    pub fn parse(bytes: &[u8]) -> Result<Document, ReaderError> {
        let mut cursor = Cursor::new(bytes);
        let major_version = cursor.read_u8()?;
        let minor_version = cursor.read_u8()?;

        let mut arena = ArenaBuilder::default();
        let mut state = ReaderState::default();
        let root = read_value(&mut cursor, &mut arena, &mut state)?;

        if !cursor.is_at_end() {
            return Err(cursor.err(ReaderErrorKind::TrailingData));
        }

        Ok(Document {
            arena: arena.finish(),
            root,
            major_version,
            minor_version,
        })
    }

    pub fn major_version(&self) -> u8 {
        self.major_version
    }

    pub fn minor_version(&self) -> u8 {
        self.minor_version
    }

    /// The root node of the decoded tree.
    pub fn root(&self) -> Node<'_> {
        Node::new(&self.arena, self.root)
    }
}

/// A read-only cursor over the input buffer, tracking the current byte
/// offset for error reporting.
struct Cursor<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Cursor { bytes, position: 0 }
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.bytes.len()
    }

    /// Builds an error positioned at the current cursor offset.
    fn err(&self, kind: ReaderErrorKind) -> ReaderError {
        ReaderError::new(self.position, kind)
    }

    /// Builds an error positioned at a byte already consumed, as opposed
    /// to `err`, which points at the cursor's current spot.
    fn err_at(&self, offset: usize, kind: ReaderErrorKind) -> ReaderError {
        ReaderError::new(offset, kind)
    }

    fn read_u8(&mut self) -> Result<u8, ReaderError> {
        let byte = *self
            .bytes
            .get(self.position)
            .ok_or_else(|| self.err(ReaderErrorKind::UnexpectedEof))?;
        self.position += 1;
        Ok(byte)
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], ReaderError> {
        let available = self.bytes.len().saturating_sub(self.position);
        if available < len {
            return Err(self.err(ReaderErrorKind::IncompleteData {
                needed: len,
                available,
            }));
        }
        let slice = &self.bytes[self.position..self.position + len];
        self.position += len;
        Ok(slice)
    }

    /// Decodes the variable-width integer scheme in §4.1.3.
    fn read_fixnum(&mut self) -> Result<i64, ReaderError> {
        let offset = self.position;
        let b0 = self.read_u8()?;
        match b0 {
            0 => Ok(0),
            1..=4 => {
                let width = b0 as usize;
                let bytes = self.read_bytes(width)?;
                Ok(le_unsigned(bytes) as i64)
            }
            // Reserved widening path: behaves identically to a 4-byte
            // positive integer (§4.1.3).
            5 => {
                let bytes = self.read_bytes(4)?;
                Ok(le_unsigned(bytes) as i64)
            }
            0x06..=0x7F => Ok(b0 as i64 - 5),
            0x80..=0xFA => Ok(b0 as i64 - 251),
            0xFB..=0xFF => {
                let width = (0x100 - b0 as i32) as usize;
                let bytes = self.read_bytes(width)?;
                let mut magnitude: i64 = 0;
                for (i, &byte) in bytes.iter().enumerate() {
                    magnitude += (0xFFi64 - byte as i64) << (8 * i);
                }
                let _ = offset;
                Ok(-(magnitude + 1))
            }
        }
    }

    /// Lengths and cache indices are always non-negative fixnums in this
    /// format; a negative value here indicates a malformed stream.
    fn read_length(&mut self) -> Result<usize, ReaderError> {
        let offset = self.position;
        let n = self.read_fixnum()?;
        usize::try_from(n).map_err(|_| {
            self.err_at(
                offset,
                ReaderErrorKind::IncompleteData {
                    needed: 0,
                    available: 0,
                },
            )
        })
    }
}

fn le_unsigned(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .enumerate()
        .fold(0u64, |acc, (i, &b)| acc | ((b as u64) << (8 * i)))
}

/// Recursion-depth bookkeeping threaded through every recursive call, kept
/// separate from the cursor and the arena since it tracks call-stack depth
/// rather than read position or parsed content.
#[derive(Default)]
struct ReaderState {
    depth: usize,
}

struct DepthGuard<'a> {
    state: &'a mut ReaderState,
}

impl<'a> DepthGuard<'a> {
    fn enter(state: &'a mut ReaderState, offset: usize) -> Result<Self, ReaderError> {
        state.depth += 1;
        if state.depth > RECURSION_DEPTH_LIMIT {
            return Err(ReaderError::new(
                offset,
                ReaderErrorKind::TooDeeplyNested(RECURSION_DEPTH_LIMIT),
            ));
        }
        Ok(DepthGuard { state })
    }
}

impl<'a> Drop for DepthGuard<'a> {
    fn drop(&mut self) {
        self.state.depth -= 1;
    }
}

/// Reads one complete object, tag and payload, from the cursor (§4.1.2).
fn read_value(
    cursor: &mut Cursor<'_>,
    arena: &mut ArenaBuilder,
    state: &mut ReaderState,
) -> Result<ValueRepr, ReaderError> {
    let tag_offset = cursor.position;
    let _guard = DepthGuard::enter(state, tag_offset)?;
    let tag_byte = cursor.read_u8()?;
    let tag = Tag::from_byte(tag_byte)
        .ok_or_else(|| cursor.err_at(tag_offset, ReaderErrorKind::UnsupportedType(tag_byte)))?;

    match tag {
        Tag::Nil => Ok(ValueRepr::Nil),
        Tag::True => Ok(ValueRepr::Bool(true)),
        Tag::False => Ok(ValueRepr::Bool(false)),
        Tag::Integer => Ok(ValueRepr::Integer(cursor.read_fixnum()?)),
        Tag::Float => read_float(cursor),
        Tag::Symbol => {
            let len = cursor.read_length()?;
            let bytes = cursor.read_bytes(len)?.to_vec();
            Ok(ValueRepr::String(arena.push_symbol(bytes)))
        }
        Tag::SymbolRef => {
            let offset = cursor.position;
            let k = cursor.read_length()? as u32;
            let idx = arena
                .resolve_symbol_ref(k)
                .ok_or_else(|| cursor.err_at(offset, ReaderErrorKind::InvalidSymbolReference(k)))?;
            Ok(ValueRepr::String(idx))
        }
        Tag::RawString => {
            let len = cursor.read_length()?;
            let bytes = cursor.read_bytes(len)?.to_vec();
            Ok(ValueRepr::String(arena.push_string(StringData::new(bytes))))
        }
        Tag::InstanceVar => read_instance_var_wrapped(cursor, arena, state),
        Tag::Array => read_array(cursor, arena, state),
        Tag::Map => read_map(cursor, arena, state),
        Tag::ObjectRef => {
            let offset = cursor.position;
            let k = cursor.read_length()? as u32;
            let idx = arena
                .resolve_object_ref(k)
                .ok_or_else(|| cursor.err_at(offset, ReaderErrorKind::InvalidObjectReference(k)))?;
            Ok(ValueRepr::Object(idx))
        }
        Tag::UserDefined => read_user_defined(cursor, arena, state),
    }
}

fn read_float(cursor: &mut Cursor<'_>) -> Result<ValueRepr, ReaderError> {
    let offset = cursor.position;
    let len = cursor.read_length()?;
    let bytes = cursor.read_bytes(len)?;
    let text = std::str::from_utf8(bytes).map_err(|_| {
        cursor.err_at(
            offset,
            ReaderErrorKind::InvalidFloatLiteral(String::from_utf8_lossy(bytes).into_owned()),
        )
    })?;
    let value: f64 = text.parse().map_err(|_| {
        cursor.err_at(offset, ReaderErrorKind::InvalidFloatLiteral(text.to_string()))
    })?;
    Ok(ValueRepr::Float(value))
}

/// `I` + wrapped object + ivar count + ivar pairs (§4.1.4). Only the
/// wrapped object's value is surfaced to the caller; the ivar pairs are
/// parsed (so that symbols inside them still populate the symbol cache and
/// the cursor ends up in the right place for the next sibling) and then
/// discarded, exactly as §4.1.4 specifies for encoding metadata.
fn read_instance_var_wrapped(
    cursor: &mut Cursor<'_>,
    arena: &mut ArenaBuilder,
    state: &mut ReaderState,
) -> Result<ValueRepr, ReaderError> {
    let inner = read_value(cursor, arena, state)?;
    let count = cursor.read_length()?;
    for _ in 0..count {
        let _key = read_value(cursor, arena, state)?;
        let _ivar_value = read_value(cursor, arena, state)?;
    }

    match inner {
        // Only instance-variable-wrapped strings are object-cache
        // addressable (§4.1.4's last line); a wrapped non-string value has
        // no self-reference risk worth reserving a slot for, so it's
        // simply returned as-is (see DESIGN.md).
        ValueRepr::String(string_idx) => {
            let object_idx = arena.push_object(CachedObject::String(string_idx));
            Ok(ValueRepr::Object(object_idx))
        }
        other => Ok(other),
    }
}

fn read_array(
    cursor: &mut Cursor<'_>,
    arena: &mut ArenaBuilder,
    state: &mut ReaderState,
) -> Result<ValueRepr, ReaderError> {
    let object_idx = arena.reserve_object();
    let count = cursor.read_length()?;
    let mut items = Vec::with_capacity(count.min(4096));
    for _ in 0..count {
        items.push(read_value(cursor, arena, state)?);
    }
    arena.fill_object(object_idx, CachedObject::Array(items));
    Ok(ValueRepr::Object(object_idx))
}

fn read_map(
    cursor: &mut Cursor<'_>,
    arena: &mut ArenaBuilder,
    state: &mut ReaderState,
) -> Result<ValueRepr, ReaderError> {
    let object_idx = arena.reserve_object();
    let count = cursor.read_length()?;
    let mut pairs = Vec::with_capacity(count.min(4096));
    for _ in 0..count {
        let key = read_value(cursor, arena, state)?;
        let value = read_value(cursor, arena, state)?;
        pairs.push((key, value));
    }
    arena.fill_object(object_idx, CachedObject::Map(pairs));
    Ok(ValueRepr::Object(object_idx))
}

/// `u` + symbol(class name) + length-prefixed opaque bytes (§4.1.7). The
/// payload is never interpreted (§1 Non-goals) — only its length matters,
/// so the surrounding array/map can keep decoding past it.
fn read_user_defined(
    cursor: &mut Cursor<'_>,
    arena: &mut ArenaBuilder,
    state: &mut ReaderState,
) -> Result<ValueRepr, ReaderError> {
    let object_idx = arena.reserve_object();
    let class_name_repr = read_value(cursor, arena, state)?;
    let class_name_idx = match class_name_repr {
        ValueRepr::String(idx) => idx,
        _ => return Err(cursor.err(ReaderErrorKind::InvalidUserDefinedClassName)),
    };
    let len = cursor.read_length()?;
    let bytes = cursor.read_bytes(len)?.to_vec();
    arena.fill_object(
        object_idx,
        CachedObject::UserDefined {
            class_name: class_name_idx,
            bytes,
        },
    );
    Ok(ValueRepr::Object(object_idx))
}
