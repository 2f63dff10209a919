//! The value model: a tagged sum type over decoded nodes (§3.1), backed by
//! an arena for the symbol and object caches (§3.2) so that shared and
//! cyclic references can be represented without owning pointers.
//!
//! The arena is split into a mutable, append-only `ArenaBuilder` used while
//! decoding and an immutable `Arena` used for navigation: indices are
//! reserved before a composite's children are decoded so that a forward or
//! cyclic `@`-reference can resolve to a slot that isn't filled in yet, and
//! are only ever resolved against content at navigation time, never eagerly
//! copied.

use std::borrow::Cow;

use encoding_rs::mem::decode_latin1;
use indexmap::IndexMap;

use crate::error::TypeMismatch;

/// The kind of a decoded node, as returned by [`Node::value_type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Nil,
    Bool,
    Integer,
    Float,
    String,
    Array,
    Map,
    UserDefined,
    /// Reserved for a recognized-but-unparseable-for-this-operation node.
    /// No tag in the current dispatch table (§4.1.2) ever produces this
    /// variant; an unrecognized tag byte is always a hard parse error
    /// instead (see DESIGN.md).
    Unknown,
}

/// Raw bytes backing a decoded string-kind value, together with whatever we
/// learned about its validity as UTF-8 while decoding it.
///
/// Stores the bytes once, decides at `as_str` time whether they're already
/// valid UTF-8 or need a lossy single-byte decode.
#[derive(Debug, Clone)]
pub(crate) struct StringData {
    bytes: Vec<u8>,
    is_utf8: bool,
}

impl StringData {
    pub(crate) fn new(bytes: Vec<u8>) -> Self {
        let is_utf8 = std::str::from_utf8(&bytes).is_ok();
        StringData { bytes, is_utf8 }
    }

    pub(crate) fn as_str(&self) -> Cow<'_, str> {
        if self.is_utf8 {
            // Safety: `is_utf8` was established by a successful `from_utf8`
            // check over these same, never-mutated bytes.
            Cow::Borrowed(unsafe { std::str::from_utf8_unchecked(&self.bytes) })
        } else {
            decode_latin1(&self.bytes)
        }
    }
}

/// An object-cache entry: one of the four caching kinds named in §3.2
/// (arrays, maps, user-defined objects, and instance-variable-wrapped
/// strings).
#[derive(Debug)]
pub(crate) enum CachedObject {
    Array(Vec<ValueRepr>),
    Map(Vec<(ValueRepr, ValueRepr)>),
    /// Index into `Arena::strings`.
    String(usize),
    UserDefined {
        /// Index into `Arena::strings`, always a symbol.
        class_name: usize,
        bytes: Vec<u8>,
    },
}

/// The resolved shape of any node. Primitives are stored inline; the four
/// caching kinds are stored by index into the arena's object pool.
///
/// An `@`-reference never gets its own representation: the parser resolves
/// it immediately to the same `ValueRepr` the referenced object already
/// has, which is what makes reference transparency (§3.2's last invariant)
/// automatic rather than something accessors have to implement.
#[derive(Debug, Clone, Copy)]
pub(crate) enum ValueRepr {
    Nil,
    Bool(bool),
    Integer(i64),
    Float(f64),
    /// Index into `Arena::strings`: a symbol or a raw (non-ivar-wrapped)
    /// byte string, neither of which is object-cache-addressable.
    String(usize),
    /// Index into `Arena::objects`.
    Object(usize),
}

/// The fully-built, immutable backing store for one decode. Shared by every
/// [`Node`] produced from the same [`crate::Document`].
#[derive(Debug, Default)]
pub struct Arena {
    pub(crate) strings: Vec<StringData>,
    pub(crate) objects: Vec<CachedObject>,
}

impl Arena {
    fn object_type(&self, index: usize) -> ValueType {
        match &self.objects[index] {
            CachedObject::Array(_) => ValueType::Array,
            CachedObject::Map(_) => ValueType::Map,
            CachedObject::String(_) => ValueType::String,
            CachedObject::UserDefined { .. } => ValueType::UserDefined,
        }
    }
}

/// A decoded value, borrowing the arena it was produced from. Returned as
/// the root of a [`crate::Document`] and from `as_array`/`as_map`
/// navigation; every `Node` is a cheap, `Copy`-able handle plus a shared
/// reference, not an owned subtree.
#[derive(Debug, Clone, Copy)]
pub struct Node<'a> {
    pub(crate) arena: &'a Arena,
    pub(crate) repr: ValueRepr,
}

impl<'a> Node<'a> {
    pub(crate) fn new(arena: &'a Arena, repr: ValueRepr) -> Self {
        Node { arena, repr }
    }

    /// The node's kind. If constructed from an `@`-reference, this is
    /// already the type of the referenced target (see [`ValueRepr`]'s
    /// doc comment): reference resolution happens once, at parse time.
    pub fn value_type(&self) -> ValueType {
        match self.repr {
            ValueRepr::Nil => ValueType::Nil,
            ValueRepr::Bool(_) => ValueType::Bool,
            ValueRepr::Integer(_) => ValueType::Integer,
            ValueRepr::Float(_) => ValueType::Float,
            ValueRepr::String(_) => ValueType::String,
            ValueRepr::Object(index) => self.arena.object_type(index),
        }
    }

    fn mismatch(&self, expected: ValueType) -> TypeMismatch {
        TypeMismatch {
            expected,
            actual: self.value_type(),
        }
    }

    pub fn as_bool(&self) -> Result<bool, TypeMismatch> {
        match self.repr {
            ValueRepr::Bool(b) => Ok(b),
            _ => Err(self.mismatch(ValueType::Bool)),
        }
    }

    pub fn as_integer(&self) -> Result<i64, TypeMismatch> {
        match self.repr {
            ValueRepr::Integer(n) => Ok(n),
            _ => Err(self.mismatch(ValueType::Integer)),
        }
    }

    pub fn as_float(&self) -> Result<f64, TypeMismatch> {
        match self.repr {
            ValueRepr::Float(f) => Ok(f),
            _ => Err(self.mismatch(ValueType::Float)),
        }
    }

    pub fn as_string(&self) -> Result<Cow<'a, str>, TypeMismatch> {
        match self.repr {
            ValueRepr::String(idx) => Ok(self.arena.strings[idx].as_str()),
            ValueRepr::Object(idx) => match &self.arena.objects[idx] {
                CachedObject::String(sidx) => Ok(self.arena.strings[*sidx].as_str()),
                _ => Err(self.mismatch(ValueType::String)),
            },
            _ => Err(self.mismatch(ValueType::String)),
        }
    }

    pub fn as_array(&self) -> Result<Vec<Node<'a>>, TypeMismatch> {
        match self.repr {
            ValueRepr::Object(idx) => match &self.arena.objects[idx] {
                CachedObject::Array(items) => Ok(items
                    .iter()
                    .map(|repr| Node::new(self.arena, *repr))
                    .collect()),
                _ => Err(self.mismatch(ValueType::Array)),
            },
            _ => Err(self.mismatch(ValueType::Array)),
        }
    }

    /// The caller-facing, canonical-string-keyed view of a map (§4.1.6). A
    /// secondary, lossless `as_pairs` accessor is also provided for callers
    /// that need the raw (possibly non-string) key nodes.
    pub fn as_map(&self) -> Result<IndexMap<String, Node<'a>>, TypeMismatch> {
        let pairs = self.as_pairs()?;
        let mut map = IndexMap::with_capacity(pairs.len());
        for (key, value) in pairs {
            map.insert(key.to_string(), value);
        }
        Ok(map)
    }

    /// Lossless map access: the raw `(key, value)` node pairs in source
    /// order, before canonical-key-string collapsing. See §9's note that
    /// canonicalization is lossy and a secondary pairs-based API is
    /// appropriate for callers that need it.
    pub fn as_pairs(&self) -> Result<Vec<(Node<'a>, Node<'a>)>, TypeMismatch> {
        match self.repr {
            ValueRepr::Object(idx) => match &self.arena.objects[idx] {
                CachedObject::Map(pairs) => Ok(pairs
                    .iter()
                    .map(|(k, v)| (Node::new(self.arena, *k), Node::new(self.arena, *v)))
                    .collect()),
                _ => Err(self.mismatch(ValueType::Map)),
            },
            _ => Err(self.mismatch(ValueType::Map)),
        }
    }

    /// The class-name symbol of a user-defined object, if this node is one.
    pub fn user_defined_class_name(&self) -> Result<Cow<'a, str>, TypeMismatch> {
        match self.repr {
            ValueRepr::Object(idx) => match &self.arena.objects[idx] {
                CachedObject::UserDefined { class_name, .. } => {
                    Ok(self.arena.strings[*class_name].as_str())
                }
                _ => Err(self.mismatch(ValueType::UserDefined)),
            },
            _ => Err(self.mismatch(ValueType::UserDefined)),
        }
    }

    /// The opaque payload bytes of a user-defined object, if this node is
    /// one. Interpreting them is explicitly out of scope (§1 Non-goals);
    /// this accessor exists only so callers can inspect or forward the raw
    /// bytes.
    pub fn user_defined_bytes(&self) -> Result<&'a [u8], TypeMismatch> {
        match self.repr {
            ValueRepr::Object(idx) => match &self.arena.objects[idx] {
                CachedObject::UserDefined { bytes, .. } => Ok(bytes),
                _ => Err(self.mismatch(ValueType::UserDefined)),
            },
            _ => Err(self.mismatch(ValueType::UserDefined)),
        }
    }

    /// Best-effort human/canonical string for any scalar, used internally
    /// for map-key canonicalization (§4.1.6) and exposed for diagnostics.
    pub fn to_string(&self) -> String {
        match self.repr {
            ValueRepr::Nil => "<nil>".to_string(),
            ValueRepr::Bool(b) => b.to_string(),
            ValueRepr::Integer(n) => n.to_string(),
            ValueRepr::Float(f) => format_float(f),
            ValueRepr::String(idx) => self.arena.strings[idx].as_str().into_owned(),
            ValueRepr::Object(idx) => match &self.arena.objects[idx] {
                CachedObject::String(sidx) => self.arena.strings[*sidx].as_str().into_owned(),
                CachedObject::Array(_) => format!("<array:{idx}>"),
                CachedObject::Map(_) => format!("<map:{idx}>"),
                CachedObject::UserDefined { class_name, .. } => {
                    format!("<user-defined:{}>", self.arena.strings[*class_name].as_str())
                }
            },
        }
    }
}

/// Rust's default `f64` `Display` already produces the shortest decimal
/// literal that round-trips back to the same float, which is exactly
/// what §4.1.6's canonical-key rule asks for.
fn format_float(f: f64) -> String {
    format!("{f}")
}

/// Mutable, append-only counterpart to [`Arena`], used only while a single
/// [`crate::Document`] is being parsed. See [`ArenaBuilder::reserve_object`]
/// for why composite kinds are reserved before their children are decoded.
#[derive(Default)]
pub(crate) struct ArenaBuilder {
    strings: Vec<StringData>,
    symbol_order: Vec<usize>,
    objects: Vec<Option<CachedObject>>,
}

impl ArenaBuilder {
    pub(crate) fn push_string(&mut self, data: StringData) -> usize {
        let idx = self.strings.len();
        self.strings.push(data);
        idx
    }

    /// Adds a newly-introduced (`:`-tagged) symbol to both the string pool
    /// and the ordered symbol cache used to resolve `;`-tagged references.
    pub(crate) fn push_symbol(&mut self, bytes: Vec<u8>) -> usize {
        let idx = self.push_string(StringData::new(bytes));
        self.symbol_order.push(idx);
        idx
    }

    pub(crate) fn symbol_count(&self) -> usize {
        self.symbol_order.len()
    }

    pub(crate) fn resolve_symbol_ref(&self, k: u32) -> Option<usize> {
        self.symbol_order.get(k as usize).copied()
    }

    /// Reserves a slot in the object cache at the moment a composite's
    /// opening tag is entered, before its children are decoded — this is
    /// what lets a child (including the composite's own descendants)
    /// `@`-reference the composite while it is still being built, even
    /// though that composite hasn't finished decoding yet.
    pub(crate) fn reserve_object(&mut self) -> usize {
        let idx = self.objects.len();
        self.objects.push(None);
        idx
    }

    pub(crate) fn fill_object(&mut self, index: usize, object: CachedObject) {
        debug_assert!(
            self.objects[index].is_none(),
            "object-cache slot {index} filled twice"
        );
        self.objects[index] = Some(object);
    }

    /// Reserve-and-fill in one step, for object kinds with no self-ref
    /// risk (instance-variable-wrapped strings; see DESIGN.md for why this
    /// differs from arrays/maps/user-defined objects).
    pub(crate) fn push_object(&mut self, object: CachedObject) -> usize {
        let idx = self.objects.len();
        self.objects.push(Some(object));
        idx
    }

    pub(crate) fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Validates an `@k` reference against objects reserved so far. Note
    /// this only needs a bounds check, not a filled-value check: resolution
    /// of the target's content happens lazily at navigation time, long
    /// after parsing (and hence all reservations) completes.
    pub(crate) fn resolve_object_ref(&self, k: u32) -> Option<usize> {
        let k = k as usize;
        if k < self.objects.len() {
            Some(k)
        } else {
            None
        }
    }

    /// Finalizes the builder into an immutable [`Arena`]. Every reserved
    /// slot must have been filled by the time parsing completes
    /// successfully; a parse that errors out never reaches this call.
    pub(crate) fn finish(self) -> Arena {
        let objects = self
            .objects
            .into_iter()
            .enumerate()
            .map(|(idx, slot)| {
                slot.unwrap_or_else(|| panic!("object-cache slot {idx} was reserved but never filled"))
            })
            .collect();
        Arena {
            strings: self.strings,
            objects,
        }
    }
}
