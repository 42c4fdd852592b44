// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Canonical deterministic binary encoding.
//!
//! Determinism contract
//! - Every domain type that participates in hashing (event envelopes,
//!   snapshots, derived-artifact request tuples) implements
//!   [`CanonicalEncode`] and [`CanonicalDecode`]. The encoding is positional,
//!   fixed-field-order, and architecture-independent:
//!   - Integers are little-endian, fixed-width.
//!   - `f64` is encoded bit-exact via `to_le_bytes` (no canonicalization of
//!     NaN payloads or signed zero; callers must not feed non-canonical
//!     floats into hashed data if they expect hash equality across
//!     producers).
//!   - Strings and byte buffers are length-prefixed (`u64` LE length) UTF-8
//!     or raw bytes.
//!   - `Vec<T>` is a `u64` LE length prefix followed by each element's
//!     encoding in order.
//!   - `Option<T>` is a single tag byte (`0` for `None`, `1` for `Some`)
//!     followed by the inner encoding when present.
//!   - Enum variants are encoded as a single `u8` tag followed by the
//!     variant's fields in the order fixed by the type's own doc comment.
//! - This mirrors the explicit, field-by-field `Hasher::update` style used
//!   elsewhere in this codebase for snapshot hashing, generalized into a
//!   reusable trait pair instead of being inlined once per hash site.
use std::convert::TryInto;

/// Error produced when decoding a byte buffer into a typed value fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The buffer ended before the expected number of bytes were consumed.
    #[error("unexpected end of buffer: needed {needed} more byte(s)")]
    UnexpectedEof {
        /// Number of additional bytes required.
        needed: usize,
    },
    /// A tag byte did not match any known variant.
    #[error("invalid tag byte {tag} for {type_name}")]
    InvalidTag {
        /// The offending tag value.
        tag: u8,
        /// Name of the type being decoded, for diagnostics.
        type_name: &'static str,
    },
    /// A length-prefixed field's declared length did not fit in memory or
    /// overflowed a `usize` on this platform.
    #[error("length prefix {len} out of range for {type_name}")]
    LengthOutOfRange {
        /// The declared length.
        len: u64,
        /// Name of the type being decoded, for diagnostics.
        type_name: &'static str,
    },
    /// A byte buffer that was declared to be UTF-8 was not.
    #[error("invalid utf-8 in string field")]
    InvalidUtf8,
    /// Trailing bytes remained after decoding the expected value.
    #[error("{extra} trailing byte(s) after decoding {type_name}")]
    TrailingBytes {
        /// Number of bytes left over.
        extra: usize,
        /// Name of the type that was decoded.
        type_name: &'static str,
    },
}

/// A cursor over an immutable byte slice, advanced by each `CanonicalDecode`
/// call. Kept private to the crate so every decode path goes through the
/// helper methods below, which centralize bounds checking.
pub struct Cursor<'a> {
    bytes: &'a [u8],
}

impl<'a> Cursor<'a> {
    /// Wraps `bytes` for decoding from the start.
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    /// Returns the number of bytes not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.bytes.len()
    }

    /// Takes exactly `n` bytes, advancing the cursor.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.bytes.len() < n {
            return Err(CodecError::UnexpectedEof {
                needed: n - self.bytes.len(),
            });
        }
        let (head, tail) = self.bytes.split_at(n);
        self.bytes = tail;
        Ok(head)
    }

    /// Takes a single byte.
    pub fn take_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }
}

/// Types that can be encoded into the canonical deterministic byte format.
pub trait CanonicalEncode {
    /// Appends this value's canonical encoding to `out`.
    fn encode(&self, out: &mut Vec<u8>);

    /// Returns the standalone canonical encoding of this value.
    fn encode_to_vec(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode(&mut out);
        out
    }
}

/// Types that can be decoded from the canonical deterministic byte format.
pub trait CanonicalDecode: Sized {
    /// Decodes a value from `cursor`, advancing it past the consumed bytes.
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, CodecError>;

    /// Decodes a value from the entirety of `bytes`, erroring if any bytes
    /// remain afterward.
    fn decode_exact(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut cursor = Cursor::new(bytes);
        let value = Self::decode(&mut cursor)?;
        if cursor.remaining() != 0 {
            return Err(CodecError::TrailingBytes {
                extra: cursor.remaining(),
                type_name: std::any::type_name::<Self>(),
            });
        }
        Ok(value)
    }
}

macro_rules! impl_canonical_int {
    ($ty:ty) => {
        impl CanonicalEncode for $ty {
            fn encode(&self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }
        }
        impl CanonicalDecode for $ty {
            fn decode(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
                let bytes = cursor.take(std::mem::size_of::<$ty>())?;
                Ok(<$ty>::from_le_bytes(bytes.try_into().unwrap_or_else(|_| {
                    unreachable!("take() guarantees exact length")
                })))
            }
        }
    };
}

impl_canonical_int!(u8);
impl_canonical_int!(u16);
impl_canonical_int!(u32);
impl_canonical_int!(u64);
impl_canonical_int!(i32);
impl_canonical_int!(i64);

impl CanonicalEncode for bool {
    fn encode(&self, out: &mut Vec<u8>) {
        out.push(u8::from(*self));
    }
}

impl CanonicalDecode for bool {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        match cursor.take_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            tag => Err(CodecError::InvalidTag {
                tag,
                type_name: "bool",
            }),
        }
    }
}

impl CanonicalEncode for f64 {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

impl CanonicalDecode for f64 {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        let bytes = cursor.take(8)?;
        Ok(f64::from_le_bytes(bytes.try_into().unwrap_or_else(|_| {
            unreachable!("take() guarantees exact length")
        })))
    }
}

impl CanonicalEncode for str {
    fn encode(&self, out: &mut Vec<u8>) {
        (self.len() as u64).encode(out);
        out.extend_from_slice(self.as_bytes());
    }
}

impl CanonicalEncode for String {
    fn encode(&self, out: &mut Vec<u8>) {
        self.as_str().encode(out);
    }
}

impl CanonicalDecode for String {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        let len = decode_len(cursor, "String")?;
        let bytes = cursor.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }
}

impl CanonicalEncode for [u8] {
    fn encode(&self, out: &mut Vec<u8>) {
        (self.len() as u64).encode(out);
        out.extend_from_slice(self);
    }
}

impl CanonicalEncode for Vec<u8> {
    fn encode(&self, out: &mut Vec<u8>) {
        self.as_slice().encode(out);
    }
}

impl CanonicalDecode for Vec<u8> {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        let len = decode_len(cursor, "Vec<u8>")?;
        Ok(cursor.take(len)?.to_vec())
    }
}

impl<T: CanonicalEncode> CanonicalEncode for Option<T> {
    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            None => out.push(0),
            Some(value) => {
                out.push(1);
                value.encode(out);
            }
        }
    }
}

impl<T: CanonicalDecode> CanonicalDecode for Option<T> {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        match cursor.take_u8()? {
            0 => Ok(None),
            1 => Ok(Some(T::decode(cursor)?)),
            tag => Err(CodecError::InvalidTag {
                tag,
                type_name: "Option<T>",
            }),
        }
    }
}

impl<T: CanonicalEncode> CanonicalEncode for Vec<T> {
    fn encode(&self, out: &mut Vec<u8>) {
        (self.len() as u64).encode(out);
        for item in self {
            item.encode(out);
        }
    }
}

impl<T: CanonicalDecode> CanonicalDecode for Vec<T> {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        let len = decode_len(cursor, "Vec<T>")?;
        let mut items = Vec::with_capacity(len.min(1 << 20));
        for _ in 0..len {
            items.push(T::decode(cursor)?);
        }
        Ok(items)
    }
}

impl<const N: usize> CanonicalEncode for [u8; N] {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self);
    }
}

impl<const N: usize> CanonicalDecode for [u8; N] {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        let bytes = cursor.take(N)?;
        bytes.try_into().map_err(|_| CodecError::UnexpectedEof { needed: N })
    }
}

fn decode_len(cursor: &mut Cursor<'_>, type_name: &'static str) -> Result<usize, CodecError> {
    let len = u64::decode(cursor)?;
    usize::try_from(len).map_err(|_| CodecError::LengthOutOfRange { len, type_name })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_round_trip() {
        let mut buf = Vec::new();
        42u64.encode(&mut buf);
        (-7i64).encode(&mut buf);
        let mut cursor = Cursor::new(&buf);
        assert_eq!(u64::decode(&mut cursor).unwrap(), 42);
        assert_eq!(i64::decode(&mut cursor).unwrap(), -7);
        assert_eq!(cursor.remaining(), 0);
    }

    #[test]
    fn string_round_trips() {
        let value = "hello, truth".to_string();
        let buf = value.encode_to_vec();
        let decoded = String::decode_exact(&buf).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn option_none_and_some_round_trip() {
        let none: Option<u32> = None;
        let some: Option<u32> = Some(9);
        assert_eq!(Option::<u32>::decode_exact(&none.encode_to_vec()).unwrap(), none);
        assert_eq!(Option::<u32>::decode_exact(&some.encode_to_vec()).unwrap(), some);
    }

    #[test]
    fn vec_round_trips_and_is_order_sensitive() {
        let values = vec![1u32, 2, 3];
        let buf = values.encode_to_vec();
        assert_eq!(Vec::<u32>::decode_exact(&buf).unwrap(), values);

        let reordered = vec![3u32, 2, 1];
        assert_ne!(reordered.encode_to_vec(), buf);
    }

    #[test]
    fn truncated_buffer_errors_instead_of_panicking() {
        let buf = 42u64.encode_to_vec();
        let short = &buf[..4];
        assert!(matches!(
            u64::decode_exact(short),
            Err(CodecError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut buf = 42u64.encode_to_vec();
        buf.push(0xFF);
        assert!(matches!(
            u64::decode_exact(&buf),
            Err(CodecError::TrailingBytes { .. })
        ));
    }

    #[test]
    fn f64_preserves_bit_pattern_including_nan() {
        let value = f64::NAN;
        let buf = value.encode_to_vec();
        let decoded = f64::decode_exact(&buf).unwrap();
        assert_eq!(decoded.to_bits(), value.to_bits());
    }
}
