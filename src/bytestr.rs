//! Byte-string ordering and bit-packing primitives.
//!
//! Every term in a dictionary is a [`ByteStr`]: an owned, zero-byte-free
//! UTF-8 byte sequence compared byte-lexicographically. The empty string is
//! strictly minimal in this order, and the same order is used everywhere in
//! the crate, including front-coding bucket boundaries. Rust's slice
//! ordering already provides exactly this total order, so `ByteStr` derives
//! its `Ord` from the underlying bytes.

use std::cmp::Ordering;
use std::fmt;

/// Owned, zero-byte-free byte sequence holding one RDF term's lexical form.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByteStr(Vec<u8>);

impl ByteStr {
    /// Wrap raw bytes. The zero-byte-free contract is checked where strings
    /// enter the format (see [`crate::pfc::FrontCodedSection::encode`]).
    pub fn new(bytes: Vec<u8>) -> Self {
        ByteStr(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl fmt::Display for ByteStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl From<&str> for ByteStr {
    fn from(s: &str) -> Self {
        ByteStr(s.as_bytes().to_vec())
    }
}

impl From<String> for ByteStr {
    fn from(s: String) -> Self {
        ByteStr(s.into_bytes())
    }
}

impl From<Vec<u8>> for ByteStr {
    fn from(v: Vec<u8>) -> Self {
        ByteStr(v)
    }
}

impl AsRef<[u8]> for ByteStr {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl PartialEq<&str> for ByteStr {
    fn eq(&self, other: &&str) -> bool {
        self.0 == other.as_bytes()
    }
}

/// Length of the longest common prefix of `a` and `b`.
pub fn longest_common_prefix(a: &[u8], b: &[u8]) -> usize {
    let n = a.len().min(b.len());
    let mut i = 0;
    while i < n && a[i] == b[i] {
        i += 1;
    }
    i
}

/// Byte-lexicographic comparison. Absence of further bytes means "ends
/// here", so the empty string sorts before everything else.
pub fn compare(a: &[u8], b: &[u8]) -> Ordering {
    a.cmp(b)
}

/// Write the low `num_bits` of `value` at bit position `pos`, growing `buf`
/// as needed. Assumes the target bits are still zero; adjacent bits are
/// never disturbed.
pub fn append_bits(buf: &mut Vec<u64>, pos: u64, value: u64, num_bits: u32) {
    debug_assert!(num_bits <= 64);
    if num_bits == 0 {
        return;
    }
    let word = (pos / 64) as usize;
    let shift = (pos % 64) as u32;
    let need = ((pos + num_bits as u64).div_ceil(64)) as usize;
    if buf.len() < need {
        buf.resize(need, 0);
    }
    let mask = if num_bits == 64 {
        u64::MAX
    } else {
        (1u64 << num_bits) - 1
    };
    let v = value & mask;
    buf[word] |= v << shift;
    if shift + num_bits > 64 {
        buf[word + 1] |= v >> (64 - shift);
    }
}

/// Read `num_bits` starting at bit position `pos`. The caller guarantees
/// the span lies within `buf`.
pub fn read_bits(buf: &[u64], pos: u64, num_bits: u32) -> u64 {
    debug_assert!(num_bits <= 64);
    if num_bits == 0 {
        return 0;
    }
    let word = (pos / 64) as usize;
    let shift = (pos % 64) as u32;
    let mask = if num_bits == 64 {
        u64::MAX
    } else {
        (1u64 << num_bits) - 1
    };
    let mut v = buf[word] >> shift;
    if shift + num_bits > 64 {
        v |= buf[word + 1] << (64 - shift);
    }
    v & mask
}

/// Bits needed to represent `v` (at least one).
pub fn bits_needed(v: u64) -> u32 {
    (64 - v.leading_zeros()).max(1)
}

/// Fixed-width packed integer array used for the bucket-offset index of a
/// front-coded section.
#[derive(Debug, Clone)]
pub struct PackedBits {
    width: u32,
    len: usize,
    words: Vec<u64>,
}

impl PackedBits {
    /// Pack `values` at the minimal width for their maximum.
    pub fn from_values(values: &[u64]) -> Self {
        let width = bits_needed(values.iter().copied().max().unwrap_or(0));
        let mut words = Vec::with_capacity((values.len() * width as usize).div_ceil(64));
        for (i, &v) in values.iter().enumerate() {
            append_bits(&mut words, i as u64 * width as u64, v, width);
        }
        PackedBits {
            width,
            len: values.len(),
            words,
        }
    }

    /// Reassemble from persisted parts, validating that the word count
    /// covers `len` entries of `width` bits.
    pub fn from_words(width: u32, len: usize, words: Vec<u64>) -> Option<Self> {
        if width == 0 || width > 64 {
            return None;
        }
        let need = (len as u64 * width as u64).div_ceil(64) as usize;
        if words.len() < need {
            return None;
        }
        Some(PackedBits { width, len, words })
    }

    pub fn get(&self, i: usize) -> u64 {
        debug_assert!(i < self.len);
        read_bits(&self.words, i as u64 * self.width as u64, self.width)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn words(&self) -> &[u64] {
        &self.words
    }
}
