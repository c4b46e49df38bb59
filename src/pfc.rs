//! Plain front-coded string sections.
//!
//! A [`FrontCodedSection`] stores a sorted, deduplicated string sequence in
//! fixed-size buckets. The first string of each bucket is kept verbatim;
//! every later string is stored as a uvarint shared-prefix length against
//! the immediately preceding string plus the remaining suffix. Strings are
//! NUL-terminated inside the payload, which is why terms must be
//! zero-byte-free.
//!
//! Sections are built once, then immutable: lookups take `&self` and the
//! type is `Send + Sync`, so a sealed section can be read concurrently
//! without locks.
//!
//! ```
//! use pfcdict::pfc::FrontCodedSection;
//!
//! let sec = FrontCodedSection::encode(
//!     ["http://ex/a", "http://ex/b", "http://ex/c"],
//!     16,
//! ).expect("sorted input");
//! assert_eq!(sec.extract(2).unwrap(), "http://ex/b");
//! assert_eq!(sec.locate(b"http://ex/c"), Some(3));
//! assert_eq!(sec.locate(b"http://ex/z"), None);
//! ```

use std::cmp::Ordering;

use log::debug;

use crate::bytestr::{ByteStr, PackedBits, compare, longest_common_prefix};
use crate::error::{DictError, Result};

/// Default bucket size; bounds worst-case reconstruction cost while still
/// exploiting shared prefixes among adjacent IRIs.
pub const DEFAULT_BUCKET_SIZE: usize = 16;

pub(crate) fn push_uvarint(mut v: u64, out: &mut Vec<u8>) {
    loop {
        let mut b = (v & 0x7f) as u8;
        v >>= 7;
        if v != 0 {
            b |= 0x80;
        }
        out.push(b);
        if v == 0 {
            break;
        }
    }
}

pub(crate) fn read_uvarint(buf: &[u8], mut off: usize) -> Option<(u64, usize)> {
    let (mut x, mut s) = (0u64, 0u32);
    for _ in 0..10 {
        let b = *buf.get(off)? as u64;
        off += 1;
        x |= (b & 0x7f) << s;
        if b & 0x80 == 0 {
            return Some((x, off));
        }
        s += 7;
    }
    None
}

/// One sorted, deduplicated, front-coded string collection.
#[derive(Debug, Clone)]
pub struct FrontCodedSection {
    n_strings: u64,
    bucket_size: usize,
    /// Byte offset of each bucket start in `payload`, plus the payload end.
    offsets: PackedBits,
    payload: Vec<u8>,
}

impl FrontCodedSection {
    /// Front-code a strictly increasing string sequence.
    ///
    /// Fails with [`DictError::OrderingViolation`] on out-of-order or
    /// duplicate input, and rejects embedded NUL bytes.
    pub fn encode<I, S>(strings: I, bucket_size: usize) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        if bucket_size == 0 {
            return Err(DictError::Invalid("bucket size must be nonzero"));
        }
        let mut payload: Vec<u8> = Vec::new();
        let mut offsets: Vec<u64> = Vec::new();
        let mut prev: Vec<u8> = Vec::new();
        let mut n = 0usize;
        for s in strings {
            let s = s.as_ref();
            if s.contains(&0) {
                return Err(DictError::Invalid("embedded NUL byte in term"));
            }
            if n > 0 && compare(&prev, s) != Ordering::Less {
                return Err(DictError::OrderingViolation { position: n });
            }
            if n % bucket_size == 0 {
                offsets.push(payload.len() as u64);
                payload.extend_from_slice(s);
            } else {
                let lcp = longest_common_prefix(&prev, s);
                push_uvarint(lcp as u64, &mut payload);
                payload.extend_from_slice(&s[lcp..]);
            }
            payload.push(0);
            prev.clear();
            prev.extend_from_slice(s);
            n += 1;
        }
        offsets.push(payload.len() as u64);
        debug!(
            "front-coded {} strings into {} bytes ({} buckets of {})",
            n,
            payload.len(),
            offsets.len() - 1,
            bucket_size
        );
        Ok(FrontCodedSection {
            n_strings: n as u64,
            bucket_size,
            offsets: PackedBits::from_values(&offsets),
            payload,
        })
    }

    /// Empty section with the given bucket size.
    pub fn empty(bucket_size: usize) -> Self {
        FrontCodedSection {
            n_strings: 0,
            bucket_size: bucket_size.max(1),
            offsets: PackedBits::from_values(&[0]),
            payload: Vec::new(),
        }
    }

    pub fn num_strings(&self) -> u64 {
        self.n_strings
    }

    pub fn is_empty(&self) -> bool {
        self.n_strings == 0
    }

    pub fn bucket_size(&self) -> usize {
        self.bucket_size
    }

    /// Size of the front-coded payload in bytes.
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    fn num_buckets(&self) -> usize {
        (self.n_strings as usize).div_ceil(self.bucket_size)
    }

    /// Append the bytes of one NUL-terminated run to `out`, returning the
    /// cursor past the terminator.
    fn read_suffix(&self, mut pos: usize, end: usize, out: &mut Vec<u8>) -> Option<usize> {
        while pos < end {
            let b = self.payload[pos];
            pos += 1;
            if b == 0 {
                return Some(pos);
            }
            out.push(b);
        }
        None
    }

    /// Decode the verbatim header string of `bucket`.
    fn header(&self, bucket: usize) -> Option<&[u8]> {
        let start = self.offsets.get(bucket) as usize;
        let end = self.offsets.get(bucket + 1) as usize;
        let rel = self.payload.get(start..end)?.iter().position(|&b| b == 0)?;
        Some(&self.payload[start..start + rel])
    }

    /// Reconstruct the string with 1-based `local_id`.
    ///
    /// O(1) for bucket headers, O(bucket size) otherwise.
    pub fn extract(&self, local_id: u64) -> Result<ByteStr> {
        if local_id == 0 || local_id > self.n_strings {
            return Err(DictError::OutOfRangeId {
                id: local_id,
                max: self.n_strings,
            });
        }
        let idx = (local_id - 1) as usize;
        let bucket = idx / self.bucket_size;
        let in_bucket = idx % self.bucket_size;
        let end = self.offsets.get(bucket + 1) as usize;
        let mut out = Vec::new();
        let mut cursor = self
            .read_suffix(self.offsets.get(bucket) as usize, end, &mut out)
            .ok_or_else(|| DictError::Malformed("unterminated bucket header".into()))?;
        for _ in 0..in_bucket {
            let (lcp, next) = read_uvarint(&self.payload[..end], cursor)
                .ok_or_else(|| DictError::Malformed("truncated prefix length".into()))?;
            if lcp as usize > out.len() {
                return Err(DictError::Malformed("prefix length exceeds previous string".into()));
            }
            out.truncate(lcp as usize);
            cursor = self
                .read_suffix(next, end, &mut out)
                .ok_or_else(|| DictError::Malformed("unterminated bucket entry".into()))?;
        }
        Ok(ByteStr::new(out))
    }

    /// Binary search over bucket headers, then a linear scan inside the one
    /// candidate bucket. Returns the 1-based local id, or `None` when the
    /// string is not a member (the ordinary negative result, not an error).
    pub fn locate(&self, target: &[u8]) -> Option<u64> {
        if self.n_strings == 0 {
            return None;
        }
        // Count buckets whose header is <= target.
        let n_buckets = self.num_buckets();
        let mut lo = 0usize;
        let mut hi = n_buckets;
        while lo < hi {
            let mid = (lo + hi) / 2;
            match compare(self.header(mid)?, target) {
                Ordering::Less | Ordering::Equal => lo = mid + 1,
                Ordering::Greater => hi = mid,
            }
        }
        if lo == 0 {
            // target sorts before the first header
            return None;
        }
        let bucket = lo - 1;
        let base = (bucket * self.bucket_size) as u64;
        let entries = self
            .bucket_size
            .min(self.n_strings as usize - bucket * self.bucket_size);
        let end = self.offsets.get(bucket + 1) as usize;
        let mut out = Vec::new();
        let mut cursor = self.read_suffix(self.offsets.get(bucket) as usize, end, &mut out)?;
        if out == target {
            return Some(base + 1);
        }
        for k in 1..entries {
            let (lcp, next) = read_uvarint(&self.payload[..end], cursor)?;
            if lcp as usize > out.len() {
                return None;
            }
            out.truncate(lcp as usize);
            cursor = self.read_suffix(next, end, &mut out)?;
            match compare(&out, target) {
                Ordering::Equal => return Some(base + k as u64 + 1),
                Ordering::Greater => return None,
                Ordering::Less => {}
            }
        }
        None
    }

    /// Sorted streaming iterator over all member strings.
    pub fn iter(&self) -> SectionIter<'_> {
        SectionIter {
            section: self,
            next_idx: 0,
            cursor: 0,
            current: Vec::new(),
        }
    }

    /// Append the persisted wire form: `{ stringCount, bucketSize,
    /// bucketOffsetIndex, frontCodedPayload }`.
    pub(crate) fn write_into(&self, out: &mut Vec<u8>) {
        push_uvarint(self.n_strings, out);
        push_uvarint(self.bucket_size as u64, out);
        push_uvarint(self.offsets.width() as u64, out);
        push_uvarint(self.offsets.len() as u64, out);
        push_uvarint(self.offsets.words().len() as u64, out);
        for w in self.offsets.words() {
            out.extend_from_slice(&w.to_le_bytes());
        }
        push_uvarint(self.payload.len() as u64, out);
        out.extend_from_slice(&self.payload);
    }

    /// Parse one section starting at `*pos`, advancing the cursor.
    ///
    /// Validates declared counts against the bucket index and walks the
    /// payload once so later lookups never read past a bucket.
    pub(crate) fn parse(data: &[u8], pos: &mut usize) -> Result<Self> {
        let mal = |m: &str| DictError::Malformed(m.into());
        let mut take = |what: &'static str| -> Result<u64> {
            let (v, next) = read_uvarint(data, *pos)
                .ok_or_else(|| DictError::Malformed(format!("truncated {what}")))?;
            *pos = next;
            Ok(v)
        };
        let n_strings = take("string count")?;
        let bucket_size = take("bucket size")? as usize;
        let width = take("offset width")? as u32;
        let n_offsets = take("offset count")? as usize;
        let n_words = take("offset words")? as usize;
        if bucket_size == 0 {
            return Err(mal("zero bucket size"));
        }
        if n_words > data.len() / 8 + 1 {
            return Err(mal("offset index larger than section"));
        }
        let mut words = Vec::with_capacity(n_words);
        for _ in 0..n_words {
            let end = pos.checked_add(8).ok_or_else(|| mal("offset index overflow"))?;
            let chunk = data
                .get(*pos..end)
                .ok_or_else(|| mal("offset index out of bounds"))?;
            words.push(u64::from_le_bytes(chunk.try_into().unwrap()));
            *pos = end;
        }
        let offsets = PackedBits::from_words(width, n_offsets, words)
            .ok_or_else(|| mal("offset index word count disagrees with entry count"))?;
        let payload_len = {
            let (v, next) = read_uvarint(data, *pos).ok_or_else(|| mal("truncated payload length"))?;
            *pos = next;
            v as usize
        };
        let end = pos
            .checked_add(payload_len)
            .filter(|&e| e <= data.len())
            .ok_or_else(|| mal("payload out of bounds"))?;
        let payload = data[*pos..end].to_vec();
        *pos = end;

        let section = FrontCodedSection {
            n_strings,
            bucket_size,
            offsets,
            payload,
        };
        section.validate()?;
        Ok(section)
    }

    /// Structural consistency check between declared counts, the bucket
    /// index, and the payload.
    fn validate(&self) -> Result<()> {
        let mal = |m: &str| DictError::Malformed(m.into());
        let n_buckets = self.num_buckets();
        if self.offsets.len() != n_buckets + 1 {
            return Err(mal("bucket count disagrees with declared string count"));
        }
        if self.offsets.get(n_buckets) as usize != self.payload.len() {
            return Err(mal("bucket index does not cover the payload"));
        }
        for b in 0..n_buckets {
            let start = self.offsets.get(b) as usize;
            let end = self.offsets.get(b + 1) as usize;
            if start > end || end > self.payload.len() {
                return Err(mal("bucket offsets not monotone"));
            }
            let entries = self
                .bucket_size
                .min(self.n_strings as usize - b * self.bucket_size);
            let mut current = Vec::new();
            let mut cursor = self
                .read_suffix(start, end, &mut current)
                .ok_or_else(|| mal("unterminated bucket header"))?;
            for _ in 1..entries {
                let (lcp, next) = read_uvarint(&self.payload[..end], cursor)
                    .ok_or_else(|| mal("truncated prefix length"))?;
                if lcp as usize > current.len() {
                    return Err(mal("prefix length exceeds previous string"));
                }
                current.truncate(lcp as usize);
                cursor = self
                    .read_suffix(next, end, &mut current)
                    .ok_or_else(|| mal("unterminated bucket entry"))?;
            }
            if cursor != end {
                return Err(mal("bucket payload has trailing bytes"));
            }
        }
        Ok(())
    }
}

/// Sequential decoder over a sealed section, in sorted order.
#[derive(Debug)]
pub struct SectionIter<'a> {
    section: &'a FrontCodedSection,
    next_idx: usize,
    cursor: usize,
    current: Vec<u8>,
}

impl Iterator for SectionIter<'_> {
    type Item = ByteStr;

    fn next(&mut self) -> Option<Self::Item> {
        let sec = self.section;
        if self.next_idx as u64 >= sec.n_strings {
            return None;
        }
        let bucket = self.next_idx / sec.bucket_size;
        let end = sec.offsets.get(bucket + 1) as usize;
        if self.next_idx % sec.bucket_size == 0 {
            self.current.clear();
            self.cursor = sec.read_suffix(sec.offsets.get(bucket) as usize, end, &mut self.current)?;
        } else {
            let (lcp, next) = read_uvarint(&sec.payload[..end], self.cursor)?;
            if lcp as usize > self.current.len() {
                return None;
            }
            self.current.truncate(lcp as usize);
            self.cursor = sec.read_suffix(next, end, &mut self.current)?;
        }
        self.next_idx += 1;
        Some(ByteStr::new(self.current.clone()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let rem = self.section.n_strings as usize - self.next_idx;
        (rem, Some(rem))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(strings: &[&str], bucket: usize) -> FrontCodedSection {
        FrontCodedSection::encode(strings.iter().copied(), bucket).expect("encode")
    }

    #[test]
    fn roundtrip_small_buckets() {
        let strings = [
            "http://ex/a",
            "http://ex/ab",
            "http://ex/abc",
            "http://ex/b",
            "http://ex/ba",
            "zebra",
        ];
        let sec = section(&strings, 2);
        assert_eq!(sec.num_strings(), 6);
        for (i, s) in strings.iter().enumerate() {
            let id = i as u64 + 1;
            assert_eq!(sec.extract(id).unwrap(), *s);
            assert_eq!(sec.locate(s.as_bytes()), Some(id));
        }
        assert_eq!(sec.locate(b"http://ex/aa"), None);
        assert_eq!(sec.locate(b"aaaa"), None);
        assert_eq!(sec.locate(b"zz"), None);
    }

    #[test]
    fn rejects_unsorted_and_duplicates() {
        let err = FrontCodedSection::encode(["b", "a"], 16).unwrap_err();
        match err {
            DictError::OrderingViolation { position } => assert_eq!(position, 1),
            e => panic!("expected OrderingViolation, got {e}"),
        }
        assert!(matches!(
            FrontCodedSection::encode(["a", "a"], 16),
            Err(DictError::OrderingViolation { .. })
        ));
    }

    #[test]
    fn rejects_embedded_nul() {
        let with_nul: &[&[u8]] = &[b"a\0b"];
        assert!(matches!(
            FrontCodedSection::encode(with_nul.iter().copied(), 16),
            Err(DictError::Invalid(_))
        ));
    }

    #[test]
    fn empty_section() {
        let sec = FrontCodedSection::empty(16);
        assert!(sec.is_empty());
        assert_eq!(sec.locate(b"anything"), None);
        assert!(matches!(
            sec.extract(1),
            Err(DictError::OutOfRangeId { .. })
        ));
        assert_eq!(sec.iter().count(), 0);
    }

    #[test]
    fn empty_string_is_a_valid_minimal_member() {
        let sec = FrontCodedSection::encode(["", "a", "b"], 2).expect("encode");
        assert_eq!(sec.extract(1).unwrap(), "");
        assert_eq!(sec.locate(b""), Some(1));
        assert_eq!(sec.locate(b"a"), Some(2));
    }

    #[test]
    fn iter_matches_extract() {
        let strings: Vec<String> = (0..100).map(|i| format!("http://ex/term{i:03}")).collect();
        let sec = FrontCodedSection::encode(strings.iter(), 16).expect("encode");
        for (i, s) in sec.iter().enumerate() {
            assert_eq!(s, sec.extract(i as u64 + 1).unwrap());
        }
        // strict order across adjacent ids
        for i in 1..sec.num_strings() {
            assert!(sec.extract(i).unwrap() < sec.extract(i + 1).unwrap());
        }
    }

    #[test]
    fn wire_roundtrip_and_count_mismatch() {
        let strings: Vec<String> = (0..50).map(|i| format!("k{i:04}")).collect();
        let sec = FrontCodedSection::encode(strings.iter(), 8).expect("encode");
        let mut buf = Vec::new();
        sec.write_into(&mut buf);
        let mut pos = 0;
        let back = FrontCodedSection::parse(&buf, &mut pos).expect("parse");
        assert_eq!(pos, buf.len());
        assert_eq!(back.num_strings(), 50);
        assert_eq!(back.extract(17).unwrap(), "k0016");

        // corrupt the declared string count: bucket index no longer agrees
        let mut bad = buf.clone();
        bad[0] = 49;
        let mut pos = 0;
        assert!(matches!(
            FrontCodedSection::parse(&bad, &mut pos),
            Err(DictError::Malformed(_))
        ));
    }
}
