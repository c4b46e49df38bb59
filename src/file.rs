//! Persisted form of a [`SectionSpace`].
//!
//! Layout: a fixed 16-byte header (magic, version, flags, shared count),
//! the three fixed sections (shared, subject-only, predicates), then the
//! ordered `(datatypeKey, section)` list for objects, in the key order
//! fixed at seal time. Each section blob carries a CRC32 slot, verified
//! when the header's checksum flag is set; an optional 16-byte footer
//! holds a global CRC and an end-mark.
//!
//! Writes are atomic (temp file + rename). Reading validates bounds,
//! counts, and CRCs before anything is exposed; a file that fails any
//! check never becomes a queryable space.

use std::fs;
use std::path::Path;

use log::debug;

use crate::error::{DictError, Result};
use crate::pfc::{FrontCodedSection, push_uvarint, read_uvarint};
use crate::space::{DatatypeKey, SectionSpace};

const MAGIC: &[u8; 4] = b"PFCD";
const VERSION: u16 = 1;
const ENDMARK: &[u8; 12] = b"PFCD_ENDMARK";

/// Options controlling file emission.
#[derive(Debug, Clone, Copy)]
pub struct WriteOptions {
    /// Compute and embed per-section CRCs and a global footer CRC.
    pub with_crc: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        WriteOptions { with_crc: true }
    }
}

/// Compute IEEE CRC-32.
pub fn crc32_ieee(data: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFF_FFFF;
    for &b in data {
        let mut x = (crc ^ (b as u32)) & 0xFF;
        for _ in 0..8 {
            let lsb = x & 1;
            x >>= 1;
            if lsb != 0 {
                x ^= 0xEDB88320;
            }
        }
        crc = (crc >> 8) ^ x;
    }
    crc ^ 0xFFFF_FFFF
}

fn write_framed(sec: &FrontCodedSection, with_crc: bool, out: &mut Vec<u8>) {
    let mut blob = Vec::new();
    sec.write_into(&mut blob);
    push_uvarint(blob.len() as u64, out);
    // the crc slot is always present; the header flag says whether readers
    // check it
    let crc = if with_crc { crc32_ieee(&blob) } else { 0 };
    out.extend_from_slice(&blob);
    out.extend_from_slice(&crc.to_le_bytes());
}

fn parse_framed(data: &[u8], pos: &mut usize, with_crc: bool) -> Result<FrontCodedSection> {
    let mal = |m: &str| DictError::Malformed(m.into());
    let (blob_len, next) =
        read_uvarint(data, *pos).ok_or_else(|| mal("truncated section length"))?;
    let start = next;
    let end = start
        .checked_add(blob_len as usize)
        .and_then(|e| e.checked_add(4))
        .filter(|&e| e <= data.len())
        .map(|e| e - 4)
        .ok_or_else(|| mal("section out of bounds"))?;
    let blob = &data[start..end];
    let crc = u32::from_le_bytes(data[end..end + 4].try_into().unwrap());
    if with_crc && crc32_ieee(blob) != crc {
        return Err(mal("section CRC mismatch"));
    }
    let mut inner = 0usize;
    let sec = FrontCodedSection::parse(blob, &mut inner)?;
    if inner != blob.len() {
        return Err(mal("trailing bytes in section"));
    }
    *pos = end + 4;
    Ok(sec)
}

/// Parse the optional 16-byte footer containing the global CRC and magic.
fn parse_footer(data: &[u8]) -> Option<(u32, usize)> {
    if data.len() < 16 {
        return None;
    }
    let base = data.len() - 16;
    if &data[base + 4..base + 16] != ENDMARK {
        return None;
    }
    let crc = u32::from_le_bytes(data[base..base + 4].try_into().unwrap());
    Some((crc, base))
}

impl SectionSpace {
    /// Serialize the space into one buffer.
    pub fn to_bytes(&self, opts: WriteOptions) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&VERSION.to_le_bytes());
        let flags: u16 = if opts.with_crc { 1 } else { 0 };
        out.extend_from_slice(&flags.to_le_bytes());
        out.extend_from_slice(&self.num_shared().to_le_bytes());

        write_framed(self.shared_section(), opts.with_crc, &mut out);
        write_framed(self.subjects_section(), opts.with_crc, &mut out);
        write_framed(self.predicates_section(), opts.with_crc, &mut out);

        push_uvarint(self.object_sections().len() as u64, &mut out);
        for (key, sec) in self.object_sections() {
            match key {
                DatatypeKey::Plain => out.push(0),
                DatatypeKey::Typed(iri) => {
                    out.push(1);
                    push_uvarint(iri.len() as u64, &mut out);
                    out.extend_from_slice(iri.as_bytes());
                }
            }
            write_framed(sec, opts.with_crc, &mut out);
        }

        if opts.with_crc {
            let crc = crc32_ieee(&out);
            out.extend_from_slice(&crc.to_le_bytes());
            out.extend_from_slice(ENDMARK);
        }
        out
    }

    /// Write the space to `path` via a temp file and atomic rename.
    pub fn write_to<P: AsRef<Path>>(&self, path: P, opts: WriteOptions) -> Result<()> {
        let bytes = self.to_bytes(opts);
        let tmp_path = path.as_ref().with_extension("tmp.pfcd");
        fs::write(&tmp_path, &bytes)?;
        fs::rename(&tmp_path, path.as_ref())?;
        debug!(
            "wrote section space to {} ({} bytes)",
            path.as_ref().display(),
            bytes.len()
        );
        Ok(())
    }

    /// Parse and validate a persisted space.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mal = |m: &str| DictError::Malformed(m.into());
        if data.len() < 16 {
            return Err(DictError::Invalid("short or invalid header"));
        }
        if &data[0..4] != MAGIC {
            return Err(DictError::Invalid("bad magic"));
        }
        let version = u16::from_le_bytes(data[4..6].try_into().unwrap());
        if version != VERSION {
            return Err(DictError::Invalid("unsupported version"));
        }
        let flags = u16::from_le_bytes(data[6..8].try_into().unwrap());
        let with_crc = flags & 1 != 0;
        let num_shared = u64::from_le_bytes(data[8..16].try_into().unwrap());

        // Global CRC first: nothing else is trusted before it passes.
        let body = if let Some((crc, base)) = parse_footer(data) {
            if crc32_ieee(&data[..base]) != crc {
                return Err(mal("global CRC mismatch"));
            }
            &data[..base]
        } else {
            data
        };

        let mut pos = 16usize;
        let shared = parse_framed(body, &mut pos, with_crc)?;
        let subjects = parse_framed(body, &mut pos, with_crc)?;
        let predicates = parse_framed(body, &mut pos, with_crc)?;

        let (n_objects, next) =
            read_uvarint(body, pos).ok_or_else(|| mal("truncated object section count"))?;
        pos = next;
        let mut objects = Vec::with_capacity(n_objects as usize);
        for _ in 0..n_objects {
            let tag = *body.get(pos).ok_or_else(|| mal("truncated datatype tag"))?;
            pos += 1;
            let key = match tag {
                0 => DatatypeKey::Plain,
                1 => {
                    let (key_len, next) =
                        read_uvarint(body, pos).ok_or_else(|| mal("truncated datatype key"))?;
                    let end = next
                        .checked_add(key_len as usize)
                        .filter(|&e| e <= body.len())
                        .ok_or_else(|| mal("datatype key out of bounds"))?;
                    let iri = std::str::from_utf8(&body[next..end])
                        .map_err(|_| mal("datatype key not UTF-8"))?
                        .to_string();
                    pos = end;
                    DatatypeKey::Typed(iri)
                }
                _ => return Err(mal("unknown datatype tag")),
            };
            objects.push((key, parse_framed(body, &mut pos, with_crc)?));
        }
        if pos != body.len() {
            return Err(mal("trailing bytes after object sections"));
        }

        SectionSpace::assemble(num_shared, shared, subjects, predicates, objects)
    }

    /// Open and validate a persisted space from disk.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read(path.as_ref())?;
        Self::from_bytes(&data)
    }

    /// Open via `memmap2`, avoiding an intermediate read buffer. Section
    /// payloads are still copied into owned storage during parsing.
    ///
    /// Enabled with the `mmap` feature.
    #[cfg(feature = "mmap")]
    pub fn open_mmap<P: AsRef<Path>>(path: P) -> Result<Self> {
        use std::fs::File;
        let f = File::open(path.as_ref())?;
        let mmap = unsafe { memmap2::MmapOptions::new().map(&f) }.map_err(DictError::Io)?;
        Self::from_bytes(&mmap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::{EncodeOptions, Role, SectionSpaceBuilder};

    fn sample() -> SectionSpace {
        SectionSpaceBuilder::new(EncodeOptions { bucket_size: 4 })
            .subjects(["http://ex/s1", "http://ex/s2"])
            .predicates(["http://ex/p"])
            .objects(DatatypeKey::Plain, ["http://ex/o1", "http://ex/s1"])
            .objects(
                DatatypeKey::Typed("http://www.w3.org/2001/XMLSchema#integer".into()),
                ["42"],
            )
            .build()
            .expect("build")
    }

    #[test]
    fn bytes_roundtrip() {
        let space = sample();
        let bytes = space.to_bytes(WriteOptions::default());
        let back = SectionSpace::from_bytes(&bytes).expect("parse");
        assert_eq!(back.num_shared(), space.num_shared());
        for role in [Role::Subject, Role::Predicate, Role::Object] {
            assert_eq!(back.count(role), space.count(role));
            for id in 1..=space.count(role) {
                assert_eq!(
                    back.id_to_string(id, role).unwrap(),
                    space.id_to_string(id, role).unwrap()
                );
            }
        }
    }

    #[test]
    fn rejects_bad_magic_and_version() {
        let mut bytes = sample().to_bytes(WriteOptions::default());
        bytes[0] = b'X';
        assert!(matches!(
            SectionSpace::from_bytes(&bytes),
            Err(DictError::Invalid("bad magic"))
        ));
        let mut bytes = sample().to_bytes(WriteOptions::default());
        bytes[4] = 99;
        assert!(matches!(
            SectionSpace::from_bytes(&bytes),
            Err(DictError::Invalid("unsupported version"))
        ));
    }

    #[test]
    fn detects_payload_corruption() {
        let bytes = sample().to_bytes(WriteOptions::default());
        // flip one byte in the middle of the body
        let mut bad = bytes.clone();
        let mid = bad.len() / 2;
        bad[mid] ^= 0xFF;
        assert!(matches!(
            SectionSpace::from_bytes(&bad),
            Err(DictError::Malformed(_))
        ));
    }

    #[test]
    fn parses_without_crcs() {
        let space = sample();
        let bytes = space.to_bytes(WriteOptions { with_crc: false });
        let back = SectionSpace::from_bytes(&bytes).expect("parse");
        assert_eq!(back.count(Role::Object), space.count(Role::Object));
    }

    #[test]
    fn huge_declared_section_length_is_malformed() {
        // a near-u64::MAX framed length must not wrap the bounds arithmetic
        let mut data = Vec::new();
        data.extend_from_slice(MAGIC);
        data.extend_from_slice(&VERSION.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&0u64.to_le_bytes());
        for huge in [u64::MAX, u64::MAX - 29, u64::MAX / 2] {
            let mut bad = data.clone();
            push_uvarint(huge, &mut bad);
            assert!(matches!(
                SectionSpace::from_bytes(&bad),
                Err(DictError::Malformed(_))
            ));
        }
    }

    #[test]
    fn crc_slots_are_ignored_when_the_flag_is_off() {
        let space = sample();
        let mut bytes = space.to_bytes(WriteOptions { with_crc: false });
        // scribble over the first section's crc slot; the header flag says
        // sections are unchecked, so the slot value must not be interpreted
        let (blob_len, next) = read_uvarint(&bytes, 16).expect("section length");
        let crc_at = next + blob_len as usize;
        for b in &mut bytes[crc_at..crc_at + 4] {
            *b = 0xAA;
        }
        let back = SectionSpace::from_bytes(&bytes).expect("parse");
        assert_eq!(back.num_shared(), space.num_shared());
    }

    #[test]
    fn section_crcs_are_checked_even_without_a_footer() {
        let bytes = sample().to_bytes(WriteOptions::default());
        // drop the footer, then flip a byte inside the first section blob
        let mut bad = bytes[..bytes.len() - 16].to_vec();
        let (_, next) = read_uvarint(&bad, 16).expect("section length");
        bad[next] ^= 0xFF;
        assert!(matches!(
            SectionSpace::from_bytes(&bad),
            Err(DictError::Malformed(_))
        ));
    }
}
