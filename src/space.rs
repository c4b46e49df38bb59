//! Global identifier space over front-coded sections.
//!
//! A [`SectionSpace`] partitions the subject, predicate, and object id
//! ranges across a shared section (terms acting as both subject and
//! object), a subject-only section, a predicate section, and an ordered
//! list of datatype-keyed object sections. Ids are 1-based, dense, and
//! contiguous per role; an object id is defined purely by concatenation
//! position in the fixed datatype-key order, which is part of the persisted
//! format.
//!
//! ```
//! use pfcdict::{DatatypeKey, EncodeOptions, Role, SectionSpaceBuilder};
//!
//! let space = SectionSpaceBuilder::new(EncodeOptions::default())
//!     .subjects(["http://ex/a", "http://ex/b"])
//!     .predicates(["http://ex/p"])
//!     .objects(DatatypeKey::Plain, ["http://ex/b", "http://ex/c"])
//!     .build()
//!     .expect("sorted input");
//! // http://ex/b is both subject and object, so it is shared: id 1 in both roles
//! assert_eq!(space.num_shared(), 1);
//! assert_eq!(
//!     space.id_to_string(1, Role::Subject).unwrap(),
//!     space.id_to_string(1, Role::Object).unwrap()
//! );
//! ```

use std::collections::BTreeMap;

use log::debug;

use crate::bytestr::ByteStr;
use crate::error::{DictError, Result};
use crate::pfc::{DEFAULT_BUCKET_SIZE, FrontCodedSection};

/// Role of a term within a triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Subject,
    Predicate,
    Object,
}

/// Key of one object subsection: either the reserved marker for untyped and
/// language-tagged literals (and IRIs/bnodes appearing as objects), or a
/// datatype IRI. `Plain` orders before every `Typed`; `Typed` keys order by
/// IRI bytes. This order is stable across encode, decode, and merge.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DatatypeKey {
    Plain,
    Typed(String),
}

/// Concrete section a global id resolved into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionRef<'a> {
    Shared,
    SubjectOnly,
    PredicateOnly,
    ObjectPlain,
    ObjectTyped(&'a str),
}

/// Separator between a typed literal's lexical form and its datatype IRI in
/// resolved strings.
pub const DATATYPE_SEPARATOR: &[u8] = b"^^";

/// Options controlling section encoding.
#[derive(Debug, Clone, Copy)]
pub struct EncodeOptions {
    /// Strings per front-coding bucket.
    pub bucket_size: usize,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        EncodeOptions {
            bucket_size: DEFAULT_BUCKET_SIZE,
        }
    }
}

/// True when the label ends in a language tag: a final `@` followed by a
/// non-empty run of `[A-Za-z0-9-]` reaching the end of the label.
pub(crate) fn has_language_tag(label: &[u8]) -> bool {
    let Some(at) = label.iter().rposition(|&b| b == b'@') else {
        return false;
    };
    let tag = &label[at + 1..];
    !tag.is_empty()
        && tag
            .iter()
            .all(|&b| b.is_ascii_alphanumeric() || b == b'-')
}

/// Split `value` at its last `^^` into (label, datatype IRI), if present.
fn split_datatype(value: &[u8]) -> Option<(&[u8], &[u8])> {
    let pos = value
        .windows(2)
        .rposition(|w| w == DATATYPE_SEPARATOR)?;
    Some((&value[..pos], &value[pos + 2..]))
}

/// Sealed multi-section dictionary: the global identifier resolver.
///
/// Built once, then immutable; all lookups take `&self`, so a sealed space
/// is safe for unbounded concurrent readers.
#[derive(Debug, Clone)]
pub struct SectionSpace {
    num_shared: u64,
    shared: FrontCodedSection,
    subjects: FrontCodedSection,
    predicates: FrontCodedSection,
    objects: Vec<(DatatypeKey, FrontCodedSection)>,
    /// Prefix sums over object section counts, built at seal time.
    /// `object_offsets[i]` is the number of object-only strings before
    /// section `i`; the last entry is the object-only total.
    object_offsets: Vec<u64>,
}

impl SectionSpace {
    /// Assemble a space from already-split sorted string sets, encoding
    /// each section. Empty object sections are dropped.
    pub fn from_parts(
        shared: Vec<ByteStr>,
        subjects: Vec<ByteStr>,
        predicates: Vec<ByteStr>,
        objects: Vec<(DatatypeKey, Vec<ByteStr>)>,
        opts: EncodeOptions,
    ) -> Result<Self> {
        let b = opts.bucket_size;
        let shared = FrontCodedSection::encode(shared, b)?;
        let subjects = FrontCodedSection::encode(subjects, b)?;
        let predicates = FrontCodedSection::encode(predicates, b)?;
        let mut sections = Vec::with_capacity(objects.len());
        for (key, strings) in objects {
            if strings.is_empty() {
                continue;
            }
            sections.push((key, FrontCodedSection::encode(strings, b)?));
        }
        Self::assemble(shared.num_strings(), shared, subjects, predicates, sections)
    }

    /// Seal parsed or freshly encoded sections into a space, validating the
    /// key order and count consistency and building the prefix-sum index.
    pub(crate) fn assemble(
        num_shared: u64,
        shared: FrontCodedSection,
        subjects: FrontCodedSection,
        predicates: FrontCodedSection,
        objects: Vec<(DatatypeKey, FrontCodedSection)>,
    ) -> Result<Self> {
        if num_shared != shared.num_strings() {
            return Err(DictError::Malformed(
                "declared shared count disagrees with shared section".into(),
            ));
        }
        for pair in objects.windows(2) {
            if pair[0].0 >= pair[1].0 {
                return Err(DictError::Malformed(
                    "object datatype keys not strictly increasing".into(),
                ));
            }
        }
        // shared and subject-only must partition the subject set
        {
            let mut sh = shared.iter();
            let mut su = subjects.iter();
            let (mut x, mut y) = (sh.next(), su.next());
            while let (Some(a), Some(b)) = (&x, &y) {
                match a.cmp(b) {
                    std::cmp::Ordering::Less => x = sh.next(),
                    std::cmp::Ordering::Greater => y = su.next(),
                    std::cmp::Ordering::Equal => {
                        return Err(DictError::Malformed(
                            "term present in both shared and subject-only sections".into(),
                        ));
                    }
                }
            }
        }
        let mut object_offsets = Vec::with_capacity(objects.len() + 1);
        let mut total = 0u64;
        object_offsets.push(0);
        for (_, sec) in &objects {
            total += sec.num_strings();
            object_offsets.push(total);
        }
        debug!(
            "sealed section space: {} shared, {} subject-only, {} predicates, {} object sections ({} object-only)",
            num_shared,
            subjects.num_strings(),
            predicates.num_strings(),
            objects.len(),
            total
        );
        Ok(SectionSpace {
            num_shared,
            shared,
            subjects,
            predicates,
            objects,
            object_offsets,
        })
    }

    pub fn num_shared(&self) -> u64 {
        self.num_shared
    }

    /// Total number of ids valid under `role`.
    pub fn count(&self, role: Role) -> u64 {
        match role {
            Role::Subject => self.num_shared + self.subjects.num_strings(),
            Role::Predicate => self.predicates.num_strings(),
            Role::Object => self.num_shared + self.object_offsets.last().copied().unwrap_or(0),
        }
    }

    pub fn shared_section(&self) -> &FrontCodedSection {
        &self.shared
    }

    pub fn subjects_section(&self) -> &FrontCodedSection {
        &self.subjects
    }

    pub fn predicates_section(&self) -> &FrontCodedSection {
        &self.predicates
    }

    /// Object subsections in persisted key order.
    pub fn object_sections(&self) -> &[(DatatypeKey, FrontCodedSection)] {
        &self.objects
    }

    /// Resolve `(role, id)` to the concrete section and 1-based local id.
    pub fn resolve(&self, id: u64, role: Role) -> Result<(SectionRef<'_>, &FrontCodedSection, u64)> {
        let max = self.count(role);
        if id == 0 || id > max {
            return Err(DictError::OutOfRangeId { id, max });
        }
        Ok(match role {
            Role::Subject => {
                if id <= self.num_shared {
                    (SectionRef::Shared, &self.shared, id)
                } else {
                    (SectionRef::SubjectOnly, &self.subjects, id - self.num_shared)
                }
            }
            Role::Predicate => (SectionRef::PredicateOnly, &self.predicates, id),
            Role::Object => {
                if id <= self.num_shared {
                    (SectionRef::Shared, &self.shared, id)
                } else {
                    let rel = id - self.num_shared;
                    // greatest i with object_offsets[i] < rel; O(log D)
                    let i = self.object_offsets.partition_point(|&off| off < rel) - 1;
                    let (key, sec) = &self.objects[i];
                    let local = rel - self.object_offsets[i];
                    let sref = match key {
                        DatatypeKey::Plain => SectionRef::ObjectPlain,
                        DatatypeKey::Typed(iri) => SectionRef::ObjectTyped(iri),
                    };
                    (sref, sec, local)
                }
            }
        })
    }

    /// Resolve a global id to its term string.
    ///
    /// Labels from a typed object section come back suffixed with `^^` and
    /// the datatype IRI, unless the label already carries a language tag,
    /// which bypasses suffixing entirely.
    pub fn id_to_string(&self, id: u64, role: Role) -> Result<ByteStr> {
        let (sref, section, local) = self.resolve(id, role)?;
        let label = section.extract(local)?;
        match sref {
            SectionRef::ObjectTyped(dt) if !has_language_tag(label.as_bytes()) => {
                let mut out = label.into_bytes();
                out.extend_from_slice(DATATYPE_SEPARATOR);
                out.extend_from_slice(dt.as_bytes());
                Ok(ByteStr::new(out))
            }
            _ => Ok(label),
        }
    }

    /// Inverse of [`Self::id_to_string`]. `None` is the ordinary negative
    /// result of a lookup, never an error.
    pub fn string_to_id(&self, value: &[u8], role: Role) -> Option<u64> {
        match role {
            Role::Subject => self.shared.locate(value).or_else(|| {
                self.subjects
                    .locate(value)
                    .map(|local| self.num_shared + local)
            }),
            Role::Predicate => self.predicates.locate(value),
            Role::Object => {
                if let Some((label, dt)) = split_datatype(value) {
                    let dt = std::str::from_utf8(dt).ok()?;
                    let key = DatatypeKey::Typed(dt.to_string());
                    let i = self
                        .objects
                        .binary_search_by(|(k, _)| k.cmp(&key))
                        .ok()?;
                    let (_, sec) = &self.objects[i];
                    sec.locate(label)
                        .map(|local| self.num_shared + self.object_offsets[i] + local)
                } else {
                    // plain literals, language-tagged literals, IRIs, bnodes
                    if let Some(id) = self.shared.locate(value) {
                        return Some(id);
                    }
                    // a language-tagged label stored under a datatype key
                    // resolves unsuffixed, so the inverse probes typed
                    // sections too; on collision the smallest key wins
                    let lang = has_language_tag(value);
                    for (i, (key, sec)) in self.objects.iter().enumerate() {
                        if matches!(key, DatatypeKey::Typed(_)) && !lang {
                            continue;
                        }
                        if let Some(local) = sec.locate(value) {
                            return Some(self.num_shared + self.object_offsets[i] + local);
                        }
                    }
                    None
                }
            }
        }
    }
}

/// Builds a [`SectionSpace`] from per-role sorted, deduplicated string
/// sets, deriving the shared split (subjects ∩ objects) with single-pass
/// sorted merges.
#[derive(Debug, Default)]
pub struct SectionSpaceBuilder {
    opts: EncodeOptions,
    subjects: Vec<ByteStr>,
    predicates: Vec<ByteStr>,
    objects: BTreeMap<DatatypeKey, Vec<ByteStr>>,
}

impl SectionSpaceBuilder {
    pub fn new(opts: EncodeOptions) -> Self {
        SectionSpaceBuilder {
            opts,
            ..Default::default()
        }
    }

    /// Full subject term set, sorted and deduplicated.
    pub fn subjects<I, S>(mut self, strings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ByteStr>,
    {
        self.subjects = strings.into_iter().map(Into::into).collect();
        self
    }

    /// Predicate term set, sorted and deduplicated.
    pub fn predicates<I, S>(mut self, strings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ByteStr>,
    {
        self.predicates = strings.into_iter().map(Into::into).collect();
        self
    }

    /// Object labels for one datatype key, sorted and deduplicated.
    pub fn objects<I, S>(mut self, key: DatatypeKey, strings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ByteStr>,
    {
        self.objects
            .insert(key, strings.into_iter().map(Into::into).collect());
        self
    }

    /// Derive the shared split and seal the space.
    pub fn build(self) -> Result<SectionSpace> {
        ensure_sorted(&self.subjects)?;
        ensure_sorted(&self.predicates)?;
        for strings in self.objects.values() {
            ensure_sorted(strings)?;
        }

        // union of object labels across all datatype sections
        let lists: Vec<&[ByteStr]> = self.objects.values().map(|v| v.as_slice()).collect();
        let union_objects = union_sorted(&lists);

        // shared = subjects ∩ objects, single two-pointer pass
        let mut shared: Vec<ByteStr> = Vec::new();
        {
            let (mut i, mut j) = (0usize, 0usize);
            while i < self.subjects.len() && j < union_objects.len() {
                match self.subjects[i].cmp(union_objects[j]) {
                    std::cmp::Ordering::Less => i += 1,
                    std::cmp::Ordering::Greater => j += 1,
                    std::cmp::Ordering::Equal => {
                        shared.push(self.subjects[i].clone());
                        i += 1;
                        j += 1;
                    }
                }
            }
        }

        let subjects_only = subtract_sorted(&self.subjects, &shared);
        let objects_only: Vec<(DatatypeKey, Vec<ByteStr>)> = self
            .objects
            .into_iter()
            .map(|(key, strings)| {
                let remaining = subtract_sorted(&strings, &shared);
                (key, remaining)
            })
            .collect();

        SectionSpace::from_parts(
            shared,
            subjects_only,
            self.predicates,
            objects_only,
            self.opts,
        )
    }
}

fn ensure_sorted(strings: &[ByteStr]) -> Result<()> {
    for (i, pair) in strings.windows(2).enumerate() {
        if pair[0] >= pair[1] {
            return Err(DictError::OrderingViolation { position: i + 1 });
        }
    }
    Ok(())
}

/// Deduplicated union of several sorted lists, one linear pass per list.
fn union_sorted<'a>(lists: &[&'a [ByteStr]]) -> Vec<&'a ByteStr> {
    let mut idx = vec![0usize; lists.len()];
    let mut out = Vec::new();
    loop {
        let mut min: Option<&ByteStr> = None;
        for (li, list) in lists.iter().enumerate() {
            if idx[li] < list.len() {
                let head = &list[idx[li]];
                if min.is_none_or(|m| head < m) {
                    min = Some(head);
                }
            }
        }
        let Some(m) = min else { break };
        out.push(m);
        for (li, list) in lists.iter().enumerate() {
            if idx[li] < list.len() && &list[idx[li]] == m {
                idx[li] += 1;
            }
        }
    }
    out
}

/// `a - b` for sorted deduplicated inputs.
fn subtract_sorted(a: &[ByteStr], b: &[ByteStr]) -> Vec<ByteStr> {
    let mut out = Vec::with_capacity(a.len().saturating_sub(b.len()));
    let mut j = 0usize;
    for s in a {
        while j < b.len() && b[j] < *s {
            j += 1;
        }
        if j < b.len() && b[j] == *s {
            continue;
        }
        out.push(s.clone());
    }
    out
}
