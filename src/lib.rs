//! pfcdict — Compact, immutable front-coded dictionaries for RDF terms.
//!
//! This crate encodes sorted term sets with plain front coding, arranges
//! them into a multi-section global identifier space (shared, subject-only,
//! predicates, and datatype-keyed object sections), and merges sealed
//! spaces with streaming cat/diff passes. It focuses on deterministic
//! output, bounded validated reads, and merges that never materialize hash
//! sets over string content.
//!
//! Quick start: build a space and resolve ids
//!
//! ```
//! use pfcdict::{DatatypeKey, EncodeOptions, Role, SectionSpaceBuilder};
//!
//! let space = SectionSpaceBuilder::new(EncodeOptions::default())
//!     .subjects(["http://ex/alice", "http://ex/bob"])
//!     .predicates(["http://xmlns.com/foaf/0.1/knows"])
//!     .objects(DatatypeKey::Plain, ["http://ex/bob"])
//!     .build()
//!     .expect("sorted input");
//!
//! // bob is both subject and object, so it lives in the shared section
//! let id = space.string_to_id(b"http://ex/bob", Role::Object).expect("present");
//! assert_eq!(space.id_to_string(id, Role::Subject).unwrap(), "http://ex/bob");
//! ```
//!
//! Merge two spaces and carry old ids across
//!
//! ```
//! use pfcdict::{cat, DatatypeKey, EncodeOptions, Role, SectionSpaceBuilder};
//!
//! let a = SectionSpaceBuilder::new(EncodeOptions::default())
//!     .subjects(["http://ex/s1"])
//!     .predicates(["http://ex/p"])
//!     .objects(DatatypeKey::Plain, ["http://ex/o1"])
//!     .build()
//!     .expect("build");
//! let b = SectionSpaceBuilder::new(EncodeOptions::default())
//!     .subjects(["http://ex/s2"])
//!     .predicates(["http://ex/p"])
//!     .objects(DatatypeKey::Plain, ["http://ex/o1"])
//!     .build()
//!     .expect("build");
//!
//! let merged = cat(&a, &b, EncodeOptions::default()).expect("cat");
//! let old = a.string_to_id(b"http://ex/o1", Role::Object).expect("present");
//! let new = merged.objects[0].map(old).expect("mapped");
//! assert_eq!(
//!     merged.space.id_to_string(new, Role::Object).unwrap(),
//!     "http://ex/o1"
//! );
//! ```

pub mod bytestr;
pub mod cat;
pub mod diff;
pub mod error;
pub mod file;
pub mod pfc;
pub mod space;

pub use bytestr::ByteStr;
pub use cat::{Cat, IdMapping, cat};
pub use diff::{DeletionBitmap, Diff, diff};
pub use error::{DictError, Result};
pub use file::{WriteOptions, crc32_ieee};
pub use pfc::{DEFAULT_BUCKET_SIZE, FrontCodedSection};
pub use space::{
    DATATYPE_SEPARATOR, DatatypeKey, EncodeOptions, Role, SectionRef, SectionSpace,
    SectionSpaceBuilder,
};
