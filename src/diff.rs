//! Diff: cat-style merge of a base space with itself, plus a deletion
//! bitmap threaded through to the triple layer.
//!
//! Diff never filters dictionary strings. The dictionary phase is exactly
//! the cat machinery applied to the base; triple-level filtering (dropping
//! the positions flagged in the bitmap) is the triple-store collaborator's
//! job, using the produced id mappings. Pruning strings left unreferenced
//! by the deletion is an optional optimization for that collaborator, not
//! performed here.

use log::debug;

use crate::cat::{IdMapping, cat};
use crate::error::{DictError, Result};
use crate::space::{EncodeOptions, SectionSpace};

/// One bit per triple position of a base dataset; set bits mark triples to
/// delete. Externally supplied and consumed only by [`diff`].
#[derive(Debug, Clone)]
pub struct DeletionBitmap {
    words: Vec<u64>,
    len: u64,
}

impl DeletionBitmap {
    /// All-zero bitmap covering `len` triple positions.
    pub fn new(len: u64) -> Self {
        DeletionBitmap {
            words: vec![0u64; (len as usize).div_ceil(64)],
            len,
        }
    }

    /// Flag the 0-based triple position `pos` for deletion.
    pub fn set(&mut self, pos: u64) -> Result<()> {
        if pos >= self.len {
            return Err(DictError::OutOfRangeId {
                id: pos,
                max: self.len.saturating_sub(1),
            });
        }
        self.words[(pos / 64) as usize] |= 1 << (pos % 64);
        Ok(())
    }

    pub fn get(&self, pos: u64) -> bool {
        if pos >= self.len {
            return false;
        }
        self.words[(pos / 64) as usize] & (1 << (pos % 64)) != 0
    }

    /// Number of triple positions covered.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of flagged positions.
    pub fn count_ones(&self) -> u64 {
        self.words.iter().map(|w| w.count_ones() as u64).sum()
    }
}

/// Result of a diff: a renumbered dictionary for the base, one set of id
/// mappings, and the untouched deletion bitmap for the triple layer.
#[derive(Debug)]
pub struct Diff {
    pub space: SectionSpace,
    pub subjects: IdMapping,
    pub predicates: IdMapping,
    pub objects: IdMapping,
    pub deleted: DeletionBitmap,
}

/// Rebuild `base`'s dictionary through the cat machinery and hand the
/// deletion bitmap through for triple-level filtering.
pub fn diff(base: &SectionSpace, deleted: DeletionBitmap, opts: EncodeOptions) -> Result<Diff> {
    debug!(
        "diff: {} of {} triple positions flagged for deletion",
        deleted.count_ones(),
        deleted.len()
    );
    let merged = cat(base, base, opts)?;
    let [subjects, _] = merged.subjects;
    let [predicates, _] = merged.predicates;
    let [objects, _] = merged.objects;
    Ok(Diff {
        space: merged.space,
        subjects,
        predicates,
        objects,
        deleted,
    })
}
