//! Streaming cat merge: set-union of two sealed section spaces.
//!
//! Every pass here is a single sequential scan over sorted inputs:
//! per-kind union merges for predicates, subjects, and objects, then one
//! intersection pass that re-derives the shared set. No pass materializes a
//! hash set over string content; memory is bounded by the output being
//! built, never by lookups into the inputs.
//!
//! Sharedness is a role-crossing property of the merged result: a term is
//! shared iff it is a subject in the union of both sources' subjects and an
//! object in the union of both sources' objects, whatever datatype section
//! it came from. The shared sets of the inputs therefore only ever grow
//! through a merge.
//!
//! Inputs are never mutated. A failed merge discards its partial output and
//! leaves both sources fully usable.

use std::collections::BTreeSet;
use std::iter::Peekable;

use log::debug;

use crate::bytestr::ByteStr;
use crate::error::{DictError, Result};
use crate::pfc::FrontCodedSection;
use crate::space::{DatatypeKey, EncodeOptions, Role, SectionSpace};

/// Total function from one source's old global ids (for one role) to the
/// global ids of a merged space.
#[derive(Debug, Clone)]
pub struct IdMapping {
    table: Vec<u64>,
}

impl IdMapping {
    fn from_table(table: Vec<u64>) -> Self {
        IdMapping { table }
    }

    /// New global id for 1-based `old`.
    pub fn map(&self, old: u64) -> Result<u64> {
        if old == 0 || old > self.table.len() as u64 {
            return Err(DictError::OutOfRangeId {
                id: old,
                max: self.table.len() as u64,
            });
        }
        Ok(self.table[(old - 1) as usize])
    }

    /// Number of old ids covered.
    pub fn len(&self) -> u64 {
        self.table.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Result of a cat merge: the merged space plus per-source, per-role
/// remapping tables (index 0 is the first input, 1 the second).
#[derive(Debug)]
pub struct Cat {
    pub space: SectionSpace,
    pub subjects: [IdMapping; 2],
    pub predicates: [IdMapping; 2],
    pub objects: [IdMapping; 2],
}

/// One string flowing through a union pass, tagged with its old global id
/// and, for object streams, the index of its datatype key.
struct Entry {
    label: ByteStr,
    gid: u64,
    key: Option<u32>,
}

fn tagged<'a>(
    sec: &'a FrontCodedSection,
    base: u64,
    key: Option<u32>,
) -> Box<dyn Iterator<Item = Entry> + 'a> {
    Box::new(sec.iter().enumerate().map(move |(i, label)| Entry {
        label,
        gid: base + i as u64 + 1,
        key,
    }))
}

type Stream<'a> = (usize, Peekable<Box<dyn Iterator<Item = Entry> + 'a>>);

/// Union-merge tagged sorted streams. Emits each distinct label once (the
/// defining dedup step), records for every consumed old id its 1-based
/// union position in `prov`, and retains the smallest datatype-key index
/// among the origins of each emitted label.
fn union_merge(mut streams: Vec<Stream<'_>>, prov: &mut [Vec<u64>; 2]) -> (Vec<ByteStr>, Vec<Option<u32>>) {
    let mut labels: Vec<ByteStr> = Vec::new();
    let mut keys: Vec<Option<u32>> = Vec::new();
    loop {
        let mut min: Option<ByteStr> = None;
        for (_, it) in streams.iter_mut() {
            if let Some(e) = it.peek()
                && min.as_ref().is_none_or(|m| e.label < *m)
            {
                min = Some(e.label.clone());
            }
        }
        let Some(min) = min else { break };
        let pos = labels.len() as u64 + 1;
        let mut retained: Option<u32> = None;
        for (source, it) in streams.iter_mut() {
            while let Some(e) = it.next_if(|e| e.label == min) {
                prov[*source][(e.gid - 1) as usize] = pos;
                if let Some(k) = e.key {
                    retained = Some(retained.map_or(k, |r| r.min(k)));
                }
            }
        }
        labels.push(min);
        keys.push(retained);
    }
    (labels, keys)
}

/// Subject stream of one source: shared then subject-only, merged back into
/// one sorted sequence of (label, old subject gid).
fn subject_streams<'a>(space: &'a SectionSpace, source: usize, out: &mut Vec<Stream<'a>>) {
    out.push((source, tagged(space.shared_section(), 0, None).peekable()));
    out.push((
        source,
        tagged(space.subjects_section(), space.num_shared(), None).peekable(),
    ));
}

/// Object streams of one source: shared plus every datatype section, each
/// tagged with its old object gid base and key index in `key_table`.
fn object_streams<'a>(
    space: &'a SectionSpace,
    source: usize,
    key_table: &[DatatypeKey],
    out: &mut Vec<Stream<'a>>,
) {
    out.push((source, tagged(space.shared_section(), 0, None).peekable()));
    let mut base = space.num_shared();
    for (key, sec) in space.object_sections() {
        let ki = key_table
            .binary_search(key)
            .expect("key table covers both sources") as u32;
        out.push((source, tagged(sec, base, Some(ki)).peekable()));
        base += sec.num_strings();
    }
}

/// Merge two section spaces into one, producing consistent remapping
/// tables for both sources and all three roles.
pub fn cat(a: &SectionSpace, b: &SectionSpace, opts: EncodeOptions) -> Result<Cat> {
    // Sorted union of datatype keys appearing in either source; the merged
    // space's persisted key order.
    let key_table: Vec<DatatypeKey> = a
        .object_sections()
        .iter()
        .chain(b.object_sections())
        .map(|(k, _)| k.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    // Predicates: plain two-way union; new ids are union positions.
    let mut prov_pred = [
        vec![0u64; a.count(Role::Predicate) as usize],
        vec![0u64; b.count(Role::Predicate) as usize],
    ];
    let (union_preds, _) = union_merge(
        vec![
            (0, tagged(a.predicates_section(), 0, None).peekable()),
            (1, tagged(b.predicates_section(), 0, None).peekable()),
        ],
        &mut prov_pred,
    );

    // Subjects: 4-way union across both sources' shared and subject-only
    // sections.
    let mut prov_subj = [
        vec![0u64; a.count(Role::Subject) as usize],
        vec![0u64; b.count(Role::Subject) as usize],
    ];
    let mut streams = Vec::with_capacity(4);
    subject_streams(a, 0, &mut streams);
    subject_streams(b, 1, &mut streams);
    let (union_subj, _) = union_merge(streams, &mut prov_subj);

    // Objects: union across both sources' shared and all datatype
    // sections; equal labels collapse to one entry retaining the smallest
    // originating key.
    let mut prov_obj = [
        vec![0u64; a.count(Role::Object) as usize],
        vec![0u64; b.count(Role::Object) as usize],
    ];
    let mut streams = Vec::with_capacity(2 * (key_table.len() + 1));
    object_streams(a, 0, &key_table, &mut streams);
    object_streams(b, 1, &key_table, &mut streams);
    let (union_obj, obj_keys) = union_merge(streams, &mut prov_obj);

    // Intersection pass: mark which union entries are shared.
    let mut subj_shared = vec![false; union_subj.len()];
    let mut obj_shared = vec![false; union_obj.len()];
    {
        let (mut i, mut j) = (0usize, 0usize);
        while i < union_subj.len() && j < union_obj.len() {
            match union_subj[i].cmp(&union_obj[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    subj_shared[i] = true;
                    obj_shared[j] = true;
                    i += 1;
                    j += 1;
                }
            }
        }
    }
    let num_shared = subj_shared.iter().filter(|&&s| s).count() as u64;
    debug!(
        "cat: {} union subjects, {} union objects, {} union predicates, {} shared",
        union_subj.len(),
        union_obj.len(),
        union_preds.len(),
        num_shared
    );

    // Final subject ids: shared ranks first, then subject-only offsets.
    let mut new_shared: Vec<ByteStr> = Vec::with_capacity(num_shared as usize);
    let mut new_subjects: Vec<ByteStr> = Vec::with_capacity(union_subj.len() - num_shared as usize);
    let mut final_subj = vec![0u64; union_subj.len()];
    for (u, label) in union_subj.into_iter().enumerate() {
        if subj_shared[u] {
            new_shared.push(label);
            final_subj[u] = new_shared.len() as u64;
        } else {
            new_subjects.push(label);
            final_subj[u] = num_shared + new_subjects.len() as u64;
        }
    }

    // Final object ids: shared ranks (identical to the subject-side ranks,
    // both walks are in sorted order), then per-key regrouping. A union
    // entry with no datatype origin came only from shared sections and is
    // necessarily marked shared, so non-shared entries always carry a key.
    let mut groups: Vec<Vec<ByteStr>> = vec![Vec::new(); key_table.len()];
    let mut final_obj = vec![0u64; union_obj.len()];
    let mut pending: Vec<(usize, u32, u64)> = Vec::new();
    let mut shared_rank = 0u64;
    for (u, label) in union_obj.into_iter().enumerate() {
        if obj_shared[u] {
            shared_rank += 1;
            final_obj[u] = shared_rank;
        } else {
            let ki = obj_keys[u].unwrap_or(0);
            groups[ki as usize].push(label);
            pending.push((u, ki, groups[ki as usize].len() as u64));
        }
    }
    let mut bases = Vec::with_capacity(key_table.len());
    let mut running = 0u64;
    for group in &groups {
        bases.push(running);
        running += group.len() as u64;
    }
    for (u, ki, rank) in pending {
        final_obj[u] = num_shared + bases[ki as usize] + rank;
    }

    // Remapping tables: old id -> union position -> final id. Predicates
    // map straight through their union positions.
    let remap = |prov: &[u64], finals: &[u64]| -> IdMapping {
        IdMapping::from_table(prov.iter().map(|&p| finals[(p - 1) as usize]).collect())
    };
    let subjects = [
        remap(&prov_subj[0], &final_subj),
        remap(&prov_subj[1], &final_subj),
    ];
    let objects = [
        remap(&prov_obj[0], &final_obj),
        remap(&prov_obj[1], &final_obj),
    ];
    let predicates = [
        IdMapping::from_table(prov_pred[0].clone()),
        IdMapping::from_table(prov_pred[1].clone()),
    ];

    let object_parts: Vec<(DatatypeKey, Vec<ByteStr>)> =
        key_table.into_iter().zip(groups).collect();
    let space = SectionSpace::from_parts(new_shared, new_subjects, union_preds, object_parts, opts)?;

    Ok(Cat {
        space,
        subjects,
        predicates,
        objects,
    })
}
