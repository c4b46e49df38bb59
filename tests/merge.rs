use pfcdict::{
    DatatypeKey, DeletionBitmap, EncodeOptions, Role, SectionSpaceBuilder, cat, diff,
};

const XSD_INT: &str = "http://www.w3.org/2001/XMLSchema#integer";

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn build(
    subjects: &[&str],
    predicates: &[&str],
    objects: &[(DatatypeKey, &[&str])],
) -> pfcdict::SectionSpace {
    let mut b = SectionSpaceBuilder::new(EncodeOptions { bucket_size: 4 })
        .subjects(subjects.iter().copied())
        .predicates(predicates.iter().copied());
    for (key, strings) in objects {
        b = b.objects(key.clone(), strings.iter().copied());
    }
    b.build().expect("build")
}

#[test]
fn cat_rederives_the_shared_split() {
    init_logs();
    // s1 is an object of A and a subject of A; s2 appears in both subject
    // sets; o1 appears in both object sets.
    let a = build(
        &["http://ex/s1", "http://ex/s2"],
        &["http://ex/p"],
        &[(DatatypeKey::Plain, &["http://ex/o1", "http://ex/s1"][..])],
    );
    let b = build(
        &["http://ex/s2", "http://ex/s3"],
        &["http://ex/p"],
        &[(DatatypeKey::Plain, &["http://ex/o1", "http://ex/o2"][..])],
    );

    let merged = cat(&a, &b, EncodeOptions::default()).expect("cat");
    let space = &merged.space;

    // shared = {s1}; subjects-only = {s2, s3}; plain objects = {o1, o2}
    assert_eq!(space.num_shared(), 1);
    assert_eq!(space.count(Role::Subject), 3);
    assert_eq!(space.count(Role::Object), 3);
    assert_eq!(space.count(Role::Predicate), 1);
    assert_eq!(
        space.id_to_string(1, Role::Subject).unwrap(),
        "http://ex/s1"
    );
    assert_eq!(space.id_to_string(1, Role::Object).unwrap(), "http://ex/s1");

    // every old id round-trips through its mapping to the same string
    for (i, src) in [&a, &b].into_iter().enumerate() {
        for role in [Role::Subject, Role::Predicate, Role::Object] {
            let mapping = match role {
                Role::Subject => &merged.subjects[i],
                Role::Predicate => &merged.predicates[i],
                Role::Object => &merged.objects[i],
            };
            assert_eq!(mapping.len(), src.count(role));
            for old in 1..=src.count(role) {
                let new = mapping.map(old).expect("mapped");
                assert_eq!(
                    src.id_to_string(old, role).unwrap(),
                    space.id_to_string(new, role).unwrap()
                );
            }
        }
    }
}

#[test]
fn cat_with_itself_is_the_identity() {
    let a = build(
        &["http://ex/s1", "http://ex/s2", "http://ex/shared"],
        &["http://ex/p1", "http://ex/p2"],
        &[
            (
                DatatypeKey::Plain,
                &["http://ex/o1", "http://ex/shared"][..],
            ),
            (DatatypeKey::Typed(XSD_INT.into()), &["17", "42"][..]),
        ],
    );
    let merged = cat(&a, &a, EncodeOptions { bucket_size: 4 }).expect("cat");
    assert_eq!(merged.space.num_shared(), a.num_shared());
    for role in [Role::Subject, Role::Predicate, Role::Object] {
        assert_eq!(merged.space.count(role), a.count(role));
        for id in 1..=a.count(role) {
            assert_eq!(
                merged.space.id_to_string(id, role).unwrap(),
                a.id_to_string(id, role).unwrap()
            );
            let mapping = match role {
                Role::Subject => &merged.subjects[0],
                Role::Predicate => &merged.predicates[0],
                Role::Object => &merged.objects[0],
            };
            assert_eq!(mapping.map(id).unwrap(), id);
        }
    }
}

#[test]
fn sharedness_only_grows() {
    // Neither source has shared terms, but A's subject is B's object and
    // vice versa; both become shared in the merge.
    let a = build(
        &["http://ex/s"],
        &["http://ex/p"],
        &[(DatatypeKey::Plain, &["http://ex/o"][..])],
    );
    let b = build(
        &["http://ex/o"],
        &["http://ex/p"],
        &[(DatatypeKey::Plain, &["http://ex/s"][..])],
    );
    assert_eq!(a.num_shared(), 0);
    assert_eq!(b.num_shared(), 0);
    let merged = cat(&a, &b, EncodeOptions::default()).expect("cat");
    assert_eq!(merged.space.num_shared(), 2);
    assert_eq!(merged.space.count(Role::Subject), 2);
    assert_eq!(merged.space.count(Role::Object), 2);
}

#[test]
fn equal_labels_across_datatype_keys_collapse() {
    // "1" exists as a plain object in A and as an xsd:integer object in B.
    // The union keeps one entry under the smaller key (plain), and both old
    // ids land on it.
    let a = build(
        &["http://ex/s"],
        &["http://ex/p"],
        &[(DatatypeKey::Plain, &["1"][..])],
    );
    let b = build(
        &["http://ex/s"],
        &["http://ex/p"],
        &[(DatatypeKey::Typed(XSD_INT.into()), &["1"][..])],
    );
    let merged = cat(&a, &b, EncodeOptions::default()).expect("cat");
    assert_eq!(merged.space.count(Role::Object), 1);
    let new_a = merged.objects[0].map(1).unwrap();
    let new_b = merged.objects[1].map(1).unwrap();
    assert_eq!(new_a, new_b);
    assert_eq!(merged.space.id_to_string(new_a, Role::Object).unwrap(), "1");
    assert_eq!(merged.space.object_sections().len(), 1);
    assert_eq!(merged.space.object_sections()[0].0, DatatypeKey::Plain);
}

#[test]
fn typed_sections_merge_by_key() {
    let a = build(
        &["http://ex/s"],
        &["http://ex/p"],
        &[
            (DatatypeKey::Plain, &["hello@en"][..]),
            (DatatypeKey::Typed(XSD_INT.into()), &["17"][..]),
        ],
    );
    let b = build(
        &["http://ex/s"],
        &["http://ex/p"],
        &[(DatatypeKey::Typed(XSD_INT.into()), &["17", "42"][..])],
    );
    let merged = cat(&a, &b, EncodeOptions::default()).expect("cat");
    // plain {hello@en} + integer {17, 42}
    assert_eq!(merged.space.count(Role::Object), 3);
    let id17 = merged
        .space
        .string_to_id(format!("17^^{XSD_INT}").as_bytes(), Role::Object)
        .expect("17 present");
    assert_eq!(merged.objects[0].map(2).unwrap(), id17);
    assert_eq!(merged.objects[1].map(1).unwrap(), id17);
    // language-tagged label resolves without a datatype suffix
    let idh = merged
        .space
        .string_to_id(b"hello@en", Role::Object)
        .expect("hello present");
    assert_eq!(
        merged.space.id_to_string(idh, Role::Object).unwrap(),
        "hello@en"
    );
}

#[test]
fn diff_keeps_the_dictionary_and_hands_the_bitmap_through() {
    let base = build(
        &["http://ex/s1", "http://ex/s2"],
        &["http://ex/p"],
        &[
            (DatatypeKey::Plain, &["http://ex/o", "http://ex/s1"][..]),
            (DatatypeKey::Typed(XSD_INT.into()), &["42"][..]),
        ],
    );
    let mut deleted = DeletionBitmap::new(5);
    deleted.set(1).expect("set");
    deleted.set(4).expect("set");

    let d = diff(&base, deleted, EncodeOptions { bucket_size: 4 }).expect("diff");

    // no string filtering: the diffed dictionary is the base dictionary
    for role in [Role::Subject, Role::Predicate, Role::Object] {
        assert_eq!(d.space.count(role), base.count(role));
        let mapping = match role {
            Role::Subject => &d.subjects,
            Role::Predicate => &d.predicates,
            Role::Object => &d.objects,
        };
        for id in 1..=base.count(role) {
            assert_eq!(mapping.map(id).unwrap(), id);
        }
    }
    assert_eq!(d.deleted.len(), 5);
    assert_eq!(d.deleted.count_ones(), 2);
    assert!(d.deleted.get(1));
    assert!(d.deleted.get(4));
    assert!(!d.deleted.get(0));
}

#[test]
fn cat_of_empty_spaces() {
    let empty = build(&[], &[], &[]);
    let a = build(
        &["http://ex/s"],
        &["http://ex/p"],
        &[(DatatypeKey::Plain, &["http://ex/o"][..])],
    );
    let merged = cat(&empty, &a, EncodeOptions::default()).expect("cat");
    assert_eq!(merged.space.count(Role::Subject), 1);
    assert_eq!(merged.space.count(Role::Object), 1);
    assert_eq!(merged.subjects[0].len(), 0);
    assert_eq!(merged.subjects[1].map(1).unwrap(), 1);

    let both = cat(&empty, &empty, EncodeOptions::default()).expect("cat");
    assert_eq!(both.space.count(Role::Subject), 0);
    assert_eq!(both.space.count(Role::Object), 0);
    assert_eq!(both.space.count(Role::Predicate), 0);
}
