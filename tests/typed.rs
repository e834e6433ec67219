use mdbx_typed::typed::{IndexDescriptor, NullIndex, TypedContainer};
use mdbx_typed::{Environment, SerdeBincode};
use proptest::prelude::*;
use serde::{Deserialize, Serialize};

fn env() -> Environment {
    let dir = tempfile::tempdir().unwrap();
    let env = Environment::builder().open(dir.path()).unwrap();
    std::mem::forget(dir);
    env
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Member {
    first_name: String,
    last_name: String,
    enrolled: u64,
}

struct ByFirstName;

impl IndexDescriptor<Member> for ByFirstName {
    fn project(record: &Member) -> Vec<u8> {
        record.first_name.as_bytes().to_vec()
    }
}

type Members<K> = TypedContainer<K, Member, SerdeBincode<Member>, ByFirstName>;

/// Seed scenario: typed prefix range.
#[test]
fn prefix_range_matches_declared_index() {
    let env = env();
    let txn = env.begin_rw().unwrap();
    let members = Members::open(txn, "members").unwrap();

    members
        .put(&Member { first_name: "bert".into(), last_name: "hubert".into(), enrolled: 0 }, None)
        .unwrap();
    members
        .put(
            &Member { first_name: "bertus".into(), last_name: "testperson".into(), enrolled: 1 },
            None,
        )
        .unwrap();
    members
        .put(&Member { first_name: "other".into(), last_name: "other".into(), enrolled: 1 }, None)
        .unwrap();

    let mut iter = members.prefix_range_index(0, b"bert").unwrap();
    let mut names = Vec::new();
    while let Some((_, record)) = iter.next().unwrap() {
        names.push(record.first_name);
    }
    assert_eq!(names, vec!["bert", "bertus"]);

    let mut empty = members.prefix_range_index(0, b"nosuchperson").unwrap();
    assert!(empty.next().unwrap().is_none());
}

/// Seed scenario: modify updates indexes.
#[test]
fn modify_updates_indexes() {
    let env = env();
    let txn = env.begin_rw().unwrap();
    let members = Members::open(txn, "members").unwrap();

    let id =
        members.put(&Member { first_name: "bert".into(), last_name: "hubert".into(), enrolled: 0 }, Some(1)).unwrap();
    assert_eq!(id, 1);

    members.modify(1, |r| r.first_name = "ernie".into()).unwrap();

    assert!(members.get_by_index(0, b"bert").unwrap().is_none());
    let (found_id, record) = members.get_by_index(0, b"ernie").unwrap().unwrap();
    assert_eq!(found_id, 1);
    assert_eq!(record.first_name, "ernie");
}

#[test]
fn modify_on_absent_id_fails_with_not_found() {
    let env = env();
    let txn = env.begin_rw().unwrap();
    let members = Members::open(txn, "members").unwrap();
    let err = members.modify(99, |r| r.enrolled += 1).unwrap_err();
    assert!(matches!(err, mdbx_typed::Error::NotFound));
}

#[test]
fn ids_assigned_without_an_explicit_id_are_strictly_increasing() {
    let env = env();
    let txn = env.begin_rw().unwrap();
    let members = Members::open(txn, "members").unwrap();

    let mut ids = Vec::new();
    for i in 0..5u64 {
        ids.push(
            members
                .put(
                    &Member { first_name: format!("m{i}"), last_name: "x".into(), enrolled: i },
                    None,
                )
                .unwrap(),
        );
    }
    assert!(ids.windows(2).all(|w| w[1] > w[0]));
}

#[test]
fn del_removes_primary_record_and_its_index_entries() {
    let env = env();
    let txn = env.begin_rw().unwrap();
    let members = Members::open(txn, "members").unwrap();

    let id = members
        .put(&Member { first_name: "bert".into(), last_name: "hubert".into(), enrolled: 0 }, None)
        .unwrap();
    members.del(id).unwrap();

    assert!(members.get(id).unwrap().is_none());
    assert!(members.get_by_index(0, b"bert").unwrap().is_none());
    // Deleting an already-absent id is a silent no-op.
    members.del(id).unwrap();
}

#[test]
fn clear_empties_primary_and_every_index() {
    let env = env();
    let txn = env.begin_rw().unwrap();
    let members = Members::open(txn, "members").unwrap();

    for i in 0..3u64 {
        members
            .put(
                &Member { first_name: format!("m{i}"), last_name: "x".into(), enrolled: i },
                None,
            )
            .unwrap();
    }
    members.clear().unwrap();

    assert_eq!(members.size().unwrap(), 0);
    assert_eq!(members.size_index(0).unwrap(), 0);
}

#[test]
fn round_trip_holds_until_modify_or_del() {
    let env = env();
    let txn = env.begin_rw().unwrap();
    let members = Members::open(txn, "members").unwrap();

    let record = Member { first_name: "bert".into(), last_name: "hubert".into(), enrolled: 0 };
    let id = members.put(&record, None).unwrap();
    assert_eq!(members.get(id).unwrap().unwrap(), record);

    members.modify(id, |r| r.enrolled = 5).unwrap();
    assert_ne!(members.get(id).unwrap().unwrap(), record);

    members.del(id).unwrap();
    assert!(members.get(id).unwrap().is_none());
}

proptest! {
    /// Round-trip invariant: `get(put(r)) = r` for arbitrary records, until
    /// a subsequent `modify`/`del`.
    #[test]
    fn round_trip_holds_for_arbitrary_records(
        first_name in "[a-z]{1,12}",
        last_name in "[a-z]{1,12}",
        enrolled in any::<u64>(),
    ) {
        let env = env();
        let txn = env.begin_rw().unwrap();
        let members = Members::open(txn, "members").unwrap();
        let record = Member { first_name, last_name, enrolled };
        let id = members.put(&record, None).unwrap();
        prop_assert_eq!(members.get(id).unwrap(), Some(record));
    }

    /// Index coherence invariant: `get_by_index(project(r)) = (id, r)`, and
    /// deleting `id` leaves no index entry referencing it.
    #[test]
    fn index_coherence_holds_and_del_removes_the_index_entry(
        first_name in "[a-z]{1,12}",
        last_name in "[a-z]{1,12}",
        enrolled in any::<u64>(),
    ) {
        let env = env();
        let txn = env.begin_rw().unwrap();
        let members = Members::open(txn, "members").unwrap();
        let record = Member { first_name: first_name.clone(), last_name, enrolled };
        let id = members.put(&record, None).unwrap();

        let (found_id, found) = members.get_by_index(0, first_name.as_bytes()).unwrap().unwrap();
        prop_assert_eq!(found_id, id);
        prop_assert_eq!(found, record);

        members.del(id).unwrap();
        prop_assert!(members.get_by_index(0, first_name.as_bytes()).unwrap().is_none());
    }
}

#[test]
fn null_index_slots_never_open_a_sub_database() {
    let env = env();
    let txn = env.begin_rw().unwrap();
    let container: TypedContainer<_, Member, SerdeBincode<Member>, NullIndex> =
        TypedContainer::open(txn, "plain_members").unwrap();
    container
        .put(&Member { first_name: "bert".into(), last_name: "hubert".into(), enrolled: 0 }, None)
        .unwrap();
    assert_eq!(container.size_index(0).unwrap(), 0);
}
