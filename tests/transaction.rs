use mdbx_typed::{DatabaseFlags, Environment, Error, WriteFlags};

fn env() -> Environment {
    let dir = tempfile::tempdir().unwrap();
    let env = Environment::builder().open(dir.path()).unwrap();
    std::mem::forget(dir);
    env
}

#[test]
fn rw_transaction_is_exclusive_on_its_thread() {
    let env = env();
    let _rw = env.begin_rw().unwrap();
    let err = env.begin_rw().unwrap_err();
    assert!(matches!(err, Error::NestingConflict(_)));
    let err = env.begin_ro().unwrap_err();
    assert!(matches!(err, Error::NestingConflict(_)));
}

#[test]
fn ro_transactions_may_coexist() {
    let env = env();
    let _a = env.begin_ro().unwrap();
    let _b = env.begin_ro().unwrap();
}

/// Seed scenario: nested RW commit merges into the parent.
#[test]
fn nested_rw_commit_merges_into_parent() {
    let env = env();
    let parent = env.begin_rw().unwrap();
    let db = parent.create_db(None, DatabaseFlags::empty()).unwrap();
    parent.put(&db, 1u32, 1u32, WriteFlags::empty()).unwrap();

    let child = parent.begin_rw_child().unwrap();
    child.put(&db, 2u32, 2u32, WriteFlags::empty()).unwrap();
    child.commit().unwrap();

    assert_eq!(parent.get(&db, 2u32).unwrap().unwrap().as_scalar::<u32>().unwrap(), 2u32);
    parent.commit().unwrap();

    let ro = env.begin_ro().unwrap();
    let db = ro.open_db(None).unwrap();
    assert_eq!(ro.get(&db, 1u32).unwrap().unwrap().as_scalar::<u32>().unwrap(), 1u32);
    assert_eq!(ro.get(&db, 2u32).unwrap().unwrap().as_scalar::<u32>().unwrap(), 2u32);
}

/// Seed scenario: nested RW rollback leaves the parent's prior state
/// untouched.
#[test]
fn nested_rw_abort_discards_child_writes() {
    let env = env();
    let parent = env.begin_rw().unwrap();
    let db = parent.create_db(None, DatabaseFlags::empty()).unwrap();
    parent.put(&db, 1u32, 1u32, WriteFlags::empty()).unwrap();

    let child = parent.begin_rw_child().unwrap();
    child.put(&db, 2u32, 2u32, WriteFlags::empty()).unwrap();
    child.abort().unwrap();

    assert!(parent.get(&db, 2u32).unwrap().is_none());
    assert_eq!(parent.get(&db, 1u32).unwrap().unwrap().as_scalar::<u32>().unwrap(), 1u32);
    parent.commit().unwrap();
}

#[test]
fn child_nesting_is_linear_not_tree() {
    let env = env();
    let parent = env.begin_rw().unwrap();
    let _child = parent.begin_rw_child().unwrap();
    let err = parent.begin_rw_child().unwrap_err();
    assert!(matches!(err, Error::NestingConflict(_)));
}

#[test]
fn a_second_child_can_follow_the_first_sequentially() {
    let env = env();
    let parent = env.begin_rw().unwrap();
    let db = parent.create_db(None, DatabaseFlags::empty()).unwrap();

    let first = parent.begin_rw_child().unwrap();
    first.commit().unwrap();

    let second = parent.begin_rw_child().unwrap();
    second.put(&db, 1u32, 1u32, WriteFlags::empty()).unwrap();
    second.commit().unwrap();

    assert_eq!(parent.get(&db, 1u32).unwrap().unwrap().as_scalar::<u32>().unwrap(), 1u32);
}

#[test]
fn committed_transaction_invalidates_its_cursors() {
    let env = env();
    let txn = env.begin_rw().unwrap();
    let db = txn.create_db(None, DatabaseFlags::empty()).unwrap();
    let cursor = txn.cursor(db).unwrap();
    txn.commit().unwrap();
    assert!(matches!(cursor.first(), Err(Error::Invalidated)));
}

#[test]
fn into_ro_invalidates_prior_cursors_but_allows_reads() {
    let env = env();
    let txn = env.begin_rw().unwrap();
    let db = txn.create_db(None, DatabaseFlags::empty()).unwrap();
    txn.put(&db, 1u32, 1u32, WriteFlags::empty()).unwrap();
    let stale_cursor = txn.cursor(db).unwrap();

    let ro = txn.into_ro().unwrap();
    assert!(matches!(stale_cursor.first(), Err(Error::Invalidated)));
    assert_eq!(ro.get(&db, 1u32).unwrap().unwrap().as_scalar::<u32>().unwrap(), 1u32);
}

#[test]
fn reset_then_renew_takes_a_fresh_snapshot() {
    let env = env();
    let writer = env.begin_rw().unwrap();
    let db = writer.create_db(None, DatabaseFlags::empty()).unwrap();
    writer.put(&db, 1u32, 1u32, WriteFlags::empty()).unwrap();
    writer.commit().unwrap();

    let reader = env.begin_ro().unwrap();
    reader.reset().unwrap();

    // Write from another thread while the reader's slot is released, so the
    // per-thread nesting counters (which track this thread's own `reader`
    // handle) don't see it as a conflicting second transaction.
    let writer_env = env.clone();
    std::thread::spawn(move || {
        let writer = writer_env.begin_rw().unwrap();
        let db = writer.create_db(None, DatabaseFlags::empty()).unwrap();
        writer.put(&db, 2u32, 2u32, WriteFlags::empty()).unwrap();
        writer.commit().unwrap();
    })
    .join()
    .unwrap();

    reader.renew().unwrap();
    assert_eq!(reader.get(&db, 2u32).unwrap().unwrap().as_scalar::<u32>().unwrap(), 2u32);
}
