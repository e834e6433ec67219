use mdbx_typed::{DatabaseFlags, Environment, Geometry, WriteFlags};

#[test]
fn open_reuses_environment_for_same_path() {
    let dir = tempfile::tempdir().unwrap();
    let a = Environment::builder().open(dir.path()).unwrap();
    let b = Environment::builder().open(dir.path()).unwrap();

    let txn = a.begin_rw().unwrap();
    let db = txn.create_db(None, DatabaseFlags::empty()).unwrap();
    txn.put(&db, 1u32, 2u32, WriteFlags::empty()).unwrap();
    txn.commit().unwrap();

    let txn = b.begin_ro().unwrap();
    let db = txn.open_db(None).unwrap();
    let value = txn.get(&db, 1u32).unwrap().unwrap();
    assert_eq!(value.as_scalar::<u32>().unwrap(), 2u32);
}

#[test]
fn reopen_with_different_flags_fails() {
    let dir = tempfile::tempdir().unwrap();
    let _a = Environment::builder().open(dir.path()).unwrap();

    let mut mismatched = Environment::builder();
    mismatched.set_flags(mdbx_typed::EnvironmentFlags {
        mode: mdbx_typed::Mode::ReadOnly,
        no_sub_dir: false,
        exclusive: false,
    });
    let err = mismatched.open(dir.path()).unwrap_err();
    assert!(matches!(err, mdbx_typed::Error::FlagMismatch));
}

#[test]
fn stat_and_info_report_sane_values() {
    let dir = tempfile::tempdir().unwrap();
    let env = Environment::builder().open(dir.path()).unwrap();
    let txn = env.begin_rw().unwrap();
    let db = txn.create_db(None, DatabaseFlags::empty()).unwrap();
    for i in 0u32..10 {
        txn.put(&db, i, i, WriteFlags::empty()).unwrap();
    }
    txn.commit().unwrap();

    let stat = env.stat().unwrap();
    assert!(stat.page_size() > 0);

    let info = env.info().unwrap();
    assert!(info.geometry().max() >= info.geometry().current());
}

#[test]
fn geometry_bounds_the_map_size() {
    let dir = tempfile::tempdir().unwrap();
    let mut builder = Environment::builder();
    builder.set_geometry(Geometry { size: Some(1_000_000..), ..Default::default() });
    let env = builder.open(dir.path()).unwrap();
    assert!(!env.is_read_only().unwrap());
}

#[test]
fn sync_rejects_on_read_only_environment() {
    let dir = tempfile::tempdir().unwrap();
    {
        let env = Environment::builder().open(dir.path()).unwrap();
        let txn = env.begin_rw().unwrap();
        txn.create_db(None, DatabaseFlags::empty()).unwrap();
        txn.commit().unwrap();
    }

    let mut builder = Environment::builder();
    builder.set_flags(mdbx_typed::EnvironmentFlags {
        mode: mdbx_typed::Mode::ReadOnly,
        ..Default::default()
    });
    let ro_env = builder.open(dir.path()).unwrap();
    assert!(ro_env.sync(true).is_err());
}
