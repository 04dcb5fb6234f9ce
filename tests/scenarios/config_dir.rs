//! Opening a database directory and editing its config

use crate::common::*;
use stratalock::CONFIG_FILE_NAME;

#[test]
fn first_open_writes_commented_defaults() {
    let test = TestDb::new();
    let text = std::fs::read_to_string(test.dir.path().join(CONFIG_FILE_NAME)).unwrap();
    assert!(text.contains("store = \"unified\""));
    assert!(text.contains("# lock_wait_timeout_ms"));
    assert!(test.db.is_detector_running());
}

#[test]
fn edited_config_takes_effect_on_reopen() {
    let test = TestDb::new();
    LockConfig::default()
        .with_store(StoreKind::Sharded)
        .with_deadlock_detection(false)
        .write_to_file(&test.dir.path().join(CONFIG_FILE_NAME))
        .unwrap();

    let test = test.reopen();
    assert_eq!(test.db.config().store_kind().unwrap(), StoreKind::Sharded);
    assert!(!test.db.is_detector_running());

    let t = test.db.begin().unwrap();
    assert_eq!(line(t.put("k", "v")), "Success");
    assert_eq!(t.commit().unwrap(), Completion::Committed);
}

#[test]
fn broken_config_is_reported() {
    let test = TestDb::new();
    std::fs::write(
        test.dir.path().join(CONFIG_FILE_NAME),
        "detection_interval_ms = 0\n",
    )
    .unwrap();
    let dir = test.dir;
    drop(test.db);
    assert!(matches!(
        Database::open(dir.path()),
        Err(Error::InvalidConfig(_))
    ));
}
