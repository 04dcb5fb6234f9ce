//! Lock protocol scenarios checked through their status lines

use crate::common::*;

#[test]
fn fifo_queue_then_release() {
    let db = manual_db();
    let t1 = db.begin().unwrap();
    let t2 = db.begin().unwrap();
    let t3 = db.begin().unwrap();

    assert_eq!(line(t1.put("a", "0")), "Success");
    assert_eq!(line(t2.get("a")), "Blocked");
    assert_eq!(line(t3.put("a", "3")), "Blocked");

    assert_eq!(t1.commit().unwrap().to_string(), "Transaction Completed");
    assert_eq!(line(t3.check_lock()), "Blocked");
    assert_eq!(line(t2.check_lock()), "0");

    assert_eq!(t2.commit().unwrap().to_string(), "Transaction Completed");
    assert_eq!(line(t3.check_lock()), "Success");
    t3.commit().unwrap();
}

#[test]
fn upgrade_in_place_and_no_such_key() {
    let db = manual_db();
    let t1 = db.begin().unwrap();

    assert_eq!(line(t1.get("a")), "No such key");
    assert_eq!(t1.held_locks(), vec![(Key::from("a"), LockMode::Shared)]);
    assert_eq!(line(t1.put("a", "1")), "Success");
    assert_eq!(t1.held_locks(), vec![(Key::from("a"), LockMode::Exclusive)]);
    assert_eq!(line(t1.get("a")), "1");
    assert_eq!(t1.abort().unwrap().to_string(), "User Abort");

    assert_eq!(db.store().get(&Key::from("a")), None);
}

#[test]
fn deadlock_victim_sees_deadlock_abort() {
    let db = manual_db();
    let t1 = db.begin().unwrap();
    let t2 = db.begin().unwrap();

    assert_eq!(line(t1.put("a", "1")), "Success");
    assert_eq!(line(t2.put("b", "2")), "Success");
    assert_eq!(line(t1.get("b")), "Blocked");
    assert_eq!(line(t2.get("a")), "Blocked");

    assert_eq!(db.resolve_deadlocks(), vec![TxnId::new(2)]);
    match t2.check_lock() {
        Err(Error::TransactionAborted { completion, .. }) => {
            assert_eq!(completion.to_string(), "Deadlock Abort");
        }
        other => panic!("expected a deadlock abort, got {:?}", other),
    }

    // T2's write to b was rolled back before T1 read it
    assert_eq!(line(t1.check_lock()), "No such key");
    t1.commit().unwrap();
    assert!(db.lock_table().is_empty());
}
