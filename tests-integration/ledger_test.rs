//! Integration tests for the inventory ledger
//!
//! These tests drive `Ledger` and `Registry` directly against a migrated
//! schema, including concurrent debits from separate sessions.
//!
//! Note: These tests require a running PostgreSQL database. Set TEST_DATABASE_URL
//! or they print a skip notice and return.

use bloodbank::test_helpers::TestDatabase;
use bloodbank::{BankError, BloodTypeRef, Ledger, PgExecutor, Registry, SqlExecutor};
use std::thread;

// Helper to migrate the test schema and resolve a label
fn setup(db: &TestDatabase, label: &str) -> BloodTypeRef {
    db.migrated_bank().expect("Failed to migrate test schema");
    Registry::new(db.executor())
        .resolve_or_create(label)
        .expect("Failed to register blood type")
}

// Helper to read the raw stored row, including logically removed ones
fn stored_row(executor: &PgExecutor, blood_type: BloodTypeRef) -> Option<(i32, bool)> {
    executor
        .query_opt(
            "SELECT units, deleted_at IS NOT NULL FROM inventory WHERE blood_type_id = $1",
            &[&blood_type.id()],
        )
        .expect("Failed to query inventory")
        .map(|row| (row.get(0), row.get(1)))
}

#[test]
fn test_credit_creates_then_accumulates() {
    let Some(db) = TestDatabase::try_new() else { return };
    let o_pos = setup(&db, "O+");
    let ledger = Ledger::new(db.executor());

    assert_eq!(ledger.balance(o_pos).expect("balance"), 0);
    assert_eq!(stored_row(db.executor(), o_pos), None);

    ledger.credit(o_pos, 2).expect("first credit");
    ledger.credit(o_pos, 3).expect("second credit");
    assert_eq!(ledger.balance(o_pos).expect("balance"), 5);
    assert_eq!(stored_row(db.executor(), o_pos), Some((5, false)));
}

#[test]
fn test_debit_never_goes_negative() {
    let Some(db) = TestDatabase::try_new() else { return };
    let a_neg = setup(&db, "a-");
    let ledger = Ledger::new(db.executor());

    assert!(!ledger.debit(a_neg, 1).expect("debit without row"));

    ledger.credit(a_neg, 4).expect("credit");
    assert!(!ledger.debit(a_neg, 5).expect("oversized debit"));
    assert_eq!(ledger.balance(a_neg).expect("balance"), 4);

    assert!(ledger.debit(a_neg, 3).expect("debit"));
    assert!(ledger.debit(a_neg, 1).expect("debit to zero"));
    assert!(!ledger.debit(a_neg, 1).expect("debit from zero"));
    assert_eq!(ledger.balance(a_neg).expect("balance"), 0);
}

#[test]
fn test_non_positive_units_are_rejected() {
    let Some(db) = TestDatabase::try_new() else { return };
    let b_pos = setup(&db, "B+");
    let ledger = Ledger::new(db.executor());

    assert!(matches!(
        ledger.credit(b_pos, 0),
        Err(BankError::InvalidArgument(_))
    ));
    assert!(matches!(
        ledger.debit(b_pos, -2),
        Err(BankError::InvalidArgument(_))
    ));
    assert_eq!(stored_row(db.executor(), b_pos), None);
}

#[test]
fn test_removed_row_is_revived_by_credit() {
    let Some(db) = TestDatabase::try_new() else { return };
    let ab_pos = setup(&db, "AB+");
    let ledger = Ledger::new(db.executor());

    ledger.credit(ab_pos, 2).expect("credit");
    db.executor()
        .execute(
            "UPDATE inventory SET deleted_at = NOW() WHERE blood_type_id = $1",
            &[&ab_pos.id()],
        )
        .expect("Failed to remove inventory row");

    assert_eq!(ledger.balance(ab_pos).expect("balance"), 0);
    assert!(!ledger.debit(ab_pos, 1).expect("debit on removed row"));

    ledger.credit(ab_pos, 1).expect("reviving credit");
    assert_eq!(stored_row(db.executor(), ab_pos), Some((3, false)));
}

#[test]
fn test_balances_are_ordered_by_label() {
    let Some(db) = TestDatabase::try_new() else { return };
    let o_neg = setup(&db, "O-");
    let registry = Registry::new(db.executor());
    let a_pos = registry.resolve_or_create("A+").expect("register A+");
    let ledger = Ledger::new(db.executor());

    ledger.credit(o_neg, 1).expect("credit O-");
    ledger.credit(a_pos, 6).expect("credit A+");

    let labels: Vec<(String, i32)> = ledger
        .balances()
        .expect("balances")
        .into_iter()
        .map(|line| (line.blood_type, line.units))
        .collect();
    assert_eq!(labels, vec![("A+".to_string(), 6), ("O-".to_string(), 1)]);
}

#[test]
fn test_registry_converges_on_one_ref_per_label() {
    let Some(db) = TestDatabase::try_new() else { return };
    let first = setup(&db, " ab- ");
    let registry = Registry::new(db.executor());

    assert_eq!(registry.resolve_or_create("AB-").expect("resolve"), first);
    assert_eq!(registry.resolve("ab-").expect("resolve"), first);
    assert_eq!(
        registry.label_of(first).expect("label").as_str(),
        "AB-"
    );
    assert!(matches!(
        registry.resolve("B-"),
        Err(BankError::NotFound(_))
    ));
    assert!(matches!(
        registry.resolve_or_create("   "),
        Err(BankError::InvalidArgument(_))
    ));
}

#[test]
fn test_concurrent_debits_never_overdraw() {
    let Some(db) = TestDatabase::try_new() else { return };
    let o_pos = setup(&db, "O+");
    Ledger::new(db.executor())
        .credit(o_pos, 10)
        .expect("credit");

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let session = db.session().expect("Failed to open session");
            thread::spawn(move || {
                let ledger = Ledger::new(&session);
                (0..5)
                    .filter(|_| ledger.debit(o_pos, 1).expect("debit"))
                    .count()
            })
        })
        .collect();

    let applied: usize = workers
        .into_iter()
        .map(|w| w.join().expect("worker panicked"))
        .sum();
    assert_eq!(applied, 10);
    assert_eq!(Ledger::new(db.executor()).balance(o_pos).expect("balance"), 0);
}
