use std::sync::Arc;

use centime_core::store::{AllocationFolders, DocumentStore, FolderId, StoreError};
use centime_core::{AllocationSession, ReopenPolicy, SessionState};
use centime_domain::SpendingRecord;
use centime_testing::{init_tracing, MemoryStore};
use chrono::NaiveDate;
use serde_json::json;

fn drafts() -> FolderId {
    FolderId::new("allocations/drafts")
}

fn released() -> FolderId {
    FolderId::new("allocations/released")
}

fn folders() -> AllocationFolders {
    AllocationFolders {
        drafts: drafts(),
        released: released(),
    }
}

fn record(amount: f64) -> SpendingRecord {
    SpendingRecord {
        id: "TX-1001".into(),
        account_id: "ubs-main".into(),
        date: NaiveDate::from_ymd_opt(2026, 3, 14).expect("valid date"),
        party: "Migros".into(),
        party_id: Some(7),
        amount,
        owner: "lena".into(),
        category_id: None,
        sub_category_id: None,
        comment: None,
        tag_id: None,
    }
}

fn open(store: &Arc<MemoryStore>, amount: f64) -> AllocationSession {
    open_with_policy(store, amount, ReopenPolicy::ReadOnly)
}

fn open_with_policy(
    store: &Arc<MemoryStore>,
    amount: f64,
    policy: ReopenPolicy,
) -> AllocationSession {
    init_tracing();
    let store: Arc<dyn DocumentStore> = store.clone();
    AllocationSession::open(&record(amount), store, folders(), policy)
}

fn fill_form(session: &AllocationSession, amount: f64) {
    session.set_category(Some(3));
    session.set_sub_category(Some(31));
    session.set_comment("groceries");
    session.set_amount(amount);
}

/// Scenario A: one add settles a -42.50 record, auto-saves, and the
/// draft lands in the store with the sign-forced line.
#[tokio::test]
async fn balancing_add_auto_saves_a_draft() {
    let store = MemoryStore::connected();
    let session = open(&store, -42.50);

    fill_form(&session, 42.50);
    session.add_allocation().await.expect("add");

    assert!(session.is_balanced());
    assert_eq!(session.remaining_amount(), 0.0);
    assert_eq!(session.state(), SessionState::Drafted);
    assert!(session.can_release());
    assert!(!session.can_save_draft());

    let doc = store
        .document(&drafts(), "TX-1001.json")
        .expect("draft written");
    assert_eq!(doc["spendingId"], "TX-1001");
    assert_eq!(doc["partyID"], 7);
    assert_eq!(doc["processed"], json!(false));
    assert!(doc.get("savedAt").is_some());
    let lines = doc["allocations"].as_array().expect("lines array");
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["amount"].as_f64(), Some(-42.50));
    assert_eq!(lines[0]["comment"], "groceries");
}

/// Scenario B: removing the only line of a drafted session deletes the
/// draft document and empties the session.
#[tokio::test]
async fn removal_invalidates_the_draft() {
    let store = MemoryStore::connected();
    let session = open(&store, -42.50);
    fill_form(&session, 42.50);
    session.add_allocation().await.expect("add");
    assert_eq!(store.count(&drafts()), 1);

    session.remove_allocation(0).await.expect("remove");

    assert_eq!(session.state(), SessionState::Empty);
    assert!(session.allocations().is_empty());
    assert_eq!(store.count(&drafts()), 0);
}

/// Scenario C: loading with neither document present yields an empty
/// session and ends the loading lifecycle.
#[tokio::test]
async fn load_without_documents_is_empty() {
    let store = MemoryStore::connected();
    let session = open(&store, -42.50);
    assert!(session.is_loading());

    session.load_draft().await.expect("load");

    assert_eq!(session.state(), SessionState::Empty);
    assert!(session.allocations().is_empty());
    assert!(!session.is_loading());
}

/// Scenario D: a released document loads read-only with both affordances
/// disabled.
#[tokio::test]
async fn released_document_loads_read_only() {
    let store = MemoryStore::connected();
    store.seed(
        &released(),
        "TX-1001.json",
        json!({
            "version": 1,
            "spendingId": "TX-1001",
            "allocations": [
                { "categoryID": 3, "subCategoryID": 31, "amount": -30.0, "allocationDate": "2026-03-14" },
                { "categoryID": 3, "subCategoryID": 32, "amount": -12.5, "allocationDate": "2026-03-14" }
            ]
        }),
    );
    let session = open(&store, -42.50);

    session.load_draft().await.expect("load");

    assert_eq!(session.state(), SessionState::ReadOnly);
    assert_eq!(session.allocations().len(), 2);
    assert!(session.is_balanced());
    assert!(!session.can_save_draft());
    assert!(!session.can_release());
}

/// Scenario E: releasing writes the denominated released document,
/// deletes the draft, and the session settles from its local view.
#[tokio::test]
async fn release_writes_released_document_and_deletes_draft() {
    let store = MemoryStore::connected();
    let session = open(&store, -42.50);
    fill_form(&session, 42.50);
    session.add_allocation().await.expect("add");
    assert_eq!(session.state(), SessionState::Drafted);

    session.release().await.expect("release");

    let doc = store
        .document(&released(), "TX-1001.json")
        .expect("released written");
    assert_eq!(doc["currency"], "CHF");
    assert_eq!(doc["spendingAmount"].as_f64(), Some(-42.50));
    assert_eq!(doc["processed"], json!(false));
    assert!(doc.get("releasedAt").is_some());
    assert_eq!(doc["allocations"].as_array().map(Vec::len), Some(1));

    assert_eq!(store.count(&drafts()), 0);
    // lines are untouched and still sum to the record, so the local
    // recompute settles on Balanced
    assert_eq!(session.state(), SessionState::Balanced);
}

/// A draft beats a released copy on load and presets the form amount.
#[tokio::test]
async fn draft_takes_priority_over_released() {
    let store = MemoryStore::connected();
    store.seed(
        &drafts(),
        "TX-1001.json",
        json!({
            "version": 1,
            "allocations": [
                { "categoryID": 3, "subCategoryID": 31, "amount": -30.0 }
            ]
        }),
    );
    store.seed(
        &released(),
        "TX-1001.json",
        json!({ "version": 1, "allocations": [] }),
    );
    let session = open(&store, -42.50);

    session.load_draft().await.expect("load");

    assert_eq!(session.state(), SessionState::Drafted);
    assert_eq!(session.allocations().len(), 1);
    // line date fell back to the record's date
    assert_eq!(
        session.allocations()[0].allocation_date,
        NaiveDate::from_ymd_opt(2026, 3, 14).expect("valid date")
    );
    assert_eq!(session.form().amount, 12.50);
}

/// A draft whose allocations field is not an array counts as absent.
#[tokio::test]
async fn malformed_draft_resets_to_empty() {
    let store = MemoryStore::connected();
    store.seed(
        &drafts(),
        "TX-1001.json",
        json!({ "version": 1, "allocations": "nope" }),
    );
    let session = open(&store, -42.50);

    session.load_draft().await.expect("load");

    assert_eq!(session.state(), SessionState::Empty);
    assert!(session.allocations().is_empty());
    assert!(!session.is_loading());
}

/// With the store disconnected, loading completes its lifecycle and the
/// session degrades to in-memory editing.
#[tokio::test]
async fn unavailable_store_degrades_gracefully() {
    let store = MemoryStore::disconnected();
    let session = open(&store, -42.50);

    session.load_draft().await.expect("load is a no-op");
    assert_eq!(session.state(), SessionState::Empty);
    assert!(!session.is_loading());

    // the balancing add is accepted, but the auto-save is skipped
    fill_form(&session, 42.50);
    session.add_allocation().await.expect("add");
    assert_eq!(session.state(), SessionState::Balanced);
    assert_eq!(store.count(&drafts()), 0);
}

/// P1: balance tracks the rounded remainder, immune to binary drift.
#[tokio::test]
async fn balance_uses_rounded_remainder() {
    let store = MemoryStore::connected();
    let session = open(&store, -10.05);

    for _ in 0..2 {
        fill_form(&session, 3.35);
        session.add_allocation().await.expect("add");
        assert_eq!(session.state(), SessionState::Editing);
        assert!(!session.is_balanced());
    }

    fill_form(&session, 3.35);
    session.add_allocation().await.expect("add");

    assert!(session.is_balanced());
    assert_eq!(session.total_allocated(), -10.05);
    assert_eq!(session.remaining_amount(), 0.0);
    assert_eq!(session.state(), SessionState::Drafted);
}

/// Guard no-ops: incomplete form, zero amount, out-of-range removal.
#[tokio::test]
async fn invalid_inputs_are_silent_no_ops() {
    let store = MemoryStore::connected();
    let session = open(&store, -42.50);

    session.set_amount(10.0);
    session.add_allocation().await.expect("no category");
    assert!(session.allocations().is_empty());

    fill_form(&session, 0.0);
    session.add_allocation().await.expect("zero amount");
    assert!(session.allocations().is_empty());

    session.remove_allocation(5).await.expect("out of range");
    assert_eq!(session.state(), SessionState::Empty);
}

/// Mutations against a read-only session are refused.
#[tokio::test]
async fn read_only_sessions_refuse_mutation() {
    let store = MemoryStore::connected();
    store.seed(
        &released(),
        "TX-1001.json",
        json!({
            "version": 1,
            "allocations": [{ "categoryID": 3, "subCategoryID": 31, "amount": -42.5 }]
        }),
    );
    let session = open(&store, -42.50);
    session.load_draft().await.expect("load");
    assert_eq!(session.state(), SessionState::ReadOnly);

    fill_form(&session, 10.0);
    session.add_allocation().await.expect("add refused");
    session.remove_allocation(0).await.expect("remove refused");

    assert_eq!(session.state(), SessionState::ReadOnly);
    assert_eq!(session.allocations().len(), 1);
    assert_eq!(store.count(&drafts()), 0);
}

/// Adding into a drafted session deletes the stale draft first and drops
/// back to editing; the new line is sign-forced.
#[tokio::test]
async fn add_after_draft_invalidates_it() {
    let store = MemoryStore::connected();
    let session = open(&store, -42.50);
    fill_form(&session, 42.50);
    session.add_allocation().await.expect("add");
    assert_eq!(session.state(), SessionState::Drafted);

    fill_form(&session, 10.0);
    session.add_allocation().await.expect("second add");

    assert_eq!(session.state(), SessionState::Editing);
    assert_eq!(store.count(&drafts()), 0);
    let lines = session.allocations();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[1].amount, -10.0);
    // form reset presets the absolute remainder
    assert_eq!(session.form().amount, 10.0);
    assert!(session.form().category_id.is_none());
}

/// An empty comment is replaced by the placeholder.
#[tokio::test]
async fn blank_comments_get_the_placeholder() {
    let store = MemoryStore::connected();
    let session = open(&store, -42.50);
    session.set_category(Some(3));
    session.set_sub_category(Some(31));
    session.set_comment("   ");
    session.set_amount(10.0);

    session.add_allocation().await.expect("add");

    assert_eq!(session.allocations()[0].comment, "Please comment");
}

/// P5: saving twice while balanced leaves exactly one draft document.
#[tokio::test]
async fn repeated_saves_never_duplicate_the_draft() {
    let store = MemoryStore::connected();
    let session = open(&store, -30.0);

    // balance while the store is expired so no auto-save fires
    store.session().expire("offline for the test");
    fill_form(&session, 30.0);
    session.add_allocation().await.expect("add");
    assert_eq!(session.state(), SessionState::Balanced);

    store.session().connect();
    session.save_draft().await.expect("first save");
    session.save_draft().await.expect("second save");

    assert_eq!(store.count(&drafts()), 1);
    assert_eq!(session.state(), SessionState::Drafted);
}

/// The upsert patches a pre-existing draft file instead of duplicating.
#[tokio::test]
async fn save_overwrites_a_preexisting_draft_file() {
    let store = MemoryStore::connected();
    store.seed(
        &drafts(),
        "TX-1001.json",
        json!({ "version": 1, "allocations": [] }),
    );
    let session = open(&store, -42.50);

    fill_form(&session, 42.50);
    session.add_allocation().await.expect("add auto-saves");

    assert_eq!(store.count(&drafts()), 1);
    let doc = store.document(&drafts(), "TX-1001.json").expect("draft");
    assert_eq!(doc["allocations"].as_array().map(Vec::len), Some(1));
}

/// Releasing when the draft disappeared underneath recovers locally
/// without writing anything.
#[tokio::test]
async fn release_recovers_when_draft_is_missing() {
    let store = MemoryStore::connected();
    let session = open(&store, -42.50);
    fill_form(&session, 42.50);
    session.add_allocation().await.expect("add");
    assert_eq!(session.state(), SessionState::Drafted);

    // an outside actor removes the draft document
    let handle = store
        .list(&drafts())
        .await
        .expect("list")
        .pop()
        .expect("draft handle");
    store.delete(&handle.id).await.expect("external delete");

    session.release().await.expect("release recovers");

    assert_eq!(store.count(&released()), 0);
    // the lines still settle the record locally
    assert_eq!(session.state(), SessionState::Balanced);
}

/// Under the reopen policy, a released document moves back to drafts and
/// the session becomes editable.
#[tokio::test]
async fn reopen_policy_moves_released_back_to_drafts() {
    let store = MemoryStore::connected();
    store.seed(
        &released(),
        "TX-1001.json",
        json!({
            "version": 1,
            "spendingId": "TX-1001",
            "allocations": [{ "categoryID": 3, "subCategoryID": 31, "amount": -42.5 }]
        }),
    );
    let session = open_with_policy(&store, -42.50, ReopenPolicy::ReopenAsDraft);

    session.load_draft().await.expect("load");

    assert_eq!(session.state(), SessionState::Drafted);
    assert_eq!(session.allocations().len(), 1);
    assert_eq!(store.count(&drafts()), 1);
    assert_eq!(store.count(&released()), 0);
    assert!(session.can_release());
}

/// An authorization failure propagates, expires the shared session, and
/// every later call fails fast as unavailable.
#[tokio::test]
async fn authorization_failure_expires_the_store() {
    let store = MemoryStore::connected();
    let session = open(&store, -42.50);
    fill_form(&session, 42.50);
    session.add_allocation().await.expect("add");
    assert_eq!(session.state(), SessionState::Drafted);

    store.fail_next_unauthorized();
    let err = session
        .remove_allocation(0)
        .await
        .expect_err("removal surfaces the 401");
    assert!(matches!(err, StoreError::Unauthorized));
    // the operation was bracketed but never completed
    assert_eq!(session.state(), SessionState::Busy);

    let err = store.read("mem-1").await.expect_err("store is expired");
    assert!(matches!(err, StoreError::Unavailable));

    // guarded mutations now degrade to silent no-ops
    session.save_draft().await.expect("save is a no-op");
}

/// P6: two operations submitted back-to-back never overlap their store
/// calls; the first's writes land before the second's begin.
#[tokio::test]
async fn queued_operations_never_overlap_store_calls() {
    let store = MemoryStore::connected();
    let session = open(&store, -30.0);

    store.session().expire("offline for the test");
    fill_form(&session, 30.0);
    session.add_allocation().await.expect("add");
    assert_eq!(session.state(), SessionState::Balanced);
    store.session().connect();

    let (save, remove) = tokio::join!(session.save_draft(), session.remove_allocation(0));
    save.expect("save");
    remove.expect("remove");

    assert_eq!(store.max_in_flight(), 1);
    // the save completed first, so the removal deleted its draft
    assert_eq!(store.count(&drafts()), 0);
    assert_eq!(session.state(), SessionState::Empty);
}
