//! MeditationStore interface tests.
//!
//! These tests verify the contract of the MeditationStore trait.
//! Each table implementation should run these tests. Every test works on
//! fresh random ids and user ids so runs against a shared table never see
//! each other's records.

use chrono::{Duration, TimeZone, Utc};
use uuid::Uuid;

use tempora::model::{Meditation, Sequence};
use tempora::storage::{ManualClock, MeditationStore, StorageError};

fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4())
}

fn meditation(user_id: &str, public: bool) -> Meditation {
    let at = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap();
    let id = unique("med");
    Meditation {
        name: format!("Meditation {}", id),
        id,
        user_id: user_id.to_string(),
        created_at: at,
        updated_at: at,
        url: "http://mp3.com/1.mp3".to_string(),
        text: "Meditation Text".to_string(),
        public,
    }
}

fn sequence(user_id: &str, members: Vec<Meditation>) -> Sequence {
    let at = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap();
    Sequence {
        id: unique("seq"),
        user_id: user_id.to_string(),
        created_at: at,
        updated_at: at,
        image_url: "https://image.url/".to_string(),
        name: "Sequence 1".to_string(),
        description: "A Testing Sequence".to_string(),
        public: false,
        meditations: members,
    }
}

async fn save_many<S: MeditationStore>(store: &S, user_id: &str, n: usize) -> Vec<Meditation> {
    let mut saved = Vec::with_capacity(n);
    for _ in 0..n {
        let m = meditation(user_id, false);
        store.save_meditation(&m).await.expect("save should succeed");
        saved.push(m);
    }
    saved
}

fn ids(meditations: &[Meditation]) -> Vec<String> {
    meditations.iter().map(|m| m.id.clone()).collect()
}

// =============================================================================
// Meditation tests
// =============================================================================

pub async fn test_meditation_round_trip<S: MeditationStore>(store: &S) {
    let m = meditation(&unique("user"), false);
    store.save_meditation(&m).await.expect("save should succeed");

    let fetched = store.get_meditation(&m.id).await.expect("get should succeed");
    assert_eq!(fetched, m, "stored meditation should round-trip");
}

pub async fn test_get_missing_meditation<S: MeditationStore>(store: &S) {
    let result = store.get_meditation(&unique("missing")).await;
    assert!(
        matches!(result, Err(StorageError::NotFound { .. })),
        "missing meditation should be NotFound, got {:?}",
        result
    );
}

pub async fn test_list_meditations_by_user<S: MeditationStore>(store: &S) {
    let user = unique("user");
    let saved = save_many(store, &user, 3).await;
    save_many(store, &unique("other"), 2).await;

    let listed = store.list_meditations(&user).await.unwrap();
    assert_eq!(listed.len(), 3, "only the user's meditations are listed");

    let mut expected = ids(&saved);
    expected.sort();
    expected.reverse();
    assert_eq!(ids(&listed), expected, "listing is ordered by id, descending");
}

pub async fn test_update_meditation<S: MeditationStore>(store: &S) {
    let user = unique("user");
    let mut m = save_many(store, &user, 1).await.remove(0);
    m.name = "Updated".to_string();
    m.text = "Updated text".to_string();

    store.update_meditation(&m).await.expect("update should succeed");
    assert_eq!(store.get_meditation(&m.id).await.unwrap(), m);
}

pub async fn test_update_missing_meditation<S: MeditationStore>(store: &S) {
    let result = store.update_meditation(&meditation("nobody", false)).await;
    assert!(matches!(result, Err(StorageError::NotFound { .. })));
}

pub async fn test_visibility<S: MeditationStore>(store: &S) {
    let users: Vec<String> = (0..3).map(|_| unique("user")).collect();
    let mut public_ids = Vec::new();
    for user in &users {
        for _ in 0..2 {
            let private = meditation(user, false);
            store.save_meditation(&private).await.unwrap();
            let public = meditation(user, true);
            store.save_meditation(&public).await.unwrap();
            public_ids.push(public.id);
        }
    }

    let listed = store.list_public_meditations().await.unwrap();
    for id in &public_ids {
        assert!(
            listed.iter().any(|m| &m.id == id),
            "public meditation {} should be listed",
            id
        );
    }
    assert!(listed.iter().all(|m| m.public), "no private meditation is listed");
}

// =============================================================================
// Sequence tests
// =============================================================================

pub async fn test_sequence_preserves_member_order<S: MeditationStore>(store: &S) {
    let user = unique("user");
    let saved = save_many(store, &user, 3).await;
    let members = vec![saved[2].clone(), saved[0].clone(), saved[1].clone()];
    let seq = sequence(&user, members.clone());

    store.save_sequence(&seq).await.expect("save should succeed");
    let fetched = store.get_sequence_by_id(&seq.id).await.unwrap();

    assert_eq!(ids(&fetched.meditations), ids(&members));
    assert_eq!(fetched, seq);
}

pub async fn test_large_sequence_spans_batches<S: MeditationStore>(store: &S) {
    let user = unique("user");
    let saved = save_many(store, &user, 120).await;
    let mut members = saved.clone();
    members.reverse();
    let seq = sequence(&user, members.clone());

    store.save_sequence(&seq).await.unwrap();
    let fetched = store.get_sequence_by_id(&seq.id).await.unwrap();
    assert_eq!(ids(&fetched.meditations), ids(&members));
}

pub async fn test_save_existing_sequence_conflicts<S: MeditationStore>(store: &S) {
    let user = unique("user");
    let seq = sequence(&user, save_many(store, &user, 1).await);
    store.save_sequence(&seq).await.unwrap();

    let result = store.save_sequence(&seq).await;
    assert!(matches!(result, Err(StorageError::Conflict(_))));
}

pub async fn test_update_sequence_replaces_members<S: MeditationStore>(store: &S) {
    let user = unique("user");
    let saved = save_many(store, &user, 3).await;
    let seq = sequence(&user, saved.clone());
    store.save_sequence(&seq).await.unwrap();

    let mut updated = seq.clone();
    updated.name = "Renamed".to_string();
    updated.meditations = vec![saved[1].clone()];
    store.update_sequence(&updated).await.unwrap();

    let fetched = store.get_sequence_by_id(&seq.id).await.unwrap();
    assert_eq!(fetched.name, "Renamed");
    assert_eq!(ids(&fetched.meditations), vec![saved[1].id.clone()]);

    // Dropped members are no longer referenced.
    store.delete_meditation(&saved[0].id).await.unwrap();
    store.delete_meditation(&saved[2].id).await.unwrap();
}

pub async fn test_referential_integrity<S: MeditationStore>(store: &S) {
    let user = unique("user");
    let saved = save_many(store, &user, 3).await;
    let seq = sequence(&user, saved.clone());
    store.save_sequence(&seq).await.unwrap();

    let blocked = store.delete_meditation(&saved[0].id).await;
    assert!(
        matches!(blocked, Err(StorageError::Conflict(_))),
        "delete of a member should conflict, got {:?}",
        blocked
    );
    assert!(store.get_meditation(&saved[0].id).await.is_ok());

    let mut updated = seq.clone();
    updated.meditations = saved[1..].to_vec();
    store.update_sequence(&updated).await.unwrap();
    store
        .delete_meditation(&saved[0].id)
        .await
        .expect("delete should succeed once no sequence references it");
}

pub async fn test_delete_sequence<S: MeditationStore>(store: &S) {
    let user = unique("user");
    let saved = save_many(store, &user, 2).await;
    let seq = sequence(&user, saved.clone());
    store.save_sequence(&seq).await.unwrap();

    store.delete_sequence_by_id(&seq.id).await.unwrap();
    assert!(matches!(
        store.get_sequence_by_id(&seq.id).await,
        Err(StorageError::NotFound { .. })
    ));
    for m in &saved {
        store.delete_meditation(&m.id).await.unwrap();
    }
}

pub async fn test_list_sequences<S: MeditationStore>(store: &S) {
    let user = unique("user");
    let saved = save_many(store, &user, 2).await;
    let private = sequence(&user, saved.clone());
    let mut public = sequence(&user, saved);
    public.public = true;
    store.save_sequence(&private).await.unwrap();
    store.save_sequence(&public).await.unwrap();

    let mine = store.list_sequences_by_user_id(&user).await.unwrap();
    assert_eq!(mine.len(), 2);

    let listed = store.list_public_sequences().await.unwrap();
    assert!(listed.iter().any(|s| s.id == public.id));
    assert!(!listed.iter().any(|s| s.id == private.id));
}

pub async fn test_get_meditations_by_ids<S: MeditationStore>(store: &S) {
    let user = unique("user");
    let saved = save_many(store, &user, 3).await;
    let requested = vec![
        saved[1].id.clone(),
        saved[2].id.clone(),
        saved[1].id.clone(),
        saved[0].id.clone(),
    ];

    let fetched = store.get_meditations_by_ids(&requested).await.unwrap();
    assert_eq!(ids(&fetched), requested);

    let with_missing = vec![saved[0].id.clone(), unique("missing")];
    assert!(matches!(
        store.get_meditations_by_ids(&with_missing).await,
        Err(StorageError::Integrity { .. })
    ));
}

// =============================================================================
// Optimistic concurrency
// =============================================================================

/// Requires the store to be driven by `clock`.
pub async fn test_stale_update_rejected<S: MeditationStore>(store: &S, clock: &ManualClock) {
    let user = unique("user");
    let m = save_many(store, &user, 1).await.remove(0);

    clock.advance(Duration::seconds(10));
    store.update_meditation(&m).await.unwrap();

    clock.advance(Duration::seconds(-5));
    let stale = store.update_meditation(&m).await;
    assert!(
        matches!(stale, Err(StorageError::Conflict(_))),
        "older writer should conflict, got {:?}",
        stale
    );

    clock.advance(Duration::seconds(10));
    store.update_meditation(&m).await.unwrap();
}

// =============================================================================
// Test runner macro
// =============================================================================

/// Run all MeditationStore interface tests against a store implementation.
#[macro_export]
macro_rules! run_store_tests {
    ($store:expr, $clock:expr) => {
        use $crate::storage::store_tests::*;

        // meditation tests
        test_meditation_round_trip($store).await;
        println!("  test_meditation_round_trip: PASSED");

        test_get_missing_meditation($store).await;
        println!("  test_get_missing_meditation: PASSED");

        test_list_meditations_by_user($store).await;
        println!("  test_list_meditations_by_user: PASSED");

        test_update_meditation($store).await;
        println!("  test_update_meditation: PASSED");

        test_update_missing_meditation($store).await;
        println!("  test_update_missing_meditation: PASSED");

        test_visibility($store).await;
        println!("  test_visibility: PASSED");

        // sequence tests
        test_sequence_preserves_member_order($store).await;
        println!("  test_sequence_preserves_member_order: PASSED");

        test_large_sequence_spans_batches($store).await;
        println!("  test_large_sequence_spans_batches: PASSED");

        test_save_existing_sequence_conflicts($store).await;
        println!("  test_save_existing_sequence_conflicts: PASSED");

        test_update_sequence_replaces_members($store).await;
        println!("  test_update_sequence_replaces_members: PASSED");

        test_referential_integrity($store).await;
        println!("  test_referential_integrity: PASSED");

        test_delete_sequence($store).await;
        println!("  test_delete_sequence: PASSED");

        test_list_sequences($store).await;
        println!("  test_list_sequences: PASSED");

        test_get_meditations_by_ids($store).await;
        println!("  test_get_meditations_by_ids: PASSED");

        // concurrency
        test_stale_update_rejected($store, $clock).await;
        println!("  test_stale_update_rejected: PASSED");
    };
}
