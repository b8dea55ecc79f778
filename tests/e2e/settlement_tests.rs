//! Settlement orchestrator tests: state machine, dedup and polling.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::harness::{encode, payment, tx_hash, MockChain, TestHarness, REQUIRED_LOVELACE};
use cardano_x402::chain::ChainError;
use cardano_x402::event::SettlementEvent;
use cardano_x402::settlement::{dedup_key, SettlementRecord, SettlementStatus, SettlementStore};
use cardano_x402::types::ReasonCode;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

async fn stored_record(harness: &TestHarness, raw: &[u8]) -> SettlementRecord {
    let value = harness
        .store
        .get(&dedup_key(raw))
        .await
        .expect("Failed to read store")
        .expect("Record should exist");
    serde_json::from_str(&value).expect("Record should parse")
}

/// Test that a valid payment is submitted once and confirmed on first poll.
#[tokio::test(start_paused = true)]
async fn test_settle_confirms_on_first_poll() {
    let harness = TestHarness::new();
    let (settler, _events) = harness.settler();
    let tx = payment(REQUIRED_LOVELACE, 1);
    let (encoded, raw) = encode(&tx);

    let response = settler
        .settle(harness.context(&encoded), raw.clone())
        .await
        .expect("Settlement should not error");

    assert!(response.success);
    assert_eq!(response.transaction.as_deref(), Some(tx_hash(&tx).as_str()));
    assert_eq!(response.network.as_deref(), Some("cardano:preprod"));
    assert_eq!(harness.chain.submit_count(), 1);
    assert_eq!(harness.chain.query_count(), 1);

    let record = stored_record(&harness, &raw).await;
    assert_eq!(record.status, SettlementStatus::Confirmed);
    assert!(record.submitted_at.is_some());
    assert!(record.confirmed_at.is_some());
}

/// Test that replaying a confirmed settlement answers from the store.
#[tokio::test(start_paused = true)]
async fn test_replay_of_confirmed_settlement_skips_chain() {
    let harness = TestHarness::new();
    let (settler, _events) = harness.settler();
    let (encoded, raw) = encode(&payment(REQUIRED_LOVELACE, 2));

    let first = settler
        .settle(harness.context(&encoded), raw.clone())
        .await
        .expect("Settlement should not error");
    let queries = harness.chain.query_count();

    let second = settler
        .settle(harness.context(&encoded), raw)
        .await
        .expect("Settlement should not error");

    assert_eq!(first, second);
    assert_eq!(harness.chain.submit_count(), 1);
    assert_eq!(harness.chain.query_count(), queries);
}

/// Test that a client-class rejection is persisted as invalid_transaction.
#[tokio::test(start_paused = true)]
async fn test_client_rejection_is_invalid_transaction() {
    let harness = TestHarness::new();
    harness.chain.reject_submissions(ChainError::Rejected {
        status: 400,
        message: "BadInputsUTxO".to_string(),
    });
    let (settler, _events) = harness.settler();
    let (encoded, raw) = encode(&payment(REQUIRED_LOVELACE, 3));

    let response = settler
        .settle(harness.context(&encoded), raw.clone())
        .await
        .expect("Settlement should not error");
    assert!(!response.success);
    assert_eq!(response.reason, Some(ReasonCode::InvalidTransaction));

    let record = stored_record(&harness, &raw).await;
    assert_eq!(record.status, SettlementStatus::Failed);
    assert_eq!(record.reason, Some(ReasonCode::InvalidTransaction));

    // Retrying the same bytes replays the failure without resubmitting
    let retry = settler
        .settle(harness.context(&encoded), raw)
        .await
        .expect("Settlement should not error");
    assert_eq!(retry.reason, Some(ReasonCode::InvalidTransaction));
    assert_eq!(harness.chain.submit_count(), 1);
    assert_eq!(harness.chain.query_count(), 0);
}

/// Test that transient submit failures are submission_rejected.
#[tokio::test(start_paused = true)]
async fn test_transient_rejection_is_submission_rejected() {
    for error in [
        ChainError::Rejected {
            status: 429,
            message: "slow down".to_string(),
        },
        ChainError::Rejected {
            status: 503,
            message: "maintenance".to_string(),
        },
        ChainError::Unavailable("connection refused".to_string()),
    ] {
        let harness = TestHarness::new();
        harness.chain.reject_submissions(error);
        let (settler, _events) = harness.settler();
        let (encoded, raw) = encode(&payment(REQUIRED_LOVELACE, 4));

        let response = settler
            .settle(harness.context(&encoded), raw)
            .await
            .expect("Settlement should not error");
        assert_eq!(response.reason, Some(ReasonCode::SubmissionRejected));
    }
}

/// Test that an unconfirmed transaction times out after the poll budget
/// and is promoted by a later settle once it lands.
#[tokio::test(start_paused = true)]
async fn test_timeout_then_promotion() {
    let harness = TestHarness::new();
    harness.chain.confirm_after(None);
    let (settler, _events) = harness.settler();
    let tx = payment(REQUIRED_LOVELACE, 5);
    let (encoded, raw) = encode(&tx);
    let hash = tx_hash(&tx);

    let started = tokio::time::Instant::now();
    let response = settler
        .settle(harness.context(&encoded), raw.clone())
        .await
        .expect("Settlement should not error");

    assert!(!response.success);
    assert_eq!(response.reason, Some(ReasonCode::ConfirmationTimeout));
    assert_eq!(response.transaction.as_deref(), Some(hash.as_str()));
    assert!(started.elapsed() >= Duration::from_secs(120));
    assert!(harness.chain.query_count() >= 20);
    assert_eq!(
        stored_record(&harness, &raw).await.status,
        SettlementStatus::Timeout
    );

    // Still pending: one query, same answer
    let queries = harness.chain.query_count();
    let pending = settler
        .settle(harness.context(&encoded), raw.clone())
        .await
        .expect("Settlement should not error");
    assert_eq!(pending.reason, Some(ReasonCode::ConfirmationTimeout));
    assert_eq!(harness.chain.query_count(), queries + 1);

    // Lands on-chain: the next settle promotes the record
    harness.chain.confirm(&hash);
    let promoted = settler
        .settle(harness.context(&encoded), raw.clone())
        .await
        .expect("Settlement should not error");
    assert!(promoted.success);
    assert_eq!(promoted.transaction.as_deref(), Some(hash.as_str()));
    assert_eq!(
        stored_record(&harness, &raw).await.status,
        SettlementStatus::Confirmed
    );
    assert_eq!(harness.chain.submit_count(), 1);
}

/// Test that an underpaying transaction is never submitted.
#[tokio::test(start_paused = true)]
async fn test_failed_verification_never_submits() {
    let harness = TestHarness::new();
    let (settler, mut events) = harness.settler();
    let (encoded, raw) = encode(&payment(REQUIRED_LOVELACE - 1, 6));

    let response = settler
        .settle(harness.context(&encoded), raw.clone())
        .await
        .expect("Settlement should not error");

    assert!(!response.success);
    assert_eq!(response.reason, Some(ReasonCode::VerificationFailed));
    assert!(response.transaction.is_none());
    assert_eq!(harness.chain.submit_count(), 0);
    assert!(harness
        .store
        .get(&dedup_key(&raw))
        .await
        .expect("Failed to read store")
        .is_none());
    assert_eq!(
        events.try_recv().expect("Event should be sent"),
        SettlementEvent::Failed {
            reason: ReasonCode::VerificationFailed
        }
    );
}

/// Test that concurrent settles of identical bytes submit exactly once.
#[tokio::test(start_paused = true)]
async fn test_concurrent_settles_submit_once() {
    let harness = TestHarness::with_chain(MockChain::with_submit_delay(Duration::from_secs(1)));
    let (settler, _events) = harness.settler();
    let tx = payment(REQUIRED_LOVELACE, 7);
    let (encoded, raw) = encode(&tx);
    let hash = tx_hash(&tx);

    let attempts = (0..8).map(|_| {
        Arc::clone(&settler).settle_detached(harness.context(&encoded), raw.clone())
    });
    let responses: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|r| r.expect("Settlement should not error"))
        .collect();

    assert_eq!(harness.chain.submit_count(), 1);
    assert_eq!(responses.iter().filter(|r| r.success).count(), 1);
    for response in &responses {
        assert_eq!(response.transaction.as_deref(), Some(hash.as_str()));
        if !response.success {
            assert_eq!(response.reason, Some(ReasonCode::ConfirmationTimeout));
        }
    }
}

/// Test that different transactions settle independently.
#[tokio::test(start_paused = true)]
async fn test_distinct_transactions_each_submit() {
    let harness = TestHarness::new();
    let (settler, _events) = harness.settler();

    let attempts = (10..13).map(|seed| {
        let (encoded, raw) = encode(&payment(REQUIRED_LOVELACE, seed));
        Arc::clone(&settler).settle_detached(harness.context(&encoded), raw)
    });
    let responses = join_all(attempts).await;

    assert!(responses
        .iter()
        .all(|r| r.as_ref().is_ok_and(|r| r.success)));
    assert_eq!(harness.chain.submit_count(), 3);
}

/// Test that chain query failures while polling are retried.
#[tokio::test(start_paused = true)]
async fn test_poll_survives_query_errors() {
    let harness = TestHarness::new();
    harness.chain.fail_next_queries(2);
    let (settler, _events) = harness.settler();
    let (encoded, raw) = encode(&payment(REQUIRED_LOVELACE, 8));

    let started = tokio::time::Instant::now();
    let response = settler
        .settle(harness.context(&encoded), raw)
        .await
        .expect("Settlement should not error");

    assert!(response.success);
    assert_eq!(harness.chain.query_count(), 3);
    assert!(started.elapsed() >= Duration::from_secs(15));
}

/// Test that a dropped caller does not abandon its settlement.
#[tokio::test(start_paused = true)]
async fn test_detached_settlement_outlives_caller() {
    let harness = TestHarness::new();
    let (settler, _events) = harness.settler();
    let tx = payment(REQUIRED_LOVELACE, 9);
    let (encoded, raw) = encode(&tx);

    let caller = Arc::clone(&settler).settle_detached(harness.context(&encoded), raw.clone());
    assert!(tokio::time::timeout(Duration::from_secs(1), caller)
        .await
        .is_err());

    tokio::time::sleep(Duration::from_secs(30)).await;

    let record = settler
        .record_for(&tx_hash(&tx))
        .await
        .expect("Failed to read record")
        .expect("Record should be indexed by tx hash");
    assert_eq!(record.status, SettlementStatus::Confirmed);
    assert_eq!(stored_record(&harness, &raw).await, record);
}

/// Test the event sequence of a successful settlement.
#[tokio::test(start_paused = true)]
async fn test_settlement_events() {
    let harness = TestHarness::new();
    let (settler, mut events) = harness.settler();
    let tx = payment(REQUIRED_LOVELACE, 11);
    let (encoded, raw) = encode(&tx);
    let hash = tx_hash(&tx);

    settler
        .settle(harness.context(&encoded), raw.clone())
        .await
        .expect("Settlement should not error");

    assert_eq!(
        events.try_recv().expect("claimed"),
        SettlementEvent::Claimed {
            key: dedup_key(&raw)
        }
    );
    assert_eq!(
        events.try_recv().expect("submitted"),
        SettlementEvent::Submitted {
            tx_hash: hash.clone()
        }
    );
    assert_eq!(
        events.try_recv().expect("confirmed"),
        SettlementEvent::Confirmed { tx_hash: hash }
    );
    assert!(events.try_recv().is_err());
}

/// Test that the claim winner running out of budget does not overwrite a
/// confirmation recorded meanwhile by a later caller.
#[tokio::test(start_paused = true)]
async fn test_timeout_keeps_confirmation_from_later_caller() {
    let harness = TestHarness::with_chain(MockChain::with_query_delay(Duration::from_secs(2)));
    harness.chain.confirm_after(None);
    let (settler, _events) = harness.settler();
    let tx = payment(REQUIRED_LOVELACE, 12);
    let (encoded, raw) = encode(&tx);
    let hash = tx_hash(&tx);

    let winner = tokio::spawn(
        Arc::clone(&settler).settle_detached(harness.context(&encoded), raw.clone()),
    );

    // The winner's last lookup starts at 117s and still misses
    tokio::time::sleep(Duration::from_millis(117_500)).await;
    harness.chain.confirm(&hash);
    let later = settler
        .settle(harness.context(&encoded), raw.clone())
        .await
        .expect("Settlement should not error");
    assert!(later.success);

    let first = winner
        .await
        .expect("Settlement task should not panic")
        .expect("Settlement should not error");
    assert!(first.success);
    assert_eq!(first.transaction.as_deref(), Some(hash.as_str()));
    assert_eq!(
        stored_record(&harness, &raw).await.status,
        SettlementStatus::Confirmed
    );
    assert_eq!(harness.chain.submit_count(), 1);
}

/// Test that a slow submission does not downgrade a confirmation recorded
/// while it was in flight.
#[tokio::test(start_paused = true)]
async fn test_slow_submit_keeps_confirmation_from_later_caller() {
    let harness = TestHarness::with_chain(MockChain::with_submit_delay(Duration::from_secs(10)));
    let (settler, _events) = harness.settler();
    let tx = payment(REQUIRED_LOVELACE, 13);
    let (encoded, raw) = encode(&tx);
    let hash = tx_hash(&tx);

    let winner = tokio::spawn(
        Arc::clone(&settler).settle_detached(harness.context(&encoded), raw.clone()),
    );

    tokio::time::sleep(Duration::from_secs(1)).await;
    harness.chain.confirm(&hash);
    let later = settler
        .settle(harness.context(&encoded), raw.clone())
        .await
        .expect("Settlement should not error");
    assert!(later.success);

    let first = winner
        .await
        .expect("Settlement task should not panic")
        .expect("Settlement should not error");
    assert!(first.success);

    let record = settler
        .record_for(&hash)
        .await
        .expect("Failed to read record")
        .expect("Record should be indexed by tx hash");
    assert_eq!(record.status, SettlementStatus::Confirmed);
    assert_eq!(harness.chain.submit_count(), 1);
}
