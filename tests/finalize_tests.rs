//! Finalize: verification, idempotent replay, corruption and expiry.

mod common;

use asset_store::{
    client::orchestrator::sha256_hex,
    errors::{AppError, ErrorDetails, IntegrityFailure},
    models::AssetStatus,
};
use common::TestContext;
use std::sync::atomic::Ordering;

const PAYLOAD: &[u8] = b"\x89PNG\r\n\x1a\n pretend image bytes";

#[tokio::test]
async fn test_finalize_marks_ready_with_server_digest() {
    let ctx = TestContext::new().await;
    let ticket = ctx.uploaded(&ctx.alice, "photo.png", PAYLOAD).await;
    let digest = sha256_hex(PAYLOAD);

    // Client digests are compared case-insensitively.
    let asset = ctx
        .finalize(&ctx.alice, ticket.asset_id, &digest.to_uppercase(), 1)
        .await
        .unwrap();

    assert_eq!(asset.status, AssetStatus::Ready);
    assert_eq!(asset.version, 2);
    assert_eq!(asset.digest.as_deref(), Some(digest.as_str()));
    assert_eq!(asset.storage_path, ticket.storage_path);
}

#[tokio::test]
async fn test_finalize_replay_returns_same_asset() {
    let ctx = TestContext::new().await;
    let ticket = ctx.uploaded(&ctx.alice, "photo.png", PAYLOAD).await;
    let digest = sha256_hex(PAYLOAD);

    let first = ctx.finalize(&ctx.alice, ticket.asset_id, &digest, 1).await.unwrap();
    let second = ctx.finalize(&ctx.alice, ticket.asset_id, &digest, 1).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(second.version, 2);
    assert_eq!(ctx.hasher.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_digest_mismatch_marks_corrupt() {
    let ctx = TestContext::new().await;
    let ticket = ctx.uploaded(&ctx.alice, "photo.png", PAYLOAD).await;
    let wrong = sha256_hex(b"something else");

    let err = ctx
        .finalize(&ctx.alice, ticket.asset_id, &wrong, 1)
        .await
        .unwrap_err();
    match err {
        AppError::Integrity(IntegrityFailure::DigestMismatch { client, server }) => {
            assert_eq!(client, wrong);
            assert_eq!(server, sha256_hex(PAYLOAD));
        }
        other => panic!("expected digest mismatch, got {other:?}"),
    }

    let stored = ctx.admin().asset(ticket.asset_id).await.unwrap().unwrap();
    assert_eq!(stored.status, AssetStatus::Corrupt);
    assert_eq!(stored.digest, None);

    // Corrupt is terminal, even with the right digest.
    let err = ctx
        .finalize(&ctx.alice, ticket.asset_id, &sha256_hex(PAYLOAD), 1)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Integrity(IntegrityFailure::AlreadyCorrupt)
    ));
    assert_eq!(
        err.to_body().details,
        Some(ErrorDetails::Cause {
            cause: "asset already marked corrupt".into()
        })
    );
    assert_eq!(ctx.hasher.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_hashing_failure_marks_corrupt() {
    let ctx = TestContext::new().await;
    let ticket = ctx.uploaded(&ctx.alice, "photo.png", PAYLOAD).await;
    ctx.hasher.fail_with("hashing backend timed out");

    let err = ctx
        .finalize(&ctx.alice, ticket.asset_id, &sha256_hex(PAYLOAD), 1)
        .await
        .unwrap_err();
    match err {
        AppError::Integrity(IntegrityFailure::HashingFailed { cause }) => {
            assert!(cause.contains("timed out"));
        }
        other => panic!("expected hashing failure, got {other:?}"),
    }
    let stored = ctx.admin().asset(ticket.asset_id).await.unwrap().unwrap();
    assert_eq!(stored.status, AssetStatus::Corrupt);
}

#[tokio::test]
async fn test_missing_object_is_an_integrity_error() {
    let ctx = TestContext::new().await;
    let ticket = ctx.ticket(&ctx.alice, "never-sent.png", 10).await;

    let err = ctx
        .finalize(&ctx.alice, ticket.asset_id, &sha256_hex(b"0123456789"), 1)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Integrity(IntegrityFailure::HashingFailed { .. })
    ));
}

#[tokio::test]
async fn test_ticket_expiry_boundary() {
    let ctx = TestContext::new().await;
    let digest = sha256_hex(PAYLOAD);

    let early = ctx.uploaded(&ctx.alice, "early.png", PAYLOAD).await;
    let late = ctx.uploaded(&ctx.alice, "late.png", PAYLOAD).await;

    // One second before `late` expires, `early` (issued a second sooner) is
    // exactly at its expiry instant.
    ctx.clock.set(late.expires_at - chrono::Duration::seconds(1));
    assert_eq!(ctx.now(), early.expires_at);

    let err = ctx
        .finalize(&ctx.alice, early.asset_id, &digest, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(ref m) if m.contains("expired")));
    let untouched = ctx.admin().asset(early.asset_id).await.unwrap().unwrap();
    assert_eq!(untouched.status, AssetStatus::Draft);

    let asset = ctx.finalize(&ctx.alice, late.asset_id, &digest, 1).await.unwrap();
    assert_eq!(asset.status, AssetStatus::Ready);
}

#[tokio::test]
async fn test_foreign_ticket_is_invalid() {
    let ctx = TestContext::new().await;
    let ticket = ctx.uploaded(&ctx.alice, "photo.png", PAYLOAD).await;

    let err = ctx
        .finalize(&ctx.bob, ticket.asset_id, &sha256_hex(PAYLOAD), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));
    assert_eq!(ctx.hasher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_malformed_digest_changes_nothing() {
    let ctx = TestContext::new().await;
    let ticket = ctx.uploaded(&ctx.alice, "photo.png", PAYLOAD).await;

    let err = ctx
        .finalize(&ctx.alice, ticket.asset_id, "not-a-digest", 1)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));

    let ticket_row = ctx
        .owner(&ctx.alice)
        .find_ticket(ticket.asset_id)
        .await
        .unwrap()
        .unwrap();
    assert!(!ticket_row.used);
    assert_eq!(ctx.hasher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_stale_version_conflicts_then_retry_succeeds() {
    let ctx = TestContext::new().await;
    let ticket = ctx.uploaded(&ctx.alice, "photo.png", PAYLOAD).await;
    let digest = sha256_hex(PAYLOAD);

    let err = ctx
        .finalize(&ctx.alice, ticket.asset_id, &digest, 7)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::VersionConflict {
            expected: 7,
            actual: 1
        }
    ));

    // The ticket is spent but the asset is still a draft, so a retry with
    // the right version runs verification again.
    let asset = ctx.finalize(&ctx.alice, ticket.asset_id, &digest, 1).await.unwrap();
    assert_eq!(asset.status, AssetStatus::Ready);
    assert_eq!(ctx.hasher.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_concurrent_finalize_commits_once() {
    let ctx = TestContext::new().await;
    let ticket = ctx.uploaded(&ctx.alice, "photo.png", PAYLOAD).await;
    let digest = sha256_hex(PAYLOAD);
    ctx.hasher.rendezvous(2);

    let (first, second) = tokio::join!(
        ctx.finalize(&ctx.alice, ticket.asset_id, &digest, 1),
        ctx.finalize(&ctx.alice, ticket.asset_id, &digest, 1),
    );

    let (winner, loser) = match (first, second) {
        (Ok(asset), Err(err)) | (Err(err), Ok(asset)) => (asset, err),
        other => panic!("expected exactly one commit, got {other:?}"),
    };
    assert_eq!(winner.status, AssetStatus::Ready);
    assert_eq!(winner.version, 2);
    assert!(matches!(
        loser,
        AppError::VersionConflict {
            expected: 1,
            actual: 2
        }
    ));
    assert_eq!(ctx.hasher.calls.load(Ordering::SeqCst), 2);

    let stored = ctx.admin().asset(ticket.asset_id).await.unwrap().unwrap();
    assert_eq!(stored.version, 2);
}

#[tokio::test]
async fn test_long_filename_finalizes() {
    let ctx = TestContext::new().await;
    let filename = format!("{}.png", "n".repeat(246));
    assert_eq!(filename.len(), 250);

    let ticket = ctx.uploaded(&ctx.alice, &filename, PAYLOAD).await;
    let component = ticket.storage_path.rsplit('/').next().unwrap();
    assert!(component.len() <= 255);
    assert!(component.starts_with(&ticket.asset_id.to_string()));
    assert!(component.ends_with(".png"));

    let asset = ctx
        .finalize(&ctx.alice, ticket.asset_id, &sha256_hex(PAYLOAD), 1)
        .await
        .unwrap();
    assert_eq!(asset.status, AssetStatus::Ready);
    assert_eq!(asset.filename, filename);
    assert_eq!(asset.storage_path, ticket.storage_path);
}
