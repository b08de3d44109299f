//! Share lifecycle tests
//!
//! Drive the share service end to end over real backends: upload, link
//! issuance, owner-only revocation and resolution after revocation.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use bytes::Bytes;
use chrono::{Duration, TimeZone, Utc};
use tempfile::TempDir;

use sharelink::sharing::{
    CapabilityIssuer, CapabilitySigner, FileLedger, Ledger, MemoryLedger, RetryPolicy,
    ShareError, ShareService, ShareSettings, UploadPolicy,
};
use sharelink::store::{LocalObjectStore, MemoryObjectStore, ObjectStore};

const MB: u64 = 1024 * 1024;

fn settings(max_ttl_seconds: u64) -> ShareSettings {
    ShareSettings {
        default_ttl_seconds: max_ttl_seconds.min(3600),
        max_ttl_seconds,
        retry: RetryPolicy::new(3, StdDuration::from_millis(1)),
        ..ShareSettings::default()
    }
}

fn policy() -> UploadPolicy {
    UploadPolicy::new(
        ["pdf", "doc", "docx", "txt", "png", "jpg", "jpeg", "gif"],
        16 * MB,
    )
}

// =============================================================================
// END-TO-END SCENARIO
// =============================================================================

#[tokio::test]
async fn test_report_upload_share_and_revoke() {
    let ledger = Arc::new(MemoryLedger::new());
    let store = Arc::new(MemoryObjectStore::new());
    let signer = CapabilitySigner::new(b"scenario-secret");
    let service = ShareService::new(
        policy(),
        settings(3600),
        ledger.clone(),
        store.clone(),
        signer.clone(),
    );

    let now = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 45).unwrap();
    let data = Bytes::from(vec![7u8; (5 * MB) as usize]);

    // Upload
    let receipt = service
        .upload_at(now, "alice", "report.PDF", Some("application/pdf"), data, Some(60))
        .await
        .unwrap();
    let key = receipt.object.object_key.clone();
    assert_eq!(key, "20240115-103045-report.PDF");
    assert_eq!(receipt.object.size_bytes, 5 * MB);

    // Issue with an over-long lifetime: clamped to the maximum
    let issuer = CapabilityIssuer::new(ledger.clone(), signer);
    let issued = issuer.issue_at(now, &key, 7200, 3600).unwrap();
    assert_eq!(issued.capability.expires_at, now + Duration::seconds(3600));

    // Non-owner revoke
    assert!(matches!(
        service.revoke("mallory", &key).await,
        Err(ShareError::Forbidden { .. })
    ));
    assert!(!ledger.is_revoked(&key).unwrap());

    // Live link works
    let link = service.share("alice", &key, Some(600)).unwrap();
    let resolved = service.resolve(&link.token).await.unwrap();
    assert_eq!(resolved.data.len() as u64, 5 * MB);

    // Owner revoke
    let receipt = service.revoke("alice", &key).await.unwrap();
    assert!(receipt.object.revoked);
    assert!(!receipt.already_revoked);

    // Re-issue refused
    assert!(matches!(
        issuer.issue(&key, 60, 3600),
        Err(ShareError::Revoked(_))
    ));
    assert!(matches!(
        service.share("alice", &key, None),
        Err(ShareError::Revoked(_))
    ));

    // Unexpired link no longer resolves
    assert!(Utc::now() < link.capability.expires_at);
    assert!(matches!(
        service.resolve(&link.token).await,
        Err(ShareError::Revoked(_))
    ));

    // Second revoke is a success
    let again = service.revoke("alice", &key).await.unwrap();
    assert!(again.already_revoked);
    assert!(again.object.revoked);
}

// =============================================================================
// GATEKEEPER THROUGH THE SERVICE
// =============================================================================

#[tokio::test]
async fn test_disallowed_uploads_rejected() {
    let store = Arc::new(MemoryObjectStore::new());
    let service = ShareService::new(
        policy(),
        settings(3600),
        Arc::new(MemoryLedger::new()),
        store.clone(),
        CapabilitySigner::new(b"s"),
    );

    for name in ["payload.exe", "README", "", "archive.tar.gz"] {
        let result = service
            .upload("alice", name, None, Bytes::from_static(b"x"), None)
            .await;
        assert!(
            matches!(result, Err(ShareError::Validation(_))),
            "{} should be rejected",
            name
        );
    }

    let too_big = Bytes::from(vec![0u8; (16 * MB + 1) as usize]);
    let err = service
        .upload("alice", "big.pdf", None, too_big, None)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 413);
    assert!(store.is_empty());
}

// =============================================================================
// CONCURRENCY
// =============================================================================

#[tokio::test]
async fn test_concurrent_same_second_uploads_get_unique_keys() {
    let store = Arc::new(MemoryObjectStore::new());
    let service = Arc::new(ShareService::new(
        policy(),
        settings(3600),
        Arc::new(MemoryLedger::new()),
        store.clone(),
        CapabilitySigner::new(b"s"),
    ));
    let now = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 45).unwrap();

    let mut handles = Vec::new();
    for i in 0..6 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service
                .upload_at(
                    now,
                    &format!("user-{}", i),
                    "notes.txt",
                    None,
                    Bytes::from(format!("body {}", i)),
                    None,
                )
                .await
        }));
    }

    let mut keys = HashSet::new();
    for handle in handles {
        let receipt = handle.await.unwrap().unwrap();
        assert!(receipt.object.object_key.ends_with("notes.txt"));
        keys.insert(receipt.object.object_key);
    }
    assert_eq!(keys.len(), 6);
    assert_eq!(store.len(), 6);
}

#[tokio::test]
async fn test_concurrent_revokes_settle_once() {
    let ledger = Arc::new(MemoryLedger::new());
    let service = Arc::new(ShareService::new(
        policy(),
        settings(3600),
        ledger.clone(),
        Arc::new(MemoryObjectStore::new()),
        CapabilitySigner::new(b"s"),
    ));
    let key = service
        .upload("alice", "a.txt", None, Bytes::from_static(b"x"), None)
        .await
        .unwrap()
        .object
        .object_key;

    let mut handles = Vec::new();
    for _ in 0..4 {
        let service = service.clone();
        let key = key.clone();
        handles.push(tokio::spawn(async move { service.revoke("alice", &key).await }));
    }

    let mut first_revocations = 0;
    let mut revoked_at = HashSet::new();
    for handle in handles {
        let receipt = handle.await.unwrap().unwrap();
        if !receipt.already_revoked {
            first_revocations += 1;
        }
        revoked_at.insert(receipt.object.revoked_at);
    }
    assert_eq!(first_revocations, 1);
    assert_eq!(revoked_at.len(), 1);
    assert!(ledger.is_revoked(&key).unwrap());
}

// =============================================================================
// DURABLE BACKENDS
// =============================================================================

#[tokio::test]
async fn test_revocation_survives_restart() {
    let dir = TempDir::new().unwrap();
    let ledger_path = dir.path().join("ledger.json");
    let store_root = dir.path().join("objects");

    let build = || -> ShareService {
        let ledger = Arc::new(FileLedger::open(&ledger_path).unwrap());
        let store = Arc::new(LocalObjectStore::new(
            store_root.clone(),
            "http://localhost:8080",
            b"store-secret",
        ));
        ShareService::new(policy(), settings(3600), ledger, store, CapabilitySigner::new(b"cap"))
    };

    let service = build();
    let receipt = service
        .upload("alice", "plan.docx", None, Bytes::from_static(b"PK..."), Some(3600))
        .await
        .unwrap();
    let key = receipt.object.object_key.clone();
    assert_eq!(
        service.resolve(&receipt.token).await.unwrap().data,
        Bytes::from_static(b"PK...")
    );
    service.revoke("alice", &key).await.unwrap();
    drop(service);

    // Same ledger file, same store root, fresh process state
    let service = build();
    assert!(matches!(
        service.resolve(&receipt.token).await,
        Err(ShareError::Revoked(_))
    ));
    let listed = service.list("alice").unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].revoked);

    // Bytes stay in the store; only access is withdrawn
    let store = LocalObjectStore::new(store_root.clone(), "http://localhost:8080", b"store-secret");
    assert_eq!(store.head(&key).await.unwrap().size, 5);
}

#[tokio::test]
async fn test_long_filename_stores_on_disk() {
    let dir = TempDir::new().unwrap();
    let store_root = dir.path().join("objects");
    let store = Arc::new(LocalObjectStore::new(
        store_root.clone(),
        "http://localhost:8080",
        b"store-secret",
    ));
    let service = ShareService::new(
        policy(),
        settings(3600),
        Arc::new(MemoryLedger::new()),
        store.clone(),
        CapabilitySigner::new(b"cap"),
    );

    let name = format!("{}.txt", "a".repeat(232));
    let receipt = service
        .upload("alice", &name, Some("text/plain"), Bytes::from_static(b"long"), None)
        .await
        .unwrap();

    let key = &receipt.object.object_key;
    assert!(key.ends_with(".txt"));
    assert!(key.len() < 255);
    assert_eq!(receipt.object.original_filename, name);
    assert_eq!(store.get(key).await.unwrap(), Bytes::from_static(b"long"));
    assert_eq!(std::fs::read_dir(store_root.join("objects")).unwrap().count(), 1);
}
