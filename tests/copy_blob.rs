//! End-to-end copy-blob scenarios against the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use url::Url;

use blobcopy::channel::memory::MemoryStore;
use blobcopy::config::TransferConfig;
use blobcopy::copy::{
    CopyArgs, CopyChannels, CopyInput, CopyOptions, CopyOrchestrator, CopyOutcome,
};
use blobcopy::errors::{CopyError, NameKind};
use blobcopy::model::CopyStatus;
use blobcopy::transfer::memory::MemoryCopyStarter;
use blobcopy::transfer::queue::QueuedTransferEngine;

const CONTENT: &str = "hello world";

async fn store() -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    store.create_account("acct");
    store.create_container("acct", "src").await.unwrap();
    store.create_container("acct", "dst").await.unwrap();
    store
        .put_blob("acct", "src", "a.txt", Bytes::from(CONTENT))
        .await
        .unwrap();
    store
}

fn transfer_config() -> TransferConfig {
    TransferConfig {
        concurrency: 2,
        queue_depth: 8,
        accept_timeout_seconds: 5,
        request_timeout_seconds: 5,
    }
}

fn orchestrator(store: &Arc<MemoryStore>, dest_context: Option<&str>) -> CopyOrchestrator {
    let channels = CopyChannels::open(store, "acct", dest_context).unwrap();
    let starter = Arc::new(MemoryCopyStarter::new(Arc::clone(store)));
    let engine = Arc::new(QueuedTransferEngine::start(starter, &transfer_config()));
    CopyOrchestrator::new(channels, engine)
}

fn names_args(dest_blob: Option<&str>) -> CopyArgs {
    CopyArgs {
        src_container: Some("src".into()),
        src_blob: Some("a.txt".into()),
        dest_container: Some("dst".into()),
        dest_blob: dest_blob.map(|s| s.to_string()),
        ..Default::default()
    }
}

async fn run(orchestrator: &CopyOrchestrator, args: CopyArgs) -> Result<CopyOutcome, CopyError> {
    let input = args.into_input()?;
    orchestrator
        .copy_blob(input, CopyOptions::default(), &CancellationToken::new())
        .await
}

#[tokio::test]
async fn test_copy_by_names_produces_destination_record() {
    let store = store().await;
    let orchestrator = orchestrator(&store, None);

    let outcome = run(&orchestrator, names_args(None)).await.unwrap();
    let record = match outcome {
        CopyOutcome::Copied(record) => record,
        other => panic!("expected copied, got {other:?}"),
    };
    assert_eq!(record.container, "dst");
    assert_eq!(record.name, "a.txt");
    assert_eq!(record.size, CONTENT.len() as u64);
    assert_eq!(record.copy_status, Some(CopyStatus::Success));
    assert_eq!(record.context, "acct");
    assert_eq!(
        store.read_blob("acct", "dst", "a.txt").await,
        Some(Bytes::from(CONTENT))
    );

    // The copy gets its own ETag.
    let source = orchestrator
        .channels()
        .source
        .fetch_properties(&orchestrator.channels().source.resolve_container("src").blob("a.txt"))
        .await
        .unwrap();
    assert_ne!(record.etag, source.etag);
}

#[tokio::test]
async fn test_copy_with_explicit_destination_name() {
    let store = store().await;
    let orchestrator = orchestrator(&store, None);
    match run(&orchestrator, names_args(Some("b.txt"))).await.unwrap() {
        CopyOutcome::Copied(record) => assert_eq!(record.name, "b.txt"),
        other => panic!("expected copied, got {other:?}"),
    }
    assert!(store.read_blob("acct", "dst", "a.txt").await.is_none());
}

#[tokio::test]
async fn test_lagging_destination_reports_pending() {
    let store = store().await;
    store.set_visibility_lag(Duration::from_secs(60));
    let orchestrator = orchestrator(&store, None);

    match run(&orchestrator, names_args(None)).await.unwrap() {
        CopyOutcome::Pending(pending) => {
            assert_eq!(
                pending.to_string(),
                "Copy destination blob pending: a.txt in dst"
            );
            assert!(pending.copy_id.is_some());
        }
        other => panic!("expected pending, got {other:?}"),
    }
}

#[tokio::test]
async fn test_uri_without_dest_blob_fails_before_any_request() {
    let store = store().await;
    let orchestrator = orchestrator(&store, None);
    let args = CopyArgs {
        src_uri: Some(Url::parse("memory://acct/src/a.txt").unwrap()),
        dest_container: Some("dst".into()),
        ..Default::default()
    };
    match run(&orchestrator, args).await {
        Err(CopyError::Configuration { message }) => {
            assert!(message.contains("dest-blob"), "{message}")
        }
        other => panic!("expected configuration error, got {other:?}"),
    }
    assert_eq!(store.request_count(), 0);
}

#[tokio::test]
async fn test_copy_from_uri() {
    let store = store().await;
    let orchestrator = orchestrator(&store, None);
    let args = CopyArgs {
        src_uri: Some(Url::parse("memory://acct/src/a.txt").unwrap()),
        dest_container: Some("dst".into()),
        dest_blob: Some("from-uri.txt".into()),
        ..Default::default()
    };
    assert!(matches!(
        run(&orchestrator, args).await.unwrap(),
        CopyOutcome::Copied(_)
    ));
    // One start-copy and one destination probe plus its property fetch.
    assert_eq!(store.request_count(), 3);
}

#[tokio::test]
async fn test_ambiguous_shapes_fail_without_io() {
    let store = store().await;
    let orchestrator = orchestrator(&store, None);
    let args = CopyArgs {
        src_uri: Some(Url::parse("memory://acct/src/a.txt").unwrap()),
        dest_blob: Some("b.txt".into()),
        ..names_args(None)
    };
    let err = run(&orchestrator, args).await.unwrap_err();
    assert_eq!(err.code(), "ConfigurationError");
    assert_eq!(err.exit_code(), 2);
    assert_eq!(store.request_count(), 0);
}

#[tokio::test]
async fn test_missing_source_is_not_found_and_not_submitted() {
    let store = store().await;
    let orchestrator = orchestrator(&store, None);
    let args = CopyArgs {
        src_blob: Some("missing.txt".into()),
        ..names_args(None)
    };
    match run(&orchestrator, args).await {
        Err(CopyError::ResourceNotFound { container, blob }) => {
            assert_eq!(container, "src");
            assert_eq!(blob, "missing.txt");
        }
        other => panic!("expected not found, got {other:?}"),
    }
    // Only the source lookup.
    assert_eq!(store.request_count(), 1);
    assert!(store.read_blob("acct", "dst", "missing.txt").await.is_none());
}

#[tokio::test]
async fn test_invalid_container_names_are_rejected_before_submission() {
    let store = store().await;
    let orchestrator = orchestrator(&store, None);

    for bad in ["ab", "Dst", "a--b"] {
        let args = CopyArgs {
            dest_container: Some(bad.to_string()),
            ..names_args(None)
        };
        match run(&orchestrator, args).await {
            Err(CopyError::InvalidName { kind, name, .. }) => {
                assert_eq!(kind, NameKind::Container);
                assert_eq!(name, bad);
            }
            other => panic!("expected invalid name for {bad}, got {other:?}"),
        }
    }
    assert_eq!(store.request_count(), 0);
}

#[tokio::test]
async fn test_rejected_copy_surfaces_reason() {
    let store = store().await;
    let orchestrator = orchestrator(&store, None);
    let args = CopyArgs {
        dest_container: Some("nowhere".into()),
        ..names_args(None)
    };
    match run(&orchestrator, args).await {
        Err(CopyError::TransferRejected {
            container, reason, ..
        }) => {
            assert_eq!(container, "nowhere");
            assert!(reason.starts_with("ContainerNotFound"), "{reason}");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_destination_context_copies_across_accounts() {
    let store = store().await;
    store.create_account("backup");
    store.create_container("backup", "dst").await.unwrap();
    let orchestrator = orchestrator(&store, Some("backup"));

    match run(&orchestrator, names_args(None)).await.unwrap() {
        CopyOutcome::Copied(record) => {
            assert_eq!(record.context, "backup");
            assert_eq!(record.uri, "memory://backup/dst/a.txt");
        }
        other => panic!("expected copied, got {other:?}"),
    }
    assert!(store.read_blob("backup", "dst", "a.txt").await.is_some());
    assert!(store.read_blob("acct", "dst", "a.txt").await.is_none());
}

#[tokio::test]
async fn test_blob_pair_copies_between_references() {
    let store = store().await;
    let orchestrator = orchestrator(&store, None);
    let args = CopyArgs {
        src_ref: Some(Url::parse("memory://acct/src/a.txt").unwrap()),
        dest_ref: Some(Url::parse("memory://acct/dst/pair.txt").unwrap()),
        ..Default::default()
    };
    match run(&orchestrator, args).await.unwrap() {
        CopyOutcome::Copied(record) => assert_eq!(record.name, "pair.txt"),
        other => panic!("expected copied, got {other:?}"),
    }
}

#[tokio::test]
async fn test_blob_pair_destination_on_other_account_is_configuration_error() {
    let store = store().await;
    store.create_account("backup");
    let orchestrator = orchestrator(&store, None);
    let args = CopyArgs {
        src_ref: Some(Url::parse("memory://acct/src/a.txt").unwrap()),
        dest_ref: Some(Url::parse("memory://backup/dst/pair.txt").unwrap()),
        ..Default::default()
    };
    let err = run(&orchestrator, args).await.unwrap_err();
    assert!(matches!(err, CopyError::Configuration { .. }));
    assert_eq!(store.request_count(), 0);
}

#[tokio::test]
async fn test_blob_pair_destination_with_trailing_slash_is_invalid() {
    let store = store().await;
    let orchestrator = orchestrator(&store, None);
    let args = CopyArgs {
        src_ref: Some(Url::parse("memory://acct/src/a.txt").unwrap()),
        dest_ref: Some(Url::parse("memory://acct/dst/b.txt/").unwrap()),
        ..Default::default()
    };
    match run(&orchestrator, args).await {
        Err(CopyError::InvalidName { kind, name, .. }) => {
            assert_eq!(kind, NameKind::Blob);
            assert_eq!(name, "b.txt/");
        }
        other => panic!("expected invalid name, got {other:?}"),
    }
    assert_eq!(store.request_count(), 0);
    assert!(store.read_blob("acct", "dst", "b.txt").await.is_none());
}

#[tokio::test]
async fn test_source_ref_with_sas_points_to_src_uri() {
    let store = store().await;
    let orchestrator = orchestrator(&store, None);
    let args = CopyArgs {
        src_ref: Some(Url::parse("memory://acct/src/a.txt?sv=1&sig=abc").unwrap()),
        dest_container: Some("dst".into()),
        ..Default::default()
    };
    match run(&orchestrator, args).await {
        Err(CopyError::Configuration { message }) => {
            assert!(message.contains("src-uri"), "{message}")
        }
        other => panic!("expected configuration error, got {other:?}"),
    }
    assert_eq!(store.request_count(), 0);
}

#[tokio::test]
async fn test_source_container_reference_shape() {
    let store = store().await;
    let orchestrator = orchestrator(&store, None);
    let args = CopyArgs {
        src_container_ref: Some(Url::parse("memory://acct/src").unwrap()),
        src_blob: Some("a.txt".into()),
        dest_container: Some("dst".into()),
        dest_blob: Some("via-container.txt".into()),
        ..Default::default()
    };
    assert!(matches!(
        run(&orchestrator, args).await.unwrap(),
        CopyOutcome::Copied(_)
    ));
    assert!(store
        .read_blob("acct", "dst", "via-container.txt")
        .await
        .is_some());
}

#[tokio::test]
async fn test_cancelled_before_acceptance() {
    let store = store().await;
    let orchestrator = orchestrator(&store, None);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let input = CopyInput::Names {
        src_container: "src".into(),
        src_blob: "a.txt".into(),
        dest_container: "dst".into(),
        dest_blob: None,
    };
    let err = orchestrator
        .copy_blob(input, CopyOptions { force: true }, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, CopyError::Cancelled { .. }));
    assert_eq!(err.exit_code(), 130);
    assert!(store.read_blob("acct", "dst", "a.txt").await.is_none());
}

#[tokio::test]
async fn test_unknown_context_is_channel_error() {
    let store = store().await;
    match CopyChannels::open(&store, "acct", Some("ghost")) {
        Err(err) => {
            assert_eq!(err.code(), "ChannelError");
            assert_eq!(err.exit_code(), 5);
        }
        Ok(_) => panic!("expected channel error"),
    }
}
