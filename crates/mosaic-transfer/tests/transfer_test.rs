/// End-to-end tests for the transfer registry: chunk admission, reassembly,
/// retention and the event stream, driven the way the HTTP binding drives it.

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use rand::seq::SliceRandom;
use tokio::sync::broadcast;

use mosaic_transfer::{
    BroadcastPublisher, ChunkHasher, Fingerprint, NullPublisher, RegistryConfig, SessionDescriptor,
    SessionStatus, TransferError, TransferEvent, TransferRegistry,
};

fn setup(retention: usize) -> (TransferRegistry, broadcast::Receiver<TransferEvent>) {
    let publisher = Arc::new(BroadcastPublisher::new(4096));
    let rx = publisher.subscribe();
    let config = RegistryConfig {
        retention,
        ..RegistryConfig::default()
    };
    (TransferRegistry::new(config, publisher), rx)
}

/// Split `data` into `chunk_size` pieces with their fingerprints.
fn split(data: &[u8], chunk_size: usize) -> Vec<(Bytes, Fingerprint)> {
    data.chunks(chunk_size)
        .map(|c| (Bytes::copy_from_slice(c), ChunkHasher::fingerprint(c)))
        .collect()
}

/// Test payload with a known pattern.
fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn drain(rx: &mut broadcast::Receiver<TransferEvent>) -> Vec<TransferEvent> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

async fn send_all(registry: &TransferRegistry, id: &str, chunks: &[(Bytes, Fingerprint)]) {
    for (i, (data, hash)) in chunks.iter().enumerate() {
        registry
            .submit_chunk(id, i as u32, data.clone(), hash)
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn scenario_a_out_of_order_delivery() {
    let (registry, mut rx) = setup(10);
    registry
        .init(SessionDescriptor::new("f1", "three.bin", 9, 3).with_mime_type("text/plain"))
        .await
        .unwrap();

    let chunks: [&'static [u8]; 3] = [b"000", b"111", b"222"];
    for index in [2u32, 0, 1] {
        let data = chunks[index as usize];
        registry
            .submit_chunk("f1", index, Bytes::from_static(data), &ChunkHasher::fingerprint(data))
            .await
            .unwrap();
    }

    let artifact = registry.get_artifact("f1").await.unwrap();
    assert_eq!(artifact.payload.as_ref(), b"000111222");
    assert_eq!(artifact.content_hash, ChunkHasher::fingerprint(b"000111222"));
    assert_eq!(artifact.mime_type, "text/plain");
    assert!(registry.list_sessions().await.is_empty());

    let events = drain(&mut rx);
    let accepted: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            TransferEvent::ChunkAccepted { index, .. } => Some(*index),
            _ => None,
        })
        .collect();
    assert_eq!(accepted, vec![2, 0, 1]);
    assert!(matches!(events.last(), Some(TransferEvent::ReconstructionCompleted { .. })));
}

#[tokio::test]
async fn scenario_b_hash_mismatch_is_retriable() {
    let (registry, _rx) = setup(10);
    registry.init(SessionDescriptor::new("f1", "b.bin", 8, 2)).await.unwrap();

    let data = Bytes::from_static(b"good");
    let wrong = ChunkHasher::fingerprint(b"evil");
    let err = registry.submit_chunk("f1", 0, data.clone(), &wrong).await.unwrap_err();
    assert!(matches!(err, TransferError::HashMismatch { index: 0, .. }));
    assert_eq!(registry.progress("f1").await.unwrap().received_chunks, 0);

    let progress = registry
        .submit_chunk("f1", 0, data.clone(), &ChunkHasher::fingerprint(&data))
        .await
        .unwrap();
    assert_eq!(progress.received_chunks, 1);
}

#[tokio::test]
async fn scenario_c_out_of_range() {
    let (registry, _rx) = setup(10);
    registry.init(SessionDescriptor::new("f1", "c.bin", 3, 3)).await.unwrap();

    let err = registry
        .submit_chunk("f1", 5, Bytes::from_static(b"x"), &ChunkHasher::fingerprint(b"x"))
        .await
        .unwrap_err();
    assert_eq!(err, TransferError::OutOfRange { index: 5, total: 3 });

    let sessions = registry.list_sessions().await;
    assert_eq!(sessions[0].received_chunks, 0);
    assert!(sessions[0].received_indices.is_empty());
}

#[tokio::test]
async fn scenario_d_unknown_session() {
    let (registry, _rx) = setup(10);
    let err = registry
        .submit_chunk("ghost", 0, Bytes::from_static(b"x"), &ChunkHasher::fingerprint(b"x"))
        .await
        .unwrap_err();
    assert_eq!(err, TransferError::NotFound("ghost".into()));
}

#[tokio::test]
async fn scenario_e_reset_clears_everything() {
    let (registry, mut rx) = setup(10);
    let data = pattern(100);

    registry.init(SessionDescriptor::new("done", "d.bin", 100, 4)).await.unwrap();
    send_all(&registry, "done", &split(&data, 25)).await;
    registry.init(SessionDescriptor::new("open", "o.bin", 100, 4)).await.unwrap();

    assert_eq!(registry.list_artifacts().await.len(), 1);
    assert_eq!(registry.list_sessions().await.len(), 1);
    drain(&mut rx);

    registry.reset().await.unwrap();
    assert!(registry.list_artifacts().await.is_empty());
    assert!(registry.list_sessions().await.is_empty());
    assert_eq!(drain(&mut rx), vec![TransferEvent::RegistryReset]);
}

#[tokio::test]
async fn any_delivery_order_reassembles_in_index_order() {
    let data = pattern(10_000);
    let chunks = split(&data, 333);
    let mut order: Vec<usize> = (0..chunks.len()).collect();
    let mut rng = rand::rng();

    for round in 0..20 {
        order.shuffle(&mut rng);
        let (registry, _rx) = setup(10);
        let id = format!("perm-{round}");
        registry
            .init(SessionDescriptor::new(&id, "p.bin", data.len() as u64, chunks.len() as u32))
            .await
            .unwrap();

        for &i in &order {
            let (bytes, hash) = &chunks[i];
            registry.submit_chunk(&id, i as u32, bytes.clone(), hash).await.unwrap();
        }

        let artifact = registry.get_artifact(&id).await.unwrap();
        assert_eq!(artifact.payload.as_ref(), data.as_slice(), "order {:?}", order);
        assert_eq!(artifact.content_hash, ChunkHasher::fingerprint(&data));
    }
}

#[tokio::test]
async fn redelivery_is_idempotent() {
    let (registry, _rx) = setup(10);
    let chunks = split(&pattern(30), 10);
    registry.init(SessionDescriptor::new("f1", "i.bin", 30, 3)).await.unwrap();

    let (data, hash) = &chunks[1];
    for _ in 0..5 {
        let p = registry.submit_chunk("f1", 1, data.clone(), hash).await.unwrap();
        assert_eq!(p.received_chunks, 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submissions_complete_exactly_once() {
    let (registry, mut rx) = setup(10);
    let data = pattern(64 * 1024);
    let chunks = split(&data, 1024);
    let total = chunks.len() as u32;
    registry
        .init(SessionDescriptor::new("hot", "hot.bin", data.len() as u64, total))
        .await
        .unwrap();

    // Every chunk is sent twice from independent tasks.
    let mut tasks = Vec::new();
    for _ in 0..2 {
        for (i, (bytes, hash)) in chunks.iter().cloned().enumerate() {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                registry.submit_chunk("hot", i as u32, bytes, &hash).await
            }));
        }
    }

    let mut completions = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(p) if p.status == SessionStatus::Completed => completions += 1,
            Ok(_) => {}
            // A straggler copy can land after the session has been retired
            Err(TransferError::NotFound(_)) | Err(TransferError::InvalidState { .. }) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(completions, 1);

    let events = drain(&mut rx);
    let accepted = events
        .iter()
        .filter(|e| matches!(e, TransferEvent::ChunkAccepted { .. }))
        .count();
    let completed = events
        .iter()
        .filter(|e| matches!(e, TransferEvent::ReconstructionCompleted { .. }))
        .count();
    assert_eq!(accepted, total as usize);
    assert_eq!(completed, 1);

    let artifact = registry.get_artifact("hot").await.unwrap();
    assert_eq!(artifact.payload.as_ref(), data.as_slice());
}

/// Registry with one two-chunk session "f1" whose chunk 0 is stored.
async fn one_chunk_short() -> TransferRegistry {
    let registry = TransferRegistry::new(RegistryConfig::default(), Arc::new(NullPublisher));
    registry
        .init(SessionDescriptor::new("f1", "first.bin", 4, 2))
        .await
        .unwrap();
    registry
        .submit_chunk("f1", 0, Bytes::from_static(b"ab"), &ChunkHasher::fingerprint(b"ab"))
        .await
        .unwrap();
    registry
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn completion_racing_reinit_keeps_artifact() {
    for round in 0..500 {
        let registry = one_chunk_short().await;

        let last = tokio::spawn({
            let registry = registry.clone();
            async move {
                let hash = ChunkHasher::fingerprint(b"cd");
                registry.submit_chunk("f1", 1, Bytes::from_static(b"cd"), &hash).await
            }
        });
        let reinit = tokio::spawn({
            let registry = registry.clone();
            async move {
                registry
                    .init(SessionDescriptor::new("f1", "second.bin", 4, 2))
                    .await
            }
        });

        let progress = last.await.unwrap().unwrap();
        assert_eq!(progress.status, SessionStatus::Completed, "round {round}");

        let artifact = registry.get_artifact("f1").await.unwrap();
        assert_eq!(artifact.name, "first.bin", "round {round}");
        assert_eq!(artifact.payload.as_ref(), b"abcd");

        match reinit.await.unwrap() {
            Ok(_) => {
                let sessions = registry.list_sessions().await;
                assert_eq!(sessions.len(), 1);
                assert_eq!(sessions[0].name, "second.bin");
                assert_eq!(sessions[0].status, SessionStatus::Receiving);
            }
            Err(e) => assert_eq!(e, TransferError::AlreadyExists("f1".into()), "round {round}"),
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn completion_racing_eviction_is_one_or_the_other() {
    for round in 0..500 {
        let registry = one_chunk_short().await;

        let last = tokio::spawn({
            let registry = registry.clone();
            async move {
                let hash = ChunkHasher::fingerprint(b"cd");
                registry.submit_chunk("f1", 1, Bytes::from_static(b"cd"), &hash).await
            }
        });
        let evict = tokio::spawn({
            let registry = registry.clone();
            async move {
                registry
                    .evict_idle_since(Utc::now() + chrono::Duration::hours(1))
                    .await
            }
        });

        let submitted = last.await.unwrap();
        let evicted = evict.await.unwrap();
        match submitted {
            Ok(progress) => {
                assert_eq!(progress.status, SessionStatus::Completed, "round {round}");
                assert!(evicted.is_empty(), "round {round}");
                assert!(registry.get_artifact("f1").await.is_ok());
            }
            Err(e) => {
                assert_eq!(e, TransferError::NotFound("f1".into()), "round {round}");
                assert_eq!(evicted, vec!["f1".to_string()]);
                assert_eq!(registry.artifact_count().await, 0);
            }
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_sessions_are_independent() {
    let (registry, _rx) = setup(16);
    let mut tasks = Vec::new();
    for n in 0..8u32 {
        let registry = registry.clone();
        tasks.push(tokio::spawn(async move {
            let id = format!("s{n}");
            let data = pattern(500 + n as usize * 37);
            let chunks = split(&data, 64);
            registry
                .init(SessionDescriptor::new(&id, "x.bin", data.len() as u64, chunks.len() as u32))
                .await
                .unwrap();
            send_all(&registry, &id, &chunks).await;
            (id, data)
        }));
    }

    for task in tasks {
        let (id, data) = task.await.unwrap();
        let artifact = registry.get_artifact(&id).await.unwrap();
        assert_eq!(artifact.payload.as_ref(), data.as_slice());
    }
    assert_eq!(registry.artifact_count().await, 8);
}

#[tokio::test]
async fn retention_keeps_most_recent_ten() {
    let (registry, _rx) = setup(10);
    for n in 0..13 {
        let id = format!("file-{n}");
        registry.init(SessionDescriptor::new(&id, "r.bin", 4, 1)).await.unwrap();
        send_all(&registry, &id, &split(b"data", 4)).await;
        assert!(registry.artifact_count().await <= 10);
    }

    let ids: Vec<String> = registry.list_artifacts().await.into_iter().map(|a| a.id).collect();
    let expected: Vec<String> = (3..13).rev().map(|n| format!("file-{n}")).collect();
    assert_eq!(ids, expected);
    assert!(matches!(
        registry.get_artifact("file-0").await,
        Err(TransferError::NotFound(_))
    ));
}

#[tokio::test]
async fn errors_stay_local_to_their_session() {
    let (registry, _rx) = setup(10);
    registry.init(SessionDescriptor::new("a", "a.bin", 4, 2)).await.unwrap();
    registry.init(SessionDescriptor::new("b", "b.bin", 4, 2)).await.unwrap();

    let bad = ChunkHasher::fingerprint(b"nope");
    assert!(registry.submit_chunk("a", 0, Bytes::from_static(b"ab"), &bad).await.is_err());
    assert!(registry.submit_chunk("a", 9, Bytes::from_static(b"ab"), &bad).await.is_err());

    send_all(&registry, "b", &split(b"wxyz", 2)).await;
    assert_eq!(registry.get_artifact("b").await.unwrap().payload.as_ref(), b"wxyz");

    let sessions = registry.list_sessions().await;
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].id, "a");
    assert_eq!(sessions[0].status, SessionStatus::Receiving);
}

#[tokio::test]
async fn completed_id_can_be_reused() {
    let (registry, _rx) = setup(10);
    registry.init(SessionDescriptor::new("f1", "v1.bin", 2, 1)).await.unwrap();
    send_all(&registry, "f1", &split(b"v1", 2)).await;

    registry.init(SessionDescriptor::new("f1", "v2.bin", 2, 1)).await.unwrap();
    send_all(&registry, "f1", &split(b"v2", 2)).await;

    // Most recent artifact wins the lookup
    let artifact = registry.get_artifact("f1").await.unwrap();
    assert_eq!(artifact.name, "v2.bin");
    assert_eq!(registry.artifact_count().await, 2);
}

#[tokio::test]
async fn idle_sessions_are_evicted() {
    let (registry, mut rx) = setup(10);
    registry.init(SessionDescriptor::new("stale", "s.bin", 4, 2)).await.unwrap();
    drain(&mut rx);

    // Nothing is older than a cutoff in the past
    let past = Utc::now() - chrono::Duration::hours(1);
    assert!(registry.evict_idle_since(past).await.is_empty());

    let future = Utc::now() + chrono::Duration::seconds(1);
    assert_eq!(registry.evict_idle_since(future).await, vec!["stale".to_string()]);
    assert!(registry.list_sessions().await.is_empty());

    match drain(&mut rx).as_slice() {
        [TransferEvent::SessionExpired { id, received_chunks, total_chunks, .. }] => {
            assert_eq!(id, "stale");
            assert_eq!((*received_chunks, *total_chunks), (0, 2));
        }
        other => panic!("unexpected events: {:?}", other),
    }
}

#[tokio::test]
async fn configured_idle_timeout() {
    let config = RegistryConfig {
        retention: 10,
        idle_timeout: Some(std::time::Duration::from_millis(10)),
    };
    let registry = TransferRegistry::new(config, Arc::new(NullPublisher));
    registry.init(SessionDescriptor::new("slow", "s.bin", 4, 2)).await.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(registry.evict_idle().await, vec!["slow".to_string()]);
}
