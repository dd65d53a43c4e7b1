// tests/integration/purge_test.rs

//! End-to-end purge tests: direct purge application and the background
//! worker's pull/apply/acknowledge cycle.

use super::fixtures::EdgeHarness;
use opaledge::core::control::PurgeTask;
use opaledge::core::proxy::purge::purge;
use opaledge::core::tasks::purge_worker::PurgeWorkerTask;

const TEST_HOST: &str = "test.example.com";

#[tokio::test]
async fn test_purge_removes_a_cached_entry() {
    let edge = EdgeHarness::new().await;

    edge.get("/hello", TEST_HOST).await;
    let hit = edge.get("/hello", TEST_HOST).await;
    assert_eq!(hit.headers().get("x-cache-status").unwrap(), "HIT");

    purge(&edge.state, TEST_HOST, &["/hello".to_string()])
        .await
        .unwrap();

    let after = edge.get("/hello", TEST_HOST).await;
    assert_eq!(
        after.headers().get("x-cache-status").unwrap(),
        "MISS",
        "purged entry must be refetched"
    );
    assert_eq!(edge.origin.hits("GET /hello"), 2);
}

#[tokio::test]
async fn test_purge_is_idempotent() {
    let edge = EdgeHarness::new().await;

    edge.get("/hello", TEST_HOST).await;
    let paths = vec!["/hello".to_string()];

    purge(&edge.state, TEST_HOST, &paths).await.unwrap();
    // Purging already-missing keys is a no-op, not an error.
    purge(&edge.state, TEST_HOST, &paths).await.unwrap();

    let after = edge.get("/hello", TEST_HOST).await;
    assert_eq!(after.headers().get("x-cache-status").unwrap(), "MISS");
}

#[tokio::test]
async fn test_purge_worker_applies_and_acknowledges() {
    let edge = EdgeHarness::new().await;

    edge.get("/hello", TEST_HOST).await;
    let hit = edge.get("/hello", TEST_HOST).await;
    assert_eq!(hit.headers().get("x-cache-status").unwrap(), "HIT");

    edge.control.queue_purge(PurgeTask {
        id: "purge-1".to_string(),
        domain_id: "dom-1".to_string(),
        paths: vec!["/hello".to_string()],
    });

    let worker = PurgeWorkerTask::new(edge.state.clone());
    worker.run_cycle().await;

    assert_eq!(edge.control.completed_purges(), vec!["purge-1".to_string()]);

    let after = edge.get("/hello", TEST_HOST).await;
    assert_eq!(after.headers().get("x-cache-status").unwrap(), "MISS");
}

#[tokio::test]
async fn test_purge_worker_skips_tasks_with_unknown_domains() {
    let edge = EdgeHarness::new().await;

    edge.control.queue_purge(PurgeTask {
        id: "purge-unknown".to_string(),
        domain_id: "dom-does-not-exist".to_string(),
        paths: vec!["/hello".to_string()],
    });
    edge.control.queue_purge(PurgeTask {
        id: "purge-good".to_string(),
        domain_id: "dom-1".to_string(),
        paths: vec!["/hello".to_string()],
    });

    let worker = PurgeWorkerTask::new(edge.state.clone());
    worker.run_cycle().await;

    // The failing task is left unacknowledged for redelivery; the healthy
    // one in the same batch still completes.
    assert_eq!(edge.control.completed_purges(), vec!["purge-good".to_string()]);
}
