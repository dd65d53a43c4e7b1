// tests/integration/control_test.rs

//! Control-plane client tests: registration, domain resolution (including
//! the short-TTL local snapshot), and the heartbeat round trip.

use super::fixtures::EdgeHarness;
use opaledge::core::OpalEdgeError;
use opaledge::core::tasks::heartbeat::HeartbeatTask;

#[tokio::test]
async fn test_registration_assigns_the_edge_identity() {
    let edge = EdgeHarness::new().await;
    assert_eq!(edge.state.identity.id, "edge-test-1");
}

#[tokio::test]
async fn test_domain_resolution_uses_the_local_snapshot() {
    let edge = EdgeHarness::new().await;

    let first = edge.state.control.resolve_domain("test.example.com").await.unwrap();
    assert_eq!(first.id, "dom-1");
    assert!(first.is_active());

    let second = edge.state.control.resolve_domain("test.example.com").await.unwrap();
    assert_eq!(second.id, "dom-1");

    // The second resolve was served locally, within the snapshot TTL.
    assert_eq!(edge.control.resolve_count("test.example.com"), 1);
}

#[tokio::test]
async fn test_unknown_domain_resolves_to_not_configured() {
    let edge = EdgeHarness::new().await;

    let result = edge.state.control.resolve_domain("nope.example.com").await;
    assert!(matches!(result, Err(OpalEdgeError::DomainNotConfigured(_))));
}

#[tokio::test]
async fn test_resolve_by_id_round_trip() {
    let edge = EdgeHarness::new().await;

    let config = edge.state.control.resolve_domain_by_id("dom-2").await.unwrap();
    assert_eq!(config.domain, "inactive.example.com");
    assert!(!config.is_active());

    let missing = edge.state.control.resolve_domain_by_id("dom-missing").await;
    assert!(matches!(missing, Err(OpalEdgeError::ControlPlane(_))));
}

#[tokio::test]
async fn test_heartbeat_reaches_the_control_plane() {
    let edge = EdgeHarness::new().await;

    let heartbeat = HeartbeatTask::new(edge.state.clone());
    heartbeat.send_heartbeat().await;
    heartbeat.send_heartbeat().await;

    assert_eq!(edge.control.heartbeat_count(), 2);
}
