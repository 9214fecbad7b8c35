//! Full node lifecycle through `IqCorrelator` and a fake service task reading
//! the outbound wire.

mod common;

use std::sync::{Arc, Weak};
use std::time::Duration;

use common::{fixture, init_tracing, service_jid, FakeService, DEFAULT_TIMEOUT, NODE};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_test::{assert_err, assert_ok};
use waddle_pubsub::stanzas::{iq_from_bytes, iq_to_bytes, response_type};
use waddle_pubsub::{
    fields, load_config_from_str, stanza_channel, DeleteMode, IqCorrelator, ItemPayload,
    NodeOptions, PubSubError, PubSubNode, StanzaReceiver, TransportError,
};

/// Answer every request on the wire from `service` until the wire closes.
///
/// Holds the correlator weakly so dropping the test's handle closes the wire.
/// Returns how many responses completed a pending request.
fn spawn_service(
    service: Arc<FakeService>,
    correlator: &Arc<IqCorrelator>,
    mut wire: StanzaReceiver,
) -> JoinHandle<usize> {
    let correlator: Weak<IqCorrelator> = Arc::downgrade(correlator);
    tokio::spawn(async move {
        let mut answered = 0;
        while let Some(raw) = wire.recv().await {
            let request = iq_from_bytes(&raw).expect("client sends valid IQs");
            let response = iq_to_bytes(&service.answer(&request)).expect("serializable reply");
            let Some(correlator) = correlator.upgrade() else {
                continue;
            };
            if correlator.handle_inbound(&response) {
                answered += 1;
            }
        }
        answered
    })
}

#[tokio::test]
async fn node_lifecycle_over_correlated_session() {
    init_tracing();
    let (tx, rx) = stanza_channel(16);
    let correlator = Arc::new(IqCorrelator::new(tx, DEFAULT_TIMEOUT));
    let service = Arc::new(FakeService::default());
    let responder = spawn_service(service.clone(), &correlator, rx);

    let mut node = PubSubNode::new(correlator.clone(), service_jid(), NODE);

    assert_eq!(assert_ok!(node.get().await), None);
    assert!(assert_ok!(node.create().await).is_some());

    let options = NodeOptions::new()
        .set(fields::MAX_ITEMS, 100u32)
        .set(fields::PERSIST_ITEMS, true);
    assert_ok!(node.configure(&options).await);

    let receipt = assert_ok!(node.publish(ItemPayload::new(fixture("hypervisor-entry"))).await);
    let response = assert_ok!(assert_ok!(timeout(DEFAULT_TIMEOUT, receipt).await));
    assert_eq!(response_type(&response), "result");
    assert_eq!(service.published().len(), 1);

    assert_ok!(node.delete(DeleteMode::WaitForAck).await);
    assert!(!node.is_resolved());
    assert!(service.nodes().is_empty());
    assert_eq!(correlator.pending_count(), 0);

    drop(node);
    drop(correlator);
    // get, create, get, configure, publish, delete
    assert_eq!(assert_ok!(responder.await), 6);
}

#[tokio::test]
async fn fire_and_forget_delete_leaves_nothing_pending() {
    init_tracing();
    let (tx, rx) = stanza_channel(16);
    let correlator = Arc::new(IqCorrelator::new(tx, DEFAULT_TIMEOUT));
    let service = Arc::new(FakeService::with_nodes(&[NODE]));
    let responder = spawn_service(service.clone(), &correlator, rx);

    let mut node = PubSubNode::new(correlator.clone(), service_jid(), NODE);
    assert_ok!(node.get().await);
    assert_ok!(node.delete(DeleteMode::NoWait).await);

    drop(node);
    drop(correlator);
    // The delete response arrives but nothing is waiting for it.
    assert_eq!(assert_ok!(responder.await), 1);
    assert!(service.nodes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn silent_service_times_out_under_strict_policy() {
    init_tracing();
    let config = assert_ok!(load_config_from_str(
        r#"
[service]
jid = "pubsub.example.org"

[transport]
request_timeout_seconds = 2

[discovery]
policy = "strict"
"#
    ));

    let (tx, _rx) = stanza_channel(16);
    let correlator = Arc::new(IqCorrelator::new(tx, config.request_timeout()));
    let mut node = PubSubNode::new(correlator.clone(), assert_ok!(config.service_jid()), NODE)
        .with_discovery_policy(config.discovery_policy());

    let error = assert_err!(node.get().await);

    assert!(matches!(
        error,
        PubSubError::Transport(TransportError::Timeout(d)) if d == Duration::from_secs(2)
    ));
    assert_eq!(correlator.pending_count(), 0);
}

#[tokio::test]
async fn closed_wire_fails_publish() {
    init_tracing();
    let (tx, rx) = stanza_channel(16);
    let correlator = Arc::new(IqCorrelator::new(tx, DEFAULT_TIMEOUT));
    let service = Arc::new(FakeService::with_nodes(&[NODE]));
    let responder = spawn_service(service, &correlator, rx);

    let mut node = PubSubNode::new(correlator.clone(), service_jid(), NODE);
    assert_ok!(node.get().await);

    responder.abort();
    let _ = responder.await;

    let entry = ItemPayload::new(fixture("hypervisor-entry"));
    let error = assert_err!(node.add_item(entry, None).await);
    assert!(matches!(
        error,
        PubSubError::Transport(TransportError::WireClosed)
    ));
    assert_eq!(correlator.pending_count(), 0);
}
