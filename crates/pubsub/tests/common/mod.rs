//! Shared helpers for PubSub integration tests.
//!
//! [`FakeService`] plays a minimal XEP-0060 service that keeps its node list in
//! memory. [`ScriptedTransport`] puts it behind [`IqTransport`] directly and
//! records every call, so tests can check which path an operation took.

#![allow(dead_code)]

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use minidom::Element;
use waddle_pubsub::stanzas::{NS_DISCO_ITEMS, NS_PUBSUB};
use waddle_pubsub::{IqTransport, ResponseHandler, TransportError};
use xmpp_parsers::iq::{Iq, IqType};
use xmpp_parsers::jid::Jid;
use xmpp_parsers::stanza_error::{DefinedCondition, ErrorType, StanzaError};

pub const SERVICE: &str = "pubsub.example.org";

pub const NODE: &str = "archipel:hypervisors";

/// Default timeout for test operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("waddle_pubsub=debug")
            .with_test_writer()
            .try_init();
    });
}

pub fn service_jid() -> Jid {
    SERVICE.parse().expect("valid service JID")
}

pub fn fixture(name: &str) -> Element {
    let raw = match name {
        "disco-items" => include_str!("../fixtures/disco-items.xml"),
        "hypervisor-entry" => include_str!("../fixtures/hypervisor-entry.xml"),
        other => panic!("unknown fixture {other}"),
    };
    Element::from_str(raw.trim()).expect("fixture should be valid XML")
}

pub fn reply(request: &Iq, payload: IqType) -> Iq {
    Iq {
        from: request.to.clone(),
        to: None,
        id: request.id.clone(),
        payload,
    }
}

pub fn error_reply(request: &Iq, condition: DefinedCondition) -> Iq {
    reply(
        request,
        IqType::Error(StanzaError::new(
            ErrorType::Cancel,
            condition,
            "en",
            "rejected by fake service",
        )),
    )
}

/// In-memory PubSub service answering disco#items and node owner requests.
#[derive(Default)]
pub struct FakeService {
    nodes: Mutex<Vec<String>>,
    published: Mutex<Vec<Element>>,
}

impl FakeService {
    pub fn with_nodes(nodes: &[&str]) -> Self {
        Self {
            nodes: Mutex::new(nodes.iter().map(|n| n.to_string()).collect()),
            ..Default::default()
        }
    }

    /// Seed the node list from a disco#items listing.
    pub fn from_listing(listing: &Element) -> Self {
        let nodes = listing
            .children()
            .filter_map(|item| item.attr("node"))
            .map(String::from)
            .collect();
        Self {
            nodes: Mutex::new(nodes),
            ..Default::default()
        }
    }

    pub fn nodes(&self) -> Vec<String> {
        self.nodes.lock().unwrap().clone()
    }

    /// `<item/>` elements received through publish requests, in order.
    pub fn published(&self) -> Vec<Element> {
        self.published.lock().unwrap().clone()
    }

    pub fn answer(&self, request: &Iq) -> Iq {
        match &request.payload {
            IqType::Get(query) if query.name() == "query" && query.ns() == NS_DISCO_ITEMS => {
                let mut listing = Element::builder("query", NS_DISCO_ITEMS);
                for node in self.nodes() {
                    listing = listing.append(
                        Element::builder("item", NS_DISCO_ITEMS)
                            .attr("jid", SERVICE)
                            .attr("node", node)
                            .build(),
                    );
                }
                reply(request, IqType::Result(Some(listing.build())))
            }
            IqType::Set(pubsub) => self.answer_set(request, pubsub),
            _ => error_reply(request, DefinedCondition::FeatureNotImplemented),
        }
    }

    fn answer_set(&self, request: &Iq, pubsub: &Element) -> Iq {
        let Some(action) = pubsub.children().next() else {
            return error_reply(request, DefinedCondition::BadRequest);
        };
        let node = action.attr("node").unwrap_or_default().to_string();

        let outcome = {
            let mut nodes = self.nodes.lock().unwrap();
            let exists = nodes.contains(&node);
            match (action.name(), exists) {
                ("create", true) => Err(DefinedCondition::Conflict),
                ("create", false) => {
                    nodes.push(node);
                    Ok(())
                }
                ("delete", true) => {
                    nodes.retain(|n| *n != node);
                    Ok(())
                }
                ("configure", true) => Ok(()),
                ("publish", true) => {
                    if let Some(item) = action.get_child("item", NS_PUBSUB) {
                        self.published.lock().unwrap().push(item.clone());
                    }
                    Ok(())
                }
                ("delete" | "configure" | "publish", false) => Err(DefinedCondition::ItemNotFound),
                _ => Err(DefinedCondition::BadRequest),
            }
        };

        match outcome {
            Ok(()) => reply(request, IqType::Result(None)),
            Err(condition) => error_reply(request, condition),
        }
    }
}

/// Which [`IqTransport`] method carried a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    SendAndWait,
    Send,
    SendWithContinuation,
}

/// Transport answering straight from a [`FakeService`].
///
/// Blocking requests are answered immediately. Requests sent with a
/// continuation stay queued until [`deliver_continuations`] runs, so tests
/// control when non-blocking responses arrive.
///
/// [`deliver_continuations`]: ScriptedTransport::deliver_continuations
pub struct ScriptedTransport {
    pub service: FakeService,
    calls: Mutex<Vec<(Method, Iq)>>,
    continuations: Mutex<Vec<(Iq, ResponseHandler)>>,
    disconnected: AtomicBool,
}

impl ScriptedTransport {
    pub fn new(service: FakeService) -> Arc<Self> {
        Arc::new(Self {
            service,
            calls: Mutex::new(Vec::new()),
            continuations: Mutex::new(Vec::new()),
            disconnected: AtomicBool::new(false),
        })
    }

    /// Fail every following blocking request with `Disconnected`.
    pub fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }

    pub fn reconnect(&self) {
        self.disconnected.store(false, Ordering::SeqCst);
    }

    pub fn methods(&self) -> Vec<Method> {
        self.calls.lock().unwrap().iter().map(|(m, _)| *m).collect()
    }

    pub fn requests(&self) -> Vec<Iq> {
        self.calls.lock().unwrap().iter().map(|(_, iq)| iq.clone()).collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn queued_continuations(&self) -> usize {
        self.continuations.lock().unwrap().len()
    }

    /// Answer every queued non-blocking request and run its continuation.
    pub fn deliver_continuations(&self) -> usize {
        let queued: Vec<_> = self.continuations.lock().unwrap().drain(..).collect();
        let count = queued.len();
        for (request, handler) in queued {
            handler(self.service.answer(&request));
        }
        count
    }

    fn record(&self, method: Method, request: &Iq) {
        self.calls.lock().unwrap().push((method, request.clone()));
    }
}

impl IqTransport for ScriptedTransport {
    async fn send_and_wait(&self, request: Iq) -> Result<Iq, TransportError> {
        self.record(Method::SendAndWait, &request);
        if self.disconnected.load(Ordering::SeqCst) {
            return Err(TransportError::Disconnected);
        }
        Ok(self.service.answer(&request))
    }

    async fn send(&self, request: Iq) -> Result<(), TransportError> {
        self.record(Method::Send, &request);
        self.service.answer(&request);
        Ok(())
    }

    async fn send_with_continuation(
        &self,
        request: Iq,
        on_response: ResponseHandler,
    ) -> Result<(), TransportError> {
        self.record(Method::SendWithContinuation, &request);
        self.continuations
            .lock()
            .unwrap()
            .push((request, on_response));
        Ok(())
    }
}
