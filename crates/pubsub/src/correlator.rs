//! IQ request/response correlation over an outbound stanza channel.
//!
//! [`IqCorrelator`] writes serialized requests to the session's wire channel
//! and keeps every request that expects an answer in a pending table keyed by
//! IQ id. The session's read loop hands inbound stanzas to
//! [`IqCorrelator::handle_inbound`], which completes the matching request.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use xmpp_parsers::iq::{Iq, IqType};
use xmpp_parsers::jid::Jid;

use crate::error::TransportError;
use crate::stanzas::{iq_from_bytes, iq_to_bytes, new_request_id, response_type};
use crate::transport::{IqTransport, ResponseHandler};

pub type StanzaSender = mpsc::Sender<Vec<u8>>;

pub type StanzaReceiver = mpsc::Receiver<Vec<u8>>;

pub fn stanza_channel(buffer: usize) -> (StanzaSender, StanzaReceiver) {
    mpsc::channel(buffer)
}

enum Completion {
    Waiter(oneshot::Sender<Iq>),
    Continuation(ResponseHandler),
}

struct Pending {
    /// The request's `to`; responses must come from the same address.
    peer: Option<Jid>,
    completion: Completion,
}

impl Pending {
    fn accepts(&self, from: Option<&Jid>) -> bool {
        match &self.peer {
            Some(peer) => from == Some(peer),
            // Addressed to our own server, whose address the correlator does
            // not know; only the id can be checked.
            None => true,
        }
    }
}

type PendingMap = Mutex<HashMap<String, Pending>>;

/// Unregisters a pending request on drop unless disarmed.
struct PendingGuard<'a> {
    pending: &'a PendingMap,
    id: String,
    armed: bool,
}

impl PendingGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            lock(self.pending).remove(&self.id);
        }
    }
}

fn lock(pending: &PendingMap) -> MutexGuard<'_, HashMap<String, Pending>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct IqCorrelator {
    wire_sender: StanzaSender,
    pending: PendingMap,
    request_timeout: Duration,
}

impl IqCorrelator {
    pub fn new(wire_sender: StanzaSender, request_timeout: Duration) -> Self {
        Self {
            wire_sender,
            pending: Mutex::new(HashMap::new()),
            request_timeout,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Number of requests still waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.pending().len()
    }

    /// Route an inbound stanza. Returns `true` when it completed a pending
    /// request, `false` when the caller should route it elsewhere.
    pub fn handle_inbound(&self, stanza: &[u8]) -> bool {
        match iq_from_bytes(stanza) {
            Ok(iq) => self.handle_response(iq),
            Err(_) => false,
        }
    }

    /// Complete the pending request matching this IQ's id, if any.
    ///
    /// A response whose `from` differs from the request's `to` is left for
    /// the caller and the request stays pending.
    pub fn handle_response(&self, iq: Iq) -> bool {
        if !matches!(iq.payload, IqType::Result(_) | IqType::Error(_)) {
            return false;
        }

        // The lock is released before the handler runs so it may issue
        // further requests.
        let completion = {
            let mut pending = self.pending();
            match pending.get(&iq.id) {
                None => {
                    debug!(id = %iq.id, "no pending request for IQ response");
                    return false;
                }
                Some(entry) if !entry.accepts(iq.from.as_ref()) => {
                    warn!(
                        id = %iq.id,
                        from = ?iq.from,
                        expected = ?entry.peer,
                        "ignoring IQ response from unexpected sender"
                    );
                    return false;
                }
                Some(_) => {}
            }
            match pending.remove(&iq.id) {
                Some(entry) => entry.completion,
                None => return false,
            }
        };

        debug!(id = %iq.id, kind = response_type(&iq), "correlated IQ response");
        match completion {
            Completion::Waiter(waiter) => {
                if waiter.send(iq).is_err() {
                    debug!("IQ waiter dropped before its response arrived");
                }
            }
            Completion::Continuation(handler) => handler(iq),
        }
        true
    }

    /// Drop every pending request after the session went away.
    ///
    /// Blocked callers observe [`TransportError::Disconnected`]; continuations
    /// are discarded without being invoked.
    pub fn fail_pending(&self) -> usize {
        let drained: Vec<_> = self.pending().drain().collect();
        if !drained.is_empty() {
            warn!(count = drained.len(), "dropping pending IQ requests");
        }
        drained.len()
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<String, Pending>> {
        lock(&self.pending)
    }

    fn prepare(
        &self,
        mut request: Iq,
    ) -> Result<(String, Option<Jid>, Vec<u8>), TransportError> {
        if request.id.is_empty() {
            request.id = new_request_id();
        }
        let bytes = iq_to_bytes(&request)?;
        Ok((request.id, request.to, bytes))
    }

    async fn write(&self, bytes: Vec<u8>) -> Result<(), TransportError> {
        self.wire_sender
            .send(bytes)
            .await
            .map_err(|_| TransportError::WireClosed)
    }

    /// Register a pending request. The entry is removed again when the
    /// returned guard drops, unless it is disarmed first.
    fn register(&self, id: String, pending: Pending) -> PendingGuard<'_> {
        self.pending().insert(id.clone(), pending);
        PendingGuard {
            pending: &self.pending,
            id,
            armed: true,
        }
    }
}

impl IqTransport for IqCorrelator {
    async fn send_and_wait(&self, request: Iq) -> Result<Iq, TransportError> {
        let (id, peer, bytes) = self.prepare(request)?;
        let (tx, rx) = oneshot::channel();
        let pending = Pending {
            peer,
            completion: Completion::Waiter(tx),
        };
        // Armed until the response arrives, so a failed write, a timeout or
        // the caller dropping this future all unregister the request.
        let mut guard = self.register(id, pending);

        self.write(bytes).await?;

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => {
                guard.disarm();
                Ok(response)
            }
            Ok(Err(_)) => Err(TransportError::Disconnected),
            Err(_) => Err(TransportError::Timeout(self.request_timeout)),
        }
    }

    async fn send(&self, request: Iq) -> Result<(), TransportError> {
        let (_, _, bytes) = self.prepare(request)?;
        self.write(bytes).await
    }

    async fn send_with_continuation(
        &self,
        request: Iq,
        on_response: ResponseHandler,
    ) -> Result<(), TransportError> {
        let (id, peer, bytes) = self.prepare(request)?;
        let pending = Pending {
            peer,
            completion: Completion::Continuation(on_response),
        };
        let mut guard = self.register(id, pending);
        self.write(bytes).await?;
        guard.disarm();
        Ok(())
    }
}
