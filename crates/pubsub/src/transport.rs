use std::future::Future;

use xmpp_parsers::iq::Iq;

use crate::error::TransportError;

/// One-shot completion handler for a non-blocking request.
///
/// Runs on the transport's inbound dispatch context with the correlated
/// response, whatever its type.
pub type ResponseHandler = Box<dyn FnOnce(Iq) + Send + 'static>;

/// IQ exchange primitives a PubSub node needs from the XMPP session.
///
/// Session setup, authentication and stream negotiation live behind this
/// trait. [`IqCorrelator`](crate::IqCorrelator) is the bundled implementation.
pub trait IqTransport: Send + Sync + 'static {
    /// Send a request and wait for the response with the same IQ id.
    fn send_and_wait(&self, request: Iq) -> impl Future<Output = Result<Iq, TransportError>> + Send;

    /// Send a request without tracking any response.
    fn send(&self, request: Iq) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Send a request and return once it is on its way. `on_response` is
    /// invoked exactly once if a correlated response arrives.
    fn send_with_continuation(
        &self,
        request: Iq,
        on_response: ResponseHandler,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}
