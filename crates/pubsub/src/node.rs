//! Client-side proxy for a single XEP-0060 node.
//!
//! A [`PubSubNode`] is bound to one (service, node name) pair and remembers
//! whether the service has confirmed that the node exists. Creation,
//! configuration and deletion are blocking IQ exchanges; publishing goes
//! through the transport's non-blocking path and completes via a one-shot
//! continuation.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use minidom::Element;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use xmpp_parsers::iq::Iq;
use xmpp_parsers::jid::Jid;

use crate::error::{PubSubError, TransportError};
use crate::options::NodeOptions;
use crate::stanzas::{
    build_configure_node, build_create_node, build_delete_node, build_disco_items_query,
    build_publish_item, expect_result, parse_disco_items, response_type, DiscoItem, ItemPayload,
};
use crate::transport::{IqTransport, ResponseHandler};

/// How `delete` waits for the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteMode {
    /// Hand the request to the transport and return. The node stays resolved
    /// since nothing confirms the deletion.
    NoWait,
    /// Wait for the service's answer and mark the node unresolved on success.
    WaitForAck,
}

/// What discovery does when the disco#items exchange fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiscoveryPolicy {
    /// Log the failure and return the last known descriptor.
    #[default]
    Lenient,
    /// Lenient until this many consecutive failures, which are then
    /// returned as errors. A successful exchange resets the count.
    SurfaceAfter(u32),
    /// Return every failure as an error.
    Strict,
}

pub struct PubSubNode<T: IqTransport> {
    transport: Arc<T>,
    service: Jid,
    name: String,
    descriptor: Option<DiscoItem>,
    discovery_policy: DiscoveryPolicy,
    discovery_failures: u32,
}

impl<T: IqTransport> PubSubNode<T> {
    pub fn new(transport: Arc<T>, service: Jid, name: impl Into<String>) -> Self {
        Self {
            transport,
            service,
            name: name.into(),
            descriptor: None,
            discovery_policy: DiscoveryPolicy::default(),
            discovery_failures: 0,
        }
    }

    pub fn with_discovery_policy(mut self, policy: DiscoveryPolicy) -> Self {
        self.discovery_policy = policy;
        self
    }

    pub fn service(&self) -> &Jid {
        &self.service
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The disco item confirming the node exists, without asking the service.
    pub fn descriptor(&self) -> Option<&DiscoItem> {
        self.descriptor.as_ref()
    }

    pub fn is_resolved(&self) -> bool {
        self.descriptor.is_some()
    }

    /// Forget the resolved descriptor so the next `get` asks the service again.
    pub fn invalidate(&mut self) {
        self.descriptor = None;
    }

    /// Resolve the node against the service's disco#items listing.
    ///
    /// Memoized: once resolved, no request is sent. Returns `Ok(None)` when the
    /// service does not list the node. Failures follow the node's
    /// [`DiscoveryPolicy`].
    pub async fn get(&mut self) -> Result<Option<DiscoItem>, PubSubError> {
        if let Some(descriptor) = &self.descriptor {
            return Ok(Some(descriptor.clone()));
        }

        match self.discover().await {
            Ok(found) => {
                self.discovery_failures = 0;
                match found {
                    Some(item) => {
                        info!(node = %self.name, service = %self.service, "recovered pubsub node");
                        self.descriptor = Some(item);
                    }
                    None => {
                        debug!(
                            node = %self.name,
                            service = %self.service,
                            "pubsub node not listed by service"
                        );
                    }
                }
                Ok(self.descriptor.clone())
            }
            Err(e) => {
                self.discovery_failures = self.discovery_failures.saturating_add(1);
                error!(
                    node = %self.name,
                    service = %self.service,
                    failures = self.discovery_failures,
                    error = %e,
                    "can't get pubsub node"
                );

                if self.should_surface_discovery_failure() {
                    Err(e)
                } else {
                    Ok(self.descriptor.clone())
                }
            }
        }
    }

    /// Create the node, then resolve it from the service's listing.
    ///
    /// Returns the descriptor discovery found afterwards; `None` means the
    /// service accepted the creation but does not list the node (yet).
    pub async fn create(&mut self) -> Result<Option<DiscoItem>, PubSubError> {
        info!(node = %self.name, "trying to create pubsub node");

        if self.descriptor.is_some() {
            return Err(PubSubError::AlreadyExists {
                node: self.name.clone(),
            });
        }

        let request = build_create_node(&self.service, &self.name);
        if let Err(e) = self.exchange(request).await {
            error!(node = %self.name, error = %e, "unable to create pubsub node");
            return Err(e);
        }
        info!(node = %self.name, "pubsub node has been created");

        let descriptor = self.get().await?;
        if descriptor.is_none() {
            warn!(node = %self.name, "created pubsub node is not listed by the service");
        }
        Ok(descriptor)
    }

    /// Delete the node from the service.
    pub async fn delete(&mut self, mode: DeleteMode) -> Result<(), PubSubError> {
        self.ensure_resolved()?;

        let request = build_delete_node(&self.service, &self.name);
        match mode {
            DeleteMode::NoWait => {
                if let Err(e) = self.transport.send(request).await {
                    error!(node = %self.name, error = %e, "unable to delete pubsub node");
                    return Err(e.into());
                }
                debug!(node = %self.name, "pubsub node deletion sent");
                Ok(())
            }
            DeleteMode::WaitForAck => match self.exchange(request).await {
                Ok(_) => {
                    info!(node = %self.name, "pubsub node has been deleted");
                    self.descriptor = None;
                    Ok(())
                }
                Err(e) => {
                    error!(node = %self.name, error = %e, "can't delete pubsub node");
                    Err(e)
                }
            },
        }
    }

    /// Submit a node configuration form.
    ///
    /// Option names and values are sent as given; nothing is checked against
    /// the service's configuration schema.
    pub async fn configure(&self, options: &NodeOptions) -> Result<(), PubSubError> {
        self.ensure_resolved()?;

        let request = build_configure_node(&self.service, &self.name, options);
        match self.exchange(request).await {
            Ok(_) => {
                info!(node = %self.name, fields = options.len(), "pubsub node has been configured");
                Ok(())
            }
            Err(e) => {
                error!(node = %self.name, error = %e, "can't configure pubsub node");
                Err(e)
            }
        }
    }

    /// Publish a payload as a new item without waiting for the service.
    ///
    /// Returns once the request is handed to the transport. When the response
    /// arrives, `continuation` (if any) receives it as-is, including error
    /// responses.
    pub async fn add_item(
        &self,
        payload: ItemPayload,
        continuation: Option<ResponseHandler>,
    ) -> Result<(), PubSubError> {
        self.ensure_resolved()?;

        let request = build_publish_item(&self.service, &self.name, &payload);
        let node = self.name.clone();
        let on_response: ResponseHandler = Box::new(move |response: Iq| {
            debug!(node = %node, kind = response_type(&response), "publish done");
            if let Some(continuation) = continuation {
                continuation(response);
            }
        });

        if let Err(e) = self
            .transport
            .send_with_continuation(request, on_response)
            .await
        {
            error!(node = %self.name, error = %e, "unable to publish pubsub item");
            return Err(e.into());
        }
        Ok(())
    }

    /// [`add_item`](Self::add_item) with the response delivered through a
    /// future instead of a callback.
    pub async fn publish(&self, payload: ItemPayload) -> Result<PublishReceipt, PubSubError> {
        let (tx, rx) = oneshot::channel();
        let continuation: ResponseHandler = Box::new(move |response: Iq| {
            let _ = tx.send(response);
        });

        self.add_item(payload, Some(continuation)).await?;
        Ok(PublishReceipt { rx })
    }

    async fn discover(&self) -> Result<Option<DiscoItem>, PubSubError> {
        let query = self
            .exchange(build_disco_items_query(&self.service))
            .await?;

        Ok(query
            .as_ref()
            .map(parse_disco_items)
            .unwrap_or_default()
            .into_iter()
            .find(|item| item.node.as_deref() == Some(self.name.as_str())))
    }

    async fn exchange(&self, request: Iq) -> Result<Option<Element>, PubSubError> {
        let response = self.transport.send_and_wait(request).await?;
        expect_result(&self.name, response)
    }

    fn ensure_resolved(&self) -> Result<(), PubSubError> {
        if self.descriptor.is_none() {
            return Err(PubSubError::NotFound {
                node: self.name.clone(),
            });
        }
        Ok(())
    }

    fn should_surface_discovery_failure(&self) -> bool {
        match self.discovery_policy {
            DiscoveryPolicy::Lenient => false,
            DiscoveryPolicy::SurfaceAfter(limit) => self.discovery_failures >= limit.max(1),
            DiscoveryPolicy::Strict => true,
        }
    }
}

/// Pending response to a [`PubSubNode::publish`] call.
///
/// Resolves once with the service's response, or with
/// [`TransportError::Disconnected`] if the transport dropped the request.
#[derive(Debug)]
pub struct PublishReceipt {
    rx: oneshot::Receiver<Iq>,
}

impl Future for PublishReceipt {
    type Output = Result<Iq, TransportError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.map_err(|_| TransportError::Disconnected))
    }
}
