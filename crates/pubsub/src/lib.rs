//! XEP-0060 PubSub node management for Waddle.
//!
//! A [`PubSubNode`] is a proxy for one node on a PubSub service. It discovers
//! whether the node exists, creates, configures and deletes it, and publishes
//! items to it. All traffic goes through an [`IqTransport`];
//! [`IqCorrelator`] implements that trait on top of an outbound stanza
//! channel for hosts that own the XMPP session themselves.

pub mod config;
pub mod correlator;
pub mod error;
pub mod node;
pub mod options;
pub mod stanzas;
pub mod transport;

pub use config::{load_config_from, load_config_from_str, PubSubConfig};
pub use correlator::{stanza_channel, IqCorrelator, StanzaReceiver, StanzaSender};
pub use error::{ConfigError, PubSubError, TransportError};
pub use node::{DeleteMode, DiscoveryPolicy, PubSubNode, PublishReceipt};
pub use options::{fields, AccessModel, NodeOptions, OptionValue};
pub use stanzas::{DiscoItem, ItemPayload};
pub use transport::{IqTransport, ResponseHandler};
