//! PubSub stanza building and response inspection.
//!
//! Builds the IQ requests a node owner sends to a XEP-0060 service and
//! extracts what the node needs back out of the responses.

use std::str::FromStr;

use minidom::Element;
use uuid::Uuid;
use xmpp_parsers::iq::{Iq, IqType};
use xmpp_parsers::jid::Jid;
use xmpp_parsers::stanza_error::StanzaError;

use crate::error::{PubSubError, TransportError};
use crate::options::NodeOptions;

/// Main PubSub namespace (XEP-0060).
pub const NS_PUBSUB: &str = "http://jabber.org/protocol/pubsub";

/// PubSub owner namespace for node management.
pub const NS_PUBSUB_OWNER: &str = "http://jabber.org/protocol/pubsub#owner";

/// `FORM_TYPE` of the node configuration form.
pub const NS_PUBSUB_NODE_CONFIG: &str = "http://jabber.org/protocol/pubsub#node_config";

/// Service Discovery items namespace (XEP-0030).
pub const NS_DISCO_ITEMS: &str = "http://jabber.org/protocol/disco#items";

/// Data Forms namespace (XEP-0004).
pub const NS_DATA_FORMS: &str = "jabber:x:data";

/// RFC 6120 stanza error conditions.
pub const NS_XMPP_STANZAS: &str = "urn:ietf:params:xml:ns:xmpp-stanzas";

const FORM_TYPE_VAR: &str = "FORM_TYPE";

/// Fresh IQ id for an outgoing request.
pub fn new_request_id() -> String {
    format!("pubsub-{}", Uuid::new_v4())
}

/// An item payload published to a node.
///
/// The node wraps the element in `<item/>` as-is and never looks inside it.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemPayload {
    /// Optional item ID. If None, the service generates one.
    pub id: Option<String>,
    /// The item content (any XML element).
    pub content: Element,
}

impl ItemPayload {
    pub fn new(content: Element) -> Self {
        Self { id: None, content }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Build the `<item/>` element carrying this payload.
    pub fn to_element(&self) -> Element {
        let mut builder = Element::builder("item", NS_PUBSUB);

        if let Some(ref id) = self.id {
            builder = builder.attr("id", id);
        }

        builder.append(self.content.clone()).build()
    }
}

impl From<Element> for ItemPayload {
    fn from(content: Element) -> Self {
        Self::new(content)
    }
}

impl FromStr for ItemPayload {
    type Err = minidom::Error;

    fn from_str(xml: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(Element::from_str(xml.trim())?))
    }
}

/// Item element of a disco#items result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoItem {
    /// JID of the item
    pub jid: String,
    /// Optional node identifier
    pub node: Option<String>,
    /// Optional name (human-readable)
    pub name: Option<String>,
}

impl DiscoItem {
    pub fn from_element(elem: &Element) -> Self {
        Self {
            jid: elem.attr("jid").unwrap_or_default().to_string(),
            node: elem.attr("node").map(String::from),
            name: elem.attr("name").map(String::from),
        }
    }
}

fn set_iq(service: &Jid, payload: Element) -> Iq {
    Iq {
        from: None,
        to: Some(service.clone()),
        id: new_request_id(),
        payload: IqType::Set(payload),
    }
}

/// Build a disco#items query addressed to the service.
pub fn build_disco_items_query(service: &Jid) -> Iq {
    Iq {
        from: None,
        to: Some(service.clone()),
        id: new_request_id(),
        payload: IqType::Get(Element::builder("query", NS_DISCO_ITEMS).build()),
    }
}

/// Build a node creation request.
pub fn build_create_node(service: &Jid, node: &str) -> Iq {
    let pubsub = Element::builder("pubsub", NS_PUBSUB)
        .append(Element::builder("create", NS_PUBSUB).attr("node", node).build())
        .build();

    set_iq(service, pubsub)
}

/// Build an owner-scoped node deletion request.
pub fn build_delete_node(service: &Jid, node: &str) -> Iq {
    let pubsub = Element::builder("pubsub", NS_PUBSUB_OWNER)
        .append(
            Element::builder("delete", NS_PUBSUB_OWNER)
                .attr("node", node)
                .build(),
        )
        .build();

    set_iq(service, pubsub)
}

/// Build an owner-scoped configure request carrying a submitted config form.
pub fn build_configure_node(service: &Jid, node: &str, options: &NodeOptions) -> Iq {
    let pubsub = Element::builder("pubsub", NS_PUBSUB_OWNER)
        .append(
            Element::builder("configure", NS_PUBSUB_OWNER)
                .attr("node", node)
                .append(build_node_config_form(options))
                .build(),
        )
        .build();

    set_iq(service, pubsub)
}

/// Build the `submit` data form for a node configuration.
///
/// The hidden `FORM_TYPE` field always comes first, followed by one field per
/// option in iteration order.
pub fn build_node_config_form(options: &NodeOptions) -> Element {
    let mut form = Element::builder("x", NS_DATA_FORMS)
        .attr("type", "submit")
        .append(build_field_hidden(FORM_TYPE_VAR, NS_PUBSUB_NODE_CONFIG));

    for (var, value) in options.iter() {
        let mut field = Element::builder("field", NS_DATA_FORMS).attr("var", var);
        for v in value.values() {
            field = field.append(build_value(v));
        }
        form = form.append(field.build());
    }

    form.build()
}

fn build_field_hidden(var: &str, value: &str) -> Element {
    Element::builder("field", NS_DATA_FORMS)
        .attr("var", var)
        .attr("type", "hidden")
        .append(build_value(value))
        .build()
}

fn build_value(value: &str) -> Element {
    Element::builder("value", NS_DATA_FORMS)
        .append(value)
        .build()
}

/// Build a publish request wrapping the payload in a single item.
pub fn build_publish_item(service: &Jid, node: &str, item: &ItemPayload) -> Iq {
    let pubsub = Element::builder("pubsub", NS_PUBSUB)
        .append(
            Element::builder("publish", NS_PUBSUB)
                .attr("node", node)
                .append(item.to_element())
                .build(),
        )
        .build();

    set_iq(service, pubsub)
}

/// Items listed in a disco#items `<query/>`. Anything else yields no items.
pub fn parse_disco_items(query: &Element) -> Vec<DiscoItem> {
    if query.name() != "query" || query.ns() != NS_DISCO_ITEMS {
        return Vec::new();
    }

    query
        .children()
        .filter(|c| c.name() == "item" && c.ns() == NS_DISCO_ITEMS)
        .map(DiscoItem::from_element)
        .collect()
}

/// The `type` attribute of an IQ, for logging.
pub fn response_type(iq: &Iq) -> &'static str {
    match iq.payload {
        IqType::Get(_) => "get",
        IqType::Set(_) => "set",
        IqType::Result(_) => "result",
        IqType::Error(_) => "error",
    }
}

/// Turn a response into the result payload, or the error it carries.
pub fn expect_result(node: &str, response: Iq) -> Result<Option<Element>, PubSubError> {
    let kind = response_type(&response);
    match response.payload {
        IqType::Result(payload) => Ok(payload),
        IqType::Error(error) => Err(protocol_error(node, &error)),
        IqType::Get(_) | IqType::Set(_) => Err(PubSubError::UnexpectedResponse {
            node: node.to_string(),
            detail: format!("received an IQ {kind} instead of a result"),
        }),
    }
}

fn protocol_error(node: &str, error: &StanzaError) -> PubSubError {
    PubSubError::Protocol {
        node: node.to_string(),
        condition: defined_condition(error),
        text: error
            .texts
            .values()
            .find(|t| !t.is_empty())
            .cloned(),
    }
}

/// RFC 6120 defined-condition name of a stanza error, e.g. `item-not-found`.
pub fn defined_condition(error: &StanzaError) -> String {
    let element: Element = error.clone().into();
    element
        .children()
        .find(|c| c.ns() == NS_XMPP_STANZAS && c.name() != "text")
        .map(|c| c.name().to_string())
        .unwrap_or_else(|| "undefined-condition".to_string())
}

pub fn iq_to_bytes(iq: &Iq) -> Result<Vec<u8>, TransportError> {
    let element: Element = iq.clone().into();
    let mut payload = Vec::new();
    element
        .write_to(&mut payload)
        .map_err(|error| TransportError::Serialize(error.to_string()))?;
    Ok(payload)
}

pub fn iq_from_bytes(raw: &[u8]) -> Result<Iq, TransportError> {
    let xml = std::str::from_utf8(raw)
        .map_err(|error| TransportError::Parse(format!("invalid UTF-8 stanza bytes: {error}")))?
        .trim();
    if xml.is_empty() {
        return Err(TransportError::Parse("stanza payload is empty".to_string()));
    }

    let element = Element::from_str(xml)
        .map_err(|error| TransportError::Parse(format!("failed to parse stanza XML: {error}")))?;
    if element.name() != "iq" {
        return Err(TransportError::Parse(format!(
            "expected <iq/>, got <{}/>",
            element.name()
        )));
    }

    Iq::try_from(element)
        .map_err(|error| TransportError::Parse(format!("failed to parse <iq/> stanza: {error}")))
}
