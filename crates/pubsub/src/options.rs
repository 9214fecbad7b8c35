//! Node configuration options submitted through the `pubsub#node_config` form.

use std::fmt;

/// Well-known `pubsub#node_config` field names (XEP-0060 §16.4.4).
pub mod fields {
    pub const TITLE: &str = "pubsub#title";
    pub const DELIVER_NOTIFICATIONS: &str = "pubsub#deliver_notifications";
    pub const DELIVER_PAYLOADS: &str = "pubsub#deliver_payloads";
    pub const PERSIST_ITEMS: &str = "pubsub#persist_items";
    pub const MAX_ITEMS: &str = "pubsub#max_items";
    pub const ITEM_EXPIRE: &str = "pubsub#item_expire";
    pub const ACCESS_MODEL: &str = "pubsub#access_model";
    pub const ROSTER_GROUPS_ALLOWED: &str = "pubsub#roster_groups_allowed";
    pub const PUBLISH_MODEL: &str = "pubsub#publish_model";
    pub const PURGE_OFFLINE: &str = "pubsub#purge_offline";
    pub const SEND_LAST_PUBLISHED_ITEM: &str = "pubsub#send_last_published_item";
    pub const PRESENCE_BASED_DELIVERY: &str = "pubsub#presence_based_delivery";
    pub const NOTIFICATION_TYPE: &str = "pubsub#notification_type";
    pub const NOTIFY_CONFIG: &str = "pubsub#notify_config";
    pub const NOTIFY_DELETE: &str = "pubsub#notify_delete";
    pub const NOTIFY_RETRACT: &str = "pubsub#notify_retract";
    pub const NOTIFY_SUB: &str = "pubsub#notify_sub";
    pub const MAX_PAYLOAD_SIZE: &str = "pubsub#max_payload_size";
    pub const TYPE: &str = "pubsub#type";
    pub const BODY_XSLT: &str = "pubsub#body_xslt";
}

/// Value of a single form field: one value or an ordered list of values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Single(String),
    Multi(Vec<String>),
}

impl OptionValue {
    /// Values in emission order.
    pub fn values(&self) -> &[String] {
        match self {
            OptionValue::Single(value) => std::slice::from_ref(value),
            OptionValue::Multi(values) => values,
        }
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        OptionValue::Single(value)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::Single(value.to_string())
    }
}

/// Data forms encode booleans as `1`/`0` (XEP-0004 §3.3).
impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        OptionValue::Single(if value { "1" } else { "0" }.to_string())
    }
}

macro_rules! impl_from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for OptionValue {
                fn from(value: $ty) -> Self {
                    OptionValue::Single(value.to_string())
                }
            }
        )*
    };
}

impl_from_integer!(u8, u16, u32, u64, usize, i32, i64);

impl From<Vec<String>> for OptionValue {
    fn from(values: Vec<String>) -> Self {
        OptionValue::Multi(values)
    }
}

impl From<Vec<&str>> for OptionValue {
    fn from(values: Vec<&str>) -> Self {
        OptionValue::Multi(values.into_iter().map(String::from).collect())
    }
}

impl<const N: usize> From<[&str; N]> for OptionValue {
    fn from(values: [&str; N]) -> Self {
        OptionValue::Multi(values.iter().map(|v| v.to_string()).collect())
    }
}

impl From<AccessModel> for OptionValue {
    fn from(model: AccessModel) -> Self {
        OptionValue::Single(model.as_str().to_string())
    }
}

/// Ordered set of node configuration options.
///
/// Fields are emitted in insertion order. Setting a name that is already
/// present replaces its value without moving it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeOptions {
    entries: Vec<(String, OptionValue)>,
}

impl NodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn set(mut self, name: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<OptionValue>) {
        let name = name.into();
        let value = value.into();

        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for NodeOptions
where
    K: Into<String>,
    V: Into<OptionValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut options = NodeOptions::new();
        for (name, value) in iter {
            options.insert(name, value);
        }
        options
    }
}

/// `pubsub#access_model` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessModel {
    Open,
    Roster,
    Authorize,
    Whitelist,
}

impl AccessModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessModel::Open => "open",
            AccessModel::Roster => "roster",
            AccessModel::Authorize => "authorize",
            AccessModel::Whitelist => "whitelist",
        }
    }
}

impl fmt::Display for AccessModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
