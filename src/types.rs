//! Core value types: delivery kinds, channel keys, and the event envelope
//!
//! A channel is identified by `(DeliveryKind, tag)` — not by event type,
//! because one channel fans out to handlers with different declared types.
//! Events travel as a closed [`Payload`] envelope; a handler's declared type
//! is a [`TypeTag`] and compatibility is exact variant-tag equality.

use serde::{Deserialize, Serialize};

/// Tag used when a caller supplies none
pub const DEFAULT_TAG: &str = "default";

/// Delivery semantics of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeliveryKind {
    /// Fire-and-forget — no buffer; events with no attached handler are lost
    Publish,
    /// Full-history buffer — late binders receive everything, in push order
    Replay,
    /// Latest-value cache — late binders receive only the most recent value
    Behavior,
}

/// Routing identity for a channel: `(kind, tag)`
///
/// Equality and hash are value-based on kind and tag only. Immutable once
/// constructed; construction never fails.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelKey {
    /// Delivery semantics for this channel
    pub kind: DeliveryKind,

    /// Routing tag (e.g., "orders", "session")
    pub tag: String,
}

impl ChannelKey {
    /// Create a key for the given kind and tag
    pub fn new(kind: DeliveryKind, tag: impl Into<String>) -> Self {
        Self {
            kind,
            tag: tag.into(),
        }
    }

    /// Create a key for the given kind with the default tag
    pub fn with_default_tag(kind: DeliveryKind) -> Self {
        Self::new(kind, DEFAULT_TAG)
    }
}

impl std::fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}/{}", self.kind, self.tag)
    }
}

/// The event envelope — a closed tagged union of everything a channel carries
///
/// Replaces runtime type tests: a handler declares the [`TypeTag`] it accepts
/// and only payloads of that exact variant reach it. Boxed and primitive
/// numerics of the same logical kind are the same variant; numerics of
/// different widths are distinct variants and never coerced. Structured
/// application events travel as [`Payload::Json`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "value")]
pub enum Payload {
    /// Boolean event
    Bool(bool),
    /// Character event
    Char(char),
    /// 8-bit signed integer event
    I8(i8),
    /// 16-bit signed integer event
    I16(i16),
    /// 32-bit signed integer event
    I32(i32),
    /// 64-bit signed integer event
    I64(i64),
    /// 32-bit float event
    F32(f32),
    /// 64-bit float event
    F64(f64),
    /// String event
    Str(String),
    /// Structured event — arbitrary JSON data
    Json(serde_json::Value),
}

impl Payload {
    /// The variant tag of this payload
    pub fn tag(&self) -> TypeTag {
        match self {
            Payload::Bool(_) => TypeTag::Bool,
            Payload::Char(_) => TypeTag::Char,
            Payload::I8(_) => TypeTag::I8,
            Payload::I16(_) => TypeTag::I16,
            Payload::I32(_) => TypeTag::I32,
            Payload::I64(_) => TypeTag::I64,
            Payload::F32(_) => TypeTag::F32,
            Payload::F64(_) => TypeTag::F64,
            Payload::Str(_) => TypeTag::Str,
            Payload::Json(_) => TypeTag::Json,
        }
    }

    /// Borrow the string value, if this is a string payload
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Payload::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The i32 value, if this is an i32 payload
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Payload::I32(v) => Some(*v),
            _ => None,
        }
    }

    /// Borrow the JSON value, if this is a structured payload
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Payload::Json(v) => Some(v),
            _ => None,
        }
    }
}

/// Declared parameter type of a bound method — the unit mirror of [`Payload`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TypeTag {
    /// Accepts boolean events
    Bool,
    /// Accepts character events
    Char,
    /// Accepts 8-bit signed integer events
    I8,
    /// Accepts 16-bit signed integer events
    I16,
    /// Accepts 32-bit signed integer events
    I32,
    /// Accepts 64-bit signed integer events
    I64,
    /// Accepts 32-bit float events
    F32,
    /// Accepts 64-bit float events
    F64,
    /// Accepts string events
    Str,
    /// Accepts structured JSON events
    Json,
}

impl From<bool> for Payload {
    fn from(v: bool) -> Self {
        Payload::Bool(v)
    }
}

impl From<char> for Payload {
    fn from(v: char) -> Self {
        Payload::Char(v)
    }
}

impl From<i8> for Payload {
    fn from(v: i8) -> Self {
        Payload::I8(v)
    }
}

impl From<i16> for Payload {
    fn from(v: i16) -> Self {
        Payload::I16(v)
    }
}

impl From<i32> for Payload {
    fn from(v: i32) -> Self {
        Payload::I32(v)
    }
}

impl From<i64> for Payload {
    fn from(v: i64) -> Self {
        Payload::I64(v)
    }
}

impl From<f32> for Payload {
    fn from(v: f32) -> Self {
        Payload::F32(v)
    }
}

impl From<f64> for Payload {
    fn from(v: f64) -> Self {
        Payload::F64(v)
    }
}

impl From<&str> for Payload {
    fn from(v: &str) -> Self {
        Payload::Str(v.to_string())
    }
}

impl From<String> for Payload {
    fn from(v: String) -> Self {
        Payload::Str(v)
    }
}

impl From<serde_json::Value> for Payload {
    fn from(v: serde_json::Value) -> Self {
        Payload::Json(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn hash_of<T: Hash>(value: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_key_equality_is_kind_and_tag_only() {
        let a = ChannelKey::new(DeliveryKind::Publish, "orders");
        let b = ChannelKey::new(DeliveryKind::Publish, "orders");
        let c = ChannelKey::new(DeliveryKind::Replay, "orders");
        let d = ChannelKey::new(DeliveryKind::Publish, "sessions");

        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn test_default_tag() {
        let key = ChannelKey::with_default_tag(DeliveryKind::Behavior);
        assert_eq!(key.tag, DEFAULT_TAG);
        assert_eq!(key, ChannelKey::new(DeliveryKind::Behavior, "default"));
    }

    #[test]
    fn test_payload_tags() {
        assert_eq!(Payload::from(true).tag(), TypeTag::Bool);
        assert_eq!(Payload::from('x').tag(), TypeTag::Char);
        assert_eq!(Payload::from(42i32).tag(), TypeTag::I32);
        assert_eq!(Payload::from(42i64).tag(), TypeTag::I64);
        assert_eq!(Payload::from(1.5f64).tag(), TypeTag::F64);
        assert_eq!(Payload::from("hello").tag(), TypeTag::Str);
        assert_eq!(
            Payload::from(serde_json::json!({"a": 1})).tag(),
            TypeTag::Json
        );
    }

    #[test]
    fn test_numeric_widths_are_distinct_tags() {
        // i32 vs i64 must never be treated as compatible
        assert_ne!(Payload::from(1i32).tag(), Payload::from(1i64).tag());
        assert_ne!(Payload::from(1.0f32).tag(), Payload::from(1.0f64).tag());
    }

    #[test]
    fn test_payload_accessors() {
        assert_eq!(Payload::from("hi").as_str(), Some("hi"));
        assert_eq!(Payload::from(7i32).as_i32(), Some(7));
        assert_eq!(Payload::from(7i32).as_str(), None);

        let json = Payload::from(serde_json::json!({"rate": 7.35}));
        assert_eq!(json.as_json().unwrap()["rate"], 7.35);
    }

    #[test]
    fn test_payload_serialization_roundtrip() {
        let payload = Payload::Str("hello".to_string());
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"type\":\"str\""));
        assert!(json.contains("\"value\":\"hello\""));

        let parsed: Payload = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, payload);
    }

    #[test]
    fn test_key_serialization_roundtrip() {
        let key = ChannelKey::new(DeliveryKind::Replay, "audit");
        let json = serde_json::to_string(&key).unwrap();
        assert!(json.contains("\"kind\":\"replay\""));
        assert!(json.contains("\"tag\":\"audit\""));

        let parsed: ChannelKey = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn test_key_display() {
        let key = ChannelKey::new(DeliveryKind::Publish, "orders");
        assert_eq!(key.to_string(), "Publish/orders");
    }
}
