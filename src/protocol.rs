//! Datapoints, protocol verbs, and the codec/transport seams.
//!
//! The frame codec (encryption, framing, checksums) and the socket that carries
//! frames live outside this crate. They are consumed through [`FrameCodec`]
//! and [`Transport`].

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::io;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::Display;

use crate::errors::Error;

type Result<T> = std::result::Result<T, Error>;

/// Value of a single datapoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DpValue {
    Bool(bool),
    Integer(i64),
    Text(String),
}

impl DpValue {
    /// Interpret free-form user input.
    ///
    /// # Examples
    ///
    /// ```
    /// use tuya_lights_rs::DpValue;
    ///
    /// assert_eq!(DpValue::parse("true"), DpValue::Bool(true));
    /// assert_eq!(DpValue::parse("-12"), DpValue::Integer(-12));
    /// assert_eq!(DpValue::parse("scene_1"), DpValue::Text("scene_1".into()));
    /// ```
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        match input {
            "true" => DpValue::Bool(true),
            "false" => DpValue::Bool(false),
            _ => input
                .parse()
                .map(DpValue::Integer)
                .unwrap_or_else(|_| DpValue::Text(input.to_string())),
        }
    }

    pub(crate) fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(DpValue::Bool(*b)),
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.round() as i64))
                .map(DpValue::Integer),
            Value::String(s) => Some(DpValue::Text(s.clone())),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DpValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric value; integer-looking text is accepted too.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DpValue::Integer(i) => Some(*i as f64),
            DpValue::Text(s) => s.trim().parse().ok(),
            DpValue::Bool(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DpValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for DpValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DpValue::Bool(b) => write!(f, "{b}"),
            DpValue::Integer(i) => write!(f, "{i}"),
            DpValue::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<bool> for DpValue {
    fn from(b: bool) -> Self {
        DpValue::Bool(b)
    }
}

impl From<i64> for DpValue {
    fn from(i: i64) -> Self {
        DpValue::Integer(i)
    }
}

impl From<&str> for DpValue {
    fn from(s: &str) -> Self {
        DpValue::Text(s.to_string())
    }
}

impl From<String> for DpValue {
    fn from(s: String) -> Self {
        DpValue::Text(s)
    }
}

/// Datapoint code to value.
pub type Datapoints = BTreeMap<String, DpValue>;

/// Parse the text of a status push or query result into datapoints.
///
/// Accepts either the usual `{"devId": .., "dps": {..}}` envelope or a bare
/// code-to-value object. Values of unsupported shape are skipped.
pub fn parse_datapoints(text: &str) -> Result<Datapoints> {
    let json: Value = serde_json::from_str(text).map_err(Error::JsonLoad)?;
    let map = json
        .get("dps")
        .and_then(Value::as_object)
        .or_else(|| json.as_object());

    Ok(map
        .map(|object| {
            object
                .iter()
                .filter_map(|(code, value)| Some((code.clone(), DpValue::from_json(value)?)))
                .collect()
        })
        .unwrap_or_default())
}

/// Protocol verb a command is sent with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Verb {
    Control,
    DpQuery,
    HeartBeat,
}

/// What the codec made of an inbound frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DecodedFrame {
    pub command: u8,
    pub text: String,
    pub error: Option<String>,
}

impl DecodedFrame {
    pub fn new(command: u8, text: impl Into<String>) -> Self {
        DecodedFrame {
            command,
            text: text.into(),
            error: None,
        }
    }

    pub fn failed(command: u8, error: impl Into<String>) -> Self {
        DecodedFrame {
            command,
            text: String::new(),
            error: Some(error.into()),
        }
    }

    pub fn kind(&self) -> FrameKind {
        FrameKind::from(self.command)
    }
}

/// Routing class of an inbound frame, keyed by its command byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Reply to a CONTROL command.
    ControlAck,
    /// Unsolicited state push.
    Status,
    /// Reply to a HEART_BEAT command.
    HeartbeatAck,
    /// Reply to a DP_QUERY command, carrying full state.
    QueryResult,
    Other(u8),
}

impl From<u8> for FrameKind {
    fn from(command: u8) -> Self {
        match command {
            7 => FrameKind::ControlAck,
            8 => FrameKind::Status,
            9 => FrameKind::HeartbeatAck,
            10 => FrameKind::QueryResult,
            other => FrameKind::Other(other),
        }
    }
}

impl FrameKind {
    /// Whether the frame completes a pending command.
    pub fn is_ack(&self) -> bool {
        matches!(self, FrameKind::ControlAck | FrameKind::HeartbeatAck)
    }

    /// Whether the frame carries device state.
    pub fn carries_state(&self) -> bool {
        matches!(self, FrameKind::Status | FrameKind::QueryResult)
    }
}

/// Encrypts and frames outbound commands, and unpacks inbound frames.
pub trait FrameCodec: Send + Sync {
    /// Build the wire frame for a command.
    fn encode(&self, local_key: &str, dps: &Datapoints, verb: Verb) -> Result<Vec<u8>>;

    /// Unpack a wire frame. Failures are reported in [`DecodedFrame::error`].
    fn decode(&self, frame: &[u8], local_key: &str) -> DecodedFrame;
}

/// Delivers encoded frames to a bulb.
pub trait Transport: Send + Sync {
    /// Connect to `address` if needed and send `frame`.
    fn send(&self, address: Ipv4Addr, frame: &[u8]) -> impl Future<Output = io::Result<()>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_envelope() {
        let dps = parse_datapoints(r#"{"devId": "bf01", "dps": {"1": true, "3": 128, "2": "colour"}, "t": 1}"#)
            .unwrap();
        assert_eq!(dps.get("1"), Some(&DpValue::Bool(true)));
        assert_eq!(dps.get("3"), Some(&DpValue::Integer(128)));
        assert_eq!(dps.get("2"), Some(&DpValue::Text("colour".into())));
        assert_eq!(dps.len(), 3);
    }

    #[test]
    fn test_parse_bare_map_skips_nested() {
        let dps = parse_datapoints(r#"{"1": false, "9": {"nested": 1}}"#).unwrap();
        assert_eq!(dps.len(), 1);
        assert_eq!(dps.get("1"), Some(&DpValue::Bool(false)));
    }

    #[test]
    fn test_parse_invalid_json() {
        assert!(matches!(parse_datapoints("not json"), Err(Error::JsonLoad(_))));
    }

    #[test]
    fn test_frame_kinds() {
        assert!(FrameKind::from(7).is_ack());
        assert!(FrameKind::from(9).is_ack());
        assert!(FrameKind::from(8).carries_state());
        assert!(FrameKind::from(10).carries_state());
        assert_eq!(FrameKind::from(13), FrameKind::Other(13));
        assert!(!FrameKind::from(13).is_ack());
    }

    #[test]
    fn test_verb_names() {
        assert_eq!(Verb::HeartBeat.to_string(), "HEART_BEAT");
        assert_eq!(Verb::DpQuery.to_string(), "DP_QUERY");
    }

    #[test]
    fn test_dp_value_serializes_untagged() {
        let dps = Datapoints::from([("1".to_string(), DpValue::Bool(true)), ("3".to_string(), DpValue::Integer(50))]);
        assert_eq!(serde_json::to_string(&dps).unwrap(), r#"{"1":true,"3":50}"#);
    }
}
