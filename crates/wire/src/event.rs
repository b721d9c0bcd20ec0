// SPDX-License-Identifier: MIT

use serde::{Deserialize, Serialize};

/// Marker for a type that is the flattened payload of an outbound event
/// frame; supplies the fixed `event` name stamped onto the envelope.
pub trait EventPayload {
    const EVENT: &'static str;
}

/// Outbound response/event frame (spec.md §6): `event` name, optional
/// `request_id` echo, optional `client_sessions` routing, optional
/// `bypass_session_gate`, and a flattened command-specific payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventFrame<T> {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_sessions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bypass_session_gate: Option<bool>,
    #[serde(flatten)]
    pub payload: T,
}

impl<T> EventFrame<T> {
    pub fn new(event: impl Into<String>, payload: T) -> Self {
        Self {
            event: event.into(),
            request_id: None,
            client_sessions: None,
            bypass_session_gate: None,
            payload,
        }
    }

    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn with_client_sessions(mut self, sessions: Vec<String>) -> Self {
        self.client_sessions = if sessions.is_empty() { None } else { Some(sessions) };
        self
    }

    pub fn bypassing_session_gate(mut self) -> Self {
        self.bypass_session_gate = Some(true);
        self
    }
}

impl<T: EventPayload> EventFrame<T> {
    /// Build the frame using the payload's own fixed event name.
    pub fn for_payload(payload: T) -> Self {
        Self::new(T::EVENT, payload)
    }
}

/// Generic error response frame: any handler failure (spec.md §7) becomes
/// `{event: "error", error: <message>, success: false}`, with `request_id`
/// echoed when known.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorPayload {
    pub error: String,
    pub success: bool,
}

impl EventPayload for ErrorPayload {
    const EVENT: &'static str = "error";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Dummy {
        value: u32,
    }

    #[test]
    fn flattens_payload_fields_alongside_envelope() {
        let frame = EventFrame::new("dummy_event", Dummy { value: 7 })
            .with_request_id(Some("r1".into()))
            .with_client_sessions(vec!["s1".into()]);
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["event"], "dummy_event");
        assert_eq!(json["request_id"], "r1");
        assert_eq!(json["client_sessions"], serde_json::json!(["s1"]));
        assert_eq!(json["value"], 7);
    }

    #[test]
    fn empty_client_sessions_omit_the_field() {
        let frame = EventFrame::new("dummy_event", Dummy { value: 1 }).with_client_sessions(vec![]);
        let json = serde_json::to_value(&frame).unwrap();
        assert!(json.get("client_sessions").is_none());
    }

    #[test]
    fn error_payload_carries_event_name() {
        let frame = EventFrame::for_payload(ErrorPayload { error: "boom".into(), success: false });
        assert_eq!(frame.event, "error");
    }
}
