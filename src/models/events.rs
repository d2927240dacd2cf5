// src/models/events.rs
//! Wire events exchanged with the template chat transport.
//! Every frame is `{ "event": <name>, "data": <payload> }`.

use super::template::TemplateSchema;
use serde::{Deserialize, Serialize};

/// Events the client sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum OutgoingEvent {
    #[serde(rename = "template:send")]
    Send(SendPayload),
    #[serde(rename = "template:save")]
    Save(SavePayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendPayload {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavePayload {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// Events the server pushes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum IncomingEvent {
    /// One streamed piece of the schema document being generated.
    #[serde(rename = "template:chunk")]
    Chunk(ChunkPayload),
    /// The AI is asking a clarifying question.
    #[serde(rename = "template:message")]
    Message(MessagePayload),
    #[serde(rename = "template:result")]
    Result(ResultPayload),
    #[serde(rename = "template:saved")]
    Saved(SavedPayload),
    #[serde(rename = "template:error")]
    Error(ErrorPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub chunk: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub session_id: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultPayload {
    pub session_id: String,
    pub template_name: String,
    pub category: String,
    pub schema: TemplateSchema,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedPayload {
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// What the transport hands to a session: lifecycle changes plus server events.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected,
    Disconnected { reason: Option<String> },
    Incoming(IncomingEvent),
}

impl From<IncomingEvent> for TransportEvent {
    fn from(event: IncomingEvent) -> Self {
        TransportEvent::Incoming(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_send_frame_omits_missing_session() {
        let event = OutgoingEvent::Send(SendPayload {
            message: "A CRM for a bakery".to_string(),
            session_id: None,
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            json!({"event": "template:send", "data": {"message": "A CRM for a bakery"}})
        );
    }

    #[test]
    fn test_result_frame_without_relations() {
        let frame = json!({
            "event": "template:result",
            "data": {
                "sessionId": "s-1",
                "templateName": "Bakery CRM",
                "category": "Retail",
                "schema": {"objects": [{"name": "Order", "fields": []}]}
            }
        });

        let event: IncomingEvent = serde_json::from_value(frame).unwrap();
        match event {
            IncomingEvent::Result(payload) => {
                assert_eq!(payload.session_id, "s-1");
                assert_eq!(payload.template_name, "Bakery CRM");
                assert!(payload.schema.relations.is_empty());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_error_frame_code_is_optional() {
        let event: IncomingEvent =
            serde_json::from_str(r#"{"event":"template:error","data":{"message":"quota"}}"#)
                .unwrap();
        assert_eq!(
            event,
            IncomingEvent::Error(ErrorPayload {
                message: "quota".to_string(),
                code: None
            })
        );
    }

    #[test]
    fn test_unknown_incoming_event_is_rejected() {
        let saved: IncomingEvent =
            serde_json::from_str(r#"{"event":"template:saved","data":{"slug":"bakery-crm"}}"#)
                .unwrap();
        assert!(matches!(saved, IncomingEvent::Saved(ref p) if p.slug == "bakery-crm"));

        assert!(serde_json::from_str::<IncomingEvent>(r#"{"event":"template:unknown","data":{}}"#).is_err());
    }
}
