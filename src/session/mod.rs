// src/session/mod.rs
//! Client-side state of one template-generation chat.
//!
//! Transport callbacks arrive one at a time, so the session is a plain
//! `&mut self` state machine with no internal locking.

pub mod driver;
pub mod transport;

use crate::models::chat::{ChatMessage, MessageRole};
use crate::models::events::{
    IncomingEvent, OutgoingEvent, ResultPayload, SavePayload, SavedPayload, SendPayload,
    TransportEvent,
};
use crate::models::template::{GeneratedTemplatePreview, PartialSchema};
use crate::services::streaming_schema::SchemaStream;
use thiserror::Error;
use transport::{TemplateTransport, TransportError};

pub const CONNECTION_LOST_NOTICE: &str = "Connection to the template service was lost";

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Message cannot be empty")]
    EmptyMessage,
    #[error("Not connected to the template service")]
    NotConnected,
    #[error("No active template session")]
    NoActiveSession,
    #[error("A template name is required to save")]
    MissingTemplateName,
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Idle,
    AwaitingReply,
}

pub struct ChatSession<T: TemplateTransport> {
    transport: T,
    stream: SchemaStream,
    messages: Vec<ChatMessage>,
    connected: bool,
    is_typing: bool,
    session_id: Option<String>,
    template_name: Option<String>,
    category: Option<String>,
    saved_template_slug: Option<String>,
    notice: Option<String>,
}

impl<T: TemplateTransport> ChatSession<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            stream: SchemaStream::new(),
            messages: Vec::new(),
            connected: false,
            is_typing: false,
            session_id: None,
            template_name: None,
            category: None,
            saved_template_slug: None,
            notice: None,
        }
    }

    pub fn state(&self) -> SessionState {
        match (self.connected, self.is_typing) {
            (false, _) => SessionState::Disconnected,
            (true, true) => SessionState::AwaitingReply,
            (true, false) => SessionState::Idle,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_typing(&self) -> bool {
        self.is_typing
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn template_name(&self) -> Option<&str> {
        self.template_name.as_deref()
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn saved_template_slug(&self) -> Option<&str> {
        self.saved_template_slug.as_deref()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Last transport-level notice (e.g. connection lost), cleared on reconnect.
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    /// Snapshot of the schema currently being streamed.
    pub fn preview(&self) -> &PartialSchema {
        self.stream.snapshot()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The most recent finalized template in the conversation.
    pub fn current_template(&self) -> Option<&GeneratedTemplatePreview> {
        self.messages
            .iter()
            .rev()
            .filter(|m| m.role == MessageRole::Assistant)
            .find_map(|m| m.template.as_ref())
    }

    pub fn on_connect(&mut self) {
        tracing::info!("🔌 Template chat connected");
        self.connected = true;
        self.notice = None;
        self.stream.reset();
    }

    pub fn on_disconnect(&mut self, reason: Option<&str>) {
        tracing::warn!(
            reason = reason.unwrap_or("unknown"),
            session_id = self.session_id.as_deref().unwrap_or("-"),
            "Template chat disconnected"
        );
        self.connected = false;
        self.is_typing = false;
        self.notice = Some(CONNECTION_LOST_NOTICE.to_string());
    }

    /// Sends a user message; the server decides whether it starts a new
    /// generation or refines the existing schema.
    pub fn send_message(&mut self, text: &str) -> Result<(), SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        if !self.connected {
            return Err(SessionError::NotConnected);
        }

        self.messages.push(ChatMessage::user(text));
        self.is_typing = true;
        self.stream.reset();

        let event = OutgoingEvent::Send(SendPayload {
            message: text.to_string(),
            session_id: self.session_id.clone(),
        });
        if let Err(e) = self.transport.emit(event) {
            tracing::error!("Failed to send template message: {}", e);
            self.is_typing = false;
            return Err(e.into());
        }

        tracing::debug!(
            session_id = self.session_id.as_deref().unwrap_or("-"),
            "📤 Sent template message"
        );
        Ok(())
    }

    /// Appends streamed text and returns the refreshed preview.
    pub fn on_chunk_event(&mut self, session_id: Option<&str>, chunk: &str) -> &PartialSchema {
        if self.session_id.is_none() {
            self.session_id = session_id.map(str::to_string);
        }
        self.stream.push(chunk)
    }

    pub fn on_message_event(&mut self, session_id: &str, text: &str) {
        self.session_id = Some(session_id.to_string());
        self.is_typing = false;
        self.messages.push(ChatMessage::assistant(text));
    }

    /// Takes the structured result over the partial preview.
    pub fn on_result_event(&mut self, payload: ResultPayload) {
        tracing::info!(
            session_id = %payload.session_id,
            template_name = %payload.template_name,
            objects = payload.schema.objects.len(),
            "✅ Template generated"
        );

        self.session_id = Some(payload.session_id);
        self.template_name = Some(payload.template_name.clone());
        self.category = Some(payload.category.clone());
        self.is_typing = false;
        self.stream.reset();

        let content = format!("Generated template: {}", payload.template_name);
        let template = GeneratedTemplatePreview {
            template_name: payload.template_name,
            category: payload.category,
            schema: payload.schema,
        };
        self.messages.push(ChatMessage::assistant(content).with_template(template));
    }

    /// Records the slug of a saved template. Returns false when a slug was
    /// already recorded; the first one is kept.
    pub fn on_saved_event(&mut self, payload: &SavedPayload) -> bool {
        if let Some(existing) = &self.saved_template_slug {
            tracing::warn!(
                existing = %existing,
                ignored = %payload.slug,
                "Template already saved for this session"
            );
            return false;
        }

        tracing::info!(
            slug = %payload.slug,
            message = payload.message.as_deref().unwrap_or(""),
            "💾 Template saved"
        );
        self.saved_template_slug = Some(payload.slug.clone());
        true
    }

    pub fn on_error_event(&mut self, message: &str) {
        tracing::warn!("Template service reported an error: {}", message);
        self.is_typing = false;
        self.messages.push(ChatMessage::error(message));
    }

    /// Asks the server to persist the current template, optionally renamed.
    pub fn save_template(&mut self, custom_name: Option<&str>) -> Result<(), SessionError> {
        let session_id = self
            .session_id
            .clone()
            .ok_or(SessionError::NoActiveSession)?;

        let template_name = custom_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .or_else(|| {
                self.template_name
                    .as_deref()
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
            })
            .map(str::to_string)
            .ok_or(SessionError::MissingTemplateName)?;

        if !self.connected {
            return Err(SessionError::NotConnected);
        }

        self.transport.emit(OutgoingEvent::Save(SavePayload {
            session_id,
            template_name: Some(template_name),
            category: self.category.clone(),
        }))?;
        Ok(())
    }

    /// Routes one transport event. Returns the preview when streamed text
    /// changed it.
    pub fn apply(&mut self, event: TransportEvent) -> Option<&PartialSchema> {
        match event {
            TransportEvent::Connected => self.on_connect(),
            TransportEvent::Disconnected { reason } => self.on_disconnect(reason.as_deref()),
            TransportEvent::Incoming(incoming) => match incoming {
                IncomingEvent::Chunk(payload) => {
                    let before = self.stream.len();
                    self.on_chunk_event(payload.session_id.as_deref(), &payload.chunk);
                    if self.stream.len() != before {
                        return Some(self.stream.snapshot());
                    }
                }
                IncomingEvent::Message(payload) => {
                    self.on_message_event(&payload.session_id, &payload.message)
                }
                IncomingEvent::Result(payload) => self.on_result_event(payload),
                IncomingEvent::Saved(payload) => {
                    self.on_saved_event(&payload);
                }
                IncomingEvent::Error(payload) => self.on_error_event(&payload.message),
            },
        }
        None
    }
}
