// src/handlers/preview.rs
use crate::models::template::PartialSchema;
use crate::services::streaming_schema::{parse_streaming_schema, SchemaStream};
use crate::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Frames a preview socket client sends.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ClientFrame {
    Chunk { content: String },
    Reset,
}

/// Frames the preview socket sends back.
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ServerFrame {
    #[serde(rename = "partial")]
    Partial {
        schema: PartialSchema,
        buffer_len: usize,
    },
    #[serde(rename = "error")]
    Error { message: String },
}

#[derive(Deserialize)]
struct PreviewRequest {
    buffer: String,
}

pub fn preview_routes() -> Router {
    Router::new()
        .route("/api/status", get(api_status))
        .route("/api/schema/preview", post(preview_schema))
        .route("/ws/preview", get(websocket_handler))
}

async fn api_status() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn preview_schema(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<PreviewRequest>,
) -> impl IntoResponse {
    let limit = state.config.preview_max_buffer_bytes;
    if request.buffer.len() > limit {
        tracing::warn!(len = request.buffer.len(), limit, "Preview buffer too large");
        return (
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(serde_json::json!({
                "error": format!("buffer exceeds {} bytes", limit),
            })),
        )
            .into_response();
    }

    Json(parse_streaming_schema(&request.buffer)).into_response()
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    Extension(state): Extension<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| websocket(socket, state))
}

async fn websocket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut stream = SchemaStream::new();
    let limit = state.config.preview_max_buffer_bytes;

    tracing::info!("🔌 Preview socket opened");

    while let Some(Ok(message)) = receiver.next().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let reply = handle_frame(&mut stream, &text, limit);
        let json_str = match serde_json::to_string(&reply) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Failed to serialize preview frame: {}", e);
                continue;
            }
        };
        if sender.send(Message::Text(json_str)).await.is_err() {
            tracing::debug!("Preview socket closed while sending");
            break;
        }
    }

    tracing::info!(buffer_len = stream.len(), "Preview socket closed");
}

fn handle_frame(stream: &mut SchemaStream, text: &str, limit: usize) -> ServerFrame {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            return ServerFrame::Error {
                message: format!("Invalid frame: {}", e),
            }
        }
    };

    match frame {
        ClientFrame::Reset => stream.reset(),
        ClientFrame::Chunk { content } => {
            if stream.len() + content.len() > limit {
                return ServerFrame::Error {
                    message: format!("Buffer limit of {} bytes exceeded", limit),
                };
            }
            stream.push(&content);
        }
    }

    ServerFrame::Partial {
        schema: stream.snapshot().clone(),
        buffer_len: stream.len(),
    }
}
