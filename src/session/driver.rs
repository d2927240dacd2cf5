// src/session/driver.rs
//! Event loop that feeds transport events into a `ChatSession`.

use super::transport::TemplateTransport;
use super::ChatSession;
use crate::models::events::TransportEvent;
use crate::models::template::PartialSchema;
use tokio::sync::mpsc;

/// Applies events until the sender side of `events` is dropped, forwarding
/// every preview that differs from the last one published. Returns the number
/// of events handled.
pub async fn run_session<T: TemplateTransport>(
    session: &mut ChatSession<T>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    previews: Option<mpsc::UnboundedSender<PartialSchema>>,
) -> usize {
    let mut handled = 0;
    let mut last_published: Option<PartialSchema> = None;

    tracing::info!("🔄 Entering template chat event loop");

    while let Some(event) = events.recv().await {
        handled += 1;

        let Some(preview) = session.apply(event) else {
            continue;
        };
        if last_published.as_ref() == Some(preview) {
            continue;
        }

        let preview = preview.clone();
        if let Some(tx) = &previews {
            if tx.send(preview.clone()).is_err() {
                tracing::debug!("Preview receiver dropped; continuing without previews");
            }
        }
        last_published = Some(preview);
    }

    tracing::info!(handled, "Template chat event loop finished");
    handled
}
