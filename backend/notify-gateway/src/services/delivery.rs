/// Delivery engine
///
/// Takes one envelope and writes it to either an explicit subset of
/// registered clients or to every registered client. Clients are resolved
/// fresh against the registry per attempt, and each write succeeds or fails
/// on its own; one dead connection never aborts delivery to the rest.
use notify_wire::WireMessage;
use tokio::sync::mpsc::error::TrySendError;

use crate::models::Envelope;
use crate::websocket::ConnectionRegistry;

/// Per-attempt outcome. Delivery counts as successful when at least one
/// client received the frame; zero live targets is a failure so the envelope
/// re-enters the retry path until a consumer connects or retries run out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

impl DeliveryReport {
    pub fn succeeded(&self) -> bool {
        self.delivered > 0
    }
}

/// Attempt delivery of one envelope
pub async fn deliver(registry: &ConnectionRegistry, envelope: &Envelope) -> DeliveryReport {
    let frame = WireMessage::notification(
        envelope.kind.clone(),
        envelope.payload.clone(),
        envelope.id.clone(),
    );

    let text = match frame.to_json() {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(id = %envelope.id, error = %e, "failed to serialize envelope");
            return DeliveryReport::default();
        }
    };

    let mut report = DeliveryReport::default();

    match &envelope.target_clients {
        Some(targets) => {
            for client_id in targets {
                match registry.get(client_id).await {
                    Some(sender) => write_to(&mut report, client_id, &sender, &text),
                    // Disconnected targets are skipped, not errored
                    None => {
                        tracing::debug!(
                            id = %envelope.id,
                            client_id = %client_id,
                            "target not registered, skipping"
                        );
                    }
                }
            }
        }
        None => {
            for (client_id, sender) in registry.snapshot().await {
                write_to(&mut report, &client_id, &sender, &text);
            }
        }
    }

    report
}

fn write_to(
    report: &mut DeliveryReport,
    client_id: &str,
    sender: &crate::websocket::ClientSender,
    text: &str,
) {
    match sender.try_send(text.to_string()) {
        Ok(()) => report.delivered += 1,
        Err(TrySendError::Full(_)) => {
            report.failed += 1;
            tracing::warn!(client_id = %client_id, "client buffer full, write dropped");
        }
        Err(TrySendError::Closed(_)) => {
            report.failed += 1;
            tracing::debug!(client_id = %client_id, "client connection closed mid-write");
        }
    }
}
