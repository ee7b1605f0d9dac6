//! Live workflow event stream at `/ws`.

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{Instant, interval_at};

/// Ping cadence for idle connections.
const KEEPALIVE: Duration = Duration::from_secs(30);

/// A client that sends nothing at all (not even a Pong) for this long is dropped.
const IDLE_LIMIT: Duration = Duration::from_secs(60);

/// Upgrade to a WebSocket that streams every workflow event as JSON.
pub async fn ws_handler(ws: WebSocketUpgrade, tx: broadcast::Sender<String>) -> impl IntoResponse {
    // Subscribe before the upgrade completes so no event slips between the two.
    let events = tx.subscribe();
    ws.on_upgrade(move |socket| stream_events(socket, events))
}

async fn stream_events(socket: WebSocket, mut events: broadcast::Receiver<String>) {
    let (mut outbound, mut inbound) = socket.split();
    let mut keepalive = interval_at(Instant::now() + KEEPALIVE, KEEPALIVE);
    let mut last_heard = Instant::now();

    loop {
        let frame = tokio::select! {
            event = events.recv() => match event {
                Ok(json) => Message::Text(json.into()),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event subscriber fell behind");
                    Message::Text(lagged_notice(skipped).into())
                }
                Err(RecvError::Closed) => break,
            },
            incoming = inbound.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {
                    last_heard = Instant::now();
                    continue;
                }
            },
            _ = keepalive.tick() => {
                if last_heard.elapsed() > IDLE_LIMIT {
                    tracing::debug!("event subscriber went quiet, closing");
                    break;
                }
                Message::Ping(Default::default())
            }
        };
        if outbound.send(frame).await.is_err() {
            break;
        }
    }

    let _ = outbound.send(Message::Close(None)).await;
}

/// Tells a slow client it missed events and should reload the spaces it shows.
fn lagged_notice(skipped: u64) -> String {
    serde_json::json!({ "type": "Lagged", "data": { "skipped": skipped } }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lagged_notice_shape() {
        let notice: serde_json::Value = serde_json::from_str(&lagged_notice(12)).unwrap();
        assert_eq!(notice["type"], "Lagged");
        assert_eq!(notice["data"]["skipped"], 12);
    }
}
