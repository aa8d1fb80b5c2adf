#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use jmri_ws_client::error::Error;
use jmri_ws_client::mock::{CONNECT_DELAY, MockOptions, MockTransport, RESPONSE_DELAY};
use jmri_ws_client::ws::{Inbound, Payload, Transport, TransportExt as _, WsError};
use serde_json::json;
use tokio::time::{Instant, sleep};

use crate::common::{Counter, record};

fn pong() -> Inbound {
    Inbound::Json(json!({ "type": "pong" }))
}

#[tokio::test(start_paused = true)]
async fn canned_responses_arrive_after_send() {
    let mock = MockTransport::new(
        MockOptions::builder()
            .responses(vec![pong(), Inbound::Text("second".to_owned())])
            .build(),
    );
    let (_log, mut messages) = record(&mock);
    mock.connect().await.unwrap();

    let sent_at = Instant::now();
    assert!(mock.send_serialized(&json!({ "type": "ping" })));
    assert!(messages.try_recv().is_err(), "never delivered inline");

    assert_eq!(messages.recv().await, Some(pong()));
    assert!(sent_at.elapsed() >= RESPONSE_DELAY);

    assert!(mock.send(Payload::from("again")));
    assert!(mock.send(Payload::from("and again")));
    assert_eq!(
        messages.recv().await,
        Some(Inbound::Text("second".to_owned()))
    );

    sleep(Duration::from_secs(1)).await;
    assert!(messages.try_recv().is_err(), "each response is delivered once");
    assert_eq!(mock.pending_responses(), 0);
}

#[tokio::test(start_paused = true)]
async fn responses_wait_for_message_handler() {
    let mock = MockTransport::new(MockOptions::builder().responses(vec![pong()]).build());
    mock.connect().await.unwrap();

    assert!(mock.send(Payload::from("unheard")));
    assert_eq!(mock.pending_responses(), 1, "kept until someone listens");

    let (_log, mut messages) = record(&mock);
    assert!(mock.send(Payload::from("heard")));
    assert_eq!(messages.recv().await, Some(pong()));
}

#[tokio::test(start_paused = true)]
async fn disconnect_suppresses_pending_delivery() {
    let mock = MockTransport::new(MockOptions::builder().responses(vec![pong()]).build());
    let (log, mut messages) = record(&mock);
    mock.connect().await.unwrap();

    assert!(mock.send(Payload::from("ping")));
    mock.disconnect();
    sleep(RESPONSE_DELAY * 10).await;

    assert!(messages.try_recv().is_err());
    assert_eq!(log.entries(), ["connect", "disconnect"]);
}

#[tokio::test]
async fn simulate_message_is_ignored_while_disconnected() {
    let mock = MockTransport::default();
    let (_log, mut messages) = record(&mock);

    mock.simulate_message(pong());
    assert!(messages.try_recv().is_err());

    mock.connect().await.unwrap();
    mock.simulate_message(pong());
    assert_eq!(messages.try_recv().ok(), Some(pong()));
}

#[tokio::test]
async fn simulated_events_reach_handlers() {
    let mock = MockTransport::default();
    let (log, _messages) = record(&mock);

    mock.connect().await.unwrap();
    mock.simulate_error(&WsError::Transport("checksum mismatch".to_owned()).into());
    mock.simulate_disconnect();
    mock.simulate_disconnect();

    assert!(!mock.is_active());
    assert_eq!(
        log.entries(),
        [
            "connect",
            "error: WebSocket: WebSocket transport error: checksum mismatch",
            "disconnect"
        ]
    );
}

#[tokio::test]
async fn sent_messages_preserve_order() {
    let mock = MockTransport::default();
    mock.connect().await.unwrap();

    assert!(mock.send(Payload::from("one")));
    assert!(mock.send_serialized(&json!({ "type": "two" })));
    assert!(mock.send(Payload::from("three")));

    assert_eq!(
        mock.sent_messages(),
        [
            Payload::from("one"),
            Payload::from(json!({ "type": "two" })),
            Payload::from("three"),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn delayed_connect_can_be_aborted() {
    let mock = MockTransport::new(MockOptions::builder().auto_connect(false).build());
    let connects = Counter::default();
    let counter = connects.clone();
    mock.on_connect(Box::new(move || counter.hit()));

    let pending = tokio::spawn({
        let mock = mock.clone();
        async move { mock.connect().await }
    });
    sleep(CONNECT_DELAY / 2).await;
    mock.disconnect();

    let error = pending.await.unwrap().unwrap_err();
    assert!(matches!(
        error.downcast_ref::<WsError>(),
        Some(WsError::Aborted)
    ));
    assert!(!mock.is_active());
    assert_eq!(connects.get(), 0);
}

#[tokio::test]
async fn failing_mock_never_connects() {
    let mock = MockTransport::new(MockOptions::builder().should_fail(true).build());
    let errors = Counter::default();
    let counter = errors.clone();
    mock.on_error(Box::new(move |_: &Error| counter.hit()));

    assert!(mock.connect().await.is_err());
    assert!(mock.connect().await.is_err());

    assert_eq!(errors.get(), 2);
    assert!(!mock.send(Payload::from("ping")));
}

#[tokio::test]
async fn usable_as_trait_object() {
    let mock = MockTransport::default();
    let transport: Arc<dyn Transport> = Arc::new(mock.clone());

    transport.connect().await.unwrap();
    assert!(transport.send_serialized(&json!({ "type": "ping" })));

    assert!(mock.is_active());
    assert_eq!(mock.sent_messages().len(), 1);
}
