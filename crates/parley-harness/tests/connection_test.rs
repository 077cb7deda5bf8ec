//! Connection lifecycle against the simulated broker.
//!
//! Covers the handshake (idempotence, timeout, rejection), graceful
//! disconnect, and what the client observes when the broker goes away.

use std::{pin::pin, time::Duration};

use futures::StreamExt;
use parley_client::{
    ConnectError, ConnectionState, ConversationId, MessengerEvent, PublishError, SubscribeError, TopicKind,
    TransportError,
};
use parley_harness::{BrokerMode, SimBroker, messenger, settle};
use parley_proto::{AppCommand, Command, Destination, Frame};
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn connect_is_idempotent() {
    let broker = SimBroker::new();
    let messenger = messenger(&broker);

    messenger.connect().await.unwrap();
    messenger.connect().await.unwrap();

    let handshakes = broker.handshakes().await;
    assert_eq!(handshakes.len(), 1);
    assert_eq!(handshakes[0].header("host"), Some("/"));
    assert_eq!(handshakes[0].header("Authorization"), Some("Bearer test-token"));
    assert_eq!(messenger.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn concurrent_connects_share_one_handshake() {
    let broker = SimBroker::new();
    let messenger = messenger(&broker);

    let (first, second) = tokio::join!(messenger.connect(), messenger.connect());

    assert!(first.is_ok() && second.is_ok());
    assert_eq!(broker.handshakes().await.len(), 1);
    assert_eq!(broker.session_count().await, 1);
}

#[tokio::test(start_paused = true)]
async fn connect_times_out_when_broker_stays_silent() {
    let broker = SimBroker::with_mode(BrokerMode::Silent);
    let messenger = messenger(&broker);
    let started = Instant::now();

    let err = messenger.connect().await.unwrap_err();

    assert_eq!(err, ConnectError::Timeout { after: Duration::from_secs(5) });
    assert!(started.elapsed() >= Duration::from_secs(5));
    assert_eq!(messenger.state(), ConnectionState::Disconnected);

    // A later attempt against a responsive broker succeeds.
    broker.set_mode(BrokerMode::Accept).await;
    messenger.connect().await.unwrap();
    assert_eq!(messenger.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn rejected_handshake_reports_broker_message() {
    let broker = SimBroker::with_mode(BrokerMode::Reject("invalid token".to_owned()));
    let messenger = messenger(&broker);

    let err = messenger.connect().await.unwrap_err();

    assert_eq!(err, ConnectError::Rejected { message: "invalid token".to_owned() });
    assert_eq!(messenger.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn unreachable_broker_is_a_transport_error() {
    let broker = SimBroker::with_mode(BrokerMode::Unreachable);
    let messenger = messenger(&broker);

    let err = messenger.connect().await.unwrap_err();

    assert!(matches!(err, ConnectError::Transport(TransportError::Connect(_))), "{err:?}");
    assert_eq!(messenger.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn state_stream_reports_transitions() {
    let broker = SimBroker::new();
    let messenger = messenger(&broker);
    let mut states = pin!(messenger.connection_state());

    assert_eq!(states.next().await, Some(ConnectionState::Disconnected));
    messenger.connect().await.unwrap();
    assert_eq!(states.next().await, Some(ConnectionState::Connecting));
    assert_eq!(states.next().await, Some(ConnectionState::Connected));
    messenger.disconnect().await;
    assert_eq!(states.next().await, Some(ConnectionState::Disconnected));
}

#[tokio::test(start_paused = true)]
async fn slow_state_consumer_sees_every_transition() {
    let broker = SimBroker::new();
    let messenger = messenger(&broker);
    let states = messenger.connection_state();

    messenger.connect().await.unwrap();
    messenger.disconnect().await;
    messenger.disconnect().await;

    let seen: Vec<_> = states.take(4).collect().await;
    assert_eq!(seen, [
        ConnectionState::Disconnected,
        ConnectionState::Connecting,
        ConnectionState::Connected,
        ConnectionState::Disconnected,
    ]);
}

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_pending_handshake() {
    let broker = SimBroker::with_mode(BrokerMode::Silent);
    let messenger = messenger(&broker);
    let connecting = tokio::spawn({
        let messenger = messenger.clone();
        async move { messenger.connect().await }
    });
    settle().await;
    assert_eq!(messenger.state(), ConnectionState::Connecting);

    messenger.disconnect().await;
    assert_eq!(messenger.state(), ConnectionState::Disconnected);

    // A late confirmation finds nobody waiting.
    broker.send_raw(&Frame::connected().encode()).await;
    settle().await;

    let err = connecting.await.unwrap().unwrap_err();
    assert!(matches!(err, ConnectError::Transport(TransportError::Closed)), "{err:?}");
    assert_eq!(messenger.state(), ConnectionState::Disconnected);
    assert_eq!(
        messenger.subscribe(ConversationId(1), TopicKind::NewMessage).await.unwrap_err(),
        SubscribeError::NotConnected
    );
    assert_eq!(broker.session_count().await, 0);

    broker.set_mode(BrokerMode::Accept).await;
    messenger.connect().await.unwrap();
    assert_eq!(messenger.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn disconnect_releases_subscriptions_and_timers() {
    let broker = SimBroker::new();
    let messenger = messenger(&broker);
    messenger.connect().await.unwrap();
    let mut view = messenger.open_conversation(ConversationId(42)).await.unwrap();
    messenger.keystroke(ConversationId(42)).await.unwrap();

    messenger.disconnect().await;
    settle().await;

    assert_eq!(messenger.state(), ConnectionState::Disconnected);
    assert!(messenger.active_subscriptions().await.is_empty());
    assert_eq!(messenger.active_conversation().await, None);
    assert!(view.messages.recv().await.is_none());
    assert!(view.typing.recv().await.is_none());

    let received = broker.received().await;
    let unsubscribed: Vec<_> =
        received.iter().filter(|f| f.command == Command::Unsubscribe).filter_map(|f| f.header("id")).collect();
    assert_eq!(unsubscribed, ["sub-1", "sub-2"]);
    assert_eq!(received.last().map(|f| f.command), Some(Command::Disconnect));

    // The cancelled typing timer never publishes.
    tokio::time::advance(Duration::from_secs(10)).await;
    settle().await;
    assert!(broker.sent_to(Destination::App(42, AppCommand::StopTyping)).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn operations_after_disconnect_are_rejected() {
    let broker = SimBroker::new();
    let messenger = messenger(&broker);
    messenger.connect().await.unwrap();
    messenger.disconnect().await;

    let conversation = ConversationId(7);
    assert_eq!(
        messenger.subscribe(conversation, TopicKind::NewMessage).await.unwrap_err(),
        SubscribeError::NotConnected
    );
    assert_eq!(messenger.open_conversation(conversation).await.unwrap_err(), SubscribeError::NotConnected);
    assert_eq!(messenger.send_message(conversation, "hello").await, Err(PublishError::NotConnected));
    assert_eq!(messenger.keystroke(conversation).await, Err(PublishError::NotConnected));
    assert_eq!(messenger.notify_typing(conversation).await, Err(PublishError::NotConnected));

    // Disconnecting twice is harmless.
    messenger.disconnect().await;
    assert_eq!(messenger.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn broker_drop_is_reported_once() {
    let broker = SimBroker::new();
    let messenger = messenger(&broker);
    messenger.connect().await.unwrap();
    let _view = messenger.open_conversation(ConversationId(3)).await.unwrap();
    let mut events = messenger.events();

    broker.drop_connections().await;
    settle().await;

    assert_eq!(messenger.state(), ConnectionState::Disconnected);
    assert!(messenger.active_subscriptions().await.is_empty());
    assert_eq!(events.try_recv().unwrap(), MessengerEvent::ConnectionLost { reason: "transport closed".to_owned() });
    assert!(events.try_recv().is_err());

    messenger.connect().await.unwrap();
    assert_eq!(broker.handshakes().await.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn broker_error_frame_ends_the_session() {
    let broker = SimBroker::new();
    let messenger = messenger(&broker);
    messenger.connect().await.unwrap();
    let mut events = messenger.events();

    broker.send_error("session expired").await;
    settle().await;

    assert_eq!(messenger.state(), ConnectionState::Disconnected);
    assert_eq!(events.try_recv().unwrap(), MessengerEvent::ConnectionLost { reason: "session expired".to_owned() });
}

#[tokio::test(start_paused = true)]
async fn heartbeats_and_garbage_do_not_disturb_the_session() {
    let broker = SimBroker::new();
    let messenger = messenger(&broker);
    messenger.connect().await.unwrap();

    broker.send_raw("\n").await;
    broker.send_raw("NOT-A-COMMAND\n\n\0").await;
    broker.send_raw(&Frame::connected().encode()).await;
    settle().await;

    assert_eq!(messenger.state(), ConnectionState::Connected);
}
