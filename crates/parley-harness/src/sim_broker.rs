//! Simulated STOMP broker.
//!
//! `SimBroker` implements [`Connector`] by handing out in-process channels
//! instead of sockets. Each channel gets a serve task that parses client
//! frames, tracks subscriptions per session and, when echo is on, answers
//! commands the way the real broker does: sends and edits come back as
//! envelopes on the conversation topic, typing commands as typing payloads.
//!
//! Tests drive the broker side explicitly (publish, inject raw frames, drop
//! connections) and inspect everything the client sent.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use parley_client::{Channel, ConnectRequest, Connector, TransportError};
use parley_proto::{
    AppCommand, Command, Destination, EditPayload, Envelope, Frame, MessagePayload, SendPayload, Timestamp,
    TypingPayload,
    payloads::{decode_json, encode_json},
};
use serde::Serialize;
use tokio::sync::{Mutex, mpsc};

/// Capacity of each broker-to-client queue.
const INBOUND_CAPACITY: usize = 256;

/// User id the broker assigns to echoed messages.
pub const ECHO_USER_ID: u64 = 1;

/// How the broker answers `CONNECT`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BrokerMode {
    /// Reply `CONNECTED`.
    #[default]
    Accept,
    /// Never reply.
    Silent,
    /// Reply `ERROR` with this message and close.
    Reject(String),
    /// Refuse to open the channel at all.
    Unreachable,
}

/// One open channel.
struct Session {
    to_client: mpsc::Sender<String>,
    /// Subscription id to destination.
    subscriptions: BTreeMap<String, String>,
}

struct State {
    mode: BrokerMode,
    username: String,
    echo: bool,
    sessions: HashMap<u64, Session>,
    next_session: u64,
    next_message: u64,
    next_delivery: u64,
    handshakes: Vec<Frame>,
    received: Vec<Frame>,
    messages: HashMap<u64, MessagePayload>,
}

impl State {
    fn new(mode: BrokerMode) -> Self {
        Self {
            mode,
            username: "me".to_owned(),
            echo: true,
            sessions: HashMap::new(),
            next_session: 0,
            next_message: 0,
            next_delivery: 0,
            handshakes: Vec::new(),
            received: Vec::new(),
            messages: HashMap::new(),
        }
    }

    /// Process one client frame. Returns `false` once the session is over.
    fn handle(&mut self, session_id: u64, frame: Frame) -> bool {
        match frame.command {
            Command::Connect => {
                self.handshakes.push(frame);
                match self.mode.clone() {
                    BrokerMode::Accept | BrokerMode::Unreachable => self.send_to(session_id, &Frame::connected()),
                    BrokerMode::Silent => tracing::debug!(session_id, "ignoring CONNECT"),
                    BrokerMode::Reject(message) => {
                        self.send_to(session_id, &Frame::error(&message));
                        self.sessions.remove(&session_id);
                        return false;
                    },
                }
            },
            Command::Subscribe => {
                let (Some(id), Some(destination)) = (frame.header("id"), frame.destination()) else {
                    tracing::warn!(session_id, "SUBSCRIBE without id or destination");
                    return true;
                };
                if let Some(session) = self.sessions.get_mut(&session_id) {
                    session.subscriptions.insert(id.to_owned(), destination.to_owned());
                }
            },
            Command::Unsubscribe => {
                if let (Some(id), Some(session)) = (frame.header("id"), self.sessions.get_mut(&session_id)) {
                    session.subscriptions.remove(id);
                }
            },
            Command::Send => {
                if self.echo {
                    self.echo(&frame);
                }
            },
            Command::Disconnect => {
                self.sessions.remove(&session_id);
                return false;
            },
            other => tracing::debug!(session_id, command = %other, "unexpected client frame"),
        }
        true
    }

    fn echo(&mut self, frame: &Frame) {
        let Some(Destination::App(conversation_id, command)) = frame.destination().and_then(Destination::parse)
        else {
            tracing::warn!(destination = ?frame.destination(), "SEND outside the command namespace");
            return;
        };

        match command {
            AppCommand::Send => match decode_json::<SendPayload>(frame.body()) {
                Ok(payload) => {
                    self.next_message += 1;
                    let message = MessagePayload {
                        id: self.next_message,
                        conversation_id,
                        user_id: ECHO_USER_ID,
                        username: self.username.clone(),
                        content: payload.content,
                        sent_at: now(),
                        edited_at: None,
                        read: false,
                    };
                    self.messages.insert(message.id, message.clone());
                    self.publish_envelope(conversation_id, &Envelope::new_message(message));
                },
                Err(error) => tracing::warn!(%error, "bad send payload"),
            },
            AppCommand::Edit => match decode_json::<EditPayload>(frame.body()) {
                Ok(payload) => {
                    let Some(message) = self.messages.get_mut(&payload.message_id) else {
                        tracing::debug!(message_id = payload.message_id, "edit of unknown message");
                        return;
                    };
                    message.content = payload.content;
                    message.edited_at = Some(now());
                    let envelope = Envelope::message_edited(message.clone());
                    self.publish_envelope(conversation_id, &envelope);
                },
                Err(error) => tracing::warn!(%error, "bad edit payload"),
            },
            AppCommand::Typing | AppCommand::StopTyping => {
                let payload =
                    TypingPayload { username: self.username.clone(), typing: command == AppCommand::Typing };
                self.publish_json(Destination::TypingTopic(conversation_id), &payload);
            },
            AppCommand::MarkRead => {
                let read = frame.body().parse::<u64>().ok().and_then(|id| self.messages.get_mut(&id));
                if let Some(message) = read {
                    message.read = true;
                }
            },
        }
    }

    fn publish_envelope(&mut self, conversation_id: u64, envelope: &Envelope) {
        self.publish_json(Destination::MessageTopic(conversation_id), envelope);
    }

    fn publish_json(&mut self, destination: Destination, payload: &impl Serialize) {
        match encode_json(payload) {
            Ok(body) => {
                self.publish(&destination.to_string(), &body);
            },
            Err(error) => tracing::warn!(%destination, %error, "payload not encoded"),
        }
    }

    /// Fan a body out to every matching subscription. Returns the number of
    /// deliveries.
    fn publish(&mut self, destination: &str, body: &str) -> usize {
        let targets: Vec<(u64, String)> = self
            .sessions
            .iter()
            .flat_map(|(session_id, session)| {
                session
                    .subscriptions
                    .iter()
                    .filter(|(_, subscribed)| subscribed.as_str() == destination)
                    .map(|(id, _)| (*session_id, id.clone()))
            })
            .collect();

        for (session_id, subscription) in &targets {
            self.deliver(*session_id, destination, subscription, body);
        }
        targets.len()
    }

    fn deliver(&mut self, session_id: u64, destination: &str, subscription: &str, body: &str) {
        self.next_delivery += 1;
        let message_id = format!("m-{}", self.next_delivery);
        self.send_to(session_id, &Frame::message(destination, subscription, &message_id, body));
    }

    fn send_to(&self, session_id: u64, frame: &Frame) {
        self.send_raw_to(session_id, frame.encode());
    }

    fn send_raw_to(&self, session_id: u64, text: String) {
        let Some(session) = self.sessions.get(&session_id) else {
            return;
        };
        if let Err(error) = session.to_client.try_send(text) {
            tracing::warn!(session_id, %error, "client queue rejected frame");
        }
    }
}

fn now() -> Timestamp {
    Timestamp::new(chrono::Utc::now())
}

/// In-process broker. Clones share state.
#[derive(Clone)]
pub struct SimBroker {
    state: Arc<Mutex<State>>,
}

impl Default for SimBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SimBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimBroker").finish_non_exhaustive()
    }
}

impl SimBroker {
    /// Broker that accepts connections and echoes commands.
    pub fn new() -> Self {
        Self::with_mode(BrokerMode::Accept)
    }

    /// Broker answering `CONNECT` according to `mode`.
    pub fn with_mode(mode: BrokerMode) -> Self {
        Self { state: Arc::new(Mutex::new(State::new(mode))) }
    }

    /// Change how later handshakes are answered.
    pub async fn set_mode(&self, mode: BrokerMode) {
        self.state.lock().await.mode = mode;
    }

    /// Turn command echo on or off.
    pub async fn set_echo(&self, echo: bool) {
        self.state.lock().await.echo = echo;
    }

    /// Username attached to echoed messages and typing payloads.
    pub async fn set_username(&self, username: &str) {
        username.clone_into(&mut self.state.lock().await.username);
    }

    // Broker-side actions

    /// Publish a raw body to every subscription on `destination`.
    pub async fn publish(&self, destination: Destination, body: &str) -> usize {
        self.state.lock().await.publish(&destination.to_string(), body)
    }

    /// Publish a message from another user on its conversation topic.
    pub async fn publish_message(&self, message: MessagePayload) -> usize {
        let conversation_id = message.conversation_id;
        let mut state = self.state.lock().await;
        state.messages.insert(message.id, message.clone());
        match encode_json(&Envelope::new_message(message)) {
            Ok(body) => state.publish(&Destination::MessageTopic(conversation_id).to_string(), &body),
            Err(error) => {
                tracing::warn!(%error, "envelope not encoded");
                0
            },
        }
    }

    /// Make the broker aware of a message without publishing it, as if it
    /// predates the session.
    pub async fn seed_message(&self, message: MessagePayload) {
        self.state.lock().await.messages.insert(message.id, message);
    }

    /// Publish another user's typing state.
    pub async fn publish_typing(&self, conversation_id: u64, username: &str, typing: bool) -> usize {
        let payload = TypingPayload { username: username.to_owned(), typing };
        match encode_json(&payload) {
            Ok(body) => self.publish(Destination::TypingTopic(conversation_id), &body).await,
            Err(error) => {
                tracing::warn!(%error, "typing payload not encoded");
                0
            },
        }
    }

    /// Send a `MESSAGE` for `subscription` to every session whether or not
    /// it is subscribed.
    pub async fn deliver_raw(&self, subscription: &str, destination: Destination, body: &str) {
        let mut state = self.state.lock().await;
        let sessions: Vec<u64> = state.sessions.keys().copied().collect();
        for session_id in sessions {
            state.deliver(session_id, &destination.to_string(), subscription, body);
        }
    }

    /// Send arbitrary text to every session.
    pub async fn send_raw(&self, text: &str) {
        let state = self.state.lock().await;
        for session_id in state.sessions.keys() {
            state.send_raw_to(*session_id, text.to_owned());
        }
    }

    /// Send `ERROR` to every session.
    pub async fn send_error(&self, message: &str) {
        self.send_raw(&Frame::error(message).encode()).await;
    }

    /// Close every channel from the broker side.
    pub async fn drop_connections(&self) {
        let mut state = self.state.lock().await;
        tracing::debug!(sessions = state.sessions.len(), "dropping connections");
        state.sessions.clear();
    }

    // Inspection

    /// Every `CONNECT` frame received.
    pub async fn handshakes(&self) -> Vec<Frame> {
        self.state.lock().await.handshakes.clone()
    }

    /// Every frame received from clients, in arrival order.
    pub async fn received(&self) -> Vec<Frame> {
        self.state.lock().await.received.clone()
    }

    /// `SEND` frames addressed to `destination`.
    pub async fn sent_to(&self, destination: Destination) -> Vec<Frame> {
        let destination = destination.to_string();
        self.state
            .lock()
            .await
            .received
            .iter()
            .filter(|frame| frame.command == Command::Send && frame.destination() == Some(destination.as_str()))
            .cloned()
            .collect()
    }

    /// Live subscriptions across sessions as `(id, destination)`, sorted.
    pub async fn subscriptions(&self) -> Vec<(String, String)> {
        let state = self.state.lock().await;
        let mut subscriptions: Vec<_> = state
            .sessions
            .values()
            .flat_map(|session| session.subscriptions.iter().map(|(id, dest)| (id.clone(), dest.clone())))
            .collect();
        subscriptions.sort();
        subscriptions
    }

    /// Destinations with a live subscription, sorted.
    pub async fn subscribed_destinations(&self) -> Vec<String> {
        self.subscriptions().await.into_iter().map(|(_, destination)| destination).collect()
    }

    /// Open sessions.
    pub async fn session_count(&self) -> usize {
        self.state.lock().await.sessions.len()
    }

    /// Message as the broker last stored it.
    pub async fn stored_message(&self, id: u64) -> Option<MessagePayload> {
        self.state.lock().await.messages.get(&id).cloned()
    }
}

impl Connector for SimBroker {
    async fn open(&self, request: &ConnectRequest) -> Result<Channel, TransportError> {
        let mut state = self.state.lock().await;
        if state.mode == BrokerMode::Unreachable {
            return Err(TransportError::Connect("broker unreachable".to_owned()));
        }

        let (to_broker, from_client) = mpsc::channel(request.outbound_capacity.max(1));
        let (to_client, inbound) = mpsc::channel(INBOUND_CAPACITY);
        state.next_session += 1;
        let session_id = state.next_session;
        state.sessions.insert(session_id, Session { to_client, subscriptions: BTreeMap::new() });
        tracing::debug!(session_id, "session opened");

        tokio::spawn(serve(Arc::clone(&self.state), session_id, from_client));
        Ok(Channel::new(to_broker, inbound))
    }
}

/// Process client frames until the client closes or the session ends.
async fn serve(state: Arc<Mutex<State>>, session_id: u64, mut from_client: mpsc::Receiver<String>) {
    while let Some(text) = from_client.recv().await {
        let frame = match Frame::decode(&text) {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(error) => {
                tracing::warn!(session_id, %error, "malformed client frame");
                continue;
            },
        };

        let mut state = state.lock().await;
        state.received.push(frame.clone());
        if !state.handle(session_id, frame) {
            break;
        }
    }

    state.lock().await.sessions.remove(&session_id);
    tracing::debug!(session_id, "session closed");
}
