//! Messenger runtime.
//!
//! [`Messenger`] is the single connection context of the client. It owns the
//! channel, the [`SubscriptionRegistry`], the [`ConversationStore`] and every
//! typing timer, and executes what the Sans-IO core decides:
//!
//! - the handshake and teardown of the STOMP session (TransportConnection)
//! - subscription lifecycle and the active-conversation switch
//! - fire-and-forget publishes (CommandPublisher)
//! - driving each conversation's [`parley_core::TypingDebouncer`] with real
//!   timers
//!
//! # Concurrency
//!
//! All mutable session state sits behind one async mutex. The reader task
//! applies inbound frames one at a time under that lock, so a conversation's
//! messages and typing set are never mutated concurrently. Each handshake
//! starts a new session epoch; the reader and timer tasks carry the epoch
//! they were spawned in and do nothing once it is stale, so no dispatch or
//! timer publish is observable after [`Messenger::disconnect`] returns.

use std::sync::{Arc, Weak};

use futures::{Stream, StreamExt, future, stream};
use parley_core::{
    Conversation, ConversationId, ConversationStore, InboundEvent, MessageEventRouter, MessageId, Registered,
    Released, ScheduledTask, StoreEvent, SubscriptionHandle, SubscriptionId, SubscriptionKey, SubscriptionRegistry,
    TopicKind, TypingAction, TypingSignal,
};
use parley_proto::{AppCommand, Command, Destination, EditPayload, Frame, SendPayload, payloads::encode_json};
use tokio::{
    sync::{
        MappedMutexGuard, Mutex, MutexGuard, Notify, broadcast,
        mpsc::{self, error::TrySendError},
        watch,
    },
    task::AbortHandle,
    time::Instant,
};
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};

use crate::{
    api::ConversationApi,
    config::MessengerConfig,
    connector::{Channel, ConnectRequest, ConnectionState, Connector},
    error::{ApiError, ConnectError, OpenError, PublishError, SubscribeError, TransportError},
    subscription::{ConversationView, Subscription},
    token::TokenStore,
};

/// Out-of-band notifications for the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessengerEvent {
    /// The store changed.
    Store(StoreEvent),

    /// The channel dropped without [`Messenger::disconnect`].
    ConnectionLost {
        /// What the transport or broker reported.
        reason: String,
    },
}

type Sink = mpsc::Sender<InboundEvent>;

/// Typing timer backed by a spawned task.
#[derive(Debug)]
struct TimerTask(AbortHandle);

impl ScheduledTask for TimerTask {
    fn cancel(&self) {
        self.0.abort();
    }
}

/// The established channel of one session epoch.
struct Link {
    outbound: mpsc::Sender<String>,
    /// `None` once the reader is the one tearing the link down.
    reader: Option<AbortHandle>,
}

impl Link {
    fn send(&self, frame: &Frame) -> Result<(), PublishError> {
        self.outbound.try_send(frame.encode()).map_err(|error| match error {
            TrySendError::Full(_) => PublishError::Backpressure,
            TrySendError::Closed(_) => PublishError::TransportClosed,
        })
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

struct Session {
    epoch: u64,
    link: Option<Link>,
    registry: SubscriptionRegistry<Sink, TimerTask, Instant>,
    store: ConversationStore,
}

impl Session {
    fn link(&self) -> Result<&Link, PublishError> {
        self.link.as_ref().ok_or(PublishError::NotConnected)
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.epoch == epoch && self.link.is_some()
    }

    fn publish(&self, conversation_id: ConversationId, command: AppCommand, body: Option<String>) -> Result<(), PublishError> {
        let destination = Destination::App(conversation_id.0, command).to_string();
        self.link()?.send(&Frame::send(&destination, body))?;
        tracing::trace!(%destination, "published");
        Ok(())
    }

    /// Send a frame if possible, logging failures.
    fn send_best_effort(&self, frame: &Frame) {
        if let Some(link) = &self.link {
            if let Err(error) = link.send(frame) {
                tracing::debug!(command = %frame.command, %error, "frame not sent");
            }
        }
    }

    /// End the epoch: cancel every timer, forget every subscription and
    /// typing set. Returns the registrations for best-effort `UNSUBSCRIBE`.
    fn teardown(&mut self) -> Vec<Registered<Sink>> {
        self.epoch += 1;
        self.store.clear_all_typing();
        self.registry.drain()
    }
}

struct Inner<C> {
    connector: C,
    tokens: Arc<dyn TokenStore>,
    config: MessengerConfig,
    state: watch::Sender<ConnectionState>,
    transitions: broadcast::Sender<ConnectionState>,
    events: broadcast::Sender<MessengerEvent>,
    connect_lock: Mutex<()>,
    /// Wakes a handshake in flight when `disconnect` cancels it.
    cancel_connect: Notify,
    session: Mutex<Session>,
}

impl<C> Inner<C> {
    /// Move to `next`, publishing the transition. Repeating the current
    /// state is not a transition.
    fn set_state(&self, next: ConnectionState) {
        self.state.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            *state = next;
            // No receivers is fine.
            let _ = self.transitions.send(next);
            true
        });
    }

    fn notify(&self, event: StoreEvent) {
        // No receivers is fine.
        let _ = self.events.send(MessengerEvent::Store(event));
    }
}

/// Connection context: transport, subscriptions, publishing and typing.
///
/// Cheap to clone; clones share one session.
pub struct Messenger<C> {
    inner: Arc<Inner<C>>,
}

impl<C> Clone for Messenger<C> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<C> std::fmt::Debug for Messenger<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Messenger").field("state", &*self.inner.state.borrow()).finish_non_exhaustive()
    }
}

impl<C: Connector> Messenger<C> {
    /// Create a disconnected messenger.
    ///
    /// The token store is consulted on every [`Messenger::connect`].
    pub fn new(connector: C, tokens: Arc<dyn TokenStore>, config: MessengerConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (transitions, _) = broadcast::channel(config.event_capacity.max(1));
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let session = Session {
            epoch: 0,
            link: None,
            registry: SubscriptionRegistry::new(),
            store: ConversationStore::new(),
        };

        Self {
            inner: Arc::new(Inner {
                connector,
                tokens,
                config,
                state,
                transitions,
                events,
                connect_lock: Mutex::new(()),
                cancel_connect: Notify::new(),
                session: Mutex::new(session),
            }),
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &MessengerConfig {
        &self.inner.config
    }

    // Connection

    /// Establish the channel and complete the STOMP handshake.
    ///
    /// Idempotent: when already connected this returns `Ok` without a second
    /// handshake. Concurrent calls are serialized. A [`Messenger::disconnect`]
    /// during the handshake cancels it.
    ///
    /// # Errors
    ///
    /// - [`ConnectError::Timeout`] if `CONNECTED` does not arrive within
    ///   [`MessengerConfig::connect_timeout`]
    /// - [`ConnectError::Rejected`] if the broker answers with `ERROR`
    /// - [`ConnectError::Transport`] if the channel fails or closes, or the
    ///   handshake was cancelled by [`Messenger::disconnect`]
    pub async fn connect(&self) -> Result<(), ConnectError> {
        let _serial = self.inner.connect_lock.lock().await;
        if self.state() == ConnectionState::Connected {
            tracing::debug!("already connected");
            return Ok(());
        }

        let attempt = self.inner.session.lock().await.epoch;
        let cancelled = self.inner.cancel_connect.notified();
        self.inner.set_state(ConnectionState::Connecting);

        let timeout = self.inner.config.connect_timeout;
        let result = tokio::select! {
            result = tokio::time::timeout(timeout, self.handshake()) => {
                result.unwrap_or(Err(ConnectError::Timeout { after: timeout }))
            },
            () = cancelled => Err(ConnectError::Transport(TransportError::Closed)),
        };

        match result {
            Ok(channel) => self.establish(attempt, channel).await,
            Err(error) => {
                self.inner.set_state(ConnectionState::Disconnected);
                tracing::warn!(%error, "connect failed");
                Err(error)
            },
        }
    }

    async fn handshake(&self) -> Result<Channel, ConnectError> {
        let token = self.inner.tokens.token();
        let request =
            ConnectRequest { token: token.clone(), outbound_capacity: self.inner.config.outbound_capacity.max(1) };
        let mut channel = self.inner.connector.open(&request).await?;

        let connect = Frame::connect(&self.inner.config.virtual_host, token.as_deref());
        channel.outbound.send(connect.encode()).await.map_err(|_| TransportError::Closed)?;

        loop {
            let text = channel.inbound.recv().await.ok_or(TransportError::Closed)?;
            let Some(frame) = Frame::decode(&text).map_err(TransportError::from)? else {
                continue;
            };
            match frame.command {
                Command::Connected => {
                    tracing::debug!(version = ?frame.header("version"), "broker confirmed connection");
                    return Ok(channel);
                },
                Command::Error => {
                    let message = frame.header("message").unwrap_or(frame.body()).to_owned();
                    return Err(ConnectError::Rejected { message });
                },
                other => tracing::debug!(command = %other, "ignoring frame before CONNECTED"),
            }
        }
    }

    /// Install the handshaken channel, unless a disconnect ended `attempt`'s
    /// epoch in the meantime.
    async fn establish(&self, attempt: u64, channel: Channel) -> Result<(), ConnectError> {
        let mut session = self.inner.session.lock().await;
        if session.epoch != attempt {
            tracing::debug!(attempt, epoch = session.epoch, "handshake cancelled, dropping channel");
            return Err(TransportError::Closed.into());
        }

        let Channel { outbound, inbound } = channel;
        session.epoch += 1;
        let epoch = session.epoch;

        let reader = tokio::spawn(read_loop(Arc::downgrade(&self.inner), epoch, inbound));
        session.link = Some(Link { outbound, reader: Some(reader.abort_handle()) });
        self.inner.set_state(ConnectionState::Connected);
        tracing::info!(epoch, "connected");
        Ok(())
    }

    /// Tear the session down.
    ///
    /// Cancels every typing timer, releases every subscription (sending
    /// `UNSUBSCRIBE` best-effort), sends `DISCONNECT` and closes the channel.
    /// No-op when already disconnected.
    pub async fn disconnect(&self) {
        let mut session = self.inner.session.lock().await;
        let Some(link) = session.link.take() else {
            if self.state() == ConnectionState::Connecting {
                session.teardown();
                self.inner.set_state(ConnectionState::Disconnected);
                self.inner.cancel_connect.notify_waiters();
                tracing::info!("handshake cancelled");
            } else {
                tracing::debug!("already disconnected");
            }
            return;
        };

        for registered in session.teardown() {
            if let Err(error) = link.send(&Frame::unsubscribe(&registered.handle.id.to_string())) {
                tracing::debug!(key = %registered.handle.key, %error, "UNSUBSCRIBE not sent");
            }
        }
        if let Err(error) = link.send(&Frame::disconnect()) {
            tracing::debug!(%error, "DISCONNECT not sent");
        }
        drop(link);

        self.inner.set_state(ConnectionState::Disconnected);
        tracing::info!("disconnected");
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Stream of connection states: the current one first, then every
    /// transition in order. Ends when the messenger is dropped.
    ///
    /// Transitions queue up to [`MessengerConfig::event_capacity`] per
    /// stream; a consumer further behind than that loses the oldest ones
    /// with a warn log.
    pub fn connection_state(&self) -> impl Stream<Item = ConnectionState> + Send + 'static {
        // Holding the watch borrow orders the snapshot before any transition
        // the receiver sees.
        let current = self.inner.state.borrow();
        let transitions = self.inner.transitions.subscribe();
        let first = *current;
        drop(current);

        stream::once(future::ready(first)).chain(BroadcastStream::new(transitions).filter_map(|item| {
            future::ready(match item {
                Ok(state) => Some(state),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "connection state receiver lagged");
                    None
                },
            })
        }))
    }

    /// Store changes and connection loss notifications.
    pub fn events(&self) -> broadcast::Receiver<MessengerEvent> {
        self.inner.events.subscribe()
    }

    // Inbound

    /// Handle one inbound WebSocket message. Returns `false` when the reader
    /// should stop.
    async fn dispatch(&self, epoch: u64, text: &str) -> bool {
        let frame = match Frame::decode(text) {
            Ok(Some(frame)) => frame,
            Ok(None) => return true,
            Err(error) => {
                tracing::warn!(%error, "discarding malformed frame");
                return true;
            },
        };

        match frame.command {
            Command::Message => self.deliver(epoch, &frame).await,
            Command::Error => {
                let reason = frame.header("message").unwrap_or(frame.body()).to_owned();
                self.connection_lost(epoch, &reason).await;
                false
            },
            other => {
                tracing::debug!(command = %other, "ignoring frame");
                true
            },
        }
    }

    async fn deliver(&self, epoch: u64, frame: &Frame) -> bool {
        let mut session = self.inner.session.lock().await;
        if !session.is_current(epoch) {
            return false;
        }

        let Some(id) = frame.subscription().and_then(|raw| raw.parse::<SubscriptionId>().ok()) else {
            tracing::debug!(subscription = ?frame.subscription(), "MESSAGE without a known subscription id");
            return true;
        };

        let Session { registry, store, .. } = &mut *session;
        let Some((handle, sink)) = registry.get(id) else {
            tracing::debug!(%id, "MESSAGE for released subscription");
            return true;
        };
        let key = handle.key;

        let Some(routed) = MessageEventRouter::route(store, key.conversation_id, key.kind, frame.body()) else {
            return true;
        };
        for change in routed.changes {
            self.inner.notify(change);
        }
        match sink.try_send(routed.event) {
            Ok(()) => {},
            Err(TrySendError::Full(_)) => tracing::warn!(%key, "subscriber lagging, stream item dropped"),
            Err(TrySendError::Closed(_)) => tracing::trace!(%key, "subscription stream dropped"),
        }
        true
    }

    async fn connection_lost(&self, epoch: u64, reason: &str) {
        let mut session = self.inner.session.lock().await;
        if !session.is_current(epoch) {
            return;
        }
        if let Some(mut link) = session.link.take() {
            // Called from the reader itself.
            link.reader = None;
        }
        session.teardown();

        self.inner.set_state(ConnectionState::Disconnected);
        let _ = self.inner.events.send(MessengerEvent::ConnectionLost { reason: reason.to_owned() });
        tracing::warn!(epoch, reason, "connection lost");
    }

    // Subscriptions

    /// Subscribe to one topic of a conversation.
    ///
    /// A live handle for the same key is released first and its stream ends,
    /// so there is never more than one handle per key.
    ///
    /// # Errors
    ///
    /// [`SubscribeError::NotConnected`] unless connected.
    pub async fn subscribe(&self, conversation_id: ConversationId, kind: TopicKind) -> Result<Subscription, SubscribeError> {
        let mut session = self.inner.session.lock().await;
        self.subscribe_locked(&mut session, SubscriptionKey { conversation_id, kind })
    }

    fn subscribe_locked(&self, session: &mut Session, key: SubscriptionKey) -> Result<Subscription, SubscribeError> {
        if session.link.is_none() {
            return Err(SubscribeError::NotConnected);
        }

        let (sink, events) = mpsc::channel(self.inner.config.subscription_capacity.max(1));
        let (handle, displaced) = session.registry.insert(key, sink);
        if let Some(displaced) = displaced {
            session.send_best_effort(&Frame::unsubscribe(&displaced.handle.id.to_string()));
            tracing::debug!(%key, id = %displaced.handle.id, "replaced subscription");
        }

        let frame = Frame::subscribe(&handle.id.to_string(), &handle.destination);
        if let Err(error) = session.link().and_then(|link| link.send(&frame)) {
            if let Some(released) = session.registry.remove_handle(&handle) {
                self.release(session, released);
            }
            return Err(SubscribeError::Send(error));
        }

        tracing::debug!(%key, id = %handle.id, destination = %handle.destination, "subscribed");
        Ok(Subscription::new(handle, events))
    }

    /// Release the subscription for a key. Unknown keys are a no-op.
    pub async fn unsubscribe(&self, conversation_id: ConversationId, kind: TopicKind) {
        let key = SubscriptionKey { conversation_id, kind };
        let mut session = self.inner.session.lock().await;
        match session.registry.remove(key) {
            Some(released) => self.release(&mut session, released),
            None => tracing::debug!(%key, "subscription not found"),
        }
    }

    /// Release exactly this handle. A handle that was already replaced or
    /// released is a no-op.
    pub async fn unsubscribe_handle(&self, handle: &SubscriptionHandle) {
        let mut session = self.inner.session.lock().await;
        match session.registry.remove_handle(handle) {
            Some(released) => self.release(&mut session, released),
            None => tracing::debug!(key = %handle.key, id = %handle.id, "subscription not found"),
        }
    }

    /// Release every subscription.
    pub async fn unsubscribe_all(&self) {
        let mut session = self.inner.session.lock().await;
        for key in session.registry.keys() {
            if let Some(released) = session.registry.remove(key) {
                self.release(&mut session, released);
            }
        }
    }

    /// Switch the active conversation.
    ///
    /// Releases both subscriptions of the previously active conversation
    /// when it differs, then subscribes both topics of `conversation_id`.
    ///
    /// # Errors
    ///
    /// [`SubscribeError::NotConnected`] unless connected. On failure no
    /// conversation is left active.
    pub async fn open_conversation(&self, conversation_id: ConversationId) -> Result<ConversationView, SubscribeError> {
        let mut session = self.inner.session.lock().await;
        if session.link.is_none() {
            return Err(SubscribeError::NotConnected);
        }

        for released in session.registry.activate(conversation_id) {
            self.release(&mut session, released);
        }

        let opened = self.subscribe_locked(&mut session, SubscriptionKey::messages(conversation_id)).and_then(|messages| {
            let typing = self.subscribe_locked(&mut session, SubscriptionKey::typing(conversation_id))?;
            Ok(ConversationView { conversation_id, messages, typing })
        });
        if opened.is_err() {
            for released in session.registry.deactivate() {
                self.release(&mut session, released);
            }
        }
        opened
    }

    /// Release the active conversation without opening another.
    pub async fn close_conversation(&self) {
        let mut session = self.inner.session.lock().await;
        for released in session.registry.deactivate() {
            self.release(&mut session, released);
        }
    }

    /// Live subscription keys, sorted.
    pub async fn active_subscriptions(&self) -> Vec<SubscriptionKey> {
        self.inner.session.lock().await.registry.keys()
    }

    /// Conversation currently open, if any.
    pub async fn active_conversation(&self) -> Option<ConversationId> {
        self.inner.session.lock().await.registry.active()
    }

    fn release(&self, session: &mut Session, released: Released<Sink, Instant>) {
        let Released { handle, sink, typing } = released;
        drop(sink);
        session.send_best_effort(&Frame::unsubscribe(&handle.id.to_string()));

        let conversation_id = handle.key.conversation_id;
        if handle.key.kind == TopicKind::Typing && session.store.clear_typing(conversation_id) {
            self.inner.notify(StoreEvent::TypingChanged { conversation_id, users: Vec::new() });
        }

        // The registry has already cancelled the timer; only the stop is left.
        if let Some(mut debouncer) = typing {
            if debouncer.finish().contains(&TypingAction::Publish(TypingSignal::Stopped)) {
                if let Err(error) = session.publish(conversation_id, AppCommand::StopTyping, None) {
                    tracing::debug!(%conversation_id, %error, "stop-typing not sent");
                }
            }
        }

        tracing::debug!(key = %handle.key, id = %handle.id, "unsubscribed");
    }

    // Publishing

    /// Post a message. It shows up locally only once the broker echoes it.
    ///
    /// Also ends the local typing period: "stopped typing" is published
    /// first if it had been announced, and the timer is cancelled.
    ///
    /// # Errors
    ///
    /// [`PublishError::NotConnected`], [`PublishError::EmptyContent`],
    /// [`PublishError::Backpressure`] or [`PublishError::TransportClosed`].
    pub async fn send_message(&self, conversation_id: ConversationId, content: &str) -> Result<(), PublishError> {
        let mut session = self.inner.session.lock().await;
        session.link()?;
        if content.trim().is_empty() {
            return Err(PublishError::EmptyContent);
        }
        let body = encode_json(&SendPayload { conversation_id: conversation_id.0, content: content.to_owned() })?;

        let actions = session.registry.finish_typing(conversation_id);
        if let Err(error) = self.execute_typing(&mut session, conversation_id, actions) {
            tracing::debug!(%conversation_id, %error, "stop-typing not sent");
        }
        session.publish(conversation_id, AppCommand::Send, Some(body))
    }

    /// Replace the content of a message.
    ///
    /// # Errors
    ///
    /// As [`Messenger::send_message`].
    pub async fn edit_message(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
        content: &str,
    ) -> Result<(), PublishError> {
        let session = self.inner.session.lock().await;
        session.link()?;
        if content.trim().is_empty() {
            return Err(PublishError::EmptyContent);
        }
        let body = encode_json(&EditPayload { message_id: message_id.0, content: content.to_owned() })?;
        session.publish(conversation_id, AppCommand::Edit, Some(body))
    }

    /// Mark a message read.
    ///
    /// # Errors
    ///
    /// [`PublishError::NotConnected`], [`PublishError::Backpressure`] or
    /// [`PublishError::TransportClosed`].
    pub async fn mark_read(&self, conversation_id: ConversationId, message_id: MessageId) -> Result<(), PublishError> {
        let session = self.inner.session.lock().await;
        session.publish(conversation_id, AppCommand::MarkRead, Some(message_id.0.to_string()))
    }

    /// Publish "typing" without touching the debouncer.
    ///
    /// # Errors
    ///
    /// As [`Messenger::mark_read`].
    pub async fn notify_typing(&self, conversation_id: ConversationId) -> Result<(), PublishError> {
        let session = self.inner.session.lock().await;
        session.publish(conversation_id, AppCommand::Typing, None)
    }

    /// Publish "stopped typing" without touching the debouncer.
    ///
    /// # Errors
    ///
    /// As [`Messenger::mark_read`].
    pub async fn notify_stop_typing(&self, conversation_id: ConversationId) -> Result<(), PublishError> {
        let session = self.inner.session.lock().await;
        session.publish(conversation_id, AppCommand::StopTyping, None)
    }

    /// Report a local keystroke in a conversation's compose box.
    ///
    /// The first keystroke of a burst publishes "typing"; "stopped typing"
    /// follows once [`MessengerConfig::typing_window`] passes without
    /// another keystroke. Keystrokes for a conversation without a live
    /// subscription are ignored.
    ///
    /// # Errors
    ///
    /// As [`Messenger::mark_read`].
    pub async fn keystroke(&self, conversation_id: ConversationId) -> Result<(), PublishError> {
        let mut session = self.inner.session.lock().await;
        session.link()?;
        let actions = session.registry.keystroke(conversation_id, self.inner.config.typing_window, Instant::now());
        self.execute_typing(&mut session, conversation_id, actions)
    }

    fn execute_typing(
        &self,
        session: &mut Session,
        conversation_id: ConversationId,
        actions: Vec<TypingAction<Instant>>,
    ) -> Result<(), PublishError> {
        let mut outcome = Ok(());
        for action in actions {
            match action {
                TypingAction::Publish(signal) => {
                    let command = match signal {
                        TypingSignal::Started => AppCommand::Typing,
                        TypingSignal::Stopped => AppCommand::StopTyping,
                    };
                    if let Err(error) = session.publish(conversation_id, command, None) {
                        outcome = Err(error);
                    }
                },
                TypingAction::Arm { deadline } => {
                    let task = self.spawn_timer(session.epoch, conversation_id, deadline);
                    session.registry.arm(conversation_id, task);
                },
                TypingAction::Disarm => session.registry.disarm(conversation_id),
            }
        }
        outcome
    }

    fn spawn_timer(&self, epoch: u64, conversation_id: ConversationId, deadline: Instant) -> TimerTask {
        let inner = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(inner) = inner.upgrade() {
                Messenger { inner }.typing_expired(epoch, conversation_id).await;
            }
        });
        TimerTask(task.abort_handle())
    }

    async fn typing_expired(&self, epoch: u64, conversation_id: ConversationId) {
        let mut session = self.inner.session.lock().await;
        if !session.is_current(epoch) {
            return;
        }
        let actions = session.registry.expire(conversation_id, Instant::now());
        if let Err(error) = self.execute_typing(&mut session, conversation_id, actions) {
            tracing::debug!(%conversation_id, %error, "stop-typing not sent");
        }
    }

    // Store

    /// Lock the conversation store.
    ///
    /// Inbound dispatch waits while the guard is held; keep it short.
    pub async fn store(&self) -> MappedMutexGuard<'_, ConversationStore> {
        MutexGuard::map(self.inner.session.lock().await, |session| &mut session.store)
    }

    /// Snapshot of one conversation.
    pub async fn conversation(&self, id: ConversationId) -> Option<Conversation> {
        self.store().await.get(id).cloned()
    }

    /// Users typing in a conversation, sorted.
    pub async fn typing_users(&self, id: ConversationId) -> Vec<String> {
        self.store().await.typing_users(id)
    }

    // REST collaborator

    /// Replace the conversation directory with the server's list.
    ///
    /// Returns the number of conversations loaded.
    pub async fn refresh_conversations(&self, api: &impl ConversationApi) -> Result<usize, ApiError> {
        let conversations = api.list_conversations().await?;
        let count = conversations.len();
        self.store().await.load_conversations(conversations);
        tracing::debug!(count, "conversations refreshed");
        Ok(count)
    }

    /// Fetch a conversation's history, then make it the active one.
    pub async fn open_conversation_with_history(
        &self,
        api: &impl ConversationApi,
        id: ConversationId,
    ) -> Result<ConversationView, OpenError> {
        let conversation = api.get_conversation(id).await?;
        self.store().await.load_conversation(conversation);
        Ok(self.open_conversation(id).await?)
    }

    /// Create a conversation and add it to the store.
    pub async fn create_conversation(&self, api: &impl ConversationApi, name: &str) -> Result<Conversation, ApiError> {
        let conversation = api.create_conversation(name).await?;
        self.store().await.load_conversation(conversation.clone());
        Ok(conversation)
    }

    /// Rename a conversation on the server and in the store.
    pub async fn rename_conversation(
        &self,
        api: &impl ConversationApi,
        id: ConversationId,
        name: &str,
    ) -> Result<(), ApiError> {
        let renamed = api.rename_conversation(id, name).await?;
        let mut store = self.store().await;
        if store.rename_conversation(id, renamed.name.clone()).is_err() {
            store.load_conversation(renamed);
        }
        Ok(())
    }

    /// Delete a conversation, releasing its subscriptions.
    pub async fn delete_conversation(&self, api: &impl ConversationApi, id: ConversationId) -> Result<(), ApiError> {
        api.delete_conversation(id).await?;
        let mut session = self.inner.session.lock().await;
        let released = if session.registry.active() == Some(id) {
            session.registry.deactivate()
        } else {
            session.registry.release_conversation(id)
        };
        for released in released {
            self.release(&mut session, released);
        }
        session.store.remove_conversation(id);
        Ok(())
    }
}

/// Feed inbound messages to the messenger until the channel closes or the
/// epoch ends.
async fn read_loop<C: Connector>(inner: Weak<Inner<C>>, epoch: u64, mut inbound: mpsc::Receiver<String>) {
    while let Some(text) = inbound.recv().await {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        if !(Messenger { inner }).dispatch(epoch, &text).await {
            return;
        }
    }

    if let Some(inner) = inner.upgrade() {
        Messenger { inner }.connection_lost(epoch, "transport closed").await;
    }
}
