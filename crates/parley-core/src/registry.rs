//! Subscription registry.
//!
//! The registry is the one place that knows what is currently subscribed.
//! It maps `(conversation, topic kind)` keys to live handles and their
//! delivery sinks, tracks which conversation the UI has open, and owns each
//! conversation's typing debouncer together with its armed timer.
//!
//! The registry is generic over the sink `S` that receives a subscription's
//! events, the scheduled task `T` that backs a typing timer, and the instant
//! type `I` the debouncer measures time in. It performs no I/O: callers send
//! the `SUBSCRIBE`/`UNSUBSCRIBE` frames for the handles it hands back.
//!
//! # Invariants
//!
//! - Unique Key: at most one live handle per `(conversation, kind)`.
//!   Inserting over an existing key hands the old registration back to the
//!   caller for release.
//! - Timer Ownership: a typing timer is cancelled whenever the last handle of
//!   its conversation is released, and on [`SubscriptionRegistry::drain`].
//! - Single Active: at most one conversation is active; activating another
//!   releases every handle of the previous one first.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    ops::Add,
    str::FromStr,
    time::Duration,
};

use parley_proto::Destination;

use crate::{
    model::ConversationId,
    typing::{TypingAction, TypingDebouncer},
};

/// Category of a conversation subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TopicKind {
    /// New and edited messages on `/topic/conversation/{id}`.
    NewMessage,
    /// Typing presence on `/topic/conversation/{id}/typing`.
    Typing,
}

impl TopicKind {
    /// Every kind, in subscription order.
    pub const ALL: [Self; 2] = [Self::NewMessage, Self::Typing];

    /// Broker destination for this kind in a conversation.
    pub fn destination(self, conversation_id: ConversationId) -> Destination {
        match self {
            Self::NewMessage => Destination::MessageTopic(conversation_id.0),
            Self::Typing => Destination::TypingTopic(conversation_id.0),
        }
    }
}

impl fmt::Display for TopicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NewMessage => f.write_str("messages"),
            Self::Typing => f.write_str("typing"),
        }
    }
}

/// Registry key: one subscription slot per conversation and kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionKey {
    /// Conversation subscribed to.
    pub conversation_id: ConversationId,
    /// Topic kind.
    pub kind: TopicKind,
}

impl SubscriptionKey {
    /// Key for a conversation's message topic.
    pub fn messages(conversation_id: ConversationId) -> Self {
        Self { conversation_id, kind: TopicKind::NewMessage }
    }

    /// Key for a conversation's typing topic.
    pub fn typing(conversation_id: ConversationId) -> Self {
        Self { conversation_id, kind: TopicKind::Typing }
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.conversation_id, self.kind)
    }
}

/// STOMP subscription id, carried in the `id` header of `SUBSCRIBE` and the
/// `subscription` header of `MESSAGE`. Rendered as `sub-<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

impl FromStr for SubscriptionId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix("sub-").and_then(|n| n.parse().ok()).map(Self).ok_or(())
    }
}

/// Opaque reference to one live subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    /// Slot this handle occupies.
    pub key: SubscriptionKey,
    /// Wire id.
    pub id: SubscriptionId,
    /// Broker destination.
    pub destination: String,
}

/// A registration removed from the registry without releasing a timer.
#[derive(Debug)]
pub struct Registered<S> {
    /// Handle that was live.
    pub handle: SubscriptionHandle,
    /// Its sink.
    pub sink: S,
}

/// A registration released by key or handle.
#[derive(Debug)]
pub struct Released<S, I> {
    /// Handle that was live.
    pub handle: SubscriptionHandle,
    /// Its sink.
    pub sink: S,
    /// The conversation's debouncer, when this was the conversation's last
    /// handle and it had one. Its timer has already been cancelled; the
    /// caller decides whether an announced period still needs a stop.
    pub typing: Option<TypingDebouncer<I>>,
}

/// A cancellable scheduled task, such as a typing timer.
pub trait ScheduledTask {
    /// Cancel the task. Must be idempotent.
    fn cancel(&self);
}

struct Entry<S> {
    handle: SubscriptionHandle,
    sink: S,
}

struct TypingSlot<T, I> {
    debouncer: TypingDebouncer<I>,
    task: Option<T>,
}

impl<T: ScheduledTask, I> TypingSlot<T, I> {
    fn cancel_task(&mut self) {
        if let Some(task) = self.task.take() {
            task.cancel();
        }
    }
}

/// Live subscriptions, the active conversation and typing timers.
pub struct SubscriptionRegistry<S, T, I> {
    next_id: u64,
    entries: BTreeMap<SubscriptionKey, Entry<S>>,
    ids: HashMap<SubscriptionId, SubscriptionKey>,
    typing: HashMap<ConversationId, TypingSlot<T, I>>,
    active: Option<ConversationId>,
}

impl<S, T, I> Default for SubscriptionRegistry<S, T, I> {
    fn default() -> Self {
        Self {
            next_id: 0,
            entries: BTreeMap::new(),
            ids: HashMap::new(),
            typing: HashMap::new(),
            active: None,
        }
    }
}

impl<S, T, I> fmt::Debug for SubscriptionRegistry<S, T, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("keys", &self.entries.keys().collect::<Vec<_>>())
            .field("timers", &self.typing.values().filter(|slot| slot.task.is_some()).count())
            .field("active", &self.active)
            .finish()
    }
}

impl<S, T, I> SubscriptionRegistry<S, T, I>
where
    T: ScheduledTask,
    I: Copy + Ord + Add<Duration, Output = I>,
{
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscription for `key`.
    ///
    /// Returns the new handle and, if `key` was already occupied, the
    /// registration it displaced. The caller must unsubscribe the displaced
    /// handle on the wire.
    pub fn insert(&mut self, key: SubscriptionKey, sink: S) -> (SubscriptionHandle, Option<Registered<S>>) {
        self.next_id += 1;
        let handle = SubscriptionHandle {
            key,
            id: SubscriptionId(self.next_id),
            destination: key.kind.destination(key.conversation_id).to_string(),
        };

        let displaced = self.entries.insert(key, Entry { handle: handle.clone(), sink }).map(|old| {
            self.ids.remove(&old.handle.id);
            Registered { handle: old.handle, sink: old.sink }
        });
        self.ids.insert(handle.id, key);

        (handle, displaced)
    }

    /// Handle and sink registered under a wire id.
    pub fn get(&self, id: SubscriptionId) -> Option<(&SubscriptionHandle, &S)> {
        let key = self.ids.get(&id)?;
        self.entries.get(key).map(|entry| (&entry.handle, &entry.sink))
    }

    /// Live handle for a key.
    pub fn handle(&self, key: SubscriptionKey) -> Option<&SubscriptionHandle> {
        self.entries.get(&key).map(|entry| &entry.handle)
    }

    /// Whether `key` has a live handle.
    pub fn contains(&self, key: SubscriptionKey) -> bool {
        self.entries.contains_key(&key)
    }

    /// Release the handle under `key`. `None` if nothing was registered.
    pub fn remove(&mut self, key: SubscriptionKey) -> Option<Released<S, I>> {
        let entry = self.entries.remove(&key)?;
        self.ids.remove(&entry.handle.id);

        let conversation_id = key.conversation_id;
        let typing = if self.has_handles(conversation_id) {
            None
        } else {
            if self.active == Some(conversation_id) {
                self.active = None;
            }
            self.typing.remove(&conversation_id).map(|mut slot| {
                slot.cancel_task();
                slot.debouncer
            })
        };

        Some(Released { handle: entry.handle, sink: entry.sink, typing })
    }

    /// Release exactly this handle.
    ///
    /// A handle that was already displaced or released is a no-op, even if
    /// its key has since been reused.
    pub fn remove_handle(&mut self, handle: &SubscriptionHandle) -> Option<Released<S, I>> {
        if self.ids.get(&handle.id) != Some(&handle.key) {
            return None;
        }
        self.remove(handle.key)
    }

    /// Release every handle of a conversation.
    pub fn release_conversation(&mut self, conversation_id: ConversationId) -> Vec<Released<S, I>> {
        TopicKind::ALL
            .into_iter()
            .filter_map(|kind| self.remove(SubscriptionKey { conversation_id, kind }))
            .collect()
    }

    /// Remove every registration and cancel every timer.
    pub fn drain(&mut self) -> Vec<Registered<S>> {
        for slot in self.typing.values_mut() {
            slot.cancel_task();
        }
        self.typing.clear();
        self.ids.clear();
        self.active = None;

        std::mem::take(&mut self.entries)
            .into_values()
            .map(|entry| Registered { handle: entry.handle, sink: entry.sink })
            .collect()
    }

    /// Make `conversation_id` the active conversation.
    ///
    /// Releases every handle of the previously active conversation, if it
    /// differs. The caller subscribes the new conversation afterwards.
    pub fn activate(&mut self, conversation_id: ConversationId) -> Vec<Released<S, I>> {
        let released = match self.active {
            Some(previous) if previous != conversation_id => self.release_conversation(previous),
            _ => Vec::new(),
        };
        self.active = Some(conversation_id);
        released
    }

    /// Clear the active conversation, releasing its handles.
    pub fn deactivate(&mut self) -> Vec<Released<S, I>> {
        match self.active.take() {
            Some(previous) => self.release_conversation(previous),
            None => Vec::new(),
        }
    }

    /// Active conversation, if any.
    pub fn active(&self) -> Option<ConversationId> {
        self.active
    }

    /// Live keys, sorted.
    pub fn keys(&self) -> Vec<SubscriptionKey> {
        self.entries.keys().copied().collect()
    }

    /// Live handles, sorted by key.
    pub fn handles(&self) -> Vec<SubscriptionHandle> {
        self.entries.values().map(|entry| entry.handle.clone()).collect()
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is subscribed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Typing debouncer for a conversation, if one exists.
    pub fn debouncer(&self, conversation_id: ConversationId) -> Option<&TypingDebouncer<I>> {
        self.typing.get(&conversation_id).map(|slot| &slot.debouncer)
    }

    /// Feed a local keystroke to the conversation's debouncer, creating it
    /// with `window` if absent.
    ///
    /// Ignored for a conversation without a live handle: its debouncer and
    /// timer live only as long as its subscriptions.
    pub fn keystroke(&mut self, conversation_id: ConversationId, window: Duration, now: I) -> Vec<TypingAction<I>> {
        if !self.has_handles(conversation_id) {
            return Vec::new();
        }
        self.typing
            .entry(conversation_id)
            .or_insert_with(|| TypingSlot { debouncer: TypingDebouncer::new(window), task: None })
            .debouncer
            .keystroke(now)
    }

    /// The conversation's timer fired at `now`.
    ///
    /// When this ends the Announced period the timer is forgotten without
    /// being cancelled, since it is the caller. A stale expiry leaves the
    /// current timer in place.
    pub fn expire(&mut self, conversation_id: ConversationId, now: I) -> Vec<TypingAction<I>> {
        let Some(slot) = self.typing.get_mut(&conversation_id) else {
            return Vec::new();
        };
        let actions = slot.debouncer.expire(now);
        if !actions.is_empty() {
            slot.task = None;
        }
        actions
    }

    /// End the conversation's Announced period early, e.g. on send.
    pub fn finish_typing(&mut self, conversation_id: ConversationId) -> Vec<TypingAction<I>> {
        self.typing.get_mut(&conversation_id).map(|slot| slot.debouncer.finish()).unwrap_or_default()
    }

    /// Install `task` as the conversation's typing timer, cancelling the one
    /// it replaces. Without a debouncer the task is cancelled immediately.
    pub fn arm(&mut self, conversation_id: ConversationId, task: T) {
        match self.typing.get_mut(&conversation_id) {
            Some(slot) => {
                slot.cancel_task();
                slot.task = Some(task);
            },
            None => task.cancel(),
        }
    }

    /// Cancel the conversation's typing timer.
    pub fn disarm(&mut self, conversation_id: ConversationId) {
        if let Some(slot) = self.typing.get_mut(&conversation_id) {
            slot.cancel_task();
        }
    }

    /// Whether the conversation has an armed timer.
    pub fn has_timer(&self, conversation_id: ConversationId) -> bool {
        self.typing.get(&conversation_id).is_some_and(|slot| slot.task.is_some())
    }

    /// Number of armed timers.
    pub fn timer_count(&self) -> usize {
        self.typing.values().filter(|slot| slot.task.is_some()).count()
    }

    fn has_handles(&self, conversation_id: ConversationId) -> bool {
        TopicKind::ALL
            .into_iter()
            .any(|kind| self.entries.contains_key(&SubscriptionKey { conversation_id, kind }))
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, rc::Rc, time::Instant};

    use super::*;
    use crate::typing::{DEFAULT_TYPING_WINDOW, TypingSignal};

    #[derive(Clone, Default)]
    struct Task(Rc<Cell<u32>>);

    impl ScheduledTask for Task {
        fn cancel(&self) {
            self.0.set(self.0.get() + 1);
        }
    }

    impl Task {
        fn cancellations(&self) -> u32 {
            self.0.get()
        }
    }

    type Registry = SubscriptionRegistry<&'static str, Task, Instant>;

    const CONV: ConversationId = ConversationId(42);

    #[test]
    fn insert_assigns_destination_and_id() {
        let mut registry = Registry::new();

        let (messages, _) = registry.insert(SubscriptionKey::messages(CONV), "m");
        let (typing, _) = registry.insert(SubscriptionKey::typing(CONV), "t");

        assert_eq!(messages.destination, "/topic/conversation/42");
        assert_eq!(typing.destination, "/topic/conversation/42/typing");
        assert_ne!(messages.id, typing.id);
        assert_eq!(registry.get(messages.id).map(|(_, sink)| *sink), Some("m"));
    }

    #[test]
    fn reinsert_displaces_previous_handle() {
        let mut registry = Registry::new();
        let key = SubscriptionKey::messages(CONV);

        let (first, none) = registry.insert(key, "a");
        let (second, displaced) = registry.insert(key, "b");

        assert!(none.is_none());
        let displaced = displaced.unwrap();
        assert_eq!(displaced.handle, first);
        assert_eq!(displaced.sink, "a");
        assert_eq!(registry.len(), 1);
        assert!(registry.get(first.id).is_none());
        assert_eq!(registry.handle(key), Some(&second));
    }

    #[test]
    fn stale_handle_release_is_noop() {
        let mut registry = Registry::new();
        let key = SubscriptionKey::messages(CONV);
        let (first, _) = registry.insert(key, "a");
        registry.insert(key, "b");

        assert!(registry.remove_handle(&first).is_none());
        assert!(registry.contains(key));
    }

    #[test]
    fn unknown_key_release_is_noop() {
        let mut registry = Registry::new();
        assert!(registry.remove(SubscriptionKey::typing(CONV)).is_none());
    }

    #[test]
    fn last_release_cancels_typing_timer() {
        let mut registry = Registry::new();
        registry.insert(SubscriptionKey::messages(CONV), "m");
        registry.insert(SubscriptionKey::typing(CONV), "t");

        let actions = registry.keystroke(CONV, DEFAULT_TYPING_WINDOW, Instant::now());
        assert_eq!(actions[0], TypingAction::Publish(TypingSignal::Started));
        let task = Task::default();
        registry.arm(CONV, task.clone());

        let first = registry.remove(SubscriptionKey::messages(CONV)).unwrap();
        assert!(first.typing.is_none());
        assert_eq!(task.cancellations(), 0);

        let last = registry.remove(SubscriptionKey::typing(CONV)).unwrap();
        assert!(last.typing.is_some_and(|debouncer| debouncer.is_announced()));
        assert_eq!(task.cancellations(), 1);
        assert!(!registry.has_timer(CONV));
    }

    #[test]
    fn rearm_cancels_replaced_task() {
        let mut registry = Registry::new();
        registry.insert(SubscriptionKey::typing(CONV), "t");
        registry.keystroke(CONV, DEFAULT_TYPING_WINDOW, Instant::now());
        let first = Task::default();
        let second = Task::default();

        registry.arm(CONV, first.clone());
        registry.arm(CONV, second.clone());

        assert_eq!(first.cancellations(), 1);
        assert_eq!(second.cancellations(), 0);
        assert_eq!(registry.timer_count(), 1);
    }

    #[test]
    fn keystroke_without_handle_is_ignored() {
        let mut registry = Registry::new();

        assert!(registry.keystroke(CONV, DEFAULT_TYPING_WINDOW, Instant::now()).is_empty());
        assert!(registry.debouncer(CONV).is_none());

        registry.insert(SubscriptionKey::messages(CONV), "m");
        registry.remove(SubscriptionKey::messages(CONV));
        assert!(registry.keystroke(CONV, DEFAULT_TYPING_WINDOW, Instant::now()).is_empty());
        assert!(registry.debouncer(CONV).is_none());
    }

    #[test]
    fn arm_without_debouncer_cancels_immediately() {
        let mut registry = Registry::new();
        let task = Task::default();

        registry.arm(CONV, task.clone());

        assert_eq!(task.cancellations(), 1);
        assert!(!registry.has_timer(CONV));
    }

    #[test]
    fn drain_empties_and_cancels_everything() {
        let mut registry = Registry::new();
        let other = ConversationId(7);
        for conversation_id in [CONV, other] {
            registry.insert(SubscriptionKey::messages(conversation_id), "m");
            registry.keystroke(conversation_id, DEFAULT_TYPING_WINDOW, Instant::now());
        }
        let tasks = [Task::default(), Task::default()];
        registry.arm(CONV, tasks[0].clone());
        registry.arm(other, tasks[1].clone());
        registry.activate(CONV);

        let drained = registry.drain();

        assert_eq!(drained.len(), 2);
        assert!(registry.is_empty());
        assert_eq!(registry.active(), None);
        assert_eq!(registry.timer_count(), 0);
        assert!(tasks.iter().all(|task| task.cancellations() == 1));
    }

    #[test]
    fn activate_releases_previous_conversation() {
        let mut registry = Registry::new();
        let next = ConversationId(43);
        registry.activate(CONV);
        registry.insert(SubscriptionKey::messages(CONV), "m");
        registry.insert(SubscriptionKey::typing(CONV), "t");

        let released = registry.activate(next);

        let keys: Vec<_> = released.iter().map(|r| r.handle.key).collect();
        assert_eq!(keys, vec![SubscriptionKey::messages(CONV), SubscriptionKey::typing(CONV)]);
        assert!(registry.is_empty());
        assert_eq!(registry.active(), Some(next));
    }

    #[test]
    fn reactivating_same_conversation_keeps_handles() {
        let mut registry = Registry::new();
        registry.activate(CONV);
        registry.insert(SubscriptionKey::messages(CONV), "m");

        assert!(registry.activate(CONV).is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn releasing_active_conversation_clears_active() {
        let mut registry = Registry::new();
        registry.activate(CONV);
        registry.insert(SubscriptionKey::messages(CONV), "m");

        registry.remove(SubscriptionKey::messages(CONV));

        assert_eq!(registry.active(), None);
    }

    #[test]
    fn expiry_forgets_fired_timer_but_not_a_newer_one() {
        let mut registry = Registry::new();
        registry.insert(SubscriptionKey::typing(CONV), "t");
        let t0 = Instant::now();
        registry.keystroke(CONV, DEFAULT_TYPING_WINDOW, t0);
        registry.arm(CONV, Task::default());
        registry.keystroke(CONV, DEFAULT_TYPING_WINDOW, t0 + Duration::from_secs(1));

        assert!(registry.expire(CONV, t0 + DEFAULT_TYPING_WINDOW).is_empty());
        assert!(registry.has_timer(CONV));

        let actions = registry.expire(CONV, t0 + Duration::from_secs(1) + DEFAULT_TYPING_WINDOW);
        assert_eq!(actions, vec![TypingAction::Publish(TypingSignal::Stopped)]);
        assert!(!registry.has_timer(CONV));
    }

    #[test]
    fn finish_without_debouncer_is_empty() {
        let mut registry = Registry::new();
        assert!(registry.finish_typing(CONV).is_empty());
    }

    #[test]
    fn subscription_id_wire_form() {
        assert_eq!(SubscriptionId(3).to_string(), "sub-3");
        assert_eq!("sub-3".parse::<SubscriptionId>(), Ok(SubscriptionId(3)));
        assert!("3".parse::<SubscriptionId>().is_err());
    }
}
