//! Per-subscription event streams.

use std::{
    pin::Pin,
    task::{Context, Poll},
};

use futures::Stream;
use parley_core::{ConversationId, InboundEvent, SubscriptionHandle};
use tokio::sync::mpsc;

/// Events delivered on one subscription, in arrival order.
///
/// The stream ends when the subscription is released, replaced or torn down
/// by a disconnect. Dropping it does not unsubscribe; release it through
/// [`crate::Messenger::unsubscribe_handle`].
#[derive(Debug)]
pub struct Subscription {
    handle: SubscriptionHandle,
    events: mpsc::Receiver<InboundEvent>,
}

impl Subscription {
    pub(crate) fn new(handle: SubscriptionHandle, events: mpsc::Receiver<InboundEvent>) -> Self {
        Self { handle, events }
    }

    /// Handle identifying this subscription.
    pub fn handle(&self) -> &SubscriptionHandle {
        &self.handle
    }

    /// Next event, or `None` once the subscription has ended.
    pub async fn recv(&mut self) -> Option<InboundEvent> {
        self.events.recv().await
    }
}

impl Stream for Subscription {
    type Item = InboundEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}

/// Both subscriptions of the conversation the UI has open.
#[derive(Debug)]
pub struct ConversationView {
    /// Conversation opened.
    pub conversation_id: ConversationId,
    /// New and edited messages.
    pub messages: Subscription,
    /// Typing presence.
    pub typing: Subscription,
}
