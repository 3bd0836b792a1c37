//! Best-effort notification of credential state transitions.
//!
//! [`EventNotifier`] implements [`NotificationSink`] over a bounded
//! broadcast channel. Emitting never blocks and never fails the caller.
//! Delivery is at-most-once: a subscriber that falls behind loses the
//! overwritten events and should re-read authoritative rows.

use certchain_core::{DomainEvent, NotificationSink};
use certchain_types::{ActorId, TenantId};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{trace, warn};

/// Configuration for the notifier.
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Events buffered per subscriber before the oldest are dropped.
    pub channel_capacity: usize,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
        }
    }
}

impl NotifierConfig {
    pub fn with_channel_capacity(channel_capacity: usize) -> Self {
        Self { channel_capacity }
    }
}

/// Which events a subscription receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionScope {
    All,
    Tenant(TenantId),
    Actor(ActorId),
}

impl SubscriptionScope {
    pub fn matches(&self, event: &DomainEvent) -> bool {
        match self {
            SubscriptionScope::All => true,
            SubscriptionScope::Tenant(tenant) => event.tenant_id() == tenant,
            SubscriptionScope::Actor(actor) => event.actor_id() == actor,
        }
    }
}

/// Fan-out of [`DomainEvent`]s to scoped subscribers.
#[derive(Debug, Clone)]
pub struct EventNotifier {
    sender: broadcast::Sender<DomainEvent>,
}

impl Default for EventNotifier {
    fn default() -> Self {
        Self::new(NotifierConfig::default())
    }
}

impl EventNotifier {
    pub fn new(config: NotifierConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self, scope: SubscriptionScope) -> Subscription {
        Subscription {
            scope,
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl NotificationSink for EventNotifier {
    fn emit(&self, event: DomainEvent) {
        trace!(event = event.type_name(), tenant = %event.tenant_id(), "Emitting event");
        // No receivers is not an error.
        let _ = self.sender.send(event);
    }
}

/// A scoped stream of events.
pub struct Subscription {
    scope: SubscriptionScope,
    receiver: broadcast::Receiver<DomainEvent>,
}

impl Subscription {
    pub fn scope(&self) -> &SubscriptionScope {
        &self.scope
    }

    /// Next event in scope, or `None` once the notifier is gone.
    ///
    /// Lagging skips the lost events and logs how many were dropped.
    pub async fn recv(&mut self) -> Option<DomainEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.scope.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, scope = ?self.scope, "Subscriber lagged, events dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next already-buffered event in scope, without waiting.
    pub fn try_recv(&mut self) -> Option<DomainEvent> {
        use broadcast::error::TryRecvError;
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.scope.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, scope = ?self.scope, "Subscriber lagged, events dropped");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}
