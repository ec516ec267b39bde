//! Domain Events
//!
//! In-process, type-keyed publish/subscribe for account lifecycle events.
//! The bus is an explicitly constructed instance wired at startup; there is
//! no global registry, and tests build a fresh bus per case.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AuthError;

/// Something that happened to an account
///
/// Immutable once constructed; carries identifiers by value, not a live
/// reference to the aggregate.
#[derive(Debug, Clone)]
pub enum DomainEvent {
    AccountCreated {
        account_id: Uuid,
        email: String,
        occurred_on: DateTime<Utc>,
    },
}

/// Event variant key used for handler registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    AccountCreated,
}

impl DomainEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            DomainEvent::AccountCreated { .. } => EventKind::AccountCreated,
        }
    }
}

/// Handler for a subscribed event variant
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &DomainEvent) -> Result<(), AuthError>;
}

/// In-process event dispatcher
///
/// Handlers for a variant run sequentially in registration order, each
/// awaited before the next. A failing handler aborts delivery to the
/// remaining handlers for that publish call and the error propagates to
/// the publisher; there is no isolation between handlers. Subscription is
/// construction-time only: wire every handler before the bus is shared,
/// then publish freely from any task.
#[derive(Default)]
pub struct EventBus {
    handlers: HashMap<EventKind, Vec<Arc<dyn EventHandler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for an event variant.
    ///
    /// Multiple handlers per variant are allowed; they are invoked in the
    /// order they were registered.
    pub fn subscribe(&mut self, kind: EventKind, handler: Arc<dyn EventHandler>) {
        self.handlers.entry(kind).or_default().push(handler);
    }

    /// Deliver an event to every handler registered for its variant.
    pub async fn publish(&self, event: &DomainEvent) -> Result<(), AuthError> {
        if let Some(handlers) = self.handlers.get(&event.kind()) {
            for handler in handlers {
                handler.handle(event).await?;
            }
        }
        Ok(())
    }
}

/// Logs newly created accounts
///
/// Stand-in for a welcome notification; a real deployment would subscribe
/// a mail sender here instead.
pub struct WelcomeNotifier;

#[async_trait]
impl EventHandler for WelcomeNotifier {
    async fn handle(&self, event: &DomainEvent) -> Result<(), AuthError> {
        let DomainEvent::AccountCreated {
            account_id,
            email,
            occurred_on,
        } = event;
        tracing::info!(
            account_id = %account_id,
            email = %email,
            occurred_on = %occurred_on,
            "Account created, sending welcome notification"
        );
        Ok(())
    }
}
