//! Durable state for the bridge: chats, messages, webhook configuration and
//! delivery logs, all in one embedded SQLite file.
//!
//! A single [`Storage`] handle is shared across the process. The pool holds
//! exactly one connection, so concurrent callers serialize through it and
//! observers see writes for a given chat in arrival order.

mod error;
mod schema;
mod store;
mod types;
mod webhook_store;

pub use {
    error::{Error, Result},
    store::Storage,
    types::{Chat, MatchType, StoredMessage, TriggerType, WebhookConfig, WebhookDeliveryLog,
            WebhookTrigger},
};
