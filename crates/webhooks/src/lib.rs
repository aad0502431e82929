//! The webhook engine: configuration CRUD over a copy-on-publish snapshot,
//! trigger matching, payload assembly, and signed asynchronous delivery
//! with retry.

mod delivery;
mod error;
mod manager;
mod matching;
mod payload;
mod ssrf;
mod validate;

pub use {
    delivery::{TestOutcome, sign_body},
    error::{Error, Result},
    manager::{Actor, NewTrigger, NewWebhook, WebhookManager, WebhookOptions},
    payload::WebhookPayload,
    ssrf::SsrfRejection,
};
