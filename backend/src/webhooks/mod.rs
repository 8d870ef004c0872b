//! Signed webhook delivery.
//!
//! Business events fan out to every active webhook subscribed to them.
//! Each attempt is signed with HMAC-SHA256, logged as a delivery row, and
//! on failure rescheduled as a durable retry record that the retry sweep
//! picks up.

pub mod delivery;
pub mod events;
pub mod fanout;
pub mod postgres;
pub mod retry;
pub mod signature;
pub mod store;

pub use delivery::{DeliveryConfig, DeliveryError, DeliveryReport, WebhookDispatcher, WebhookEnvelope};
pub use events::WebhookEvent;
pub use postgres::PgWebhookStore;
pub use retry::{backoff_delay, RetrySweepReport};
pub use store::WebhookStore;
