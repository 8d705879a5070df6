//! eventd client SDK
//!
//! Connects a host application to the eventd NATS server, optionally
//! authenticating with an NKey user seed, and provides JSON publish/subscribe
//! helpers plus a reconnect hook.
//!
//! Options are loaded once at startup and passed to [`EventdClient::new`];
//! the [`StartupAction`] then connects in the background, retrying every
//! five seconds until the server is reachable.

pub mod client;
pub mod errors;
pub mod nkey;
pub mod options;
pub mod secret;
pub mod startup;
pub mod state_machine;

// Re-export commonly used types
pub use client::{EventdClient, MessageHandler, Subscription};
pub use errors::{EventdError, EventdResult};
pub use options::EventdOptions;
pub use secret::SecretBuffer;
pub use startup::{Connector, HostMode, SkipReason, StartupAction, StartupOutcome};

// Message type delivered to subscription handlers
pub use async_nats::Message;
