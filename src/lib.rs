// Infrastructure layer (shared components)
pub mod auth;
pub mod config;
pub mod endpoint;
pub mod error;

// Connection core
pub mod backoff;
pub mod client;
pub mod message;
pub mod subscription;

pub use client::{ConnectionStatus, RealtimeClient};
pub use error::{RealtimeError, Result};
pub use message::Envelope;
pub use subscription::{callback, EventCallback};
