//! Two relay-only WebRTC sessions joined by a pre-negotiated data channel,
//! signaled either directly in memory or through a session broker.

pub mod allocator;
pub mod broker;
pub mod channel;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod log;
pub mod relay;
pub mod session;
pub mod setup;
pub mod signaling;
pub mod stats;
pub mod turn;

pub use api::{SdpType, SessionDescription as SessionDescriptor};
pub use error::{Error, Result};
