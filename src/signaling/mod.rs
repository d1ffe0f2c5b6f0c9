mod brokered;
mod direct;

pub use brokered::Brokered;
pub use direct::Direct;

use std::sync::Arc;

use async_trait::async_trait;

use crate::session::TransportSession;
use crate::{Result, SessionDescriptor};

/// Outcome of one offer/answer exchange.
#[derive(Debug, Clone)]
pub struct Negotiated {
    pub answer: SessionDescriptor,
    /// Set when a broker created a session for the offer.
    pub session_id: Option<String>,
}

/// Carries an offer from `offerer` to whoever answers it and applies the answer.
#[async_trait]
pub trait Signaling: Send + Sync {
    /// Whether one exchange couples the two local sessions with each other.
    /// When false, every session is negotiated on its own.
    fn couples_sessions(&self) -> bool;

    async fn negotiate(
        &self,
        offerer: &Arc<TransportSession>,
        answerer: Option<&Arc<TransportSession>>,
    ) -> Result<Negotiated>;
}
