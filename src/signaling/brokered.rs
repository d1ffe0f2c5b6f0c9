use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::{Negotiated, Signaling};
use crate::broker::Broker;
use crate::session::TransportSession;
use crate::Result;

/// Every session negotiates with the broker on its own. The broker takes no
/// trickled candidates, so the offer is sent once gathering is complete.
#[derive(Clone)]
pub struct Brokered {
    broker: Broker,
}

impl Brokered {
    pub fn new(broker: Broker) -> Self {
        Self { broker }
    }
}

#[async_trait]
impl Signaling for Brokered {
    fn couples_sessions(&self) -> bool {
        false
    }

    async fn negotiate(
        &self,
        offerer: &Arc<TransportSession>,
        _answerer: Option<&Arc<TransportSession>>,
    ) -> Result<Negotiated> {
        let offer = offerer.create_offer().await?;
        offerer.set_local(offer).await?;

        info!("Waiting for {} ICE gathering to complete", offerer.label());
        let offer = offerer.wait_for_ice_gathering_complete().await?;

        let session = self.broker.new_session(offer).await?;
        info!("{} broker session id: {}", offerer.label(), session.session_id);
        offerer.bind_broker_id(&session.session_id)?;
        offerer.set_remote(session.answer.clone()).await?;

        Ok(Negotiated {
            answer: session.answer,
            session_id: Some(session.session_id),
        })
    }
}
