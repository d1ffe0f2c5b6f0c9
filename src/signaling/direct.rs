use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{Negotiated, Signaling};
use crate::session::TransportSession;
use crate::{Error, Result};

/// Both sessions live in this process and exchange descriptions in memory.
/// Candidates gathered afterwards are trickled to the other side.
#[derive(Debug, Default, Clone, Copy)]
pub struct Direct;

#[async_trait]
impl Signaling for Direct {
    fn couples_sessions(&self) -> bool {
        true
    }

    async fn negotiate(
        &self,
        offerer: &Arc<TransportSession>,
        answerer: Option<&Arc<TransportSession>>,
    ) -> Result<Negotiated> {
        let answerer =
            answerer.ok_or_else(|| Error::negotiation("direct signaling needs two sessions"))?;

        let offer = offerer.create_offer().await?;
        offerer.set_local(offer.clone()).await?;
        answerer.set_remote(offer).await?;

        let answer = answerer.create_answer().await?;
        answerer.set_local(answer.clone()).await?;
        offerer.set_remote(answer.clone()).await?;

        trickle(offerer, answerer).await;
        trickle(answerer, offerer).await;

        Ok(Negotiated {
            answer,
            session_id: None,
        })
    }
}

async fn trickle(from: &Arc<TransportSession>, to: &Arc<TransportSession>) {
    let Some(mut candidates) = from.take_candidates().await else {
        warn!("{} candidates are already being trickled", from.label());
        return;
    };
    let from = from.label().to_string();
    let to = to.clone();
    tokio::spawn(async move {
        let mut forwarded = 0;
        while let Some(candidate) = candidates.recv().await {
            match to.add_remote_candidate(candidate).await {
                Ok(()) => forwarded += 1,
                Err(e) => warn!("{} rejected candidate from {}: {}", to.label(), from, e),
            }
        }
        debug!("{} trickled {} candidates to {}", from, forwarded, to.label());
    });
}
