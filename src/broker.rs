use api::request;
use tracing::info;

use crate::{Error, Result, SdpType, SessionDescriptor};

/// A session the broker created against one of our offers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerSession {
    pub session_id: String,
    pub answer: SessionDescriptor,
}

/// The SFU application sessions are brokered through.
#[derive(Clone)]
pub struct Broker {
    client: libcalls::Client,
    app_id: String,
}

impl Broker {
    pub fn new(client: libcalls::Client, app_id: impl Into<String>) -> Self {
        Self {
            client,
            app_id: app_id.into(),
        }
    }

    pub async fn new_session(&self, offer: SessionDescriptor) -> Result<BrokerSession> {
        if offer.kind != SdpType::Offer {
            return Err(Error::negotiation(format!(
                "broker sessions start from an offer, got {}",
                offer.kind
            )));
        }
        let res = self.client.new_session(&self.app_id, offer).await?;
        info!("broker session {} created", res.session_id);
        Ok(BrokerSession {
            session_id: res.session_id,
            answer: res.session_description,
        })
    }

    /// Allocates a channel owned by `session_id`.
    pub async fn publish(&self, session_id: &str, name: &str) -> Result<u16> {
        Ok(self
            .client
            .new_data_channel(&self.app_id, session_id, request::DataChannel::local(name))
            .await?)
    }

    /// Allocates, on `session_id`, the counterpart of a channel published by
    /// `remote_session_id`.
    pub async fn subscribe(
        &self,
        session_id: &str,
        remote_session_id: &str,
        name: &str,
    ) -> Result<u16> {
        Ok(self
            .client
            .new_data_channel(
                &self.app_id,
                session_id,
                request::DataChannel::remote(name, remote_session_id),
            )
            .await?)
    }
}
