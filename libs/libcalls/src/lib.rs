use std::time::Duration;

use api::{path, request, response, SessionDescription};
use http::{header, StatusCode};
use iceserver::IceServer;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, trace};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("control plane request failed status: {status}, {body}")]
    Status { status: StatusCode, body: String },
    #[error("control plane request error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed control plane response: {source}, body: {body}")]
    Decode {
        #[source]
        source: serde_json::Error,
        body: String,
    },
    #[error("control plane response carried no data channel")]
    EmptyResponse,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Bearer-token client for the realtime control plane.
#[derive(Clone)]
pub struct Client {
    base_url: String,
    token: String,
    http: reqwest::Client,
}

impl Client {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, token, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Client {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            http,
        })
    }

    /// https://developers.cloudflare.com/realtime/turn/generate-credentials/
    pub async fn generate_ice_servers(&self, account_id: &str, ttl: u64) -> Result<Vec<IceServer>> {
        let res: response::IceServers = self
            .post(
                &path::generate_ice_servers(account_id),
                &request::GenerateIceServers { ttl },
                StatusCode::CREATED,
            )
            .await?;
        Ok(res.ice_servers)
    }

    pub async fn new_session(
        &self,
        app_id: &str,
        offer: SessionDescription,
    ) -> Result<response::NewSession> {
        self.post(
            &path::new_session(app_id),
            &request::NewSession {
                session_description: offer,
            },
            StatusCode::CREATED,
        )
        .await
    }

    pub async fn new_data_channels(
        &self,
        app_id: &str,
        session_id: &str,
        data_channels: Vec<request::DataChannel>,
    ) -> Result<Vec<response::DataChannel>> {
        let res: response::DataChannels = self
            .post(
                &path::new_data_channels(app_id, session_id),
                &request::NewDataChannels { data_channels },
                StatusCode::OK,
            )
            .await?;
        Ok(res.data_channels)
    }

    /// Allocate a single channel and return the id the broker assigned to it.
    pub async fn new_data_channel(
        &self,
        app_id: &str,
        session_id: &str,
        data_channel: request::DataChannel,
    ) -> Result<u16> {
        self.new_data_channels(app_id, session_id, vec![data_channel])
            .await?
            .first()
            .map(|channel| channel.id)
            .ok_or(Error::EmptyResponse)
    }

    async fn post<B, T>(&self, path: &str, body: &B, expected: StatusCode) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {}", url);
        let response = self
            .http
            .post(&url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .header(header::CONTENT_TYPE, "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        trace!("POST {} -> {}: {}", url, status, text);
        if status != expected {
            return Err(Error::Status { status, body: text });
        }
        serde_json::from_str(&text).map_err(|source| Error::Decode { source, body: text })
    }
}
