use serde::{Deserialize, Serialize};
use webrtc::{
    ice,
    ice_transport::ice_server::RTCIceServer,
    peer_connection::{
        configuration::RTCConfiguration, policy::ice_transport_policy::RTCIceTransportPolicy,
    },
    Error,
};

/// https://developers.cloudflare.com/realtime/turn/
pub const CLOUDFLARE_RELAY_URLS: [&str; 3] = [
    "turn:turn.cloudflare.com:3478?transport=udp",
    "turn:turn.cloudflare.com:3478?transport=tcp",
    "turns:turn.cloudflare.com:5349?transport=tcp",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct IceServer {
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub credential: String,
}

impl IceServer {
    pub fn validate(&self) -> webrtc::error::Result<()> {
        for url_str in &self.urls {
            let url = ice::url::Url::parse_url(url_str)?;
            if (url.scheme == ice::url::SchemeType::Turn
                || url.scheme == ice::url::SchemeType::Turns)
                && (self.username.is_empty() || self.credential.is_empty())
            {
                // https://www.w3.org/TR/webrtc/#set-the-configuration (step #11.3.2)
                return Err(Error::ErrNoTurnCredentials);
            }
        }
        Ok(())
    }
}

impl From<IceServer> for RTCIceServer {
    fn from(val: IceServer) -> Self {
        RTCIceServer {
            urls: val.urls,
            username: val.username,
            credential: val.credential,
            ..Default::default()
        }
    }
}

/// Collapse the entries returned by the credential endpoint into one
/// username/credential pair. Later non-empty values win.
pub fn merge_credentials(servers: &[IceServer]) -> (String, String) {
    let mut username = String::new();
    let mut credential = String::new();
    for server in servers {
        if !server.username.is_empty() {
            username.clone_from(&server.username);
        }
        if !server.credential.is_empty() {
            credential.clone_from(&server.credential);
        }
    }
    (username, credential)
}

/// One relay entry covering every URL in `urls` with a shared credential.
pub fn relay_server(urls: &[String], issued: &[IceServer]) -> IceServer {
    let (username, credential) = merge_credentials(issued);
    IceServer {
        urls: urls.to_vec(),
        username,
        credential,
    }
}

pub fn cloudflare_relay_urls() -> Vec<String> {
    CLOUDFLARE_RELAY_URLS.iter().map(|s| s.to_string()).collect()
}

pub fn configuration(servers: Vec<IceServer>, relay_only: bool) -> RTCConfiguration {
    RTCConfiguration {
        ice_servers: servers.into_iter().map(Into::into).collect(),
        ice_transport_policy: if relay_only {
            RTCIceTransportPolicy::Relay
        } else {
            RTCIceTransportPolicy::All
        },
        ..Default::default()
    }
}
