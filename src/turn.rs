use iceserver::IceServer;
use tracing::info;
use webrtc::peer_connection::configuration::RTCConfiguration;

use crate::config::Turn;
use crate::Result;

/// Requests short-lived relay credentials and builds a relay-only
/// configuration that uses them for every configured relay URL.
pub async fn relay_configuration(
    client: &libcalls::Client,
    account_id: &str,
    turn: &Turn,
) -> Result<RTCConfiguration> {
    let issued = client.generate_ice_servers(account_id, turn.ttl).await?;
    Ok(configuration_from(&issued, turn)?)
}

pub fn configuration_from(
    issued: &[IceServer],
    turn: &Turn,
) -> webrtc::error::Result<RTCConfiguration> {
    let server = iceserver::relay_server(&turn.urls, issued);
    info!("Received relay credentials for username: {}", server.username);
    server.validate()?;
    Ok(iceserver::configuration(vec![server], turn.relay_only))
}
