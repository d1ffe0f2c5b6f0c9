use iceserver::IceServer;
use serde::{Deserialize, Serialize};

use crate::{Location, SessionDescription};

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct IceServers {
    #[serde(default)]
    pub ice_servers: Vec<IceServer>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewSession {
    pub session_id: String,
    pub session_description: SessionDescription,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DataChannel {
    pub location: Location,
    pub data_channel_name: String,
    pub id: u16,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DataChannels {
    #[serde(default)]
    pub data_channels: Vec<DataChannel>,
}
