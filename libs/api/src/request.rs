use serde::{Deserialize, Serialize};

use crate::{Location, SessionDescription};

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct GenerateIceServers {
    /// Credential lifetime in seconds
    pub ttl: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct NewSession {
    pub session_description: SessionDescription,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DataChannel {
    pub location: Location,
    pub data_channel_name: String,
    // required iff location is remote
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl DataChannel {
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            location: Location::Local,
            data_channel_name: name.into(),
            session_id: None,
        }
    }

    pub fn remote(name: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            location: Location::Remote,
            data_channel_name: name.into(),
            session_id: Some(session_id.into()),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct NewDataChannels {
    pub data_channels: Vec<DataChannel>,
}
