use crate::event::ConnectionStatus;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("broker error: {0}")]
    Broker(#[from] libcalls::Error),
    #[error("negotiation error: {0}")]
    Negotiation(String),
    #[error("{session} connection failed: {status}")]
    ConnectionFailed {
        session: String,
        status: ConnectionStatus,
    },
    #[error("data channel id {0} already in use")]
    ChannelIdInUse(u16),
    #[error("data channel {0} is not open")]
    ChannelNotOpen(String),
    #[error("no published data channel named {0}")]
    UnknownChannel(String),
    #[error("timed out waiting for {0}")]
    Timeout(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("webrtc error: {0}")]
    Webrtc(#[from] webrtc::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn negotiation<T>(t: T) -> Self
    where
        T: ToString,
    {
        Error::Negotiation(t.to_string())
    }

    /// Control-plane status code, when the error came back from the broker.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Broker(libcalls::Error::Status { status, .. }) => Some(status.as_u16()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
