use tracing::debug;
use webrtc::{
    api::{
        interceptor_registry::register_default_interceptors, media_engine::MediaEngine,
        setting_engine::SettingEngine, APIBuilder, API,
    },
    interceptor::registry::Registry,
};

use crate::Result;

pub fn build_api(setting_engine: SettingEngine) -> Result<API> {
    debug!("Creating WebRTC API");
    let mut m = MediaEngine::default();
    m.register_default_codecs()?;

    let mut registry = Registry::new();
    registry = register_default_interceptors(registry, &mut m)?;

    Ok(APIBuilder::new()
        .with_media_engine(m)
        .with_interceptor_registry(registry)
        .with_setting_engine(setting_engine)
        .build())
}

pub fn default_api() -> Result<API> {
    build_api(SettingEngine::default())
}
