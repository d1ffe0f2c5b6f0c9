pub const DEFAULT_BASE_URL: &str = "https://rtc.live.cloudflare.com/v1";

pub fn generate_ice_servers(account_id: &str) -> String {
    format!("/turn/keys/{}/credentials/generate-ice-servers", account_id)
}

pub fn new_session(app_id: &str) -> String {
    format!("/apps/{}/sessions/new", app_id)
}

pub fn new_data_channels(app_id: &str, session_id: &str) -> String {
    format!("/apps/{}/sessions/{}/datachannels/new", app_id, session_id)
}
