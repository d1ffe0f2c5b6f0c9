use tracing_subscriber::EnvFilter;

/// Default filter for a tool: its own crate and this library at `level`,
/// the engine only on errors.
pub fn filter(bin: &str, level: &str) -> String {
    format!("{bin}={level},peerlink={level},libcalls={level},webrtc=error")
}

/// `RUST_LOG` wins over `env_filter` when set.
pub fn set(env_filter: String) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or(EnvFilter::new(env_filter)))
        .compact()
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(true)
        .init();
}
