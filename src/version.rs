//! Build and version information

pub const APP_NAME: &str = "ws-rtt";

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Injected at build time through `WS_RTT_BUILD_TIME`.
pub const BUILD_TIME: &str = match option_env!("WS_RTT_BUILD_TIME") {
    Some(value) => value,
    None => "unknown",
};

/// Injected at build time through `WS_RTT_GIT_COMMIT`.
pub const GIT_COMMIT: &str = match option_env!("WS_RTT_GIT_COMMIT") {
    Some(value) => value,
    None => "unknown",
};

pub fn version_info() -> String {
    format!(
        "{} {} (build: {}, commit: {})",
        APP_NAME, VERSION, BUILD_TIME, GIT_COMMIT
    )
}

pub fn user_agent() -> String {
    format!("{}/{}", APP_NAME, VERSION)
}
