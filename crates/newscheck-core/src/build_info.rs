//! What `--version` prints and what the harness calls itself over HTTP.
//!
//! `build.rs` stamps the git revision, build time and target triple; builds
//! outside a checkout report `unknown`.

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const GIT_SHA: &str = stamped(option_env!("NEWSCHECK_BUILD_GIT_SHA"));

pub const BUILT_AT: &str = stamped(option_env!("NEWSCHECK_BUILD_TIMESTAMP"));

pub const TARGET: &str = stamped(option_env!("NEWSCHECK_BUILD_TARGET"));

const fn stamped(value: Option<&'static str>) -> &'static str {
    match value {
        Some(value) => value,
        None => "unknown",
    }
}

/// `newscheck 0.1.0 (rev abc1234, built ..., target ...)`
pub fn version_line() -> String {
    format!("newscheck {VERSION} (rev {GIT_SHA}, built {BUILT_AT}, target {TARGET})")
}

/// `User-Agent` sent with every request to the engine.
pub fn user_agent() -> String {
    format!("newscheck/{VERSION}")
}
