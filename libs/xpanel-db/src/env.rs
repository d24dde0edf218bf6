//! Wall clock and host name, as seen by whoever renders the inbound.

use chrono::Utc;

pub trait Environment {
    /// Current time in milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;

    fn hostname(&self) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnvironment;

impl Environment for SystemEnvironment {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }

    fn hostname(&self) -> String {
        match whoami::fallible::hostname() {
            Ok(name) if !name.is_empty() => name,
            Ok(_) => "localhost".to_string(),
            Err(e) => {
                tracing::warn!("Failed to resolve hostname, using localhost: {}", e);
                "localhost".to_string()
            }
        }
    }
}

/// Fixed clock and host, for rendering links on behalf of a remote caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticEnvironment {
    pub now_millis: i64,
    pub hostname: String,
}

impl StaticEnvironment {
    pub fn new(now_millis: i64, hostname: impl Into<String>) -> Self {
        Self {
            now_millis,
            hostname: hostname.into(),
        }
    }
}

impl Environment for StaticEnvironment {
    fn now_millis(&self) -> i64 {
        self.now_millis
    }

    fn hostname(&self) -> String {
        self.hostname.clone()
    }
}
