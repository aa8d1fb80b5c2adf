#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

use bon::Builder;
use url::Url;

use crate::Result;

pub const DEFAULT_HOST: &str = "localhost";
/// Default port of the JMRI JSON WebSocket server.
pub const DEFAULT_PORT: u16 = 12090;
pub const DEFAULT_PATH: &str = "/";

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_INITIAL_BACKOFF_DURATION: Duration = Duration::from_secs(1);
const DEFAULT_MAX_BACKOFF_DURATION: Duration = Duration::from_secs(30);
const DEFAULT_BACKOFF_MULTIPLIER: u32 = 2;

/// Endpoint a connection manager is bound to.
///
/// # Example
///
/// ```
/// use jmri_ws_client::ws::config::Target;
///
/// let target = Target::builder().host("layout.local").path("/json/").build();
/// assert_eq!(target.url().unwrap().as_str(), "ws://layout.local:12090/json/");
/// ```
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
pub struct Target {
    #[builder(into, default = DEFAULT_HOST.to_owned())]
    pub host: String,
    #[builder(default = DEFAULT_PORT)]
    pub port: u16,
    #[builder(into, default = DEFAULT_PATH.to_owned())]
    pub path: String,
}

impl Default for Target {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Target {
    /// Compose and validate the `ws://` URL for this target.
    pub fn url(&self) -> Result<Url> {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };

        // IPv6 literals need brackets to be told apart from the port.
        let host = if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };

        Ok(Url::parse(&format!("ws://{host}:{}{path}", self.port))?)
    }
}

/// Configuration for connection manager behavior.
#[non_exhaustive]
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Reconnection strategy configuration
    pub reconnect: ReconnectConfig,
}

/// Configuration for automatic reconnection behavior.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of reconnection attempts before giving up.
    /// `None` means infinite retries.
    pub max_attempts: Option<u32>,
    /// Base duration the exponential backoff grows from
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: Some(DEFAULT_MAX_ATTEMPTS),
            initial_backoff: DEFAULT_INITIAL_BACKOFF_DURATION,
            max_backoff: DEFAULT_MAX_BACKOFF_DURATION,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl ReconnectConfig {
    /// Delay before the given (already incremented) reconnection attempt.
    ///
    /// Computed as `initial_backoff * backoff_multiplier^attempt`, capped at
    /// `max_backoff`. No jitter is applied.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff_multiplier
            .checked_pow(attempt)
            .and_then(|factor| self.initial_backoff.checked_mul(factor))
            .map_or(self.max_backoff, |delay| delay.min(self.max_backoff))
    }

    /// Whether another attempt may be scheduled after `attempts` have been made.
    #[must_use]
    pub fn allows(&self, attempts: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempts < max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_sequence() {
        let config = ReconnectConfig::default();

        let delays: Vec<_> = (1..=5).map(|attempt| config.delay_for(attempt)).collect();
        assert_eq!(
            delays,
            [2_000, 4_000, 8_000, 16_000, 30_000].map(Duration::from_millis)
        );
    }

    #[test]
    fn backoff_respects_max() {
        let config = ReconnectConfig {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(2),
            backoff_multiplier: 3,
            max_attempts: None,
        };

        assert_eq!(config.delay_for(1), Duration::from_secs(2));
        assert_eq!(config.delay_for(64), Duration::from_secs(2));
    }

    #[test]
    fn attempts_are_bounded_by_default() {
        let config = ReconnectConfig::default();

        assert!(config.allows(4));
        assert!(!config.allows(5));

        let unbounded = ReconnectConfig {
            max_attempts: None,
            ..ReconnectConfig::default()
        };
        assert!(unbounded.allows(u32::MAX));
    }

    #[test]
    fn default_target_url() {
        let url = Target::default().url().unwrap();
        assert_eq!(url.as_str(), "ws://localhost:12090/");
    }

    #[test]
    fn target_path_is_normalised() {
        let target = Target::builder()
            .host("example.com")
            .port(8080)
            .path("ws")
            .build();

        assert_eq!(target.url().unwrap().as_str(), "ws://example.com:8080/ws");
    }

    #[test]
    fn empty_host_is_rejected() {
        let target = Target::builder().host("").build();

        let error = target.url().unwrap_err();
        assert_eq!(error.kind(), crate::error::Kind::Validation);
    }

    #[test]
    fn ipv6_host_is_bracketed() {
        let target = Target::builder().host("::1").build();
        assert_eq!(target.url().unwrap().as_str(), "ws://[::1]:12090/");

        let bracketed = Target::builder().host("[::1]").port(8080).build();
        assert_eq!(bracketed.url().unwrap().as_str(), "ws://[::1]:8080/");
    }
}
