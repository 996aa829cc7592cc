use std::str::FromStr;
use std::time::Duration;

use super::envelope::Endpoint;
use crate::ProxyError;

/// Upstream used when nothing else is configured.
pub const DEFAULT_BASE_URL: &str = "https://ji.luupi.net";
/// Upstream used by the [`ConfigPreset::Local`] preset.
pub const LOCAL_BASE_URL: &str = "http://localhost:8082";
/// Shared secret the public upstream is provisioned with.
pub const DEFAULT_SECRET: &str = "galumphing";
/// Default path of the begin/end endpoint.
pub const DEFAULT_ACCESS_PATH: &str = "/652/access";
/// Default path of the observe endpoint.
pub const DEFAULT_CLOCK_PATH: &str = "/652/clock";
/// Default path of the audit endpoint.
pub const DEFAULT_AUDIT_PATH: &str = "/652/audit";
/// Default route of the aggregated info endpoint.
pub const DEFAULT_INFO_PATH: &str = "/nin/info";
/// Default listen port when `PORT` is unset.
pub const DEFAULT_PORT: u16 = 9090;
/// `Timeout` value carried by `begin` and `end` envelopes.
pub const DEFAULT_ACCESS_TIMEOUT: i64 = 250_000;

const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 3_000;
const DEFAULT_POLL_INTERVAL_US: u64 = 5;

/// Predefined configuration presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigPreset {
    /// The public upstream with its built-in defaults:
    /// - Base URL: `https://ji.luupi.net`
    /// - Request timeout: 3 seconds
    /// - Poll interval: 5 microseconds
    Production,

    /// An upstream running on `localhost:8082`, otherwise identical to
    /// `Production`.
    Local,

    /// Load configuration from environment variables.
    ///
    /// Reads:
    /// - `SIGNED_PROXY_BASE_URL`, `SIGNED_PROXY_SECRET`
    /// - `SIGNED_PROXY_ACCESS_PATH`, `SIGNED_PROXY_CLOCK_PATH`, `SIGNED_PROXY_AUDIT_PATH`
    /// - `SIGNED_PROXY_REQUEST_TIMEOUT_MS` (default: 3000)
    /// - `SIGNED_PROXY_POLL_INTERVAL_US` (default: 5)
    /// - `SIGNED_PROXY_RESET_POLICY` (`always` or `on-success`, default: `always`)
    /// - `SIGNED_PROXY_INFO_PATH` (default: `/nin/info`)
    /// - `PORT` (default: 9090)
    FromEnv,
}

/// When the audit session advances the remote cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResetPolicy {
    /// Always send the reset, even if the base or log fetch failed.
    ///
    /// This is what the upstream's other clients do. After a failed log fetch
    /// with a non-zero base the cursor moves back by one.
    #[default]
    Always,

    /// Send the reset only when both the base and the log fetch succeeded.
    OnSuccessfulFetch,
}

impl FromStr for ResetPolicy {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "always" => Ok(ResetPolicy::Always),
            "on-success" | "on_success" | "on-successful-fetch" => {
                Ok(ResetPolicy::OnSuccessfulFetch)
            }
            other => Err(ProxyError::Config(format!("unknown reset policy {other:?}"))),
        }
    }
}

/// Paths of the three upstream endpoints.
///
/// These are what signatures are computed over, so they must match the
/// upstream's routes exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointPaths {
    /// Time sync `begin` / `end`
    pub access: String,
    /// Time sync `observe`
    pub clock: String,
    /// Audit base, fetch and reset
    pub audit: String,
}

impl Default for EndpointPaths {
    fn default() -> Self {
        Self {
            access: DEFAULT_ACCESS_PATH.to_string(),
            clock: DEFAULT_CLOCK_PATH.to_string(),
            audit: DEFAULT_AUDIT_PATH.to_string(),
        }
    }
}

/// Configuration for the signed proxy.
///
/// # Environment Variables
///
/// `Default` reads the same variables as [`ConfigPreset::FromEnv`]; unset or
/// unparsable values fall back to the built-in defaults.
///
/// # Example
///
/// ```rust
/// use signed_proxy::{ConfigPreset, ProxyConfig};
/// use std::time::Duration;
///
/// let config = ProxyConfig {
///     base_url: "http://127.0.0.1:8082".to_string(),
///     request_timeout: Duration::from_secs(1),
///     ..ProxyConfig::from(ConfigPreset::Production)
/// };
/// assert!(config.validate().iter().any(|w| w.contains("plain HTTP")));
/// ```
#[derive(Clone)]
pub struct ProxyConfig {
    /// Scheme and authority of the upstream, without a trailing slash
    pub base_url: String,
    /// Shared signing secret
    pub secret: String,
    /// Upstream endpoint paths
    pub paths: EndpointPaths,
    /// Bound on every outbound request
    pub request_timeout: Duration,
    /// Tick of the observe loop while `begin` is in flight
    pub poll_interval: Duration,
    /// `Timeout` value sent with `begin` and `end`
    pub access_timeout: i64,
    /// Cursor advancement policy of the audit session
    pub reset_policy: ResetPolicy,
    /// Route of the aggregated info endpoint
    pub info_path: String,
    /// Port the info server listens on
    pub listen_port: u16,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            base_url: env_string("SIGNED_PROXY_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            secret: env_string("SIGNED_PROXY_SECRET")
                .unwrap_or_else(|| DEFAULT_SECRET.to_string()),
            paths: EndpointPaths {
                access: env_string("SIGNED_PROXY_ACCESS_PATH")
                    .unwrap_or_else(|| DEFAULT_ACCESS_PATH.to_string()),
                clock: env_string("SIGNED_PROXY_CLOCK_PATH")
                    .unwrap_or_else(|| DEFAULT_CLOCK_PATH.to_string()),
                audit: env_string("SIGNED_PROXY_AUDIT_PATH")
                    .unwrap_or_else(|| DEFAULT_AUDIT_PATH.to_string()),
            },
            request_timeout: Duration::from_millis(
                env_parse("SIGNED_PROXY_REQUEST_TIMEOUT_MS").unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
            ),
            poll_interval: Duration::from_micros(
                env_parse("SIGNED_PROXY_POLL_INTERVAL_US").unwrap_or(DEFAULT_POLL_INTERVAL_US),
            ),
            access_timeout: DEFAULT_ACCESS_TIMEOUT,
            reset_policy: env_parse("SIGNED_PROXY_RESET_POLICY").unwrap_or_default(),
            info_path: env_string("SIGNED_PROXY_INFO_PATH")
                .unwrap_or_else(|| DEFAULT_INFO_PATH.to_string()),
            listen_port: env_parse("PORT").unwrap_or(DEFAULT_PORT),
        }
    }
}

impl ProxyConfig {
    /// Path of `endpoint`, as signed.
    pub fn path(&self, endpoint: Endpoint) -> &str {
        match endpoint {
            Endpoint::Access => &self.paths.access,
            Endpoint::Clock => &self.paths.clock,
            Endpoint::Audit => &self.paths.audit,
        }
    }

    /// Full URL of `endpoint`, as requested.
    pub fn url(&self, endpoint: Endpoint) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.path(endpoint))
    }

    /// Validates the configuration and returns any warnings.
    ///
    /// # Returns
    ///
    /// A vector of warning messages for potentially problematic settings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if !self.base_url.starts_with("https://") {
            warnings.push(
                "Base URL uses plain HTTP; signatures do not hide request contents".to_string(),
            );
        }
        if self.secret.is_empty() {
            warnings.push("Empty shared secret; every signature is forgeable".to_string());
        }

        for (name, path) in [
            ("access", &self.paths.access),
            ("clock", &self.paths.clock),
            ("audit", &self.paths.audit),
        ] {
            if !path.starts_with('/') {
                warnings.push(format!("The {name} path {path:?} does not start with '/'"));
            }
        }

        if self.request_timeout < Duration::from_millis(100) {
            warnings.push(
                "Very short request timeout (< 100ms) will fail most upstream calls".to_string(),
            );
        }
        if self.request_timeout > Duration::from_secs(30) {
            warnings
                .push("Long request timeout (> 30s) can stall the info endpoint".to_string());
        }

        if self.poll_interval > Duration::from_secs(1) {
            warnings.push(
                "Poll interval above 1s may send no observe at all during begin".to_string(),
            );
        }

        warnings
    }

    /// Returns a summary of the current configuration with the secret redacted.
    pub fn summary(&self) -> String {
        format!(
            "ProxyConfig {{ Upstream: {}, Paths: {}|{}|{}, Timeout: {}ms, Poll: {}us, Reset: {:?}, Listen: :{}{} }}",
            self.base_url,
            self.paths.access,
            self.paths.clock,
            self.paths.audit,
            self.request_timeout.as_millis(),
            self.poll_interval.as_micros(),
            self.reset_policy,
            self.listen_port,
            self.info_path,
        )
    }
}

impl std::fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.summary())
    }
}

impl From<ConfigPreset> for ProxyConfig {
    fn from(preset: ConfigPreset) -> Self {
        match preset {
            ConfigPreset::Production => Self {
                base_url: DEFAULT_BASE_URL.to_string(),
                secret: DEFAULT_SECRET.to_string(),
                paths: EndpointPaths::default(),
                request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
                poll_interval: Duration::from_micros(DEFAULT_POLL_INTERVAL_US),
                access_timeout: DEFAULT_ACCESS_TIMEOUT,
                reset_policy: ResetPolicy::Always,
                info_path: DEFAULT_INFO_PATH.to_string(),
                listen_port: DEFAULT_PORT,
            },
            ConfigPreset::Local => Self {
                base_url: LOCAL_BASE_URL.to_string(),
                ..Self::from(ConfigPreset::Production)
            },
            ConfigPreset::FromEnv => Self::default(),
        }
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env_string(name).and_then(|value| value.parse().ok())
}
