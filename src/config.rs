//! Client configuration
//!
//! The only externally supplied setting that changes behavior is the base URL
//! of the analysis service. Timeouts have sensible defaults and can be tuned
//! through the environment.

use std::time::Duration;

/// Fixed cadence of the live frame sampler.
pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(300);

const DEFAULT_BASE_URL: &str = "http://localhost:5000";

/// Configuration for the analysis client and session.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the analysis service (no trailing slash)
    pub base_url: String,

    /// Timeout for a whole upload-and-analyze request
    pub upload_timeout: Duration,

    /// Timeout for a single live frame request
    pub frame_timeout: Duration,

    /// Live sampling cadence
    pub sample_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            upload_timeout: Duration::from_secs(600), // long videos take a while server-side
            frame_timeout: Duration::from_secs(5),
            sample_interval: SAMPLE_INTERVAL,
        }
    }
}

impl ClientConfig {
    /// Create a config pointing at `base_url`, defaults for everything else.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: normalize_base_url(base_url.into()),
            ..Self::default()
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("POSTURE_API_URL")
                .map(normalize_base_url)
                .unwrap_or(defaults.base_url),
            upload_timeout: std::env::var("POSTURE_UPLOAD_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.upload_timeout),
            frame_timeout: std::env::var("POSTURE_FRAME_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.frame_timeout),
            sample_interval: SAMPLE_INTERVAL,
        }
    }

    /// Full URL for an endpoint path such as `/upload`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn normalize_base_url(url: String) -> String {
    url.trim().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, "http://localhost:5000");
        assert_eq!(config.sample_interval, Duration::from_millis(300));
    }

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        let config = ClientConfig::new("http://analysis.local:8080/ ");
        assert_eq!(config.endpoint("/upload"), "http://analysis.local:8080/upload");
    }
}
