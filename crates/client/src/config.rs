//! Protocol client configuration.

use ragent_core::config::BackendConfig;
use ragent_core::{AppError, AppResult};
use std::time::Duration;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default total attempts for 5xx responses.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default fixed delay between 5xx attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Credential used for the `Authorization` header of one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    /// `Authorization: Bearer <api_key>`
    #[default]
    ApiKey,
    /// `Authorization: <login_token>`
    LoginToken,
}

/// Validated connection settings for [`crate::BackendClient`].
#[derive(Clone)]
pub struct ClientConfig {
    base_url: String,
    api_key: String,
    login_token: String,
    pub timeout: Duration,
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl ClientConfig {
    /// Build a config from the three required values.
    ///
    /// Trailing slashes are stripped from `base_url`. A missing or blank
    /// value fails here, never on first use.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        login_token: impl Into<String>,
    ) -> AppResult<Self> {
        let base_url = required("base_url", base_url.into())?;
        let api_key = required("api_key", api_key.into())?;
        let login_token = required("login_token", login_token.into())?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            login_token,
            timeout: DEFAULT_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        })
    }

    /// Build a config from the application's backend section.
    pub fn from_backend(backend: &BackendConfig) -> AppResult<Self> {
        let config = Self::new(
            backend.base_url.clone().unwrap_or_default(),
            backend.api_key.clone().unwrap_or_default(),
            backend.login_token.clone().unwrap_or_default(),
        )?;

        Ok(config
            .with_timeout(Duration::from_secs(backend.timeout_secs))
            .with_retry(
                backend.max_attempts,
                Duration::from_millis(backend.retry_delay_ms),
            ))
    }

    /// Override the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the 5xx retry policy. At least one attempt is always made.
    pub fn with_retry(mut self, max_attempts: u32, retry_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Header value for the given credential mode.
    pub fn authorization(&self, mode: AuthMode) -> String {
        match mode {
            AuthMode::ApiKey => format!("Bearer {}", self.api_key),
            AuthMode::LoginToken => self.login_token.clone(),
        }
    }
}

// Credentials stay out of logs.
impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("login_token", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("max_attempts", &self.max_attempts)
            .field("retry_delay", &self.retry_delay)
            .finish()
    }
}

fn required(name: &str, value: String) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Config(format!("{} is required", name)));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_trailing_slash() {
        let config = ClientConfig::new("http://localhost:9380//", "key", "token").unwrap();
        assert_eq!(config.base_url(), "http://localhost:9380");
    }

    #[test]
    fn test_missing_credentials_fail_immediately() {
        for (url, key, token, missing) in [
            ("", "key", "token", "base_url"),
            ("http://x", "  ", "token", "api_key"),
            ("http://x", "key", "", "login_token"),
        ] {
            match ClientConfig::new(url, key, token) {
                Err(AppError::Config(msg)) => assert!(msg.contains(missing), "{}", msg),
                other => panic!("expected config error, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_authorization_modes() {
        let config = ClientConfig::new("http://x", "key-1", "tok-1").unwrap();
        assert_eq!(config.authorization(AuthMode::ApiKey), "Bearer key-1");
        assert_eq!(config.authorization(AuthMode::LoginToken), "tok-1");
    }

    #[test]
    fn test_from_backend_applies_tunables() {
        let backend = BackendConfig {
            base_url: Some("http://x/".to_string()),
            api_key: Some("k".to_string()),
            login_token: Some("t".to_string()),
            timeout_secs: 5,
            max_attempts: 0,
            retry_delay_ms: 10,
        };
        let config = ClientConfig::from_backend(&backend).unwrap();
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.retry_delay, Duration::from_millis(10));
    }

    #[test]
    fn test_from_backend_without_key() {
        let backend = BackendConfig {
            base_url: Some("http://x".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            ClientConfig::from_backend(&backend),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = ClientConfig::new("http://x", "secret-key", "secret-token").unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("secret-key"));
        assert!(!debug.contains("secret-token"));
    }
}
