use std::fmt::Debug;
use std::time::Duration;

const DEFAULT_MAX_RETRY_ELAPSED: Duration = Duration::from_secs(10);

/// Builder for [`HttpModelConfig`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct HttpModelConfigBuilder {
    endpoint: String,
    api_key: Option<String>,
    headers: Vec<(String, String)>,
    max_retry_elapsed: Option<Duration>,
}

impl HttpModelConfigBuilder {
    /// Creates a builder posting requests to the given URL.
    #[inline]
    pub fn with_endpoint<S: Into<String>>(endpoint: S) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            headers: vec![],
            max_retry_elapsed: None,
        }
    }

    /// Sets a bearer token sent with every request.
    #[inline]
    pub fn with_api_key<S: Into<String>>(mut self, api_key: S) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Adds an extra header sent with every request.
    #[inline]
    pub fn with_header<K: Into<String>, V: Into<String>>(
        mut self,
        name: K,
        value: V,
    ) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets how long failed deliveries are retried before giving up.
    ///
    /// `Duration::ZERO` disables retries.
    #[inline]
    pub fn with_max_retry_elapsed(mut self, elapsed: Duration) -> Self {
        self.max_retry_elapsed = Some(elapsed);
        self
    }

    /// Builds the configuration.
    #[inline]
    pub fn build(self) -> HttpModelConfig {
        HttpModelConfig {
            endpoint: self.endpoint,
            api_key: self.api_key,
            headers: self.headers,
            max_retry_elapsed: self
                .max_retry_elapsed
                .unwrap_or(DEFAULT_MAX_RETRY_ELAPSED),
        }
    }
}

impl Debug for HttpModelConfigBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpModelConfigBuilder")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("headers", &self.headers)
            .field("max_retry_elapsed", &self.max_retry_elapsed)
            .finish()
    }
}

/// Configuration for the HTTP backend provider.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct HttpModelConfig {
    pub(crate) endpoint: String,
    pub(crate) api_key: Option<String>,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) max_retry_elapsed: Duration,
}

impl HttpModelConfig {
    /// Returns the URL requests are posted to.
    #[inline]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Debug for HttpModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpModelConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("headers", &self.headers)
            .field("max_retry_elapsed", &self.max_retry_elapsed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_redaction() {
        let config = HttpModelConfigBuilder::with_endpoint("http://localhost:8080/chat")
            .with_api_key("sk-secret")
            .build();
        assert_eq!(config.endpoint(), "http://localhost:8080/chat");
        assert_eq!(config.max_retry_elapsed, DEFAULT_MAX_RETRY_ELAPSED);

        let debug = format!("{config:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("sk-secret"));
    }
}
