//! Repository client configuration.

use autotag_protocol::defaults;
use url::Url;

use crate::error::RepositoryError;

/// Connection settings for the repository REST API.
///
/// Custom `Debug` implementation redacts the password.
#[derive(Clone)]
pub struct RepositoryConfig {
    /// Server root, e.g. `http://alfresco:8080`.
    pub base_url: Url,
    pub username: String,
    pub password: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// `maxItems` used when paging through children and tags.
    pub page_size: u32,
}

impl std::fmt::Debug for RepositoryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("timeout_secs", &self.timeout_secs)
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl RepositoryConfig {
    pub fn new(
        base_url: &str,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, RepositoryError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| RepositoryError::Config(format!("invalid base URL {:?}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(RepositoryError::Config(format!(
                "base URL {} cannot carry a path",
                base_url
            )));
        }
        Ok(Self {
            base_url,
            username: username.into(),
            password: password.into(),
            timeout_secs: defaults::DEFAULT_HTTP_TIMEOUT_SECS,
            page_size: defaults::DEFAULT_PAGE_SIZE,
        })
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_password() {
        let config = RepositoryConfig::new("http://localhost:8080", "admin", "s3cret").unwrap();
        let rendered = format!("{:?}", config);
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("s3cret"));
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(RepositoryConfig::new("not a url", "a", "b").is_err());
        assert!(RepositoryConfig::new("mailto:ops@example.com", "a", "b").is_err());
    }

    #[test]
    fn test_page_size_is_bounded_below() {
        let config = RepositoryConfig::new("http://localhost", "a", "b")
            .unwrap()
            .with_page_size(0);
        assert_eq!(config.page_size, 1);
    }
}
