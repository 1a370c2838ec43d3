//! Connection settings for a GitLab instance.

use std::fmt;

use serde::Deserialize;

/// Base URL and personal access token.
///
/// Both values are kept verbatim. The base URL is the instance root without
/// a trailing slash (`https://gitlab.example.com`); `/api/v4` is appended by
/// the client.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct ClientConfig {
    base_url: String,
    token: String,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_token() {
        let config = ClientConfig::new("https://gitlab.example.com", "glpat-secret");
        let debug = format!("{config:?}");
        assert!(debug.contains("https://gitlab.example.com"));
        assert!(!debug.contains("glpat-secret"));
    }

    #[test]
    fn deserializes_from_json() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"base_url":"https://gitlab.example.com/","token":"t"}"#).unwrap();
        assert_eq!(config.base_url(), "https://gitlab.example.com/");
        assert_eq!(config.token(), "t");
    }
}
