//! Subscription-key header authentication.

use crate::auth::CloudAuth;
use crate::error::{CloudError, Result};

/// Header used by the Planetary Computer API gateway.
pub const PLANETARY_COMPUTER_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Sends an API key in a fixed header on every request.
#[derive(Clone)]
pub struct ApiKeyAuth {
    header: String,
    key: String,
}

impl ApiKeyAuth {
    pub fn new(header: impl Into<String>, key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(CloudError::Auth("API key is empty".into()));
        }
        Ok(Self {
            header: header.into(),
            key,
        })
    }

    /// Key sent as `Ocp-Apim-Subscription-Key`.
    pub fn planetary_computer(key: impl Into<String>) -> Result<Self> {
        Self::new(PLANETARY_COMPUTER_KEY_HEADER, key)
    }
}

impl std::fmt::Debug for ApiKeyAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyAuth")
            .field("header", &self.header)
            .field("key", &"***")
            .finish()
    }
}

impl CloudAuth for ApiKeyAuth {
    fn sign_request(
        &self,
        _url: &str,
        _method: &str,
        headers: &mut Vec<(String, String)>,
    ) -> Result<()> {
        headers.push((self.header.clone(), self.key.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adds_header() {
        let auth = ApiKeyAuth::planetary_computer("secret").unwrap();
        let mut headers = Vec::new();
        auth.sign_request("https://x", "GET", &mut headers).unwrap();
        assert_eq!(
            headers,
            vec![(PLANETARY_COMPUTER_KEY_HEADER.to_string(), "secret".to_string())]
        );
        assert!(!format!("{auth:?}").contains("secret"));
    }

    #[test]
    fn rejects_blank_key() {
        assert!(ApiKeyAuth::planetary_computer("  ").is_err());
    }
}
