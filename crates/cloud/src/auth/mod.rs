//! Request signing for catalog and asset endpoints.

mod key;
mod none;

pub use key::ApiKeyAuth;
pub use none::NoAuth;

use crate::error::Result;

/// Adds authentication headers to outgoing requests.
pub trait CloudAuth: Send + Sync {
    /// Insert auth headers for a request to `url`.
    fn sign_request(
        &self,
        url: &str,
        method: &str,
        headers: &mut Vec<(String, String)>,
    ) -> Result<()>;
}
