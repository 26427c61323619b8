//! No-op authentication for public endpoints.

use crate::auth::CloudAuth;
use crate::error::Result;

/// Anonymous access. Planetary Computer and Earth Search both serve
/// searches and SAS tokens without a key.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

impl CloudAuth for NoAuth {
    fn sign_request(
        &self,
        _url: &str,
        _method: &str,
        _headers: &mut Vec<(String, String)>,
    ) -> Result<()> {
        Ok(())
    }
}
