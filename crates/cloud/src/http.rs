//! HTTP client wrapper: JSON requests for the catalog, Range requests for COGs.
//!
//! Every request is sent exactly once. A failure surfaces to the caller,
//! which decides whether it fails a search or skips a scene.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::auth::CloudAuth;
use crate::error::{CloudError, Result};

/// HTTP client shared by one catalog search or one COG reader.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    request_timeout: Duration,
}

/// Response from a HEAD request.
pub struct HeadInfo {
    /// Total file size in bytes, if reported by the server.
    pub content_length: Option<u64>,
    /// Whether the server supports Range requests.
    pub accept_ranges: bool,
}

impl HttpClient {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| CloudError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            request_timeout,
        })
    }

    fn signed(
        &self,
        mut req: reqwest::RequestBuilder,
        url: &str,
        method: &str,
        auth: &dyn CloudAuth,
    ) -> Result<reqwest::RequestBuilder> {
        let mut auth_headers = Vec::new();
        auth.sign_request(url, method, &mut auth_headers)?;
        for (key, value) in &auth_headers {
            req = req.header(key.as_str(), value.as_str());
        }
        Ok(req)
    }

    /// Send a HEAD request to discover file size and Range support.
    pub async fn head(&self, url: &str, auth: &dyn CloudAuth) -> Result<HeadInfo> {
        let req = self.signed(self.client.head(url), url, "HEAD", auth)?;
        let resp = req.send().await?;

        let accept_ranges = resp
            .headers()
            .get("accept-ranges")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("bytes"))
            .unwrap_or(false);

        let content_length = resp
            .headers()
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        Ok(HeadInfo {
            content_length,
            accept_ranges,
        })
    }

    /// Fetch `[offset .. offset + length)` of a remote file.
    pub async fn fetch_range(
        &self,
        url: &str,
        offset: u64,
        length: u64,
        auth: &dyn CloudAuth,
    ) -> Result<Vec<u8>> {
        if length == 0 {
            return Ok(Vec::new());
        }
        let range_value = format!("bytes={}-{}", offset, offset + length - 1);
        let req = self.client.get(url).header("Range", &range_value);
        let resp = self.signed(req, url, "GET", auth)?.send().await?;

        let status = resp.status();
        if status == reqwest::StatusCode::RANGE_NOT_SATISFIABLE
            || (status.is_success() && status != reqwest::StatusCode::PARTIAL_CONTENT)
        {
            return Err(CloudError::RangeNotSupported {
                url: strip_query(url).to_string(),
            });
        }
        if !status.is_success() {
            return Err(CloudError::HttpStatus {
                status: status.as_u16(),
                url: strip_query(url).to_string(),
            });
        }

        let bytes = resp.bytes().await?;
        Ok(bytes.to_vec())
    }

    /// Fetch several byte ranges concurrently, results in request order.
    pub async fn fetch_ranges(
        &self,
        url: &str,
        ranges: &[(u64, u64)],
        auth: &dyn CloudAuth,
    ) -> Result<Vec<Vec<u8>>> {
        use futures::stream::{FuturesOrdered, StreamExt};

        let mut futs = FuturesOrdered::new();
        for &(offset, length) in ranges {
            futs.push_back(self.fetch_range(url, offset, length, auth));
        }

        let mut results = Vec::with_capacity(ranges.len());
        while let Some(res) = futs.next().await {
            results.push(res?);
        }
        Ok(results)
    }

    /// GET a JSON document.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str, auth: &dyn CloudAuth) -> Result<T> {
        let req = self.signed(self.client.get(url), url, "GET", auth)?;
        let resp = req.send().await?;
        decode_json(url, resp).await
    }

    /// POST a JSON body and decode the JSON reply.
    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
        auth: &dyn CloudAuth,
    ) -> Result<T> {
        let req = self.client.post(url).json(body);
        let resp = self.signed(req, url, "POST", auth)?.send().await?;
        decode_json(url, resp).await
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

async fn decode_json<T: DeserializeOwned>(url: &str, resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        tracing::debug!(
            status = status.as_u16(),
            body = %body.chars().take(300).collect::<String>(),
            "Request rejected"
        );
        return Err(CloudError::HttpStatus {
            status: status.as_u16(),
            url: strip_query(url).to_string(),
        });
    }
    let body = resp.text().await?;
    Ok(serde_json::from_str(&body)?)
}

/// URL without its query string, so SAS tokens never reach logs or errors.
pub fn strip_query(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}
