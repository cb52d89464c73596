// src/utils/http.rs

//! HTTP client utilities.
//!
//! All outbound requests flow through [`HttpClient`], which applies the
//! configured user agent, dial timeout, and end-to-end request timeout.

use std::time::Duration;

use futures::future::try_join_all;
use md5::{Digest, Md5};
use reqwest::header::{ACCEPT, IF_NONE_MATCH};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// Host portion of a URL, for tagging remote errors.
fn host_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}

/// A configured asynchronous HTTP client.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
}

impl HttpClient {
    /// Create a client with the given user agent and timeouts.
    pub fn new(
        user_agent: &str,
        dial_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(dial_timeout)
            .timeout(request_timeout)
            .build()?;
        Ok(Self { inner })
    }

    /// Issue a GET and return the raw response without status handling.
    /// Used by the meta resolver, which inspects non-200 statuses itself.
    pub async fn get_response(&self, url: &str) -> Result<Response> {
        self.inner
            .get(url)
            .send()
            .await
            .map_err(|e| Error::remote(host_of(url), e))
    }

    /// GET the resource, mapping 404 to NotFound and other failures to a
    /// host-tagged remote error.
    async fn get_checked(&self, url: &str, accept: Option<&str>) -> Result<Response> {
        let mut req = self.inner.get(url);
        if let Some(a) = accept {
            req = req.header(ACCEPT, a);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| Error::remote(host_of(url), e))?;
        match resp.status() {
            StatusCode::OK => Ok(resp),
            StatusCode::NOT_FOUND => Err(Error::not_found(format!("Resource not found: {url}"))),
            status => Err(Error::remote(
                host_of(url),
                format!("get {url} -> {}", status.as_u16()),
            )),
        }
    }

    /// GET and decode a JSON document. A JSON syntax error is reported as
    /// NotFound, matching hosts that serve HTML error pages with status 200.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let resp = self.get_checked(url, None).await?;
        let body = resp.bytes().await.map_err(|e| Error::remote(host_of(url), e))?;
        serde_json::from_slice(&body)
            .map_err(|_| Error::not_found(format!("JSON syntax error at {url}")))
    }

    /// GET the raw bytes of a resource.
    pub async fn get_bytes(&self, url: &str, accept: Option<&str>) -> Result<Vec<u8>> {
        let resp = self.get_checked(url, accept).await?;
        let body = resp.bytes().await.map_err(|e| Error::remote(host_of(url), e))?;
        Ok(body.to_vec())
    }

    /// Conditionally GET a resource with `If-None-Match`. Returns the body
    /// and the new etag; a 304 response maps to [`Error::NotModified`].
    pub async fn get_bytes_none_match(&self, url: &str, etag: &str) -> Result<(Vec<u8>, String)> {
        let resp = self
            .inner
            .get(url)
            .header(IF_NONE_MATCH, format!("\"{etag}\""))
            .send()
            .await
            .map_err(|e| Error::remote(host_of(url), e))?;

        let new_etag = resp
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_matches('"').to_string())
            .unwrap_or_default();

        match resp.status() {
            StatusCode::OK => {
                let body = resp.bytes().await.map_err(|e| Error::remote(host_of(url), e))?;
                Ok((body.to_vec(), new_etag))
            }
            StatusCode::NOT_MODIFIED => Err(Error::NotModified),
            StatusCode::NOT_FOUND => Err(Error::not_found(format!("Resource not found: {url}"))),
            status => Err(Error::remote(
                host_of(url),
                format!("get {url} -> {}", status.as_u16()),
            )),
        }
    }

    /// Fetch every URL in parallel, aborting all on the first error.
    /// Results are returned in input order.
    pub async fn fetch_all(&self, urls: &[String], accept: Option<&str>) -> Result<Vec<Vec<u8>>> {
        try_join_all(urls.iter().map(|u| self.get_bytes(u, accept))).await
    }
}

/// Content etag for listings without host-side cache validation: an MD5 over
/// the per-file hashes, sorted so the result is order independent.
pub fn content_etag<'a>(bodies: impl Iterator<Item = &'a [u8]>) -> String {
    let mut hashes: Vec<String> = bodies
        .map(|b| format!("{:x}", Md5::digest(b)))
        .collect();
    hashes.sort();
    let mut h = Md5::new();
    for fh in &hashes {
        h.update(fh.as_bytes());
    }
    format!("{:x}", h.finalize())
}
