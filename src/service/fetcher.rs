//! HTTP GET abstraction shared by every component that does network I/O.
//!
//! Components hold an `Arc<dyn HttpFetcher>` so tests can script responses
//! and the engine can share one connection pool.

use async_trait::async_trait;
use once_cell::sync::Lazy;

use crate::core::config::HttpConfig;
use crate::{Error, Result};

/// Shared async HTTP client used when no explicit configuration is given
pub(crate) static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    build_client(&HttpConfig::default()).unwrap_or_else(|e| {
        log::warn!("falling back to a default HTTP client: {}", e);
        reqwest::Client::new()
    })
});

fn build_client(config: &HttpConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(config.request_timeout)
        .pool_idle_timeout(config.pool_idle_timeout)
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .build()?)
}

/// A fully received HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            content_type: None,
            body: body.into(),
        }
    }

    pub fn with_status(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content_type: None,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turns a non-2xx response into [`Error::HttpStatus`].
    pub fn error_for_status(self, url: &str) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(Error::HttpStatus {
                status: self.status,
                url: url.to_string(),
            })
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Issues an HTTP GET for a URL.
#[async_trait]
pub trait HttpFetcher: Send + Sync {
    async fn get(&self, url: &str, accept: Option<&str>) -> Result<FetchResponse>;
}

/// [`HttpFetcher`] backed by reqwest.
///
/// Proxy-relative URLs such as `/geoserver/ws/wms` are joined onto `base_url`.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
    base_url: Option<url::Url>,
}

impl Default for ReqwestFetcher {
    fn default() -> Self {
        Self {
            client: HTTP_CLIENT.clone(),
            base_url: None,
        }
    }
}

impl ReqwestFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config)?,
            base_url: None,
        })
    }

    /// Sets the origin relative URLs are resolved against.
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self> {
        self.base_url = Some(url::Url::parse(base_url)?);
        Ok(self)
    }

    fn absolute_url(&self, url: &str) -> Result<url::Url> {
        match url::Url::parse(url) {
            Ok(parsed) => Ok(parsed),
            Err(url::ParseError::RelativeUrlWithoutBase) => match &self.base_url {
                Some(base) => Ok(base.join(url)?),
                None => Err(Error::InvalidUrl(url::ParseError::RelativeUrlWithoutBase)),
            },
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn get(&self, url: &str, accept: Option<&str>) -> Result<FetchResponse> {
        let target = self.absolute_url(url)?;
        let mut request = self.client.get(target);
        if let Some(accept) = accept {
            request = request.header(reqwest::header::ACCEPT, accept);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?.to_vec();

        Ok(FetchResponse {
            status,
            content_type,
            body,
        })
    }
}
