//! HTTP transport for the `/api/v2` API

use crate::error::CoreError;
use async_trait::async_trait;
use url::Url;

/// Request target split into the parts that may be logged and the
/// credential-bearing URL that may not
#[derive(Clone)]
pub struct ApiRequest {
    pub domain: String,
    pub resource_path: String,
    pub url: Url,
}

impl ApiRequest {
    /// `https://{domain}/api/v2{resource_path}?apiKey={credential}`
    pub fn new(domain: &str, resource_path: &str, credential: &str) -> Result<Self, CoreError> {
        let raw = format!("https://{}/api/v2{}", domain, resource_path);
        let mut url = Url::parse(&raw).map_err(|e| CoreError::InvalidUrl {
            url: format!("https://{}/api/v2{}", domain, resource_path),
            reason: e.to_string(),
        })?;
        url.query_pairs_mut().append_pair("apiKey", credential);

        Ok(Self {
            domain: domain.to_string(),
            resource_path: resource_path.to_string(),
            url,
        })
    }
}

/// Issues a GET and decodes the JSON body
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get_json(&self, request: &ApiRequest) -> Result<serde_json::Value, CoreError>;
}

/// `reqwest`-backed transport
#[derive(Clone, Default)]
pub struct ReqwestTransport {
    http: reqwest::Client,
    origin: Option<Url>,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send every request to `origin` (scheme, host and port) instead of the
    /// tenant domain; the path and query are kept
    pub fn with_origin(mut self, origin: Url) -> Self {
        self.origin = Some(origin);
        self
    }

    fn target(&self, request: &ApiRequest) -> Result<Url, CoreError> {
        let Some(origin) = &self.origin else {
            return Ok(request.url.clone());
        };

        let mut url = request.url.clone();
        let invalid = |reason: &str| CoreError::InvalidUrl {
            url: origin.to_string(),
            reason: reason.to_string(),
        };
        url.set_scheme(origin.scheme())
            .map_err(|_| invalid("unsupported scheme"))?;
        url.set_host(origin.host_str())
            .map_err(|e| invalid(&e.to_string()))?;
        url.set_port(origin.port())
            .map_err(|_| invalid("cannot set port"))?;
        Ok(url)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get_json(&self, request: &ApiRequest) -> Result<serde_json::Value, CoreError> {
        let http_error = |e: reqwest::Error| CoreError::Http {
            domain: request.domain.clone(),
            resource_path: request.resource_path.clone(),
            // The URL carries the credential
            message: e.without_url().to_string(),
        };

        let response = self
            .http
            .get(self.target(request)?)
            .send()
            .await
            .map_err(http_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(CoreError::Status {
                domain: request.domain.clone(),
                resource_path: request.resource_path.clone(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(http_error)?;

        serde_json::from_str(&body).map_err(|e| CoreError::JsonParse {
            domain: request.domain.clone(),
            resource_path: request.resource_path.clone(),
            message: e.to_string(),
        })
    }
}
