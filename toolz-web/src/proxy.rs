//! Relay fetcher: tries each configured proxy endpoint in order, first
//! success wins.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use toolz_config::{HttpSpec, ProxySpec};
use toolz_http::{HttpClient, HttpError, RequestOpts};
use url::Url;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no proxy endpoints configured")]
    NoEndpoints,
    #[error("invalid header `{header}` for proxy `{proxy}`")]
    InvalidHeader { proxy: String, header: String },
    #[error("http client setup failed: {0}")]
    Client(#[source] HttpError),
    #[error("all {attempted} proxy endpoints failed, last error: {last}")]
    ProxyExhausted { attempted: usize, last: HttpError },
}

/// Which response shape the markup was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Envelope {
    Contents,
    Body,
    Raw,
}

#[derive(Debug, Clone)]
pub struct RawPayload {
    /// Name of the endpoint that answered.
    pub proxy: String,
    pub envelope: Envelope,
    pub markup: String,
}

#[derive(Debug, Clone)]
pub struct ProxyEndpoint {
    pub name: String,
    pub base: String,
    pub headers: HeaderMap,
}

impl ProxyEndpoint {
    pub fn from_spec(spec: &ProxySpec) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        for (k, v) in &spec.headers {
            let invalid = || FetchError::InvalidHeader {
                proxy: spec.name.clone(),
                header: k.clone(),
            };
            let name = HeaderName::from_bytes(k.as_bytes()).map_err(|_| invalid())?;
            let value = HeaderValue::from_str(v).map_err(|_| invalid())?;
            headers.insert(name, value);
        }
        Ok(Self {
            name: spec.name.clone(),
            base: spec.base.clone(),
            headers,
        })
    }

    /// `base` followed by the percent-encoded target.
    pub fn request_url(&self, target: &Url) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(target.as_str().as_bytes()).collect();
        format!("{}{}", self.base, encoded)
    }
}

pub struct ProxyFetcher {
    http: HttpClient,
    endpoints: Vec<ProxyEndpoint>,
}

impl ProxyFetcher {
    pub fn new(http: HttpClient, specs: &[ProxySpec]) -> Result<Self, FetchError> {
        if specs.is_empty() {
            return Err(FetchError::NoEndpoints);
        }
        let endpoints = specs
            .iter()
            .map(ProxyEndpoint::from_spec)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            http: http.with_retries(0),
            endpoints,
        })
    }

    /// Build the HTTP client from `http` settings and the endpoint list.
    pub fn from_config(http: &HttpSpec, specs: &[ProxySpec]) -> Result<Self, FetchError> {
        let client = HttpClient::absolute()
            .and_then(|c| {
                c.with_connection(
                    Duration::from_secs(http.connect_timeout_secs),
                    http.user_agent.as_deref(),
                )
            })
            .map_err(FetchError::Client)?
            .with_timeout(Duration::from_secs(http.timeout_secs));
        Self::new(client, specs)
    }

    pub fn endpoints(&self) -> &[ProxyEndpoint] {
        &self.endpoints
    }

    /// One GET per endpoint, in order. Errors are swallowed until the list
    /// runs out; the last one is reported.
    pub async fn fetch(&self, target: &Url) -> Result<RawPayload, FetchError> {
        let mut last = None;
        for endpoint in &self.endpoints {
            let opts = RequestOpts {
                retries: Some(0),
                headers: (!endpoint.headers.is_empty()).then(|| endpoint.headers.clone()),
                ..Default::default()
            };
            match self.http.get_text(&endpoint.request_url(target), opts).await {
                Ok(body) => {
                    let (envelope, markup) = normalize_payload(body);
                    tracing::debug!(
                        target: "web.proxy",
                        proxy = %endpoint.name,
                        envelope = ?envelope,
                        bytes = markup.len(),
                        "proxy.ok"
                    );
                    return Ok(RawPayload {
                        proxy: endpoint.name.clone(),
                        envelope,
                        markup,
                    });
                }
                Err(e) => {
                    tracing::warn!(target: "web.proxy", proxy = %endpoint.name, error = %e, "proxy.failed");
                    last = Some(e);
                }
            }
        }
        match last {
            Some(last) => Err(FetchError::ProxyExhausted {
                attempted: self.endpoints.len(),
                last,
            }),
            None => Err(FetchError::NoEndpoints),
        }
    }
}

/// `contents ?? body ?? raw`. Empty strings count as missing.
pub fn normalize_payload(body: String) -> (Envelope, String) {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&body) {
        for (key, envelope) in [("contents", Envelope::Contents), ("body", Envelope::Body)] {
            if let Some(s) = map.get(key).and_then(Value::as_str).filter(|s| !s.is_empty()) {
                return (envelope, s.to_string());
            }
        }
    }
    (Envelope::Raw, body)
}
