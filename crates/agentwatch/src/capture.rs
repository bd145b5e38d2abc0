//! Opt-in capture of outbound LLM traffic.
//!
//! Nothing is patched globally. An application that wants its calls observed
//! sends them through a [`CapturingClient`], which forwards copies of
//! matching request/response pairs to a [`CaptureSink`] (normally the
//! [`Host`]). The traffic itself is passed through untouched.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Request, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};
use watchconf::InterceptConfig;
use watchproto::{HttpRequestData, HttpResponseData, NormalizedHttpEvent};

use crate::host::Host;

/// Receives captured traffic. Implementations must never fail the caller.
///
/// [`CapturingClient`] calls the sink on tokio's blocking pool, one call at a
/// time, so implementations may block (the [`Host`] writes to a socket).
pub trait CaptureSink: Send + Sync {
    fn on_request(&self, request: &HttpRequestData);
    fn on_response(&self, response: &HttpResponseData);
}

impl CaptureSink for Host {
    fn on_request(&self, request: &HttpRequestData) {
        match NormalizedHttpEvent::request(request) {
            Ok(event) => {
                if let Err(e) = self.send_event(&event) {
                    debug!("request not captured: {}", e);
                }
            }
            Err(e) => warn!("failed to encode captured request: {}", e),
        }
    }

    fn on_response(&self, response: &HttpResponseData) {
        match NormalizedHttpEvent::response(response) {
            Ok(event) => {
                if let Err(e) = self.send_event(&event) {
                    debug!("response not captured: {}", e);
                }
            }
            Err(e) => warn!("failed to encode captured response: {}", e),
        }
    }
}

/// Which hosts are worth capturing.
#[derive(Debug, Clone)]
pub struct InterceptRules {
    hosts: Vec<String>,
}

impl InterceptRules {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hosts: hosts
                .into_iter()
                .map(|h| h.into().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn from_config(config: &InterceptConfig) -> Self {
        Self::new(config.hosts.iter().cloned())
    }

    pub fn matches(&self, url: &Url) -> bool {
        url.host_str()
            .map(|host| {
                let host = host.trim_start_matches('[').trim_end_matches(']');
                self.hosts.iter().any(|h| h.eq_ignore_ascii_case(host))
            })
            .unwrap_or(false)
    }

    pub fn matches_str(&self, url: &str) -> bool {
        Url::parse(url).map(|u| self.matches(&u)).unwrap_or(false)
    }
}

/// Response returned by [`CapturingClient::execute`]. The body has already
/// been read so it could be captured.
#[derive(Debug, Clone)]
pub struct CapturedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl CapturedResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// `reqwest::Client` decorator that reports matching traffic to a sink.
#[derive(Clone)]
pub struct CapturingClient {
    client: reqwest::Client,
    rules: InterceptRules,
    sink: Arc<dyn CaptureSink>,
}

impl CapturingClient {
    pub fn new(client: reqwest::Client, rules: InterceptRules, sink: Arc<dyn CaptureSink>) -> Self {
        Self {
            client,
            rules,
            sink,
        }
    }

    /// The wrapped client, for building requests.
    pub fn inner(&self) -> &reqwest::Client {
        &self.client
    }

    pub async fn execute(&self, request: Request) -> Result<CapturedResponse, reqwest::Error> {
        let captured = if self.rules.matches(request.url()) {
            let data = request_data(&request);
            let sent = data.clone();
            self.report(move |sink| sink.on_request(&sent)).await;
            Some(data)
        } else {
            None
        };

        let response = self.client.execute(request).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        if let Some(request) = captured {
            let request = match serde_json::to_value(&request) {
                Ok(Value::Object(map)) => Some(map),
                _ => None,
            };
            let response = HttpResponseData {
                status_code: status.as_u16(),
                headers: header_map(&headers),
                body: Some(String::from_utf8_lossy(&body).into_owned()),
                request,
            };
            self.report(move |sink| sink.on_response(&response)).await;
        }

        Ok(CapturedResponse {
            status,
            headers,
            body,
        })
    }

    /// Run one sink call on the blocking pool and wait for it, which keeps
    /// the request ahead of its response.
    async fn report<F>(&self, f: F)
    where
        F: FnOnce(&dyn CaptureSink) + Send + 'static,
    {
        let sink = Arc::clone(&self.sink);
        if let Err(e) = tokio::task::spawn_blocking(move || f(sink.as_ref())).await {
            warn!("capture sink failed: {}", e);
        }
    }
}

fn header_map(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

fn request_data(request: &Request) -> HttpRequestData {
    HttpRequestData {
        method: request.method().as_str().to_string(),
        url: request.url().to_string(),
        headers: header_map(request.headers()),
        body: request
            .body()
            .and_then(|b| b.as_bytes())
            .map(|b| String::from_utf8_lossy(b).into_owned()),
    }
}
