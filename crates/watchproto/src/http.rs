//! Normalized HTTP events handed over by the capture layer.
//!
//! Capture is independent of the HTTP library that produced the traffic: any
//! adapter that can fill [`HttpRequestData`] / [`HttpResponseData`] can feed the
//! pipeline.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::unix_timestamp;

/// Kind of captured HTTP event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HttpEventKind {
    #[serde(rename = "http_request")]
    Request,
    #[serde(rename = "http_response")]
    Response,
}

/// Outbound request as seen by the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpRequestData {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// Response received for an outbound request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpResponseData {
    pub status_code: u16,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<Map<String, Value>>,
}

/// Decoded event payload.
#[derive(Debug, Clone, PartialEq)]
pub enum HttpPayload {
    Request(HttpRequestData),
    Response(HttpResponseData),
}

impl HttpPayload {
    pub fn kind(&self) -> HttpEventKind {
        match self {
            HttpPayload::Request(_) => HttpEventKind::Request,
            HttpPayload::Response(_) => HttpEventKind::Response,
        }
    }

    pub fn body(&self) -> Option<&str> {
        match self {
            HttpPayload::Request(r) => r.body.as_deref(),
            HttpPayload::Response(r) => r.body.as_deref(),
        }
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        match self {
            HttpPayload::Request(r) => &r.headers,
            HttpPayload::Response(r) => &r.headers,
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers()
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A captured request or response, ready to ship as `EVENT` params.
///
/// `data` stays untyped on the wire; [`NormalizedHttpEvent::payload`] decodes
/// it according to `event_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedHttpEvent {
    pub event_type: HttpEventKind,
    #[serde(default = "unix_timestamp")]
    pub timestamp: f64,
    pub data: Map<String, Value>,
}

impl NormalizedHttpEvent {
    pub fn request(data: &HttpRequestData) -> Result<Self, serde_json::Error> {
        Self::from_parts(HttpEventKind::Request, data)
    }

    pub fn response(data: &HttpResponseData) -> Result<Self, serde_json::Error> {
        Self::from_parts(HttpEventKind::Response, data)
    }

    fn from_parts<T: Serialize>(kind: HttpEventKind, data: &T) -> Result<Self, serde_json::Error> {
        let data = match serde_json::to_value(data)? {
            Value::Object(map) => map,
            _ => return Err(serde::ser::Error::custom("http event data must be an object")),
        };
        Ok(Self {
            event_type: kind,
            timestamp: unix_timestamp(),
            data,
        })
    }

    /// Decode `data` as the payload type matching `event_type`.
    pub fn payload(&self) -> Result<HttpPayload, serde_json::Error> {
        let data = Value::Object(self.data.clone());
        match self.event_type {
            HttpEventKind::Request => serde_json::from_value(data).map(HttpPayload::Request),
            HttpEventKind::Response => serde_json::from_value(data).map(HttpPayload::Response),
        }
    }
}
