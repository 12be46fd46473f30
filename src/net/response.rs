//! HTTP response model.
//!
//! A [`Response`] comes in two flavours with the same interface:
//!
//! - a **live** response, backed by the open network stream returned by the
//!   transport. The body is read on first access.
//! - a **cached** response, backed by files in the cache's
//!   [`FileStore`](crate::storage::FileStore). Always re-readable.
//!
//! `bytes()`, `text()`, `json()` and `json_value()` materialize the body once
//! and keep it for the lifetime of the response, so they can be called any
//! number of times. [`Response::into_stream`] consumes the response and is the
//! only way to read a live body without buffering it.
//!
//! `headers` is an `http::HeaderMap`, which is **case-insensitive** for header
//! names.
use std::fmt::Write as _;

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, StatusCode, Version};
use serde::de::DeserializeOwned;
use url::Url;

use crate::errors::{KitError, Result};
use crate::storage::FileStoreHandle;

pub const REQUEST_HEADERS_MARKER: &str = "--- REQUEST HEADERS ---";
pub const RESPONSE_HEADERS_MARKER: &str = "--- RESPONSE HEADERS ---";

enum Body {
    /// Open network stream; `None` once it has been taken.
    Live(Option<reqwest::Response>),
    /// Body file in a file store.
    Stored { store: FileStoreHandle, path: String },
    /// Materialized body.
    Ready(Bytes),
}

/// Where the diagnostic dump comes from.
enum Dump {
    Text(String),
    Stored { store: FileStoreHandle, path: String },
}

pub struct Response {
    url: Url,
    status: StatusCode,
    reason: String,
    mime: String,
    headers: HeaderMap,
    dump: Dump,
    body: Body,
    text: Option<String>,
    cached: bool,
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("url", &self.url.as_str())
            .field("status", &self.status.as_u16())
            .field("mime", &self.mime)
            .field("cached", &self.cached)
            .finish_non_exhaustive()
    }
}

impl Response {
    /// Wraps a response fresh off the wire. `request_dump` is the formatted
    /// request section produced by [`format_request`].
    pub(crate) fn live(url: Url, inner: reqwest::Response, request_dump: String) -> Self {
        let status = inner.status();
        let headers = inner.headers().clone();
        let mut dump = request_dump;
        dump.push_str(&format_response_head(inner.version(), status, &headers));

        Self {
            url,
            status,
            reason: reason_phrase(status),
            mime: mime_of(&headers),
            headers,
            dump: Dump::Text(dump),
            body: Body::Live(Some(inner)),
            text: None,
            cached: false,
        }
    }

    /// A response whose body and dump live in `store`.
    pub(crate) fn cached(url: Url, mime: &str, store: FileStoreHandle, body_path: String, info_path: String) -> Self {
        Self {
            url,
            status: StatusCode::OK,
            reason: reason_phrase(StatusCode::OK),
            mime: mime.to_string(),
            headers: content_type_headers(mime),
            dump: Dump::Stored { store: store.clone(), path: info_path },
            body: Body::Stored { store, path: body_path },
            text: None,
            cached: true,
        }
    }

    /// An in-memory response, mostly useful for tests and adapters.
    pub fn from_bytes(url: Url, status: StatusCode, mime: &str, body: impl Into<Bytes>) -> Self {
        let headers = content_type_headers(mime);
        let dump = format_response_head(Version::HTTP_11, status, &headers);

        Self {
            url,
            status,
            reason: reason_phrase(status),
            mime: mime_of(&headers),
            headers,
            dump: Dump::Text(dump),
            body: Body::Ready(body.into()),
            text: None,
            cached: false,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    /// Reason phrase, `"Unknown"` for non-standard codes.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// MIME type without parameters, lower-cased (e.g. `text/html`). Empty when unknown.
    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Raw `Content-Type`, parameters included.
    pub fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE.as_str())
    }

    /// True when served from the disk cache.
    pub fn is_cached(&self) -> bool {
        self.cached
    }

    pub fn is_html(&self) -> bool {
        is_html_mime(&self.mime)
    }

    /// Formatted request and response headers.
    pub fn dump(&self) -> String {
        match &self.dump {
            Dump::Text(text) => text.clone(),
            Dump::Stored { store, path } => store.read_text(path).unwrap_or_else(|e| {
                log::warn!("cannot read response info {path}: {e}");
                String::new()
            }),
        }
    }

    /// The whole body. Read once, then served from memory.
    pub async fn bytes(&mut self) -> Result<Bytes> {
        let data = match &mut self.body {
            Body::Ready(data) => return Ok(data.clone()),
            Body::Live(inner) => inner.take().ok_or(KitError::BodyConsumed)?.bytes().await?,
            Body::Stored { store, path } => Bytes::from(store.read_bytes(path)?),
        };
        self.body = Body::Ready(data.clone());
        Ok(data)
    }

    /// The body decoded as text (UTF-8, invalid sequences replaced).
    pub async fn text(&mut self) -> Result<String> {
        if let Some(text) = &self.text {
            return Ok(text.clone());
        }
        let data = self.bytes().await?;
        let text = String::from_utf8_lossy(&data).into_owned();
        self.text = Some(text.clone());
        Ok(text)
    }

    /// Deserializes the body into `T`.
    pub async fn json<T: DeserializeOwned>(&mut self) -> Result<T> {
        let data = self.bytes().await?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Parses the body into an untyped JSON tree.
    pub async fn json_value(&mut self) -> Result<serde_json::Value> {
        self.json().await
    }

    /// Consumes the response and yields the body in chunks.
    pub fn into_stream(self) -> BoxStream<'static, Result<Bytes>> {
        match self.body {
            Body::Live(Some(inner)) => inner.bytes_stream().map_err(KitError::from).boxed(),
            Body::Live(None) => stream::once(async { Err(KitError::BodyConsumed) }).boxed(),
            Body::Ready(data) => stream::once(async move { Ok(data) }).boxed(),
            Body::Stored { store, path } => {
                stream::once(async move { store.read_bytes(&path).map(Bytes::from) }).boxed()
            }
        }
    }
}

/// `Content-Type` without parameters, lower-cased.
pub fn mime_of(headers: &HeaderMap) -> String {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.split(';').next().unwrap_or_default().trim().to_ascii_lowercase())
        .unwrap_or_default()
}

pub fn is_html_mime(mime: &str) -> bool {
    mime == "text/html" || mime == "application/xhtml+xml"
}

/// Textual types: `text/*` plus the usual structured text formats.
pub fn is_text_mime(mime: &str) -> bool {
    mime.starts_with("text/")
        || mime.ends_with("+xml")
        || mime.ends_with("+json")
        || matches!(
            mime,
            "application/json" | "application/xml" | "application/javascript" | "application/x-www-form-urlencoded"
        )
}

fn content_type_headers(mime: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    match HeaderValue::from_str(mime) {
        Ok(value) if !mime.is_empty() => {
            headers.insert(CONTENT_TYPE, value);
        }
        _ => {}
    }
    headers
}

fn reason_phrase(status: StatusCode) -> String {
    status.canonical_reason().unwrap_or("Unknown").to_string()
}

fn write_headers(out: &mut String, headers: &HeaderMap) {
    for (name, value) in headers {
        let _ = writeln!(out, "{}: {}", name, String::from_utf8_lossy(value.as_bytes()));
    }
}

/// Formats the request section of a response dump.
pub(crate) fn format_request(request: &reqwest::Request) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{REQUEST_HEADERS_MARKER}");
    let _ = writeln!(out, "{} {} {:?}", request.method(), request.url(), request.version());
    write_headers(&mut out, request.headers());
    out
}

fn format_response_head(version: Version, status: StatusCode, headers: &HeaderMap) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{RESPONSE_HEADERS_MARKER}");
    let _ = writeln!(out, "{:?} {} {}", version, status.as_u16(), reason_phrase(status));
    write_headers(&mut out, headers);
    out
}
