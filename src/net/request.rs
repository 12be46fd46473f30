//! Outgoing request description.
//!
//! A [`Request`] is built once and handed to
//! [`HttpService::send`](crate::net::HttpService::send) by value. Bodies are
//! kept as plain data so a repeated attempt can rebuild the wire request.

use bytes::Bytes;
use http::Method;
use reqwest::multipart::{Form, Part};
use reqwest::RequestBuilder;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::cache::CacheMode;
use crate::errors::Result;

/// Body of a POST request.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    /// `application/x-www-form-urlencoded` fields.
    Form(Vec<(String, String)>),
    /// `multipart/form-data` fields.
    Multipart(Vec<MultipartField>),
    /// An already serialized JSON document.
    Json(String),
    /// Raw bytes with an optional content type.
    Bytes { data: Bytes, content_type: Option<String> },
}

#[derive(Debug, Clone)]
pub struct MultipartField {
    pub name: String,
    pub value: MultipartValue,
}

#[derive(Debug, Clone)]
pub enum MultipartValue {
    Text(String),
    File {
        file_name: String,
        mime: Option<String>,
        data: Bytes,
    },
}

impl MultipartField {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: MultipartValue::Text(value.into()),
        }
    }

    pub fn file(
        name: impl Into<String>,
        file_name: impl Into<String>,
        mime: Option<&str>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            value: MultipartValue::File {
                file_name: file_name.into(),
                mime: mime.map(str::to_string),
                data: data.into(),
            },
        }
    }
}

impl RequestBody {
    /// Attaches the body to `builder`.
    pub(crate) fn apply(&self, builder: RequestBuilder) -> Result<RequestBuilder> {
        Ok(match self {
            RequestBody::Empty => builder,
            RequestBody::Form(fields) => builder.form(fields),
            RequestBody::Multipart(fields) => builder.multipart(build_form(fields)?),
            RequestBody::Json(json) => builder
                .header(http::header::CONTENT_TYPE, "application/json; charset=utf-8")
                .body(json.clone()),
            RequestBody::Bytes { data, content_type } => {
                let builder = match content_type {
                    Some(ct) => builder.header(http::header::CONTENT_TYPE, ct.as_str()),
                    None => builder,
                };
                builder.body(data.clone())
            }
        })
    }
}

fn build_form(fields: &[MultipartField]) -> Result<Form> {
    let mut form = Form::new();
    for field in fields {
        form = match &field.value {
            MultipartValue::Text(value) => form.text(field.name.clone(), value.clone()),
            MultipartValue::File { file_name, mime, data } => {
                let mut part = Part::bytes(data.to_vec()).file_name(file_name.clone());
                if let Some(mime) = mime {
                    part = part.mime_str(mime)?;
                }
                form.part(field.name.clone(), part)
            }
        };
    }
    Ok(form)
}

/// Per-call overrides. Every `None` falls back to the service defaults.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub cache_mode: Option<CacheMode>,
    pub cache_tag: Option<String>,
    pub repeat: Option<bool>,
    pub timeout_secs: Option<u64>,
    /// Extra cancellation signal for this call only.
    pub cancel: Option<CancellationToken>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache_mode = Some(mode);
        self
    }

    pub fn cache_tag(mut self, tag: impl Into<String>) -> Self {
        self.cache_tag = Some(tag.into());
        self
    }

    pub fn repeat(mut self, on: bool) -> Self {
        self.repeat = Some(on);
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// A request as issued by a caller. Only GET and POST can be built.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: Url,
    body: RequestBody,
    options: RequestOptions,
}

impl Request {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            body: RequestBody::Empty,
            options: RequestOptions::default(),
        }
    }

    pub fn post(url: Url, body: RequestBody) -> Self {
        Self {
            method: Method::POST,
            url,
            body,
            options: RequestOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    pub fn options(&self) -> &RequestOptions {
        &self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(body: &RequestBody) -> reqwest::Request {
        let builder = reqwest::Client::new().post("https://example.com/submit");
        body.apply(builder).unwrap().build().unwrap()
    }

    #[test]
    fn form_body_is_urlencoded() {
        let req = build(&RequestBody::Form(vec![("a".into(), "1 2".into()), ("b".into(), "x&y".into())]));
        assert_eq!(
            req.headers()[http::header::CONTENT_TYPE],
            "application/x-www-form-urlencoded"
        );
        let body = req.body().and_then(|b| b.as_bytes()).unwrap();
        assert_eq!(body, b"a=1+2&b=x%26y");
    }

    #[test]
    fn json_body_sets_content_type() {
        let req = build(&RequestBody::Json(r#"{"k":1}"#.into()));
        assert!(req.headers()[http::header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("application/json"));
        assert_eq!(req.body().and_then(|b| b.as_bytes()).unwrap(), br#"{"k":1}"#);
    }

    #[test]
    fn bytes_body_keeps_optional_content_type() {
        let req = build(&RequestBody::Bytes {
            data: Bytes::from_static(b"\x00\x01"),
            content_type: Some("application/octet-stream".into()),
        });
        assert_eq!(req.headers()[http::header::CONTENT_TYPE], "application/octet-stream");

        let req = build(&RequestBody::Bytes { data: Bytes::from_static(b"x"), content_type: None });
        assert!(req.headers().get(http::header::CONTENT_TYPE).is_none());
    }

    #[test]
    fn multipart_body_is_rebuilt_each_time() {
        let body = RequestBody::Multipart(vec![
            MultipartField::text("title", "hello"),
            MultipartField::file("upload", "a.txt", Some("text/plain"), &b"abc"[..]),
        ]);
        for _ in 0..2 {
            let req = build(&body);
            assert!(req.headers()[http::header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("multipart/form-data; boundary="));
        }
    }

    #[test]
    fn invalid_multipart_mime_is_an_error() {
        let body = RequestBody::Multipart(vec![MultipartField::file("f", "a", Some("not a mime"), &b""[..])]);
        let builder = reqwest::Client::new().post("https://example.com/");
        assert!(body.apply(builder).is_err());
    }

    #[test]
    fn options_builder_sets_overrides() {
        let opts = RequestOptions::new()
            .cache_mode(CacheMode::Full)
            .cache_tag("t")
            .repeat(true)
            .timeout_secs(3);
        assert_eq!(opts.cache_mode, Some(CacheMode::Full));
        assert_eq!(opts.cache_tag.as_deref(), Some("t"));
        assert_eq!(opts.repeat, Some(true));
        assert_eq!(opts.timeout_secs, Some(3));
        assert!(opts.cancel.is_none());
    }
}
