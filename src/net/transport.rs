//! Wire-level HTTP client.
//!
//! [`HttpTransport`] owns the `reqwest` client, the instance's default request
//! headers and the cookie provider. It follows `302` redirects itself (the
//! client is built with redirects disabled), tolerates `404`, and turns every
//! other non-success status into [`KitError::HttpStatus`].
//!
//! Default headers live behind a lock and are shared by all calls made through
//! the transport. They are **not** ordered against requests already in flight;
//! callers that mutate headers while requests run must serialize that
//! themselves.
use std::error::Error as StdError;
use std::io;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use http::header::{
    HeaderName, HeaderValue, ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, CACHE_CONTROL, LOCATION, ORIGIN,
    REFERER, UPGRADE_INSECURE_REQUESTS, USER_AGENT,
};
use http::{HeaderMap, Method, StatusCode};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::KitConfig;
use crate::cookies::{CookieJarHandle, JarCookieProvider};
use crate::errors::{KitError, Result};
use crate::net::request::RequestBody;
use crate::net::response::{format_request, Response};

/// OS error code of the handshake-level socket fault the transport retries on its own.
pub const HANDSHAKE_FAULT_OS_ERROR: i32 = 12030;

pub struct HttpTransport {
    client: reqwest::Client,
    headers: RwLock<HeaderMap>,
    max_redirects: usize,
    fault_retries: u32,
}

impl HttpTransport {
    /// Builds the client with the default headers from `config` and `jar` as
    /// its cookie container.
    pub fn new(config: &KitConfig, jar: CookieJarHandle) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .cookie_provider(Arc::new(JarCookieProvider::new(jar)))
            .build()?;

        Ok(Self {
            client,
            headers: RwLock::new(default_headers(config)?),
            max_redirects: config.max_redirects,
            fault_retries: config.transport_fault_retries,
        })
    }

    /// Snapshot of the current default headers.
    pub fn headers(&self) -> HeaderMap {
        self.read_headers().clone()
    }

    /// Replaces every value of `name` with `value`.
    pub fn set_header(&self, name: &str, value: &str) -> Result<()> {
        let (name, value) = header_pair(name, value)?;
        self.write_headers().insert(name, value);
        Ok(())
    }

    /// Adds `value` to `name`, keeping the values already present.
    pub fn add_to_header(&self, name: &str, value: &str) -> Result<()> {
        let (name, value) = header_pair(name, value)?;
        self.write_headers().append(name, value);
        Ok(())
    }

    pub fn remove_header(&self, name: &str) -> Result<()> {
        let name = header_name(name)?;
        self.write_headers().remove(name);
        Ok(())
    }

    /// Issues a GET for `url`.
    ///
    /// The handshake-level transport fault is retried up to
    /// `transport_fault_retries` times before it surfaces. When the final
    /// response is HTML, `url` becomes the `Referer` of later calls.
    pub async fn get(&self, url: &Url, cancel: &CancellationToken) -> Result<Response> {
        let response = self
            .execute(Method::GET, url, &RequestBody::Empty, HeaderMap::new(), true, cancel)
            .await?;

        if response.is_html() {
            if let Ok(referer) = HeaderValue::from_str(url.as_str()) {
                self.write_headers().insert(REFERER, referer);
            }
        }
        Ok(response)
    }

    /// Issues a POST of `body` to `url`.
    ///
    /// `Cache-Control: max-age=0` and `Origin` are sent with this request only;
    /// the shared default headers are never touched.
    pub async fn post(&self, url: &Url, body: &RequestBody, cancel: &CancellationToken) -> Result<Response> {
        let mut extra = HeaderMap::new();
        extra.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));
        if let Ok(origin) = HeaderValue::from_str(&url.origin().ascii_serialization()) {
            extra.insert(ORIGIN, origin);
        }
        self.execute(Method::POST, url, body, extra, false, cancel).await
    }

    async fn execute(
        &self,
        method: Method,
        url: &Url,
        body: &RequestBody,
        extra: HeaderMap,
        retry_faults: bool,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        let mut method = method;
        let mut url = url.clone();
        let mut body = body.clone();
        let mut extra = extra;
        let mut hops = 0;

        loop {
            let response = self.send_with_fault_retries(&method, &url, &body, &extra, retry_faults, cancel).await?;

            if response.status() == StatusCode::FOUND {
                if hops >= self.max_redirects {
                    return Err(KitError::RedirectLimit(self.max_redirects));
                }
                let next = redirect_target(&url, response.headers())?;
                log::debug!("302 {url} -> {next}");

                // a redirected POST is re-issued as a plain GET
                method = Method::GET;
                body = RequestBody::Empty;
                extra.clear();
                url = next;
                hops += 1;
                continue;
            }

            return check_status(response);
        }
    }

    async fn send_with_fault_retries(
        &self,
        method: &Method,
        url: &Url,
        body: &RequestBody,
        extra: &HeaderMap,
        retry_faults: bool,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        let mut retries = 0;
        loop {
            match self.send(method, url, body, extra, cancel).await {
                Err(KitError::TransientTransport(msg)) if retry_faults && retries < self.fault_retries => {
                    retries += 1;
                    log::warn!("transport fault on {url} ({msg}), retry {retries}/{}", self.fault_retries);
                }
                other => return other,
            }
        }
    }

    async fn send(
        &self,
        method: &Method,
        url: &Url,
        body: &RequestBody,
        extra: &HeaderMap,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        let mut headers = self.headers();
        for (name, value) in extra {
            headers.insert(name.clone(), value.clone());
        }

        let builder = self.client.request(method.clone(), url.clone()).headers(headers);
        let request = body.apply(builder)?.build()?;
        let dump = format_request(&request);

        log::debug!("{method} {url}");
        let inner = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(KitError::Canceled),
            res = self.client.execute(request) => res.map_err(classify)?,
        };

        Ok(Response::live(url.clone(), inner, dump))
    }

    fn read_headers(&self) -> RwLockReadGuard<'_, HeaderMap> {
        self.headers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_headers(&self) -> RwLockWriteGuard<'_, HeaderMap> {
        self.headers.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn default_headers(config: &KitConfig) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, header_value(&config.accept)?);
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate"));
    headers.insert(ACCEPT_LANGUAGE, header_value(&config.accept_language)?);
    headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    headers.insert(USER_AGENT, header_value(&config.user_agent)?);
    Ok(headers)
}

fn header_name(name: &str) -> Result<HeaderName> {
    HeaderName::from_bytes(name.as_bytes()).map_err(|e| KitError::InvalidHeader(format!("{name}: {e}")))
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| KitError::InvalidHeader(format!("{value:?}: {e}")))
}

fn header_pair(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    Ok((header_name(name)?, header_value(value)?))
}

/// Resolves the `Location` of a redirect against the URL that produced it.
fn redirect_target(from: &Url, headers: &HeaderMap) -> Result<Url> {
    headers
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|location| from.join(location.trim()).ok())
        .ok_or_else(|| KitError::MissingLocation(from.clone()))
}

/// 2xx and 404 pass through; anything else becomes an error.
fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        log::warn!("404 Not Found: {}", response.url());
        return Ok(response);
    }
    Err(KitError::HttpStatus {
        status: status.as_u16(),
        url: response.url().clone(),
    })
}

fn classify(err: reqwest::Error) -> KitError {
    if is_handshake_fault(&err) {
        KitError::TransientTransport(err.to_string())
    } else {
        KitError::Network(err)
    }
}

/// Walks the source chain looking for the socket fault worth a quiet retry.
fn is_handshake_fault(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<io::Error>() {
            if io.raw_os_error() == Some(HANDSHAKE_FAULT_OS_ERROR)
                || matches!(io.kind(), io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted)
            {
                return true;
            }
        }
        current = e.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookies::DefaultCookieJar;

    fn transport() -> HttpTransport {
        HttpTransport::new(&KitConfig::default(), DefaultCookieJar::new().into()).unwrap()
    }

    #[derive(Debug)]
    struct Wrapped(io::Error);

    impl std::fmt::Display for Wrapped {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "connect failed")
        }
    }

    impl StdError for Wrapped {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn default_headers_are_browser_like() {
        let headers = transport().headers();
        assert_eq!(headers[ACCEPT_ENCODING], "gzip, deflate");
        assert_eq!(headers[UPGRADE_INSECURE_REQUESTS], "1");
        assert_eq!(headers[USER_AGENT], crate::config::DEFAULT_USER_AGENT);
        assert!(headers.contains_key(ACCEPT));
        assert!(headers.contains_key(ACCEPT_LANGUAGE));
    }

    #[test]
    fn header_mutators_edit_the_defaults() {
        let t = transport();
        t.set_header("X-Token", "a").unwrap();
        t.add_to_header("x-token", "b").unwrap();
        let values: Vec<_> = t.headers().get_all("x-token").iter().cloned().collect();
        assert_eq!(values, vec!["a", "b"]);

        t.set_header("X-Token", "c").unwrap();
        assert_eq!(t.headers()["x-token"], "c");

        t.remove_header("X-TOKEN").unwrap();
        assert!(!t.headers().contains_key("x-token"));
    }

    #[test]
    fn invalid_headers_are_rejected() {
        let t = transport();
        assert!(matches!(t.set_header("bad name", "v"), Err(KitError::InvalidHeader(_))));
        assert!(matches!(t.set_header("x", "line\nbreak"), Err(KitError::InvalidHeader(_))));
    }

    #[test]
    fn redirect_location_resolves_against_the_request() {
        let from = Url::parse("https://x.test/a/b?q=1").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(LOCATION, HeaderValue::from_static("/c"));
        assert_eq!(redirect_target(&from, &headers).unwrap().as_str(), "https://x.test/c");

        headers.insert(LOCATION, HeaderValue::from_static("d"));
        assert_eq!(redirect_target(&from, &headers).unwrap().as_str(), "https://x.test/a/d");

        assert!(matches!(
            redirect_target(&from, &HeaderMap::new()),
            Err(KitError::MissingLocation(_))
        ));
    }

    #[test]
    fn status_check_tolerates_404_only() {
        let url = Url::parse("https://x.test/").unwrap();
        let ok = Response::from_bytes(url.clone(), StatusCode::OK, "text/plain", "");
        assert!(check_status(ok).is_ok());

        let missing = Response::from_bytes(url.clone(), StatusCode::NOT_FOUND, "text/plain", "");
        assert_eq!(check_status(missing).unwrap().status_code(), 404);

        let broken = Response::from_bytes(url, StatusCode::SERVICE_UNAVAILABLE, "text/plain", "");
        assert_eq!(check_status(broken).unwrap_err().status(), Some(503));
    }

    #[test]
    fn handshake_fault_is_found_in_the_source_chain() {
        let native = Wrapped(io::Error::from_raw_os_error(HANDSHAKE_FAULT_OS_ERROR));
        assert!(is_handshake_fault(&native));

        let reset = Wrapped(io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(is_handshake_fault(&reset));

        let refused = Wrapped(io::Error::from(io::ErrorKind::ConnectionRefused));
        assert!(!is_handshake_fault(&refused));
    }
}
