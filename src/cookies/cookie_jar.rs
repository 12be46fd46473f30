//! Cookie jar abstraction and a simple in-memory implementation.
//!
//! Cookies are bucketed by **origin** (`url.origin().ascii_serialization()`,
//! i.e. scheme + host + port). Within a bucket, host/subdomain, path prefix
//! and `Secure` checks decide what goes into a request's `Cookie` header.
//!
//! `Set-Cookie` parsing covers `Path`, `Domain` (leading dot stripped),
//! `Expires` (stored, not enforced), `Max-Age` (`<= 0` deletes), `SameSite`,
//! `Secure` and `HttpOnly`.
//!
//! This module is **not** internally synchronized; share a jar through a
//! [`CookieJarHandle`](crate::cookies::CookieJarHandle).
use std::collections::HashMap;

use crate::cookies::Cookie;
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use url::Url;

/// A cookie jar holds the cookies of one HTTP service instance.
pub trait CookieJar: Send + Sync {
    /// Applies raw `Set-Cookie` header values received from `url`.
    ///
    /// A cookie with the same name in the same origin is replaced.
    fn store_set_cookies(&mut self, url: &Url, set_cookies: &mut dyn Iterator<Item = &str>);

    /// Applies every `Set-Cookie` header in `headers`.
    fn store_response_cookies(&mut self, url: &Url, headers: &HeaderMap) {
        let mut values = headers
            .get_all(http::header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok());
        self.store_set_cookies(url, &mut values);
    }

    /// Returns the `Cookie` request header value for `url`, or `None` when no cookie matches.
    fn get_request_cookies(&self, url: &Url) -> Option<String>;

    /// Stores `cookie` in the bucket of `url`'s origin.
    fn set_cookie(&mut self, url: &Url, cookie: Cookie);

    /// Removes the cookie named `cookie_name` from `url`'s origin.
    fn remove_cookie(&mut self, url: &Url, cookie_name: &str);

    /// Removes every cookie of `url`'s origin.
    fn remove_cookies_for_url(&mut self, url: &Url);

    /// Removes all cookies.
    fn clear(&mut self);

    /// All cookies grouped by origin as `"name=value; ..."` strings, for inspection.
    fn get_all_cookies(&self) -> Vec<(Url, String)>;
}

/// In-memory cookie jar, bucketed by origin.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultCookieJar {
    /// Key: origin string. Value: cookies for that origin.
    pub entries: HashMap<String, Vec<Cookie>>,
}

impl DefaultCookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    fn bucket(&mut self, url: &Url) -> &mut Vec<Cookie> {
        self.entries.entry(url.origin().ascii_serialization()).or_default()
    }
}

/// Parses one `Set-Cookie` value. The boolean is true when the cookie asks to be deleted.
fn parse_set_cookie(raw: &str, default_path: &str) -> Option<(Cookie, bool)> {
    let mut parts = raw.split(';');
    let (name, value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let mut cookie = Cookie {
        name: name.to_string(),
        value: value.trim().trim_matches('"').to_string(),
        path: None,
        domain: None,
        secure: false,
        expires: None,
        same_site: None,
        http_only: false,
    };
    let mut delete = false;

    for part in parts {
        let part = part.trim();
        if let Some((k, v)) = part.split_once('=') {
            let v = v.trim();
            match k.trim().to_ascii_lowercase().as_str() {
                "path" => cookie.path = Some(v.to_string()),
                "domain" => cookie.domain = Some(v.trim_start_matches('.').to_ascii_lowercase()),
                "expires" => cookie.expires = Some(v.to_string()),
                "max-age" => delete = v.parse::<i64>().map(|age| age <= 0).unwrap_or(false),
                "samesite" => {
                    let normalized = ["Lax", "Strict", "None"]
                        .into_iter()
                        .find(|s| s.eq_ignore_ascii_case(v))
                        .unwrap_or(v);
                    cookie.same_site = Some(normalized.to_string());
                }
                _ => {}
            }
        } else if part.eq_ignore_ascii_case("secure") {
            cookie.secure = true;
        } else if part.eq_ignore_ascii_case("httponly") {
            cookie.http_only = true;
        }
    }

    if cookie.path.is_none() {
        cookie.path = Some(default_path.to_string());
    }
    Some((cookie, delete))
}

impl CookieJar for DefaultCookieJar {
    fn store_set_cookies(&mut self, url: &Url, set_cookies: &mut dyn Iterator<Item = &str>) {
        let default_path = url
            .path()
            .rsplit_once('/')
            .map_or("/", |(a, _)| if a.is_empty() { "/" } else { a })
            .to_string();

        let bucket = self.bucket(url);
        for raw in set_cookies {
            let Some((cookie, delete)) = parse_set_cookie(raw, &default_path) else {
                log::debug!("ignoring malformed Set-Cookie from {url}: {raw}");
                continue;
            };

            bucket.retain(|c| c.name != cookie.name);
            if !delete {
                bucket.push(cookie);
            }
        }
    }

    fn get_request_cookies(&self, url: &Url) -> Option<String> {
        let origin = url.origin().ascii_serialization();
        let host = url.host_str().unwrap_or_default();
        let path = url.path();
        let is_https = url.scheme() == "https";

        let header = self
            .entries
            .get(&origin)?
            .iter()
            .filter(|cookie| match &cookie.domain {
                Some(domain) => host == domain || host.ends_with(&format!(".{domain}")),
                None => true,
            })
            .filter(|cookie| match &cookie.path {
                Some(cookie_path) => path.starts_with(cookie_path.as_str()),
                None => true,
            })
            .filter(|cookie| !cookie.secure || is_https)
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ");

        if header.is_empty() {
            None
        } else {
            Some(header)
        }
    }

    fn set_cookie(&mut self, url: &Url, cookie: Cookie) {
        let bucket = self.bucket(url);
        bucket.retain(|c| c.name != cookie.name);
        bucket.push(cookie);
    }

    fn remove_cookie(&mut self, url: &Url, cookie_name: &str) {
        if let Some(cookies) = self.entries.get_mut(&url.origin().ascii_serialization()) {
            cookies.retain(|c| c.name != cookie_name);
        }
    }

    fn remove_cookies_for_url(&mut self, url: &Url) {
        self.entries.remove(&url.origin().ascii_serialization());
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn get_all_cookies(&self) -> Vec<(Url, String)> {
        self.entries
            .iter()
            .filter_map(|(origin, cookies)| {
                Url::parse(origin).ok().map(|url| {
                    let joined = cookies
                        .iter()
                        .map(|c| format!("{}={}", c.name, c.value))
                        .collect::<Vec<_>>()
                        .join("; ");
                    (url, joined)
                })
            })
            .collect()
    }
}
