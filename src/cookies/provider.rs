use http::HeaderValue;
use std::sync::PoisonError;
use url::Url;

use crate::cookies::CookieJarHandle;

/// Exposes a [`CookieJarHandle`] as reqwest's cookie container, so every
/// request carries the origin's cookies and every `Set-Cookie` lands in the jar.
#[derive(Clone)]
pub struct JarCookieProvider {
    jar: CookieJarHandle,
}

impl JarCookieProvider {
    pub fn new(jar: CookieJarHandle) -> Self {
        Self { jar }
    }
}

impl reqwest::cookie::CookieStore for JarCookieProvider {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let mut values = cookie_headers.filter_map(|v| v.to_str().ok());
        self.jar
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .store_set_cookies(url, &mut values);
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        let header = self
            .jar
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get_request_cookies(url)?;
        HeaderValue::from_str(&header).ok()
    }
}
