//! Cookie core types.
//!
//! # Concurrency model
//! [`CookieJarHandle`] is `Arc<RwLock<dyn CookieJar + Send + Sync>>`. Take a
//! **read lock** to build the `Cookie` header of a request and a **write lock**
//! to apply `Set-Cookie` headers or explicit mutations.
//!
//! Mutations are not ordered against requests that are already in flight on
//! the same service; callers that need determinism serialize them themselves.

use crate::cookies::CookieJar;
use crate::cookies::DefaultCookieJar;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// A handle to a cookie jar trait object.
pub type CookieJarHandle = Arc<RwLock<dyn CookieJar + Send + Sync>>;

impl From<DefaultCookieJar> for CookieJarHandle {
    fn from(jar: DefaultCookieJar) -> Self {
        Arc::new(RwLock::new(jar))
    }
}

/// A single stored cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    /// Cookie name (case-sensitive).
    pub name: String,

    /// Raw cookie value (not URL-decoded).
    pub value: String,

    /// Path scoping (e.g., `"/"`).
    pub path: Option<String>,

    /// Domain scoping; host-only when `None`.
    pub domain: Option<String>,

    /// Only sent over HTTPS.
    pub secure: bool,

    /// Raw `Expires` attribute, stored but not enforced.
    pub expires: Option<String>,

    /// SameSite policy (`"Strict"`, `"Lax"`, or `"None"`).
    pub same_site: Option<String>,

    /// Hidden from scripts. Kept for completeness.
    pub http_only: bool,
}

impl Cookie {
    /// A plain name/value cookie scoped to `/`.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: Some("/".to_string()),
            domain: None,
            secure: false,
            expires: None,
            same_site: None,
            http_only: false,
        }
    }
}
