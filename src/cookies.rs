//! Cookies: [`CookieJar`], the in-memory [`DefaultCookieJar`], and the
//! [`JarCookieProvider`] that lets the HTTP transport read and update a jar.

mod cookie_jar;
mod cookies;
mod provider;

pub use cookie_jar::CookieJar;
pub use cookie_jar::DefaultCookieJar;
pub use cookies::Cookie;
pub use cookies::CookieJarHandle;
pub use provider::JarCookieProvider;
