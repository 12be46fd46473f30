//! The HTTP service: one request API over cache, timeout, repeat and transport.
//!
//! Every call follows the same path:
//!
//! ```text
//! resolve settings -> cache lookup
//!     hit:  response read from the cache's file store
//!     miss: timeout guard( repeat policy or single attempt( transport ), body read ) -> cache store
//! ```
//!
//! Per-call [`RequestOptions`] override the instance defaults from
//! [`KitConfig`], which in turn fall back to [`KitConfig::default`].
//!
//! # Cancellation
//! The service owns a root [`CancellationToken`]. Each call runs on a child of
//! it, raced against the optional per-call token, so either
//! [`HttpService::shutdown`] or the caller's token stops the call with
//! [`KitError::Canceled`].
use std::sync::Arc;
use std::sync::PoisonError;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::cache::{CacheKey, CacheMode, CacheRegistry};
use crate::config::KitConfig;
use crate::cookies::{Cookie, CookieJarHandle, DefaultCookieJar};
use crate::errors::{KitError, Result};
use crate::exceptions::{CallId, ExceptionHandler};
use crate::net::request::{MultipartField, Request, RequestBody, RequestOptions};
use crate::net::response::Response;
use crate::net::transport::HttpTransport;
use crate::policy::{with_timeout, RetryPolicy};
use crate::storage::{FileStoreHandle, LocalFileStore};

/// Settings of one call after resolving overrides.
#[derive(Debug, Clone)]
struct CallSettings {
    mode: CacheMode,
    tag: String,
    repeat: bool,
    timeout: Duration,
}

pub struct HttpService {
    config: KitConfig,
    transport: HttpTransport,
    cache: Option<CacheRegistry>,
    jar: CookieJarHandle,
    exceptions: ExceptionHandler,
    cancel: CancellationToken,
}

impl HttpService {
    /// Creates a service; the cache lives in `config.cache_dir` when one is set.
    pub fn new(config: KitConfig) -> Result<Self> {
        let store = config
            .cache_dir
            .clone()
            .map(|dir| Arc::new(LocalFileStore::new(dir)) as FileStoreHandle);
        Self::build(config, store)
    }

    /// Creates a service whose cache lives in `store`, whatever `cache_dir` says.
    pub fn with_store(config: KitConfig, store: FileStoreHandle) -> Result<Self> {
        Self::build(config, Some(store))
    }

    fn build(config: KitConfig, store: Option<FileStoreHandle>) -> Result<Self> {
        let jar: CookieJarHandle = DefaultCookieJar::new().into();
        let transport = HttpTransport::new(&config, jar.clone())?;

        Ok(Self {
            config,
            transport,
            cache: store.map(CacheRegistry::new),
            jar,
            exceptions: ExceptionHandler::new(),
            cancel: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &KitConfig {
        &self.config
    }

    /// The cache registry, `None` when the service was built without a cache.
    pub fn cache(&self) -> Option<&CacheRegistry> {
        self.cache.as_ref()
    }

    pub fn exceptions(&self) -> &ExceptionHandler {
        &self.exceptions
    }

    /// Root token of this service. Cancelling it stops every call in flight.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancels every running and future call.
    pub fn shutdown(&self) {
        log::info!("http service shutting down");
        self.cancel.cancel();
    }

    /// Sends `request` through cache, timeout, repeat and transport.
    ///
    /// Errors are registered with the service's [`ExceptionHandler`] once
    /// before they are returned.
    pub async fn send(&self, request: Request) -> Result<Response> {
        let guard = self.exceptions.scope();
        let call = guard.id();
        let scope = self.cancel.child_token();
        let caller = request.options().cancel.clone().unwrap_or_default();

        let result = tokio::select! {
            biased;
            _ = caller.cancelled() => {
                scope.cancel();
                Err(KitError::Canceled)
            }
            res = self.dispatch(&request, call, &scope) => res,
        };

        if let Err(err) = &result {
            self.exceptions.register(call, err);
        }
        result
    }

    pub async fn get(&self, url: &str, options: RequestOptions) -> Result<Response> {
        self.send(Request::get(Url::parse(url)?).with_options(options)).await
    }

    /// POSTs `application/x-www-form-urlencoded` fields.
    pub async fn post_form<K, V>(
        &self,
        url: &str,
        fields: impl IntoIterator<Item = (K, V)>,
        options: RequestOptions,
    ) -> Result<Response>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let fields = fields.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self.post(url, RequestBody::Form(fields), options).await
    }

    pub async fn post_multipart(
        &self,
        url: &str,
        fields: Vec<MultipartField>,
        options: RequestOptions,
    ) -> Result<Response> {
        self.post(url, RequestBody::Multipart(fields), options).await
    }

    /// Serializes `value` to JSON and POSTs it.
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        value: &T,
        options: RequestOptions,
    ) -> Result<Response> {
        let json = serde_json::to_string(value)?;
        self.post_serialized_json(url, json, options).await
    }

    /// POSTs a JSON document that is already serialized.
    pub async fn post_serialized_json(
        &self,
        url: &str,
        json: impl Into<String>,
        options: RequestOptions,
    ) -> Result<Response> {
        self.post(url, RequestBody::Json(json.into()), options).await
    }

    pub async fn post_bytes(
        &self,
        url: &str,
        data: impl Into<Bytes>,
        content_type: Option<&str>,
        options: RequestOptions,
    ) -> Result<Response> {
        let body = RequestBody::Bytes {
            data: data.into(),
            content_type: content_type.map(str::to_string),
        };
        self.post(url, body, options).await
    }

    async fn post(&self, url: &str, body: RequestBody, options: RequestOptions) -> Result<Response> {
        self.send(Request::post(Url::parse(url)?, body).with_options(options)).await
    }

    pub fn set_header(&self, name: &str, value: &str) -> Result<()> {
        self.transport.set_header(name, value)
    }

    pub fn add_to_header(&self, name: &str, value: &str) -> Result<()> {
        self.transport.add_to_header(name, value)
    }

    pub fn remove_header(&self, name: &str) -> Result<()> {
        self.transport.remove_header(name)
    }

    /// Current default request headers.
    pub fn headers(&self) -> http::HeaderMap {
        self.transport.headers()
    }

    pub fn cookie_jar(&self) -> &CookieJarHandle {
        &self.jar
    }

    pub fn set_cookie(&self, url: &str, cookie: Cookie) -> Result<()> {
        let url = Url::parse(url)?;
        self.jar.write().unwrap_or_else(PoisonError::into_inner).set_cookie(&url, cookie);
        Ok(())
    }

    pub fn remove_cookie(&self, url: &str, name: &str) -> Result<()> {
        let url = Url::parse(url)?;
        self.jar.write().unwrap_or_else(PoisonError::into_inner).remove_cookie(&url, name);
        Ok(())
    }

    /// The `Cookie` header a request to `url` would carry right now.
    pub fn cookies_for(&self, url: &str) -> Result<Option<String>> {
        let url = Url::parse(url)?;
        Ok(self.jar.read().unwrap_or_else(PoisonError::into_inner).get_request_cookies(&url))
    }

    /// Forgets every cookie of every origin.
    pub fn clear_cookies(&self) {
        self.jar.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    fn settings(&self, options: &RequestOptions) -> CallSettings {
        let mode = match self.cache {
            Some(_) => options.cache_mode.unwrap_or(self.config.cache_mode),
            None => CacheMode::Disabled,
        };
        CallSettings {
            mode,
            tag: options.cache_tag.clone().unwrap_or_else(|| self.config.cache_tag.clone()),
            repeat: options.repeat.unwrap_or(self.config.repeat),
            timeout: Duration::from_secs(options.timeout_secs.unwrap_or(self.config.timeout_secs)),
        }
    }

    async fn dispatch(&self, request: &Request, call: CallId, cancel: &CancellationToken) -> Result<Response> {
        let settings = self.settings(request.options());
        // a body that will be cached is read within the timeout too
        let buffer = settings.mode == CacheMode::Full;
        let live = || {
            with_timeout(cancel, settings.timeout, |scope| {
                self.live(request, call, settings.repeat, buffer, scope)
            })
        };

        match &self.cache {
            Some(cache) => {
                let key = CacheKey::new(settings.tag.clone(), request.method().clone(), request.url().clone());
                cache.fetch(&key, settings.mode, cancel, live).await
            }
            None => live().await,
        }
    }

    async fn live(
        &self,
        request: &Request,
        call: CallId,
        repeat: bool,
        buffer: bool,
        scope: CancellationToken,
    ) -> Result<Response> {
        let mut response = if repeat {
            RetryPolicy::new(self.config.max_attempts, self.config.pause())
                .run(&scope, |_| self.attempt(request, call, &scope))
                .await?
        } else {
            self.attempt(request, call, &scope).await?
        };

        if buffer && response.status().is_success() {
            response.bytes().await?;
        }
        Ok(response)
    }

    async fn attempt(&self, request: &Request, call: CallId, cancel: &CancellationToken) -> Result<Response> {
        let result = if *request.method() == http::Method::GET {
            self.transport.get(request.url(), cancel).await
        } else {
            self.transport.post(request.url(), request.body(), cancel).await
        };

        if let Err(err) = &result {
            self.exceptions.register(call, err);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryFileStore;

    fn service(config: KitConfig) -> HttpService {
        HttpService::with_store(config, Arc::new(InMemoryFileStore::new())).unwrap()
    }

    #[test]
    fn options_override_instance_defaults() {
        let config = KitConfig::builder()
            .cache_mode(CacheMode::Full)
            .cache_tag("default")
            .timeout_secs(30)
            .build()
            .unwrap();
        let svc = service(config);

        let inherited = svc.settings(&RequestOptions::new());
        assert_eq!(inherited.mode, CacheMode::Full);
        assert_eq!(inherited.tag, "default");
        assert!(!inherited.repeat);
        assert_eq!(inherited.timeout, Duration::from_secs(30));

        let overridden = svc.settings(
            &RequestOptions::new()
                .cache_mode(CacheMode::Disabled)
                .cache_tag("other")
                .repeat(true)
                .timeout_secs(2),
        );
        assert_eq!(overridden.mode, CacheMode::Disabled);
        assert_eq!(overridden.tag, "other");
        assert!(overridden.repeat);
        assert_eq!(overridden.timeout, Duration::from_secs(2));
    }

    #[test]
    fn without_a_cache_every_call_is_uncached() {
        let svc = HttpService::new(KitConfig::builder().cache_mode(CacheMode::Full).build().unwrap()).unwrap();
        assert!(svc.cache().is_none());
        let settings = svc.settings(&RequestOptions::new().cache_mode(CacheMode::Full));
        assert_eq!(settings.mode, CacheMode::Disabled);
    }

    #[test]
    fn cookies_are_scoped_to_the_origin() {
        let svc = service(KitConfig::default());
        svc.set_cookie("https://a.test/", Cookie::new("sid", "1")).unwrap();

        assert_eq!(svc.cookies_for("https://a.test/page").unwrap().as_deref(), Some("sid=1"));
        assert_eq!(svc.cookies_for("https://b.test/").unwrap(), None);

        svc.remove_cookie("https://a.test/", "sid").unwrap();
        assert_eq!(svc.cookies_for("https://a.test/").unwrap(), None);
    }

    #[test]
    fn clearing_cookies_empties_every_origin() {
        let svc = service(KitConfig::default());
        svc.set_cookie("https://a.test/", Cookie::new("sid", "1")).unwrap();
        svc.set_cookie("https://b.test/", Cookie::new("lang", "en")).unwrap();

        svc.clear_cookies();
        assert_eq!(svc.cookies_for("https://a.test/").unwrap(), None);
        assert_eq!(svc.cookies_for("https://b.test/").unwrap(), None);
    }

    #[test]
    fn header_mutators_reach_the_transport() {
        let svc = service(KitConfig::default());
        svc.set_header("X-Api-Key", "k").unwrap();
        assert_eq!(svc.headers()["x-api-key"], "k");
        svc.remove_header("x-api-key").unwrap();
        assert!(!svc.headers().contains_key("x-api-key"));
    }

    #[tokio::test]
    async fn invalid_url_is_an_error() {
        let svc = service(KitConfig::default());
        let err = svc.get("not a url", RequestOptions::new()).await.unwrap_err();
        assert!(matches!(err, KitError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn shutdown_cancels_calls() {
        let svc = service(KitConfig::default());
        svc.shutdown();
        assert!(svc.cancel_token().is_cancelled());

        let err = svc.get("http://127.0.0.1:9/", RequestOptions::new()).await.unwrap_err();
        assert!(err.is_cancellation());
    }

    #[tokio::test]
    async fn caller_token_cancels_the_call() {
        let svc = service(KitConfig::default());
        let token = CancellationToken::new();
        token.cancel();

        let err = svc
            .get("http://127.0.0.1:9/", RequestOptions::new().cancel(token))
            .await
            .unwrap_err();
        assert!(err.is_cancellation());
        assert!(!svc.cancel_token().is_cancelled());
        assert_eq!(svc.exceptions().open_calls(), 0);
    }
}
