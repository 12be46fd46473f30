pub mod cache;
pub mod config;
pub mod cookies;
pub mod errors;
pub mod exceptions;
pub mod net;
pub mod path;
pub mod policy;
pub mod storage;

pub use cache::CacheMode;
pub use config::KitConfig;
pub use errors::{KitError, Result};
pub use net::{HttpService, Request, RequestBody, RequestOptions, Response};
