//! HTTP stack: request and response models, the wire transport and the
//! service that ties them to the cache and the repeat/timeout policies.

pub mod request;
pub mod response;
pub mod service;
pub mod transport;

pub use request::{MultipartField, MultipartValue, Request, RequestBody, RequestOptions};
pub use response::Response;
pub use service::HttpService;
pub use transport::HttpTransport;
