//! Outbound HTTP with bounded exponential-backoff retry
//!
//! - `HttpTransport` - the seam a request is executed through
//! - `ReqwestTransport` - the production transport
//! - `RetryingHttpClient` - retries failed or non-2xx attempts (1s, 2s, 4s, ...)

mod request;
mod retry;
mod reqwest_transport;

pub use request::{HttpRequest, HttpResponse, HttpTransport};
pub use reqwest_transport::ReqwestTransport;
pub use retry::{RetryPolicy, RetryingHttpClient};
