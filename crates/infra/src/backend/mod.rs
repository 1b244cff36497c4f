//! HTTP transport for the processing backend

pub mod http;
pub mod sse;

pub use http::HttpBackend;
pub use sse::SseParser;
