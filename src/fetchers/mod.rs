/// Common fetcher code
pub mod fetcher;

/// Fetchers and decoders that use reqwest HTTP client to load data from remote source
#[cfg(feature = "http")]
pub mod http;
