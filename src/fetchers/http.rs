use std::future::Future;
use std::marker::PhantomData;
use std::time::Duration;

use reqwest::{Response, Url};

use crate::fetchers::fetcher::{FetchError, FetchResult, Fetcher};

/// Turns an HTTP response into a decoded value.
/// Implementations must normalize every failure into [`FetchError`].
pub trait ResponseDecoder<Data> {
    fn decode(&self, response: Response) -> impl Future<Output = FetchResult<Data>> + Send;
}

/// Fetcher that issues `GET url?query` and hands the response to a decoder.
pub struct HttpFetcher<Data, Decoder: ResponseDecoder<Data>> {
    client: reqwest::Client,
    url: Url,
    query: Vec<(String, String)>,
    timeout: Option<Duration>,
    decoder: Decoder,
    _marker: PhantomData<fn() -> Data>,
}

impl<Data, Decoder: ResponseDecoder<Data>> HttpFetcher<Data, Decoder> {
    pub fn new(client: reqwest::Client, url: Url, decoder: Decoder) -> Self {
        HttpFetcher {
            client,
            url,
            query: Vec::new(),
            timeout: None,
            decoder,
            _marker: PhantomData,
        }
    }

    /// Appends query parameters to every request.
    pub fn with_query(mut self, pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        self.query.extend(pairs);
        self
    }

    /// Limits each fetch attempt. A timed-out attempt is reported as
    /// [`ErrorKind::Timeout`](crate::fetchers::fetcher::ErrorKind::Timeout).
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    async fn request(&self) -> FetchResult<Data> {
        let mut request = self.client.get(self.url.clone());
        if !self.query.is_empty() {
            request = request.query(&self.query);
        }
        let response = request.send().await.map_err(classify)?;
        let response = response.error_for_status().map_err(classify)?;
        self.decoder.decode(response).await
    }
}

impl<Data, Decoder> Fetcher<Data> for HttpFetcher<Data, Decoder>
where
    Data: Send + Sync,
    Decoder: ResponseDecoder<Data> + Send + Sync,
{
    async fn fetch(&self) -> FetchResult<Data> {
        match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.request()).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::timeout()),
            },
            None => self.request().await,
        }
    }
}

fn classify(error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::timeout()
    } else if error.is_decode() {
        FetchError::decode(error)
    } else {
        FetchError::transport(error)
    }
}

#[cfg(feature = "json")]
pub mod serde_decoder {
    use std::future::Future;
    use std::marker::PhantomData;

    use reqwest::Response;
    use serde::de::DeserializeOwned;

    use crate::fetchers::fetcher::{FetchError, FetchResult};
    use crate::fetchers::http::ResponseDecoder;

    /// Decodes response bodies as JSON into any [`DeserializeOwned`] type.
    ///
    /// No `Content-Type` check is performed: snapshot validity is governed by
    /// the cache's refresh policy, not by response headers, and some upstream
    /// sources serve JSON under text content types.
    pub struct JsonDecoder<Data: DeserializeOwned> {
        _marker: PhantomData<fn() -> Data>,
    }

    impl<Data: DeserializeOwned> Default for JsonDecoder<Data> {
        fn default() -> Self {
            JsonDecoder {
                _marker: PhantomData,
            }
        }
    }

    impl<Data: DeserializeOwned + Send + Sync> ResponseDecoder<Data> for JsonDecoder<Data> {
        fn decode(&self, response: Response) -> impl Future<Output = FetchResult<Data>> + Send {
            async move {
                let bytes = response.bytes().await.map_err(FetchError::transport)?;
                serde_json::from_slice::<Data>(&bytes).map_err(FetchError::decode)
            }
        }
    }
}
