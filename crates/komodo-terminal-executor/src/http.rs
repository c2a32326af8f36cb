//! HTTP seam for one-shot requests.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt, stream::BoxStream};
use url::Url;

/// Boxed transport error.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Response body delivered chunk by chunk.
pub type ByteStream = BoxStream<'static, Result<Bytes, BoxError>>;

/// Outgoing POST request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Absolute request URL.
    pub url: Url,
    /// Header name and value pairs, sent in order.
    pub headers: Vec<(&'static str, String)>,
    /// Serialized JSON body.
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Value of the first header named `name`.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Response status and, if the transport provided one, its body.
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Body chunks, `None` when the response has no body.
    pub body: Option<ByteStream>,
}

/// Sends one POST and hands back the response without buffering the body.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send `request`.
    ///
    /// Fails only when no response was received at all.
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse, BoxError>;
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Transport with a default client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a preconfigured client (timeouts, proxies, TLS roots).
    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse, BoxError> {
        let mut builder = self.client.post(request.url).body(request.body);
        for (name, value) in request.headers {
            builder = builder.header(name, value);
        }
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response
            .bytes_stream()
            .map_err(|e| Box::new(e) as BoxError)
            .boxed();
        Ok(HttpResponse {
            status,
            body: Some(body),
        })
    }
}
