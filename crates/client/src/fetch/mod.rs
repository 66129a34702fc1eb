//! The network seam of the offline router.
//!
//! [`Network`] is what the router calls whenever a strategy needs to go to
//! the network. [`HttpNetwork`] is the reqwest implementation used by the
//! hosts.
//!
//! ### Semantics
//! - Any HTTP status is a successful fetch; only transport failures are errors
//! - Bodies are read to the end before a [`Response`] exists
//! - Max body bytes: 10MB (configurable)
//! - Hop-by-hop headers are neither forwarded nor returned

pub mod url;

use async_trait::async_trait;
use reqwest::{Client, Method};
use std::time::{Duration, Instant};

pub use self::url::{UrlError, resolve, resolve_all};

use ringside_core::{Error, Request, Response};

/// Headers that describe a single transport hop and must not be copied.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

/// Performs network requests on behalf of the router.
#[async_trait]
pub trait Network: Send + Sync {
    /// Fetch the request, returning the complete response.
    async fn fetch(&self, request: &Request) -> Result<Response, Error>;
}

/// Configuration for the HTTP network.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// User agent string (default: "ringside/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 10MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            user_agent: "ringside/0.1".to_string(),
            max_bytes: 10 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
        }
    }
}

impl From<&ringside_core::AppConfig> for NetworkConfig {
    fn from(config: &ringside_core::AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            ..Default::default()
        }
    }
}

/// reqwest-backed [`Network`].
pub struct HttpNetwork {
    http: Client,
    config: NetworkConfig,
}

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name))
}

fn map_send_error(url: &str, err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::NetworkTimeout(format!("{url}: {err}"))
    } else {
        Error::Network(format!("{url}: {err}"))
    }
}

impl HttpNetwork {
    /// Create a new network client with the given configuration.
    pub fn new(config: NetworkConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let start = Instant::now();
        let url = request.url.as_str();

        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| Error::InvalidInput(format!("method {}: {}", request.method, e)))?;

        let mut builder = self.http.request(method, url);
        for (name, value) in &request.headers {
            // reqwest negotiates and decodes content encodings itself
            if is_hop_by_hop(name) || name.eq_ignore_ascii_case("accept-encoding") {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| map_send_error(url, e))?;

        let status = response.status();

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(Error::ResponseTooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes)));
        }

        let final_url = response.url().to_string();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter(|(name, _)| !is_hop_by_hop(name.as_str()) && name.as_str() != "content-encoding")
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.to_string(), v.to_string())))
            .collect();

        let bytes = response.bytes().await.map_err(|e| map_send_error(url, e))?;

        if bytes.len() > self.config.max_bytes {
            return Err(Error::ResponseTooLarge(format!(
                "{} bytes exceeds {}",
                bytes.len(),
                self.config.max_bytes
            )));
        }

        tracing::debug!(
            method = %request.method,
            url,
            status = status.as_u16(),
            bytes = bytes.len(),
            fetch_ms = start.elapsed().as_millis() as u64,
            "network fetch complete"
        );

        Ok(Response { url: final_url, status: status.as_u16(), headers, body: bytes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response on a random local port.
    async fn serve_once(raw: &'static str) -> ::url::Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            socket.write_all(raw.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        ::url::Url::parse(&format!("http://{addr}/")).unwrap()
    }

    #[test]
    fn test_network_config_default() {
        let config = NetworkConfig::default();
        assert_eq!(config.user_agent, "ringside/0.1");
        assert_eq!(config.max_bytes, 10 * 1024 * 1024);
        assert_eq!(config.timeout, Duration::from_millis(20000));
        assert_eq!(config.max_redirects, 5);
    }

    #[test]
    fn test_network_config_from_app_config() {
        let app = ringside_core::AppConfig { user_agent: "champ/2".into(), timeout_ms: 900, ..Default::default() };
        let config = NetworkConfig::from(&app);
        assert_eq!(config.user_agent, "champ/2");
        assert_eq!(config.timeout, Duration::from_millis(900));
    }

    #[test]
    fn test_hop_by_hop() {
        assert!(is_hop_by_hop("Connection"));
        assert!(is_hop_by_hop("transfer-encoding"));
        assert!(!is_hop_by_hop("content-type"));
    }

    #[tokio::test]
    async fn test_fetch_returns_non_success_status() {
        let url = serve_once("HTTP/1.1 404 Not Found\r\ncontent-type: text/plain\r\ncontent-length: 7\r\nconnection: close\r\n\r\nmissing").await;
        let network = HttpNetwork::new(NetworkConfig::default()).unwrap();

        let response = network.fetch(&Request::get(url)).await.unwrap();
        assert_eq!(response.status, 404);
        assert!(!response.ok());
        assert_eq!(&response.body[..], b"missing");
        assert_eq!(response.header("content-type"), Some("text/plain"));
        assert!(response.header("connection").is_none());
    }

    #[tokio::test]
    async fn test_fetch_too_large() {
        let url = serve_once("HTTP/1.1 200 OK\r\ncontent-length: 10\r\nconnection: close\r\n\r\n0123456789").await;
        let network = HttpNetwork::new(NetworkConfig { max_bytes: 4, ..Default::default() }).unwrap();

        let result = network.fetch(&Request::get(url)).await;
        assert!(matches!(result, Err(Error::ResponseTooLarge(_))));
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let network = HttpNetwork::new(NetworkConfig::default()).unwrap();
        let url = ::url::Url::parse(&format!("http://{addr}/")).unwrap();
        let result = network.fetch(&Request::get(url)).await;
        assert!(matches!(result, Err(ref e) if e.is_network()));
    }

    #[tokio::test]
    async fn test_fetch_rejects_invalid_method() {
        let network = HttpNetwork::new(NetworkConfig::default()).unwrap();
        let url = ::url::Url::parse("http://127.0.0.1:1/").unwrap();
        let request = Request { method: "BAD METHOD".into(), ..Request::get(url) };
        let result = network.fetch(&request).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}
