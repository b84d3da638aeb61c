//! HTTP probe seam and its hyper-based implementation.
//!
//! A probe only answers "which status code did `GET url` return". Timing
//! and the hard timeout are applied by the executor so every probe
//! implementation is measured the same way.

use std::error::Error as StdError;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::USER_AGENT;
use http::{Method, Request, Uri};
use http_body_util::Empty;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use thiserror::Error;
use tracing::{debug, warn};

/// Why a probe got no HTTP response. Status codes are never errors.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("{0}")]
    Transport(String),
}

/// Issues a single GET against a service URL.
#[async_trait]
pub trait HttpProbe: Send + Sync {
    /// Return the response status code, or why no response was obtained.
    async fn get(&self, url: &str) -> Result<u16, ProbeError>;
}

type ProbeClient = Client<HttpsConnector<HttpConnector>, Empty<Bytes>>;

/// hyper client over rustls with the platform's native root store.
/// Accepts both `http://` and `https://` targets.
pub struct HyperProbe {
    client: ProbeClient,
    user_agent: String,
}

impl HyperProbe {
    pub fn new(user_agent: impl Into<String>) -> Self {
        let builder = match hyper_rustls::HttpsConnectorBuilder::new().with_native_roots() {
            Ok(builder) => builder,
            Err(e) => {
                // http:// targets still work; https:// ones fail verification.
                warn!(error = %e, "no native root certificates available");
                let tls = rustls::ClientConfig::builder()
                    .with_root_certificates(rustls::RootCertStore::empty())
                    .with_no_client_auth();
                hyper_rustls::HttpsConnectorBuilder::new().with_tls_config(tls)
            }
        };
        let https = builder.https_or_http().enable_http1().build();

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(30))
            .build(https);

        Self {
            client,
            user_agent: user_agent.into(),
        }
    }
}

#[async_trait]
impl HttpProbe for HyperProbe {
    async fn get(&self, url: &str) -> Result<u16, ProbeError> {
        let uri: Uri = url.parse().map_err(|e: http::uri::InvalidUri| {
            ProbeError::InvalidUrl {
                url: url.to_string(),
                reason: e.to_string(),
            }
        })?;

        let req = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header(USER_AGENT, self.user_agent.as_str())
            .body(Empty::<Bytes>::new())
            .map_err(|e| ProbeError::InvalidUrl {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        match self.client.request(req).await {
            // The body is dropped unread; only the status matters.
            Ok(resp) => Ok(resp.status().as_u16()),
            Err(e) => {
                let reason = error_chain(&e);
                debug!(%url, error = %reason, "probe request failed");
                Err(ProbeError::Transport(reason))
            }
        }
    }
}

/// Render an error with its full `source()` chain, e.g.
/// `client error (Connect): tcp connect error: Connection refused`.
fn error_chain(err: &dyn StdError) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !rendered.contains(&text) {
            rendered.push_str(": ");
            rendered.push_str(&text);
        }
        source = cause.source();
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("outer")]
    struct Outer(#[source] Inner);

    #[derive(Debug, Error)]
    #[error("inner")]
    struct Inner;

    #[test]
    fn error_chain_includes_sources() {
        assert_eq!(error_chain(&Outer(Inner)), "outer: inner");
    }

    #[tokio::test]
    async fn invalid_url_is_reported() {
        let probe = HyperProbe::new("beacon-test");
        let result = probe.get("not a url").await;
        assert!(matches!(result, Err(ProbeError::InvalidUrl { .. })));
    }

    #[tokio::test]
    async fn probe_to_closed_port_is_transport_error() {
        let probe = HyperProbe::new("beacon-test");
        // Nothing listens on port 1.
        let result = probe.get("http://127.0.0.1:1/healthz").await;
        assert!(matches!(result, Err(ProbeError::Transport(_))));
    }

    #[tokio::test]
    async fn probe_reads_status_from_local_server() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            socket
                .write_all(b"HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\n\r\n")
                .await
                .unwrap();
        });

        let probe = HyperProbe::new("beacon-test");
        let status = probe.get(&format!("http://{addr}/")).await.unwrap();
        assert_eq!(status, 503);
    }
}
