//! Minimal HTTP/1 GET client.
//!
//! One connection per request: lag is sampled once per interval per
//! target, so there is nothing worth pooling.

use std::time::Duration;

use bytes::Bytes;
use http::{StatusCode, Uri};
use http_body_util::{BodyExt, Empty};
use tracing::debug;

use pidscale_autoscale::LagError;

/// Base address of an HTTP endpoint, split out of a URL once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// `host:port` to connect to.
    pub address: String,
    /// `host[:port]` as written, for the Host header.
    pub authority: String,
    /// Path prefix without trailing slash.
    pub base_path: String,
}

impl Endpoint {
    /// Parse `http://host[:port][/prefix]`. Only plain HTTP is supported.
    pub fn parse(url: &str) -> Result<Self, LagError> {
        let uri: Uri = url
            .trim()
            .parse()
            .map_err(|e| LagError::Query(format!("invalid url {url}: {e}")))?;

        match uri.scheme_str() {
            Some("http") => {}
            other => {
                return Err(LagError::Query(format!(
                    "unsupported scheme {:?} in {url}",
                    other.unwrap_or("")
                )));
            }
        }

        let authority = uri
            .authority()
            .ok_or_else(|| LagError::Query(format!("missing host in {url}")))?;
        let port = authority.port_u16().unwrap_or(80);

        Ok(Self {
            address: format!("{}:{port}", authority.host()),
            authority: authority.as_str().to_string(),
            base_path: uri.path().trim_end_matches('/').to_string(),
        })
    }

    /// Issue a GET for `path` (relative to the base path).
    ///
    /// Transport failures and timeouts map to [`LagError::NoConnection`].
    pub async fn get(&self, path: &str, timeout: Duration) -> Result<(StatusCode, Bytes), LagError> {
        let uri = format!("http://{}{}{path}", self.authority, self.base_path);

        let result = tokio::time::timeout(timeout, async {
            let stream = tokio::net::TcpStream::connect(&self.address)
                .await
                .map_err(|e| LagError::NoConnection(format!("{}: {e}", self.address)))?;

            let io = hyper_util::rt::TokioIo::new(stream);
            let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
                .await
                .map_err(|e| LagError::NoConnection(format!("handshake: {e}")))?;

            // Drive the connection in the background.
            tokio::spawn(async move {
                let _ = conn.await;
            });

            let req = http::Request::builder()
                .method("GET")
                .uri(&uri)
                .header("host", &self.authority)
                .header("accept", "application/json")
                .header("user-agent", "pidscale-lag/0.1")
                .body(Empty::<Bytes>::new())
                .map_err(|e| LagError::Query(format!("request: {e}")))?;

            let resp = sender
                .send_request(req)
                .await
                .map_err(|e| LagError::NoConnection(format!("request: {e}")))?;
            let status = resp.status();
            let body = resp
                .into_body()
                .collect()
                .await
                .map_err(|e| LagError::NoConnection(format!("body: {e}")))?
                .to_bytes();
            Ok((status, body))
        })
        .await;

        match result {
            Ok(res) => res,
            Err(_) => {
                debug!(%uri, "lag query timed out");
                Err(LagError::NoConnection(format!("timed out after {timeout:?}")))
            }
        }
    }
}
