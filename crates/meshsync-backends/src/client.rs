//! HTTP scheduler client.
//!
//! Talks plain HTTP/1.1 to the scheduler's instance API:
//!
//! ```text
//! GET /v1/instances   → JSON array of Instance
//! GET /v1/events      → newline-delimited JSON InstanceEvent stream
//! ```
//!
//! Each call opens its own connection; the event feed keeps its
//! connection for as long as the scheduler holds the response open.

use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use http::{Request, Uri};
use http_body_util::{BodyExt, Empty};
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use tracing::debug;

use crate::error::{SchedulerError, SchedulerResult};
use crate::instance::{Instance, InstanceEvent};
use crate::scheduler::{InstanceEventSource, SchedulerClient};

const INSTANCES_PATH: &str = "/v1/instances";
const EVENTS_PATH: &str = "/v1/events";
const USER_AGENT: &str = "meshsync-backends/0.1";

/// [`SchedulerClient`] over the scheduler's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpSchedulerClient {
    /// `host:port` of the scheduler.
    authority: String,
    /// Bound on connecting and receiving response headers.
    timeout: Duration,
}

impl HttpSchedulerClient {
    /// Build a client for a base URL such as `http://10.0.0.5:8889`.
    pub fn new(url: &str, timeout: Duration) -> SchedulerResult<Self> {
        let uri: Uri = url
            .parse()
            .map_err(|e| SchedulerError::InvalidUrl(format!("{url}: {e}")))?;
        match uri.scheme_str() {
            Some("http") | None => {}
            Some(other) => {
                return Err(SchedulerError::InvalidUrl(format!(
                    "{url}: unsupported scheme {other:?}"
                )));
            }
        }
        let authority = uri
            .authority()
            .ok_or_else(|| SchedulerError::InvalidUrl(format!("{url}: missing host")))?
            .to_string();
        Ok(Self { authority, timeout })
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Send a GET and return the response body once a 2xx status arrives.
    async fn get(&self, path: &str) -> SchedulerResult<Incoming> {
        let request = async {
            let stream = tokio::net::TcpStream::connect(&self.authority)
                .await
                .map_err(|e| SchedulerError::Connect(format!("{}: {e}", self.authority)))?;

            let io = TokioIo::new(stream);
            let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;

            // Drive the connection in the background.
            tokio::spawn(async move {
                if let Err(e) = conn.await {
                    debug!(error = %e, "scheduler connection closed");
                }
            });

            let req = Request::builder()
                .method("GET")
                .uri(path)
                .header("host", &self.authority)
                .header("user-agent", USER_AGENT)
                .header("accept", "application/json")
                .body(Empty::<Bytes>::new())
                .map_err(|e| SchedulerError::Transport(e.to_string()))?;

            let resp = sender.send_request(req).await?;
            if !resp.status().is_success() {
                return Err(SchedulerError::Status {
                    status: resp.status().as_u16(),
                    path: path.to_string(),
                });
            }
            Ok::<_, SchedulerError>(resp.into_body())
        };

        tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| SchedulerError::Timeout(self.timeout))?
    }
}

impl SchedulerClient for HttpSchedulerClient {
    type Events = HttpEventSource;

    async fn subscribe(&self) -> SchedulerResult<HttpEventSource> {
        let body = self.get(EVENTS_PATH).await?;
        Ok(HttpEventSource::new(body))
    }

    async fn list_running(&self) -> SchedulerResult<Vec<Instance>> {
        let body = self.get(INSTANCES_PATH).await?;
        let bytes = tokio::time::timeout(self.timeout, body.collect())
            .await
            .map_err(|_| SchedulerError::Timeout(self.timeout))??
            .to_bytes();
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Newline-delimited JSON event stream read off one response body.
pub struct HttpEventSource {
    body: Incoming,
    buf: BytesMut,
}

impl HttpEventSource {
    fn new(body: Incoming) -> Self {
        Self {
            body,
            buf: BytesMut::new(),
        }
    }

    /// Pop the next complete, non-blank line from the buffer.
    fn take_line(&mut self) -> Option<Bytes> {
        loop {
            let pos = self.buf.iter().position(|b| *b == b'\n')?;
            let mut line = self.buf.split_to(pos + 1).freeze();
            line.truncate(pos);
            if line.iter().any(|b| !b.is_ascii_whitespace()) {
                return Some(line);
            }
        }
    }
}

impl InstanceEventSource for HttpEventSource {
    async fn next(&mut self) -> SchedulerResult<Option<InstanceEvent>> {
        loop {
            if let Some(line) = self.take_line() {
                return Ok(Some(serde_json::from_slice(&line)?));
            }
            match self.body.frame().await {
                None => {
                    if self.buf.has_remaining() {
                        let rest = self.buf.split().freeze();
                        if rest.iter().any(|b| !b.is_ascii_whitespace()) {
                            return Ok(Some(serde_json::from_slice(&rest)?));
                        }
                    }
                    return Ok(None);
                }
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(frame)) => {
                    if let Ok(data) = frame.into_data() {
                        self.buf.extend_from_slice(&data);
                    }
                }
            }
        }
    }
}
