//! HTTP transport: the only place the engine touches the network.
//!
//! The transport moves bytes and reports status; it never interprets bodies.
//! Single dispatch decides what a reply means.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use tracing::debug;

use crate::dispatch::error::{DispatchError, HttpFailure};

/// One outbound POST.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    pub url: String,
    pub accept: &'static str,
    pub content_type: &'static str,
    pub body: Bytes,
}

/// A reply with any status code. Non-2xx is not an error at this layer.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpReply {
    pub status: u16,
    pub status_text: String,
    pub body: Bytes,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends one request. Fails only when no HTTP reply was obtained.
    async fn post(&self, request: OutboundRequest) -> Result<HttpReply, DispatchError>;
}

/// Production transport backed by `reqwest`.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post(&self, request: OutboundRequest) -> Result<HttpReply, DispatchError> {
        debug!("POST {} ({} bytes)", request.url, request.body.len());

        let response = self
            .client
            .post(&request.url)
            .header(reqwest::header::ACCEPT, request.accept)
            .header(reqwest::header::CONTENT_TYPE, request.content_type)
            .body(request.body)
            .send()
            .await
            .map_err(|e| network_failure(&request.url, e))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| network_failure(&request.url, e))?;

        Ok(HttpReply {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            body,
        })
    }
}

fn network_failure(url: &str, e: reqwest::Error) -> DispatchError {
    let reason = if e.is_timeout() {
        "request timed out"
    } else if e.is_connect() {
        "connection failed"
    } else {
        "network error"
    };
    DispatchError::Transport(HttpFailure::new(format!(
        "Could not reach {url}: {reason} ({e})"
    )))
}

#[cfg(test)]
pub(crate) mod mock {
    use std::sync::Mutex;

    use super::*;

    type Responder = Box<dyn Fn(&OutboundRequest) -> Result<HttpReply, DispatchError> + Send + Sync>;

    /// Records every request and answers with a caller-supplied closure.
    pub struct MockTransport {
        responder: Responder,
        calls: Mutex<Vec<OutboundRequest>>,
    }

    impl MockTransport {
        pub fn new<F>(responder: F) -> Self
        where
            F: Fn(&OutboundRequest) -> Result<HttpReply, DispatchError> + Send + Sync + 'static,
        {
            Self {
                responder: Box::new(responder),
                calls: Mutex::new(Vec::new()),
            }
        }

        /// Gateway that accepts every job.
        pub fn accepting() -> Self {
            Self::new(|_| Ok(reply(200, r#"{"status":"success","message":"sent"}"#)))
        }

        pub fn calls(&self) -> Vec<OutboundRequest> {
            self.calls.lock().unwrap().clone()
        }

        /// ZPL bodies of every gateway call, in send order.
        pub fn sent_zpl(&self) -> Vec<String> {
            self.calls()
                .iter()
                .filter_map(|c| serde_json::from_slice::<serde_json::Value>(&c.body).ok())
                .filter_map(|v| v["ZPL"].as_str().map(str::to_string))
                .collect()
        }
    }

    #[async_trait]
    impl HttpTransport for MockTransport {
        async fn post(&self, request: OutboundRequest) -> Result<HttpReply, DispatchError> {
            self.calls.lock().unwrap().push(request.clone());
            (self.responder)(&request)
        }
    }

    pub fn reply(status: u16, body: &str) -> HttpReply {
        HttpReply {
            status,
            status_text: reqwest::StatusCode::from_u16(status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or_default()
                .to_string(),
            body: Bytes::from(body.to_string()),
        }
    }

    pub fn pdf_reply() -> HttpReply {
        HttpReply {
            status: 200,
            status_text: "OK".to_string(),
            body: Bytes::from_static(b"%PDF-1.4\n%mock\n"),
        }
    }
}
