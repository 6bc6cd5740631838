//! Single dispatch: delivers one validated label.
//!
//! Sentinel labels go to the rendering service (see `render`); everything else is
//! POSTed as JSON to the print gateway.

use bytes::Bytes;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::dispatch::error::{parse_diagnostic_body, DispatchError, HttpFailure};
use crate::dispatch::models::{DispatchResponse, LabelRequest};
use crate::dispatch::transport::OutboundRequest;
use crate::dispatch::Dispatcher;

const SECURE_SCHEME: &str = "https://";

/// Wire shape expected by the gateway.
#[derive(Debug, Serialize)]
struct GatewayJob<'a> {
    #[serde(rename = "IP")]
    ip: &'a str,
    #[serde(rename = "PORT")]
    port: u16,
    #[serde(rename = "ZPL")]
    zpl: &'a str,
}

/// Checks that a gateway URL is present and uses the secure scheme.
/// Returns the trimmed URL.
pub fn check_gateway_url(url: &str) -> Result<&str, DispatchError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(DispatchError::Validation(
            "Gateway URL is missing".to_string(),
        ));
    }
    let has_secure_scheme = url
        .get(..SECURE_SCHEME.len())
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case(SECURE_SCHEME));
    if !has_secure_scheme {
        return Err(DispatchError::Protocol(format!(
            "Gateway URL must use HTTPS: {url}"
        )));
    }
    Ok(url)
}

impl Dispatcher {
    /// Dispatches one label and returns the gateway reply or the rendered document.
    pub async fn dispatch_single(
        &self,
        label: &LabelRequest,
        gateway_url: &str,
    ) -> Result<DispatchResponse, DispatchError> {
        if label.is_pdf() {
            return self
                .render(&label.payload)
                .await
                .map(DispatchResponse::Rendered);
        }

        let url = check_gateway_url(gateway_url)?;
        let port = label.port.ok_or_else(|| {
            DispatchError::Validation(format!("Port is missing for printer {}", label.address))
        })?;

        let job = GatewayJob {
            ip: label.address.trim(),
            port,
            zpl: &label.payload,
        };
        let body = serde_json::to_vec(&job).map_err(|e| {
            DispatchError::Validation(format!("Could not encode print job: {e}"))
        })?;

        let reply = self
            .transport
            .post(OutboundRequest {
                url: url.to_string(),
                accept: "application/json",
                content_type: "application/json",
                body: Bytes::from(body),
            })
            .await?;

        if !reply.is_success() {
            warn!(
                "Gateway rejected job for {}:{} with HTTP {}",
                job.ip, port, reply.status
            );
            return Err(DispatchError::Transport(HttpFailure {
                message: format!(
                    "Gateway returned HTTP {} {}",
                    reply.status, reply.status_text
                )
                .trim_end()
                .to_string(),
                status: Some(reply.status),
                status_text: Some(reply.status_text),
                details: parse_diagnostic_body(&reply.body),
            }));
        }

        let data = parse_gateway_body(&reply.body);

        if data.get("status").and_then(Value::as_str) == Some("error") {
            let message = data
                .get("message")
                .and_then(Value::as_str)
                .filter(|m| !m.is_empty())
                .unwrap_or("Gateway reported an error")
                .to_string();
            warn!("Gateway reported failure for {}:{}: {}", job.ip, port, message);
            return Err(DispatchError::LogicalServer(HttpFailure {
                message,
                status: Some(reply.status),
                status_text: Some(reply.status_text),
                details: Some(data),
            }));
        }

        debug!("Gateway accepted job for {}:{}", job.ip, port);
        Ok(DispatchResponse::Printed(data))
    }
}

/// A 2xx body that is not JSON is treated as a plain-text success message.
fn parse_gateway_body(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap_or_else(|_| {
        let text = String::from_utf8_lossy(body);
        json!({
            "message": text.trim(),
            "success": true,
        })
    })
}
