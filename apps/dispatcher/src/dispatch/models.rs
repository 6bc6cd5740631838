use std::path::PathBuf;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::dispatch::error::{DispatchError, FailureDetails};

/// Reserved target address that redirects a label to the rendering service.
pub const PDF_SENTINEL: &str = "PDF";

pub const DEFAULT_POOL_SIZE: usize = 10;
pub const DEFAULT_POOL_DELAY_SECS: u64 = 1;

/// True when `address` is the rendering sentinel ("pdf", " PDF ", ...).
pub fn is_pdf_sentinel(address: &str) -> bool {
    address.trim().eq_ignore_ascii_case(PDF_SENTINEL)
}

// ────────────────────────────────────────────────────────────────────────────
// Labels
// ────────────────────────────────────────────────────────────────────────────

/// A label as it arrived from the caller, after field-name normalization but
/// before any validation. `port` keeps its raw JSON form (number or string).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawLabel {
    pub address: Option<String>,
    pub port: Option<Value>,
    pub payload: Option<String>,
}

/// A validated label ready for exactly one dispatch.
///
/// `port` is `None` only for sentinel labels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelRequest {
    pub address: String,
    pub port: Option<u16>,
    pub payload: String,
}

impl LabelRequest {
    /// Builds a gateway label from typed parts, applying the same checks as raw input.
    pub fn new(
        address: impl Into<String>,
        port: u16,
        payload: impl Into<String>,
    ) -> Result<Self, DispatchError> {
        let raw = RawLabel {
            address: Some(address.into()),
            port: Some(Value::from(port)),
            payload: Some(payload.into()),
        };
        Self::validate(&raw, 0)
    }

    /// Validates a normalized raw label. `index` is zero-based and only used in messages.
    pub fn validate(raw: &RawLabel, index: usize) -> Result<Self, DispatchError> {
        let n = index + 1;
        let address = raw
            .address
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty());
        let payload = raw.payload.as_deref().filter(|p| !p.trim().is_empty());

        let (Some(address), Some(payload)) = (address, payload) else {
            return Err(DispatchError::Validation(format!(
                "Label {n}: address or markup is missing"
            )));
        };

        if is_pdf_sentinel(address) {
            return Ok(Self {
                address: address.to_string(),
                port: None,
                payload: payload.to_string(),
            });
        }

        let port = match &raw.port {
            None | Some(Value::Null) => {
                return Err(DispatchError::Validation(format!(
                    "Label {n}: port is missing"
                )))
            }
            Some(value) => parse_port(value).ok_or_else(|| {
                DispatchError::Validation(format!(
                    "Label {n}: invalid port (must be between 1 and 65535)"
                ))
            })?,
        };

        Ok(Self {
            address: address.to_string(),
            port: Some(port),
            payload: payload.to_string(),
        })
    }

    pub fn is_pdf(&self) -> bool {
        is_pdf_sentinel(&self.address)
    }
}

/// Converts a JSON port (integer, integral float, or numeric string) into a valid TCP port.
fn parse_port(value: &Value) -> Option<u16> {
    let n: i64 = match value {
        Value::Number(num) => match num.as_i64() {
            Some(i) => i,
            None => {
                let f = num.as_f64()?;
                if f.fract() != 0.0 {
                    return None;
                }
                f as i64
            }
        },
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    if (1..=65535).contains(&n) {
        Some(n as u16)
    } else {
        None
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Pacing
// ────────────────────────────────────────────────────────────────────────────

/// Pool size and inter-pool delay for a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub pool_size: usize,
    pub delay_secs: u64,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            delay_secs: DEFAULT_POOL_DELAY_SECS,
        }
    }
}

impl Pacing {
    /// A zero pool size is clamped to 1.
    pub fn new(pool_size: usize, delay_secs: u64) -> Self {
        Self {
            pool_size: pool_size.max(1),
            delay_secs,
        }
    }

    /// Number of pools needed for `total` labels.
    pub fn pool_count(&self, total: usize) -> usize {
        total.div_ceil(self.pool_size.max(1))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Geometry
// ────────────────────────────────────────────────────────────────────────────

/// Physical label size requested from the rendering service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LabelDimensions {
    pub width_inches: u32,
    pub height_inches: u32,
    pub density_dpmm: u32,
}

impl Default for LabelDimensions {
    fn default() -> Self {
        Self {
            width_inches: 4,
            height_inches: 6,
            density_dpmm: 8,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Results
// ────────────────────────────────────────────────────────────────────────────

/// Handle to a document produced by the rendering service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedDocument {
    pub dimensions: LabelDimensions,
    pub source_url: String,
    pub size_bytes: usize,
    /// Set when the document was persisted to the configured output directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip)]
    pub bytes: Bytes,
}

/// Successful result of a single dispatch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum DispatchResponse {
    /// Gateway accepted the job; carries the gateway's JSON reply.
    Printed(Value),
    Rendered(RenderedDocument),
}

/// The recorded result of dispatching the label at `index`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchOutcome {
    pub index: usize,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<DispatchResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureDetails>,
    pub recorded_at: DateTime<Utc>,
}

impl DispatchOutcome {
    pub fn from_result(index: usize, result: Result<DispatchResponse, DispatchError>) -> Self {
        let (success, response, error) = match result {
            Ok(response) => (true, Some(response), None),
            Err(e) => (false, None, Some(e.details())),
        };
        Self {
            index,
            success,
            response,
            error,
            recorded_at: Utc::now(),
        }
    }
}

/// Uniform result of every entrypoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub batch_id: Uuid,
    pub total: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub outcomes: Vec<DispatchOutcome>,
    /// Set when entries were discarded by the PDF short-circuit.
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl BatchSummary {
    pub fn from_outcomes(batch_id: Uuid, total: usize, outcomes: Vec<DispatchOutcome>) -> Self {
        let success_count = outcomes.iter().filter(|o| o.success).count();
        Self {
            batch_id,
            total,
            success_count,
            error_count: outcomes.len() - success_count,
            outcomes,
            truncated: false,
            message: None,
        }
    }
}
