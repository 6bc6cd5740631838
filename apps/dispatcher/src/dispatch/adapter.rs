//! Entry Adapter: turns untyped caller input into labels and routes it.
//!
//! Accepted shapes:
//! - a single label object: `{"IP": "...", "PORT": 9100, "ZPL": "..."}`
//! - an array of label objects
//! - a wrapper: `{"labels": [...], "poolSize": 10, "sleepSeconds": 1}`
//!   (`PRINT_LABEL_POOL` / `PRINT_LABEL_SLEEP` are accepted as alternate keys)
//!
//! Field names are accepted in upper case (`IP`, `PORT`, `ZPL`) or lower case.
//! This is the only place casing is handled; everything downstream sees `RawLabel`.

use serde_json::{Map, Value};
use tracing::info;
use uuid::Uuid;

use crate::dispatch::batch::BatchObserver;
use crate::dispatch::error::DispatchError;
use crate::dispatch::models::{BatchSummary, DispatchOutcome, LabelRequest, Pacing, RawLabel};
use crate::dispatch::Dispatcher;

const POOL_SIZE_KEYS: [&str; 2] = ["poolSize", "PRINT_LABEL_POOL"];
const POOL_DELAY_KEYS: [&str; 2] = ["sleepSeconds", "PRINT_LABEL_SLEEP"];

/// Pacing values supplied by the caller; `None` means "use the configured default".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacingOverrides {
    pub pool_size: Option<usize>,
    pub delay_secs: Option<u64>,
}

impl PacingOverrides {
    pub fn resolve(&self, defaults: Pacing) -> Pacing {
        Pacing::new(
            self.pool_size.unwrap_or(defaults.pool_size),
            self.delay_secs.unwrap_or(defaults.delay_secs),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedInput {
    pub labels: Vec<RawLabel>,
    pub pacing: PacingOverrides,
}

/// Parses a JSON document and normalizes it.
pub fn normalize_raw(raw: &str) -> Result<NormalizedInput, DispatchError> {
    if raw.trim().is_empty() {
        return Err(DispatchError::Validation(
            "Label data is missing".to_string(),
        ));
    }
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| DispatchError::Validation(format!("Label data is not valid JSON: {e}")))?;
    normalize_value(value)
}

/// Normalizes an already-parsed JSON value.
pub fn normalize_value(value: Value) -> Result<NormalizedInput, DispatchError> {
    match value {
        Value::Array(items) => Ok(NormalizedInput {
            labels: items.iter().map(normalize_label).collect(),
            pacing: PacingOverrides::default(),
        }),
        Value::Object(map) => match map.get("labels") {
            Some(Value::Array(items)) => Ok(NormalizedInput {
                labels: items.iter().map(normalize_label).collect(),
                pacing: PacingOverrides {
                    pool_size: first_positive(&map, &POOL_SIZE_KEYS).map(|n| n as usize),
                    delay_secs: first_non_negative(&map, &POOL_DELAY_KEYS),
                },
            }),
            _ => Ok(NormalizedInput {
                labels: vec![label_from_map(&map)],
                pacing: PacingOverrides::default(),
            }),
        },
        other => Err(DispatchError::Validation(format!(
            "Label data must be an object or an array, got {}",
            json_type_name(&other)
        ))),
    }
}

/// A non-object array element normalizes to an empty label, which fails validation
/// at its own index rather than rejecting the whole input.
fn normalize_label(value: &Value) -> RawLabel {
    match value {
        Value::Object(map) => label_from_map(map),
        _ => RawLabel::default(),
    }
}

fn label_from_map(map: &Map<String, Value>) -> RawLabel {
    RawLabel {
        address: pick(map, "IP", "ip").and_then(scalar_to_string),
        port: pick(map, "PORT", "port").cloned(),
        payload: pick(map, "ZPL", "zpl").and_then(scalar_to_string),
    }
}

/// Upper-case key wins unless it is absent or empty.
fn pick<'a>(map: &'a Map<String, Value>, upper: &str, lower: &str) -> Option<&'a Value> {
    map.get(upper)
        .filter(|v| !is_empty_value(v))
        .or_else(|| map.get(lower).filter(|v| !is_empty_value(v)))
}

fn is_empty_value(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn scalar_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_integer(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn first_positive(map: &Map<String, Value>, keys: &[&str]) -> Option<u64> {
    keys.iter()
        .filter_map(|k| map.get(*k).and_then(as_integer))
        .find(|&n| n >= 1)
        .map(|n| n as u64)
}

fn first_non_negative(map: &Map<String, Value>, keys: &[&str]) -> Option<u64> {
    keys.iter()
        .filter_map(|k| map.get(*k).and_then(as_integer))
        .find(|&n| n >= 0)
        .map(|n| n as u64)
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl Dispatcher {
    /// Normalizes raw JSON text and routes it to single or batch dispatch.
    pub async fn dispatch_from_raw(
        &self,
        raw: &str,
        gateway_url: &str,
        observer: &dyn BatchObserver,
    ) -> Result<BatchSummary, DispatchError> {
        let input = normalize_raw(raw)?;
        self.dispatch_normalized(input, gateway_url, observer).await
    }

    /// Same as `dispatch_from_raw` for input that is already a JSON value.
    pub async fn dispatch_from_value(
        &self,
        value: Value,
        gateway_url: &str,
        observer: &dyn BatchObserver,
    ) -> Result<BatchSummary, DispatchError> {
        let input = normalize_value(value)?;
        self.dispatch_normalized(input, gateway_url, observer).await
    }

    async fn dispatch_normalized(
        &self,
        input: NormalizedInput,
        gateway_url: &str,
        observer: &dyn BatchObserver,
    ) -> Result<BatchSummary, DispatchError> {
        match input.labels.len() {
            0 => Err(DispatchError::Validation(
                "No labels found to print".to_string(),
            )),
            1 => {
                let label = LabelRequest::validate(&input.labels[0], 0)?;
                self.dispatch_one(&label, gateway_url).await
            }
            n => {
                let pacing = input.pacing.resolve(self.settings.default_pacing);
                info!("Routing {n} labels to the batch scheduler");
                self.dispatch_batch(&input.labels, pacing, gateway_url, observer)
                    .await
            }
        }
    }

    /// Direct path for exactly one label, wrapped in the uniform summary shape.
    pub async fn dispatch_one(
        &self,
        label: &LabelRequest,
        gateway_url: &str,
    ) -> Result<BatchSummary, DispatchError> {
        let response = self.dispatch_single(label, gateway_url).await?;
        Ok(BatchSummary::from_outcomes(
            Uuid::new_v4(),
            1,
            vec![DispatchOutcome::from_result(0, Ok(response))],
        ))
    }
}
