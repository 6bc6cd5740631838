//! Rendering fallback: ZPL → PDF via the Labelary API.

use std::io::Write;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tempfile::NamedTempFile;
use tracing::{info, warn};
use uuid::Uuid;

use crate::dispatch::dimensions::infer_dimensions;
use crate::dispatch::error::{parse_diagnostic_body, DispatchError, HttpFailure};
use crate::dispatch::models::{LabelDimensions, RenderedDocument};
use crate::dispatch::transport::OutboundRequest;
use crate::dispatch::Dispatcher;

pub const DEFAULT_RENDER_BASE_URL: &str = "https://api.labelary.com";

const PDF_SIGNATURE: &[u8] = b"%PDF";

/// `{base}/v1/printers/{density}dpmm/labels/{width}x{height}/0/`
pub fn render_url(base_url: &str, dims: &LabelDimensions) -> String {
    format!(
        "{}/v1/printers/{}dpmm/labels/{}x{}/0/",
        base_url.trim_end_matches('/'),
        dims.density_dpmm,
        dims.width_inches,
        dims.height_inches
    )
}

impl Dispatcher {
    /// Renders markup into a PDF document, persisting it when an output directory
    /// is configured.
    pub async fn render(&self, zpl: &str) -> Result<RenderedDocument, DispatchError> {
        if zpl.trim().is_empty() {
            return Err(DispatchError::Validation(
                "Markup is missing or empty".to_string(),
            ));
        }

        let dimensions = infer_dimensions(zpl);
        let url = render_url(&self.settings.render_base_url, &dimensions);

        let reply = self
            .transport
            .post(OutboundRequest {
                url: url.clone(),
                accept: "application/pdf",
                content_type: "application/x-www-form-urlencoded",
                body: Bytes::from(zpl.to_string()),
            })
            .await
            .map_err(|e| match e {
                DispatchError::Transport(f) => DispatchError::Rendering(HttpFailure {
                    message: format!("Rendering service unreachable: {}", f.message),
                    ..f
                }),
                other => other,
            })?;

        if !reply.is_success() {
            warn!("Rendering service returned HTTP {} for {url}", reply.status);
            return Err(DispatchError::Rendering(HttpFailure {
                message: format!(
                    "Rendering service returned HTTP {} {}",
                    reply.status, reply.status_text
                )
                .trim_end()
                .to_string(),
                status: Some(reply.status),
                status_text: Some(reply.status_text),
                details: parse_diagnostic_body(&reply.body),
            }));
        }

        if !reply.body.starts_with(PDF_SIGNATURE) {
            return Err(DispatchError::Rendering(HttpFailure {
                message: "Rendering service returned a body that is not a PDF document"
                    .to_string(),
                status: Some(reply.status),
                status_text: Some(reply.status_text),
                details: parse_diagnostic_body(&reply.body[..reply.body.len().min(512)]),
            }));
        }

        let path = match &self.settings.render_output_dir {
            Some(dir) => Some(self.persist(dir.clone(), reply.body.clone()).await?),
            None => None,
        };

        info!(
            "Rendered {}x{}in label ({} bytes)",
            dimensions.width_inches,
            dimensions.height_inches,
            reply.body.len()
        );

        Ok(RenderedDocument {
            dimensions,
            source_url: url,
            size_bytes: reply.body.len(),
            path,
            bytes: reply.body,
        })
    }

    async fn persist(&self, dir: PathBuf, bytes: Bytes) -> Result<PathBuf, DispatchError> {
        let saved = tokio::task::spawn_blocking(move || write_document(&dir, &bytes))
            .await
            .map_err(|e| {
                DispatchError::Rendering(HttpFailure::new(format!(
                    "Saving rendered document panicked: {e}"
                )))
            })?;

        saved.map_err(|e| {
            DispatchError::Rendering(HttpFailure::new(format!(
                "Could not save rendered document: {e}"
            )))
        })
    }
}

/// Writes through a temp file in `dir`, then renames it into place.
fn write_document(dir: &Path, bytes: &[u8]) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;

    let target = dir.join(format!("label-{}.pdf", Uuid::new_v4()));
    tmp.persist(&target).map_err(|e| e.error)?;
    info!("Rendered document saved to {}", target.display());
    Ok(target)
}
