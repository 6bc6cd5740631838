// Label dispatch engine.
// Single dispatch (gateway or rendering), batch scheduling, and entry normalization.
// All network access goes through `HttpTransport`; nothing here builds its own client.

pub mod adapter;
pub mod batch;
pub mod dimensions;
pub mod error;
pub mod handlers;
pub mod models;
pub mod render;
pub mod single;
pub mod transport;

use std::path::PathBuf;
use std::sync::Arc;

pub use batch::{BatchObserver, BatchScheduler, NoopObserver, Progress, TracingObserver};
pub use error::{BatchFailure, DispatchError, ErrorKind, FailureDetails};
pub use models::{
    BatchSummary, DispatchOutcome, DispatchResponse, LabelDimensions, LabelRequest, Pacing,
    RawLabel, RenderedDocument,
};
pub use transport::{HttpTransport, ReqwestTransport};

/// Engine-wide settings, usually derived from `Config`.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub render_base_url: String,
    pub render_output_dir: Option<PathBuf>,
    /// Pacing used when the caller supplies none.
    pub default_pacing: Pacing,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            render_base_url: render::DEFAULT_RENDER_BASE_URL.to_string(),
            render_output_dir: None,
            default_pacing: Pacing::default(),
        }
    }
}

/// Entry point for all label dispatching. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn HttpTransport>,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn HttpTransport>, settings: DispatchSettings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }
}
