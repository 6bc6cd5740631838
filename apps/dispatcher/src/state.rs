use crate::config::Config;
use crate::dispatch::Dispatcher;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub config: Config,
}

impl AppState {
    /// Request value first, then the configured default.
    pub fn gateway_url<'a>(&'a self, requested: Option<&'a str>) -> Option<&'a str> {
        requested
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .or(self.config.gateway_url.as_deref())
    }
}
