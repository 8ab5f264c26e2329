use std::sync::Arc;

use docconv_pipeline::backends::Backends;
use docconv_pipeline::dispatcher::Dispatcher;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Job store, blob store, barrier and queue handles.
    pub backends: Backends,
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    pub fn new(config: ServerConfig, backends: Backends) -> Self {
        let dispatcher = Arc::new(backends.dispatcher());
        Self {
            config: Arc::new(config),
            backends,
            dispatcher,
        }
    }
}
