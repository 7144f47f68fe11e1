pub mod api;
pub mod config;
pub mod errors;
pub mod ids;
pub mod locate;
pub mod locks;
pub mod mapping;
pub mod metrics_defs;
pub mod patch;
pub mod payload;
pub mod reconcile;
pub mod schema;
pub mod service;

#[cfg(test)]
mod testutils;

use mapping::{MappingError, MappingSource};
use reconcile::Reconciler;
use service::PublisherService;
use shared::http::run_http_service;
use std::sync::Arc;
use tabstore::TabularStore;

#[derive(thiserror::Error, Debug)]
pub enum PublisherError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    InvalidConfig(#[from] config::ValidationError),
    #[error(transparent)]
    Mapping(#[from] MappingError),
}

/// Everything a request handler needs.
pub struct AppState {
    pub reconciler: Reconciler,
    pub mapping: MappingSource,
}

pub async fn run(config: config::Config, store: Arc<dyn TabularStore>) -> Result<(), PublisherError> {
    config.validate()?;
    let mapping = MappingSource::from_path(config.mapping.path.clone(), config.mapping.reload)?;
    let state = AppState {
        reconciler: Reconciler::new(store, config.reconcile_options()),
        mapping,
    };

    tracing::info!(
        mapping = %config.mapping.path.display(),
        reload = ?config.mapping.reload,
        auto_add_columns = config.auto_add_columns,
        infer_empty_delete = config.infer_empty_delete,
        "Starting publisher"
    );
    let service = PublisherService::new(Arc::new(state));
    run_http_service(&config.listener.host, config.listener.port, service).await
}
