pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod engine;
pub mod storage;

pub use db::DbPool;

use config::Config;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::auth::TokenService;
use crate::engine::PaymentGateway;
use crate::storage::ImageStore;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub tokens: TokenService,
    pub images: Arc<dyn ImageStore>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        config: Config,
        db: DbPool,
        tokens: TokenService,
        images: Arc<dyn ImageStore>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            config,
            db,
            tokens,
            images,
            gateway,
            metrics_handle: None,
        }
    }

    /// Set the Prometheus metrics handle
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}
