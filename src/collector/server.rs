use crate::config::CollectorConfig;
use crate::error::{CamwatchError, Result};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tracing::info;

use super::handlers::{delete_image_handler, list_images_handler, upload_image_handler};
use super::store::ImageStore;

/// Shared state for the Axum server
#[derive(Clone)]
pub struct ServerState {
    pub(crate) store: Arc<ImageStore>,
    pub(crate) config: CollectorConfig,
}

/// HTTP collector that receives, stores and serves uploaded images
pub struct CollectorServer {
    config: CollectorConfig,
}

impl CollectorServer {
    pub fn new(config: CollectorConfig) -> Self {
        Self { config }
    }

    pub fn router(state: ServerState) -> Router {
        Router::new()
            .route("/Images", get(list_images_handler))
            .route("/Images/UploadImage", post(upload_image_handler))
            .route("/Images/DeleteImage", post(delete_image_handler))
            .with_state(state)
    }

    /// Start the HTTP server and serve until the process is stopped
    pub async fn start(&self) -> Result<()> {
        let store = Arc::new(ImageStore::new(&self.config.data_path));
        store.init().await?;

        let state = ServerState {
            store,
            config: self.config.clone(),
        };
        let app = Self::router(state);

        let addr = format!("{}:{}", self.config.ip, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
            CamwatchError::component("collector", format!("failed to bind {}: {}", addr, e))
        })?;

        info!(
            "Collector listening on {}, storing images under {}",
            addr, self.config.data_path
        );

        axum::serve(listener, app).await.map_err(|e| {
            CamwatchError::component("collector", format!("server error: {}", e))
        })?;

        Ok(())
    }
}
