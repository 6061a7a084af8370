//! Process-level resources shared by every texture

use crate::canvas::GpuCanvas;
use crate::tile::Tile;
use crate::TextureUploader;
use std::sync::Arc;
use std::time::Duration;
use tilestream_cache::{ConfigError, StreamingConfig, TilePool};
use tilestream_scheduler::{ConcurrencyGate, RenderLoop, WorkerPool, WorkerPoolConfig};
use tracing::debug;

/// Tile pool, decode gate and worker pool, built once and shared.
///
/// Cloning is cheap and every clone refers to the same resources.
#[derive(Clone)]
pub struct TextureResources {
    pool: Arc<TilePool<Tile>>,
    gate: Arc<ConcurrencyGate>,
    workers: Arc<WorkerPool>,
    upload_budget: Duration,
}

impl TextureResources {
    /// Build resources from a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when the configuration does not
    /// validate.
    pub fn new(config: &StreamingConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: &StreamingConfig) -> Self {
        debug!(
            decode_concurrency = config.decode_concurrency,
            upload_budget_ms = config.upload_budget_ms,
            "texture resources prepared"
        );
        let workers = WorkerPoolConfig::default()
            .with_keep_alive(config.worker_keep_alive())
            .with_name(config.worker_name.clone());

        Self {
            pool: Arc::new(TilePool::new()),
            gate: Arc::new(ConcurrencyGate::new(config.decode_concurrency)),
            workers: Arc::new(WorkerPool::new(workers)),
            upload_budget: config.upload_budget(),
        }
    }

    pub fn pool(&self) -> Arc<TilePool<Tile>> {
        Arc::clone(&self.pool)
    }

    pub fn gate(&self) -> Arc<ConcurrencyGate> {
        Arc::clone(&self.gate)
    }

    pub fn workers(&self) -> Arc<WorkerPool> {
        Arc::clone(&self.workers)
    }

    pub fn upload_budget(&self) -> Duration {
        self.upload_budget
    }

    /// Uploader for one render surface, using the configured budget
    pub fn uploader<C>(&self, render_loop: Arc<dyn RenderLoop<C>>) -> Arc<TextureUploader<C>>
    where
        C: GpuCanvas + 'static,
    {
        TextureUploader::with_budget(render_loop, self.upload_budget)
    }

    /// Drop pooled tiles. Live textures keep theirs.
    pub fn trim(&self) {
        self.pool.clear();
    }
}

impl Default for TextureResources {
    fn default() -> Self {
        Self::build(&StreamingConfig::default())
    }
}
