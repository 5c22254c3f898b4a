use std::sync::Arc;

use tilefarm_core::lease::{GridShape, LeaseCoordinator};
use tilefarm_core::mosaic::SnapshotStore;
use tilefarm_db::JobStore;
use tokio::sync::{Mutex, RwLock};

use crate::config::ServerConfig;
use crate::engine::aggregator::ResultAggregator;
use crate::engine::decomposer::TaskDecomposer;
use crate::engine::dispatcher::JobDispatcher;
use crate::engine::signing::{PassthroughSigner, SceneUrlSigner};

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Task and job persistence.
    pub store: Arc<dyn JobStore>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    pub decomposer: Arc<TaskDecomposer>,
    pub dispatcher: Arc<JobDispatcher>,
    pub aggregator: Arc<ResultAggregator>,
    /// Mosaic lease table. One instance per process; every lease operation
    /// holds the lock for its whole read-modify-write.
    pub coordinator: Arc<Mutex<LeaseCoordinator>>,
    /// Latest snapshot per mosaic cell.
    pub snapshots: Arc<RwLock<SnapshotStore>>,
}

impl AppState {
    /// Wire the engine services around `store` with pass-through signing.
    pub fn new(store: Arc<dyn JobStore>, config: ServerConfig) -> Self {
        Self::with_signer(store, config, Arc::new(PassthroughSigner))
    }

    pub fn with_signer(
        store: Arc<dyn JobStore>,
        config: ServerConfig,
        signer: Arc<dyn SceneUrlSigner>,
    ) -> Self {
        let decomposer = TaskDecomposer::new(
            Arc::clone(&store),
            config.tile_size,
            config.job_insert_batch_size,
        );
        let dispatcher = JobDispatcher::new(Arc::clone(&store), signer)
            .with_strict_claim(config.strict_claim)
            .with_stale_job_timeout(config.stale_job_timeout());
        let aggregator = ResultAggregator::new(Arc::clone(&store), config.preview_max_pixels);
        let coordinator = LeaseCoordinator::new(
            GridShape::new(config.grid_tiles_x, config.grid_tiles_y),
            config.lease_timeout(),
        );

        Self {
            store,
            config: Arc::new(config),
            decomposer: Arc::new(decomposer),
            dispatcher: Arc::new(dispatcher),
            aggregator: Arc::new(aggregator),
            coordinator: Arc::new(Mutex::new(coordinator)),
            snapshots: Arc::new(RwLock::new(SnapshotStore::new())),
        }
    }
}
