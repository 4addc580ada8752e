//! Orchestrator - wires the loops together and owns their lifecycle

use crate::config::SequencerConfig;
use crate::consistency::ConsistencyMonitor;
use crate::error::SequencerError;
use crate::expiry::TxExpirer;
use crate::interfaces::{Finalizer, L1Reader, StateReader, TxPool};
use crate::intake::PoolLoader;
use crate::janitor::PoolJanitor;
use crate::metrics::SequencerMetrics;
use crate::streaming::{StreamPipeline, StreamPipelineHandle};
use crate::sync::SyncGate;
use crate::worker::Worker;
use datastream::{StreamLog, StreamServer, StreamServerShutdown};
use sequencer_types::{Address, FullBlock};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Poll interval of the startup sync wait
pub const SYNC_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Block channel capacity per transaction allowed in a batch
pub const BLOCK_CHANNEL_MULTIPLIER: usize = 2;

/// Everything a finalizer needs from the sequencer
pub struct FinalizerContext {
    pub config: SequencerConfig,
    pub worker: Arc<Worker>,
    pub pool: Arc<dyn TxPool>,
    pub state: Arc<dyn StateReader>,
    pub sync_gate: SyncGate,
    /// Finalized blocks go here; `send` waits while the pipeline is behind
    pub blocks_tx: mpsc::Sender<FullBlock>,
    pub sequencer_address: Address,
    pub metrics: Arc<SequencerMetrics>,
}

pub struct Sequencer {
    config: SequencerConfig,
    pool: Arc<dyn TxPool>,
    state: Arc<dyn StateReader>,
    worker: Arc<Worker>,
    sync_gate: SyncGate,
    sequencer_address: Address,
    metrics: Arc<SequencerMetrics>,
}

/// Handle to a started sequencer
pub struct SequencerTasks {
    tracker: TaskTracker,
    cancel: CancellationToken,
    stream: StreamPipelineHandle,
    stream_addr: Option<SocketAddr>,
    stream_server: Option<StreamServerShutdown>,
}

/// Stream log opened at startup
struct OpenedStream {
    log: Option<Box<dyn StreamLog>>,
    addr: Option<SocketAddr>,
    server: Option<StreamServerShutdown>,
}

impl SequencerTasks {
    /// Reattach a stream log after a streaming fault
    pub fn stream_handle(&self) -> &StreamPipelineHandle {
        &self.stream
    }

    /// Address the stream server listens on, when streaming is enabled
    pub fn stream_addr(&self) -> Option<SocketAddr> {
        self.stream_addr
    }

    /// Stops the network side of the stream server opened at startup.
    ///
    /// After a streaming fault the pipeline drops that server; awaiting
    /// `shutdown` then frees the stream file for a reattached log.
    pub fn stream_server(&self) -> Option<&StreamServerShutdown> {
        self.stream_server.as_ref()
    }

    /// Wait for cancellation, then for every loop and the stream server to return
    pub async fn wait(self) {
        self.cancel.cancelled().await;
        self.tracker.close();
        self.tracker.wait().await;
        if let Some(server) = &self.stream_server {
            server.shutdown().await;
        }
        tracing::info!("sequencer stopped");
    }
}

impl Sequencer {
    /// Validate the config and read the trusted sequencer address from L1
    pub async fn new(
        config: SequencerConfig,
        pool: Arc<dyn TxPool>,
        state: Arc<dyn StateReader>,
        l1: Arc<dyn L1Reader>,
    ) -> Result<Self, SequencerError> {
        config.validate()?;

        let sequencer_address = l1
            .trusted_sequencer()
            .await
            .map_err(SequencerError::TrustedSequencer)?;
        tracing::info!(%sequencer_address, "trusted sequencer address");

        Ok(Self {
            worker: Arc::new(Worker::new(config.batch_constraints.clone())),
            sync_gate: SyncGate::new(state.clone(), l1),
            config,
            pool,
            state,
            sequencer_address,
            metrics: Arc::new(SequencerMetrics::new()),
        })
    }

    pub fn metrics(&self) -> Arc<SequencerMetrics> {
        self.metrics.clone()
    }

    pub fn worker(&self) -> Arc<Worker> {
        self.worker.clone()
    }

    /// Start, then run until `cancel` fires and every loop has returned
    pub async fn run<F>(self, cancel: CancellationToken, build_finalizer: F) -> Result<(), SequencerError>
    where
        F: FnOnce(FinalizerContext) -> Arc<dyn Finalizer>,
    {
        match self.start(cancel, build_finalizer).await {
            Ok(tasks) => {
                tasks.wait().await;
                Ok(())
            }
            Err(SequencerError::Cancelled) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Bring the sequencer up and spawn every loop.
    ///
    /// Waits for the state to be synced, releases WIP claims left by a
    /// previous run and, when streaming is enabled, opens the stream file and
    /// catches it up with stored blocks.
    pub async fn start<F>(
        self,
        cancel: CancellationToken,
        build_finalizer: F,
    ) -> Result<SequencerTasks, SequencerError>
    where
        F: FnOnce(FinalizerContext) -> Arc<dyn Finalizer>,
    {
        if !self
            .sync_gate
            .wait_until_synced(SYNC_CHECK_INTERVAL, &cancel)
            .await
        {
            return Err(SequencerError::Cancelled);
        }

        self.pool
            .mark_wip_txs_as_pending()
            .await
            .map_err(SequencerError::MarkWipAsPending)?;

        let OpenedStream {
            log,
            addr: stream_addr,
            server: stream_server,
        } = self.open_stream().await?;

        let capacity = usize::try_from(self.config.batch_constraints.max_txs_per_batch)
            .unwrap_or(usize::MAX)
            .saturating_mul(BLOCK_CHANNEL_MULTIPLIER);
        let (blocks_tx, blocks_rx) = mpsc::channel(capacity);

        let (mut pipeline, stream) =
            StreamPipeline::new(log, blocks_rx, self.state.clone(), self.metrics.clone());
        if pipeline.is_enabled() {
            let caught_up = pipeline
                .catch_up()
                .await
                .map_err(SequencerError::StreamCatchUp)?;
            tracing::info!(blocks = caught_up, "data stream file updated");
        }

        let tracker = TaskTracker::new();

        let loader = PoolLoader::new(
            self.pool.clone(),
            self.worker.clone(),
            self.metrics.clone(),
            self.config.load_pool_txs_check_interval(),
        );
        tracker.spawn(loader.run(cancel.clone()));

        // Runs even with streaming off so the finalizer never blocks on a full channel
        tracker.spawn(pipeline.run(cancel.clone()));

        let finalizer = build_finalizer(FinalizerContext {
            config: self.config.clone(),
            worker: self.worker.clone(),
            pool: self.pool.clone(),
            state: self.state.clone(),
            sync_gate: self.sync_gate.clone(),
            blocks_tx,
            sequencer_address: self.sequencer_address,
            metrics: self.metrics.clone(),
        });
        tracker.spawn(finalizer.clone().start(cancel.clone()));

        let janitor = PoolJanitor::new(
            self.pool.clone(),
            self.state.clone(),
            self.config.delete_pool_txs_check_interval(),
            self.config.delete_pool_txs_l1_block_confirmations,
        );
        tracker.spawn(janitor.run(cancel.clone()));

        let expirer = TxExpirer::new(
            self.pool.clone(),
            self.worker.clone(),
            self.metrics.clone(),
            self.config.tx_lifetime_check_interval(),
            self.config.tx_lifetime_max(),
        );
        tracker.spawn(expirer.run(cancel.clone()));

        let monitor = ConsistencyMonitor::new(
            self.state.clone(),
            finalizer,
            self.config.state_consistency_check_interval(),
        );
        let monitor_cancel = cancel.clone();
        tracker.spawn(async move {
            let exit = monitor.run(monitor_cancel).await;
            tracing::info!(?exit, "consistency monitor exited");
        });

        tracing::info!("sequencer started");

        Ok(SequencerTasks {
            tracker,
            cancel,
            stream,
            stream_addr,
            stream_server,
        })
    }

    async fn open_stream(&self) -> Result<OpenedStream, SequencerError> {
        let stream_config = &self.config.stream_server;
        if !stream_config.enabled {
            tracing::info!("data stream disabled");
            return Ok(OpenedStream {
                log: None,
                addr: None,
                server: None,
            });
        }

        let server =
            StreamServer::open(&stream_config.filename).map_err(SequencerError::StreamServer)?;
        let addr = server
            .start(&format!("0.0.0.0:{}", stream_config.port))
            .await
            .map_err(SequencerError::StreamServer)?;

        Ok(OpenedStream {
            server: Some(server.shutdown_handle()),
            log: Some(Box::new(server)),
            addr: Some(addr),
        })
    }
}
