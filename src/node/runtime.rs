//! Stage actor runtime.
//!
//! Each node runs in its own tokio task that owns it exclusively. Work items
//! arrive over an mpsc channel; emissions leave over another. The task also
//! sleeps until the stage's deadline (raw-mode inactivity timer) so no
//! second task or timer handle is ever needed.
//!
//! ```text
//! StageHandle ─► mpsc::Sender<WorkItem> ─► stage task ─► mpsc::Sender<Emission>
//!                                           │   ▲
//!                                           └───┘ deadline
//! ```
//!
//! Per-message errors are logged and the task keeps going. Dropping every
//! [`StageHandle`] closes the inbound channel, which tears the stage down.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace};

use crate::error::{PipelineError, Result};
use crate::item::{Emission, WorkItem};

/// Default inbound channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// A message-processing node driven by [`spawn_stage`].
pub trait Stage: Send + 'static {
    /// Process one inbound item. `Ok(None)` means nothing to emit yet.
    fn handle(&mut self, item: WorkItem) -> Result<Option<Emission>>;

    /// Instant at which [`Stage::on_deadline`] should run.
    fn deadline(&self) -> Option<Instant> {
        None
    }

    /// Called once the deadline has passed.
    fn on_deadline(&mut self) -> Result<Option<Emission>> {
        Ok(None)
    }

    /// Teardown: release buffered state.
    fn close(&mut self) {}
}

/// Configuration for the stage task.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Inbound channel capacity.
    pub channel_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Handle for sending work items to a stage task.
///
/// Cheap to clone. The stage is torn down once all handles are dropped.
#[derive(Debug, Clone)]
pub struct StageHandle {
    tx: mpsc::Sender<WorkItem>,
}

impl StageHandle {
    /// Queue an item, waiting for capacity.
    pub async fn send(&self, item: WorkItem) -> Result<()> {
        self.tx
            .send(item)
            .await
            .map_err(|_| PipelineError::ChannelClosed)
    }

    /// Queue an item without waiting.
    ///
    /// Returns the item back when the channel is full or closed.
    pub fn try_send(&self, item: WorkItem) -> std::result::Result<(), WorkItem> {
        self.tx.try_send(item).map_err(|e| match e {
            mpsc::error::TrySendError::Full(item) | mpsc::error::TrySendError::Closed(item) => item,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn `stage` with default configuration.
///
/// Returns the inbound handle and the task handle. The task finishes with
/// `Ok(())` after the inbound channel closes, or with
/// [`PipelineError::ChannelClosed`] if `outbound` is dropped first.
pub fn spawn_stage<S: Stage>(
    stage: S,
    outbound: mpsc::Sender<Emission>,
) -> (StageHandle, JoinHandle<Result<()>>) {
    spawn_stage_with_config(stage, outbound, RuntimeConfig::default())
}

pub fn spawn_stage_with_config<S: Stage>(
    stage: S,
    outbound: mpsc::Sender<Emission>,
    config: RuntimeConfig,
) -> (StageHandle, JoinHandle<Result<()>>) {
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let task = tokio::spawn(stage_loop(stage, rx, outbound));
    (StageHandle { tx }, task)
}

async fn stage_loop<S: Stage>(
    mut stage: S,
    mut rx: mpsc::Receiver<WorkItem>,
    outbound: mpsc::Sender<Emission>,
) -> Result<()> {
    loop {
        let deadline = stage.deadline();
        let result = tokio::select! {
            biased;
            item = rx.recv() => match item {
                Some(item) => stage.handle(item),
                None => {
                    trace!("inbound closed, stopping stage");
                    stage.close();
                    return Ok(());
                }
            },
            _ = wait_until(deadline) => stage.on_deadline(),
        };

        match result {
            Ok(Some(emission)) => {
                if outbound.send(emission).await.is_err() {
                    stage.close();
                    return Err(PipelineError::ChannelClosed);
                }
            }
            Ok(None) => {}
            Err(e) => debug!(error = %e, "message dropped"),
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    /// Emits the count of items seen when its deadline fires.
    struct Batcher {
        seen: usize,
        deadline: Option<Instant>,
    }

    impl Stage for Batcher {
        fn handle(&mut self, item: WorkItem) -> Result<Option<Emission>> {
            if item.payload_object() == Some(&json!("fail")) {
                return Err(PipelineError::TypeMissing);
            }
            self.seen += 1;
            self.deadline = Some(Instant::now() + Duration::from_millis(50));
            Ok(None)
        }

        fn deadline(&self) -> Option<Instant> {
            self.deadline
        }

        fn on_deadline(&mut self) -> Result<Option<Emission>> {
            self.deadline = None;
            let count = std::mem::take(&mut self.seen);
            Ok(Some(Emission::single(WorkItem::object(json!(count)))))
        }
    }

    fn batcher() -> Batcher {
        Batcher {
            seen: 0,
            deadline: None,
        }
    }

    #[test]
    fn test_runtime_config_default() {
        assert_eq!(RuntimeConfig::default().channel_capacity, DEFAULT_CHANNEL_CAPACITY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_fires() {
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let (handle, _task) = spawn_stage(batcher(), out_tx);

        handle.send(WorkItem::object(json!(1))).await.unwrap();
        handle.send(WorkItem::object(json!("fail"))).await.unwrap();
        handle.send(WorkItem::object(json!(2))).await.unwrap();

        let start = Instant::now();
        let emission = out_rx.recv().await.unwrap();
        assert_eq!(emission.first().unwrap().payload_object(), Some(&json!(2)));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_on_channel_close() {
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let (handle, task) = spawn_stage(batcher(), out_tx);

        handle.send(WorkItem::object(json!(1))).await.unwrap();
        drop(handle);

        task.await.unwrap().unwrap();
        assert!(out_rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_outbound_closed_stops_task() {
        let (out_tx, out_rx) = mpsc::channel(1);
        drop(out_rx);
        let (handle, task) = spawn_stage(batcher(), out_tx);

        handle.send(WorkItem::object(json!(1))).await.unwrap();
        let result = task.await.unwrap();
        assert!(matches!(result, Err(PipelineError::ChannelClosed)));
        assert!(handle.is_closed());
    }

    #[test]
    fn test_try_send_full() {
        let (tx, _rx) = mpsc::channel::<WorkItem>(1);
        let handle = StageHandle { tx };

        assert!(handle.try_send(WorkItem::object(json!(1))).is_ok());
        let rejected = handle.try_send(WorkItem::object(json!(2))).unwrap_err();
        assert_eq!(rejected.payload_object(), Some(&json!(2)));
    }
}
