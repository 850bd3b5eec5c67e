//! Asynchronous tile loading
//!
//! [`AsyncTileLoader::load`] hands a decode to the configured spawner and
//! returns a [`PendingLoad`]. The render thread polls that handle once per
//! frame and never blocks on it. Pixels come back as a [`PixelBuffer`]; the
//! GPU upload happens on the render thread when the node installs them.

use crate::prelude::{Arc, Mutex};
use crate::pyramid::node::NodeId;
use crate::runtime::{AsyncHandle, AsyncSpawner};
use crate::tiles::source::{PixelBuffer, TileDecodeResult};
use crate::traits::TilePixelProvider;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared cancellation flag between a pending load and its decode task
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// What a poll of a [`PendingLoad`] observed
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// Still decoding
    Pending,
    Resolved(PixelBuffer),
    /// The provider had no data for the tile
    Unresolved,
    Canceled,
}

impl LoadOutcome {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

type Slot = Arc<Mutex<Option<TileDecodeResult>>>;

/// In-flight decode of one tile
pub struct PendingLoad {
    id: NodeId,
    version: u64,
    slot: Slot,
    cancel: CancelToken,
    handle: Option<Box<dyn AsyncHandle>>,
    settled: bool,
}

impl PendingLoad {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Tile version snapshotted when the load was issued
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.is_canceled()
    }

    /// Requests cancellation. Once called, every later poll reports
    /// [`LoadOutcome::Canceled`], even if the decode already finished.
    pub fn cancel(&mut self) {
        if self.settled {
            return;
        }
        self.cancel.cancel();
        if let Some(handle) = self.handle.as_ref() {
            handle.cancel();
        }
        log::debug!("canceled load of {}", self.id);
    }

    /// Non-blocking check for a terminal outcome. A terminal outcome is
    /// reported once; the handle should be dropped afterwards.
    pub fn poll(&mut self) -> LoadOutcome {
        if self.settled {
            return LoadOutcome::Pending;
        }
        if self.cancel.is_canceled() {
            self.settled = true;
            return LoadOutcome::Canceled;
        }

        let ready = match self.slot.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => Some(TileDecodeResult::Unavailable),
        };
        let outcome = match ready {
            Some(TileDecodeResult::Pixels(pixels)) => LoadOutcome::Resolved(pixels),
            Some(TileDecodeResult::Unavailable) => LoadOutcome::Unresolved,
            None => {
                // a task that finished without filling the slot was aborted
                let finished = self.handle.as_ref().map_or(true, |h| h.is_finished());
                if finished && self.slot.lock().map_or(true, |s| s.is_none()) {
                    LoadOutcome::Unresolved
                } else {
                    return LoadOutcome::Pending;
                }
            }
        };
        self.settled = true;
        log::debug!("load of {} settled: {}", self.id, outcome_name(&outcome));
        outcome
    }
}

fn outcome_name(outcome: &LoadOutcome) -> &'static str {
    match outcome {
        LoadOutcome::Pending => "pending",
        LoadOutcome::Resolved(_) => "resolved",
        LoadOutcome::Unresolved => "unresolved",
        LoadOutcome::Canceled => "canceled",
    }
}

impl std::fmt::Debug for PendingLoad {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingLoad")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("canceled", &self.cancel.is_canceled())
            .field("settled", &self.settled)
            .finish()
    }
}

impl Drop for PendingLoad {
    fn drop(&mut self) {
        if !self.settled && !self.cancel.is_canceled() {
            log::warn!("pending load of {} dropped without being settled", self.id);
            self.cancel();
        }
    }
}

/// Issues tile decodes on a background executor
pub struct AsyncTileLoader {
    provider: Arc<dyn TilePixelProvider>,
    spawner: Arc<dyn AsyncSpawner>,
    completions: Option<Sender<NodeId>>,
}

impl AsyncTileLoader {
    pub fn new(provider: Arc<dyn TilePixelProvider>, spawner: Arc<dyn AsyncSpawner>) -> Self {
        Self {
            provider,
            spawner,
            completions: None,
        }
    }

    /// Channel that receives the id of every tile whose decode finished.
    /// Meant for waking an idle render loop; node state is only ever changed
    /// by polling on the render thread.
    pub fn completions(&mut self) -> Receiver<NodeId> {
        let (tx, rx) = unbounded();
        self.completions = Some(tx);
        rx
    }

    pub fn provider(&self) -> &Arc<dyn TilePixelProvider> {
        &self.provider
    }

    /// Starts decoding `id`. `version` is recorded on the returned handle.
    pub fn load(&self, id: NodeId, version: u64) -> PendingLoad {
        let slot: Slot = Arc::new(Mutex::new(None));
        let cancel = CancelToken::new();

        let provider = self.provider.clone();
        let task_slot = slot.clone();
        let task_cancel = cancel.clone();
        let notify = self.completions.clone();

        let handle = self.spawner.spawn_boxed(Box::pin(async move {
            if task_cancel.is_canceled() {
                return;
            }
            let result = provider
                .decode(id.level, id.row, id.col, task_cancel.clone())
                .await;
            if task_cancel.is_canceled() {
                return;
            }
            if let Ok(mut slot) = task_slot.lock() {
                *slot = Some(result);
            }
            if let Some(tx) = notify {
                let _ = tx.send(id);
            }
        }));

        log::debug!("load of {} issued ({})", id, self.provider.name());
        PendingLoad {
            id,
            version,
            slot,
            cancel,
            handle: Some(handle),
            settled: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::spawners::ManualSpawner;
    use futures::future::BoxFuture;

    struct Solid;

    impl TilePixelProvider for Solid {
        fn decode(
            &self,
            level: u32,
            _row: u32,
            _col: u32,
            _cancel: CancelToken,
        ) -> BoxFuture<'_, TileDecodeResult> {
            Box::pin(async move {
                if level > 2 {
                    TileDecodeResult::Unavailable
                } else {
                    TileDecodeResult::Pixels(PixelBuffer::solid(4, 4, [255, 0, 0, 255]))
                }
            })
        }
    }

    fn loader() -> (AsyncTileLoader, ManualSpawner) {
        let spawner = ManualSpawner::new();
        (AsyncTileLoader::new(Arc::new(Solid), Arc::new(spawner.clone())), spawner)
    }

    #[test]
    fn test_load_resolves_after_decode() {
        let (loader, spawner) = loader();
        let mut pending = loader.load(NodeId::new(1, 0, 1), 7);
        assert_eq!(pending.version(), 7);
        assert!(pending.poll().is_pending());

        spawner.run_until_stalled();
        match pending.poll() {
            LoadOutcome::Resolved(px) => assert_eq!((px.width, px.height), (4, 4)),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_missing_tile_is_unresolved() {
        let (loader, spawner) = loader();
        let mut pending = loader.load(NodeId::new(3, 0, 0), 0);
        spawner.run_until_stalled();
        assert_eq!(pending.poll(), LoadOutcome::Unresolved);
    }

    #[test]
    fn test_cancel_wins_over_completed_decode() {
        let (loader, spawner) = loader();
        let mut pending = loader.load(NodeId::new(0, 0, 0), 0);
        spawner.run_until_stalled();
        pending.cancel();
        assert_eq!(pending.poll(), LoadOutcome::Canceled);
    }

    #[test]
    fn test_cancel_before_decode_skips_work() {
        let (mut loader, spawner) = loader();
        let done = loader.completions();
        let mut pending = loader.load(NodeId::new(0, 0, 0), 0);
        pending.cancel();
        spawner.run_until_stalled();
        assert!(done.try_recv().is_err());
        assert_eq!(pending.poll(), LoadOutcome::Canceled);
    }

    #[test]
    fn test_completion_channel() {
        let (mut loader, spawner) = loader();
        let done = loader.completions();
        let mut pending = loader.load(NodeId::new(2, 1, 1), 0);
        spawner.run_until_stalled();
        assert_eq!(done.try_recv().ok(), Some(NodeId::new(2, 1, 1)));
        assert!(matches!(pending.poll(), LoadOutcome::Resolved(_)));
    }
}
