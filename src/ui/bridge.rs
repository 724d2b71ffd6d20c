// EventLoopBridge - Coordinates between tokio async runtime and Slint event loop
//
// Slint state may only be touched on the UI thread. Tokio tasks hand closures
// to a bounded channel; a dedicated handler thread drains it in order and
// queues each closure onto the Slint event loop.

use slint::ComponentHandle;
use std::future::Future;
use tokio::sync::mpsc;

/// Capacity of the UI update queue
const UI_UPDATE_BUFFER: usize = 100;

type UiUpdate<T> = Box<dyn FnOnce(&T) + Send>;

/// Coordinates between tokio async runtime and Slint event loop
///
/// The bridge owns the handler thread. Callbacks and tasks use cloned
/// [`EventLoopBridgeHandle`]s to:
/// - queue UI updates from tokio tasks (`send_ui()`) or plain threads
///   (`blocking_send_ui()`)
/// - spawn async tasks from Slint callbacks (`spawn_async()`)
///
/// Updates are applied on the UI thread in the order they were submitted.
pub struct EventLoopBridge<T: ComponentHandle> {
    handle: EventLoopBridgeHandle<T>,
}

impl<T: ComponentHandle + 'static> EventLoopBridge<T> {
    /// Create a new EventLoopBridge and start its handler thread
    ///
    /// # Arguments
    /// * `ui` - Strong reference to the Slint UI component
    /// * `tokio_handle` - Handle to the tokio runtime for spawning tasks
    pub fn new(ui: &T, tokio_handle: tokio::runtime::Handle) -> Self {
        let (ui_update_tx, ui_update_rx) = mpsc::channel::<UiUpdate<T>>(UI_UPDATE_BUFFER);

        let dispatch_weak = ui.as_weak();
        std::thread::Builder::new()
            .name("ui-bridge".to_string())
            .spawn(move || {
                tracing::debug!("EventLoopBridge handler thread started");

                drain_updates(ui_update_rx, |update_fn: UiUpdate<T>| {
                    dispatch_weak
                        .upgrade_in_event_loop(move |ui| update_fn(&ui))
                        .map_err(|e| {
                            tracing::warn!("Failed to queue UI update to event loop: {:?}", e);
                        })
                        .is_ok()
                });

                tracing::debug!("EventLoopBridge handler thread terminated");
            })
            .map_err(|e| tracing::error!("Failed to start UI bridge thread: {}", e))
            .ok();

        Self {
            handle: EventLoopBridgeHandle {
                tokio_handle,
                ui_update_tx,
            },
        }
    }

    /// Cloneable handle for moving into Slint callbacks and tokio tasks
    pub fn clone_handle(&self) -> EventLoopBridgeHandle<T> {
        self.handle.clone()
    }
}

/// Lightweight handle that can be cloned and passed to callbacks
pub struct EventLoopBridgeHandle<T: ComponentHandle> {
    tokio_handle: tokio::runtime::Handle,
    ui_update_tx: mpsc::Sender<UiUpdate<T>>,
}

// Manual Clone implementation to avoid requiring T: Clone
impl<T: ComponentHandle> Clone for EventLoopBridgeHandle<T> {
    fn clone(&self) -> Self {
        Self {
            tokio_handle: self.tokio_handle.clone(),
            ui_update_tx: self.ui_update_tx.clone(),
        }
    }
}

impl<T: ComponentHandle + 'static> EventLoopBridgeHandle<T> {
    /// Schedule a UI update from a plain thread, blocking until there is
    /// queue space.
    ///
    /// Never drops the update while the UI is alive. Must not be called from
    /// a tokio worker or the Slint thread.
    pub fn blocking_send_ui<F>(&self, update: F)
    where
        F: FnOnce(&T) + Send + 'static,
    {
        enqueue_blocking(&self.ui_update_tx, Box::new(update));
    }

    /// Schedule a UI update from a tokio task, waiting for queue space.
    ///
    /// Never drops the update while the UI is alive. Use this where every
    /// update matters and order must be kept, such as console lines.
    pub async fn send_ui<F>(&self, update: F)
    where
        F: FnOnce(&T) + Send + 'static,
    {
        if self.ui_update_tx.send(Box::new(update)).await.is_err() {
            tracing::warn!("Failed to send UI update - handler thread has stopped");
        }
    }

    /// Spawn an async task on the tokio runtime
    pub fn spawn_async<F, Fut>(&self, future_factory: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.tokio_handle.spawn(async move {
            future_factory().await;
        });
    }
}

/// Queue an update, waiting for room. Returns false only once the handler
/// thread has stopped.
fn enqueue_blocking<U>(tx: &mpsc::Sender<U>, update: U) -> bool {
    if tx.blocking_send(update).is_err() {
        tracing::warn!("Failed to send UI update - handler thread has stopped");
        return false;
    }
    true
}

/// Feed queued updates to `dispatch` in order until the queue closes or
/// `dispatch` reports the event loop is gone.
fn drain_updates<U>(mut rx: mpsc::Receiver<U>, mut dispatch: impl FnMut(U) -> bool) {
    while let Some(update) = rx.blocking_recv() {
        if !dispatch(update) {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // A real Slint component needs a windowing system, so the queue logic is
    // exercised through `drain_updates` directly.

    #[test]
    fn test_drain_preserves_order() {
        let (tx, rx) = mpsc::channel::<usize>(4);

        let producer = std::thread::spawn(move || {
            for i in 0..50 {
                tx.blocking_send(i).unwrap();
            }
        });

        let mut seen = Vec::new();
        drain_updates(rx, |i| {
            seen.push(i);
            true
        });
        producer.join().unwrap();

        assert_eq!(seen, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_drain_stops_when_dispatch_fails() {
        let (tx, rx) = mpsc::channel::<usize>(8);
        for i in 0..5 {
            tx.try_send(i).unwrap();
        }
        drop(tx);

        let mut seen = Vec::new();
        drain_updates(rx, |i| {
            seen.push(i);
            i < 2
        });

        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[test]
    fn test_blocking_enqueue_survives_full_queue() {
        let (tx, rx) = mpsc::channel::<usize>(UI_UPDATE_BUFFER);
        for i in 0..UI_UPDATE_BUFFER {
            tx.try_send(i).unwrap();
        }
        assert!(tx.try_send(usize::MAX).is_err());

        // The "compile finished" update waits for room and is applied last
        let state_thread = std::thread::spawn(move || enqueue_blocking(&tx, UI_UPDATE_BUFFER));

        let mut seen = Vec::new();
        drain_updates(rx, |i| {
            seen.push(i);
            true
        });

        assert!(state_thread.join().unwrap());
        assert_eq!(seen, (0..=UI_UPDATE_BUFFER).collect::<Vec<_>>());
    }

    #[test]
    fn test_blocking_enqueue_after_handler_stopped() {
        let (tx, rx) = mpsc::channel::<usize>(1);
        drop(rx);

        assert!(!enqueue_blocking(&tx, 1));
    }

    #[tokio::test]
    async fn test_awaited_send_waits_for_capacity() {
        let (tx, mut rx) = mpsc::channel::<usize>(1);

        let sender = tokio::spawn(async move {
            for i in 0..10 {
                tx.send(i).await.unwrap();
            }
        });

        let mut seen = Vec::new();
        while let Some(i) = rx.recv().await {
            seen.push(i);
        }
        sender.await.unwrap();

        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }
}
