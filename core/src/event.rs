//! Core event bus.
//!
//! Invalidations computed by the sync adapters are published here so the UI
//! transport can push them to connected clients. The [`InvalidationBatcher`]
//! coalesces bursts: when a job touches hundreds of rows, clients should
//! refetch each affected query once, not once per row.

use std::collections::HashMap;
use std::sync::{
	atomic::{AtomicBool, Ordering},
	Arc,
};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crew_live_query::QueryKey;

/// One query gone stale, as sent to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidateOperationEvent {
	key: QueryKey,
}

impl InvalidateOperationEvent {
	pub fn new(key: QueryKey) -> Self {
		Self { key }
	}

	pub fn key(&self) -> &QueryKey {
		&self.key
	}
}

/// Internal core event, exposed to clients via the UI transport's
/// subscription.
#[derive(Debug, Clone, Serialize)]
pub enum CoreEvent {
	InvalidateOperation(InvalidateOperationEvent),
}

/// Broadcast bus for [`CoreEvent`]s. Cheap to clone; clones share the
/// channel.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	/// Emit an event. Send errors are ignored: no receivers just means no
	/// clients are connected, and the UI being outdated for a bit is not
	/// mission critical.
	pub fn emit(&self, event: CoreEvent) {
		let _ = self.sender.send(event);
	}

	pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
		self.sender.subscribe()
	}
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(256)
	}
}

/// Human reaction time makes anything under ~10ms indistinguishable, and a
/// window this size lets the frontend refetch a whole burst in one round
/// trip.
const COALESCE_WINDOW: Duration = Duration::from_millis(10);

/// Batches and deduplicates invalidation events off the core bus.
///
/// Within each window, newer events replace older ones for the same query
/// key, and the surviving set is forwarded as a single batch. There is only
/// ever one manager task per batcher: it is spawned by the first
/// [`InvalidationBatcher::subscribe`], stops when the core bus is dropped
/// or when a batch cannot be delivered because all clients disconnected,
/// and is respawned by the next subscribing client.
pub struct InvalidationBatcher {
	bus: EventBus,
	window: Duration,
	batches: broadcast::Sender<Vec<InvalidateOperationEvent>>,
	manager_active: Arc<AtomicBool>,
}

impl InvalidationBatcher {
	pub fn new(bus: &EventBus) -> Self {
		Self::with_window(bus, COALESCE_WINDOW)
	}

	pub fn with_window(bus: &EventBus, window: Duration) -> Self {
		let (batches, _) = broadcast::channel(64);

		Self {
			bus: bus.clone(),
			window,
			batches,
			manager_active: Arc::new(AtomicBool::new(false)),
		}
	}

	pub fn subscribe(&self) -> broadcast::Receiver<Vec<InvalidateOperationEvent>> {
		let rx = self.batches.subscribe();

		if !self.manager_active.swap(true, Ordering::Relaxed) {
			let mut bus_rx = self.bus.subscribe();
			let tx = self.batches.clone();
			let manager_active = Arc::clone(&self.manager_active);
			let window = self.window;

			tokio::spawn(async move {
				let mut buf: HashMap<QueryKey, InvalidateOperationEvent> = HashMap::with_capacity(64);

				loop {
					tokio::select! {
						event = bus_rx.recv() => {
							match event {
								Ok(CoreEvent::InvalidateOperation(op)) => {
									trace!(key = %op.key(), "buffering invalidation");
									// Newer data replaces older data in the buffer.
									buf.insert(op.key().clone(), op);
								}
								Err(broadcast::error::RecvError::Lagged(skipped)) => {
									debug!(skipped, "invalidation batcher lagged behind the bus");
								}
								Err(broadcast::error::RecvError::Closed) => {
									debug!("core event bus dropped, shutting down invalidation batcher");
									break;
								}
							}
						}
						_ = tokio::time::sleep(window) => {
							if buf.is_empty() {
								continue;
							}
							let batch = buf.drain().map(|(_, op)| op).collect::<Vec<_>>();
							if tx.send(batch).is_err() {
								// All receivers gone means all clients disconnected;
								// the next subscriber respawns the manager.
								debug!("all clients disconnected, shutting down invalidation batcher");
								break;
							}
						}
					}
				}

				manager_active.store(false, Ordering::Relaxed);
			});
		}

		rx
	}
}
